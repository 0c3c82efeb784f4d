use mdeploy::{NO_DEVICES_FOUND, ValueListCapability};
use serde::Serialize;

use crate::cli::DevicesAction;
use crate::context::Context;
use crate::error::Result;
use crate::output::emit;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeviceList {
	devices: Vec<String>,
	/// Empty when no attached device resolves as the target.
	selected: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Selection {
	selected: String,
}

pub(super) fn run(ctx: &Context, action: DevicesAction) -> Result<()> {
	let selector = ctx.selector();
	match action {
		DevicesAction::List => {
			let list = DeviceList {
				devices: selector.value_list()?,
				selected: selector.current_value()?,
			};
			emit("devices list", list, ctx.format, render_list);
		}
		DevicesAction::Current => {
			let selection = Selection {
				selected: selector.current_value()?,
			};
			emit("devices current", selection, ctx.format, |s| {
				if s.selected.is_empty() {
					"No device selected".to_string()
				} else {
					s.selected.clone()
				}
			});
		}
		DevicesAction::Select { port } => {
			selector.set_value(port.clone())?;
			let selected = if port == NO_DEVICES_FOUND {
				String::new()
			} else {
				selector.current_value()?
			};
			emit("devices select", Selection { selected }, ctx.format, |s| {
				if s.selected.is_empty() {
					String::new()
				} else {
					format!("Selected {}", s.selected)
				}
			});
		}
	}
	Ok(())
}

fn render_list(list: &DeviceList) -> String {
	list.devices
		.iter()
		.map(|name| {
			let marker = if !list.selected.is_empty() && *name == list.selected {
				"*"
			} else {
				" "
			};
			format!("{marker} {name}")
		})
		.collect::<Vec<_>>()
		.join("\n")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn list_marks_the_selected_device() {
		let list = DeviceList {
			devices: vec!["COM5".into(), "COM7".into()],
			selected: "COM7".into(),
		};
		assert_eq!(render_list(&list), "  COM5\n* COM7");
	}

	#[test]
	fn sentinel_is_listed_unmarked() {
		let list = DeviceList {
			devices: vec![NO_DEVICES_FOUND.into()],
			selected: String::new(),
		};
		assert_eq!(render_list(&list), format!("  {NO_DEVICES_FOUND}"));
	}
}
