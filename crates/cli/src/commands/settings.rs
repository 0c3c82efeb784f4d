use serde::Serialize;

use crate::cli::SettingsAction;
use crate::context::Context;
use crate::error::Result;
use crate::output::emit;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SettingsPath {
	path: String,
	exists: bool,
}

pub(super) fn run(ctx: &Context, action: SettingsAction) -> Result<()> {
	match action {
		SettingsAction::Show => {
			emit("settings show", ctx.settings(), ctx.format, |s| {
				let base_url = if s.os_image_base_url.is_empty() {
					"(disabled)"
				} else {
					s.os_image_base_url.as_str()
				};
				format!(
					"deviceTarget       {}\nosImageBaseUrl     {}\ndebugPort          {}\nosQueryTimeoutSecs {}",
					s.device_target, base_url, s.debug_port, s.os_query_timeout_secs
				)
			});
		}
		SettingsAction::Path => {
			let path = ctx.settings_path();
			let report = SettingsPath {
				path: path.display().to_string(),
				exists: path.exists(),
			};
			emit("settings path", report, ctx.format, |p| p.path.clone());
		}
	}
	Ok(())
}
