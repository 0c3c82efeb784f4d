//! Resolution of "the" target device among attached serial endpoints.

use std::sync::Arc;

use mdeploy_protocol::DeviceIdentity;
use mdeploy_runtime::PortEnumerator;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::settings::SettingsStore;

/// Enumerates attached devices and reconciles them with the stored preference.
pub struct DeviceLocator {
	ports: Arc<dyn PortEnumerator>,
	settings: Arc<dyn SettingsStore>,
	pinned: Option<String>,
}

impl DeviceLocator {
	pub fn new(ports: Arc<dyn PortEnumerator>, settings: Arc<dyn SettingsStore>) -> Self {
		Self {
			ports,
			settings,
			pinned: None,
		}
	}

	/// Always resolves to `port`, bypassing the stored preference.
	pub fn with_pinned_port(mut self, port: impl Into<String>) -> Self {
		self.pinned = Some(port.into());
		self
	}

	/// Snapshot of currently attached endpoints. Empty when nothing is attached.
	pub fn enumerate(&self) -> Result<Vec<DeviceIdentity>> {
		Ok(self.ports.available_ports()?)
	}

	/// Picks the target among `candidates`.
	///
	/// A single candidate always wins and becomes the stored preference.
	/// Otherwise `preferred` is matched case-insensitively; no match, or no
	/// candidates at all, yields `None`.
	pub fn resolve_selected(&self, candidates: &[DeviceIdentity], preferred: &str) -> Option<DeviceIdentity> {
		match candidates {
			[] => {
				debug!(target = "mdeploy.locator", "no devices attached");
				None
			}
			[only] => {
				self.persist_preference(&only.name);
				Some(only.clone())
			}
			_ => {
				let selected = candidates.iter().find(|c| c.matches_name(preferred)).cloned();
				if selected.is_none() {
					debug!(target = "mdeploy.locator", preferred, count = candidates.len(), "preferred device not attached");
				}
				selected
			}
		}
	}

	/// Enumerates and resolves against the stored preference in one step.
	pub fn resolve(&self) -> Result<Option<DeviceIdentity>> {
		let candidates = self.enumerate()?;
		if let Some(pinned) = &self.pinned {
			let identity = candidates
				.into_iter()
				.find(|c| c.matches_name(pinned))
				.unwrap_or_else(|| DeviceIdentity::new(pinned.clone()));
			return Ok(Some(identity));
		}
		let preferred = self.settings.load().device_target;
		Ok(self.resolve_selected(&candidates, &preferred))
	}

	/// Stores `name` as the preferred device.
	pub fn persist_preference(&self, name: &str) {
		let mut settings = self.settings.load();
		if settings.device_target == name {
			return;
		}
		settings.device_target = name.to_string();
		match self.settings.save(&settings) {
			Ok(()) => info!(target = "mdeploy.locator", device = name, "saved device preference"),
			Err(err) => warn!(target = "mdeploy.locator", device = name, error = %err, "could not save device preference"),
		}
	}
}

impl std::fmt::Debug for DeviceLocator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DeviceLocator").field("pinned", &self.pinned).finish_non_exhaustive()
	}
}
