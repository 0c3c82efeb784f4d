//! Device identity types.

use serde::{Deserialize, Serialize};

/// Sentinel shown in device pickers when nothing is attached.
pub const NO_DEVICES_FOUND: &str = "No Devices Found";

/// An attached serial endpoint that may host a target device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
	/// Platform port name (e.g. `COM5`, `/dev/ttyACM0`).
	pub name: String,
	/// Human-visible label. Defaults to the port name.
	pub label: String,
}

impl DeviceIdentity {
	/// Creates an identity whose label is the port name.
	pub fn new(name: impl Into<String>) -> Self {
		let name = name.into();
		Self { label: name.clone(), name }
	}

	/// Replaces the human-visible label.
	pub fn with_label(mut self, label: impl Into<String>) -> Self {
		self.label = label.into();
		self
	}

	/// Returns `true` when `name` refers to this endpoint, ignoring case.
	pub fn matches_name(&self, name: &str) -> bool {
		self.name.to_lowercase() == name.to_lowercase()
	}
}

impl std::fmt::Display for DeviceIdentity {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		if self.label == self.name {
			write!(f, "{}", self.name)
		} else {
			write!(f, "{} ({})", self.label, self.name)
		}
	}
}
