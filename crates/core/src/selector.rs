//! Device picker exposed to the host.

use std::sync::Arc;

use mdeploy_protocol::NO_DEVICES_FOUND;
use tracing::info;

use crate::error::{Error, Result};
use crate::locator::DeviceLocator;

/// A value picked from a host-rendered list.
pub trait ValueListCapability<T> {
	/// Values the host should offer.
	fn value_list(&self) -> Result<Vec<T>>;

	/// Value the host should show as selected.
	fn current_value(&self) -> Result<T>;

	/// Applies the user's choice.
	fn set_value(&self, value: T) -> Result<()>;
}

/// Picker over attached devices, backed by the stored device preference.
#[derive(Debug, Clone)]
pub struct DeviceSelector {
	locator: Arc<DeviceLocator>,
}

impl DeviceSelector {
	pub fn new(locator: Arc<DeviceLocator>) -> Self {
		Self { locator }
	}
}

impl ValueListCapability<String> for DeviceSelector {
	fn value_list(&self) -> Result<Vec<String>> {
		let names: Vec<String> = self.locator.enumerate()?.into_iter().map(|d| d.name).collect();
		if names.is_empty() {
			return Ok(vec![NO_DEVICES_FOUND.to_string()]);
		}
		Ok(names)
	}

	fn current_value(&self) -> Result<String> {
		Ok(self.locator.resolve()?.map(|d| d.name).unwrap_or_default())
	}

	fn set_value(&self, value: String) -> Result<()> {
		if value == NO_DEVICES_FOUND {
			return Ok(());
		}
		let candidates = self.locator.enumerate()?;
		let Some(device) = candidates.iter().find(|c| c.matches_name(&value)) else {
			return Err(Error::InvalidDeviceSelected(value));
		};
		self.locator.persist_preference(&device.name);
		info!(target = "mdeploy.locator", device = %device.name, "device selected");
		Ok(())
	}
}
