//! Serial port discovery and the serial [`DeviceDriver`].

use async_trait::async_trait;
use mdeploy_protocol::DeviceIdentity;
use tokio_serial::{SerialPortBuilderExt, SerialPortInfo, SerialPortType};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::transport::{DeviceDriver, DeviceTransport, FramedTransport};

/// Default baud rate of the device link.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Source of currently attached serial endpoints.
///
/// Every call takes a fresh snapshot. An empty list means nothing is
/// attached; a failure to enumerate is reported as [`Error::Discovery`].
pub trait PortEnumerator: Send + Sync {
	fn available_ports(&self) -> Result<Vec<DeviceIdentity>>;
}

/// Enumerates ports through the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPortEnumerator;

impl PortEnumerator for SystemPortEnumerator {
	fn available_ports(&self) -> Result<Vec<DeviceIdentity>> {
		let ports = tokio_serial::available_ports().map_err(|e| Error::Discovery(e.to_string()))?;
		let mut identities: Vec<DeviceIdentity> = ports.into_iter().map(identity_from_port).collect();
		identities.sort_by(|a, b| a.name.cmp(&b.name));
		debug!(target = "mdeploy.device", count = identities.len(), "enumerated serial ports");
		Ok(identities)
	}
}

fn identity_from_port(port: SerialPortInfo) -> DeviceIdentity {
	let identity = DeviceIdentity::new(port.port_name);
	match port.port_type {
		SerialPortType::UsbPort(usb) => match usb.product {
			Some(product) if !product.is_empty() => identity.with_label(product),
			_ => identity,
		},
		_ => identity,
	}
}

/// Opens devices over a native serial port.
#[derive(Debug, Clone)]
pub struct SerialDriver {
	baud_rate: u32,
}

impl SerialDriver {
	pub fn new(baud_rate: u32) -> Self {
		Self { baud_rate }
	}
}

impl Default for SerialDriver {
	fn default() -> Self {
		Self::new(DEFAULT_BAUD_RATE)
	}
}

#[async_trait]
impl DeviceDriver for SerialDriver {
	async fn open(&self, identity: &DeviceIdentity) -> Result<Box<dyn DeviceTransport>> {
		let connection_failed = |reason: String| Error::ConnectionFailed {
			port: identity.name.clone(),
			reason,
		};

		#[allow(unused_mut)]
		let mut stream = tokio_serial::new(&identity.name, self.baud_rate)
			.open_native_async()
			.map_err(|e| connection_failed(e.to_string()))?;

		#[cfg(unix)]
		stream.set_exclusive(true).map_err(|e| connection_failed(e.to_string()))?;

		info!(target = "mdeploy.device", port = %identity.name, baud = self.baud_rate, "opened serial link");
		Ok(Box::new(FramedTransport::new(stream)))
	}
}
