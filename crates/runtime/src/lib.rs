//! Device runtime for mdeploy.
//!
//! This crate owns everything that touches a physical device:
//!
//! - [`serial`]: port discovery and the serial [`DeviceDriver`]
//! - [`transport`]: the framed request/response link to a device
//! - [`DeviceHandle`]: an exclusive, disposable channel to one device
//! - [`DeviceConnectionManager`]: the single place handles are created
//!
//! At most one [`DeviceHandle`] is live per manager. Acquiring a new one
//! disposes the previous handle first.

pub mod error;
mod handle;
mod manager;
pub mod serial;
pub mod transport;

pub use error::{Error, Result};
pub use handle::DeviceHandle;
pub use manager::DeviceConnectionManager;
pub use serial::{DEFAULT_BAUD_RATE, PortEnumerator, SerialDriver, SystemPortEnumerator};
pub use transport::{DeviceDriver, DeviceTransport, FramedTransport, TRANSFER_CHUNK_LEN, hex_digest};
