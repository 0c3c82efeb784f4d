//! Error types for the device runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to a device.
#[derive(Debug, Error)]
pub enum Error {
	/// Serial endpoints could not be enumerated.
	#[error("Device discovery failed: {0}")]
	Discovery(String),

	/// The transport to a device could not be opened.
	#[error("Failed to connect to device on {port}: {reason}")]
	ConnectionFailed { port: String, reason: String },

	/// Byte-level failure on an open transport.
	#[error("Transport error: {0}")]
	Transport(String),

	/// Malformed or unexpected frame.
	#[error("Protocol error: {0}")]
	Protocol(String),

	/// The device rejected a command.
	#[error("Device error {code}: {message}")]
	Device { code: String, message: String },

	/// An operation exceeded its deadline.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// The caller cancelled the operation.
	#[error("Operation cancelled")]
	Cancelled,

	/// The handle was disposed before or during the operation.
	#[error("Device handle {0} has been disposed")]
	Disposed(u64),

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout(_))
	}

	/// Returns true if the operation was cancelled by the caller.
	pub fn is_cancelled(&self) -> bool {
		matches!(self, Error::Cancelled)
	}

	/// Returns true if the failure happened while opening the transport.
	pub fn is_connection_failure(&self) -> bool {
		matches!(self, Error::ConnectionFailed { .. })
	}
}
