//! Error types for deploy and debug orchestration.

use thiserror::Error;

/// Result type alias for orchestration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	/// No attached device could be resolved as the target.
	#[error("No device selected")]
	NoDeviceSelected,

	/// The transport to the selected device could not be opened.
	#[error(transparent)]
	Connection(mdeploy_runtime::Error),

	/// The device did not report its OS version in time.
	#[error("Device OS version query failed: {0}")]
	DeviceQueryTimeout(String),

	/// The OS image matching the device could not be fetched.
	#[error("OS image fetch failed: {0}")]
	ImageFetch(String),

	/// The application binary could not be transferred.
	#[error("Transfer failed: {0}")]
	Transfer(#[source] mdeploy_runtime::Error),

	/// The caller cancelled the operation.
	#[error("Operation cancelled")]
	Cancelled,

	/// A device picker value that is not an attached device.
	#[error("Invalid Device Selected: {0}")]
	InvalidDeviceSelected(String),

	/// The debug transport endpoint could not be opened or started.
	#[error("Debug endpoint error: {0}")]
	DebugEndpoint(String),

	#[error("Settings error: {0}")]
	Settings(String),

	#[error("Project error: {0}")]
	Project(String),

	#[error(transparent)]
	Runtime(#[from] mdeploy_runtime::Error),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns true when the error aborts a pipeline.
	///
	/// OS query and OS image failures are absorbed by the deploy pipeline;
	/// cancellation is a normal outcome.
	pub fn is_fatal(&self) -> bool {
		!matches!(self, Error::DeviceQueryTimeout(_) | Error::ImageFetch(_) | Error::Cancelled)
	}

	/// Returns true if the operation was cancelled by the caller.
	pub fn is_cancelled(&self) -> bool {
		match self {
			Error::Cancelled => true,
			Error::Runtime(err) | Error::Transfer(err) | Error::Connection(err) => err.is_cancelled(),
			_ => false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn best_effort_failures_are_not_fatal() {
		assert!(!Error::DeviceQueryTimeout("30s".into()).is_fatal());
		assert!(!Error::ImageFetch("offline".into()).is_fatal());
		assert!(!Error::Cancelled.is_fatal());

		assert!(Error::NoDeviceSelected.is_fatal());
		assert!(Error::Transfer(mdeploy_runtime::Error::Transport("link reset".into())).is_fatal());
		assert!(
			Error::Connection(mdeploy_runtime::Error::ConnectionFailed {
				port: "COM5".into(),
				reason: "busy".into(),
			})
			.is_fatal()
		);
	}

	#[test]
	fn connection_error_keeps_runtime_message() {
		let err = Error::Connection(mdeploy_runtime::Error::ConnectionFailed {
			port: "COM5".into(),
			reason: "Access denied".into(),
		});
		assert_eq!(err.to_string(), "Failed to connect to device on COM5: Access denied");
		// The message is not repeated further down the source chain.
		assert!(std::error::Error::source(&err).is_none());
	}

	#[test]
	fn cancellation_is_seen_through_runtime_wrappers() {
		assert!(Error::Transfer(mdeploy_runtime::Error::Cancelled).is_cancelled());
		assert!(!Error::Transfer(mdeploy_runtime::Error::Timeout("x".into())).is_cancelled());
	}
}
