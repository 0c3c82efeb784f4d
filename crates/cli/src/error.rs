use thiserror::Error;

use crate::output::{CommandError, ErrorCode};

pub type Result<T> = std::result::Result<T, CliError>;

/// Exit status for a command interrupted with Ctrl-C.
pub const EXIT_CANCELLED: i32 = 130;

#[derive(Debug, Error)]
pub enum CliError {
	/// The pipeline already reported the failure through the log sink.
	#[error(transparent)]
	Reported(mdeploy::Error),

	#[error("Operation cancelled")]
	Cancelled,

	#[error(transparent)]
	Core(#[from] mdeploy::Error),
}

fn classify(err: &mdeploy::Error) -> ErrorCode {
	use mdeploy::Error;

	if err.is_cancelled() {
		return ErrorCode::Cancelled;
	}
	match err {
		Error::NoDeviceSelected => ErrorCode::NoDeviceSelected,
		Error::Connection(_) => ErrorCode::ConnectionFailed,
		Error::Transfer(_) => ErrorCode::TransferFailed,
		Error::DebugEndpoint(_) => ErrorCode::DebugFailed,
		Error::InvalidDeviceSelected(_) => ErrorCode::InvalidInput,
		Error::Settings(_) | Error::Project(_) => ErrorCode::ConfigError,
		Error::Io(_) => ErrorCode::IoError,
		_ => ErrorCode::InternalError,
	}
}

impl CliError {
	/// True when the failure was already shown on the console.
	pub fn is_reported(&self) -> bool {
		matches!(self, CliError::Reported(_))
	}

	pub fn exit_code(&self) -> i32 {
		match self.to_command_error().code {
			ErrorCode::Cancelled => EXIT_CANCELLED,
			_ => 1,
		}
	}

	/// Convert this error to a CommandError for structured output
	pub fn to_command_error(&self) -> CommandError {
		let (code, details) = match self {
			CliError::Reported(err) | CliError::Core(err) => {
				let details = match err {
					mdeploy::Error::InvalidDeviceSelected(value) => Some(serde_json::json!({ "value": value })),
					_ => None,
				};
				(classify(err), details)
			}
			CliError::Cancelled => (ErrorCode::Cancelled, None),
		};

		CommandError {
			code,
			message: self.to_string(),
			details,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn core_errors_map_to_stable_codes() {
		let cases = [
			(mdeploy::Error::NoDeviceSelected, ErrorCode::NoDeviceSelected),
			(
				mdeploy::Error::InvalidDeviceSelected("COM9".into()),
				ErrorCode::InvalidInput,
			),
			(mdeploy::Error::DebugEndpoint("busy".into()), ErrorCode::DebugFailed),
			(mdeploy::Error::Settings("bad".into()), ErrorCode::ConfigError),
			(mdeploy::Error::Cancelled, ErrorCode::Cancelled),
		];
		for (err, code) in cases {
			assert_eq!(CliError::Core(err).to_command_error().code, code);
		}
	}

	#[test]
	fn invalid_selection_carries_the_value() {
		let err = CliError::Core(mdeploy::Error::InvalidDeviceSelected("COM9".into()));
		let cmd = err.to_command_error();
		assert_eq!(cmd.message, "Invalid Device Selected: COM9");
		assert_eq!(cmd.details.unwrap()["value"], "COM9");
	}

	#[test]
	fn cancellation_exits_130() {
		assert_eq!(CliError::Cancelled.exit_code(), EXIT_CANCELLED);
		assert_eq!(CliError::Reported(mdeploy::Error::Cancelled).exit_code(), EXIT_CANCELLED);
		assert_eq!(CliError::Core(mdeploy::Error::NoDeviceSelected).exit_code(), 1);
	}

	#[test]
	fn reported_errors_are_not_printed_twice() {
		assert!(CliError::Reported(mdeploy::Error::NoDeviceSelected).is_reported());
		assert!(!CliError::Core(mdeploy::Error::NoDeviceSelected).is_reported());
		assert!(!CliError::Cancelled.is_reported());
	}
}
