//! Command output.
//!
//! Text mode prints human-readable lines. JSON mode prints one envelope per
//! command on stdout:
//!
//! ```json
//! { "ok": true, "command": "devices list", "data": { ... } }
//! ```
//!
//! On failure the envelope carries `error` with a stable `code` instead of
//! `data`. Deploy progress lines are user-facing output, so in JSON mode they
//! move to stderr to keep stdout parseable.

use std::io::{self, Write};

use mdeploy::{LogSink, OutputPane};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
	/// Human-readable text
	#[default]
	Text,
	/// JSON envelope
	Json,
}

impl std::fmt::Display for OutputFormat {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			OutputFormat::Text => write!(f, "text"),
			OutputFormat::Json => write!(f, "json"),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult<T> {
	pub ok: bool,
	pub command: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CommandError>,
}

impl<T> CommandResult<T> {
	pub fn success(command: impl Into<String>, data: T) -> Self {
		Self {
			ok: true,
			command: command.into(),
			data: Some(data),
			error: None,
		}
	}

	pub fn failure(command: impl Into<String>, error: CommandError) -> Self {
		Self {
			ok: false,
			command: command.into(),
			data: None,
			error: Some(error),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
	pub code: ErrorCode,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
}

/// Stable error codes for scripted callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	/// No attached device resolved as the target
	NoDeviceSelected,
	/// The device port could not be opened
	ConnectionFailed,
	/// The application binary did not reach the device
	TransferFailed,
	/// The debug endpoint or device agent failed
	DebugFailed,
	/// Interrupted by the user
	Cancelled,
	/// Bad argument or picker value
	InvalidInput,
	/// Settings or project file problem
	ConfigError,
	/// File I/O error
	IoError,
	InternalError,
}

impl std::fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ErrorCode::NoDeviceSelected => write!(f, "NO_DEVICE_SELECTED"),
			ErrorCode::ConnectionFailed => write!(f, "CONNECTION_FAILED"),
			ErrorCode::TransferFailed => write!(f, "TRANSFER_FAILED"),
			ErrorCode::DebugFailed => write!(f, "DEBUG_FAILED"),
			ErrorCode::Cancelled => write!(f, "CANCELLED"),
			ErrorCode::InvalidInput => write!(f, "INVALID_INPUT"),
			ErrorCode::ConfigError => write!(f, "CONFIG_ERROR"),
			ErrorCode::IoError => write!(f, "IO_ERROR"),
			ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
		}
	}
}

/// Prints a successful result: the envelope in JSON mode, `text` otherwise.
pub fn emit<T: Serialize>(command: &str, data: T, format: OutputFormat, text: impl FnOnce(&T) -> String) {
	match format {
		OutputFormat::Json => print_result(&CommandResult::success(command, data)),
		OutputFormat::Text => {
			let rendered = text(&data);
			if !rendered.is_empty() {
				println!("{rendered}");
			}
		}
	}
}

/// Prints an envelope to stdout as pretty JSON.
pub fn print_result<T: Serialize>(result: &CommandResult<T>) {
	match serde_json::to_string_pretty(result) {
		Ok(json) => {
			let mut stdout = io::stdout().lock();
			let _ = writeln!(stdout, "{json}");
			let _ = stdout.flush();
		}
		Err(err) => eprintln!("Error [INTERNAL_ERROR]: cannot serialize result: {err}"),
	}
}

pub fn print_error_stderr(error: &CommandError) {
	eprintln!("Error [{}]: {}", error.code, error.message);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
	Stdout,
	Stderr,
}

/// Terminal destination for deploy output and application output.
#[derive(Debug, Clone)]
pub struct ConsoleSink {
	name: &'static str,
	stream: Stream,
}

impl ConsoleSink {
	/// Sink for pipeline progress.
	pub fn console(format: OutputFormat) -> Self {
		Self::named("console", format)
	}

	/// Sink that takes over once the application is launched.
	pub fn application(format: OutputFormat) -> Self {
		Self::named("application", format)
	}

	fn named(name: &'static str, format: OutputFormat) -> Self {
		let stream = match format {
			OutputFormat::Text => Stream::Stdout,
			OutputFormat::Json => Stream::Stderr,
		};
		Self { name, stream }
	}

	pub fn name(&self) -> &'static str {
		self.name
	}

	pub fn writes_to_stdout(&self) -> bool {
		self.stream == Stream::Stdout
	}
}

impl LogSink for ConsoleSink {
	fn write_line(&self, line: &str) {
		let _ = match self.stream {
			Stream::Stdout => writeln!(io::stdout().lock(), "{line}"),
			Stream::Stderr => writeln!(io::stderr().lock(), "{line}"),
		};
	}

	fn on_disconnect(&self) {
		debug!(target = "mdeploy.output", sink = self.name, "console sink disconnected");
	}
}

impl OutputPane for ConsoleSink {
	fn activate(&self) {
		debug!(target = "mdeploy.output", sink = self.name, "output pane activated");
	}

	/// A terminal keeps its scrollback; a separator marks the switch instead.
	fn clear(&self) {
		self.write_line("");
	}
}
