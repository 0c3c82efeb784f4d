//! Device wire frames.
//!
//! Every frame on the serial link is a 4-byte little-endian length prefix
//! followed by a JSON document. The host sends [`DeviceRequest`]s; the device
//! answers each with a [`DeviceResponse`] carrying the same `id`, and may push
//! unsolicited [`DeviceEvent`]s (debug traffic) at any time.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Size of the length prefix preceding every frame.
pub const FRAME_HEADER_LEN: usize = 4;

/// Largest frame either side will accept.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Command issued to the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum DeviceCommand {
	/// Report the installed OS version.
	GetOsVersion,
	/// Open `name` for writing, truncating any existing file.
	#[serde(rename_all = "camelCase")]
	BeginFile { name: String, size: u64, overwrite: bool },
	/// Write base64 `data` at `offset` in the open file.
	FileChunk { offset: u64, data: String },
	/// Close the open file; the device replies with its digest.
	EndFile,
	/// Discard the partially written file.
	AbortFile,
	/// Start the on-device debug agent.
	StartDebugging,
	/// Forward base64 debug-engine bytes to the device agent.
	DebugData { data: String },
}

impl DeviceCommand {
	/// Builds a [`DeviceCommand::FileChunk`] from raw bytes.
	pub fn file_chunk(offset: u64, bytes: &[u8]) -> Self {
		Self::FileChunk {
			offset,
			data: STANDARD.encode(bytes),
		}
	}

	/// Builds a [`DeviceCommand::DebugData`] from raw bytes.
	pub fn debug_data(bytes: &[u8]) -> Self {
		Self::DebugData {
			data: STANDARD.encode(bytes),
		}
	}

	/// Wire name of the command, for diagnostics.
	pub fn method(&self) -> &'static str {
		match self {
			Self::GetOsVersion => "getOsVersion",
			Self::BeginFile { .. } => "beginFile",
			Self::FileChunk { .. } => "fileChunk",
			Self::EndFile => "endFile",
			Self::AbortFile => "abortFile",
			Self::StartDebugging => "startDebugging",
			Self::DebugData { .. } => "debugData",
		}
	}
}

/// Request frame sent from host to device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRequest {
	pub id: u32,
	pub command: DeviceCommand,
}

/// Error payload returned by the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceErrorPayload {
	/// Stable error code (e.g. `BUSY`, `NO_SPACE`).
	pub code: String,
	pub message: String,
}

/// Response frame sent from device to host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceResponse {
	/// Id of the request this answers.
	pub id: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<DeviceErrorPayload>,
}

/// Unsolicited frame pushed by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEvent {
	pub event: String,
	#[serde(default)]
	pub params: Value,
}

impl DeviceEvent {
	/// Event name carrying debug-agent bytes.
	pub const DEBUG_DATA: &'static str = "debugData";

	/// Decodes the `data` field of a debug event.
	pub fn debug_bytes(&self) -> Option<Vec<u8>> {
		if self.event != Self::DEBUG_DATA {
			return None;
		}
		let data = self.params.get("data")?.as_str()?;
		STANDARD.decode(data).ok()
	}
}

/// Any frame received from the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceMessage {
	/// Response (has `id`).
	Response(DeviceResponse),
	/// Event (has `event`).
	Event(DeviceEvent),
}

/// Result of [`DeviceCommand::GetOsVersion`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsVersionResult {
	pub version: String,
}

/// Result of [`DeviceCommand::EndFile`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndFileResult {
	/// Lowercase hex SHA-256 of the bytes the device stored.
	pub sha256: String,
	pub size: u64,
}

/// Decodes base64 payloads carried by chunk and debug frames.
pub fn decode_payload(data: &str) -> Option<Vec<u8>> {
	STANDARD.decode(data).ok()
}
