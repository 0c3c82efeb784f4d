//! Device transport seams and the framed request/response transport.
//!
//! [`DeviceDriver`] opens a [`DeviceTransport`] to one endpoint. The only
//! production transport is [`FramedTransport`], which speaks length-prefixed
//! JSON frames over any byte stream (a serial port in practice, an in-memory
//! duplex pipe in tests).
//!
//! # Frame format
//!
//! ```text
//! [len: u32 little-endian][JSON document of len bytes]
//! ```

#[cfg(test)]
mod tests;

use std::collections::VecDeque;
use std::path::Path;

use async_trait::async_trait;
use mdeploy_protocol::{
	DeviceCommand, DeviceIdentity, DeviceMessage, DeviceRequest, EndFileResult, FRAME_HEADER_LEN, MAX_FRAME_LEN,
	OsVersionResult,
};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

/// Size of each file chunk sent during a transfer.
pub const TRANSFER_CHUNK_LEN: usize = 4096;

/// An open, exclusive byte channel to one device.
///
/// Implementations are driven by one caller at a time; `DeviceHandle`
/// serializes access.
#[async_trait]
pub trait DeviceTransport: Send {
	/// Queries the installed OS version.
	async fn os_version(&mut self) -> Result<String>;

	/// Writes `binary` to the device, replacing any previous copy.
	///
	/// `cancel` is honored between chunks. A cancelled transfer leaves the
	/// device without a partial file, so retrying is always safe.
	async fn deploy_application(&mut self, binary: &Path, verify: bool, cancel: &CancellationToken) -> Result<()>;

	/// Starts the on-device debug agent.
	async fn start_debugging(&mut self) -> Result<()>;

	/// Sends debug-engine bytes to the device agent.
	async fn debug_write(&mut self, data: &[u8]) -> Result<()>;

	/// Waits for the next debug payload from the device. `None` once the link closes.
	///
	/// Must be cancel-safe: dropping the future loses no data.
	async fn debug_read(&mut self) -> Result<Option<Vec<u8>>>;

	/// Closes the underlying channel.
	async fn close(&mut self) -> Result<()>;
}

/// Opens transports to device endpoints.
#[async_trait]
pub trait DeviceDriver: Send + Sync {
	async fn open(&self, identity: &DeviceIdentity) -> Result<Box<dyn DeviceTransport>>;
}

/// Request/response transport over length-prefixed JSON frames.
pub struct FramedTransport<S> {
	stream: S,
	next_id: u32,
	read_buf: Vec<u8>,
	pending_debug: VecDeque<Vec<u8>>,
	closed: bool,
}

impl<S> FramedTransport<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send,
{
	pub fn new(stream: S) -> Self {
		Self {
			stream,
			next_id: 0,
			read_buf: Vec::with_capacity(FRAME_HEADER_LEN + 256),
			pending_debug: VecDeque::new(),
			closed: false,
		}
	}

	async fn write_frame(&mut self, request: &DeviceRequest) -> Result<()> {
		let bytes = serde_json::to_vec(request)?;
		if bytes.len() > MAX_FRAME_LEN {
			return Err(Error::Protocol(format!("outgoing frame of {} bytes exceeds limit", bytes.len())));
		}
		let len = bytes.len() as u32;
		self.stream
			.write_all(&len.to_le_bytes())
			.await
			.map_err(|e| Error::Transport(format!("Failed to write frame header: {e}")))?;
		self.stream
			.write_all(&bytes)
			.await
			.map_err(|e| Error::Transport(format!("Failed to write frame: {e}")))?;
		self.stream
			.flush()
			.await
			.map_err(|e| Error::Transport(format!("Failed to flush frame: {e}")))?;
		Ok(())
	}

	/// Pops one complete frame out of `read_buf`, if present.
	fn take_buffered_frame(&mut self) -> Result<Option<DeviceMessage>> {
		if self.read_buf.len() < FRAME_HEADER_LEN {
			return Ok(None);
		}
		let mut header = [0u8; FRAME_HEADER_LEN];
		header.copy_from_slice(&self.read_buf[..FRAME_HEADER_LEN]);
		let len = u32::from_le_bytes(header) as usize;
		if len > MAX_FRAME_LEN {
			return Err(Error::Protocol(format!("incoming frame of {len} bytes exceeds limit")));
		}
		if self.read_buf.len() < FRAME_HEADER_LEN + len {
			return Ok(None);
		}
		let frame: Vec<u8> = self.read_buf.drain(..FRAME_HEADER_LEN + len).skip(FRAME_HEADER_LEN).collect();
		let message = serde_json::from_slice(&frame)?;
		Ok(Some(message))
	}

	/// Reads the next frame. Returns `None` on a clean end of stream.
	///
	/// Cancel-safe: bytes only move into `read_buf` after a completed read.
	async fn read_frame(&mut self) -> Result<Option<DeviceMessage>> {
		let mut chunk = [0u8; 1024];
		loop {
			if let Some(message) = self.take_buffered_frame()? {
				return Ok(Some(message));
			}
			if self.closed {
				return Ok(None);
			}
			let n = self
				.stream
				.read(&mut chunk)
				.await
				.map_err(|e| Error::Transport(format!("Failed to read frame: {e}")))?;
			if n == 0 {
				self.closed = true;
				if self.read_buf.is_empty() {
					return Ok(None);
				}
				return Err(Error::Transport(format!(
					"Device closed the link mid-frame ({} bytes buffered)",
					self.read_buf.len()
				)));
			}
			self.read_buf.extend_from_slice(&chunk[..n]);
		}
	}

	/// Sends `command` and waits for the response with the matching id.
	///
	/// Debug events arriving in the meantime are queued for [`DeviceTransport::debug_read`];
	/// responses to abandoned requests are discarded.
	async fn call(&mut self, command: DeviceCommand) -> Result<Value> {
		let id = self.next_id;
		self.next_id = self.next_id.wrapping_add(1);
		let method = command.method();
		trace!(target = "mdeploy.device", id, method, "sending device request");
		self.write_frame(&DeviceRequest { id, command }).await?;

		loop {
			let Some(message) = self.read_frame().await? else {
				return Err(Error::Transport(format!("Device closed the link while awaiting '{method}'")));
			};
			match message {
				DeviceMessage::Response(response) if response.id == id => {
					if let Some(err) = response.error {
						return Err(Error::Device {
							code: err.code,
							message: err.message,
						});
					}
					return Ok(response.result.unwrap_or(Value::Null));
				}
				DeviceMessage::Response(response) => {
					debug!(target = "mdeploy.device", stale_id = response.id, expected = id, "discarding stale device response");
				}
				DeviceMessage::Event(event) => match event.debug_bytes() {
					Some(bytes) => self.pending_debug.push_back(bytes),
					None => trace!(target = "mdeploy.device", event = %event.event, "ignoring device event"),
				},
			}
		}
	}
}

#[async_trait]
impl<S> DeviceTransport for FramedTransport<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send,
{
	async fn os_version(&mut self) -> Result<String> {
		let value = self.call(DeviceCommand::GetOsVersion).await?;
		let result: OsVersionResult =
			serde_json::from_value(value).map_err(|e| Error::Protocol(format!("invalid getOsVersion result: {e}")))?;
		Ok(result.version)
	}

	async fn deploy_application(&mut self, binary: &Path, verify: bool, cancel: &CancellationToken) -> Result<()> {
		let bytes = tokio::fs::read(binary).await?;
		let name = binary
			.file_name()
			.map(|n| n.to_string_lossy().into_owned())
			.ok_or_else(|| Error::Protocol(format!("binary path has no file name: {}", binary.display())))?;

		if cancel.is_cancelled() {
			return Err(Error::Cancelled);
		}

		self.call(DeviceCommand::BeginFile {
			name: name.clone(),
			size: bytes.len() as u64,
			overwrite: true,
		})
		.await?;

		let mut offset = 0u64;
		for chunk in bytes.chunks(TRANSFER_CHUNK_LEN) {
			if cancel.is_cancelled() {
				debug!(target = "mdeploy.device", file = %name, offset, "transfer cancelled; aborting file");
				if let Err(err) = self.call(DeviceCommand::AbortFile).await {
					warn!(target = "mdeploy.device", error = %err, "abortFile failed after cancellation");
				}
				return Err(Error::Cancelled);
			}
			self.call(DeviceCommand::file_chunk(offset, chunk)).await?;
			offset += chunk.len() as u64;
		}

		let value = self.call(DeviceCommand::EndFile).await?;
		if verify {
			let stored: EndFileResult =
				serde_json::from_value(value).map_err(|e| Error::Protocol(format!("invalid endFile result: {e}")))?;
			let expected = hex_digest(&bytes);
			if stored.sha256 != expected || stored.size != bytes.len() as u64 {
				return Err(Error::Protocol(format!(
					"verification of {name} failed: device stored {} bytes ({}), expected {} bytes ({expected})",
					stored.size,
					stored.sha256,
					bytes.len()
				)));
			}
		}
		debug!(target = "mdeploy.device", file = %name, bytes = bytes.len(), verify, "transfer complete");
		Ok(())
	}

	async fn start_debugging(&mut self) -> Result<()> {
		self.call(DeviceCommand::StartDebugging).await?;
		Ok(())
	}

	async fn debug_write(&mut self, data: &[u8]) -> Result<()> {
		self.call(DeviceCommand::debug_data(data)).await?;
		Ok(())
	}

	async fn debug_read(&mut self) -> Result<Option<Vec<u8>>> {
		loop {
			if let Some(bytes) = self.pending_debug.pop_front() {
				return Ok(Some(bytes));
			}
			match self.read_frame().await? {
				None => return Ok(None),
				Some(DeviceMessage::Event(event)) => {
					if let Some(bytes) = event.debug_bytes() {
						return Ok(Some(bytes));
					}
				}
				Some(DeviceMessage::Response(response)) => {
					debug!(target = "mdeploy.device", id = response.id, "discarding unsolicited response");
				}
			}
		}
	}

	async fn close(&mut self) -> Result<()> {
		self.closed = true;
		self.stream
			.shutdown()
			.await
			.map_err(|e| Error::Transport(format!("Failed to close device link: {e}")))
	}
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn hex_digest(bytes: &[u8]) -> String {
	Sha256::digest(bytes).iter().map(|b| format!("{b:02x}")).collect()
}
