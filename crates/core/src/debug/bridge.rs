//! Hand-off of a started debug session to the debug engine.

use std::sync::Arc;

use async_trait::async_trait;
use mdeploy_protocol::DebugSessionDescriptor;
use mdeploy_runtime::DeviceHandle;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::error::Result;

/// Size of the relay buffer for engine-to-device traffic.
const RELAY_BUF_LEN: usize = 4096;

/// A debug session whose device agent has been started.
pub struct DebugSession {
	pub descriptor: DebugSessionDescriptor,
	pub handle: Arc<DeviceHandle>,
	/// Listener bound to `descriptor.endpoint`.
	pub listener: TcpListener,
}

impl std::fmt::Debug for DebugSession {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DebugSession")
			.field("descriptor", &self.descriptor)
			.field("handle", &self.handle)
			.finish_non_exhaustive()
	}
}

/// Host-side debug engine.
///
/// `run` owns the session until the engine detaches; returning ends the session.
#[async_trait]
pub trait DebugEngine: Send + Sync {
	async fn run(&self, session: DebugSession) -> Result<()>;
}

/// Relays bytes between one engine connection and the device debug channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgeDebugEngine;

#[async_trait]
impl DebugEngine for BridgeDebugEngine {
	async fn run(&self, session: DebugSession) -> Result<()> {
		let DebugSession {
			descriptor,
			handle,
			listener,
		} = session;

		let (socket, peer) = listener.accept().await?;
		drop(listener);
		info!(target = "mdeploy.debug", session = descriptor.session_id, %peer, "debug engine attached");

		let (mut engine_rx, mut engine_tx) = socket.into_split();
		let mut buf = vec![0u8; RELAY_BUF_LEN];
		let mut to_device = 0usize;
		let mut to_engine = 0usize;

		loop {
			tokio::select! {
				read = engine_rx.read(&mut buf) => {
					let n = read?;
					if n == 0 {
						debug!(target = "mdeploy.debug", session = descriptor.session_id, "debug engine closed connection");
						break;
					}
					handle.debug_write(&buf[..n]).await?;
					to_device += n;
				}
				data = handle.debug_read() => match data? {
					Some(bytes) => {
						engine_tx.write_all(&bytes).await?;
						to_engine += bytes.len();
					}
					None => {
						debug!(target = "mdeploy.debug", session = descriptor.session_id, "device debug channel closed");
						break;
					}
				},
			}
		}

		info!(
			target = "mdeploy.debug",
			session = descriptor.session_id,
			to_device,
			to_engine,
			"debug session ended"
		);
		Ok(())
	}
}
