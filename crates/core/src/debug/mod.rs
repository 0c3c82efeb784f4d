//! Debug session coordination.
//!
//! ```text
//! Idle -> Resolving -> Connected -> SessionActive -> Idle
//! ```
//!
//! [`DebugSessionCoordinator::launch_targets`] acquires a fresh device handle
//! and binds the loopback debug endpoint (`Connected`). The device agent is
//! only started, and the [`DebugEngine`] only handed the session, from
//! [`DebugSessionCoordinator::on_after_launch`] (`SessionActive`). Launching
//! again supersedes whatever session is current.

mod bridge;

pub use bridge::{BridgeDebugEngine, DebugEngine, DebugSession};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use mdeploy_protocol::{DebugEndpoint, DebugSessionDescriptor, DebuggingOptions, DeviceIdentity};
use mdeploy_runtime::{DeviceConnectionManager, DeviceHandle};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::locator::DeviceLocator;
use crate::settings::Settings;

/// Debug endpoint and engine timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugConfig {
	pub endpoint: DebugEndpoint,
	pub options: DebuggingOptions,
}

impl DebugConfig {
	pub fn from_settings(settings: &Settings) -> Self {
		Self {
			endpoint: DebugEndpoint::loopback(settings.debug_port),
			options: DebuggingOptions::default(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	Idle,
	Resolving,
	Connected,
	SessionActive,
}

/// Host launch flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaunchOptions {
	/// Run without debugging; nothing is resolved or opened.
	pub no_debug: bool,
}

/// Session opened by `launch_targets`, waiting for `on_after_launch`.
struct PendingSession {
	descriptor: DebugSessionDescriptor,
	handle: Arc<DeviceHandle>,
	listener: TcpListener,
}

struct Slot {
	state: SessionState,
	descriptor: Option<DebugSessionDescriptor>,
	/// Device handle owned by the current session.
	handle: Option<Arc<DeviceHandle>>,
	pending: Option<PendingSession>,
	/// Engine task; it owns the endpoint listener until it has been awaited.
	engine_task: Option<JoinHandle<Result<()>>>,
	/// Flips to `true` once the engine returns.
	engine_done: Option<watch::Receiver<bool>>,
}

impl Default for Slot {
	fn default() -> Self {
		Self {
			state: SessionState::Idle,
			descriptor: None,
			handle: None,
			pending: None,
			engine_task: None,
			engine_done: None,
		}
	}
}

/// Owns the one current debug session.
pub struct DebugSessionCoordinator {
	manager: Arc<DeviceConnectionManager>,
	locator: Arc<DeviceLocator>,
	engine: Arc<dyn DebugEngine>,
	config: DebugConfig,
	slot: Mutex<Slot>,
	next_session: AtomicU64,
}

impl DebugSessionCoordinator {
	pub fn new(
		manager: Arc<DeviceConnectionManager>,
		locator: Arc<DeviceLocator>,
		engine: Arc<dyn DebugEngine>,
		config: DebugConfig,
	) -> Self {
		Self {
			manager,
			locator,
			engine,
			config,
			slot: Mutex::new(Slot::default()),
			next_session: AtomicU64::new(1),
		}
	}

	pub async fn state(&self) -> SessionState {
		self.slot.lock().await.state
	}

	/// Descriptor of the current session, if any.
	pub async fn current_descriptor(&self) -> Option<DebugSessionDescriptor> {
		self.slot.lock().await.descriptor.clone()
	}

	/// Every launch profile is accepted.
	pub fn supports_profile(&self, _profile: &str) -> bool {
		true
	}

	pub fn on_before_launch(&self) {
		debug!(target = "mdeploy.debug", "before launch");
	}

	/// Prepares a debug session for `profile`.
	///
	/// Returns `None` for a no-debug launch or when no device is attached.
	/// Any current session is torn down first.
	pub async fn launch_targets(&self, options: LaunchOptions, profile: &str) -> Result<Option<DebugSessionDescriptor>> {
		let mut slot = self.slot.lock().await;
		self.clear_session(&mut slot).await;

		if options.no_debug {
			debug!(target = "mdeploy.debug", profile, "launch without debugging");
			return Ok(None);
		}

		// Deploy may have left the transport mid-protocol; debugging always starts on a fresh handle.
		self.manager.release().await;
		slot.state = SessionState::Resolving;

		match self.open_session(profile).await {
			Ok(Some(pending)) => {
				let descriptor = pending.descriptor.clone();
				info!(
					target = "mdeploy.debug",
					session = descriptor.session_id,
					port = %descriptor.device.name,
					endpoint = %descriptor.endpoint.socket_addr(),
					"debug session ready"
				);
				slot.descriptor = Some(descriptor.clone());
				slot.handle = Some(pending.handle.clone());
				slot.pending = Some(pending);
				slot.state = SessionState::Connected;
				Ok(Some(descriptor))
			}
			Ok(None) => {
				info!(target = "mdeploy.debug", profile, "no device to debug");
				slot.state = SessionState::Idle;
				Ok(None)
			}
			Err(err) => {
				slot.state = SessionState::Idle;
				Err(err)
			}
		}
	}

	async fn open_session(&self, profile: &str) -> Result<Option<PendingSession>> {
		let Some(device) = self.locator.resolve()? else {
			return Ok(None);
		};
		let handle = self.manager.acquire(&device).await.map_err(Error::Connection)?;

		let listener = match self.bind_endpoint(&device).await {
			Ok(listener) => listener,
			Err(err) => {
				self.manager.release_handle(&handle).await;
				return Err(err);
			}
		};
		let endpoint = listener.local_addr().map(DebugEndpoint::from).unwrap_or(self.config.endpoint);

		let descriptor = DebugSessionDescriptor {
			session_id: self.next_session.fetch_add(1, Ordering::SeqCst),
			profile: profile.to_string(),
			device,
			endpoint,
			options: self.config.options,
		};
		Ok(Some(PendingSession {
			descriptor,
			handle,
			listener,
		}))
	}

	async fn bind_endpoint(&self, device: &DeviceIdentity) -> Result<TcpListener> {
		let addr = self.config.endpoint.socket_addr();
		TcpListener::bind(addr).await.map_err(|err| {
			warn!(target = "mdeploy.debug", port = %device.name, %addr, error = %err, "debug endpoint unavailable");
			Error::DebugEndpoint(format!("cannot listen on {addr}: {err}"))
		})
	}

	/// Starts the prepared session once the host's debug engine is running.
	///
	/// Does nothing when no session is waiting.
	pub async fn on_after_launch(&self) -> Result<()> {
		let mut slot = self.slot.lock().await;
		let Some(pending) = slot.pending.take() else {
			debug!(target = "mdeploy.debug", "no prepared debug session to start");
			return Ok(());
		};

		if let Err(err) = pending.handle.start_debugging().await {
			let device = pending.descriptor.device.clone();
			drop(pending);
			self.clear_session(&mut slot).await;
			return Err(Error::DebugEndpoint(format!("failed to start debugging on {device}: {err}")));
		}

		let session_id = pending.descriptor.session_id;
		let session = DebugSession {
			descriptor: pending.descriptor,
			handle: pending.handle,
			listener: pending.listener,
		};
		let engine = self.engine.clone();
		let (done_tx, done_rx) = watch::channel(false);
		let task = tokio::spawn(async move {
			let result = engine.run(session).await;
			let _ = done_tx.send(true);
			result
		});
		slot.engine_task = Some(task);
		slot.engine_done = Some(done_rx);
		slot.state = SessionState::SessionActive;
		info!(target = "mdeploy.debug", session = session_id, "debug session started");
		Ok(())
	}

	/// Waits for the active session's engine to finish, then tears it down.
	pub async fn wait(&self) -> Result<()> {
		let (done, session_id) = {
			let slot = self.slot.lock().await;
			(slot.engine_done.clone(), slot.descriptor.as_ref().map(|d| d.session_id))
		};
		let Some(mut done) = done else {
			return Ok(());
		};
		// A dropped sender means the engine was aborted.
		let _ = done.wait_for(|finished| *finished).await;

		let mut slot = self.slot.lock().await;
		if slot.descriptor.as_ref().map(|d| d.session_id) != session_id {
			return Ok(());
		}
		let result = match slot.engine_task.take() {
			Some(task) => match task.await {
				Ok(result) => result,
				Err(err) if err.is_cancelled() => Ok(()),
				Err(err) => Err(Error::DebugEndpoint(format!("debug engine failed: {err}"))),
			},
			None => Ok(()),
		};
		self.clear_session(&mut slot).await;
		result
	}

	/// Ends the current session and releases the device. Safe when idle.
	pub async fn teardown(&self) {
		let mut slot = self.slot.lock().await;
		self.clear_session(&mut slot).await;
	}

	async fn clear_session(&self, slot: &mut Slot) {
		slot.engine_done = None;
		if let Some(task) = slot.engine_task.take() {
			// The listener is only released once the aborted task has been dropped.
			task.abort();
			match task.await {
				Ok(Err(err)) => debug!(target = "mdeploy.debug", error = %err, "debug engine ended with error"),
				Err(err) if !err.is_cancelled() => warn!(target = "mdeploy.debug", error = %err, "debug engine panicked"),
				_ => {}
			}
		}
		slot.pending = None;
		slot.state = SessionState::Idle;
		if let Some(handle) = slot.handle.take() {
			self.manager.release_handle(&handle).await;
		}
		if let Some(previous) = slot.descriptor.take() {
			debug!(target = "mdeploy.debug", session = previous.session_id, "debug session cleared");
		}
	}
}

impl std::fmt::Debug for DebugSessionCoordinator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DebugSessionCoordinator")
			.field("config", &self.config)
			.finish_non_exhaustive()
	}
}
