//! Exclusive handle to one open device transport.

use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mdeploy_protocol::DeviceIdentity;
use tokio::sync::{Mutex, OnceCell};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::transport::DeviceTransport;

/// An open, exclusive channel to one physical device.
///
/// Handles are only created by [`crate::DeviceConnectionManager::acquire`].
/// Once disposed, every operation fails with [`Error::Disposed`] and any
/// operation in flight is interrupted.
pub struct DeviceHandle {
	id: u64,
	identity: DeviceIdentity,
	transport: Mutex<Box<dyn DeviceTransport>>,
	os_version: OnceCell<String>,
	disposed: AtomicBool,
	closing: CancellationToken,
}

impl DeviceHandle {
	pub(crate) fn new(id: u64, identity: DeviceIdentity, transport: Box<dyn DeviceTransport>) -> Self {
		Self {
			id,
			identity,
			transport: Mutex::new(transport),
			os_version: OnceCell::new(),
			disposed: AtomicBool::new(false),
			closing: CancellationToken::new(),
		}
	}

	/// Process-unique id of this handle.
	pub fn id(&self) -> u64 {
		self.id
	}

	pub fn identity(&self) -> &DeviceIdentity {
		&self.identity
	}

	pub fn is_disposed(&self) -> bool {
		self.disposed.load(Ordering::SeqCst)
	}

	/// OS version from an earlier successful query, if any.
	pub fn cached_os_version(&self) -> Option<&str> {
		self.os_version.get().map(String::as_str)
	}

	fn ensure_live(&self) -> Result<()> {
		if self.is_disposed() {
			return Err(Error::Disposed(self.id));
		}
		Ok(())
	}

	/// Runs `op` unless the handle is disposed first; disposal interrupts it.
	async fn guarded<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
		self.ensure_live()?;
		tokio::select! {
			_ = self.closing.cancelled() => Err(Error::Disposed(self.id)),
			result = op => result,
		}
	}

	/// Queries the installed OS version, bounded by `timeout` and `cancel`.
	///
	/// The first successful answer is cached for the lifetime of the handle.
	pub async fn os_version(&self, timeout: Duration, cancel: &CancellationToken) -> Result<String> {
		self.ensure_live()?;
		if let Some(version) = self.os_version.get() {
			return Ok(version.clone());
		}

		let query = self.guarded(async { self.transport.lock().await.os_version().await });
		let version = tokio::select! {
			_ = cancel.cancelled() => return Err(Error::Cancelled),
			result = tokio::time::timeout(timeout, query) => match result {
				Ok(version) => version?,
				Err(_) => return Err(Error::Timeout(format!("OS version query exceeded {}s", timeout.as_secs()))),
			},
		};

		let _ = self.os_version.set(version.clone());
		debug!(target = "mdeploy.device", handle = self.id, %version, "device OS version");
		Ok(version)
	}

	/// Transfers the application binary, replacing any previous copy.
	pub async fn deploy_application(&self, binary: &Path, verify: bool, cancel: &CancellationToken) -> Result<()> {
		self.guarded(async {
			let mut transport = self.transport.lock().await;
			transport.deploy_application(binary, verify, cancel).await
		})
		.await
	}

	/// Starts the on-device debug agent.
	pub async fn start_debugging(&self) -> Result<()> {
		self.guarded(async { self.transport.lock().await.start_debugging().await })
			.await
	}

	/// Forwards debug-engine bytes to the device.
	pub async fn debug_write(&self, data: &[u8]) -> Result<()> {
		self.guarded(async { self.transport.lock().await.debug_write(data).await })
			.await
	}

	/// Next debug payload from the device; `None` when the link or handle closes.
	pub async fn debug_read(&self) -> Result<Option<Vec<u8>>> {
		match self
			.guarded(async { self.transport.lock().await.debug_read().await })
			.await
		{
			Err(Error::Disposed(_)) => Ok(None),
			other => other,
		}
	}

	/// Disposes the handle and closes its transport. Idempotent.
	pub async fn dispose(&self) -> Result<()> {
		if self.disposed.swap(true, Ordering::SeqCst) {
			return Ok(());
		}
		self.closing.cancel();
		let mut transport = self.transport.lock().await;
		let result = transport.close().await;
		debug!(target = "mdeploy.device", handle = self.id, port = %self.identity.name, "device handle disposed");
		result
	}
}

impl std::fmt::Debug for DeviceHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DeviceHandle")
			.field("id", &self.id)
			.field("identity", &self.identity)
			.field("disposed", &self.is_disposed())
			.finish()
	}
}
