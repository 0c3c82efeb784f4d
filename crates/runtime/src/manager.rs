//! Single choke point that owns the one live [`DeviceHandle`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use mdeploy_protocol::DeviceIdentity;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::handle::DeviceHandle;
use crate::transport::DeviceDriver;

/// Owns at most one open device handle at a time.
///
/// Deploy and debug both go through [`acquire`](Self::acquire). Acquiring
/// disposes whatever handle was live before opening the new one, so no two
/// handles ever hold the same physical port.
pub struct DeviceConnectionManager {
	driver: Arc<dyn DeviceDriver>,
	slot: Mutex<Option<Arc<DeviceHandle>>>,
	next_id: AtomicU64,
}

impl DeviceConnectionManager {
	pub fn new(driver: Arc<dyn DeviceDriver>) -> Self {
		Self {
			driver,
			slot: Mutex::new(None),
			next_id: AtomicU64::new(1),
		}
	}

	/// Disposes the current handle, if any, and opens a fresh one to `identity`.
	///
	/// On failure no handle is live afterwards.
	pub async fn acquire(&self, identity: &DeviceIdentity) -> Result<Arc<DeviceHandle>> {
		let mut slot = self.slot.lock().await;
		if let Some(previous) = slot.take() {
			if let Err(err) = previous.dispose().await {
				warn!(target = "mdeploy.device", handle = previous.id(), error = %err, "error closing previous device handle");
			}
		}

		let transport = self.driver.open(identity).await.map_err(|err| match err {
			Error::ConnectionFailed { .. } => err,
			other => Error::ConnectionFailed {
				port: identity.name.clone(),
				reason: other.to_string(),
			},
		})?;

		let id = self.next_id.fetch_add(1, Ordering::SeqCst);
		let handle = Arc::new(DeviceHandle::new(id, identity.clone(), transport));
		*slot = Some(handle.clone());
		info!(target = "mdeploy.device", handle = id, port = %identity.name, "device handle acquired");
		Ok(handle)
	}

	/// The live handle, if one is open and not yet disposed.
	pub async fn current(&self) -> Option<Arc<DeviceHandle>> {
		self.slot.lock().await.as_ref().filter(|h| !h.is_disposed()).cloned()
	}

	/// Disposes the live handle. Returns whether one was open.
	pub async fn release(&self) -> bool {
		let Some(handle) = self.slot.lock().await.take() else {
			return false;
		};
		if let Err(err) = handle.dispose().await {
			warn!(target = "mdeploy.device", handle = handle.id(), error = %err, "error closing device handle");
		}
		true
	}

	/// Disposes `handle`, clearing it from the slot if it is still the live one.
	///
	/// Unlike [`release`](Self::release) this never touches a handle that
	/// replaced `handle` in the meantime. Returns whether `handle` was live.
	pub async fn release_handle(&self, handle: &DeviceHandle) -> bool {
		let mut slot = self.slot.lock().await;
		let live = slot.as_ref().is_some_and(|current| current.id() == handle.id());
		if live {
			slot.take();
		}
		if let Err(err) = handle.dispose().await {
			warn!(target = "mdeploy.device", handle = handle.id(), error = %err, "error closing device handle");
		}
		live
	}
}

impl std::fmt::Debug for DeviceConnectionManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DeviceConnectionManager")
			.field("next_id", &self.next_id.load(Ordering::SeqCst))
			.finish_non_exhaustive()
	}
}
