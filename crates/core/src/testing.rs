//! In-memory test doubles for every external collaborator.
//!
//! These let the deploy and debug pipelines run without hardware, network or
//! a host IDE:
//! - [`MockDriver`]: scripted device transports with open/close bookkeeping
//! - [`StaticPortEnumerator`]: fixed (or failing) port enumeration
//! - [`MockOsImageSource`]: scripted OS image downloads
//! - [`MemorySink`]: an output pane that records lines
//! - [`StaticProject`]: fixed project properties

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mdeploy_protocol::DeviceIdentity;
use mdeploy_runtime::{DeviceDriver, DeviceTransport, PortEnumerator};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::log_sink::{LogSink, OutputPane};
use crate::os_image::OsImageSource;
use crate::project::ProjectProperties;

type RuntimeResult<T> = mdeploy_runtime::Result<T>;

#[derive(Debug, Clone)]
enum OsQuery {
	Version(String),
	Fail(String),
	Stall,
}

#[derive(Debug)]
struct DriverState {
	os_query: OsQuery,
	transfer_failure: Option<String>,
	transfer_delay: Duration,
	start_debug_failure: Option<String>,
	refused: HashSet<String>,
	opens: Vec<String>,
	closes: usize,
	live: usize,
	max_live: usize,
	transfers: Vec<PathBuf>,
}

impl Default for DriverState {
	fn default() -> Self {
		Self {
			os_query: OsQuery::Version("1.9.0".into()),
			transfer_failure: None,
			transfer_delay: Duration::ZERO,
			start_debug_failure: None,
			refused: HashSet::new(),
			opens: Vec::new(),
			closes: 0,
			live: 0,
			max_live: 0,
			transfers: Vec::new(),
		}
	}
}

/// Scripted [`DeviceDriver`] that records every open and close.
///
/// Transports answer the OS query with `1.9.0` and accept every transfer
/// unless scripted otherwise. Debug writes are echoed back as debug reads.
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
	state: Arc<Mutex<DriverState>>,
}

impl MockDriver {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_os_version(self, version: impl Into<String>) -> Self {
		self.state.lock().os_query = OsQuery::Version(version.into());
		self
	}

	/// The OS query fails with a transport error.
	pub fn failing_os_query(self, reason: impl Into<String>) -> Self {
		self.state.lock().os_query = OsQuery::Fail(reason.into());
		self
	}

	/// The OS query never answers.
	pub fn stalling_os_query(self) -> Self {
		self.state.lock().os_query = OsQuery::Stall;
		self
	}

	/// Transfers fail with a transport error.
	pub fn failing_transfer(self, reason: impl Into<String>) -> Self {
		self.state.lock().transfer_failure = Some(reason.into());
		self
	}

	/// Transfers take `delay`, honoring cancellation meanwhile.
	pub fn with_transfer_delay(self, delay: Duration) -> Self {
		self.state.lock().transfer_delay = delay;
		self
	}

	pub fn failing_start_debugging(self, reason: impl Into<String>) -> Self {
		self.state.lock().start_debug_failure = Some(reason.into());
		self
	}

	/// Opening `port` fails as if the port were busy.
	pub fn refusing(self, port: impl Into<String>) -> Self {
		self.state.lock().refused.insert(port.into());
		self
	}

	/// Ports opened so far, in order.
	pub fn opens(&self) -> Vec<String> {
		self.state.lock().opens.clone()
	}

	pub fn closes(&self) -> usize {
		self.state.lock().closes
	}

	/// Transports currently open.
	pub fn live_handles(&self) -> usize {
		self.state.lock().live
	}

	/// Highest number of simultaneously open transports observed.
	pub fn max_live_handles(&self) -> usize {
		self.state.lock().max_live
	}

	/// Binaries transferred successfully.
	pub fn transfers(&self) -> Vec<PathBuf> {
		self.state.lock().transfers.clone()
	}
}

#[async_trait]
impl DeviceDriver for MockDriver {
	async fn open(&self, identity: &DeviceIdentity) -> RuntimeResult<Box<dyn DeviceTransport>> {
		let mut state = self.state.lock();
		if state.refused.contains(&identity.name) {
			return Err(mdeploy_runtime::Error::ConnectionFailed {
				port: identity.name.clone(),
				reason: "port is in use".into(),
			});
		}
		state.opens.push(identity.name.clone());
		state.live += 1;
		state.max_live = state.max_live.max(state.live);
		let (echo_tx, echo_rx) = mpsc::unbounded_channel();
		Ok(Box::new(MockTransport {
			state: self.state.clone(),
			echo_tx: Some(echo_tx),
			echo_rx,
			closed: false,
		}))
	}
}

struct MockTransport {
	state: Arc<Mutex<DriverState>>,
	echo_tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
	echo_rx: mpsc::UnboundedReceiver<Vec<u8>>,
	closed: bool,
}

#[async_trait]
impl DeviceTransport for MockTransport {
	async fn os_version(&mut self) -> RuntimeResult<String> {
		let query = self.state.lock().os_query.clone();
		match query {
			OsQuery::Version(version) => Ok(version),
			OsQuery::Fail(reason) => Err(mdeploy_runtime::Error::Transport(reason)),
			OsQuery::Stall => {
				std::future::pending::<()>().await;
				Err(mdeploy_runtime::Error::Transport("unreachable".into()))
			}
		}
	}

	async fn deploy_application(&mut self, binary: &Path, _verify: bool, cancel: &CancellationToken) -> RuntimeResult<()> {
		let (failure, delay) = {
			let state = self.state.lock();
			(state.transfer_failure.clone(), state.transfer_delay)
		};
		tokio::select! {
			_ = cancel.cancelled() => return Err(mdeploy_runtime::Error::Cancelled),
			_ = tokio::time::sleep(delay) => {}
		}
		if let Some(reason) = failure {
			return Err(mdeploy_runtime::Error::Transport(reason));
		}
		self.state.lock().transfers.push(binary.to_path_buf());
		Ok(())
	}

	async fn start_debugging(&mut self) -> RuntimeResult<()> {
		match self.state.lock().start_debug_failure.clone() {
			Some(reason) => Err(mdeploy_runtime::Error::Device {
				code: "DEBUG_UNAVAILABLE".into(),
				message: reason,
			}),
			None => Ok(()),
		}
	}

	async fn debug_write(&mut self, data: &[u8]) -> RuntimeResult<()> {
		if let Some(tx) = &self.echo_tx {
			let _ = tx.send(data.to_vec());
		}
		Ok(())
	}

	async fn debug_read(&mut self) -> RuntimeResult<Option<Vec<u8>>> {
		Ok(self.echo_rx.recv().await)
	}

	async fn close(&mut self) -> RuntimeResult<()> {
		if !self.closed {
			self.closed = true;
			self.echo_tx = None;
			let mut state = self.state.lock();
			state.closes += 1;
			state.live -= 1;
		}
		Ok(())
	}
}

/// Fixed port list, optionally failing every enumeration.
#[derive(Debug, Default)]
pub struct StaticPortEnumerator {
	ports: Mutex<Vec<DeviceIdentity>>,
	failure: Option<String>,
}

impl StaticPortEnumerator {
	pub fn new(names: &[&str]) -> Self {
		Self {
			ports: Mutex::new(names.iter().map(|n| DeviceIdentity::new(*n)).collect()),
			failure: None,
		}
	}

	pub fn failing(reason: impl Into<String>) -> Self {
		Self {
			ports: Mutex::default(),
			failure: Some(reason.into()),
		}
	}

	/// Replaces the attached ports (hot-plug).
	pub fn set_ports(&self, names: &[&str]) {
		*self.ports.lock() = names.iter().map(|n| DeviceIdentity::new(*n)).collect();
	}
}

impl PortEnumerator for StaticPortEnumerator {
	fn available_ports(&self) -> RuntimeResult<Vec<DeviceIdentity>> {
		match &self.failure {
			Some(reason) => Err(mdeploy_runtime::Error::Discovery(reason.clone())),
			None => Ok(self.ports.lock().clone()),
		}
	}
}

/// Scripted OS image source that records requested versions.
#[derive(Debug, Default)]
pub struct MockOsImageSource {
	failure: Option<String>,
	requests: Mutex<Vec<String>>,
}

impl MockOsImageSource {
	pub fn new() -> Self {
		Self::default()
	}

	/// Every download fails with `reason`.
	pub fn failing(reason: impl Into<String>) -> Self {
		Self {
			failure: Some(reason.into()),
			requests: Mutex::default(),
		}
	}

	pub fn requests(&self) -> Vec<String> {
		self.requests.lock().clone()
	}
}

#[async_trait]
impl OsImageSource for MockOsImageSource {
	async fn download_latest_matching(&self, version: &str) -> Result<PathBuf> {
		self.requests.lock().push(version.to_string());
		match &self.failure {
			Some(reason) => Err(Error::ImageFetch(reason.clone())),
			None => Ok(PathBuf::from(format!("/cache/os/{version}/os.zip"))),
		}
	}
}

#[derive(Debug, Default)]
struct SinkState {
	lines: Vec<String>,
	disconnects: usize,
	activations: usize,
	clears: usize,
}

/// Output pane that keeps every line in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
	state: Mutex<SinkState>,
}

impl MemorySink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn lines(&self) -> Vec<String> {
		self.state.lock().lines.clone()
	}

	pub fn contains(&self, needle: &str) -> bool {
		self.state.lock().lines.iter().any(|l| l.contains(needle))
	}

	pub fn disconnects(&self) -> usize {
		self.state.lock().disconnects
	}

	pub fn activations(&self) -> usize {
		self.state.lock().activations
	}

	pub fn clears(&self) -> usize {
		self.state.lock().clears
	}
}

impl LogSink for MemorySink {
	fn write_line(&self, line: &str) {
		self.state.lock().lines.push(line.to_string());
	}

	fn on_disconnect(&self) {
		self.state.lock().disconnects += 1;
	}
}

impl OutputPane for MemorySink {
	fn activate(&self) {
		self.state.lock().activations += 1;
	}

	fn clear(&self) {
		let mut state = self.state.lock();
		state.clears += 1;
		state.lines.clear();
	}
}

/// Fixed project properties.
#[derive(Debug, Clone)]
pub struct StaticProject {
	pub assembly_name: String,
	pub project_dir: PathBuf,
	pub output_path: PathBuf,
}

impl StaticProject {
	pub fn new(assembly_name: impl Into<String>, project_dir: impl Into<PathBuf>) -> Self {
		Self {
			assembly_name: assembly_name.into(),
			project_dir: project_dir.into(),
			output_path: PathBuf::from(crate::project::DEFAULT_OUTPUT_PATH),
		}
	}
}

impl ProjectProperties for StaticProject {
	fn assembly_name(&self) -> &str {
		&self.assembly_name
	}

	fn project_dir(&self) -> &Path {
		&self.project_dir
	}

	fn output_path(&self) -> &Path {
		&self.output_path
	}
}
