//! The deploy pipeline.
//!
//! ```text
//! resolve device -> acquire handle -> query OS version* -> fetch OS image* -> transfer binary
//! ```
//!
//! Steps marked `*` are best-effort: they report a [`StepOutcome`] instead of
//! failing, and the pipeline continues without their result. Every other
//! failure is fatal. A fatal failure releases the deploy's device handle, writes the
//! reason plus a remediation hint to the bound log sink, and is returned to
//! the caller. Cancellation releases the handle and ends the pipeline with
//! [`DeployOutcome::Cancelled`].


use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mdeploy_protocol::DeviceIdentity;
use mdeploy_runtime::{DeviceConnectionManager, DeviceHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::locator::DeviceLocator;
use crate::log_sink::{LogSink, LogSinkRouter, OutputPane};
use crate::os_image::OsImageSource;
use crate::project::{DEFAULT_ASSEMBLY_NAME, ProjectProperties};
use crate::settings::{DEFAULT_OS_QUERY_TIMEOUT_SECS, Settings};

/// Second line written after every fatal deploy failure.
pub const REMEDIATION_HINT: &str = "Reset the device and try again.";

/// Line written to the permanent pane when a deploy is committed.
pub const LAUNCHING_MESSAGE: &str = " Launching application...";

/// Deploy pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployConfig {
	/// Only projects with this assembly name are deployed.
	pub expected_assembly: String,
	/// File name of the application binary inside the output directory.
	pub binary_name: String,
	pub os_query_timeout: Duration,
	/// Verify the stored binary against the local digest after transfer.
	pub verify: bool,
}

impl Default for DeployConfig {
	fn default() -> Self {
		Self {
			expected_assembly: DEFAULT_ASSEMBLY_NAME.to_string(),
			binary_name: format!("{DEFAULT_ASSEMBLY_NAME}.dll"),
			os_query_timeout: Duration::from_secs(DEFAULT_OS_QUERY_TIMEOUT_SECS),
			verify: true,
		}
	}
}

impl DeployConfig {
	pub fn from_settings(settings: &Settings) -> Self {
		Self {
			os_query_timeout: Duration::from_secs(settings.os_query_timeout_secs),
			..Self::default()
		}
	}
}

/// One deploy invocation.
#[derive(Clone)]
pub struct DeployRequest {
	pub binary_path: PathBuf,
	pub cancel: CancellationToken,
	/// Sink bound as the provisional log destination for this deploy.
	pub output: Arc<dyn LogSink>,
}

impl DeployRequest {
	pub fn new(binary_path: impl Into<PathBuf>, cancel: CancellationToken, output: Arc<dyn LogSink>) -> Self {
		Self {
			binary_path: binary_path.into(),
			cancel,
			output,
		}
	}
}

impl std::fmt::Debug for DeployRequest {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DeployRequest")
			.field("binary_path", &self.binary_path)
			.field("cancelled", &self.cancel.is_cancelled())
			.finish_non_exhaustive()
	}
}

/// How a deploy ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
	/// The binary is on the device.
	Deployed {
		device: DeviceIdentity,
		/// OS version reported before the transfer, if the query succeeded.
		os_version: Option<String>,
		/// Local OS image matching that version, if it could be fetched.
		os_image: Option<PathBuf>,
	},
	/// The project is not the deployable application.
	NotApplicable,
	Cancelled,
}

/// Result of a best-effort step.
#[derive(Debug)]
pub enum StepOutcome<T> {
	Completed(T),
	Failed(Error),
}

impl<T> StepOutcome<T> {
	pub fn completed(self) -> Option<T> {
		match self {
			StepOutcome::Completed(value) => Some(value),
			StepOutcome::Failed(_) => None,
		}
	}
}

/// Drives the deploy pipeline against the shared device connection.
pub struct DeployOrchestrator {
	manager: Arc<DeviceConnectionManager>,
	locator: Arc<DeviceLocator>,
	os_images: Arc<dyn OsImageSource>,
	router: Arc<LogSinkRouter>,
	config: DeployConfig,
	app_deployed: AtomicBool,
}

impl DeployOrchestrator {
	pub fn new(
		manager: Arc<DeviceConnectionManager>,
		locator: Arc<DeviceLocator>,
		os_images: Arc<dyn OsImageSource>,
		router: Arc<LogSinkRouter>,
		config: DeployConfig,
	) -> Self {
		Self {
			manager,
			locator,
			os_images,
			router,
			config,
			app_deployed: AtomicBool::new(false),
		}
	}

	pub fn config(&self) -> &DeployConfig {
		&self.config
	}

	pub fn is_deploy_supported(&self) -> bool {
		true
	}

	/// Host entry point: deploys `project` if it is the application project.
	pub async fn deploy_project(
		&self,
		project: &dyn ProjectProperties,
		cancel: CancellationToken,
		output: Arc<dyn LogSink>,
	) -> Result<DeployOutcome> {
		self.app_deployed.store(false, Ordering::SeqCst);

		if project.assembly_name() != self.config.expected_assembly {
			debug!(
				target = "mdeploy.deploy",
				assembly = project.assembly_name(),
				expected = %self.config.expected_assembly,
				"skipping deploy for non-application project"
			);
			return Ok(DeployOutcome::NotApplicable);
		}

		let binary_path = project.output_dir().join(&self.config.binary_name);
		self.deploy(DeployRequest::new(binary_path, cancel, output)).await
	}

	/// Runs the pipeline for `request`.
	pub async fn deploy(&self, request: DeployRequest) -> Result<DeployOutcome> {
		self.app_deployed.store(false, Ordering::SeqCst);
		self.router.connect_provisional(request.output.clone());

		let mut acquired = None;
		let result = self.run_pipeline(&request, &mut acquired).await;
		if result.is_err() {
			if let Some(handle) = acquired {
				self.manager.release_handle(&handle).await;
			}
		}

		match result {
			Ok(outcome) => {
				self.app_deployed.store(true, Ordering::SeqCst);
				Ok(outcome)
			}
			Err(err) if err.is_cancelled() => {
				info!(target = "mdeploy.deploy", binary = %request.binary_path.display(), "deploy cancelled");
				self.router.log("Deploy cancelled.");
				Ok(DeployOutcome::Cancelled)
			}
			Err(err) => {
				error!(target = "mdeploy.deploy", binary = %request.binary_path.display(), error = %err, "deploy failed");
				self.router.log(&format!("Deploy failed: {err}"));
				self.router.log(REMEDIATION_HINT);
				Err(err)
			}
		}
	}

	async fn run_pipeline(
		&self,
		request: &DeployRequest,
		acquired: &mut Option<Arc<DeviceHandle>>,
	) -> Result<DeployOutcome> {
		let device = self.locator.resolve()?.ok_or(Error::NoDeviceSelected)?;
		self.router.log(&format!("Deploying to {device}"));

		let handle = self.manager.acquire(&device).await.map_err(Error::Connection)?;
		*acquired = Some(handle.clone());

		let os_version = match self.query_os_version(&handle, &request.cancel).await {
			StepOutcome::Completed(version) => Some(version),
			StepOutcome::Failed(err) => {
				warn!(target = "mdeploy.deploy", port = %device.name, error = %err, "OS version query failed; continuing");
				self.router.log("Unable to read the device OS version, skipping OS update check.");
				None
			}
		};

		let os_image = match &os_version {
			Some(version) => match self.fetch_os_image(version).await {
				StepOutcome::Completed(path) => Some(path),
				StepOutcome::Failed(err) => {
					warn!(target = "mdeploy.deploy", %version, error = %err, "OS image fetch failed; continuing");
					self.router.log("OS download failed, make sure you have an active internet connection.");
					None
				}
			},
			None => None,
		};

		self.transfer(&handle, request).await?;
		self.router.log(&format!("Deployed {} to {device}", request.binary_path.display()));

		Ok(DeployOutcome::Deployed {
			device,
			os_version,
			os_image,
		})
	}

	async fn query_os_version(&self, handle: &DeviceHandle, cancel: &CancellationToken) -> StepOutcome<String> {
		match handle.os_version(self.config.os_query_timeout, cancel).await {
			Ok(version) => {
				self.router.log(&format!("Device OS version: {version}"));
				StepOutcome::Completed(version)
			}
			Err(err) if err.is_cancelled() => StepOutcome::Failed(Error::Cancelled),
			Err(err) => StepOutcome::Failed(Error::DeviceQueryTimeout(err.to_string())),
		}
	}

	async fn fetch_os_image(&self, version: &str) -> StepOutcome<PathBuf> {
		match self.os_images.download_latest_matching(version).await {
			Ok(path) => {
				debug!(target = "mdeploy.deploy", %version, path = %path.display(), "OS image available");
				StepOutcome::Completed(path)
			}
			Err(err) => StepOutcome::Failed(err),
		}
	}

	async fn transfer(&self, handle: &DeviceHandle, request: &DeployRequest) -> Result<()> {
		if request.cancel.is_cancelled() {
			return Err(Error::Cancelled);
		}
		if let Err(err) = tokio::fs::metadata(&request.binary_path).await {
			return Err(Error::Transfer(mdeploy_runtime::Error::Io(std::io::Error::new(
				err.kind(),
				format!("{}: {err}", request.binary_path.display()),
			))));
		}

		self.router.log(&format!("Transferring {}", request.binary_path.display()));
		handle
			.deploy_application(&request.binary_path, self.config.verify, &request.cancel)
			.await
			.map_err(|err| if err.is_cancelled() { Error::Cancelled } else { Error::Transfer(err) })
	}

	/// Moves output to the permanent `pane` if the last deploy ran.
	///
	/// Returns whether routing changed.
	pub fn commit<P>(&self, pane: Arc<P>) -> bool
	where
		P: OutputPane + 'static,
	{
		if !self.app_deployed.swap(false, Ordering::SeqCst) {
			return false;
		}
		pane.activate();
		pane.clear();
		pane.write_line(LAUNCHING_MESSAGE);
		self.router.connect_permanent(pane);
		true
	}

	pub fn rollback(&self) {
		info!(target = "mdeploy.deploy", "rolling back");
		self.router.log("Rolling back");
	}
}

impl std::fmt::Debug for DeployOrchestrator {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DeployOrchestrator")
			.field("config", &self.config)
			.field("app_deployed", &self.app_deployed.load(Ordering::SeqCst))
			.finish_non_exhaustive()
	}
}
