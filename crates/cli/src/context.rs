//! Wiring of the shared components for one CLI invocation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mdeploy::os_image::default_cache_dir;
use mdeploy::settings::default_settings_path;
use mdeploy::{
	BridgeDebugEngine, DebugConfig, DebugSessionCoordinator, DeployConfig, DeployOrchestrator, DeviceConnectionManager,
	DeviceDriver, DeviceLocator, DeviceSelector, FileSettingsStore, HttpOsImageSource, LogSinkRouter, OsImageSource,
	PortEnumerator, Project, SerialDriver, Settings, SettingsStore, SystemPortEnumerator,
};
use tracing::debug;

use crate::cli::{Cli, ProjectArgs};
use crate::output::OutputFormat;

/// Components shared by every command.
///
/// One [`DeviceConnectionManager`] backs both the deploy orchestrator and the
/// debug coordinator, so at most one device handle is open at a time.
pub struct Context {
	pub format: OutputFormat,
	settings_path: PathBuf,
	settings: Arc<FileSettingsStore>,
	locator: Arc<DeviceLocator>,
	manager: Arc<DeviceConnectionManager>,
	router: Arc<LogSinkRouter>,
	os_images: Arc<dyn OsImageSource>,
}

impl Context {
	/// Context talking to real serial ports.
	pub fn from_cli(cli: &Cli) -> Self {
		let settings_path = cli.settings.clone().unwrap_or_else(default_settings_path);
		let settings = FileSettingsStore::new(&settings_path).load();
		let os_images = Arc::new(HttpOsImageSource::new(settings.os_image_base_url, default_cache_dir()));
		Self::new(
			cli.format,
			settings_path,
			cli.port.clone(),
			Arc::new(SystemPortEnumerator),
			Arc::new(SerialDriver::default()),
			os_images,
		)
	}

	pub fn new(
		format: OutputFormat,
		settings_path: impl Into<PathBuf>,
		pinned_port: Option<String>,
		ports: Arc<dyn PortEnumerator>,
		driver: Arc<dyn DeviceDriver>,
		os_images: Arc<dyn OsImageSource>,
	) -> Self {
		let settings_path = settings_path.into();
		let settings = Arc::new(FileSettingsStore::new(&settings_path));
		let mut locator = DeviceLocator::new(ports, settings.clone());
		if let Some(port) = pinned_port {
			debug!(target = "mdeploy.cli", port = %port, "target port pinned");
			locator = locator.with_pinned_port(port);
		}

		Self {
			format,
			settings_path,
			settings,
			locator: Arc::new(locator),
			manager: Arc::new(DeviceConnectionManager::new(driver)),
			router: Arc::new(LogSinkRouter::new()),
			os_images,
		}
	}

	pub fn settings_path(&self) -> &Path {
		&self.settings_path
	}

	pub fn settings(&self) -> Settings {
		self.settings.load()
	}

	pub fn router(&self) -> &Arc<LogSinkRouter> {
		&self.router
	}

	pub fn manager(&self) -> &Arc<DeviceConnectionManager> {
		&self.manager
	}

	pub fn selector(&self) -> DeviceSelector {
		DeviceSelector::new(self.locator.clone())
	}

	pub fn deploy_orchestrator(&self) -> DeployOrchestrator {
		DeployOrchestrator::new(
			self.manager.clone(),
			self.locator.clone(),
			self.os_images.clone(),
			self.router.clone(),
			DeployConfig::from_settings(&self.settings()),
		)
	}

	pub fn debug_coordinator(&self) -> DebugSessionCoordinator {
		DebugSessionCoordinator::new(
			self.manager.clone(),
			self.locator.clone(),
			Arc::new(BridgeDebugEngine),
			DebugConfig::from_settings(&self.settings()),
		)
	}
}

/// Detects the project and applies command-line overrides.
pub fn resolve_project(args: &ProjectArgs) -> mdeploy::Result<Project> {
	let mut project = match &args.project_dir {
		Some(dir) => Project::detect_from(dir)?,
		None => Project::detect()?,
	};
	if let Some(name) = &args.assembly_name {
		project = project.with_assembly_name(name.clone());
	}
	if let Some(path) = &args.output_path {
		project = project.with_output_path(path.clone());
	}
	Ok(project)
}

#[cfg(test)]
mod tests {
	use mdeploy::{ProjectProperties, ValueListCapability};
	use mdeploy::testing::{MockDriver, MockOsImageSource, StaticPortEnumerator};
	use tempfile::TempDir;

	use super::*;

	#[test]
	fn pinned_port_bypasses_the_stored_preference() {
		let dir = TempDir::new().unwrap();
		let ctx = Context::new(
			OutputFormat::Text,
			dir.path().join("settings.json"),
			Some("COM9".into()),
			Arc::new(StaticPortEnumerator::new(&["COM5", "COM7"])),
			Arc::new(MockDriver::new()),
			Arc::new(MockOsImageSource::new()),
		);

		assert_eq!(ctx.selector().current_value().unwrap(), "COM9");
		assert_eq!(ctx.settings().device_target, "");
	}

	#[test]
	fn project_overrides_apply_on_top_of_the_project_file() {
		let dir = TempDir::new().unwrap();
		std::fs::write(
			dir.path().join("mdeploy.json"),
			r#"{ "assemblyName": "Blinky", "outputPath": "out" }"#,
		)
		.unwrap();

		let detected = resolve_project(&ProjectArgs {
			project_dir: Some(dir.path().to_path_buf()),
			..ProjectArgs::default()
		})
		.unwrap();
		assert_eq!(detected.assembly_name(), "Blinky");
		assert_eq!(detected.output_dir(), dir.path().join("out"));

		let overridden = resolve_project(&ProjectArgs {
			project_dir: Some(dir.path().to_path_buf()),
			assembly_name: Some("App".into()),
			output_path: Some(PathBuf::from("bin/Release")),
		})
		.unwrap();
		assert_eq!(overridden.assembly_name(), "App");
		assert_eq!(overridden.output_dir(), dir.path().join("bin/Release"));
	}
}
