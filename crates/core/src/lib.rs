//! Deploy and debug orchestration for a single attached device.
//!
//! # Components
//!
//! - [`LogSinkRouter`]: redirectable user-facing output
//! - [`DeviceLocator`]: resolves the target among attached serial endpoints
//! - [`DeployOrchestrator`]: resolve, connect, refresh OS, transfer
//! - [`DebugSessionCoordinator`]: prepares and starts debug sessions
//! - [`DeviceSelector`]: device picker capability for the host
//!
//! All device access goes through one shared [`DeviceConnectionManager`],
//! which keeps at most one device handle open.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mdeploy::{DeployConfig, DeployOrchestrator, DeviceLocator, LogSinkRouter};
//!
//! let manager = Arc::new(DeviceConnectionManager::new(Arc::new(SerialDriver::default())));
//! let locator = Arc::new(DeviceLocator::new(Arc::new(SystemPortEnumerator), settings));
//! let deploy = DeployOrchestrator::new(manager, locator, images, Arc::new(LogSinkRouter::new()), DeployConfig::default());
//! let outcome = deploy.deploy_project(&project, cancel, console).await?;
//! ```

pub mod debug;
pub mod deploy;
pub mod error;
pub mod locator;
pub mod log_sink;
pub mod os_image;
pub mod project;
pub mod selector;
pub mod settings;
pub mod testing;

pub use debug::{
	BridgeDebugEngine, DebugConfig, DebugEngine, DebugSession, DebugSessionCoordinator, LaunchOptions, SessionState,
};
pub use deploy::{DeployConfig, DeployOrchestrator, DeployOutcome, DeployRequest, StepOutcome};
pub use error::{Error, Result};
pub use locator::DeviceLocator;
pub use log_sink::{BindingKind, LogSink, LogSinkRouter, OutputPane};
pub use mdeploy_protocol::{
	DebugEndpoint, DebugSessionDescriptor, DebuggingOptions, DeviceIdentity, NO_DEVICES_FOUND,
};
pub use mdeploy_runtime::{
	DeviceConnectionManager, DeviceDriver, DeviceHandle, DeviceTransport, PortEnumerator, SerialDriver,
	SystemPortEnumerator,
};
pub use os_image::{HttpOsImageSource, OsImageSource};
pub use project::{Project, ProjectProperties};
pub use selector::{DeviceSelector, ValueListCapability};
pub use settings::{FileSettingsStore, MemorySettingsStore, Settings, SettingsStore};
