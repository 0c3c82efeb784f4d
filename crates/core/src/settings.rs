//! Persisted user settings.

use std::fs;
use std::path::{Path, PathBuf};

use mdeploy_protocol::DEFAULT_DEBUG_PORT;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Default deadline for the device OS version query.
pub const DEFAULT_OS_QUERY_TIMEOUT_SECS: u64 = 30;

/// User settings shared by every command.
///
/// Unknown fields are ignored and missing fields take their defaults, so
/// older and newer files both load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
	/// Port name of the preferred device; empty when none was chosen.
	pub device_target: String,
	/// Base URL of the OS image server; empty disables OS image downloads.
	pub os_image_base_url: String,
	/// Loopback port handed to the debug engine.
	pub debug_port: u16,
	pub os_query_timeout_secs: u64,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			device_target: String::new(),
			os_image_base_url: String::new(),
			debug_port: DEFAULT_DEBUG_PORT,
			os_query_timeout_secs: DEFAULT_OS_QUERY_TIMEOUT_SECS,
		}
	}
}

/// Load/save access to [`Settings`].
pub trait SettingsStore: Send + Sync {
	/// Current settings; defaults when nothing usable is stored.
	fn load(&self) -> Settings;

	fn save(&self, settings: &Settings) -> Result<()>;
}

/// Default settings file: `$XDG_CONFIG_HOME/mdeploy/settings.json`.
pub fn default_settings_path() -> PathBuf {
	dirs::config_dir()
		.unwrap_or_else(|| PathBuf::from("."))
		.join("mdeploy")
		.join("settings.json")
}

/// Settings stored as pretty-printed JSON on disk.
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
	path: PathBuf,
}

impl FileSettingsStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

impl Default for FileSettingsStore {
	fn default() -> Self {
		Self::new(default_settings_path())
	}
}

impl SettingsStore for FileSettingsStore {
	fn load(&self) -> Settings {
		match load_json(&self.path) {
			Some(settings) => settings,
			None => {
				debug!(target = "mdeploy.settings", path = %self.path.display(), "no usable settings file; using defaults");
				Settings::default()
			}
		}
	}

	fn save(&self, settings: &Settings) -> Result<()> {
		save_json(&self.path, settings).map_err(|err| {
			warn!(target = "mdeploy.settings", path = %self.path.display(), error = %err, "failed to save settings");
			Error::Settings(format!("{}: {err}", self.path.display()))
		})
	}
}

/// Settings held in memory only.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
	settings: Mutex<Settings>,
}

impl MemorySettingsStore {
	pub fn new(settings: Settings) -> Self {
		Self {
			settings: Mutex::new(settings),
		}
	}

	/// Store whose preferred device is `name`.
	pub fn with_device_target(name: impl Into<String>) -> Self {
		Self::new(Settings {
			device_target: name.into(),
			..Settings::default()
		})
	}
}

impl SettingsStore for MemorySettingsStore {
	fn load(&self) -> Settings {
		self.settings.lock().clone()
	}

	fn save(&self, settings: &Settings) -> Result<()> {
		*self.settings.lock() = settings.clone();
		Ok(())
	}
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
	fs::read_to_string(path)
		.ok()
		.and_then(|content| serde_json::from_str(&content).ok())
}

fn save_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent)?;
	}
	fs::write(path, serde_json::to_string_pretty(data)?)?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn missing_file_loads_defaults() {
		let tmp = TempDir::new().unwrap();
		let store = FileSettingsStore::new(tmp.path().join("nope/settings.json"));
		assert_eq!(store.load(), Settings::default());
	}

	#[test]
	fn corrupt_file_loads_defaults() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("settings.json");
		fs::write(&path, "{ not json").unwrap();
		assert_eq!(FileSettingsStore::new(path).load(), Settings::default());
	}

	#[test]
	fn save_creates_parents_and_round_trips() {
		let tmp = TempDir::new().unwrap();
		let store = FileSettingsStore::new(tmp.path().join("mdeploy/settings.json"));
		let settings = Settings {
			device_target: "COM7".into(),
			..Settings::default()
		};

		store.save(&settings).unwrap();
		assert_eq!(store.load(), settings);
		let raw = fs::read_to_string(store.path()).unwrap();
		assert!(raw.contains("\"deviceTarget\": \"COM7\""));
	}

	#[test]
	fn partial_file_fills_defaults_and_ignores_unknown_fields() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("settings.json");
		fs::write(&path, r#"{"deviceTarget":"COM5","legacyFlag":true}"#).unwrap();

		let settings = FileSettingsStore::new(path).load();
		assert_eq!(settings.device_target, "COM5");
		assert_eq!(settings.debug_port, DEFAULT_DEBUG_PORT);
		assert_eq!(settings.os_query_timeout_secs, DEFAULT_OS_QUERY_TIMEOUT_SECS);
	}

	#[test]
	fn default_path_is_under_mdeploy_config_dir() {
		assert!(default_settings_path().ends_with("mdeploy/settings.json"));
	}
}
