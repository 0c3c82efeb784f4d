//! Project properties consumed by the deploy pipeline.
//!
//! A project is described by an optional `mdeploy.json` file. The project
//! root is the nearest ancestor directory containing one; when none exists
//! the starting directory is used with default properties.

use std::path::{Path, PathBuf};
use std::{env, fs};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Name of the project description file.
pub const PROJECT_FILE: &str = "mdeploy.json";

/// Assembly name of the deployable application project.
pub const DEFAULT_ASSEMBLY_NAME: &str = "App";

/// Build output directory relative to the project root.
pub const DEFAULT_OUTPUT_PATH: &str = "bin/Debug";

/// Build properties of the project being launched.
pub trait ProjectProperties: Send + Sync {
	fn assembly_name(&self) -> &str;
	fn project_dir(&self) -> &Path;
	/// Build output directory, relative to [`project_dir`](Self::project_dir) unless absolute.
	fn output_path(&self) -> &Path;

	/// Directory holding build artifacts.
	fn output_dir(&self) -> PathBuf {
		self.project_dir().join(self.output_path())
	}
}

/// Contents of an `mdeploy.json` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectFile {
	pub assembly_name: String,
	pub output_path: PathBuf,
}

impl Default for ProjectFile {
	fn default() -> Self {
		Self {
			assembly_name: DEFAULT_ASSEMBLY_NAME.to_string(),
			output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
		}
	}
}

/// A project located on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
	root: PathBuf,
	file: ProjectFile,
	config_file: Option<PathBuf>,
}

impl Project {
	/// Detects the project enclosing the current directory.
	pub fn detect() -> Result<Self> {
		let cwd = env::current_dir()?;
		Self::detect_from(&cwd)
	}

	/// Detects the project enclosing `start`.
	///
	/// Fails only when a project file exists but cannot be parsed.
	pub fn detect_from(start: &Path) -> Result<Self> {
		match find_project_root(start) {
			Some(root) => Self::load(root),
			None => Ok(Self {
				root: start.to_path_buf(),
				file: ProjectFile::default(),
				config_file: None,
			}),
		}
	}

	/// Loads the project file in `root`.
	pub fn load(root: PathBuf) -> Result<Self> {
		let path = root.join(PROJECT_FILE);
		let content = fs::read_to_string(&path)?;
		let file: ProjectFile =
			serde_json::from_str(&content).map_err(|e| Error::Project(format!("{}: {e}", path.display())))?;
		debug!(target = "mdeploy.project", root = %root.display(), assembly = %file.assembly_name, "loaded project file");
		Ok(Self {
			root,
			file,
			config_file: Some(path),
		})
	}

	/// Project file that was read, if any.
	pub fn config_file(&self) -> Option<&Path> {
		self.config_file.as_deref()
	}

	pub fn with_assembly_name(mut self, name: impl Into<String>) -> Self {
		self.file.assembly_name = name.into();
		self
	}

	pub fn with_project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.root = dir.into();
		self
	}

	pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
		self.file.output_path = path.into();
		self
	}
}

impl ProjectProperties for Project {
	fn assembly_name(&self) -> &str {
		&self.file.assembly_name
	}

	fn project_dir(&self) -> &Path {
		&self.root
	}

	fn output_path(&self) -> &Path {
		&self.file.output_path
	}
}

/// Finds the project root by searching upward for `mdeploy.json`.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
	let start = if start.is_absolute() {
		start.to_path_buf()
	} else {
		env::current_dir().ok()?.join(start)
	};

	let mut current = start.as_path();
	loop {
		if current.join(PROJECT_FILE).is_file() {
			debug!(target = "mdeploy.project", root = %current.display(), "found project root");
			return Some(current.to_path_buf());
		}
		match current.parent() {
			Some(parent) if parent != current => current = parent,
			_ => return None,
		}
	}
}

#[cfg(test)]
mod tests {
	use tempfile::TempDir;

	use super::*;

	#[test]
	fn finds_root_from_nested_directory() {
		let tmp = TempDir::new().unwrap();
		let nested = tmp.path().join("src/drivers");
		fs::create_dir_all(&nested).unwrap();
		fs::write(tmp.path().join(PROJECT_FILE), "{}").unwrap();

		assert_eq!(find_project_root(&nested).unwrap(), tmp.path());
	}

	#[test]
	fn missing_project_file_uses_defaults() {
		let tmp = TempDir::new().unwrap();
		let project = Project::detect_from(tmp.path()).unwrap();

		assert_eq!(project.assembly_name(), DEFAULT_ASSEMBLY_NAME);
		assert_eq!(project.output_dir(), tmp.path().join("bin/Debug"));
		assert!(project.config_file().is_none());
	}

	#[test]
	fn project_file_overrides_defaults() {
		let tmp = TempDir::new().unwrap();
		fs::write(
			tmp.path().join(PROJECT_FILE),
			r#"{"assemblyName":"Blinky","outputPath":"out/Release"}"#,
		)
		.unwrap();

		let project = Project::detect_from(tmp.path()).unwrap();
		assert_eq!(project.assembly_name(), "Blinky");
		assert_eq!(project.output_path(), Path::new("out/Release"));
	}

	#[test]
	fn malformed_project_file_is_an_error() {
		let tmp = TempDir::new().unwrap();
		fs::write(tmp.path().join(PROJECT_FILE), "[1,2").unwrap();

		let err = Project::detect_from(tmp.path()).unwrap_err();
		assert!(matches!(err, Error::Project(_)), "unexpected error: {err}");
	}

	#[test]
	fn overrides_take_precedence() {
		let tmp = TempDir::new().unwrap();
		let project = Project::detect_from(tmp.path())
			.unwrap()
			.with_assembly_name("OtherProject")
			.with_output_path("/abs/out");

		assert_eq!(project.assembly_name(), "OtherProject");
		assert_eq!(project.output_dir(), PathBuf::from("/abs/out"));
	}
}
