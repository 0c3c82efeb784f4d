//! OS image source used by the best-effort OS refresh step.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// File name of an OS image artifact.
pub const OS_IMAGE_FILE: &str = "os.zip";

/// Fetches OS images matching a device's installed version.
#[async_trait]
pub trait OsImageSource: Send + Sync {
	/// Returns a local path to the image for `version`, downloading it if needed.
	async fn download_latest_matching(&self, version: &str) -> Result<PathBuf>;
}

/// Default image cache: `$XDG_CACHE_HOME/mdeploy/os`.
pub fn default_cache_dir() -> PathBuf {
	dirs::cache_dir()
		.unwrap_or_else(|| PathBuf::from("."))
		.join("mdeploy")
		.join("os")
}

/// Downloads `{base_url}/{version}/os.zip` into a local cache.
#[derive(Debug, Clone)]
pub struct HttpOsImageSource {
	client: reqwest::Client,
	base_url: String,
	cache_dir: PathBuf,
}

impl HttpOsImageSource {
	pub fn new(base_url: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
		Self {
			client: reqwest::Client::new(),
			base_url: base_url.into(),
			cache_dir: cache_dir.into(),
		}
	}

	/// Cache location of the image for `version`.
	pub fn artifact_path(&self, version: &str) -> PathBuf {
		self.cache_dir.join(version).join(OS_IMAGE_FILE)
	}

	fn url_for(&self, version: &str) -> String {
		format!("{}/{version}/{OS_IMAGE_FILE}", self.base_url.trim_end_matches('/'))
	}

	async fn fetch_to(&self, url: &str, target: &Path) -> Result<()> {
		let fetch_err = |e: reqwest::Error| Error::ImageFetch(format!("{url}: {e}"));

		let mut response = self
			.client
			.get(url)
			.send()
			.await
			.and_then(reqwest::Response::error_for_status)
			.map_err(fetch_err)?;

		if let Some(parent) = target.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}
		let partial = target.with_extension("zip.part");
		let mut file = tokio::fs::File::create(&partial).await?;
		let mut written = 0usize;
		while let Some(chunk) = response.chunk().await.map_err(fetch_err)? {
			file.write_all(&chunk).await?;
			written += chunk.len();
		}
		file.flush().await?;
		drop(file);
		tokio::fs::rename(&partial, target).await?;

		debug!(target = "mdeploy.os_image", path = %target.display(), bytes = written, "stored OS image");
		Ok(())
	}
}

#[async_trait]
impl OsImageSource for HttpOsImageSource {
	async fn download_latest_matching(&self, version: &str) -> Result<PathBuf> {
		let valid_version = !version.is_empty()
			&& version != "."
			&& version != ".."
			&& !version.contains(['/', '\\']);
		if !valid_version {
			return Err(Error::ImageFetch(format!("unusable OS version '{version}'")));
		}

		let target = self.artifact_path(version);
		if tokio::fs::try_exists(&target).await.unwrap_or(false) {
			debug!(target = "mdeploy.os_image", %version, path = %target.display(), "OS image already cached");
			return Ok(target);
		}

		if self.base_url.is_empty() {
			return Err(Error::ImageFetch("no OS image server configured".into()));
		}

		let url = self.url_for(version);
		info!(target = "mdeploy.os_image", %version, %url, "downloading OS image");
		self.fetch_to(&url, &target).await?;
		Ok(target)
	}
}

#[cfg(test)]
mod tests {
	use tempfile::TempDir;

	use super::*;

	#[tokio::test]
	async fn cached_image_is_returned_without_network() {
		let tmp = TempDir::new().unwrap();
		let source = HttpOsImageSource::new("http://127.0.0.1:9", tmp.path());
		let cached = source.artifact_path("1.9.0");
		std::fs::create_dir_all(cached.parent().unwrap()).unwrap();
		std::fs::write(&cached, b"image").unwrap();

		assert_eq!(source.download_latest_matching("1.9.0").await.unwrap(), cached);
	}

	#[tokio::test]
	async fn unconfigured_server_is_image_fetch_error() {
		let tmp = TempDir::new().unwrap();
		let source = HttpOsImageSource::new("", tmp.path());

		let err = source.download_latest_matching("1.9.0").await.unwrap_err();
		assert!(matches!(err, Error::ImageFetch(_)), "unexpected error: {err}");
		assert!(!err.is_fatal());
	}

	#[tokio::test]
	async fn path_like_versions_are_rejected() {
		let tmp = TempDir::new().unwrap();
		let source = HttpOsImageSource::new("http://127.0.0.1:9", tmp.path());

		for version in ["", "..", "../etc", "a\\b"] {
			let err = source.download_latest_matching(version).await.unwrap_err();
			assert!(matches!(err, Error::ImageFetch(_)), "{version}: {err}");
		}
	}

	#[tokio::test]
	async fn unreachable_server_is_image_fetch_error() {
		let tmp = TempDir::new().unwrap();
		let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
		let port = listener.local_addr().unwrap().port();
		drop(listener);

		let source = HttpOsImageSource::new(format!("http://127.0.0.1:{port}/"), tmp.path());
		let err = source.download_latest_matching("1.9.0").await.unwrap_err();
		assert!(matches!(err, Error::ImageFetch(_)), "unexpected error: {err}");
		assert!(!source.artifact_path("1.9.0").exists());
	}

	#[test]
	fn url_joins_base_version_and_file() {
		let source = HttpOsImageSource::new("https://images.local/os/", "/tmp/cache");
		assert_eq!(source.url_for("2.0.1"), "https://images.local/os/2.0.1/os.zip");
	}
}
