use std::path::PathBuf;
use std::sync::Arc;

use mdeploy::{DeployOrchestrator, DeployOutcome};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::cli::ProjectArgs;
use crate::context::{Context, resolve_project};
use crate::error::{CliError, Result};
use crate::output::{ConsoleSink, emit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DeployStatus {
	Deployed,
	NotApplicable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployReport {
	pub status: DeployStatus,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub device: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub os_version: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub os_image: Option<PathBuf>,
	/// Output moved to the application pane.
	pub committed: bool,
}

pub(super) async fn run(ctx: &Context, args: &ProjectArgs, no_commit: bool, cancel: CancellationToken) -> Result<()> {
	let orchestrator = ctx.deploy_orchestrator();
	let report = deploy(ctx, &orchestrator, args, !no_commit, cancel).await?;
	emit("deploy", report, ctx.format, |r| match r.status {
		DeployStatus::NotApplicable => "Nothing to deploy for this project".to_string(),
		DeployStatus::Deployed => String::new(),
	});
	Ok(())
}

/// Deploys the project and, when `commit` is set, hands output to the application pane.
pub(super) async fn deploy(
	ctx: &Context,
	orchestrator: &DeployOrchestrator,
	args: &ProjectArgs,
	commit: bool,
	cancel: CancellationToken,
) -> Result<DeployReport> {
	let project = resolve_project(args)?;
	let console = Arc::new(ConsoleSink::console(ctx.format));

	let outcome = orchestrator
		.deploy_project(&project, cancel, console)
		.await
		.map_err(CliError::Reported)?;

	match outcome {
		DeployOutcome::Deployed {
			device,
			os_version,
			os_image,
		} => {
			let committed = commit && orchestrator.commit(Arc::new(ConsoleSink::application(ctx.format)));
			Ok(DeployReport {
				status: DeployStatus::Deployed,
				device: Some(device.name),
				os_version,
				os_image,
				committed,
			})
		}
		DeployOutcome::NotApplicable => Ok(DeployReport {
			status: DeployStatus::NotApplicable,
			device: None,
			os_version: None,
			os_image: None,
			committed: false,
		}),
		DeployOutcome::Cancelled => Err(CliError::Cancelled),
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use mdeploy::BindingKind;
	use mdeploy::testing::{MockDriver, MockOsImageSource, StaticPortEnumerator};
	use tempfile::TempDir;

	use super::*;
	use crate::output::{ErrorCode, OutputFormat};

	struct Workspace {
		dir: TempDir,
		driver: MockDriver,
		ctx: Context,
	}

	impl Workspace {
		fn new(driver: MockDriver, ports: &[&str]) -> Self {
			let dir = TempDir::new().unwrap();
			std::fs::create_dir_all(dir.path().join("bin/Debug")).unwrap();
			std::fs::write(dir.path().join("bin/Debug/App.dll"), b"image").unwrap();
			let ctx = Context::new(
				OutputFormat::Json,
				dir.path().join("settings.json"),
				None,
				Arc::new(StaticPortEnumerator::new(ports)),
				Arc::new(driver.clone()),
				Arc::new(MockOsImageSource::new()),
			);
			Self { dir, driver, ctx }
		}

		fn project(&self) -> ProjectArgs {
			ProjectArgs {
				project_dir: Some(self.dir.path().to_path_buf()),
				..ProjectArgs::default()
			}
		}
	}

	#[tokio::test]
	async fn deploy_and_commit() {
		let ws = Workspace::new(MockDriver::new().with_os_version("3.1.0"), &["COM5"]);
		let orchestrator = ws.ctx.deploy_orchestrator();

		let report = deploy(&ws.ctx, &orchestrator, &ws.project(), true, CancellationToken::new())
			.await
			.unwrap();

		assert_eq!(report.status, DeployStatus::Deployed);
		assert_eq!(report.device.as_deref(), Some("COM5"));
		assert_eq!(report.os_version.as_deref(), Some("3.1.0"));
		assert!(report.committed);
		assert_eq!(ws.ctx.router().binding_kind(), BindingKind::Permanent);
		assert_eq!(ws.driver.transfers(), vec![ws.dir.path().join("bin/Debug/App.dll")]);
		assert_eq!(ws.ctx.settings().device_target, "COM5");
	}

	#[tokio::test]
	async fn no_commit_keeps_console_bound() {
		let ws = Workspace::new(MockDriver::new(), &["COM5"]);
		let orchestrator = ws.ctx.deploy_orchestrator();

		let report = deploy(&ws.ctx, &orchestrator, &ws.project(), false, CancellationToken::new())
			.await
			.unwrap();

		assert!(!report.committed);
		assert_eq!(ws.ctx.router().binding_kind(), BindingKind::Provisional);
	}

	#[tokio::test]
	async fn other_assembly_is_not_applicable() {
		let ws = Workspace::new(MockDriver::new(), &["COM5"]);
		let orchestrator = ws.ctx.deploy_orchestrator();
		let args = ProjectArgs {
			assembly_name: Some("Library".into()),
			..ws.project()
		};

		let report = deploy(&ws.ctx, &orchestrator, &args, true, CancellationToken::new())
			.await
			.unwrap();

		assert_eq!(report.status, DeployStatus::NotApplicable);
		assert!(ws.driver.opens().is_empty());
	}

	#[tokio::test]
	async fn pipeline_failure_is_reported() {
		let ws = Workspace::new(MockDriver::new(), &[]);
		let orchestrator = ws.ctx.deploy_orchestrator();

		let err = deploy(&ws.ctx, &orchestrator, &ws.project(), true, CancellationToken::new())
			.await
			.unwrap_err();

		assert!(err.is_reported());
		assert_eq!(err.to_command_error().code, ErrorCode::NoDeviceSelected);
	}

	#[tokio::test(start_paused = true)]
	async fn interrupted_deploy_is_cancelled() {
		let ws = Workspace::new(MockDriver::new().with_transfer_delay(Duration::from_secs(5)), &["COM5"]);
		let orchestrator = ws.ctx.deploy_orchestrator();
		let cancel = CancellationToken::new();
		let trigger = cancel.clone();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(100)).await;
			trigger.cancel();
		});

		let err = deploy(&ws.ctx, &orchestrator, &ws.project(), true, cancel)
			.await
			.unwrap_err();

		assert!(matches!(err, CliError::Cancelled));
		assert_eq!(ws.driver.live_handles(), 0);
	}
}
