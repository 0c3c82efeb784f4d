use mdeploy::{DebugSessionCoordinator, DebugSessionDescriptor, LaunchOptions};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::deploy::{DeployReport, DeployStatus, deploy};
use crate::cli::ProjectArgs;
use crate::context::Context;
use crate::error::Result;
use crate::output::emit;

#[derive(Debug, Clone)]
pub(super) struct DebugOptions {
	pub profile: String,
	pub no_debug: bool,
	pub skip_deploy: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DebugReport {
	#[serde(skip_serializing_if = "Option::is_none")]
	deploy: Option<DeployReport>,
	/// Absent for a no-debug launch or when no device is attached.
	#[serde(skip_serializing_if = "Option::is_none")]
	session: Option<DebugSessionDescriptor>,
}

pub(super) async fn run(ctx: &Context, args: &ProjectArgs, options: DebugOptions, cancel: CancellationToken) -> Result<()> {
	let coordinator = ctx.debug_coordinator();
	let result = launch(ctx, &coordinator, args, &options, cancel.clone()).await;
	let report = match result {
		Ok(report) => report,
		Err(err) => {
			coordinator.teardown().await;
			return Err(err);
		}
	};

	let active = report.session.is_some();
	emit("debug", report, ctx.format, render);
	if !active {
		return Ok(());
	}

	tokio::select! {
		result = coordinator.wait() => result?,
		_ = cancel.cancelled() => {
			info!(target = "mdeploy.cli", "ending debug session");
			coordinator.teardown().await;
		}
	}
	Ok(())
}

/// Deploys unless skipped, then prepares and starts the debug session.
async fn launch(
	ctx: &Context,
	coordinator: &DebugSessionCoordinator,
	args: &ProjectArgs,
	options: &DebugOptions,
	cancel: CancellationToken,
) -> Result<DebugReport> {
	let deploy_report = if options.skip_deploy {
		None
	} else {
		let orchestrator = ctx.deploy_orchestrator();
		let report = deploy(ctx, &orchestrator, args, true, cancel).await?;
		if report.status == DeployStatus::NotApplicable {
			return Ok(DebugReport {
				deploy: Some(report),
				session: None,
			});
		}
		Some(report)
	};

	coordinator.on_before_launch();
	let launch_options = LaunchOptions {
		no_debug: options.no_debug,
	};
	let session = coordinator.launch_targets(launch_options, &options.profile).await?;
	if session.is_some() {
		coordinator.on_after_launch().await?;
	}

	Ok(DebugReport {
		deploy: deploy_report,
		session,
	})
}

fn render(report: &DebugReport) -> String {
	match &report.session {
		Some(session) => format!(
			"Debug session {} on {}: attach a debugger to {} (Ctrl-C to stop)",
			session.session_id,
			session.device,
			session.endpoint.socket_addr()
		),
		None => match &report.deploy {
			Some(deploy) if deploy.status == DeployStatus::NotApplicable => String::new(),
			_ => "No debug session started".to_string(),
		},
	}
}
