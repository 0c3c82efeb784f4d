mod debug;
mod deploy;
mod devices;
mod settings;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::{Cli, Commands};
use crate::context::Context;
use crate::error::Result;

pub use deploy::DeployReport;

pub async fn dispatch(cli: Cli) -> Result<()> {
	let ctx = Context::from_cli(&cli);
	execute(&ctx, cli.command).await
}

pub async fn execute(ctx: &Context, command: Commands) -> Result<()> {
	match command {
		Commands::Devices(action) => devices::run(ctx, action),
		Commands::Settings(action) => settings::run(ctx, action),
		Commands::Deploy { project, no_commit } => deploy::run(ctx, &project, no_commit, cancel_on_ctrl_c()).await,
		Commands::Debug {
			project,
			profile,
			no_debug,
			skip_deploy,
		} => {
			let options = debug::DebugOptions {
				profile,
				no_debug,
				skip_deploy,
			};
			debug::run(ctx, &project, options, cancel_on_ctrl_c()).await
		}
	}
}

/// Token cancelled by the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
	let token = CancellationToken::new();
	let cancel = token.clone();
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			info!(target = "mdeploy.cli", "interrupt received");
			cancel.cancel();
		}
	});
	token
}
