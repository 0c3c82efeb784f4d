use clap::Parser;
use mdeploy_cli::cli::Cli;
use mdeploy_cli::commands;
use mdeploy_cli::error::CliError;
use mdeploy_cli::logging;
use mdeploy_cli::output::{self, CommandResult, OutputFormat};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let format = cli.format;
	let command = cli.command.name();

	if let Err(err) = commands::dispatch(cli).await {
		let code = err.exit_code();
		handle_error(err, command, format);
		std::process::exit(code);
	}
}

fn handle_error(err: CliError, command: &str, format: OutputFormat) {
	let cmd_error = err.to_command_error();

	// The deploy pipeline has already written the failure to the console.
	if !err.is_reported() || format == OutputFormat::Json {
		output::print_error_stderr(&cmd_error);
	}

	if format == OutputFormat::Json {
		output::print_result(&CommandResult::<()>::failure(command, cmd_error));
	}
}
