use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;
use crate::styles::cli_styles;

#[derive(Parser, Debug)]
#[command(name = "mdeploy")]
#[command(about = "Deploy and debug applications on an attached serial device")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format
	#[arg(short = 'f', long, global = true, value_enum, default_value = "text")]
	pub format: OutputFormat,

	/// Settings file (defaults to the user config directory)
	#[arg(long, global = true, value_name = "FILE")]
	pub settings: Option<PathBuf>,

	/// Target this serial port instead of the remembered device
	#[arg(long, global = true, value_name = "PORT")]
	pub port: Option<String>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// List attached devices and manage the selected one
	#[command(subcommand)]
	Devices(DevicesAction),

	/// Transfer the project's build output to the device
	Deploy {
		#[command(flatten)]
		project: ProjectArgs,

		/// Keep output on the console instead of switching to the application pane
		#[arg(long)]
		no_commit: bool,
	},

	/// Deploy, then open a debug session bridged to a local TCP endpoint
	Debug {
		#[command(flatten)]
		project: ProjectArgs,

		/// Launch profile name
		#[arg(long, default_value = "Debug")]
		profile: String,

		/// Run without debugging
		#[arg(long)]
		no_debug: bool,

		/// Skip the deploy step
		#[arg(long)]
		skip_deploy: bool,
	},

	/// Inspect persisted settings
	#[command(subcommand)]
	Settings(SettingsAction),
}

impl Commands {
	/// Command name used in output envelopes.
	pub fn name(&self) -> &'static str {
		match self {
			Commands::Devices(DevicesAction::List) => "devices list",
			Commands::Devices(DevicesAction::Current) => "devices current",
			Commands::Devices(DevicesAction::Select { .. }) => "devices select",
			Commands::Deploy { .. } => "deploy",
			Commands::Debug { .. } => "debug",
			Commands::Settings(SettingsAction::Show) => "settings show",
			Commands::Settings(SettingsAction::Path) => "settings path",
		}
	}
}

#[derive(Subcommand, Debug)]
pub enum DevicesAction {
	/// List attached devices
	#[command(alias = "ls")]
	List,
	/// Show the device deploy and debug will target
	Current,
	/// Remember a device as the deploy target
	Select {
		/// Port name as shown by `devices list`
		port: String,
	},
}

#[derive(Subcommand, Debug)]
pub enum SettingsAction {
	/// Print the effective settings
	Show,
	/// Print the settings file location
	Path,
}

/// Overrides for the detected project.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ProjectArgs {
	/// Project directory (defaults to the nearest directory with mdeploy.json)
	#[arg(long, value_name = "DIR")]
	pub project_dir: Option<PathBuf>,

	/// Assembly name of the project being launched
	#[arg(long, value_name = "NAME")]
	pub assembly_name: Option<String>,

	/// Build output path relative to the project directory
	#[arg(long, value_name = "PATH")]
	pub output_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_global_flags_after_subcommand() {
		let cli = Cli::try_parse_from(["mdeploy", "deploy", "--port", "COM5", "-vv", "-f", "json"]).unwrap();
		assert_eq!(cli.port.as_deref(), Some("COM5"));
		assert_eq!(cli.verbose, 2);
		assert_eq!(cli.format, OutputFormat::Json);
		assert!(matches!(cli.command, Commands::Deploy { no_commit: false, .. }));
	}

	#[test]
	fn parses_device_selection() {
		let cli = Cli::try_parse_from(["mdeploy", "devices", "select", "COM7"]).unwrap();
		match cli.command {
			Commands::Devices(DevicesAction::Select { port }) => assert_eq!(port, "COM7"),
			other => panic!("unexpected command: {other:?}"),
		}
	}

	#[test]
	fn parses_debug_overrides() {
		let cli = Cli::try_parse_from([
			"mdeploy",
			"debug",
			"--no-debug",
			"--profile",
			"Release",
			"--assembly-name",
			"Blinky",
			"--output-path",
			"out",
		])
		.unwrap();
		match cli.command {
			Commands::Debug {
				project,
				profile,
				no_debug,
				skip_deploy,
			} => {
				assert!(no_debug);
				assert!(!skip_deploy);
				assert_eq!(profile, "Release");
				assert_eq!(project.assembly_name.as_deref(), Some("Blinky"));
				assert_eq!(project.output_path, Some(PathBuf::from("out")));
			}
			other => panic!("unexpected command: {other:?}"),
		}
	}

	#[test]
	fn command_names_match_the_invocation() {
		let cli = Cli::try_parse_from(["mdeploy", "devices", "ls"]).unwrap();
		assert_eq!(cli.command.name(), "devices list");
		let cli = Cli::try_parse_from(["mdeploy", "debug"]).unwrap();
		assert_eq!(cli.command.name(), "debug");
	}

	#[test]
	fn select_requires_a_port() {
		assert!(Cli::try_parse_from(["mdeploy", "devices", "select"]).is_err());
	}

	#[test]
	fn format_defaults_to_text() {
		let cli = Cli::try_parse_from(["mdeploy", "settings", "show"]).unwrap();
		assert_eq!(cli.format, OutputFormat::Text);
	}
}
