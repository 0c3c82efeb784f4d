//! Binary-level tests that need no attached device.

use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

fn mdeploy(dir: &Path, args: &[&str]) -> Output {
	Command::new(env!("CARGO_BIN_EXE_mdeploy"))
		.current_dir(dir)
		.env("XDG_CACHE_HOME", dir.join("cache"))
		.env_remove("RUST_LOG")
		.arg("--settings")
		.arg(dir.join("settings.json"))
		.args(args)
		.output()
		.expect("failed to execute mdeploy")
}

fn envelope(output: &Output) -> Value {
	let stdout = String::from_utf8_lossy(&output.stdout);
	serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("stdout is not a JSON envelope ({e}): {stdout}"))
}

fn stderr(output: &Output) -> String {
	String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn help_lists_commands() {
	let dir = TempDir::new().unwrap();
	let output = mdeploy(dir.path(), &["--help"]);

	assert!(output.status.success());
	let help = String::from_utf8_lossy(&output.stdout);
	for command in ["devices", "deploy", "debug", "settings"] {
		assert!(help.contains(command), "help is missing {command}: {help}");
	}
}

#[test]
fn unknown_command_is_a_usage_error() {
	let dir = TempDir::new().unwrap();
	let output = mdeploy(dir.path(), &["flash"]);

	assert_eq!(output.status.code(), Some(2));
}

#[test]
fn settings_show_defaults_when_file_is_missing() {
	let dir = TempDir::new().unwrap();
	let output = mdeploy(dir.path(), &["-f", "json", "settings", "show"]);

	assert!(output.status.success(), "stderr: {}", stderr(&output));
	let json = envelope(&output);
	assert_eq!(json["ok"], true);
	assert_eq!(json["command"], "settings show");
	assert_eq!(json["data"]["debugPort"], 55898);
	assert_eq!(json["data"]["deviceTarget"], "");
}

#[test]
fn settings_show_reads_the_settings_file() {
	let dir = TempDir::new().unwrap();
	std::fs::write(
		dir.path().join("settings.json"),
		r#"{ "deviceTarget": "COM7", "debugPort": 6000 }"#,
	)
	.unwrap();

	let output = mdeploy(dir.path(), &["settings", "show"]);

	assert!(output.status.success(), "stderr: {}", stderr(&output));
	let text = String::from_utf8_lossy(&output.stdout);
	assert!(text.contains("COM7"), "unexpected output: {text}");
	assert!(text.contains("6000"), "unexpected output: {text}");
}

#[test]
fn settings_path_reports_the_override() {
	let dir = TempDir::new().unwrap();
	let output = mdeploy(dir.path(), &["-f", "json", "settings", "path"]);

	let json = envelope(&output);
	assert_eq!(json["data"]["exists"], false);
	assert!(json["data"]["path"].as_str().unwrap().ends_with("settings.json"));
}

#[test]
fn selecting_an_unknown_device_fails() {
	let dir = TempDir::new().unwrap();
	let output = mdeploy(dir.path(), &["-f", "json", "devices", "select", "mdeploy-no-such-port"]);

	assert_eq!(output.status.code(), Some(1));
	let json = envelope(&output);
	assert_eq!(json["ok"], false);
	assert_eq!(json["command"], "devices select");
	assert!(stderr(&output).contains("Error ["));
	assert!(!dir.path().join("settings.json").exists());
}

#[test]
fn library_project_is_not_deployed() {
	let dir = TempDir::new().unwrap();
	std::fs::write(dir.path().join("mdeploy.json"), r#"{ "assemblyName": "Library" }"#).unwrap();

	let output = mdeploy(dir.path(), &["-f", "json", "deploy"]);

	assert!(output.status.success(), "stderr: {}", stderr(&output));
	let json = envelope(&output);
	assert_eq!(json["data"]["status"], "notApplicable");
	assert_eq!(json["data"]["committed"], false);
}

#[test]
fn failed_deploy_reports_reason_and_hint() {
	let dir = TempDir::new().unwrap();
	let output = mdeploy(
		dir.path(),
		&["-f", "json", "--port", "mdeploy-no-such-port", "deploy"],
	);

	assert_eq!(output.status.code(), Some(1));
	let json = envelope(&output);
	assert_eq!(json["ok"], false);
	let log = stderr(&output);
	assert!(log.contains("Deploy failed:"), "stderr: {log}");
	assert!(log.contains("Reset the device and try again."), "stderr: {log}");
}

#[test]
fn debug_of_library_project_skips_session_for_any_profile() {
	let dir = TempDir::new().unwrap();
	std::fs::write(dir.path().join("mdeploy.json"), r#"{ "assemblyName": "Library" }"#).unwrap();

	let output = mdeploy(dir.path(), &["-f", "json", "debug", "--profile", "Release"]);

	assert!(output.status.success(), "stderr: {}", stderr(&output));
	let json = envelope(&output);
	assert_eq!(json["command"], "debug");
	assert_eq!(json["data"]["deploy"]["status"], "notApplicable");
	assert!(json["data"].get("session").is_none());
}
