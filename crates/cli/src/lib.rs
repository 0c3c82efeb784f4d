//! Command-line host for `mdeploy`.
//!
//! The binary wires the orchestration crate to real serial ports and a
//! terminal: `devices` drives the device picker, `deploy` runs the deploy
//! pipeline, and `debug` deploys and then bridges a debug session to a
//! loopback TCP endpoint.

pub mod cli;
pub mod commands;
pub mod context;
pub mod error;
pub mod logging;
pub mod output;
pub mod styles;
