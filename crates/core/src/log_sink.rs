//! Redirectable user-facing output.
//!
//! [`LogSinkRouter`] holds at most one destination. Operations can start
//! logging into a provisional sink (a console, a buffer) before the permanent
//! output pane exists, and the pane takes over later without either sink
//! seeing the other's lines.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

/// Destination for user-facing output lines.
pub trait LogSink: Send + Sync {
	fn write_line(&self, line: &str);

	/// Called once when the router unbinds this sink.
	fn on_disconnect(&self) {}
}

/// A permanent output surface owned by the host.
pub trait OutputPane: LogSink {
	/// Brings the pane to the foreground.
	fn activate(&self);

	/// Removes previous output.
	fn clear(&self);
}

/// Kind of destination currently bound to a [`LogSinkRouter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
	None,
	Provisional,
	Permanent,
}

#[derive(Default)]
enum LogSinkBinding {
	#[default]
	None,
	Provisional(Arc<dyn LogSink>),
	Permanent(Arc<dyn LogSink>),
}

impl LogSinkBinding {
	fn sink(&self) -> Option<&Arc<dyn LogSink>> {
		match self {
			LogSinkBinding::None => None,
			LogSinkBinding::Provisional(sink) | LogSinkBinding::Permanent(sink) => Some(sink),
		}
	}

	fn kind(&self) -> BindingKind {
		match self {
			LogSinkBinding::None => BindingKind::None,
			LogSinkBinding::Provisional(_) => BindingKind::Provisional,
			LogSinkBinding::Permanent(_) => BindingKind::Permanent,
		}
	}
}

/// Routes log lines to the one currently bound sink.
///
/// Writes happen under the binding lock, so a line is delivered to exactly
/// the sink that was bound when [`log`](Self::log) was called and is visible
/// there once `log` returns.
#[derive(Default)]
pub struct LogSinkRouter {
	binding: Mutex<LogSinkBinding>,
}

impl LogSinkRouter {
	pub fn new() -> Self {
		Self::default()
	}

	/// Binds a temporary sink, replacing whatever was bound.
	pub fn connect_provisional(&self, sink: Arc<dyn LogSink>) {
		self.replace(LogSinkBinding::Provisional(sink));
	}

	/// Binds the permanent output pane, replacing whatever was bound.
	pub fn connect_permanent(&self, sink: Arc<dyn LogSink>) {
		self.replace(LogSinkBinding::Permanent(sink));
	}

	/// Unbinds the current sink. Safe to call when nothing is bound.
	pub fn disconnect(&self) {
		self.replace(LogSinkBinding::None);
	}

	pub fn binding_kind(&self) -> BindingKind {
		self.binding.lock().kind()
	}

	/// Writes `message` to the bound sink, or drops it when none is bound.
	pub fn log(&self, message: &str) {
		debug!(target = "mdeploy.output", "{message}");
		let binding = self.binding.lock();
		if let Some(sink) = binding.sink() {
			sink.write_line(message);
		}
	}

	fn replace(&self, next: LogSinkBinding) {
		let mut binding = self.binding.lock();
		let previous = std::mem::replace(&mut *binding, next);
		if let Some(sink) = previous.sink() {
			sink.on_disconnect();
		}
		debug!(target = "mdeploy.output", from = ?previous.kind(), to = ?binding.kind(), "log sink rebound");
	}
}

impl std::fmt::Debug for LogSinkRouter {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LogSinkRouter").field("binding", &self.binding_kind()).finish()
	}
}
