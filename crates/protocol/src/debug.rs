//! Debug session descriptor types handed to an external debug engine.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::device::DeviceIdentity;

/// Loopback port the debug engine connects to by default.
pub const DEFAULT_DEBUG_PORT: u16 = 55898;

/// Timeouts applied by the debug engine, in milliseconds.
///
/// A `socket_timeout_ms` of `0` means the socket never times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebuggingOptions {
	/// Expression evaluation timeout.
	pub evaluation_timeout_ms: u32,
	/// Member (property getter) evaluation timeout.
	pub member_evaluation_timeout_ms: u32,
	/// Variable modification timeout.
	pub modification_timeout_ms: u32,
	/// Debug socket timeout; `0` is unbounded.
	pub socket_timeout_ms: u32,
}

impl Default for DebuggingOptions {
	fn default() -> Self {
		Self {
			evaluation_timeout_ms: 10_000,
			member_evaluation_timeout_ms: 15_000,
			modification_timeout_ms: 10_000,
			socket_timeout_ms: 0,
		}
	}
}

impl DebuggingOptions {
	/// Returns `true` when socket operations never time out.
	pub fn socket_unbounded(&self) -> bool {
		self.socket_timeout_ms == 0
	}
}

/// Network endpoint of a debug transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugEndpoint {
	pub address: IpAddr,
	pub port: u16,
}

impl DebugEndpoint {
	/// Loopback endpoint on `port`.
	pub fn loopback(port: u16) -> Self {
		Self {
			address: IpAddr::V4(Ipv4Addr::LOCALHOST),
			port,
		}
	}

	pub fn socket_addr(&self) -> SocketAddr {
		SocketAddr::new(self.address, self.port)
	}
}

impl Default for DebugEndpoint {
	fn default() -> Self {
		Self::loopback(DEFAULT_DEBUG_PORT)
	}
}

impl From<SocketAddr> for DebugEndpoint {
	fn from(addr: SocketAddr) -> Self {
		Self {
			address: addr.ip(),
			port: addr.port(),
		}
	}
}

/// Everything a debug engine needs to attach to a device session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugSessionDescriptor {
	/// Monotonic id; a higher id supersedes every lower one.
	pub session_id: u64,
	/// Launch profile the session was created for.
	pub profile: String,
	/// Device the session is bound to.
	pub device: DeviceIdentity,
	/// Endpoint the engine connects to.
	pub endpoint: DebugEndpoint,
	/// Engine timeout configuration.
	pub options: DebuggingOptions,
}
