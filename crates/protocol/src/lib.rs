//! Wire and descriptor types for mdeploy.
//!
//! This crate holds the serde-serializable shapes exchanged between the host
//! and an attached device, plus the descriptors handed to an external debug
//! engine. Types here are:
//! - **Pure data**: No behavior beyond serialization and small constructors
//! - **Stable**: Changes only when the device protocol or descriptor format changes
//!
//! Transport, lifecycle and orchestration live in `mdeploy-runtime` and `mdeploy`.

pub mod debug;
pub mod device;
pub mod frame;

pub use debug::*;
pub use device::*;
pub use frame::*;
