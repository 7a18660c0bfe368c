//! # Mailcast Core
//!
//! Shared error type and tracing initialisation used by every Mailcast crate.

pub mod error;
pub mod telemetry;

pub use error::*;
pub use telemetry::{init_tracing, TelemetryConfig};
