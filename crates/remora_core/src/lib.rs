//! Ambient infrastructure shared by remora processes.
//!
//! - [`telemetry`]: installs the `tracing` subscriber that renders the
//!   events every remora crate emits

pub mod telemetry;

pub use telemetry::{TracingConfig, TracingFormat};
