//! Shared utilities.

pub mod deadline;
pub mod telemetry;

pub use deadline::Deadline;
pub use telemetry::init_tracing;
