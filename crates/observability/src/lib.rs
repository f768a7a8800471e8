//! Tracing and logging (shared process setup).

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use self::tracing::{init, TracingOptions};
