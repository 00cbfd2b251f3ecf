//! Observability for the record store
//!
//! - Structured logging (JSON, one line per event)
//! - Operational counters (exact, monotonic)
//!
//! # Principles
//!
//! 1. Observability is read-only: no side effects on store behavior
//! 2. No async or background threads
//! 3. Deterministic output (sorted fields, exact counter values)
//! 4. A logging failure never fails a store operation

mod logger;
mod metrics;

pub use logger::{Logger, Severity};
pub use metrics::{MetricsSnapshot, StoreMetrics};
