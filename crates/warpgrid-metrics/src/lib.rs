//! warpgrid-metrics — observability for WarpGrid node lifecycle.
//!
//! Counts node terminations by the reason that triggered them and provides
//! Prometheus-compatible text exposition.
//!
//! # Architecture
//!
//! ```text
//! TerminationMetrics
//!   ├── inc(reason)   ← called once per triggered node deletion
//!   └── snapshot()    → Vec<(TerminationReason, u64)>
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod collector;
pub mod prometheus;

pub use collector::{TerminationMetrics, TerminationReason};
pub use prometheus::render_prometheus;
