//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request lifecycle and session events:
//!     → monitor.rs (EventMonitor hooks, CompositeMonitor fan-out)
//!         → logging.rs (LoggingMonitor: structured log lines)
//!         → metrics.rs (MetricsMonitor: counters, histograms)
//!
//! Internals also log directly through `tracing` (debug/trace detail).
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every log line as `request_id`
//! - Metrics are cheap (facade increments, no-op without a recorder)

pub mod logging;
pub mod metrics;
pub mod monitor;

pub use logging::{init_logging, LoggingMonitor};
pub use metrics::MetricsMonitor;
pub use monitor::{CompositeMonitor, EventMonitor};
