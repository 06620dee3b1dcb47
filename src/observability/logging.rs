//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber for the binary
//! - Provide a logging `EventMonitor` for lifecycle events
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level
//! - The library only emits events; installing a subscriber is the
//!   application's choice

use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::RequestError;
use crate::http::ResponseHead;
use crate::observability::EventMonitor;
use crate::request::{RequestId, RequestState};

/// Install a fmt subscriber filtered by `RUST_LOG` or `default_level`.
///
/// Returns false if a global subscriber was already set.
pub fn init_logging(default_level: &str) -> bool {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("courier={default_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .is_ok()
}

/// Logs request lifecycle milestones at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMonitor;

impl EventMonitor for LoggingMonitor {
    fn response_received(&self, id: RequestId, head: &ResponseHead) {
        tracing::info!(request_id = %id, status = head.status, url = %head.url, "Response received");
    }

    fn request_finished(&self, id: RequestId, state: RequestState, error: Option<&RequestError>, elapsed: Duration) {
        match error {
            Some(error) => tracing::info!(
                request_id = %id,
                state = %state,
                kind = %error.kind(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Request finished"
            ),
            None => tracing::info!(
                request_id = %id,
                state = %state,
                elapsed_ms = elapsed.as_millis() as u64,
                "Request finished"
            ),
        }
    }
}
