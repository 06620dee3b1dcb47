//! Metrics recording.
//!
//! # Metrics
//! - `courier_requests_total` (counter): finished requests by `outcome`
//! - `courier_retries_total` (counter): scheduled retries
//! - `courier_tasks_created_total` (counter): transport tasks opened
//! - `courier_request_duration_seconds` (histogram): submit-to-finish latency
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; the embedding
//!   application installs whatever recorder/exporter it wants
//! - Wired in as an `EventMonitor`, so the lifecycle core has no metrics calls

use std::time::Duration;

use crate::error::RequestError;
use crate::observability::EventMonitor;
use crate::request::{RequestId, RequestState};
use crate::session::TaskId;

pub fn record_request(outcome: &'static str, elapsed: Duration) {
    metrics::counter!("courier_requests_total", "outcome" => outcome).increment(1);
    metrics::histogram!("courier_request_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_retry() {
    metrics::counter!("courier_retries_total").increment(1);
}

pub fn record_task_created() {
    metrics::counter!("courier_tasks_created_total").increment(1);
}

/// `EventMonitor` that records the courier metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsMonitor;

impl EventMonitor for MetricsMonitor {
    fn task_created(&self, _id: RequestId, _task: TaskId) {
        record_task_created();
    }

    fn retry_scheduled(&self, _id: RequestId, _retry_count: u32, _delay: Duration, _error: &RequestError) {
        record_retry();
    }

    fn request_finished(&self, _id: RequestId, state: RequestState, _error: Option<&RequestError>, elapsed: Duration) {
        record_request(state.as_str(), elapsed);
    }
}
