//! Typed lifecycle event hooks.
//!
//! # Design Decisions
//! - Every hook has a no-op default so monitors implement only what they need
//! - Monitors are registered when the session is built; `CompositeMonitor`
//!   fans out to all of them in registration order
//! - Hooks run on whichever thread produced the event and must not block

use std::sync::Arc;
use std::time::Duration;

use crate::error::RequestError;
use crate::http::{RequestDescriptor, ResponseHead};
use crate::request::{RequestId, RequestState};
use crate::security::{AuthMethod, ChallengeDisposition};
use crate::session::TaskId;

/// Observer of request and session lifecycle events.
pub trait EventMonitor: Send + Sync {
    fn request_created(&self, _id: RequestId, _descriptor: &RequestDescriptor) {}

    fn state_changed(&self, _id: RequestId, _from: RequestState, _to: RequestState) {}

    fn request_adapted(&self, _id: RequestId, _descriptor: &RequestDescriptor) {}

    fn adaptation_failed(&self, _id: RequestId, _error: &RequestError) {}

    fn task_created(&self, _id: RequestId, _task: TaskId) {}

    fn response_received(&self, _id: RequestId, _head: &ResponseHead) {}

    fn challenge_resolved(&self, _id: RequestId, _method: &AuthMethod, _disposition: &ChallengeDisposition) {}

    fn redirect_decided(&self, _id: RequestId, _follow: bool) {}

    fn cache_decided(&self, _id: RequestId, _store: bool) {}

    fn retry_scheduled(&self, _id: RequestId, _retry_count: u32, _delay: Duration, _error: &RequestError) {}

    fn request_finished(&self, _id: RequestId, _state: RequestState, _error: Option<&RequestError>, _elapsed: Duration) {}

    fn session_invalidated(&self, _session: &str, _outstanding: usize) {}
}

/// Fan-out to several monitors.
#[derive(Clone, Default)]
pub struct CompositeMonitor {
    monitors: Vec<Arc<dyn EventMonitor>>,
}

impl CompositeMonitor {
    pub fn new(monitors: Vec<Arc<dyn EventMonitor>>) -> Self {
        Self { monitors }
    }

    pub fn push(&mut self, monitor: Arc<dyn EventMonitor>) {
        self.monitors.push(monitor);
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }
}

impl EventMonitor for CompositeMonitor {
    fn request_created(&self, id: RequestId, descriptor: &RequestDescriptor) {
        self.monitors.iter().for_each(|m| m.request_created(id, descriptor));
    }

    fn state_changed(&self, id: RequestId, from: RequestState, to: RequestState) {
        self.monitors.iter().for_each(|m| m.state_changed(id, from, to));
    }

    fn request_adapted(&self, id: RequestId, descriptor: &RequestDescriptor) {
        self.monitors.iter().for_each(|m| m.request_adapted(id, descriptor));
    }

    fn adaptation_failed(&self, id: RequestId, error: &RequestError) {
        self.monitors.iter().for_each(|m| m.adaptation_failed(id, error));
    }

    fn task_created(&self, id: RequestId, task: TaskId) {
        self.monitors.iter().for_each(|m| m.task_created(id, task));
    }

    fn response_received(&self, id: RequestId, head: &ResponseHead) {
        self.monitors.iter().for_each(|m| m.response_received(id, head));
    }

    fn challenge_resolved(&self, id: RequestId, method: &AuthMethod, disposition: &ChallengeDisposition) {
        self.monitors
            .iter()
            .for_each(|m| m.challenge_resolved(id, method, disposition));
    }

    fn redirect_decided(&self, id: RequestId, follow: bool) {
        self.monitors.iter().for_each(|m| m.redirect_decided(id, follow));
    }

    fn cache_decided(&self, id: RequestId, store: bool) {
        self.monitors.iter().for_each(|m| m.cache_decided(id, store));
    }

    fn retry_scheduled(&self, id: RequestId, retry_count: u32, delay: Duration, error: &RequestError) {
        self.monitors
            .iter()
            .for_each(|m| m.retry_scheduled(id, retry_count, delay, error));
    }

    fn request_finished(&self, id: RequestId, state: RequestState, error: Option<&RequestError>, elapsed: Duration) {
        self.monitors
            .iter()
            .for_each(|m| m.request_finished(id, state, error, elapsed));
    }

    fn session_invalidated(&self, session: &str, outstanding: usize) {
        self.monitors
            .iter()
            .for_each(|m| m.session_invalidated(session, outstanding));
    }
}
