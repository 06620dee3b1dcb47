//! Per-request mutable state and the finish-exactly-once guard.
//!
//! # Responsibilities
//! - Own the request's state, live task binding, response, body and progress
//! - Fence events from tasks that are no longer live
//! - Deliver exactly one terminal outcome
//! - Cancel the transport task when the last handle is dropped

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Instant;

use bytes::{Bytes, BytesMut};

use crate::error::{RequestError, TransportError, TransportErrorKind};
use crate::http::{RequestDescriptor, ResponseHead};
use crate::interceptor::{Interceptor, RetryContext};
use crate::observability::EventMonitor;
use crate::policy::{CacheHandler, RedirectHandler};
use crate::request::delivery::{Completion, Delivery};
use crate::request::state::{Progress, RequestState};
use crate::request::validation::Validation;
use crate::request::RequestId;
use crate::security::CredentialProvider;
use crate::session::{SessionShared, TaskId};

/// Per-request overrides. Unset fields fall back to the session's defaults.
#[derive(Clone, Default)]
pub struct RequestOptions {
    pub interceptor: Option<Interceptor>,
    pub redirect_handler: Option<Arc<dyn RedirectHandler>>,
    pub cache_handler: Option<Arc<dyn CacheHandler>>,
    pub credential_provider: Option<Arc<dyn CredentialProvider>>,
    pub validation: Validation,
    /// Overrides the session's `start_requests_immediately`.
    pub start_immediately: Option<bool>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interceptor(mut self, interceptor: Interceptor) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    pub fn with_redirect_handler(mut self, handler: impl RedirectHandler + 'static) -> Self {
        self.redirect_handler = Some(Arc::new(handler));
        self
    }

    pub fn with_cache_handler(mut self, handler: impl CacheHandler + 'static) -> Self {
        self.cache_handler = Some(Arc::new(handler));
        self
    }

    pub fn with_credential_provider(mut self, provider: impl CredentialProvider + 'static) -> Self {
        self.credential_provider = Some(Arc::new(provider));
        self
    }

    pub fn with_validation(mut self, validation: Validation) -> Self {
        self.validation = validation;
        self
    }

    pub fn start_immediately(mut self, start: bool) -> Self {
        self.start_immediately = Some(start);
        self
    }
}

impl std::fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOptions")
            .field("interceptor", &self.interceptor)
            .field("redirect_handler", &self.redirect_handler.is_some())
            .field("cache_handler", &self.cache_handler.is_some())
            .field("credential_provider", &self.credential_provider.is_some())
            .field("validation", &self.validation)
            .field("start_immediately", &self.start_immediately)
            .finish()
    }
}

/// Snapshot taken when a task's completion is claimed.
#[derive(Debug)]
pub(crate) struct AttemptOutcome {
    pub response: Option<ResponseHead>,
    pub pending_error: Option<RequestError>,
    pub cancel_requested: bool,
}

struct MutableState {
    state: RequestState,
    /// Transport-bound descriptor of the current attempt.
    current: Option<RequestDescriptor>,
    task: Option<TaskId>,
    task_live: bool,
    response: Option<ResponseHead>,
    body: BytesMut,
    upload: Progress,
    download: Progress,
    retry_count: u32,
    pending_error: Option<RequestError>,
    cancel_requested: bool,
    /// Set once `finish` has decided the outcome; no transition may follow.
    finishing: bool,
    delivery: Option<Box<dyn Delivery>>,
}

pub(crate) struct RequestInner {
    id: RequestId,
    original: RequestDescriptor,
    pub(crate) interceptor: Interceptor,
    pub(crate) redirect_handler: Option<Arc<dyn RedirectHandler>>,
    pub(crate) cache_handler: Option<Arc<dyn CacheHandler>>,
    pub(crate) credential_provider: Option<Arc<dyn CredentialProvider>>,
    pub(crate) validation: Validation,
    monitor: Arc<dyn EventMonitor>,
    session: Weak<SessionShared>,
    created_at: Instant,
    finished: AtomicBool,
    state: Mutex<MutableState>,
}

impl RequestInner {
    pub(crate) fn new(
        original: RequestDescriptor,
        interceptor: Interceptor,
        options: RequestOptions,
        monitor: Arc<dyn EventMonitor>,
        session: Weak<SessionShared>,
        delivery: Box<dyn Delivery>,
    ) -> Self {
        Self {
            id: RequestId::new(),
            original,
            interceptor,
            redirect_handler: options.redirect_handler,
            cache_handler: options.cache_handler,
            credential_provider: options.credential_provider,
            validation: options.validation,
            monitor,
            session,
            created_at: Instant::now(),
            finished: AtomicBool::new(false),
            state: Mutex::new(MutableState {
                state: RequestState::Initialized,
                current: None,
                task: None,
                task_live: false,
                response: None,
                body: BytesMut::new(),
                upload: Progress::default(),
                download: Progress::default(),
                retry_count: 0,
                pending_error: None,
                cancel_requested: false,
                finishing: false,
                delivery: Some(delivery),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MutableState> {
        self.state.lock().expect("request state mutex poisoned")
    }

    pub(crate) fn id(&self) -> RequestId {
        self.id
    }

    pub(crate) fn original(&self) -> &RequestDescriptor {
        &self.original
    }

    pub(crate) fn monitor(&self) -> &Arc<dyn EventMonitor> {
        &self.monitor
    }

    pub(crate) fn state(&self) -> RequestState {
        self.lock().state
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub(crate) fn retry_count(&self) -> u32 {
        self.lock().retry_count
    }

    pub(crate) fn upload_progress(&self) -> Progress {
        self.lock().upload
    }

    pub(crate) fn download_progress(&self) -> Progress {
        self.lock().download
    }

    pub(crate) fn response(&self) -> Option<ResponseHead> {
        self.lock().response.clone()
    }

    /// Descriptor the current attempt was sent with, else the original.
    pub(crate) fn current_descriptor(&self) -> RequestDescriptor {
        self.lock()
            .current
            .clone()
            .unwrap_or_else(|| self.original.clone())
    }

    pub(crate) fn live_task(&self) -> Option<TaskId> {
        let st = self.lock();
        if st.task_live {
            st.task
        } else {
            None
        }
    }

    /// Most recently bound task, live or not.
    pub(crate) fn bound_task(&self) -> Option<TaskId> {
        self.lock().task
    }

    pub(crate) fn is_cancel_requested(&self) -> bool {
        self.lock().cancel_requested
    }

    /// Move to `next` if the state machine allows it.
    pub(crate) fn transition(&self, next: RequestState) -> bool {
        let from = {
            let mut st = self.lock();
            if st.cancel_requested || st.finishing || !st.state.can_transition_to(next) {
                return false;
            }
            mem::replace(&mut st.state, next)
        };
        tracing::debug!(request_id = %self.id, from = %from, to = %next, "Request state changed");
        self.monitor.state_changed(self.id, from, next);
        true
    }

    /// Bind a freshly created task as the live one and enter `Running`.
    ///
    /// Returns the superseded task, or `Err` if the request was cancelled or
    /// finished while the task was being created.
    pub(crate) fn bind_task(&self, task: TaskId, descriptor: RequestDescriptor) -> Result<Option<TaskId>, ()> {
        let (previous, from) = {
            let mut st = self.lock();
            if st.cancel_requested || st.finishing || !st.state.can_transition_to(RequestState::Running) {
                return Err(());
            }
            let previous = st.task.replace(task);
            st.task_live = true;
            st.current = Some(descriptor);
            (previous, mem::replace(&mut st.state, RequestState::Running))
        };
        tracing::debug!(request_id = %self.id, task = %task, "Task bound");
        self.monitor.state_changed(self.id, from, RequestState::Running);
        Ok(previous)
    }

    fn is_live(st: &MutableState, task: TaskId) -> bool {
        st.task_live && st.task == Some(task)
    }

    /// Record response headers. Returns `None` if `task` is not live,
    /// otherwise whether the response may proceed.
    pub(crate) fn record_response(&self, task: TaskId, head: ResponseHead) -> Option<bool> {
        let proceed = {
            let mut st = self.lock();
            if !Self::is_live(&st, task) {
                return None;
            }
            st.download = Progress {
                completed: 0,
                total: head.content_length(),
            };
            st.body.clear();
            if let Some(delivery) = st.delivery.as_mut() {
                delivery.on_response(&head);
            }
            st.response = Some(head.clone());
            !st.cancel_requested
        };
        self.monitor.response_received(self.id, &head);
        Some(proceed)
    }

    pub(crate) fn record_data(&self, task: TaskId, chunk: Bytes) -> bool {
        let mut st = self.lock();
        if !Self::is_live(&st, task) {
            return false;
        }
        st.download.completed += chunk.len() as u64;
        let buffers = st.delivery.as_ref().is_some_and(|d| d.buffers_body());
        if buffers {
            st.body.extend_from_slice(&chunk);
        } else if let Some(delivery) = st.delivery.as_mut() {
            delivery.on_data(&chunk);
        }
        true
    }

    pub(crate) fn record_upload(&self, task: TaskId, sent: u64, total: Option<u64>) -> bool {
        let mut st = self.lock();
        if !Self::is_live(&st, task) {
            return false;
        }
        st.upload = Progress { completed: sent, total };
        true
    }

    /// Remember an error that overrides the transport's own completion error.
    pub(crate) fn record_error(&self, task: TaskId, error: RequestError) -> bool {
        let mut st = self.lock();
        if !Self::is_live(&st, task) {
            return false;
        }
        st.pending_error.get_or_insert(error);
        true
    }

    /// Claim the completion of `task`. Only the first claim for the live
    /// task succeeds; later and superseded completions get `None`.
    pub(crate) fn claim_completion(&self, task: TaskId) -> Option<AttemptOutcome> {
        let mut st = self.lock();
        if !Self::is_live(&st, task) {
            return None;
        }
        st.task_live = false;
        Some(AttemptOutcome {
            response: st.response.clone(),
            pending_error: st.pending_error.take(),
            cancel_requested: st.cancel_requested,
        })
    }

    pub(crate) fn retry_context(&self) -> RetryContext {
        let st = self.lock();
        RetryContext {
            request_id: self.id,
            descriptor: st.current.clone().unwrap_or_else(|| self.original.clone()),
            response: st.response.clone(),
            retry_count: st.retry_count,
        }
    }

    /// Reset per-attempt state before the next attempt. Returns the new
    /// retry count, or `None` if the request must not continue.
    pub(crate) fn prepare_retry(&self) -> Option<u32> {
        let mut st = self.lock();
        if st.cancel_requested || st.finishing || st.state.is_terminal() {
            return None;
        }
        st.retry_count += 1;
        st.response = None;
        st.body.clear();
        st.upload = Progress::default();
        st.download = Progress::default();
        st.pending_error = None;
        let attempt = st.retry_count;
        if let Some(delivery) = st.delivery.as_mut() {
            delivery.on_restart(attempt);
        }
        Some(attempt)
    }

    /// Request cancellation. The terminal delivery happens when the
    /// transport acknowledges, or immediately if no task is live.
    pub(crate) fn cancel(&self) -> bool {
        let (from, live) = {
            let mut st = self.lock();
            if st.state.is_terminal() || st.cancel_requested || st.finishing {
                return false;
            }
            st.cancel_requested = true;
            let live = if st.task_live { st.task } else { None };
            (mem::replace(&mut st.state, RequestState::Cancelled), live)
        };
        tracing::debug!(request_id = %self.id, from = %from, "Request cancelled");
        self.monitor.state_changed(self.id, from, RequestState::Cancelled);

        match (live, self.session.upgrade()) {
            (Some(task), Some(session)) => session.transport().cancel(task),
            _ => {
                self.finish(Err(RequestError::Cancelled));
            }
        }
        true
    }

    pub(crate) fn pause(&self) -> bool {
        let task = {
            let mut st = self.lock();
            if st.state != RequestState::Running || !st.task_live || st.finishing {
                return false;
            }
            st.state = RequestState::Suspended;
            st.task
        };
        self.monitor
            .state_changed(self.id, RequestState::Running, RequestState::Suspended);
        if let (Some(task), Some(session)) = (task, self.session.upgrade()) {
            session.transport().pause(task);
        }
        true
    }

    /// Resume a suspended request, or start one that was never started.
    pub(crate) fn resume(self: &Arc<Self>) -> bool {
        let Some(session) = self.session.upgrade() else {
            return false;
        };
        let (from, task) = {
            let mut st = self.lock();
            if st.finishing {
                return false;
            }
            match st.state {
                RequestState::Suspended if st.task_live => {
                    st.state = RequestState::Running;
                    (RequestState::Suspended, st.task)
                }
                RequestState::Initialized => (RequestState::Initialized, None),
                _ => return false,
            }
        };

        match (from, task) {
            (RequestState::Suspended, Some(task)) => {
                self.monitor
                    .state_changed(self.id, RequestState::Suspended, RequestState::Running);
                session.transport().resume(task);
                true
            }
            _ => session.start(Arc::clone(self)),
        }
    }

    /// Enter the terminal state and deliver. Safe under concurrent calls:
    /// only the first caller delivers.
    pub(crate) fn finish(&self, result: Result<(), RequestError>) -> bool {
        if self
            .finished
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let elapsed = self.created_at.elapsed();
        let (delivery, completion, from, task) = {
            let mut st = self.lock();
            st.finishing = true;
            let result = if st.cancel_requested {
                Err(RequestError::Cancelled)
            } else {
                result
            };
            let completion = match (result, st.response.clone()) {
                (Ok(()), Some(head)) => Ok(Completion {
                    head,
                    body: mem::take(&mut st.body).freeze(),
                    request: st.current.clone().unwrap_or_else(|| self.original.clone()),
                    retry_count: st.retry_count,
                    elapsed,
                }),
                (Ok(()), None) => Err(RequestError::from(TransportError::new(
                    TransportErrorKind::Other,
                    "task completed without a response",
                ))),
                (Err(error), _) => Err(error),
            };
            st.task_live = false;
            (st.delivery.take(), completion, st.state, st.task.take())
        };

        let mut delivery = delivery;
        let outcome = match delivery.as_mut() {
            Some(d) => d.settle(completion),
            None => completion.map(|_| ()),
        };
        let terminal = match &outcome {
            Ok(()) => RequestState::Succeeded,
            Err(RequestError::Cancelled) => RequestState::Cancelled,
            Err(_) => RequestState::Failed,
        };
        self.lock().state = terminal;

        match &outcome {
            Ok(()) => tracing::debug!(request_id = %self.id, state = %terminal, "Request finished"),
            Err(error) => tracing::warn!(
                request_id = %self.id,
                state = %terminal,
                kind = %error.kind(),
                error = %error,
                "Request failed"
            ),
        }
        if from != terminal {
            self.monitor.state_changed(self.id, from, terminal);
        }
        self.monitor
            .request_finished(self.id, terminal, outcome.as_ref().err(), elapsed);

        if let Some(session) = self.session.upgrade() {
            session.router().unregister_request(self.id, task);
        }
        if let Some(delivery) = delivery {
            delivery.deliver();
        }
        true
    }
}

impl Drop for RequestInner {
    fn drop(&mut self) {
        if *self.finished.get_mut() {
            return;
        }
        let st = self
            .state
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let task = st.task;
        let live = st.task_live;

        tracing::debug!(request_id = %self.id, "Request dropped before finishing");
        if let Some(session) = self.session.upgrade() {
            if let (true, Some(task)) = (live, task) {
                session.transport().cancel(task);
            }
            session.router().unregister_request(self.id, task);
        }
    }
}
