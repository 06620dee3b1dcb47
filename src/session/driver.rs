//! Drives a request through its attempts.
//!
//! # Data Flow
//! ```text
//! start ─→ Adapting ─→ adapt() ─→ Ready ─→ create_task ─→ rebind ─→ Running ─→ start
//!                         │ fatal                │ error
//!                         ↓                      ↓
//!                       finish            fail_attempt ─→ retrier ─→ sleep ─→ Adapting …
//!                                                                └─→ finish
//! ```
//!
//! # Design Decisions
//! - No transport task is created before adaptation completes
//! - Pre-flight failures are final; only attempt failures reach the retrier
//! - The driver holds the request only while it is working on it; during
//!   back-off it keeps a weak reference so dropped handles still cancel

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};

use crate::codec::encoding::apply_parameters;
use crate::error::{RequestError, TransportError, TransportErrorKind};
use crate::http::RequestDescriptor;
use crate::interceptor::AdaptContext;
use crate::request::inner::RequestInner;
use crate::request::validation::validate_descriptor;
use crate::request::RequestState;
use crate::session::shared::SessionShared;
use crate::session::{TaskId, TransportEvents};

/// Run one attempt. The request must already be in `Adapting`.
pub(crate) fn run_attempt(session: Arc<SessionShared>, request: Arc<RequestInner>) -> BoxFuture<'static, ()> {
    async move {
        if session.is_invalidated() {
            request.finish(Err(RequestError::SessionInvalidated));
            return;
        }

        let descriptor = match adapt(&session, &request).await {
            Ok(descriptor) => descriptor,
            Err(error) => {
                request.finish(Err(error));
                return;
            }
        };

        if !request.transition(RequestState::Ready) {
            request.finish(Err(RequestError::Cancelled));
            return;
        }
        if session.is_invalidated() {
            request.finish(Err(RequestError::SessionInvalidated));
            return;
        }

        let events = TransportEvents::new(Arc::downgrade(&session));
        let task = match session.transport().create_task(&descriptor, events) {
            Ok(task) => task,
            Err(error) => {
                tracing::warn!(request_id = %request.id(), error = %error, "Task creation failed");
                fail_attempt(session, request, RequestError::from(error));
                return;
            }
        };

        // Route first so no event for the new task can be missed.
        session.router().rebind(request.bound_task(), task, &request);
        if request.bind_task(task, descriptor).is_err() {
            session.router().unregister(task);
            session.transport().cancel(task);
            request.finish(Err(RequestError::Cancelled));
            return;
        }

        tracing::debug!(
            request_id = %request.id(),
            task = %task,
            retry_count = request.retry_count(),
            "Task created"
        );
        request.monitor().task_created(request.id(), task);
        session.transport().start(task);
    }
    .boxed()
}

/// The adapting stage: defaults, URL resolution, parameter encoding,
/// interceptor adapters and pre-flight validation.
async fn adapt(session: &SessionShared, request: &RequestInner) -> Result<RequestDescriptor, RequestError> {
    let mut descriptor = request.original().clone();
    if descriptor.timeout().is_none() {
        if let Some(timeout) = session.default_timeout() {
            descriptor = descriptor.with_timeout(timeout);
        }
    }

    let url = descriptor.resolve_url()?;
    let descriptor = apply_parameters(descriptor, &url)?;

    let context = AdaptContext {
        session: session.label().to_string(),
        request_id: request.id(),
        retry_count: request.retry_count(),
    };
    let descriptor = match request.interceptor.adapt(descriptor, &context).await {
        Ok(descriptor) => descriptor,
        Err(error) => {
            tracing::warn!(request_id = %request.id(), error = %error, "Adaptation failed");
            request.monitor().adaptation_failed(request.id(), &error);
            return Err(error);
        }
    };

    descriptor.resolve_url()?;
    validate_descriptor(&descriptor)?;

    request.monitor().request_adapted(request.id(), &descriptor);
    Ok(descriptor)
}

/// Handle a claimed completion of `task`.
pub(crate) fn complete_attempt(
    session: Arc<SessionShared>,
    request: Arc<RequestInner>,
    task: TaskId,
    error: Option<TransportError>,
) {
    let Some(outcome) = request.claim_completion(task) else {
        tracing::trace!(request_id = %request.id(), task = %task, "Ignored completion of non-live task");
        return;
    };
    if outcome.cancel_requested {
        request.finish(Err(RequestError::Cancelled));
        return;
    }

    let result = match (outcome.pending_error, error, outcome.response) {
        (Some(pending), _, _) => Err(pending),
        (None, Some(error), _) => Err(RequestError::from(error)),
        (None, None, None) => Err(RequestError::from(TransportError::new(
            TransportErrorKind::Other,
            "task completed without a response",
        ))),
        (None, None, Some(head)) => request.validation.validate(&head).map_err(RequestError::from),
    };

    match result {
        Ok(()) => {
            request.finish(Ok(()));
        }
        Err(error) => fail_attempt(session, request, error),
    }
}

/// Finish fatal failures now; hand everything else to the retrier.
pub(crate) fn fail_attempt(session: Arc<SessionShared>, request: Arc<RequestInner>, error: RequestError) {
    if request.is_cancel_requested() {
        request.finish(Err(RequestError::Cancelled));
        return;
    }
    if error.kind().is_fatal() {
        request.finish(Err(error));
        return;
    }
    let runtime = session.runtime().clone();
    runtime.spawn(retry_or_finish(session, request, error));
}

fn retry_or_finish(session: Arc<SessionShared>, request: Arc<RequestInner>, error: RequestError) -> BoxFuture<'static, ()> {
    async move {
        let context = request.retry_context();
        let decision = request.interceptor.retry(&context, &error).await;
        let Some(delay) = decision.delay() else {
            request.finish(Err(error));
            return;
        };

        let next = context.retry_count + 1;
        tracing::info!(
            request_id = %request.id(),
            retry = next,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Retrying request"
        );
        request
            .monitor()
            .retry_scheduled(request.id(), next, delay, &error);

        let request = if delay.is_zero() {
            request
        } else {
            let weak = Arc::downgrade(&request);
            drop(request);
            tokio::time::sleep(delay).await;
            match weak.upgrade() {
                Some(request) => request,
                None => return,
            }
        };

        if request.prepare_retry().is_none() || !request.transition(RequestState::Adapting) {
            request.finish(Err(RequestError::Cancelled));
            return;
        }
        run_attempt(session, request).await;
    }
    .boxed()
}
