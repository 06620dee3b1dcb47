//! Transport callback entry points.
//!
//! # Responsibilities
//! - Route every transport event to the request owning the task
//! - Resolve challenges, redirects and cache proposals with the request's
//!   policy, else the session's, else the built-in default
//! - Hand completions to the driver
//!
//! # Design Decisions
//! - Holds a weak reference to the session; once the session is gone or
//!   invalidated every event is a no-op and every decision is the most
//!   conservative one
//! - Events from superseded tasks are dropped by the request's own fence

use std::sync::{Arc, Weak};

use bytes::Bytes;

use crate::error::{RequestError, TransportError};
use crate::http::{RequestDescriptor, ResponseHead};
use crate::policy::{CacheDisposition, CachedResponse, RedirectDisposition};
use crate::request::inner::RequestInner;
use crate::security::{Challenge, ChallengeCompletion, ChallengeDisposition, Credential, TrustError};
use crate::session::shared::SessionShared;
use crate::session::{driver, TaskId};

/// Answer to response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDisposition {
    Allow,
    Cancel,
}

/// Callback sink handed to a transport with every task it creates.
#[derive(Clone)]
pub struct TransportEvents {
    session: Weak<SessionShared>,
}

impl TransportEvents {
    pub(crate) fn new(session: Weak<SessionShared>) -> Self {
        Self { session }
    }

    /// Events that go nowhere. Useful when driving a transport directly.
    pub fn detached() -> Self {
        Self {
            session: Weak::new(),
        }
    }

    fn route(&self, task: TaskId) -> Option<(Arc<SessionShared>, Arc<RequestInner>)> {
        let session = self.session.upgrade()?;
        if session.is_invalidated() {
            return None;
        }
        let request = session.router().lookup(task)?;
        Some((session, request))
    }

    pub fn response_received(&self, task: TaskId, head: ResponseHead) -> ResponseDisposition {
        let Some((_, request)) = self.route(task) else {
            return ResponseDisposition::Cancel;
        };
        tracing::debug!(request_id = %request.id(), task = %task, status = head.status, "Response head received");
        match request.record_response(task, head) {
            Some(true) => ResponseDisposition::Allow,
            _ => ResponseDisposition::Cancel,
        }
    }

    pub fn data_received(&self, task: TaskId, chunk: Bytes) {
        if let Some((_, request)) = self.route(task) {
            if !request.record_data(task, chunk) {
                tracing::trace!(request_id = %request.id(), task = %task, "Dropped data from superseded task");
            }
        }
    }

    pub fn bytes_sent(&self, task: TaskId, sent: u64, total: Option<u64>) {
        if let Some((_, request)) = self.route(task) {
            request.record_upload(task, sent, total);
        }
    }

    /// Resolve a challenge and answer through `completion` exactly once.
    pub fn challenge_received(&self, task: TaskId, challenge: Challenge, completion: ChallengeCompletion) {
        let Some((session, request)) = self.route(task) else {
            completion(ChallengeDisposition::CancelChallenge);
            return;
        };

        let method = challenge.space.method.clone();
        let disposition = if method.is_server_trust() {
            resolve_server_trust(&session, &request, task, challenge)
        } else {
            resolve_credential(&session, &request, challenge)
        };

        tracing::debug!(
            request_id = %request.id(),
            task = %task,
            method = ?method,
            disposition = ?disposition,
            "Challenge resolved"
        );
        request
            .monitor()
            .challenge_resolved(request.id(), &method, &disposition);
        completion(disposition);
    }

    pub fn redirect_proposed(&self, task: TaskId, proposed: RequestDescriptor, response: &ResponseHead) -> RedirectDisposition {
        let Some((session, request)) = self.route(task) else {
            return RedirectDisposition::DoNotFollow;
        };
        if request.live_task() != Some(task) {
            return RedirectDisposition::DoNotFollow;
        }

        let handler = request
            .redirect_handler
            .clone()
            .or_else(|| session.redirect_handler());
        let disposition = match handler {
            Some(handler) => handler.redirect(proposed, response),
            None => RedirectDisposition::Follow(proposed),
        };

        let follow = matches!(disposition, RedirectDisposition::Follow(_));
        tracing::debug!(request_id = %request.id(), task = %task, status = response.status, follow, "Redirect decided");
        request.monitor().redirect_decided(request.id(), follow);
        disposition
    }

    pub fn cache_storage_proposed(&self, task: TaskId, proposed: CachedResponse) -> CacheDisposition {
        let Some((session, request)) = self.route(task) else {
            return CacheDisposition::DoNotStore;
        };
        if request.live_task() != Some(task) {
            return CacheDisposition::DoNotStore;
        }

        let descriptor = request.current_descriptor();
        let handler = request
            .cache_handler
            .clone()
            .or_else(|| session.cache_handler());
        let disposition = match handler {
            Some(handler) => handler.cache(proposed, &descriptor),
            None => CacheDisposition::Store(proposed),
        };

        tracing::debug!(request_id = %request.id(), task = %task, store = disposition.is_store(), "Cache storage decided");
        request
            .monitor()
            .cache_decided(request.id(), disposition.is_store());
        disposition
    }

    pub fn task_completed(&self, task: TaskId, error: Option<TransportError>) {
        let Some((session, request)) = self.route(task) else {
            return;
        };
        driver::complete_attempt(session, request, task, error);
    }
}

impl std::fmt::Debug for TransportEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportEvents")
            .field("attached", &(self.session.strong_count() > 0))
            .finish()
    }
}

fn resolve_server_trust(
    session: &SessionShared,
    request: &RequestInner,
    task: TaskId,
    challenge: Challenge,
) -> ChallengeDisposition {
    let host = challenge.space.host.clone();
    let verdict = session.trust().evaluator_for(&host).and_then(|evaluator| {
        let Some(evaluator) = evaluator else {
            return Ok(None);
        };
        let trust = challenge
            .server_trust
            .ok_or_else(|| TrustError::Rejected("challenge carries no server trust".into()))?;
        evaluator.evaluate(&trust, &host)?;
        Ok(Some(trust))
    });

    match verdict {
        Ok(None) => ChallengeDisposition::PerformDefault,
        Ok(Some(trust)) => ChallengeDisposition::UseCredential(Credential::ServerTrust(trust)),
        Err(reason) => {
            tracing::warn!(request_id = %request.id(), host = %host, reason = %reason, "Server trust rejected");
            request.record_error(
                task,
                RequestError::TrustEvaluation {
                    host,
                    reason: reason.to_string(),
                },
            );
            ChallengeDisposition::CancelChallenge
        }
    }
}

fn resolve_credential(session: &SessionShared, request: &RequestInner, challenge: Challenge) -> ChallengeDisposition {
    if challenge.previous_failure_count > 0 {
        return ChallengeDisposition::RejectProtectionSpace;
    }

    let provider = request
        .credential_provider
        .clone()
        .or_else(|| session.credential_provider());
    let descriptor = request.current_descriptor();
    match provider.and_then(|p| p.credential(&challenge.space, &descriptor)) {
        Some(credential) => ChallengeDisposition::UseCredential(credential),
        None => ChallengeDisposition::PerformDefault,
    }
}
