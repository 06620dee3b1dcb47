//! The session object and the state it shares with its requests.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;

use crate::codec::{BytesDecoder, JsonDecoder, ResponseDecoder, StringDecoder};
use crate::error::RequestError;
use crate::http::{CachePolicy, Method, RequestDescriptor};
use crate::interceptor::Interceptor;
use crate::observability::EventMonitor;
use crate::policy::{CacheHandler, RedirectHandler};
use crate::request::delivery::{BufferedDelivery, Delivery, StreamDelivery};
use crate::request::inner::RequestInner;
use crate::request::{DataRequest, RequestOptions, StreamRequest};
use crate::security::{CredentialProvider, ServerTrustManager};
use crate::session::driver;
use crate::session::router::TaskRouter;
use crate::session::transport::Transport;
use crate::session::SessionBuilder;

/// State shared by a session, its requests and its transport delegate.
pub(crate) struct SessionShared {
    pub(crate) label: String,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) router: TaskRouter,
    pub(crate) interceptor: Option<Interceptor>,
    pub(crate) redirect_handler: Option<Arc<dyn RedirectHandler>>,
    pub(crate) cache_handler: Option<Arc<dyn CacheHandler>>,
    pub(crate) credential_provider: Option<Arc<dyn CredentialProvider>>,
    pub(crate) trust: ServerTrustManager,
    pub(crate) monitor: Arc<dyn EventMonitor>,
    pub(crate) runtime: Handle,
    pub(crate) default_timeout: Option<Duration>,
    pub(crate) default_cache_policy: CachePolicy,
    pub(crate) start_immediately: bool,
    pub(crate) invalidated: AtomicBool,
}

impl SessionShared {
    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub(crate) fn router(&self) -> &TaskRouter {
        &self.router
    }

    pub(crate) fn trust(&self) -> &ServerTrustManager {
        &self.trust
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub(crate) fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    pub(crate) fn redirect_handler(&self) -> Option<Arc<dyn RedirectHandler>> {
        self.redirect_handler.clone()
    }

    pub(crate) fn cache_handler(&self) -> Option<Arc<dyn CacheHandler>> {
        self.cache_handler.clone()
    }

    pub(crate) fn credential_provider(&self) -> Option<Arc<dyn CredentialProvider>> {
        self.credential_provider.clone()
    }

    pub(crate) fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::Acquire)
    }

    /// Move an `Initialized` request into `Adapting` and drive it.
    pub(crate) fn start(self: &Arc<Self>, request: Arc<RequestInner>) -> bool {
        if self.is_invalidated() {
            request.finish(Err(RequestError::SessionInvalidated));
            return false;
        }
        if !request.transition(crate::request::RequestState::Adapting) {
            return false;
        }
        self.runtime
            .spawn(driver::run_attempt(Arc::clone(self), request));
        true
    }

    /// Cancel every task and fail every registered request. Idempotent.
    pub(crate) fn invalidate(&self) {
        if self.invalidated.swap(true, Ordering::AcqRel) {
            return;
        }
        let outstanding = self.router.drain();
        tracing::info!(
            session = %self.label,
            outstanding = outstanding.len(),
            "Session invalidated"
        );
        self.monitor
            .session_invalidated(&self.label, outstanding.len());

        for request in outstanding {
            if let Some(task) = request.live_task() {
                self.transport.cancel(task);
            }
            request.finish(Err(RequestError::SessionInvalidated));
        }
    }
}

/// Invalidates the session when the last `Session` handle goes away.
struct SessionOwner {
    shared: Arc<SessionShared>,
}

impl Drop for SessionOwner {
    fn drop(&mut self) {
        self.shared.invalidate();
    }
}

/// Creates requests over one transport with shared default policies.
///
/// Cheap to clone. Dropping the last clone invalidates the session.
#[derive(Clone)]
pub struct Session {
    owner: Arc<SessionOwner>,
}

impl Session {
    pub(crate) fn from_shared(shared: Arc<SessionShared>) -> Self {
        Self {
            owner: Arc::new(SessionOwner { shared }),
        }
    }

    pub fn builder(transport: Arc<dyn Transport>) -> SessionBuilder {
        SessionBuilder::new(transport)
    }

    fn shared(&self) -> &Arc<SessionShared> {
        &self.owner.shared
    }

    pub fn label(&self) -> &str {
        self.shared().label()
    }

    /// A descriptor carrying the session's default cache policy.
    pub fn descriptor(&self, method: impl Into<Method>, url: impl Into<String>) -> RequestDescriptor {
        RequestDescriptor::new(method, url).with_cache_policy(self.shared().default_cache_policy)
    }

    /// Buffered request yielding the raw body.
    pub fn request(&self, descriptor: RequestDescriptor) -> DataRequest<Bytes> {
        self.request_with(descriptor, BytesDecoder, RequestOptions::default())
    }

    pub fn request_string(&self, descriptor: RequestDescriptor) -> DataRequest<String> {
        self.request_with(descriptor, StringDecoder, RequestOptions::default())
    }

    pub fn request_json<T>(&self, descriptor: RequestDescriptor) -> DataRequest<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.request_with(descriptor, JsonDecoder::<T>::new(), RequestOptions::default())
    }

    /// Buffered request with an explicit decoder and per-request overrides.
    pub fn request_with<D: ResponseDecoder>(
        &self,
        descriptor: RequestDescriptor,
        decoder: D,
        options: RequestOptions,
    ) -> DataRequest<D::Output> {
        let (delivery, receiver) = BufferedDelivery::new(decoder);
        let inner = self.submit(descriptor, options, Box::new(delivery));
        DataRequest::new(inner, receiver)
    }

    /// Request whose events are streamed to the caller as they arrive.
    pub fn stream(&self, descriptor: RequestDescriptor, options: RequestOptions) -> StreamRequest {
        let (delivery, receiver) = StreamDelivery::new();
        let inner = self.submit(descriptor, options, Box::new(delivery));
        StreamRequest::new(inner, receiver)
    }

    fn submit(
        &self,
        descriptor: RequestDescriptor,
        options: RequestOptions,
        delivery: Box<dyn Delivery>,
    ) -> Arc<RequestInner> {
        let shared = self.shared();
        let interceptor = Interceptor::compose(shared.interceptor.as_ref(), options.interceptor.as_ref());
        let start = options.start_immediately.unwrap_or(shared.start_immediately);
        let inner = Arc::new(RequestInner::new(
            descriptor,
            interceptor,
            options,
            Arc::clone(&shared.monitor),
            Arc::downgrade(shared),
            delivery,
        ));

        tracing::debug!(
            session = %shared.label,
            request_id = %inner.id(),
            method = %inner.original().method(),
            url = %inner.original().url(),
            "Request created"
        );
        shared.monitor.request_created(inner.id(), inner.original());

        if shared.is_invalidated() {
            inner.finish(Err(RequestError::SessionInvalidated));
            return inner;
        }
        shared.router.track(&inner);
        if start {
            shared.start(Arc::clone(&inner));
        }
        inner
    }

    /// Cancel every outstanding task and fail every request. Later
    /// requests fail immediately.
    pub fn invalidate_and_cancel(&self) {
        self.shared().invalidate();
    }

    pub fn is_invalidated(&self) -> bool {
        self.shared().is_invalidated()
    }

    /// Requests submitted and not yet finished.
    pub fn outstanding_requests(&self) -> usize {
        self.shared().router.request_count()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.shared();
        f.debug_struct("Session")
            .field("label", &shared.label)
            .field("invalidated", &shared.is_invalidated())
            .field("outstanding", &shared.router.request_count())
            .finish()
    }
}
