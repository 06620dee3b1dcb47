//! Request interception: adaptation before each attempt, retry decisions
//! after each failure.
//!
//! # Data Flow
//! ```text
//! Before every transport attempt:
//!     descriptor → adapter 1 → adapter 2 → ... → transport-bound descriptor
//!
//! After a retry-eligible failure:
//!     retrier 1 → DoNotRetry → retrier 2 → RetryAfter(d) (first answer wins)
//! ```
//!
//! # Design Decisions
//! - Adapters and retriers are independent capabilities; a chain holds both
//! - Adapters must be safe to run again on every retry
//! - Session-level adapters run before request-level ones; request-level
//!   retriers are polled before session-level ones

pub mod adapters;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{BoxError, RequestError};
use crate::http::{RequestDescriptor, ResponseHead};
use crate::request::RequestId;

pub use adapters::{DefaultHeaders, RequestIdAdapter, X_REQUEST_ID};

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    DoNotRetry,
    RetryImmediately,
    RetryAfter(Duration),
}

impl RetryDecision {
    pub fn should_retry(self) -> bool {
        !matches!(self, RetryDecision::DoNotRetry)
    }

    pub fn delay(self) -> Option<Duration> {
        match self {
            RetryDecision::DoNotRetry => None,
            RetryDecision::RetryImmediately => Some(Duration::ZERO),
            RetryDecision::RetryAfter(d) => Some(d),
        }
    }
}

/// Information available to adapters.
#[derive(Debug, Clone)]
pub struct AdaptContext {
    /// Label of the session running the request.
    pub session: String,
    pub request_id: RequestId,
    /// Zero for the first attempt.
    pub retry_count: u32,
}

/// Information available to retriers.
#[derive(Debug, Clone)]
pub struct RetryContext {
    pub request_id: RequestId,
    /// The descriptor of the attempt that failed.
    pub descriptor: RequestDescriptor,
    pub response: Option<ResponseHead>,
    /// Retries already performed.
    pub retry_count: u32,
}

/// Mutates outgoing descriptors.
#[async_trait]
pub trait Adapter: Send + Sync {
    async fn adapt(
        &self,
        descriptor: RequestDescriptor,
        context: &AdaptContext,
    ) -> Result<RequestDescriptor, BoxError>;
}

/// Decides whether a failed attempt should be repeated.
#[async_trait]
pub trait Retrier: Send + Sync {
    async fn retry(&self, context: &RetryContext, error: &RequestError) -> RetryDecision;
}

/// Closure-backed [`Adapter`]; see [`adapter_fn`].
pub struct AdapterFn<F>(F);

/// Wrap a closure as an [`Adapter`].
pub fn adapter_fn<F>(f: F) -> AdapterFn<F>
where
    F: Fn(RequestDescriptor, &AdaptContext) -> Result<RequestDescriptor, BoxError> + Send + Sync,
{
    AdapterFn(f)
}

#[async_trait]
impl<F> Adapter for AdapterFn<F>
where
    F: Fn(RequestDescriptor, &AdaptContext) -> Result<RequestDescriptor, BoxError> + Send + Sync,
{
    async fn adapt(
        &self,
        descriptor: RequestDescriptor,
        context: &AdaptContext,
    ) -> Result<RequestDescriptor, BoxError> {
        (self.0)(descriptor, context)
    }
}

/// Closure-backed [`Retrier`]; see [`retrier_fn`].
pub struct RetrierFn<F>(F);

/// Wrap a closure as a [`Retrier`].
pub fn retrier_fn<F>(f: F) -> RetrierFn<F>
where
    F: Fn(&RetryContext, &RequestError) -> RetryDecision + Send + Sync,
{
    RetrierFn(f)
}

#[async_trait]
impl<F> Retrier for RetrierFn<F>
where
    F: Fn(&RetryContext, &RequestError) -> RetryDecision + Send + Sync,
{
    async fn retry(&self, context: &RetryContext, error: &RequestError) -> RetryDecision {
        (self.0)(context, error)
    }
}

/// Ordered chain of adapters and retriers.
#[derive(Clone, Default)]
pub struct Interceptor {
    adapters: Vec<Arc<dyn Adapter>>,
    retriers: Vec<Arc<dyn Retrier>>,
}

impl Interceptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_adapter(mut self, adapter: impl Adapter + 'static) -> Self {
        self.adapters.push(Arc::new(adapter));
        self
    }

    pub fn with_retrier(mut self, retrier: impl Retrier + 'static) -> Self {
        self.retriers.push(Arc::new(retrier));
        self
    }

    pub fn push_adapter(&mut self, adapter: Arc<dyn Adapter>) {
        self.adapters.push(adapter);
    }

    pub fn push_retrier(&mut self, retrier: Arc<dyn Retrier>) {
        self.retriers.push(retrier);
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty() && self.retriers.is_empty()
    }

    /// Append `other`'s adapters and retriers after this chain's own.
    pub fn append(&mut self, other: &Interceptor) {
        self.adapters.extend(other.adapters.iter().cloned());
        self.retriers.extend(other.retriers.iter().cloned());
    }

    /// Combine session-level and request-level chains.
    pub fn compose(session: Option<&Interceptor>, request: Option<&Interceptor>) -> Interceptor {
        let mut combined = Interceptor::new();
        for chain in [session, request].into_iter().flatten() {
            combined.adapters.extend(chain.adapters.iter().cloned());
        }
        for chain in [request, session].into_iter().flatten() {
            combined.retriers.extend(chain.retriers.iter().cloned());
        }
        combined
    }

    /// Run every adapter in registration order.
    pub async fn adapt(
        &self,
        mut descriptor: RequestDescriptor,
        context: &AdaptContext,
    ) -> Result<RequestDescriptor, RequestError> {
        for adapter in &self.adapters {
            descriptor = adapter
                .adapt(descriptor, context)
                .await
                .map_err(RequestError::adaptation)?;
        }
        Ok(descriptor)
    }

    /// Poll retriers in order; the first retrying answer wins.
    pub async fn retry(&self, context: &RetryContext, error: &RequestError) -> RetryDecision {
        for retrier in &self.retriers {
            let decision = retrier.retry(context, error).await;
            if decision.should_retry() {
                return decision;
            }
        }
        RetryDecision::DoNotRetry
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("adapters", &self.adapters.len())
            .field("retriers", &self.retriers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, TransportError};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn context() -> AdaptContext {
        AdaptContext {
            session: "test".into(),
            request_id: RequestId::new(),
            retry_count: 0,
        }
    }

    fn retry_context() -> RetryContext {
        RetryContext {
            request_id: RequestId::new(),
            descriptor: RequestDescriptor::get("http://example.com"),
            response: None,
            retry_count: 0,
        }
    }

    #[tokio::test]
    async fn test_adapters_apply_in_order() {
        let chain = Interceptor::new()
            .with_adapter(adapter_fn(|d, _| {
                Ok(d.with_header("X-Order", "first"))
            }))
            .with_adapter(adapter_fn(|d, _| {
                let seen = d.headers().get("x-order").unwrap_or_default().to_string();
                Ok(d.with_header("X-Order", format!("{seen},second")))
            }));

        let adapted = chain
            .adapt(RequestDescriptor::get("http://example.com"), &context())
            .await
            .unwrap();
        assert_eq!(adapted.headers().get("x-order"), Some("first,second"));
    }

    #[tokio::test]
    async fn test_adapter_failure_is_adaptation_error() {
        let chain = Interceptor::new().with_adapter(adapter_fn(|_, _| {
            Err("token refresh failed".into())
        }));
        let err = chain
            .adapt(RequestDescriptor::get("http://example.com"), &context())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Adaptation);
    }

    #[tokio::test]
    async fn test_first_retry_decision_wins() {
        let polled = Arc::new(AtomicU32::new(0));
        let p = polled.clone();
        let chain = Interceptor::new()
            .with_retrier(retrier_fn(|_, _| RetryDecision::DoNotRetry))
            .with_retrier(retrier_fn(|_, _| {
                RetryDecision::RetryAfter(Duration::from_millis(5))
            }))
            .with_retrier(retrier_fn(move |_, _| {
                p.fetch_add(1, Ordering::SeqCst);
                RetryDecision::RetryImmediately
            }));

        let error = RequestError::from(TransportError::timed_out());
        let decision = chain.retry(&retry_context(), &error).await;
        assert_eq!(decision, RetryDecision::RetryAfter(Duration::from_millis(5)));
        assert_eq!(polled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_compose_order() {
        let session = Interceptor::new()
            .with_adapter(adapter_fn(|d, _| {
                Ok(d.with_header("X-Layer", "session"))
            }))
            .with_retrier(retrier_fn(|_, _| RetryDecision::RetryImmediately));
        let request = Interceptor::new()
            .with_adapter(adapter_fn(|d, _| {
                Ok(d.with_header("X-Layer", "request"))
            }))
            .with_retrier(retrier_fn(|_, _| {
                RetryDecision::RetryAfter(Duration::from_secs(1))
            }));

        let combined = Interceptor::compose(Some(&session), Some(&request));
        let adapted = combined
            .adapt(RequestDescriptor::get("http://example.com"), &context())
            .await
            .unwrap();
        assert_eq!(adapted.headers().get("x-layer"), Some("request"));

        let error = RequestError::from(TransportError::timed_out());
        assert_eq!(
            combined.retry(&retry_context(), &error).await,
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
    }
}
