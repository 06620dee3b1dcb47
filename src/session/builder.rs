//! Session construction.

use std::fs;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::config::{ConfigError, CourierConfig, EvaluatorKind, HostTrustConfig};
use crate::error::SessionError;
use crate::http::{CachePolicy, HeaderSet};
use crate::interceptor::{Adapter, DefaultHeaders, Interceptor, RequestIdAdapter, Retrier};
use crate::observability::{CompositeMonitor, EventMonitor, MetricsMonitor};
use crate::policy::{CacheHandler, RedirectHandler, Redirector, ResponseCacher};
use crate::resilience::RetryPolicy;
use crate::security::{
    Certificate, CredentialProvider, DisabledEvaluator, PinnedCertificatesEvaluator, ServerTrustManager,
    TrustEvaluator, TrustedAnchors,
};
use crate::session::router::TaskRouter;
use crate::session::shared::{Session, SessionShared};
use crate::session::transport::Transport;

/// Builder for [`Session`].
pub struct SessionBuilder {
    transport: Arc<dyn Transport>,
    label: String,
    interceptor: Interceptor,
    redirect_handler: Option<Arc<dyn RedirectHandler>>,
    cache_handler: Option<Arc<dyn CacheHandler>>,
    credential_provider: Option<Arc<dyn CredentialProvider>>,
    trust: ServerTrustManager,
    monitor: CompositeMonitor,
    timeout: Option<Duration>,
    cache_policy: CachePolicy,
    start_immediately: bool,
}

impl SessionBuilder {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            label: "courier".to_string(),
            interceptor: Interceptor::new(),
            redirect_handler: None,
            cache_handler: None,
            credential_provider: None,
            trust: ServerTrustManager::default(),
            monitor: CompositeMonitor::default(),
            timeout: None,
            cache_policy: CachePolicy::default(),
            start_immediately: true,
        }
    }

    /// Builder pre-populated from a validated configuration.
    pub fn from_config(transport: Arc<dyn Transport>, config: &CourierConfig) -> Result<Self, SessionError> {
        let mut builder = Self::new(transport)
            .label(config.session.label.clone())
            .cache_policy(config.session.cache_policy)
            .start_requests_immediately(config.session.start_requests_immediately);

        if config.session.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.session.timeout_secs));
        }
        if !config.session.default_headers.is_empty() {
            let headers: HeaderSet = config.session.default_headers.iter().collect();
            builder = builder.adapter(DefaultHeaders::new(headers));
        }
        if config.session.request_ids {
            builder = builder.adapter(RequestIdAdapter);
        }
        if config.retry.enabled {
            builder = builder.retrier(RetryPolicy::from_config(&config.retry));
        }
        if !config.redirect.follow {
            builder = builder.redirect_handler(Redirector::do_not_follow());
        }
        if !config.cache.store_responses {
            builder = builder.cache_handler(ResponseCacher::do_not_cache());
        }

        let mut trust = ServerTrustManager::new(config.trust.all_hosts_must_be_evaluated);
        for host in &config.trust.hosts {
            trust = match host.evaluator {
                EvaluatorKind::Default => trust.with_default_handling(host.host.clone()),
                EvaluatorKind::Disabled => trust.with_evaluator(host.host.clone(), Arc::new(DisabledEvaluator)),
                EvaluatorKind::Pinned => {
                    let anchors = load_anchors(host)?;
                    trust.with_evaluator(
                        host.host.clone(),
                        Arc::new(PinnedCertificatesEvaluator::new(Arc::new(anchors))),
                    )
                }
            };
        }
        builder = builder.trust_manager(trust);

        if config.observability.metrics_enabled {
            builder = builder.monitor(MetricsMonitor);
        }
        Ok(builder)
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Append a session-level chain after everything registered so far.
    /// Its adapters run before any request-level adapter; its retriers are
    /// polled after.
    pub fn interceptor(mut self, interceptor: Interceptor) -> Self {
        self.interceptor.append(&interceptor);
        self
    }

    pub fn adapter(mut self, adapter: impl Adapter + 'static) -> Self {
        self.interceptor.push_adapter(Arc::new(adapter));
        self
    }

    pub fn retrier(mut self, retrier: impl Retrier + 'static) -> Self {
        self.interceptor.push_retrier(Arc::new(retrier));
        self
    }

    pub fn redirect_handler(mut self, handler: impl RedirectHandler + 'static) -> Self {
        self.redirect_handler = Some(Arc::new(handler));
        self
    }

    pub fn cache_handler(mut self, handler: impl CacheHandler + 'static) -> Self {
        self.cache_handler = Some(Arc::new(handler));
        self
    }

    pub fn credential_provider(mut self, provider: impl CredentialProvider + 'static) -> Self {
        self.credential_provider = Some(Arc::new(provider));
        self
    }

    pub fn trust_manager(mut self, trust: ServerTrustManager) -> Self {
        self.trust = trust;
        self
    }

    pub fn trust_evaluator(mut self, host: impl Into<String>, evaluator: impl TrustEvaluator + 'static) -> Self {
        self.trust.insert(host, Arc::new(evaluator));
        self
    }

    pub fn monitor(mut self, monitor: impl EventMonitor + 'static) -> Self {
        self.monitor.push(Arc::new(monitor));
        self
    }

    /// Timeout for descriptors that do not set one.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    pub fn start_requests_immediately(mut self, start: bool) -> Self {
        self.start_immediately = start;
        self
    }

    /// Build the session on the current Tokio runtime.
    pub fn build(self) -> Result<Session, SessionError> {
        let runtime = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;
        let interceptor = if self.interceptor.is_empty() {
            None
        } else {
            Some(self.interceptor)
        };

        tracing::debug!(
            session = %self.label,
            monitors = self.monitor.len(),
            start_immediately = self.start_immediately,
            "Session built"
        );

        let shared = Arc::new(SessionShared {
            label: self.label,
            transport: self.transport,
            router: TaskRouter::new(),
            interceptor,
            redirect_handler: self.redirect_handler,
            cache_handler: self.cache_handler,
            credential_provider: self.credential_provider,
            trust: self.trust,
            monitor: Arc::new(self.monitor),
            runtime,
            default_timeout: self.timeout,
            default_cache_policy: self.cache_policy,
            start_immediately: self.start_immediately,
            invalidated: AtomicBool::new(false),
        });
        Ok(Session::from_shared(shared))
    }
}

fn load_anchors(host: &HostTrustConfig) -> Result<TrustedAnchors, ConfigError> {
    let anchors = TrustedAnchors::new();
    for path in &host.anchors {
        let der = fs::read(path).map_err(ConfigError::Io)?;
        anchors.add(Certificate::from_der(der));
    }
    tracing::info!(host = %host.host, anchors = anchors.len(), "Loaded pinned anchors");
    Ok(anchors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::error::TransportError;
    use crate::error::RequestError;
    use crate::http::RequestDescriptor;
    use crate::interceptor::{retrier_fn, RetryContext, RetryDecision};
    use crate::request::RequestId;
    use crate::security::ServerTrust;
    use std::sync::Mutex;
    use crate::session::{TaskId, TransportEvents};

    struct NullTransport;

    impl Transport for NullTransport {
        fn create_task(&self, _d: &RequestDescriptor, _e: TransportEvents) -> Result<TaskId, TransportError> {
            Ok(TaskId::next())
        }
        fn start(&self, _task: TaskId) {}
        fn cancel(&self, _task: TaskId) {}
        fn pause(&self, _task: TaskId) {}
        fn resume(&self, _task: TaskId) {}
    }

    #[test]
    fn test_build_outside_runtime_fails() {
        let result = SessionBuilder::new(Arc::new(NullTransport)).build();
        assert!(matches!(result, Err(SessionError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_from_config_applies_defaults() {
        let config = parse_config(
            r#"
            [session]
            label = "api"
            start_requests_immediately = false
            timeout_secs = 5
            cache_policy = "reload_ignoring_cache"
            "#,
        )
        .unwrap();
        let session = SessionBuilder::from_config(Arc::new(NullTransport), &config)
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(session.label(), "api");
        let descriptor = session.descriptor("GET", "http://example.com");
        assert_eq!(descriptor.cache_policy(), CachePolicy::ReloadIgnoringCache);
        assert!(!session.is_invalidated());
    }

    #[tokio::test]
    async fn test_from_config_loads_pinned_anchors() {
        let path = std::env::temp_dir().join(format!("courier-anchor-{}.der", std::process::id()));
        fs::write(&path, [0x30, 0x82, 0x01, 0x0a]).unwrap();

        let config = parse_config(&format!(
            r#"
            [trust]
            all_hosts_must_be_evaluated = true

            [[trust.hosts]]
            host = "pinned.test"
            evaluator = "pinned"
            anchors = ["{}"]
            "#,
            path.display()
        ))
        .unwrap();
        let builder = SessionBuilder::from_config(Arc::new(NullTransport), &config).unwrap();

        let evaluator = builder.trust.evaluator_for("pinned.test").unwrap().unwrap();
        let chain = vec![Certificate::from_der(vec![0x30, 0x82, 0x01, 0x0a])];
        assert!(evaluator
            .evaluate(&ServerTrust::new("pinned.test", chain), "pinned.test")
            .is_ok());
        assert!(builder.trust.evaluator_for("other.test").is_err());

        let _ = fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_retriers_polled_in_registration_order() {
        let polled = Arc::new(Mutex::new(Vec::new()));
        let first = polled.clone();
        let second = polled.clone();
        let builder = SessionBuilder::new(Arc::new(NullTransport))
            .retrier(retrier_fn(move |_: &RetryContext, _: &RequestError| {
                first.lock().unwrap().push("first");
                RetryDecision::DoNotRetry
            }))
            .interceptor(Interceptor::new().with_retrier(retrier_fn(
                move |_: &RetryContext, _: &RequestError| {
                    second.lock().unwrap().push("second");
                    RetryDecision::DoNotRetry
                },
            )));

        let context = RetryContext {
            request_id: RequestId::new(),
            descriptor: RequestDescriptor::get("http://example.com"),
            response: None,
            retry_count: 0,
        };
        let decision = builder.interceptor.retry(&context, &RequestError::Cancelled).await;

        assert!(!decision.should_retry());
        assert_eq!(*polled.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_missing_anchor_file_is_config_error() {
        let config = parse_config(
            r#"
            [[trust.hosts]]
            host = "pinned.test"
            evaluator = "pinned"
            anchors = ["/nonexistent/courier/anchor.der"]
            "#,
        )
        .unwrap();
        let result = SessionBuilder::from_config(Arc::new(NullTransport), &config);
        assert!(matches!(result, Err(SessionError::Config(ConfigError::Io(_)))));
    }
}
