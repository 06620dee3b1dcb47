//! Declarative request description.
//!
//! # Design Decisions
//! - Descriptors are immutable values; every `with_*` call yields a new one
//! - The target is kept as written and resolved during adaptation, so a bad
//!   URL surfaces as a request failure rather than a construction panic
//! - Parameters stay pending until the adapting stage encodes them

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::codec::{ParameterEncoding, Parameters};
use crate::error::RequestError;
use crate::http::{HeaderSet, Method};

/// How the transport should use its response cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Follow HTTP freshness rules.
    #[default]
    UseProtocolPolicy,
    /// Always go to the network.
    ReloadIgnoringCache,
    /// Use any stored response regardless of age, else load.
    ReturnCacheDataElseLoad,
    /// Use any stored response, never load.
    ReturnCacheDataDontLoad,
}

/// Produces a fresh body stream for every transport attempt.
pub type StreamFactory =
    Arc<dyn Fn() -> BoxStream<'static, Result<Bytes, std::io::Error>> + Send + Sync>;

/// Where the request body comes from.
#[derive(Clone)]
pub enum BodySource {
    Bytes(Bytes),
    Stream(StreamFactory),
    File(PathBuf),
}

impl BodySource {
    /// Only in-memory bodies can be known to be empty.
    pub fn is_empty(&self) -> bool {
        match self {
            BodySource::Bytes(b) => b.is_empty(),
            BodySource::Stream(_) | BodySource::File(_) => false,
        }
    }

    /// Length when known up front.
    pub fn len_hint(&self) -> Option<u64> {
        match self {
            BodySource::Bytes(b) => Some(b.len() as u64),
            _ => None,
        }
    }
}

impl fmt::Debug for BodySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodySource::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            BodySource::Stream(_) => f.write_str("Stream"),
            BodySource::File(path) => write!(f, "File({})", path.display()),
        }
    }
}

/// Immutable description of one logical request.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    url: String,
    headers: HeaderSet,
    body: Option<BodySource>,
    timeout: Option<Duration>,
    cache_policy: CachePolicy,
    parameters: Option<(Parameters, ParameterEncoding)>,
}

impl RequestDescriptor {
    pub fn new(method: impl Into<Method>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: HeaderSet::new(),
            body: None,
            timeout: None,
            cache_policy: CachePolicy::default(),
            parameters: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    pub fn body(&self) -> Option<&BodySource> {
        self.body.as_ref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn cache_policy(&self) -> CachePolicy {
        self.cache_policy
    }

    pub fn parameters(&self) -> Option<&(Parameters, ParameterEncoding)> {
        self.parameters.as_ref()
    }

    pub fn with_method(mut self, method: impl Into<Method>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn without_header(mut self, name: &str) -> Self {
        self.headers.remove(name);
        self
    }

    pub fn with_headers(mut self, headers: HeaderSet) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(BodySource::Bytes(body.into()));
        self
    }

    pub fn with_body_source(mut self, body: BodySource) -> Self {
        self.body = Some(body);
        self
    }

    pub fn without_body(mut self) -> Self {
        self.body = None;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    pub fn with_parameters(mut self, parameters: Parameters, encoding: ParameterEncoding) -> Self {
        self.parameters = Some((parameters, encoding));
        self
    }

    /// Split off pending parameters, leaving a descriptor without them.
    pub(crate) fn take_parameters(mut self) -> (Self, Option<(Parameters, ParameterEncoding)>) {
        let params = self.parameters.take();
        (self, params)
    }

    /// Resolve the target into a well-formed absolute URL.
    pub fn resolve_url(&self) -> Result<Url, RequestError> {
        let url = Url::parse(&self.url).map_err(|e| RequestError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;
        if !url.has_host() {
            return Err(RequestError::InvalidUrl {
                url: self.url.clone(),
                reason: "missing host".to_string(),
            });
        }
        Ok(url)
    }

    /// Host component, when the target resolves.
    pub fn host(&self) -> Option<String> {
        self.resolve_url()
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}
