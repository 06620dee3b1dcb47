//! Plaintext HTTP/1.1 transport over the `hyper-util` legacy client.

use std::future::pending;
use std::sync::Arc;
use std::time::SystemTime;

use axum::body::Body;
use axum::http::{HeaderMap, Request};
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use futures_util::StreamExt;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tokio::sync::{oneshot, watch};
use url::Url;

use crate::error::{TransportError, TransportErrorKind};
use crate::http::{BodySource, CachePolicy, HeaderSet, Method, RequestDescriptor, ResponseHead};
use crate::policy::cache::{is_fresh, is_storable, request_bypasses_cache};
use crate::policy::redirect::{propose_redirect, MAX_REDIRECTS};
use crate::policy::{CacheDisposition, CachedResponse, RedirectDisposition};
use crate::security::challenge::parse_www_authenticate;
use crate::security::{AuthMethod, Challenge, ChallengeDisposition, ProtectionSpace};
use crate::session::{ResponseDisposition, TaskId, Transport, TransportEvents};
use crate::transport::ResponseStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Running,
    Paused,
    Cancelled,
}

struct TaskSlot {
    descriptor: RequestDescriptor,
    events: TransportEvents,
    control: watch::Sender<Control>,
    started: bool,
}

struct TransportInner {
    client: Client<HttpConnector, Body>,
    store: Arc<ResponseStore>,
    tasks: DashMap<TaskId, TaskSlot>,
}

/// Reference [`Transport`] speaking plain HTTP/1.1.
///
/// Honours the descriptor's [`CachePolicy`] against a shared
/// [`ResponseStore`], proposes redirects and response storage through the
/// session, raises `WWW-Authenticate` challenges and answers Basic ones.
/// A descriptor timeout covers the whole attempt, redirects included.
#[derive(Clone)]
pub struct HyperTransport {
    inner: Arc<TransportInner>,
}

impl HyperTransport {
    pub fn new() -> Self {
        Self::with_store(Arc::new(ResponseStore::new()))
    }

    /// Transport sharing an existing response store.
    pub fn with_store(store: Arc<ResponseStore>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            inner: Arc::new(TransportInner {
                client,
                store,
                tasks: DashMap::new(),
            }),
        }
    }

    pub fn store(&self) -> &Arc<ResponseStore> {
        &self.inner.store
    }

    /// Tasks created and not yet completed.
    pub fn active_tasks(&self) -> usize {
        self.inner.tasks.len()
    }

    fn signal(&self, task: TaskId, control: Control) {
        if let Some(slot) = self.inner.tasks.get(&task) {
            if slot.started {
                slot.control.send_replace(control);
            }
        }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HyperTransport {
    fn create_task(&self, descriptor: &RequestDescriptor, events: TransportEvents) -> Result<TaskId, TransportError> {
        let url = descriptor
            .resolve_url()
            .map_err(|e| TransportError::new(TransportErrorKind::InvalidRequest, e.to_string()))?;
        if url.scheme() != "http" {
            return Err(TransportError::new(
                TransportErrorKind::InvalidRequest,
                format!("unsupported scheme: {}", url.scheme()),
            ));
        }

        let task = TaskId::next();
        let (control, _) = watch::channel(Control::Running);
        self.inner.tasks.insert(
            task,
            TaskSlot {
                descriptor: descriptor.clone(),
                events,
                control,
                started: false,
            },
        );
        tracing::trace!(task = %task, url = %url, "Transport task created");
        Ok(task)
    }

    fn start(&self, task: TaskId) {
        let prepared = self.inner.tasks.get_mut(&task).and_then(|mut slot| {
            if slot.started {
                return None;
            }
            slot.started = true;
            Some((slot.descriptor.clone(), slot.events.clone(), slot.control.subscribe()))
        });
        let Some((descriptor, events, control)) = prepared else {
            return;
        };

        let inner = Arc::clone(&self.inner);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(run_task(inner, task, descriptor, events, control));
            }
            Err(_) => {
                self.inner.tasks.remove(&task);
                events.task_completed(
                    task,
                    Some(TransportError::new(TransportErrorKind::Other, "no Tokio runtime")),
                );
            }
        }
    }

    fn cancel(&self, task: TaskId) {
        let unstarted = self
            .inner
            .tasks
            .remove_if(&task, |_, slot| !slot.started)
            .map(|(_, slot)| slot.events);

        match unstarted {
            Some(events) => {
                tracing::trace!(task = %task, "Cancelled task before start");
                events.task_completed(task, Some(TransportError::cancelled()));
            }
            None => self.signal(task, Control::Cancelled),
        }
    }

    fn pause(&self, task: TaskId) {
        self.signal(task, Control::Paused);
    }

    fn resume(&self, task: TaskId) {
        self.signal(task, Control::Running);
    }
}

async fn run_task(
    inner: Arc<TransportInner>,
    task: TaskId,
    descriptor: RequestDescriptor,
    events: TransportEvents,
    control: watch::Receiver<Control>,
) {
    let timeout = descriptor.timeout();
    let attempt = execute(&inner, task, descriptor, &events, control.clone());
    let attempt = async move {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, attempt)
                .await
                .unwrap_or_else(|_| Err(TransportError::timed_out())),
            None => attempt.await,
        }
    };

    let outcome = tokio::select! {
        outcome = attempt => outcome,
        _ = cancelled(control) => Err(TransportError::cancelled()),
    };

    inner.tasks.remove(&task);
    if let Err(error) = &outcome {
        tracing::debug!(task = %task, error = %error, "Transport task failed");
    }
    events.task_completed(task, outcome.err());
}

async fn cancelled(mut control: watch::Receiver<Control>) {
    loop {
        if *control.borrow_and_update() == Control::Cancelled {
            return;
        }
        if control.changed().await.is_err() {
            pending::<()>().await;
        }
    }
}

async fn wait_until_running(control: &mut watch::Receiver<Control>) {
    loop {
        if *control.borrow_and_update() == Control::Running {
            return;
        }
        if control.changed().await.is_err() {
            return;
        }
    }
}

async fn execute(
    inner: &TransportInner,
    task: TaskId,
    descriptor: RequestDescriptor,
    events: &TransportEvents,
    mut control: watch::Receiver<Control>,
) -> Result<(), TransportError> {
    let mut current = descriptor;
    let mut redirects = 0usize;
    let mut auth_failures = 0u32;

    loop {
        let url = current
            .resolve_url()
            .map_err(|e| TransportError::new(TransportErrorKind::InvalidRequest, e.to_string()))?;
        let key = url.to_string();

        if let Some(entry) = cached_entry(&inner.store, &current, &key)? {
            tracing::debug!(task = %task, url = %key, "Serving stored response");
            if events.response_received(task, entry.head.clone()) == ResponseDisposition::Cancel {
                return Err(TransportError::cancelled());
            }
            if !entry.body.is_empty() {
                events.data_received(task, entry.body);
            }
            return Ok(());
        }

        let request = build_request(&current, &url).await?;
        let response: hyper::Response<hyper::body::Incoming> = inner.client.request(request).await.map_err(|e| {
            let kind = if e.is_connect() {
                TransportErrorKind::ConnectionFailed
            } else {
                TransportErrorKind::Other
            };
            TransportError::new(kind, e.to_string())
        })?;
        if let Some(sent) = current.body().and_then(BodySource::len_hint) {
            events.bytes_sent(task, sent, Some(sent));
        }

        let head = ResponseHead::new(response.status().as_u16(), header_set(response.headers()), key.clone());

        if let Some(proposed) = propose_redirect(&current, &head) {
            if redirects >= MAX_REDIRECTS {
                return Err(TransportError::new(
                    TransportErrorKind::TooManyRedirects,
                    format!("more than {MAX_REDIRECTS} redirects"),
                ));
            }
            if let RedirectDisposition::Follow(next) = events.redirect_proposed(task, proposed, &head) {
                redirects += 1;
                tracing::debug!(task = %task, status = head.status, location = %next.url(), "Following redirect");
                current = next;
                continue;
            }
        }

        if head.status == 401 {
            if let Some(authorization) = answer_challenge(task, &url, &head, auth_failures, events).await? {
                auth_failures += 1;
                current = current.with_header("Authorization", authorization);
                continue;
            }
        }

        if events.response_received(task, head.clone()) == ResponseDisposition::Cancel {
            return Err(TransportError::cancelled());
        }

        let storable = is_storable(&current, &head);
        let mut stored = BytesMut::new();
        let mut body = Body::new(response.into_body()).into_data_stream();
        loop {
            wait_until_running(&mut control).await;
            let Some(chunk) = body.next().await else {
                break;
            };
            let chunk: Bytes = chunk.map_err(|e| TransportError::new(TransportErrorKind::ConnectionFailed, e.to_string()))?;
            if storable {
                stored.extend_from_slice(&chunk);
            }
            events.data_received(task, chunk);
        }

        if storable {
            if let CacheDisposition::Store(entry) =
                events.cache_storage_proposed(task, CachedResponse::new(head, stored.freeze()))
            {
                inner.store.insert(key, entry);
            }
        }
        return Ok(());
    }
}

/// Stored response to serve instead of loading, per the cache policy.
fn cached_entry(
    store: &ResponseStore,
    descriptor: &RequestDescriptor,
    key: &str,
) -> Result<Option<CachedResponse>, TransportError> {
    if *descriptor.method() != Method::Get {
        return Ok(None);
    }
    match descriptor.cache_policy() {
        CachePolicy::ReloadIgnoringCache => Ok(None),
        CachePolicy::UseProtocolPolicy => {
            if request_bypasses_cache(descriptor.headers()) {
                return Ok(None);
            }
            Ok(store
                .get(key)
                .filter(|entry| is_fresh(entry, SystemTime::now())))
        }
        CachePolicy::ReturnCacheDataElseLoad => Ok(store.get(key)),
        CachePolicy::ReturnCacheDataDontLoad => store.get(key).map(Some).ok_or_else(|| {
            TransportError::new(
                TransportErrorKind::ResourceUnavailable,
                format!("no stored response for {key}"),
            )
        }),
    }
}

/// Raise the challenge carried by a 401. Returns the `Authorization` value
/// to retry with, or `None` to deliver the 401 as-is.
async fn answer_challenge(
    task: TaskId,
    url: &Url,
    head: &ResponseHead,
    previous_failures: u32,
    events: &TransportEvents,
) -> Result<Option<String>, TransportError> {
    let Some((method, realm)) = head
        .headers
        .get("www-authenticate")
        .and_then(parse_www_authenticate)
    else {
        return Ok(None);
    };

    let space = ProtectionSpace {
        host: url.host_str().unwrap_or_default().to_string(),
        port: url.port_or_known_default().unwrap_or(80),
        realm,
        method: method.clone(),
    };
    let challenge = Challenge::new(space).with_previous_failures(previous_failures);

    let (sender, receiver) = oneshot::channel();
    events.challenge_received(
        task,
        challenge,
        Box::new(move |disposition| {
            let _ = sender.send(disposition);
        }),
    );

    match receiver.await.unwrap_or(ChallengeDisposition::CancelChallenge) {
        ChallengeDisposition::UseCredential(credential) if method == AuthMethod::Basic => {
            Ok(credential.basic_authorization())
        }
        ChallengeDisposition::CancelChallenge => Err(TransportError::cancelled()),
        _ => Ok(None),
    }
}

async fn build_request(descriptor: &RequestDescriptor, url: &Url) -> Result<Request<Body>, TransportError> {
    let mut builder = Request::builder()
        .method(descriptor.method().as_str())
        .uri(url.as_str());
    for (name, value) in descriptor.headers().iter() {
        builder = builder.header(name, value);
    }

    let body = match descriptor.body() {
        None => Body::empty(),
        Some(BodySource::Bytes(bytes)) => Body::from(bytes.clone()),
        Some(BodySource::Stream(factory)) => Body::from_stream(factory()),
        Some(BodySource::File(path)) => {
            let contents = tokio::fs::read(path).await.map_err(|e| {
                TransportError::new(
                    TransportErrorKind::InvalidRequest,
                    format!("cannot read {}: {e}", path.display()),
                )
            })?;
            Body::from(contents)
        }
    };

    builder
        .body(body)
        .map_err(|e| TransportError::new(TransportErrorKind::InvalidRequest, e.to_string()))
}

/// Repeated fields are joined with `", "`.
fn header_set(headers: &HeaderMap) -> HeaderSet {
    let mut set = HeaderSet::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        let joined = match set.get(name.as_str()) {
            Some(existing) => format!("{existing}, {value}"),
            None => value,
        };
        set.set(name.as_str(), joined);
    }
    set
}
