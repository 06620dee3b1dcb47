//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use courier::error::{TransportError, TransportErrorKind};
use courier::http::{HeaderSet, RequestDescriptor, ResponseHead};
use courier::policy::CachedResponse;
use courier::security::{Challenge, ChallengeDisposition};
use courier::session::{ResponseDisposition, TaskId, Transport, TransportEvents};

/// What the mock transport does with the next started task.
#[derive(Clone)]
pub enum Reply {
    /// Response head, one body chunk, completion.
    Respond { status: u16, headers: HeaderSet, body: Bytes },
    /// Like `Respond`, also proposing the response for storage.
    RespondCacheable { status: u16, body: Bytes },
    /// Completion with a transport error.
    Fail(TransportErrorKind),
    /// Raise the challenge first; answer 200 unless it is cancelled.
    Challenge(Challenge),
    /// Never complete on its own.
    Hang,
}

impl Reply {
    pub fn ok(body: &'static str) -> Self {
        Reply::Respond {
            status: 200,
            headers: HeaderSet::new().with("Content-Type", "text/plain"),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    pub fn status(status: u16) -> Self {
        Reply::Respond {
            status,
            headers: HeaderSet::new(),
            body: Bytes::new(),
        }
    }
}

#[derive(Default)]
struct MockState {
    script: VecDeque<Reply>,
    tasks: HashMap<TaskId, (RequestDescriptor, TransportEvents)>,
    seen: Vec<RequestDescriptor>,
    dispositions: Vec<ChallengeDisposition>,
    cache_decisions: Vec<bool>,
}

/// In-process transport that plays back a script of replies.
/// Once the script is exhausted every task gets `fallback`.
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    fallback: Reply,
    pub created: AtomicUsize,
    pub started: AtomicUsize,
    pub cancelled: AtomicUsize,
    pub paused: AtomicUsize,
    pub resumed: AtomicUsize,
}

impl MockTransport {
    pub fn new(script: Vec<Reply>) -> Arc<Self> {
        Self::with_fallback(script, Reply::ok("ok"))
    }

    pub fn with_fallback(script: Vec<Reply>, fallback: Reply) -> Arc<Self> {
        let state = MockState {
            script: script.into(),
            ..MockState::default()
        };
        Arc::new(Self {
            state: Arc::new(Mutex::new(state)),
            fallback,
            created: AtomicUsize::new(0),
            started: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
            paused: AtomicUsize::new(0),
            resumed: AtomicUsize::new(0),
        })
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Descriptors of every created task, in order.
    pub fn seen(&self) -> Vec<RequestDescriptor> {
        self.state.lock().unwrap().seen.clone()
    }

    pub fn dispositions(&self) -> Vec<ChallengeDisposition> {
        self.state.lock().unwrap().dispositions.clone()
    }

    pub fn cache_decisions(&self) -> Vec<bool> {
        self.state.lock().unwrap().cache_decisions.clone()
    }

    /// Events and ID of the most recently created live task.
    pub fn live_task(&self) -> Option<(TaskId, TransportEvents)> {
        let state = self.state.lock().unwrap();
        state
            .tasks
            .iter()
            .max_by_key(|(task, _)| task.as_u64())
            .map(|(task, (_, events))| (*task, events.clone()))
    }

    fn take(state: &Arc<Mutex<MockState>>, task: TaskId) -> Option<TransportEvents> {
        state.lock().unwrap().tasks.remove(&task).map(|(_, events)| events)
    }

    async fn play(state: Arc<Mutex<MockState>>, task: TaskId, events: TransportEvents, reply: Reply) {
        tokio::task::yield_now().await;
        match reply {
            Reply::Respond { status, headers, body } => {
                let url = Self::url_of(&state, task);
                let head = ResponseHead::new(status, headers, url);
                if events.response_received(task, head) == ResponseDisposition::Allow && !body.is_empty() {
                    events.data_received(task, body);
                }
                if let Some(events) = Self::take(&state, task) {
                    events.task_completed(task, None);
                }
            }
            Reply::RespondCacheable { status, body } => {
                let url = Self::url_of(&state, task);
                let head = ResponseHead::new(status, HeaderSet::new(), url);
                events.response_received(task, head.clone());
                events.data_received(task, body.clone());
                let store = events
                    .cache_storage_proposed(task, CachedResponse::new(head, body))
                    .is_store();
                state.lock().unwrap().cache_decisions.push(store);
                if let Some(events) = Self::take(&state, task) {
                    events.task_completed(task, None);
                }
            }
            Reply::Fail(kind) => {
                if let Some(events) = Self::take(&state, task) {
                    events.task_completed(task, Some(TransportError::new(kind, "scripted failure")));
                }
            }
            Reply::Challenge(challenge) => {
                let (sender, receiver) = tokio::sync::oneshot::channel();
                events.challenge_received(
                    task,
                    challenge,
                    Box::new(move |disposition| {
                        let _ = sender.send(disposition);
                    }),
                );
                let disposition = receiver.await.unwrap_or(ChallengeDisposition::CancelChallenge);
                let cancelled = matches!(disposition, ChallengeDisposition::CancelChallenge);
                state.lock().unwrap().dispositions.push(disposition);

                if cancelled {
                    if let Some(events) = Self::take(&state, task) {
                        events.task_completed(task, Some(TransportError::cancelled()));
                    }
                    return;
                }
                let url = Self::url_of(&state, task);
                events.response_received(task, ResponseHead::new(200, HeaderSet::new(), url));
                if let Some(events) = Self::take(&state, task) {
                    events.task_completed(task, None);
                }
            }
            Reply::Hang => {}
        }
    }

    fn url_of(state: &Arc<Mutex<MockState>>, task: TaskId) -> String {
        state
            .lock()
            .unwrap()
            .tasks
            .get(&task)
            .map(|(descriptor, _)| descriptor.url().to_string())
            .unwrap_or_default()
    }
}

impl Transport for MockTransport {
    fn create_task(&self, descriptor: &RequestDescriptor, events: TransportEvents) -> Result<TaskId, TransportError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let task = TaskId::next();
        let mut state = self.state.lock().unwrap();
        state.seen.push(descriptor.clone());
        state.tasks.insert(task, (descriptor.clone(), events));
        Ok(task)
    }

    fn start(&self, task: TaskId) {
        self.started.fetch_add(1, Ordering::SeqCst);
        let (events, reply) = {
            let mut state = self.state.lock().unwrap();
            let Some((_, events)) = state.tasks.get(&task) else {
                return;
            };
            let events = events.clone();
            let reply = state.script.pop_front().unwrap_or_else(|| self.fallback.clone());
            (events, reply)
        };
        tokio::spawn(Self::play(Arc::clone(&self.state), task, events, reply));
    }

    fn cancel(&self, task: TaskId) {
        self.cancelled.fetch_add(1, Ordering::SeqCst);
        if let Some(events) = Self::take(&self.state, task) {
            events.task_completed(task, Some(TransportError::cancelled()));
        }
    }

    fn pause(&self, _task: TaskId) {
        self.paused.fetch_add(1, Ordering::SeqCst);
    }

    fn resume(&self, _task: TaskId) {
        self.resumed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Response produced by a programmable backend.
pub struct BackendReply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub delay: Duration,
}

impl BackendReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        401 => "Unauthorized",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Start a raw-TCP HTTP/1.1 backend on an ephemeral port. `handler` gets
/// the request head (request line and headers) and returns the reply.
/// Returns the bound address and a counter of served requests.
pub async fn start_programmable_backend<F>(handler: F) -> (SocketAddr, Arc<AtomicUsize>)
where
    F: Fn(&str) -> BackendReply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let handler = Arc::new(handler);

    let served = Arc::clone(&hits);
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let handler = Arc::clone(&handler);
            let served = Arc::clone(&served);
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                served.fetch_add(1, Ordering::SeqCst);

                let head = String::from_utf8_lossy(&buf).into_owned();
                let reply = handler(&head);
                if !reply.delay.is_zero() {
                    tokio::time::sleep(reply.delay).await;
                }

                let mut response = format!("HTTP/1.1 {} {}\r\n", reply.status, reason(reply.status));
                for (name, value) in &reply.headers {
                    response.push_str(&format!("{name}: {value}\r\n"));
                }
                response.push_str(&format!(
                    "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    reply.body.len(),
                    reply.body
                ));
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, hits)
}

/// Value of `name` in a raw request head, case-insensitively.
pub fn request_header<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.lines().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
    })
}

/// Path from the request line.
pub fn request_path(head: &str) -> &str {
    head.lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
}
