//! Request lifecycle tests against a scripted in-process transport.

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;

use common::{MockTransport, Reply};
use courier::codec::{BytesDecoder, DecodeError, ResponseDecoder};
use courier::error::{ErrorKind, RequestError};
use courier::http::{HeaderSet, RequestDescriptor, ResponseHead};
use courier::interceptor::{adapter_fn, retrier_fn, Interceptor, RequestIdAdapter, RetryDecision, X_REQUEST_ID};
use courier::observability::EventMonitor;
use courier::policy::ResponseCacher;
use courier::request::{RequestId, RequestOptions, RequestState, StreamEvent, Validation, ValidationFailure};
use courier::resilience::RetryPolicy;
use courier::security::{
    AuthMethod, Certificate, Challenge, ChallengeDisposition, Credential, CredentialProvider,
    PinnedCertificatesEvaluator, ProtectionSpace, ServerTrust, TrustedAnchors,
};
use courier::session::{Session, SessionBuilder};

const URL: &str = "http://mock.test/resource";

fn session(transport: &Arc<MockTransport>) -> SessionBuilder {
    SessionBuilder::new(transport.clone()).label("test")
}

async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

struct FinishCounter(Arc<AtomicUsize>);

impl EventMonitor for FinishCounter {
    fn request_finished(&self, _id: RequestId, _state: RequestState, _error: Option<&RequestError>, _elapsed: Duration) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

struct CountingProvider(Arc<AtomicUsize>);

impl CredentialProvider for CountingProvider {
    fn credential(&self, _space: &ProtectionSpace, _request: &RequestDescriptor) -> Option<Credential> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Some(Credential::password("user", "secret"))
    }
}

#[tokio::test]
async fn test_success_delivers_body() {
    let transport = MockTransport::new(vec![Reply::ok("hello")]);
    let session = session(&transport).build().unwrap();

    let request = session.request_string(RequestDescriptor::get(URL));
    let handle = request.handle();
    let response = request.response().await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.value, "hello");
    assert_eq!(response.retry_count, 0);
    assert_eq!(handle.state(), RequestState::Succeeded);
    assert_eq!(transport.created(), 1);
}

#[tokio::test]
async fn test_retry_limit_one_makes_two_attempts() {
    let transport = MockTransport::with_fallback(vec![], Reply::status(503));
    let adapted = Arc::new(AtomicUsize::new(0));
    let counter = adapted.clone();
    let session = session(&transport)
        .adapter(adapter_fn(move |descriptor, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(descriptor)
        }))
        .adapter(RequestIdAdapter)
        .retrier(RetryPolicy::new(1).with_backoff(0, 0))
        .build()
        .unwrap();

    let options = RequestOptions::new().with_validation(Validation::success());
    let request = session.request_with(RequestDescriptor::get(URL), BytesDecoder, options);
    let handle = request.handle();
    let error = request.response().await.unwrap_err();

    assert!(matches!(
        error,
        RequestError::Validation(ValidationFailure::UnacceptableStatusCode(503))
    ));
    assert_eq!(transport.created(), 2);
    assert_eq!(adapted.load(Ordering::SeqCst), 2);
    assert_eq!(handle.retry_count(), 1);
    assert_eq!(handle.state(), RequestState::Failed);

    let seen = transport.seen();
    assert_ne!(seen[0].headers().get(X_REQUEST_ID), seen[1].headers().get(X_REQUEST_ID));
}

#[tokio::test]
async fn test_retry_after_transport_failure_succeeds() {
    let transport = MockTransport::new(vec![
        Reply::Fail(courier::error::TransportErrorKind::ConnectionFailed),
        Reply::ok("second"),
    ]);
    let session = session(&transport)
        .retrier(RetryPolicy::new(2).with_backoff(0, 0))
        .build()
        .unwrap();

    let response = session.request_string(RequestDescriptor::get(URL)).response().await.unwrap();
    assert_eq!(response.value, "second");
    assert_eq!(response.retry_count, 1);
    assert_eq!(transport.created(), 2);
}

#[tokio::test]
async fn test_adaptation_failure_is_final() {
    let transport = MockTransport::new(vec![]);
    let retried = Arc::new(AtomicUsize::new(0));
    let counter = retried.clone();
    let session = session(&transport)
        .adapter(adapter_fn(|_, _| Err("token unavailable".into())))
        .retrier(retrier_fn(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            RetryDecision::RetryImmediately
        }))
        .build()
        .unwrap();

    let error = session.request(RequestDescriptor::get(URL)).response().await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Adaptation);
    assert_eq!(transport.created(), 0);
    assert_eq!(retried.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_get_with_body_rejected_before_task() {
    let transport = MockTransport::new(vec![]);
    let session = session(&transport).build().unwrap();

    let descriptor = RequestDescriptor::get(URL).with_body("payload");
    let error = session.request(descriptor).response().await.unwrap_err();

    assert!(matches!(
        error,
        RequestError::Validation(ValidationFailure::BodyDataInGetRequest)
    ));
    assert_eq!(transport.created(), 0);
}

#[tokio::test]
async fn test_invalid_url_fails() {
    let transport = MockTransport::new(vec![]);
    let session = session(&transport).build().unwrap();

    let error = session
        .request(RequestDescriptor::get("not a url"))
        .response()
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidUrl);
    assert_eq!(transport.created(), 0);
}

#[tokio::test]
async fn test_adapters_run_session_then_request() {
    let transport = MockTransport::new(vec![Reply::ok("ok")]);
    let append = |label: &'static str| {
        adapter_fn(move |descriptor: RequestDescriptor, _| {
            let order = match descriptor.headers().get("x-order") {
                Some(existing) => format!("{existing},{label}"),
                None => label.to_string(),
            };
            Ok(descriptor.with_header("X-Order", order))
        })
    };
    let session = session(&transport).adapter(append("session")).build().unwrap();

    let options = RequestOptions::new().with_interceptor(Interceptor::new().with_adapter(append("request")));
    session
        .request_with(RequestDescriptor::get(URL), BytesDecoder, options)
        .response()
        .await
        .unwrap();

    assert_eq!(transport.seen()[0].headers().get("x-order"), Some("session,request"));
}

#[tokio::test]
async fn test_cancel_before_start() {
    let transport = MockTransport::new(vec![]);
    let session = session(&transport).start_requests_immediately(false).build().unwrap();

    let request = session.request(RequestDescriptor::get(URL));
    assert_eq!(request.state(), RequestState::Initialized);
    assert!(request.cancel());
    assert!(!request.cancel());

    let error = request.response().await.unwrap_err();
    assert!(matches!(error, RequestError::Cancelled));
    assert_eq!(transport.created(), 0);
}

#[tokio::test]
async fn test_deferred_request_starts_on_resume() {
    let transport = MockTransport::new(vec![Reply::ok("late")]);
    let session = session(&transport).start_requests_immediately(false).build().unwrap();

    let request = session.request_string(RequestDescriptor::get(URL));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.created(), 0);

    assert!(request.resume());
    assert_eq!(request.value().await.unwrap(), "late");
}

#[tokio::test]
async fn test_cancel_in_flight_wins() {
    let transport = MockTransport::new(vec![Reply::Hang]);
    let session = session(&transport).build().unwrap();

    let request = session.request(RequestDescriptor::get(URL));
    let handle = request.handle();
    wait_until(|| handle.state() == RequestState::Running).await;

    assert!(handle.cancel());
    let error = request.response().await.unwrap_err();

    assert!(matches!(error, RequestError::Cancelled));
    assert_eq!(transport.cancelled(), 1);
    assert_eq!(handle.state(), RequestState::Cancelled);
}

#[tokio::test]
async fn test_pause_and_resume_forwarded() {
    let transport = MockTransport::new(vec![Reply::Hang]);
    let session = session(&transport).build().unwrap();

    let request = session.request(RequestDescriptor::get(URL));
    wait_until(|| request.state() == RequestState::Running).await;

    assert!(request.pause());
    assert_eq!(request.state(), RequestState::Suspended);
    assert!(!request.pause());
    assert!(request.resume());
    assert_eq!(request.state(), RequestState::Running);
    assert_eq!(transport.paused.load(Ordering::SeqCst), 1);
    assert_eq!(transport.resumed.load(Ordering::SeqCst), 1);

    request.cancel();
    assert!(request.response().await.is_err());
}

#[tokio::test]
async fn test_concurrent_completions_deliver_once() {
    let transport = MockTransport::new(vec![Reply::Hang]);
    let finished = Arc::new(AtomicUsize::new(0));
    let session = session(&transport)
        .monitor(FinishCounter(finished.clone()))
        .build()
        .unwrap();

    let request = session.request(RequestDescriptor::get(URL));
    wait_until(|| request.state() == RequestState::Running).await;
    let (task, events) = transport.live_task().unwrap();
    events.response_received(task, ResponseHead::new(200, HeaderSet::new(), URL));

    let threads: Vec<_> = (0..100)
        .map(|_| {
            let events = events.clone();
            std::thread::spawn(move || events.task_completed(task, None))
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }

    let response = request.response().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_invalidation_fails_outstanding_and_later_requests() {
    let transport = MockTransport::new(vec![Reply::Hang, Reply::Hang]);
    let session = session(&transport).build().unwrap();

    let first = session.request(RequestDescriptor::get(URL));
    let second = session.request(RequestDescriptor::get(URL));
    wait_until(|| transport.created() == 2).await;

    session.invalidate_and_cancel();
    assert!(session.is_invalidated());

    for request in [first, second] {
        let error = request.response().await.unwrap_err();
        assert!(matches!(error, RequestError::SessionInvalidated));
    }
    let late = session.request(RequestDescriptor::get(URL)).response().await.unwrap_err();
    assert!(matches!(late, RequestError::SessionInvalidated));
    assert_eq!(transport.created(), 2);
    assert_eq!(session.outstanding_requests(), 0);
}

#[tokio::test]
async fn test_dropping_session_invalidates() {
    let transport = MockTransport::new(vec![Reply::Hang]);
    let session: Session = session(&transport).build().unwrap();

    let request = session.request(RequestDescriptor::get(URL));
    wait_until(|| transport.created() == 1).await;
    drop(session);

    let error = request.response().await.unwrap_err();
    assert!(matches!(error, RequestError::SessionInvalidated));
    assert_eq!(transport.cancelled(), 1);
}

#[tokio::test]
async fn test_dropping_handle_cancels_task() {
    let transport = MockTransport::new(vec![Reply::Hang]);
    let session = session(&transport).build().unwrap();

    let request = session.request(RequestDescriptor::get(URL));
    wait_until(|| request.state() == RequestState::Running).await;
    drop(request);

    wait_until(|| transport.cancelled() == 1).await;
    wait_until(|| session.outstanding_requests() == 0).await;
}

#[tokio::test]
async fn test_request_cache_handler_overrides_session() {
    let cacheable = Reply::RespondCacheable {
        status: 200,
        body: Bytes::from_static(b"cached"),
    };
    let transport = MockTransport::new(vec![cacheable.clone(), cacheable]);
    let session = session(&transport)
        .cache_handler(ResponseCacher::cache())
        .build()
        .unwrap();

    let options = RequestOptions::new().with_cache_handler(ResponseCacher::do_not_cache());
    session
        .request_with(RequestDescriptor::get(URL), BytesDecoder, options)
        .response()
        .await
        .unwrap();
    session.request(RequestDescriptor::get(URL)).response().await.unwrap();

    assert_eq!(transport.cache_decisions(), vec![false, true]);
}

#[tokio::test]
async fn test_failed_challenge_never_consults_provider() {
    let space = ProtectionSpace {
        host: "mock.test".into(),
        port: 80,
        realm: Some("api".into()),
        method: AuthMethod::Basic,
    };
    let transport = MockTransport::new(vec![
        Reply::Challenge(Challenge::new(space.clone()).with_previous_failures(1)),
        Reply::Challenge(Challenge::new(space)),
    ]);
    let calls = Arc::new(AtomicUsize::new(0));
    let session = session(&transport)
        .credential_provider(CountingProvider(calls.clone()))
        .build()
        .unwrap();

    session.request(RequestDescriptor::get(URL)).response().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    session.request(RequestDescriptor::get(URL)).response().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let dispositions = transport.dispositions();
    assert!(matches!(dispositions[0], ChallengeDisposition::RejectProtectionSpace));
    assert!(matches!(dispositions[1], ChallengeDisposition::UseCredential(_)));
}

#[tokio::test]
async fn test_untrusted_chain_fails_with_trust_error() {
    let anchors = Arc::new(TrustedAnchors::with_anchors([Certificate::from_der(vec![1, 1, 1])]));
    let space = ProtectionSpace {
        host: "pinned.test".into(),
        port: 443,
        realm: None,
        method: AuthMethod::ServerTrust,
    };
    let untrusted = ServerTrust::new("pinned.test", vec![Certificate::from_der(vec![2, 2, 2])]);
    let transport = MockTransport::new(vec![Reply::Challenge(Challenge::new(space).with_server_trust(untrusted))]);
    let session = session(&transport)
        .trust_evaluator("pinned.test", PinnedCertificatesEvaluator::new(anchors))
        .build()
        .unwrap();

    let error = session.request(RequestDescriptor::get(URL)).response().await.unwrap_err();

    assert!(matches!(error, RequestError::TrustEvaluation { ref host, .. } if host == "pinned.test"));
    assert!(matches!(transport.dispositions()[0], ChallengeDisposition::CancelChallenge));
}

#[tokio::test]
async fn test_stream_signals_restart_between_attempts() {
    let transport = MockTransport::new(vec![
        Reply::Respond {
            status: 503,
            headers: HeaderSet::new(),
            body: Bytes::from_static(b"bad"),
        },
        Reply::ok("good"),
    ]);
    let session = session(&transport)
        .retrier(RetryPolicy::new(1).with_backoff(0, 0))
        .build()
        .unwrap();

    let options = RequestOptions::new().with_validation(Validation::success());
    let events: Vec<StreamEvent> = session.stream(RequestDescriptor::get(URL), options).collect().await;

    assert!(matches!(&events[0], StreamEvent::Response(head) if head.status == 503));
    assert!(matches!(&events[1], StreamEvent::Data(data) if data.as_ref() == b"bad"));
    assert!(matches!(events[2], StreamEvent::Restarted { attempt: 1 }));
    assert!(matches!(&events[3], StreamEvent::Response(head) if head.status == 200));
    assert!(matches!(&events[4], StreamEvent::Data(data) if data.as_ref() == b"good"));
    assert!(matches!(&events[5], StreamEvent::Finished(Ok(head)) if head.status == 200));
    assert_eq!(events.len(), 6);
}

struct TransitionLog(Arc<Mutex<Vec<(RequestState, RequestState)>>>);

impl EventMonitor for TransitionLog {
    fn state_changed(&self, _id: RequestId, from: RequestState, to: RequestState) {
        self.0.lock().unwrap().push((from, to));
    }
}

/// Blocks inside `decode` until released.
struct GatedDecoder {
    entered: Arc<AtomicBool>,
    gate: Mutex<mpsc::Receiver<()>>,
}

impl ResponseDecoder for GatedDecoder {
    type Output = Bytes;

    fn decode(&self, _head: &ResponseHead, body: Bytes) -> Result<Bytes, DecodeError> {
        self.entered.store(true, Ordering::SeqCst);
        let _ = self.gate.lock().unwrap().recv_timeout(Duration::from_secs(2));
        Ok(body)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_during_decode_does_not_reopen_state() {
    let transport = MockTransport::new(vec![Reply::ok("decoded")]);
    let transitions = Arc::new(Mutex::new(Vec::new()));
    let session = session(&transport)
        .monitor(TransitionLog(transitions.clone()))
        .build()
        .unwrap();

    let (release, gate) = mpsc::channel();
    let entered = Arc::new(AtomicBool::new(false));
    let decoder = GatedDecoder {
        entered: entered.clone(),
        gate: Mutex::new(gate),
    };
    let request = session.request_with(RequestDescriptor::get(URL), decoder, RequestOptions::new());
    let handle = request.handle();

    let flag = entered.clone();
    wait_until(move || flag.load(Ordering::SeqCst)).await;
    assert!(handle.is_finished());
    assert!(!handle.cancel());
    release.send(()).unwrap();

    let response = request.response().await.unwrap();
    assert_eq!(response.value, Bytes::from_static(b"decoded"));
    assert_eq!(handle.state(), RequestState::Succeeded);

    let log = transitions.lock().unwrap();
    assert!(!log.iter().any(|(_, to)| *to == RequestState::Cancelled));
    assert_eq!(log.iter().filter(|(from, _)| *from == RequestState::Running).count(), 1);
    assert_eq!(log.last(), Some(&(RequestState::Running, RequestState::Succeeded)));
}
