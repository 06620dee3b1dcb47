//! Result delivery to the caller.
//!
//! A request owns exactly one `Delivery`. It sees response/data events as
//! they arrive, turns the terminal outcome into the caller-facing value in
//! `settle`, and hands it over in `deliver`. The request guarantees
//! `settle` and `deliver` run at most once.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::codec::ResponseDecoder;
use crate::error::RequestError;
use crate::http::{RequestDescriptor, Response, ResponseHead};

/// Everything known about a request that completed without error.
#[derive(Debug, Clone)]
pub(crate) struct Completion {
    pub head: ResponseHead,
    pub body: Bytes,
    pub request: RequestDescriptor,
    pub retry_count: u32,
    pub elapsed: Duration,
}

pub(crate) trait Delivery: Send {
    /// Whether body chunks should be accumulated by the request.
    fn buffers_body(&self) -> bool;

    fn on_response(&mut self, _head: &ResponseHead) {}

    fn on_data(&mut self, _chunk: &Bytes) {}

    /// A retry superseded the attempt whose events were seen so far.
    fn on_restart(&mut self, _attempt: u32) {}

    /// Prepare the terminal value. Returns the error the caller will see,
    /// which may differ from the input when decoding fails.
    fn settle(&mut self, result: Result<Completion, RequestError>) -> Result<(), RequestError>;

    fn deliver(self: Box<Self>);
}

/// Buffers the body and decodes it once on success.
pub(crate) struct BufferedDelivery<D: ResponseDecoder> {
    decoder: D,
    sender: oneshot::Sender<Result<Response<D::Output>, RequestError>>,
    settled: Option<Result<Response<D::Output>, RequestError>>,
}

impl<D: ResponseDecoder> BufferedDelivery<D> {
    pub fn new(decoder: D) -> (Self, oneshot::Receiver<Result<Response<D::Output>, RequestError>>) {
        let (sender, receiver) = oneshot::channel();
        let delivery = Self {
            decoder,
            sender,
            settled: None,
        };
        (delivery, receiver)
    }
}

impl<D: ResponseDecoder> Delivery for BufferedDelivery<D> {
    fn buffers_body(&self) -> bool {
        true
    }

    fn settle(&mut self, result: Result<Completion, RequestError>) -> Result<(), RequestError> {
        let settled = result.and_then(|completion| {
            let value = self
                .decoder
                .decode(&completion.head, completion.body)
                .map_err(RequestError::from)?;
            Ok(Response {
                head: completion.head,
                value,
                request: completion.request,
                retry_count: completion.retry_count,
                elapsed: completion.elapsed,
            })
        });
        let outcome = settled.as_ref().map(|_| ()).map_err(Clone::clone);
        self.settled = Some(settled);
        outcome
    }

    fn deliver(self: Box<Self>) {
        let this = *self;
        if let Some(settled) = this.settled {
            // The caller may have dropped its receiver.
            let _ = this.sender.send(settled);
        }
    }
}

/// Incremental events of a streaming request.
#[derive(Debug)]
pub enum StreamEvent {
    Response(ResponseHead),
    Data(Bytes),
    /// Events before this belonged to a superseded attempt.
    Restarted { attempt: u32 },
    /// Always the last event.
    Finished(Result<ResponseHead, RequestError>),
}

/// Forwards events to a channel as they arrive.
pub(crate) struct StreamDelivery {
    sender: mpsc::UnboundedSender<StreamEvent>,
    settled: Option<Result<ResponseHead, RequestError>>,
}

impl StreamDelivery {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let delivery = Self {
            sender,
            settled: None,
        };
        (delivery, receiver)
    }
}

impl Delivery for StreamDelivery {
    fn buffers_body(&self) -> bool {
        false
    }

    fn on_response(&mut self, head: &ResponseHead) {
        let _ = self.sender.send(StreamEvent::Response(head.clone()));
    }

    fn on_data(&mut self, chunk: &Bytes) {
        let _ = self.sender.send(StreamEvent::Data(chunk.clone()));
    }

    fn on_restart(&mut self, attempt: u32) {
        let _ = self.sender.send(StreamEvent::Restarted { attempt });
    }

    fn settle(&mut self, result: Result<Completion, RequestError>) -> Result<(), RequestError> {
        let settled = result.map(|completion| completion.head);
        let outcome = settled.as_ref().map(|_| ()).map_err(Clone::clone);
        self.settled = Some(settled);
        outcome
    }

    fn deliver(self: Box<Self>) {
        let this = *self;
        if let Some(settled) = this.settled {
            let _ = this.sender.send(StreamEvent::Finished(settled));
        }
    }
}
