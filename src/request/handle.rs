//! Caller-facing request handles.

use std::fmt;
use std::ops::Deref;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::{mpsc, oneshot};

use crate::error::RequestError;
use crate::http::{Response, ResponseHead};
use crate::request::delivery::StreamEvent;
use crate::request::inner::RequestInner;
use crate::request::state::{Progress, RequestState};
use crate::request::RequestId;

/// Control handle for an in-flight request. Cloneable; when every handle
/// (including the typed one it came from) is dropped, the request is
/// cancelled.
#[derive(Clone)]
pub struct RequestHandle {
    inner: Arc<RequestInner>,
}

impl RequestHandle {
    pub(crate) fn new(inner: Arc<RequestInner>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> RequestId {
        self.inner.id()
    }

    pub fn state(&self) -> RequestState {
        self.inner.state()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    pub fn retry_count(&self) -> u32 {
        self.inner.retry_count()
    }

    pub fn upload_progress(&self) -> Progress {
        self.inner.upload_progress()
    }

    pub fn download_progress(&self) -> Progress {
        self.inner.download_progress()
    }

    /// Headers of the current attempt's response, once received.
    pub fn response_head(&self) -> Option<ResponseHead> {
        self.inner.response()
    }

    /// Returns false if the request already finished or was cancelled.
    pub fn cancel(&self) -> bool {
        self.inner.cancel()
    }

    pub fn pause(&self) -> bool {
        self.inner.pause()
    }

    /// Resumes a paused request, or starts one created without starting.
    pub fn resume(&self) -> bool {
        self.inner.resume()
    }
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

/// A buffered request whose body is decoded into `T`.
pub struct DataRequest<T> {
    handle: RequestHandle,
    receiver: oneshot::Receiver<Result<Response<T>, RequestError>>,
}

impl<T> DataRequest<T> {
    pub(crate) fn new(inner: Arc<RequestInner>, receiver: oneshot::Receiver<Result<Response<T>, RequestError>>) -> Self {
        Self {
            handle: RequestHandle::new(inner),
            receiver,
        }
    }

    pub fn handle(&self) -> RequestHandle {
        self.handle.clone()
    }

    /// Wait for the terminal outcome.
    pub async fn response(self) -> Result<Response<T>, RequestError> {
        let DataRequest { handle, receiver } = self;
        let result = receiver.await.unwrap_or(Err(RequestError::Cancelled));
        drop(handle);
        result
    }

    /// Wait for the terminal outcome and keep only the decoded value.
    pub async fn value(self) -> Result<T, RequestError> {
        self.response().await.map(Response::into_value)
    }
}

impl<T> Deref for DataRequest<T> {
    type Target = RequestHandle;

    fn deref(&self) -> &RequestHandle {
        &self.handle
    }
}

impl<T> fmt::Debug for DataRequest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DataRequest").field(&self.handle).finish()
    }
}

/// A streaming request: a sequence of [`StreamEvent`]s ending in exactly
/// one `Finished`.
pub struct StreamRequest {
    handle: RequestHandle,
    receiver: mpsc::UnboundedReceiver<StreamEvent>,
}

impl StreamRequest {
    pub(crate) fn new(inner: Arc<RequestInner>, receiver: mpsc::UnboundedReceiver<StreamEvent>) -> Self {
        Self {
            handle: RequestHandle::new(inner),
            receiver,
        }
    }

    pub fn handle(&self) -> RequestHandle {
        self.handle.clone()
    }
}

impl Stream for StreamRequest {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamEvent>> {
        self.receiver.poll_recv(cx)
    }
}

impl Deref for StreamRequest {
    type Target = RequestHandle;

    fn deref(&self) -> &RequestHandle {
        &self.handle
    }
}

impl fmt::Debug for StreamRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StreamRequest").field(&self.handle).finish()
    }
}
