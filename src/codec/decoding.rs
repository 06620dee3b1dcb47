//! Response body decoders.

use std::marker::PhantomData;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::http::ResponseHead;

/// Why a body could not be decoded.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    #[error("empty response body (status {status})")]
    EmptyBody { status: u16 },

    #[error("body is not valid UTF-8: {0}")]
    InvalidUtf8(String),

    #[error("invalid JSON: {0}")]
    Json(String),
}

/// Turns a completed body into a typed value. Invoked once per request, on
/// the final successful attempt.
pub trait ResponseDecoder: Send + Sync + 'static {
    type Output: Send + 'static;

    fn decode(&self, head: &ResponseHead, body: Bytes) -> Result<Self::Output, DecodeError>;
}

/// Statuses that legitimately carry no body.
fn allows_empty(head: &ResponseHead) -> bool {
    matches!(head.status, 204 | 205)
}

/// Passes the raw bytes through.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesDecoder;

impl ResponseDecoder for BytesDecoder {
    type Output = Bytes;

    fn decode(&self, _head: &ResponseHead, body: Bytes) -> Result<Bytes, DecodeError> {
        Ok(body)
    }
}

/// Decodes UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringDecoder;

impl ResponseDecoder for StringDecoder {
    type Output = String;

    fn decode(&self, head: &ResponseHead, body: Bytes) -> Result<String, DecodeError> {
        if body.is_empty() && !allows_empty(head) {
            return Err(DecodeError::EmptyBody { status: head.status });
        }
        String::from_utf8(body.to_vec()).map_err(|e| DecodeError::InvalidUtf8(e.to_string()))
    }
}

/// Deserializes a JSON body into `T`.
pub struct JsonDecoder<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonDecoder<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned + Send + 'static> ResponseDecoder for JsonDecoder<T> {
    type Output = T;

    fn decode(&self, head: &ResponseHead, body: Bytes) -> Result<T, DecodeError> {
        if body.is_empty() {
            return Err(DecodeError::EmptyBody { status: head.status });
        }
        serde_json::from_slice(&body).map_err(|e| DecodeError::Json(e.to_string()))
    }
}
