//! Stock adapters.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::BoxError;
use crate::http::{HeaderSet, RequestDescriptor};
use crate::interceptor::{AdaptContext, Adapter};

/// Header carrying the per-attempt correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Adds headers the descriptor does not already carry.
#[derive(Debug, Clone, Default)]
pub struct DefaultHeaders {
    headers: HeaderSet,
}

impl DefaultHeaders {
    pub fn new(headers: HeaderSet) -> Self {
        Self { headers }
    }
}

#[async_trait]
impl Adapter for DefaultHeaders {
    async fn adapt(
        &self,
        descriptor: RequestDescriptor,
        _context: &AdaptContext,
    ) -> Result<RequestDescriptor, BoxError> {
        let mut headers = descriptor.headers().clone();
        headers.merge(&self.headers, false);
        Ok(descriptor.with_headers(headers))
    }
}

/// Stamps a fresh UUID v4 `x-request-id` on every attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdAdapter;

#[async_trait]
impl Adapter for RequestIdAdapter {
    async fn adapt(
        &self,
        descriptor: RequestDescriptor,
        _context: &AdaptContext,
    ) -> Result<RequestDescriptor, BoxError> {
        Ok(descriptor.with_header(X_REQUEST_ID, Uuid::new_v4().to_string()))
    }
}
