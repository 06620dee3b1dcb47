//! Response types handed back to callers.

use std::time::Duration;

use crate::http::{HeaderSet, RequestDescriptor};

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: HeaderSet,
    /// Final URL after redirects.
    pub url: String,
}

impl ResponseHead {
    pub fn new(status: u16, headers: HeaderSet, url: impl Into<String>) -> Self {
        Self {
            status,
            headers,
            url: url.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// MIME type without parameters, lowercased.
    pub fn mime_type(&self) -> Option<String> {
        self.headers.get("content-type").map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }

    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get("content-length")
            .and_then(|v| v.trim().parse().ok())
    }
}

/// A completed request with its decoded value.
#[derive(Debug, Clone)]
pub struct Response<T> {
    pub head: ResponseHead,
    pub value: T,
    /// The descriptor of the attempt that produced this response.
    pub request: RequestDescriptor,
    pub retry_count: u32,
    pub elapsed: Duration,
}

impl<T> Response<T> {
    pub fn status(&self) -> u16 {
        self.head.status
    }

    pub fn headers(&self) -> &HeaderSet {
        &self.head.headers
    }

    pub fn into_value(self) -> T {
        self.value
    }
}
