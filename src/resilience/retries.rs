//! Retry policy.
//!
//! # Responsibilities
//! - Determine if a failed attempt is retryable (method, error kind, status)
//! - Enforce the retry limit
//! - Compute the backoff delay for the next attempt
//!
//! # Design Decisions
//! - Never retry POST/PATCH unless explicitly allowed (non-idempotent)
//! - Connection failures and timeouts retryable; status codes configurable
//! - A limit of N means at most N retries, N + 1 attempts in total

use async_trait::async_trait;

use crate::config::RetryConfig;
use crate::error::{RequestError, TransportErrorKind};
use crate::interceptor::{Retrier, RetryContext, RetryDecision};
use crate::request::validation::ValidationFailure;
use crate::resilience::backoff::calculate_backoff;

/// Status codes retried by default.
pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 5] = [408, 500, 502, 503, 504];

/// Limit-bounded retrier with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    retry_limit: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    idempotent_only: bool,
    retryable_status_codes: Vec<u16>,
    retryable_transport_errors: Vec<TransportErrorKind>,
}

impl RetryPolicy {
    pub fn new(retry_limit: u32) -> Self {
        Self {
            retry_limit,
            base_delay_ms: 100,
            max_delay_ms: 2000,
            idempotent_only: true,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.to_vec(),
            retryable_transport_errors: vec![
                TransportErrorKind::TimedOut,
                TransportErrorKind::ConnectionFailed,
                TransportErrorKind::Other,
            ],
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_retries)
            .with_backoff(config.base_delay_ms, config.max_delay_ms)
            .with_status_codes(config.retryable_status_codes.clone())
    }

    pub fn with_backoff(mut self, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self.max_delay_ms = max_delay_ms;
        self
    }

    pub fn with_status_codes(mut self, codes: Vec<u16>) -> Self {
        self.retryable_status_codes = codes;
        self
    }

    /// Also retry non-idempotent methods.
    pub fn allow_non_idempotent(mut self) -> Self {
        self.idempotent_only = false;
        self
    }

    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    fn is_retryable_error(&self, context: &RetryContext, error: &RequestError) -> bool {
        match error {
            RequestError::Transport(e) => self.retryable_transport_errors.contains(&e.kind),
            RequestError::Validation(ValidationFailure::UnacceptableStatusCode(code)) => {
                self.retryable_status_codes.contains(code)
            }
            RequestError::Validation(_) => context
                .response
                .as_ref()
                .is_some_and(|head| self.retryable_status_codes.contains(&head.status)),
            _ => false,
        }
    }

    /// Synchronous decision used by the `Retrier` impl.
    pub fn decide(&self, context: &RetryContext, error: &RequestError) -> RetryDecision {
        if context.retry_count >= self.retry_limit {
            return RetryDecision::DoNotRetry;
        }
        if self.idempotent_only && !context.descriptor.method().is_idempotent() {
            return RetryDecision::DoNotRetry;
        }
        if !self.is_retryable_error(context, error) {
            return RetryDecision::DoNotRetry;
        }

        let delay = calculate_backoff(context.retry_count + 1, self.base_delay_ms, self.max_delay_ms);
        if delay.is_zero() {
            RetryDecision::RetryImmediately
        } else {
            RetryDecision::RetryAfter(delay)
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2)
    }
}

#[async_trait]
impl Retrier for RetryPolicy {
    async fn retry(&self, context: &RetryContext, error: &RequestError) -> RetryDecision {
        self.decide(context, error)
    }
}
