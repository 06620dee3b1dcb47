//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Attempt fails with a retry-eligible error:
//!     → retries.rs (RetryPolicy: limit, method, error kind, status code)
//!     → backoff.rs (exponential delay with jitter)
//!     → RetryDecision handed back to the state machine
//! ```
//!
//! # Design Decisions
//! - Retries only for idempotent methods by default
//! - Jittered backoff prevents thundering herd
//! - Trust failures are never retried by the stock policy

pub mod backoff;
pub mod retries;

pub use retries::RetryPolicy;
