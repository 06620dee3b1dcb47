//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a courier
//! session. All types derive Serde traits for deserialization from config
//! files; every section is optional.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::http::CachePolicy;
use crate::resilience::retries::DEFAULT_RETRYABLE_STATUS_CODES;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CourierConfig {
    /// Session-wide request defaults.
    pub session: SessionConfig,

    /// Stock retry policy.
    pub retry: RetryConfig,

    /// Redirect handling.
    pub redirect: RedirectConfig,

    /// Response cache writes.
    pub cache: CacheConfig,

    /// Server trust evaluation.
    pub trust: TrustConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Session-wide request defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Label used in logs and passed to adapters.
    pub label: String,

    /// Start requests as soon as they are created.
    pub start_requests_immediately: bool,

    /// Timeout applied to descriptors without one. 0 disables.
    pub timeout_secs: u64,

    /// Cache policy for descriptors built through the session.
    pub cache_policy: CachePolicy,

    /// Headers added to every request unless already present.
    pub default_headers: BTreeMap<String, String>,

    /// Stamp a fresh `x-request-id` on every attempt.
    pub request_ids: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let mut default_headers = BTreeMap::new();
        default_headers.insert(
            "User-Agent".to_string(),
            concat!("courier/", env!("CARGO_PKG_VERSION")).to_string(),
        );
        Self {
            label: "courier".to_string(),
            start_requests_immediately: true,
            timeout_secs: 60,
            cache_policy: CachePolicy::UseProtocolPolicy,
            default_headers,
            request_ids: true,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable the stock retry policy.
    pub enabled: bool,

    /// Maximum retries per request (attempts = retries + 1).
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Status codes treated as retryable when validation rejects them.
    pub retryable_status_codes: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 2,
            base_delay_ms: 100,
            max_delay_ms: 2000,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.to_vec(),
        }
    }
}

/// Redirect configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedirectConfig {
    /// Follow redirects as proposed by the transport.
    pub follow: bool,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self { follow: true }
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Allow storable responses to be written to the transport's store.
    pub store_responses: bool,

    /// Responses kept by the transport's store before the oldest is evicted.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            store_responses: true,
            max_entries: 1024,
        }
    }
}

/// Trust configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TrustConfig {
    /// Fail challenges for hosts without an entry.
    pub all_hosts_must_be_evaluated: bool,

    /// Per-host evaluators.
    pub hosts: Vec<HostTrustConfig>,
}

/// Evaluator for one host.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostTrustConfig {
    pub host: String,

    #[serde(default)]
    pub evaluator: EvaluatorKind,

    /// DER certificate files, for `pinned`.
    #[serde(default)]
    pub anchors: Vec<PathBuf>,
}

/// Which evaluator to install for a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluatorKind {
    /// Platform default handling.
    #[default]
    Default,
    /// Accept any server identity.
    Disabled,
    /// Require a trusted anchor in the chain.
    Pinned,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level when `RUST_LOG` is unset (trace, debug, info, warn, error).
    pub log_level: String,

    /// Record courier metrics through the `metrics` facade.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
        }
    }
}
