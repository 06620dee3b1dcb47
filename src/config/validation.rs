//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (delays ordered, status codes in range)
//! - Check trust entries are complete and unique
//! - Require a non-empty response store
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: CourierConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::{CourierConfig, EvaluatorKind};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem, tagged with the offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &CourierConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.session.label.trim().is_empty() {
        errors.push(ValidationError::new("session.label", "must not be empty"));
    }
    for name in config.session.default_headers.keys() {
        if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c == ':') {
            errors.push(ValidationError::new(
                "session.default_headers",
                format!("invalid header name `{name}`"),
            ));
        }
    }

    let retry = &config.retry;
    if retry.base_delay_ms > retry.max_delay_ms {
        errors.push(ValidationError::new(
            "retry.base_delay_ms",
            format!(
                "must not exceed retry.max_delay_ms ({} > {})",
                retry.base_delay_ms, retry.max_delay_ms
            ),
        ));
    }
    for code in &retry.retryable_status_codes {
        if !(100..=599).contains(code) {
            errors.push(ValidationError::new(
                "retry.retryable_status_codes",
                format!("{code} is not an HTTP status code"),
            ));
        }
    }

    if config.cache.max_entries == 0 {
        errors.push(ValidationError::new("cache.max_entries", "must be at least 1"));
    }

    let mut seen = HashSet::new();
    for (i, entry) in config.trust.hosts.iter().enumerate() {
        let field = format!("trust.hosts[{i}]");
        if entry.host.trim().is_empty() {
            errors.push(ValidationError::new(format!("{field}.host"), "must not be empty"));
        } else if !seen.insert(entry.host.to_ascii_lowercase()) {
            errors.push(ValidationError::new(
                format!("{field}.host"),
                format!("duplicate host `{}`", entry.host),
            ));
        }
        match entry.evaluator {
            EvaluatorKind::Pinned if entry.anchors.is_empty() => {
                errors.push(ValidationError::new(
                    format!("{field}.anchors"),
                    "pinned evaluator needs at least one anchor",
                ));
            }
            EvaluatorKind::Default | EvaluatorKind::Disabled if !entry.anchors.is_empty() => {
                errors.push(ValidationError::new(
                    format!("{field}.anchors"),
                    "anchors are only used by the pinned evaluator",
                ));
            }
            _ => {}
        }
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level `{}`", config.observability.log_level),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
