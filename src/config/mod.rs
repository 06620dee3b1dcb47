//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → CourierConfig (validated, immutable)
//!     → SessionBuilder::from_config (session-level default policies)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a new session picks up changes
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    CacheConfig, CourierConfig, EvaluatorKind, HostTrustConfig, ObservabilityConfig, RedirectConfig,
    RetryConfig, SessionConfig, TrustConfig,
};
