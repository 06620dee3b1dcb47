//! Authentication challenge resolution.
//!
//! # Data Flow
//! ```text
//! Transport raises a challenge
//!     → challenge.rs (classify AuthMethod once, at ingress)
//!     → ServerTrust: trust.rs (per-host TrustEvaluator or platform default)
//!     → otherwise: credentials.rs (per-request, then per-session provider)
//!     → ChallengeDisposition handed back through the transport's callback
//! ```
//!
//! # Design Decisions
//! - Trust anchors and credentials are per-session configuration, never
//!   process-wide state
//! - A challenge that already failed once is rejected outright
//! - Evaluators must not block; dispositions are returned via callback

pub mod challenge;
pub mod credentials;
pub mod trust;

pub use challenge::{AuthMethod, Challenge, ChallengeCompletion, ChallengeDisposition, ProtectionSpace};
pub use credentials::{Credential, CredentialProvider, Persistence, StaticCredentials};
pub use trust::{
    Certificate, DisabledEvaluator, PinnedCertificatesEvaluator, ServerTrust, ServerTrustManager,
    TrustError, TrustEvaluator, TrustedAnchors,
};
