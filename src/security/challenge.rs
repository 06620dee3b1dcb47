//! Challenge model.

use crate::security::credentials::Credential;
use crate::security::trust::ServerTrust;

/// Authentication method named by a challenge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuthMethod {
    Basic,
    Digest,
    Ntlm,
    Negotiate,
    ClientCertificate,
    ServerTrust,
    Other(String),
}

impl AuthMethod {
    /// Resolve a raw method tag (e.g. a `WWW-Authenticate` scheme).
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "basic" => AuthMethod::Basic,
            "digest" => AuthMethod::Digest,
            "ntlm" => AuthMethod::Ntlm,
            "negotiate" => AuthMethod::Negotiate,
            "clientcertificate" | "client-certificate" => AuthMethod::ClientCertificate,
            "servertrust" | "server-trust" => AuthMethod::ServerTrust,
            _ => AuthMethod::Other(tag.to_string()),
        }
    }

    pub fn is_server_trust(&self) -> bool {
        matches!(self, AuthMethod::ServerTrust)
    }
}

/// The realm a challenge protects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionSpace {
    pub host: String,
    pub port: u16,
    pub realm: Option<String>,
    pub method: AuthMethod,
}

/// An authentication or trust challenge raised by the transport.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub space: ProtectionSpace,
    /// How many times this space has already been answered unsuccessfully.
    pub previous_failure_count: u32,
    /// Present for server-trust challenges.
    pub server_trust: Option<ServerTrust>,
}

impl Challenge {
    pub fn new(space: ProtectionSpace) -> Self {
        Self {
            space,
            previous_failure_count: 0,
            server_trust: None,
        }
    }

    pub fn with_previous_failures(mut self, count: u32) -> Self {
        self.previous_failure_count = count;
        self
    }

    pub fn with_server_trust(mut self, trust: ServerTrust) -> Self {
        self.server_trust = Some(trust);
        self
    }
}

/// Answer to a challenge.
#[derive(Debug, Clone)]
pub enum ChallengeDisposition {
    UseCredential(Credential),
    PerformDefault,
    CancelChallenge,
    RejectProtectionSpace,
}

/// Callback through which a disposition is returned to the transport.
pub type ChallengeCompletion = Box<dyn FnOnce(ChallengeDisposition) + Send>;

/// Parse a `WWW-Authenticate` value into its scheme and realm.
pub fn parse_www_authenticate(value: &str) -> Option<(AuthMethod, Option<String>)> {
    let value = value.trim();
    let (scheme, params) = match value.split_once(char::is_whitespace) {
        Some((scheme, rest)) => (scheme, rest),
        None => (value, ""),
    };
    if scheme.is_empty() {
        return None;
    }

    let realm = params.split(',').find_map(|param| {
        let (key, val) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("realm") {
            Some(val.trim().trim_matches('"').to_string())
        } else {
            None
        }
    });
    Some((AuthMethod::from_tag(scheme), realm))
}
