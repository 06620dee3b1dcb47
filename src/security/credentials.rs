//! Credentials and credential providers.

use std::collections::HashMap;
use std::fmt;

use base64::Engine;

use crate::http::RequestDescriptor;
use crate::security::challenge::ProtectionSpace;
use crate::security::trust::ServerTrust;

/// How long a transport may remember a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Persistence {
    None,
    #[default]
    ForSession,
}

/// Answer material for a challenge.
#[derive(Clone)]
pub enum Credential {
    Password {
        user: String,
        password: String,
        persistence: Persistence,
    },
    /// DER-encoded client identity.
    ClientCertificate { identity: Vec<u8> },
    /// Accepts the evaluated server trust.
    ServerTrust(ServerTrust),
}

impl Credential {
    pub fn password(user: impl Into<String>, password: impl Into<String>) -> Self {
        Credential::Password {
            user: user.into(),
            password: password.into(),
            persistence: Persistence::default(),
        }
    }

    /// `Authorization` header value for Basic authentication.
    pub fn basic_authorization(&self) -> Option<String> {
        match self {
            Credential::Password { user, password, .. } => {
                let token = base64::engine::general_purpose::STANDARD
                    .encode(format!("{user}:{password}"));
                Some(format!("Basic {token}"))
            }
            _ => None,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Password { user, persistence, .. } => f
                .debug_struct("Password")
                .field("user", user)
                .field("password", &"<redacted>")
                .field("persistence", persistence)
                .finish(),
            Credential::ClientCertificate { identity } => {
                write!(f, "ClientCertificate({} bytes)", identity.len())
            }
            Credential::ServerTrust(trust) => write!(f, "ServerTrust({})", trust.host),
        }
    }
}

/// Supplies credentials for authentication challenges.
pub trait CredentialProvider: Send + Sync {
    fn credential(&self, space: &ProtectionSpace, request: &RequestDescriptor) -> Option<Credential>;
}

/// A single credential answers every space.
impl CredentialProvider for Credential {
    fn credential(&self, _space: &ProtectionSpace, _request: &RequestDescriptor) -> Option<Credential> {
        Some(self.clone())
    }
}

/// Fixed credentials keyed by host.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    by_host: HashMap<String, Credential>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>, credential: Credential) -> Self {
        self.by_host.insert(host.into().to_ascii_lowercase(), credential);
        self
    }
}

impl CredentialProvider for StaticCredentials {
    fn credential(&self, space: &ProtectionSpace, _request: &RequestDescriptor) -> Option<Credential> {
        self.by_host.get(&space.host.to_ascii_lowercase()).cloned()
    }
}
