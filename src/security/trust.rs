//! Server trust evaluation.
//!
//! # Responsibilities
//! - Select a `TrustEvaluator` by host
//! - Keep a thread-safe, de-duplicated list of trusted anchor certificates
//! - Accept or reject a presented certificate chain
//!
//! # Design Decisions
//! - Hosts without an evaluator fall back to platform default handling
//!   unless every host is required to be evaluated
//! - Anchors are swapped atomically so readers never take a lock

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;

/// A DER-encoded certificate.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Certificate(Vec<u8>);

impl Certificate {
    pub fn from_der(der: impl Into<Vec<u8>>) -> Self {
        Self(der.into())
    }

    pub fn as_der(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Certificate({} bytes)", self.0.len())
    }
}

/// The identity a server presented during the TLS handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTrust {
    pub host: String,
    /// Leaf first.
    pub chain: Vec<Certificate>,
}

impl ServerTrust {
    pub fn new(host: impl Into<String>, chain: Vec<Certificate>) -> Self {
        Self {
            host: host.into(),
            chain,
        }
    }
}

/// Why a server's identity was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrustError {
    #[error("no trust evaluator configured for {host}")]
    NoEvaluator { host: String },

    #[error("server presented no certificates")]
    EmptyChain,

    #[error("certificate chain for {host} does not contain a trusted anchor")]
    UntrustedChain { host: String },

    #[error("{0}")]
    Rejected(String),
}

/// Decides whether a server identity is acceptable.
pub trait TrustEvaluator: Send + Sync {
    fn evaluate(&self, trust: &ServerTrust, host: &str) -> Result<(), TrustError>;
}

/// Accepts any server. Meant for development hosts only.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledEvaluator;

impl TrustEvaluator for DisabledEvaluator {
    fn evaluate(&self, _trust: &ServerTrust, _host: &str) -> Result<(), TrustError> {
        Ok(())
    }
}

/// Thread-safe list of trusted anchor certificates.
#[derive(Debug, Default)]
pub struct TrustedAnchors {
    anchors: ArcSwap<Vec<Certificate>>,
}

impl TrustedAnchors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_anchors(anchors: impl IntoIterator<Item = Certificate>) -> Self {
        let list = Self::new();
        for anchor in anchors {
            list.add(anchor);
        }
        list
    }

    /// Append an anchor. Returns false if it was already present.
    pub fn add(&self, anchor: Certificate) -> bool {
        let mut added = false;
        self.anchors.rcu(|current| {
            if current.contains(&anchor) {
                added = false;
                Arc::clone(current)
            } else {
                added = true;
                let mut next = Vec::clone(current);
                next.push(anchor.clone());
                Arc::new(next)
            }
        });
        if added {
            tracing::info!(anchors = self.len(), "Trusted anchor added");
        }
        added
    }

    pub fn contains(&self, certificate: &Certificate) -> bool {
        self.anchors.load().contains(certificate)
    }

    pub fn len(&self) -> usize {
        self.anchors.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the current anchors, in insertion order.
    pub fn snapshot(&self) -> Arc<Vec<Certificate>> {
        self.anchors.load_full()
    }
}

/// Accepts a chain only if one of its certificates is a trusted anchor.
#[derive(Debug, Clone)]
pub struct PinnedCertificatesEvaluator {
    anchors: Arc<TrustedAnchors>,
}

impl PinnedCertificatesEvaluator {
    pub fn new(anchors: Arc<TrustedAnchors>) -> Self {
        Self { anchors }
    }
}

impl TrustEvaluator for PinnedCertificatesEvaluator {
    fn evaluate(&self, trust: &ServerTrust, host: &str) -> Result<(), TrustError> {
        if trust.chain.is_empty() {
            return Err(TrustError::EmptyChain);
        }
        if trust.chain.iter().any(|cert| self.anchors.contains(cert)) {
            Ok(())
        } else {
            Err(TrustError::UntrustedChain {
                host: host.to_string(),
            })
        }
    }
}

/// Per-session mapping from host to evaluator.
///
/// A host mapped to `None` is explicitly left to platform default handling.
#[derive(Clone, Default)]
pub struct ServerTrustManager {
    evaluators: HashMap<String, Option<Arc<dyn TrustEvaluator>>>,
    all_hosts_must_be_evaluated: bool,
}

impl ServerTrustManager {
    pub fn new(all_hosts_must_be_evaluated: bool) -> Self {
        Self {
            evaluators: HashMap::new(),
            all_hosts_must_be_evaluated,
        }
    }

    pub fn with_evaluator(mut self, host: impl Into<String>, evaluator: Arc<dyn TrustEvaluator>) -> Self {
        self.insert(host, evaluator);
        self
    }

    pub fn with_default_handling(mut self, host: impl Into<String>) -> Self {
        self.evaluators.insert(host.into().to_ascii_lowercase(), None);
        self
    }

    pub fn insert(&mut self, host: impl Into<String>, evaluator: Arc<dyn TrustEvaluator>) {
        self.evaluators
            .insert(host.into().to_ascii_lowercase(), Some(evaluator));
    }

    pub fn all_hosts_must_be_evaluated(&self) -> bool {
        self.all_hosts_must_be_evaluated
    }

    /// `Ok(None)` means "use platform default handling".
    pub fn evaluator_for(&self, host: &str) -> Result<Option<Arc<dyn TrustEvaluator>>, TrustError> {
        match self.evaluators.get(&host.to_ascii_lowercase()) {
            Some(evaluator) => Ok(evaluator.clone()),
            None if self.all_hosts_must_be_evaluated => Err(TrustError::NoEvaluator {
                host: host.to_string(),
            }),
            None => Ok(None),
        }
    }
}

impl fmt::Debug for ServerTrustManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hosts: Vec<_> = self.evaluators.keys().collect();
        hosts.sort();
        f.debug_struct("ServerTrustManager")
            .field("hosts", &hosts)
            .field("all_hosts_must_be_evaluated", &self.all_hosts_must_be_evaluated)
            .finish()
    }
}
