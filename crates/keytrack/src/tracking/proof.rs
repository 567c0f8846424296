//! Pluggable proof verification.
//!
//! Each external service is checked by one [`ProofVerifier`] registered
//! under the service name. The engine never knows how a service is
//! checked; it only sees the status.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::identity::Uid;

use super::assertion::SocialAssertion;

/// Outcome of checking one assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofStatus {
    Pass,
    Fail,
    /// The proof could not be checked (no verifier, verifier crashed).
    Indeterminate,
}

/// A checked assertion, as recorded in a tracking statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofResult {
    #[serde(flatten)]
    pub assertion: SocialAssertion,
    pub status: ProofStatus,
    pub checked_at: u64,
}

impl ProofResult {
    pub fn is_pass(&self) -> bool {
        self.status == ProofStatus::Pass
    }
}

/// Why a verifier could not produce a status.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProofError {
    /// Worth retrying (network hiccup, rate limit).
    #[error("transient proof error: {0}")]
    Transient(String),

    /// Retrying will not help; recorded as `Fail`.
    #[error("proof error: {0}")]
    Permanent(String),
}

/// Checks assertions for one external service.
///
/// Implementations hold no state shared with other verifiers, so the
/// registry may run them in parallel.
pub trait ProofVerifier: Send + Sync {
    fn verify(
        &self,
        assertion: &SocialAssertion,
        owner: &Uid,
    ) -> std::result::Result<ProofStatus, ProofError>;
}

/// Service name to verifier.
#[derive(Default, Clone)]
pub struct ProofVerifierRegistry {
    verifiers: HashMap<String, Arc<dyn ProofVerifier>>,
}

impl ProofVerifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, service: impl Into<String>, verifier: Arc<dyn ProofVerifier>) {
        let service = service.into().to_ascii_lowercase();
        self.verifiers.insert(service, verifier);
    }

    pub fn with(mut self, service: impl Into<String>, verifier: Arc<dyn ProofVerifier>) -> Self {
        self.register(service, verifier);
        self
    }

    pub fn services(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.verifiers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Check one assertion, retrying transient errors up to `attempts`
    /// times in total. An unknown service is `Indeterminate`.
    pub fn check(&self, assertion: &SocialAssertion, owner: &Uid, attempts: u32) -> ProofStatus {
        let Some(verifier) = self.verifiers.get(&assertion.service) else {
            log::debug!("no verifier registered for {}", assertion.service);
            return ProofStatus::Indeterminate;
        };

        let attempts = attempts.max(1);
        for attempt in 1..=attempts {
            match verifier.verify(assertion, owner) {
                Ok(status) => return status,
                Err(ProofError::Transient(reason)) if attempt < attempts => {
                    log::warn!("{assertion}: attempt {attempt}/{attempts} failed: {reason}");
                }
                Err(ProofError::Transient(reason)) => {
                    log::warn!("{assertion}: giving up after {attempts} attempts: {reason}");
                }
                Err(ProofError::Permanent(reason)) => {
                    log::warn!("{assertion}: {reason}");
                    return ProofStatus::Fail;
                }
            }
        }
        ProofStatus::Fail
    }

    /// Check every assertion, one thread per assertion when `parallel`.
    /// Statuses come back in the order of `assertions`.
    pub fn check_all(
        &self,
        assertions: &[SocialAssertion],
        owner: &Uid,
        attempts: u32,
        parallel: bool,
    ) -> Vec<ProofStatus> {
        if !parallel || assertions.len() < 2 {
            return assertions
                .iter()
                .map(|a| self.check(a, owner, attempts))
                .collect();
        }

        std::thread::scope(|scope| {
            let handles: Vec<_> = assertions
                .iter()
                .map(|a| scope.spawn(move || self.check(a, owner, attempts)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or(ProofStatus::Indeterminate))
                .collect()
        })
    }
}

impl std::fmt::Debug for ProofVerifierRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofVerifierRegistry")
            .field("services", &self.services())
            .finish()
    }
}
