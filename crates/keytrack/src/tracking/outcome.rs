//! Aggregated result of identifying a target.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::TrustError;
use crate::identity::Uid;
use crate::keyfamily::Kid;

use super::proof::{ProofResult, ProofStatus};

/// How the proofs of a target came out, taken as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeSummary {
    /// Every assertion passed (and there was at least one).
    AllPassed,
    /// At least one passed and at least one did not.
    SomeFailed,
    /// Nothing passed, including the case of no assertions at all.
    NonePassed,
}

/// Everything the decision step needs to know about a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityOutcome {
    pub uid: Uid,
    pub username: String,
    /// In the order the target's assertions were listed.
    pub results: Vec<ProofResult>,
    pub key_fingerprints: BTreeSet<Kid>,
}

impl IdentityOutcome {
    pub fn summary(&self) -> OutcomeSummary {
        let passed = self.passed_count();
        if passed == 0 {
            OutcomeSummary::NonePassed
        } else if passed == self.results.len() {
            OutcomeSummary::AllPassed
        } else {
            OutcomeSummary::SomeFailed
        }
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_pass()).count()
    }

    /// Results that are `Fail` or `Indeterminate`.
    pub fn failures(&self) -> Vec<ProofResult> {
        self.results
            .iter()
            .filter(|r| r.status != ProofStatus::Pass)
            .cloned()
            .collect()
    }

    /// The `IdentityVerification` error describing this outcome, or `None`
    /// if every proof passed. Whether it is fatal is the decider's call.
    pub fn verification_error(&self) -> Option<TrustError> {
        let failed = self.failures();
        if failed.is_empty() {
            return None;
        }
        Some(TrustError::IdentityVerification {
            target: self.username.clone(),
            failed,
        })
    }
}
