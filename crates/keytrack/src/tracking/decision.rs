//! The decision step: whether to sign a statement for what was found.

use crate::error::Result;

use super::outcome::IdentityOutcome;

/// What the caller decided after seeing an [`IdentityOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Proceed { local_only: bool },
    Cancel,
}

/// Caller-supplied policy consulted between identifying and signing.
///
/// Returning an error aborts the run with that error; returning
/// [`Decision::Cancel`] aborts it with `UserCancelled`.
pub trait DecisionMaker: Send + Sync {
    fn decide(&self, outcome: &IdentityOutcome) -> Result<Decision>;
}

/// Always signs, whatever the proofs said.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysProceed {
    pub local_only: bool,
}

impl DecisionMaker for AlwaysProceed {
    fn decide(&self, _outcome: &IdentityOutcome) -> Result<Decision> {
        Ok(Decision::Proceed {
            local_only: self.local_only,
        })
    }
}

/// Always declines.
#[derive(Debug, Default, Clone, Copy)]
pub struct CancelAll;

impl DecisionMaker for CancelAll {
    fn decide(&self, _outcome: &IdentityOutcome) -> Result<Decision> {
        Ok(Decision::Cancel)
    }
}

/// Signs only when every proof passed; otherwise fails the run with
/// `IdentityVerification` listing the proofs that did not.
#[derive(Debug, Default, Clone, Copy)]
pub struct StrictDecider;

impl DecisionMaker for StrictDecider {
    fn decide(&self, outcome: &IdentityOutcome) -> Result<Decision> {
        match outcome.verification_error() {
            Some(err) => Err(err),
            None => Ok(Decision::Proceed { local_only: false }),
        }
    }
}
