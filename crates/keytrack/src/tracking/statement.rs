//! Tracking statements: signed, sequence-numbered records that a
//! tracker verified a trackee's proofs.

use std::collections::BTreeSet;

use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};

use crate::crypto::signing;
use crate::error::{Result, TrustError};
use crate::identity::Uid;
use crate::keyfamily::{KeyFamilyGraph, Kid};

use super::outcome::IdentityOutcome;
use super::proof::ProofResult;

/// A signed tracking statement. Immutable once created; a later statement
/// for the same pair supersedes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingStatement {
    pub tracker_uid: Uid,
    pub trackee_uid: Uid,
    pub trackee_username: String,
    pub sequence_number: u64,
    pub supersedes_sequence: Option<u64>,
    pub proof_results: Vec<ProofResult>,
    pub trackee_key_fingerprints: BTreeSet<Kid>,
    pub signing_kid: Kid,
    pub signature: String,
    pub created_at: u64,
    pub local_only: bool,
}

/// Every field except the signature, in a fixed order.
#[derive(Serialize)]
struct SigningPayload<'a> {
    tracker_uid: &'a Uid,
    trackee_uid: &'a Uid,
    trackee_username: &'a str,
    sequence_number: u64,
    supersedes_sequence: Option<u64>,
    proof_results: &'a [ProofResult],
    trackee_key_fingerprints: &'a BTreeSet<Kid>,
    signing_kid: &'a Kid,
    created_at: u64,
    local_only: bool,
}

impl TrackingStatement {
    fn payload(&self) -> SigningPayload<'_> {
        SigningPayload {
            tracker_uid: &self.tracker_uid,
            trackee_uid: &self.trackee_uid,
            trackee_username: &self.trackee_username,
            sequence_number: self.sequence_number,
            supersedes_sequence: self.supersedes_sequence,
            proof_results: &self.proof_results,
            trackee_key_fingerprints: &self.trackee_key_fingerprints,
            signing_kid: &self.signing_kid,
            created_at: self.created_at,
            local_only: self.local_only,
        }
    }

    fn signing_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.payload())
            .map_err(|e| TrustError::SerializationError(e.to_string()))
    }

    /// Human-readable `tracker -> trackee #seq`.
    pub fn label(&self) -> String {
        format!(
            "{} -> {} #{}",
            self.tracker_uid, self.trackee_uid, self.sequence_number
        )
    }

    /// Check the signature against the key embedded in `signing_kid`.
    pub fn verify_signature(&self) -> Result<()> {
        signing::verify_detached(&self.signing_kid, &self.signing_bytes()?, &self.signature)
    }

    /// Check the signature and that `signing_kid` was an active signing
    /// key of the tracker's family when the statement was made.
    pub fn verify_signer(&self, tracker_keys: &KeyFamilyGraph) -> Result<()> {
        if tracker_keys.uid() != &self.tracker_uid {
            return Err(TrustError::InvalidKey(format!(
                "key family of {} cannot vouch for a statement by {}",
                tracker_keys.uid(),
                self.tracker_uid
            )));
        }
        let key = tracker_keys.lookup(&self.signing_kid)?;
        if !key.is_signing_key() || !tracker_keys.is_active(&self.signing_kid, self.created_at) {
            return Err(TrustError::InvalidKey(format!(
                "{} was not an active signing key at {}",
                self.signing_kid.short(),
                self.created_at
            )));
        }
        self.verify_signature()
    }
}

/// Builder for tracking statements.
pub struct StatementBuilder {
    tracker_uid: Uid,
    trackee_uid: Uid,
    trackee_username: String,
    sequence_number: u64,
    supersedes_sequence: Option<u64>,
    proof_results: Vec<ProofResult>,
    trackee_key_fingerprints: BTreeSet<Kid>,
    created_at: u64,
    local_only: bool,
}

impl StatementBuilder {
    /// Start the first statement for `tracker` about the identified target.
    pub fn new(tracker_uid: Uid, outcome: &IdentityOutcome) -> Self {
        Self {
            tracker_uid,
            trackee_uid: outcome.uid.clone(),
            trackee_username: outcome.username.clone(),
            sequence_number: 1,
            supersedes_sequence: None,
            proof_results: outcome.results.clone(),
            trackee_key_fingerprints: outcome.key_fingerprints.clone(),
            created_at: crate::time::now_micros(),
            local_only: false,
        }
    }

    /// Continue the pair's sequence after `latest`.
    pub fn supersede(mut self, latest: Option<u64>) -> Self {
        self.sequence_number = latest.map_or(1, |seq| seq + 1);
        self.supersedes_sequence = latest;
        self
    }

    pub fn local_only(mut self, local_only: bool) -> Self {
        self.local_only = local_only;
        self
    }

    pub fn created_at(mut self, created_at: u64) -> Self {
        self.created_at = created_at;
        self
    }

    /// Sign and finalize the statement.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if `kid` does not name `signing_key`.
    pub fn sign(self, kid: &Kid, signing_key: &SigningKey) -> Result<TrackingStatement> {
        if !signing::is_key_for(signing_key, kid) {
            return Err(TrustError::InvalidKey(format!(
                "signing key does not match {}",
                kid.short()
            )));
        }

        let mut statement = TrackingStatement {
            tracker_uid: self.tracker_uid,
            trackee_uid: self.trackee_uid,
            trackee_username: self.trackee_username,
            sequence_number: self.sequence_number,
            supersedes_sequence: self.supersedes_sequence,
            proof_results: self.proof_results,
            trackee_key_fingerprints: self.trackee_key_fingerprints,
            signing_kid: kid.clone(),
            signature: String::new(),
            created_at: self.created_at,
            local_only: self.local_only,
        };
        statement.signature = signing::sign_detached(signing_key, &statement.signing_bytes()?);
        Ok(statement)
    }
}

/// Verify a pair's history, ordered oldest first.
///
/// Sequence numbers must run `1..=n`, each statement must supersede its
/// predecessor, all must concern one pair, and every signature must hold.
pub fn verify_history(history: &[TrackingStatement]) -> Result<()> {
    let Some(first) = history.first() else {
        return Ok(());
    };

    for (i, statement) in history.iter().enumerate() {
        let expected = i as u64 + 1;
        if statement.sequence_number != expected {
            return Err(TrustError::InvalidChain(format!(
                "expected sequence {expected}, found {}",
                statement.sequence_number
            )));
        }
        let expected_prev = (expected > 1).then(|| expected - 1);
        if statement.supersedes_sequence != expected_prev {
            return Err(TrustError::InvalidChain(format!(
                "statement {expected} supersedes {:?}",
                statement.supersedes_sequence
            )));
        }
        if statement.tracker_uid != first.tracker_uid || statement.trackee_uid != first.trackee_uid
        {
            return Err(TrustError::InvalidChain(format!(
                "statement {expected} belongs to {}",
                statement.label()
            )));
        }
        statement
            .verify_signature()
            .map_err(|e| TrustError::InvalidChain(format!("statement {expected}: {e}")))?;
    }
    Ok(())
}
