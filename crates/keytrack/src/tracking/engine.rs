//! The track engine.
//!
//! A track run walks a fixed sequence of states:
//!
//! ```text
//! Init -> ResolvingUser -> Identifying -> AwaitingDecision -> Signing -> Persisting -> Done
//!   \__________\_______________\______________\________________\____________\______-> Failed
//! ```
//!
//! Login is checked in `Init`, before any resolution. The read-latest,
//! sign, append sequence in `Signing`/`Persisting` runs under a lock
//! held per (tracker, trackee) pair, so two runs on one pair in this
//! process never compute the same sequence number. The store's append
//! check still rejects a stale sequence from anywhere else, and the
//! engine never retries it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::TrackingConfig;
use crate::error::{Result, TrustError};
use crate::identity::{AuthContext, ResolvedUser, Uid, UserResolver};
use crate::storage::StatementStore;
use crate::time::{Clock, SystemClock};

use super::assertion::TargetIdentifier;
use super::decision::{Decision, DecisionMaker};
use super::outcome::IdentityOutcome;
use super::proof::{ProofResult, ProofVerifierRegistry};
use super::state::TrackState;
use super::statement::{StatementBuilder, TrackingStatement};

/// Caller options for one track run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackOptions {
    /// Keep the statement local and skip the decision step.
    pub track_local_only: bool,
}

impl TrackOptions {
    pub fn local_only() -> Self {
        Self {
            track_local_only: true,
        }
    }
}

// ── Pair locks ────────────────────────────────────────────────────────────────

/// One mutex per (tracker, trackee) pair. An entry lives only while some
/// caller holds or waits for it.
#[derive(Debug, Default)]
struct PairLocks {
    locks: Mutex<HashMap<(Uid, Uid), Arc<Mutex<()>>>>,
}

impl PairLocks {
    /// Run `f` while holding the lock for the pair.
    fn with_pair<T>(&self, tracker: &Uid, trackee: &Uid, f: impl FnOnce() -> T) -> T {
        let key = (tracker.clone(), trackee.clone());
        let lock = Arc::clone(self.map().entry(key.clone()).or_default());
        let out = {
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            f()
        };
        drop(lock);

        let mut locks = self.map();
        if locks.get(&key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&key);
        }
        out
    }

    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<(Uid, Uid), Arc<Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.map().len()
    }
}

// ── TrackEngine ───────────────────────────────────────────────────────────────

/// Resolves, identifies, and signs tracking statements.
pub struct TrackEngine {
    resolver: Arc<dyn UserResolver>,
    verifiers: Arc<ProofVerifierRegistry>,
    store: Arc<dyn StatementStore>,
    clock: Arc<dyn Clock>,
    config: TrackingConfig,
    pair_locks: PairLocks,
}

impl TrackEngine {
    pub fn new(
        resolver: Arc<dyn UserResolver>,
        verifiers: Arc<ProofVerifierRegistry>,
        store: Arc<dyn StatementStore>,
    ) -> Self {
        Self {
            resolver,
            verifiers,
            store,
            clock: Arc::new(SystemClock),
            config: TrackingConfig::default(),
            pair_locks: PairLocks::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: TrackingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &Arc<dyn StatementStore> {
        &self.store
    }

    /// Track `target` (a username or `name@service`) as the logged-in user.
    ///
    /// # Errors
    ///
    /// - `LoginRequired` before anything else if `auth` has no session.
    /// - `Resolution` if the target is malformed, absent, ambiguous, or the
    ///   caller themselves.
    /// - `NoVerifiableKey` if the target or the caller has no usable
    ///   signing key.
    /// - `UserCancelled` or the decider's own error from the decision step.
    /// - `Conflict` if another writer appended to the pair first.
    /// - Key family corruption errors, verbatim.
    pub fn track(
        &self,
        auth: &AuthContext,
        target: &str,
        options: TrackOptions,
        decider: &dyn DecisionMaker,
    ) -> Result<TrackingStatement> {
        TrackRun::new(target, options).execute(self, auth, decider)
    }

    /// Check every assertion of `user` and snapshot its active keys.
    pub fn identify(&self, user: &ResolvedUser) -> IdentityOutcome {
        let statuses = self.verifiers.check_all(
            &user.assertions,
            &user.uid,
            self.config.proof_attempts,
            self.config.parallel_proofs,
        );
        let now = self.clock.now_micros();
        let results = user
            .assertions
            .iter()
            .zip(statuses)
            .map(|(assertion, status)| ProofResult {
                assertion: assertion.clone(),
                status,
                checked_at: now,
            })
            .collect();
        IdentityOutcome {
            uid: user.uid.clone(),
            username: user.username.clone(),
            results,
            key_fingerprints: user.keys.fingerprints(now),
        }
    }

    /// Clear the tracked marker for a pair. Statement history is kept and a
    /// later track continues its sequence.
    pub fn untrack(&self, tracker: &Uid, trackee: &Uid) -> Result<()> {
        self.pair_locks
            .with_pair(tracker, trackee, || self.store.untrack(tracker, trackee))?;
        log::info!("{tracker} no longer tracks {trackee}");
        Ok(())
    }

    pub fn is_tracking(&self, tracker: &Uid, trackee: &Uid) -> Result<bool> {
        self.store.is_tracking(tracker, trackee)
    }

    /// All statements for a pair, oldest first.
    pub fn history(&self, tracker: &Uid, trackee: &Uid) -> Result<Vec<TrackingStatement>> {
        self.store.history(tracker, trackee)
    }
}

// ── TrackRun ──────────────────────────────────────────────────────────────────

/// One pass through the track state machine.
#[derive(Debug, Clone)]
pub struct TrackRun {
    target: String,
    options: TrackOptions,
    state: TrackState,
    transitions: Vec<TrackState>,
    outcome: Option<IdentityOutcome>,
}

impl TrackRun {
    pub fn new(target: impl Into<String>, options: TrackOptions) -> Self {
        Self {
            target: target.into(),
            options,
            state: TrackState::Init,
            transitions: vec![TrackState::Init],
            outcome: None,
        }
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    /// Every state visited so far, starting with `Init`.
    pub fn transitions(&self) -> &[TrackState] {
        &self.transitions
    }

    /// The identity outcome, once the run got past `Identifying`.
    pub fn outcome(&self) -> Option<&IdentityOutcome> {
        self.outcome.as_ref()
    }

    /// Drive the run to `Done` or `Failed`.
    ///
    /// # Errors
    ///
    /// `IllegalTransition` if the run was already executed; otherwise
    /// whatever made the run fail (see [`TrackEngine::track`]).
    pub fn execute(
        &mut self,
        engine: &TrackEngine,
        auth: &AuthContext,
        decider: &dyn DecisionMaker,
    ) -> Result<TrackingStatement> {
        if self.state != TrackState::Init {
            return Err(TrustError::IllegalTransition {
                from: self.state.to_string(),
                to: TrackState::ResolvingUser.to_string(),
            });
        }

        match self.drive(engine, auth, decider) {
            Ok(statement) => {
                self.advance(TrackState::Done)?;
                log::info!(
                    "tracked {} ({}){}",
                    statement.trackee_username,
                    statement.label(),
                    if statement.local_only { " locally" } else { "" }
                );
                Ok(statement)
            }
            Err(e) => {
                log::debug!("track {} failed in {}: {e}", self.target, self.state);
                self.state = TrackState::Failed;
                self.transitions.push(TrackState::Failed);
                Err(e)
            }
        }
    }

    fn advance(&mut self, to: TrackState) -> Result<()> {
        self.state = self.state.transition(to)?;
        self.transitions.push(to);
        log::debug!("track {}: {}", self.target, to);
        Ok(())
    }

    fn drive(
        &mut self,
        engine: &TrackEngine,
        auth: &AuthContext,
        decider: &dyn DecisionMaker,
    ) -> Result<TrackingStatement> {
        let session = auth.require_login()?;

        self.advance(TrackState::ResolvingUser)?;
        let target = TargetIdentifier::parse(&self.target)?;
        let user = engine.resolver.resolve(&target)?;
        if user.uid == session.uid {
            return Err(TrustError::Resolution {
                target: self.target.clone(),
                reason: "cannot track yourself".into(),
            });
        }
        user.keys.active_signing_key(engine.clock.now_micros())?;

        self.advance(TrackState::Identifying)?;
        let outcome = engine.identify(&user);
        self.outcome = Some(outcome.clone());

        self.advance(TrackState::AwaitingDecision)?;
        let local_only = if self.options.track_local_only {
            true
        } else {
            match decider.decide(&outcome)? {
                Decision::Proceed { local_only } => local_only,
                Decision::Cancel => {
                    return Err(TrustError::UserCancelled {
                        target: self.target.clone(),
                    })
                }
            }
        };

        self.advance(TrackState::Signing)?;
        engine
            .pair_locks
            .with_pair(&session.uid, &outcome.uid, || {
                let now = engine.clock.now_micros();
                let (kid, signing_key) = session.signer(now)?;
                let latest = engine
                    .store
                    .latest(&session.uid, &outcome.uid)?
                    .map(|s| s.sequence_number);
                let statement = StatementBuilder::new(session.uid.clone(), &outcome)
                    .supersede(latest)
                    .local_only(local_only)
                    .created_at(now)
                    .sign(&kid, &signing_key)?;

                self.advance(TrackState::Persisting)?;
                engine.store.append(&statement)?;
                Ok(statement)
            })
    }
}
