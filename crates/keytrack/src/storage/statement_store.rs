//! The tracking statement ledger contract and its in-memory backend.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Result, TrustError};
use crate::identity::Uid;
use crate::tracking::TrackingStatement;

/// Append-only ledger of tracking statements, keyed by pair.
///
/// Statements are never modified or deleted. `untrack` only clears the
/// tracked marker.
pub trait StatementStore: Send + Sync {
    fn latest(&self, tracker: &Uid, trackee: &Uid) -> Result<Option<TrackingStatement>>;

    fn get(&self, tracker: &Uid, trackee: &Uid, sequence: u64)
        -> Result<Option<TrackingStatement>>;

    /// Append `statement` if it directly follows the pair's latest
    /// statement, checked atomically with the write, and mark the pair
    /// tracked.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the sequence number is not `latest + 1` (or `1`
    /// for a new pair) or `supersedes_sequence` does not name the latest.
    fn append(&self, statement: &TrackingStatement) -> Result<()>;

    fn is_tracking(&self, tracker: &Uid, trackee: &Uid) -> Result<bool>;

    /// # Errors
    ///
    /// Returns `NotTracking` if the pair is not currently tracked.
    fn untrack(&self, tracker: &Uid, trackee: &Uid) -> Result<()>;

    /// The pair's statements, oldest first, reconstructed by following
    /// `supersedes_sequence` back from the latest.
    fn history(&self, tracker: &Uid, trackee: &Uid) -> Result<Vec<TrackingStatement>> {
        let mut history = Vec::new();
        let mut next = self.latest(tracker, trackee)?;
        while let Some(statement) = next {
            next = match statement.supersedes_sequence {
                Some(seq) => Some(self.get(tracker, trackee, seq)?.ok_or_else(|| {
                    TrustError::InvalidChain(format!(
                        "{} supersedes missing statement {seq}",
                        statement.label()
                    ))
                })?),
                None => None,
            };
            history.push(statement);
        }
        history.reverse();
        Ok(history)
    }
}

/// Reject `statement` unless it follows `latest`.
pub(crate) fn check_append(statement: &TrackingStatement, latest: Option<u64>) -> Result<()> {
    let expected = latest.map_or(1, |seq| seq + 1);
    if statement.sequence_number != expected || statement.supersedes_sequence != latest {
        return Err(TrustError::Conflict {
            tracker: statement.tracker_uid.to_string(),
            trackee: statement.trackee_uid.to_string(),
            attempted: statement.sequence_number,
            latest,
        });
    }
    Ok(())
}

#[derive(Debug, Default)]
struct PairLog {
    statements: Vec<TrackingStatement>,
    tracked: bool,
}

/// In-process statement store.
#[derive(Debug, Default)]
pub struct MemoryStatementStore {
    pairs: Mutex<HashMap<(Uid, Uid), PairLog>>,
}

impl MemoryStatementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of statements across all pairs.
    pub fn len(&self) -> usize {
        self.lock().values().map(|log| log.statements.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(Uid, Uid), PairLog>> {
        self.pairs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn key(tracker: &Uid, trackee: &Uid) -> (Uid, Uid) {
    (tracker.clone(), trackee.clone())
}

impl StatementStore for MemoryStatementStore {
    fn latest(&self, tracker: &Uid, trackee: &Uid) -> Result<Option<TrackingStatement>> {
        Ok(self
            .lock()
            .get(&key(tracker, trackee))
            .and_then(|log| log.statements.last().cloned()))
    }

    fn get(
        &self,
        tracker: &Uid,
        trackee: &Uid,
        sequence: u64,
    ) -> Result<Option<TrackingStatement>> {
        Ok(self.lock().get(&key(tracker, trackee)).and_then(|log| {
            log.statements
                .iter()
                .find(|s| s.sequence_number == sequence)
                .cloned()
        }))
    }

    fn append(&self, statement: &TrackingStatement) -> Result<()> {
        let mut pairs = self.lock();
        let log = pairs
            .entry(key(&statement.tracker_uid, &statement.trackee_uid))
            .or_default();
        check_append(
            statement,
            log.statements.last().map(|s| s.sequence_number),
        )?;
        log.statements.push(statement.clone());
        log.tracked = true;
        Ok(())
    }

    fn is_tracking(&self, tracker: &Uid, trackee: &Uid) -> Result<bool> {
        Ok(self
            .lock()
            .get(&key(tracker, trackee))
            .is_some_and(|log| log.tracked))
    }

    fn untrack(&self, tracker: &Uid, trackee: &Uid) -> Result<()> {
        match self.lock().get_mut(&key(tracker, trackee)) {
            Some(log) if log.tracked => {
                log.tracked = false;
                Ok(())
            }
            _ => Err(TrustError::NotTracking {
                tracker: tracker.to_string(),
                trackee: trackee.to_string(),
            }),
        }
    }
}
