//! Track run states and the fixed transition table.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrustError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackState {
    Init,
    ResolvingUser,
    Identifying,
    AwaitingDecision,
    Signing,
    Persisting,
    Done,
    Failed,
}

impl TrackState {
    /// The state that follows on success, if any.
    pub fn next(self) -> Option<TrackState> {
        match self {
            Self::Init => Some(Self::ResolvingUser),
            Self::ResolvingUser => Some(Self::Identifying),
            Self::Identifying => Some(Self::AwaitingDecision),
            Self::AwaitingDecision => Some(Self::Signing),
            Self::Signing => Some(Self::Persisting),
            Self::Persisting => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Every non-terminal state may move to its successor or to `Failed`.
    pub fn can_transition_to(self, to: TrackState) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Self::Failed || self.next() == Some(to)
    }

    /// # Errors
    ///
    /// Returns `IllegalTransition` if the table has no such edge.
    pub fn transition(self, to: TrackState) -> Result<TrackState> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(TrustError::IllegalTransition {
                from: self.to_string(),
                to: to.to_string(),
            })
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::ResolvingUser => "resolving_user",
            Self::Identifying => "identifying",
            Self::AwaitingDecision => "awaiting_decision",
            Self::Signing => "signing",
            Self::Persisting => "persisting",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TrackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
