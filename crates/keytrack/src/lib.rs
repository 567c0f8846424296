//! keytrack: key families, identity tracking, and team key rotation.
//!
//! Validates per-user device key graphs, verifies another user's
//! social proofs and records the result as a signed, sequence-numbered
//! tracking statement, and rotates a team's shared secret whenever its
//! membership changes.

pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod keyfamily;
pub mod storage;
pub mod team;
pub mod time;
pub mod tracking;

// Re-export primary types
pub use config::Config;
pub use error::{ErrorKind, Result, TrustError};
pub use identity::{AuthContext, Keyring, MemoryDirectory, Session, Uid};
pub use keyfamily::{DeviceKey, DeviceType, KeyClass, KeyFamilyGraph, KeyFamilyHandle, Kid, RevokedKey};
pub use storage::{FileStatementStore, MemoryStatementStore, MemoryTeamStore, StatementStore, TeamStore};
pub use team::{
    CancellationToken, ClientPoller, MembershipChange, PollSchedule, TeamId, TeamKeyGeneration,
    TeamKeyRotationCoordinator, TeamRole, TeamService, TeamState,
};
pub use tracking::{
    IdentityOutcome, ProofResult, ProofStatus, ProofVerifier, ProofVerifierRegistry,
    SocialAssertion, TrackEngine, TrackOptions, TrackingStatement,
};
