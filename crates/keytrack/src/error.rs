//! Error types for keytrack.
//!
//! All errors are strongly typed and propagated without panicking.
//! Private key material is never included in error messages.

use std::time::Duration;

use crate::keyfamily::Kid;
use crate::tracking::ProofResult;

/// Error types covering key families, tracking, and team key rotation.
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    // ── Tracking ──────────────────────────────────────────────────────────────
    #[error("Could not resolve {target}: {reason}")]
    Resolution { target: String, reason: String },

    #[error("No verifiable key for user {uid}")]
    NoVerifiableKey { uid: String },

    #[error("Login required")]
    LoginRequired,

    #[error("Identity verification of {target} failed for {} proof(s)", failed.len())]
    IdentityVerification {
        target: String,
        failed: Vec<ProofResult>,
    },

    #[error("Tracking of {target} cancelled by user")]
    UserCancelled { target: String },

    #[error(
        "Sequence conflict for {tracker} -> {trackee}: attempted {attempted}, latest {}",
        latest.map(|s| s.to_string()).unwrap_or_else(|| "none".into())
    )]
    Conflict {
        tracker: String,
        trackee: String,
        attempted: u64,
        latest: Option<u64>,
    },

    #[error("{tracker} is not tracking {trackee}")]
    NotTracking { tracker: String, trackee: String },

    #[error("Illegal track state transition {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    // ── Key family corruption ─────────────────────────────────────────────────
    #[error("Key {kid} has dangling parent {}", parent.as_ref().map(|p| p.as_str()).unwrap_or("<none>"))]
    DanglingParent { kid: Kid, parent: Option<Kid> },

    #[error("Key family contains a cycle through {kid}")]
    Cycle { kid: Kid },

    #[error("Device {device_id} is claimed by more than one key")]
    DuplicateDevice { device_id: String },

    #[error("Key {kid} appears more than once")]
    DuplicateKid { kid: Kid },

    #[error("More than one active eldest key: {kids:?}")]
    MultipleEldest { kids: Vec<Kid> },

    #[error("Key {kid} was created under parent {parent} after that parent was revoked")]
    RevokedParent { kid: Kid, parent: Kid },

    // ── Teams and polling ─────────────────────────────────────────────────────
    #[error("Rotation already in progress for team {team}")]
    RotationInProgress { team: String },

    #[error("Timed out after {attempts} attempts ({total_elapsed:?} elapsed)")]
    Timeout {
        attempts: u32,
        total_elapsed: Duration,
    },

    #[error("Polling cancelled after {attempts} attempts")]
    PollCancelled { attempts: u32 },

    #[error("Team already exists: {0}")]
    TeamExists(String),

    #[error("{username} is already a member of {team}")]
    AlreadyMember { team: String, username: String },

    #[error("{username} is not a member of {team}")]
    NotMember { team: String, username: String },

    #[error("{username} is the last owner of {team}")]
    LastOwner { team: String, username: String },

    #[error("Generation for team {team} would have no recipients")]
    NoRecipients { team: String },

    #[error("{username} may not change the membership of {team}")]
    PermissionDenied { team: String, username: String },

    #[error("Key generation conflict for team {team}: attempted {attempted}, current {current}")]
    GenerationConflict {
        team: String,
        attempted: u32,
        current: u32,
    },

    // ── Crypto and storage ────────────────────────────────────────────────────
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Key derivation failed: {0}")]
    DerivationFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid statement chain: {0}")]
    InvalidChain(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Discriminant of a [`TrustError`], for callers that branch on the kind
/// without inspecting the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Resolution,
    NoVerifiableKey,
    LoginRequired,
    IdentityVerification,
    UserCancelled,
    Conflict,
    NotTracking,
    IllegalTransition,
    DanglingParent,
    Cycle,
    DuplicateDevice,
    DuplicateKid,
    MultipleEldest,
    RevokedParent,
    RotationInProgress,
    Timeout,
    PollCancelled,
    TeamExists,
    AlreadyMember,
    NotMember,
    LastOwner,
    PermissionDenied,
    NotFound,
    InvalidKey,
    SignatureInvalid,
    Crypto,
    InvalidChain,
    Storage,
}

impl ErrorKind {
    /// Key-graph corruption is always fatal and never auto-repaired.
    pub fn is_graph_corruption(self) -> bool {
        matches!(
            self,
            Self::DanglingParent
                | Self::Cycle
                | Self::DuplicateDevice
                | Self::DuplicateKid
                | Self::MultipleEldest
                | Self::RevokedParent
        )
    }
}

impl TrustError {
    /// Return the discriminated kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Resolution { .. } => ErrorKind::Resolution,
            Self::NoVerifiableKey { .. } => ErrorKind::NoVerifiableKey,
            Self::LoginRequired => ErrorKind::LoginRequired,
            Self::IdentityVerification { .. } => ErrorKind::IdentityVerification,
            Self::UserCancelled { .. } => ErrorKind::UserCancelled,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::NotTracking { .. } => ErrorKind::NotTracking,
            Self::IllegalTransition { .. } => ErrorKind::IllegalTransition,
            Self::DanglingParent { .. } => ErrorKind::DanglingParent,
            Self::Cycle { .. } => ErrorKind::Cycle,
            Self::DuplicateDevice { .. } => ErrorKind::DuplicateDevice,
            Self::DuplicateKid { .. } => ErrorKind::DuplicateKid,
            Self::MultipleEldest { .. } => ErrorKind::MultipleEldest,
            Self::RevokedParent { .. } => ErrorKind::RevokedParent,
            Self::RotationInProgress { .. } => ErrorKind::RotationInProgress,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::PollCancelled { .. } => ErrorKind::PollCancelled,
            Self::TeamExists(_) => ErrorKind::TeamExists,
            Self::AlreadyMember { .. } => ErrorKind::AlreadyMember,
            Self::NotMember { .. } => ErrorKind::NotMember,
            Self::LastOwner { .. } => ErrorKind::LastOwner,
            Self::NoRecipients { .. } => ErrorKind::NoVerifiableKey,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::GenerationConflict { .. } => ErrorKind::Conflict,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidKey(_) => ErrorKind::InvalidKey,
            Self::SignatureInvalid => ErrorKind::SignatureInvalid,
            Self::DerivationFailed(_) | Self::EncryptionFailed(_) | Self::DecryptionFailed(_) => {
                ErrorKind::Crypto
            }
            Self::InvalidChain(_) => ErrorKind::InvalidChain,
            Self::StorageError(_)
            | Self::SerializationError(_)
            | Self::InvalidFileFormat(_)
            | Self::Io(_) => ErrorKind::Storage,
        }
    }

    /// Whether re-running the whole operation at the caller level can succeed.
    ///
    /// The engine and coordinator never retry these internally.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Conflict | ErrorKind::RotationInProgress | ErrorKind::Timeout
        )
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, TrustError>;
