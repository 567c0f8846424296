//! Identities: user ids, the authenticated session, and the directory
//! that resolves users and their published keys.

pub mod directory;
pub mod session;

use serde::{Deserialize, Serialize};

pub use directory::{KeyDirectory, MemoryDirectory, PublicKeys, ResolvedUser, UserResolver};
pub use session::{AuthContext, Keyring, Session};

/// Unique identifier for a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
