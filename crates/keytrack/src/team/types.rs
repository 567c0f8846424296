//! Team rosters and key generations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::derivation::team_seal_context;
use crate::crypto::encryption::{self, SealedBox};
use crate::crypto::keys::X25519KeyPair;
use crate::error::{Result, TrustError};
use crate::identity::Uid;
use crate::keyfamily::Kid;

/// Unique identifier for a team, derived from its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(pub String);

impl TeamId {
    /// Team names are case-insensitive, so `Ops` and `ops` share an id.
    pub fn from_name(name: &str) -> Self {
        let hash = Sha256::digest(name.to_ascii_lowercase().as_bytes());
        let encoded = bs58::encode(&hash[..16]).into_string();
        Self(format!("team_{encoded}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TeamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamRole {
    Reader,
    Writer,
    Admin,
    Owner,
}

impl TeamRole {
    /// Owners and admins may add, remove, and rekey.
    pub fn can_manage(self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reader => "reader",
            Self::Writer => "writer",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }
}

impl std::fmt::Display for TeamRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TeamRole {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "reader" => Ok(Self::Reader),
            "writer" => Ok(Self::Writer),
            "admin" => Ok(Self::Admin),
            "owner" => Ok(Self::Owner),
            other => Err(TrustError::NotFound(format!("team role {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub uid: Uid,
    pub username: String,
    pub role: TeamRole,
}

impl TeamMember {
    pub fn new(uid: Uid, username: impl Into<String>, role: TeamRole) -> Self {
        Self {
            uid,
            username: username.into(),
            role,
        }
    }
}

/// What triggered a rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipChange {
    Created { name: String, owner: TeamMember },
    Added(TeamMember),
    Removed(Uid),
    /// New secret for the same roster.
    Rekey,
}

/// A team's roster and the generation its members should hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamState {
    pub id: TeamId,
    pub name: String,
    pub members: BTreeMap<Uid, TeamMember>,
    pub key_generation: u32,
    pub created_at: u64,
}

impl TeamState {
    /// A new team with `owner` as its only member and no key yet.
    pub fn genesis(name: impl Into<String>, owner: TeamMember, created_at: u64) -> Self {
        let name = name.into();
        let mut members = BTreeMap::new();
        members.insert(owner.uid.clone(), owner);
        Self {
            id: TeamId::from_name(&name),
            name,
            members,
            key_generation: 0,
            created_at,
        }
    }

    pub fn member(&self, uid: &Uid) -> Option<&TeamMember> {
        self.members.get(uid)
    }

    /// The roster after `change`. `self` is untouched.
    ///
    /// # Errors
    ///
    /// `AlreadyMember`, `NotMember`, `LastOwner` when the change would leave
    /// the team without an owner, or `TeamExists` for a `Created` change
    /// applied to an existing team.
    pub fn apply(&self, change: &MembershipChange) -> Result<TeamState> {
        let mut next = self.clone();
        match change {
            MembershipChange::Created { .. } => {
                return Err(TrustError::TeamExists(self.name.clone()));
            }
            MembershipChange::Added(member) => {
                if next.members.contains_key(&member.uid) {
                    return Err(TrustError::AlreadyMember {
                        team: self.name.clone(),
                        username: member.username.clone(),
                    });
                }
                next.members.insert(member.uid.clone(), member.clone());
            }
            MembershipChange::Removed(uid) => {
                let Some(removed) = next.members.remove(uid) else {
                    return Err(TrustError::NotMember {
                        team: self.name.clone(),
                        username: uid.to_string(),
                    });
                };
                if !next.members.values().any(|m| m.role == TeamRole::Owner) {
                    return Err(TrustError::LastOwner {
                        team: self.name.clone(),
                        username: removed.username,
                    });
                }
            }
            MembershipChange::Rekey => {}
        }
        Ok(next)
    }
}

/// The shared secret of one generation. Wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct TeamSecret([u8; 32]);

impl TeamSecret {
    pub(crate) fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for TeamSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TeamSecret(..)")
    }
}

/// One generation of a team's shared secret, sealed to every recipient
/// encryption key. Never mutated once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamKeyGeneration {
    pub team_id: TeamId,
    pub generation: u32,
    pub encrypted_key_material: BTreeMap<Kid, SealedBox>,
    pub created_at: u64,
}

impl TeamKeyGeneration {
    pub fn recipients(&self) -> impl Iterator<Item = &Kid> {
        self.encrypted_key_material.keys()
    }

    /// Open the secret with the recipient's encryption key.
    ///
    /// # Errors
    ///
    /// `NotFound` if nothing was sealed for `key`, `DecryptionFailed` if
    /// the box does not open.
    pub fn open(&self, key: &X25519KeyPair) -> Result<TeamSecret> {
        let kid = key.kid();
        let sealed = self.encrypted_key_material.get(&kid).ok_or_else(|| {
            TrustError::NotFound(format!(
                "generation {} of {} has no box for {}",
                self.generation,
                self.team_id,
                kid.short()
            ))
        })?;
        let context = team_seal_context(self.team_id.as_str(), self.generation);
        let mut plaintext = encryption::open(key, sealed, &context)?;
        let bytes: std::result::Result<[u8; 32], _> = plaintext.as_slice().try_into();
        plaintext.zeroize();
        let bytes =
            bytes.map_err(|_| TrustError::DecryptionFailed("team secret must be 32 bytes".into()))?;
        Ok(TeamSecret::new(bytes))
    }
}
