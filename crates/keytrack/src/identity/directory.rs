//! User and key directories.
//!
//! The engine reaches remote state only through two contracts:
//! [`UserResolver`] turns a target identifier into a user with a
//! validated key family and its social assertions, and [`KeyDirectory`]
//! loads any user's published keys. [`MemoryDirectory`] implements both
//! over an in-process table.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::error::{Result, TrustError};
use crate::keyfamily::{DeviceKey, KeyFamilyGraph, RevokedKey};
use crate::tracking::{SocialAssertion, TargetIdentifier};

use super::Uid;

/// A user's published keys, as returned by `LoadMyPublicKeys`.
#[derive(Debug, Clone)]
pub struct PublicKeys {
    pub uid: Uid,
    pub username: String,
    pub keys: Vec<DeviceKey>,
    pub revocations: Vec<RevokedKey>,
}

impl PublicKeys {
    /// Validate into a key family graph.
    pub fn into_graph(self) -> Result<KeyFamilyGraph> {
        KeyFamilyGraph::build(self.uid, self.keys, self.revocations)
    }
}

/// A resolved tracking target.
#[derive(Debug, Clone)]
pub struct ResolvedUser {
    pub uid: Uid,
    pub username: String,
    pub keys: Arc<KeyFamilyGraph>,
    pub assertions: Vec<SocialAssertion>,
}

/// Resolves usernames and social assertions to users.
pub trait UserResolver: Send + Sync {
    /// # Errors
    ///
    /// `Resolution` if the target is absent or ambiguous. Key family
    /// corruption is returned as the graph reported it.
    fn resolve(&self, target: &TargetIdentifier) -> Result<ResolvedUser>;
}

/// Loads published keys by user.
pub trait KeyDirectory: Send + Sync {
    /// # Errors
    ///
    /// `NotFound` if no user has the name; `Resolution` if it matches
    /// several users only up to case.
    fn lookup_username(&self, username: &str) -> Result<Uid>;

    fn load_public_keys(&self, uid: &Uid) -> Result<PublicKeys>;

    fn load_key_family(&self, uid: &Uid) -> Result<KeyFamilyGraph> {
        self.load_public_keys(uid)?.into_graph()
    }
}

#[derive(Debug, Clone)]
struct UserRecord {
    username: String,
    keys: Vec<DeviceKey>,
    revocations: Vec<RevokedKey>,
    assertions: Vec<SocialAssertion>,
}

/// In-process user and key directory.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    users: RwLock<BTreeMap<Uid, UserRecord>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(
        &self,
        uid: Uid,
        username: impl Into<String>,
        keys: Vec<DeviceKey>,
        revocations: Vec<RevokedKey>,
    ) {
        let record = UserRecord {
            username: username.into(),
            keys,
            revocations,
            assertions: Vec::new(),
        };
        self.write().insert(uid, record);
    }

    pub fn add_assertion(&self, uid: &Uid, assertion: SocialAssertion) -> Result<()> {
        let mut users = self.write();
        let record = users
            .get_mut(uid)
            .ok_or_else(|| TrustError::NotFound(format!("user {uid}")))?;
        record.assertions.push(assertion);
        Ok(())
    }

    /// Publish a changed key set (new device, revocation).
    pub fn set_keys(
        &self,
        uid: &Uid,
        keys: Vec<DeviceKey>,
        revocations: Vec<RevokedKey>,
    ) -> Result<()> {
        let mut users = self.write();
        let record = users
            .get_mut(uid)
            .ok_or_else(|| TrustError::NotFound(format!("user {uid}")))?;
        record.keys = keys;
        record.revocations = revocations;
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<Uid, UserRecord>> {
        self.users.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<Uid, UserRecord>> {
        self.users.write().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, uid: &Uid) -> Result<UserRecord> {
        self.read()
            .get(uid)
            .cloned()
            .ok_or_else(|| TrustError::NotFound(format!("user {uid}")))
    }
}

impl KeyDirectory for MemoryDirectory {
    fn lookup_username(&self, username: &str) -> Result<Uid> {
        let users = self.read();
        if let Some((uid, _)) = users.iter().find(|(_, r)| r.username == username) {
            return Ok(uid.clone());
        }
        let folded: Vec<&Uid> = users
            .iter()
            .filter(|(_, r)| r.username.eq_ignore_ascii_case(username))
            .map(|(uid, _)| uid)
            .collect();
        match folded.as_slice() {
            [uid] => Ok((*uid).clone()),
            [] => Err(TrustError::NotFound(format!("username {username}"))),
            many => Err(TrustError::Resolution {
                target: username.to_string(),
                reason: format!("ambiguous: matches {} users", many.len()),
            }),
        }
    }

    fn load_public_keys(&self, uid: &Uid) -> Result<PublicKeys> {
        let record = self.record(uid)?;
        Ok(PublicKeys {
            uid: uid.clone(),
            username: record.username,
            keys: record.keys,
            revocations: record.revocations,
        })
    }
}

impl UserResolver for MemoryDirectory {
    fn resolve(&self, target: &TargetIdentifier) -> Result<ResolvedUser> {
        let uid = match target {
            TargetIdentifier::Username(name) => match self.lookup_username(name) {
                Ok(uid) => uid,
                Err(TrustError::NotFound(_)) => {
                    return Err(TrustError::Resolution {
                        target: target.to_string(),
                        reason: "no such user".into(),
                    })
                }
                Err(e) => return Err(e),
            },
            TargetIdentifier::Assertion(assertion) => {
                let users = self.read();
                let matches: Vec<&Uid> = users
                    .iter()
                    .filter(|(_, r)| r.assertions.iter().any(|a| a.matches(assertion)))
                    .map(|(uid, _)| uid)
                    .collect();
                match matches.as_slice() {
                    [uid] => (*uid).clone(),
                    [] => {
                        return Err(TrustError::Resolution {
                            target: target.to_string(),
                            reason: "no user has proven this assertion".into(),
                        })
                    }
                    many => {
                        return Err(TrustError::Resolution {
                            target: target.to_string(),
                            reason: format!("ambiguous: claimed by {} users", many.len()),
                        })
                    }
                }
            }
        };

        let record = self.record(&uid)?;
        let graph = KeyFamilyGraph::build(uid.clone(), record.keys, record.revocations)?;
        Ok(ResolvedUser {
            uid,
            username: record.username,
            keys: Arc::new(graph),
            assertions: record.assertions,
        })
    }
}
