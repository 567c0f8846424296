//! The authenticated caller.
//!
//! Login state is not global: every engine invocation receives an
//! [`AuthContext`], and the first thing the engine does is ask it for a
//! [`Session`]. A logged-out context fails with `LoginRequired` before
//! any resolution work starts.

use std::collections::HashMap;
use std::sync::Arc;

use ed25519_dalek::SigningKey;

use crate::crypto::keys::{Ed25519KeyPair, X25519KeyPair};
use crate::error::{Result, TrustError};
use crate::keyfamily::{KeyFamilyHandle, Kid};

use super::Uid;

/// Secret halves of the keys this device holds.
#[derive(Default)]
pub struct Keyring {
    signing: HashMap<Kid, SigningKey>,
    encryption: HashMap<Kid, X25519KeyPair>,
}

impl Keyring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_signing_key(&mut self, key_pair: &Ed25519KeyPair) -> Kid {
        let kid = key_pair.kid();
        self.signing
            .insert(kid.clone(), key_pair.signing_key().clone());
        kid
    }

    pub fn add_encryption_key(&mut self, key_pair: X25519KeyPair) -> Kid {
        let kid = key_pair.kid();
        self.encryption.insert(kid.clone(), key_pair);
        kid
    }

    pub fn signing_key(&self, kid: &Kid) -> Option<&SigningKey> {
        self.signing.get(kid)
    }

    pub fn encryption_key(&self, kid: &Kid) -> Option<&X25519KeyPair> {
        self.encryption.get(kid)
    }
}

impl std::fmt::Debug for Keyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyring")
            .field("signing", &self.signing.keys().collect::<Vec<_>>())
            .field("encryption", &self.encryption.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A logged-in user on this device.
#[derive(Debug, Clone)]
pub struct Session {
    pub uid: Uid,
    pub username: String,
    pub keys: Arc<KeyFamilyHandle>,
    pub keyring: Arc<Keyring>,
}

impl Session {
    pub fn new(
        uid: Uid,
        username: impl Into<String>,
        keys: Arc<KeyFamilyHandle>,
        keyring: Arc<Keyring>,
    ) -> Self {
        Self {
            uid,
            username: username.into(),
            keys,
            keyring,
        }
    }

    /// The active signing key of this user's family, with its secret.
    ///
    /// # Errors
    ///
    /// Returns `NoVerifiableKey` if the family has no active signing key
    /// or this device does not hold its secret.
    pub fn signer(&self, now: u64) -> Result<(Kid, SigningKey)> {
        let graph = self.keys.current();
        let active = graph.active_signing_key(now)?;
        let secret = self.keyring.signing_key(&active.kid).ok_or_else(|| {
            log::warn!(
                "active key {} for {} is not on this device",
                active.kid.short(),
                self.uid
            );
            TrustError::NoVerifiableKey {
                uid: self.uid.to_string(),
            }
        })?;
        Ok((active.kid.clone(), secret.clone()))
    }
}

/// Explicit authentication state passed into every engine invocation.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    session: Option<Session>,
}

impl AuthContext {
    pub fn logged_out() -> Self {
        Self { session: None }
    }

    pub fn logged_in(session: Session) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.is_some()
    }

    pub fn logout(&mut self) {
        self.session = None;
    }

    /// # Errors
    ///
    /// Returns `LoginRequired` when no user is logged in.
    pub fn require_login(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(TrustError::LoginRequired)
    }
}
