//! Device key pairs.
//!
//! An [`Ed25519KeyPair`] backs an eldest key or sibkey and signs tracking
//! statements. An [`X25519KeyPair`] backs a per-device encryption subkey
//! and opens the team secrets sealed to it. Both are known inside a key
//! family by their [`Kid`].

use ed25519_dalek::{SigningKey, VerifyingKey};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use crate::keyfamily::Kid;

/// A signing key pair. The secret half is wiped on drop by `ed25519-dalek`.
pub struct Ed25519KeyPair {
    signing_key: SigningKey,
}

impl Ed25519KeyPair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut rand::thread_rng()),
        }
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn kid(&self) -> Kid {
        Kid::from_ed25519(&self.verifying_key())
    }
}

impl std::fmt::Debug for Ed25519KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ed25519KeyPair({})", self.kid().short())
    }
}

/// A static encryption key pair for one device.
pub struct X25519KeyPair {
    secret: StaticSecret,
    public: X25519PublicKey,
}

impl X25519KeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(rand::thread_rng());
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Raw shared secret with `peer`. Callers must run it through a KDF.
    pub fn diffie_hellman(&self, peer: &X25519PublicKey) -> [u8; 32] {
        *self.secret.diffie_hellman(peer).as_bytes()
    }

    pub fn public_key(&self) -> &X25519PublicKey {
        &self.public
    }

    pub fn kid(&self) -> Kid {
        Kid::from_x25519(&self.public)
    }
}

impl std::fmt::Debug for X25519KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "X25519KeyPair({})", self.kid().short())
    }
}
