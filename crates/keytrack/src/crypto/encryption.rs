//! Symmetric encryption using ChaCha20-Poly1305, and sealed boxes that
//! encrypt a payload to a recipient's X25519 public key.
//!
//! A sealed box uses a fresh ephemeral X25519 key per recipient. The
//! Diffie-Hellman output is expanded with HKDF-SHA256 under a caller
//! supplied context, so a box sealed for one team generation cannot be
//! opened as another.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use serde::{Deserialize, Serialize};
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey};
use zeroize::Zeroize;

use crate::crypto::derivation::derive_key;
use crate::crypto::keys::X25519KeyPair;
use crate::crypto::random_array;
use crate::error::{Result, TrustError};

/// Encrypt plaintext with ChaCha20-Poly1305.
///
/// Returns `(nonce, ciphertext)`. The nonce must be stored alongside
/// the ciphertext for decryption.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let nonce_bytes: [u8; 12] = random_array();
    let nonce = Nonce::from_slice(&nonce_bytes);
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| TrustError::EncryptionFailed(format!("cipher init: {e}")))?;
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| TrustError::EncryptionFailed(format!("encrypt: {e}")))?;
    Ok((nonce_bytes.to_vec(), ciphertext))
}

/// Decrypt ciphertext with ChaCha20-Poly1305.
pub fn decrypt(key: &[u8; 32], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if nonce.len() != 12 {
        return Err(TrustError::DecryptionFailed("nonce must be 12 bytes".into()));
    }
    let nonce = Nonce::from_slice(nonce);
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| TrustError::DecryptionFailed(format!("cipher init: {e}")))?;
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| TrustError::DecryptionFailed("authentication tag mismatch".into()))
}

/// A payload encrypted to a single X25519 recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBox {
    /// Base64 ephemeral X25519 public key.
    pub ephemeral_public: String,
    /// Base64 ChaCha20-Poly1305 nonce (12 bytes).
    pub nonce: String,
    /// Base64 ciphertext including the Poly1305 tag.
    pub ciphertext: String,
}

/// Seal `plaintext` for `recipient` under `context`.
pub fn seal(recipient: &X25519PublicKey, plaintext: &[u8], context: &str) -> Result<SealedBox> {
    let ephemeral_secret = EphemeralSecret::random_from_rng(rand::thread_rng());
    let ephemeral_public = X25519PublicKey::from(&ephemeral_secret);
    let shared = ephemeral_secret.diffie_hellman(recipient);
    let salt = seal_salt(&ephemeral_public, recipient);
    let mut key = derive_key(shared.as_bytes(), &salt, context)?;
    let sealed = encrypt(&key, plaintext);
    key.zeroize();
    let (nonce, ciphertext) = sealed?;

    Ok(SealedBox {
        ephemeral_public: STANDARD.encode(ephemeral_public.as_bytes()),
        nonce: STANDARD.encode(nonce),
        ciphertext: STANDARD.encode(ciphertext),
    })
}

/// Open a box sealed for `recipient` under `context`.
pub fn open(recipient: &X25519KeyPair, sealed: &SealedBox, context: &str) -> Result<Vec<u8>> {
    let ephemeral_bytes: [u8; 32] = decode_b64(&sealed.ephemeral_public, "ephemeral key")?
        .try_into()
        .map_err(|_| TrustError::DecryptionFailed("ephemeral key must be 32 bytes".into()))?;
    let ephemeral_public = X25519PublicKey::from(ephemeral_bytes);
    let nonce = decode_b64(&sealed.nonce, "nonce")?;
    let ciphertext = decode_b64(&sealed.ciphertext, "ciphertext")?;

    let mut shared = recipient.diffie_hellman(&ephemeral_public);
    let salt = seal_salt(&ephemeral_public, recipient.public_key());
    let derived = derive_key(&shared, &salt, context);
    shared.zeroize();
    let mut key = derived?;
    let plaintext = decrypt(&key, &nonce, &ciphertext);
    key.zeroize();
    plaintext
}

fn seal_salt(ephemeral: &X25519PublicKey, recipient: &X25519PublicKey) -> [u8; 64] {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(ephemeral.as_bytes());
    salt[32..].copy_from_slice(recipient.as_bytes());
    salt
}

fn decode_b64(value: &str, what: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| TrustError::DecryptionFailed(format!("invalid base64 {what}: {e}")))
}
