//! Detached Ed25519 signatures.
//!
//! A signed record stores its signature base64-encoded next to the kid
//! that made it. The kid embeds the public key, so a signature can be
//! checked without a directory lookup.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey};

use crate::error::{Result, TrustError};
use crate::keyfamily::Kid;

/// Sign `message`, returning the base64 signature.
pub fn sign_detached(signing_key: &SigningKey, message: &[u8]) -> String {
    STANDARD.encode(signing_key.sign(message).to_bytes())
}

/// Check a base64 signature over `message` by the key `kid` names.
///
/// # Errors
///
/// `InvalidKey` if `kid` is not an Ed25519 kid or the signature is not
/// 64 base64-encoded bytes. `SignatureInvalid` if it does not verify.
pub fn verify_detached(kid: &Kid, message: &[u8], signature: &str) -> Result<()> {
    let verifying_key = kid.ed25519_key()?;
    let bytes: [u8; 64] = STANDARD
        .decode(signature)
        .map_err(|e| TrustError::InvalidKey(format!("invalid base64 signature: {e}")))?
        .try_into()
        .map_err(|_| TrustError::InvalidKey("signature must be 64 bytes".into()))?;
    verifying_key
        .verify_strict(message, &Signature::from_bytes(&bytes))
        .map_err(|_| TrustError::SignatureInvalid)
}

/// Whether `signing_key` is the secret half of `kid`.
pub fn is_key_for(signing_key: &SigningKey, kid: &Kid) -> bool {
    Kid::from_ed25519(&signing_key.verifying_key()) == *kid
}
