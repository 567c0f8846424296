//! Key derivation using HKDF-SHA256.
//!
//! Derives symmetric keys from Diffie-Hellman outputs using context
//! strings, so a sealed team secret is bound to its team and generation.

use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::{Result, TrustError};

/// Derive a 32-byte key from input key material and a context string.
///
/// Uses HKDF-SHA256 (RFC 5869) with `salt` and the context as info.
pub fn derive_key(ikm: &[u8; 32], salt: &[u8], context: &str) -> Result<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut output = [0u8; 32];
    hk.expand(context.as_bytes(), &mut output)
        .map_err(|e| TrustError::DerivationFailed(format!("HKDF expand failed: {e}")))?;
    Ok(output)
}

/// Build the derivation context for sealing a team secret.
pub fn team_seal_context(team_id: &str, generation: u32) -> String {
    format!("keytrack/team-key/{team_id}/{generation}")
}
