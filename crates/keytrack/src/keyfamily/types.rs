//! Key family data model: key ids, device keys, revocations.

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use x25519_dalek::PublicKey as X25519PublicKey;

use crate::error::{Result, TrustError};

const KID_VERSION: &str = "01";
const KID_TAG_ED25519: &str = "20";
const KID_TAG_X25519: &str = "21";
const KID_SUFFIX: &str = "0a";
/// version + tag + 32 key bytes + suffix, hex encoded.
const KID_HEX_LEN: usize = 2 + 2 + 64 + 2;

/// Key id: the hex encoding of a versioned, type-tagged public key.
///
/// Format: `01` ‖ type (`20` Ed25519, `21` X25519) ‖ key ‖ `0a`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kid(String);

impl Kid {
    /// Wrap an existing kid string. The value is lower-cased but not validated.
    pub fn new(kid: impl Into<String>) -> Self {
        Self(kid.into().to_ascii_lowercase())
    }

    pub fn from_ed25519(key: &VerifyingKey) -> Self {
        Self::encode(KID_TAG_ED25519, key.as_bytes())
    }

    pub fn from_x25519(key: &X25519PublicKey) -> Self {
        Self::encode(KID_TAG_X25519, key.as_bytes())
    }

    fn encode(tag: &str, key: &[u8; 32]) -> Self {
        Self(format!("{KID_VERSION}{tag}{}{KID_SUFFIX}", hex::encode(key)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(16) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }

    /// The algorithm encoded in the kid, if it is well formed.
    pub fn algorithm(&self) -> Option<KeyAlgorithm> {
        if !self.0.is_ascii()
            || self.0.len() != KID_HEX_LEN
            || !self.0.starts_with(KID_VERSION)
            || !self.0.ends_with(KID_SUFFIX)
        {
            return None;
        }
        match &self.0[2..4] {
            KID_TAG_ED25519 => Some(KeyAlgorithm::Ed25519),
            KID_TAG_X25519 => Some(KeyAlgorithm::X25519),
            _ => None,
        }
    }

    fn key_bytes(&self, expected: KeyAlgorithm) -> Result<[u8; 32]> {
        match self.algorithm() {
            Some(alg) if alg == expected => {}
            Some(alg) => {
                return Err(TrustError::InvalidKey(format!(
                    "kid {} is {alg:?}, expected {expected:?}",
                    self.short()
                )))
            }
            None => {
                return Err(TrustError::InvalidKey(format!(
                    "malformed kid {}",
                    self.short()
                )))
            }
        }
        let bytes = hex::decode(&self.0[4..KID_HEX_LEN - 2])
            .map_err(|e| TrustError::InvalidKey(format!("kid is not hex: {e}")))?;
        bytes
            .try_into()
            .map_err(|_| TrustError::InvalidKey("kid key must be 32 bytes".into()))
    }

    /// Decode the Ed25519 verifying key embedded in this kid.
    pub fn ed25519_key(&self) -> Result<VerifyingKey> {
        let bytes = self.key_bytes(KeyAlgorithm::Ed25519)?;
        VerifyingKey::from_bytes(&bytes).map_err(|e| {
            TrustError::InvalidKey(format!("kid {} is not an Ed25519 key: {e}", self.short()))
        })
    }

    /// Decode the X25519 public key embedded in this kid.
    pub fn x25519_key(&self) -> Result<X25519PublicKey> {
        let bytes = self.key_bytes(KeyAlgorithm::X25519)?;
        Ok(X25519PublicKey::from(bytes))
    }
}

impl std::fmt::Display for Kid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Public key algorithm of a key family member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyAlgorithm {
    /// Signing key (eldest key or sibkey).
    Ed25519,
    /// Encryption subkey.
    X25519,
}

/// Kind of device a key lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Mobile,
    /// A backup key written down on paper.
    Paper,
}

impl DeviceType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
            Self::Paper => "paper",
        }
    }
}

/// Lifecycle status of a key as published by its family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    /// No longer vouched for, without an explicit revocation (e.g. account reset).
    Inactive,
}

/// Classification of a key by the device that parents it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyClass {
    Device,
    Backup,
    Unknown,
}

/// A single key in a user's key family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceKey {
    pub kid: Kid,
    pub device_id: String,
    pub device_type: DeviceType,
    pub is_sibkey: bool,
    pub is_eldest: bool,
    pub parent_id: Option<Kid>,
    pub created_at: u64,
    pub expires_at: Option<u64>,
    pub status: KeyStatus,
}

impl DeviceKey {
    /// The root signing key of a family.
    pub fn eldest(
        kid: Kid,
        device_id: impl Into<String>,
        device_type: DeviceType,
        created_at: u64,
    ) -> Self {
        Self {
            kid,
            device_id: device_id.into(),
            device_type,
            is_sibkey: false,
            is_eldest: true,
            parent_id: None,
            created_at,
            expires_at: None,
            status: KeyStatus::Active,
        }
    }

    /// A signing key delegated from `parent`.
    pub fn sibkey(
        kid: Kid,
        device_id: impl Into<String>,
        device_type: DeviceType,
        parent: &Kid,
        created_at: u64,
    ) -> Self {
        Self {
            kid,
            device_id: device_id.into(),
            device_type,
            is_sibkey: true,
            is_eldest: false,
            parent_id: Some(parent.clone()),
            created_at,
            expires_at: None,
            status: KeyStatus::Active,
        }
    }

    /// An encryption subkey living on the same device as `parent`.
    pub fn subkey(kid: Kid, parent: &DeviceKey, created_at: u64) -> Self {
        Self {
            kid,
            device_id: parent.device_id.clone(),
            device_type: parent.device_type,
            is_sibkey: false,
            is_eldest: false,
            parent_id: Some(parent.kid.clone()),
            created_at,
            expires_at: None,
            status: KeyStatus::Active,
        }
    }

    pub fn with_expiry(mut self, expires_at: u64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_status(mut self, status: KeyStatus) -> Self {
        self.status = status;
        self
    }

    /// Eldest keys and sibkeys can sign; everything else is a subkey.
    pub fn is_signing_key(&self) -> bool {
        self.is_eldest || self.is_sibkey
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }
}

/// A key together with the record of its revocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokedKey {
    pub key: DeviceKey,
    pub revoked_at: u64,
    pub revoked_by: Kid,
}
