//! Social assertions and tracking targets.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrustError};

/// An unresolved claim that a user is `username` on `service`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SocialAssertion {
    pub username: String,
    pub service: String,
}

impl SocialAssertion {
    /// Service names are case-insensitive and stored lower-case.
    pub fn new(username: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            service: service.into().to_ascii_lowercase(),
        }
    }

    /// Same service, and the same username ignoring ASCII case.
    pub fn matches(&self, other: &SocialAssertion) -> bool {
        self.service.eq_ignore_ascii_case(&other.service)
            && self.username.eq_ignore_ascii_case(&other.username)
    }
}

impl std::fmt::Display for SocialAssertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.username, self.service)
    }
}

/// What the caller asked to track: a username or `name@service`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetIdentifier {
    Username(String),
    Assertion(SocialAssertion),
}

impl TargetIdentifier {
    /// # Errors
    ///
    /// Returns `Resolution` for an empty identifier or an assertion with an
    /// empty side.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let invalid = |reason: &str| TrustError::Resolution {
            target: input.to_string(),
            reason: reason.to_string(),
        };
        if input.is_empty() {
            return Err(invalid("empty identifier"));
        }
        match input.split_once('@') {
            None => Ok(Self::Username(input.to_string())),
            Some((user, service)) => {
                if user.is_empty() || service.is_empty() || service.contains('@') {
                    return Err(invalid("malformed assertion, expected name@service"));
                }
                Ok(Self::Assertion(SocialAssertion::new(user, service)))
            }
        }
    }
}

impl std::str::FromStr for TargetIdentifier {
    type Err = TrustError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Display for TargetIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Username(name) => write!(f, "{name}"),
            Self::Assertion(assertion) => write!(f, "{assertion}"),
        }
    }
}
