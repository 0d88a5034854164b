//! Single-use email verification credential.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque verification credential embedded in the verification email.
///
/// Backed by a random (v4) UUID: 122 random bits, hyphenated on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerificationToken(Uuid);

impl VerificationToken {
    /// Draw a fresh token from the OS random source.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for VerificationToken {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for VerificationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

/// A presented token that is not structurally a credential.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenParseError {
    #[error("token cannot be empty")]
    Empty,
    #[error("invalid token format")]
    InvalidFormat,
}

impl FromStr for VerificationToken {
    type Err = TokenParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TokenParseError::Empty);
        }
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| TokenParseError::InvalidFormat)
    }
}
