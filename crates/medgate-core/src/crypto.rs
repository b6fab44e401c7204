//! Identity digests.
//!
//! Identities are never stored in the clear. Every identity comparison in
//! medgate is a comparison of [`IdentityHash`] values produced by the same
//! algorithm, so equal digests imply equal identities.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Domain prefix mixed into every identity digest.
pub const IDENTITY_DOMAIN: &[u8] = b"medgate.identity.v1\x00";

/// A 32-byte BLAKE3 digest of an identity string.
///
/// Serialized as 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdentityHash(pub [u8; 32]);

impl IdentityHash {
    /// Digest an identity string.
    pub fn of(identity: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(IDENTITY_DOMAIN);
        hasher.update(identity.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        if s.len() != 64 {
            return Err(CoreError::InvalidHash(format!(
                "expected 64 hex characters, got {}",
                s.len()
            )));
        }
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidHash(e.to_string()))?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for IdentityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for IdentityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for IdentityHash {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<IdentityHash> for String {
    fn from(hash: IdentityHash) -> Self {
        hash.to_hex()
    }
}

/// How a caller names another party in an operation argument.
///
/// A raw identifier is hashed server-side and is the trusted form. A
/// precomputed hash is accepted for compatibility with clients that only
/// hold digests, but it is untrusted input: the engine cross-checks it
/// against stored documents wherever a stored value exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartyRef {
    /// A raw identity string, digested by the engine.
    Id(String),
    /// A digest supplied by the caller.
    Hash(IdentityHash),
}

impl PartyRef {
    pub fn id(identity: impl Into<String>) -> Self {
        PartyRef::Id(identity.into())
    }

    pub fn hash(hash: IdentityHash) -> Self {
        PartyRef::Hash(hash)
    }

    /// The digest this reference resolves to.
    pub fn digest(&self) -> IdentityHash {
        match self {
            PartyRef::Id(identity) => IdentityHash::of(identity),
            PartyRef::Hash(hash) => *hash,
        }
    }
}
