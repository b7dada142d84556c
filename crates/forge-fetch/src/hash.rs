//! Git object ids
//!
//! Commit revisions and tree hashes are both 160-bit SHA-1 object ids, rendered
//! as 40 lower-case hex characters.

use sha1::{Digest, Sha1};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A string that is not a 40 character hex object id
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid Git hash '{0}' (expected 40 hexadecimal characters)")]
pub struct HashParseError(pub String);

/// A 160-bit Git object id
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GitHash([u8; 20]);

impl GitHash {
    /// Number of hex characters in a rendered id
    pub const HEX_LEN: usize = 40;

    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parse a hex-encoded id. Upper-case digits are accepted.
    pub fn parse(s: &str) -> Result<Self, HashParseError> {
        if s.len() != Self::HEX_LEN {
            return Err(HashParseError(s.to_string()));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| HashParseError(s.to_string()))?;
        Ok(Self(bytes))
    }

    /// Lower-case hex rendering, as Git prints it
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Hash a complete Git object: `<kind> <len>\0<content>`
    pub fn of_object(kind: &str, content: &[u8]) -> Self {
        let mut hasher = Self::object_hasher(kind, content.len() as u64);
        hasher.update(content);
        Self::from_hasher(hasher)
    }

    /// A hasher primed with the object header, for content that is streamed in
    pub fn object_hasher(kind: &str, len: u64) -> Sha1 {
        let mut hasher = Sha1::new();
        hasher.update(format!("{kind} {len}\0").as_bytes());
        hasher
    }

    pub fn from_hasher(hasher: Sha1) -> Self {
        Self(hasher.finalize().into())
    }
}

impl fmt::Display for GitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for GitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GitHash({})", self.to_hex())
    }
}

impl FromStr for GitHash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
