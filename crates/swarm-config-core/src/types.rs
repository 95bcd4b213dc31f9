//! Strong identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Prefix byte of a group session id.
pub const GROUP_PREFIX: u8 = 0x03;

/// Prefix byte of a user session id.
pub const USER_PREFIX: u8 = 0x05;

/// A 33-byte session id: a prefix byte and a 32-byte public key.
///
/// Written as 66 hex characters. Prefix `03` identifies a group,
/// `05` a user account.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(pub [u8; 33]);

impl SessionId {
    /// Build from a prefix and a 32-byte key.
    pub fn new(prefix: u8, key: [u8; 32]) -> Self {
        let mut bytes = [0u8; 33];
        bytes[0] = prefix;
        bytes[1..].copy_from_slice(&key);
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }

    pub fn prefix(&self) -> u8 {
        self.0[0]
    }

    /// The 32-byte key without the prefix.
    pub fn key(&self) -> &[u8] {
        &self.0[1..]
    }

    pub fn is_group(&self) -> bool {
        self.prefix() == GROUP_PREFIX
    }

    pub fn is_user(&self) -> bool {
        self.prefix() == USER_PREFIX
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse 66 hex characters.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        if s.len() != 66 {
            return Err(CoreError::InvalidSessionId(format!(
                "expected 66 hex characters, got {}",
                s.len()
            )));
        }
        let mut bytes = [0u8; 33];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| CoreError::InvalidSessionId(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Parse a hex group id, requiring the `03` prefix.
    pub fn group_from_hex(s: &str) -> Result<Self, CoreError> {
        let id = Self::from_hex(s)?;
        if !id.is_group() {
            return Err(CoreError::InvalidSessionId(format!(
                "group id must start with 03, got {:02x}",
                id.prefix()
            )));
        }
        Ok(id)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", &self.to_hex()[..18])
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for SessionId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for SessionId {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.to_hex()
    }
}

impl AsRef<[u8]> for SessionId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
