//! Error types for the State façade.

use swarm_config_core::{CoreError, Namespace};
use swarm_config_merge::{LoadError, ObjectError};
use thiserror::Error;

/// Longest message handed across a foreign boundary, in bytes.
pub const MAX_BOUNDARY_MESSAGE: usize = 255;

/// Errors that can occur during State operations.
#[derive(Debug, Error)]
pub enum StateError {
    /// Secret key is neither a 32-byte seed nor a 64-byte keypair.
    #[error("invalid ed25519 secret key: expected 32 or 64 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// The public half of a 64-byte secret key does not match its seed.
    #[error("ed25519 secret key does not match its public key")]
    KeyMismatch,

    /// A scope pubkey is malformed or names another account.
    #[error("invalid scope {0}")]
    InvalidScope(String),

    /// The namespace does not belong to the given scope.
    #[error("namespace {namespace} does not belong to scope {scope}")]
    ScopeMismatch { namespace: Namespace, scope: String },

    /// The namespace does not hold a config.
    #[error("namespace {0} is not a config namespace")]
    NotAConfig(Namespace),

    /// No configs are held for this group.
    #[error("no configs for group {0}")]
    UnknownGroup(String),

    /// Group keys were loaded before the group's info or members.
    #[error("cannot load keys for group {0} before its info or members")]
    LoadOrder(String),

    /// A dump could not be loaded.
    #[error("failed to load {namespace} dump: {source}")]
    Load {
        namespace: Namespace,
        #[source]
        source: LoadError,
    },

    /// A typed accessor was given a value it cannot store.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// Config object error.
    #[error(transparent)]
    Object(#[from] ObjectError),

    /// Core error.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl StateError {
    /// Non-zero status code for callers that only see integers.
    pub fn code(&self) -> i32 {
        match self {
            StateError::InvalidKeyLength(_) => 1,
            StateError::KeyMismatch => 2,
            StateError::InvalidScope(_) => 3,
            StateError::ScopeMismatch { .. } => 4,
            StateError::NotAConfig(_) => 5,
            StateError::UnknownGroup(_) => 6,
            StateError::LoadOrder(_) => 7,
            StateError::Load { .. } => 8,
            StateError::InvalidValue(_) => 9,
            StateError::Object(_) => 10,
            StateError::Core(_) => 11,
        }
    }
}

/// Render `err` for a fixed-size error buffer.
///
/// Truncates to [`MAX_BOUNDARY_MESSAGE`] bytes without splitting a UTF-8
/// character.
pub fn boundary_message(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    if message.len() > MAX_BOUNDARY_MESSAGE {
        let mut end = MAX_BOUNDARY_MESSAGE;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);
    }
    message
}

/// Result type for State operations.
pub type Result<T> = std::result::Result<T, StateError>;
