//! Error types for config objects.

use swarm_config_core::{CoreError, Namespace, ParseError, SchemaError};
use thiserror::Error;

/// Errors from constructing or mutating a config object.
#[derive(Debug, Error)]
pub enum ObjectError {
    /// The namespace does not hold a config.
    #[error("namespace {0} is not a config namespace")]
    NotAConfig(Namespace),

    /// A write addressed a top-level key the schema does not model.
    #[error("field {0} is not known to this schema")]
    UnknownField(String),

    /// A write with an empty path.
    #[error("cannot write the root of a config")]
    EmptyPath,

    /// The value or path does not fit the schema.
    #[error("schema mismatch: {0}")]
    Schema(#[from] SchemaError),

    /// Core failure, e.g. compression.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Errors from loading a dump.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The compressed dump was corrupt or exceeded the size ceiling.
    #[error("dump failed to decompress")]
    Decompression,

    /// The dump is not a canonical encoded dict.
    #[error("dump is not a valid encoded dict: {0}")]
    Parse(#[from] ParseError),

    /// The dump belongs to another namespace.
    #[error("dump is for namespace {found}, expected {expected}")]
    WrongNamespace { expected: Namespace, found: i64 },

    /// A required field is missing or has the wrong type.
    #[error("malformed dump: {0}")]
    Malformed(&'static str),

    /// Content and stamps disagree with the schema.
    #[error("dump does not fit schema: {0}")]
    Schema(#[from] SchemaError),
}

/// Why a merge input was not absorbed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("message is for namespace {found}, expected {expected}")]
    WrongNamespace { expected: Namespace, found: Namespace },

    #[error("namespace {0} holds no config for this scope")]
    NotInScope(Namespace),

    #[error("message has an empty hash")]
    EmptyHash,

    #[error("message failed to decompress or exceeded the size ceiling")]
    Decompression,

    #[error("message is not a valid encoded dict: {0}")]
    Parse(#[from] ParseError),

    #[error("malformed message: {0}")]
    Malformed(&'static str),

    #[error("message does not fit schema: {0}")]
    Schema(#[from] SchemaError),
}

/// Result type for config object operations.
pub type Result<T> = std::result::Result<T, ObjectError>;
