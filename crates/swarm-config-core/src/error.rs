//! Error types for swarm-config core.

use thiserror::Error;

/// Failure to decode an encoded value.
///
/// Every variant carries the byte offset at which decoding stopped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Input ended before the value was complete.
    #[error("truncated input at offset {offset}")]
    Truncated { offset: usize },

    /// A byte that cannot start or continue a value.
    #[error("unexpected byte 0x{byte:02x} at offset {offset}")]
    UnexpectedByte { byte: u8, offset: usize },

    /// Dict keys must be strictly increasing.
    #[error("dict key out of order at offset {offset}")]
    UnsortedKey { offset: usize },

    /// The same dict key appeared twice.
    #[error("duplicate dict key at offset {offset}")]
    DuplicateKey { offset: usize },

    /// A byte-string length prefix that is malformed or runs past the input.
    #[error("invalid length prefix at offset {offset}")]
    InvalidLength { offset: usize },

    /// Integer does not fit in an i64.
    #[error("integer overflow at offset {offset}")]
    IntegerOverflow { offset: usize },

    /// Leading zeros, `-0`, or an empty integer body.
    #[error("non-canonical integer at offset {offset}")]
    NonCanonicalInteger { offset: usize },

    /// Bytes left over after the top-level value.
    #[error("trailing data at offset {offset}")]
    TrailingData { offset: usize },

    /// Nesting deeper than the decoder allows.
    #[error("nesting too deep at offset {offset}")]
    TooDeep { offset: usize },

    /// The top-level value is not a dict where one is required.
    #[error("expected a dict")]
    NotADict,
}

/// A value does not fit the shape a namespace schema requires.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A container field holds something other than a dict.
    #[error("field {path} must be a dict")]
    ExpectedDict { path: String },

    /// A stamp entry is not `[ts, hash]` or `[]`.
    #[error("malformed stamp at {path}")]
    MalformedStamp { path: String },

    /// A data leaf exists with no stamp recorded for it.
    #[error("missing stamp at {path}")]
    MissingStamp { path: String },

    /// A path crosses a value that cannot be descended into.
    #[error("path {path} crosses a non-dict value")]
    NotTraversable { path: String },

    /// Content uses the key reserved for erase stamps.
    #[error("reserved empty key at {path}")]
    ReservedKey { path: String },
}

/// General core errors.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("compression failed: {0}")]
    Compression(#[from] std::io::Error),

    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("unknown namespace code: {0}")]
    UnknownNamespace(i16),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Render a key path for error messages.
pub fn display_path(path: &[Vec<u8>]) -> String {
    if path.is_empty() {
        return "<root>".into();
    }
    path.iter()
        .map(|k| String::from_utf8_lossy(k).into_owned())
        .collect::<Vec<_>>()
        .join(".")
}
