//! # swarm-config core
//!
//! Pure primitives for swarm-config: the canonical encoded value model,
//! unknown-field preservation, namespace schemas, write stamps and the
//! compression codec.
//!
//! This crate contains no I/O and no state. It is pure computation over
//! byte buffers.
//!
//! ## Key Types
//!
//! - [`Value`] - A bencode tree of integers, byte strings, lists and sorted dicts
//! - [`UnknownFields`] - Top-level keys a schema does not model, kept verbatim
//! - [`Schema`] / [`Policy`] - Per-namespace field layout and merge policy
//! - [`Stamp`] - `(timestamp_ms, hash)` marker deciding last-writer-wins
//! - [`Namespace`] - Which kind of config a buffer belongs to
//! - [`SessionId`] - 33-byte user or group identifier
//!
//! ## Canonical Encoding
//!
//! Decoding only accepts bytes that encoding would have produced. See the
//! [`value`] module.

pub mod compress;
pub mod error;
pub mod namespace;
pub mod schema;
pub mod stamp;
pub mod types;
pub mod unknown;
pub mod value;

pub use compress::{compress, decompress, maybe_decompress, COMPRESSED_PREFIX};
pub use error::{display_path, CoreError, ParseError, Result, SchemaError};
pub use namespace::Namespace;
pub use schema::{Field, Policy, Schema};
pub use stamp::{Stamp, StampEntry};
pub use types::SessionId;
pub use unknown::{extract, reinsert, UnknownFields, UnknownRun};
pub use value::{decode, decode_dict, encode, encode_dict, encode_entry, Dict, Value};
