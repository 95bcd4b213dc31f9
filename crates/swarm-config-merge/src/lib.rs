//! # swarm-config merge
//!
//! Config objects: typed access through field proxies, deterministic merge
//! of remote messages, dump/load, and push tracking.
//!
//! ## Key Properties
//!
//! - **Commutative**: Message order doesn't affect the merged state
//! - **Batch-independent**: Merging in one batch or many gives the same state
//! - **Idempotent**: Re-merging an absorbed message changes nothing
//! - **Lossless**: Unknown top-level keys survive load, merge and dump
//!
//! ## Usage
//!
//! ```rust
//! use swarm_config_core::Namespace;
//! use swarm_config_merge::{ConfigMessage, ConfigObject};
//!
//! let mut phone = ConfigObject::new(Namespace::UserProfile, None).unwrap();
//! phone.field("n").assign("Alice").unwrap();
//!
//! // Store the push in the swarm, then record where it landed.
//! let push = phone.push().unwrap().unwrap();
//! phone.confirm_pushed(push.seqno, "hash-1", 1_700_000_000_000);
//!
//! let mut laptop = ConfigObject::new(Namespace::UserProfile, None).unwrap();
//! let msg = ConfigMessage::new(Namespace::UserProfile, "hash-1", 1_700_000_000_000, push.data);
//! laptop.merge(&[msg]);
//! assert_eq!(laptop.view("n").string(), Some("Alice"));
//! ```
//!
//! ## Lifecycle
//!
//! ```text
//! write ──> needs_push ──> push() ──> swarm ──> confirm_pushed()
//!              ^                        |
//!              └──── merge() <──────────┘ (other devices)
//! ```

pub mod clock;
pub mod convergence;
pub mod dump;
pub mod error;
pub mod merge;
pub mod message;
pub mod object;
pub mod proxy;
pub mod tree;

pub use clock::{Clock, ManualClock, OffsetClock, SystemClock};
pub use convergence::{content_hash, verify_convergence, ContentHash, ConvergenceResult};
pub use error::{LoadError, ObjectError, RejectReason, Result};
pub use message::{ConfigMessage, MergeOutcome, MergeResult, PushData, Rejection};
pub use object::{
    ConfigObject, ObjectConfig, DEFAULT_MAX_DECOMPRESSED_SIZE, DEFAULT_TOMBSTONE_TTL_MS,
};
pub use proxy::{DictField, DictFieldProxy};
pub use tree::{Snapshot, StampMap, StampNode, ERASED};
