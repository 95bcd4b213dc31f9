//! # swarm-config
//!
//! Client-side config sync for a multi-device account. Each device edits
//! its own copy of the account's configs; copies pushed to the swarm by
//! other devices are merged back in and converge to the same state.
//!
//! ## Key Types
//!
//! - [`State`] - Every config the account holds, plus the hooks that move them
//! - [`UserKeys`] - The account's Ed25519 identity and session id
//! - [`UserProfile`] / [`Contacts`] - Typed views over the profile and contact list
//! - [`SendHook`] / [`StoreHook`] / [`Logger`] - Where pushes, dumps and log lines go
//! - [`StateError`] - Everything that can go wrong, with integer codes for FFI callers
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use swarm_config::{PendingPush, SendHook, State, StateConfig, UserKeys};
//!
//! let mut state = State::new(UserKeys::generate(), StateConfig::default()).unwrap();
//!
//! let sent = Arc::new(Mutex::new(Vec::new()));
//! let sink = sent.clone();
//! let hook: Box<dyn SendHook> = Box::new(move |_: &str, push: &PendingPush| {
//!     sink.lock().unwrap().push(push.clone());
//! });
//! state.set_send_hook(Some(hook)).unwrap();
//!
//! state.mutate_user_profile(|p| p.set_name("Alice")).unwrap();
//! assert_eq!(state.user_profile().name(), Some("Alice"));
//! assert_eq!(sent.lock().unwrap().len(), 1);
//! ```
//!
//! ## Re-exports
//!
//! - `swarm_config::core` - Encoded values, schemas, namespaces
//! - `swarm_config::merge` - Config objects, merge, dump and push

pub mod contacts;
pub mod error;
pub mod hooks;
pub mod keys;
pub mod profile;
pub mod state;

pub use contacts::{Contact, Contacts, ContactsMut, Expiration, NotifyMode};
pub use error::{boundary_message, Result, StateError, MAX_BOUNDARY_MESSAGE};
pub use hooks::{LogLevel, Logger, PendingMessage, PendingPush, SendHook, StoreHook};
pub use keys::UserKeys;
pub use profile::{ProfilePic, UserProfile, UserProfileMut, MAX_NAME_LENGTH};
pub use state::{MergeReport, NamespacedDump, State, StateConfig};

pub use swarm_config_core as core;
pub use swarm_config_merge as merge;

pub use swarm_config_core::{Namespace, SessionId};
pub use swarm_config_merge::{ConfigMessage, MergeOutcome, RejectReason};
