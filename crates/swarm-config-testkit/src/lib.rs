//! # swarm-config testkit
//!
//! Testing utilities for swarm-config.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Exact encodings of values, dumps and pushes
//! - **Generators**: Proptest strategies for values, contacts and profile edits
//! - **Fixtures**: Multi-device setups with recording hooks and a simulated swarm
//!
//! ## Golden Vectors
//!
//! ```rust
//! use swarm_config_testkit::vectors::all_vectors;
//!
//! for vector in all_vectors() {
//!     assert!(vector.matches(), "{}", vector.name);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use swarm_config_testkit::generators::contact;
//!
//! proptest! {
//!     #[test]
//!     fn contacts_round_trip(c in contact()) {
//!         // ...
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use swarm_config_testkit::fixtures::account_devices;
//!
//! let mut devices = account_devices([1; 32], 2).unwrap();
//! devices[0].state.mutate_user_profile(|p| p.set_name("Alice")).unwrap();
//! let messages = devices[0].publish("hash").unwrap();
//! devices[1].receive(&messages).unwrap();
//! assert_eq!(devices[1].state.user_profile().name(), Some("Alice"));
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{account_devices, contact_id, group_id, init_tracing, Device, StoredDump};
pub use generators::{contact, edit_script, value, ProfileEdit};
pub use vectors::{all_vectors, verify_all_vectors, GoldenVector};
