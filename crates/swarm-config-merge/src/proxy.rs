//! Path-addressed field access over a config object.
//!
//! ```rust
//! use swarm_config_core::Namespace;
//! use swarm_config_merge::ConfigObject;
//!
//! let mut contacts = ConfigObject::new(Namespace::Contacts, None).unwrap();
//! let id = "05".to_string() + &"ab".repeat(32);
//! contacts.field("c").at(&id).at("n").set_nonempty_str("Alice").unwrap();
//! contacts.field("c").at(&id).at("b").set_flag(true).unwrap();
//!
//! assert_eq!(contacts.view("c").at(&id).at("n").string(), Some("Alice"));
//! assert!(contacts.needs_push());
//! ```

use swarm_config_core::{Dict, Value};

use crate::error::Result;
use crate::object::ConfigObject;

/// Read-only view of the value at a path.
#[derive(Debug, Clone)]
pub struct DictField<'a> {
    object: &'a ConfigObject,
    path: Vec<Vec<u8>>,
}

impl<'a> DictField<'a> {
    pub(crate) fn new(object: &'a ConfigObject, path: Vec<Vec<u8>>) -> Self {
        Self { object, path }
    }

    /// Descend into `key`.
    pub fn at(mut self, key: impl AsRef<[u8]>) -> Self {
        self.path.push(key.as_ref().to_vec());
        self
    }

    pub fn get(&self) -> Option<&'a Value> {
        self.object.get_path(&self.path)
    }

    pub fn exists(&self) -> bool {
        self.get().is_some()
    }

    pub fn string(&self) -> Option<&'a str> {
        self.get().and_then(Value::as_str)
    }

    pub fn bytes(&self) -> Option<&'a [u8]> {
        self.get().and_then(Value::as_bytes)
    }

    pub fn integer(&self) -> Option<i64> {
        self.get().and_then(Value::as_int)
    }

    /// Integer value, or 0 when unset.
    pub fn integer_or_zero(&self) -> i64 {
        self.integer().unwrap_or(0)
    }

    /// Flag semantics: set and non-zero.
    pub fn flag(&self) -> bool {
        self.integer_or_zero() != 0
    }

    pub fn dict(&self) -> Option<&'a Dict> {
        self.get().and_then(Value::as_dict)
    }
}

/// Writable view of the value at a path.
///
/// Writes that change the value mark the owning config dirty and bump its
/// seqno. Every write returns whether anything changed.
#[derive(Debug)]
pub struct DictFieldProxy<'a> {
    object: &'a mut ConfigObject,
    path: Vec<Vec<u8>>,
}

impl<'a> DictFieldProxy<'a> {
    pub(crate) fn new(object: &'a mut ConfigObject, path: Vec<Vec<u8>>) -> Self {
        Self { object, path }
    }

    /// Descend into `key`.
    pub fn at(mut self, key: impl AsRef<[u8]>) -> Self {
        self.path.push(key.as_ref().to_vec());
        self
    }

    pub fn get(&self) -> Option<&Value> {
        self.object.get_path(&self.path)
    }

    /// Store `value`, creating intermediate dicts as needed.
    pub fn assign(self, value: impl Into<Value>) -> Result<bool> {
        self.object.write(&self.path, Some(value.into()))
    }

    /// Remove the value and any dicts it leaves empty.
    ///
    /// Erasing a path that does not exist changes nothing.
    pub fn erase(self) -> Result<bool> {
        self.object.write(&self.path, None)
    }

    /// Store `1` for true, erase for false.
    pub fn set_flag(self, on: bool) -> Result<bool> {
        if on {
            self.assign(1)
        } else {
            self.erase()
        }
    }

    /// Store the string if non-empty, erase otherwise.
    pub fn set_nonempty_str(self, s: &str) -> Result<bool> {
        if s.is_empty() {
            self.erase()
        } else {
            self.assign(s)
        }
    }

    /// Store the bytes if non-empty, erase otherwise.
    pub fn set_nonempty_bytes(self, b: &[u8]) -> Result<bool> {
        if b.is_empty() {
            self.erase()
        } else {
            self.assign(b)
        }
    }

    /// Store the integer if non-zero, erase otherwise.
    pub fn set_nonzero_int(self, i: i64) -> Result<bool> {
        if i != 0 {
            self.assign(i)
        } else {
            self.erase()
        }
    }

    /// Store the integer if positive, erase otherwise.
    pub fn set_positive_int(self, i: i64) -> Result<bool> {
        if i > 0 {
            self.assign(i)
        } else {
            self.erase()
        }
    }

    /// Set two sibling keys together when `cond` holds, erase both otherwise.
    ///
    /// Used for pairs that only make sense together, like a picture url and
    /// its decryption key.
    pub fn set_pair_if(
        self,
        cond: bool,
        first: (&[u8], Value),
        second: (&[u8], Value),
    ) -> Result<bool> {
        let mut first_path = self.path.clone();
        first_path.push(first.0.to_vec());
        let mut second_path = self.path;
        second_path.push(second.0.to_vec());

        let (first_value, second_value) = if cond {
            (Some(first.1), Some(second.1))
        } else {
            (None, None)
        };
        let a = self.object.write(&first_path, first_value)?;
        let b = self.object.write(&second_path, second_value)?;
        Ok(a || b)
    }
}
