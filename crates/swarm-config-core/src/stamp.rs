//! Write stamps: the per-leaf `(timestamp_ms, hash)` ordering used by merges.

use std::fmt;

use crate::value::Value;

/// Marks who last wrote a leaf and when.
///
/// Stamps order by timestamp, then by hash bytes, which gives every pair of
/// writes a total order. A stamp with an empty hash is a local write that
/// has not yet been confirmed by the swarm.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stamp {
    pub timestamp_ms: u64,
    pub hash: Vec<u8>,
}

/// A stamp entry as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StampEntry {
    /// An explicit `[ts, hash]` pair.
    Explicit(Stamp),
    /// `[]`: the leaf was written by the message carrying it.
    Envelope,
}

impl Stamp {
    pub fn new(timestamp_ms: u64, hash: impl Into<Vec<u8>>) -> Self {
        Self {
            timestamp_ms,
            hash: hash.into(),
        }
    }

    /// A local write at `timestamp_ms`, not yet pushed.
    pub fn pending(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            hash: Vec::new(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.hash.is_empty()
    }

    /// Encode as `[ts, hash]`.
    pub fn to_value(&self) -> Value {
        let ts = i64::try_from(self.timestamp_ms).unwrap_or(i64::MAX);
        Value::List(vec![Value::Integer(ts), Value::Bytes(self.hash.clone())])
    }

    /// The `[]` marker for a leaf written by the enclosing message.
    pub fn envelope_marker() -> Value {
        Value::List(Vec::new())
    }

    /// Parse a stamp entry; `None` if the value is not a well-formed stamp.
    pub fn parse(value: &Value) -> Option<StampEntry> {
        match value.as_list()? {
            [] => Some(StampEntry::Envelope),
            [Value::Integer(ts), Value::Bytes(hash)] => {
                let ts = u64::try_from(*ts).ok()?;
                Some(StampEntry::Explicit(Stamp::new(ts, hash.clone())))
            }
            _ => None,
        }
    }
}

impl fmt::Debug for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_pending() {
            write!(f, "Stamp({} pending)", self.timestamp_ms)
        } else {
            write!(
                f,
                "Stamp({} {})",
                self.timestamp_ms,
                String::from_utf8_lossy(&self.hash)
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_timestamp_then_hash() {
        let a = Stamp::new(100, "zzz");
        let b = Stamp::new(200, "aaa");
        let c = Stamp::new(200, "bbb");
        assert!(a < b);
        assert!(b < c);
        // A pending write loses a tie against any confirmed write.
        assert!(Stamp::pending(200) < b);
    }

    #[test]
    fn test_parse() {
        let s = Stamp::new(1_700_000_000_000, "abc");
        assert_eq!(Stamp::parse(&s.to_value()), Some(StampEntry::Explicit(s)));
        assert_eq!(Stamp::parse(&Stamp::envelope_marker()), Some(StampEntry::Envelope));
        assert_eq!(Stamp::parse(&Value::Integer(1)), None);
        assert_eq!(
            Stamp::parse(&Value::List(vec![Value::Integer(-1), Value::from("x")])),
            None
        );
        assert_eq!(Stamp::parse(&Value::List(vec![Value::Integer(1)])), None);
    }
}
