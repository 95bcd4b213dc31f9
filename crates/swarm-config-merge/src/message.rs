//! Merge inputs, push outputs and merge results.

use bytes::Bytes;
use swarm_config_core::Namespace;

use crate::error::RejectReason;

/// A remote config snapshot fetched from the swarm, already decrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigMessage {
    pub namespace: Namespace,
    /// Swarm hash of the stored message.
    pub hash: String,
    /// Swarm storage timestamp.
    pub timestamp_ms: u64,
    pub data: Bytes,
}

impl ConfigMessage {
    pub fn new(
        namespace: Namespace,
        hash: impl Into<String>,
        timestamp_ms: u64,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            namespace,
            hash: hash.into(),
            timestamp_ms,
            data: data.into(),
        }
    }
}

/// A serialized config ready to be encrypted and stored in the swarm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushData {
    pub namespace: Namespace,
    pub seqno: u64,
    pub data: Vec<u8>,
}

/// A merge input that was not absorbed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub hash: String,
    pub reason: RejectReason,
}

/// How a merge went overall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No messages were given.
    Empty,
    /// Every message was absorbed.
    Complete,
    /// Some messages were rejected.
    Partial,
    /// Every message was rejected.
    Failed,
}

/// Result of merging messages into a config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeResult {
    /// Hashes of absorbed messages, in input order.
    pub accepted: Vec<String>,
    /// Messages that could not be absorbed.
    pub rejected: Vec<Rejection>,
    /// Whether the config's content changed.
    pub changed: bool,
}

impl MergeOutcome {
    pub fn from_counts(accepted: usize, rejected: usize) -> Self {
        match (accepted, rejected) {
            (0, 0) => MergeOutcome::Empty,
            (_, 0) => MergeOutcome::Complete,
            (0, _) => MergeOutcome::Failed,
            _ => MergeOutcome::Partial,
        }
    }
}

impl MergeResult {
    pub fn outcome(&self) -> MergeOutcome {
        MergeOutcome::from_counts(self.accepted.len(), self.rejected.len())
    }

    /// Fold another result into this one.
    pub fn extend(&mut self, other: MergeResult) {
        self.accepted.extend(other.accepted);
        self.rejected.extend(other.rejected);
        self.changed |= other.changed;
    }
}

/// Top-level keys of encoded messages and dumps.
pub(crate) mod keys {
    pub const NEEDS_PUSH: &[u8] = b"!";
    pub const SEQNO: &[u8] = b"#";
    pub const OBSERVED_SEQNO: &[u8] = b"$";
    pub const STAMPS: &[u8] = b"<";
    pub const DATA: &[u8] = b"=";
    pub const NAMESPACE: &[u8] = b"n";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome() {
        let mut result = MergeResult::default();
        assert_eq!(result.outcome(), MergeOutcome::Empty);
        result.rejected.push(Rejection {
            hash: "h1".into(),
            reason: RejectReason::EmptyHash,
        });
        assert_eq!(result.outcome(), MergeOutcome::Failed);
        result.accepted.push("h2".into());
        assert_eq!(result.outcome(), MergeOutcome::Partial);
        result.rejected.clear();
        assert_eq!(result.outcome(), MergeOutcome::Complete);
    }

    #[test]
    fn test_message_borrows_nothing() {
        let raw = vec![b'd', b'e'];
        let msg = ConfigMessage::new(Namespace::UserProfile, "h", 1, raw.clone());
        drop(raw);
        assert_eq!(msg.data.as_ref(), b"de");
    }
}
