//! Deterministic merge of remote config messages.
//!
//! Every message is decoded into a [`Snapshot`] whose leaves carry stamps:
//! explicit `[timestamp_ms, hash]` pairs for values the sender learned from
//! earlier messages, or the message's own stamp for values it introduced.
//! The merged state is the join of the local snapshot and every accepted
//! input, so the outcome does not depend on arrival order or batching.

use swarm_config_core::{decode_dict, maybe_decompress, Dict, Stamp, Value};

use crate::error::RejectReason;
use crate::message::{keys, ConfigMessage, MergeResult, Rejection};
use crate::object::ConfigObject;
use crate::tree::{expire_tombstones, join, resolve, Snapshot, StampSource};

impl ConfigObject {
    /// Merge remote messages into this config.
    ///
    /// Malformed messages are rejected individually and never affect the
    /// rest of the batch. After the merge `needs_push` is false if the
    /// result equals one of the accepted inputs, true if the result is new
    /// content, and unchanged otherwise.
    ///
    /// Tombstones older than the configured TTL are dropped from the local
    /// state and from every input before joining.
    pub fn merge(&mut self, messages: &[ConfigMessage]) -> MergeResult {
        let mut result = MergeResult::default();
        let mut inputs = Vec::with_capacity(messages.len());
        let mut max_seqno = None;
        let cutoff = self.tombstone_cutoff();

        for msg in messages {
            match self.decode_message(msg) {
                Ok((mut snapshot, seqno)) => {
                    expire_tombstones(&snapshot.data, &mut snapshot.stamps, cutoff);
                    result.accepted.push(msg.hash.clone());
                    max_seqno = max_seqno.max(Some(seqno));
                    inputs.push(snapshot);
                }
                Err(reason) => {
                    tracing::debug!(
                        namespace = %self.namespace(),
                        hash = %msg.hash,
                        %reason,
                        "rejected config message"
                    );
                    result.rejected.push(Rejection {
                        hash: msg.hash.clone(),
                        reason,
                    });
                }
            }
        }

        if inputs.is_empty() {
            return result;
        }

        let policy = self.schema.root();
        let mut before = self.snapshot();
        let expired = expire_tombstones(&before.data, &mut before.stamps, cutoff);
        let merged = inputs
            .iter()
            .fold(before.clone(), |acc, input| join(policy, &acc, input));
        let changed = merged != before;

        let flags = (self.needs_push, self.seqno, self.observed_seqno);
        if inputs.iter().any(|input| *input == merged) {
            self.needs_push = false;
        } else if changed {
            self.needs_push = true;
        }
        if let Some(seqno) = max_seqno {
            self.observed_seqno = self.observed_seqno.max(seqno);
        }
        // Adopt the highest seqno seen even when the content is unchanged,
        // so the next push never reuses a seqno another device already stored.
        self.seqno = self.seqno.max(self.observed_seqno);

        if changed || expired > 0 {
            self.install(merged);
        }
        if changed || expired > 0 || flags != (self.needs_push, self.seqno, self.observed_seqno) {
            self.needs_dump = true;
        }

        result.changed = changed;
        tracing::debug!(
            namespace = %self.namespace(),
            accepted = result.accepted.len(),
            rejected = result.rejected.len(),
            changed,
            needs_push = self.needs_push,
            "merged config messages"
        );
        result
    }

    fn decode_message(&self, msg: &ConfigMessage) -> Result<(Snapshot, u64), RejectReason> {
        if msg.namespace != self.namespace() {
            return Err(RejectReason::WrongNamespace {
                expected: self.namespace(),
                found: msg.namespace,
            });
        }
        if msg.hash.is_empty() {
            return Err(RejectReason::EmptyHash);
        }

        let raw = maybe_decompress(&msg.data, self.config.max_decompressed_size)
            .ok_or(RejectReason::Decompression)?;
        let top = decode_dict(&raw)?;

        let seqno = match top.get(keys::SEQNO) {
            None => 0,
            Some(Value::Integer(i)) => u64::try_from(*i)
                .map_err(|_| RejectReason::Malformed("seqno must not be negative"))?,
            Some(_) => return Err(RejectReason::Malformed("seqno must be an integer")),
        };
        let data = optional_dict(&top, keys::DATA)
            .ok_or(RejectReason::Malformed("content must be a dict"))?;
        let stamps = optional_dict(&top, keys::STAMPS)
            .ok_or(RejectReason::Malformed("stamps must be a dict"))?;

        let envelope = Stamp::new(msg.timestamp_ms, msg.hash.as_bytes());
        let snapshot = resolve(
            self.schema.root(),
            data,
            stamps,
            &StampSource::Message(&envelope),
        )?;
        Ok((snapshot, seqno))
    }
}

static EMPTY: Dict = Dict::new();

/// The dict stored under `key`, an empty dict if absent, `None` if the
/// entry is not a dict.
pub(crate) fn optional_dict<'a>(top: &'a Dict, key: &[u8]) -> Option<&'a Dict> {
    match top.get(key) {
        None => Some(&EMPTY),
        Some(value) => value.as_dict(),
    }
}
