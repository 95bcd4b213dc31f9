//! Local persistence and push tracking.
//!
//! A dump is a canonical dict holding everything needed to restore a
//! config exactly: content (unknown keys included), every stamp with
//! pending writes kept as `[ts, ""]`, both seqnos and the push flag.
//! Pushes carry the same content but only the stamps a peer can verify.

use swarm_config_core::{
    compress, decode_dict, encode_entry, maybe_decompress, reinsert, Stamp, Value,
    COMPRESSED_PREFIX,
};

use crate::error::{LoadError, Result};
use crate::merge::optional_dict;
use crate::message::{keys, PushData};
use crate::object::ConfigObject;
use crate::tree::{confirm_pending, encode_stamps, expire_tombstones, resolve, StampSource};

impl ConfigObject {
    /// Serialize the full state and clear `needs_dump`.
    pub fn dump(&mut self) -> Vec<u8> {
        let bytes = self.encode_dump();
        self.needs_dump = false;
        bytes
    }

    /// Like [`dump`](Self::dump), compressed at `level` behind the `z` prefix.
    pub fn dump_compressed(&mut self, level: i32) -> Result<Vec<u8>> {
        let bytes = compress(&self.encode_dump(), level, COMPRESSED_PREFIX)?;
        self.needs_dump = false;
        Ok(bytes)
    }

    /// Restore state from a dump, replacing everything held.
    ///
    /// On error the object is left untouched.
    pub fn load(&mut self, bytes: &[u8]) -> std::result::Result<(), LoadError> {
        let raw = maybe_decompress(bytes, self.config.max_decompressed_size)
            .ok_or(LoadError::Decompression)?;
        let top = decode_dict(&raw)?;

        let namespace = match top.get(keys::NAMESPACE) {
            Some(Value::Integer(n)) => *n,
            Some(_) => return Err(LoadError::Malformed("namespace must be an integer")),
            None => return Err(LoadError::Malformed("missing namespace")),
        };
        if namespace != i64::from(self.namespace().to_i16()) {
            return Err(LoadError::WrongNamespace {
                expected: self.namespace(),
                found: namespace,
            });
        }

        let seqno = counter(top.get(keys::SEQNO))?;
        let observed_seqno = counter(top.get(keys::OBSERVED_SEQNO))?;
        let needs_push = match top.get(keys::NEEDS_PUSH) {
            None => false,
            Some(Value::Integer(1)) => true,
            Some(_) => return Err(LoadError::Malformed("push flag must be 1")),
        };
        let data = optional_dict(&top, keys::DATA)
            .ok_or(LoadError::Malformed("content must be a dict"))?;
        let stamps = optional_dict(&top, keys::STAMPS)
            .ok_or(LoadError::Malformed("stamps must be a dict"))?;
        let mut snapshot = resolve(self.schema.root(), data, stamps, &StampSource::Dump)?;
        let expired =
            expire_tombstones(&snapshot.data, &mut snapshot.stamps, self.tombstone_cutoff());

        self.install(snapshot);
        self.seqno = seqno;
        self.observed_seqno = observed_seqno;
        self.needs_push = needs_push;
        self.needs_dump = expired > 0;

        tracing::debug!(
            namespace = %self.namespace(),
            seqno,
            needs_push,
            expired,
            bytes = bytes.len(),
            "loaded config dump"
        );
        Ok(())
    }

    /// The message to store in the swarm, or `None` if nothing is unpushed.
    ///
    /// The payload is compressed when that makes it smaller.
    pub fn push(&self) -> Result<Option<PushData>> {
        if !self.needs_push {
            return Ok(None);
        }
        let seqno = self.push_seqno();

        let mut buf = vec![b'd'];
        encode_entry(&mut buf, keys::SEQNO, &Value::Integer(as_int(seqno)));
        encode_entry(
            &mut buf,
            keys::STAMPS,
            &Value::Dict(encode_stamps(&self.stamps, true)),
        );
        self.encode_content(&mut buf);
        buf.push(b'e');

        let data = match self.config.compression_level {
            Some(level) => {
                let packed = compress(&buf, level, COMPRESSED_PREFIX)?;
                if packed.len() < buf.len() {
                    packed
                } else {
                    buf
                }
            }
            None => buf,
        };

        tracing::debug!(
            namespace = %self.namespace(),
            seqno,
            bytes = data.len(),
            "prepared config push"
        );
        Ok(Some(PushData {
            namespace: self.namespace(),
            seqno,
            data,
        }))
    }

    /// Record that the push with `seqno` was stored under `hash` at
    /// `timestamp_ms`.
    ///
    /// Returns true if that push is still the current one, in which case
    /// pending writes take the confirmed stamp and `needs_push` clears. A
    /// stale confirmation only raises the observed seqno.
    pub fn confirm_pushed(&mut self, seqno: u64, hash: &str, timestamp_ms: u64) -> bool {
        let current = !hash.is_empty() && self.needs_push && seqno == self.push_seqno();
        let before = (self.seqno, self.observed_seqno);

        if current {
            let confirmed = Stamp::new(timestamp_ms, hash.as_bytes());
            let restamped = confirm_pending(&mut self.stamps, &confirmed);
            self.needs_push = false;
            tracing::debug!(
                namespace = %self.namespace(),
                seqno,
                hash,
                restamped,
                "confirmed config push"
            );
        }
        self.observed_seqno = self.observed_seqno.max(seqno);
        self.seqno = self.seqno.max(self.observed_seqno);

        if current || before != (self.seqno, self.observed_seqno) {
            self.needs_dump = true;
        }
        current
    }

    fn encode_dump(&self) -> Vec<u8> {
        let mut buf = vec![b'd'];
        if self.needs_push {
            encode_entry(&mut buf, keys::NEEDS_PUSH, &Value::Integer(1));
        }
        encode_entry(&mut buf, keys::SEQNO, &Value::Integer(as_int(self.seqno)));
        encode_entry(
            &mut buf,
            keys::OBSERVED_SEQNO,
            &Value::Integer(as_int(self.observed_seqno)),
        );
        encode_entry(
            &mut buf,
            keys::STAMPS,
            &Value::Dict(encode_stamps(&self.stamps, false)),
        );
        self.encode_content(&mut buf);
        encode_entry(
            &mut buf,
            keys::NAMESPACE,
            &Value::Integer(i64::from(self.namespace().to_i16())),
        );
        buf.push(b'e');
        buf
    }

    /// Append the `=` entry: known content with unknown keys spliced back.
    fn encode_content(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(format!("{}:", keys::DATA.len()).as_bytes());
        buf.extend_from_slice(keys::DATA);
        buf.extend_from_slice(&reinsert(&self.dict, &self.unknown));
    }
}

fn counter(value: Option<&Value>) -> std::result::Result<u64, LoadError> {
    match value {
        None => Ok(0),
        Some(Value::Integer(i)) => {
            u64::try_from(*i).map_err(|_| LoadError::Malformed("seqno must not be negative"))
        }
        Some(_) => Err(LoadError::Malformed("seqno must be an integer")),
    }
}

fn as_int(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}
