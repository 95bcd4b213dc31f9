//! The config object: one namespace's state for one scope.

use std::collections::BTreeSet;
use std::sync::Arc;

use swarm_config_core::compress::DEFAULT_LEVEL;
use swarm_config_core::{
    display_path, Dict, Namespace, Schema, SessionId, Stamp, UnknownFields, Value,
};

use crate::clock::{Clock, SystemClock};
use crate::error::{ObjectError, Result};
use crate::proxy::{DictField, DictFieldProxy};
use crate::tree::{
    branch_mut, check_traversable, collect_hashes, expire_tombstones, get_path, normalize,
    set_path, stamp_changes, Snapshot, StampMap, ERASED,
};

/// Default ceiling for decompressed messages and dumps (8 MiB).
pub const DEFAULT_MAX_DECOMPRESSED_SIZE: usize = 8 * 1024 * 1024;

/// Default age after which tombstones are forgotten: 30 days, the swarm's
/// retention for config messages.
pub const DEFAULT_TOMBSTONE_TTL_MS: u64 = 30 * 24 * 60 * 60 * 1000;

/// Configuration for a config object.
#[derive(Debug, Clone)]
pub struct ObjectConfig {
    /// zstd level for pushes; `None` disables compression.
    pub compression_level: Option<i32>,
    /// Largest decompressed payload accepted from a message or dump.
    pub max_decompressed_size: usize,
    /// Confirmed tombstones older than this are dropped. An erase is only
    /// guaranteed to beat writes stamped within this window of it.
    pub tombstone_ttl_ms: u64,
}

impl Default for ObjectConfig {
    fn default() -> Self {
        Self {
            compression_level: Some(DEFAULT_LEVEL),
            max_decompressed_size: DEFAULT_MAX_DECOMPRESSED_SIZE,
            tombstone_ttl_ms: DEFAULT_TOMBSTONE_TTL_MS,
        }
    }
}

/// State of one namespace for one scope.
///
/// Tracks the content dict, unknown top-level keys carried for newer
/// clients, the write stamps the merge uses, and what still needs to be
/// dumped or pushed.
#[derive(Debug, Clone)]
pub struct ConfigObject {
    pub(crate) schema: &'static Schema,
    pub(crate) scope: Option<SessionId>,
    pub(crate) dict: Dict,
    pub(crate) unknown: UnknownFields,
    pub(crate) stamps: StampMap,
    pub(crate) seqno: u64,
    pub(crate) observed_seqno: u64,
    pub(crate) needs_dump: bool,
    pub(crate) needs_push: bool,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: ObjectConfig,
}

impl ConfigObject {
    /// An empty config for `namespace`, optionally scoped to a group.
    pub fn new(namespace: Namespace, scope: Option<SessionId>) -> Result<Self> {
        let schema = Schema::for_namespace(namespace).ok_or(ObjectError::NotAConfig(namespace))?;
        Ok(Self {
            schema,
            scope,
            dict: Dict::new(),
            unknown: UnknownFields::new(),
            stamps: StampMap::new(),
            seqno: 0,
            observed_seqno: 0,
            needs_dump: false,
            needs_push: false,
            clock: Arc::new(SystemClock),
            config: ObjectConfig::default(),
        })
    }

    /// Use `clock` to stamp local writes.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: ObjectConfig) -> Self {
        self.config = config;
        self
    }

    pub fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock = clock;
    }

    pub fn namespace(&self) -> Namespace {
        self.schema.namespace
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    pub fn scope(&self) -> Option<&SessionId> {
        self.scope.as_ref()
    }

    pub fn config(&self) -> &ObjectConfig {
        &self.config
    }

    /// Known content.
    pub fn dict(&self) -> &Dict {
        &self.dict
    }

    /// Top-level keys the schema does not model.
    pub fn unknown(&self) -> &UnknownFields {
        &self.unknown
    }

    pub fn seqno(&self) -> u64 {
        self.seqno
    }

    /// Highest seqno seen in an accepted message or confirmed push.
    pub fn observed_seqno(&self) -> u64 {
        self.observed_seqno
    }

    pub fn needs_dump(&self) -> bool {
        self.needs_dump
    }

    pub fn needs_push(&self) -> bool {
        self.needs_push
    }

    /// Whether the config holds no content at all.
    pub fn is_empty(&self) -> bool {
        self.dict.is_empty() && self.unknown.is_empty()
    }

    /// Write stamps of every leaf, tombstones included.
    pub fn stamps(&self) -> &StampMap {
        &self.stamps
    }

    /// Message hashes whose writes are still reflected in this config.
    pub fn current_hashes(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        collect_hashes(&self.stamps, &mut out);
        out
    }

    /// The seqno the next push will carry.
    ///
    /// Local edits already bumped `seqno` past anything observed; after a
    /// merge that needs re-pushing, the push goes one past the highest
    /// observed seqno.
    pub fn push_seqno(&self) -> u64 {
        if self.seqno > self.observed_seqno {
            self.seqno
        } else {
            self.observed_seqno + 1
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Field access
    // ─────────────────────────────────────────────────────────────────────

    /// Read-only view of a top-level field.
    pub fn view(&self, key: impl AsRef<[u8]>) -> DictField<'_> {
        DictField::new(self, vec![key.as_ref().to_vec()])
    }

    /// Read-only view of the whole config.
    pub fn root_view(&self) -> DictField<'_> {
        DictField::new(self, Vec::new())
    }

    /// Writable view of a top-level field.
    pub fn field(&mut self, key: impl AsRef<[u8]>) -> DictFieldProxy<'_> {
        DictFieldProxy::new(self, vec![key.as_ref().to_vec()])
    }

    /// Writable view of the whole config, for writing sibling pairs.
    pub fn root(&mut self) -> DictFieldProxy<'_> {
        DictFieldProxy::new(self, Vec::new())
    }

    /// Value at `path`, looking in unknown fields for unmodelled top-level keys.
    pub(crate) fn get_path(&self, path: &[Vec<u8>]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        if self.schema.is_known(first) {
            return get_path(&self.dict, path);
        }
        let mut current = self.unknown.get(first)?;
        for key in rest {
            current = current.as_dict()?.get(key)?;
        }
        Some(current)
    }

    /// Set (`Some`) or erase (`None`) the value at `path`.
    ///
    /// Returns whether anything changed. Changes stamp the affected leaves
    /// as pending local writes and mark the object dirty.
    pub(crate) fn write(&mut self, path: &[Vec<u8>], value: Option<Value>) -> Result<bool> {
        let first = path.first().ok_or(ObjectError::EmptyPath)?;
        if !self.schema.is_known(first) {
            return Err(ObjectError::UnknownField(display_path(&path[..1])));
        }
        if value.is_none() && get_path(&self.dict, path).is_none() {
            return Ok(false);
        }
        check_traversable(&self.dict, &path[..path.len() - 1])?;

        // Writes below an opaque leaf rewrite that whole leaf.
        let mut policy = self.schema.root();
        let mut root_len = path.len();
        for (i, key) in path.iter().enumerate() {
            match policy.child(key) {
                Some(child) => policy = child,
                None => {
                    root_len = i;
                    break;
                }
            }
        }
        let root_path = &path[..root_len];
        if root_path.iter().any(|k| k.as_slice() == ERASED) {
            return Err(swarm_config_core::SchemaError::ReservedKey {
                path: display_path(root_path),
            }
            .into());
        }

        let old = get_path(&self.dict, root_path).cloned();
        let new = if root_len == path.len() {
            match value {
                Some(v) => normalize(policy, v, &mut root_path.to_vec())?,
                None => None,
            }
        } else {
            edit_opaque(old.as_ref(), &path[root_len..], value)
        };
        if old == new {
            return Ok(false);
        }

        let stamp = Stamp::pending(self.clock.now_ms());
        let (key, parents) = match root_path.split_last() {
            Some(split) => split,
            None => return Err(ObjectError::EmptyPath),
        };
        let stamps = branch_mut(&mut self.stamps, parents).ok_or_else(|| {
            swarm_config_core::SchemaError::NotTraversable {
                path: display_path(parents),
            }
        })?;
        stamp_changes(policy, key, old.as_ref(), new.as_ref(), stamps, &stamp);
        set_path(&mut self.dict, root_path, new);
        self.expire_under(first);
        self.mark_dirty();

        tracing::trace!(
            namespace = %self.namespace(),
            path = %display_path(path),
            seqno = self.seqno,
            "local config write"
        );
        Ok(true)
    }

    /// Earliest timestamp a tombstone may carry and still be kept.
    pub(crate) fn tombstone_cutoff(&self) -> u64 {
        self.clock
            .now_ms()
            .saturating_sub(self.config.tombstone_ttl_ms)
    }

    /// Drop expired tombstones under the known top-level key `key`.
    fn expire_under(&mut self, key: &[u8]) -> usize {
        let cutoff = self.tombstone_cutoff();
        let Some(node) = self.stamps.remove(key) else {
            return 0;
        };
        let mut scoped = StampMap::new();
        scoped.insert(key.to_vec(), node);
        let expired = expire_tombstones(&self.dict, &mut scoped, cutoff);
        self.stamps.extend(scoped);
        expired
    }

    fn mark_dirty(&mut self) {
        self.seqno += 1;
        self.needs_dump = true;
        self.needs_push = true;
    }

    /// Content and stamps with unknown keys folded back in.
    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot {
            data: self.unknown.merged_with(&self.dict),
            stamps: self.stamps.clone(),
        }
    }

    /// Replace content and stamps, splitting unknown keys back out.
    pub(crate) fn install(&mut self, snapshot: Snapshot) {
        let known = self.schema.known_keys();
        let (dict, unknown) = UnknownFields::split(snapshot.data, &known);
        self.dict = dict;
        self.unknown = unknown;
        self.stamps = snapshot.stamps;
    }
}

/// Apply a set or erase at `subpath` inside an opaque value.
fn edit_opaque(old: Option<&Value>, subpath: &[Vec<u8>], value: Option<Value>) -> Option<Value> {
    let mut root = match old {
        Some(Value::Dict(d)) => d.clone(),
        Some(other) => return Some(other.clone()),
        None => Dict::new(),
    };
    set_path(&mut root, subpath, value);
    if root.is_empty() {
        None
    } else {
        Some(Value::Dict(root))
    }
}
