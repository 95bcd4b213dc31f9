//! Stamped trees: config content paired with a per-leaf write stamp.
//!
//! The stamp tree mirrors the content dict down to the schema's leaves.
//! It also keeps stamps for leaves that were erased (tombstones), which is
//! how an erase on one device wins over an older value on another.
//!
//! Erasing a whole container entry records a single stamp under the
//! reserved [`ERASED`] key of its branch rather than one tombstone per
//! leaf. Anything below it with an older stamp is dead. Tombstones of
//! either kind are dropped once older than the object's tombstone TTL.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use swarm_config_core::{display_path, Dict, Policy, SchemaError, Stamp, StampEntry, Value};

/// One node of a stamp tree.
#[derive(Clone, PartialEq, Eq)]
pub enum StampNode {
    Leaf(Stamp),
    Branch(StampMap),
}

/// Children of a stamp branch, keyed like the content dict.
pub type StampMap = BTreeMap<Vec<u8>, StampNode>;

/// Branch key holding the stamp of an erase that covered the whole container.
///
/// Never a content key.
pub const ERASED: &[u8] = b"";

static EMPTY: Dict = Dict::new();

impl StampNode {
    pub fn as_leaf(&self) -> Option<&Stamp> {
        match self {
            StampNode::Leaf(s) => Some(s),
            StampNode::Branch(_) => None,
        }
    }

    pub fn as_branch(&self) -> Option<&StampMap> {
        match self {
            StampNode::Branch(m) => Some(m),
            StampNode::Leaf(_) => None,
        }
    }
}

impl fmt::Debug for StampNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StampNode::Leaf(s) => s.fmt(f),
            StampNode::Branch(m) => f
                .debug_map()
                .entries(m.iter().map(|(k, v)| (String::from_utf8_lossy(k), v)))
                .finish(),
        }
    }
}

/// Content and stamps of one config, unknown keys included.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub data: Dict,
    pub stamps: StampMap,
}

/// Where stamps come from when reading an encoded tree.
pub(crate) enum StampSource<'a> {
    /// A merge input. Missing or `[]` stamps mean the message's own stamp.
    Message(&'a Stamp),
    /// A local dump. Every leaf must carry an explicit stamp.
    Dump,
}

// ─────────────────────────────────────────────────────────────────────────────
// Reading
// ─────────────────────────────────────────────────────────────────────────────

/// Check encoded content and stamps against `policy` and build a snapshot.
///
/// Empty container dicts are dropped so equal content compares equal.
pub(crate) fn resolve(
    policy: Policy,
    data: &Dict,
    stamps: &Dict,
    source: &StampSource<'_>,
) -> Result<Snapshot, SchemaError> {
    let mut path = Vec::new();
    resolve_level(policy, data, stamps, source, &mut path)
}

fn resolve_level(
    policy: Policy,
    data: &Dict,
    stamps: &Dict,
    source: &StampSource<'_>,
    path: &mut Vec<Vec<u8>>,
) -> Result<Snapshot, SchemaError> {
    let empty = Dict::new();
    let mut out = Snapshot::default();
    let keys: BTreeSet<&Vec<u8>> = data.keys().chain(stamps.keys()).collect();

    for key in keys {
        path.push(key.clone());
        if key.as_slice() == ERASED {
            if data.contains_key(key) {
                return Err(SchemaError::ReservedKey {
                    path: display_path(path),
                });
            }
            let stamp = resolve_stamp(stamps.get(key), source, path)?;
            out.stamps.insert(key.clone(), StampNode::Leaf(stamp));
            path.pop();
            continue;
        }
        match policy.child(key).unwrap_or(Policy::Lww) {
            Policy::Lww => {
                let stamp = resolve_stamp(stamps.get(key), source, path)?;
                if let Some(value) = data.get(key) {
                    out.data.insert(key.clone(), value.clone());
                }
                out.stamps.insert(key.clone(), StampNode::Leaf(stamp));
            }
            child => {
                let sub_data = match data.get(key) {
                    None => &empty,
                    Some(Value::Dict(d)) => d,
                    Some(_) => {
                        return Err(SchemaError::ExpectedDict {
                            path: display_path(path),
                        })
                    }
                };
                let sub_stamps = match stamps.get(key) {
                    None => &empty,
                    Some(Value::Dict(d)) => d,
                    Some(_) => {
                        return Err(SchemaError::MalformedStamp {
                            path: display_path(path),
                        })
                    }
                };
                let sub = resolve_level(child, sub_data, sub_stamps, source, path)?;
                if !sub.data.is_empty() {
                    out.data.insert(key.clone(), Value::Dict(sub.data));
                }
                if !sub.stamps.is_empty() {
                    out.stamps.insert(key.clone(), StampNode::Branch(sub.stamps));
                }
            }
        }
        path.pop();
    }
    drop_erased(&mut out);
    Ok(out)
}

fn resolve_stamp(
    entry: Option<&Value>,
    source: &StampSource<'_>,
    path: &[Vec<u8>],
) -> Result<Stamp, SchemaError> {
    let parsed = entry.map(Stamp::parse);
    match (parsed, source) {
        (None, StampSource::Message(envelope)) => Ok((*envelope).clone()),
        (Some(Some(StampEntry::Envelope)), StampSource::Message(envelope)) => {
            Ok((*envelope).clone())
        }
        // A peer's unconfirmed write cannot appear in a message.
        (Some(Some(StampEntry::Explicit(s))), StampSource::Message(_)) if !s.is_pending() => Ok(s),
        (Some(Some(StampEntry::Explicit(s))), StampSource::Dump) => Ok(s),
        (None, StampSource::Dump) => Err(SchemaError::MissingStamp {
            path: display_path(path),
        }),
        _ => Err(SchemaError::MalformedStamp {
            path: display_path(path),
        }),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Writing
// ─────────────────────────────────────────────────────────────────────────────

/// Encode a stamp tree.
///
/// With `wire` set, pending stamps become `[]` so receivers substitute the
/// stamp of the message that carries them.
pub(crate) fn encode_stamps(stamps: &StampMap, wire: bool) -> Dict {
    stamps
        .iter()
        .map(|(key, node)| {
            let value = match node {
                StampNode::Leaf(s) if wire && s.is_pending() => Stamp::envelope_marker(),
                StampNode::Leaf(s) => s.to_value(),
                StampNode::Branch(children) => Value::Dict(encode_stamps(children, wire)),
            };
            (key.clone(), value)
        })
        .collect()
}

/// Validate a value against `policy`, dropping empty containers.
///
/// Returns `None` if nothing remains.
pub(crate) fn normalize(
    policy: Policy,
    value: Value,
    path: &mut Vec<Vec<u8>>,
) -> Result<Option<Value>, SchemaError> {
    if !policy.is_container() {
        return Ok(Some(value));
    }
    let dict = value.into_dict().ok_or_else(|| SchemaError::ExpectedDict {
        path: display_path(path),
    })?;
    let mut out = Dict::new();
    for (key, child_value) in dict {
        let child = policy.child(&key).unwrap_or(Policy::Lww);
        path.push(key);
        if path.last().is_some_and(|k| k.as_slice() == ERASED) {
            return Err(SchemaError::ReservedKey {
                path: display_path(path),
            });
        }
        let normalized = normalize(child, child_value, path)?;
        let key = path.pop().unwrap_or_default();
        if let Some(v) = normalized {
            out.insert(key, v);
        }
    }
    Ok(if out.is_empty() {
        None
    } else {
        Some(Value::Dict(out))
    })
}

/// Stamp every leaf under `key` whose value differs between `old` and `new`.
pub(crate) fn stamp_changes(
    policy: Policy,
    key: &[u8],
    old: Option<&Value>,
    new: Option<&Value>,
    stamps: &mut StampMap,
    stamp: &Stamp,
) {
    if !policy.is_container() {
        if old != new {
            stamps.insert(key.to_vec(), StampNode::Leaf(stamp.clone()));
        }
        return;
    }

    if new.is_none() {
        if old.is_some() {
            let mut erased = StampMap::new();
            erased.insert(ERASED.to_vec(), StampNode::Leaf(stamp.clone()));
            stamps.insert(key.to_vec(), StampNode::Branch(erased));
        }
        return;
    }

    let old_dict = old.and_then(Value::as_dict);
    let new_dict = new.and_then(Value::as_dict);
    let keys: BTreeSet<&Vec<u8>> = old_dict
        .into_iter()
        .flat_map(|d| d.keys())
        .chain(new_dict.into_iter().flat_map(|d| d.keys()))
        .collect();
    if keys.is_empty() {
        return;
    }

    let node = stamps
        .entry(key.to_vec())
        .or_insert_with(|| StampNode::Branch(StampMap::new()));
    if let StampNode::Leaf(_) = node {
        *node = StampNode::Branch(StampMap::new());
    }
    if let StampNode::Branch(children) = node {
        for child_key in keys {
            let child = policy.child(child_key).unwrap_or(Policy::Lww);
            stamp_changes(
                child,
                child_key,
                old_dict.and_then(|d| d.get(child_key)),
                new_dict.and_then(|d| d.get(child_key)),
                children,
                stamp,
            );
        }
    }
}

/// Descend to the stamp branch at `path`, creating branches as needed.
///
/// Returns `None` if the path runs into a leaf stamp.
pub(crate) fn branch_mut<'a>(mut map: &'a mut StampMap, path: &[Vec<u8>]) -> Option<&'a mut StampMap> {
    for key in path {
        let node = map
            .entry(key.clone())
            .or_insert_with(|| StampNode::Branch(StampMap::new()));
        map = match node {
            StampNode::Branch(children) => children,
            StampNode::Leaf(_) => return None,
        };
    }
    Some(map)
}

/// Replace every pending stamp with `confirmed`.
pub(crate) fn confirm_pending(stamps: &mut StampMap, confirmed: &Stamp) -> usize {
    let mut count = 0;
    for node in stamps.values_mut() {
        match node {
            StampNode::Leaf(s) if s.is_pending() => {
                *s = confirmed.clone();
                count += 1;
            }
            StampNode::Leaf(_) => {}
            StampNode::Branch(children) => count += confirm_pending(children, confirmed),
        }
    }
    count
}

/// Whether any stamp in the tree is still pending.
pub(crate) fn has_pending(stamps: &StampMap) -> bool {
    stamps.values().any(|node| match node {
        StampNode::Leaf(s) => s.is_pending(),
        StampNode::Branch(children) => has_pending(children),
    })
}

/// Collect the message hashes referenced by confirmed stamps.
pub(crate) fn collect_hashes(stamps: &StampMap, out: &mut BTreeSet<String>) {
    for node in stamps.values() {
        match node {
            StampNode::Leaf(s) if !s.is_pending() => {
                out.insert(String::from_utf8_lossy(&s.hash).into_owned());
            }
            StampNode::Leaf(_) => {}
            StampNode::Branch(children) => collect_hashes(children, out),
        }
    }
}

/// Drop confirmed tombstones stamped before `cutoff_ms`.
///
/// A tombstone is a leaf stamp with no value behind it, or an [`ERASED`]
/// stamp. Branches left empty are removed. Returns how many were dropped.
pub(crate) fn expire_tombstones(data: &Dict, stamps: &mut StampMap, cutoff_ms: u64) -> usize {
    let mut expired = 0;
    stamps.retain(|key, node| match node {
        StampNode::Leaf(s) => {
            let dead = !s.is_pending() && s.timestamp_ms < cutoff_ms && !data.contains_key(key);
            expired += usize::from(dead);
            !dead
        }
        StampNode::Branch(children) => {
            let sub = data.get(key).and_then(Value::as_dict).unwrap_or(&EMPTY);
            expired += expire_tombstones(sub, children, cutoff_ms);
            !children.is_empty()
        }
    });
    expired
}

/// Remove everything in `level` stamped before its [`ERASED`] stamp.
fn drop_erased(level: &mut Snapshot) {
    let Some(erased) = level.stamps.get(ERASED).and_then(StampNode::as_leaf).cloned() else {
        return;
    };
    drop_older(&mut level.data, &mut level.stamps, &erased);
}

fn drop_older(data: &mut Dict, stamps: &mut StampMap, floor: &Stamp) {
    stamps.retain(|key, node| match node {
        StampNode::Leaf(s) => {
            if *s < *floor {
                data.remove(key);
                false
            } else {
                true
            }
        }
        StampNode::Branch(children) => {
            let now_empty = match data.get_mut(key).and_then(Value::as_dict_mut) {
                Some(sub) => {
                    drop_older(sub, children, floor);
                    sub.is_empty()
                }
                None => {
                    drop_older(&mut Dict::new(), children, floor);
                    false
                }
            };
            if now_empty {
                data.remove(key);
            }
            !children.is_empty()
        }
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Dict paths
// ─────────────────────────────────────────────────────────────────────────────

/// Look up the value at `path`.
pub(crate) fn get_path<'a>(dict: &'a Dict, path: &[Vec<u8>]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = dict.get(first)?;
    for key in rest {
        current = current.as_dict()?.get(key)?;
    }
    Some(current)
}

/// Fail if an existing value along `path` cannot be descended into.
pub(crate) fn check_traversable(dict: &Dict, path: &[Vec<u8>]) -> Result<(), SchemaError> {
    let mut current = dict;
    for (i, key) in path.iter().enumerate() {
        match current.get(key) {
            None => return Ok(()),
            Some(Value::Dict(d)) => current = d,
            Some(_) => {
                return Err(SchemaError::NotTraversable {
                    path: display_path(&path[..=i]),
                })
            }
        }
    }
    Ok(())
}

/// Set or remove the value at `path`.
///
/// Missing intermediate dicts are created on set; intermediate dicts left
/// empty by a removal are pruned. Callers check traversability first.
pub(crate) fn set_path(dict: &mut Dict, path: &[Vec<u8>], value: Option<Value>) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    if rest.is_empty() {
        match value {
            Some(v) => {
                dict.insert(first.clone(), v);
            }
            None => {
                dict.remove(first);
            }
        }
        return;
    }
    match value {
        Some(_) => {
            let entry = dict.entry(first.clone()).or_insert_with(Value::dict);
            if let Some(sub) = entry.as_dict_mut() {
                set_path(sub, rest, value);
            }
        }
        None => {
            let now_empty = match dict.get_mut(first).and_then(Value::as_dict_mut) {
                Some(sub) => {
                    set_path(sub, rest, None);
                    sub.is_empty()
                }
                None => false,
            };
            if now_empty {
                dict.remove(first);
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Merging
// ─────────────────────────────────────────────────────────────────────────────

/// Join two snapshots under `policy`.
///
/// Each leaf takes the side with the greater `(stamp, value)`; a missing
/// value is a tombstone and competes like any other. The join is
/// commutative, associative and idempotent, so folding any number of
/// snapshots in any order or grouping yields the same result.
pub(crate) fn join(policy: Policy, a: &Snapshot, b: &Snapshot) -> Snapshot {
    let mut out = Snapshot::default();
    join_level(policy, &a.data, &a.stamps, &b.data, &b.stamps, &mut out);
    out
}

fn join_level(
    policy: Policy,
    a_data: &Dict,
    a_stamps: &StampMap,
    b_data: &Dict,
    b_stamps: &StampMap,
    out: &mut Snapshot,
) {
    let empty_data = Dict::new();
    let empty_stamps = StampMap::new();
    let keys: BTreeSet<&Vec<u8>> = a_data
        .keys()
        .chain(a_stamps.keys())
        .chain(b_data.keys())
        .chain(b_stamps.keys())
        .collect();

    for key in keys {
        if key.as_slice() == ERASED {
            let a = a_stamps.get(key).and_then(StampNode::as_leaf);
            let b = b_stamps.get(key).and_then(StampNode::as_leaf);
            if let Some(stamp) = a.max(b) {
                out.stamps.insert(key.clone(), StampNode::Leaf(stamp.clone()));
            }
            continue;
        }
        match policy.child(key).unwrap_or(Policy::Lww) {
            Policy::Lww => {
                let winner = match (leaf(a_data, a_stamps, key), leaf(b_data, b_stamps, key)) {
                    (Some(a), Some(b)) => {
                        if b > a {
                            b
                        } else {
                            a
                        }
                    }
                    (Some(x), None) | (None, Some(x)) => x,
                    (None, None) => continue,
                };
                let (stamp, value) = winner;
                if let Some(v) = value {
                    out.data.insert(key.clone(), v.clone());
                }
                out.stamps.insert(key.clone(), StampNode::Leaf(stamp.clone()));
            }
            child => {
                let mut sub = Snapshot::default();
                join_level(
                    child,
                    a_data.get(key).and_then(Value::as_dict).unwrap_or(&empty_data),
                    a_stamps.get(key).and_then(StampNode::as_branch).unwrap_or(&empty_stamps),
                    b_data.get(key).and_then(Value::as_dict).unwrap_or(&empty_data),
                    b_stamps.get(key).and_then(StampNode::as_branch).unwrap_or(&empty_stamps),
                    &mut sub,
                );
                if !sub.data.is_empty() {
                    out.data.insert(key.clone(), Value::Dict(sub.data));
                }
                if !sub.stamps.is_empty() {
                    out.stamps.insert(key.clone(), StampNode::Branch(sub.stamps));
                }
            }
        }
    }
    drop_erased(out);
}

fn leaf<'a>(
    data: &'a Dict,
    stamps: &'a StampMap,
    key: &[u8],
) -> Option<(&'a Stamp, Option<&'a Value>)> {
    let stamp = stamps.get(key)?.as_leaf()?;
    Some((stamp, data.get(key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_config_core::schema::{CONTACTS, USER_PROFILE};

    fn d(entries: Vec<(&str, Value)>) -> Dict {
        entries
            .into_iter()
            .map(|(k, v)| (k.as_bytes().to_vec(), v))
            .collect()
    }

    fn snapshot(name: &str, ts: u64, hash: &str) -> Snapshot {
        let envelope = Stamp::new(ts, hash);
        resolve(
            USER_PROFILE.root(),
            &d(vec![("n", Value::from(name))]),
            &Dict::new(),
            &StampSource::Message(&envelope),
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_uses_envelope_for_unstamped() {
        let s = snapshot("Alice", 100, "h1");
        assert_eq!(
            s.stamps.get(b"n".as_slice()),
            Some(&StampNode::Leaf(Stamp::new(100, "h1")))
        );
    }

    #[test]
    fn test_resolve_rejects_pending_in_message() {
        let envelope = Stamp::new(1, "h");
        let stamps = d(vec![("n", Stamp::pending(5).to_value())]);
        let err = resolve(
            USER_PROFILE.root(),
            &d(vec![("n", Value::from("x"))]),
            &stamps,
            &StampSource::Message(&envelope),
        );
        assert!(matches!(err, Err(SchemaError::MalformedStamp { .. })));
    }

    #[test]
    fn test_resolve_dump_requires_stamps() {
        let err = resolve(
            USER_PROFILE.root(),
            &d(vec![("n", Value::from("x"))]),
            &Dict::new(),
            &StampSource::Dump,
        );
        assert!(matches!(err, Err(SchemaError::MissingStamp { .. })));
    }

    #[test]
    fn test_resolve_rejects_scalar_container() {
        let envelope = Stamp::new(1, "h");
        let err = resolve(
            CONTACTS.root(),
            &d(vec![("c", Value::Integer(1))]),
            &Dict::new(),
            &StampSource::Message(&envelope),
        );
        assert!(matches!(err, Err(SchemaError::ExpectedDict { .. })));
    }

    #[test]
    fn test_join_higher_timestamp_wins() {
        let a = snapshot("Alice", 100, "h1");
        let b = snapshot("Bob", 200, "h0");
        let ab = join(USER_PROFILE.root(), &a, &b);
        let ba = join(USER_PROFILE.root(), &b, &a);
        assert_eq!(ab, ba);
        assert_eq!(ab, b);
    }

    #[test]
    fn test_join_tie_breaks_on_hash() {
        let a = snapshot("Alice", 100, "aaa");
        let b = snapshot("Bob", 100, "bbb");
        assert_eq!(join(USER_PROFILE.root(), &a, &b), b);
    }

    #[test]
    fn test_join_tombstone_beats_older_value() {
        let a = snapshot("Alice", 100, "h1");
        let mut erased = Snapshot::default();
        erased
            .stamps
            .insert(b"n".to_vec(), StampNode::Leaf(Stamp::new(150, "h2")));
        let joined = join(USER_PROFILE.root(), &a, &erased);
        assert!(joined.data.is_empty());
        assert_eq!(joined, erased);
    }

    #[test]
    fn test_join_merges_map_entries() {
        let envelope_a = Stamp::new(100, "a");
        let envelope_b = Stamp::new(200, "b");
        let contact = |name: &str| {
            Value::Dict(d(vec![(
                "0501",
                Value::Dict(d(vec![("n", Value::from(name))])),
            )]))
        };
        let a = resolve(
            CONTACTS.root(),
            &d(vec![("c", contact("Ann"))]),
            &Dict::new(),
            &StampSource::Message(&envelope_a),
        )
        .unwrap();
        let other = Value::Dict(d(vec![(
            "0502",
            Value::Dict(d(vec![("b", Value::Integer(1))])),
        )]));
        let b = resolve(
            CONTACTS.root(),
            &d(vec![("c", other)]),
            &Dict::new(),
            &StampSource::Message(&envelope_b),
        )
        .unwrap();

        let joined = join(CONTACTS.root(), &a, &b);
        let contacts = joined.data.get(b"c".as_slice()).and_then(Value::as_dict).unwrap();
        assert_eq!(contacts.len(), 2);
    }

    #[test]
    fn test_stamp_changes_only_touches_diffs() {
        let old = Value::Dict(d(vec![("a", Value::Integer(1)), ("b", Value::Integer(2))]));
        let new = Value::Dict(d(vec![("a", Value::Integer(1)), ("c", Value::Integer(3))]));
        let mut stamps = StampMap::new();
        let entry: Policy = CONTACTS.root().child(b"c").unwrap();
        let record = entry.child(b"05").unwrap();
        stamp_changes(record, b"05", Some(&old), Some(&new), &mut stamps, &Stamp::pending(9));

        let branch = stamps.get(b"05".as_slice()).and_then(StampNode::as_branch).unwrap();
        assert!(branch.get(b"a".as_slice()).is_none());
        assert!(branch.get(b"b".as_slice()).is_some());
        assert!(branch.get(b"c".as_slice()).is_some());
    }

    #[test]
    fn test_stamp_changes_collapses_erased_entry() {
        let old = Value::Dict(d(vec![("a", Value::Integer(1)), ("n", Value::from("x"))]));
        let mut stamps = StampMap::new();
        let record = CONTACTS.root().child(b"c").unwrap().child(b"05").unwrap();
        stamp_changes(record, b"05", Some(&old), None, &mut stamps, &Stamp::pending(9));

        let branch = stamps.get(b"05".as_slice()).and_then(StampNode::as_branch).unwrap();
        assert_eq!(branch.len(), 1);
        assert_eq!(
            branch.get(ERASED).and_then(StampNode::as_leaf),
            Some(&Stamp::pending(9))
        );
    }

    /// Contacts snapshot from one message: `sets` are `(id, field, value)`,
    /// `erases` are entry ids erased by the same message.
    fn contacts_message(ts: u64, hash: &str, sets: &[(&str, &str, i64)], erases: &[&str]) -> Snapshot {
        let mut data = Dict::new();
        let mut stamps = Dict::new();
        for (id, field, value) in sets {
            let entry = data
                .entry(id.as_bytes().to_vec())
                .or_insert_with(Value::dict);
            if let Some(entry) = entry.as_dict_mut() {
                entry.insert(field.as_bytes().to_vec(), Value::Integer(*value));
            }
        }
        for id in erases {
            stamps.insert(
                id.as_bytes().to_vec(),
                Value::Dict(d(vec![("", Stamp::envelope_marker())])),
            );
        }
        let envelope = Stamp::new(ts, hash);
        resolve(
            CONTACTS.root(),
            &d(vec![("c", Value::Dict(data))]),
            &d(vec![("c", Value::Dict(stamps))]),
            &StampSource::Message(&envelope),
        )
        .unwrap()
    }

    #[test]
    fn test_join_erase_drops_only_older_fields() {
        let older = contacts_message(100, "a", &[("05aa", "a", 1)], &[]);
        let erase = contacts_message(200, "b", &[], &["05aa"]);
        let newer = contacts_message(300, "c", &[("05aa", "b", 1)], &[]);

        let joined = join(CONTACTS.root(), &join(CONTACTS.root(), &older, &erase), &newer);
        let entry = joined
            .data
            .get(b"c".as_slice())
            .and_then(Value::as_dict)
            .and_then(|c| c.get(b"05aa".as_slice()))
            .and_then(Value::as_dict)
            .unwrap();
        assert_eq!(entry.keys().collect::<Vec<_>>(), vec![&b"b".to_vec()]);

        let other_order = join(CONTACTS.root(), &newer, &join(CONTACTS.root(), &erase, &older));
        assert_eq!(joined, other_order);

        // With nothing newer, only the erase stamp is left.
        let gone = join(CONTACTS.root(), &older, &erase);
        assert!(gone.data.is_empty());
        assert_eq!(gone, erase);
    }

    #[test]
    fn test_resolve_drops_fields_older_than_erase() {
        let envelope = Stamp::new(200, "h");
        let data = d(vec![(
            "c",
            Value::Dict(d(vec![("05aa", Value::Dict(d(vec![("a", Value::Integer(1))])))])),
        )]);
        let entry_stamps = d(vec![
            ("", Stamp::envelope_marker()),
            ("a", Stamp::new(100, "old").to_value()),
        ]);
        let stamps = d(vec![(
            "c",
            Value::Dict(d(vec![("05aa", Value::Dict(entry_stamps))])),
        )]);
        let s = resolve(CONTACTS.root(), &data, &stamps, &StampSource::Message(&envelope)).unwrap();
        assert!(s.data.is_empty());
        assert_eq!(s, contacts_message(200, "h", &[], &["05aa"]));
    }

    #[test]
    fn test_reserved_key_rejected_in_content() {
        let envelope = Stamp::new(1, "h");
        let data = d(vec![(
            "c",
            Value::Dict(d(vec![("05aa", Value::Dict(d(vec![("", Value::Integer(1))])))])),
        )]);
        let err = resolve(CONTACTS.root(), &data, &Dict::new(), &StampSource::Message(&envelope));
        assert!(matches!(err, Err(SchemaError::ReservedKey { .. })));

        let record = CONTACTS.root().child(b"c").unwrap().child(b"05").unwrap();
        let err = normalize(record, Value::Dict(d(vec![("", Value::Integer(1))])), &mut Vec::new());
        assert!(matches!(err, Err(SchemaError::ReservedKey { .. })));
    }

    #[test]
    fn test_expire_tombstones() {
        let data = d(vec![("n", Value::from("x"))]);
        let mut stamps = StampMap::new();
        stamps.insert(b"n".to_vec(), StampNode::Leaf(Stamp::new(10, "live")));
        stamps.insert(b"p".to_vec(), StampNode::Leaf(Stamp::new(10, "old")));
        stamps.insert(b"q".to_vec(), StampNode::Leaf(Stamp::new(500, "recent")));
        stamps.insert(b"e".to_vec(), StampNode::Leaf(Stamp::pending(10)));
        let mut erased = StampMap::new();
        erased.insert(ERASED.to_vec(), StampNode::Leaf(Stamp::new(10, "gone")));
        let mut entries = StampMap::new();
        entries.insert(b"05aa".to_vec(), StampNode::Branch(erased));
        stamps.insert(b"c".to_vec(), StampNode::Branch(entries));

        assert_eq!(expire_tombstones(&data, &mut stamps, 100), 2);
        let keys: Vec<&[u8]> = stamps.keys().map(Vec::as_slice).collect();
        assert_eq!(keys, vec![b"e".as_slice(), b"n".as_slice(), b"q".as_slice()]);
    }

    #[test]
    fn test_set_path_prunes_empty_dicts() {
        let mut dict = Dict::new();
        let path = vec![b"c".to_vec(), b"05".to_vec(), b"n".to_vec()];
        set_path(&mut dict, &path, Some(Value::from("x")));
        assert_eq!(get_path(&dict, &path), Some(&Value::from("x")));
        set_path(&mut dict, &path, None);
        assert!(dict.is_empty());
    }

    #[test]
    fn test_check_traversable() {
        let dict = d(vec![("n", Value::from("x"))]);
        assert!(check_traversable(&dict, &[b"n".to_vec()]).is_err());
        assert!(check_traversable(&dict, &[b"m".to_vec(), b"k".to_vec()]).is_ok());
    }

    #[test]
    fn test_encode_stamps_wire_marks_pending() {
        let mut stamps = StampMap::new();
        stamps.insert(b"n".to_vec(), StampNode::Leaf(Stamp::pending(5)));
        stamps.insert(b"p".to_vec(), StampNode::Leaf(Stamp::new(5, "h")));
        let wire = encode_stamps(&stamps, true);
        assert_eq!(wire.get(b"n".as_slice()), Some(&Stamp::envelope_marker()));
        let local = encode_stamps(&stamps, false);
        assert_eq!(local.get(b"n".as_slice()), Some(&Stamp::pending(5).to_value()));
    }

    #[test]
    fn test_confirm_pending() {
        let mut stamps = StampMap::new();
        stamps.insert(b"n".to_vec(), StampNode::Leaf(Stamp::pending(5)));
        stamps.insert(b"p".to_vec(), StampNode::Leaf(Stamp::new(5, "h")));
        assert!(has_pending(&stamps));
        assert_eq!(confirm_pending(&mut stamps, &Stamp::new(7, "new")), 1);
        assert!(!has_pending(&stamps));

        let mut hashes = BTreeSet::new();
        collect_hashes(&stamps, &mut hashes);
        assert_eq!(hashes.into_iter().collect::<Vec<_>>(), vec!["h", "new"]);
    }
}
