//! Preservation of dict keys the current schema does not understand.
//!
//! A config written by a newer client may carry top-level keys this version
//! has never heard of. They are split off on load, carried untouched, and
//! re-interleaved into their sorted position on dump so that a round trip
//! through an older client is byte-for-byte lossless.

use crate::error::ParseError;
use crate::value::{encode_entry, Decoder, Dict, Value};

/// A run of consecutive unknown entries and the known keys bounding it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownRun {
    /// The known key immediately before this run, if any.
    pub previous: Option<Vec<u8>>,
    /// The known key immediately after this run, if any.
    pub until: Option<Vec<u8>>,
    /// The unknown entries, in key order.
    pub entries: Dict,
}

/// All unknown top-level entries of a dict, grouped into runs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnknownFields {
    runs: Vec<UnknownRun>,
}

impl UnknownFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Number of unknown entries across all runs.
    pub fn len(&self) -> usize {
        self.runs.iter().map(|r| r.entries.len()).sum()
    }

    pub fn runs(&self) -> &[UnknownRun] {
        &self.runs
    }

    /// Iterate unknown entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &Value)> {
        self.runs.iter().flat_map(|r| r.entries.iter())
    }

    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.runs.iter().find_map(|r| r.entries.get(key))
    }

    /// Split a dict into its known entries and the unknown remainder.
    pub fn split(dict: Dict, known_keys: &[&[u8]]) -> (Dict, UnknownFields) {
        let mut splitter = Splitter::new(known_keys);
        for (key, value) in dict {
            splitter.push(key, value);
        }
        splitter.finish()
    }

    /// Combine known entries with these unknown entries into one dict.
    ///
    /// Known entries win if a key somehow appears on both sides.
    pub fn merged_with(&self, known: &Dict) -> Dict {
        let mut out = known.clone();
        for (key, value) in self.iter() {
            out.entry(key.clone()).or_insert_with(|| value.clone());
        }
        out
    }
}

/// Incremental builder used by both the in-memory and streaming splits.
struct Splitter<'k> {
    known_keys: &'k [&'k [u8]],
    known: Dict,
    runs: Vec<UnknownRun>,
    open: Option<UnknownRun>,
    last_known: Option<Vec<u8>>,
}

impl<'k> Splitter<'k> {
    fn new(known_keys: &'k [&'k [u8]]) -> Self {
        Self {
            known_keys,
            known: Dict::new(),
            runs: Vec::new(),
            open: None,
            last_known: None,
        }
    }

    fn push(&mut self, key: Vec<u8>, value: Value) {
        if self.known_keys.contains(&key.as_slice()) {
            if let Some(mut run) = self.open.take() {
                run.until = Some(key.clone());
                self.runs.push(run);
            }
            self.last_known = Some(key.clone());
            self.known.insert(key, value);
        } else {
            self.open
                .get_or_insert_with(|| UnknownRun {
                    previous: self.last_known.clone(),
                    until: None,
                    entries: Dict::new(),
                })
                .entries
                .insert(key, value);
        }
    }

    fn finish(mut self) -> (Dict, UnknownFields) {
        if let Some(run) = self.open.take() {
            self.runs.push(run);
        }
        (self.known, UnknownFields { runs: self.runs })
    }
}

/// Stream an encoded dict once, splitting known from unknown keys.
pub fn extract(dict_bytes: &[u8], known_keys: &[&[u8]]) -> Result<(Dict, UnknownFields), ParseError> {
    let mut decoder = Decoder::new(dict_bytes);
    decoder.begin_dict()?;
    let mut splitter = Splitter::new(known_keys);
    let mut last: Option<&[u8]> = None;
    while let Some(key) = decoder.next_key(last)? {
        let value = decoder.value()?;
        splitter.push(key.to_vec(), value);
        last = Some(key);
    }
    decoder.finish()?;
    Ok(splitter.finish())
}

/// Re-interleave known and unknown entries into one canonical encoded dict.
pub fn reinsert(known: &Dict, unknown: &UnknownFields) -> Vec<u8> {
    let mut buf = vec![b'd'];
    let mut known_iter = known.iter().peekable();
    let mut unknown_iter = unknown.iter().peekable();
    loop {
        let take_known = match (known_iter.peek(), unknown_iter.peek()) {
            (None, None) => break,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (Some((kk, _)), Some((uk, _))) => {
                if kk == uk {
                    // Known entry shadows the stale unknown copy.
                    unknown_iter.next();
                    continue;
                }
                kk < uk
            }
        };
        let next = if take_known {
            known_iter.next()
        } else {
            unknown_iter.next()
        };
        if let Some((key, value)) = next {
            encode_entry(&mut buf, key, value);
        }
    }
    buf.push(b'e');
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{decode_dict, encode_dict};
    use proptest::prelude::*;

    const KNOWN: &[&[u8]] = &[b"n", b"p", b"q"];

    #[test]
    fn test_extract_records_bounds() {
        let bytes = b"d1:Ai1e1:n5:Alice1:oi2e1:pi3e1:zi4ee";
        let (known, unknown) = extract(bytes, KNOWN).unwrap();

        assert_eq!(known.len(), 2);
        assert_eq!(unknown.len(), 3);
        let runs = unknown.runs();
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].previous, None);
        assert_eq!(runs[0].until, Some(b"n".to_vec()));
        assert_eq!(runs[1].previous, Some(b"n".to_vec()));
        assert_eq!(runs[1].until, Some(b"p".to_vec()));
        assert_eq!(runs[2].previous, Some(b"p".to_vec()));
        assert_eq!(runs[2].until, None);
        assert_eq!(unknown.get(b"o"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_reinsert_restores_original_bytes() {
        let bytes = b"d1:Ai1e1:n5:Alice1:oi2e1:pi3e1:zi4ee";
        let (known, unknown) = extract(bytes, KNOWN).unwrap();
        assert_eq!(reinsert(&known, &unknown), bytes.to_vec());
    }

    #[test]
    fn test_reinsert_after_known_edit() {
        let bytes = b"d1:n5:Alice1:oi2ee";
        let (mut known, unknown) = extract(bytes, KNOWN).unwrap();
        known.insert(b"q".to_vec(), Value::from("key"));
        known.remove(b"n".as_slice());
        assert_eq!(reinsert(&known, &unknown), b"d1:oi2e1:q3:keye".to_vec());
    }

    #[test]
    fn test_extract_rejects_malformed() {
        assert!(extract(b"d1:bi1e1:ai1ee", KNOWN).is_err());
        assert!(extract(b"li1ee", KNOWN).is_err());
        assert!(extract(b"d1:ai1eeX", KNOWN).is_err());
    }

    #[test]
    fn test_split_matches_extract() {
        let bytes = b"d1:Ai1e1:n5:Alice1:zi4ee";
        let dict = decode_dict(bytes).unwrap();
        assert_eq!(UnknownFields::split(dict, KNOWN), extract(bytes, KNOWN).unwrap());
    }

    #[test]
    fn test_merged_with() {
        let (known, unknown) = extract(b"d1:Ai1e1:n5:Alicee", KNOWN).unwrap();
        let merged = unknown.merged_with(&known);
        assert_eq!(encode_dict(&merged), b"d1:Ai1e1:n5:Alicee".to_vec());
    }

    proptest! {
        #[test]
        fn reinsert_inverts_extract(
            dict in prop::collection::btree_map(
                prop::sample::select(vec![
                    b"a".to_vec(), b"n".to_vec(), b"o".to_vec(), b"p".to_vec(),
                    b"pp".to_vec(), b"q".to_vec(), b"z".to_vec(),
                ]),
                any::<i64>().prop_map(Value::Integer),
                0..7,
            )
        ) {
            let bytes = encode_dict(&dict);
            let (known, unknown) = extract(&bytes, KNOWN).unwrap();
            prop_assert_eq!(reinsert(&known, &unknown), bytes);
        }
    }
}
