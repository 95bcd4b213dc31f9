//! The encoded value model and its canonical codec.
//!
//! Values are a bencode tree:
//! - `i<n>e` for signed 64-bit integers
//! - `<len>:<bytes>` for byte strings
//! - `l...e` for lists
//! - `d...e` for dicts, keys are byte strings in strictly increasing order
//!
//! Encoding is canonical: the same logical value always produces the same
//! bytes. Decoding is strict and rejects anything encoding would not have
//! produced (leading zeros, `-0`, unsorted or duplicate keys, trailing
//! bytes), so only canonical values ever reach a config.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::ParseError;

/// A dict of encoded values. `BTreeMap` keeps keys sorted and unique.
pub type Dict = BTreeMap<Vec<u8>, Value>;

/// Maximum nesting accepted by the decoder.
pub const MAX_DEPTH: usize = 64;

/// A node in the encoded value tree.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    Integer(i64),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Dict(Dict),
}

impl Value {
    /// An empty dict.
    pub fn dict() -> Self {
        Value::Dict(Dict::new())
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// The value as UTF-8 text, if it is a byte string holding valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut Dict> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn into_dict(self) -> Option<Dict> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn is_dict(&self) -> bool {
        matches!(self, Value::Dict(_))
    }

    /// Short name of the value's kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
        }
    }

    /// Canonical encoding of this value.
    pub fn encode(&self) -> Vec<u8> {
        encode(self)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Bytes(s.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Bytes(s.into_bytes())
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(b.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Value::List(l)
    }
}

impl From<Dict> for Value {
    fn from(d: Dict) -> Self {
        Value::Dict(d)
    }
}

struct DebugBytes<'a>(&'a [u8]);

impl fmt::Debug for DebugBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(self.0) {
            Ok(s) if s.chars().all(|c| !c.is_control()) => write!(f, "{:?}", s),
            _ => write!(f, "0x{}", hex::encode(self.0)),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Bytes(b) => DebugBytes(b).fmt(f),
            Value::List(l) => f.debug_list().entries(l).finish(),
            Value::Dict(d) => f
                .debug_map()
                .entries(d.iter().map(|(k, v)| (DebugBytes(k), v)))
                .finish(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Encoding
// ─────────────────────────────────────────────────────────────────────────────

/// Encode a value to canonical bytes.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_to(&mut buf, value);
    buf
}

/// Encode a dict to canonical bytes.
pub fn encode_dict(dict: &Dict) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_dict_to(&mut buf, dict);
    buf
}

/// Append the canonical encoding of `value` to `buf`.
pub fn encode_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::List(l) => {
            buf.push(b'l');
            for item in l {
                encode_to(buf, item);
            }
            buf.push(b'e');
        }
        Value::Dict(d) => encode_dict_to(buf, d),
    }
}

fn encode_dict_to(buf: &mut Vec<u8>, dict: &Dict) {
    buf.push(b'd');
    for (key, value) in dict {
        encode_bytes(buf, key);
        encode_to(buf, value);
    }
    buf.push(b'e');
}

/// Append a single dict entry. Callers are responsible for key order,
/// which lets dumps splice pre-encoded sections into a dict.
pub fn encode_entry(buf: &mut Vec<u8>, key: &[u8], value: &Value) {
    encode_bytes(buf, key);
    encode_to(buf, value);
}

fn encode_integer(buf: &mut Vec<u8>, i: i64) {
    buf.push(b'i');
    buf.extend_from_slice(i.to_string().as_bytes());
    buf.push(b'e');
}

fn encode_bytes(buf: &mut Vec<u8>, b: &[u8]) {
    buf.extend_from_slice(b.len().to_string().as_bytes());
    buf.push(b':');
    buf.extend_from_slice(b);
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoding
// ─────────────────────────────────────────────────────────────────────────────

/// Decode exactly one canonical value from `input`.
pub fn decode(input: &[u8]) -> Result<Value, ParseError> {
    let mut decoder = Decoder::new(input);
    let value = decoder.value()?;
    decoder.finish()?;
    Ok(value)
}

/// Decode exactly one canonical value that must be a dict.
pub fn decode_dict(input: &[u8]) -> Result<Dict, ParseError> {
    match decode(input)? {
        Value::Dict(d) => Ok(d),
        _ => Err(ParseError::NotADict),
    }
}

/// A strict, canonical-only bencode reader over a borrowed buffer.
pub(crate) struct Decoder<'a> {
    input: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Decoder<'a> {
    pub(crate) fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
        }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    fn peek(&self) -> Result<u8, ParseError> {
        self.input
            .get(self.pos)
            .copied()
            .ok_or(ParseError::Truncated { offset: self.pos })
    }

    fn expect(&mut self, byte: u8) -> Result<(), ParseError> {
        let b = self.peek()?;
        if b != byte {
            return Err(ParseError::UnexpectedByte {
                byte: b,
                offset: self.pos,
            });
        }
        self.pos += 1;
        Ok(())
    }

    /// Fail unless the whole input has been consumed.
    pub(crate) fn finish(&self) -> Result<(), ParseError> {
        if self.pos != self.input.len() {
            return Err(ParseError::TrailingData { offset: self.pos });
        }
        Ok(())
    }

    pub(crate) fn value(&mut self) -> Result<Value, ParseError> {
        match self.peek()? {
            b'i' => self.integer().map(Value::Integer),
            b'0'..=b'9' => self.bytes().map(Value::Bytes),
            b'l' => self.list(),
            b'd' => self.dict().map(Value::Dict),
            byte => Err(ParseError::UnexpectedByte {
                byte,
                offset: self.pos,
            }),
        }
    }

    fn integer(&mut self) -> Result<i64, ParseError> {
        let start = self.pos;
        self.expect(b'i')?;
        let negative = self.peek()? == b'-';
        if negative {
            self.pos += 1;
        }
        let digits_start = self.pos;
        let mut n: i64 = 0;
        loop {
            let b = self.peek()?;
            match b {
                b'0'..=b'9' => {
                    let d = i64::from(b - b'0');
                    n = n
                        .checked_mul(10)
                        .and_then(|n| if negative { n.checked_sub(d) } else { n.checked_add(d) })
                        .ok_or(ParseError::IntegerOverflow { offset: start })?;
                    self.pos += 1;
                }
                b'e' => break,
                byte => {
                    return Err(ParseError::UnexpectedByte {
                        byte,
                        offset: self.pos,
                    })
                }
            }
        }
        let digits = &self.input[digits_start..self.pos];
        let leading_zero = digits.len() > 1 && digits[0] == b'0';
        let negative_zero = negative && digits == b"0";
        if digits.is_empty() || leading_zero || negative_zero {
            return Err(ParseError::NonCanonicalInteger { offset: start });
        }
        self.pos += 1;
        Ok(n)
    }

    fn bytes(&mut self) -> Result<Vec<u8>, ParseError> {
        self.byte_slice().map(<[u8]>::to_vec)
    }

    fn byte_slice(&mut self) -> Result<&'a [u8], ParseError> {
        let start = self.pos;
        let mut len: usize = 0;
        loop {
            match self.peek()? {
                b @ b'0'..=b'9' => {
                    len = len
                        .checked_mul(10)
                        .and_then(|l| l.checked_add(usize::from(b - b'0')))
                        .ok_or(ParseError::InvalidLength { offset: start })?;
                    self.pos += 1;
                }
                b':' => break,
                byte => {
                    return Err(ParseError::UnexpectedByte {
                        byte,
                        offset: self.pos,
                    })
                }
            }
        }
        let digits = &self.input[start..self.pos];
        if digits.is_empty() || (digits.len() > 1 && digits[0] == b'0') {
            return Err(ParseError::InvalidLength { offset: start });
        }
        self.pos += 1;
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.input.len())
            .ok_or(ParseError::InvalidLength { offset: start })?;
        let slice = &self.input[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        if self.depth >= MAX_DEPTH {
            return Err(ParseError::TooDeep { offset: self.pos });
        }
        self.depth += 1;
        Ok(())
    }

    fn list(&mut self) -> Result<Value, ParseError> {
        self.enter()?;
        self.expect(b'l')?;
        let mut items = Vec::new();
        while self.peek()? != b'e' {
            items.push(self.value()?);
        }
        self.pos += 1;
        self.depth -= 1;
        Ok(Value::List(items))
    }

    fn dict(&mut self) -> Result<Dict, ParseError> {
        self.begin_dict()?;
        let mut dict = Dict::new();
        let mut last: Option<&[u8]> = None;
        while let Some(key) = self.next_key(last)? {
            let value = self.value()?;
            last = Some(key);
            dict.insert(key.to_vec(), value);
        }
        Ok(dict)
    }

    /// Consume the opening `d` of a dict.
    pub(crate) fn begin_dict(&mut self) -> Result<(), ParseError> {
        self.enter()?;
        self.expect(b'd')
    }

    /// Read the next key of the current dict, or consume the closing `e`.
    ///
    /// `last` is the previously read key; the new key must sort after it.
    pub(crate) fn next_key(&mut self, last: Option<&[u8]>) -> Result<Option<&'a [u8]>, ParseError> {
        if self.peek()? == b'e' {
            self.pos += 1;
            self.depth -= 1;
            return Ok(None);
        }
        let offset = self.pos;
        if !self.peek()?.is_ascii_digit() {
            return Err(ParseError::UnexpectedByte {
                byte: self.input[self.pos],
                offset,
            });
        }
        let key = self.byte_slice()?;
        if let Some(prev) = last {
            match prev.cmp(key) {
                std::cmp::Ordering::Less => {}
                std::cmp::Ordering::Equal => return Err(ParseError::DuplicateKey { offset }),
                std::cmp::Ordering::Greater => return Err(ParseError::UnsortedKey { offset }),
            }
        }
        Ok(Some(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dict(entries: &[(&str, Value)]) -> Value {
        Value::Dict(
            entries
                .iter()
                .map(|(k, v)| (k.as_bytes().to_vec(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_integer_encoding() {
        assert_eq!(encode(&Value::Integer(0)), b"i0e");
        assert_eq!(encode(&Value::Integer(42)), b"i42e");
        assert_eq!(encode(&Value::Integer(-7)), b"i-7e");
        assert_eq!(
            encode(&Value::Integer(i64::MIN)),
            b"i-9223372036854775808e"
        );
        assert_eq!(decode(b"i-9223372036854775808e").unwrap(), Value::Integer(i64::MIN));
        assert_eq!(decode(b"i9223372036854775807e").unwrap(), Value::Integer(i64::MAX));
    }

    #[test]
    fn test_bytes_and_list_encoding() {
        assert_eq!(encode(&Value::from("spam")), b"4:spam");
        assert_eq!(encode(&Value::from("")), b"0:");
        let list = Value::List(vec![Value::from("a"), Value::Integer(1)]);
        assert_eq!(encode(&list), b"l1:ai1ee");
        assert_eq!(decode(b"l1:ai1ee").unwrap(), list);
    }

    #[test]
    fn test_dict_key_ordering() {
        // Insertion order does not matter; keys come out byte-sorted.
        let mut d = Dict::new();
        d.insert(b"b".to_vec(), Value::Integer(2));
        d.insert(b"a".to_vec(), Value::Integer(1));
        d.insert(b"B".to_vec(), Value::Integer(0));
        assert_eq!(encode_dict(&d), b"d1:Bi0e1:ai1e1:bi2ee");
    }

    #[test]
    fn test_rejects_unsorted_and_duplicate_keys() {
        assert_eq!(
            decode(b"d1:bi1e1:ai2ee"),
            Err(ParseError::UnsortedKey { offset: 7 })
        );
        assert_eq!(
            decode(b"d1:ai1e1:ai2ee"),
            Err(ParseError::DuplicateKey { offset: 7 })
        );
    }

    #[test]
    fn test_rejects_non_canonical_integers() {
        assert!(matches!(decode(b"i03e"), Err(ParseError::NonCanonicalInteger { .. })));
        assert!(matches!(decode(b"i-0e"), Err(ParseError::NonCanonicalInteger { .. })));
        assert!(matches!(decode(b"ie"), Err(ParseError::NonCanonicalInteger { .. })));
        assert!(matches!(decode(b"i-e"), Err(ParseError::NonCanonicalInteger { .. })));
        assert!(matches!(
            decode(b"i9223372036854775808e"),
            Err(ParseError::IntegerOverflow { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_lengths() {
        assert!(matches!(decode(b"5:abc"), Err(ParseError::InvalidLength { .. })));
        assert!(matches!(decode(b"03:abc"), Err(ParseError::InvalidLength { .. })));
        assert!(matches!(
            decode(b"99999999999999999999999:a"),
            Err(ParseError::InvalidLength { .. })
        ));
    }

    #[test]
    fn test_rejects_truncated_and_trailing() {
        assert!(matches!(decode(b"d1:ai1e"), Err(ParseError::Truncated { .. })));
        assert!(matches!(decode(b"l"), Err(ParseError::Truncated { .. })));
        assert!(matches!(decode(b""), Err(ParseError::Truncated { .. })));
        assert_eq!(decode(b"i1ei2e"), Err(ParseError::TrailingData { offset: 3 }));
    }

    #[test]
    fn test_rejects_non_bytes_key() {
        assert!(matches!(
            decode(b"di1ei2ee"),
            Err(ParseError::UnexpectedByte { byte: b'i', .. })
        ));
    }

    #[test]
    fn test_depth_limit() {
        let mut deep = vec![b'l'; MAX_DEPTH + 1];
        deep.extend(vec![b'e'; MAX_DEPTH + 1]);
        assert!(matches!(decode(&deep), Err(ParseError::TooDeep { .. })));

        let mut ok = vec![b'l'; MAX_DEPTH];
        ok.extend(vec![b'e'; MAX_DEPTH]);
        assert!(decode(&ok).is_ok());
    }

    #[test]
    fn test_decode_dict_requires_dict() {
        assert_eq!(decode_dict(b"le"), Err(ParseError::NotADict));
        let d = dict(&[("n", Value::from("Alice"))]);
        assert_eq!(Value::Dict(decode_dict(b"d1:n5:Alicee").unwrap()), d);
    }

    #[test]
    fn test_debug_output() {
        let d = dict(&[("n", Value::from("Alice")), ("q", Value::Bytes(vec![0, 1]))]);
        assert_eq!(format!("{:?}", d), r#"{"n": "Alice", "q": 0x0001}"#);
    }

    pub(crate) fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            any::<i64>().prop_map(Value::Integer),
            prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
        ];
        leaf.prop_recursive(4, 48, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::List),
                prop::collection::btree_map(prop::collection::vec(any::<u8>(), 0..6), inner, 0..6)
                    .prop_map(Value::Dict),
            ]
        })
    }

    proptest! {
        #[test]
        fn decoded_values_reencode_identically(value in arb_value()) {
            let bytes = encode(&value);
            let decoded = decode(&bytes).unwrap();
            prop_assert_eq!(encode(&decoded), bytes);
            prop_assert_eq!(decoded, value);
        }

        #[test]
        fn decoder_never_panics(input in prop::collection::vec(any::<u8>(), 0..64)) {
            let _ = decode(&input);
        }
    }
}
