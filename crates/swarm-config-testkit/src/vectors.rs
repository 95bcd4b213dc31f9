//! Golden test vectors for the encoded formats.
//!
//! These pin the exact bytes of the value codec, of dumps and of pushes, so
//! every client writes configs other clients can read.

use std::sync::Arc;

use serde::Serialize;
use swarm_config_core::{encode, Dict, Namespace, Value};
use swarm_config_merge::{ConfigObject, ManualClock, ObjectConfig};

/// A golden test vector: something to encode and the exact expected bytes.
#[derive(Debug, Clone, Serialize)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Expected encoding, as text (all vectors are printable).
    pub expected: &'static str,
    #[serde(skip)]
    build: fn() -> Vec<u8>,
}

impl GoldenVector {
    /// Produce the bytes this vector pins.
    pub fn encode(&self) -> Vec<u8> {
        (self.build)()
    }

    pub fn matches(&self) -> bool {
        self.encode() == self.expected.as_bytes()
    }
}

fn dict(entries: &[(&str, Value)]) -> Value {
    let d: Dict = entries
        .iter()
        .map(|(k, v)| (k.as_bytes().to_vec(), v.clone()))
        .collect();
    Value::Dict(d)
}

fn profile_at(now_ms: u64) -> ConfigObject {
    let config = ObjectConfig {
        compression_level: None,
        ..ObjectConfig::default()
    };
    ConfigObject::new(Namespace::UserProfile, None)
        .map(|obj| obj.with_clock(Arc::new(ManualClock::new(now_ms))).with_config(config))
        .unwrap_or_else(|e| panic!("profile schema missing: {e}"))
}

fn named_profile() -> ConfigObject {
    let mut obj = profile_at(1_000);
    obj.field(b"n")
        .assign("Alice")
        .unwrap_or_else(|e| panic!("write failed: {e}"));
    obj
}

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "zero",
            expected: "i0e",
            build: || encode(&Value::Integer(0)),
        },
        GoldenVector {
            name: "negative integer",
            expected: "i-42e",
            build: || encode(&Value::Integer(-42)),
        },
        GoldenVector {
            name: "byte string",
            expected: "4:spam",
            build: || encode(&Value::from("spam")),
        },
        GoldenVector {
            name: "empty list",
            expected: "le",
            build: || encode(&Value::List(Vec::new())),
        },
        GoldenVector {
            name: "dict keys sorted by bytes",
            expected: "d1:Ai2e1:ai1e2:aa0:e",
            build: || {
                encode(&dict(&[
                    ("aa", Value::from("")),
                    ("a", Value::Integer(1)),
                    ("A", Value::Integer(2)),
                ]))
            },
        },
        GoldenVector {
            name: "nested containers",
            expected: "d1:cd1:nl3:Bobi7eeee",
            build: || {
                encode(&dict(&[(
                    "c",
                    dict(&[(
                        "n",
                        Value::List(vec![Value::from("Bob"), Value::Integer(7)]),
                    )]),
                )]))
            },
        },
        GoldenVector {
            name: "empty profile dump",
            expected: "d1:#i0e1:$i0e1:<de1:=de1:ni2ee",
            build: || profile_at(0).dump(),
        },
        GoldenVector {
            name: "profile dump with pending name",
            expected: "d1:!i1e1:#i1e1:$i0e1:<d1:nli1000e0:ee1:=d1:n5:Alicee1:ni2ee",
            build: || named_profile().dump(),
        },
        GoldenVector {
            name: "profile push with pending name",
            expected: "d1:#i1e1:<d1:nlee1:=d1:n5:Alicee",
            build: || {
                named_profile()
                    .push()
                    .ok()
                    .flatten()
                    .map(|p| p.data)
                    .unwrap_or_default()
            },
        },
        GoldenVector {
            name: "profile push after confirmation",
            expected: "d1:#i2e1:<d1:+le1:nli1000e2:h1ee1:=d1:+i3e1:n5:Alicee",
            build: || {
                let mut obj = named_profile();
                obj.confirm_pushed(1, "h1", 1_000);
                obj.field(b"+")
                    .assign(3)
                    .unwrap_or_else(|e| panic!("write failed: {e}"));
                obj.push()
                    .ok()
                    .flatten()
                    .map(|p| p.data)
                    .unwrap_or_default()
            },
        },
    ]
}

/// Verify all golden vectors.
pub fn verify_all_vectors() -> Vec<(&'static str, bool)> {
    all_vectors().iter().map(|v| (v.name, v.matches())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_vectors_match() {
        for vector in all_vectors() {
            let actual = vector.encode();
            assert_eq!(
                String::from_utf8_lossy(&actual),
                vector.expected,
                "vector {:?}",
                vector.name
            );
        }
    }

    #[test]
    fn test_vectors_export_as_json() {
        let json = serde_json::to_value(all_vectors()).unwrap();
        assert_eq!(json[0]["name"], "zero");
        assert_eq!(json[0]["expected"], "i0e");
        assert!(json[0].get("build").is_none());
    }
}
