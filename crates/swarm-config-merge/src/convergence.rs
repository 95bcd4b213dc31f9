//! Convergence checks between devices.
//!
//! Two devices that have merged the same messages must hold the same
//! content and the same stamps. A content hash lets them compare that
//! without exchanging full dumps.

use std::fmt;

use swarm_config_core::{encode_dict, reinsert};

use crate::object::ConfigObject;
use crate::tree::{encode_stamps, has_pending};

const CONTENT_DOMAIN: &[u8] = b"swarm-config-content-v0:";

/// BLAKE3 digest of a config's content and stamps.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

/// Hash everything a merge can affect.
///
/// `H = Blake3(domain || namespace || content || stamps)` with content and
/// stamps in canonical encoding. Seqnos and flags are local bookkeeping
/// and do not participate.
pub fn content_hash(object: &ConfigObject) -> ContentHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(CONTENT_DOMAIN);
    hasher.update(&object.namespace().to_i16().to_be_bytes());
    hasher.update(&reinsert(object.dict(), object.unknown()));
    hasher.update(&encode_dict(&encode_stamps(&object.stamps, false)));
    ContentHash(*hasher.finalize().as_bytes())
}

/// Outcome of comparing two devices' copies of a config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// Both copies hold identical content and stamps.
    Converged,
    /// The copies differ, possibly only until the next sync round.
    NotConverged { reason: String },
}

impl ConvergenceResult {
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceResult::Converged)
    }
}

/// Compare two copies of the same config.
pub fn verify_convergence(local: &ConfigObject, remote: &ConfigObject) -> ConvergenceResult {
    if local.namespace() != remote.namespace() {
        return ConvergenceResult::NotConverged {
            reason: format!(
                "namespace mismatch: local={}, remote={}",
                local.namespace(),
                remote.namespace()
            ),
        };
    }
    for (side, object) in [("local", local), ("remote", remote)] {
        if has_pending(&object.stamps) {
            return ConvergenceResult::NotConverged {
                reason: format!("{side} copy has unpushed writes"),
            };
        }
    }

    let local_hash = content_hash(local);
    let remote_hash = content_hash(remote);
    if local_hash != remote_hash {
        return ConvergenceResult::NotConverged {
            reason: format!(
                "content mismatch: local={}, remote={}",
                local_hash.to_hex(),
                remote_hash.to_hex()
            ),
        };
    }
    ConvergenceResult::Converged
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use swarm_config_core::Namespace;

    use crate::clock::ManualClock;
    use crate::message::ConfigMessage;

    fn device() -> ConfigObject {
        ConfigObject::new(Namespace::UserProfile, None)
            .unwrap()
            .with_clock(Arc::new(ManualClock::new(1_000)))
    }

    fn publish(obj: &mut ConfigObject, hash: &str, ts: u64) -> ConfigMessage {
        let push = obj.push().unwrap().unwrap();
        obj.confirm_pushed(push.seqno, hash, ts);
        ConfigMessage::new(obj.namespace(), hash, ts, push.data)
    }

    #[test]
    fn test_hash_deterministic() {
        let mut a = device();
        a.field("n").assign("Alice").unwrap();
        assert_eq!(content_hash(&a), content_hash(&a.clone()));
        assert_eq!(format!("{:?}", content_hash(&a)).len(), "ContentHash()".len() + 16);
    }

    #[test]
    fn test_pending_writes_block_convergence() {
        let mut a = device();
        let b = device();
        assert!(verify_convergence(&a, &b).is_converged());
        a.field("n").assign("Alice").unwrap();
        assert!(!verify_convergence(&a, &b).is_converged());
    }

    #[test]
    fn test_converged_after_exchange() {
        let mut a = device();
        let mut b = device();
        a.field("n").assign("Alice").unwrap();
        let msg = publish(&mut a, "h1", 2_000);
        assert!(!verify_convergence(&a, &b).is_converged());
        b.merge(&[msg]);
        assert!(verify_convergence(&a, &b).is_converged());
    }

    #[test]
    fn test_namespace_mismatch() {
        let a = device();
        let b = ConfigObject::new(Namespace::Contacts, None).unwrap();
        assert!(!verify_convergence(&a, &b).is_converged());
    }
}
