//! Caller-supplied hooks: where pushes, dumps and log lines go.
//!
//! Hooks are trait objects owned by the State. Closures with the matching
//! signature implement each trait, so tests and simple callers can pass a
//! closure directly.

use std::fmt;

use serde::{Serialize, Serializer};
use swarm_config_core::Namespace;

/// Severity of a log line handed to a [`Logger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(name)
    }
}

/// One config message to store in a swarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingMessage {
    pub namespace: Namespace,
    pub seqno: u64,
    #[serde(serialize_with = "as_hex")]
    pub data: Vec<u8>,
}

/// Everything one swarm needs to store, in store order.
///
/// The caller encrypts each message, stores it, and reports the resulting
/// hashes back through `State::confirm_pushed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingPush {
    /// Hex session id of the swarm to store into.
    pub pubkey_hex: String,
    /// Network-adjusted time the push was prepared at.
    pub timestamp_ms: u64,
    pub messages: Vec<PendingMessage>,
}

impl PendingPush {
    /// `(namespace, seqno)` of every message, for matching responses.
    pub fn seqnos(&self) -> Vec<(Namespace, u64)> {
        self.messages.iter().map(|m| (m.namespace, m.seqno)).collect()
    }
}

fn as_hex<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(data))
}

/// Receives config messages that need to be stored in a swarm.
pub trait SendHook: Send + Sync {
    fn send(&self, pubkey_hex: &str, push: &PendingPush);
}

impl<F> SendHook for F
where
    F: Fn(&str, &PendingPush) + Send + Sync,
{
    fn send(&self, pubkey_hex: &str, push: &PendingPush) {
        self(pubkey_hex, push)
    }
}

/// Receives dumps that need to be persisted.
pub trait StoreHook: Send + Sync {
    fn store(&self, namespace: Namespace, pubkey_hex: &str, dump: &[u8]);
}

impl<F> StoreHook for F
where
    F: Fn(Namespace, &str, &[u8]) + Send + Sync,
{
    fn store(&self, namespace: Namespace, pubkey_hex: &str, dump: &[u8]) {
        self(namespace, pubkey_hex, dump)
    }
}

/// Receives every log line the State emits. No filtering is applied.
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

impl<F> Logger for F
where
    F: Fn(LogLevel, &str) + Send + Sync,
{
    fn log(&self, level: LogLevel, message: &str) {
        self(level, message)
    }
}
