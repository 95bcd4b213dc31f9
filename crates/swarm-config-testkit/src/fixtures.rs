//! Test fixtures and helpers.
//!
//! A [`Device`] is one client of an account: a State on a manual clock whose
//! hooks record everything they are handed. [`Device::publish`] plays the
//! swarm's part by confirming the latest push and turning it into messages
//! other devices can merge.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use swarm_config::{
    ConfigMessage, MergeReport, Namespace, PendingPush, SendHook, State, StateConfig, StoreHook,
    UserKeys,
};
use swarm_config_merge::ManualClock;
use tracing_subscriber::EnvFilter;

/// Start time of every fixture clock: 2023-11-14T22:13:20Z.
pub const EPOCH_MS: u64 = 1_700_000_000_000;

/// A dump handed to the store hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDump {
    pub namespace: Namespace,
    pub pubkey_hex: String,
    pub data: Vec<u8>,
}

/// One device of an account, with recording hooks.
pub struct Device {
    pub state: State,
    pub clock: Arc<ManualClock>,
    sent: Arc<Mutex<Vec<PendingPush>>>,
    stored: Arc<Mutex<Vec<StoredDump>>>,
}

impl Device {
    /// A device of a new random account.
    pub fn new() -> anyhow::Result<Self> {
        Self::from_keys(UserKeys::generate(), StateConfig::default())
    }

    /// A device of the account derived from `seed`.
    pub fn with_seed(seed: [u8; 32]) -> anyhow::Result<Self> {
        Self::from_keys(UserKeys::from_seed(&seed), StateConfig::default())
    }

    pub fn from_keys(keys: UserKeys, config: StateConfig) -> anyhow::Result<Self> {
        let clock = Arc::new(ManualClock::new(EPOCH_MS));
        let mut state = State::new(keys, config)?.with_clock(clock.clone());

        let sent: Arc<Mutex<Vec<PendingPush>>> = Arc::default();
        let sink = sent.clone();
        let send: Box<dyn SendHook> = Box::new(move |_: &str, push: &PendingPush| {
            sink.lock().unwrap().push(push.clone());
        });
        state.set_send_hook(Some(send))?;

        let stored: Arc<Mutex<Vec<StoredDump>>> = Arc::default();
        let sink = stored.clone();
        let store: Box<dyn StoreHook> =
            Box::new(move |namespace: Namespace, pubkey_hex: &str, data: &[u8]| {
                sink.lock().unwrap().push(StoredDump {
                    namespace,
                    pubkey_hex: pubkey_hex.to_string(),
                    data: data.to_vec(),
                });
            });
        state.set_store_hook(Some(store))?;

        Ok(Self {
            state,
            clock,
            sent,
            stored,
        })
    }

    pub fn session_hex(&self) -> String {
        self.state.session_id().to_hex()
    }

    pub fn advance(&self, ms: u64) {
        self.clock.advance(ms);
    }

    /// Drain every push the send hook has seen.
    pub fn take_pushes(&self) -> Vec<PendingPush> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    /// Drain every dump the store hook has seen.
    pub fn take_stored(&self) -> Vec<StoredDump> {
        std::mem::take(&mut *self.stored.lock().unwrap())
    }

    /// Store the latest push for each scope in the "swarm": confirm it
    /// under hashes starting with `hash_prefix` and return the stored
    /// messages.
    pub fn publish(&mut self, hash_prefix: &str) -> anyhow::Result<Vec<ConfigMessage>> {
        Ok(self
            .publish_by_swarm(hash_prefix)?
            .into_values()
            .flatten()
            .collect())
    }

    /// Like [`publish`](Self::publish), keeping messages grouped by the hex
    /// pubkey of the swarm they were stored in.
    pub fn publish_by_swarm(
        &mut self,
        hash_prefix: &str,
    ) -> anyhow::Result<BTreeMap<String, Vec<ConfigMessage>>> {
        let pushes = self.take_pushes();
        let mut swarms: BTreeMap<String, Vec<ConfigMessage>> = BTreeMap::new();
        for push in pushes.iter().rev() {
            if swarms.contains_key(&push.pubkey_hex) {
                continue;
            }
            let mut messages = Vec::new();
            for message in &push.messages {
                let hash = format!("{hash_prefix}-{}-{}", message.namespace, message.seqno);
                self.state.confirm_pushed(
                    message.namespace,
                    Some(push.pubkey_hex.as_str()),
                    message.seqno,
                    &hash,
                    push.timestamp_ms,
                )?;
                messages.push(ConfigMessage::new(
                    message.namespace,
                    hash,
                    push.timestamp_ms,
                    message.data.clone(),
                ));
            }
            swarms.insert(push.pubkey_hex.clone(), messages);
        }
        Ok(swarms)
    }

    /// Merge messages from the account's swarm.
    pub fn receive(&mut self, messages: &[ConfigMessage]) -> anyhow::Result<MergeReport> {
        Ok(self.state.merge(None, messages)?)
    }
}

/// `count` devices of the same account, each on its own clock.
pub fn account_devices(seed: [u8; 32], count: usize) -> anyhow::Result<Vec<Device>> {
    (0..count).map(|_| Device::with_seed(seed)).collect()
}

/// A deterministic contact session id.
pub fn contact_id(n: u8) -> String {
    format!("05{}", hex::encode([n; 32]))
}

/// A deterministic group id.
pub fn group_id(n: u8) -> String {
    format!("03{}", hex::encode([n; 32]))
}

/// Send `tracing` output to the test harness, filtered by `RUST_LOG` when set.
/// Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("swarm_config=debug,swarm_config_merge=debug")),
        )
        .try_init();
}
