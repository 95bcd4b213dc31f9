//! The State: every config an account holds, and the hooks that move them.
//!
//! The State owns one config object per namespace for the account itself,
//! plus `keys`, `info` and `members` for each group it tracks. After every
//! mutation or merge it checks what needs persisting or pushing and hands
//! that to the store and send hooks.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use swarm_config_core::{decode_dict, encode_dict, Dict, Namespace, SessionId, Value};
use swarm_config_merge::{
    Clock, ConfigMessage, ConfigObject, MergeOutcome, ObjectConfig, OffsetClock, RejectReason,
    Rejection, SystemClock,
};

use crate::contacts::{Contacts, ContactsMut};
use crate::error::{Result, StateError};
use crate::hooks::{LogLevel, Logger, PendingMessage, PendingPush, SendHook, StoreHook};
use crate::keys::UserKeys;
use crate::profile::{UserProfile, UserProfileMut};

/// Configuration for a State.
#[derive(Debug, Clone, Default)]
pub struct StateConfig {
    /// Applied to every config object the State creates.
    pub object: ObjectConfig,
    /// Measured offset of the swarm's clock from ours, in milliseconds.
    pub network_offset_ms: i64,
}

/// A persisted dump and where it belongs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacedDump {
    pub namespace: Namespace,
    /// Hex group id; `None` for the account's own configs.
    pub scope: Option<String>,
    pub data: Vec<u8>,
}

impl NamespacedDump {
    /// Split a combined [`State::dump`] back into per-config dumps.
    pub fn split(combined: &[u8]) -> Result<Vec<NamespacedDump>> {
        let top = decode_dict(combined).map_err(swarm_config_core::CoreError::from)?;
        let mut out = Vec::new();
        for (key, value) in top {
            match (namespace_for_key(&key, &Namespace::USER), value) {
                (Some(namespace), Value::Bytes(data)) => out.push(NamespacedDump {
                    namespace,
                    scope: None,
                    data,
                }),
                (None, Value::Dict(group)) => {
                    let scope = String::from_utf8(key)
                        .map_err(|_| StateError::InvalidValue("group key is not hex".into()))?;
                    SessionId::group_from_hex(&scope)?;
                    for (key, value) in group {
                        let namespace = namespace_for_key(&key, &Namespace::GROUP)
                            .ok_or_else(|| unexpected_key(&key))?;
                        let Value::Bytes(data) = value else {
                            return Err(unexpected_key(&key));
                        };
                        out.push(NamespacedDump {
                            namespace,
                            scope: Some(scope.clone()),
                            data,
                        });
                    }
                }
                _ => return Err(unexpected_key(&key)),
            }
        }
        Ok(out)
    }
}

fn namespace_for_key(key: &[u8], candidates: &[Namespace]) -> Option<Namespace> {
    candidates
        .iter()
        .copied()
        .find(|ns| ns.dump_key().as_bytes() == key)
}

fn unexpected_key(key: &[u8]) -> StateError {
    StateError::InvalidValue(format!(
        "unexpected entry {} in combined dump",
        String::from_utf8_lossy(key)
    ))
}

/// Result of [`State::merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Hashes of absorbed messages, in input order.
    pub accepted: Vec<String>,
    pub rejected: Vec<Rejection>,
    /// Namespaces whose content changed.
    pub changed: Vec<Namespace>,
}

impl MergeReport {
    pub fn outcome(&self) -> MergeOutcome {
        MergeOutcome::from_counts(self.accepted.len(), self.rejected.len())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Config storage
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Configs {
    profile: ConfigObject,
    contacts: ConfigObject,
    convo_info_volatile: ConfigObject,
    user_groups: ConfigObject,
    groups: BTreeMap<(SessionId, Namespace), ConfigObject>,
}

impl Configs {
    fn get(&self, namespace: Namespace, scope: Option<&SessionId>) -> Option<&ConfigObject> {
        match (scope, namespace) {
            (None, Namespace::UserProfile) => Some(&self.profile),
            (None, Namespace::Contacts) => Some(&self.contacts),
            (None, Namespace::ConvoInfoVolatile) => Some(&self.convo_info_volatile),
            (None, Namespace::UserGroups) => Some(&self.user_groups),
            (Some(group), ns) => self.groups.get(&(*group, ns)),
            _ => None,
        }
    }

    fn get_mut(
        &mut self,
        namespace: Namespace,
        scope: Option<&SessionId>,
    ) -> Option<&mut ConfigObject> {
        match (scope, namespace) {
            (None, Namespace::UserProfile) => Some(&mut self.profile),
            (None, Namespace::Contacts) => Some(&mut self.contacts),
            (None, Namespace::ConvoInfoVolatile) => Some(&mut self.convo_info_volatile),
            (None, Namespace::UserGroups) => Some(&mut self.user_groups),
            (Some(group), ns) => self.groups.get_mut(&(*group, ns)),
            _ => None,
        }
    }

    /// Every config held for `scope`.
    fn scope_mut(&mut self, scope: Option<SessionId>) -> Vec<&mut ConfigObject> {
        match scope {
            None => vec![
                &mut self.profile,
                &mut self.contacts,
                &mut self.convo_info_volatile,
                &mut self.user_groups,
            ],
            Some(group) => self
                .groups
                .iter_mut()
                .filter(|((id, _), _)| *id == group)
                .map(|(_, object)| object)
                .collect(),
        }
    }

    fn all_mut(&mut self) -> impl Iterator<Item = &mut ConfigObject> {
        [
            &mut self.profile,
            &mut self.contacts,
            &mut self.convo_info_volatile,
            &mut self.user_groups,
        ]
        .into_iter()
        .chain(self.groups.values_mut())
    }

    fn group_ids(&self) -> Vec<SessionId> {
        let ids: BTreeSet<SessionId> = self.groups.keys().map(|(id, _)| *id).collect();
        ids.into_iter().collect()
    }

    fn has_group(&self, group: &SessionId) -> bool {
        self.groups.keys().any(|(id, _)| id == group)
    }

    /// Whether the account holds the group's admin key.
    fn is_admin(&self, group: &SessionId) -> bool {
        self.user_groups
            .view(b"g")
            .at(group.as_bytes())
            .at(b"K")
            .bytes()
            .is_some_and(|key| !key.is_empty())
    }
}

fn build_object(
    clock: &Arc<dyn Clock>,
    config: &ObjectConfig,
    namespace: Namespace,
    scope: Option<SessionId>,
) -> Result<ConfigObject> {
    Ok(ConfigObject::new(namespace, scope)?
        .with_clock(clock.clone())
        .with_config(config.clone()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Hook suppression
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Suppression {
    send: bool,
    store: bool,
}

/// Open suppressions keyed by hex pubkey; `""` covers every scope.
#[derive(Debug, Default)]
struct Suppressions(BTreeMap<String, Suppression>);

impl Suppressions {
    fn start(&mut self, send: bool, store: bool, pubkey_hex: &str) {
        let entry = self.0.entry(pubkey_hex.to_string()).or_default();
        entry.send |= send;
        entry.store |= store;
    }

    fn stop(&mut self, send: bool, store: bool, pubkey_hex: &str) {
        for (key, entry) in self.0.iter_mut() {
            if pubkey_hex.is_empty() || key == pubkey_hex {
                entry.send &= !send;
                entry.store &= !store;
            }
        }
        self.0.retain(|_, entry| *entry != Suppression::default());
    }

    fn send_suppressed(&self, pubkey_hex: &str) -> bool {
        [pubkey_hex, ""]
            .iter()
            .any(|key| self.0.get(*key).is_some_and(|s| s.send))
    }

    fn store_suppressed(&self, pubkey_hex: &str) -> bool {
        [pubkey_hex, ""]
            .iter()
            .any(|key| self.0.get(*key).is_some_and(|s| s.store))
    }
}

fn emit(logger: Option<&dyn Logger>, level: LogLevel, message: &str) {
    match level {
        LogLevel::Trace => tracing::trace!("{message}"),
        LogLevel::Debug => tracing::debug!("{message}"),
        LogLevel::Info => tracing::info!("{message}"),
        LogLevel::Warn => tracing::warn!("{message}"),
        LogLevel::Error => tracing::error!("{message}"),
    }
    if let Some(logger) = logger {
        logger.log(level, message);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────────────────

/// All config state for one account.
///
/// Not thread-safe by itself; callers serialize access. Hooks run
/// synchronously inside the call that triggered them.
pub struct State {
    keys: UserKeys,
    session_id: SessionId,
    config: StateConfig,
    clock: Arc<dyn Clock>,
    configs: Configs,
    send_hook: Option<Box<dyn SendHook>>,
    store_hook: Option<Box<dyn StoreHook>>,
    logger: Option<Box<dyn Logger>>,
    suppressions: Suppressions,
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("session_id", &self.session_id)
            .field("groups", &self.configs.group_ids())
            .field("send_hook", &self.send_hook.is_some())
            .field("store_hook", &self.store_hook.is_some())
            .finish_non_exhaustive()
    }
}

impl State {
    /// An empty State for `keys`.
    pub fn new(keys: UserKeys, config: StateConfig) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(OffsetClock::new(
            Arc::new(SystemClock),
            config.network_offset_ms,
        ));
        let object = |ns| build_object(&clock, &config.object, ns, None);
        let configs = Configs {
            profile: object(Namespace::UserProfile)?,
            contacts: object(Namespace::Contacts)?,
            convo_info_volatile: object(Namespace::ConvoInfoVolatile)?,
            user_groups: object(Namespace::UserGroups)?,
            groups: BTreeMap::new(),
        };
        let session_id = keys.session_id();
        tracing::debug!(session_id = %session_id, "created config state");
        Ok(Self {
            keys,
            session_id,
            config,
            clock,
            configs,
            send_hook: None,
            store_hook: None,
            logger: None,
            suppressions: Suppressions::default(),
        })
    }

    /// A State restored from dumps.
    ///
    /// Dumps may come in any order; group keys are loaded after the group's
    /// info and members.
    pub fn with_dumps(keys: UserKeys, dumps: &[NamespacedDump], config: StateConfig) -> Result<Self> {
        let mut state = Self::new(keys, config)?;
        let mut ordered: Vec<&NamespacedDump> = dumps.iter().collect();
        ordered.sort_by_key(|d| (d.scope.is_some(), d.namespace == Namespace::GroupKeys));
        for dump in ordered {
            state.load(dump.namespace, dump.scope.as_deref(), &dump.data)?;
        }
        Ok(state)
    }

    /// A State for a 32-byte seed or 64-byte Ed25519 secret key.
    pub fn from_secret_key(
        secret_key: &[u8],
        dumps: &[NamespacedDump],
        config: StateConfig,
    ) -> Result<Self> {
        Self::with_dumps(UserKeys::from_secret_key(secret_key)?, dumps, config)
    }

    /// Stamp local writes with `clock`, shifted by the configured network offset.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Arc::new(OffsetClock::new(clock, self.config.network_offset_ms));
        for object in self.configs.all_mut() {
            object.set_clock(self.clock.clone());
        }
        self
    }

    pub fn keys(&self) -> &UserKeys {
        &self.keys
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    // ─────────────────────────────────────────────────────────────────────
    // Hooks
    // ─────────────────────────────────────────────────────────────────────

    pub fn set_logger(&mut self, logger: Option<Box<dyn Logger>>) {
        self.logger = logger;
    }

    /// Replace the send hook. A new hook is called at once for every scope
    /// with unpushed changes.
    pub fn set_send_hook(&mut self, hook: Option<Box<dyn SendHook>>) -> Result<()> {
        self.send_hook = hook;
        if self.send_hook.is_none() {
            return Ok(());
        }
        for scope in self.scopes() {
            self.changed(scope, false, true)?;
        }
        Ok(())
    }

    /// Replace the store hook. A new hook is called at once for every
    /// config that needs a dump.
    pub fn set_store_hook(&mut self, hook: Option<Box<dyn StoreHook>>) -> Result<()> {
        self.store_hook = hook;
        if self.store_hook.is_none() {
            return Ok(());
        }
        for scope in self.scopes() {
            self.changed(scope, true, false)?;
        }
        Ok(())
    }

    /// Hold back the send and/or store hooks while making several changes.
    ///
    /// `None` suppresses hooks for every scope.
    pub fn suppress_hooks_start(&mut self, send: bool, store: bool, pubkey_hex: Option<&str>) {
        self.suppressions
            .start(send, store, pubkey_hex.unwrap_or_default());
    }

    /// Release suppressions opened by [`suppress_hooks_start`](Self::suppress_hooks_start)
    /// and fire the hooks for anything that changed meanwhile.
    ///
    /// `None` releases every open suppression.
    pub fn suppress_hooks_stop(
        &mut self,
        send: bool,
        store: bool,
        pubkey_hex: Option<&str>,
    ) -> Result<()> {
        let pubkey_hex = pubkey_hex.unwrap_or_default();
        self.suppressions.stop(send, store, pubkey_hex);
        let scopes = if pubkey_hex.is_empty() {
            self.scopes()
        } else {
            vec![self.resolve_scope(Some(pubkey_hex))?]
        };
        for scope in scopes {
            self.changed(scope, true, true)?;
        }
        Ok(())
    }

    /// Run the hooks for whatever `pubkey_hex` (the account when `None`)
    /// needs stored or pushed.
    pub fn config_changed(&mut self, pubkey_hex: Option<&str>) -> Result<()> {
        let scope = self.resolve_scope(pubkey_hex)?;
        self.changed(scope, true, true)
    }

    fn changed(&mut self, scope: Option<SessionId>, allow_store: bool, allow_send: bool) -> Result<()> {
        let pubkey_hex = self.scope_hex(scope.as_ref());
        let allow_store = allow_store
            && self.store_hook.is_some()
            && !self.suppressions.store_suppressed(&pubkey_hex);
        let allow_send = allow_send
            && self.send_hook.is_some()
            && !self.suppressions.send_suppressed(&pubkey_hex)
            && scope.map_or(true, |group| self.configs.is_admin(&group));
        if !allow_store && !allow_send {
            return Ok(());
        }

        let timestamp_ms = self.clock.now_ms();
        let logger = self.logger.as_deref();
        let mut objects = self.configs.scope_mut(scope);
        objects.sort_by_key(|o| (o.namespace().store_order(), o.namespace()));

        if let (true, Some(hook)) = (allow_store, self.store_hook.as_deref()) {
            for object in objects.iter_mut().filter(|o| o.needs_dump()) {
                let namespace = object.namespace();
                let dump = object.dump();
                emit(
                    logger,
                    LogLevel::Debug,
                    &format!("storing {namespace} dump for {pubkey_hex} ({} bytes)", dump.len()),
                );
                hook.store(namespace, &pubkey_hex, &dump);
            }
        }

        if let (true, Some(hook)) = (allow_send, self.send_hook.as_deref()) {
            let mut messages = Vec::new();
            for object in &objects {
                if let Some(push) = object.push()? {
                    messages.push(PendingMessage {
                        namespace: push.namespace,
                        seqno: push.seqno,
                        data: push.data,
                    });
                }
            }
            if !messages.is_empty() {
                let push = PendingPush {
                    pubkey_hex: pubkey_hex.clone(),
                    timestamp_ms,
                    messages,
                };
                emit(
                    logger,
                    LogLevel::Debug,
                    &format!("sending {} config messages to {pubkey_hex}", push.messages.len()),
                );
                hook.send(&pubkey_hex, &push);
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Merge
    // ─────────────────────────────────────────────────────────────────────

    /// Merge messages fetched from the swarm of `scope` (the account when `None`).
    ///
    /// Messages are merged namespace by namespace in merge order. The store
    /// hook runs after each namespace; the send hook runs once at the end.
    pub fn merge(&mut self, scope: Option<&str>, messages: &[ConfigMessage]) -> Result<MergeReport> {
        let scope = self.resolve_scope(scope)?;
        if let Some(group) = &scope {
            if !self.configs.has_group(group) {
                return Err(StateError::UnknownGroup(group.to_hex()));
            }
        }

        let mut report = MergeReport::default();
        let mut accepted = vec![false; messages.len()];
        let mut order = Vec::with_capacity(messages.len());
        for (i, message) in messages.iter().enumerate() {
            if self.configs.get(message.namespace, scope.as_ref()).is_some() {
                order.push(i);
            } else {
                report.rejected.push(Rejection {
                    hash: message.hash.clone(),
                    reason: RejectReason::NotInScope(message.namespace),
                });
            }
        }
        order.sort_by_key(|&i| (messages[i].namespace.merge_order(), messages[i].namespace));

        let mut start = 0;
        while start < order.len() {
            let namespace = messages[order[start]].namespace;
            let end = order[start..]
                .iter()
                .position(|&i| messages[i].namespace != namespace)
                .map_or(order.len(), |n| start + n);
            let run = &order[start..end];
            start = end;

            let batch: Vec<ConfigMessage> = run.iter().map(|&i| messages[i].clone()).collect();
            let Some(object) = self.configs.get_mut(namespace, scope.as_ref()) else {
                continue;
            };
            let result = object.merge(&batch);

            let mut hashes = result.accepted.iter().peekable();
            for &i in run {
                if hashes.peek().is_some_and(|h| **h == messages[i].hash) {
                    accepted[i] = true;
                    hashes.next();
                }
            }
            if result.changed {
                report.changed.push(namespace);
            }
            report.rejected.extend(result.rejected);
            self.changed(scope, true, false)?;
        }

        report.accepted = messages
            .iter()
            .zip(&accepted)
            .filter(|(_, ok)| **ok)
            .map(|(m, _)| m.hash.clone())
            .collect();

        let level = if report.rejected.is_empty() {
            LogLevel::Debug
        } else {
            LogLevel::Warn
        };
        self.log(
            level,
            &format!(
                "merged {} of {} config messages for {}",
                report.accepted.len(),
                messages.len(),
                self.scope_hex(scope.as_ref())
            ),
        );
        self.changed(scope, false, true)?;
        Ok(report)
    }

    /// Record the swarm's response to a pushed message.
    ///
    /// Returns whether the push was still current.
    pub fn confirm_pushed(
        &mut self,
        namespace: Namespace,
        scope: Option<&str>,
        seqno: u64,
        hash: &str,
        timestamp_ms: u64,
    ) -> Result<bool> {
        let scope = self.resolve_scope(scope)?;
        let object = self.object_mut(namespace, scope)?;
        let current = object.confirm_pushed(seqno, hash, timestamp_ms);
        self.changed(scope, true, false)?;
        Ok(current)
    }

    /// Message hashes still referenced by the configs of `scope`.
    pub fn current_hashes(&self, scope: Option<&str>) -> Result<BTreeSet<String>> {
        let scope = self.resolve_scope(scope)?;
        let namespaces: &[Namespace] = match scope {
            None => &Namespace::USER,
            Some(_) => &Namespace::GROUP,
        };
        Ok(namespaces
            .iter()
            .filter_map(|ns| self.configs.get(*ns, scope.as_ref()))
            .flat_map(|object| object.current_hashes())
            .collect())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Dump / load
    // ─────────────────────────────────────────────────────────────────────

    /// Dump every config needing it (or all of them when `full`) into one
    /// dict keyed by namespace, with group configs nested under the hex
    /// group id.
    pub fn dump(&mut self, full: bool) -> Vec<u8> {
        let mut out = Dict::new();
        for object in self.configs.scope_mut(None) {
            if full || object.needs_dump() {
                out.insert(dump_key(object), Value::Bytes(object.dump()));
            }
        }
        for group in self.configs.group_ids() {
            let mut entry = Dict::new();
            for object in self.configs.scope_mut(Some(group)) {
                if full || object.needs_dump() {
                    entry.insert(dump_key(object), Value::Bytes(object.dump()));
                }
            }
            if !entry.is_empty() {
                out.insert(group.to_hex().into_bytes(), Value::Dict(entry));
            }
        }
        encode_dict(&out)
    }

    /// Dump a single config.
    pub fn dump_namespace(&mut self, namespace: Namespace, scope: Option<&str>) -> Result<Vec<u8>> {
        let scope = self.resolve_scope(scope)?;
        Ok(self.object_mut(namespace, scope)?.dump())
    }

    /// Replace a config with a dump, creating it if needed.
    pub fn load(&mut self, namespace: Namespace, scope: Option<&str>, dump: &[u8]) -> Result<()> {
        let scope = self.resolve_scope(scope)?;
        self.check_namespace(namespace, scope.as_ref())?;
        if let (Some(group), Namespace::GroupKeys) = (scope, namespace) {
            let ready = [Namespace::GroupInfo, Namespace::GroupMembers]
                .iter()
                .all(|ns| self.configs.groups.contains_key(&(group, *ns)));
            if !ready {
                return Err(StateError::LoadOrder(group.to_hex()));
            }
        }

        let load_error = |source| StateError::Load { namespace, source };
        if let Some(object) = self.configs.get_mut(namespace, scope.as_ref()) {
            object.load(dump).map_err(load_error)?;
        } else if let Some(group) = scope {
            let mut object = build_object(&self.clock, &self.config.object, namespace, scope)?;
            object.load(dump).map_err(load_error)?;
            self.configs.groups.insert((group, namespace), object);
        }
        self.log(
            LogLevel::Debug,
            &format!("loaded {namespace} for {}", self.scope_hex(scope.as_ref())),
        );
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Groups
    // ─────────────────────────────────────────────────────────────────────

    /// Start tracking a group's configs. Returns false if already tracked.
    pub fn add_group(&mut self, group_hex: &str) -> Result<bool> {
        let group = SessionId::group_from_hex(group_hex)?;
        if self.configs.has_group(&group) {
            return Ok(false);
        }
        for namespace in Namespace::GROUP {
            let object = build_object(&self.clock, &self.config.object, namespace, Some(group))?;
            self.configs.groups.insert((group, namespace), object);
        }
        Ok(true)
    }

    /// Stop tracking a group. Returns false if it was not tracked.
    pub fn drop_group(&mut self, group_hex: &str) -> Result<bool> {
        let group = SessionId::group_from_hex(group_hex)?;
        let before = self.configs.groups.len();
        self.configs.groups.retain(|(id, _), _| *id != group);
        Ok(self.configs.groups.len() != before)
    }

    /// Hex ids of tracked groups.
    pub fn groups(&self) -> Vec<String> {
        self.configs.group_ids().iter().map(SessionId::to_hex).collect()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    pub fn user_profile(&self) -> UserProfile<'_> {
        UserProfile::new(&self.configs.profile)
    }

    pub fn contacts(&self) -> Contacts<'_> {
        Contacts::new(&self.configs.contacts)
    }

    /// Edit the user profile, then run the hooks.
    pub fn mutate_user_profile<T>(
        &mut self,
        f: impl FnOnce(&mut UserProfileMut<'_>) -> Result<T>,
    ) -> Result<T> {
        let out = f(&mut UserProfileMut::new(&mut self.configs.profile));
        self.changed(None, true, true)?;
        out
    }

    /// Edit the contact list, then run the hooks.
    pub fn mutate_contacts<T>(
        &mut self,
        f: impl FnOnce(&mut ContactsMut<'_>) -> Result<T>,
    ) -> Result<T> {
        let out = f(&mut ContactsMut::new(&mut self.configs.contacts));
        self.changed(None, true, true)?;
        out
    }

    /// Edit any config through its field proxy, then run the hooks for its scope.
    pub fn mutate_config<T>(
        &mut self,
        namespace: Namespace,
        scope: Option<&str>,
        f: impl FnOnce(&mut ConfigObject) -> Result<T>,
    ) -> Result<T> {
        let scope = self.resolve_scope(scope)?;
        let out = f(self.object_mut(namespace, scope)?);
        self.changed(scope, true, true)?;
        out
    }

    /// Read-only access to any config.
    pub fn config(&self, namespace: Namespace, scope: Option<&str>) -> Result<&ConfigObject> {
        let scope = self.resolve_scope(scope)?;
        self.check_namespace(namespace, scope.as_ref())?;
        self.configs
            .get(namespace, scope.as_ref())
            .ok_or_else(|| StateError::UnknownGroup(self.scope_hex(scope.as_ref())))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────

    fn log(&self, level: LogLevel, message: &str) {
        emit(self.logger.as_deref(), level, message);
    }

    fn scopes(&self) -> Vec<Option<SessionId>> {
        std::iter::once(None)
            .chain(self.configs.group_ids().into_iter().map(Some))
            .collect()
    }

    fn scope_hex(&self, scope: Option<&SessionId>) -> String {
        scope.unwrap_or(&self.session_id).to_hex()
    }

    /// Map a hex pubkey to a scope: `None` for the account, `Some` for a group.
    fn resolve_scope(&self, pubkey_hex: Option<&str>) -> Result<Option<SessionId>> {
        let hex = match pubkey_hex {
            None | Some("") => return Ok(None),
            Some(hex) => hex,
        };
        let id = SessionId::from_hex(hex).map_err(|_| StateError::InvalidScope(hex.to_string()))?;
        if id.is_group() {
            Ok(Some(id))
        } else if id == self.session_id {
            Ok(None)
        } else {
            Err(StateError::InvalidScope(hex.to_string()))
        }
    }

    fn check_namespace(&self, namespace: Namespace, scope: Option<&SessionId>) -> Result<()> {
        if !namespace.is_config() {
            return Err(StateError::NotAConfig(namespace));
        }
        if namespace.is_group() != scope.is_some() {
            return Err(StateError::ScopeMismatch {
                namespace,
                scope: self.scope_hex(scope),
            });
        }
        Ok(())
    }

    fn object_mut(
        &mut self,
        namespace: Namespace,
        scope: Option<SessionId>,
    ) -> Result<&mut ConfigObject> {
        self.check_namespace(namespace, scope.as_ref())?;
        let missing = StateError::UnknownGroup(self.scope_hex(scope.as_ref()));
        self.configs
            .get_mut(namespace, scope.as_ref())
            .ok_or(missing)
    }
}

fn dump_key(object: &ConfigObject) -> Vec<u8> {
    object.namespace().dump_key().as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use swarm_config_merge::ManualClock;

    type Sent = Arc<Mutex<Vec<PendingPush>>>;
    type Stored = Arc<Mutex<Vec<(Namespace, String, Vec<u8>)>>>;

    fn state(seed: u8) -> (State, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let state = State::new(UserKeys::from_seed(&[seed; 32]), StateConfig::default())
            .unwrap()
            .with_clock(clock.clone());
        (state, clock)
    }

    fn record_sends(state: &mut State) -> Sent {
        let sent: Sent = Arc::default();
        let sink = sent.clone();
        let hook: Box<dyn SendHook> = Box::new(move |_: &str, push: &PendingPush| {
            sink.lock().unwrap().push(push.clone());
        });
        state.set_send_hook(Some(hook)).unwrap();
        sent
    }

    fn record_stores(state: &mut State) -> Stored {
        let stored: Stored = Arc::default();
        let sink = stored.clone();
        let hook: Box<dyn StoreHook> = Box::new(move |ns: Namespace, pk: &str, dump: &[u8]| {
            sink.lock().unwrap().push((ns, pk.to_string(), dump.to_vec()));
        });
        state.set_store_hook(Some(hook)).unwrap();
        stored
    }

    fn group_hex(n: u8) -> String {
        format!("03{}", hex::encode([n; 32]))
    }

    fn as_messages(push: &PendingPush, hash_prefix: &str) -> Vec<ConfigMessage> {
        push.messages
            .iter()
            .map(|m| {
                ConfigMessage::new(
                    m.namespace,
                    format!("{hash_prefix}{}", m.seqno),
                    push.timestamp_ms,
                    m.data.clone(),
                )
            })
            .collect()
    }

    #[test]
    fn test_profile_edit_fires_hooks() {
        let (mut state, _) = state(1);
        let sent = record_sends(&mut state);
        let stored = record_stores(&mut state);
        assert!(sent.lock().unwrap().is_empty());

        state
            .mutate_user_profile(|p| p.set_name("Alice"))
            .unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].pubkey_hex, state.session_id().to_hex());
        assert_eq!(sent[0].seqnos(), vec![(Namespace::UserProfile, 1)]);

        let stored = stored.lock().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].0, Namespace::UserProfile);
    }

    #[test]
    fn test_new_hook_fires_for_pending_changes() {
        let (mut state, _) = state(1);
        state
            .mutate_contacts(|c| c.set_name(&format!("05{}", "ab".repeat(32)), "Bob"))
            .unwrap();
        let sent = record_sends(&mut state);
        assert_eq!(sent.lock().unwrap()[0].seqnos(), vec![(Namespace::Contacts, 1)]);
    }

    #[test]
    fn test_suppression_batches_changes() {
        let (mut state, _) = state(1);
        let sent = record_sends(&mut state);
        state.suppress_hooks_start(true, true, None);
        state.mutate_user_profile(|p| p.set_name("A")).unwrap();
        state.mutate_user_profile(|p| p.set_nts_priority(2)).unwrap();
        assert!(sent.lock().unwrap().is_empty());

        state.suppress_hooks_stop(true, true, None).unwrap();
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].seqnos(), vec![(Namespace::UserProfile, 2)]);
    }

    #[test]
    fn test_other_device_merges_push() {
        let (mut alice, _) = state(1);
        let (mut phone, _) = state(1);
        let sent = record_sends(&mut alice);
        alice.mutate_user_profile(|p| p.set_name("Alice")).unwrap();

        let push = sent.lock().unwrap()[0].clone();
        let messages = as_messages(&push, "h");
        let report = phone.merge(None, &messages).unwrap();
        assert_eq!(report.accepted, vec!["h1".to_string()]);
        assert_eq!(report.changed, vec![Namespace::UserProfile]);
        assert_eq!(report.outcome(), MergeOutcome::Complete);
        assert_eq!(phone.user_profile().name(), Some("Alice"));

        assert!(alice
            .confirm_pushed(Namespace::UserProfile, None, 1, "h1", push.timestamp_ms)
            .unwrap());
        assert!(!alice.config(Namespace::UserProfile, None).unwrap().needs_push());
        assert_eq!(
            alice.current_hashes(None).unwrap(),
            phone.current_hashes(None).unwrap()
        );
    }

    #[test]
    fn test_merge_rejects_out_of_scope() {
        let (mut state, _) = state(1);
        let messages = [
            ConfigMessage::new(Namespace::GroupInfo, "x", 1, b"de".to_vec()),
            ConfigMessage::new(Namespace::GroupMessages, "y", 1, b"de".to_vec()),
        ];
        let report = state.merge(None, &messages).unwrap();
        assert_eq!(report.outcome(), MergeOutcome::Failed);
        assert!(report
            .rejected
            .iter()
            .all(|r| matches!(r.reason, RejectReason::NotInScope(_))));

        assert!(matches!(
            state.merge(Some(&group_hex(9)), &[]),
            Err(StateError::UnknownGroup(_))
        ));
    }

    #[test]
    fn test_scope_validation() {
        let (mut state, _) = state(1);
        let stranger = UserKeys::from_seed(&[2; 32]).session_id().to_hex();
        assert!(matches!(
            state.dump_namespace(Namespace::UserProfile, Some(&stranger)),
            Err(StateError::InvalidScope(_))
        ));
        assert!(matches!(
            state.dump_namespace(Namespace::UserProfile, Some("zz")),
            Err(StateError::InvalidScope(_))
        ));
        let own = state.session_id().to_hex();
        assert!(state.dump_namespace(Namespace::UserProfile, Some(&own)).is_ok());
        assert!(matches!(
            state.load(Namespace::GroupInfo, None, b"de"),
            Err(StateError::ScopeMismatch { .. })
        ));
        assert!(matches!(
            state.load(Namespace::GroupMessages, Some(&group_hex(1)), b"de"),
            Err(StateError::NotAConfig(_))
        ));
    }

    #[test]
    fn test_group_keys_load_order() {
        let (mut state, _) = state(1);
        let group = group_hex(4);
        let mut source = ConfigObject::new(Namespace::GroupKeys, None).unwrap();
        let keys_dump = source.dump();
        assert!(matches!(
            state.load(Namespace::GroupKeys, Some(&group), &keys_dump),
            Err(StateError::LoadOrder(_))
        ));

        for ns in [Namespace::GroupInfo, Namespace::GroupMembers] {
            let dump = ConfigObject::new(ns, None).unwrap().dump();
            state.load(ns, Some(&group), &dump).unwrap();
        }
        state.load(Namespace::GroupKeys, Some(&group), &keys_dump).unwrap();
        assert_eq!(state.groups(), vec![group]);
    }

    #[test]
    fn test_group_push_requires_admin() {
        let (mut state, _) = state(1);
        let group = group_hex(5);
        state.add_group(&group).unwrap();
        let sent = record_sends(&mut state);

        state
            .mutate_config(Namespace::GroupInfo, Some(&group), |info| {
                Ok(info.field(b"n").set_nonempty_str("Friends")?)
            })
            .unwrap();
        assert!(sent.lock().unwrap().is_empty());

        let id = SessionId::group_from_hex(&group).unwrap();
        state
            .mutate_config(Namespace::UserGroups, None, |groups| {
                Ok(groups
                    .field(b"g")
                    .at(id.as_bytes())
                    .at(b"K")
                    .set_nonempty_bytes(&[7; 64])?)
            })
            .unwrap();
        state.config_changed(Some(&group)).unwrap();

        let sent = sent.lock().unwrap();
        let to_group: Vec<_> = sent.iter().filter(|p| p.pubkey_hex == group).collect();
        assert_eq!(to_group.len(), 1);
        assert_eq!(to_group[0].seqnos(), vec![(Namespace::GroupInfo, 1)]);
    }

    #[test]
    fn test_full_dump_restores_state() {
        let (mut state, _) = state(1);
        let group = group_hex(6);
        state.add_group(&group).unwrap();
        state.mutate_user_profile(|p| p.set_name("Alice")).unwrap();
        state
            .mutate_config(Namespace::GroupMembers, Some(&group), |m| {
                Ok(m.field(b"m").at(b"05aa").at(b"n").set_nonempty_str("Bob")?)
            })
            .unwrap();

        let combined = state.dump(true);
        let dumps = NamespacedDump::split(&combined).unwrap();
        assert_eq!(dumps.len(), 7);

        let restored =
            State::with_dumps(state.keys().clone(), &dumps, StateConfig::default()).unwrap();
        assert_eq!(restored.user_profile().name(), Some("Alice"));
        assert_eq!(
            restored
                .config(Namespace::GroupMembers, Some(&group))
                .unwrap()
                .view(b"m")
                .at(b"05aa")
                .at(b"n")
                .string(),
            Some("Bob")
        );
        assert!(restored
            .config(Namespace::UserProfile, None)
            .unwrap()
            .needs_push());

        // Nothing changed since, so an incremental dump is empty.
        assert_eq!(state.dump(false), b"de");
    }

    #[test]
    fn test_logger_receives_lines() {
        let (mut state, _) = state(1);
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        let logger: Box<dyn Logger> = Box::new(move |level: LogLevel, msg: &str| {
            sink.lock().unwrap().push((level, msg.to_string()));
        });
        state.set_logger(Some(logger));
        state.merge(None, &[]).unwrap();
        let lines = lines.lock().unwrap();
        assert!(lines.iter().any(|(_, m)| m.starts_with("merged 0 of 0")));
    }

    #[test]
    fn test_bad_secret_key_fails_construction() {
        assert!(matches!(
            State::from_secret_key(&[1; 10], &[], StateConfig::default()),
            Err(StateError::InvalidKeyLength(10))
        ));
        let dumps = [NamespacedDump {
            namespace: Namespace::Contacts,
            scope: None,
            data: b"garbage".to_vec(),
        }];
        assert!(matches!(
            State::from_secret_key(&[1; 32], &dumps, StateConfig::default()),
            Err(StateError::Load { .. })
        ));
    }
}
