//! Per-namespace field layouts and their merge policies.
//!
//! A schema is a tree of fields. Each field is one of:
//! - [`Policy::Lww`]: an opaque leaf resolved by last-writer-wins on its stamp
//! - [`Policy::Record`]: a dict with fixed sub-fields
//! - [`Policy::Map`]: a dict keyed by ids (contacts, members), merged per entry
//!
//! Sub-keys a record does not list are treated as opaque `Lww` leaves so
//! that fields added by newer clients survive a merge untouched.

use crate::namespace::Namespace;

/// How a field merges.
#[derive(Debug, Clone, Copy)]
pub enum Policy {
    Lww,
    Record(&'static [Field]),
    Map(&'static Policy),
}

/// A named key within a record.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub key: &'static [u8],
    pub name: &'static str,
    pub policy: Policy,
}

impl Field {
    pub const fn lww(key: &'static [u8], name: &'static str) -> Self {
        Self {
            key,
            name,
            policy: Policy::Lww,
        }
    }

    pub const fn map(key: &'static [u8], name: &'static str, entry: &'static Policy) -> Self {
        Self {
            key,
            name,
            policy: Policy::Map(entry),
        }
    }
}

impl Policy {
    /// Policy of the child stored under `key`, or `None` for a leaf.
    pub fn child(&self, key: &[u8]) -> Option<Policy> {
        match self {
            Policy::Lww => None,
            Policy::Record(fields) => Some(
                fields
                    .iter()
                    .find(|f| f.key == key)
                    .map_or(Policy::Lww, |f| f.policy),
            ),
            Policy::Map(entry) => Some(**entry),
        }
    }

    pub fn is_container(&self) -> bool {
        !matches!(self, Policy::Lww)
    }
}

/// The layout of one namespace's config dict.
#[derive(Debug)]
pub struct Schema {
    pub namespace: Namespace,
    pub fields: &'static [Field],
}

impl Schema {
    /// The schema for a config namespace; `None` for non-config namespaces.
    pub fn for_namespace(namespace: Namespace) -> Option<&'static Schema> {
        match namespace {
            Namespace::UserProfile => Some(&USER_PROFILE),
            Namespace::Contacts => Some(&CONTACTS),
            Namespace::ConvoInfoVolatile => Some(&CONVO_INFO_VOLATILE),
            Namespace::UserGroups => Some(&USER_GROUPS),
            Namespace::GroupKeys => Some(&GROUP_KEYS),
            Namespace::GroupInfo => Some(&GROUP_INFO),
            Namespace::GroupMembers => Some(&GROUP_MEMBERS),
            Namespace::GroupMessages => None,
        }
    }

    /// The root policy: a record of the top-level fields.
    pub fn root(&self) -> Policy {
        Policy::Record(self.fields)
    }

    /// Top-level keys this version understands.
    pub fn known_keys(&self) -> Vec<&'static [u8]> {
        self.fields.iter().map(|f| f.key).collect()
    }

    pub fn is_known(&self, key: &[u8]) -> bool {
        self.fields.iter().any(|f| f.key == key)
    }

    pub fn field(&self, key: &[u8]) -> Option<&'static Field> {
        self.fields.iter().find(|f| f.key == key)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared entry shapes
// ─────────────────────────────────────────────────────────────────────────────

static LWW: Policy = Policy::Lww;

static CONTACT: Policy = Policy::Record(&[
    Field::lww(b"!", "mute_until"),
    Field::lww(b"+", "priority"),
    Field::lww(b"@", "notifications"),
    Field::lww(b"A", "approved_me"),
    Field::lww(b"E", "exp_seconds"),
    Field::lww(b"N", "nickname"),
    Field::lww(b"a", "approved"),
    Field::lww(b"b", "blocked"),
    Field::lww(b"e", "exp_mode"),
    Field::lww(b"j", "created"),
    Field::lww(b"n", "name"),
    Field::lww(b"p", "profile_pic_url"),
    Field::lww(b"q", "profile_pic_key"),
]);

static CONVO: Policy = Policy::Record(&[
    Field::lww(b"r", "last_read"),
    Field::lww(b"u", "unread"),
]);

static GROUP_ENTRY: Policy = Policy::Record(&[
    Field::lww(b"!", "mute_until"),
    Field::lww(b"+", "priority"),
    Field::lww(b"@", "notifications"),
    Field::lww(b"K", "secret_key"),
    Field::lww(b"i", "invited"),
    Field::lww(b"j", "joined_at"),
    Field::lww(b"n", "name"),
    Field::lww(b"s", "auth_data"),
]);

static MEMBER: Policy = Policy::Record(&[
    Field::lww(b"A", "admin"),
    Field::lww(b"I", "invite_status"),
    Field::lww(b"P", "promotion_status"),
    Field::lww(b"R", "removed"),
    Field::lww(b"n", "name"),
    Field::lww(b"p", "profile_pic_url"),
    Field::lww(b"q", "profile_pic_key"),
]);

// ─────────────────────────────────────────────────────────────────────────────
// Namespace schemas
// ─────────────────────────────────────────────────────────────────────────────

pub static USER_PROFILE: Schema = Schema {
    namespace: Namespace::UserProfile,
    fields: &[
        Field::lww(b"+", "nts_priority"),
        Field::lww(b"M", "blinded_msgreqs"),
        Field::lww(b"e", "nts_expiry"),
        Field::lww(b"n", "name"),
        Field::lww(b"p", "profile_pic_url"),
        Field::lww(b"q", "profile_pic_key"),
    ],
};

pub static CONTACTS: Schema = Schema {
    namespace: Namespace::Contacts,
    fields: &[Field::map(b"c", "contacts", &CONTACT)],
};

pub static CONVO_INFO_VOLATILE: Schema = Schema {
    namespace: Namespace::ConvoInfoVolatile,
    fields: &[
        Field::map(b"1", "one_to_one", &CONVO),
        Field::map(b"g", "groups", &CONVO),
    ],
};

pub static USER_GROUPS: Schema = Schema {
    namespace: Namespace::UserGroups,
    fields: &[Field::map(b"g", "groups", &GROUP_ENTRY)],
};

pub static GROUP_KEYS: Schema = Schema {
    namespace: Namespace::GroupKeys,
    fields: &[Field::map(b"k", "key_generations", &LWW)],
};

pub static GROUP_INFO: Schema = Schema {
    namespace: Namespace::GroupInfo,
    fields: &[
        Field::lww(b"!", "destroyed"),
        Field::lww(b"D", "delete_attach_before"),
        Field::lww(b"E", "expiry_timer"),
        Field::lww(b"c", "created"),
        Field::lww(b"d", "delete_before"),
        Field::lww(b"n", "name"),
        Field::lww(b"o", "description"),
        Field::lww(b"p", "profile_pic_url"),
        Field::lww(b"q", "profile_pic_key"),
    ],
};

pub static GROUP_MEMBERS: Schema = Schema {
    namespace: Namespace::GroupMembers,
    fields: &[Field::map(b"m", "members", &MEMBER)],
};
