//! Config namespaces and their processing order.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// A kind of config data held in the swarm.
///
/// The numeric codes match the swarm's storage namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i16)]
pub enum Namespace {
    // Account-wide namespaces
    /// Display name, picture and account flags.
    UserProfile = 2,
    /// Contact list.
    Contacts = 3,
    /// Per-conversation read state and unread flags.
    ConvoInfoVolatile = 4,
    /// Groups the account belongs to.
    UserGroups = 5,

    // Group-scoped namespaces
    /// Group chat messages. Not a config; never merged here.
    GroupMessages = 11,
    /// Group encryption key generations.
    GroupKeys = 12,
    /// Group name, picture and settings.
    GroupInfo = 13,
    /// Group member list.
    GroupMembers = 14,
}

impl Namespace {
    /// All config namespaces, in code order.
    pub const CONFIGS: [Namespace; 7] = [
        Namespace::UserProfile,
        Namespace::Contacts,
        Namespace::ConvoInfoVolatile,
        Namespace::UserGroups,
        Namespace::GroupKeys,
        Namespace::GroupInfo,
        Namespace::GroupMembers,
    ];

    /// Account-wide config namespaces.
    pub const USER: [Namespace; 4] = [
        Namespace::UserProfile,
        Namespace::Contacts,
        Namespace::ConvoInfoVolatile,
        Namespace::UserGroups,
    ];

    /// Group-scoped config namespaces.
    pub const GROUP: [Namespace; 3] = [
        Namespace::GroupKeys,
        Namespace::GroupInfo,
        Namespace::GroupMembers,
    ];

    /// Convert to the swarm namespace code.
    pub fn to_i16(self) -> i16 {
        self as i16
    }

    /// Try to parse a swarm namespace code.
    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            2 => Some(Self::UserProfile),
            3 => Some(Self::Contacts),
            4 => Some(Self::ConvoInfoVolatile),
            5 => Some(Self::UserGroups),
            11 => Some(Self::GroupMessages),
            12 => Some(Self::GroupKeys),
            13 => Some(Self::GroupInfo),
            14 => Some(Self::GroupMembers),
            _ => None,
        }
    }

    /// Whether this namespace holds a mergeable config.
    pub fn is_config(self) -> bool {
        self != Self::GroupMessages
    }

    /// Whether instances are scoped to a group pubkey.
    pub fn is_group(self) -> bool {
        matches!(
            self,
            Self::GroupMessages | Self::GroupKeys | Self::GroupInfo | Self::GroupMembers
        )
    }

    /// Order in which incoming messages are merged.
    ///
    /// Profile, contacts and group keys go first since later namespaces may
    /// refer to them; volatile conversation info goes last.
    pub fn merge_order(self) -> u8 {
        match self {
            Self::UserProfile | Self::Contacts | Self::GroupKeys => 0,
            Self::UserGroups | Self::GroupInfo | Self::GroupMembers => 1,
            Self::ConvoInfoVolatile => 2,
            Self::GroupMessages => 3,
        }
    }

    /// Order in which dumps are handed to the store hook.
    pub fn store_order(self) -> u8 {
        match self {
            Self::GroupKeys => 0,
            _ => 1,
        }
    }

    /// Key used for this namespace in a combined state dump.
    pub fn dump_key(self) -> &'static str {
        match self {
            Self::UserProfile => "user_profile",
            Self::Contacts => "contacts",
            Self::ConvoInfoVolatile => "convo_info_volatile",
            Self::UserGroups => "user_groups",
            Self::GroupMessages => "messages",
            Self::GroupKeys => "keys",
            Self::GroupInfo => "info",
            Self::GroupMembers => "members",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dump_key())
    }
}

impl TryFrom<i16> for Namespace {
    type Error = CoreError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        Self::from_i16(value).ok_or(CoreError::UnknownNamespace(value))
    }
}
