//! Proptest generators for property-based testing.

use proptest::prelude::*;

use swarm_config::{
    Contact, Expiration, NotifyMode, ProfilePic, UserProfileMut, MAX_NAME_LENGTH,
};
use swarm_config_core::types::USER_PREFIX;
use swarm_config_core::{SessionId, Value};

/// Generate a dict key.
pub fn dict_key() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..8)
}

/// Generate an encoded value, nested at most a few levels deep.
pub fn value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        any::<i64>().prop_map(Value::Integer),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
    ];
    leaf.prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
            prop::collection::btree_map(dict_key(), inner, 0..4).prop_map(Value::Dict),
        ]
    })
}

/// Generate a user session id.
pub fn session_id() -> impl Strategy<Value = SessionId> {
    any::<[u8; 32]>().prop_map(|key| SessionId::new(USER_PREFIX, key))
}

/// Generate a display name within the length limit.
pub fn display_name() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9 ]{0,30}".prop_map(String::from)
}

/// Generate a name one byte over the limit or longer.
pub fn overlong_name() -> impl Strategy<Value = String> {
    (MAX_NAME_LENGTH + 1..MAX_NAME_LENGTH * 2).prop_map(|len| "x".repeat(len))
}

/// Generate a profile picture.
pub fn profile_pic() -> impl Strategy<Value = ProfilePic> {
    ("https://[a-z]{3,10}\\.example/[a-z0-9]{1,12}", any::<[u8; 32]>())
        .prop_map(|(url, key)| ProfilePic { url, key })
}

fn notify_mode() -> impl Strategy<Value = NotifyMode> {
    prop_oneof![
        Just(NotifyMode::Defaulted),
        Just(NotifyMode::All),
        Just(NotifyMode::Disabled),
        Just(NotifyMode::MentionsOnly),
    ]
}

fn expiration() -> impl Strategy<Value = Expiration> {
    prop_oneof![
        Just(Expiration::Off),
        (1u32..=86_400 * 7).prop_map(|seconds| Expiration::AfterSend { seconds }),
        (1u32..=86_400 * 7).prop_map(|seconds| Expiration::AfterRead { seconds }),
    ]
}

/// Generate a contact with any combination of fields set.
pub fn contact() -> impl Strategy<Value = Contact> {
    let identity = (
        session_id(),
        prop::option::of(display_name()),
        prop::option::of(display_name()),
        prop::option::of(profile_pic()),
    );
    let flags = (any::<bool>(), any::<bool>(), any::<bool>(), -3i64..=3);
    let settings = (notify_mode(), 0i64..=2_000_000_000, expiration(), 0i64..=2_000_000_000);
    (identity, flags, settings).prop_map(
        |(
            (session_id, name, nickname, profile_pic),
            (approved, approved_me, blocked, priority),
            (notifications, mute_until, expiration, created),
        )| Contact {
            session_id,
            name,
            nickname,
            profile_pic,
            approved,
            approved_me,
            blocked,
            priority,
            notifications,
            mute_until,
            expiration,
            created,
        },
    )
}

/// One edit a device might make to its profile.
#[derive(Debug, Clone)]
pub enum ProfileEdit {
    Name(String),
    ClearName,
    Pic(Option<ProfilePic>),
    Priority(i64),
    Expiry(u64),
    BlindedMsgReqs(Option<bool>),
}

impl ProfileEdit {
    /// Apply the edit. Returns whether anything changed.
    pub fn apply(&self, profile: &mut UserProfileMut<'_>) -> swarm_config::Result<bool> {
        match self {
            ProfileEdit::Name(name) => profile.set_name(name),
            ProfileEdit::ClearName => profile.set_name(""),
            ProfileEdit::Pic(pic) => profile.set_profile_pic(pic.as_ref()),
            ProfileEdit::Priority(p) => profile.set_nts_priority(*p),
            ProfileEdit::Expiry(secs) => profile.set_nts_expiry(*secs),
            ProfileEdit::BlindedMsgReqs(on) => profile.set_blinded_msgreqs(*on),
        }
    }
}

impl Arbitrary for ProfileEdit {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        prop_oneof![
            3 => display_name().prop_map(ProfileEdit::Name),
            1 => Just(ProfileEdit::ClearName),
            1 => prop::option::of(profile_pic()).prop_map(ProfileEdit::Pic),
            1 => (-5i64..=5).prop_map(ProfileEdit::Priority),
            1 => (0u64..=604_800).prop_map(ProfileEdit::Expiry),
            1 => prop::option::of(any::<bool>()).prop_map(ProfileEdit::BlindedMsgReqs),
        ]
        .boxed()
    }
}

/// A sequence of `(device index, edit)` steps for `devices` devices.
pub fn edit_script(devices: usize, max_len: usize) -> impl Strategy<Value = Vec<(usize, ProfileEdit)>> {
    prop::collection::vec((0..devices, any::<ProfileEdit>()), 1..=max_len)
}
