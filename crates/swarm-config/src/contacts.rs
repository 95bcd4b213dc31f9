//! Typed access to the contacts config.
//!
//! Contacts live under `c`, keyed by the contact's raw 33-byte session id.
//! Callers address them by the 66-character hex form.

use swarm_config_core::{Dict, Namespace, SessionId};
use swarm_config_merge::{ConfigObject, DictField, DictFieldProxy};

use crate::error::{Result, StateError};
use crate::profile::{check_name, ProfilePic};

const CONTACTS: &[u8] = b"c";

/// How a conversation notifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifyMode {
    #[default]
    Defaulted,
    All,
    Disabled,
    MentionsOnly,
}

impl NotifyMode {
    fn from_code(code: i64) -> Self {
        match code {
            1 => NotifyMode::All,
            2 => NotifyMode::Disabled,
            3 => NotifyMode::MentionsOnly,
            _ => NotifyMode::Defaulted,
        }
    }

    fn code(self) -> i64 {
        match self {
            NotifyMode::Defaulted => 0,
            NotifyMode::All => 1,
            NotifyMode::Disabled => 2,
            NotifyMode::MentionsOnly => 3,
        }
    }
}

/// Disappearing-message setting of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiration {
    #[default]
    Off,
    AfterSend { seconds: u32 },
    AfterRead { seconds: u32 },
}

/// One contact as stored in the contacts config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub session_id: SessionId,
    pub name: Option<String>,
    pub nickname: Option<String>,
    pub profile_pic: Option<ProfilePic>,
    pub approved: bool,
    pub approved_me: bool,
    pub blocked: bool,
    pub priority: i64,
    pub notifications: NotifyMode,
    /// Unix timestamp (seconds) notifications are muted until; 0 if not muted.
    pub mute_until: i64,
    pub expiration: Expiration,
    /// Unix timestamp (seconds) the contact was created.
    pub created: i64,
}

impl Contact {
    /// A contact with nothing set.
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            name: None,
            nickname: None,
            profile_pic: None,
            approved: false,
            approved_me: false,
            blocked: false,
            priority: 0,
            notifications: NotifyMode::Defaulted,
            mute_until: 0,
            expiration: Expiration::Off,
            created: 0,
        }
    }

    fn read(session_id: SessionId, entry: DictField<'_>) -> Self {
        let text = |key: &str| {
            entry
                .clone()
                .at(key)
                .string()
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let int = |key: &str| entry.clone().at(key).integer_or_zero();
        let seconds = u32::try_from(int("E")).unwrap_or(0);
        let expiration = match (int("e"), seconds) {
            (_, 0) => Expiration::Off,
            (1, seconds) => Expiration::AfterSend { seconds },
            (2, seconds) => Expiration::AfterRead { seconds },
            _ => Expiration::Off,
        };

        Self {
            session_id,
            name: text("n"),
            nickname: text("N"),
            profile_pic: ProfilePic::read(&entry),
            approved: int("a") != 0,
            approved_me: int("A") != 0,
            blocked: int("b") != 0,
            priority: int("+"),
            notifications: NotifyMode::from_code(int("@")),
            mute_until: int("!"),
            expiration,
            created: int("j"),
        }
    }
}

fn parse_id(session_id_hex: &str) -> Result<SessionId> {
    let id = SessionId::from_hex(session_id_hex)?;
    if !id.is_user() {
        return Err(StateError::InvalidValue(format!(
            "contact id must start with 05: {session_id_hex}"
        )));
    }
    Ok(id)
}

/// Read-only view of the contact list.
#[derive(Debug, Clone, Copy)]
pub struct Contacts<'a> {
    object: &'a ConfigObject,
}

impl<'a> Contacts<'a> {
    pub(crate) fn new(object: &'a ConfigObject) -> Self {
        debug_assert_eq!(object.namespace(), Namespace::Contacts);
        Self { object }
    }

    /// Look up a contact by hex session id.
    pub fn get(&self, session_id_hex: &str) -> Result<Option<Contact>> {
        let id = parse_id(session_id_hex)?;
        let entry = self.object.view(CONTACTS).at(id.as_bytes());
        Ok(entry.exists().then(|| Contact::read(id, entry)))
    }

    /// The stored contact, or a blank one for an unknown id.
    pub fn get_or_construct(&self, session_id_hex: &str) -> Result<Contact> {
        let id = parse_id(session_id_hex)?;
        Ok(self.get(session_id_hex)?.unwrap_or_else(|| Contact::new(id)))
    }

    pub fn len(&self) -> usize {
        self.entries().map_or(0, |d| d.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every contact, ordered by session id. Entries whose key is not a
    /// session id are skipped.
    pub fn iter(&self) -> impl Iterator<Item = Contact> + 'a {
        let object = self.object;
        self.entries()
            .into_iter()
            .flat_map(|d| d.keys())
            .filter_map(move |key| {
                let bytes: [u8; 33] = key.as_slice().try_into().ok()?;
                let entry = object.view(CONTACTS).at(key);
                Some(Contact::read(SessionId(bytes), entry))
            })
    }

    fn entries(&self) -> Option<&'a Dict> {
        self.object.view(CONTACTS).dict()
    }
}

/// Mutable access to the contact list.
#[derive(Debug)]
pub struct ContactsMut<'a> {
    object: &'a mut ConfigObject,
}

impl<'a> ContactsMut<'a> {
    pub(crate) fn new(object: &'a mut ConfigObject) -> Self {
        debug_assert_eq!(object.namespace(), Namespace::Contacts);
        Self { object }
    }

    pub fn view(&self) -> Contacts<'_> {
        Contacts::new(self.object)
    }

    /// Store every field of `contact`. Returns whether anything changed.
    ///
    /// The name is always written, empty if unset, so a contact with no
    /// other fields still keeps its entry. Only [`erase`](Self::erase)
    /// removes one.
    pub fn set(&mut self, contact: &Contact) -> Result<bool> {
        for name in [&contact.name, &contact.nickname].into_iter().flatten() {
            check_name(name)?;
        }
        let key = contact.session_id.as_bytes();
        let (exp_mode, exp_seconds) = match contact.expiration {
            Expiration::Off => (0, 0),
            Expiration::AfterSend { seconds } => (1, seconds),
            Expiration::AfterRead { seconds } => (2, seconds),
        };
        let exp_mode = if exp_seconds == 0 { 0 } else { exp_mode };

        let mut changed = false;
        changed |= self.entry(key).at("n").assign(contact.name.as_deref().unwrap_or(""))?;
        changed |= self
            .entry(key)
            .at("N")
            .set_nonempty_str(contact.nickname.as_deref().unwrap_or(""))?;
        changed |= ProfilePic::write(self.entry(key), contact.profile_pic.as_ref())?;
        changed |= self.entry(key).at("a").set_flag(contact.approved)?;
        changed |= self.entry(key).at("A").set_flag(contact.approved_me)?;
        changed |= self.entry(key).at("b").set_flag(contact.blocked)?;
        changed |= self.entry(key).at("+").set_nonzero_int(contact.priority)?;
        changed |= self.entry(key).at("@").set_nonzero_int(contact.notifications.code())?;
        changed |= self.entry(key).at("!").set_positive_int(contact.mute_until)?;
        changed |= self.entry(key).at("e").set_nonzero_int(exp_mode)?;
        changed |= self.entry(key).at("E").set_positive_int(i64::from(exp_seconds))?;
        changed |= self.entry(key).at("j").set_positive_int(contact.created)?;
        Ok(changed)
    }

    /// Set the name; an empty name is stored as such and keeps the entry.
    pub fn set_name(&mut self, session_id_hex: &str, name: &str) -> Result<bool> {
        check_name(name)?;
        let id = parse_id(session_id_hex)?;
        Ok(self.entry(id.as_bytes()).at("n").assign(name)?)
    }

    pub fn set_nickname(&mut self, session_id_hex: &str, nickname: &str) -> Result<bool> {
        check_name(nickname)?;
        let id = parse_id(session_id_hex)?;
        Ok(self.entry(id.as_bytes()).at("N").set_nonempty_str(nickname)?)
    }

    pub fn set_blocked(&mut self, session_id_hex: &str, blocked: bool) -> Result<bool> {
        let id = parse_id(session_id_hex)?;
        Ok(self.entry(id.as_bytes()).at("b").set_flag(blocked)?)
    }

    pub fn set_approved(&mut self, session_id_hex: &str, approved: bool) -> Result<bool> {
        let id = parse_id(session_id_hex)?;
        Ok(self.entry(id.as_bytes()).at("a").set_flag(approved)?)
    }

    /// Remove a contact. Returns false if it did not exist.
    pub fn erase(&mut self, session_id_hex: &str) -> Result<bool> {
        let id = parse_id(session_id_hex)?;
        Ok(self.entry(id.as_bytes()).erase()?)
    }

    fn entry(&mut self, key: &[u8]) -> DictFieldProxy<'_> {
        self.object.field(CONTACTS).at(key)
    }
}
