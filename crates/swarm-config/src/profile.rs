//! Typed access to the user profile config.

use swarm_config_core::{Namespace, Value};
use swarm_config_merge::{ConfigObject, DictField, DictFieldProxy};

use crate::error::{Result, StateError};

/// Longest display name or nickname, in bytes.
pub const MAX_NAME_LENGTH: usize = 100;

const NAME: &[u8] = b"n";
const PIC_URL: &[u8] = b"p";
const PIC_KEY: &[u8] = b"q";
const NTS_PRIORITY: &[u8] = b"+";
const NTS_EXPIRY: &[u8] = b"e";
const BLINDED_MSGREQS: &[u8] = b"M";

/// A profile picture: where to download it and the key to decrypt it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilePic {
    pub url: String,
    pub key: [u8; 32],
}

impl ProfilePic {
    /// Read a url/key pair stored under `field`.
    pub(crate) fn read(field: &DictField<'_>) -> Option<Self> {
        let url = field.clone().at(PIC_URL).string().filter(|u| !u.is_empty())?;
        let key = field.clone().at(PIC_KEY).bytes()?;
        Some(Self {
            url: url.to_string(),
            key: key.try_into().ok()?,
        })
    }

    /// Write a url/key pair under `field`, or erase both for `None`.
    pub(crate) fn write(field: DictFieldProxy<'_>, pic: Option<&ProfilePic>) -> Result<bool> {
        let (url, key) = match pic {
            Some(p) => (p.url.as_str(), p.key.as_slice()),
            None => ("", &[] as &[u8]),
        };
        Ok(field.set_pair_if(
            !url.is_empty() && key.len() == 32,
            (PIC_URL, Value::from(url)),
            (PIC_KEY, Value::from(key)),
        )?)
    }
}

/// Reject names longer than [`MAX_NAME_LENGTH`].
pub(crate) fn check_name(name: &str) -> Result<()> {
    if name.len() > MAX_NAME_LENGTH {
        return Err(StateError::InvalidValue(format!(
            "name is {} bytes, limit is {MAX_NAME_LENGTH}",
            name.len()
        )));
    }
    Ok(())
}

/// Read-only view of the user profile.
#[derive(Debug, Clone, Copy)]
pub struct UserProfile<'a> {
    object: &'a ConfigObject,
}

impl<'a> UserProfile<'a> {
    pub(crate) fn new(object: &'a ConfigObject) -> Self {
        debug_assert_eq!(object.namespace(), Namespace::UserProfile);
        Self { object }
    }

    pub fn name(&self) -> Option<&'a str> {
        self.object.view(NAME).string().filter(|n| !n.is_empty())
    }

    pub fn profile_pic(&self) -> Option<ProfilePic> {
        ProfilePic::read(&self.object.root_view())
    }

    /// Note-to-self pin priority; 0 when unset.
    pub fn nts_priority(&self) -> i64 {
        self.object.view(NTS_PRIORITY).integer_or_zero()
    }

    /// Note-to-self disappearing-message timer, in seconds.
    pub fn nts_expiry(&self) -> Option<u64> {
        let secs = self.object.view(NTS_EXPIRY).integer()?;
        u64::try_from(secs).ok().filter(|s| *s > 0)
    }

    /// Whether blinded message requests are accepted; `None` if never set.
    pub fn blinded_msgreqs(&self) -> Option<bool> {
        self.object.view(BLINDED_MSGREQS).integer().map(|m| m != 0)
    }

    /// [`blinded_msgreqs`](Self::blinded_msgreqs) as `-1` (unset), `0` or `1`.
    pub fn tri_state(&self) -> i32 {
        match self.blinded_msgreqs() {
            None => -1,
            Some(false) => 0,
            Some(true) => 1,
        }
    }
}

/// Mutable access to the user profile.
#[derive(Debug)]
pub struct UserProfileMut<'a> {
    object: &'a mut ConfigObject,
}

impl<'a> UserProfileMut<'a> {
    pub(crate) fn new(object: &'a mut ConfigObject) -> Self {
        debug_assert_eq!(object.namespace(), Namespace::UserProfile);
        Self { object }
    }

    pub fn view(&self) -> UserProfile<'_> {
        UserProfile::new(self.object)
    }

    /// Set the display name; an empty name clears it.
    pub fn set_name(&mut self, name: &str) -> Result<bool> {
        check_name(name)?;
        Ok(self.object.field(NAME).set_nonempty_str(name)?)
    }

    /// Set or clear the profile picture.
    ///
    /// An empty url clears the picture.
    pub fn set_profile_pic(&mut self, pic: Option<&ProfilePic>) -> Result<bool> {
        ProfilePic::write(self.object.root(), pic)
    }

    /// Set the note-to-self priority; 0 clears it.
    pub fn set_nts_priority(&mut self, priority: i64) -> Result<bool> {
        Ok(self.object.field(NTS_PRIORITY).set_nonzero_int(priority)?)
    }

    /// Set the note-to-self expiry in seconds; 0 clears it.
    pub fn set_nts_expiry(&mut self, secs: u64) -> Result<bool> {
        let secs = i64::try_from(secs)
            .map_err(|_| StateError::InvalidValue(format!("expiry {secs} is out of range")))?;
        Ok(self.object.field(NTS_EXPIRY).set_positive_int(secs)?)
    }

    /// Set or clear the blinded message request preference.
    pub fn set_blinded_msgreqs(&mut self, value: Option<bool>) -> Result<bool> {
        let field = self.object.field(BLINDED_MSGREQS);
        Ok(match value {
            None => field.erase()?,
            Some(on) => field.assign(i64::from(on))?,
        })
    }
}
