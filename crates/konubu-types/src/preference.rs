use serde::{Deserialize, Serialize};

/// A stored notification toggle.
///
/// Documents written by older clients omit most toggles, so "never set" is
/// kept distinct from an explicit choice and resolved per key with
/// [`Preference::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum Preference {
    Enabled,
    Disabled,
    #[default]
    Unset,
}

impl Preference {
    pub fn resolve(self, default: bool) -> bool {
        match self {
            Self::Enabled => true,
            Self::Disabled => false,
            Self::Unset => default,
        }
    }

    pub fn as_flag(self) -> Option<bool> {
        match self {
            Self::Enabled => Some(true),
            Self::Disabled => Some(false),
            Self::Unset => None,
        }
    }
}

impl From<Option<bool>> for Preference {
    fn from(flag: Option<bool>) -> Self {
        match flag {
            Some(true) => Self::Enabled,
            Some(false) => Self::Disabled,
            None => Self::Unset,
        }
    }
}

impl From<Preference> for Option<bool> {
    fn from(pref: Preference) -> Self {
        pref.as_flag()
    }
}

/// Per-category toggles. All of them default to enabled; only the global
/// `notificationsEnabled` switch defaults to off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationCategory {
    CityConfession,
    Reply,
    Comment,
    Like,
    Message,
}

impl NotificationCategory {
    /// Document key of the toggle.
    pub fn key(self) -> &'static str {
        match self {
            Self::CityConfession => "notifyOnCityConfession",
            Self::Reply => "notifyOnReply",
            Self::Comment => "notifyOnComment",
            Self::Like => "notifyOnLike",
            Self::Message => "notifyOnMessage",
        }
    }

    pub fn default_enabled(self) -> bool {
        true
    }
}
