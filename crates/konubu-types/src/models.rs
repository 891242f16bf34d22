use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::city::CityValue;
use crate::preference::{NotificationCategory, Preference};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    Approved,
    Pending,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Pending => "pending",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approved" => Some(Self::Approved),
            "pending" => Some(Self::Pending),
            _ => None,
        }
    }
}

/// The five derived per-user counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatCounters {
    pub confession_count: i64,
    pub total_likes_received: i64,
    pub total_likes_given: i64,
    pub total_comments_given: i64,
    pub total_views_received: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub fcm_token: Option<String>,
    #[serde(default)]
    pub notifications_enabled: Preference,
    #[serde(default)]
    pub notify_on_city_confession: Preference,
    #[serde(default)]
    pub notify_on_reply: Preference,
    #[serde(default)]
    pub notify_on_comment: Preference,
    #[serde(default)]
    pub notify_on_like: Preference,
    #[serde(default)]
    pub notify_on_message: Preference,
    #[serde(default)]
    pub subscribed_cities: Vec<CityValue>,
    #[serde(flatten)]
    pub stats: StatCounters,
    #[serde(default)]
    pub stats_last_updated: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// Global switch; only an explicit `true` counts.
    pub fn notifications_on(&self) -> bool {
        self.notifications_enabled.resolve(false)
    }

    pub fn preference(&self, category: NotificationCategory) -> Preference {
        match category {
            NotificationCategory::CityConfession => self.notify_on_city_confession,
            NotificationCategory::Reply => self.notify_on_reply,
            NotificationCategory::Comment => self.notify_on_comment,
            NotificationCategory::Like => self.notify_on_like,
            NotificationCategory::Message => self.notify_on_message,
        }
    }

    pub fn wants(&self, category: NotificationCategory) -> bool {
        self.preference(category).resolve(category.default_enabled())
    }

    /// Token, ignoring empty strings left behind by older clients.
    pub fn token(&self) -> Option<&str> {
        self.fcm_token.as_deref().filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confession {
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub city_name: Option<String>,
    #[serde(default)]
    pub city_plate_code: Option<CityValue>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub status: ApprovalStatus,
    #[serde(default)]
    pub view_count: i64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Confession {
    pub fn is_approved(&self) -> bool {
        self.status == ApprovalStatus::Approved
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub author_id: Option<String>,
    /// Older clients wrote the author under `userId`.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub status: ApprovalStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Comment {
    pub fn author(&self) -> Option<&str> {
        self.author_id
            .as_deref()
            .or(self.user_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    /// True when `user_id` wrote this comment under either key.
    pub fn is_by(&self, user_id: &str) -> bool {
        self.author_id.as_deref() == Some(user_id) || self.user_id.as_deref() == Some(user_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LikeTarget {
    Confession,
    Comment,
    #[serde(other)]
    Unknown,
}

impl LikeTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Confession => "confession",
            Self::Comment => "comment",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub target_type: LikeTarget,
    pub target_id: String,
    /// The liker.
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateMessage {
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub receiver_id: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub is_image: bool,
    #[serde(default)]
    pub is_one_time: bool,
}

/// Type tag of a persisted inbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    NewCityConfession,
    NewReply,
    NewComment,
    NewLike,
    NewMessage,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewCityConfession => "new_city_confession",
            Self::NewReply => "new_reply",
            Self::NewComment => "new_comment",
            Self::NewLike => "new_like",
            Self::NewMessage => "new_message",
        }
    }

    /// `type` value carried in the push data map. City broadcasts are tagged
    /// `new_confession` on the wire; every other kind uses its inbox tag.
    pub fn push_tag(self) -> &'static str {
        match self {
            Self::NewCityConfession => "new_confession",
            other => other.as_str(),
        }
    }

    pub fn category(self) -> NotificationCategory {
        match self {
            Self::NewCityConfession => NotificationCategory::CityConfession,
            Self::NewReply => NotificationCategory::Reply,
            Self::NewComment => NotificationCategory::Comment,
            Self::NewLike => NotificationCategory::Like,
            Self::NewMessage => NotificationCategory::Message,
        }
    }
}

/// An inbox entry about to be written. Entries are write-once apart from the
/// read flag, which starts unread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub user_id: String,
    pub title: String,
    pub body: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub confession_id: Option<String>,
    pub comment_id: Option<String>,
    pub city_name: Option<String>,
    pub sender_id: Option<String>,
}
