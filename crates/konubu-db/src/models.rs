//! Stored documents paired with their ids. The document bodies reuse the
//! konubu-types models; only the path information lives here.

use chrono::{DateTime, Utc};

use konubu_types::{Comment, Confession, NotificationType};

#[derive(Debug, Clone)]
pub struct StoredConfession {
    pub id: String,
    pub confession: Confession,
}

#[derive(Debug, Clone)]
pub struct StoredComment {
    /// Parent document in the `confessions/{confession_id}/comments` path.
    pub confession_id: String,
    pub id: String,
    pub comment: Comment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenOwner {
    pub user_id: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct InboxEntry {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub kind: NotificationType,
    pub confession_id: Option<String>,
    pub comment_id: Option<String>,
    pub city_name: Option<String>,
    pub sender_id: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Counter columns on the user document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterField {
    ConfessionCount,
    TotalLikesReceived,
    TotalLikesGiven,
    TotalCommentsGiven,
    TotalViewsReceived,
}

impl CounterField {
    pub fn column(self) -> &'static str {
        match self {
            Self::ConfessionCount => "confession_count",
            Self::TotalLikesReceived => "total_likes_received",
            Self::TotalLikesGiven => "total_likes_given",
            Self::TotalCommentsGiven => "total_comments_given",
            Self::TotalViewsReceived => "total_views_received",
        }
    }
}
