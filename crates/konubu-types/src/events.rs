use serde::{Deserialize, Serialize};

use crate::models::{Comment, Confession, Like, PrivateMessage};

/// Document lifecycle events delivered by the database's trigger mechanism.
/// Each event carries the document data as it was at the time of the change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TriggerEvent {
    /// `confessions/{confession_id}` was created
    ConfessionCreated {
        confession_id: String,
        confession: Confession,
    },

    /// `confessions/{confession_id}` changed
    ConfessionUpdated {
        confession_id: String,
        before: Confession,
        after: Confession,
    },

    /// `confessions/{confession_id}` was deleted
    ConfessionDeleted {
        confession_id: String,
        confession: Confession,
    },

    /// A document was created under any `.../comments/{id}` path
    CommentCreated { path: String, comment: Comment },

    /// A document was deleted under any `.../comments/{id}` path
    CommentDeleted { path: String, comment: Comment },

    /// `likes/{like_id}` was created
    LikeCreated { like_id: String, like: Like },

    /// `likes/{like_id}` was deleted
    LikeDeleted { like_id: String, like: Like },

    /// `private_messages/{conversation_id}/messages/{message_id}` was created
    MessageCreated {
        conversation_id: String,
        message_id: String,
        message: PrivateMessage,
    },

    /// The user's account was removed
    UserDeleted { user_id: String },
}

impl TriggerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfessionCreated { .. } => "confession_created",
            Self::ConfessionUpdated { .. } => "confession_updated",
            Self::ConfessionDeleted { .. } => "confession_deleted",
            Self::CommentCreated { .. } => "comment_created",
            Self::CommentDeleted { .. } => "comment_deleted",
            Self::LikeCreated { .. } => "like_created",
            Self::LikeDeleted { .. } => "like_deleted",
            Self::MessageCreated { .. } => "message_created",
            Self::UserDeleted { .. } => "user_deleted",
        }
    }
}

/// A slash-separated document path such as `confessions/c1/comments/k1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPath {
    segments: Vec<String>,
}

impl DocumentPath {
    /// Returns `None` unless the path names a document, i.e. has an even,
    /// non-zero number of non-empty segments.
    pub fn parse(path: &str) -> Option<Self> {
        let segments: Vec<String> = path
            .trim_matches('/')
            .split('/')
            .map(str::to_string)
            .collect();
        if segments.is_empty() || segments.len() % 2 != 0 || segments.iter().any(String::is_empty) {
            return None;
        }
        Some(Self { segments })
    }

    /// Name of the collection holding the document.
    pub fn collection(&self) -> &str {
        &self.segments[self.segments.len() - 2]
    }

    pub fn id(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    pub fn is_comment(&self) -> bool {
        self.collection() == "comments"
    }

    /// The confession a comment lives under, only for the canonical
    /// `confessions/{c}/comments/{k}` layout.
    pub fn confession_id(&self) -> Option<&str> {
        match self.segments.as_slice() {
            [root, confession_id, sub, _] if root == "confessions" && sub == "comments" => {
                Some(confession_id.as_str())
            }
            _ => None,
        }
    }
}
