//! Who should hear about an event.
//!
//! Every resolution either names its recipients or explains why nobody is
//! addressed. Absence of documents, self-actions and opt-outs are skips,
//! never errors; only store failures propagate.

use std::collections::HashSet;

use futures_util::future::try_join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use konubu_types::{
    CityCode, Comment, Confession, Like, LikeTarget, NotificationCategory, NotificationType,
    PrivateMessage, UserProfile,
};

use crate::error::Result;
use crate::store::Store;

/// Why an event produced no notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Skip {
    MissingAuthor,
    InvalidCityCode,
    NotApproved,
    AlreadyNotified,
    ParentNotFound,
    TargetNotFound,
    AmbiguousTarget,
    UnsupportedTarget,
    ProfileNotFound,
    SelfAction,
    OptedOut,
    NotAConfessionComment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    Target(T),
    Skipped(Skip),
}

/// One resolved user and what they are eligible for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub user_id: String,
    pub token: Option<String>,
    pub push: bool,
    pub inbox: bool,
}

impl Recipient {
    /// Token to push to, when push-eligible.
    pub fn push_token(&self) -> Option<&str> {
        if self.push { self.token.as_deref() } else { None }
    }
}

/// Deduplicated followers of a city, excluding the author.
#[derive(Debug, Clone, Default)]
pub struct CityAudience {
    pub recipients: Vec<Recipient>,
}

impl CityAudience {
    /// Push tokens in first-seen order, each at most once even when two users
    /// share a device.
    pub fn tokens(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.recipients
            .iter()
            .filter_map(Recipient::push_token)
            .filter(|t| seen.insert(*t))
            .map(str::to_string)
            .collect()
    }

    pub fn inbox_user_ids(&self) -> Vec<&str> {
        self.recipients
            .iter()
            .filter(|r| r.inbox)
            .map(|r| r.user_id.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }
}

/// The content a like points at, and whose it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikedContent {
    pub target: LikeTarget,
    pub author_id: String,
    /// Confession to deep-link to. For a liked comment this is the
    /// confession the comment lives under.
    pub confession_id: String,
    pub comment_id: Option<String>,
}

#[derive(Clone)]
pub struct AudienceResolver {
    store: Store,
}

impl AudienceResolver {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Followers of the confession's city. The membership probes for each
    /// stored representation run concurrently and are unioned by user id.
    pub async fn city_broadcast(&self, confession: &Confession) -> Result<Resolution<CityAudience>> {
        let Some(raw) = confession.city_plate_code.as_ref() else {
            warn!("Confession has no city plate code");
            return Ok(Resolution::Skipped(Skip::InvalidCityCode));
        };
        let code = match CityCode::parse(raw) {
            Ok(code) => code,
            Err(e) => {
                warn!("{}", e);
                return Ok(Resolution::Skipped(Skip::InvalidCityCode));
            }
        };

        let branches = try_join_all(
            code.probes()
                .into_iter()
                .map(|probe| self.store.call(move |db| db.users_subscribed_to(&probe))),
        )
        .await?;

        debug!(
            "City {} probes matched {} user(s) before dedup",
            code,
            branches.iter().map(Vec::len).sum::<usize>()
        );

        let author = confession.author_id.as_deref();
        let mut seen = HashSet::new();
        let recipients: Vec<Recipient> = branches
            .into_iter()
            .flatten()
            .filter(|user| Some(user.id.as_str()) != author)
            .filter(|user| seen.insert(user.id.clone()))
            .filter_map(|user| city_recipient(&user))
            .collect();

        info!("City {} broadcast resolved {} recipient(s)", code, recipients.len());
        Ok(Resolution::Target(CityAudience { recipients }))
    }

    /// Owner of the content a new comment answers: the parent comment's
    /// author for a reply, the confession author otherwise.
    pub async fn comment_target(
        &self,
        confession_id: &str,
        comment: &Comment,
    ) -> Result<Resolution<(NotificationType, Recipient)>> {
        let parent_id = comment.parent_id.clone().filter(|p| !p.is_empty());

        let (kind, target) = match parent_id {
            Some(parent_id) => {
                let cid = confession_id.to_string();
                let pid = parent_id.clone();
                let Some(parent) = self.store.call(move |db| db.get_comment(&cid, &pid)).await? else {
                    debug!("Parent comment {} not found under {}", parent_id, confession_id);
                    return Ok(Resolution::Skipped(Skip::ParentNotFound));
                };
                (NotificationType::NewReply, parent.author().map(str::to_string))
            }
            None => {
                let cid = confession_id.to_string();
                let Some(confession) = self.store.call(move |db| db.get_confession(&cid)).await? else {
                    debug!("Confession {} not found", confession_id);
                    return Ok(Resolution::Skipped(Skip::TargetNotFound));
                };
                (NotificationType::NewComment, non_empty(confession.author_id))
            }
        };

        let Some(target) = target else {
            return Ok(Resolution::Skipped(Skip::MissingAuthor));
        };
        if comment.is_by(&target) {
            debug!("User {} commented on own content", target);
            return Ok(Resolution::Skipped(Skip::SelfAction));
        }

        Ok(match self.recipient(&target, kind.category()).await? {
            Resolution::Target(r) => Resolution::Target((kind, r)),
            Resolution::Skipped(s) => Resolution::Skipped(s),
        })
    }

    /// Find the liked content and its author. Comments are located by id
    /// across every comments subcollection; an id that matches more than one
    /// comment is not guessed at.
    pub async fn liked_content(&self, like: &Like) -> Result<Resolution<LikedContent>> {
        let target_id = like.target_id.clone();
        match like.target_type {
            LikeTarget::Confession => {
                let Some(confession) = self.store.call(move |db| db.get_confession(&target_id)).await?
                else {
                    return Ok(Resolution::Skipped(Skip::TargetNotFound));
                };
                let Some(author_id) = non_empty(confession.author_id) else {
                    return Ok(Resolution::Skipped(Skip::MissingAuthor));
                };
                Ok(Resolution::Target(LikedContent {
                    target: LikeTarget::Confession,
                    author_id,
                    confession_id: like.target_id.clone(),
                    comment_id: None,
                }))
            }
            LikeTarget::Comment => {
                let mut matches = self.store.call(move |db| db.comments_with_id(&target_id)).await?;
                if matches.len() > 1 {
                    warn!("Comment id {} matches {} comments", like.target_id, matches.len());
                    return Ok(Resolution::Skipped(Skip::AmbiguousTarget));
                }
                let Some(stored) = matches.pop() else {
                    return Ok(Resolution::Skipped(Skip::TargetNotFound));
                };
                let Some(author_id) = stored.comment.author().map(str::to_string) else {
                    return Ok(Resolution::Skipped(Skip::MissingAuthor));
                };
                Ok(Resolution::Target(LikedContent {
                    target: LikeTarget::Comment,
                    author_id,
                    confession_id: stored.confession_id,
                    comment_id: Some(stored.id),
                }))
            }
            LikeTarget::Unknown => Ok(Resolution::Skipped(Skip::UnsupportedTarget)),
        }
    }

    /// Owner of liked content, unless they liked it themselves.
    pub async fn like_target(
        &self,
        liked: &LikedContent,
        liker: Option<&str>,
    ) -> Result<Resolution<Recipient>> {
        if liker == Some(liked.author_id.as_str()) {
            return Ok(Resolution::Skipped(Skip::SelfAction));
        }
        self.recipient(&liked.author_id, NotificationCategory::Like).await
    }

    pub async fn message_target(&self, message: &PrivateMessage) -> Result<Resolution<Recipient>> {
        let Some(receiver) = message.receiver_id.as_deref().filter(|r| !r.is_empty()) else {
            return Ok(Resolution::Skipped(Skip::TargetNotFound));
        };
        if message.sender_id.as_deref() == Some(receiver) {
            return Ok(Resolution::Skipped(Skip::SelfAction));
        }
        self.recipient(receiver, NotificationCategory::Message).await
    }

    async fn recipient(&self, user_id: &str, category: NotificationCategory) -> Result<Resolution<Recipient>> {
        let uid = user_id.to_string();
        let Some(user) = self.store.call(move |db| db.get_user(&uid)).await? else {
            debug!("Target user profile {} not found", user_id);
            return Ok(Resolution::Skipped(Skip::ProfileNotFound));
        };

        let inbox = user.notifications_on() && user.wants(category);
        if !inbox {
            debug!("User {} opted out of {} notifications", user_id, category.key());
            return Ok(Resolution::Skipped(Skip::OptedOut));
        }

        let token = user.token().map(str::to_string);
        Ok(Resolution::Target(Recipient {
            user_id: user.id,
            push: token.is_some(),
            token,
            inbox,
        }))
    }
}

/// Membership queries only return users with the global switch on, so the
/// city toggle alone decides the inbox; push additionally needs a token.
fn city_recipient(user: &UserProfile) -> Option<Recipient> {
    if !user.wants(NotificationCategory::CityConfession) {
        return None;
    }
    let token = user.token().map(str::to_string);
    Some(Recipient {
        user_id: user.id.clone(),
        push: token.is_some(),
        token,
        inbox: true,
    })
}

fn non_empty(id: Option<String>) -> Option<String> {
    id.filter(|s| !s.is_empty())
}
