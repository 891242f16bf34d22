use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use konubu_db::{Database, MAX_BATCH_OPS, MAX_IN_VALUES, WriteOp};
use konubu_push::{DataMap, Dispatcher, NotificationContent, PushProvider, SingleDelivery};
use konubu_types::{
    Comment, Confession, DocumentPath, Like, LikeTarget, NewNotification, NotificationType,
    PrivateMessage, TriggerEvent,
};

use crate::audience::{AudienceResolver, LikedContent, Recipient, Resolution, Skip};
use crate::copy;
use crate::error::{Result, TriggerError};
use crate::stats::StatReconciler;
use crate::storage::ProfileImages;
use crate::store::Store;

/// Inbox entries committed per batch, one below the store ceiling.
pub const INBOX_COMMIT_SIZE: usize = MAX_BATCH_OPS - 1;

/// What handling one event did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TriggerOutcome {
    pub event: String,
    pub counters_updated: usize,
    pub pushes_sent: usize,
    pub pushes_failed: usize,
    pub inbox_persisted: usize,
    pub invalid_tokens: Vec<String>,
    pub tokens_cleared: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<Skip>,
}

impl TriggerOutcome {
    fn for_event(event: &TriggerEvent) -> Self {
        Self {
            event: event.kind().to_string(),
            ..Default::default()
        }
    }

    fn skip(&mut self, reason: Skip) {
        debug!("{} skipped: {:?}", self.event, reason);
        self.skipped = Some(reason);
    }
}

/// Maps document lifecycle events to counter updates and notifications.
///
/// Each call to [`TriggerRouter::handle`] is independent; the router keeps
/// no state between events beyond its handles.
pub struct TriggerRouter<P> {
    store: Store,
    audience: AudienceResolver,
    stats: StatReconciler,
    dispatcher: Dispatcher<P>,
    images: ProfileImages,
}

impl<P: PushProvider> TriggerRouter<P> {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher<P>, images: ProfileImages) -> Self {
        let store = Store::new(db);
        Self {
            audience: AudienceResolver::new(store.clone()),
            stats: StatReconciler::new(store.clone()),
            store,
            dispatcher,
            images,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn stats(&self) -> &StatReconciler {
        &self.stats
    }

    pub fn dispatcher(&self) -> &Dispatcher<P> {
        &self.dispatcher
    }

    /// Apply one event. The content it carries is written to the local store
    /// first, so audience lookups and reconciliation see the same documents
    /// the event describes.
    pub async fn handle(&self, event: TriggerEvent) -> Result<TriggerOutcome> {
        let mut out = TriggerOutcome::for_event(&event);
        info!("Handling {}", out.event);

        match event {
            TriggerEvent::ConfessionCreated {
                confession_id,
                confession,
            } => {
                self.put_confession(&confession_id, &confession).await?;
                out.counters_updated = self.stats.confession_created(&confession).await?;
                if confession.is_approved() {
                    self.announce(&confession_id, &confession, &mut out).await?;
                } else {
                    out.skip(Skip::NotApproved);
                }
            }
            TriggerEvent::ConfessionUpdated {
                confession_id,
                before,
                after,
            } => {
                self.put_confession(&confession_id, &after).await?;
                out.counters_updated = self.stats.views_changed(&before, &after).await?;
                if !before.is_approved() && after.is_approved() {
                    info!("Confession {} approved", confession_id);
                    self.announce(&confession_id, &after, &mut out).await?;
                }
            }
            TriggerEvent::ConfessionDeleted {
                confession_id,
                confession,
            } => {
                self.store
                    .call(move |db| db.delete_confession(&confession_id))
                    .await?;
                out.counters_updated = self.stats.confession_deleted(&confession).await?;
            }
            TriggerEvent::CommentCreated { path, comment } => {
                let Some(doc) = comment_path(&path) else {
                    out.skip(Skip::NotAConfessionComment);
                    return Ok(out);
                };
                if let Some(confession_id) = doc.confession_id() {
                    let (parent, id, stored) =
                        (confession_id.to_string(), doc.id().to_string(), comment.clone());
                    self.store
                        .call(move |db| db.put_comment(&parent, &id, &stored))
                        .await?;
                }
                out.counters_updated = self.stats.comment_created(&comment).await?;
                match doc.confession_id() {
                    Some(confession_id) => {
                        self.notify_comment(confession_id, doc.id(), &comment, &mut out)
                            .await?
                    }
                    None => out.skip(Skip::NotAConfessionComment),
                }
            }
            TriggerEvent::CommentDeleted { path, comment } => {
                let Some(doc) = comment_path(&path) else {
                    out.skip(Skip::NotAConfessionComment);
                    return Ok(out);
                };
                if let Some(confession_id) = doc.confession_id() {
                    let (parent, id) = (confession_id.to_string(), doc.id().to_string());
                    self.store
                        .call(move |db| db.delete_comment(&parent, &id))
                        .await?;
                }
                out.counters_updated = self.stats.comment_deleted(&comment).await?;
            }
            TriggerEvent::LikeCreated { like_id, like } => {
                let stored = like.clone();
                self.store
                    .call(move |db| db.put_like(&like_id, &stored))
                    .await?;
                let liked = self.resolve_like(&like, &mut out).await?;
                out.counters_updated = self.stats.like_created(liked.as_ref(), &like).await?;
                if let Some(liked) = liked {
                    self.notify_like(&liked, &like, &mut out).await?;
                }
            }
            TriggerEvent::LikeDeleted { like_id, like } => {
                self.store.call(move |db| db.delete_like(&like_id)).await?;
                let liked = self.resolve_like(&like, &mut out).await?;
                out.counters_updated = self.stats.like_deleted(liked.as_ref(), &like).await?;
            }
            TriggerEvent::MessageCreated {
                conversation_id,
                message,
                ..
            } => {
                self.notify_message(&conversation_id, &message, &mut out)
                    .await?;
            }
            TriggerEvent::UserDeleted { user_id } => {
                self.remove_user(&user_id).await?;
            }
        }

        Ok(out)
    }

    async fn put_confession(&self, confession_id: &str, confession: &Confession) -> Result<()> {
        let (id, stored) = (confession_id.to_string(), confession.clone());
        self.store.call(move |db| db.put_confession(&id, &stored)).await
    }

    // -- City broadcast --

    /// Notify the confession's city once per approval. A broadcast that
    /// fails gives the marker back, so redelivering the event tries again.
    async fn announce(
        &self,
        confession_id: &str,
        confession: &Confession,
        out: &mut TriggerOutcome,
    ) -> Result<()> {
        let claimed_at = Utc::now();
        let id = confession_id.to_string();
        let claimed = self
            .store
            .call(move |db| db.claim_approval_notification(&id, claimed_at))
            .await?;
        if !claimed {
            out.skip(Skip::AlreadyNotified);
            return Ok(());
        }

        let result = self.broadcast(confession_id, confession, out).await;
        if result.is_err() {
            let id = confession_id.to_string();
            match self
                .store
                .call(move |db| db.release_approval_notification(&id, claimed_at))
                .await
            {
                Ok(_) => info!("Released approval marker of {} for redelivery", confession_id),
                Err(e) => warn!("Could not release approval marker of {}: {}", confession_id, e),
            }
        }
        result
    }

    async fn broadcast(
        &self,
        confession_id: &str,
        confession: &Confession,
        out: &mut TriggerOutcome,
    ) -> Result<()> {
        let audience = match self.audience.city_broadcast(confession).await? {
            Resolution::Target(audience) => audience,
            Resolution::Skipped(reason) => {
                out.skip(reason);
                return Ok(());
            }
        };

        let content = NotificationContent::new(
            copy::city_title(confession.city_name.as_deref()),
            copy::preview(&confession.content),
        );
        let mut data = DataMap::new();
        data.insert("confessionId".into(), confession_id.to_string());
        data.insert("type".into(), NotificationType::NewCityConfession.push_tag().into());
        if let Some(code) = &confession.city_plate_code {
            data.insert("cityPlateCode".into(), code.to_string());
        }

        let tokens = audience.tokens();
        info!("Broadcasting confession {} to {} token(s)", confession_id, tokens.len());
        let report = self.dispatcher.send_multicast(&tokens, &content, &data).await;
        out.pushes_sent += report.success_count;
        out.pushes_failed += report.failure_count;
        self.clear_tokens(report.invalid_tokens, out).await;
        // The inbox is written once, by the delivery that reaches everyone.
        if report.failed_batches > 0 {
            return Err(TriggerError::BroadcastIncomplete {
                confession_id: confession_id.to_string(),
                failed_batches: report.failed_batches,
            });
        }

        let city_name = confession
            .city_name
            .clone()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| copy::DEFAULT_CITY.to_string());
        let entries = audience
            .inbox_user_ids()
            .into_iter()
            .map(|user_id| NewNotification {
                user_id: user_id.to_string(),
                title: content.title.clone(),
                body: content.body.clone(),
                kind: NotificationType::NewCityConfession,
                confession_id: Some(confession_id.to_string()),
                comment_id: None,
                city_name: Some(city_name.clone()),
                sender_id: None,
            })
            .collect();
        out.inbox_persisted += self.persist_inbox(entries).await?;
        Ok(())
    }

    // -- Single-target notifications --

    async fn notify_comment(
        &self,
        confession_id: &str,
        comment_id: &str,
        comment: &Comment,
        out: &mut TriggerOutcome,
    ) -> Result<()> {
        let (kind, recipient) = match self.audience.comment_target(confession_id, comment).await? {
            Resolution::Target(target) => target,
            Resolution::Skipped(reason) => {
                out.skip(reason);
                return Ok(());
            }
        };

        let title = match kind {
            NotificationType::NewReply => copy::REPLY_TITLE,
            _ => copy::COMMENT_TITLE,
        };
        let content = NotificationContent::new(title, copy::preview(&comment.content));
        let data = single_target_data(
            kind,
            [("confessionId", confession_id), ("commentId", comment_id)],
        );
        let entry = NewNotification {
            user_id: recipient.user_id.clone(),
            title: content.title.clone(),
            body: content.body.clone(),
            kind,
            confession_id: Some(confession_id.to_string()),
            comment_id: Some(comment_id.to_string()),
            city_name: None,
            sender_id: comment.author().map(str::to_string),
        };

        self.deliver(&recipient, &content, &data, Some(entry), out).await
    }

    async fn resolve_like(&self, like: &Like, out: &mut TriggerOutcome) -> Result<Option<LikedContent>> {
        Ok(match self.audience.liked_content(like).await? {
            Resolution::Target(liked) => Some(liked),
            Resolution::Skipped(reason) => {
                out.skip(reason);
                None
            }
        })
    }

    async fn notify_like(&self, liked: &LikedContent, like: &Like, out: &mut TriggerOutcome) -> Result<()> {
        let recipient = match self.audience.like_target(liked, like.user_id.as_deref()).await? {
            Resolution::Target(recipient) => recipient,
            Resolution::Skipped(reason) => {
                out.skip(reason);
                return Ok(());
            }
        };

        let title = match liked.target {
            LikeTarget::Comment => copy::COMMENT_LIKED_TITLE,
            _ => copy::CONFESSION_LIKED_TITLE,
        };
        let content = NotificationContent::new(title, copy::LIKE_BODY);
        let mut data = single_target_data(
            NotificationType::NewLike,
            [("confessionId", liked.confession_id.as_str())],
        );
        if let Some(comment_id) = &liked.comment_id {
            data.insert("commentId".into(), comment_id.clone());
        }
        let entry = NewNotification {
            user_id: recipient.user_id.clone(),
            title: content.title.clone(),
            body: content.body.clone(),
            kind: NotificationType::NewLike,
            confession_id: Some(liked.confession_id.clone()),
            comment_id: liked.comment_id.clone(),
            city_name: None,
            sender_id: None,
        };

        self.deliver(&recipient, &content, &data, Some(entry), out).await
    }

    /// Messages are pushed only; the conversation itself is the inbox.
    async fn notify_message(
        &self,
        conversation_id: &str,
        message: &PrivateMessage,
        out: &mut TriggerOutcome,
    ) -> Result<()> {
        let recipient = match self.audience.message_target(message).await? {
            Resolution::Target(recipient) => recipient,
            Resolution::Skipped(reason) => {
                out.skip(reason);
                return Ok(());
            }
        };

        let content = NotificationContent::new(
            copy::message_title(message.sender_name.as_deref()),
            copy::message_body(&message.content, message.is_image, message.is_one_time),
        );
        let data = single_target_data(
            NotificationType::NewMessage,
            [
                ("conversationId", conversation_id),
                ("senderId", message.sender_id.as_deref().unwrap_or_default()),
            ],
        );

        self.deliver(&recipient, &content, &data, None, out).await
    }

    /// Push to the recipient if they can receive it, then record the inbox
    /// entry if one was given.
    async fn deliver(
        &self,
        recipient: &Recipient,
        content: &NotificationContent,
        data: &DataMap,
        entry: Option<NewNotification>,
        out: &mut TriggerOutcome,
    ) -> Result<()> {
        if let Some(token) = recipient.push_token() {
            match self.dispatcher.send_single(token, content, data).await? {
                SingleDelivery::Delivered { .. } => out.pushes_sent += 1,
                SingleDelivery::Rejected { invalid_token, .. } => {
                    out.pushes_failed += 1;
                    if invalid_token {
                        self.clear_tokens(vec![token.to_string()], out).await;
                    }
                }
            }
        } else {
            debug!("User {} has no push token", recipient.user_id);
        }

        if let Some(entry) = entry.filter(|_| recipient.inbox) {
            out.inbox_persisted += self.persist_inbox(vec![entry]).await?;
        }
        Ok(())
    }

    // -- Writes --

    async fn persist_inbox(&self, entries: Vec<NewNotification>) -> Result<usize> {
        let mut persisted = 0;
        for chunk in entries.chunks(INBOX_COMMIT_SIZE) {
            let ops: Vec<WriteOp> = chunk.iter().cloned().map(WriteOp::InsertNotification).collect();
            persisted += self.store.call(move |db| db.commit_batch(&ops)).await?;
        }
        if persisted > 0 {
            info!("Persisted {} inbox notification(s)", persisted);
        }
        Ok(persisted)
    }

    /// Drop invalid tokens from whoever still holds them. Failures here are
    /// logged and otherwise ignored.
    async fn clear_tokens(&self, tokens: Vec<String>, out: &mut TriggerOutcome) {
        if tokens.is_empty() {
            return;
        }
        info!("Removing {} invalid token(s)", tokens.len());

        let mut ops = Vec::new();
        for chunk in tokens.chunks(MAX_IN_VALUES) {
            let chunk = chunk.to_vec();
            match self.store.call(move |db| db.users_with_tokens(&chunk)).await {
                Ok(owners) => ops.extend(owners.into_iter().map(|o| WriteOp::ClearToken {
                    user_id: o.user_id,
                    token: o.token,
                })),
                Err(e) => warn!("Token owner lookup failed: {}", e),
            }
        }

        for chunk in ops.chunks(MAX_BATCH_OPS) {
            let batch = chunk.to_vec();
            match self.store.call(move |db| db.commit_batch(&batch)).await {
                Ok(n) => out.tokens_cleared += n,
                Err(e) => warn!("Token cleanup batch failed: {}", e),
            }
        }
        out.invalid_tokens.extend(tokens);
    }

    async fn remove_user(&self, user_id: &str) -> Result<()> {
        let uid = user_id.to_string();
        let ops = vec![WriteOp::DeleteUser { user_id: uid }];
        self.store.call(move |db| db.commit_batch(&ops)).await?;
        info!("Deleted user document {}", user_id);

        if let Err(e) = self.images.delete(user_id).await {
            warn!("Could not delete profile image for {}: {}", user_id, e);
        }
        Ok(())
    }
}

/// Parsed path of a document in some `comments` collection.
fn comment_path(path: &str) -> Option<DocumentPath> {
    let doc = DocumentPath::parse(path).filter(DocumentPath::is_comment);
    if doc.is_none() {
        warn!("Ignoring comment event with path {:?}", path);
    }
    doc
}

fn single_target_data<'a>(
    kind: NotificationType,
    fields: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> DataMap {
    let mut data: DataMap = fields
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    data.insert("type".into(), kind.push_tag().into());
    data.insert("click_action".into(), copy::CLICK_ACTION.into());
    data
}
