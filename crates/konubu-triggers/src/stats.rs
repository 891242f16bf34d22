//! Per-user aggregate counters.
//!
//! Two paths keep the counters honest. Lifecycle events apply atomic deltas
//! as they happen; reconciliation recomputes every counter from the canonical
//! confessions, comments and likes and overwrites them in one update.

use std::collections::HashSet;

use chrono::Utc;
use tracing::{error, info, warn};

use konubu_db::{CounterField, Database, MAX_IN_VALUES, StoredComment, StoredConfession};
use konubu_types::api::{ReconcileSummary, UserReconcileResult};
use konubu_types::{ApprovalStatus, Comment, Confession, Like, LikeTarget, StatCounters};

use crate::audience::LikedContent;
use crate::error::{Result, TriggerError};
use crate::store::Store;

#[derive(Clone)]
pub struct StatReconciler {
    store: Store,
}

impl StatReconciler {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    // -- Incremental --

    /// Returns the number of user documents updated, here and below.
    pub async fn confession_created(&self, confession: &Confession) -> Result<usize> {
        let Some(author) = author_of(confession) else {
            warn!("Confession has no author; counters untouched");
            return Ok(0);
        };
        self.apply(
            author,
            vec![
                (CounterField::ConfessionCount, 1),
                (CounterField::TotalViewsReceived, confession.view_count),
            ],
        )
        .await
    }

    pub async fn confession_deleted(&self, confession: &Confession) -> Result<usize> {
        let Some(author) = author_of(confession) else {
            warn!("Deleted confession has no author; counters untouched");
            return Ok(0);
        };
        let mut deltas = vec![(CounterField::ConfessionCount, -1)];
        match confession.view_count.checked_neg() {
            Some(views) => deltas.push((CounterField::TotalViewsReceived, views)),
            None => warn!(
                "View count {} cannot be reversed; views untouched",
                confession.view_count
            ),
        }
        self.apply(author, deltas).await
    }

    /// Credit new views to the author. A drop in the view count is treated as
    /// an anomaly and ignored.
    pub async fn views_changed(&self, before: &Confession, after: &Confession) -> Result<usize> {
        let Some(gained) = after.view_count.checked_sub(before.view_count) else {
            warn!(
                "View count change {} -> {} is out of range; ignoring",
                before.view_count, after.view_count
            );
            return Ok(0);
        };
        if gained <= 0 {
            if gained < 0 {
                warn!(
                    "View count went down ({} -> {}); ignoring",
                    before.view_count, after.view_count
                );
            }
            return Ok(0);
        }
        let Some(author) = author_of(after) else {
            warn!("No author for view update");
            return Ok(0);
        };
        self.apply(author, vec![(CounterField::TotalViewsReceived, gained)])
            .await
    }

    pub async fn comment_created(&self, comment: &Comment) -> Result<usize> {
        self.comment_delta(comment, 1).await
    }

    pub async fn comment_deleted(&self, comment: &Comment) -> Result<usize> {
        self.comment_delta(comment, -1).await
    }

    /// `liked` is `None` when the target's author could not be resolved; the
    /// liker is credited regardless.
    pub async fn like_created(&self, liked: Option<&LikedContent>, like: &Like) -> Result<usize> {
        self.like_delta(liked, like, 1).await
    }

    pub async fn like_deleted(&self, liked: Option<&LikedContent>, like: &Like) -> Result<usize> {
        self.like_delta(liked, like, -1).await
    }

    async fn comment_delta(&self, comment: &Comment, delta: i64) -> Result<usize> {
        let Some(author) = comment.author() else {
            warn!("Comment has no author; counters untouched");
            return Ok(0);
        };
        self.apply(author, vec![(CounterField::TotalCommentsGiven, delta)])
            .await
    }

    async fn like_delta(&self, liked: Option<&LikedContent>, like: &Like, delta: i64) -> Result<usize> {
        let mut touched = 0;
        if let Some(liked) = liked {
            touched += self
                .apply(&liked.author_id, vec![(CounterField::TotalLikesReceived, delta)])
                .await?;
        } else {
            warn!("Author not found for liked {} {}", like.target_type.as_str(), like.target_id);
        }
        if let Some(liker) = like.user_id.as_deref().filter(|u| !u.is_empty()) {
            touched += self
                .apply(liker, vec![(CounterField::TotalLikesGiven, delta)])
                .await?;
        }
        Ok(touched)
    }

    /// Apply deltas to one user. A missing user document is logged and
    /// skipped; any other failure propagates.
    async fn apply(&self, user_id: &str, deltas: Vec<(CounterField, i64)>) -> Result<usize> {
        let uid = user_id.to_string();
        match self
            .store
            .call(move |db| db.increment_user_fields(&uid, &deltas))
            .await
        {
            Ok(()) => Ok(1),
            Err(TriggerError::Store(e)) if e.is_not_found() => {
                warn!("Counter update skipped: {}", e);
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    // -- Reconciliation --

    /// Recompute one user's counters from canonical data and overwrite them.
    pub async fn recalculate_user(&self, user_id: &str) -> Result<StatCounters> {
        let uid = user_id.to_string();
        let counters = self
            .store
            .call(move |db| {
                let counters = recount(db, &uid)?;
                db.update_user_counters(&uid, &counters, Utc::now())?;
                Ok(counters)
            })
            .await?;
        info!("Recalculated stats for {}: {:?}", user_id, counters);
        Ok(counters)
    }

    /// Recalculate every user independently. One user's failure is recorded
    /// in the summary and the sweep moves on; this never fails outright.
    pub async fn recalculate_all(&self) -> ReconcileSummary {
        let users = match self.store.call(|db| db.list_users()).await {
            Ok(users) => users,
            Err(e) => {
                error!("Could not list users for reconciliation: {}", e);
                return ReconcileSummary::default();
            }
        };
        info!("Recalculating stats for {} users", users.len());

        let mut summary = ReconcileSummary {
            success: true,
            total_users: users.len(),
            ..Default::default()
        };

        for user in users {
            let result = match self.recalculate_user(&user.id).await {
                Ok(stats) => {
                    summary.success_count += 1;
                    UserReconcileResult {
                        user_id: user.id,
                        username: user.username,
                        success: true,
                        stats: Some(stats),
                        error: None,
                    }
                }
                Err(e) => {
                    warn!("Reconciliation failed for {}: {}", user.id, e);
                    summary.error_count += 1;
                    UserReconcileResult {
                        user_id: user.id,
                        username: user.username,
                        success: false,
                        stats: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            summary.results.push(result);
        }

        info!(
            "Reconciliation done: {} ok, {} failed",
            summary.success_count, summary.error_count
        );
        summary
    }
}

/// Store-backed recount. Like lookups go through "in" queries, so target ids
/// are chunked to the store's probe ceiling and the chunk counts summed.
fn recount(db: &Database, user_id: &str) -> konubu_db::Result<StatCounters> {
    let confessions = db.approved_confessions_by(user_id)?;
    let comments = db.approved_comments_by(user_id)?;

    let confession_ids: Vec<String> = confessions.iter().map(|c| c.id.clone()).collect();
    let comment_ids: Vec<String> = comments.iter().map(|c| c.id.clone()).collect();

    let mut likes_received = 0;
    for chunk in confession_ids.chunks(MAX_IN_VALUES) {
        likes_received += db.count_likes_for_targets(LikeTarget::Confession, chunk)?;
    }
    for chunk in comment_ids.chunks(MAX_IN_VALUES) {
        likes_received += db.count_likes_for_targets(LikeTarget::Comment, chunk)?;
    }

    Ok(StatCounters {
        confession_count: confessions.len() as i64,
        total_likes_received: likes_received as i64,
        total_likes_given: db.count_likes_by(user_id)? as i64,
        total_comments_given: comments.len() as i64,
        total_views_received: confessions.iter().map(|c| c.confession.view_count).sum(),
    })
}

/// Everything the counters are derived from.
#[derive(Debug, Clone, Default)]
pub struct CanonicalSnapshot {
    pub confessions: Vec<StoredConfession>,
    pub comments: Vec<StoredComment>,
    pub likes: Vec<Like>,
}

/// What a user's counters should be, computed purely from a snapshot.
pub fn compute_counters(user_id: &str, snapshot: &CanonicalSnapshot) -> StatCounters {
    let confessions: Vec<&StoredConfession> = snapshot
        .confessions
        .iter()
        .filter(|c| c.confession.is_approved() && c.confession.author_id.as_deref() == Some(user_id))
        .collect();
    let comments: Vec<&StoredComment> = snapshot
        .comments
        .iter()
        .filter(|c| c.comment.status == ApprovalStatus::Approved && c.comment.is_by(user_id))
        .collect();

    let confession_ids: HashSet<&str> = confessions.iter().map(|c| c.id.as_str()).collect();
    let comment_ids: HashSet<&str> = comments.iter().map(|c| c.id.as_str()).collect();

    let likes_received = snapshot
        .likes
        .iter()
        .filter(|l| match l.target_type {
            LikeTarget::Confession => confession_ids.contains(l.target_id.as_str()),
            LikeTarget::Comment => comment_ids.contains(l.target_id.as_str()),
            LikeTarget::Unknown => false,
        })
        .count();
    let likes_given = snapshot
        .likes
        .iter()
        .filter(|l| l.user_id.as_deref() == Some(user_id))
        .count();

    StatCounters {
        confession_count: confessions.len() as i64,
        total_likes_received: likes_received as i64,
        total_likes_given: likes_given as i64,
        total_comments_given: comments.len() as i64,
        total_views_received: confessions.iter().map(|c| c.confession.view_count).sum(),
    }
}

fn author_of(confession: &Confession) -> Option<&str> {
    confession.author_id.as_deref().filter(|a| !a.is_empty())
}
