use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, Row, params, params_from_iter};

use konubu_types::{
    ApprovalStatus, CityValue, Comment, Confession, Like, LikeTarget, NotificationType,
    Preference, StatCounters, UserProfile,
};

use crate::models::{CounterField, InboxEntry, StoredComment, StoredConfession, TokenOwner};
use crate::{Database, MAX_IN_VALUES, Result, StoreError};

const USER_COLUMNS: &str = "id, username, email, fcm_token, notifications_enabled, \
     notify_on_city_confession, notify_on_reply, notify_on_comment, notify_on_like, \
     notify_on_message, subscribed_cities, confession_count, total_likes_received, \
     total_likes_given, total_comments_given, total_views_received, stats_last_updated";

const CONFESSION_COLUMNS: &str =
    "id, author_id, city_name, city_plate_code, content, status, view_count, created_at";

const COMMENT_COLUMNS: &str =
    "confession_id, id, parent_id, author_id, content, status, created_at";

impl Database {
    // -- Users --

    /// Insert or fully replace a user document.
    pub fn put_user(&self, user: &UserProfile) -> Result<()> {
        let cities = serde_json::to_string(&user.subscribed_cities)?;
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO users ({USER_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
                ),
                params![
                    user.id,
                    user.username,
                    user.email,
                    user.fcm_token,
                    user.notifications_enabled.as_flag(),
                    user.notify_on_city_confession.as_flag(),
                    user.notify_on_reply.as_flag(),
                    user.notify_on_comment.as_flag(),
                    user.notify_on_like.as_flag(),
                    user.notify_on_message.as_flag(),
                    cities,
                    user.stats.confession_count,
                    user.stats.total_likes_received,
                    user.stats.total_likes_given,
                    user.stats.total_comments_given,
                    user.stats.total_views_received,
                    user.stats_last_updated.map(|t| t.to_rfc3339()),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user(&self, id: &str) -> Result<Option<UserProfile>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                [id],
                user_from_row,
            )
            .optional()
        })
    }

    pub fn list_users(&self) -> Result<Vec<UserProfile>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))?;
            let rows = stmt
                .query_map([], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Array-contains membership on `subscribed_cities`, restricted to users
    /// with the global notification switch explicitly on. The probe matches
    /// only elements of the same JSON type, so `6` and `"6"` are different
    /// probes.
    pub fn users_subscribed_to(&self, probe: &CityValue) -> Result<Vec<UserProfile>> {
        let value = match probe {
            CityValue::Number(n) => Value::Integer(*n),
            CityValue::Text(s) => Value::Text(s.clone()),
        };

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users u
                 WHERE u.notifications_enabled = 1
                   AND EXISTS (
                       SELECT 1 FROM json_each(u.subscribed_cities) j
                       WHERE j.type = ?1 AND j.value = ?2
                   )"
            ))?;
            let rows = stmt
                .query_map(params![probe.json_type(), value], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Users currently holding any of `tokens` ("in" query, at most
    /// [`MAX_IN_VALUES`] tokens).
    pub fn users_with_tokens(&self, tokens: &[String]) -> Result<Vec<TokenOwner>> {
        check_in_values(tokens.len())?;
        if tokens.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT id, fcm_token FROM users WHERE fcm_token IN ({})",
                placeholders(tokens.len(), 1)
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(tokens.iter()), |row| {
                    Ok(TokenOwner {
                        user_id: row.get(0)?,
                        token: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Apply numeric deltas to counter fields in a single statement. The
    /// deltas are added by SQLite, never read back and rewritten here.
    pub fn increment_user_fields(&self, id: &str, deltas: &[(CounterField, i64)]) -> Result<()> {
        let mut merged: Vec<(CounterField, i64)> = Vec::with_capacity(deltas.len());
        for &(field, delta) in deltas {
            match merged.iter_mut().find(|(f, _)| *f == field) {
                Some((_, total)) => *total += delta,
                None => merged.push((field, delta)),
            }
        }
        if merged.is_empty() {
            return Ok(());
        }

        let sets: Vec<String> = merged
            .iter()
            .enumerate()
            .map(|(i, (field, _))| format!("{col} = {col} + ?{}", i + 2, col = field.column()))
            .collect();
        let sql = format!("UPDATE users SET {} WHERE id = ?1", sets.join(", "));

        let mut values = vec![Value::Text(id.to_string())];
        values.extend(merged.iter().map(|(_, delta)| Value::Integer(*delta)));

        self.with_conn(|conn| {
            let changed = conn.execute(&sql, params_from_iter(values.iter()))?;
            if changed == 0 {
                return Err(StoreError::not_found("users", id));
            }
            Ok(())
        })
    }

    /// Overwrite all counters at once and stamp the reconciliation time.
    pub fn update_user_counters(
        &self,
        id: &str,
        counters: &StatCounters,
        stamped_at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET
                    confession_count = ?2,
                    total_likes_received = ?3,
                    total_likes_given = ?4,
                    total_comments_given = ?5,
                    total_views_received = ?6,
                    stats_last_updated = ?7
                 WHERE id = ?1",
                params![
                    id,
                    counters.confession_count,
                    counters.total_likes_received,
                    counters.total_likes_given,
                    counters.total_comments_given,
                    counters.total_views_received,
                    stamped_at.to_rfc3339(),
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("users", id));
            }
            Ok(())
        })
    }

    pub fn delete_user(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM users WHERE id = ?1", [id])? > 0))
    }

    // -- Confessions --

    /// Upsert a confession. The approval-notification marker survives.
    pub fn put_confession(&self, id: &str, confession: &Confession) -> Result<()> {
        let plate = confession
            .city_plate_code
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let created_at = confession.created_at.unwrap_or_else(Utc::now).to_rfc3339();

        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO confessions ({CONFESSION_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(id) DO UPDATE SET
                        author_id = excluded.author_id,
                        city_name = excluded.city_name,
                        city_plate_code = excluded.city_plate_code,
                        content = excluded.content,
                        status = excluded.status,
                        view_count = excluded.view_count"
                ),
                params![
                    id,
                    confession.author_id,
                    confession.city_name,
                    plate,
                    confession.content,
                    confession.status.as_str(),
                    confession.view_count,
                    created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_confession(&self, id: &str) -> Result<Option<Confession>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {CONFESSION_COLUMNS} FROM confessions WHERE id = ?1"),
                [id],
                confession_from_row,
            )
            .optional()
        })
        .map(|found| found.map(|stored| stored.confession))
    }

    pub fn approved_confessions_by(&self, author_id: &str) -> Result<Vec<StoredConfession>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONFESSION_COLUMNS} FROM confessions
                 WHERE author_id = ?1 AND status = 'approved'
                 ORDER BY created_at"
            ))?;
            let rows = stmt
                .query_map([author_id], confession_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete_confession(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM confessions WHERE id = ?1", [id])? > 0))
    }

    /// Set the approval-notification marker if it is not set yet. Returns
    /// true only for the caller that set it; false when it was already set
    /// or the confession is gone.
    pub fn claim_approval_notification(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE confessions SET approval_notified_at = ?2
                 WHERE id = ?1 AND approval_notified_at IS NULL",
                params![id, at.to_rfc3339()],
            )?;
            Ok(changed == 1)
        })
    }

    /// Undo a claim made at `at` so a later delivery can try again. A marker
    /// set by another claim is left alone.
    pub fn release_approval_notification(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE confessions SET approval_notified_at = NULL
                 WHERE id = ?1 AND approval_notified_at = ?2",
                params![id, at.to_rfc3339()],
            )?;
            Ok(changed == 1)
        })
    }

    // -- Comments --

    pub fn put_comment(&self, confession_id: &str, id: &str, comment: &Comment) -> Result<()> {
        let created_at = comment.created_at.unwrap_or_else(Utc::now).to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO comments ({COMMENT_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                ),
                params![
                    confession_id,
                    id,
                    comment.parent_id,
                    comment.author(),
                    comment.content,
                    comment.status.as_str(),
                    created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_comment(&self, confession_id: &str, id: &str) -> Result<Option<Comment>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE confession_id = ?1 AND id = ?2"),
                [confession_id, id],
                comment_from_row,
            )
            .optional()
        })
        .map(|found| found.map(|stored| stored.comment))
    }

    /// Collection-group lookup by document id across every comments
    /// subcollection. More than one row means the id is ambiguous.
    pub fn comments_with_id(&self, id: &str) -> Result<Vec<StoredComment>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ?1"))?;
            let rows = stmt
                .query_map([id], comment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Collection-group query: approved comments by `author_id` under any
    /// parent.
    pub fn approved_comments_by(&self, author_id: &str) -> Result<Vec<StoredComment>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COMMENT_COLUMNS} FROM comments
                 WHERE author_id = ?1 AND status = 'approved'
                 ORDER BY created_at"
            ))?;
            let rows = stmt
                .query_map([author_id], comment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete_comment(&self, confession_id: &str, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM comments WHERE confession_id = ?1 AND id = ?2",
                [confession_id, id],
            )? > 0)
        })
    }

    // -- Likes --

    pub fn put_like(&self, id: &str, like: &Like) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO likes (id, target_type, target_id, user_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    like.target_type.as_str(),
                    like.target_id,
                    like.user_id,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn delete_like(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM likes WHERE id = ?1", [id])? > 0))
    }

    /// Number of likes on any of `target_ids` ("in" query, at most
    /// [`MAX_IN_VALUES`] ids).
    pub fn count_likes_for_targets(&self, target: LikeTarget, target_ids: &[String]) -> Result<usize> {
        check_in_values(target_ids.len())?;
        if target_ids.is_empty() {
            return Ok(0);
        }

        let mut values = vec![Value::Text(target.as_str().to_string())];
        values.extend(target_ids.iter().map(|id| Value::Text(id.clone())));

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT COUNT(*) FROM likes WHERE target_type = ?1 AND target_id IN ({})",
                placeholders(target_ids.len(), 2)
            );
            let count: i64 = conn.query_row(&sql, params_from_iter(values.iter()), |r| r.get(0))?;
            Ok(count as usize)
        })
    }

    pub fn count_likes_by(&self, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM likes WHERE user_id = ?1", [user_id], |r| r.get(0))?;
            Ok(count as usize)
        })
    }

    // -- Notifications --

    pub fn notifications_for(&self, user_id: &str) -> Result<Vec<InboxEntry>> {
        self.with_conn(|conn| query_notifications(conn, user_id))
    }
}

fn query_notifications(conn: &Connection, user_id: &str) -> Result<Vec<InboxEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, title, body, type, confession_id, comment_id, city_name,
                sender_id, is_read, created_at
         FROM notifications
         WHERE user_id = ?1
         ORDER BY created_at DESC",
    )?;

    let rows = stmt
        .query_map([user_id], |row| {
            let kind: String = row.get(4)?;
            let kind = serde_json::from_value::<NotificationType>(serde_json::Value::String(kind))
                .map_err(|e| conversion_error(4, e))?;
            let created_at: String = row.get(10)?;
            Ok(InboxEntry {
                id: row.get(0)?,
                user_id: row.get(1)?,
                title: row.get(2)?,
                body: row.get(3)?,
                kind,
                confession_id: row.get(5)?,
                comment_id: row.get(6)?,
                city_name: row.get(7)?,
                sender_id: row.get(8)?,
                is_read: row.get(9)?,
                created_at: parse_time(&created_at).unwrap_or_else(Utc::now),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserProfile> {
    let cities: String = row.get(10)?;
    // Elements of an unexpected JSON type (floats, booleans) can never match a
    // probe, so they are dropped instead of failing the whole query.
    let subscribed_cities = serde_json::from_str::<Vec<serde_json::Value>>(&cities)
        .map_err(|e| conversion_error(10, e))?
        .into_iter()
        .filter_map(|v| serde_json::from_value::<CityValue>(v).ok())
        .collect();
    let stats_last_updated: Option<String> = row.get(16)?;

    Ok(UserProfile {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        fcm_token: row.get(3)?,
        notifications_enabled: Preference::from(row.get::<_, Option<bool>>(4)?),
        notify_on_city_confession: Preference::from(row.get::<_, Option<bool>>(5)?),
        notify_on_reply: Preference::from(row.get::<_, Option<bool>>(6)?),
        notify_on_comment: Preference::from(row.get::<_, Option<bool>>(7)?),
        notify_on_like: Preference::from(row.get::<_, Option<bool>>(8)?),
        notify_on_message: Preference::from(row.get::<_, Option<bool>>(9)?),
        subscribed_cities,
        stats: StatCounters {
            confession_count: row.get(11)?,
            total_likes_received: row.get(12)?,
            total_likes_given: row.get(13)?,
            total_comments_given: row.get(14)?,
            total_views_received: row.get(15)?,
        },
        stats_last_updated: stats_last_updated.as_deref().and_then(parse_time),
    })
}

fn confession_from_row(row: &Row<'_>) -> rusqlite::Result<StoredConfession> {
    let plate: Option<String> = row.get(3)?;
    let city_plate_code = plate
        .as_deref()
        .map(serde_json::from_str::<CityValue>)
        .transpose()
        .map_err(|e| conversion_error(3, e))?;
    let status: String = row.get(5)?;
    let created_at: String = row.get(7)?;

    Ok(StoredConfession {
        id: row.get(0)?,
        confession: Confession {
            author_id: row.get(1)?,
            city_name: row.get(2)?,
            city_plate_code,
            content: row.get(4)?,
            status: ApprovalStatus::parse(&status).unwrap_or(ApprovalStatus::Pending),
            view_count: row.get(6)?,
            created_at: parse_time(&created_at),
        },
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<StoredComment> {
    let status: String = row.get(5)?;
    let created_at: String = row.get(6)?;

    Ok(StoredComment {
        confession_id: row.get(0)?,
        id: row.get(1)?,
        comment: Comment {
            parent_id: row.get(2)?,
            author_id: row.get(3)?,
            user_id: None,
            content: row.get(4)?,
            status: ApprovalStatus::parse(&status).unwrap_or(ApprovalStatus::Pending),
            created_at: parse_time(&created_at),
        },
    })
}

fn check_in_values(count: usize) -> Result<()> {
    if count > MAX_IN_VALUES {
        return Err(StoreError::InQueryTooLarge(count));
    }
    Ok(())
}

/// `?start, ?start+1, ...` for `count` parameters.
fn placeholders(count: usize, start: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn conversion_error(idx: usize, e: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
