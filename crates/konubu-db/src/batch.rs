use chrono::Utc;
use rusqlite::{Transaction, params};
use uuid::Uuid;

use konubu_types::NewNotification;

use crate::{Database, MAX_BATCH_OPS, Result, StoreError};

/// One operation of a batched write.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Add an unread inbox entry with a fresh id.
    InsertNotification(NewNotification),
    /// Drop the user's push token, but only while it is still `token`.
    ClearToken { user_id: String, token: String },
    DeleteUser { user_id: String },
}

impl Database {
    /// Commit `ops` atomically: either every operation applies or none does.
    /// Batches over [`MAX_BATCH_OPS`] are rejected without touching the
    /// database. Returns the number of operations committed.
    pub fn commit_batch(&self, ops: &[WriteOp]) -> Result<usize> {
        if ops.len() > MAX_BATCH_OPS {
            return Err(StoreError::BatchTooLarge(ops.len()));
        }
        if ops.is_empty() {
            return Ok(0);
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for op in ops {
                apply(&tx, op)?;
            }
            tx.commit()?;
            Ok(ops.len())
        })
    }
}

fn apply(tx: &Transaction<'_>, op: &WriteOp) -> Result<()> {
    match op {
        WriteOp::InsertNotification(n) => {
            tx.execute(
                "INSERT INTO notifications
                    (id, user_id, title, body, type, confession_id, comment_id, city_name, sender_id, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10)",
                params![
                    Uuid::new_v4().to_string(),
                    n.user_id,
                    n.title,
                    n.body,
                    n.kind.as_str(),
                    n.confession_id,
                    n.comment_id,
                    n.city_name,
                    n.sender_id,
                    Utc::now().to_rfc3339(),
                ],
            )?;
        }
        WriteOp::ClearToken { user_id, token } => {
            tx.execute(
                "UPDATE users SET fcm_token = NULL WHERE id = ?1 AND fcm_token = ?2",
                [user_id, token],
            )?;
        }
        WriteOp::DeleteUser { user_id } => {
            tx.execute("DELETE FROM users WHERE id = ?1", [user_id])?;
        }
    }
    Ok(())
}
