use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("DB: running migration v1 (initial schema)");
        conn.execute_batch(
            "
            -- Notification toggles are NULL when never set.
            -- subscribed_cities is a JSON array of integers and/or strings.
            CREATE TABLE users (
                id                          TEXT PRIMARY KEY,
                username                    TEXT,
                email                       TEXT,
                fcm_token                   TEXT,
                notifications_enabled       INTEGER,
                notify_on_city_confession   INTEGER,
                notify_on_reply             INTEGER,
                notify_on_comment           INTEGER,
                notify_on_like              INTEGER,
                notify_on_message           INTEGER,
                subscribed_cities           TEXT NOT NULL DEFAULT '[]',
                confession_count            INTEGER NOT NULL DEFAULT 0,
                total_likes_received        INTEGER NOT NULL DEFAULT 0,
                total_likes_given           INTEGER NOT NULL DEFAULT 0,
                total_comments_given        INTEGER NOT NULL DEFAULT 0,
                total_views_received        INTEGER NOT NULL DEFAULT 0,
                stats_last_updated          TEXT
            );

            CREATE INDEX idx_users_token ON users(fcm_token);

            CREATE TABLE confessions (
                id                      TEXT PRIMARY KEY,
                author_id               TEXT,
                city_name               TEXT,
                city_plate_code         TEXT,
                content                 TEXT NOT NULL DEFAULT '',
                status                  TEXT NOT NULL DEFAULT 'approved',
                view_count              INTEGER NOT NULL DEFAULT 0,
                created_at              TEXT NOT NULL,
                approval_notified_at    TEXT
            );

            CREATE INDEX idx_confessions_author ON confessions(author_id, status);

            -- Comments are keyed by their parent path, not by id alone.
            CREATE TABLE comments (
                confession_id   TEXT NOT NULL,
                id              TEXT NOT NULL,
                parent_id       TEXT,
                author_id       TEXT,
                content         TEXT NOT NULL DEFAULT '',
                status          TEXT NOT NULL DEFAULT 'approved',
                created_at      TEXT NOT NULL,
                PRIMARY KEY (confession_id, id)
            );

            CREATE INDEX idx_comments_id ON comments(id);
            CREATE INDEX idx_comments_author ON comments(author_id, status);

            CREATE TABLE likes (
                id          TEXT PRIMARY KEY,
                target_type TEXT NOT NULL,
                target_id   TEXT NOT NULL,
                user_id     TEXT,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_likes_target ON likes(target_type, target_id);
            CREATE INDEX idx_likes_user ON likes(user_id);

            CREATE TABLE notifications (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL,
                title           TEXT NOT NULL,
                body            TEXT NOT NULL,
                type            TEXT NOT NULL,
                confession_id   TEXT,
                comment_id      TEXT,
                city_name       TEXT,
                sender_id       TEXT,
                is_read         INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_notifications_user ON notifications(user_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
