use std::sync::Arc;

use tracing::error;

use konubu_db::Database;

use crate::error::Result;

/// Shared database handle whose calls run off the async runtime.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Run a blocking database call on the blocking thread pool.
    pub async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> konubu_db::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let result = tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                e
            })??;
        Ok(result)
    }
}
