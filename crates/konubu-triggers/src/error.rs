use thiserror::Error;

use konubu_db::StoreError;
use konubu_push::PushError;

/// Failures surfaced to whoever delivered the event, so it can retry.
///
/// Missing documents, opted-out users and similar business-logic absences
/// are not errors; they end up as a skip reason in the outcome.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("push: {0}")]
    Push(#[from] PushError),

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// The provider refused whole multicast requests; the broadcast should
    /// be delivered again.
    #[error("broadcast of {confession_id} incomplete: {failed_batches} request(s) refused")]
    BroadcastIncomplete {
        confession_id: String,
        failed_batches: usize,
    },
}

pub type Result<T> = std::result::Result<T, TriggerError>;
