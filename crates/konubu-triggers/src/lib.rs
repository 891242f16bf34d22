//! Reactions to document lifecycle events: per-user counter maintenance and
//! notification fan-out.
//!
//! [`TriggerRouter`] is the entry point. It is built from an explicit store
//! handle, a push dispatcher and the profile image storage, so tests can run
//! it against an in-memory database and a fake provider.

pub mod audience;
pub mod copy;
pub mod error;
pub mod router;
pub mod stats;
pub mod storage;
pub mod store;

pub use audience::{AudienceResolver, CityAudience, LikedContent, Recipient, Resolution, Skip};
pub use error::{Result, TriggerError};
pub use router::{INBOX_COMMIT_SIZE, TriggerOutcome, TriggerRouter};
pub use stats::{CanonicalSnapshot, StatReconciler, compute_counters};
pub use storage::ProfileImages;
pub use store::Store;
