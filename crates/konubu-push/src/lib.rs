//! Push notification delivery: the provider seam, an FCM HTTP v1 client and
//! the batching dispatcher that turns per-token results into a report.

pub mod dispatcher;
pub mod fcm;
pub mod message;
pub mod provider;

pub use dispatcher::{DispatchReport, Dispatcher, MULTICAST_LIMIT, SingleDelivery};
pub use fcm::FcmClient;
pub use message::{DataMap, DeliveryHints, NotificationContent, PushMessage};
pub use provider::{ErrorCode, PushError, PushProvider, SendResponse};
