pub mod api;
pub mod city;
pub mod events;
pub mod models;
pub mod preference;

pub use city::{CityCode, CityValue, InvalidCityCode};
pub use events::{DocumentPath, TriggerEvent};
pub use models::{
    ApprovalStatus, Comment, Confession, Like, LikeTarget, NewNotification, NotificationType,
    PrivateMessage, StatCounters, UserProfile,
};
pub use preference::{NotificationCategory, Preference};
