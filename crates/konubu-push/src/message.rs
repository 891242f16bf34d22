use std::collections::BTreeMap;

use serde::Serialize;

/// String-keyed data payload delivered alongside the visible notification.
pub type DataMap = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
}

impl NotificationContent {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Platform delivery hints. They are opaque to the dispatcher and copied
/// into every message unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryHints {
    pub android_priority: String,
    pub android_channel_id: String,
    pub apns_sound: String,
    pub apns_badge: u32,
}

impl DeliveryHints {
    pub fn with_channel(channel_id: impl Into<String>) -> Self {
        Self {
            android_channel_id: channel_id.into(),
            ..Self::default()
        }
    }
}

impl Default for DeliveryHints {
    fn default() -> Self {
        Self {
            android_priority: "high".into(),
            android_channel_id: "konubu_channel".into(),
            apns_sound: "default".into(),
            apns_badge: 1,
        }
    }
}

/// A single-recipient message. Multicast sends are expanded into one
/// message per token with identical payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub token: String,
    pub notification: NotificationContent,
    pub data: DataMap,
    pub hints: DeliveryHints,
}
