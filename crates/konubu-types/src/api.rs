use serde::{Deserialize, Serialize};

use crate::city::CityValue;
use crate::models::StatCounters;

// -- JWT Claims --

/// Claims of the identity tokens accepted by the administrative endpoints.
/// `sub` is the user document id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

// -- Stats --

#[derive(Debug, Serialize, Deserialize)]
pub struct RecalculateResponse {
    pub success: bool,
    pub stats: StatCounters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserReconcileResult {
    pub user_id: String,
    pub username: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<StatCounters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    pub success: bool,
    pub total_users: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub results: Vec<UserReconcileResult>,
}

// -- Debug --

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribedCity {
    pub value: CityValue,
    pub json_type: String,
}

/// Snapshot of the fields that decide whether a user gets notifications.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDebug {
    pub user_id: String,
    pub notifications_enabled: Option<bool>,
    pub notify_on_city_confession: Option<bool>,
    pub subscribed_cities: Vec<SubscribedCity>,
    pub fcm_token_exists: bool,
    pub token_prefix: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
