use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::message::{DataMap, PushMessage};
use crate::provider::{ErrorCode, PushError, PushProvider};

/// Firebase Cloud Messaging HTTP v1 client.
///
/// Access tokens are minted outside this process and passed in as-is.
pub struct FcmClient {
    http: reqwest::Client,
    endpoint: String,
    access_token: String,
}

impl FcmClient {
    pub fn new(project_id: &str, access_token: impl Into<String>) -> Self {
        Self::with_endpoint(
            format!("https://fcm.googleapis.com/v1/projects/{}/messages:send", project_id),
            access_token,
        )
    }

    pub fn with_endpoint(endpoint: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            access_token: access_token.into(),
        }
    }
}

impl PushProvider for FcmClient {
    async fn send(&self, message: &PushMessage) -> Result<String, PushError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&SendRequest::from(message))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            let sent: SendResponseBody = serde_json::from_str(&body).map_err(|_| PushError::Provider {
                status: status.as_u16(),
                body: body.clone(),
            })?;
            debug!("FCM accepted message {}", sent.name);
            return Ok(sent.name);
        }

        Err(parse_error(status.as_u16(), body))
    }
}

// ── Wire format ─────────────────────────────────────────────────────────

#[derive(Serialize)]
struct SendRequest<'a> {
    message: WireMessage<'a>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    token: &'a str,
    notification: WireNotification<'a>,
    data: &'a DataMap,
    android: WireAndroid<'a>,
    apns: WireApns<'a>,
}

#[derive(Serialize)]
struct WireNotification<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Serialize)]
struct WireAndroid<'a> {
    priority: &'a str,
    notification: WireAndroidNotification<'a>,
}

#[derive(Serialize)]
struct WireAndroidNotification<'a> {
    channel_id: &'a str,
}

#[derive(Serialize)]
struct WireApns<'a> {
    payload: WireApnsPayload<'a>,
}

#[derive(Serialize)]
struct WireApnsPayload<'a> {
    aps: WireAps<'a>,
}

#[derive(Serialize)]
struct WireAps<'a> {
    sound: &'a str,
    badge: u32,
}

impl<'a> From<&'a PushMessage> for SendRequest<'a> {
    fn from(m: &'a PushMessage) -> Self {
        Self {
            message: WireMessage {
                token: &m.token,
                notification: WireNotification {
                    title: &m.notification.title,
                    body: &m.notification.body,
                },
                data: &m.data,
                android: WireAndroid {
                    priority: &m.hints.android_priority,
                    notification: WireAndroidNotification {
                        channel_id: &m.hints.android_channel_id,
                    },
                },
                apns: WireApns {
                    payload: WireApnsPayload {
                        aps: WireAps {
                            sound: &m.hints.apns_sound,
                            badge: m.hints.apns_badge,
                        },
                    },
                },
            },
        }
    }
}

#[derive(Deserialize)]
struct SendResponseBody {
    name: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorStatus,
}

#[derive(Deserialize)]
struct ErrorStatus {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
}

fn parse_error(status: u16, body: String) -> PushError {
    let Ok(parsed) = serde_json::from_str::<ErrorBody>(&body) else {
        return PushError::Provider { status, body };
    };

    // The FCM-specific code in `details` is more precise than the RPC status.
    let raw = parsed
        .error
        .details
        .iter()
        .find_map(|d| d.error_code.clone())
        .unwrap_or_else(|| parsed.error.status.clone());

    PushError::Rejected {
        code: classify(&raw, &parsed.error.message),
        message: parsed.error.message,
    }
}

fn classify(raw: &str, message: &str) -> ErrorCode {
    match raw {
        "UNREGISTERED" | "NOT_FOUND" => ErrorCode::RegistrationTokenNotRegistered,
        "INVALID_ARGUMENT" if message.to_lowercase().contains("registration token") => {
            ErrorCode::InvalidRegistrationToken
        }
        "INVALID_ARGUMENT" => ErrorCode::InvalidArgument,
        "SENDER_ID_MISMATCH" => ErrorCode::SenderIdMismatch,
        "QUOTA_EXCEEDED" => ErrorCode::QuotaExceeded,
        "UNAVAILABLE" => ErrorCode::Unavailable,
        "INTERNAL" => ErrorCode::Internal,
        "THIRD_PARTY_AUTH_ERROR" => ErrorCode::ThirdPartyAuth,
        other => ErrorCode::Other(other.to_string()),
    }
}
