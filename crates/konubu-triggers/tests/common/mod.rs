#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use konubu_db::Database;
use konubu_push::{
    DeliveryHints, Dispatcher, ErrorCode, PushError, PushMessage, PushProvider, SendResponse,
};
use konubu_triggers::{ProfileImages, TriggerRouter};
use konubu_types::{CityValue, Preference, UserProfile};

/// Provider that records every message and refuses the configured tokens.
#[derive(Default)]
pub struct RecordingProvider {
    refuse: Mutex<HashMap<String, ErrorCode>>,
    sent: Mutex<Vec<PushMessage>>,
    outage: Mutex<bool>,
}

impl RecordingProvider {
    /// Refuse the next multicast request as a whole.
    pub fn fail_next_batch(&self) {
        *self.outage.lock().unwrap() = true;
    }

    pub fn refuse(&self, token: &str, code: ErrorCode) {
        self.refuse.lock().unwrap().insert(token.to_string(), code);
    }

    pub fn sent(&self) -> Vec<PushMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self.sent().into_iter().map(|m| m.token).collect();
        tokens.sort();
        tokens
    }
}

impl PushProvider for RecordingProvider {
    async fn send(&self, message: &PushMessage) -> Result<String, PushError> {
        self.sent.lock().unwrap().push(message.clone());
        match self.refuse.lock().unwrap().get(&message.token) {
            Some(code) => Err(PushError::Rejected {
                code: code.clone(),
                message: "refused by test provider".into(),
            }),
            None => Ok(format!("projects/test/messages/{}", message.token)),
        }
    }

    async fn send_each(&self, messages: &[PushMessage]) -> Result<Vec<SendResponse>, PushError> {
        let outage = std::mem::take(&mut *self.outage.lock().unwrap());
        if outage {
            return Err(PushError::Provider {
                status: 503,
                body: "service unavailable".into(),
            });
        }
        let mut responses = Vec::with_capacity(messages.len());
        for message in messages {
            responses.push(self.send(message).await);
        }
        Ok(responses)
    }
}

pub struct Harness {
    pub db: Arc<Database>,
    pub router: TriggerRouter<RecordingProvider>,
    pub storage: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let storage = tempfile::tempdir().unwrap();
        let router = TriggerRouter::new(
            db.clone(),
            Dispatcher::new(RecordingProvider::default(), DeliveryHints::default()),
            ProfileImages::new(storage.path()),
        );
        Self { db, router, storage }
    }

    pub fn provider(&self) -> &RecordingProvider {
        self.router.dispatcher().provider()
    }

    pub fn user(&self, user: UserProfile) {
        self.db.put_user(&user).unwrap();
    }
}

/// User with notifications on and the given token and city subscriptions.
pub fn user(id: &str, token: Option<&str>, cities: Vec<CityValue>) -> UserProfile {
    UserProfile {
        id: id.to_string(),
        username: Some(format!("{}-name", id)),
        fcm_token: token.map(str::to_string),
        notifications_enabled: Preference::Enabled,
        subscribed_cities: cities,
        ..Default::default()
    }
}
