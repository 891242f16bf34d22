use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::message::{DataMap, DeliveryHints, NotificationContent, PushMessage};
use crate::provider::{ErrorCode, PushError, PushProvider};

/// Provider ceiling on recipients per multicast request.
pub const MULTICAST_LIMIT: usize = 500;

/// Aggregate result of a multicast send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub success_count: usize,
    pub failure_count: usize,
    /// Tokens the provider reported as invalid or unregistered. Removing
    /// them from their owners is the caller's job.
    pub invalid_tokens: Vec<String>,
    /// Requests the provider refused as a whole. Every recipient in them is
    /// counted in `failure_count`.
    pub failed_batches: usize,
}

impl DispatchReport {
    fn merge(&mut self, other: DispatchReport) {
        self.success_count += other.success_count;
        self.failure_count += other.failure_count;
        self.invalid_tokens.extend(other.invalid_tokens);
        self.failed_batches += other.failed_batches;
    }

    fn batch_failed(size: usize) -> Self {
        Self {
            failure_count: size,
            failed_batches: 1,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SingleDelivery {
    Delivered { message_id: String },
    Rejected { code: ErrorCode, invalid_token: bool },
}

/// Sends notifications through a [`PushProvider`]. The dispatcher has no
/// side effects beyond the sends themselves.
pub struct Dispatcher<P> {
    provider: P,
    hints: DeliveryHints,
}

impl<P: PushProvider> Dispatcher<P> {
    pub fn new(provider: P, hints: DeliveryHints) -> Self {
        Self { provider, hints }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Send the same notification to every token, at most
    /// [`MULTICAST_LIMIT`] per request. Requests run concurrently; a refused
    /// request does not discard the results of the others.
    pub async fn send_multicast(
        &self,
        tokens: &[String],
        notification: &NotificationContent,
        data: &DataMap,
    ) -> DispatchReport {
        if tokens.is_empty() {
            debug!("Multicast skipped: no tokens");
            return DispatchReport::default();
        }

        let batches: Vec<Vec<PushMessage>> = tokens
            .chunks(MULTICAST_LIMIT)
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|token| self.message(token, notification, data))
                    .collect()
            })
            .collect();

        let results = join_all(batches.iter().map(|batch| self.provider.send_each(batch))).await;

        let mut report = DispatchReport::default();
        for (batch, result) in batches.iter().zip(results) {
            match result {
                Ok(responses) => report.merge(summarize(batch, responses)),
                Err(e) => {
                    warn!("Multicast batch of {} refused: {}", batch.len(), e);
                    report.merge(DispatchReport::batch_failed(batch.len()));
                }
            }
        }

        info!(
            "Multicast sent in {} batch(es): {} success, {} failed, {} invalid token(s), {} refused batch(es)",
            batches.len(),
            report.success_count,
            report.failure_count,
            report.invalid_tokens.len(),
            report.failed_batches
        );
        report
    }

    /// Send to one token with the same payload shape as a multicast.
    /// A per-recipient refusal is an outcome, not an error.
    pub async fn send_single(
        &self,
        token: &str,
        notification: &NotificationContent,
        data: &DataMap,
    ) -> Result<SingleDelivery, PushError> {
        let message = self.message(token, notification, data);
        match self.provider.send(&message).await {
            Ok(message_id) => Ok(SingleDelivery::Delivered { message_id }),
            Err(PushError::Rejected { code, message }) => {
                warn!("Push rejected ({}): {}", code, message);
                let invalid_token = code.is_invalid_token();
                Ok(SingleDelivery::Rejected { code, invalid_token })
            }
            Err(e) => Err(e),
        }
    }

    fn message(&self, token: &str, notification: &NotificationContent, data: &DataMap) -> PushMessage {
        PushMessage {
            token: token.to_string(),
            notification: notification.clone(),
            data: data.clone(),
            hints: self.hints.clone(),
        }
    }
}

fn summarize(batch: &[PushMessage], responses: Vec<Result<String, PushError>>) -> DispatchReport {
    let mut report = DispatchReport::default();
    for (message, response) in batch.iter().zip(responses) {
        match response {
            Ok(_) => report.success_count += 1,
            Err(e) => {
                report.failure_count += 1;
                if e.code().is_some_and(ErrorCode::is_invalid_token) {
                    report.invalid_tokens.push(message.token.clone());
                } else {
                    debug!("Push to one recipient failed: {}", e);
                }
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Accepts every token except the ones mapped to an error code.
    #[derive(Default)]
    struct FakeProvider {
        refuse: HashMap<String, ErrorCode>,
        /// Refuse the whole request when it contains this token.
        refuse_batch_with: Option<String>,
        batch_sizes: Mutex<Vec<usize>>,
    }

    impl PushProvider for FakeProvider {
        async fn send(&self, message: &PushMessage) -> Result<String, PushError> {
            match self.refuse.get(&message.token) {
                Some(code) => Err(PushError::Rejected {
                    code: code.clone(),
                    message: "refused".into(),
                }),
                None => Ok(format!("msg-{}", message.token)),
            }
        }

        async fn send_each(
            &self,
            messages: &[PushMessage],
        ) -> Result<Vec<Result<String, PushError>>, PushError> {
            self.batch_sizes.lock().unwrap().push(messages.len());
            let refused = self
                .refuse_batch_with
                .as_ref()
                .is_some_and(|token| messages.iter().any(|m| &m.token == token));
            if refused {
                return Err(PushError::Provider {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            let mut out = Vec::with_capacity(messages.len());
            for m in messages {
                out.push(self.send(m).await);
            }
            Ok(out)
        }
    }

    fn tokens(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("t{}", i)).collect()
    }

    fn dispatcher(refuse: &[(&str, ErrorCode)]) -> Dispatcher<FakeProvider> {
        let provider = FakeProvider {
            refuse: refuse
                .iter()
                .map(|(t, c)| (t.to_string(), c.clone()))
                .collect(),
            ..Default::default()
        };
        Dispatcher::new(provider, DeliveryHints::default())
    }

    #[tokio::test]
    async fn splits_into_provider_sized_batches() {
        let d = dispatcher(&[]);
        let report = d
            .send_multicast(&tokens(1201), &NotificationContent::new("t", "b"), &DataMap::new())
            .await;

        assert_eq!(report.success_count, 1201);
        let mut sizes = d.provider().batch_sizes.lock().unwrap().clone();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![201, 500, 500]);
    }

    #[tokio::test]
    async fn only_token_errors_are_marked_invalid() {
        let d = dispatcher(&[
            ("t1", ErrorCode::RegistrationTokenNotRegistered),
            ("t2", ErrorCode::InvalidRegistrationToken),
            ("t3", ErrorCode::Unavailable),
        ]);
        let report = d
            .send_multicast(&tokens(5), &NotificationContent::new("t", "b"), &DataMap::new())
            .await;

        assert_eq!(report.success_count, 2);
        assert_eq!(report.failure_count, 3);
        assert_eq!(report.invalid_tokens, vec!["t1".to_string(), "t2".to_string()]);
    }

    #[tokio::test]
    async fn refused_batch_keeps_other_results() {
        let mut d = dispatcher(&[("t3", ErrorCode::RegistrationTokenNotRegistered)]);
        d.provider.refuse_batch_with = Some("t550".into());

        let report = d
            .send_multicast(&tokens(600), &NotificationContent::new("t", "b"), &DataMap::new())
            .await;

        assert_eq!(report.success_count, 499);
        assert_eq!(report.failure_count, 101);
        assert_eq!(report.invalid_tokens, vec!["t3".to_string()]);
        assert_eq!(report.failed_batches, 1);
    }

    #[tokio::test]
    async fn empty_token_list_sends_nothing() {
        let d = dispatcher(&[]);
        let report = d
            .send_multicast(&[], &NotificationContent::new("t", "b"), &DataMap::new())
            .await;
        assert_eq!(report, DispatchReport::default());
        assert!(d.provider().batch_sizes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn single_send_reports_rejection() {
        let d = dispatcher(&[("gone", ErrorCode::RegistrationTokenNotRegistered)]);
        let content = NotificationContent::new("t", "b");

        let ok = d.send_single("fine", &content, &DataMap::new()).await.unwrap();
        assert_eq!(ok, SingleDelivery::Delivered { message_id: "msg-fine".into() });

        let rejected = d.send_single("gone", &content, &DataMap::new()).await.unwrap();
        assert_eq!(
            rejected,
            SingleDelivery::Rejected {
                code: ErrorCode::RegistrationTokenNotRegistered,
                invalid_token: true,
            }
        );
    }
}
