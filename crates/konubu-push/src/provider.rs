use std::fmt;
use std::future::Future;

use futures_util::future::join_all;
use thiserror::Error;

use crate::message::PushMessage;

/// Machine-readable reason a provider refused a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidRegistrationToken,
    RegistrationTokenNotRegistered,
    InvalidArgument,
    SenderIdMismatch,
    QuotaExceeded,
    Unavailable,
    Internal,
    ThirdPartyAuth,
    Other(String),
}

impl ErrorCode {
    /// Errors that mean the token will never work again and should be
    /// removed from its owner.
    pub fn is_invalid_token(&self) -> bool {
        matches!(
            self,
            Self::InvalidRegistrationToken | Self::RegistrationTokenNotRegistered
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::InvalidRegistrationToken => "messaging/invalid-registration-token",
            Self::RegistrationTokenNotRegistered => "messaging/registration-token-not-registered",
            Self::InvalidArgument => "messaging/invalid-argument",
            Self::SenderIdMismatch => "messaging/mismatched-credential",
            Self::QuotaExceeded => "messaging/message-rate-exceeded",
            Self::Unavailable => "messaging/server-unavailable",
            Self::Internal => "messaging/internal-error",
            Self::ThirdPartyAuth => "messaging/third-party-auth-error",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PushError {
    /// The provider answered and refused this recipient.
    #[error("push rejected ({code}): {message}")]
    Rejected { code: ErrorCode, message: String },

    /// The provider answered with something that is not a recognizable error.
    #[error("push provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("push transport: {0}")]
    Transport(#[from] reqwest::Error),
}

impl PushError {
    pub fn code(&self) -> Option<&ErrorCode> {
        match self {
            Self::Rejected { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// Per-recipient outcome: the provider's message id, or why it failed.
pub type SendResponse = Result<String, PushError>;

/// Seam to the push delivery provider.
pub trait PushProvider: Send + Sync {
    /// Send one message to one token.
    fn send(&self, message: &PushMessage) -> impl Future<Output = Result<String, PushError>> + Send;

    /// Send every message and report each recipient separately, in input
    /// order. An outer error means the whole batch was refused.
    fn send_each(
        &self,
        messages: &[PushMessage],
    ) -> impl Future<Output = Result<Vec<SendResponse>, PushError>> + Send {
        async move { Ok(join_all(messages.iter().map(|m| self.send(m))).await) }
    }
}
