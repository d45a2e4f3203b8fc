//! Error types for the LINE relay.

use thiserror::Error;

/// Result type alias using the relay error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the relay.
///
/// Only `Config` is fatal, and only at startup. Everything else is handled
/// per request: the webhook is rejected, the turn is refused, a fallback
/// reply is substituted, or the failure is logged and dropped.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (missing secrets, unreadable config file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Webhook signature did not match the channel secret
    #[error("Invalid webhook signature")]
    SignatureInvalid,

    /// Webhook body passed verification but could not be handled
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// User input exceeds the configured character limit
    #[error("Input too long: {len} chars (max {max})")]
    InputTooLong { len: usize, max: usize },

    /// Completion provider failed to produce a reply
    #[error("Completion failed: {0}")]
    CompletionFailure(String),

    /// Reply could not be delivered to the messaging platform
    #[error("Delivery failed: {0}")]
    DeliveryFailure(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Check if this is a signature error.
    pub const fn is_signature_invalid(&self) -> bool {
        matches!(self, Self::SignatureInvalid)
    }

    /// Get HTTP status code for this error.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::SignatureInvalid | Self::InputTooLong { .. } => 400,
            Self::CompletionFailure(_) | Self::DeliveryFailure(_) => 502,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(Error::SignatureInvalid.status_code(), 400);
        assert_eq!(Error::InputTooLong { len: 501, max: 500 }.status_code(), 400);
        assert_eq!(Error::InvalidPayload("bad".into()).status_code(), 500);
        assert_eq!(Error::CompletionFailure("down".into()).status_code(), 502);
        assert_eq!(Error::Config("missing".into()).status_code(), 500);
    }

    #[test]
    fn test_input_too_long_message() {
        let err = Error::InputTooLong { len: 501, max: 500 };
        assert_eq!(err.to_string(), "Input too long: 501 chars (max 500)");
        assert!(!err.is_signature_invalid());
        assert!(Error::SignatureInvalid.is_signature_invalid());
    }
}
