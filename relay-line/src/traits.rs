//! Channel traits for reply delivery.

use async_trait::async_trait;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Channel error type.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

impl From<ChannelError> for relay_common::Error {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::InvalidMessage(msg) => Self::InvalidPayload(msg),
            other => Self::DeliveryFailure(other.to_string()),
        }
    }
}

/// Sends a reply back to the messaging platform.
///
/// Implement this trait to deliver replies through a different transport.
#[async_trait]
pub trait ReplySender: Send + Sync {
    /// Get the channel name.
    fn name(&self) -> &'static str;

    /// Reply to the event identified by `reply_token`.
    async fn send_reply(&self, reply_token: &str, text: &str) -> ChannelResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_error_maps_to_taxonomy() {
        let err: relay_common::Error = ChannelError::SendFailed("boom".into()).into();
        assert!(matches!(err, relay_common::Error::DeliveryFailure(_)));

        let err: relay_common::Error = ChannelError::InvalidMessage("bad json".into()).into();
        assert!(matches!(err, relay_common::Error::InvalidPayload(_)));
    }
}
