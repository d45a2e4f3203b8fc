//! LINE channel for the relay.
//!
//! Uses the LINE Messaging API. Messages arrive via webhook (push-based)
//! and are answered through the reply endpoint with the event's reply token.

use crate::message::TextEvent;
use crate::traits::{ChannelError, ChannelResult, ReplySender};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "X-Line-Signature";

/// Default Messaging API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.line.me";

/// Verify a LINE webhook signature.
///
/// The signature is `base64(HMAC-SHA256(channel_secret, body))`. A missing
/// or malformed signature is treated as invalid.
pub fn verify_line_signature(channel_secret: &str, body: &[u8], signature: &str) -> bool {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let Ok(expected) = base64::engine::general_purpose::STANDARD.decode(signature.trim()) else {
        return false;
    };

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(channel_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    // Constant-time comparison
    mac.verify_slice(&expected).is_ok()
}

/// Compute the signature LINE would send for `body`.
pub fn sign_body(channel_secret: &str, body: &[u8]) -> Option<String> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let mut mac = Hmac::<Sha256>::new_from_slice(channel_secret.as_bytes()).ok()?;
    mac.update(body);
    Some(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

// ============================================================================
// Webhook payload
// ============================================================================

#[derive(Debug, Deserialize)]
struct WebhookBody {
    #[serde(default)]
    events: Vec<WebhookEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookEvent {
    #[serde(rename = "type")]
    kind: String,
    reply_token: Option<String>,
    source: Option<EventSource>,
    message: Option<EventMessage>,
    timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventSource {
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventMessage {
    #[serde(rename = "type")]
    kind: String,
    id: Option<String>,
    text: Option<String>,
}

// ============================================================================
// Channel
// ============================================================================

/// LINE channel using the Messaging API.
pub struct LineChannel {
    channel_secret: String,
    access_token: String,
    api_base_url: String,
    client: Client,
}

impl LineChannel {
    /// Create a new LINE channel.
    pub fn new(channel_secret: String, access_token: String) -> Self {
        Self::with_api_base(channel_secret, access_token, DEFAULT_API_BASE.to_string())
    }

    /// Create with a custom API base URL.
    pub fn with_api_base(
        channel_secret: String,
        access_token: String,
        api_base_url: String,
    ) -> Self {
        Self {
            channel_secret,
            access_token,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// Verify the `X-Line-Signature` of a raw webhook body.
    pub fn verify_signature(&self, body: &[u8], signature: &str) -> bool {
        verify_line_signature(&self.channel_secret, body, signature)
    }

    /// Parse a verified webhook body and extract text message events.
    ///
    /// Events other than text messages from an identifiable user are skipped.
    pub fn parse_webhook_payload(&self, body: &[u8]) -> ChannelResult<Vec<TextEvent>> {
        let payload: WebhookBody = serde_json::from_slice(body)
            .map_err(|e| ChannelError::InvalidMessage(format!("Invalid webhook body: {e}")))?;

        let mut events = Vec::new();

        for event in payload.events {
            if event.kind != "message" {
                tracing::debug!("LINE: skipping {} event", event.kind);
                continue;
            }

            let Some(message) = event.message else {
                continue;
            };

            if message.kind != "text" {
                tracing::debug!("LINE: skipping non-text message ({})", message.kind);
                continue;
            }

            let Some(user_id) = event.source.and_then(|s| s.user_id) else {
                tracing::debug!("LINE: skipping message without user id");
                continue;
            };

            let Some(reply_token) = event.reply_token else {
                tracing::warn!("LINE: text message from {user_id} has no reply token");
                continue;
            };

            events.push(TextEvent {
                message_id: message.id.unwrap_or_else(|| "unknown".to_string()),
                user_id,
                reply_token,
                text: message.text.unwrap_or_default(),
                timestamp: event
                    .timestamp
                    .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
                trace_id: relay_common::logging::generate_trace_id(),
            });
        }

        Ok(events)
    }
}

#[async_trait]
impl ReplySender for LineChannel {
    fn name(&self) -> &'static str {
        "line"
    }

    async fn send_reply(&self, reply_token: &str, text: &str) -> ChannelResult<()> {
        let url = format!("{}/v2/bot/message/reply", self.api_base_url);

        let body = serde_json::json!({
            "replyToken": reply_token,
            "messages": [{
                "type": "text",
                "text": text
            }]
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::Connection(format!("LINE reply error: {e}")))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ChannelError::Auth("LINE rejected the channel access token".into()));
        }
        if !status.is_success() {
            let error = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed(format!(
                "LINE API error ({status}): {error}"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_channel() -> LineChannel {
        LineChannel::new("test-secret".into(), "test-token".into())
    }

    #[test]
    fn line_signature_roundtrip() {
        let body = br#"{"events":[]}"#;
        let signature = sign_body("test-secret", body).unwrap();
        assert!(make_channel().verify_signature(body, &signature));
    }

    #[test]
    fn line_signature_rejects_tampered_body() {
        let signature = sign_body("test-secret", br#"{"events":[]}"#).unwrap();
        assert!(!make_channel().verify_signature(br#"{"events":[1]}"#, &signature));
    }

    #[test]
    fn line_signature_rejects_wrong_secret() {
        let body = br#"{"events":[]}"#;
        let signature = sign_body("other-secret", body).unwrap();
        assert!(!make_channel().verify_signature(body, &signature));
    }

    #[test]
    fn line_signature_rejects_missing_or_garbage() {
        let ch = make_channel();
        assert!(!ch.verify_signature(b"{}", ""));
        assert!(!ch.verify_signature(b"{}", "not base64!!"));
    }

    #[test]
    fn line_parse_empty_events() {
        let events = make_channel()
            .parse_webhook_payload(br#"{"destination":"U0","events":[]}"#)
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn line_parse_invalid_json() {
        let err = make_channel().parse_webhook_payload(b"not json").unwrap_err();
        assert!(matches!(err, ChannelError::InvalidMessage(_)));
    }

    #[test]
    fn line_parse_text_message() {
        let payload = serde_json::json!({
            "destination": "Uxxxxxxxx",
            "events": [{
                "type": "message",
                "replyToken": "reply-1",
                "timestamp": 1699999999000i64,
                "source": { "type": "user", "userId": "U123" },
                "message": { "type": "text", "id": "m-1", "text": "こんにちは" }
            }]
        });

        let events = make_channel()
            .parse_webhook_payload(payload.to_string().as_bytes())
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].user_id, "U123");
        assert_eq!(events[0].reply_token, "reply-1");
        assert_eq!(events[0].text, "こんにちは");
        assert_eq!(events[0].message_id, "m-1");
        assert_eq!(events[0].timestamp, 1699999999000);
    }

    #[test]
    fn line_parse_skips_other_events() {
        let payload = serde_json::json!({
            "events": [
                {
                    "type": "follow",
                    "replyToken": "r0",
                    "source": { "type": "user", "userId": "U1" }
                },
                {
                    "type": "message",
                    "replyToken": "r1",
                    "source": { "type": "user", "userId": "U1" },
                    "message": { "type": "sticker", "id": "m1", "packageId": "1", "stickerId": "2" }
                },
                {
                    "type": "message",
                    "replyToken": "r2",
                    "source": { "type": "group", "groupId": "G1" },
                    "message": { "type": "text", "id": "m2", "text": "no user id" }
                },
                {
                    "type": "message",
                    "replyToken": "r3",
                    "source": { "type": "user", "userId": "U2" },
                    "message": { "type": "text", "id": "m3", "text": "kept" }
                }
            ]
        });

        let events = make_channel()
            .parse_webhook_payload(payload.to_string().as_bytes())
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].user_id, "U2");
        assert_eq!(events[0].text, "kept");
    }

    #[tokio::test]
    async fn line_send_reply_posts_reply_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/bot/message/reply"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_json(serde_json::json!({
                "replyToken": "reply-1",
                "messages": [{ "type": "text", "text": "hello" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let ch = LineChannel::with_api_base("s".into(), "test-token".into(), server.uri());
        ch.send_reply("reply-1", "hello").await.unwrap();
    }

    #[tokio::test]
    async fn line_send_reply_reports_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/bot/message/reply"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Invalid reply token"))
            .mount(&server)
            .await;

        let ch = LineChannel::with_api_base("s".into(), "t".into(), server.uri());
        let err = ch.send_reply("expired", "hello").await.unwrap_err();
        assert!(
            matches!(err, ChannelError::SendFailed(ref m) if m.contains("Invalid reply token"))
        );
    }

    #[tokio::test]
    async fn line_send_reply_reports_bad_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let ch = LineChannel::with_api_base("s".into(), "wrong".into(), server.uri());
        let err = ch.send_reply("r", "hello").await.unwrap_err();
        assert!(matches!(err, ChannelError::Auth(_)));
    }
}
