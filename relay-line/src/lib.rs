//! LINE Relay - LINE Messaging API webhook relay with LLM replies.
//!
//! Receives chat messages from LINE, forwards the user's recent conversation
//! to a chat completion API, and replies with the generated text.
//!
//! ## Architecture
//!
//! ```text
//! LINE → /callback → verify → queue → ConversationRelay → OpenAI
//!                                           ↓
//! LINE ←──────── reply API ←──────── ReplySender
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod line;
pub mod message;
pub mod provider;
pub mod relay;
pub mod routes;
pub mod session;
pub mod traits;

// Re-export commonly used types
pub use line::{sign_body, verify_line_signature, LineChannel, SIGNATURE_HEADER};
pub use message::{ChatMessage, Role, TextEvent, Turn, TurnRole};
pub use provider::{CompletionProvider, OpenAiProvider, ProviderError};
pub use relay::{ConversationRelay, RelayReply, ReplyOutcome, APOLOGY_MESSAGE};
pub use routes::{build_router, create_state, RelayState};
pub use session::{HistoryPolicy, PromptAssembler, SessionStore, DEFAULT_PERSONA};
pub use traits::{ChannelError, ChannelResult, ReplySender};

use relay_common::config::Config;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum accepted webhook body size.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build the relay from configuration.
///
/// Returns the router, the relay itself, and the queue receiver that
/// [`ConversationRelay::spawn_processor`] should drain.
pub fn build_relay(
    config: &Config,
) -> (
    axum::Router,
    Arc<ConversationRelay>,
    tokio::sync::mpsc::Receiver<TextEvent>,
) {
    let line = Arc::new(LineChannel::with_api_base(
        config.line_channel_secret().to_string(),
        config.line_channel_access_token().to_string(),
        config.line.api_base_url.clone(),
    ));

    let provider = Arc::new(OpenAiProvider::with_base_url(
        config.openai_api_key(),
        config.llm.model.clone(),
        config.llm.base_url.clone(),
        Duration::from_secs(config.llm.timeout_secs),
    ));

    let relay = Arc::new(ConversationRelay::new(
        Arc::new(SessionStore::new()),
        HistoryPolicy::from(&config.session),
        PromptAssembler::from_persona(config.relay.persona.as_deref()),
        provider,
        line.clone(),
    ));

    let (state, rx) = create_state(line);
    let router = build_router(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(Duration::from_secs(30)));

    (router, relay, rx)
}

/// Start the relay HTTP server.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let (router, relay, rx) = build_relay(config);

    let store = relay.store().clone();
    let processor_handle = ConversationRelay::spawn_processor(relay, rx);

    let sweeper_handle = config.session.idle_ttl_secs.map(|secs| {
        tracing::info!(idle_ttl_secs = secs, "Idle session eviction enabled");
        SessionStore::spawn_sweeper(store, Duration::from_secs(secs))
    });

    let addr = config.listen_address();
    tracing::info!(
        model = %config.llm.model,
        max_turns = config.session.max_turns,
        max_input_length = config.session.max_input_length,
        "Starting LINE relay on {}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    if let Some(handle) = sweeper_handle {
        handle.abort();
    }
    processor_handle.abort();

    Ok(())
}
