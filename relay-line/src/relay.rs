//! Conversation relay.
//!
//! Handles the complete message flow for one text event:
//! 1. Validate the input length
//! 2. Append the user turn and trim the session
//! 3. Ask the completion provider for a reply
//! 4. Record the reply and deliver it through the reply sender

use crate::message::{TextEvent, Turn};
use crate::provider::CompletionProvider;
use crate::session::{HistoryPolicy, PromptAssembler, SessionStore};
use crate::traits::ReplySender;
use relay_common::logging::preview;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::Instrument;

/// Reply sent when the completion provider fails.
pub const APOLOGY_MESSAGE: &str =
    "AI応答中に問題が発生しました。しばらくしてからもう一度お試しください。";

/// How a reply was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// The provider answered and the answer was recorded.
    Completed,
    /// The input was refused before reaching the session.
    Rejected,
    /// The provider failed and the apology was substituted.
    Fallback,
}

/// Reply text plus how it was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReply {
    pub text: String,
    pub outcome: ReplyOutcome,
}

/// Ties the session store, policy, prompt, provider, and reply channel together.
pub struct ConversationRelay {
    store: Arc<SessionStore>,
    policy: HistoryPolicy,
    assembler: PromptAssembler,
    provider: Arc<dyn CompletionProvider>,
    sender: Arc<dyn ReplySender>,
}

impl ConversationRelay {
    pub fn new(
        store: Arc<SessionStore>,
        policy: HistoryPolicy,
        assembler: PromptAssembler,
        provider: Arc<dyn CompletionProvider>,
        sender: Arc<dyn ReplySender>,
    ) -> Self {
        Self {
            store,
            policy,
            assembler,
            provider,
            sender,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn policy(&self) -> &HistoryPolicy {
        &self.policy
    }

    /// Produce the reply for one user message.
    ///
    /// The user's session stays locked from the append of the user turn to
    /// the append of the assistant turn, so concurrent messages from the same
    /// user are serialized.
    pub async fn respond(&self, user_id: &str, text: &str) -> RelayReply {
        let text = text.trim();

        if let Err(e) = self.policy.validate(text) {
            tracing::info!(user_id = %user_id, error = %e, "Rejected user input");
            return RelayReply {
                text: self.policy.refusal_message(),
                outcome: ReplyOutcome::Rejected,
            };
        }

        let mut session = self.store.lock(user_id).await;
        session.push(Turn::user(text));
        session.enforce(&self.policy);

        let prompt = self.assembler.build_prompt(session.turns());

        match self.provider.complete(&prompt).await {
            Ok(reply) => {
                session.push(Turn::assistant(reply.clone()));
                tracing::debug!(
                    user_id = %user_id,
                    history_len = session.len(),
                    "Recorded assistant reply"
                );
                RelayReply {
                    text: reply,
                    outcome: ReplyOutcome::Completed,
                }
            }
            Err(e) => {
                let err = relay_common::Error::from(e);
                tracing::error!(
                    user_id = %user_id,
                    provider = %self.provider.name(),
                    error = %err,
                    "Completion failed, sending apology"
                );
                RelayReply {
                    text: APOLOGY_MESSAGE.to_string(),
                    outcome: ReplyOutcome::Fallback,
                }
            }
        }
    }

    /// Respond to a text event and deliver the reply.
    ///
    /// Delivery failures are logged and dropped; reply tokens are single-use
    /// so there is nothing to retry.
    pub async fn process(&self, event: TextEvent) -> RelayReply {
        let span = tracing::info_span!(
            "relay_event",
            trace_id = %event.trace_id,
            user_id = %event.user_id,
            message_id = %event.message_id,
        );

        async move {
            tracing::info!("Message from {}: {}", event.user_id, preview(&event.text));

            let reply = self.respond(&event.user_id, &event.text).await;

            if let Err(e) = self.sender.send_reply(&event.reply_token, &reply.text).await {
                let err = relay_common::Error::from(e);
                tracing::error!(
                    channel = %self.sender.name(),
                    error = %err,
                    "Failed to deliver reply"
                );
            }

            reply
        }
        .instrument(span)
        .await
    }

    /// Spawn the event processor.
    ///
    /// Events from different users run concurrently. Events from one user
    /// are handled strictly in arrival order by that user's worker.
    pub fn spawn_processor(
        relay: Arc<Self>,
        mut rx: mpsc::Receiver<TextEvent>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("Relay processor started");

            let mut workers: HashMap<String, UserWorker> = HashMap::new();

            while let Some(event) = rx.recv().await {
                let event = match workers.get(&event.user_id) {
                    Some(worker) => match worker.tx.send(event) {
                        Ok(()) => continue,
                        // The worker closed its queue; chain a new one behind it
                        Err(mpsc::error::SendError(event)) => event,
                    },
                    None => event,
                };

                workers.retain(|_, worker| !worker.handle.is_finished());

                let user_id = event.user_id.clone();
                let previous = workers.remove(&user_id).map(|worker| worker.handle);
                workers.insert(user_id, UserWorker::spawn(relay.clone(), previous, event));
            }

            for (_, worker) in workers {
                drop(worker.tx);
                let _ = worker.handle.await;
            }

            tracing::info!("Relay processor stopped");
        })
    }
}

/// Sequential event queue for one user.
struct UserWorker {
    tx: mpsc::UnboundedSender<TextEvent>,
    handle: tokio::task::JoinHandle<()>,
}

impl UserWorker {
    /// Start a worker that waits for `previous` before handling `first`.
    fn spawn(
        relay: Arc<ConversationRelay>,
        previous: Option<tokio::task::JoinHandle<()>>,
        first: TextEvent,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }

            relay.process(first).await;
            while let Ok(event) = rx.try_recv() {
                relay.process(event).await;
            }

            // Events that slipped in before the close are still drained here;
            // later sends fail and start a successor worker.
            rx.close();
            while let Some(event) = rx.recv().await {
                relay.process(event).await;
            }
        });

        Self { tx, handle }
    }
}

// ============================================================================
// Tests
// ============================================================================
