//! The exchange engine.

use std::sync::Arc;

use tracing::{debug, error, warn};

use {
    codeglass_completion::CompletionClient,
    codeglass_transcripts::{ChatKey, TranscriptStore, Turn},
};

use crate::{error::Result, locks::ChatLocks};

/// Reply substituted when the completion service fails. Persisted as a
/// normal assistant turn so the user always gets an answer and the
/// transcript stays well-formed.
pub const COMPLETION_FALLBACK_REPLY: &str =
    "❌ The assistant could not be reached. Please try again later.";

/// Hands a finished reply to the transport layer.
///
/// Implementations schedule the actual sends and return immediately; the
/// exchange does not wait for transport acknowledgments.
pub trait ReplyDelivery: Send + Sync {
    fn deliver(&self, chat: &ChatKey, text: &str);
}

/// Runs one exchange per inbound prompt: transcript in, reply out.
pub struct Orchestrator {
    store: TranscriptStore,
    completion: Arc<dyn CompletionClient>,
    delivery: Arc<dyn ReplyDelivery>,
    locks: ChatLocks,
}

impl Orchestrator {
    pub fn new(
        store: TranscriptStore,
        completion: Arc<dyn CompletionClient>,
        delivery: Arc<dyn ReplyDelivery>,
    ) -> Self {
        Self {
            store,
            completion,
            delivery,
            locks: ChatLocks::new(),
        }
    }

    /// Run one full exchange for `chat`: append the user turn, obtain the
    /// assistant reply, persist both, schedule delivery.
    ///
    /// Completion failures are absorbed into [`COMPLETION_FALLBACK_REPLY`]
    /// (one attempt, no retry); persistence failures are logged and do not
    /// block delivery. Only a failure to read the existing transcript
    /// aborts the exchange, before any turn is appended.
    pub async fn run_exchange(&self, chat: &ChatKey, prompt: String) -> Result<()> {
        // Serialize load-mutate-save per chat so near-simultaneous messages
        // from one chat cannot overwrite each other's turns.
        let _guard = self.locks.acquire(chat).await;

        debug!(chat = %chat, phase = "awaiting_completion", "exchange started");
        let mut transcript = self.store.load(chat).await?;
        transcript.push(Turn::user(prompt));

        let reply = match self.completion.complete(&transcript).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(chat = %chat, error = %e, "completion failed; substituting fallback reply");
                COMPLETION_FALLBACK_REPLY.to_string()
            },
        };

        debug!(chat = %chat, phase = "persisting", "completion finished");
        transcript.push(Turn::assistant(reply.clone()));
        match self.store.save(chat, &transcript).await {
            Ok(()) => debug!(chat = %chat, turns = transcript.len(), "transcript saved"),
            Err(e) => {
                error!(chat = %chat, error = %e, "failed to persist transcript; delivering anyway");
            },
        }

        debug!(chat = %chat, phase = "delivering", "exchange complete");
        self.delivery.deliver(chat, &reply);
        Ok(())
    }
}
