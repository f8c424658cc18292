//! Chat-completion service client.
//!
//! [`CompletionClient`] is the seam the conversation engine talks through;
//! [`DeepSeekClient`] implements it against any OpenAI-compatible
//! `/chat/completions` endpoint (DeepSeek by default).

pub mod deepseek;
pub mod error;

pub use {
    deepseek::{DEFAULT_API_BASE, DEFAULT_MODEL, DeepSeekClient},
    error::{Error, Result},
};

use {async_trait::async_trait, codeglass_transcripts::Turn};

/// Turns an accumulated transcript into one assistant reply.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Complete the conversation. `transcript` is replayed verbatim as the
    /// `messages` array, newest turn last. A single attempt is made; the
    /// caller decides what a failure means.
    async fn complete(&self, transcript: &[Turn]) -> Result<String>;
}

/// Process-wide HTTP client shared by completion calls.
pub fn shared_http_client() -> &'static reqwest::Client {
    static CLIENT: std::sync::LazyLock<reqwest::Client> =
        std::sync::LazyLock::new(reqwest::Client::new);
    &CLIENT
}
