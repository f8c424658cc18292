//! Turns inbound text, photos, and documents into prompt text.

use std::sync::Arc;

use codeglass_ocr::TextExtractor;

use crate::error::{Error, Modality, Result};

/// Longest file content forwarded to the model, in characters.
pub const MAX_FILE_CHARS: usize = 16_000;

/// Extensions accepted for uploaded files.
const ALLOWED_EXTENSIONS: &[&str] = &["js", "ts", "py", "rs", "txt"];

/// Outcome of running OCR over an inbound photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    /// The image contained readable text. `text` is echoed back to the user;
    /// `prompt` feeds the exchange.
    Recognized { text: String, prompt: String },
    /// Nothing readable in the image; no exchange runs.
    NoText,
}

/// True when the message is a bot command rather than a prompt.
#[must_use]
pub fn is_command(text: &str) -> bool {
    text.starts_with('/')
}

/// First command token, without the leading slash or a `@botname` suffix.
#[must_use]
pub fn command_name(text: &str) -> Option<&str> {
    let rest = text.strip_prefix('/')?;
    let token = rest.split_whitespace().next()?;
    Some(token.split('@').next().unwrap_or(token))
}

/// True when `file_name` carries one of the accepted extensions.
#[must_use]
pub fn allowed_extension(file_name: &str) -> bool {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
}

/// Cuts `text` after at most `max_chars` characters, on a character boundary.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// Instruction wrapped around recognized screenshot text.
#[must_use]
pub fn image_prompt(text: &str) -> String {
    format!("Analyze this code or error message and explain it:\n\n{text}")
}

/// Instruction wrapped around uploaded file content, truncated to
/// [`MAX_FILE_CHARS`].
#[must_use]
pub fn file_prompt(content: &str) -> String {
    let content = truncate_chars(content, MAX_FILE_CHARS);
    format!("Analyze this source file and explain what it does:\n\n```\n{content}\n```")
}

/// Builds prompt text out of raw inbound payloads.
///
/// Each method produces at most one prompt per event; inputs that should not
/// reach the orchestrator (commands, unreadable images) produce none.
pub struct InputNormalizer {
    extractor: Arc<dyn TextExtractor>,
}

impl InputNormalizer {
    #[must_use]
    pub fn new(extractor: Arc<dyn TextExtractor>) -> Self {
        Self { extractor }
    }

    /// Plain text passes through verbatim; commands produce no prompt.
    #[must_use]
    pub fn text(&self, text: &str) -> Option<String> {
        if is_command(text) {
            None
        } else {
            Some(text.to_string())
        }
    }

    /// Runs OCR over the image and wraps any recognized text in the
    /// explanation instruction. Whitespace-only output counts as no text.
    pub async fn image(&self, image: &[u8]) -> Result<ImageOutcome> {
        let recognized = self
            .extractor
            .recognize(image)
            .await
            .map_err(|e| Error::normalization(Modality::Image, e))?;
        let text = recognized.trim();
        if text.is_empty() {
            return Ok(ImageOutcome::NoText);
        }
        Ok(ImageOutcome::Recognized {
            prompt: image_prompt(text),
            text: text.to_string(),
        })
    }

    /// Wraps fetched file content in the analysis instruction. The caller
    /// gates on [`allowed_extension`] before fetching the content.
    #[must_use]
    pub fn document(&self, content: &[u8]) -> String {
        file_prompt(&String::from_utf8_lossy(content))
    }
}
