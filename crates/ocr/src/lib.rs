//! Text extraction from images.
//!
//! [`TextExtractor`] is the uniform async seam consumed by the message
//! pipeline; [`TesseractExtractor`] drives the system tesseract binary, and
//! [`MockExtractor`] returns canned results for tests.

pub mod error;
pub mod tesseract;

pub use {
    error::{Error, Result},
    tesseract::TesseractExtractor,
};

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

/// Extracts text from raw image bytes.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Recognize text in `image`. The extracted text may be empty when the
    /// image contains none.
    async fn recognize(&self, image: &[u8]) -> Result<String>;
}

/// Deterministic extractor for tests: returns canned text (or a canned
/// failure) and counts invocations.
#[derive(Debug)]
pub struct MockExtractor {
    response: Option<String>,
    calls: AtomicUsize,
}

impl MockExtractor {
    pub fn with_text(text: &str) -> Self {
        Self {
            response: Some(text.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Simulates an image with no recognizable text.
    pub fn empty() -> Self {
        Self::with_text("")
    }

    /// Simulates an extractor whose initialization never completed.
    pub fn failing() -> Self {
        Self {
            response: None,
            calls: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextExtractor for MockExtractor {
    async fn recognize(&self, _image: &[u8]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.response {
            Some(text) => Ok(text.clone()),
            None => Err(Error::NotReady),
        }
    }
}
