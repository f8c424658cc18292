//! OCR through the system `tesseract` executable.

use std::{process::Stdio, sync::OnceLock};

use {
    async_trait::async_trait,
    tokio::process::Command,
    tracing::{debug, info},
};

use crate::{
    TextExtractor,
    error::{Error, Result},
};

const TESSERACT_BIN: &str = "tesseract";

/// OCR backend driving the system tesseract CLI.
///
/// The process holds one long-lived instance. [`initialize`] probes the
/// binary once and records readiness; recognition before that (or after a
/// failed probe) fails with [`Error::NotReady`], so an image arriving early
/// degrades into a user notice instead of a crash.
///
/// [`initialize`]: TesseractExtractor::initialize
pub struct TesseractExtractor {
    /// Language codes joined in tesseract `+` convention, e.g. `eng+rus`.
    languages: String,
    version: OnceLock<String>,
}

impl TesseractExtractor {
    pub fn new(languages: impl Into<String>) -> Self {
        Self {
            languages: languages.into(),
            version: OnceLock::new(),
        }
    }

    /// One-time startup probe: runs `tesseract --version` and records
    /// readiness on success. Safe to call again after a failure.
    pub async fn initialize(&self) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }

        let output = Command::new(TESSERACT_BIN)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::unavailable(format!("{TESSERACT_BIN}: {e}")))?;

        if !output.status.success() {
            return Err(Error::unavailable(format!(
                "{TESSERACT_BIN} --version exited with {}",
                output.status
            )));
        }

        let banner = String::from_utf8_lossy(&output.stdout);
        let version = banner.lines().next().unwrap_or(TESSERACT_BIN).to_string();
        info!(version = %version, languages = %self.languages, "ocr engine ready");
        let _ = self.version.set(version);
        Ok(())
    }

    /// Whether the startup probe has completed successfully.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.version.get().is_some()
    }
}

#[async_trait]
impl TextExtractor for TesseractExtractor {
    async fn recognize(&self, image: &[u8]) -> Result<String> {
        if !self.is_ready() {
            return Err(Error::NotReady);
        }

        // tesseract reads its input from a file; hand the bytes over via a
        // temp file and collect the recognized text from stdout.
        let input = tempfile::NamedTempFile::new()?;
        tokio::fs::write(input.path(), image).await?;

        let output = Command::new(TESSERACT_BIN)
            .arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.languages)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(Error::Engine {
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout)
            .trim()
            .to_string();
        debug!(bytes = image.len(), recognized = text.len(), "ocr pass finished");
        Ok(text)
    }
}
