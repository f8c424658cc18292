use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Recognition was requested before the engine finished initializing.
    #[error("ocr engine is not initialized")]
    NotReady,

    #[error("ocr engine unavailable: {message}")]
    Unavailable { message: String },

    #[error("ocr engine failed: {stderr}")]
    Engine { stderr: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
