use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] codeglass_transcripts::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
