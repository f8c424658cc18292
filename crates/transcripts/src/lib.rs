//! Per-chat conversation transcripts.
//!
//! One pretty-printed JSON document per chat at
//! `<sessions-dir>/<chat>.json`, holding the ordered `{role, content}` turn
//! sequence. Documents are replaced whole on save, under an exclusive
//! advisory file lock.

pub mod error;
pub mod model;
pub mod store;

pub use {
    error::{Error, Result},
    model::{ChatKey, Role, Transcript, Turn},
    store::TranscriptStore,
};
