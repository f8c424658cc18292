//! Conversation orchestration.
//!
//! One exchange = load transcript → append user turn → completion call →
//! append assistant turn → persist → hand off to delivery. Completion
//! failures are absorbed into a fixed fallback reply; persistence failures
//! are logged and never block delivery. Exchanges for the same chat are
//! serialized through a per-key lock map.

pub mod error;
pub mod locks;
pub mod orchestrator;

pub use {
    error::{Error, Result},
    locks::ChatLocks,
    orchestrator::{COMPLETION_FALLBACK_REPLY, Orchestrator, ReplyDelivery},
};
