//! Telegram front end for codeglass.
//!
//! Runs a manual `getUpdates` long-poll loop, normalizes text, photo, and
//! document messages into prompts for the conversation orchestrator, and
//! relays replies back in paced, bounded-size segments.

pub mod bot;
pub mod delivery;
pub mod dispatch;
pub mod error;
pub mod files;
pub mod normalize;

pub use {
    bot::{build_bot, start_polling},
    delivery::TelegramDelivery,
    dispatch::Dispatcher,
    error::{Error, Modality, Result},
};
