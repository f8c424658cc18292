//! Paced segment delivery back to Telegram.

use std::time::Duration;

use {
    teloxide::{payloads::SendMessageSetters, prelude::*, types::ParseMode},
    tracing::{debug, warn},
};

use {codeglass_chat::ReplyDelivery, codeglass_transcripts::ChatKey};

use crate::error::Result;

/// Longest segment sent as one message, with headroom below Telegram's
/// 4096-character cap.
pub const MAX_SEGMENT_CHARS: usize = 4000;

/// Delay step between consecutive segments of one reply.
pub const SEGMENT_PACING: Duration = Duration::from_millis(500);

/// Splits `text` into in-order segments of at most `max_chars` characters.
///
/// Cuts fall on character boundaries and concatenating the segments
/// reproduces `text` exactly. The empty string yields no segments.
#[must_use]
pub fn split_segments(text: &str, max_chars: usize) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut length = 0;
    for ch in text.chars() {
        current.push(ch);
        length += 1;
        if length == max_chars {
            segments.push(std::mem::take(&mut current));
            length = 0;
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Sends one message with Markdown rendering, falling back to plain text
/// when Telegram rejects the markup.
pub(crate) async fn send_markdown(bot: &Bot, chat_id: ChatId, text: &str) -> Result<()> {
    match bot
        .send_message(chat_id, text)
        .parse_mode(ParseMode::Markdown)
        .await
    {
        Ok(_) => Ok(()),
        Err(teloxide::RequestError::Api(api_error)) => {
            debug!(error = %api_error, "markdown rejected, resending as plain text");
            bot.send_message(chat_id, text).await?;
            Ok(())
        },
        Err(e) => Err(e.into()),
    }
}

/// Sends orchestrator replies through the Telegram Bot API.
///
/// Each segment runs on its own spawned task, delayed in proportion to its
/// index. The caller never waits for transport acknowledgments, and one
/// failed segment does not stop the rest.
pub struct TelegramDelivery {
    bot: Bot,
}

impl TelegramDelivery {
    #[must_use]
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

impl ReplyDelivery for TelegramDelivery {
    fn deliver(&self, chat: &ChatKey, text: &str) {
        let Ok(chat_id) = chat.as_str().parse::<i64>().map(ChatId) else {
            warn!(chat = %chat, "chat key is not a numeric chat id, dropping reply");
            return;
        };

        let segments = split_segments(text, MAX_SEGMENT_CHARS);
        debug!(chat = %chat, segments = segments.len(), "scheduling reply segments");
        for (index, segment) in segments.into_iter().enumerate() {
            let bot = self.bot.clone();
            let chat = chat.clone();
            tokio::spawn(async move {
                tokio::time::sleep(SEGMENT_PACING * index as u32).await;
                if let Err(e) = send_markdown(&bot, chat_id, &segment).await {
                    warn!(chat = %chat, segment = index, error = %e, "reply segment failed");
                }
            });
        }
    }
}
