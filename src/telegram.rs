//! Telegram client using teloxide.

use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, FileId, MessageId, ReplyParameters};
use tracing::{debug, info, warn};

/// Telegram caps message text at 4096 chars.
const MAX_MESSAGE_LENGTH: usize = 4096;

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Send a reply, splitting text that exceeds the Telegram message limit.
    ///
    /// Only the first chunk is attached to the original message.
    pub async fn send_reply(
        &self,
        chat_id: ChatId,
        reply_to_message_id: Option<MessageId>,
        text: &str,
    ) -> Result<(), String> {
        let mut reply_to = reply_to_message_id;
        for chunk in split_text(text, MAX_MESSAGE_LENGTH) {
            let mut request = self.bot.send_message(chat_id, chunk);
            if let Some(msg_id) = reply_to.take() {
                request = request.reply_parameters(ReplyParameters::new(msg_id));
            }
            request.await.map_err(|e| {
                let msg = format!("Failed to send: {e}");
                warn!("{}", msg);
                msg
            })?;
        }
        Ok(())
    }

    /// Show the "typing..." indicator. Failures are not worth surfacing.
    pub async fn send_typing(&self, chat_id: ChatId) {
        if let Err(e) = self.bot.send_chat_action(chat_id, ChatAction::Typing).await {
            debug!("Failed to send typing action: {e}");
        }
    }

    /// Download a voice recording by file_id into memory.
    pub async fn download_voice(&self, file_id: FileId) -> Result<Vec<u8>, String> {
        let file = self
            .bot
            .get_file(file_id)
            .await
            .map_err(|e| format!("Failed to get file info: {e}"))?;

        let mut data = Vec::new();
        self.bot
            .download_file(&file.path, &mut data)
            .await
            .map_err(|e| format!("Failed to download file: {e}"))?;

        info!("Downloaded voice ({} bytes)", data.len());
        Ok(data)
    }
}

/// Split text into chunks of at most `max_len` bytes, on char boundaries,
/// preferring to break at a newline or space.
fn split_text(text: &str, max_len: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while rest.len() > max_len {
        let mut end = max_len;
        while end > 0 && !rest.is_char_boundary(end) {
            end -= 1;
        }
        // Prefer a natural break point in the second half of the chunk
        let window = &rest[..end];
        if let Some(pos) = window.rfind('\n').or_else(|| window.rfind(' '))
            && pos > max_len / 2
        {
            end = pos + 1;
        }
        chunks.push(&rest[..end]);
        rest = &rest[end..];
    }
    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest);
    }
    chunks
}
