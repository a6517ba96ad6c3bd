use async_trait::async_trait;
use boostgram_core::notify::Notifier;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::warn;

/// Telegram notifier for the webhook process, which holds its own bot
/// handle. Delivery failures are logged, never propagated.
pub struct TelegramNotifier {
    bot: Bot,
    admin_ids: Vec<i64>,
}

impl TelegramNotifier {
    pub fn new(bot: Bot, admin_ids: Vec<i64>) -> Self {
        Self { bot, admin_ids }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify_user(&self, chat_id: i64, text: &str) {
        if let Err(e) = self
            .bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .await
        {
            warn!(chat_id, "could not deliver notification: {e}");
        }
    }

    async fn notify_operator(&self, text: &str) {
        for admin in &self.admin_ids {
            if let Err(e) = self
                .bot
                .send_message(ChatId(*admin), text)
                .parse_mode(ParseMode::Html)
                .await
            {
                warn!(admin, "could not deliver operator notification: {e}");
            }
        }
    }
}
