//! Update routing: commands, voice picker callbacks and document uploads.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::channels::telegram::TelegramChannel;
use crate::channels::telegram::types::{
    CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, Message, Update,
};
use crate::error::ChannelError;
use crate::media::Voice;
use crate::pipeline::{ConversionPipeline, InboundFile, SessionId};

/// Callback data prefix of voice picker buttons, e.g. `voice_en-US`.
pub const VOICE_CALLBACK_PREFIX: &str = "voice_";

/// Reply to `/start` and `/help`, listing the accepted file types.
pub fn help_text(extensions: &[String]) -> String {
    format!(
        "🎵 Text-to-Speech Bot

Send me a text document and I will read it aloud for you.

Supported files: {}
Voices: Chinese, English, Japanese, Korean

Commands:
/start - show this message
/voice - choose the voice
/help - show this message

Send a file to get started! 📁",
        extensions.join(", ")
    )
}

/// Reply to plain text that is not a command.
pub fn hint_text(extensions: &[String]) -> String {
    format!(
        "Please send a text file ({}) to convert it to speech. \
         Use /voice to choose a voice or /help for more.",
        extensions.join(", ")
    )
}

/// Slash commands the bot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Help,
    Voice,
}

impl BotCommand {
    /// Parse `/name`, `/name@bot_username` and `/name args`, ignoring case.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?;
        let name = word.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);
        match name.to_ascii_lowercase().as_str() {
            "start" => Some(Self::Start),
            "help" => Some(Self::Help),
            "voice" => Some(Self::Voice),
            _ => None,
        }
    }
}

/// One button per voice, one voice per row.
pub fn voice_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: Voice::ALL
            .iter()
            .map(|voice| {
                vec![InlineKeyboardButton {
                    text: voice.display_name().to_string(),
                    callback_data: format!("{}{}", VOICE_CALLBACK_PREFIX, voice.code()),
                }]
            })
            .collect(),
    }
}

/// Polls for updates and routes them.
pub struct TelegramBot {
    api: Arc<TelegramChannel>,
    pipeline: Arc<ConversionPipeline>,
    help: String,
    hint: String,
    /// Next update id to request. Survives poller restarts.
    offset: AtomicI64,
}

impl TelegramBot {
    pub fn new(api: Arc<TelegramChannel>, pipeline: Arc<ConversionPipeline>) -> Self {
        let extensions = pipeline.validator().allowed_extensions();
        let help = help_text(extensions);
        let hint = hint_text(extensions);
        Self {
            api,
            pipeline,
            help,
            hint,
            offset: AtomicI64::new(0),
        }
    }

    /// Long-poll forever. Returns only on a transport error; the caller
    /// decides whether to restart.
    pub async fn run(&self) -> Result<(), ChannelError> {
        tracing::info!("Polling for Telegram updates");
        loop {
            let offset = match self.offset.load(Ordering::SeqCst) {
                0 => None,
                n => Some(n),
            };
            for update in self.api.get_updates(offset).await? {
                self.offset.fetch_max(update.update_id + 1, Ordering::SeqCst);
                self.dispatch(update).await;
            }
        }
    }

    /// Route one update. Never fails; transport errors are logged.
    pub async fn dispatch(&self, update: Update) {
        if let Some(query) = update.callback_query {
            self.on_callback(query).await;
        } else if let Some(message) = update.message {
            self.on_message(message).await;
        }
    }

    async fn on_message(&self, message: Message) {
        let chat_id = message.chat.id;

        if let Some(document) = message.document {
            let file = InboundFile::new(
                document.file_name.unwrap_or_else(|| "document".to_string()),
                document.file_size.unwrap_or(0),
                document.file_id,
            );
            let pipeline = Arc::clone(&self.pipeline);
            // Conversions run off the polling loop; per-session ordering is
            // kept by the pipeline.
            tokio::spawn(async move {
                let _ = pipeline.convert(file, SessionId(chat_id)).await;
            });
            return;
        }

        let Some(text) = message.text else {
            return;
        };

        let result = match BotCommand::parse(&text) {
            Some(BotCommand::Start) | Some(BotCommand::Help) => {
                self.api.send_message(chat_id, &self.help, None).await
            }
            Some(BotCommand::Voice) => {
                self.api
                    .send_message(chat_id, "Choose a voice:", Some(&voice_keyboard()))
                    .await
            }
            None => self.api.send_message(chat_id, &self.hint, None).await,
        };
        if let Err(e) = result {
            tracing::warn!(chat_id, error = %e, "Failed to reply to message");
        }
    }

    async fn on_callback(&self, query: CallbackQuery) {
        let Some(data) = query.data.as_deref() else {
            return;
        };
        let Some(code) = data.strip_prefix(VOICE_CALLBACK_PREFIX) else {
            tracing::debug!(data, "Ignoring unknown callback");
            return;
        };
        let chat_id = query
            .message
            .as_ref()
            .map(|m| m.chat.id)
            .unwrap_or(query.from.id);

        let Some(voice) = Voice::from_code(code) else {
            if let Err(e) = self
                .api
                .answer_callback_query(&query.id, Some("Unknown voice"))
                .await
            {
                tracing::warn!(chat_id, error = %e, "Failed to answer callback");
            }
            return;
        };

        self.pipeline
            .preferences()
            .set(SessionId(chat_id), voice)
            .await;
        tracing::info!(chat_id, voice = %voice, "Voice selected");

        if let Err(e) = self.api.answer_callback_query(&query.id, None).await {
            tracing::warn!(chat_id, error = %e, "Failed to answer callback");
        }
        let confirmation = format!(
            "✅ Voice selected: {}\n\nNow send a text file to convert!",
            voice.display_name()
        );
        if let Err(e) = self.api.send_message(chat_id, &confirmation, None).await {
            tracing::warn!(chat_id, error = %e, "Failed to confirm voice selection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(BotCommand::parse("/start"), Some(BotCommand::Start));
        assert_eq!(BotCommand::parse("/HELP"), Some(BotCommand::Help));
        assert_eq!(BotCommand::parse("/voice@tts_bot"), Some(BotCommand::Voice));
        assert_eq!(BotCommand::parse("  /voice en"), Some(BotCommand::Voice));
        assert_eq!(BotCommand::parse("/unknown"), None);
        assert_eq!(BotCommand::parse("hello /start"), None);
        assert_eq!(BotCommand::parse(""), None);
    }

    #[test]
    fn test_help_lists_configured_types() {
        let types = vec![".txt".to_string(), ".csv".to_string()];
        let help = help_text(&types);
        assert!(help.contains("Supported files: .txt, .csv"));
        assert!(!help.contains(".rtf"));
        assert!(hint_text(&types).starts_with("Please send a text file (.txt, .csv) to convert"));
    }

    #[test]
    fn test_voice_keyboard_lists_every_voice() {
        let keyboard = voice_keyboard();
        assert_eq!(keyboard.inline_keyboard.len(), Voice::ALL.len());
        assert_eq!(keyboard.inline_keyboard[0][0].callback_data, "voice_zh-CN");
        for row in &keyboard.inline_keyboard {
            let code = row[0]
                .callback_data
                .strip_prefix(VOICE_CALLBACK_PREFIX)
                .unwrap();
            assert!(Voice::from_code(code).is_some());
        }
    }
}
