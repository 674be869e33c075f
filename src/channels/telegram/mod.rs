//! Telegram Bot API transport.
//!
//! [`TelegramChannel`] is a thin client over the HTTP Bot API: long polling
//! with `getUpdates`, status messages, file download and audio upload. It
//! implements the pipeline's [`Notifier`] and [`FileSource`] ports;
//! [`TelegramBot`] routes incoming updates.

mod bot;
mod types;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use url::Url;

pub use bot::{
    BotCommand, TelegramBot, VOICE_CALLBACK_PREFIX, help_text, hint_text, voice_keyboard,
};
pub use types::{
    ApiResponse, CallbackQuery, Chat, Document, File, InlineKeyboardButton, InlineKeyboardMarkup,
    Message, Update, User,
};

use crate::config::TelegramConfig;
use crate::error::{ChannelError, ConfigError};
use crate::pipeline::{AudioMetadata, FileSource, Notifier, SessionId, StatusHandle};

const CHANNEL_NAME: &str = "telegram";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// HTTP client for one bot.
pub struct TelegramChannel {
    client: reqwest::Client,
    api_base: String,
    token: SecretString,
    poll_timeout: Duration,
}

impl TelegramChannel {
    pub fn new(api_base: &Url, token: SecretString, poll_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.as_str().trim_end_matches('/').to_string(),
            token,
            poll_timeout,
        }
    }

    /// Build from configuration; fails if no bot token is configured.
    pub fn from_config(config: &TelegramConfig) -> Result<Self, ConfigError> {
        let token = config
            .bot_token
            .clone()
            .ok_or_else(|| ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN".to_string()))?;
        Ok(Self::new(&config.api_url, token, config.poll_timeout))
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token.expose_secret(), method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "{}/file/bot{}/{}",
            self.api_base,
            self.token.expose_secret(),
            file_path
        )
    }

    /// Call a JSON Bot API method.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<T, ChannelError> {
        let response = self
            .client
            .post(self.method_url(method))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            // The request URL carries the token.
            .map_err(|e| ChannelError::Http(e.without_url()))?;
        Self::parse(method, response).await
    }

    async fn parse<T: DeserializeOwned>(
        method: &str,
        response: reqwest::Response,
    ) -> Result<T, ChannelError> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ChannelError::Http(e.without_url()))?;

        let envelope: ApiResponse<T> =
            serde_json::from_str(&text).map_err(|e| ChannelError::Api {
                name: CHANNEL_NAME.to_string(),
                code: i64::from(status.as_u16()),
                description: format!("{} returned an unreadable body: {}", method, e),
            })?;

        if envelope.ok {
            return envelope.result.ok_or_else(|| ChannelError::Api {
                name: CHANNEL_NAME.to_string(),
                code: i64::from(status.as_u16()),
                description: format!("{} returned no result", method),
            });
        }

        let code = envelope
            .error_code
            .unwrap_or_else(|| i64::from(status.as_u16()));
        if code == 409 {
            return Err(ChannelError::Conflict {
                name: CHANNEL_NAME.to_string(),
            });
        }
        Err(ChannelError::Api {
            name: CHANNEL_NAME.to_string(),
            code,
            description: envelope
                .description
                .unwrap_or_else(|| format!("{} failed", method)),
        })
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, ChannelError> {
        let mut body = json!({
            "timeout": self.poll_timeout.as_secs(),
            "allowed_updates": ["message", "callback_query"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        self.call("getUpdates", &body, self.poll_timeout + Duration::from_secs(10))
            .await
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message, ChannelError> {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if let Some(markup) = reply_markup {
            body["reply_markup"] = serde_json::to_value(markup).map_err(|e| {
                ChannelError::SendFailed {
                    name: CHANNEL_NAME.to_string(),
                    reason: e.to_string(),
                }
            })?;
        }
        self.call("sendMessage", &body, REQUEST_TIMEOUT).await
    }

    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<(), ChannelError> {
        let body = json!({ "chat_id": chat_id, "message_id": message_id, "text": text });
        self.call::<Value>("editMessageText", &body, REQUEST_TIMEOUT)
            .await
            .map(|_| ())
    }

    pub async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), ChannelError> {
        let body = json!({ "chat_id": chat_id, "message_id": message_id });
        self.call::<Value>("deleteMessage", &body, REQUEST_TIMEOUT)
            .await
            .map(|_| ())
    }

    pub async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> Result<(), ChannelError> {
        let mut body = json!({ "callback_query_id": callback_query_id });
        if let Some(text) = text {
            body["text"] = json!(text);
        }
        self.call::<Value>("answerCallbackQuery", &body, REQUEST_TIMEOUT)
            .await
            .map(|_| ())
    }

    pub async fn get_file(&self, file_id: &str) -> Result<File, ChannelError> {
        self.call("getFile", &json!({ "file_id": file_id }), REQUEST_TIMEOUT)
            .await
    }

    /// Download the bytes of a file previously resolved with `getFile`.
    pub async fn download(&self, file: &File) -> Result<Vec<u8>, ChannelError> {
        let download_err = |reason: String| ChannelError::DownloadFailed {
            file_id: file.file_id.clone(),
            reason,
        };

        let file_path = file
            .file_path
            .as_deref()
            .ok_or_else(|| download_err("no download path returned".to_string()))?;

        let response = self
            .client
            .get(self.file_url(file_path))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| download_err(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(download_err(format!("server returned {}", status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| download_err(e.without_url().to_string()))?;
        Ok(bytes.to_vec())
    }

    /// Upload an MP3 file with `sendAudio`.
    pub async fn send_audio_file(
        &self,
        chat_id: i64,
        path: &Path,
        metadata: &AudioMetadata,
    ) -> Result<(), ChannelError> {
        let send_err = |reason: String| ChannelError::SendFailed {
            name: CHANNEL_NAME.to_string(),
            reason,
        };

        let data = tokio::fs::read(path)
            .await
            .map_err(|e| send_err(format!("Failed to read {}: {}", path.display(), e)))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.mp3".to_string());

        let part = reqwest::multipart::Part::bytes(data)
            .file_name(file_name)
            .mime_str("audio/mpeg")
            .map_err(|e| send_err(format!("Failed to create multipart: {}", e)))?;

        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("title", metadata.title.clone())
            .text("performer", metadata.performer.clone())
            .part("audio", part);

        let response = self
            .client
            .post(self.method_url("sendAudio"))
            .timeout(UPLOAD_TIMEOUT)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.without_url()))?;

        Self::parse::<Value>("sendAudio", response).await.map(|_| ())
    }
}

#[async_trait]
impl Notifier for TelegramChannel {
    async fn send_status(
        &self,
        session: SessionId,
        text: &str,
    ) -> Result<StatusHandle, ChannelError> {
        let message = self.send_message(session.0, text, None).await?;
        Ok(StatusHandle {
            message_id: message.message_id,
        })
    }

    async fn edit_status(
        &self,
        session: SessionId,
        handle: StatusHandle,
        text: &str,
    ) -> Result<(), ChannelError> {
        self.edit_message_text(session.0, handle.message_id, text)
            .await
    }

    async fn delete_status(
        &self,
        session: SessionId,
        handle: StatusHandle,
    ) -> Result<(), ChannelError> {
        self.delete_message(session.0, handle.message_id).await
    }

    async fn send_audio(
        &self,
        session: SessionId,
        path: &Path,
        metadata: &AudioMetadata,
    ) -> Result<(), ChannelError> {
        self.send_audio_file(session.0, path, metadata).await
    }
}

#[async_trait]
impl FileSource for TelegramChannel {
    async fn fetch(&self, source_handle: &str) -> Result<Vec<u8>, ChannelError> {
        let file = self
            .get_file(source_handle)
            .await
            .map_err(|e| ChannelError::DownloadFailed {
                file_id: source_handle.to_string(),
                reason: e.to_string(),
            })?;
        self.download(&file).await
    }
}
