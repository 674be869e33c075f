//! Text-to-speech providers.
//!
//! Provides a trait-based abstraction for TTS providers. A provider turns
//! sanitized text into a stream of audio bytes and classifies failures into
//! [`ConversionError`] variants; writing the stream to disk is left to
//! [`SpeechSynthesizer`](crate::media::SpeechSynthesizer).
//!
//! The only implementation today is [`TranslateTtsProvider`], which speaks
//! the Google Translate `translate_tts` query protocol.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use rand::Rng;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, REFERER};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{TtsBackend, TtsConfig};
use crate::error::ConversionError;

/// Streamed audio body as returned by a provider.
pub type AudioStream = BoxStream<'static, Result<Bytes, ConversionError>>;

/// Voices users can choose between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Voice {
    #[default]
    #[serde(rename = "zh-CN")]
    ZhCn,
    #[serde(rename = "en-US")]
    EnUs,
    #[serde(rename = "ja-JP")]
    JaJp,
    #[serde(rename = "ko-KR")]
    KoKr,
}

impl Voice {
    /// Every selectable voice, in menu order.
    pub const ALL: [Voice; 4] = [Voice::ZhCn, Voice::EnUs, Voice::JaJp, Voice::KoKr];

    /// BCP 47 code, e.g. `en-US`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ZhCn => "zh-CN",
            Self::EnUs => "en-US",
            Self::JaJp => "ja-JP",
            Self::KoKr => "ko-KR",
        }
    }

    /// Name shown in the voice picker.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::ZhCn => "中文女声",
            Self::EnUs => "English Female",
            Self::JaJp => "日本語女声",
            Self::KoKr => "한국어 여성",
        }
    }

    /// Primary language subtag sent to the provider (`en` for `en-US`).
    pub fn language_tag(&self) -> &'static str {
        let code = self.code();
        code.split('-').next().unwrap_or(code)
    }

    /// Parse a voice code, ignoring case.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.code().eq_ignore_ascii_case(code.trim()))
    }
}

impl std::fmt::Display for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Trait for text-to-speech providers.
#[async_trait]
pub trait TtsProvider: Send + Sync {
    /// Start synthesizing `text` and return the audio body as a stream.
    ///
    /// Errors that happen before the body starts (connection failures,
    /// non-success statuses) are returned directly; errors while reading the
    /// body surface as items of the stream.
    async fn open_stream(&self, text: &str, voice: Voice) -> Result<AudioStream, ConversionError>;

    /// Get the provider name.
    fn name(&self) -> &str;
}

/// Build the provider selected by configuration.
pub fn build_provider(config: &TtsConfig) -> Result<Arc<dyn TtsProvider>, reqwest::Error> {
    match config.backend {
        TtsBackend::Translate => Ok(Arc::new(
            TranslateTtsProvider::new(config.api_url.clone(), config.timeout)?
                .with_client_id(config.client_id.clone()),
        )),
    }
}

/// Provider for the `translate_tts` HTTP endpoint.
///
/// Issues `GET <endpoint>?ie=UTF-8&q=..&tl=..&client=..&tk=..` and streams
/// back an MP3 body.
pub struct TranslateTtsProvider {
    client: reqwest::Client,
    endpoint: Url,
    client_id: String,
    timeout: Duration,
}

impl TranslateTtsProvider {
    /// Default anti-throttling client identifier.
    pub const DEFAULT_CLIENT_ID: &'static str = "tw-ob";

    const USER_AGENT: &'static str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
         AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

    /// Create a provider. `timeout` bounds the whole request, body included.
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(Self::USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            client_id: Self::DEFAULT_CLIENT_ID.to_string(),
            timeout,
        })
    }

    /// Set the `client` query parameter.
    pub fn with_client_id(mut self, client_id: String) -> Self {
        self.client_id = client_id;
        self
    }

    /// Query parameters for one request. `tk` is fresh on every call.
    fn query(&self, text: &str, voice: Voice) -> Vec<(&'static str, String)> {
        let token: u32 = rand::thread_rng().gen_range(0..100_000_000);
        vec![
            ("ie", "UTF-8".to_string()),
            ("q", text.to_string()),
            ("tl", voice.language_tag().to_string()),
            ("client", self.client_id.clone()),
            ("idx", "0".to_string()),
            ("total", "1".to_string()),
            ("textlen", text.chars().count().to_string()),
            ("tk", token.to_string()),
        ]
    }

    /// Map a non-success provider status to a conversion error.
    pub fn classify_status(status: StatusCode, body: &str) -> ConversionError {
        match status {
            StatusCode::BAD_REQUEST => ConversionError::SynthesisBadRequest {
                body: body.chars().take(200).collect(),
            },
            StatusCode::TOO_MANY_REQUESTS => ConversionError::SynthesisRateLimited,
            StatusCode::FORBIDDEN => ConversionError::SynthesisForbidden,
            StatusCode::NOT_FOUND => ConversionError::SynthesisUnavailable,
            other => ConversionError::SynthesisGeneric {
                reason: format!("provider returned {}", other),
            },
        }
    }
}

fn classify_transport(err: &reqwest::Error, timeout: Duration) -> ConversionError {
    if err.is_timeout() {
        ConversionError::SynthesisTimeout { timeout }
    } else {
        ConversionError::SynthesisGeneric {
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl TtsProvider for TranslateTtsProvider {
    async fn open_stream(&self, text: &str, voice: Voice) -> Result<AudioStream, ConversionError> {
        let referer = format!("{}/", self.endpoint.origin().ascii_serialization());
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&self.query(text, voice))
            .header(ACCEPT, "*/*")
            .header(REFERER, referer)
            .send()
            .await
            .map_err(|e| classify_transport(&e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                provider = self.name(),
                status = %status,
                body = %body.chars().take(100).collect::<String>(),
                "TTS provider returned an error"
            );
            return Err(Self::classify_status(status, &body));
        }

        let timeout = self.timeout;
        Ok(response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| classify_transport(&e, timeout)))
            .boxed())
    }

    fn name(&self) -> &str {
        "translate_tts"
    }
}
