//! Document-to-audio conversion pipeline.
//!
//! One [`ConversionPipeline::convert`] call drives a single uploaded document
//! through a fixed sequence of stages:
//!
//! ```text
//! Validating -> Extracting -> Normalizing -> Synthesizing -> Delivering -> Cleaning -> Done
//!      \             \             \               \              \
//!       +-------------+-------------+---------------+--------------+--> Failed(stage, error)
//! ```
//!
//! Stages never repeat and a failure is final for that call; the user
//! resends the document to try again. Conversions for the same session are
//! queued behind each other; different sessions run concurrently.

mod ports;
mod session;

use std::sync::Arc;

pub use ports::{AudioMetadata, FileSource, InboundFile, Notifier, StatusHandle};
pub use session::{SessionId, SessionLocks, SessionTurn, VoicePreferences};

use crate::error::{ConversionError, ConversionFailure};
use crate::media::{AudioArtifact, FileValidator, SpeechSynthesizer, TempStore, TextNormalizer};

/// States of a single conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStage {
    Validating,
    Extracting,
    Normalizing,
    Synthesizing,
    Delivering,
    Cleaning,
    Done,
}

impl ConversionStage {
    /// Status text shown to the user on entering this stage, if any.
    pub fn status_text(&self) -> Option<&'static str> {
        match self {
            Self::Extracting => Some("📝 Processing file..."),
            Self::Synthesizing => Some("🎵 Converting to speech..."),
            Self::Delivering => Some("📤 Sending audio..."),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConversionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Validating => "validating",
            Self::Extracting => "extracting",
            Self::Normalizing => "normalizing",
            Self::Synthesizing => "synthesizing",
            Self::Delivering => "delivering",
            Self::Cleaning => "cleaning",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Message sent once the audio has been delivered.
pub const SUCCESS_MESSAGE: &str = "✅ Conversion complete! Send another file any time.";

/// The single in-chat status message of one conversion. Created on first
/// use, edited in place afterwards. Transport failures here are logged and
/// otherwise ignored.
struct StatusLine<'a> {
    notifier: &'a dyn Notifier,
    session: SessionId,
    handle: Option<StatusHandle>,
}

impl<'a> StatusLine<'a> {
    fn new(notifier: &'a dyn Notifier, session: SessionId) -> Self {
        Self {
            notifier,
            session,
            handle: None,
        }
    }

    async fn show(&mut self, text: &str) {
        let result = match self.handle {
            Some(handle) => self.notifier.edit_status(self.session, handle, text).await,
            None => self
                .notifier
                .send_status(self.session, text)
                .await
                .map(|handle| self.handle = Some(handle)),
        };
        if let Err(e) = result {
            tracing::warn!(session = %self.session, error = %e, "Failed to update status message");
        }
    }

    async fn clear(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.notifier.delete_status(self.session, handle).await {
                tracing::warn!(session = %self.session, error = %e, "Failed to delete status message");
            }
        }
    }

    async fn announce(&self, text: &str) {
        if let Err(e) = self.notifier.send_status(self.session, text).await {
            tracing::warn!(session = %self.session, error = %e, "Failed to send message");
        }
    }
}

/// Orchestrates validation, extraction, normalization, synthesis, delivery
/// and cleanup of uploaded documents.
pub struct ConversionPipeline {
    validator: FileValidator,
    normalizer: TextNormalizer,
    synthesizer: SpeechSynthesizer,
    store: TempStore,
    preferences: VoicePreferences,
    source: Arc<dyn FileSource>,
    notifier: Arc<dyn Notifier>,
    turns: SessionLocks,
}

impl ConversionPipeline {
    pub fn new(
        validator: FileValidator,
        normalizer: TextNormalizer,
        synthesizer: SpeechSynthesizer,
        store: TempStore,
        preferences: VoicePreferences,
        source: Arc<dyn FileSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            validator,
            normalizer,
            synthesizer,
            store,
            preferences,
            source,
            notifier,
            turns: SessionLocks::new(),
        }
    }

    pub fn validator(&self) -> &FileValidator {
        &self.validator
    }

    pub fn preferences(&self) -> &VoicePreferences {
        &self.preferences
    }

    /// Convert `file` into audio and deliver it to `session`.
    ///
    /// On success the returned artifact describes the delivered file, which
    /// has already been removed from the staging directory. On failure the
    /// user has been sent exactly one error message.
    pub async fn convert(
        &self,
        file: InboundFile,
        session: SessionId,
    ) -> Result<AudioArtifact, ConversionFailure> {
        let _turn = self.turns.acquire(session).await;

        tracing::info!(
            session = %session,
            file = %file.name,
            size = file.byte_size,
            "Starting conversion"
        );

        let mut status = StatusLine::new(self.notifier.as_ref(), session);
        let result = self.run(&file, session, &mut status).await;

        match &result {
            Ok(artifact) => {
                status.clear().await;
                status.announce(SUCCESS_MESSAGE).await;
                tracing::info!(
                    session = %session,
                    file = %file.name,
                    size_bytes = artifact.size_bytes,
                    "Conversion complete"
                );
            }
            Err(failure) => {
                status
                    .show(&format!("❌ {}", failure.error.user_message()))
                    .await;
                tracing::warn!(
                    session = %session,
                    file = %file.name,
                    stage = %failure.stage,
                    error = %failure.error,
                    "Conversion failed"
                );
            }
        }

        result
    }

    async fn run(
        &self,
        file: &InboundFile,
        session: SessionId,
        status: &mut StatusLine<'_>,
    ) -> Result<AudioArtifact, ConversionFailure> {
        use ConversionStage::*;

        let failed = |stage: ConversionStage| move |error| ConversionFailure { stage, error };

        self.enter(Validating, session, status).await;
        self.validator.validate(file).map_err(failed(Validating))?;

        self.enter(Extracting, session, status).await;
        let bytes = self
            .source
            .fetch(&file.source_handle)
            .await
            .map_err(|e| ConversionError::DownloadFailed {
                reason: e.to_string(),
            })
            .map_err(failed(Extracting))?;
        // The reported size may be missing or wrong.
        self.validator
            .check_size(bytes.len() as u64)
            .map_err(failed(Extracting))?;
        let raw = String::from_utf8_lossy(&bytes);

        self.enter(Normalizing, session, status).await;
        let text = self
            .normalizer
            .normalize(&raw)
            .map_err(failed(Normalizing))?;

        self.enter(Synthesizing, session, status).await;
        let voice = self.preferences.get(session).await;
        let artifact = self
            .synthesizer
            .synthesize(&text, voice, session)
            .await
            .map_err(failed(Synthesizing))?;

        self.enter(Delivering, session, status).await;
        let metadata = AudioMetadata::for_document(&file.name);
        let delivered = self
            .notifier
            .send_audio(session, &artifact.path, &metadata)
            .await;

        self.enter(Cleaning, session, status).await;
        match self.store.delete(&artifact.path).await {
            Ok(_) => {}
            // The sweeper will get it later.
            Err(e) => tracing::warn!(session = %session, error = %e, "Failed to clean up audio file"),
        }

        delivered
            .map_err(|e| ConversionError::DeliveryFailed {
                reason: e.to_string(),
            })
            .map_err(failed(Delivering))?;

        self.enter(Done, session, status).await;
        Ok(artifact)
    }

    async fn enter(&self, stage: ConversionStage, session: SessionId, status: &mut StatusLine<'_>) {
        tracing::debug!(session = %session, stage = %stage, "Entering stage");
        if let Some(text) = stage.status_text() {
            status.show(text).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_display() {
        assert_eq!(ConversionStage::Validating.to_string(), "validating");
        assert_eq!(ConversionStage::Done.to_string(), "done");
    }

    #[test]
    fn test_status_text_for_user_visible_stages() {
        assert!(ConversionStage::Extracting.status_text().is_some());
        assert!(ConversionStage::Synthesizing.status_text().is_some());
        assert!(ConversionStage::Validating.status_text().is_none());
        assert!(ConversionStage::Cleaning.status_text().is_none());
    }

    #[test]
    fn test_audio_metadata_title() {
        let meta = AudioMetadata::for_document("notes.txt");
        assert_eq!(meta.title, "Converted from: notes.txt");
        assert_eq!(meta.performer, AudioMetadata::PERFORMER);
    }
}
