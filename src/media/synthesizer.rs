//! Speech synthesis into staged audio files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::error::ConversionError;
use crate::media::normalize::{NormalizedText, TRUNCATION_MARKER, TextNormalizer};
use crate::media::temp_store::TempStore;
use crate::media::tts::{AudioStream, TtsProvider, Voice};
use crate::pipeline::SessionId;

/// A synthesized audio file staged on disk, awaiting delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioArtifact {
    pub path: PathBuf,
    pub session: SessionId,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// Sends text to a [`TtsProvider`] and writes the audio into a [`TempStore`].
pub struct SpeechSynthesizer {
    provider: Arc<dyn TtsProvider>,
    normalizer: TextNormalizer,
    store: TempStore,
    max_request_chars: usize,
}

impl SpeechSynthesizer {
    pub fn new(provider: Arc<dyn TtsProvider>, normalizer: TextNormalizer, store: TempStore) -> Self {
        // Room for a full-length normalized text including its marker.
        let max_request_chars = normalizer.max_length() + TRUNCATION_MARKER.chars().count();
        Self {
            provider,
            normalizer,
            store,
            max_request_chars,
        }
    }

    /// Cap the number of characters sent in one provider request.
    pub fn with_max_request_chars(mut self, max: usize) -> Self {
        self.max_request_chars = max;
        self
    }

    /// Synthesize `text` with `voice` into a new staged file for `session`.
    ///
    /// The artifact is returned only once the whole body has been written and
    /// synced. On any failure the partially written file is removed.
    pub async fn synthesize(
        &self,
        text: &NormalizedText,
        voice: Voice,
        session: SessionId,
    ) -> Result<AudioArtifact, ConversionError> {
        let safe = self.normalizer.sanitize(text)?;
        let request_text = self.cap_request(safe.as_str(), session);

        tracing::info!(
            session = %session,
            provider = self.provider.name(),
            voice = %voice,
            chars = request_text.chars().count(),
            preview = %safe.preview(50),
            "Converting text to speech"
        );

        let stream = self.provider.open_stream(request_text, voice).await?;

        let (path, file) = self
            .store
            .allocate(session)
            .await
            .map_err(|e| ConversionError::StorageWriteFailed {
                path: self.store.dir().display().to_string(),
                reason: e.to_string(),
            })?;

        let outcome = match write_stream(&path, file, stream).await {
            Ok(0) => Err(ConversionError::SynthesisGeneric {
                reason: "provider returned an empty audio body".to_string(),
            }),
            other => other,
        };

        match outcome {
            Ok(size_bytes) => {
                tracing::info!(session = %session, path = %path.display(), size_bytes, "Audio file created");
                Ok(AudioArtifact {
                    path,
                    session,
                    created_at: Utc::now(),
                    size_bytes,
                })
            }
            Err(e) => {
                if let Err(cleanup) = self.store.delete(&path).await {
                    tracing::warn!(error = %cleanup, "Failed to remove partial audio file");
                }
                Err(e)
            }
        }
    }

    fn cap_request<'a>(&self, text: &'a str, session: SessionId) -> &'a str {
        match text.char_indices().nth(self.max_request_chars) {
            Some((cut, _)) => {
                tracing::warn!(
                    session = %session,
                    limit = self.max_request_chars,
                    "Text exceeds provider request limit, truncating"
                );
                &text[..cut]
            }
            None => text,
        }
    }
}

/// Write `stream` into `file` (staged at `path`), returning the number of bytes.
async fn write_stream(
    path: &Path,
    mut file: tokio::fs::File,
    mut stream: AudioStream,
) -> Result<u64, ConversionError> {
    let storage_err = |e: std::io::Error| ConversionError::StorageWriteFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    };

    let mut written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await.map_err(storage_err)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(storage_err)?;
    file.sync_all().await.map_err(storage_err)?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use tempfile::TempDir;

    use super::*;

    /// Provider that replays canned chunks and records what it was asked.
    struct ScriptedProvider {
        /// `None` stands for a transport failure at that point of the body.
        chunks: Vec<Option<&'static [u8]>>,
        calls: Mutex<Vec<(String, Voice)>>,
    }

    impl ScriptedProvider {
        fn new(chunks: Vec<Option<&'static [u8]>>) -> Arc<Self> {
            Arc::new(Self {
                chunks,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TtsProvider for ScriptedProvider {
        async fn open_stream(
            &self,
            text: &str,
            voice: Voice,
        ) -> Result<AudioStream, ConversionError> {
            self.calls.lock().unwrap().push((text.to_string(), voice));
            let items: Vec<Result<Bytes, ConversionError>> = self
                .chunks
                .iter()
                .map(|c| match *c {
                    Some(b) => Ok(Bytes::from_static(b)),
                    None => Err(ConversionError::SynthesisGeneric {
                        reason: "connection reset".to_string(),
                    }),
                })
                .collect();
            Ok(futures::stream::iter(items).boxed())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct RefusingProvider;

    #[async_trait]
    impl TtsProvider for RefusingProvider {
        async fn open_stream(&self, _: &str, _: Voice) -> Result<AudioStream, ConversionError> {
            Err(ConversionError::SynthesisRateLimited)
        }

        fn name(&self) -> &str {
            "refusing"
        }
    }

    fn text(raw: &str) -> NormalizedText {
        TextNormalizer::new(5000).normalize(raw).unwrap()
    }

    async fn file_count(dir: &Path) -> usize {
        let mut count = 0;
        if let Ok(mut entries) = tokio::fs::read_dir(dir).await {
            while let Some(_) = entries.next_entry().await.unwrap() {
                count += 1;
            }
        }
        count
    }

    #[tokio::test]
    async fn test_writes_all_chunks() {
        let tmp = TempDir::new().unwrap();
        let provider = ScriptedProvider::new(vec![
            Some(b"ID3".as_slice()),
            Some(b"-frames".as_slice()),
            Some(b"-end".as_slice()),
        ]);
        let synth = SpeechSynthesizer::new(
            provider.clone(),
            TextNormalizer::new(5000),
            TempStore::new(tmp.path()),
        );

        let artifact = synth
            .synthesize(&text("Hello there"), Voice::EnUs, SessionId(9))
            .await
            .unwrap();

        assert_eq!(artifact.session, SessionId(9));
        assert_eq!(artifact.size_bytes, 14);
        let written = tokio::fs::read(&artifact.path).await.unwrap();
        assert_eq!(written, b"ID3-frames-end");
        assert_eq!(
            provider.calls.lock().unwrap().as_slice(),
            &[("Hello there".to_string(), Voice::EnUs)]
        );
    }

    #[tokio::test]
    async fn test_sanitizes_before_dispatch() {
        let tmp = TempDir::new().unwrap();
        let provider = ScriptedProvider::new(vec![Some(b"x".as_slice())]);
        let synth = SpeechSynthesizer::new(
            provider.clone(),
            TextNormalizer::new(5000),
            TempStore::new(tmp.path()),
        );

        synth
            .synthesize(&text("hi 😀 there\u{200B}!"), Voice::ZhCn, SessionId(1))
            .await
            .unwrap();
        assert_eq!(provider.calls.lock().unwrap()[0].0, "hi there!");
    }

    #[tokio::test]
    async fn test_unspeakable_text_never_reaches_provider() {
        let tmp = TempDir::new().unwrap();
        let provider = ScriptedProvider::new(vec![Some(b"x".as_slice())]);
        let synth = SpeechSynthesizer::new(
            provider.clone(),
            TextNormalizer::new(5000),
            TempStore::new(tmp.path()),
        );

        let err = synth
            .synthesize(&text("😀 🎉"), Voice::ZhCn, SessionId(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::EmptyContent));
        assert!(provider.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_request_is_capped() {
        let tmp = TempDir::new().unwrap();
        let provider = ScriptedProvider::new(vec![Some(b"x".as_slice())]);
        let synth = SpeechSynthesizer::new(
            provider.clone(),
            TextNormalizer::new(5000),
            TempStore::new(tmp.path()),
        )
        .with_max_request_chars(4);

        synth
            .synthesize(&text("abcdefgh"), Voice::ZhCn, SessionId(1))
            .await
            .unwrap();
        assert_eq!(provider.calls.lock().unwrap()[0].0, "abcd");
    }

    #[tokio::test]
    async fn test_default_cap_keeps_truncated_text_whole() {
        let tmp = TempDir::new().unwrap();
        let provider = ScriptedProvider::new(vec![Some(b"x".as_slice())]);
        let normalizer = TextNormalizer::new(10);
        let synth =
            SpeechSynthesizer::new(provider.clone(), normalizer.clone(), TempStore::new(tmp.path()));

        let long = normalizer.normalize(&"a".repeat(25)).unwrap();
        synth
            .synthesize(&long, Voice::ZhCn, SessionId(1))
            .await
            .unwrap();
        assert_eq!(
            provider.calls.lock().unwrap()[0].0,
            format!("{}{}", "a".repeat(10), TRUNCATION_MARKER)
        );
    }

    #[tokio::test]
    async fn test_provider_error_leaves_no_file() {
        let tmp = TempDir::new().unwrap();
        let synth = SpeechSynthesizer::new(
            Arc::new(RefusingProvider),
            TextNormalizer::new(5000),
            TempStore::new(tmp.path()),
        );

        let err = synth
            .synthesize(&text("hello"), Voice::ZhCn, SessionId(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::SynthesisRateLimited));
        assert_eq!(file_count(tmp.path()).await, 0);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_removes_partial_file() {
        let tmp = TempDir::new().unwrap();
        let provider = ScriptedProvider::new(vec![Some(b"ID3".as_slice()), None]);
        let synth = SpeechSynthesizer::new(
            provider,
            TextNormalizer::new(5000),
            TempStore::new(tmp.path()),
        );

        let err = synth
            .synthesize(&text("hello"), Voice::ZhCn, SessionId(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::SynthesisGeneric { .. }));
        assert_eq!(file_count(tmp.path()).await, 0);
    }

    #[tokio::test]
    async fn test_empty_body_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let synth = SpeechSynthesizer::new(
            ScriptedProvider::new(vec![]),
            TextNormalizer::new(5000),
            TempStore::new(tmp.path()),
        );

        let err = synth
            .synthesize(&text("hello"), Voice::ZhCn, SessionId(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::SynthesisGeneric { .. }));
        assert_eq!(file_count(tmp.path()).await, 0);
    }

    #[tokio::test]
    async fn test_unwritable_staging_dir_is_storage_failure() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        tokio::fs::write(&blocker, b"file").await.unwrap();

        let synth = SpeechSynthesizer::new(
            ScriptedProvider::new(vec![Some(b"x".as_slice())]),
            TextNormalizer::new(5000),
            TempStore::new(&blocker),
        );

        let err = synth
            .synthesize(&text("hello"), Voice::ZhCn, SessionId(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::StorageWriteFailed { .. }));
    }
}
