//! Seams between the conversion pipeline and the chat transport.

use std::path::Path;

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::pipeline::SessionId;

/// A document received from the chat transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFile {
    /// Original file name, used for extension checks and the audio title.
    pub name: String,
    /// Size reported by the transport, 0 if it reported none. The
    /// downloaded bytes are checked again.
    pub byte_size: u64,
    /// Transport-specific reference used to fetch the bytes.
    pub source_handle: String,
}

impl InboundFile {
    pub fn new(name: impl Into<String>, byte_size: u64, source_handle: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            byte_size,
            source_handle: source_handle.into(),
        }
    }
}

/// Retrieves the bytes behind an [`InboundFile::source_handle`].
#[async_trait]
pub trait FileSource: Send + Sync {
    async fn fetch(&self, source_handle: &str) -> Result<Vec<u8>, ChannelError>;
}

/// Reference to a status message that can later be edited or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusHandle {
    pub message_id: i64,
}

/// Metadata attached to delivered audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioMetadata {
    pub title: String,
    pub performer: String,
}

impl AudioMetadata {
    pub const PERFORMER: &'static str = "Text to Speech Bot";

    /// Metadata for audio converted from the document named `file_name`.
    pub fn for_document(file_name: &str) -> Self {
        Self {
            title: format!("Converted from: {}", file_name),
            performer: Self::PERFORMER.to_string(),
        }
    }
}

/// Outbound side of the chat transport.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Post a new status message.
    async fn send_status(&self, session: SessionId, text: &str)
    -> Result<StatusHandle, ChannelError>;

    /// Replace the text of an earlier status message.
    async fn edit_status(
        &self,
        session: SessionId,
        handle: StatusHandle,
        text: &str,
    ) -> Result<(), ChannelError>;

    /// Remove an earlier status message.
    async fn delete_status(&self, session: SessionId, handle: StatusHandle)
    -> Result<(), ChannelError>;

    /// Upload the audio file at `path`.
    async fn send_audio(
        &self,
        session: SessionId,
        path: &Path,
        metadata: &AudioMetadata,
    ) -> Result<(), ChannelError>;
}
