//! Error types for ttsrelay.

use std::time::Duration;

use crate::pipeline::ConversionStage;

/// Top-level error type for service startup.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Chat transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Failed to download file {file_id}: {reason}")]
    DownloadFailed { file_id: String, reason: String },

    #[error("Channel {name} API error {code}: {description}")]
    Api {
        name: String,
        code: i64,
        description: String,
    },

    #[error("Another instance of {name} is polling for updates")]
    Conflict { name: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Staging directory errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to prepare staging directory {path}: {source}")]
    PrepareDir {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to create {path}: {source}")]
    Create {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to delete {path}: {source}")]
    Delete {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to list staging directory {path}: {source}")]
    List {
        path: String,
        source: std::io::Error,
    },
}

/// Reasons a document-to-audio conversion can fail.
///
/// Every variant is terminal for the conversion that produced it.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("File too large: {size} bytes exceeds {max} byte limit")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Unsupported file format: {file_name}")]
    UnsupportedFormat {
        file_name: String,
        allowed: Vec<String>,
    },

    #[error("No text content left after normalization")]
    EmptyContent,

    #[error("Failed to download inbound file: {reason}")]
    DownloadFailed { reason: String },

    #[error("Speech synthesis timed out after {timeout:?}")]
    SynthesisTimeout { timeout: Duration },

    #[error("Speech provider rejected the request (400): {body}")]
    SynthesisBadRequest { body: String },

    #[error("Speech provider rate limited the request (429)")]
    SynthesisRateLimited,

    #[error("Speech provider refused access (403)")]
    SynthesisForbidden,

    #[error("Speech provider endpoint not found (404)")]
    SynthesisUnavailable,

    #[error("Speech synthesis failed: {reason}")]
    SynthesisGeneric { reason: String },

    #[error("Failed to write audio to {path}: {reason}")]
    StorageWriteFailed { path: String, reason: String },

    #[error("Failed to deliver audio: {reason}")]
    DeliveryFailed { reason: String },
}

/// Coarse grouping of conversion failures as presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Something is wrong with the uploaded file itself.
    FileProblem,
    /// The speech service rejected or could not handle the request.
    ServiceProblem,
    /// Transient condition; resending later is likely to work.
    TryLater,
}

impl ConversionError {
    /// Human-readable message shown in the chat.
    pub fn user_message(&self) -> String {
        match self {
            Self::FileTooLarge { max, .. } => format!(
                "The file is too large. Please upload a file smaller than {}.",
                format_size(*max)
            ),
            Self::UnsupportedFormat { allowed, .. } => format!(
                "Unsupported file format. Please upload one of: {}.",
                allowed.join(", ")
            ),
            Self::EmptyContent => "No readable text was found in the file.".to_string(),
            Self::DownloadFailed { .. } => {
                "Could not download the file. Please send it again.".to_string()
            }
            Self::SynthesisTimeout { .. } => {
                "Speech conversion timed out. Please try a shorter text.".to_string()
            }
            Self::SynthesisBadRequest { .. } => "The speech service rejected the text. \
                 Please remove special characters or emoji and try again."
                .to_string(),
            Self::SynthesisRateLimited => "The speech service is receiving too many requests. \
                 Please wait a little and try again."
                .to_string(),
            Self::SynthesisForbidden => {
                "Access to the speech service is currently restricted. Please try again later."
                    .to_string()
            }
            Self::SynthesisUnavailable => {
                "The speech service is temporarily unavailable. Please try again later."
                    .to_string()
            }
            Self::SynthesisGeneric { .. } => {
                "The speech service ran into an error. Please try again later.".to_string()
            }
            Self::StorageWriteFailed { .. } => {
                "Failed to save the generated audio. Please try again later.".to_string()
            }
            Self::DeliveryFailed { .. } => {
                "The audio was generated but could not be sent. Please try again.".to_string()
            }
        }
    }

    /// Which family of problem this is, from the user's point of view.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::FileTooLarge { .. } | Self::UnsupportedFormat { .. } | Self::EmptyContent => {
                ErrorCategory::FileProblem
            }
            Self::SynthesisBadRequest { .. }
            | Self::SynthesisForbidden
            | Self::SynthesisUnavailable
            | Self::SynthesisGeneric { .. } => ErrorCategory::ServiceProblem,
            Self::DownloadFailed { .. }
            | Self::SynthesisTimeout { .. }
            | Self::SynthesisRateLimited
            | Self::StorageWriteFailed { .. }
            | Self::DeliveryFailed { .. } => ErrorCategory::TryLater,
        }
    }
}

/// Terminal `Failed` state of a conversion: the stage it failed in and why.
#[derive(Debug, thiserror::Error)]
#[error("Conversion failed while {stage}: {error}")]
pub struct ConversionFailure {
    pub stage: ConversionStage,
    #[source]
    pub error: ConversionError,
}

fn format_size(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else if bytes >= 1024 {
        format!("{}KB", bytes / 1024)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
