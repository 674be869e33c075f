//! ttsrelay: a chat bot that turns uploaded text documents into speech.
//!
//! A document arrives through the chat transport, is validated and read as
//! text, normalized, sent to a speech provider and the resulting MP3 is
//! delivered back to the same conversation. Staged audio never outlives its
//! conversion, and a periodic sweeper removes anything left behind.
//!
//! - [`media`]: validation, text normalization, speech providers, staging
//! - [`pipeline`]: the per-document conversion state machine
//! - [`channels`]: Telegram transport, polling supervisor, health endpoint
//! - [`config`]: environment-driven configuration

pub mod channels;
pub mod cli;
pub mod config;
pub mod error;
pub mod media;
pub mod pipeline;

pub use config::Config;
pub use error::{Error, Result};
