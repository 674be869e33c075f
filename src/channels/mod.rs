//! Chat transport and process-facing servers.
//!
//! ```text
//!   Telegram Bot API
//!        │  getUpdates (long poll)
//!        ▼
//!   TelegramBot ──commands/callbacks──▶ VoicePreferences
//!        │
//!        │ documents (spawned)
//!        ▼
//!   ConversionPipeline ──Notifier/FileSource──▶ TelegramChannel
//! ```
//!
//! The polling loop runs under [`supervise`], which restarts it with backoff
//! when it fails. [`HealthServer`] answers liveness probes independently.

pub mod health;
pub mod supervisor;
pub mod telegram;

pub use health::HealthServer;
pub use supervisor::{RestartPolicy, SupervisorExit, supervise};
pub use telegram::{BotCommand, TelegramBot, TelegramChannel};
