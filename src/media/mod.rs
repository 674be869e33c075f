//! Media handling module.
//!
//! Everything between a received document and a staged audio file:
//! - File validation (size and extension policy)
//! - Text normalization and strict sanitization
//! - Text-to-speech providers
//! - Speech synthesis into staged files
//! - Staging directory management and periodic sweeping

mod normalize;
mod synthesizer;
mod temp_store;
mod tts;
mod validator;

pub use normalize::{CharPolicy, NormalizedText, TRUNCATION_MARKER, TextNormalizer};
pub use synthesizer::{AudioArtifact, SpeechSynthesizer};
pub use temp_store::{SweepConfig, Sweeper, TempStore};
pub use tts::{AudioStream, TranslateTtsProvider, TtsProvider, Voice, build_provider};
pub use validator::FileValidator;
