//! Script and voice synthesis.
//!
//! Provides:
//! - The [`TextCompletionProvider`] capability and an OpenAI-compatible provider
//! - [`ScriptSynthesizer`]: word-count banded scripts with corrective retries
//! - [`VoiceSynthesizer`]: speech service client with word timestamps
//! - Timestamp payload normalization

pub mod config;
pub mod error;
pub mod provider;
pub mod script;
pub mod speech;
pub mod timestamps;

pub use config::{ScriptServiceConfig, SpeechConfig};
pub use error::{AiError, AiResult};
pub use provider::{CompletionRequest, OpenAiCompatProvider, TextCompletionProvider};
pub use script::{Script, ScriptPreset, ScriptSynthesizer};
pub use speech::{SpeechSynthesizer, VoiceSynthesizer, MAX_SPEECH_CHARS};
pub use timestamps::normalize_timestamps;
