//! Per-provider timeout configuration.
//!
//! Every external call carries one of these budgets; exceeding it surfaces as
//! a `Timeout` error that the retry layer treats as transient.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Operation families with distinct latency profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderOperation {
    Transcription,
    Generation,
    SpeechSynthesis,
}

impl std::fmt::Display for ProviderOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transcription => write!(f, "transcription"),
            Self::Generation => write!(f, "generation"),
            Self::SpeechSynthesis => write!(f, "speech_synthesis"),
        }
    }
}

/// Timeout budgets per operation family, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderTimeoutsConfig {
    /// STT calls upload audio, so they get the largest budget
    pub transcription_secs: u64,

    /// LLM document generation
    pub generation_secs: u64,

    /// Text-to-speech synthesis
    pub speech_synthesis_secs: u64,
}

impl ProviderTimeoutsConfig {
    pub fn timeout_for(&self, operation: ProviderOperation) -> Duration {
        let secs = match operation {
            ProviderOperation::Transcription => self.transcription_secs,
            ProviderOperation::Generation => self.generation_secs,
            ProviderOperation::SpeechSynthesis => self.speech_synthesis_secs,
        };
        Duration::from_secs(secs)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        for (name, secs) in [
            ("transcription_secs", self.transcription_secs),
            ("generation_secs", self.generation_secs),
            ("speech_synthesis_secs", self.speech_synthesis_secs),
        ] {
            if secs == 0 {
                return Err(format!("{name} must be greater than 0"));
            }
            if secs > 600 {
                return Err(format!("{name} should not exceed 600 seconds"));
            }
        }
        Ok(())
    }
}

impl Default for ProviderTimeoutsConfig {
    fn default() -> Self {
        Self {
            transcription_secs: 120,
            generation_secs: 90,
            speech_synthesis_secs: 60,
        }
    }
}
