//! # Transcription Module
//!
//! Speech-to-text using Whisper models run through Candle-rs.
//!
//! ## Key Components:
//! - **SpeechRecognizer**: the capability the request pipeline depends on
//! - **WhisperModel**: one loaded model replica with greedy decoding and
//!   language detection
//! - **TranscriptionEngine**: a pool of replicas that bounds parallel inference
//!
//! ## Whisper Model Sizes:
//! - **tiny** / **base**: fast, for development
//! - **small** / **medium**: good accuracy, `medium` is the default
//! - **large-v3** / **large-v3-turbo**: best accuracy, needs a GPU to be pleasant

pub mod engine;
pub mod model;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::audio::wav::WavError;

pub use engine::TranscriptionEngine;

/// Result of transcribing one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    /// Recognized text, trimmed; empty when no speech was found
    pub text: String,
    /// Language code reported by the recognizer (`en`, `tr`, `es`, ...)
    pub language: String,
}

impl Transcript {
    pub fn new(text: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: language.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("could not decode audio: {0}")]
    Decode(#[from] WavError),

    #[error("{0}")]
    Inference(String),
}

/// Capability: turn canonical WAV bytes into text plus a detected language.
///
/// The reported language is not validated here; mapping it onto the
/// supported set is the pipeline's job.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn transcribe(&self, wav: Bytes) -> Result<Transcript, TranscriptionError>;

    /// Short description for health output.
    fn describe(&self) -> String {
        "speech recognizer".to_string()
    }
}

/// Join per-window texts the way clients expect: trimmed, empty windows
/// dropped, single spaces in between.
pub fn join_segments<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    segments
        .into_iter()
        .filter_map(|s| {
            let trimmed = s.as_ref().trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_segments() {
        assert_eq!(
            join_segments([" Hello there. ", "", "  ", "How are you?"]),
            "Hello there. How are you?"
        );
        assert_eq!(join_segments(Vec::<String>::new()), "");
        assert_eq!(join_segments(["   "]), "");
    }
}
