//! # Request Pipeline
//!
//! The transcribe-and-translate flow behind `POST /v1/transcribe_translate`.
//!
//! ## Stages (strictly in order, no retries):
//! 1. Upload size check
//! 2. Normalization to canonical WAV
//! 3. Transcription; an empty transcript ends the request here
//! 4. Source language resolution (routing code vs display value)
//! 5. Translation, or an echo when source and target already match
//!
//! Target language validation happens before the pipeline is entered, as
//! soon as the form field is parsed. A failure at any stage fails the whole
//! request; partial results are never returned.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::audio::{AudioNormalizer, NormalizeError};
use crate::error::AppError;
use crate::language::{ResolvedSource, TargetLanguage};
use crate::transcription::{SpeechRecognizer, TranscriptionError};
use crate::translation::{TranslationError, Translator};

/// Response body of a successful request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscribeTranslateResponse {
    pub transcript: String,
    pub translation: String,
    pub source_lang: String,
}

/// Failure of one pipeline stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("audio upload is {size} bytes, minimum is {min}")]
    AudioTooSmall { size: usize, min: usize },

    #[error("normalization failed: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("transcription failed: {0}")]
    Transcription(#[from] TranscriptionError),

    #[error("translation failed: {0}")]
    Translation(#[from] TranslationError),
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::AudioTooSmall { .. } => {
                AppError::BadRequest("Audio file too small - recording may be empty".to_string())
            }
            PipelineError::Normalize(NormalizeError::Conversion(_)) => AppError::Conversion(
                "Audio conversion failed - ensure file is valid audio format".to_string(),
            ),
            PipelineError::Normalize(e) => {
                AppError::Conversion(format!("Audio normalization failed: {}", e))
            }
            PipelineError::Transcription(e) => {
                AppError::Inference(format!("Inference failed: {}", e))
            }
            PipelineError::Translation(e) => {
                AppError::Translation(format!("Translation error: {}", e))
            }
        }
    }
}

/// Orchestrates normalizer, recognizer and translator for one request.
///
/// The collaborators are process-wide handles created at startup; the
/// pipeline itself holds no per-request state.
#[derive(Clone)]
pub struct Pipeline {
    normalizer: Arc<dyn AudioNormalizer>,
    recognizer: Arc<dyn SpeechRecognizer>,
    translator: Arc<dyn Translator>,
    min_audio_bytes: usize,
}

impl Pipeline {
    pub fn new(
        normalizer: Arc<dyn AudioNormalizer>,
        recognizer: Arc<dyn SpeechRecognizer>,
        translator: Arc<dyn Translator>,
        min_audio_bytes: usize,
    ) -> Self {
        Self {
            normalizer,
            recognizer,
            translator,
            min_audio_bytes,
        }
    }

    pub fn recognizer(&self) -> &Arc<dyn SpeechRecognizer> {
        &self.recognizer
    }

    pub fn translator(&self) -> &Arc<dyn Translator> {
        &self.translator
    }

    /// Reject uploads below the minimum size.
    pub fn check_upload_size(&self, size: usize) -> Result<(), PipelineError> {
        if size < self.min_audio_bytes {
            return Err(PipelineError::AudioTooSmall {
                size,
                min: self.min_audio_bytes,
            });
        }
        Ok(())
    }

    pub async fn run(
        &self,
        upload: Bytes,
        target: TargetLanguage,
    ) -> Result<TranscribeTranslateResponse, PipelineError> {
        let started = Instant::now();
        self.check_upload_size(upload.len())?;

        let upload_bytes = upload.len();
        let wav = self.normalizer.normalize(upload).await?;
        tracing::debug!(upload_bytes, wav_bytes = wav.len(), "Upload normalized");

        let transcript = self.recognizer.transcribe(wav).await?;
        if transcript.text.is_empty() {
            tracing::info!(
                detected = %transcript.language,
                "Empty transcript, skipping translation"
            );
            return Ok(TranscribeTranslateResponse {
                transcript: String::new(),
                translation: String::new(),
                source_lang: transcript.language,
            });
        }

        let source = ResolvedSource::from_detected(&transcript.language);
        let translation = if source.routing_code == target.code() {
            transcript.text.clone()
        } else {
            self.translator
                .translate(&transcript.text, source.routing_code, target.code())
                .await?
        };

        tracing::info!(
            detected = %transcript.language,
            routed_from = source.routing_code,
            target = target.code(),
            transcript_chars = transcript.text.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Transcribe-translate completed"
        );

        Ok(TranscribeTranslateResponse {
            transcript: transcript.text,
            translation,
            source_lang: source.display,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use actix_web::ResponseError;

    #[tokio::test]
    async fn test_translates_supported_source() {
        let normalizer = FakeNormalizer::new(NormalizerBehavior::PassThrough);
        let recognizer = FakeRecognizer::returning("Hello there", "en");
        let translator = FakeTranslator::new();
        let p = pipeline(normalizer.clone(), recognizer.clone(), translator.clone());

        let out = p.run(audio_upload(), TargetLanguage::Turkish).await.unwrap();

        assert_eq!(out.transcript, "Hello there");
        assert_eq!(out.translation, "Hello there [en>tr]");
        assert_eq!(out.source_lang, "English");
        assert_ne!(out.translation, out.transcript);
        assert_eq!(normalizer.calls(), 1);
        assert_eq!(recognizer.calls(), 1);
        assert_eq!(translator.calls(), 1);
    }

    #[tokio::test]
    async fn test_small_upload_never_normalizes() {
        let normalizer = FakeNormalizer::new(NormalizerBehavior::PassThrough);
        let recognizer = FakeRecognizer::returning("x", "en");
        let translator = FakeTranslator::new();
        let p = pipeline(normalizer.clone(), recognizer.clone(), translator.clone());

        for size in [0, 1, 800, 999] {
            let err = p
                .run(Bytes::from(vec![0u8; size]), TargetLanguage::English)
                .await
                .unwrap_err();
            assert!(matches!(err, PipelineError::AudioTooSmall { .. }));
        }
        assert_eq!(normalizer.calls(), 0);
        assert_eq!(recognizer.calls(), 0);

        // Exactly the minimum is accepted
        assert!(p.run(Bytes::from(vec![0u8; 1000]), TargetLanguage::English).await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_transcript_skips_translation() {
        let translator = FakeTranslator::new();
        let p = pipeline(
            FakeNormalizer::new(NormalizerBehavior::PassThrough),
            FakeRecognizer::returning("", "tr"),
            translator.clone(),
        );

        let out = p.run(audio_upload(), TargetLanguage::Arabic).await.unwrap();
        assert_eq!(out.transcript, "");
        assert_eq!(out.translation, "");
        assert_eq!(out.source_lang, "tr");
        assert_eq!(translator.calls(), 0);
    }

    #[tokio::test]
    async fn test_same_language_is_echoed() {
        let translator = FakeTranslator::new();
        let p = pipeline(
            FakeNormalizer::new(NormalizerBehavior::PassThrough),
            FakeRecognizer::returning("سلام دنیا", "fa"),
            translator.clone(),
        );

        let out = p.run(audio_upload(), TargetLanguage::Persian).await.unwrap();
        assert_eq!(out.translation, out.transcript);
        assert_eq!(out.source_lang, "Persian");
        assert_eq!(translator.calls(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_source_routes_as_english() {
        let translator = FakeTranslator::new();
        let p = pipeline(
            FakeNormalizer::new(NormalizerBehavior::PassThrough),
            FakeRecognizer::returning("Hola amigos", "es"),
            translator.clone(),
        );

        let out = p.run(audio_upload(), TargetLanguage::Turkish).await.unwrap();
        assert_eq!(out.source_lang, "es");
        assert_eq!(
            translator.requests.lock().clone(),
            vec![("Hola amigos".to_string(), "en".to_string(), "tr".to_string())]
        );
    }

    #[tokio::test]
    async fn test_unsupported_source_with_english_target_is_echoed() {
        let translator = FakeTranslator::new();
        let p = pipeline(
            FakeNormalizer::new(NormalizerBehavior::PassThrough),
            FakeRecognizer::returning("Hola amigos", "es"),
            translator.clone(),
        );

        let out = p.run(audio_upload(), TargetLanguage::English).await.unwrap();
        assert_eq!(out.translation, "Hola amigos");
        assert_eq!(out.source_lang, "es");
        assert_eq!(translator.calls(), 0);
    }

    #[tokio::test]
    async fn test_identical_requests_give_identical_responses() {
        let p = pipeline(
            FakeNormalizer::new(NormalizerBehavior::PassThrough),
            FakeRecognizer::returning("Good morning", "en"),
            FakeTranslator::new(),
        );

        let first = p.run(audio_upload(), TargetLanguage::Arabic).await.unwrap();
        let second = p.run(audio_upload(), TargetLanguage::Arabic).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_stage_errors_map_to_messages() {
        let cases: Vec<(Pipeline, &str)> = vec![
            (
                pipeline(
                    FakeNormalizer::new(NormalizerBehavior::Conversion),
                    FakeRecognizer::returning("x", "en"),
                    FakeTranslator::new(),
                ),
                "Audio conversion failed - ensure file is valid audio format",
            ),
            (
                pipeline(
                    FakeNormalizer::new(NormalizerBehavior::Timeout),
                    FakeRecognizer::returning("x", "en"),
                    FakeTranslator::new(),
                ),
                "Audio normalization failed: audio conversion timed out after 10s",
            ),
            (
                pipeline(
                    FakeNormalizer::new(NormalizerBehavior::PassThrough),
                    FakeRecognizer::failing("out of memory"),
                    FakeTranslator::new(),
                ),
                "Inference failed: out of memory",
            ),
            (
                pipeline(
                    FakeNormalizer::new(NormalizerBehavior::PassThrough),
                    FakeRecognizer::returning("Hello", "en"),
                    FakeTranslator::failing("connection refused"),
                ),
                "Translation error: connection refused",
            ),
        ];

        for (p, expected) in cases {
            let err: AppError = p
                .run(audio_upload(), TargetLanguage::Turkish)
                .await
                .unwrap_err()
                .into();
            assert_eq!(
                err.status_code(),
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR
            );
            match err {
                AppError::Conversion(msg)
                | AppError::Inference(msg)
                | AppError::Translation(msg) => assert_eq!(msg, expected),
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn test_too_small_is_bad_request() {
        let err: AppError = PipelineError::AudioTooSmall { size: 800, min: 1000 }.into();
        assert_eq!(err.status_code(), actix_web::http::StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("too small"));
    }
}
