//! Test doubles for the pipeline capabilities. Each one counts its calls so
//! tests can assert which stages ran.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::audio::{AudioNormalizer, NormalizeError};
use crate::config::AppConfig;
use crate::pipeline::Pipeline;
use crate::transcription::{SpeechRecognizer, Transcript, TranscriptionError};
use crate::translation::{TranslationError, Translator};

#[derive(Clone, Copy, Debug)]
pub enum NormalizerBehavior {
    /// Return the input unchanged
    PassThrough,
    Conversion,
    Timeout,
}

pub struct FakeNormalizer {
    behavior: NormalizerBehavior,
    pub calls: AtomicUsize,
}

impl FakeNormalizer {
    pub fn new(behavior: NormalizerBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioNormalizer for FakeNormalizer {
    async fn normalize(&self, raw: Bytes) -> Result<Bytes, NormalizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            NormalizerBehavior::PassThrough => Ok(raw),
            NormalizerBehavior::Conversion => Err(NormalizeError::Conversion(
                "Invalid data found when processing input".to_string(),
            )),
            NormalizerBehavior::Timeout => Err(NormalizeError::Timeout(
                std::time::Duration::from_secs(10),
            )),
        }
    }
}

pub struct FakeRecognizer {
    result: Result<Transcript, String>,
    pub calls: AtomicUsize,
}

impl FakeRecognizer {
    pub fn returning(text: &str, language: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(Transcript::new(text, language)),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechRecognizer for FakeRecognizer {
    async fn transcribe(&self, _wav: Bytes) -> Result<Transcript, TranscriptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result
            .clone()
            .map_err(TranscriptionError::Inference)
    }
}

/// Produces `<text> [source>target]`, or fails when built with [`FakeTranslator::failing`].
pub struct FakeTranslator {
    fail_with: Option<String>,
    pub requests: Mutex<Vec<(String, String, String)>>,
}

impl FakeTranslator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail_with: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            fail_with: Some(message.to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Translator for FakeTranslator {
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslationError> {
        self.requests
            .lock()
            .push((text.to_string(), source.to_string(), target.to_string()));
        match &self.fail_with {
            Some(message) => Err(TranslationError::Backend(message.clone())),
            None => Ok(format!("{} [{}>{}]", text, source, target)),
        }
    }

    fn describe(&self) -> String {
        "fake".to_string()
    }
}

/// Bytes large enough to pass the minimum upload size.
pub fn audio_upload() -> Bytes {
    Bytes::from(vec![1u8; 4096])
}

pub fn pipeline(
    normalizer: Arc<FakeNormalizer>,
    recognizer: Arc<FakeRecognizer>,
    translator: Arc<FakeTranslator>,
) -> Pipeline {
    Pipeline::new(
        normalizer,
        recognizer,
        translator,
        AppConfig::default().audio.min_audio_bytes,
    )
}
