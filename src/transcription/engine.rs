//! # Transcription Engine
//!
//! A fixed pool of [`WhisperModel`] replicas behind the [`SpeechRecognizer`]
//! capability.
//!
//! ## Key Responsibilities:
//! - **Model loading**: download once, build `num_workers` replicas at startup
//! - **Concurrency limit**: a semaphore admits at most one request per
//!   replica; everything else waits at that point, not in the HTTP layer
//! - **Off-runtime inference**: decoding, VAD and model work run on the
//!   blocking pool so the server keeps accepting requests

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

use super::model::{WhisperFiles, WhisperModel, DEFAULT_LANGUAGE};
use super::{SpeechRecognizer, Transcript, TranscriptionError};
use crate::audio::vad::{self, VadConfig};
use crate::audio::wav::decode_wav;
use crate::config::ModelsConfig;
use crate::device::{create_device_from_string, effective_dtype, parse_compute_type, DeviceManager};

/// Pool of loaded replicas shared with blocking tasks.
type Replicas = Arc<Mutex<Vec<WhisperModel>>>;

/// High-level transcription engine.
///
/// ## Thread Safety:
/// Replicas are checked out of the pool for the duration of one request and
/// returned afterwards, even if decoding fails.
pub struct TranscriptionEngine {
    replicas: Replicas,
    permits: Arc<Semaphore>,
    vad: Option<VadConfig>,
    description: String,
}

impl TranscriptionEngine {
    /// Download the configured model and build the replica pool.
    ///
    /// ## Startup steps:
    /// 1. Apply `cpu_threads` to the CPU kernel thread pool
    /// 2. Select device and dtype
    /// 3. Fetch the model files once
    /// 4. Load `num_workers` replicas
    pub async fn load(config: &ModelsConfig) -> anyhow::Result<Self> {
        if config.cpu_threads > 0 {
            // Read by candle's CPU backend when its thread pool starts
            std::env::set_var("RAYON_NUM_THREADS", config.cpu_threads.to_string());
        }

        let device = create_device_from_string(&config.device);
        let dtype = effective_dtype(&device, parse_compute_type(&config.compute_type)?);
        let files = WhisperFiles::fetch(&config.whisper_model, config.model_dir.clone()).await?;

        tracing::info!(
            model = %config.whisper_model,
            device = %DeviceManager::get_device_info(&device),
            dtype = ?dtype,
            workers = config.num_workers,
            vad_filter = config.vad_filter,
            "Loading Whisper replicas"
        );

        let mut replicas = Vec::with_capacity(config.num_workers);
        for _ in 0..config.num_workers {
            replicas.push(WhisperModel::load(&files, &device, dtype)?);
        }

        let vad = config
            .vad_filter
            .then(|| VadConfig::with_min_silence_ms(config.min_silence_duration_ms));

        let description = format!(
            "whisper {} on {} ({} workers)",
            config.whisper_model,
            DeviceManager::get_device_info(&device),
            config.num_workers
        );

        Ok(Self::from_replicas(replicas, vad, description))
    }

    pub fn from_replicas(
        replicas: Vec<WhisperModel>,
        vad: Option<VadConfig>,
        description: String,
    ) -> Self {
        let permits = replicas.len().max(1);
        Self {
            replicas: Arc::new(Mutex::new(replicas)),
            permits: Arc::new(Semaphore::new(permits)),
            vad,
            description,
        }
    }
}

/// A replica taken out of the pool; goes back on drop.
struct Checkout {
    pool: Replicas,
    model: Option<WhisperModel>,
}

impl Checkout {
    fn take(pool: &Replicas) -> Option<Self> {
        let model = pool.lock().pop()?;
        Some(Self {
            pool: pool.clone(),
            model: Some(model),
        })
    }

    fn model(&mut self) -> Option<&mut WhisperModel> {
        self.model.as_mut()
    }
}

impl Drop for Checkout {
    fn drop(&mut self) {
        if let Some(model) = self.model.take() {
            self.pool.lock().push(model);
        }
    }
}

fn run_blocking(
    wav: &[u8],
    vad: Option<&VadConfig>,
    replicas: &Replicas,
) -> Result<Transcript, TranscriptionError> {
    let samples = decode_wav(wav)?;
    let samples = match vad {
        Some(cfg) => {
            let speech = vad::retain_speech(&samples, cfg);
            tracing::debug!(
                total_samples = samples.len(),
                speech_samples = speech.len(),
                "Voice activity filter applied"
            );
            speech
        }
        None => samples,
    };

    if samples.is_empty() {
        return Ok(Transcript::new("", DEFAULT_LANGUAGE));
    }

    let mut checkout = Checkout::take(replicas).ok_or_else(|| {
        TranscriptionError::Inference("no transcription worker available".to_string())
    })?;
    let model = checkout.model().ok_or_else(|| {
        TranscriptionError::Inference("no transcription worker available".to_string())
    })?;

    model
        .transcribe(&samples)
        .map_err(|e| TranscriptionError::Inference(e.to_string()))
}

#[async_trait]
impl SpeechRecognizer for TranscriptionEngine {
    async fn transcribe(&self, wav: Bytes) -> Result<Transcript, TranscriptionError> {
        let started = Instant::now();
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| TranscriptionError::Inference(e.to_string()))?;
        let queued_ms = started.elapsed().as_millis() as u64;

        let replicas = self.replicas.clone();
        let vad = self.vad.clone();
        let transcript =
            tokio::task::spawn_blocking(move || run_blocking(&wav, vad.as_ref(), &replicas))
                .await
                .map_err(|e| {
                    TranscriptionError::Inference(format!("transcription task failed: {}", e))
                })??;

        tracing::info!(
            queued_ms,
            total_ms = started.elapsed().as_millis() as u64,
            language = %transcript.language,
            chars = transcript.text.len(),
            "Transcription completed"
        );

        Ok(transcript)
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}
