//! # Whisper Model
//!
//! Loading and running one Whisper replica with Candle-rs.
//!
//! ## Loading Process:
//! 1. Resolve the configured size name to a Hugging Face repository
//! 2. Download `config.json`, `tokenizer.json` and `model.safetensors`
//!    into the model directory (cached after the first run)
//! 3. Memory-map the weights onto the selected device and dtype
//!
//! ## Decoding Strategy:
//! Fixed at load time: greedy search (beam width 1, temperature 0), no
//! timestamps, language detected from the first 30 second window. Windows
//! the model considers silent are dropped.

use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, IndexOp, Tensor, D};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, Config};
use std::path::PathBuf;
use tokenizers::Tokenizer;

use super::{join_segments, Transcript};
use crate::audio::{mel, SAMPLE_RATE};

/// Language codes Whisper can report, in vocabulary order.
pub const LANGUAGES: &[&str] = &[
    "en", "zh", "de", "es", "ru", "ko", "fr", "ja", "pt", "tr", "pl", "ca", "nl", "ar", "sv",
    "it", "id", "hi", "fi", "vi", "he", "uk", "el", "ms", "cs", "ro", "da", "hu", "ta", "no",
    "th", "ur", "hr", "bg", "lt", "la", "mi", "ml", "cy", "sk", "te", "fa", "lv", "bn", "sr",
    "az", "sl", "kn", "et", "mk", "br", "eu", "is", "hy", "ne", "mn", "bs", "kk", "sq", "sw",
    "gl", "mr", "pa", "si", "km", "sn", "yo", "so", "af", "oc", "ka", "be", "tg", "sd", "gu",
    "am", "yi", "lo", "uz", "fo", "ht", "ps", "tk", "nn", "mt", "sa", "lb", "my", "bo", "tl",
    "mg", "as", "tt", "haw", "ln", "ha", "ba", "jw", "su", "yue",
];

/// Language reported when the model is English-only or there was nothing to analyse.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Vocabulary size of the smallest multilingual checkpoint; English-only
/// checkpoints have one token fewer.
const MULTILINGUAL_VOCAB_SIZE: usize = 51865;

/// Whether a checkpoint was trained on more than English.
///
/// English-only tokenizers still carry the language tokens, so their
/// presence says nothing; the vocabulary size and `.en` suffix do.
fn is_multilingual(repo_id: &str, vocab_size: usize) -> bool {
    vocab_size >= MULTILINGUAL_VOCAB_SIZE && !repo_id.ends_with(".en")
}

/// Map a configured model name onto a Hugging Face repository id.
///
/// Size names follow the usual Whisper naming; anything containing a `/` is
/// taken as a repository id as-is.
pub fn whisper_repo_id(name: &str) -> Result<String> {
    if name.contains('/') {
        return Ok(name.to_string());
    }

    let repo = match name.to_lowercase().as_str() {
        "tiny" => "openai/whisper-tiny",
        "tiny.en" => "openai/whisper-tiny.en",
        "base" => "openai/whisper-base",
        "base.en" => "openai/whisper-base.en",
        "small" => "openai/whisper-small",
        "small.en" => "openai/whisper-small.en",
        "medium" => "openai/whisper-medium",
        "medium.en" => "openai/whisper-medium.en",
        "large" | "large-v3" => "openai/whisper-large-v3",
        "large-v2" => "openai/whisper-large-v2",
        "large-v3-turbo" | "turbo" => "openai/whisper-large-v3-turbo",
        "distil-large-v3" => "distil-whisper/distil-large-v3",
        other => return Err(anyhow!("Unknown Whisper model: {}", other)),
    };
    Ok(repo.to_string())
}

/// Local paths of a downloaded Whisper model.
#[derive(Debug, Clone)]
pub struct WhisperFiles {
    pub repo_id: String,
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
}

impl WhisperFiles {
    /// Download (or reuse from `cache_dir`) the files of `model_name`.
    pub async fn fetch(model_name: &str, cache_dir: PathBuf) -> Result<Self> {
        use hf_hub::api::tokio::ApiBuilder;

        let repo_id = whisper_repo_id(model_name)?;
        tracing::info!(repo = %repo_id, cache_dir = ?cache_dir, "Fetching Whisper model files");

        let api = ApiBuilder::new()
            .with_cache_dir(cache_dir)
            .with_token(std::env::var("HF_TOKEN").ok())
            .with_progress(false)
            .build()
            .context("Failed to initialize Hugging Face API client")?;
        let repo = api.model(repo_id.clone());

        let config = repo
            .get("config.json")
            .await
            .with_context(|| format!("Failed to download config.json from {}", repo_id))?;
        let tokenizer = repo
            .get("tokenizer.json")
            .await
            .with_context(|| format!("Failed to download tokenizer.json from {}", repo_id))?;
        let weights = repo
            .get("model.safetensors")
            .await
            .with_context(|| format!("Failed to download model.safetensors from {}", repo_id))?;

        Ok(Self {
            repo_id,
            config,
            tokenizer,
            weights,
        })
    }
}

/// Special token ids, resolved once from the tokenizer.
#[derive(Debug, Clone)]
struct SpecialTokens {
    sot: u32,
    eot: u32,
    transcribe: u32,
    no_timestamps: u32,
    no_speech: Option<u32>,
    /// `(code, token id)` for every language token the tokenizer knows
    languages: Vec<(&'static str, u32)>,
}

impl SpecialTokens {
    fn resolve(tokenizer: &Tokenizer) -> Result<Self> {
        let id = |token: &str| {
            tokenizer
                .token_to_id(token)
                .ok_or_else(|| anyhow!("Token not found in tokenizer: {}", token))
        };

        let no_speech = m::NO_SPEECH_TOKENS
            .iter()
            .find_map(|token| tokenizer.token_to_id(token));

        let languages = LANGUAGES
            .iter()
            .filter_map(|code| {
                tokenizer
                    .token_to_id(&format!("<|{}|>", code))
                    .map(|id| (*code, id))
            })
            .collect();

        Ok(Self {
            sot: id(m::SOT_TOKEN)?,
            eot: id(m::EOT_TOKEN)?,
            transcribe: id(m::TRANSCRIBE_TOKEN)?,
            no_timestamps: id(m::NO_TIMESTAMPS_TOKEN)?,
            no_speech,
            languages,
        })
    }
}

/// Outcome of decoding one 30 second window.
#[derive(Debug)]
struct WindowResult {
    text: String,
    avg_logprob: f64,
    no_speech_prob: f64,
}

impl WindowResult {
    fn is_silence(&self) -> bool {
        self.no_speech_prob > m::NO_SPEECH_THRESHOLD && self.avg_logprob < m::LOGPROB_THRESHOLD
    }
}

/// A loaded Whisper model ready for transcription.
///
/// ## Thread Safety:
/// Decoding mutates the cross-attention cache, so a replica is used by one
/// request at a time; the engine hands replicas out from a pool.
pub struct WhisperModel {
    model: m::model::Whisper,
    config: Config,
    tokenizer: Tokenizer,
    tokens: SpecialTokens,
    multilingual: bool,
    mel_filters: Vec<f32>,
    suppress_mask: Tensor,
    device: Device,
    dtype: DType,
}

impl WhisperModel {
    /// Build one replica from downloaded files.
    pub fn load(files: &WhisperFiles, device: &Device, dtype: DType) -> Result<Self> {
        let start_time = std::time::Instant::now();

        let config: Config = serde_json::from_reader(std::fs::File::open(&files.config)?)
            .context("Failed to parse Whisper config.json")?;
        let tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;
        let tokens = SpecialTokens::resolve(&tokenizer)?;
        let multilingual = is_multilingual(&files.repo_id, config.vocab_size);
        let mel_filters = mel::mel_filters(config.num_mel_bins, SAMPLE_RATE);

        // SAFETY: safetensors files are memory-mapped read-only
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[&files.weights], dtype, device)? };
        let model = m::model::Whisper::load(&vb, config.clone())?;

        let suppress: Vec<f32> = (0..config.vocab_size as u32)
            .map(|i| {
                if config.suppress_tokens.contains(&i) {
                    f32::NEG_INFINITY
                } else {
                    0f32
                }
            })
            .collect();
        let suppress_mask = Tensor::new(suppress.as_slice(), device)?;

        tracing::info!(
            repo = %files.repo_id,
            multilingual,
            languages = tokens.languages.len(),
            "Whisper replica loaded in {:.2}s",
            start_time.elapsed().as_secs_f64()
        );

        Ok(Self {
            model,
            config,
            tokenizer,
            tokens,
            multilingual,
            mel_filters,
            suppress_mask,
            device: device.clone(),
            dtype,
        })
    }

    /// Transcribe 16 kHz mono samples.
    ///
    /// The audio is processed in 30 second windows; the language detected on
    /// the first window is used for all of them. English-only models skip
    /// detection and decode without a language token.
    pub fn transcribe(&mut self, samples: &[f32]) -> Result<Transcript> {
        if samples.is_empty() {
            return Ok(Transcript::new("", DEFAULT_LANGUAGE));
        }

        let start_time = std::time::Instant::now();
        let windows = samples
            .chunks(m::N_SAMPLES)
            .map(|chunk| self.window_mel(chunk))
            .collect::<Result<Vec<_>>>()?;

        let (language, language_token) = match windows.first() {
            Some(first) if self.multilingual => self.detect_language(first)?,
            _ => (DEFAULT_LANGUAGE, None),
        };

        let mut texts = Vec::with_capacity(windows.len());
        for (index, mel) in windows.iter().enumerate() {
            let result = self.decode_window(mel, language_token)?;
            if result.is_silence() {
                tracing::debug!(
                    window = index,
                    no_speech_prob = result.no_speech_prob,
                    "Skipping silent window"
                );
                continue;
            }
            texts.push(result.text);
        }

        let text = join_segments(texts);
        tracing::debug!(
            audio_secs = samples.len() as f64 / SAMPLE_RATE as f64,
            windows = windows.len(),
            language,
            "Transcribed in {:.2}s",
            start_time.elapsed().as_secs_f64()
        );

        Ok(Transcript::new(text, language))
    }

    /// Log-mel features of one window, padded to 30 seconds.
    fn window_mel(&self, chunk: &[f32]) -> Result<Tensor> {
        let mut padded = chunk.to_vec();
        padded.resize(m::N_SAMPLES, 0.0);

        let mel = m::audio::pcm_to_mel(&self.config, &padded, &self.mel_filters);
        let n_mels = self.config.num_mel_bins;
        let n_frames = mel.len() / n_mels;

        let mel = Tensor::from_vec(mel, (1, n_mels, n_frames), &self.device)?
            .narrow(2, 0, n_frames.min(m::N_FRAMES))?
            .to_dtype(self.dtype)?;
        Ok(mel)
    }

    /// Pick the most likely language token after `<|startoftranscript|>`.
    fn detect_language(&mut self, mel: &Tensor) -> Result<(&'static str, Option<u32>)> {
        if self.tokens.languages.is_empty() {
            return Ok((DEFAULT_LANGUAGE, None));
        }

        let audio_features = self.model.encoder.forward(mel, true)?;
        let tokens = Tensor::new(&[[self.tokens.sot]], &self.device)?;
        let ys = self.model.decoder.forward(&tokens, &audio_features, true)?;
        let logits = self
            .model
            .decoder
            .final_linear(&ys.i(..1)?)?
            .i(0)?
            .i(0)?
            .to_dtype(DType::F32)?;

        let ids: Vec<u32> = self.tokens.languages.iter().map(|(_, id)| *id).collect();
        let ids = Tensor::new(ids.as_slice(), &self.device)?;
        let best = logits
            .index_select(&ids, 0)?
            .argmax(D::Minus1)?
            .to_scalar::<u32>()? as usize;

        self.model.reset_kv_cache();

        let (code, id) = self.tokens.languages[best];
        Ok((code, Some(id)))
    }

    fn decode_window(&mut self, mel: &Tensor, language_token: Option<u32>) -> Result<WindowResult> {
        let audio_features = self.model.encoder.forward(mel, true)?;

        let mut tokens = vec![self.tokens.sot];
        tokens.extend(language_token);
        tokens.push(self.tokens.transcribe);
        tokens.push(self.tokens.no_timestamps);
        let prompt_len = tokens.len();

        let sample_len = self.config.max_target_positions / 2;
        let mut sum_logprob = 0f64;
        let mut no_speech_prob = f64::NAN;

        for i in 0..sample_len {
            let tokens_t = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
            let ys = self.model.decoder.forward(&tokens_t, &audio_features, i == 0)?;

            if i == 0 {
                if let Some(no_speech) = self.tokens.no_speech {
                    let logits = self
                        .model
                        .decoder
                        .final_linear(&ys.i(..1)?)?
                        .i(0)?
                        .i(0)?
                        .to_dtype(DType::F32)?;
                    no_speech_prob = candle_nn::ops::softmax(&logits, 0)?
                        .i(no_speech as usize)?
                        .to_scalar::<f32>()? as f64;
                }
            }

            let (_, seq_len, _) = ys.dims3()?;
            let logits = self
                .model
                .decoder
                .final_linear(&ys.i((..1, seq_len - 1..))?)?
                .i(0)?
                .i(0)?
                .to_dtype(DType::F32)?
                .broadcast_add(&self.suppress_mask)?;

            let next_token = logits.argmax(D::Minus1)?.to_scalar::<u32>()?;
            let logprob = candle_nn::ops::log_softmax(&logits, D::Minus1)?
                .i(next_token as usize)?
                .to_scalar::<f32>()? as f64;

            if next_token == self.tokens.eot || tokens.len() > self.config.max_target_positions {
                break;
            }
            tokens.push(next_token);
            sum_logprob += logprob;
        }

        self.model.reset_kv_cache();

        let generated = &tokens[prompt_len..];
        let text = self
            .tokenizer
            .decode(generated, true)
            .map_err(|e| anyhow!("Tokenizer decode error: {}", e))?;

        Ok(WindowResult {
            text: text.trim().to_string(),
            avg_logprob: sum_logprob / generated.len().max(1) as f64,
            no_speech_prob,
        })
    }
}
