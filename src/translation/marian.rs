//! Marian (opus-mt) language pack loaded with Candle-rs.

use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, Tensor, D};
use candle_nn::VarBuilder;
use candle_transformers::models::marian::{Config, MTModel};
use parking_lot::Mutex;
use std::path::Path;
use tokenizers::Tokenizer;

use super::packages::LanguagePair;
use super::{split_sentences, TranslationError};

/// One direction of translation, usable from blocking threads.
pub trait TranslationPackage: Send + Sync {
    fn pair(&self) -> &LanguagePair;

    fn translate(&self, text: &str) -> Result<String, TranslationError>;
}

/// An installed Marian model for one language pair.
///
/// The decoder keeps a KV cache between steps, so the model sits behind a
/// mutex and one call translates at a time.
pub struct MarianPackage {
    pair: LanguagePair,
    model: Mutex<MTModel>,
    config: Config,
    source_tokenizer: Tokenizer,
    target_tokenizer: Tokenizer,
    device: Device,
}

impl MarianPackage {
    pub fn load(pair: LanguagePair, dir: &Path, device: &Device) -> Result<Self> {
        let config: Config = serde_json::from_reader(std::fs::File::open(dir.join("config.json"))?)
            .with_context(|| format!("Invalid config.json in pack {}", pair))?;
        let source_tokenizer = Tokenizer::from_file(dir.join("tokenizer-source.json"))
            .map_err(|e| anyhow!("Failed to load source tokenizer for {}: {}", pair, e))?;
        let target_tokenizer = Tokenizer::from_file(dir.join("tokenizer-target.json"))
            .map_err(|e| anyhow!("Failed to load target tokenizer for {}: {}", pair, e))?;

        let weights = dir.join("model.safetensors");
        // SAFETY: safetensors files are memory-mapped read-only
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, device)? };
        let model = MTModel::new(&config, vb)?;

        Ok(Self {
            pair,
            model: Mutex::new(model),
            config,
            source_tokenizer,
            target_tokenizer,
            device: device.clone(),
        })
    }

    fn translate_sentence(&self, model: &mut MTModel, sentence: &str) -> Result<String> {
        let mut input = self
            .source_tokenizer
            .encode(sentence, true)
            .map_err(|e| anyhow!("tokenization failed: {}", e))?
            .get_ids()
            .to_vec();
        input.push(self.config.eos_token_id);
        let input = Tensor::new(input.as_slice(), &self.device)?.unsqueeze(0)?;

        model.reset_kv_cache();
        let encoder_xs = model.encoder().forward(&input, 0)?;

        let max_len = self.config.max_position_embeddings;
        let mut output = vec![self.config.decoder_start_token_id];
        for index in 0..max_len {
            let context = if index >= 1 { 1 } else { output.len() };
            let start_pos = output.len().saturating_sub(context);
            let ids = Tensor::new(&output[start_pos..], &self.device)?.unsqueeze(0)?;

            let logits = model.decode(&ids, &encoder_xs, start_pos)?.squeeze(0)?;
            let logits = logits.get(logits.dim(0)? - 1)?;
            let token = logits.argmax(D::Minus1)?.to_scalar::<u32>()?;

            if token == self.config.eos_token_id || token == self.config.forced_eos_token_id {
                break;
            }
            output.push(token);
        }

        let text = self
            .target_tokenizer
            .decode(&output, true)
            .map_err(|e| anyhow!("detokenization failed: {}", e))?;
        Ok(text.trim().to_string())
    }
}

impl TranslationPackage for MarianPackage {
    fn pair(&self) -> &LanguagePair {
        &self.pair
    }

    fn translate(&self, text: &str) -> Result<String, TranslationError> {
        let mut model = self.model.lock();
        let mut translated = Vec::new();
        for sentence in split_sentences(text) {
            let out = self.translate_sentence(&mut model, sentence).map_err(|e| {
                TranslationError::Backend(format!("{} model failed: {}", self.pair, e))
            })?;
            if !out.is_empty() {
                translated.push(out);
            }
        }
        Ok(translated.join(" "))
    }
}
