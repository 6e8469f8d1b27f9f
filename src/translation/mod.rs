//! # Translation Module
//!
//! Text translation between language codes, behind the [`Translator`]
//! capability.
//!
//! ## Backends:
//! - **Offline** ([`OfflineTranslator`]): Marian models installed as
//!   per-pair language packs, with an English pivot when a direct pair is
//!   missing
//! - **Remote** ([`RemoteTranslator`]): a LibreTranslate-compatible HTTP API
//!
//! The backend is chosen once at startup from configuration. The offline
//! backend first installs missing packs from the configured repositories.

pub mod install;
pub mod marian;
pub mod offline;
pub mod packages;
pub mod remote;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{ModelsConfig, TranslationBackendKind, TranslationConfig};

pub use install::{install_missing_packages, HubPackageFetcher, PackageSources};
pub use offline::OfflineTranslator;
pub use remote::RemoteTranslator;

/// Intermediate language used when no direct pack exists.
pub const PIVOT_LANGUAGE: &str = "en";

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("no translation route from '{from}' to '{to}'")]
    NoRoute { from: String, to: String },

    #[error("{0}")]
    Backend(String),

    #[error("translation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("translation service returned {status}: {body}")]
    Remote { status: u16, body: String },
}

/// Capability: translate `text` from `source` to `target` (ISO 639-1 codes).
///
/// Callers never pass equal codes; the pipeline echoes the text instead.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, source: &str, target: &str)
        -> Result<String, TranslationError>;

    /// Short description for health output.
    fn describe(&self) -> String;
}

/// Build the configured translation backend.
pub async fn build_translator(
    config: &TranslationConfig,
    models: &ModelsConfig,
) -> anyhow::Result<Arc<dyn Translator>> {
    match config.backend {
        TranslationBackendKind::Offline => {
            if config.auto_install {
                install_packages(config).await?;
            }
            let device = crate::device::create_device_from_string(&models.device);
            let translator = OfflineTranslator::load(&config.packages_dir, &device)?;
            Ok(Arc::new(translator))
        }
        TranslationBackendKind::Remote => {
            let url = config
                .remote_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("translation.remote_url is not set"))?;
            let translator = RemoteTranslator::new(
                url,
                config.remote_api_key.clone(),
                Duration::from_secs(config.timeout_secs),
            )?;
            Ok(Arc::new(translator))
        }
    }
}

async fn install_packages(config: &TranslationConfig) -> anyhow::Result<()> {
    let sources = PackageSources::new(
        config.package_repos.clone(),
        config.package_repo_template.clone(),
    );
    if sources.is_empty() {
        tracing::info!("No language pack repositories configured, skipping install");
        return Ok(());
    }

    let fetcher = HubPackageFetcher::new(config.packages_dir.join(install::HUB_CACHE_DIR))?;
    let added = install_missing_packages(&config.packages_dir, &sources, &fetcher).await?;
    if !added.is_empty() {
        let pairs: Vec<String> = added.iter().map(ToString::to_string).collect();
        tracing::info!(pairs = ?pairs, "Installed language packs");
    }
    Ok(())
}

/// Split text into sentence-sized pieces so long transcripts stay within
/// the model's input length. Terminators stay attached to their sentence.
pub(crate) fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        let is_terminator = matches!(ch, '.' | '!' | '?' | '؟' | '۔' | '\n');
        let at_boundary = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
        if is_terminator && at_boundary {
            let end = idx + ch.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}
