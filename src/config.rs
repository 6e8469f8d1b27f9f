//! # Configuration Management
//!
//! Loads service configuration from several layered sources:
//! - Built-in defaults (the `Default` impl below)
//! - An optional `config.toml` in the working directory
//! - `APP_`-prefixed environment variables (`APP_SERVER__PORT=9000`)
//! - Deployment-style variables such as `PORT`, `WHISPER_MODEL` or `API_KEY`
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Deployment variables (see [`ENV_OVERRIDES`])
//! 2. `APP_` environment variables
//! 3. Configuration file (config.toml)
//! 4. Default values

use crate::device::{parse_compute_type, DevicePreference};
use crate::language::TargetLanguage;
use crate::translation::packages::LanguagePair;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

/// Plain environment variables honoured on top of the `APP_` prefix scheme.
///
/// Container platforms usually inject `HOST`/`PORT`; the rest keep the names
/// operators already use for the speech models.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("HOST", "server.host"),
    ("PORT", "server.port"),
    ("WHISPER_MODEL", "models.whisper_model"),
    ("WHISPER_MODEL_DIR", "models.model_dir"),
    ("COMPUTE_TYPE", "models.compute_type"),
    ("CPU_THREADS", "models.cpu_threads"),
    ("NUM_WORKERS", "models.num_workers"),
    ("DEFAULT_TARGET_LANG", "api.default_target_lang"),
    ("API_KEY", "api.api_key"),
    ("TRANSLATION_BACKEND", "translation.backend"),
    ("TRANSLATE_URL", "translation.remote_url"),
    ("TRANSLATE_API_KEY", "translation.remote_api_key"),
    ("TRANSLATE_PACKAGE_REPO", "translation.package_repo_template"),
];

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Each section maps to one collaborator (HTTP server, speech models,
/// translation backend, API surface, audio conversion, static pages), so a
/// component only ever borrows the section it needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub translation: TranslationConfig,
    pub api: ApiConfig,
    pub audio: AudioConfig,
    pub pages: PagesConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Speech-recognition model settings.
///
/// ## Fields:
/// - `whisper_model`: Size name (`tiny`, `base`, `small`, `medium`, `large-v3`,
///   `large-v3-turbo`) or a full Hugging Face repository id
/// - `model_dir`: Where downloaded model files are cached
/// - `compute_type`: Tensor precision (`f32`, `f16`, `bf16`)
/// - `device`: `auto`, `cpu`, `cuda` or `metal`
/// - `cpu_threads`: Threads used by CPU kernels, 0 means all cores
/// - `num_workers`: Model replicas, i.e. how many transcriptions run in parallel
/// - `vad_filter`: Skip non-speech regions before decoding
/// - `min_silence_duration_ms`: Silence needed to close a speech region
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub whisper_model: String,
    pub model_dir: PathBuf,
    pub compute_type: String,
    pub device: String,
    pub cpu_threads: usize,
    pub num_workers: usize,
    pub vad_filter: bool,
    pub min_silence_duration_ms: usize,
}

/// Which translation backend serves `translate` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationBackendKind {
    /// Locally installed language packs, no network access
    Offline,
    /// A LibreTranslate-compatible HTTP service
    Remote,
}

impl std::fmt::Display for TranslationBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranslationBackendKind::Offline => write!(f, "offline"),
            TranslationBackendKind::Remote => write!(f, "remote"),
        }
    }
}

/// Translation backend settings. `packages_dir` and the package fields are
/// only read by the offline backend, the `remote_*` fields only by the
/// remote one.
///
/// Missing packs are downloaded at startup when `auto_install` is on:
/// `package_repos` maps a pair such as `en-tr` to a Hugging Face repository,
/// and `package_repo_template` (e.g. `my-org/marian-{from}-{to}`) covers the
/// pairs without an entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    pub backend: TranslationBackendKind,
    pub packages_dir: PathBuf,
    pub auto_install: bool,
    #[serde(default)]
    pub package_repos: BTreeMap<String, String>,
    pub package_repo_template: Option<String>,
    pub remote_url: Option<String>,
    pub remote_api_key: Option<String>,
    pub timeout_secs: u64,
}

/// Public API behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Shared secret expected in `X-API-Key`; `None` disables the check
    pub api_key: Option<String>,
    /// Display name used when the form omits `target_lang`
    pub default_target_lang: String,
}

/// Upload limits and the external transcoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub ffmpeg_path: PathBuf,
    /// Parent for per-request scratch directories; the system temp dir when unset
    pub temp_dir: Option<PathBuf>,
    pub conversion_timeout_secs: u64,
    pub min_audio_bytes: usize,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagesConfig {
    pub landing_page: PathBuf,
    pub privacy_policy: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            models: ModelsConfig {
                whisper_model: "medium".to_string(),
                model_dir: PathBuf::from("models/whisper"),
                compute_type: "f32".to_string(),
                device: "auto".to_string(),
                cpu_threads: 0,
                num_workers: 2,
                vad_filter: true,
                min_silence_duration_ms: 500,
            },
            translation: TranslationConfig {
                backend: TranslationBackendKind::Offline,
                packages_dir: PathBuf::from("models/translate"),
                auto_install: true,
                package_repos: BTreeMap::new(),
                package_repo_template: None,
                remote_url: None,
                remote_api_key: None,
                timeout_secs: 30,
            },
            api: ApiConfig {
                api_key: None,
                default_target_lang: "English".to_string(),
            },
            audio: AudioConfig {
                ffmpeg_path: PathBuf::from("ffmpeg"),
                temp_dir: None,
                conversion_timeout_secs: 10,
                min_audio_bytes: 1000,
                max_upload_bytes: 50 * 1024 * 1024,
            },
            pages: PagesConfig {
                landing_page: PathBuf::from("static/index.html"),
                privacy_policy: PathBuf::from("privacy_policy.html"),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_TRANSLATION__BACKEND=remote`: Switch to the remote translator
    /// - `PORT=3000`, `WHISPER_MODEL=small`: Deployment-style overrides
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        for (var, key) in ENV_OVERRIDES {
            if let Ok(value) = env::var(var) {
                settings = settings.set_override(*key, value)?;
            }
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - At least one transcription worker
    /// - The default target language is one of the supported display names
    /// - Compute type and device preference parse
    /// - Remote backend has a URL
    /// - Pack repository keys are pairs and the template names both languages
    /// - Timeouts and size limits are non-zero and consistent
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow!("Server port cannot be 0"));
        }

        if self.models.num_workers == 0 {
            return Err(anyhow!("Number of transcription workers must be greater than 0"));
        }

        parse_compute_type(&self.models.compute_type)?;
        self.models
            .device
            .parse::<DevicePreference>()
            .map_err(|e| anyhow!(e))?;

        if TargetLanguage::from_name(&self.api.default_target_lang).is_none() {
            return Err(anyhow!(
                "Default target language '{}' is not supported",
                self.api.default_target_lang
            ));
        }

        if self.translation.backend == TranslationBackendKind::Remote
            && self
                .translation
                .remote_url
                .as_deref()
                .map_or(true, |url| url.trim().is_empty())
        {
            return Err(anyhow!("Remote translation backend requires translation.remote_url"));
        }

        for pair in self.translation.package_repos.keys() {
            if LanguagePair::parse(pair).is_none() {
                return Err(anyhow!(
                    "translation.package_repos key '{}' is not a <from>-<to> pair",
                    pair
                ));
            }
        }

        if let Some(template) = &self.translation.package_repo_template {
            if !template.contains("{from}") || !template.contains("{to}") {
                return Err(anyhow!(
                    "translation.package_repo_template '{}' must contain {{from}} and {{to}}",
                    template
                ));
            }
        }

        if self.translation.timeout_secs == 0 || self.audio.conversion_timeout_secs == 0 {
            return Err(anyhow!("Timeouts must be greater than 0"));
        }

        if self.audio.max_upload_bytes < self.audio.min_audio_bytes {
            return Err(anyhow!(
                "audio.max_upload_bytes ({}) is below audio.min_audio_bytes ({})",
                self.audio.max_upload_bytes,
                self.audio.min_audio_bytes
            ));
        }

        Ok(())
    }

    /// The configured fallback target language.
    ///
    /// Only meaningful after [`AppConfig::validate`] has passed; falls back to
    /// English otherwise.
    pub fn default_target_language(&self) -> TargetLanguage {
        TargetLanguage::from_name(&self.api.default_target_lang).unwrap_or(TargetLanguage::English)
    }
}
