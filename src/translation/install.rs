//! Installing missing language packs from the Hugging Face Hub.
//!
//! A pack repository holds the files in [`PACKAGE_FILES`] at its root.
//! Downloads go through the hub cache in `<packages_dir>/.hub-cache`, are
//! copied into a hidden staging directory and renamed to `<from>-<to>` once
//! every file is present, so a half-finished install is never picked up by
//! [`scan_packages`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::packages::{missing_pairs, scan_packages, LanguagePair, PACKAGE_FILES};

/// Hub cache directory, relative to the packages directory.
pub const HUB_CACHE_DIR: &str = ".hub-cache";

/// Where each pair's pack is published.
#[derive(Debug, Clone, Default)]
pub struct PackageSources {
    repos: BTreeMap<String, String>,
    template: Option<String>,
}

impl PackageSources {
    /// `repos` maps `<from>-<to>` to a repository id; `template` covers the
    /// other pairs through `{from}` and `{to}` placeholders.
    pub fn new(repos: BTreeMap<String, String>, template: Option<String>) -> Self {
        Self { repos, template }
    }

    /// Repository for `pair`. An explicit entry wins over the template.
    pub fn repo_for(&self, pair: &LanguagePair) -> Option<String> {
        if let Some(repo) = self.repos.get(&pair.to_string()) {
            return Some(repo.clone());
        }
        self.template
            .as_ref()
            .map(|template| template.replace("{from}", &pair.from).replace("{to}", &pair.to))
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty() && self.template.is_none()
    }
}

/// Source of pack files.
#[async_trait]
pub trait PackageFetcher: Send + Sync {
    /// Local path of `file` from `repo`, downloading it when needed.
    async fn fetch(&self, repo: &str, file: &str) -> Result<PathBuf>;
}

/// Fetches pack files with `hf-hub`, reusing its on-disk cache.
pub struct HubPackageFetcher {
    api: hf_hub::api::tokio::Api,
}

impl HubPackageFetcher {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        use hf_hub::api::tokio::ApiBuilder;

        let api = ApiBuilder::new()
            .with_cache_dir(cache_dir)
            .with_token(std::env::var("HF_TOKEN").ok())
            .with_progress(false)
            .build()
            .context("Failed to initialize Hugging Face API client")?;
        Ok(Self { api })
    }
}

#[async_trait]
impl PackageFetcher for HubPackageFetcher {
    async fn fetch(&self, repo: &str, file: &str) -> Result<PathBuf> {
        self.api
            .model(repo.to_string())
            .get(file)
            .await
            .with_context(|| format!("Failed to download {} from {}", file, repo))
    }
}

/// Install every required pair that is missing under `root`.
///
/// A pair without a configured source, or whose download fails, is logged
/// and skipped; the English pivot covers it at request time. Returns the
/// pairs that were installed.
pub async fn install_missing_packages(
    root: &Path,
    sources: &PackageSources,
    fetcher: &dyn PackageFetcher,
) -> Result<Vec<LanguagePair>> {
    let installed = scan_packages(root)
        .with_context(|| format!("Failed to scan language packs in {}", root.display()))?;
    let missing = missing_pairs(installed.iter().map(|package| &package.pair));

    let mut added = Vec::new();
    for pair in missing {
        let Some(repo) = sources.repo_for(&pair) else {
            tracing::warn!(pair = %pair, "No source configured for missing language pack");
            continue;
        };

        tracing::info!(pair = %pair, repo = %repo, "Installing language pack");
        match install_package(root, &pair, &repo, fetcher).await {
            Ok(()) => added.push(pair),
            Err(e) => tracing::warn!(
                pair = %pair,
                repo = %repo,
                error = %format!("{:#}", e),
                "Language pack install failed, the English pivot will be used"
            ),
        }
    }

    Ok(added)
}

async fn install_package(
    root: &Path,
    pair: &LanguagePair,
    repo: &str,
    fetcher: &dyn PackageFetcher,
) -> Result<()> {
    let staging = root.join(format!(".{}.partial", pair));
    if staging.exists() {
        tokio::fs::remove_dir_all(&staging).await?;
    }
    tokio::fs::create_dir_all(&staging).await?;

    let result = copy_package(&staging, root, pair, repo, fetcher).await;
    if result.is_err() {
        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            tracing::warn!(dir = ?staging, "Failed to remove staging directory: {}", e);
        }
    }
    result
}

async fn copy_package(
    staging: &Path,
    root: &Path,
    pair: &LanguagePair,
    repo: &str,
    fetcher: &dyn PackageFetcher,
) -> Result<()> {
    for file in PACKAGE_FILES {
        let source = fetcher.fetch(repo, file).await?;
        tokio::fs::copy(&source, staging.join(file))
            .await
            .with_context(|| format!("Failed to copy {} into {}", file, staging.display()))?;
    }

    // An incomplete pack left by an older run is replaced
    let target = root.join(pair.to_string());
    if target.exists() {
        tokio::fs::remove_dir_all(&target).await?;
    }
    tokio::fs::rename(staging, &target)
        .await
        .with_context(|| format!("Failed to move pack into {}", target.display()))?;
    Ok(())
}
