//! Offline translation over installed language packs.
//!
//! ## Routing:
//! 1. Direct pack `source-target` if installed
//! 2. Otherwise `source-en` then `en-target`, when both legs are installed
//! 3. Otherwise the pair cannot be translated

use async_trait::async_trait;
use candle_core::Device;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::marian::{MarianPackage, TranslationPackage};
use super::packages::{missing_pairs, scan_packages, LanguagePair};
use super::{TranslationError, Translator, PIVOT_LANGUAGE};

pub struct OfflineTranslator {
    packages: HashMap<LanguagePair, Arc<dyn TranslationPackage>>,
}

impl OfflineTranslator {
    /// Load every installed pack under `packages_dir`.
    ///
    /// Required pairs that are missing are only logged; they will be served
    /// through the pivot language when possible.
    pub fn load(packages_dir: &Path, device: &Device) -> anyhow::Result<Self> {
        let installed = scan_packages(packages_dir)?;
        tracing::info!(
            dir = ?packages_dir,
            installed = installed.len(),
            "Loading offline translation packs"
        );

        let mut packages: Vec<Arc<dyn TranslationPackage>> = Vec::with_capacity(installed.len());
        for pack in installed {
            let package = MarianPackage::load(pack.pair.clone(), &pack.dir, device)?;
            tracing::debug!(pair = %pack.pair, "Language pack loaded");
            packages.push(Arc::new(package));
        }

        let translator = Self::from_packages(packages);
        tracing::info!(pairs = ?translator.installed_pairs(), "Offline translator ready");
        Ok(translator)
    }

    pub fn from_packages(packages: Vec<Arc<dyn TranslationPackage>>) -> Self {
        let packages: HashMap<LanguagePair, Arc<dyn TranslationPackage>> = packages
            .into_iter()
            .map(|package| (package.pair().clone(), package))
            .collect();

        for pair in missing_pairs(packages.keys()) {
            tracing::warn!(
                pair = %pair,
                "Language pack not installed, will use pivot through English"
            );
        }

        Self { packages }
    }

    pub fn installed_pairs(&self) -> Vec<LanguagePair> {
        let mut pairs: Vec<LanguagePair> = self.packages.keys().cloned().collect();
        pairs.sort();
        pairs
    }

    fn package(&self, from: &str, to: &str) -> Option<Arc<dyn TranslationPackage>> {
        self.packages.get(&LanguagePair::new(from, to)).cloned()
    }

    /// Packages to run, in order, to get from `source` to `target`.
    pub fn route(
        &self,
        source: &str,
        target: &str,
    ) -> Result<Vec<Arc<dyn TranslationPackage>>, TranslationError> {
        if let Some(direct) = self.package(source, target) {
            return Ok(vec![direct]);
        }

        if source != PIVOT_LANGUAGE && target != PIVOT_LANGUAGE {
            if let (Some(first), Some(second)) = (
                self.package(source, PIVOT_LANGUAGE),
                self.package(PIVOT_LANGUAGE, target),
            ) {
                return Ok(vec![first, second]);
            }
        }

        Err(TranslationError::NoRoute {
            from: source.to_string(),
            to: target.to_string(),
        })
    }
}

#[async_trait]
impl Translator for OfflineTranslator {
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslationError> {
        let route = self.route(source, target)?;
        let hops: Vec<String> = route.iter().map(|p| p.pair().to_string()).collect();
        tracing::debug!(route = ?hops, "Translating offline");

        let mut current = text.to_string();
        for package in route {
            current = tokio::task::spawn_blocking(move || package.translate(&current))
                .await
                .map_err(|e| {
                    TranslationError::Backend(format!("translation task failed: {}", e))
                })??;
        }
        Ok(current)
    }

    fn describe(&self) -> String {
        format!("offline ({} packs)", self.packages.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tags text with the pair it went through, e.g. `[en-tr] hi`.
    struct TaggingPackage {
        pair: LanguagePair,
    }

    impl TranslationPackage for TaggingPackage {
        fn pair(&self) -> &LanguagePair {
            &self.pair
        }

        fn translate(&self, text: &str) -> Result<String, TranslationError> {
            Ok(format!("[{}] {}", self.pair, text))
        }
    }

    fn translator(pairs: &[(&str, &str)]) -> OfflineTranslator {
        OfflineTranslator::from_packages(
            pairs
                .iter()
                .map(|(from, to)| {
                    Arc::new(TaggingPackage {
                        pair: LanguagePair::new(*from, *to),
                    }) as Arc<dyn TranslationPackage>
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_direct_pair_is_preferred() {
        let t = translator(&[("tr", "fa"), ("tr", "en"), ("en", "fa")]);
        let out = t.translate("merhaba", "tr", "fa").await.unwrap();
        assert_eq!(out, "[tr-fa] merhaba");
    }

    #[tokio::test]
    async fn test_pivot_through_english() {
        let t = translator(&[("tr", "en"), ("en", "ar")]);
        let out = t.translate("merhaba", "tr", "ar").await.unwrap();
        assert_eq!(out, "[en-ar] [tr-en] merhaba");
        assert!(!out.is_empty());
    }

    #[tokio::test]
    async fn test_no_route() {
        let t = translator(&[("tr", "en")]);
        let err = t.translate("merhaba", "tr", "fa").await.unwrap_err();
        assert!(matches!(err, TranslationError::NoRoute { .. }));

        // English itself never pivots
        let err = t.translate("hello", "en", "fa").await.unwrap_err();
        assert!(matches!(err, TranslationError::NoRoute { .. }));
    }

    #[test]
    fn test_installed_pairs_sorted() {
        let t = translator(&[("tr", "en"), ("en", "ar")]);
        let pairs: Vec<String> = t.installed_pairs().iter().map(ToString::to_string).collect();
        assert_eq!(pairs, vec!["en-ar", "tr-en"]);
        assert_eq!(t.describe(), "offline (2 packs)");
    }
}
