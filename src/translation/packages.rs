//! Language pack discovery.
//!
//! Packs are directories named `<from>-<to>` under the packages directory.
//! A pack is usable when it contains every file in [`PACKAGE_FILES`].

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::language::TargetLanguage;

/// Files every language pack directory must contain.
pub const PACKAGE_FILES: &[&str] = &[
    "config.json",
    "model.safetensors",
    "tokenizer-source.json",
    "tokenizer-target.json",
];

/// An ordered language pair such as `en -> tr`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LanguagePair {
    pub from: String,
    pub to: String,
}

impl LanguagePair {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Parse a pack directory name like `en-tr`.
    pub fn parse(name: &str) -> Option<Self> {
        let (from, to) = name.split_once('-')?;
        let valid = |code: &str| {
            (2..=3).contains(&code.len()) && code.chars().all(|c| c.is_ascii_lowercase())
        };
        (valid(from) && valid(to) && from != to).then(|| Self::new(from, to))
    }
}

impl fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from, self.to)
    }
}

/// Every ordered pair among the supported languages.
pub fn required_pairs() -> Vec<LanguagePair> {
    let mut pairs = Vec::new();
    for from in TargetLanguage::ALL {
        for to in TargetLanguage::ALL {
            if from != to {
                pairs.push(LanguagePair::new(from.code(), to.code()));
            }
        }
    }
    pairs
}

/// An installed pack found on disk.
#[derive(Debug, Clone)]
pub struct InstalledPackage {
    pub pair: LanguagePair,
    pub dir: PathBuf,
}

/// Scan `root` for installed packs, sorted by pair.
///
/// A missing root is not an error: it just means nothing is installed.
pub fn scan_packages(root: &Path) -> std::io::Result<Vec<InstalledPackage>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(pair) = name.to_str().and_then(LanguagePair::parse) else {
            continue;
        };

        let dir = entry.path();
        let missing: Vec<&str> = PACKAGE_FILES
            .iter()
            .copied()
            .filter(|file| !dir.join(file).is_file())
            .collect();
        if !missing.is_empty() {
            tracing::warn!(pair = %pair, missing = ?missing, "Ignoring incomplete language pack");
            continue;
        }

        found.push(InstalledPackage { pair, dir });
    }

    found.sort_by(|a, b| a.pair.cmp(&b.pair));
    Ok(found)
}

/// Required pairs that are not installed.
pub fn missing_pairs<'a>(
    installed: impl IntoIterator<Item = &'a LanguagePair>,
) -> Vec<LanguagePair> {
    let installed: Vec<&LanguagePair> = installed.into_iter().collect();
    required_pairs()
        .into_iter()
        .filter(|pair| !installed.contains(&pair))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_pack(root: &Path, name: &str, files: &[&str]) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        for file in files {
            std::fs::write(dir.join(file), b"{}").unwrap();
        }
    }

    #[test]
    fn test_pair_parsing() {
        assert_eq!(LanguagePair::parse("en-tr"), Some(LanguagePair::new("en", "tr")));
        assert_eq!(LanguagePair::parse("haw-en"), Some(LanguagePair::new("haw", "en")));
        assert_eq!(LanguagePair::parse("en-en"), None);
        assert_eq!(LanguagePair::parse("EN-tr"), None);
        assert_eq!(LanguagePair::parse("readme"), None);
    }

    #[test]
    fn test_required_pairs_are_all_permutations() {
        let pairs = required_pairs();
        assert_eq!(pairs.len(), 12);
        assert!(pairs.contains(&LanguagePair::new("fa", "ar")));
        assert!(pairs.iter().all(|p| p.from != p.to));
    }

    #[test]
    fn test_scan_skips_incomplete_packs() {
        let root = tempfile::tempdir().unwrap();
        make_pack(root.path(), "en-tr", PACKAGE_FILES);
        make_pack(root.path(), "tr-en", PACKAGE_FILES);
        make_pack(root.path(), "en-fa", &["config.json"]);
        make_pack(root.path(), "notes", PACKAGE_FILES);
        std::fs::write(root.path().join("fa-en"), b"not a directory").unwrap();

        let found = scan_packages(root.path()).unwrap();
        let pairs: Vec<String> = found.iter().map(|p| p.pair.to_string()).collect();
        assert_eq!(pairs, vec!["en-tr", "tr-en"]);
    }

    #[test]
    fn test_missing_root_means_nothing_installed() {
        let root = tempfile::tempdir().unwrap();
        let found = scan_packages(&root.path().join("absent")).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_missing_pairs() {
        let installed = vec![LanguagePair::new("en", "tr"), LanguagePair::new("tr", "en")];
        let missing = missing_pairs(&installed);
        assert_eq!(missing.len(), 10);
        assert!(!missing.contains(&LanguagePair::new("en", "tr")));
    }
}
