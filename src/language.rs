//! # Language Mapping
//!
//! The four languages the service can translate into, and the rules for
//! turning a recognizer-reported code into a routing code and a display value.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Code used for routing when the recognizer reports a language we
/// cannot translate from.
pub const FALLBACK_SOURCE_CODE: &str = "en";

/// Supported target languages.
///
/// Names and codes form a fixed one-to-one mapping; an unknown name is a
/// client error, never a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetLanguage {
    English,
    Turkish,
    Persian,
    Arabic,
}

impl TargetLanguage {
    pub const ALL: [TargetLanguage; 4] = [
        TargetLanguage::English,
        TargetLanguage::Turkish,
        TargetLanguage::Persian,
        TargetLanguage::Arabic,
    ];

    /// Look up a language by its display name (exact, case-sensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|lang| lang.name() == name)
    }

    /// Look up a language by its two-letter code.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|lang| lang.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            TargetLanguage::English => "English",
            TargetLanguage::Turkish => "Turkish",
            TargetLanguage::Persian => "Persian",
            TargetLanguage::Arabic => "Arabic",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            TargetLanguage::English => "en",
            TargetLanguage::Turkish => "tr",
            TargetLanguage::Persian => "fa",
            TargetLanguage::Arabic => "ar",
        }
    }
}

impl fmt::Display for TargetLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A recognizer-reported language resolved for the rest of the pipeline.
///
/// `routing_code` is what the translator sees; `display` is what the client
/// sees. They differ on purpose for unsupported languages: a Spanish clip is
/// translated as if it were English but still reported as `es`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub routing_code: &'static str,
    pub display: String,
}

impl ResolvedSource {
    pub fn from_detected(detected: &str) -> Self {
        match TargetLanguage::from_code(detected) {
            Some(lang) => Self {
                routing_code: lang.code(),
                display: lang.name().to_string(),
            },
            None => Self {
                routing_code: FALLBACK_SOURCE_CODE,
                display: detected.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_and_codes_are_bijective() {
        for lang in TargetLanguage::ALL {
            assert_eq!(TargetLanguage::from_name(lang.name()), Some(lang));
            assert_eq!(TargetLanguage::from_code(lang.code()), Some(lang));
        }
    }

    #[test]
    fn test_unknown_names_are_rejected() {
        assert_eq!(TargetLanguage::from_name("Klingon"), None);
        assert_eq!(TargetLanguage::from_name("english"), None);
        assert_eq!(TargetLanguage::from_name("en"), None);
    }

    #[test]
    fn test_supported_detection_uses_display_name() {
        let resolved = ResolvedSource::from_detected("fa");
        assert_eq!(resolved.routing_code, "fa");
        assert_eq!(resolved.display, "Persian");
    }

    #[test]
    fn test_unsupported_detection_routes_as_english() {
        let resolved = ResolvedSource::from_detected("es");
        assert_eq!(resolved.routing_code, "en");
        assert_eq!(resolved.display, "es");
    }

    #[test]
    fn test_display_name_is_not_accepted_as_code() {
        // A recognizer never reports display names; if it did, it is just another unknown code.
        let resolved = ResolvedSource::from_detected("Arabic");
        assert_eq!(resolved.routing_code, "en");
        assert_eq!(resolved.display, "Arabic");
    }
}
