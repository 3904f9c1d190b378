//! Normalized language-region codes.
//!
//! Transcription services, translation services and UI locales spell the
//! same language differently ("en-US", "en_us", "EN-us"). Everything the
//! relay compares goes through [`LanguageCode`] so equality is checked on
//! one canonical form: lowercase language, uppercase region, joined by `-`.

use crate::defaults;
use crate::error::{GuidecastError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default regions for bare language tags coming from UI locales.
const LOCALE_REGIONS: &[(&str, &str)] = &[
    ("en", "en-US"),
    ("ja", "ja-JP"),
    ("es", "es-US"),
    ("fr", "fr-FR"),
    ("de", "de-DE"),
    ("it", "it-IT"),
    ("pt", "pt-BR"),
    ("ko", "ko-KR"),
    ("zh", "zh-CN"),
];

/// A language-region code in canonical `ll-RR` form (region optional).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanguageCode(String);

impl LanguageCode {
    /// Parse and normalize a code such as `"en-US"`, `"ja_jp"` or `"fr"`.
    pub fn parse(code: &str) -> Result<Self> {
        let invalid = || GuidecastError::InvalidLanguage {
            code: code.to_string(),
        };

        let trimmed = code.trim();
        let mut parts = trimmed.split(['-', '_']);
        let language = parts.next().unwrap_or_default();
        let region = parts.next();
        if parts.next().is_some() {
            return Err(invalid());
        }

        if !(2..=3).contains(&language.len()) || !language.chars().all(|c| c.is_ascii_alphabetic())
        {
            return Err(invalid());
        }

        let mut normalized = language.to_ascii_lowercase();
        if let Some(region) = region {
            if !(2..=3).contains(&region.len())
                || !region.chars().all(|c| c.is_ascii_alphanumeric())
            {
                return Err(invalid());
            }
            normalized.push('-');
            normalized.push_str(&region.to_ascii_uppercase());
        }

        Ok(Self(normalized))
    }

    /// Map a UI locale to a full language-region code.
    ///
    /// Bare languages get their default region; anything unparseable or
    /// unknown falls back to [`defaults::DEFAULT_LANGUAGE`].
    pub fn from_locale(locale: &str) -> Self {
        match Self::parse(locale) {
            Ok(code) if code.region().is_some() => code,
            Ok(code) => LOCALE_REGIONS
                .iter()
                .find(|(language, _)| *language == code.language())
                .map(|(_, full)| Self((*full).to_string()))
                .unwrap_or_else(Self::default),
            Err(_) => Self::default(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The language part, e.g. `"ja"` for `"ja-JP"`.
    pub fn language(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }

    /// The region part, e.g. `"JP"` for `"ja-JP"`.
    pub fn region(&self) -> Option<&str> {
        self.0.split_once('-').map(|(_, region)| region)
    }
}

impl Default for LanguageCode {
    fn default() -> Self {
        Self(defaults::DEFAULT_LANGUAGE.to_string())
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LanguageCode {
    type Err = GuidecastError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for LanguageCode {
    type Error = GuidecastError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<LanguageCode> for String {
    fn from(code: LanguageCode) -> Self {
        code.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical_code() {
        let code = LanguageCode::parse("en-US").unwrap();
        assert_eq!(code.as_str(), "en-US");
        assert_eq!(code.language(), "en");
        assert_eq!(code.region(), Some("US"));
    }

    #[test]
    fn test_parse_normalizes_case_and_separator() {
        assert_eq!(LanguageCode::parse("ja_jp").unwrap().as_str(), "ja-JP");
        assert_eq!(LanguageCode::parse("EN-us").unwrap().as_str(), "en-US");
        assert_eq!(LanguageCode::parse("  fr-FR ").unwrap().as_str(), "fr-FR");
    }

    #[test]
    fn test_normalized_codes_compare_equal() {
        assert_eq!(
            LanguageCode::parse("en_us").unwrap(),
            LanguageCode::parse("en-US").unwrap()
        );
        assert_ne!(
            LanguageCode::parse("en-GB").unwrap(),
            LanguageCode::parse("en-US").unwrap()
        );
    }

    #[test]
    fn test_parse_language_without_region() {
        let code = LanguageCode::parse("ja").unwrap();
        assert_eq!(code.as_str(), "ja");
        assert_eq!(code.region(), None);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "e", "english", "e1-US", "en-", "en-US-x", "en-U$"] {
            match LanguageCode::parse(bad) {
                Err(GuidecastError::InvalidLanguage { code }) => assert_eq!(code, bad),
                other => panic!("Expected InvalidLanguage for {:?}, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn test_parse_accepts_numeric_region() {
        assert_eq!(LanguageCode::parse("es-419").unwrap().as_str(), "es-419");
    }

    #[test]
    fn test_from_locale_fills_default_region() {
        assert_eq!(LanguageCode::from_locale("ja").as_str(), "ja-JP");
        assert_eq!(LanguageCode::from_locale("en").as_str(), "en-US");
    }

    #[test]
    fn test_from_locale_keeps_explicit_region() {
        assert_eq!(LanguageCode::from_locale("en-GB").as_str(), "en-GB");
    }

    #[test]
    fn test_from_locale_falls_back_to_default() {
        assert_eq!(LanguageCode::from_locale("xx").as_str(), "en-US");
        assert_eq!(LanguageCode::from_locale("").as_str(), "en-US");
    }

    #[test]
    fn test_serde_normalizes() {
        let code: LanguageCode = serde_json::from_str("\"ja_jp\"").unwrap();
        assert_eq!(code.as_str(), "ja-JP");
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"ja-JP\"");
        assert!(serde_json::from_str::<LanguageCode>("\"??\"").is_err());
    }

    #[test]
    fn test_display_and_from_str() {
        let code: LanguageCode = "ko-kr".parse().unwrap();
        assert_eq!(code.to_string(), "ko-KR");
    }
}
