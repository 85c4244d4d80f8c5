//! Locale value with a canonical string form.

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::RuntimeError;

/// A language with optional country and variant.
///
/// The canonical name is `language[_COUNTRY[_variant]]`, e.g. `en_US`.
/// Parsing accepts `_` or `-` separators and normalizes case, so
/// `"EN-us"` and `"en_US"` denote the same locale.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locale {
    language: String,
    country: Option<String>,
    variant: Option<String>,
}

impl Locale {
    /// Locale with only a language.
    pub fn language(language: &str) -> Result<Self, RuntimeError> {
        language.parse()
    }

    pub fn language_code(&self) -> &str {
        &self.language
    }

    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            country: None,
            variant: None,
        }
    }
}

impl FromStr for Locale {
    type Err = RuntimeError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let invalid = || RuntimeError::InvalidLocale(name.to_string());
        let mut parts = name.trim().splitn(3, ['_', '-']);

        let language = parts.next().unwrap_or_default();
        if !(2..=8).contains(&language.len()) || !language.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(invalid());
        }

        let country = match parts.next() {
            None | Some("") => None,
            Some(c) if (c.len() == 2 && c.chars().all(|ch| ch.is_ascii_alphabetic()))
                || (c.len() == 3 && c.chars().all(|ch| ch.is_ascii_digit())) =>
            {
                Some(c.to_ascii_uppercase())
            }
            Some(_) => return Err(invalid()),
        };

        let variant = match parts.next() {
            None | Some("") => None,
            Some(v) if v.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-') => {
                Some(v.to_string())
            }
            Some(_) => return Err(invalid()),
        };

        Ok(Self {
            language: language.to_ascii_lowercase(),
            country,
            variant,
        })
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.language)?;
        match (&self.country, &self.variant) {
            (Some(country), Some(variant)) => write!(f, "_{country}_{variant}"),
            (Some(country), None) => write!(f, "_{country}"),
            (None, Some(variant)) => write!(f, "__{variant}"),
            (None, None) => Ok(()),
        }
    }
}

impl Serialize for Locale {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_names() {
        assert_eq!("en_US".parse::<Locale>().unwrap().to_string(), "en_US");
        assert_eq!("EN-us".parse::<Locale>().unwrap().to_string(), "en_US");
        assert_eq!("de".parse::<Locale>().unwrap().to_string(), "de");
        assert_eq!("es_419".parse::<Locale>().unwrap().to_string(), "es_419");
        assert_eq!(
            "no_NO_NY".parse::<Locale>().unwrap().to_string(),
            "no_NO_NY"
        );
        assert_eq!("en__POSIX".parse::<Locale>().unwrap().to_string(), "en__POSIX");
    }

    #[test]
    fn test_rejects_garbage() {
        for bad in ["", "e", "english-language", "en_USA1", "12"] {
            assert!(bad.parse::<Locale>().is_err(), "{bad:?} should be rejected");
        }
    }
}
