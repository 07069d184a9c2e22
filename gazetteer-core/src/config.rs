//! Configuration types

use crate::*;
use serde::{Deserialize, Serialize};

/// Default number of saves allowed to run at the same time.
pub const DEFAULT_MAX_IN_FLIGHT_SAVES: usize = 32;

/// Batch engine configuration for one authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// National data model the authority follows.
    pub authority_variant: AuthorityVariant,
    /// Languages the authority maintains LPIs in. English is always present.
    pub languages: Vec<Language>,
    /// Count a property that could not be fetched as failed instead of skipping it.
    pub count_fetch_failures: bool,
    /// Upper bound on saves running concurrently.
    pub max_in_flight_saves: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            authority_variant: AuthorityVariant::GeoPlace,
            languages: vec![Language::English],
            count_fetch_failures: true,
            max_in_flight_saves: DEFAULT_MAX_IN_FLIGHT_SAVES,
        }
    }
}

impl BatchConfig {
    /// Configuration for a bilingual Welsh authority.
    pub fn welsh() -> Self {
        Self {
            languages: vec![Language::English, Language::Welsh],
            ..Self::default()
        }
    }

    /// Configuration for a OneScotland authority, optionally maintaining Gaelic LPIs.
    pub fn scottish(gaelic: bool) -> Self {
        let mut languages = vec![Language::English];
        if gaelic {
            languages.push(Language::Gaelic);
        }
        Self {
            authority_variant: AuthorityVariant::OneScotland,
            languages,
            ..Self::default()
        }
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `GAZETTEER_AUTHORITY_VARIANT`: `geoplace` or `onescotland` (default: geoplace)
    /// - `GAZETTEER_LANGUAGES`: comma separated codes, e.g. `ENG,CYM` (default: ENG)
    /// - `GAZETTEER_COUNT_FETCH_FAILURES`: count unfetchable properties as failed (default: true)
    /// - `GAZETTEER_MAX_IN_FLIGHT_SAVES`: concurrent save limit (default: 32)
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from `GAZETTEER_*` values supplied by `var`, falling back to
    /// defaults for anything missing or unparseable.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let authority_variant = var("GAZETTEER_AUTHORITY_VARIANT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.authority_variant);

        let languages = var("GAZETTEER_LANGUAGES")
            .map(|s| {
                s.split(',')
                    .filter_map(|code| code.parse::<Language>().ok())
                    .collect::<Vec<_>>()
            })
            .filter(|langs| !langs.is_empty())
            .unwrap_or(defaults.languages);

        let count_fetch_failures = var("GAZETTEER_COUNT_FETCH_FAILURES")
            .map(|s| s.to_lowercase() != "false" && s != "0")
            .unwrap_or(defaults.count_fetch_failures);

        let max_in_flight_saves = var("GAZETTEER_MAX_IN_FLIGHT_SAVES")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_in_flight_saves);

        Self {
            authority_variant,
            languages,
            count_fetch_failures,
            max_in_flight_saves,
        }
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - English is one of the configured languages
    /// - every language is possible for the authority variant
    /// - max_in_flight_saves > 0
    pub fn validate(&self) -> GazetteerResult<()> {
        if !self.languages.contains(&Language::English) {
            return Err(GazetteerError::Config(ConfigError::MissingRequired {
                field: "languages.ENG".to_string(),
            }));
        }

        if let Some(language) = self
            .languages
            .iter()
            .find(|l| !self.authority_variant.supports_language(**l))
        {
            return Err(GazetteerError::Config(ConfigError::IncompatibleOptions {
                option_a: format!("authority_variant={}", self.authority_variant),
                option_b: format!("language={}", language),
            }));
        }

        if self.max_in_flight_saves == 0 {
            return Err(GazetteerError::Config(ConfigError::InvalidValue {
                field: "max_in_flight_saves".to_string(),
                value: self.max_in_flight_saves.to_string(),
                reason: "max_in_flight_saves must be greater than 0".to_string(),
            }));
        }

        Ok(())
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Any positive save limit with a supported language set validates.
        #[test]
        fn prop_config_accepts_positive_save_limits(limit in 1usize..10_000, welsh in any::<bool>()) {
            let mut config = BatchConfig {
                max_in_flight_saves: limit,
                ..BatchConfig::default()
            };
            if welsh {
                config.languages.push(Language::Welsh);
            }
            prop_assert!(config.validate().is_ok());
        }
    }
}
