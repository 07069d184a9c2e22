//! Enum types for gazetteer records

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// CHANGE TAGGING
// ============================================================================

/// Per-row tag telling the repository what to do with the row on save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    #[serde(rename = "I")]
    Insert,
    #[serde(rename = "U")]
    Update,
    #[serde(rename = "D")]
    Delete,
}

impl ChangeType {
    /// Single-letter wire code.
    pub fn as_code(&self) -> &'static str {
        match self {
            ChangeType::Insert => "I",
            ChangeType::Update => "U",
            ChangeType::Delete => "D",
        }
    }

    /// Parse from the single-letter wire code.
    pub fn from_code(s: &str) -> Result<Self, ChangeTypeParseError> {
        match s.trim().to_ascii_uppercase().as_str() {
            "I" => Ok(ChangeType::Insert),
            "U" => Ok(ChangeType::Update),
            "D" => Ok(ChangeType::Delete),
            _ => Err(ChangeTypeParseError(s.to_string())),
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_code())
    }
}

impl FromStr for ChangeType {
    type Err = ChangeTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s)
    }
}

/// Error when parsing an invalid change type code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeTypeParseError(pub String);

impl fmt::Display for ChangeTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid change type: {}", self.0)
    }
}

impl std::error::Error for ChangeTypeParseError {}

// ============================================================================
// LOGICAL STATUS
// ============================================================================

/// BS7666 logical status of a BLPU or LPI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i16", try_from = "i16")]
pub enum LogicalStatus {
    Approved,
    Alternative,
    Candidate,
    Provisional,
    Rejected,
    Historical,
    RejectedExternal,
}

impl LogicalStatus {
    /// Numeric code as stored by the gazetteer.
    pub fn code(&self) -> i16 {
        match self {
            LogicalStatus::Approved => 1,
            LogicalStatus::Alternative => 3,
            LogicalStatus::Candidate => 5,
            LogicalStatus::Provisional => 6,
            LogicalStatus::Rejected => 7,
            LogicalStatus::Historical => 8,
            LogicalStatus::RejectedExternal => 9,
        }
    }

    /// Parse from the numeric code.
    pub fn from_code(code: i16) -> Result<Self, LogicalStatusParseError> {
        match code {
            1 => Ok(LogicalStatus::Approved),
            3 => Ok(LogicalStatus::Alternative),
            5 => Ok(LogicalStatus::Candidate),
            6 => Ok(LogicalStatus::Provisional),
            7 => Ok(LogicalStatus::Rejected),
            8 => Ok(LogicalStatus::Historical),
            9 => Ok(LogicalStatus::RejectedExternal),
            other => Err(LogicalStatusParseError(other)),
        }
    }

    /// Whether records in this status are still live.
    pub fn is_live(&self) -> bool {
        !matches!(
            self,
            LogicalStatus::Historical | LogicalStatus::Rejected | LogicalStatus::RejectedExternal
        )
    }
}

impl From<LogicalStatus> for i16 {
    fn from(status: LogicalStatus) -> Self {
        status.code()
    }
}

impl TryFrom<i16> for LogicalStatus {
    type Error = LogicalStatusParseError;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        Self::from_code(code)
    }
}

impl fmt::Display for LogicalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Error when a logical status code is not defined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalStatusParseError(pub i16);

impl fmt::Display for LogicalStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid logical status code: {}", self.0)
    }
}

impl std::error::Error for LogicalStatusParseError {}

// ============================================================================
// AUTHORITY CONFIGURATION
// ============================================================================

/// Language of an LPI or street descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "ENG")]
    English,
    #[serde(rename = "CYM")]
    Welsh,
    #[serde(rename = "GAE")]
    Gaelic,
}

impl Language {
    pub fn as_code(&self) -> &'static str {
        match self {
            Language::English => "ENG",
            Language::Welsh => "CYM",
            Language::Gaelic => "GAE",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "eng" | "english" => Ok(Language::English),
            "cym" | "welsh" => Ok(Language::Welsh),
            "gae" | "gaelic" => Ok(Language::Gaelic),
            _ => Err(format!("Invalid language: {}", s)),
        }
    }
}

/// Which national gazetteer data model the authority follows.
///
/// GeoPlace authorities (England and Wales) carry the classification on the
/// BLPU itself. OneScotland authorities keep a dated classification history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AuthorityVariant {
    #[default]
    GeoPlace,
    OneScotland,
}

impl AuthorityVariant {
    /// Whether classifications live in a separate dated collection.
    pub fn uses_classification_history(&self) -> bool {
        matches!(self, AuthorityVariant::OneScotland)
    }

    /// Whether the given language is possible for this variant at all.
    pub fn supports_language(&self, language: Language) -> bool {
        match (self, language) {
            (_, Language::English) => true,
            (AuthorityVariant::GeoPlace, Language::Welsh) => true,
            (AuthorityVariant::OneScotland, Language::Gaelic) => true,
            _ => false,
        }
    }
}

impl fmt::Display for AuthorityVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            AuthorityVariant::GeoPlace => "GeoPlace",
            AuthorityVariant::OneScotland => "OneScotland",
        };
        write!(f, "{}", value)
    }
}

impl FromStr for AuthorityVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "geoplace" | "gp" => Ok(AuthorityVariant::GeoPlace),
            "onescotland" | "os" | "scotland" => Ok(AuthorityVariant::OneScotland),
            _ => Err(format!("Invalid authority variant: {}", s)),
        }
    }
}

// ============================================================================
// ERROR CATEGORIES
// ============================================================================

/// Section of the property aggregate a field error belongs to.
///
/// Declaration order is the order lines appear in a rendered error report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorCategory {
    Blpu,
    Lpi,
    Provenance,
    CrossRef,
    Classification,
    Organisation,
    SuccessorCrossRef,
    Note,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 8] = [
        ErrorCategory::Blpu,
        ErrorCategory::Lpi,
        ErrorCategory::Provenance,
        ErrorCategory::CrossRef,
        ErrorCategory::Classification,
        ErrorCategory::Organisation,
        ErrorCategory::SuccessorCrossRef,
        ErrorCategory::Note,
    ];

    /// Label used in rendered error reports.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::Blpu => "BLPU",
            ErrorCategory::Lpi => "LPI",
            ErrorCategory::Provenance => "Provenance",
            ErrorCategory::CrossRef => "Cross reference",
            ErrorCategory::Classification => "Classification",
            ErrorCategory::Organisation => "Organisation",
            ErrorCategory::SuccessorCrossRef => "Successor cross reference",
            ErrorCategory::Note => "Note",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

fn normalize_token(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_type_wire_codes() {
        assert_eq!(serde_json::to_string(&ChangeType::Insert).unwrap(), "\"I\"");
        assert_eq!(serde_json::to_string(&ChangeType::Update).unwrap(), "\"U\"");
        assert_eq!(serde_json::to_string(&ChangeType::Delete).unwrap(), "\"D\"");
        let parsed: ChangeType = serde_json::from_str("\"D\"").unwrap();
        assert_eq!(parsed, ChangeType::Delete);
    }

    #[test]
    fn test_change_type_from_str_rejects_unknown() {
        assert_eq!("u".parse::<ChangeType>(), Ok(ChangeType::Update));
        assert!("X".parse::<ChangeType>().is_err());
    }

    #[test]
    fn test_logical_status_serialises_as_code() {
        assert_eq!(serde_json::to_string(&LogicalStatus::Approved).unwrap(), "1");
        assert_eq!(serde_json::to_string(&LogicalStatus::Historical).unwrap(), "8");
        let parsed: LogicalStatus = serde_json::from_str("6").unwrap();
        assert_eq!(parsed, LogicalStatus::Provisional);
        assert!(serde_json::from_str::<LogicalStatus>("2").is_err());
    }

    #[test]
    fn test_logical_status_liveness() {
        assert!(LogicalStatus::Approved.is_live());
        assert!(LogicalStatus::Provisional.is_live());
        assert!(!LogicalStatus::Historical.is_live());
    }

    #[test]
    fn test_language_parsing() {
        assert_eq!("ENG".parse::<Language>(), Ok(Language::English));
        assert_eq!("cym".parse::<Language>(), Ok(Language::Welsh));
        assert_eq!("Gaelic".parse::<Language>(), Ok(Language::Gaelic));
        assert!("fr".parse::<Language>().is_err());
    }

    #[test]
    fn test_authority_variant_language_support() {
        assert!(AuthorityVariant::GeoPlace.supports_language(Language::Welsh));
        assert!(!AuthorityVariant::GeoPlace.supports_language(Language::Gaelic));
        assert!(AuthorityVariant::OneScotland.supports_language(Language::Gaelic));
        assert!(!AuthorityVariant::OneScotland.supports_language(Language::Welsh));
        assert_eq!(
            "one-scotland".parse::<AuthorityVariant>(),
            Ok(AuthorityVariant::OneScotland)
        );
    }

    #[test]
    fn test_error_category_order_matches_report_order() {
        let mut sorted = ErrorCategory::ALL.to_vec();
        sorted.sort();
        assert_eq!(sorted, ErrorCategory::ALL.to_vec());
        assert_eq!(ErrorCategory::Blpu.label(), "BLPU");
    }
}
