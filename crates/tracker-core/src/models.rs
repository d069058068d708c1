//! Data models for the confidence tracker
//!
//! Defines the core data structures: confidence levels, the flattened
//! confidence map exchanged with the server, single entries and users.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Flattened `problemKey -> confidenceLevel` mapping.
///
/// Levels are kept as raw strings so that values written by a newer
/// client (levels this build does not know) survive a round trip.
pub type ConfidenceMap = BTreeMap<String, String>;

/// How confident the user is about a tracked problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    None,
    Low,
    Medium,
    High,
    Expert,
}

impl ConfidenceLevel {
    /// All known levels, lowest first
    pub const ALL: [ConfidenceLevel; 5] = [
        ConfidenceLevel::None,
        ConfidenceLevel::Low,
        ConfidenceLevel::Medium,
        ConfidenceLevel::High,
        ConfidenceLevel::Expert,
    ];

    /// Wire/storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::None => "none",
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Expert => "expert",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            ConfidenceLevel::None => "Not Attempted",
            ConfidenceLevel::Low => "Low",
            ConfidenceLevel::Medium => "Medium",
            ConfidenceLevel::High => "High",
            ConfidenceLevel::Expert => "Expert",
        }
    }

    /// Parse a stored level, returning `None` for values outside the known set
    pub fn parse(value: &str) -> Option<Self> {
        value.parse().ok()
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown confidence level
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown confidence level '{0}'. Expected one of: none, low, medium, high, expert")]
pub struct UnknownLevel(pub String);

impl FromStr for ConfidenceLevel {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ConfidenceLevel::None),
            "low" => Ok(ConfidenceLevel::Low),
            "medium" => Ok(ConfidenceLevel::Medium),
            "high" => Ok(ConfidenceLevel::High),
            "expert" => Ok(ConfidenceLevel::Expert),
            other => Err(UnknownLevel(other.to_string())),
        }
    }
}

/// A single stored confidence annotation, as returned by the server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceEntry {
    pub problem_key: String,
    pub confidence_level: String,
    #[serde(default)]
    pub sheet_name: Option<String>,
    #[serde(default)]
    pub problem_title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An account on the hosted service
///
/// Never carries credential material.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A freshly created account
    pub fn new(username: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parse_known() {
        for level in ConfidenceLevel::ALL {
            assert_eq!(ConfidenceLevel::parse(level.as_str()), Some(level));
        }
    }

    #[test]
    fn test_level_parse_unknown() {
        assert_eq!(ConfidenceLevel::parse("bogus"), None);
        assert_eq!(ConfidenceLevel::parse("High"), None);

        let err = "bogus".parse::<ConfidenceLevel>().unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_level_serde_lowercase() {
        let json = serde_json::to_string(&ConfidenceLevel::Expert).unwrap();
        assert_eq!(json, "\"expert\"");
        let level: ConfidenceLevel = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(level, ConfidenceLevel::Medium);
    }

    #[test]
    fn test_level_ordering() {
        assert!(ConfidenceLevel::None < ConfidenceLevel::Low);
        assert!(ConfidenceLevel::High < ConfidenceLevel::Expert);
    }

    #[test]
    fn test_entry_camel_case() {
        let now = Utc::now();
        let entry = ConfidenceEntry {
            problem_key: "sheet_0_1_Two Sum".to_string(),
            confidence_level: "high".to_string(),
            sheet_name: None,
            problem_title: Some("Two Sum".to_string()),
            created_at: now,
            updated_at: now,
        };

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["problemKey"], "sheet_0_1_Two Sum");
        assert_eq!(value["confidenceLevel"], "high");
        assert_eq!(value["problemTitle"], "Two Sum");
    }
}
