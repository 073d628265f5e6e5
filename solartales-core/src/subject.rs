//! Subject keys and cache keys.
//!
//! A subject is the narrator persona a story is written for. The set is
//! open-ended; only the shape of the key is validated.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Longest accepted subject key.
pub const MAX_SUBJECT_LEN: usize = 64;

/// Validated subject key: lowercase ASCII letters, digits, `_` and `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[cfg_attr(feature = "openapi", schema(value_type = String, example = "astronaut"))]
#[serde(try_from = "String", into = "String")]
pub struct Subject(String);

impl Subject {
    /// Parse a raw key. Surrounding whitespace is trimmed and the key is
    /// lowercased before validation.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let normalized = raw.trim().to_ascii_lowercase();

        if normalized.is_empty() {
            return Err(ValidationError::InvalidSubject {
                subject: raw.to_string(),
                reason: "subject must not be empty".to_string(),
            });
        }

        if normalized.len() > MAX_SUBJECT_LEN {
            return Err(ValidationError::InvalidSubject {
                subject: raw.to_string(),
                reason: format!("subject exceeds {} characters", MAX_SUBJECT_LEN),
            });
        }

        if let Some(bad) = normalized
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-'))
        {
            return Err(ValidationError::InvalidSubject {
                subject: raw.to_string(),
                reason: format!("unexpected character {:?}", bad),
            });
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human-readable form: `aurora_hunter` becomes `aurora hunter`.
    pub fn display_name(&self) -> String {
        self.0.replace(['_', '-'], " ")
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Subject {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Subject {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Subject> for String {
    fn from(value: Subject) -> Self {
        value.0
    }
}

impl AsRef<str> for Subject {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Reading-level bracket a story can be tailored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum AgeGroup {
    #[serde(rename = "4-6")]
    Ages4To6,
    #[serde(rename = "7-9")]
    Ages7To9,
    #[serde(rename = "10-12")]
    Ages10To12,
}

impl AgeGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgeGroup::Ages4To6 => "4-6",
            AgeGroup::Ages7To9 => "7-9",
            AgeGroup::Ages10To12 => "10-12",
        }
    }

    /// Phrase used when asking a model to pitch the text at this level.
    pub fn reading_level(&self) -> &'static str {
        match self {
            AgeGroup::Ages4To6 => "children aged 4 to 6, using very short sentences",
            AgeGroup::Ages7To9 => "children aged 7 to 9, using simple sentences",
            AgeGroup::Ages10To12 => "children aged 10 to 12, introducing real science words",
        }
    }
}

impl fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgeGroup {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "4-6" => Ok(AgeGroup::Ages4To6),
            "7-9" => Ok(AgeGroup::Ages7To9),
            "10-12" => Ok(AgeGroup::Ages10To12),
            other => Err(ValidationError::InvalidValue {
                field: "age_group".to_string(),
                reason: format!("unknown age group {:?}", other),
            }),
        }
    }
}

/// Composite cache key: subject plus optional age-group filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub subject: Subject,
    pub age_group: Option<AgeGroup>,
}

impl CacheKey {
    /// Key covering every age group for a subject.
    pub fn subject(subject: Subject) -> Self {
        Self {
            subject,
            age_group: None,
        }
    }

    pub fn with_age_group(subject: Subject, age_group: Option<AgeGroup>) -> Self {
        Self { subject, age_group }
    }

    /// The subject-wide key this key widens to.
    pub fn widen(&self) -> Option<Self> {
        self.age_group.map(|_| Self::subject(self.subject.clone()))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.age_group {
            Some(age) => write!(f, "{}:{}", self.subject, age),
            None => write!(f, "{}", self.subject),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
