/// Query canonicalization and filter validation.
///
/// Word order, case, and catalogue stopwords ("tablet", "for", …) do not change
/// what a query means here, so they must not change its cache key either.

pub mod cache;

pub use cache::{CacheEntry, CacheKey, ResultCache};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::catalogue::MedicineRecord;
use crate::errors::PharmaError;
use crate::text;

/// Words removed from queries before matching.
pub const QUERY_STOPWORDS: &[&str] = &[
    "medicine", "medicines", "tablet", "tablets", "capsule", "capsules", "for", "the", "a", "an",
];

/// Longest accepted filter value, in characters.
pub const MAX_FILTER_LEN: usize = 200;

/// Canonical form of a raw query: lowercased, dosage strengths glued to their
/// units ("650 mg" → "650mg"), edge punctuation trimmed (keeping '%' and '+'),
/// stopwords removed, tokens sorted.
///
/// Returns an empty string when nothing meaningful remains.
pub fn normalize(raw: &str) -> String {
    let mut tokens: Vec<String> = text::glue_dosages(raw)
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !(c.is_alphanumeric() || c == '%' || c == '+')))
        .filter(|t| !t.is_empty() && !QUERY_STOPWORDS.contains(t))
        .map(str::to_string)
        .collect();
    tokens.sort();
    tokens.join(" ")
}

/// Result ordering requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Relevance,
    Confidence,
    Name,
    Manufacturer,
    Packaging,
}

impl SortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::Relevance => "relevance",
            SortBy::Confidence => "confidence",
            SortBy::Name => "name",
            SortBy::Manufacturer => "manufacturer",
            SortBy::Packaging => "packaging",
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortBy {
    type Err = PharmaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "relevance" => Ok(SortBy::Relevance),
            "confidence" => Ok(SortBy::Confidence),
            "name" => Ok(SortBy::Name),
            "manufacturer" => Ok(SortBy::Manufacturer),
            "packaging" | "packaging_type" => Ok(SortBy::Packaging),
            other => Err(PharmaError::invalid_filter(
                "sort_by",
                &format!(
                    "unknown sort key '{}' (expected relevance, confidence, name, manufacturer, packaging)",
                    other
                ),
            )),
        }
    }
}

/// Caller-supplied filters exactly as received.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub packaging_type: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub sort_by: Option<String>,
}

impl SearchFilters {
    pub fn packaging_type(mut self, value: impl Into<String>) -> Self {
        self.packaging_type = Some(value.into());
        self
    }

    pub fn manufacturer(mut self, value: impl Into<String>) -> Self {
        self.manufacturer = Some(value.into());
        self
    }

    pub fn sort_by(mut self, value: impl Into<String>) -> Self {
        self.sort_by = Some(value.into());
        self
    }

    /// Canonicalize and validate.
    ///
    /// Values are trimmed and lowercased; whitespace-only values count as
    /// absent. Control characters, over-long values, and unknown sort keys
    /// are rejected with a `Query` error naming the field.
    pub fn validate(&self) -> Result<ValidatedFilters, PharmaError> {
        let packaging_type = canonical_value("packaging_type", self.packaging_type.as_deref())?;
        let manufacturer = canonical_value("manufacturer", self.manufacturer.as_deref())?;
        let sort_by = match canonical_value("sort_by", self.sort_by.as_deref())? {
            Some(key) => key.parse()?,
            None => SortBy::default(),
        };
        Ok(ValidatedFilters {
            packaging_type,
            manufacturer,
            sort_by,
        })
    }
}

fn canonical_value(field: &str, value: Option<&str>) -> Result<Option<String>, PharmaError> {
    let Some(value) = value else {
        return Ok(None);
    };
    if value.chars().any(char::is_control) {
        return Err(PharmaError::invalid_filter(field, "value contains control characters"));
    }
    let trimmed = value.trim();
    if trimmed.chars().count() > MAX_FILTER_LEN {
        return Err(PharmaError::invalid_filter(
            field,
            &format!("value longer than {} characters", MAX_FILTER_LEN),
        ));
    }
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(trimmed.to_lowercase()))
}

/// Filters in canonical form; the only shape the pipeline and cache accept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ValidatedFilters {
    pub packaging_type: Option<String>,
    pub manufacturer: Option<String>,
    pub sort_by: SortBy,
}

impl ValidatedFilters {
    /// Post-scoring predicate: case-insensitive equality on trimmed values.
    pub fn matches(&self, record: &MedicineRecord) -> bool {
        let field_matches = |wanted: &Option<String>, actual: &str| match wanted {
            Some(w) => actual.trim().to_lowercase() == *w,
            None => true,
        };
        field_matches(&self.packaging_type, &record.packaging_type)
            && field_matches(&self.manufacturer, &record.manufacturer)
    }
}
