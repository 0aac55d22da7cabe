use serde::Deserialize;
use serde_json::{Map, Value};

/// A course "is new" marker, configured either as a boolean or as free text
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum IsNewFlag {
    Bool(bool),
    Text(String),
}

impl IsNewFlag {
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Bool(flag) => *flag,
            Self::Text(text) => {
                matches!(text.trim().to_lowercase().as_str(), "true" | "yes" | "y")
            }
        }
    }
}

/// Loosely-structured course metadata, every field independently optional
///
/// Date fields are strings in the shared timestamp grammar and are parsed
/// lazily by [`crate::course::Course::load`]. `testcenter_info` maps exam
/// name to a raw exam-info object; declaration order is preserved and
/// carries through to current-exam selection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CourseMetadata {
    pub start: Option<String>,
    pub end: Option<String>,
    pub enrollment_start: Option<String>,
    pub enrollment_end: Option<String>,
    /// Advertised start override: a timestamp, or free display text
    pub advertised_start: Option<String>,
    pub is_new: Option<IsNewFlag>,
    pub testcenter_info: Option<Map<String, Value>>,
}
