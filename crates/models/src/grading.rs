use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// Top-level policy key holding the grader bucket list
pub const GRADER_KEY: &str = "GRADER";
/// Top-level policy key holding the grade cutoff mapping
pub const GRADE_CUTOFFS_KEY: &str = "GRADE_CUTOFFS";

/// A single grader bucket: a named category of assignments with a minimum
/// count, a drop count (lowest-N scores discarded) and a weight toward the
/// final grade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraderSpec {
    /// Assignment category, e.g. "Homework"
    #[serde(rename = "type")]
    pub grader_type: String,
    pub min_count: u32,
    pub drop_count: u32,
    /// Fraction of the total grade, 0.0-1.0
    pub weight: f64,
    /// Abbreviated label for progress displays, e.g. "HW"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_label: Option<String>,
}

/// Custom error type for grading policy resolution
#[derive(Debug, Clone, PartialEq)]
pub enum GradingPolicyError {
    /// GRADER was present but not an array
    GraderNotAList,
    /// A grader bucket failed to normalize into a [`GraderSpec`]
    InvalidGraderSpec { index: usize, reason: String },
    /// GRADE_CUTOFFS was present but not an object of numeric fractions
    InvalidCutoffs,
}

impl Display for GradingPolicyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::GraderNotAList => write!(f, "GRADER must be a list of grader buckets"),
            Self::InvalidGraderSpec { index, reason } => {
                write!(f, "Invalid grader bucket at index {index}: {reason}")
            }
            Self::InvalidCutoffs => {
                write!(f, "GRADE_CUTOFFS must map grade labels to numeric fractions")
            }
        }
    }
}

impl std::error::Error for GradingPolicyError {}

/// Returns a fresh copy of the default grading policy as a JSON object
///
/// Used verbatim for any top-level key the course policy does not supply.
pub fn default_grading_policy() -> Map<String, Value> {
    let default = json!({
        GRADER_KEY: [
            {
                "type": "Homework",
                "min_count": 12,
                "drop_count": 2,
                "short_label": "HW",
                "weight": 0.15
            },
            {
                "type": "Lab",
                "min_count": 12,
                "drop_count": 2,
                "weight": 0.15
            },
            {
                "type": "Midterm Exam",
                "short_label": "Midterm",
                "min_count": 1,
                "drop_count": 0,
                "weight": 0.3
            },
            {
                "type": "Final Exam",
                "short_label": "Final",
                "min_count": 1,
                "drop_count": 0,
                "weight": 0.4
            }
        ],
        GRADE_CUTOFFS_KEY: {
            "Pass": 0.5
        }
    });

    match default {
        Value::Object(map) => map,
        _ => unreachable!("default policy literal is an object"),
    }
}

/// Normalizes a raw grader list into typed specs
///
/// This is the fail-early handoff to the grader builder: a bucket the
/// builder could not consume is rejected here, before the course is
/// considered loaded. Weights are not checked to sum to 1.
pub fn normalize_graders(raw: &[Value]) -> Result<Vec<GraderSpec>, GradingPolicyError> {
    raw.iter()
        .enumerate()
        .map(|(index, value)| {
            serde_json::from_value(value.clone()).map_err(|e| {
                GradingPolicyError::InvalidGraderSpec {
                    index,
                    reason: e.to_string(),
                }
            })
        })
        .collect()
}

/// A resolved, queryable grading policy for one course
#[derive(Debug, Clone, PartialEq)]
pub struct GradingPolicy {
    graders: Vec<GraderSpec>,
    raw_graders: Vec<Value>,
    grade_cutoffs: BTreeMap<String, f64>,
}

impl GradingPolicy {
    /// Resolves a grading policy from the default and an optional course
    /// override
    ///
    /// The override may contain any subset of `GRADER` and `GRADE_CUTOFFS`;
    /// a key that is present replaces the default sub-tree wholesale (merge
    /// is by top-level key, never per-item). The pre-normalization grader
    /// list is retained for round-trip editing.
    pub fn resolve(
        default_policy: &Map<String, Value>,
        course_override: Option<&Map<String, Value>>,
    ) -> Result<Self, GradingPolicyError> {
        let mut policy = default_policy.clone();
        if let Some(overrides) = course_override {
            for (key, value) in overrides {
                policy.insert(key.clone(), value.clone());
            }
        }

        let raw_graders = match policy.get(GRADER_KEY) {
            Some(Value::Array(items)) => items.clone(),
            Some(_) => return Err(GradingPolicyError::GraderNotAList),
            None => Vec::new(),
        };
        let graders = normalize_graders(&raw_graders)?;

        let grade_cutoffs = match policy.get(GRADE_CUTOFFS_KEY) {
            Some(Value::Object(cutoffs)) => cutoffs
                .iter()
                .map(|(label, value)| {
                    value
                        .as_f64()
                        .map(|fraction| (label.clone(), fraction))
                        .ok_or(GradingPolicyError::InvalidCutoffs)
                })
                .collect::<Result<BTreeMap<_, _>, _>>()?,
            Some(_) => return Err(GradingPolicyError::InvalidCutoffs),
            None => BTreeMap::new(),
        };

        Ok(Self {
            graders,
            raw_graders,
            grade_cutoffs,
        })
    }

    /// The normalized grader buckets, in declaration order
    pub fn graders(&self) -> &[GraderSpec] {
        &self.graders
    }

    /// The pre-normalization grader list, retained for editing tools
    pub fn raw_graders(&self) -> &[Value] {
        &self.raw_graders
    }

    pub fn grade_cutoffs(&self) -> &BTreeMap<String, f64> {
        &self.grade_cutoffs
    }

    /// The smallest cutoff fraction that still earns a grade
    pub fn lowest_passing_grade(&self) -> Option<f64> {
        self.grade_cutoffs
            .values()
            .copied()
            .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Replaces the raw grader list in place
    ///
    /// Does NOT re-normalize the typed graders; callers that need the
    /// executable view updated must resolve a fresh policy.
    pub fn set_raw_graders(&mut self, value: Vec<Value>) {
        self.raw_graders = value;
    }

    pub fn set_grade_cutoffs(&mut self, value: BTreeMap<String, f64>) {
        self.grade_cutoffs = value;
    }
}
