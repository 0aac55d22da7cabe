use crate::timeparse::{format_date, parse_time};
use chrono::{DateTime, Utc};
use log::warn;
use serde::Deserialize;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Raw test-center exam metadata, as configured per course
///
/// Every field is optional at this layer; [`ExamWindow::new`] decides which
/// absences are fatal.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExamInfo {
    #[serde(rename = "First_Eligible_Appointment_Date")]
    pub first_eligible_appointment_date: Option<String>,
    #[serde(rename = "Last_Eligible_Appointment_Date")]
    pub last_eligible_appointment_date: Option<String>,
    #[serde(rename = "Registration_Start_Date")]
    pub registration_start_date: Option<String>,
    #[serde(rename = "Registration_End_Date")]
    pub registration_end_date: Option<String>,
    #[serde(rename = "Exam_Series_Code")]
    pub exam_series_code: Option<String>,
    #[serde(rename = "Exam_Display_Name")]
    pub exam_display_name: Option<String>,
}

/// Custom error type for exam window construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExamWindowError {
    MissingFirstEligibleDate,
    MissingLastEligibleDate,
    RegistrationStartAfterEnd,
    FirstEligibleAfterLast,
    RegistrationEndAfterLastEligible,
}

impl Display for ExamWindowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::MissingFirstEligibleDate => {
                write!(f, "First appointment date must be specified")
            }
            Self::MissingLastEligibleDate => {
                write!(f, "Last appointment date must be specified")
            }
            Self::RegistrationStartAfterEnd => {
                write!(f, "Registration start date must be before registration end date")
            }
            Self::FirstEligibleAfterLast => {
                write!(f, "First appointment date must be before last appointment date")
            }
            Self::RegistrationEndAfterLastEligible => {
                write!(f, "Registration end date must be before last appointment date")
            }
        }
    }
}

impl std::error::Error for ExamWindowError {}

/// A validated test-center exam offering: an eligibility period plus a
/// (possibly narrower) registration period
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamWindow {
    course_id: String,
    exam_name: String,
    series_code: String,
    display_name: String,
    first_eligible_date: DateTime<Utc>,
    last_eligible_date: DateTime<Utc>,
    registration_start: DateTime<Utc>,
    registration_end: DateTime<Utc>,
}

/// Parses an optional date field, treating a present-but-unparseable value
/// as absent (with a warning)
fn try_parse_field(
    course_id: &str,
    exam_name: &str,
    field: Option<&str>,
) -> Option<DateTime<Utc>> {
    let value = field?;
    match parse_time(value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!("Exam {exam_name} in course {course_id} has a bad date '{value}': {e}");
            None
        }
    }
}

impl ExamWindow {
    /// Builds a validated exam window from raw exam metadata
    ///
    /// Required: first/last eligible appointment dates. Defaults:
    /// registration start falls back to the Unix epoch, registration end to
    /// the last eligible date. The three date-ordering invariants are
    /// enforced here; a violation fails construction.
    pub fn new(
        course_id: &str,
        exam_name: &str,
        info: &ExamInfo,
    ) -> Result<Self, ExamWindowError> {
        let series_code = info
            .exam_series_code
            .clone()
            .unwrap_or_else(|| exam_name.to_string());
        let display_name = info
            .exam_display_name
            .clone()
            .unwrap_or_else(|| series_code.clone());

        let first_eligible_date = try_parse_field(
            course_id,
            exam_name,
            info.first_eligible_appointment_date.as_deref(),
        )
        .ok_or(ExamWindowError::MissingFirstEligibleDate)?;
        let last_eligible_date = try_parse_field(
            course_id,
            exam_name,
            info.last_eligible_appointment_date.as_deref(),
        )
        .ok_or(ExamWindowError::MissingLastEligibleDate)?;

        let registration_start =
            try_parse_field(course_id, exam_name, info.registration_start_date.as_deref())
                .unwrap_or(DateTime::UNIX_EPOCH);
        let registration_end =
            try_parse_field(course_id, exam_name, info.registration_end_date.as_deref())
                .unwrap_or(last_eligible_date);

        if registration_start > registration_end {
            return Err(ExamWindowError::RegistrationStartAfterEnd);
        }
        if first_eligible_date > last_eligible_date {
            return Err(ExamWindowError::FirstEligibleAfterLast);
        }
        if registration_end > last_eligible_date {
            return Err(ExamWindowError::RegistrationEndAfterLastEligible);
        }

        Ok(Self {
            course_id: course_id.to_string(),
            exam_name: exam_name.to_string(),
            series_code,
            display_name,
            first_eligible_date,
            last_eligible_date,
            registration_start,
            registration_end,
        })
    }

    pub fn course_id(&self) -> &str {
        &self.course_id
    }

    pub fn exam_name(&self) -> &str {
        &self.exam_name
    }

    pub fn series_code(&self) -> &str {
        &self.series_code
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn first_eligible_date(&self) -> DateTime<Utc> {
        self.first_eligible_date
    }

    pub fn last_eligible_date(&self) -> DateTime<Utc> {
        self.last_eligible_date
    }

    pub fn registration_start(&self) -> DateTime<Utc> {
        self.registration_start
    }

    pub fn registration_end(&self) -> DateTime<Utc> {
        self.registration_end
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now > self.first_eligible_date
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now > self.last_eligible_date
    }

    pub fn has_started_registration(&self, now: DateTime<Utc>) -> bool {
        now > self.registration_start
    }

    pub fn has_ended_registration(&self, now: DateTime<Utc>) -> bool {
        now > self.registration_end
    }

    /// True while `now` lies within the registration period, inclusive on
    /// both ends
    pub fn is_registering(&self, now: DateTime<Utc>) -> bool {
        now >= self.registration_start && now <= self.registration_end
    }

    pub fn first_eligible_date_text(&self) -> String {
        format_date(self.first_eligible_date)
    }

    pub fn last_eligible_date_text(&self) -> String {
        format_date(self.last_eligible_date)
    }

    pub fn registration_end_date_text(&self) -> String {
        format_date(self.registration_end)
    }
}
