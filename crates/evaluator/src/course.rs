use crate::metadata::CourseMetadata;
use chrono::{DateTime, Utc};
use log::{error, warn};
use models::{
    exam::{ExamInfo, ExamWindow, ExamWindowError},
    grading::{
        GRADE_CUTOFFS_KEY, GRADER_KEY, GraderSpec, GradingPolicy, GradingPolicyError,
        default_grading_policy, normalize_graders,
    },
    timeparse::{format_date, parse_time},
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
};
use tocfetcher::{
    textbook::{Textbook, TextbookSource},
    toc::TocError,
};

/// A configured textbook: a display title and the base URL its table of
/// contents is fetched from
#[derive(Debug, Clone, Deserialize)]
pub struct TextbookRef {
    pub title: String,
    pub book_url: String,
}

/// Raw configuration for one course load
#[derive(Debug, Clone, Default)]
pub struct CourseConfig {
    pub metadata: CourseMetadata,
    pub textbooks: Vec<TextbookRef>,
    /// On-disk policy override, already decoded (see [`crate::policy_file`])
    pub grading_policy: Option<Map<String, Value>>,
}

/// Why a single textbook or exam was dropped during course load
#[derive(Debug)]
pub enum CourseItemError {
    Textbook(TocError),
    /// The exam-info object could not be deserialized at all
    ExamInfo(String),
    ExamWindow(ExamWindowError),
}

impl Display for CourseItemError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Textbook(e) => write!(f, "{e}"),
            Self::ExamInfo(e) => write!(f, "{e}"),
            Self::ExamWindow(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CourseItemError {}

/// Per-category grading expectations, summarized for quick grade queries
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryExpectation {
    pub min_count: u32,
    pub drop_count: u32,
    pub weight: f64,
    pub short_label: Option<String>,
}

impl From<GraderSpec> for CategoryExpectation {
    fn from(spec: GraderSpec) -> Self {
        Self {
            min_count: spec.min_count,
            drop_count: spec.drop_count,
            weight: spec.weight,
            short_label: spec.short_label,
        }
    }
}

/// A queryable summary of the grading scheme, derived once from the raw
/// grader list and cached until the policy is edited
#[derive(Debug, Clone, PartialEq)]
pub struct GradingContext {
    /// Grader buckets grouped by assignment category
    pub graded_categories: BTreeMap<String, Vec<CategoryExpectation>>,
    /// Sum of all bucket weights (not validated to be 1)
    pub total_weight: f64,
}

impl GradingContext {
    fn from_raw_graders(raw: &[Value]) -> Self {
        // Lenient here: a bucket the normalizer rejects is skipped with a
        // warning instead of failing the summary
        let specs = raw.iter().filter_map(|value| {
            match normalize_graders(std::slice::from_ref(value)) {
                Ok(mut specs) => specs.pop(),
                Err(e) => {
                    warn!("Skipping grader bucket in grading context: {e}");
                    None
                }
            }
        });

        let mut graded_categories: BTreeMap<String, Vec<CategoryExpectation>> = BTreeMap::new();
        let mut total_weight = 0.0;
        for spec in specs {
            total_weight += spec.weight;
            graded_categories
                .entry(spec.grader_type.clone())
                .or_default()
                .push(spec.into());
        }

        Self {
            graded_categories,
            total_weight,
        }
    }
}

/// A loaded course: one grading policy, zero-or-more textbooks,
/// zero-or-more test-center exam windows, plus its scalar dates
///
/// Construction degrades gracefully: a bad textbook or exam is logged,
/// recorded in `load_errors` and dropped, never failing the course.
#[derive(Debug)]
pub struct Course {
    id: String,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    enrollment_start: Option<DateTime<Utc>>,
    enrollment_end: Option<DateTime<Utc>>,
    advertised_start: Option<String>,
    is_new_flag: Option<bool>,
    grading_policy: GradingPolicy,
    /// Persisted-definition mirror of the policy override; the grading
    /// mutators echo new values back into it
    policy_definition: Map<String, Value>,
    textbooks: Vec<Textbook>,
    test_center_exams: Vec<ExamWindow>,
    load_errors: Vec<(String, CourseItemError)>,
    grading_context: Option<GradingContext>,
}

/// Parses an optional metadata date, treating a present-but-unparseable
/// value as absent (with a warning)
fn try_parse_metadata_time(
    course_id: &str,
    key: &str,
    value: Option<&str>,
) -> Option<DateTime<Utc>> {
    let value = value?;
    match parse_time(value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!("Course {course_id} has a bad '{key}' date: {e}");
            None
        }
    }
}

impl Course {
    /// Loads a course from raw configuration
    ///
    /// The only fatal error is a grader bucket the policy normalization
    /// rejects; everything else degrades to "feature absent" plus a log
    /// line and an entry in [`Course::load_errors`].
    pub fn load(
        id: &str,
        config: CourseConfig,
        source: &impl TextbookSource,
    ) -> Result<Self, GradingPolicyError> {
        let metadata = config.metadata;

        let grading_policy =
            GradingPolicy::resolve(&default_grading_policy(), config.grading_policy.as_ref())?;
        let policy_definition = config.grading_policy.unwrap_or_default();

        let start = try_parse_metadata_time(id, "start", metadata.start.as_deref());
        if start.is_none() {
            // Downstream "has started" checks treat a missing start as the
            // epoch, i.e. already started
            error!("Course loaded without a valid start date. id = {id}");
        }
        let end = try_parse_metadata_time(id, "end", metadata.end.as_deref());
        let enrollment_start =
            try_parse_metadata_time(id, "enrollment_start", metadata.enrollment_start.as_deref());
        let enrollment_end =
            try_parse_metadata_time(id, "enrollment_end", metadata.enrollment_end.as_deref());

        let mut load_errors = Vec::new();

        let mut textbooks = Vec::new();
        for book in config.textbooks {
            match Textbook::load(&book.title, &book.book_url, source) {
                Ok(textbook) => textbooks.push(textbook),
                Err(e) => {
                    // A book host being unreachable must not break the rest
                    // of the courseware
                    error!("Couldn't load textbook ({}, {}): {e}", book.title, book.book_url);
                    load_errors.push((book.title, CourseItemError::Textbook(e)));
                }
            }
        }

        let mut test_center_exams = Vec::new();
        if let Some(test_center_info) = metadata.testcenter_info {
            for (exam_name, raw_info) in test_center_info {
                let info: ExamInfo = match serde_json::from_value(raw_info) {
                    Ok(info) => info,
                    Err(e) => {
                        error!(
                            "Unable to read test-center exam info for exam \"{exam_name}\" \
                             of course \"{id}\": {e}"
                        );
                        load_errors.push((exam_name, CourseItemError::ExamInfo(e.to_string())));
                        continue;
                    }
                };
                match ExamWindow::new(id, &exam_name, &info) {
                    Ok(exam) => test_center_exams.push(exam),
                    Err(e) => {
                        error!(
                            "Error {e}: Unable to load test-center exam info for exam \
                             \"{exam_name}\" of course \"{id}\""
                        );
                        load_errors.push((exam_name, CourseItemError::ExamWindow(e)));
                    }
                }
            }
        }

        Ok(Self {
            id: id.to_string(),
            start,
            end,
            enrollment_start,
            enrollment_end,
            advertised_start: metadata.advertised_start,
            is_new_flag: metadata.is_new.map(|flag| flag.as_bool()),
            grading_policy,
            policy_definition,
            textbooks,
            test_center_exams,
            load_errors,
            grading_context: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The course start, defaulting to the epoch when unconfigured so that
    /// "has started" degrades to true
    pub fn start(&self) -> DateTime<Utc> {
        self.start.unwrap_or(DateTime::UNIX_EPOCH)
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    pub fn enrollment_start(&self) -> Option<DateTime<Utc>> {
        self.enrollment_start
    }

    pub fn enrollment_end(&self) -> Option<DateTime<Utc>> {
        self.enrollment_end
    }

    pub fn textbooks(&self) -> &[Textbook] {
        &self.textbooks
    }

    pub fn test_center_exams(&self) -> &[ExamWindow] {
        &self.test_center_exams
    }

    /// Items dropped during load, keyed by textbook title or exam name
    pub fn load_errors(&self) -> &[(String, CourseItemError)] {
        &self.load_errors
    }

    /// The persisted policy definition the mutators echo into
    pub fn policy_definition(&self) -> &Map<String, Value> {
        &self.policy_definition
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now > self.start()
    }

    /// False when no end date is specified
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        match self.end {
            Some(end) => now > end,
            None => false,
        }
    }

    /// Whole days until the course starts, preferring a parseable
    /// advertised start; time-of-day is truncated
    pub fn days_until_start(&self, now: DateTime<Utc>) -> i64 {
        let start_date = self
            .advertised_start
            .as_deref()
            .and_then(|advertised| parse_time(advertised).ok())
            .unwrap_or_else(|| self.start());

        (start_date - now).num_days()
    }

    /// A course is new if its metadata says so, or failing that if it has
    /// more than a day left before it starts
    pub fn is_new(&self, now: DateTime<Utc>) -> bool {
        match self.is_new_flag {
            Some(flag) => flag,
            None => self.days_until_start(now) > 1,
        }
    }

    /// Human-readable start text: a parseable advertised start is
    /// formatted, an unparseable one is passed through as free text, then
    /// the real start date, then "TBD"
    pub fn start_date_text(&self) -> String {
        if let Some(advertised) = self.advertised_start.as_deref() {
            return match parse_time(advertised) {
                Ok(parsed) => format_date(parsed),
                Err(_) => advertised.to_string(),
            };
        }

        match self.start {
            Some(start) => format_date(start),
            None => "TBD".to_string(),
        }
    }

    pub fn end_date_text(&self) -> Option<String> {
        self.end.map(format_date)
    }

    /// The exam currently open for registration, if any
    ///
    /// More than one qualifying window is a configuration smell pending
    /// stricter upstream validation; selection stays deterministic by
    /// taking the first in declaration order.
    pub fn current_test_center_exam(&self, now: DateTime<Utc>) -> Option<&ExamWindow> {
        let mut open = self
            .test_center_exams
            .iter()
            .filter(|exam| exam.has_started_registration(now) && !exam.has_ended(now));

        let first = open.next()?;
        if open.next().is_some() {
            warn!(
                "Course {} has more than one test-center exam open for registration; \
                 using \"{}\"",
                self.id,
                first.exam_name()
            );
        }
        Some(first)
    }

    pub fn graders(&self) -> &[GraderSpec] {
        self.grading_policy.graders()
    }

    pub fn raw_graders(&self) -> &[Value] {
        self.grading_policy.raw_graders()
    }

    pub fn grade_cutoffs(&self) -> &BTreeMap<String, f64> {
        self.grading_policy.grade_cutoffs()
    }

    pub fn lowest_passing_grade(&self) -> Option<f64> {
        self.grading_policy.lowest_passing_grade()
    }

    /// Replaces the raw grader list, echoing it into the persisted
    /// definition; the normalized graders are intentionally left as-is
    pub fn set_raw_graders(&mut self, value: Vec<Value>) {
        self.grading_policy.set_raw_graders(value.clone());
        self.policy_definition
            .insert(GRADER_KEY.to_string(), Value::Array(value));
        self.grading_context = None;
    }

    /// Replaces the grade cutoffs, echoing them into the persisted
    /// definition
    pub fn set_grade_cutoffs(&mut self, value: BTreeMap<String, f64>) {
        let mirror = value
            .iter()
            .map(|(label, fraction)| (label.clone(), Value::from(*fraction)))
            .collect();
        self.grading_policy.set_grade_cutoffs(value);
        self.policy_definition
            .insert(GRADE_CUTOFFS_KEY.to_string(), Value::Object(mirror));
        self.grading_context = None;
    }

    /// Computes the grading context once and caches the result; the grading
    /// mutators invalidate it
    pub fn grading_context(&mut self) -> &GradingContext {
        if self.grading_context.is_none() {
            self.grading_context = Some(GradingContext::from_raw_graders(
                self.grading_policy.raw_graders(),
            ));
        }
        self.grading_context
            .as_ref()
            .unwrap_or_else(|| unreachable!("grading context was just computed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use std::sync::Arc;
    use tocfetcher::toc::TocDocument;

    /// A textbook source serving a canned table of contents for every URL
    struct CannedSource;

    impl TextbookSource for CannedSource {
        fn fetch_toc(&self, _book_url: &str) -> Result<Arc<TocDocument>, TocError> {
            TocDocument::parse(r#"<toc><entry page="1"/><entry page="99"/></toc>"#).map(Arc::new)
        }
    }

    /// A textbook source whose host is always down
    struct FailingSource;

    impl TextbookSource for FailingSource {
        fn fetch_toc(&self, url: &str) -> Result<Arc<TocDocument>, TocError> {
            Err(TocError::Http {
                url: url.to_string(),
                status: 500,
            })
        }
    }

    fn metadata(value: Value) -> CourseMetadata {
        serde_json::from_value(value).unwrap()
    }

    fn load(config: CourseConfig) -> Course {
        Course::load("org/course/2013_Spring", config, &CannedSource).unwrap()
    }

    fn stringify(value: DateTime<Utc>) -> String {
        models::timeparse::stringify_time(value)
    }

    #[test]
    fn test_course_without_start_defaults_to_epoch() {
        let course = load(CourseConfig::default());

        assert_eq!(course.start(), DateTime::UNIX_EPOCH);
        // Degrades safely to "already started"
        assert!(course.has_started(Utc::now()));
        assert!(!course.has_ended(Utc::now()));
    }

    #[test]
    fn test_scalar_dates_parse_independently() {
        let course = load(CourseConfig {
            metadata: metadata(json!({
                "start": "2013-02-05T00:00",
                "end": "not a date",
                "enrollment_start": "2013-01-01T00:00"
            })),
            ..Default::default()
        });

        assert_eq!(stringify(course.start()), "2013-02-05T00:00");
        // Unparseable end is treated as absent, so the course never ends
        assert_eq!(course.end(), None);
        assert!(!course.has_ended(Utc::now()));
        assert!(course.enrollment_start().is_some());
        assert!(course.enrollment_end().is_none());
    }

    #[test]
    fn test_days_until_start() {
        let now = Utc::now();
        let course = load(CourseConfig {
            metadata: metadata(json!({ "start": stringify(now + Duration::days(5)) })),
            ..Default::default()
        });

        assert_eq!(course.days_until_start(now), 5);
    }

    #[test]
    fn test_days_until_start_prefers_parseable_advertised_start() {
        let now = Utc::now();
        let course = load(CourseConfig {
            metadata: metadata(json!({
                "start": stringify(now + Duration::days(5)),
                "advertised_start": stringify(now + Duration::days(12))
            })),
            ..Default::default()
        });

        assert_eq!(course.days_until_start(now), 12);
    }

    #[test]
    fn test_start_date_text_fallback_chain() {
        // Free-text advertised start passes through verbatim
        let course = load(CourseConfig {
            metadata: metadata(json!({
                "start": "2013-02-05T00:00",
                "advertised_start": "Spring 2013"
            })),
            ..Default::default()
        });
        assert_eq!(course.start_date_text(), "Spring 2013");

        // Parseable advertised start is formatted
        let course = load(CourseConfig {
            metadata: metadata(json!({ "advertised_start": "2013-02-05T00:00" })),
            ..Default::default()
        });
        assert_eq!(course.start_date_text(), "Feb 05, 2013");

        // No advertised start falls back to the real start
        let course = load(CourseConfig {
            metadata: metadata(json!({ "start": "2013-02-05T00:00" })),
            ..Default::default()
        });
        assert_eq!(course.start_date_text(), "Feb 05, 2013");

        // Nothing at all
        let course = load(CourseConfig::default());
        assert_eq!(course.start_date_text(), "TBD");
    }

    #[test]
    fn test_end_date_text() {
        let course = load(CourseConfig {
            metadata: metadata(json!({ "end": "2013-06-01T00:00" })),
            ..Default::default()
        });
        assert_eq!(course.end_date_text().as_deref(), Some("Jun 01, 2013"));

        assert_eq!(load(CourseConfig::default()).end_date_text(), None);
    }

    #[test]
    fn test_is_new() {
        let now = Utc::now();

        let course = load(CourseConfig {
            metadata: metadata(json!({ "is_new": "yes" })),
            ..Default::default()
        });
        assert!(course.is_new(now));

        let course = load(CourseConfig {
            metadata: metadata(json!({
                "is_new": false,
                "start": stringify(now + Duration::days(30))
            })),
            ..Default::default()
        });
        assert!(!course.is_new(now));

        // No flag: new iff more than a day until start
        let course = load(CourseConfig {
            metadata: metadata(json!({ "start": stringify(now + Duration::days(30)) })),
            ..Default::default()
        });
        assert!(course.is_new(now));

        let course = load(CourseConfig {
            metadata: metadata(json!({ "start": stringify(now - Duration::days(30)) })),
            ..Default::default()
        });
        assert!(!course.is_new(now));
    }

    #[test]
    fn test_textbooks_load_and_bad_books_are_dropped() {
        let books = vec![
            TextbookRef {
                title: "Circuits".to_string(),
                book_url: "http://books/circuits/".to_string(),
            },
            TextbookRef {
                title: "Signals".to_string(),
                book_url: "http://books/signals/".to_string(),
            },
        ];

        let course = load(CourseConfig {
            textbooks: books.clone(),
            ..Default::default()
        });
        assert_eq!(course.textbooks().len(), 2);
        assert_eq!(course.textbooks()[0].start_page(), 1);
        assert_eq!(course.textbooks()[1].end_page(), 99);

        // A course must still load with zero usable textbooks
        let course = Course::load(
            "org/course/2013_Spring",
            CourseConfig {
                textbooks: books,
                ..Default::default()
            },
            &FailingSource,
        )
        .unwrap();
        assert!(course.textbooks().is_empty());
        assert_eq!(course.load_errors().len(), 2);
        assert_eq!(course.load_errors()[0].0, "Circuits");
        assert!(matches!(
            course.load_errors()[0].1,
            CourseItemError::Textbook(TocError::Http { status: 500, .. })
        ));
    }

    #[test]
    fn test_bad_exam_is_dropped_and_others_survive() {
        let course = load(CourseConfig {
            metadata: metadata(json!({
                "testcenter_info": {
                    "Midterm": {
                        "First_Eligible_Appointment_Date": "2013-03-01T00:00",
                        "Last_Eligible_Appointment_Date": "2013-04-01T00:00"
                    },
                    "Broken": {
                        "Last_Eligible_Appointment_Date": "2013-04-01T00:00"
                    },
                    "Final": {
                        "First_Eligible_Appointment_Date": "2013-05-01T00:00",
                        "Last_Eligible_Appointment_Date": "2013-06-01T00:00"
                    }
                }
            })),
            ..Default::default()
        });

        let names: Vec<_> = course
            .test_center_exams()
            .iter()
            .map(|exam| exam.exam_name().to_string())
            .collect();
        assert_eq!(names, vec!["Midterm", "Final"]);

        assert_eq!(course.load_errors().len(), 1);
        assert_eq!(course.load_errors()[0].0, "Broken");
        assert!(matches!(
            course.load_errors()[0].1,
            CourseItemError::ExamWindow(ExamWindowError::MissingFirstEligibleDate)
        ));
    }

    #[test]
    fn test_undeserializable_exam_info_is_dropped() {
        let course = load(CourseConfig {
            metadata: metadata(json!({
                "testcenter_info": { "Weird": [1, 2, 3] }
            })),
            ..Default::default()
        });

        assert!(course.test_center_exams().is_empty());
        assert!(matches!(
            course.load_errors()[0].1,
            CourseItemError::ExamInfo(_)
        ));
    }

    #[test]
    fn test_current_test_center_exam_selection() {
        let course = load(CourseConfig {
            metadata: metadata(json!({
                "testcenter_info": {
                    "Past": {
                        "First_Eligible_Appointment_Date": "2013-01-01T00:00",
                        "Last_Eligible_Appointment_Date": "2013-02-01T00:00"
                    },
                    "Spring": {
                        "First_Eligible_Appointment_Date": "2013-03-01T00:00",
                        "Last_Eligible_Appointment_Date": "2013-06-01T00:00"
                    },
                    "Summer": {
                        "First_Eligible_Appointment_Date": "2013-06-01T00:00",
                        "Last_Eligible_Appointment_Date": "2013-09-01T00:00"
                    }
                }
            })),
            ..Default::default()
        });

        // Both Spring and Summer are registering (registration start
        // defaults to the epoch): first in declaration order wins
        let now = parse_time("2013-03-15T00:00").unwrap();
        assert_eq!(
            course.current_test_center_exam(now).unwrap().exam_name(),
            "Spring"
        );

        // Only Summer is still open
        let now = parse_time("2013-07-01T00:00").unwrap();
        assert_eq!(
            course.current_test_center_exam(now).unwrap().exam_name(),
            "Summer"
        );

        // Everything has ended
        let now = parse_time("2014-01-01T00:00").unwrap();
        assert!(course.current_test_center_exam(now).is_none());
    }

    #[test]
    fn test_grading_accessors_and_fatal_policy_error() {
        let course = load(CourseConfig::default());
        assert_eq!(course.graders().len(), 4);
        assert_eq!(course.grade_cutoffs().get("Pass"), Some(&0.5));
        assert_eq!(course.lowest_passing_grade(), Some(0.5));

        let result = Course::load(
            "org/course/2013_Spring",
            CourseConfig {
                grading_policy: json!({ "GRADER": [{ "type": "Quiz" }] })
                    .as_object()
                    .cloned(),
                ..Default::default()
            },
            &CannedSource,
        );
        assert!(matches!(
            result,
            Err(GradingPolicyError::InvalidGraderSpec { .. })
        ));
    }

    #[test]
    fn test_mutators_echo_into_policy_definition() {
        let mut course = load(CourseConfig {
            grading_policy: json!({}).as_object().cloned(),
            ..Default::default()
        });
        assert!(course.policy_definition().is_empty());

        let new_graders = vec![json!({
            "type": "Quiz", "min_count": 3, "drop_count": 0, "weight": 1.0
        })];
        course.set_raw_graders(new_graders.clone());
        assert_eq!(course.raw_graders(), &new_graders[..]);
        assert_eq!(
            course.policy_definition()["GRADER"],
            Value::Array(new_graders)
        );

        let cutoffs = BTreeMap::from([("A".to_string(), 0.9), ("Pass".to_string(), 0.6)]);
        course.set_grade_cutoffs(cutoffs.clone());
        assert_eq!(course.grade_cutoffs(), &cutoffs);
        assert_eq!(course.policy_definition()["GRADE_CUTOFFS"]["A"], 0.9);
    }

    #[test]
    fn test_grading_context_is_cached_and_invalidated() {
        let mut course = load(CourseConfig::default());

        let context = course.grading_context().clone();
        assert_eq!(context.graded_categories.len(), 4);
        assert!((context.total_weight - 1.0).abs() < 1e-9);
        assert_eq!(
            context.graded_categories["Homework"][0].short_label.as_deref(),
            Some("HW")
        );

        // Cached: a second call sees the same summary
        assert_eq!(course.grading_context(), &context);

        // Editing the raw graders invalidates the cache
        course.set_raw_graders(vec![json!({
            "type": "Quiz", "min_count": 3, "drop_count": 0, "weight": 1.0
        })]);
        let context = course.grading_context().clone();
        assert_eq!(context.graded_categories.len(), 1);
        assert!(context.graded_categories.contains_key("Quiz"));
    }

    #[test]
    fn test_grading_context_skips_unnormalizable_buckets() {
        let mut course = load(CourseConfig::default());
        course.set_raw_graders(vec![
            json!({ "type": "Quiz", "min_count": 3, "drop_count": 0, "weight": 0.5 }),
            json!({ "type": "Mystery" }),
        ]);

        let context = course.grading_context();
        assert_eq!(context.graded_categories.len(), 1);
        assert_eq!(context.total_weight, 0.5);
    }
}
