use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

/// Upper bound of the grading scale.
pub const MAX_GRADE: f64 = 20.0;

/// Minimum average (inclusive) for a course to count as passed.
pub const PASS_THRESHOLD: f64 = MAX_GRADE / 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExamType {
    Midterm,
    Final,
    Quiz,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown exam type `{0}` (expected midterm, final or quiz)")]
pub struct ParseExamTypeError(pub String);

impl FromStr for ExamType {
    type Err = ParseExamTypeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "midterm" => Ok(ExamType::Midterm),
            "final" => Ok(ExamType::Final),
            "quiz" => Ok(ExamType::Quiz),
            _ => Err(ParseExamTypeError(value.to_string())),
        }
    }
}

impl fmt::Display for ExamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExamType::Midterm => "midterm",
            ExamType::Final => "final",
            ExamType::Quiz => "quiz",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    Graded,
    Pending,
}

/// Pass/fail state shared by course and semester averages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GradeStatus {
    Passed,
    Failed,
    Pending,
}

impl GradeStatus {
    pub fn from_average(average: Option<f64>) -> Self {
        match average {
            None => GradeStatus::Pending,
            Some(value) if value >= PASS_THRESHOLD => GradeStatus::Passed,
            Some(_) => GradeStatus::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GradeStatus::Passed => "passed",
            GradeStatus::Failed => "failed",
            GradeStatus::Pending => "pending",
        }
    }
}

impl fmt::Display for GradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One exam result joined with its exam and course metadata.
///
/// `grade` is `None` until the exam has been marked. `exam_weight` and
/// `credits` are optional because partially joined rows may lack them;
/// such values are left out of the sums rather than rejected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExamResult {
    pub exam_id: Uuid,
    pub exam_title: String,
    pub exam_type: ExamType,
    pub exam_date: NaiveDate,
    pub exam_weight: Option<f64>,
    pub course_id: Uuid,
    pub course_name: String,
    pub course_code: String,
    pub semester: i32,
    pub credits: Option<i32>,
    pub grade: Option<f64>,
}

impl ExamResult {
    pub fn status(&self) -> ResultStatus {
        if self.grade.is_some() {
            ResultStatus::Graded
        } else {
            ResultStatus::Pending
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseAverage {
    pub course_id: Uuid,
    pub course_name: String,
    pub course_code: String,
    pub semester: i32,
    pub credits: i32,
    pub average: Option<f64>,
    pub status: GradeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemesterAverage {
    pub academic_year: String,
    pub semester: i32,
    pub average: Option<f64>,
    pub credits: i32,
    pub status: GradeStatus,
}

/// Both aggregation passes for one student and academic year.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Transcript {
    pub courses: Vec<CourseAverage>,
    pub semesters: Vec<SemesterAverage>,
}

#[derive(Debug, Clone)]
pub struct ResultFilter {
    pub student_email: String,
    pub academic_year: Option<String>,
    pub semester: Option<i32>,
}
