use std::collections::HashMap;
use std::io;

use anyhow::Context;
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::{PgConnection, PgPool, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{ExamResult, ExamType, ParseExamTypeError, ResultFilter, MAX_GRADE};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("row {row}: {source}")]
    Csv {
        row: usize,
        #[source]
        source: csv::Error,
    },
    #[error("row {row}: {source}")]
    ExamType {
        row: usize,
        #[source]
        source: ParseExamTypeError,
    },
    #[error("row {row}: semester must be 1 or 2, got {value}")]
    Semester { row: usize, value: i32 },
    #[error("row {row}: credits must be positive, got {value}")]
    Credits { row: usize, value: i32 },
    #[error("row {row}: weight must be between 0 and 100, got {value}")]
    Weight { row: usize, value: f64 },
    #[error("row {row}: grade must be between 0 and 20, got {value}")]
    Grade { row: usize, value: f64 },
    #[error("row {row}: source key `{key}` already names an exam of course {first_course}, not {course}")]
    SourceKeyCourse {
        row: usize,
        key: String,
        first_course: String,
        course: String,
    },
}

/// One validated line of an exam result import.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRow {
    pub full_name: String,
    pub email: String,
    pub academic_year: String,
    pub course_code: String,
    pub course_name: String,
    pub semester: i32,
    pub credits: i32,
    pub exam_title: String,
    pub exam_type: ExamType,
    pub exam_date: NaiveDate,
    pub weight: f64,
    pub grade: Option<f64>,
    pub source_key: Option<String>,
}

impl ImportRow {
    fn exam_key(&self) -> String {
        self.source_key.clone().unwrap_or_else(|| {
            format!("{}:{}:{}", self.course_code, self.exam_title, self.exam_date)
        })
    }
}

#[derive(Deserialize)]
struct CsvRow {
    full_name: String,
    email: String,
    academic_year: String,
    course_code: String,
    course_name: String,
    semester: i32,
    credits: i32,
    exam_title: String,
    exam_type: String,
    exam_date: NaiveDate,
    weight: f64,
    grade: Option<f64>,
    source_key: Option<String>,
}

/// Parses and validates every row; an empty `grade` cell means ungraded.
/// Rows without an email are skipped.
pub fn parse_csv_rows<R: io::Read>(mut reader: csv::Reader<R>) -> Result<Vec<ImportRow>, ImportError> {
    let mut rows = Vec::new();
    let mut key_courses: HashMap<String, String> = HashMap::new();

    for (index, record) in reader.deserialize::<CsvRow>().enumerate() {
        // header is line 1
        let row = index + 2;
        let record = record.map_err(|source| ImportError::Csv { row, source })?;

        if record.email.trim().is_empty() {
            warn!(row, "skipping row without student email");
            continue;
        }

        let exam_type = record
            .exam_type
            .parse::<ExamType>()
            .map_err(|source| ImportError::ExamType { row, source })?;

        if !matches!(record.semester, 1 | 2) {
            return Err(ImportError::Semester {
                row,
                value: record.semester,
            });
        }

        if record.credits <= 0 {
            return Err(ImportError::Credits {
                row,
                value: record.credits,
            });
        }

        if !(0.0..=100.0).contains(&record.weight) {
            return Err(ImportError::Weight {
                row,
                value: record.weight,
            });
        }

        if let Some(grade) = record.grade {
            if !(0.0..=MAX_GRADE).contains(&grade) {
                return Err(ImportError::Grade { row, value: grade });
            }
        }

        let source_key = record.source_key.filter(|key| !key.trim().is_empty());
        if let Some(key) = &source_key {
            let first_course = key_courses
                .entry(key.clone())
                .or_insert_with(|| record.course_code.clone());
            if *first_course != record.course_code {
                return Err(ImportError::SourceKeyCourse {
                    row,
                    key: key.clone(),
                    first_course: first_course.clone(),
                    course: record.course_code,
                });
            }
        }

        rows.push(ImportRow {
            full_name: record.full_name,
            email: record.email.trim().to_string(),
            academic_year: record.academic_year,
            course_code: record.course_code,
            course_name: record.course_name,
            semester: record.semester,
            credits: record.credits,
            exam_title: record.exam_title,
            exam_type,
            exam_date: record.exam_date,
            weight: record.weight,
            grade: record.grade,
            source_key,
        });
    }

    Ok(rows)
}

async fn upsert_student(conn: &mut PgConnection, full_name: &str, email: &str) -> anyhow::Result<Uuid> {
    let id = sqlx::query(
        r#"
        INSERT INTO intranet.students (id, full_name, email)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO UPDATE
        SET full_name = EXCLUDED.full_name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(full_name)
    .bind(email)
    .fetch_one(&mut *conn)
    .await?
    .try_get("id")?;
    Ok(id)
}

async fn upsert_course(conn: &mut PgConnection, row: &ImportRow) -> anyhow::Result<Uuid> {
    let id = sqlx::query(
        r#"
        INSERT INTO intranet.courses (id, name, code, semester, credits)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (code) DO UPDATE
        SET name = EXCLUDED.name, semester = EXCLUDED.semester, credits = EXCLUDED.credits
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&row.course_name)
    .bind(&row.course_code)
    .bind(row.semester)
    .bind(row.credits)
    .fetch_one(&mut *conn)
    .await?
    .try_get("id")?;
    Ok(id)
}

// A reused source key moves the exam, and its results, to the row's course.
const UPSERT_EXAM: &str = r#"
    INSERT INTO intranet.exams (id, course_id, title, exam_type, exam_date, weight, source_key)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
    ON CONFLICT (source_key) DO UPDATE
    SET course_id = EXCLUDED.course_id, title = EXCLUDED.title, exam_type = EXCLUDED.exam_type,
        exam_date = EXCLUDED.exam_date, weight = EXCLUDED.weight
    RETURNING id
"#;

async fn upsert_exam(conn: &mut PgConnection, course_id: Uuid, row: &ImportRow) -> anyhow::Result<Uuid> {
    let id = sqlx::query(UPSERT_EXAM)
    .bind(Uuid::new_v4())
    .bind(course_id)
    .bind(&row.exam_title)
    .bind(row.exam_type.to_string())
    .bind(row.exam_date)
    .bind(row.weight)
    .bind(row.exam_key())
    .fetch_one(&mut *conn)
    .await?
    .try_get("id")?;
    Ok(id)
}

/// Writes one row; returns whether the stored result was inserted or changed.
async fn store_row(conn: &mut PgConnection, row: &ImportRow) -> anyhow::Result<bool> {
    let student_id = upsert_student(conn, &row.full_name, &row.email).await?;
    let course_id = upsert_course(conn, row).await?;

    sqlx::query(
        r#"
        INSERT INTO intranet.enrollments (student_id, course_id, academic_year)
        VALUES ($1, $2, $3)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(student_id)
    .bind(course_id)
    .bind(&row.academic_year)
    .execute(&mut *conn)
    .await?;

    let exam_id = upsert_exam(conn, course_id, row).await?;

    let result = sqlx::query(
        r#"
        INSERT INTO intranet.exam_results (exam_id, student_id, grade)
        VALUES ($1, $2, $3)
        ON CONFLICT (exam_id, student_id) DO UPDATE
        SET grade = EXCLUDED.grade, recorded_at = now()
        WHERE intranet.exam_results.grade IS DISTINCT FROM EXCLUDED.grade
        "#,
    )
    .bind(exam_id)
    .bind(student_id)
    .bind(row.grade)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let rows = parse_csv_rows(reader)?;

    let mut tx = pool.begin().await?;
    let mut recorded = 0usize;
    for row in &rows {
        if store_row(&mut *tx, row).await? {
            recorded += 1;
        }
    }
    tx.commit().await?;

    info!(rows = rows.len(), recorded, path = %csv_path.display(), "import finished");
    Ok(recorded)
}

fn date(year: i32, month: u32, day: u32) -> anyhow::Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).context("invalid date")
}

fn seed_rows() -> anyhow::Result<Vec<ImportRow>> {
    let courses = [
        ("INF101", "Algorithmique", 1, 6),
        ("MAT102", "Analyse", 1, 4),
        ("INF201", "Bases de donnees", 2, 5),
        ("PHY103", "Physique generale", 2, 3),
    ];
    let students = [
        ("Amina Benali", "amina.benali@intranet.school"),
        ("Lucas Martin", "lucas.martin@intranet.school"),
    ];
    // (course, title, type, date, weight, [grade per student])
    let exams = [
        ("INF101", "Partiel", ExamType::Midterm, date(2025, 11, 6)?, 40.0, [Some(12.0), Some(9.0)]),
        ("INF101", "Examen final", ExamType::Final, date(2026, 1, 14)?, 60.0, [Some(16.0), Some(8.5)]),
        ("MAT102", "Interrogation", ExamType::Quiz, date(2025, 10, 20)?, 20.0, [Some(11.0), Some(14.0)]),
        ("MAT102", "Examen final", ExamType::Final, date(2026, 1, 16)?, 80.0, [Some(9.5), Some(13.0)]),
        ("INF201", "Partiel", ExamType::Midterm, date(2026, 3, 12)?, 50.0, [Some(15.0), None]),
        ("INF201", "Examen final", ExamType::Final, date(2026, 6, 2)?, 50.0, [None, None]),
        ("PHY103", "Examen final", ExamType::Final, date(2026, 6, 5)?, 100.0, [None, None]),
    ];

    let mut rows = Vec::new();
    for (code, title, exam_type, exam_date, weight, grades) in exams {
        let (_, course_name, semester, credits) = courses
            .iter()
            .find(|course| course.0 == code)
            .context("seed exam references an unknown course")?;
        for ((full_name, email), grade) in students.iter().zip(grades) {
            rows.push(ImportRow {
                full_name: full_name.to_string(),
                email: email.to_string(),
                academic_year: "2025-2026".to_string(),
                course_code: code.to_string(),
                course_name: course_name.to_string(),
                semester: *semester,
                credits: *credits,
                exam_title: title.to_string(),
                exam_type,
                exam_date,
                weight,
                grade,
                source_key: Some(format!("seed-{code}-{exam_type}")),
            });
        }
    }
    Ok(rows)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let rows = seed_rows()?;
    let mut tx = pool.begin().await?;
    for row in &rows {
        store_row(&mut *tx, row).await?;
    }
    tx.commit().await?;
    info!(rows = rows.len(), "seed data stored");
    Ok(())
}

pub async fn list_academic_years(pool: &PgPool, student_email: &str) -> anyhow::Result<Vec<String>> {
    let rows = sqlx::query(
        r#"
        SELECT DISTINCT en.academic_year
        FROM intranet.enrollments en
        JOIN intranet.students s ON s.id = en.student_id
        WHERE s.email = $1
        ORDER BY en.academic_year DESC
        "#,
    )
    .bind(student_email)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| row.try_get("academic_year").map_err(anyhow::Error::from))
        .collect()
}

/// Result rows for one student, joined to exam and course metadata.
///
/// Rows come back grouped by course and in exam-date order, which is the
/// order the aggregator reports courses in.
pub async fn fetch_exam_results(pool: &PgPool, filter: &ResultFilter) -> anyhow::Result<Vec<ExamResult>> {
    let mut query = String::from(
        r#"
        SELECT e.id AS exam_id, e.title AS exam_title, e.exam_type, e.exam_date,
               e.weight AS exam_weight, c.id AS course_id, c.name AS course_name,
               c.code AS course_code, c.semester, c.credits, r.grade
        FROM intranet.exam_results r
        JOIN intranet.exams e ON e.id = r.exam_id
        JOIN intranet.courses c ON c.id = e.course_id
        JOIN intranet.students s ON s.id = r.student_id
        WHERE s.email = $1
        "#,
    );

    let mut param = 1;
    if filter.academic_year.is_some() {
        param += 1;
        query.push_str(&format!(
            " AND EXISTS (SELECT 1 FROM intranet.enrollments en \
             WHERE en.student_id = s.id AND en.course_id = c.id AND en.academic_year = ${param})"
        ));
    }
    if filter.semester.is_some() {
        param += 1;
        query.push_str(&format!(" AND c.semester = ${param}"));
    }
    query.push_str(" ORDER BY c.code, e.exam_date, e.title");

    let mut rows = sqlx::query(&query).bind(&filter.student_email);
    if let Some(year) = &filter.academic_year {
        rows = rows.bind(year);
    }
    if let Some(semester) = filter.semester {
        rows = rows.bind(semester);
    }

    let records = rows.fetch_all(pool).await?;
    debug!(
        email = %filter.student_email,
        year = ?filter.academic_year,
        semester = ?filter.semester,
        rows = records.len(),
        "fetched exam results"
    );

    let mut results = Vec::with_capacity(records.len());
    for row in records {
        let exam_type: String = row.try_get("exam_type")?;
        results.push(ExamResult {
            exam_id: row.try_get("exam_id")?,
            exam_title: row.try_get("exam_title")?,
            exam_type: exam_type.parse()?,
            exam_date: row.try_get("exam_date")?,
            exam_weight: row.try_get("exam_weight")?,
            course_id: row.try_get("course_id")?,
            course_name: row.try_get("course_name")?,
            course_code: row.try_get("course_code")?,
            semester: row.try_get("semester")?,
            credits: row.try_get("credits")?,
            grade: row.try_get("grade")?,
        });
    }

    Ok(results)
}
