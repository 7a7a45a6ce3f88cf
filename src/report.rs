use std::fmt::Write;

use serde_json::json;

use crate::models::Transcript;

pub fn format_average(average: Option<f64>) -> String {
    match average {
        Some(value) => format!("{value:.2}"),
        None => "n/a".to_string(),
    }
}

pub fn build_report(
    student: &str,
    academic_year: Option<&str>,
    semester: Option<i32>,
    transcript: &Transcript,
) -> String {
    let mut output = String::new();
    let year_label = academic_year.unwrap_or("no enrolled year");
    let semester_label = match semester {
        Some(value) => format!("semester {value}"),
        None => "all semesters".to_string(),
    };

    let _ = writeln!(output, "# Grade Report");
    let _ = writeln!(
        output,
        "Generated for {} ({}, {})",
        student, year_label, semester_label
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Semesters");

    if transcript.semesters.is_empty() {
        let _ = writeln!(output, "No exam results recorded for this selection.");
    } else {
        for summary in &transcript.semesters {
            let _ = writeln!(
                output,
                "- {} semester {}: average {} over {} credits ({})",
                summary.academic_year,
                summary.semester,
                format_average(summary.average),
                summary.credits,
                summary.status
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Courses");

    if transcript.courses.is_empty() {
        let _ = writeln!(output, "No courses with exam results.");
    } else {
        let _ = writeln!(output, "| Code | Course | Semester | Credits | Average | Status |");
        let _ = writeln!(output, "| --- | --- | --- | --- | --- | --- |");
        for course in &transcript.courses {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} | {} |",
                course.course_code,
                course.course_name,
                course.semester,
                course.credits,
                format_average(course.average),
                course.status
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "Credits earned: {}. Overall average: {}.",
        transcript.credits_earned(),
        format_average(transcript.overall_average())
    );

    output
}

pub fn to_json(transcript: &Transcript) -> serde_json::Value {
    json!({
        "courses": transcript.courses,
        "semesters": transcript.semesters,
        "credits_earned": transcript.credits_earned(),
        "overall_average": transcript.overall_average(),
    })
}
