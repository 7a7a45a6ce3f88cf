use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{CourseAverage, ExamResult, GradeStatus, SemesterAverage, Transcript};

#[derive(Debug, Default)]
struct WeightedSum {
    total: f64,
    weight: f64,
}

impl WeightedSum {
    fn add(&mut self, value: f64, weight: f64) {
        self.total += value * weight;
        self.weight += weight;
    }

    fn average(&self) -> Option<f64> {
        if self.weight > 0.0 {
            Some(self.total / self.weight)
        } else {
            None
        }
    }
}

/// Weighted average per course, in order of first appearance.
///
/// Only results carrying both a grade and a weight take part in the sums.
/// A course whose results are all ungraded is reported with no average and
/// a pending status.
pub fn course_averages(results: &[ExamResult]) -> Vec<CourseAverage> {
    let mut order: Vec<(&ExamResult, WeightedSum)> = Vec::new();
    let mut index: HashMap<Uuid, usize> = HashMap::new();

    for result in results {
        let slot = *index.entry(result.course_id).or_insert_with(|| {
            order.push((result, WeightedSum::default()));
            order.len() - 1
        });

        if let (Some(grade), Some(weight)) = (result.grade, result.exam_weight) {
            order[slot].1.add(grade, weight);
        }
    }

    order
        .into_iter()
        .map(|(first, sum)| {
            let average = sum.average();
            CourseAverage {
                course_id: first.course_id,
                course_name: first.course_name.clone(),
                course_code: first.course_code.clone(),
                semester: first.semester,
                credits: first.credits.unwrap_or(0),
                average,
                status: GradeStatus::from_average(average),
            }
        })
        .collect()
}

#[derive(Debug)]
struct SemesterGroup {
    semester: i32,
    sum: WeightedSum,
    credits: i32,
    any_failed: bool,
    any_passed: bool,
}

/// Credit-weighted average per semester of `academic_year`.
///
/// The status ignores the numeric average: one failed course fails the
/// semester, otherwise one passed course passes it, otherwise it is pending.
pub fn semester_averages(courses: &[CourseAverage], academic_year: &str) -> Vec<SemesterAverage> {
    let mut groups: Vec<SemesterGroup> = Vec::new();
    let mut index: HashMap<i32, usize> = HashMap::new();

    for course in courses {
        let slot = *index.entry(course.semester).or_insert_with(|| {
            groups.push(SemesterGroup {
                semester: course.semester,
                sum: WeightedSum::default(),
                credits: 0,
                any_failed: false,
                any_passed: false,
            });
            groups.len() - 1
        });
        let group = &mut groups[slot];

        match course.status {
            GradeStatus::Failed => group.any_failed = true,
            GradeStatus::Passed => group.any_passed = true,
            GradeStatus::Pending => {}
        }

        if let Some(average) = course.average {
            group.sum.add(average, f64::from(course.credits));
            group.credits += course.credits;
        }
    }

    groups
        .into_iter()
        .map(|group| {
            let status = if group.any_failed {
                GradeStatus::Failed
            } else if group.any_passed {
                GradeStatus::Passed
            } else {
                GradeStatus::Pending
            };
            SemesterAverage {
                academic_year: academic_year.to_string(),
                semester: group.semester,
                average: group.sum.average(),
                credits: group.credits,
                status,
            }
        })
        .collect()
}

pub fn aggregate(results: &[ExamResult], academic_year: &str) -> Transcript {
    let courses = course_averages(results);
    let semesters = semester_averages(&courses, academic_year);
    Transcript { courses, semesters }
}

impl Transcript {
    /// Credits of every passed course.
    pub fn credits_earned(&self) -> i32 {
        self.courses
            .iter()
            .filter(|course| course.status == GradeStatus::Passed)
            .map(|course| course.credits)
            .sum()
    }

    /// Credit-weighted average over every graded course.
    pub fn overall_average(&self) -> Option<f64> {
        let mut sum = WeightedSum::default();
        for course in &self.courses {
            if let Some(average) = course.average {
                sum.add(average, f64::from(course.credits));
            }
        }
        sum.average()
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExamType;
    use chrono::NaiveDate;

    fn exam(course_id: Uuid, grade: Option<f64>, weight: f64) -> ExamResult {
        ExamResult {
            exam_id: Uuid::new_v4(),
            exam_title: "Partiel".to_string(),
            exam_type: ExamType::Midterm,
            exam_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            exam_weight: Some(weight),
            course_id,
            course_name: "Algo".to_string(),
            course_code: "INF101".to_string(),
            semester: 1,
            credits: Some(3),
            grade,
        }
    }

    fn course(semester: i32, credits: i32, average: Option<f64>) -> CourseAverage {
        CourseAverage {
            course_id: Uuid::new_v4(),
            course_name: "Course".to_string(),
            course_code: "C".to_string(),
            semester,
            credits,
            average,
            status: GradeStatus::from_average(average),
        }
    }

    #[test]
    fn ungraded_courses_stay_pending() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let results = vec![
            exam(first, None, 40.0),
            exam(first, None, 60.0),
            exam(second, None, 100.0),
        ];

        let courses = course_averages(&results);
        assert_eq!(courses.len(), 2);
        for course in &courses {
            assert_eq!(course.average, None);
            assert_eq!(course.status, GradeStatus::Pending);
        }
    }

    #[test]
    fn weights_grades_within_course() {
        let id = Uuid::new_v4();
        let results = vec![exam(id, Some(12.0), 40.0), exam(id, Some(16.0), 60.0)];

        let courses = course_averages(&results);
        assert_eq!(courses.len(), 1);
        let average = courses[0].average.unwrap();
        assert!((average - 14.4).abs() < 1e-9);
        assert_eq!(courses[0].status, GradeStatus::Passed);
    }

    #[test]
    fn exact_threshold_passes() {
        let id = Uuid::new_v4();
        let results = vec![exam(id, Some(8.0), 50.0), exam(id, Some(12.0), 50.0)];

        let courses = course_averages(&results);
        assert_eq!(courses[0].average, Some(10.0));
        assert_eq!(courses[0].status, GradeStatus::Passed);
    }

    #[test]
    fn failed_course_fails_the_semester() {
        let courses = vec![course(1, 3, Some(14.0)), course(1, 4, Some(8.0))];

        let semesters = semester_averages(&courses, "2025-2026");
        assert_eq!(semesters.len(), 1);
        let semester = &semesters[0];
        let expected = (14.0 * 3.0 + 8.0 * 4.0) / 7.0;
        assert!((semester.average.unwrap() - expected).abs() < 1e-9);
        assert!(semester.average.unwrap() > 10.0);
        assert_eq!(semester.credits, 7);
        assert_eq!(semester.status, GradeStatus::Failed);
        assert_eq!(semester.academic_year, "2025-2026");
    }

    #[test]
    fn repeated_runs_are_identical() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let results = vec![
            exam(a, Some(13.25), 30.0),
            exam(b, Some(7.5), 50.0),
            exam(a, Some(11.0), 70.0),
            exam(b, None, 50.0),
        ];

        let first = aggregate(&results, "2025-2026");
        let second = aggregate(&results, "2025-2026");
        assert_eq!(first, second);
        for (x, y) in first.courses.iter().zip(second.courses.iter()) {
            assert_eq!(
                x.average.map(f64::to_bits),
                y.average.map(f64::to_bits)
            );
        }
    }

    #[test]
    fn empty_input_gives_empty_output() {
        let transcript = aggregate(&[], "2025-2026");
        assert!(transcript.courses.is_empty());
        assert!(transcript.semesters.is_empty());
        assert!(transcript.is_empty());
        assert_eq!(transcript.overall_average(), None);
        assert_eq!(transcript.credits_earned(), 0);
    }

    #[test]
    fn ungraded_exam_is_excluded_from_both_sums() {
        let id = Uuid::new_v4();
        let results = vec![exam(id, None, 50.0), exam(id, Some(18.0), 50.0)];

        let courses = course_averages(&results);
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].average, Some(18.0));
        assert_eq!(courses[0].status, GradeStatus::Passed);
        assert_eq!(courses[0].course_name, "Algo");
        assert_eq!(courses[0].credits, 3);
    }

    #[test]
    fn courses_keep_first_appearance_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let results = vec![
            exam(b, Some(5.0), 10.0),
            exam(a, Some(15.0), 10.0),
            exam(b, Some(6.0), 10.0),
            exam(c, None, 10.0),
        ];

        let ids: Vec<Uuid> = course_averages(&results)
            .iter()
            .map(|course| course.course_id)
            .collect();
        assert_eq!(ids, vec![b, a, c]);
    }

    #[test]
    fn missing_weight_or_credits_are_skipped() {
        let id = Uuid::new_v4();
        let mut unweighted = exam(id, Some(2.0), 0.0);
        unweighted.exam_weight = None;
        let mut weighted = exam(id, Some(16.0), 20.0);
        weighted.credits = None;
        let results = vec![unweighted, weighted];

        let courses = course_averages(&results);
        assert_eq!(courses[0].average, Some(16.0));
        assert_eq!(courses[0].credits, 3);

        let zero_weight = vec![exam(Uuid::new_v4(), Some(12.0), 0.0)];
        let courses = course_averages(&zero_weight);
        assert_eq!(courses[0].average, None);
        assert_eq!(courses[0].status, GradeStatus::Pending);
    }

    #[test]
    fn pending_courses_do_not_count_toward_semester() {
        let courses = vec![
            course(1, 4, None),
            course(1, 3, Some(12.0)),
            course(2, 5, None),
        ];

        let semesters = semester_averages(&courses, "2024-2025");
        assert_eq!(semesters.len(), 2);

        assert_eq!(semesters[0].semester, 1);
        assert_eq!(semesters[0].credits, 3);
        assert_eq!(semesters[0].average, Some(12.0));
        assert_eq!(semesters[0].status, GradeStatus::Passed);

        assert_eq!(semesters[1].semester, 2);
        assert_eq!(semesters[1].credits, 0);
        assert_eq!(semesters[1].average, None);
        assert_eq!(semesters[1].status, GradeStatus::Pending);
    }

    #[test]
    fn semesters_follow_first_appearance() {
        let courses = vec![course(2, 3, Some(11.0)), course(1, 3, Some(9.0))];
        let semesters = semester_averages(&courses, "2025-2026");
        let order: Vec<i32> = semesters.iter().map(|s| s.semester).collect();
        assert_eq!(order, vec![2, 1]);
        assert_eq!(semesters[1].status, GradeStatus::Failed);
    }

    #[test]
    fn transcript_totals() {
        let transcript = Transcript {
            courses: vec![
                course(1, 3, Some(14.0)),
                course(1, 4, Some(8.0)),
                course(2, 2, None),
            ],
            semesters: Vec::new(),
        };

        assert_eq!(transcript.credits_earned(), 3);
        let overall = transcript.overall_average().unwrap();
        assert!((overall - (14.0 * 3.0 + 8.0 * 4.0) / 7.0).abs() < 1e-9);
    }

    fn exam_in(
        course_id: Uuid,
        code: &str,
        semester: i32,
        credits: i32,
        grade: Option<f64>,
        weight: f64,
    ) -> ExamResult {
        let mut result = exam(course_id, grade, weight);
        result.course_code = code.to_string();
        result.semester = semester;
        result.credits = Some(credits);
        result
    }

    #[test]
    fn aggregates_results_across_both_semesters() {
        let algo = Uuid::new_v4();
        let analyse = Uuid::new_v4();
        let bdd = Uuid::new_v4();
        let physique = Uuid::new_v4();
        let results = vec![
            exam_in(algo, "INF101", 1, 6, Some(12.0), 40.0),
            exam_in(bdd, "INF201", 2, 5, Some(15.0), 50.0),
            exam_in(algo, "INF101", 1, 6, Some(16.0), 60.0),
            exam_in(analyse, "MAT102", 1, 4, Some(11.0), 20.0),
            exam_in(physique, "PHY103", 2, 3, None, 100.0),
            exam_in(analyse, "MAT102", 1, 4, Some(9.5), 80.0),
            exam_in(bdd, "INF201", 2, 5, None, 50.0),
        ];

        let transcript = aggregate(&results, "2025-2026");

        let codes: Vec<&str> = transcript
            .courses
            .iter()
            .map(|course| course.course_code.as_str())
            .collect();
        assert_eq!(codes, vec!["INF101", "INF201", "MAT102", "PHY103"]);

        let analyse_average = (11.0 * 20.0 + 9.5 * 80.0) / 100.0;
        assert!((transcript.courses[2].average.unwrap() - analyse_average).abs() < 1e-9);
        assert_eq!(transcript.courses[2].status, GradeStatus::Failed);
        assert_eq!(transcript.courses[1].average, Some(15.0));
        assert_eq!(transcript.courses[3].status, GradeStatus::Pending);

        assert_eq!(transcript.semesters.len(), 2);
        let first = &transcript.semesters[0];
        assert_eq!(first.semester, 1);
        assert_eq!(first.credits, 10);
        let expected = (14.4 * 6.0 + analyse_average * 4.0) / 10.0;
        assert!((first.average.unwrap() - expected).abs() < 1e-9);
        assert_eq!(first.status, GradeStatus::Failed);

        let second = &transcript.semesters[1];
        assert_eq!(second.semester, 2);
        assert_eq!(second.credits, 5);
        assert_eq!(second.average, Some(15.0));
        assert_eq!(second.status, GradeStatus::Passed);
        assert_eq!(second.academic_year, "2025-2026");
    }

    #[test]
    fn zero_credit_course_keeps_status_but_adds_no_weight() {
        let workshop = Uuid::new_v4();
        let algo = Uuid::new_v4();
        let results = vec![
            exam_in(workshop, "ATL100", 1, 0, Some(6.0), 100.0),
            exam_in(algo, "INF101", 1, 3, Some(14.0), 100.0),
        ];

        let transcript = aggregate(&results, "2025-2026");
        assert_eq!(transcript.courses[0].average, Some(6.0));
        assert_eq!(transcript.courses[0].status, GradeStatus::Failed);

        let semester = &transcript.semesters[0];
        assert_eq!(semester.credits, 3);
        assert_eq!(semester.average, Some(14.0));
        assert_eq!(semester.status, GradeStatus::Failed);

        let only_workshop = aggregate(&results[..1], "2025-2026");
        assert_eq!(only_workshop.semesters[0].credits, 0);
        assert_eq!(only_workshop.semesters[0].average, None);
        assert_eq!(only_workshop.semesters[0].status, GradeStatus::Failed);
    }
}
