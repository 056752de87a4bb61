//! Structural checks run before generation.
//!
//! Errors refuse generation; warnings are reported alongside a successful
//! result. Only structural feasibility is checked here.

use super::model::{
    CourseId, Lesson, PeriodContent, ScheduleConfiguration, MAX_PERIODS_PER_DAY,
    MIN_PERIODS_PER_DAY,
};
use super::weekdays::teaching_dates;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<u32>,
}

impl ValidationIssue {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            period: None,
        }
    }

    fn for_period(code: &'static str, period: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            period: Some(period),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStats {
    pub calendar_days: usize,
    pub teaching_days: usize,
    pub course_periods: usize,
    pub special_periods: usize,
    pub unassigned_periods: usize,
    pub total_cells: usize,
    pub total_lessons: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// No errors and no warnings.
    pub is_valid: bool,
    /// No errors; warnings are allowed.
    pub can_generate: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub stats: ValidationStats,
}

pub fn validate_configuration(
    config: &ScheduleConfiguration,
    lessons_by_course: &HashMap<CourseId, Vec<Lesson>>,
) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut stats = ValidationStats::default();

    let dates_ok = config.start_date <= config.end_date;
    if !dates_ok {
        errors.push(ValidationIssue::new(
            "date_range_inverted",
            format!(
                "end date {} is before start date {}",
                config.end_date, config.start_date
            ),
        ));
    }

    let periods_ok = (MIN_PERIODS_PER_DAY..=MAX_PERIODS_PER_DAY).contains(&config.periods_per_day);
    if !periods_ok {
        errors.push(ValidationIssue::new(
            "periods_per_day_out_of_range",
            format!(
                "periods per day must be between {} and {}, got {}",
                MIN_PERIODS_PER_DAY, MAX_PERIODS_PER_DAY, config.periods_per_day
            ),
        ));
    }

    if config.teaching_days.is_empty() {
        errors.push(ValidationIssue::new(
            "no_teaching_days",
            "at least one teaching day must be selected",
        ));
    }

    let mut seen = BTreeSet::new();
    for a in &config.assignments {
        if !seen.insert(a.period) {
            errors.push(ValidationIssue::for_period(
                "duplicate_period",
                a.period,
                format!("period {} is assigned more than once", a.period),
            ));
        }
        if periods_ok && (a.period < 1 || a.period > config.periods_per_day) {
            errors.push(ValidationIssue::for_period(
                "period_out_of_range",
                a.period,
                format!(
                    "period {} is outside 1..={}",
                    a.period, config.periods_per_day
                ),
            ));
        }
    }

    if config.course_assignments().next().is_none() {
        errors.push(ValidationIssue::new(
            "no_course_assignments",
            "at least one period must be assigned to a course",
        ));
    }

    for a in config.ordered_assignments() {
        match &a.content {
            PeriodContent::Course(course_id) => {
                stats.course_periods += 1;
                let count = lessons_by_course.get(course_id).map(Vec::len).unwrap_or(0);
                if count == 0 {
                    warnings.push(ValidationIssue::for_period(
                        "course_without_lessons",
                        a.period,
                        format!(
                            "course {} in period {} has no lessons; its cells will be marked as errors",
                            course_id, a.period
                        ),
                    ));
                }
            }
            PeriodContent::SpecialPeriod(_) => stats.special_periods += 1,
            PeriodContent::Unassigned => {
                stats.unassigned_periods += 1;
                warnings.push(ValidationIssue::for_period(
                    "unassigned_period",
                    a.period,
                    format!("period {} has no course or special period", a.period),
                ));
            }
        }

        if a.teaching_days.is_empty() {
            let issue = ValidationIssue::for_period(
                "period_without_teaching_days",
                a.period,
                format!("period {} has no teaching days and will never occur", a.period),
            );
            if config.assignments.len() == 1 {
                errors.push(issue);
            } else {
                warnings.push(issue);
            }
        } else if !a.teaching_days.is_subset_of(&config.teaching_days) {
            let extra = a.teaching_days.difference(&config.teaching_days);
            warnings.push(ValidationIssue::for_period(
                "period_day_not_teaching_day",
                a.period,
                format!(
                    "period {} lists {} which {} not a configuration teaching day",
                    a.period,
                    extra.names().join(", "),
                    if extra.len() == 1 { "is" } else { "are" }
                ),
            ));
        }
    }

    if periods_ok {
        for p in 1..=config.periods_per_day {
            if config.assignment(p).is_none() {
                stats.unassigned_periods += 1;
                warnings.push(ValidationIssue::for_period(
                    "unassigned_period",
                    p,
                    format!("period {} has no assignment", p),
                ));
            }
        }
    }

    stats.total_lessons = config
        .course_assignments()
        .map(|(_, c)| c)
        .collect::<BTreeSet<_>>()
        .iter()
        .map(|c| lessons_by_course.get(c).map(Vec::len).unwrap_or(0))
        .sum();

    if dates_ok {
        stats.calendar_days = ((config.end_date - config.start_date).num_days() + 1) as usize;
        let assignments = config.ordered_assignments();
        for date in teaching_dates(config.teaching_days, config.start_date, config.end_date) {
            stats.teaching_days += 1;
            stats.total_cells += assignments
                .iter()
                .filter(|a| a.teaching_days.includes_date(date))
                .count();
        }
    }

    let can_generate = errors.is_empty();
    ValidationReport {
        is_valid: can_generate && warnings.is_empty(),
        can_generate,
        errors,
        warnings,
        stats,
    }
}
