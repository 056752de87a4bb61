use super::weekdays::{period_fires, TeachingDays};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;

pub type ConfigurationId = i64;
pub type ScheduleId = i64;
pub type CourseId = i64;
pub type LessonId = i64;
pub type SpecialDayId = i64;

pub const MIN_PERIODS_PER_DAY: u32 = 1;
pub const MAX_PERIODS_PER_DAY: u32 = 10;

pub const EVENT_TYPE_LESSON: &str = "Lesson";
pub const EVENT_TYPE_ERROR: &str = "Error";

pub const DEFAULT_EXHAUSTED_COMMENT: &str = "no more lessons";
pub const DEFAULT_UNASSIGNED_COMMENT: &str = "no course or special period assigned";

/// What a period slot is bound to. Exactly one of course or special-period
/// type can be set; the storage layer mirrors this with a CHECK constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodContent {
    Course(CourseId),
    SpecialPeriod(String),
    Unassigned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodAssignment {
    pub period: u32,
    pub content: PeriodContent,
    pub teaching_days: TeachingDays,
    pub room: Option<String>,
    pub notes: Option<String>,
    pub background_color: Option<String>,
    pub text_color: Option<String>,
}

impl PeriodAssignment {
    pub fn new(period: u32, content: PeriodContent, teaching_days: TeachingDays) -> Self {
        Self {
            period,
            content,
            teaching_days,
            room: None,
            notes: None,
            background_color: None,
            text_color: None,
        }
    }

    pub fn course_id(&self) -> Option<CourseId> {
        match self.content {
            PeriodContent::Course(id) => Some(id),
            _ => None,
        }
    }

    pub fn special_period_type(&self) -> Option<&str> {
        match &self.content {
            PeriodContent::SpecialPeriod(name) => Some(name.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfiguration {
    pub id: ConfigurationId,
    pub user_id: String,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub periods_per_day: u32,
    pub teaching_days: TeachingDays,
    pub assignments: Vec<PeriodAssignment>,
}

impl ScheduleConfiguration {
    pub fn assignment(&self, period: u32) -> Option<&PeriodAssignment> {
        self.assignments.iter().find(|a| a.period == period)
    }

    /// Assignments in ascending period order.
    pub fn ordered_assignments(&self) -> Vec<&PeriodAssignment> {
        let mut out: Vec<&PeriodAssignment> = self.assignments.iter().collect();
        out.sort_by_key(|a| a.period);
        out
    }

    pub fn course_assignments(&self) -> impl Iterator<Item = (&PeriodAssignment, CourseId)> {
        self.assignments
            .iter()
            .filter_map(|a| a.course_id().map(|c| (a, c)))
    }

    pub fn period_fires(&self, assignment: &PeriodAssignment, date: NaiveDate) -> bool {
        period_fires(&self.teaching_days, &assignment.teaching_days, date)
    }
}

/// A lesson together with the sort keys of the containers it sits in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: LessonId,
    pub course_id: CourseId,
    pub topic_id: i64,
    pub topic_sort_order: i64,
    pub sub_topic_id: Option<i64>,
    pub sub_topic_sort_order: Option<i64>,
    pub sort_order: i64,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialDay {
    pub id: SpecialDayId,
    pub schedule_id: ScheduleId,
    pub date: NaiveDate,
    pub periods: BTreeSet<u32>,
    pub event_type: String,
    pub title: String,
    pub description: Option<String>,
    pub background_color: Option<String>,
    pub font_color: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventCategory {
    Lesson,
    SpecialDay,
    SpecialPeriod,
}

impl EventCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lesson => "Lesson",
            Self::SpecialDay => "SpecialDay",
            Self::SpecialPeriod => "SpecialPeriod",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Lesson" => Some(Self::Lesson),
            "SpecialDay" => Some(Self::SpecialDay),
            "SpecialPeriod" => Some(Self::SpecialPeriod),
            _ => None,
        }
    }
}

/// One resolved (date, period) cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEvent {
    pub id: i64,
    pub date: NaiveDate,
    pub period: u32,
    pub event_type: String,
    pub category: Option<EventCategory>,
    pub course_id: Option<CourseId>,
    pub lesson_id: Option<LessonId>,
    pub special_day_id: Option<SpecialDayId>,
    pub title: String,
    pub comment: Option<String>,
    pub schedule_sort: i64,
    pub room: Option<String>,
    pub background_color: Option<String>,
    pub text_color: Option<String>,
}

impl ScheduleEvent {
    pub fn is_lesson(&self) -> bool {
        self.category == Some(EventCategory::Lesson)
    }

    pub fn is_error(&self) -> bool {
        self.event_type == EVENT_TYPE_ERROR
    }
}

/// Texts the synthesizer writes into diagnostic cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOptions {
    pub exhausted_comment: String,
    pub unassigned_comment: String,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            exhausted_comment: DEFAULT_EXHAUSTED_COMMENT.to_string(),
            unassigned_comment: DEFAULT_UNASSIGNED_COMMENT.to_string(),
        }
    }
}
