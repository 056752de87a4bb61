//! Turns one resolved (date, period) cell into a `ScheduleEvent`.

use super::model::{
    CourseId, EventCategory, GenerationOptions, Lesson, PeriodAssignment, PeriodContent,
    ScheduleEvent, SpecialDay, EVENT_TYPE_ERROR, EVENT_TYPE_LESSON,
};
use super::tracker::PeriodLessonTracker;
use chrono::NaiveDate;

/// The content a cell resolved to, in priority order.
#[derive(Debug, Clone, Copy)]
pub enum Cell<'a> {
    SpecialDay(&'a SpecialDay),
    Lesson { lesson: &'a Lesson, index: usize },
    Exhausted(CourseId),
    SpecialPeriod(&'a str),
    Unassigned,
}

pub fn resolve_cell<'a>(
    assignment: &'a PeriodAssignment,
    special_day: Option<&'a SpecialDay>,
    tracker: Option<&PeriodLessonTracker<'a>>,
) -> Cell<'a> {
    if let Some(day) = special_day {
        return Cell::SpecialDay(day);
    }
    match &assignment.content {
        PeriodContent::Course(course_id) => match tracker.and_then(|t| t.current().map(|l| (l, t))) {
            Some((lesson, t)) => Cell::Lesson {
                lesson,
                index: t.current_index(),
            },
            None => Cell::Exhausted(*course_id),
        },
        PeriodContent::SpecialPeriod(name) => Cell::SpecialPeriod(name.as_str()),
        PeriodContent::Unassigned => Cell::Unassigned,
    }
}

pub fn synthesize(
    id: i64,
    date: NaiveDate,
    assignment: &PeriodAssignment,
    cell: Cell<'_>,
    options: &GenerationOptions,
) -> ScheduleEvent {
    let mut event = ScheduleEvent {
        id,
        date,
        period: assignment.period,
        event_type: EVENT_TYPE_ERROR.to_string(),
        category: None,
        course_id: assignment.course_id(),
        lesson_id: None,
        special_day_id: None,
        title: String::new(),
        comment: None,
        schedule_sort: 0,
        room: assignment.room.clone(),
        background_color: assignment.background_color.clone(),
        text_color: assignment.text_color.clone(),
    };

    match cell {
        Cell::SpecialDay(day) => {
            event.event_type = day.event_type.clone();
            event.category = Some(EventCategory::SpecialDay);
            event.special_day_id = Some(day.id);
            event.title = day.title.clone();
            event.comment = day.description.clone();
            if day.background_color.is_some() {
                event.background_color = day.background_color.clone();
            }
            if day.font_color.is_some() {
                event.text_color = day.font_color.clone();
            }
        }
        Cell::Lesson { lesson, index } => {
            event.event_type = EVENT_TYPE_LESSON.to_string();
            event.category = Some(EventCategory::Lesson);
            event.course_id = Some(lesson.course_id);
            event.lesson_id = Some(lesson.id);
            event.title = lesson.title.clone();
            event.comment = lesson.description.clone();
            event.schedule_sort = index as i64;
        }
        Cell::Exhausted(course_id) => {
            event.course_id = Some(course_id);
            event.title = "Error".to_string();
            event.comment = Some(options.exhausted_comment.clone());
        }
        Cell::SpecialPeriod(name) => {
            event.event_type = name.to_string();
            event.category = Some(EventCategory::SpecialPeriod);
            event.title = name.to_string();
            event.comment = assignment.notes.clone();
        }
        Cell::Unassigned => {
            event.title = "Unassigned".to_string();
            event.comment = Some(options.unassigned_comment.clone());
        }
    }
    event
}
