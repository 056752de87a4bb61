//! The generation driver: day-outer, period-inner walk over a configuration.
//!
//! Trackers live only for the duration of one call. Given the same
//! configuration, lesson orderings and special days, two calls return the
//! same events in the same order.

use super::model::{
    CourseId, GenerationOptions, Lesson, PeriodAssignment, ScheduleConfiguration, ScheduleEvent,
    SpecialDay,
};
use super::special_days::SpecialDayIndex;
use super::synth::{resolve_cell, synthesize};
use super::tracker::PeriodLessonTracker;
use super::weekdays::teaching_dates;
use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

/// First provisional id handed out by full and per-period generation.
pub const GENERATION_ID_START: i64 = -1;
/// First provisional id handed out by continuation; full generation never
/// reaches this range.
pub const CONTINUATION_ID_START: i64 = -1_000_001;

/// Hands out descending provisional ids for unsaved events.
#[derive(Debug)]
pub(crate) struct ProvisionalIds(i64);

impl ProvisionalIds {
    pub(crate) fn starting_at(start: i64) -> Self {
        Self(start)
    }

    pub(crate) fn next_id(&mut self) -> i64 {
        let id = self.0;
        self.0 -= 1;
        id
    }
}

pub struct GenerationInput<'a> {
    pub config: &'a ScheduleConfiguration,
    /// Sequenced lessons per course.
    pub lessons_by_course: &'a HashMap<CourseId, Vec<Lesson>>,
    pub special_days: &'a [SpecialDay],
    pub options: &'a GenerationOptions,
}

impl<'a> GenerationInput<'a> {
    fn lessons_for(&self, course_id: CourseId) -> &'a [Lesson] {
        self.lessons_by_course
            .get(&course_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Full generation over `[start_date, end_date]`.
pub fn generate_events(input: &GenerationInput<'_>) -> Vec<ScheduleEvent> {
    let config = input.config;
    let specials = SpecialDayIndex::new(input.special_days);
    let assignments = config.ordered_assignments();

    let mut trackers: HashMap<u32, PeriodLessonTracker<'_>> = config
        .course_assignments()
        .map(|(a, course_id)| {
            (
                a.period,
                PeriodLessonTracker::new(a.period, course_id, input.lessons_for(course_id)),
            )
        })
        .collect();

    let mut ids = ProvisionalIds::starting_at(GENERATION_ID_START);
    let mut events = Vec::new();
    for date in teaching_dates(config.teaching_days, config.start_date, config.end_date) {
        for assignment in &assignments {
            if !config.period_fires(assignment, date) {
                continue;
            }
            let tracker = trackers.get_mut(&assignment.period);
            let event = emit_cell(&mut ids, date, assignment, &specials, tracker, input.options);
            events.push(event);
        }
    }
    events
}

/// Regenerates one period from `from` to the configuration end date,
/// resuming that period's course at `start_index`.
pub fn generate_period_from(
    input: &GenerationInput<'_>,
    assignment: &PeriodAssignment,
    from: NaiveDate,
    start_index: usize,
) -> Vec<ScheduleEvent> {
    let config = input.config;
    let specials = SpecialDayIndex::new(input.special_days);
    let mut tracker = assignment.course_id().map(|course_id| {
        PeriodLessonTracker::starting_at(
            assignment.period,
            course_id,
            input.lessons_for(course_id),
            start_index,
        )
    });

    let from = from.max(config.start_date);
    let mut ids = ProvisionalIds::starting_at(GENERATION_ID_START);
    teaching_dates(config.teaching_days, from, config.end_date)
        .filter(|d| config.period_fires(assignment, *d))
        .map(|date| emit_cell(&mut ids, date, assignment, &specials, tracker.as_mut(), input.options))
        .collect()
}

/// Resolves, synthesizes and, for lesson cells only, advances the tracker.
pub(crate) fn emit_cell(
    ids: &mut ProvisionalIds,
    date: NaiveDate,
    assignment: &PeriodAssignment,
    specials: &SpecialDayIndex<'_>,
    tracker: Option<&mut PeriodLessonTracker<'_>>,
    options: &GenerationOptions,
) -> ScheduleEvent {
    let special = specials.resolve(date, assignment.period);
    match tracker {
        Some(t) => {
            let cell = resolve_cell(assignment, special, Some(&*t));
            let event = synthesize(ids.next_id(), date, assignment, cell, options);
            if event.is_lesson() {
                t.advance();
            }
            event
        }
        None => {
            let cell = resolve_cell(assignment, special, None);
            synthesize(ids.next_id(), date, assignment, cell, options)
        }
    }
}

pub fn events_by_period(events: &[ScheduleEvent]) -> BTreeMap<u32, usize> {
    let mut out = BTreeMap::new();
    for e in events {
        *out.entry(e.period).or_insert(0) += 1;
    }
    out
}

/// SHA-256 over event content. Provisional and row ids are left out so a
/// persisted schedule fingerprints the same as the run that produced it.
pub fn fingerprint(events: &[ScheduleEvent]) -> String {
    let mut hasher = Sha256::new();
    for e in events {
        let line = format!(
            "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}\n",
            e.date.format("%Y-%m-%d"),
            e.period,
            e.event_type,
            e.category.map(|c| c.as_str()).unwrap_or(""),
            e.course_id.map(|v| v.to_string()).unwrap_or_default(),
            e.lesson_id.map(|v| v.to_string()).unwrap_or_default(),
            e.special_day_id.map(|v| v.to_string()).unwrap_or_default(),
            e.title,
            e.comment.as_deref().unwrap_or(""),
            e.schedule_sort,
        );
        hasher.update(line.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
