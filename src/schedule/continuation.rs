//! Sequence-state analysis and continuation of unfinished lesson sequences.
//!
//! The analyzer reads persisted lesson events up to a cutoff and works out
//! how far each course period got, by lesson identity against the current
//! flat sequence. Continuation then resumes each unfinished period after the
//! cutoff, appending only cells that are still empty. A lesson already saved
//! after the cutoff is never emitted again, and lessons that find no free
//! cell are reported back rather than dropped silently.

use super::generate::{emit_cell, ProvisionalIds, CONTINUATION_ID_START};
use super::model::{
    CourseId, GenerationOptions, Lesson, LessonId, PeriodAssignment, ScheduleConfiguration,
    ScheduleEvent, SpecialDay,
};
use super::sequencer::sequence_positions;
use super::special_days::SpecialDayIndex;
use super::tracker::PeriodLessonTracker;
use super::weekdays::teaching_dates;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuationPoint {
    pub period: u32,
    pub course_id: CourseId,
    /// -1 when nothing from the current sequence has been scheduled yet.
    pub last_assigned_lesson_index: i64,
    pub remaining_lessons: usize,
    pub next_lesson_id: Option<LessonId>,
    pub last_lesson_date: Option<NaiveDate>,
}

impl ContinuationPoint {
    pub fn resume_index(&self) -> usize {
        (self.last_assigned_lesson_index + 1).max(0) as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoursePeriodDetail {
    pub period: u32,
    pub course_id: CourseId,
    pub total_lessons: usize,
    pub assigned_lessons: usize,
    pub last_assigned_lesson_index: i64,
    pub needs_continuation: bool,
    pub last_lesson_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceState {
    pub after_date: NaiveDate,
    pub continuation_points: Vec<ContinuationPoint>,
    pub course_period_details: Vec<CoursePeriodDetail>,
}

pub fn analyze_sequence_state(
    config: &ScheduleConfiguration,
    lessons_by_course: &HashMap<CourseId, Vec<Lesson>>,
    events: &[ScheduleEvent],
    after_date: NaiveDate,
) -> SequenceState {
    let mut continuation_points = Vec::new();
    let mut course_period_details = Vec::new();

    for assignment in config.ordered_assignments() {
        let Some(course_id) = assignment.course_id() else {
            continue;
        };
        let sequence = lessons_by_course
            .get(&course_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let (highest, last_lesson_date) =
            highest_assigned_index(sequence, events, assignment.period, course_id, after_date);

        let total = sequence.len();
        let assigned = (highest + 1) as usize;
        let needs_continuation = highest < total as i64 - 1;
        course_period_details.push(CoursePeriodDetail {
            period: assignment.period,
            course_id,
            total_lessons: total,
            assigned_lessons: assigned,
            last_assigned_lesson_index: highest,
            needs_continuation,
            last_lesson_date,
        });
        if needs_continuation {
            continuation_points.push(ContinuationPoint {
                period: assignment.period,
                course_id,
                last_assigned_lesson_index: highest,
                remaining_lessons: total - assigned,
                next_lesson_id: sequence.get(assigned).map(|l| l.id),
                last_lesson_date,
            });
        }
    }

    SequenceState {
        after_date,
        continuation_points,
        course_period_details,
    }
}

/// Highest sequence index among this period's lesson events on or before
/// `through`, or -1. Lessons no longer in the course are ignored.
pub(crate) fn highest_assigned_index(
    sequence: &[Lesson],
    events: &[ScheduleEvent],
    period: u32,
    course_id: CourseId,
    through: NaiveDate,
) -> (i64, Option<NaiveDate>) {
    let positions = sequence_positions(sequence);
    let mut highest: i64 = -1;
    let mut last_date = None;
    for e in events {
        if e.period != period || e.course_id != Some(course_id) || e.date > through || !e.is_lesson() {
            continue;
        }
        let Some(pos) = e.lesson_id.and_then(|id| positions.get(&id)) else {
            continue;
        };
        highest = highest.max(*pos as i64);
        if last_date.map(|d| e.date > d).unwrap_or(true) {
            last_date = Some(e.date);
        }
    }
    (highest, last_date)
}

pub struct ContinuationInput<'a> {
    pub config: &'a ScheduleConfiguration,
    pub lessons_by_course: &'a HashMap<CourseId, Vec<Lesson>>,
    pub special_days: &'a [SpecialDay],
    /// Events already persisted for the schedule; their cells are never
    /// written again.
    pub existing: &'a [ScheduleEvent],
    pub options: &'a GenerationOptions,
}

/// Lessons of one period left over when the window ran out of free cells.
/// Occupied cells (including exhausted-sequence errors) are never rewritten
/// here; `regeneratePeriod` is the way to place these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnplacedLessons {
    pub period: u32,
    pub course_id: CourseId,
    pub count: usize,
    pub next_lesson_id: Option<LessonId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Continuation {
    pub events: Vec<ScheduleEvent>,
    pub unplaced: Vec<UnplacedLessons>,
}

struct ResumedPeriod<'a> {
    assignment: &'a PeriodAssignment,
    tracker: PeriodLessonTracker<'a>,
}

/// Emits the remaining lessons of each point over `[from, to]`.
///
/// Each period resumes after the later of the point's index and the highest
/// lesson saved anywhere in that period, so ScheduleSort keeps increasing
/// with date.
pub fn continue_sequences(
    input: &ContinuationInput<'_>,
    points: &[ContinuationPoint],
    from: NaiveDate,
    to: NaiveDate,
) -> Continuation {
    let config = input.config;
    let specials = SpecialDayIndex::new(input.special_days);
    let occupied: HashSet<(NaiveDate, u32)> =
        input.existing.iter().map(|e| (e.date, e.period)).collect();

    let mut resumed: Vec<ResumedPeriod<'_>> = points
        .iter()
        .filter_map(|p| {
            let assignment = config.assignment(p.period)?;
            if assignment.course_id() != Some(p.course_id) {
                return None;
            }
            let lessons = input
                .lessons_by_course
                .get(&p.course_id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let (saved_highest, _) =
                highest_assigned_index(lessons, input.existing, p.period, p.course_id, NaiveDate::MAX);
            let start = p.resume_index().max((saved_highest + 1).max(0) as usize);
            Some(ResumedPeriod {
                assignment,
                tracker: PeriodLessonTracker::starting_at(p.period, p.course_id, lessons, start),
            })
        })
        .collect();
    resumed.sort_by_key(|r| r.assignment.period);

    let mut ids = ProvisionalIds::starting_at(CONTINUATION_ID_START);
    let mut events = Vec::new();
    for date in teaching_dates(config.teaching_days, from, to) {
        if resumed.iter().all(|r| r.tracker.is_exhausted()) {
            break;
        }
        for r in resumed.iter_mut() {
            if r.tracker.is_exhausted()
                || !config.period_fires(r.assignment, date)
                || occupied.contains(&(date, r.assignment.period))
            {
                continue;
            }
            events.push(emit_cell(
                &mut ids,
                date,
                r.assignment,
                &specials,
                Some(&mut r.tracker),
                input.options,
            ));
        }
    }

    let unplaced = resumed
        .iter()
        .filter(|r| !r.tracker.is_exhausted())
        .map(|r| UnplacedLessons {
            period: r.tracker.period(),
            course_id: r.tracker.course_id(),
            count: r.tracker.remaining(),
            next_lesson_id: r.tracker.current().map(|l| l.id),
        })
        .collect();
    Continuation { events, unplaced }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::generate::{generate_events, GenerationInput};
    use crate::schedule::model::{EventCategory, PeriodContent};
    use crate::schedule::weekdays::TeachingDays;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
    }

    fn lessons(course_id: CourseId, ids: &[i64]) -> Vec<Lesson> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| Lesson {
                id: *id,
                course_id,
                topic_id: 1,
                topic_sort_order: 0,
                sub_topic_id: None,
                sub_topic_sort_order: None,
                sort_order: i as i64,
                title: format!("L{}", id),
                description: None,
            })
            .collect()
    }

    fn config() -> ScheduleConfiguration {
        ScheduleConfiguration {
            id: 1,
            user_id: "u1".to_string(),
            name: "Term".to_string(),
            start_date: d("2024-09-02"),
            end_date: d("2024-09-06"),
            periods_per_day: 2,
            teaching_days: TeachingDays::school_week(),
            assignments: vec![
                PeriodAssignment::new(1, PeriodContent::Course(7), TeachingDays::school_week()),
                PeriodAssignment::new(2, PeriodContent::Course(8), TeachingDays::school_week()),
            ],
        }
    }

    fn generated(config: &ScheduleConfiguration, lessons: &HashMap<CourseId, Vec<Lesson>>) -> Vec<ScheduleEvent> {
        let options = GenerationOptions::default();
        generate_events(&GenerationInput {
            config,
            lessons_by_course: lessons,
            special_days: &[],
            options: &options,
        })
    }

    #[test]
    fn analysis_reports_progress_per_period() {
        let cfg = config();
        let lessons = HashMap::from([
            (7, lessons(7, &[1, 2, 3, 4, 5, 6, 7])),
            (8, lessons(8, &[11, 12])),
        ]);
        let events = generated(&cfg, &lessons);
        let state = analyze_sequence_state(&cfg, &lessons, &events, d("2024-09-04"));

        let p1 = &state.course_period_details[0];
        assert_eq!((p1.period, p1.assigned_lessons, p1.last_assigned_lesson_index), (1, 3, 2));
        assert!(p1.needs_continuation);
        assert_eq!(p1.last_lesson_date, Some(d("2024-09-04")));

        let p2 = &state.course_period_details[1];
        assert_eq!((p2.assigned_lessons, p2.needs_continuation), (2, false));

        assert_eq!(state.continuation_points.len(), 1);
        let point = &state.continuation_points[0];
        assert_eq!(point.remaining_lessons, 4);
        assert_eq!(point.next_lesson_id, Some(4));
        assert_eq!(point.resume_index(), 3);
    }

    #[test]
    fn analysis_matches_by_identity_after_reorder() {
        let cfg = config();
        let original = HashMap::from([(7, lessons(7, &[1, 2, 3, 4])), (8, lessons(8, &[11]))]);
        let events = generated(&cfg, &original);
        // Lesson 4 (already scheduled Thursday) moved to the front; 1 moved to the back.
        let reordered = HashMap::from([(7, lessons(7, &[4, 2, 3, 1])), (8, lessons(8, &[11]))]);
        let state = analyze_sequence_state(&cfg, &reordered, &events, d("2024-09-03"));
        // Through Tuesday only lessons 1 and 2 were taught: positions 3 and 1.
        assert_eq!(state.course_period_details[0].last_assigned_lesson_index, 3);
        assert!(!state.course_period_details[0].needs_continuation);
    }

    #[test]
    fn continuation_never_reemits_history() {
        let mut cfg = config();
        let lessons = HashMap::from([
            (7, lessons(7, &[1, 2, 3, 4, 5, 6, 7, 8])),
            (8, lessons(8, &[11])),
        ]);
        let existing = generated(&cfg, &lessons);
        // Term extended by one week; continue after the original end date.
        cfg.end_date = d("2024-09-13");
        let state = analyze_sequence_state(&cfg, &lessons, &existing, d("2024-09-06"));
        assert_eq!(state.continuation_points.len(), 1);

        let specials = vec![SpecialDay {
            id: 3,
            schedule_id: 1,
            date: d("2024-09-10"),
            periods: [1, 2].into_iter().collect(),
            event_type: "Holiday".to_string(),
            title: "Holiday".to_string(),
            description: None,
            background_color: None,
            font_color: None,
        }];
        let options = GenerationOptions::default();
        let input = ContinuationInput {
            config: &cfg,
            lessons_by_course: &lessons,
            special_days: &specials,
            existing: &existing,
            options: &options,
        };
        let result = continue_sequences(&input, &state.continuation_points, d("2024-09-07"), cfg.end_date);
        assert!(result.unplaced.is_empty());
        let added = result.events;

        let got: Vec<_> = added
            .iter()
            .map(|e| (e.date, e.period, e.lesson_id, e.category))
            .collect();
        assert_eq!(
            got,
            vec![
                (d("2024-09-09"), 1, Some(6), Some(EventCategory::Lesson)),
                (d("2024-09-10"), 1, None, Some(EventCategory::SpecialDay)),
                (d("2024-09-11"), 1, Some(7), Some(EventCategory::Lesson)),
                (d("2024-09-12"), 1, Some(8), Some(EventCategory::Lesson)),
            ]
        );
        assert_eq!(added[0].schedule_sort, 5);
        assert!(added.iter().all(|e| e.id <= CONTINUATION_ID_START));
        let earlier: HashSet<_> = existing.iter().filter_map(|e| e.lesson_id).collect();
        assert!(added.iter().filter_map(|e| e.lesson_id).all(|id| !earlier.contains(&id)));
    }

    #[test]
    fn continuation_skips_occupied_cells() {
        let cfg = config();
        let lessons = HashMap::from([(7, lessons(7, &[1, 2, 3, 4, 5, 6, 7, 8])), (8, lessons(8, &[11]))]);
        let existing = generated(&cfg, &lessons);
        let state = analyze_sequence_state(&cfg, &lessons, &existing, d("2024-09-03"));
        let options = GenerationOptions::default();
        let input = ContinuationInput {
            config: &cfg,
            lessons_by_course: &lessons,
            special_days: &[],
            existing: &existing,
            options: &options,
        };
        let result = continue_sequences(&input, &state.continuation_points, d("2024-09-04"), cfg.end_date);
        assert!(result.events.is_empty());
        // L1..L5 are saved; L6..L8 had nowhere to go.
        assert_eq!(
            result.unplaced,
            vec![UnplacedLessons {
                period: 1,
                course_id: 7,
                count: 3,
                next_lesson_id: Some(6),
            }]
        );
    }

    #[test]
    fn continuation_resumes_after_lessons_saved_past_the_cutoff() {
        let mut cfg = config();
        let lessons = HashMap::from([
            (7, lessons(7, &[1, 2, 3, 4, 5, 6, 7, 8])),
            (8, lessons(8, &[11])),
        ]);
        let existing = generated(&cfg, &lessons);
        cfg.end_date = d("2024-09-13");
        let state = analyze_sequence_state(&cfg, &lessons, &existing, d("2024-09-04"));
        assert_eq!(state.continuation_points[0].resume_index(), 3);

        let options = GenerationOptions::default();
        let input = ContinuationInput {
            config: &cfg,
            lessons_by_course: &lessons,
            special_days: &[],
            existing: &existing,
            options: &options,
        };
        let result = continue_sequences(&input, &state.continuation_points, d("2024-09-05"), cfg.end_date);
        let got: Vec<_> = result
            .events
            .iter()
            .map(|e| (e.date, e.lesson_id, e.schedule_sort))
            .collect();
        assert_eq!(
            got,
            vec![
                (d("2024-09-09"), Some(6), 5),
                (d("2024-09-10"), Some(7), 6),
                (d("2024-09-11"), Some(8), 7),
            ]
        );

        let mut period_one: Vec<_> = existing
            .iter()
            .chain(result.events.iter())
            .filter(|e| e.period == 1 && e.is_lesson())
            .collect();
        period_one.sort_by_key(|e| e.date);
        let ids: Vec<_> = period_one.iter().filter_map(|e| e.lesson_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(period_one.windows(2).all(|w| w[0].schedule_sort < w[1].schedule_sort));
    }

    #[test]
    fn exhausted_cells_leave_new_lessons_unplaced() {
        let cfg = config();
        let before = HashMap::from([(7, lessons(7, &[1, 2, 3])), (8, lessons(8, &[11]))]);
        let existing = generated(&cfg, &before);
        // Two lessons added after generation; Thursday and Friday hold errors.
        let after = HashMap::from([(7, lessons(7, &[1, 2, 3, 4, 5])), (8, lessons(8, &[11]))]);
        let state = analyze_sequence_state(&cfg, &after, &existing, d("2024-09-04"));
        let point = &state.continuation_points[0];
        assert_eq!((point.period, point.remaining_lessons), (1, 2));

        let options = GenerationOptions::default();
        let input = ContinuationInput {
            config: &cfg,
            lessons_by_course: &after,
            special_days: &[],
            existing: &existing,
            options: &options,
        };
        let result = continue_sequences(&input, &state.continuation_points, d("2024-09-05"), cfg.end_date);
        assert!(result.events.is_empty());
        assert_eq!(result.unplaced.len(), 1);
        assert_eq!(result.unplaced[0].count, 2);
        assert_eq!(result.unplaced[0].next_lesson_id, Some(4));
    }
}
