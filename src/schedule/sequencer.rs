//! Flattens a course's topic/sub-topic tree into one lesson sequence.
//!
//! Within a topic, direct lessons and sub-topics share one position space:
//! a sub-topic's lessons all sit at the sub-topic's own sort order, which is
//! how the outline editor shows them.

use super::model::{Lesson, LessonId};
use std::collections::HashMap;

type SequenceKey = (i64, i64, i64, Option<i64>, i64, LessonId);

fn sequence_key(lesson: &Lesson) -> SequenceKey {
    let position_in_topic = match lesson.sub_topic_id {
        Some(_) => lesson.sub_topic_sort_order.unwrap_or(lesson.sort_order),
        None => lesson.sort_order,
    };
    (
        lesson.topic_sort_order,
        lesson.topic_id,
        position_in_topic,
        lesson.sub_topic_id,
        lesson.sort_order,
        lesson.id,
    )
}

/// Orders lessons for scheduling. Ids only break ties, so the result does
/// not depend on the order the rows were loaded in.
pub fn sequence_lessons(mut lessons: Vec<Lesson>) -> Vec<Lesson> {
    lessons.sort_by_key(sequence_key);
    lessons
}

/// Position of every lesson id in a sequenced list.
pub fn sequence_positions(sequence: &[Lesson]) -> HashMap<LessonId, usize> {
    sequence
        .iter()
        .enumerate()
        .map(|(idx, l)| (l.id, idx))
        .collect()
}
