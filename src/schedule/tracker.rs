use super::model::{CourseId, Lesson};

/// Cursor over one course's lesson sequence for one period.
///
/// Only lesson cells move the cursor; special days and diagnostic cells
/// leave it where it is.
#[derive(Debug, Clone)]
pub struct PeriodLessonTracker<'a> {
    period: u32,
    course_id: CourseId,
    lessons: &'a [Lesson],
    current_index: usize,
}

impl<'a> PeriodLessonTracker<'a> {
    pub fn new(period: u32, course_id: CourseId, lessons: &'a [Lesson]) -> Self {
        Self::starting_at(period, course_id, lessons, 0)
    }

    pub fn starting_at(
        period: u32,
        course_id: CourseId,
        lessons: &'a [Lesson],
        current_index: usize,
    ) -> Self {
        Self {
            period,
            course_id,
            lessons,
            current_index,
        }
    }

    pub fn period(&self) -> u32 {
        self.period
    }

    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    pub fn current(&self) -> Option<&'a Lesson> {
        self.lessons.get(self.current_index)
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn advance(&mut self) {
        self.current_index += 1;
    }

    pub fn is_exhausted(&self) -> bool {
        self.current_index >= self.lessons.len()
    }

    pub fn remaining(&self) -> usize {
        self.lessons.len().saturating_sub(self.current_index)
    }
}
