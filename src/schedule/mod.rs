//! Schedule generation engine.

pub mod continuation;
pub mod generate;
pub mod model;
pub mod sequencer;
pub mod service;
pub mod special_days;
pub mod store;
pub mod synth;
pub mod tracker;
pub mod validate;
pub mod weekdays;

pub use model::{
    ConfigurationId, CourseId, EventCategory, GenerationOptions, Lesson, LessonId,
    PeriodAssignment, PeriodContent, ScheduleConfiguration, ScheduleEvent, ScheduleId,
    SpecialDay, SpecialDayId,
};
pub use service::{
    ContinueOutcome, ContinueRequest, GenerateOptions, GenerateOutcome, ServiceError, ServiceResult,
};
pub use store::ScheduleStore;
pub use weekdays::TeachingDays;
