//! Entry points that tie the store to the engine.
//!
//! Every operation loads fresh lesson orderings, checks that the caller owns
//! the configuration or schedule before computing anything, and persists in
//! a single store call.

use super::continuation::{
    analyze_sequence_state as analyze, continue_sequences as continue_from, highest_assigned_index,
    ContinuationInput, SequenceState, UnplacedLessons,
};
use super::generate::{events_by_period, fingerprint, generate_events, generate_period_from, GenerationInput};
use super::model::{
    ConfigurationId, CourseId, GenerationOptions, Lesson, ScheduleConfiguration, ScheduleEvent,
    ScheduleId,
};
use super::sequencer::sequence_lessons;
use super::store::{ScheduleRecord, ScheduleStore};
use super::validate::{validate_configuration, ValidationIssue, ValidationReport};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl ServiceError {
    /// Wire error code for the IPC layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::BadRequest(_) => "bad_params",
            Self::Store(_) => "db_query_failed",
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Compute and return events without touching the stored schedule.
    pub dry_run: bool,
    pub generation: GenerationOptions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateOutcome {
    pub success: bool,
    pub schedule_id: Option<ScheduleId>,
    pub persisted: bool,
    pub events: Vec<ScheduleEvent>,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub events_by_period: BTreeMap<u32, usize>,
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinueRequest {
    pub after_date: NaiveDate,
    /// Defaults to the configuration end date.
    pub end_date: Option<NaiveDate>,
    pub specific_periods: Option<BTreeSet<u32>>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueOutcome {
    /// Newly appended events, with their stored ids.
    pub events: Vec<ScheduleEvent>,
    pub unplaced: Vec<UnplacedLessons>,
}

fn load_owned_configuration<S: ScheduleStore + ?Sized>(
    store: &S,
    configuration_id: ConfigurationId,
    user_id: &str,
) -> ServiceResult<ScheduleConfiguration> {
    let config = store
        .load_configuration(configuration_id)?
        .ok_or_else(|| ServiceError::NotFound(format!("configuration {}", configuration_id)))?;
    if config.user_id != user_id {
        return Err(ServiceError::Forbidden(format!(
            "configuration {} belongs to another user",
            configuration_id
        )));
    }
    Ok(config)
}

fn load_owned_schedule<S: ScheduleStore + ?Sized>(
    store: &S,
    schedule_id: ScheduleId,
    user_id: &str,
) -> ServiceResult<(ScheduleRecord, ScheduleConfiguration)> {
    let schedule = store
        .load_schedule(schedule_id)?
        .ok_or_else(|| ServiceError::NotFound(format!("schedule {}", schedule_id)))?;
    if schedule.user_id != user_id {
        return Err(ServiceError::Forbidden(format!(
            "schedule {} belongs to another user",
            schedule_id
        )));
    }
    let config = load_owned_configuration(store, schedule.configuration_id, user_id)?;
    Ok((schedule, config))
}

/// Sequenced lessons for every course the configuration references.
fn load_sequences<S: ScheduleStore + ?Sized>(
    store: &S,
    config: &ScheduleConfiguration,
) -> ServiceResult<HashMap<CourseId, Vec<Lesson>>> {
    let courses: BTreeSet<CourseId> = config.course_assignments().map(|(_, c)| c).collect();
    let mut out = HashMap::with_capacity(courses.len());
    for course_id in courses {
        let lessons = store.load_course_lessons(course_id, &config.user_id)?;
        out.insert(course_id, sequence_lessons(lessons));
    }
    Ok(out)
}

pub fn validate<S: ScheduleStore + ?Sized>(
    store: &S,
    configuration_id: ConfigurationId,
    user_id: &str,
) -> ServiceResult<ValidationReport> {
    let config = load_owned_configuration(store, configuration_id, user_id)?;
    let lessons = load_sequences(store, &config)?;
    Ok(validate_configuration(&config, &lessons))
}

pub fn generate<S: ScheduleStore + ?Sized>(
    store: &S,
    configuration_id: ConfigurationId,
    user_id: &str,
    options: &GenerateOptions,
) -> ServiceResult<GenerateOutcome> {
    let started = Instant::now();
    let config = load_owned_configuration(store, configuration_id, user_id)?;
    let lessons = load_sequences(store, &config)?;
    let report = validate_configuration(&config, &lessons);
    let existing_schedule = store.find_schedule_for_configuration(configuration_id)?;

    if !report.can_generate {
        warn!(
            configuration_id,
            errors = report.errors.len(),
            "schedule generation refused by validation"
        );
        return Ok(GenerateOutcome {
            success: false,
            schedule_id: existing_schedule.map(|s| s.id),
            persisted: false,
            events: Vec::new(),
            errors: report.errors,
            warnings: report.warnings,
            events_by_period: BTreeMap::new(),
            fingerprint: None,
        });
    }

    let special_days = store.load_existing_special_days(configuration_id, user_id)?;
    let events = generate_events(&GenerationInput {
        config: &config,
        lessons_by_course: &lessons,
        special_days: &special_days,
        options: &options.generation,
    });
    let by_period = events_by_period(&events);
    let digest = fingerprint(&events);

    let (schedule_id, events, persisted) = if options.dry_run {
        (existing_schedule.map(|s| s.id), events, false)
    } else {
        let saved = store.replace_schedule_events(&config, &events)?;
        (Some(saved.schedule.id), saved.events, true)
    };

    info!(
        configuration_id,
        schedule_id = ?schedule_id,
        events = events.len(),
        warnings = report.warnings.len(),
        dry_run = options.dry_run,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "schedule generated"
    );

    Ok(GenerateOutcome {
        success: true,
        schedule_id,
        persisted,
        events,
        errors: Vec::new(),
        warnings: report.warnings,
        events_by_period: by_period,
        fingerprint: Some(digest),
    })
}

pub fn analyze_sequence_state<S: ScheduleStore + ?Sized>(
    store: &S,
    schedule_id: ScheduleId,
    after_date: NaiveDate,
    user_id: &str,
) -> ServiceResult<SequenceState> {
    let (_, config) = load_owned_schedule(store, schedule_id, user_id)?;
    let lessons = load_sequences(store, &config)?;
    let events = store.load_schedule_events(schedule_id)?;
    Ok(analyze(&config, &lessons, &events, after_date))
}

/// Appends the remaining lessons of unfinished periods after
/// `request.after_date`. Returns the new, persisted events and any lessons
/// that found no free cell in the window.
pub fn continue_sequences<S: ScheduleStore + ?Sized>(
    store: &S,
    schedule_id: ScheduleId,
    request: &ContinueRequest,
    user_id: &str,
    options: &GenerationOptions,
) -> ServiceResult<ContinueOutcome> {
    let (_, config) = load_owned_schedule(store, schedule_id, user_id)?;
    let from = request
        .after_date
        .succ_opt()
        .ok_or_else(|| ServiceError::BadRequest("afterDate is out of range".into()))?;
    let to = request.end_date.unwrap_or(config.end_date);
    if from > to {
        return Err(ServiceError::BadRequest(format!(
            "nothing to continue: window {} to {} is empty",
            from, to
        )));
    }

    let lessons = load_sequences(store, &config)?;
    let existing = store.load_schedule_events(schedule_id)?;
    let state = analyze(&config, &lessons, &existing, request.after_date);
    let points: Vec<_> = state
        .continuation_points
        .into_iter()
        .filter(|p| {
            request
                .specific_periods
                .as_ref()
                .map(|only| only.contains(&p.period))
                .unwrap_or(true)
        })
        .collect();
    if points.is_empty() {
        debug!(schedule_id, "no periods need continuation");
        return Ok(ContinueOutcome::default());
    }

    let special_days = store.load_existing_special_days(config.id, user_id)?;
    let added = continue_from(
        &ContinuationInput {
            config: &config,
            lessons_by_course: &lessons,
            special_days: &special_days,
            existing: &existing,
            options,
        },
        &points,
        from,
        to,
    );
    let saved = store.append_schedule_events(schedule_id, &added.events)?;
    info!(
        schedule_id,
        periods = points.len(),
        events = saved.len(),
        "lesson sequences continued"
    );
    for u in &added.unplaced {
        warn!(
            schedule_id,
            period = u.period,
            lessons = u.count,
            "no free cells left for lessons; regenerate the period to place them"
        );
    }
    Ok(ContinueOutcome {
        events: saved,
        unplaced: added.unplaced,
    })
}

/// Rebuilds one period from `from_date` onward, resuming after the highest
/// lesson already taught in that period before `from_date`. Other periods
/// and earlier cells are untouched.
pub fn regenerate_period<S: ScheduleStore + ?Sized>(
    store: &S,
    schedule_id: ScheduleId,
    period: u32,
    from_date: NaiveDate,
    user_id: &str,
    options: &GenerationOptions,
) -> ServiceResult<Vec<ScheduleEvent>> {
    let (_, config) = load_owned_schedule(store, schedule_id, user_id)?;
    let assignment = config
        .assignment(period)
        .ok_or_else(|| ServiceError::BadRequest(format!("period {} has no assignment", period)))?;
    let lessons = load_sequences(store, &config)?;

    let start_index = match (assignment.course_id(), from_date.pred_opt()) {
        (Some(course_id), Some(through)) => {
            let existing = store.load_schedule_events(schedule_id)?;
            let sequence = lessons.get(&course_id).map(Vec::as_slice).unwrap_or(&[]);
            let (highest, _) = highest_assigned_index(sequence, &existing, period, course_id, through);
            (highest + 1) as usize
        }
        _ => 0,
    };

    let special_days = store.load_existing_special_days(config.id, user_id)?;
    let events = generate_period_from(
        &GenerationInput {
            config: &config,
            lessons_by_course: &lessons,
            special_days: &special_days,
            options,
        },
        assignment,
        from_date,
        start_index,
    );
    let saved = store.replace_period_events_from(schedule_id, period, from_date, &events)?;
    info!(
        schedule_id,
        period,
        from = %from_date,
        start_index,
        events = saved.len(),
        "period regenerated"
    );
    Ok(saved)
}
