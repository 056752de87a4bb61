//! Background schedule rebuilds.
//!
//! One queue and one worker thread per open workspace. Requests for the same
//! schedule collapse: a queued job is replaced by the newer request, while a
//! job already running finishes and the newer one waits behind it.

use crate::db;
use crate::schedule::model::{ConfigurationId, ScheduleId};
use crate::schedule::service::{self, GenerateOptions, ServiceError};
use crate::schedule::store::ScheduleStore;
use crate::settings::SchedulerSettings;
use parking_lot::{Condvar, Mutex};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Finished jobs kept for `status` lookups before the oldest are dropped.
const MAX_FINISHED_JOBS: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildTask {
    pub schedule_id: ScheduleId,
    pub configuration_id: ConfigurationId,
    pub user_id: String,
    pub reason: String,
}

impl RebuildTask {
    pub fn dedup_key(&self) -> String {
        format!("schedule-rebuild-{}", self.schedule_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    NotFound,
    Enqueued,
    Processing,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: String,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_id: Option<ScheduleId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

#[derive(Debug)]
struct Job {
    task: RebuildTask,
    state: JobState,
    error: Option<String>,
    elapsed_ms: Option<u64>,
}

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<String, Job>,
    queue: VecDeque<String>,
    finished: VecDeque<String>,
    stopped: bool,
}

#[derive(Debug, Default)]
struct Shared {
    inner: Mutex<Inner>,
    ready: Condvar,
}

/// A claimed job, owned by whoever will run it.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub job_id: String,
    pub task: RebuildTask,
}

#[derive(Clone, Debug, Default)]
pub struct RebuildCoordinator {
    shared: Arc<Shared>,
}

impl RebuildCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `task` and returns its job id. A job for the same schedule
    /// that is still waiting is dropped; its id reports `NotFound` from now on.
    pub fn enqueue(&self, task: RebuildTask) -> String {
        let job_id = Uuid::new_v4().to_string();
        let key = task.dedup_key();
        let mut inner = self.shared.inner.lock();

        let replaced: Vec<String> = inner
            .queue
            .iter()
            .filter(|id| inner.jobs.get(*id).map(|j| j.task.dedup_key() == key).unwrap_or(false))
            .cloned()
            .collect();
        for old in &replaced {
            inner.queue.retain(|id| id != old);
            inner.jobs.remove(old);
        }

        info!(
            job_id = %job_id,
            schedule_id = task.schedule_id,
            reason = %task.reason,
            replaced = replaced.len(),
            "schedule rebuild enqueued"
        );
        inner.jobs.insert(
            job_id.clone(),
            Job {
                task,
                state: JobState::Enqueued,
                error: None,
                elapsed_ms: None,
            },
        );
        inner.queue.push_back(job_id.clone());
        drop(inner);
        self.shared.ready.notify_one();
        job_id
    }

    pub fn status(&self, job_id: &str) -> JobStatus {
        let inner = self.shared.inner.lock();
        match inner.jobs.get(job_id) {
            Some(job) => JobStatus {
                job_id: job_id.to_string(),
                state: job.state,
                schedule_id: Some(job.task.schedule_id),
                error: job.error.clone(),
                elapsed_ms: job.elapsed_ms,
            },
            None => JobStatus {
                job_id: job_id.to_string(),
                state: JobState::NotFound,
                schedule_id: None,
                error: None,
                elapsed_ms: None,
            },
        }
    }

    /// True while a rebuild of the schedule is waiting or running.
    pub fn is_in_progress(&self, schedule_id: ScheduleId) -> bool {
        self.shared.inner.lock().jobs.values().any(|j| {
            j.task.schedule_id == schedule_id
                && matches!(j.state, JobState::Enqueued | JobState::Processing)
        })
    }

    fn claim_locked(inner: &mut Inner) -> Option<ClaimedJob> {
        while let Some(job_id) = inner.queue.pop_front() {
            if let Some(job) = inner.jobs.get_mut(&job_id) {
                job.state = JobState::Processing;
                return Some(ClaimedJob {
                    job_id,
                    task: job.task.clone(),
                });
            }
        }
        None
    }

    /// Takes the oldest waiting job without blocking.
    pub fn claim_next(&self) -> Option<ClaimedJob> {
        Self::claim_locked(&mut self.shared.inner.lock())
    }

    /// Blocks until a job is available. Returns `None` once stopped.
    fn wait_next(&self) -> Option<ClaimedJob> {
        let mut inner = self.shared.inner.lock();
        loop {
            if inner.stopped {
                return None;
            }
            if let Some(job) = Self::claim_locked(&mut inner) {
                return Some(job);
            }
            self.shared.ready.wait(&mut inner);
        }
    }

    pub fn complete(&self, job_id: &str, result: Result<(), String>, elapsed_ms: u64) {
        let mut inner = self.shared.inner.lock();
        let Some(job) = inner.jobs.get_mut(job_id) else {
            return;
        };
        match result {
            Ok(()) => job.state = JobState::Succeeded,
            Err(message) => {
                job.state = JobState::Failed;
                job.error = Some(message);
            }
        }
        job.elapsed_ms = Some(elapsed_ms);
        inner.finished.push_back(job_id.to_string());
        while inner.finished.len() > MAX_FINISHED_JOBS {
            if let Some(old) = inner.finished.pop_front() {
                inner.jobs.remove(&old);
            }
        }
    }

    /// Runs a claimed job on `conn` and records the outcome. Failures are
    /// logged and recorded, never retried.
    pub fn process(&self, conn: &Connection, job: ClaimedJob) -> JobState {
        let started = Instant::now();
        let result = execute(conn, &job.task);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let state = match &result {
            Ok(()) => {
                info!(
                    job_id = %job.job_id,
                    schedule_id = job.task.schedule_id,
                    elapsed_ms,
                    "schedule rebuild finished"
                );
                JobState::Succeeded
            }
            Err(e) => {
                error!(
                    job_id = %job.job_id,
                    schedule_id = job.task.schedule_id,
                    elapsed_ms,
                    error = %e,
                    "schedule rebuild failed"
                );
                JobState::Failed
            }
        };
        self.complete(&job.job_id, result.map_err(|e| e.to_string()), elapsed_ms);
        state
    }

    fn shutdown(&self) {
        let mut inner = self.shared.inner.lock();
        inner.stopped = true;
        if !inner.queue.is_empty() {
            warn!(pending = inner.queue.len(), "rebuild queue closed with pending jobs");
        }
        drop(inner);
        self.shared.ready.notify_all();
    }
}

/// Ownership is checked again here: the schedule may have changed hands or
/// been rebound since the task was queued.
fn execute(conn: &Connection, task: &RebuildTask) -> Result<(), ServiceError> {
    let schedule = conn
        .load_schedule(task.schedule_id)?
        .ok_or_else(|| ServiceError::NotFound(format!("schedule {}", task.schedule_id)))?;
    if schedule.user_id != task.user_id || schedule.configuration_id != task.configuration_id {
        return Err(ServiceError::Forbidden(format!(
            "schedule {} no longer matches the rebuild request",
            task.schedule_id
        )));
    }
    let settings = SchedulerSettings::load(conn)?;
    let outcome = service::generate(
        conn,
        task.configuration_id,
        &task.user_id,
        &GenerateOptions {
            dry_run: false,
            generation: settings.generation,
        },
    )?;
    if !outcome.success {
        let codes: Vec<&str> = outcome.errors.iter().map(|e| e.code).collect();
        return Err(ServiceError::BadRequest(format!(
            "configuration failed validation: {}",
            codes.join(", ")
        )));
    }
    Ok(())
}

/// The workspace's rebuild thread. Dropping it stops the thread after the
/// job in hand, if any, and discards jobs still waiting.
pub struct RebuildWorker {
    coordinator: RebuildCoordinator,
    handle: Option<JoinHandle<()>>,
}

impl RebuildWorker {
    pub fn spawn(workspace: &Path) -> anyhow::Result<Self> {
        let conn = db::open_db(workspace)?;
        let coordinator = RebuildCoordinator::new();
        let worker_side = coordinator.clone();
        let handle = std::thread::Builder::new()
            .name("plannerd-rebuild".to_string())
            .spawn(move || {
                while let Some(job) = worker_side.wait_next() {
                    worker_side.process(&conn, job);
                }
            })?;
        Ok(Self {
            coordinator,
            handle: Some(handle),
        })
    }

    pub fn coordinator(&self) -> &RebuildCoordinator {
        &self.coordinator
    }
}

impl Drop for RebuildWorker {
    fn drop(&mut self) {
        self.coordinator.shutdown();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("rebuild worker panicked");
            }
        }
    }
}
