use std::sync::Arc;

use dashmap::DashMap;

use crate::domain::correlation::events::{JobStarted, StageCompleted, UnitCompleted, UnitStarted};
use crate::domain::correlation::listener::TraceListener;
use crate::domain::runtime_config::RuntimeConfig;
use crate::domain::stream::StreamBuffer;
use crate::domain::trace::Task;
use crate::domain::trace::sentinel::{UNKNOWN_F64, UNKNOWN_I32, UNKNOWN_I64, add_optional};
use crate::domain::utils::hashing::stable_id;
use crate::domain::utils::id::{JobId, StageId, TaskId};
use crate::error::{Error, Result};

/// Tasks seen so far for one stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageSummary {
    pub task_ids: Vec<TaskId>,

    /// Longest task runtime reported for the stage, `-1` until a task reported one.
    pub slowest_runtime: i64,
}

impl StageSummary {
    fn record(&mut self, task: &Task) {
        self.task_ids.push(TaskId::new(task.id));
        self.slowest_runtime = self.slowest_runtime.max(task.runtime);
    }
}

/// What the correlator held for a job when it ended.
#[derive(Debug, Default)]
pub struct JobUnits {
    pub tasks: Vec<Task>,

    /// Slowest task runtime for each of the job's stages, in the job's stage order. Stages without
    /// any known task runtime count as `0`.
    pub slowest_per_stage: Vec<i64>,
}

/// Sizes of the pending-submission maps. All zero once every started entity has ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingCounts {
    pub jobs: usize,
    pub stages: usize,
    pub units: usize,
}

/// Turns task completion events into [`Task`] records owned by the right job.
///
/// Ownership is learned from `JobStarted` (stage to job) and `UnitStarted` (task to stage).
/// A completion whose owner cannot be resolved is rejected with [`Error::UnresolvedOwner`] and
/// leaves no trace in the output.
///
/// Records are held per job and only reach the output through [`TaskCorrelator::publish`] once
/// the job's workflow exists.
#[derive(Debug)]
pub struct TaskCorrelator {
    config: Arc<RuntimeConfig>,
    output: Arc<StreamBuffer<Task>>,

    job_stages: DashMap<JobId, Vec<StageId>>,
    stage_to_job: DashMap<StageId, JobId>,
    task_to_stage: DashMap<TaskId, StageId>,
    stage_tasks: DashMap<StageId, StageSummary>,
    job_tasks: DashMap<JobId, Vec<Task>>,
}

impl TaskCorrelator {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        let output = Arc::new(StreamBuffer::with_threshold(config.spill_directory.clone(), config.spill_threshold));
        TaskCorrelator {
            config,
            output,
            job_stages: DashMap::new(),
            stage_to_job: DashMap::new(),
            task_to_stage: DashMap::new(),
            stage_tasks: DashMap::new(),
            job_tasks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &Arc<RuntimeConfig> {
        &self.config
    }

    /// Task records of every job that ended so far.
    pub fn output(&self) -> &Arc<StreamBuffer<Task>> {
        &self.output
    }

    /// Hands the records of an ended job to the output.
    pub fn publish(&self, tasks: Vec<Task>) {
        for task in tasks {
            self.output.append(task);
        }
    }

    pub fn owner_of(&self, stage: StageId) -> Option<JobId> {
        self.stage_to_job.get(&stage).map(|job| *job)
    }

    pub fn stage_summary(&self, stage: StageId) -> Option<StageSummary> {
        self.stage_tasks.get(&stage).map(|summary| summary.clone())
    }

    pub fn pending_counts(&self) -> PendingCounts {
        PendingCounts { jobs: self.job_stages.len(), stages: self.stage_to_job.len(), units: self.task_to_stage.len() }
    }

    fn build_task(&self, event: &UnitCompleted, job: JobId) -> Task {
        Task {
            id: event.unit_id.value(),
            task_type: event.unit_type.clone(),
            submit_timestamp: event.launch_timestamp,
            runtime: event.runtime,
            user_id: event.user.as_deref().map(stable_id).unwrap_or(UNKNOWN_I32),
            disk_space_requested: add_optional(event.disk_bytes_spilled, event.shuffle_bytes_written).map(|b| b as f64).unwrap_or(UNKNOWN_F64),
            disk_io_time: add_optional(event.deserialize_time, event.serialization_time).unwrap_or(UNKNOWN_I64),
            resource_used: stable_id(&event.executor_id) as i64,
            ..Task::unmeasured(event.unit_id.value(), job.value())
        }
    }

    /// Removes everything held for `job` and returns its tasks plus per-stage slowest runtimes.
    pub fn take_job(&self, job: JobId) -> JobUnits {
        let stages = self.job_stages.remove(&job).map(|(_, stages)| stages).unwrap_or_default();
        let tasks = self.job_tasks.remove(&job).map(|(_, tasks)| tasks).unwrap_or_default();

        let slowest_per_stage = stages
            .iter()
            .map(|stage| {
                self.stage_to_job.remove_if(stage, |_, owner| *owner == job);
                self.stage_tasks.remove(stage).map(|(_, summary)| summary.slowest_runtime.max(0)).unwrap_or(0)
            })
            .collect();

        self.task_to_stage.retain(|_, stage| !stages.contains(stage));

        JobUnits { tasks, slowest_per_stage }
    }
}

impl TraceListener for TaskCorrelator {
    fn on_job_start(&self, event: &JobStarted) -> Result<()> {
        for stage in &event.stage_ids {
            self.stage_to_job.insert(*stage, event.job_id);
        }
        self.job_stages.insert(event.job_id, event.stage_ids.clone());
        Ok(())
    }

    fn on_unit_start(&self, event: &UnitStarted) -> Result<()> {
        self.task_to_stage.insert(event.unit_id, event.stage_id);
        Ok(())
    }

    fn on_unit_end(&self, event: &UnitCompleted) -> Result<()> {
        let stage = self.task_to_stage.remove(&event.unit_id).map(|(_, stage)| stage).unwrap_or(event.stage_id);
        let job = self.owner_of(stage).ok_or(Error::UnresolvedOwner { entity: "stage", id: stage.value() })?;

        let task = self.build_task(event, job);

        self.stage_tasks.entry(stage).or_insert_with(|| StageSummary { task_ids: Vec::new(), slowest_runtime: UNKNOWN_I64 }).record(&task);
        self.job_tasks.entry(job).or_default().push(task);
        Ok(())
    }

    /// Drops the task ownership entries of a finished stage. The stage's job entry stays until
    /// the job ends, since late task completions still need it.
    fn on_group_end(&self, event: &StageCompleted) -> Result<()> {
        let stage = event.stage_id;
        self.task_to_stage.retain(|_, owner| *owner != stage);
        Ok(())
    }
}
