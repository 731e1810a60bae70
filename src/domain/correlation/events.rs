use crate::domain::utils::id::{JobId, StageId, TaskId};

/// A job was submitted; `stage_ids` lists every stage it may run.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStarted {
    pub job_id: JobId,
    pub start_timestamp: i64,
    pub stage_ids: Vec<StageId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitStarted {
    pub unit_id: TaskId,
    pub stage_id: StageId,
}

/// A task finished. Metrics the host did not report are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitCompleted {
    pub unit_id: TaskId,
    pub stage_id: StageId,
    pub unit_type: String,
    pub launch_timestamp: i64,
    pub runtime: i64,
    pub executor_id: String,
    pub deserialize_time: Option<i64>,
    pub serialization_time: Option<i64>,
    pub disk_bytes_spilled: Option<i64>,
    pub shuffle_bytes_written: Option<i64>,
    pub user: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageCompleted {
    pub stage_id: StageId,
    pub parent_stage_ids: Vec<StageId>,
    pub submit_timestamp: Option<i64>,
    pub runtime: Option<i64>,
    pub resource_profile_id: i32,
    pub disk_bytes_spilled: Option<i64>,
    pub shuffle_bytes_written: Option<i64>,
    pub user: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobEnded {
    pub job_id: JobId,
    pub end_timestamp: i64,
}

/// No further events will be delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationEnded {
    pub timestamp: i64,
}

/// Lifecycle events emitted by the host scheduler, in the order it delivered them.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    JobStarted(JobStarted),
    UnitStarted(UnitStarted),
    UnitCompleted(UnitCompleted),
    StageCompleted(StageCompleted),
    JobEnded(JobEnded),
    ApplicationEnded(ApplicationEnded),
}

impl SchedulerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SchedulerEvent::JobStarted(_) => "JobStarted",
            SchedulerEvent::UnitStarted(_) => "UnitStarted",
            SchedulerEvent::UnitCompleted(_) => "UnitCompleted",
            SchedulerEvent::StageCompleted(_) => "StageCompleted",
            SchedulerEvent::JobEnded(_) => "JobEnded",
            SchedulerEvent::ApplicationEnded(_) => "ApplicationEnded",
        }
    }
}
