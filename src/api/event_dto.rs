use serde::{Deserialize, Serialize};

use crate::domain::correlation::events::{ApplicationEnded, JobEnded, JobStarted, SchedulerEvent, StageCompleted, UnitCompleted, UnitStarted};
use crate::domain::utils::id::Id;

/// Scheduler event as recorded in a replay log.
///
/// Ids are the host's own 0-based numbers; conversion into a [`SchedulerEvent`] shifts them to
/// the 1-based ids used in the trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum SchedulerEventDto {
    JobStart {
        job_id: u64,
        time: i64,
        stage_ids: Vec<u64>,
    },
    TaskStart {
        task_id: u64,
        stage_id: u64,
    },
    TaskEnd {
        task_id: u64,
        stage_id: u64,
        task_type: String,
        launch_time: i64,
        executor_run_time: i64,
        executor_id: String,
        #[serde(default)]
        executor_deserialize_time: Option<i64>,
        #[serde(default)]
        result_serialization_time: Option<i64>,
        #[serde(default)]
        disk_bytes_spilled: Option<i64>,
        #[serde(default)]
        shuffle_bytes_written: Option<i64>,
        #[serde(default)]
        user: Option<String>,
    },
    StageCompleted {
        stage_id: u64,
        #[serde(default)]
        parent_ids: Vec<u64>,
        #[serde(default)]
        submission_time: Option<i64>,
        #[serde(default)]
        executor_run_time: Option<i64>,
        #[serde(default)]
        resource_profile_id: i32,
        #[serde(default)]
        disk_bytes_spilled: Option<i64>,
        #[serde(default)]
        shuffle_bytes_written: Option<i64>,
        #[serde(default)]
        user: Option<String>,
    },
    JobEnd {
        job_id: u64,
        time: i64,
    },
    ApplicationEnd {
        time: i64,
    },
}

fn shifted<T>(host_id: u64) -> Id<T> {
    Id::new(host_id + 1)
}

impl From<SchedulerEventDto> for SchedulerEvent {
    fn from(dto: SchedulerEventDto) -> Self {
        match dto {
            SchedulerEventDto::JobStart { job_id, time, stage_ids } => SchedulerEvent::JobStarted(JobStarted {
                job_id: shifted(job_id),
                start_timestamp: time,
                stage_ids: stage_ids.into_iter().map(shifted).collect(),
            }),
            SchedulerEventDto::TaskStart { task_id, stage_id } => {
                SchedulerEvent::UnitStarted(UnitStarted { unit_id: shifted(task_id), stage_id: shifted(stage_id) })
            }
            SchedulerEventDto::TaskEnd {
                task_id,
                stage_id,
                task_type,
                launch_time,
                executor_run_time,
                executor_id,
                executor_deserialize_time,
                result_serialization_time,
                disk_bytes_spilled,
                shuffle_bytes_written,
                user,
            } => SchedulerEvent::UnitCompleted(UnitCompleted {
                unit_id: shifted(task_id),
                stage_id: shifted(stage_id),
                unit_type: task_type,
                launch_timestamp: launch_time,
                runtime: executor_run_time,
                executor_id,
                deserialize_time: executor_deserialize_time,
                serialization_time: result_serialization_time,
                disk_bytes_spilled,
                shuffle_bytes_written,
                user,
            }),
            SchedulerEventDto::StageCompleted {
                stage_id,
                parent_ids,
                submission_time,
                executor_run_time,
                resource_profile_id,
                disk_bytes_spilled,
                shuffle_bytes_written,
                user,
            } => SchedulerEvent::StageCompleted(StageCompleted {
                stage_id: shifted(stage_id),
                parent_stage_ids: parent_ids.into_iter().map(shifted).collect(),
                submit_timestamp: submission_time,
                runtime: executor_run_time,
                resource_profile_id,
                disk_bytes_spilled,
                shuffle_bytes_written,
                user,
            }),
            SchedulerEventDto::JobEnd { job_id, time } => {
                SchedulerEvent::JobEnded(JobEnded { job_id: shifted(job_id), end_timestamp: time })
            }
            SchedulerEventDto::ApplicationEnd { time } => SchedulerEvent::ApplicationEnded(ApplicationEnded { timestamp: time }),
        }
    }
}
