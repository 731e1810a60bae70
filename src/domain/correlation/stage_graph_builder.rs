use std::sync::Arc;

use dashmap::DashMap;

use crate::domain::correlation::events::{JobStarted, StageCompleted, UnitCompleted, UnitStarted};
use crate::domain::correlation::listener::TraceListener;
use crate::domain::correlation::task_correlator::TaskCorrelator;
use crate::domain::stream::StreamBuffer;
use crate::domain::trace::Task;
use crate::domain::trace::sentinel::{UNKNOWN_F64, UNKNOWN_I32, UNKNOWN_I64, add_optional};
use crate::domain::utils::hashing::stable_id;
use crate::domain::utils::id::{JobId, StageId};
use crate::domain::utils::worker_pool::WorkerPool;
use crate::error::{Error, Result};

pub const STAGE_TASK_TYPE: &str = "stage";

/// Stage-granularity correlator that also rebuilds the stage dependency graph.
///
/// Wraps a [`TaskCorrelator`], which keeps owning the pending-submission maps and, when tracing
/// tasks, the task records. Stage records are always built so that job aggregation knows stage
/// runtimes; they are only emitted when tracing at stage level.
///
/// A stage's children are only known once every child has completed, so stage records are held
/// per job and rebuilt with their children when the job ends.
pub struct StageGraphBuilder {
    base: Arc<TaskCorrelator>,
    pool: Arc<WorkerPool>,
    output: Arc<StreamBuffer<Task>>,

    stage_parents: DashMap<StageId, Vec<StageId>>,
    stage_children: DashMap<StageId, Vec<StageId>>,
    stage_resource: DashMap<StageId, i32>,
    held: DashMap<JobId, Vec<Task>>,
}

impl StageGraphBuilder {
    pub fn new(base: Arc<TaskCorrelator>, pool: Arc<WorkerPool>) -> Self {
        let output = Arc::new(base.output().sibling());
        StageGraphBuilder {
            base,
            pool,
            output,
            stage_parents: DashMap::new(),
            stage_children: DashMap::new(),
            stage_resource: DashMap::new(),
            held: DashMap::new(),
        }
    }

    pub fn base(&self) -> &Arc<TaskCorrelator> {
        &self.base
    }

    fn is_stage_level(&self) -> bool {
        self.base.config().is_stage_level
    }

    /// Stage records emitted so far. Empty unless tracing at stage level.
    pub fn output(&self) -> &Arc<StreamBuffer<Task>> {
        &self.output
    }

    pub fn parents_of(&self, stage: StageId) -> Vec<StageId> {
        self.stage_parents.get(&stage).map(|parents| parents.clone()).unwrap_or_default()
    }

    /// Children recorded so far. Only complete once the owning job has ended.
    pub fn children_of(&self, stage: StageId) -> Vec<StageId> {
        self.stage_children.get(&stage).map(|children| children.clone()).unwrap_or_default()
    }

    pub fn resource_profile_of(&self, stage: StageId) -> Option<i32> {
        self.stage_resource.get(&stage).map(|profile| *profile)
    }

    fn build_stage(&self, event: &StageCompleted, job: JobId) -> Task {
        let stage = event.stage_id.value();
        Task {
            task_type: STAGE_TASK_TYPE.to_string(),
            submit_timestamp: event.submit_timestamp.unwrap_or(UNKNOWN_I64),
            runtime: event.runtime.unwrap_or(UNKNOWN_I64),
            parents: event.parent_stage_ids.iter().map(|p| p.value()).collect(),
            user_id: event.user.as_deref().map(stable_id).unwrap_or(UNKNOWN_I32),
            disk_space_requested: add_optional(event.disk_bytes_spilled, event.shuffle_bytes_written).map(|b| b as f64).unwrap_or(UNKNOWN_F64),
            ..Task::unmeasured(stage, job.value())
        }
    }

    fn emit(&self, records: Vec<Task>) {
        if !self.is_stage_level() || records.is_empty() {
            return;
        }
        let output = Arc::clone(&self.output);
        let count = records.len();
        let emitted = self.pool.execute(move || {
            for record in records {
                output.append(record);
            }
        });
        if let Err(e) = emitted {
            log::error!("Dropped {} stage records: {}", count, e);
        }
    }

    fn release_job(&self, job: JobId) -> Vec<Task> {
        let held = self.held.remove(&job).map(|(_, records)| records).unwrap_or_default();

        let records: Vec<Task> = held
            .into_iter()
            .map(|record| {
                let children = self.children_of(StageId::new(record.id)).into_iter().map(|c| c.value()).collect();
                record.with_children(children)
            })
            .collect();

        for record in &records {
            let stage = StageId::new(record.id);
            self.stage_parents.remove(&stage);
            self.stage_children.remove(&stage);
        }
        records
    }

    /// Rebuilds the held stage records of `job` with their children, hands them to the output and
    /// forgets the job's adjacency. Returns the rebuilt records.
    pub fn finalize_job(&self, job: JobId) -> Vec<Task> {
        let records = self.release_job(job);
        self.emit(records.clone());
        records
    }

    /// Forgets the held records and adjacency of a job that will never end. Nothing is emitted.
    /// Returns how many stage records were dropped.
    pub fn discard_job(&self, job: JobId) -> usize {
        self.release_job(job).len()
    }
}

impl TraceListener for StageGraphBuilder {
    fn on_job_start(&self, event: &JobStarted) -> Result<()> {
        self.base.on_job_start(event)
    }

    fn on_unit_start(&self, event: &UnitStarted) -> Result<()> {
        if self.is_stage_level() { Ok(()) } else { self.base.on_unit_start(event) }
    }

    fn on_unit_end(&self, event: &UnitCompleted) -> Result<()> {
        if self.is_stage_level() { Ok(()) } else { self.base.on_unit_end(event) }
    }

    fn on_group_end(&self, event: &StageCompleted) -> Result<()> {
        let stage = event.stage_id;
        let job = self.base.owner_of(stage).ok_or(Error::UnresolvedOwner { entity: "stage", id: stage.value() })?;

        self.stage_resource.insert(stage, event.resource_profile_id);
        self.stage_parents.insert(stage, event.parent_stage_ids.clone());
        for parent in &event.parent_stage_ids {
            self.stage_children.entry(*parent).or_default().push(stage);
        }

        let record = self.build_stage(event, job);
        self.held.entry(job).or_default().push(record);

        self.base.on_group_end(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::runtime_config::RuntimeConfig;

    fn builder(stage_level: bool) -> (tempfile::TempDir, StageGraphBuilder) {
        let dir = tempfile::tempdir().unwrap();
        let config = RuntimeConfig { spill_directory: dir.path().to_path_buf(), is_stage_level: stage_level, ..Default::default() };
        let base = Arc::new(TaskCorrelator::new(Arc::new(config)));
        (dir, StageGraphBuilder::new(base, Arc::new(WorkerPool::new(2))))
    }

    fn stage(id: u64, parents: &[u64], runtime: i64) -> StageCompleted {
        StageCompleted {
            stage_id: StageId::new(id),
            parent_stage_ids: parents.iter().map(|p| StageId::new(*p)).collect(),
            submit_timestamp: Some(1000),
            runtime: Some(runtime),
            resource_profile_id: 0,
            disk_bytes_spilled: Some(10),
            shuffle_bytes_written: Some(5),
            user: None,
        }
    }

    fn start(builder: &StageGraphBuilder, job: u64, stages: &[u64]) {
        let event = JobStarted { job_id: JobId::new(job), start_timestamp: 0, stage_ids: stages.iter().map(|s| StageId::new(*s)).collect() };
        builder.on_job_start(&event).unwrap();
    }

    #[test]
    fn children_mirror_parents() {
        let (_dir, builder) = builder(true);
        start(&builder, 1, &[1, 2, 3, 4]);

        builder.on_group_end(&stage(1, &[], 10)).unwrap();
        builder.on_group_end(&stage(2, &[1], 10)).unwrap();
        builder.on_group_end(&stage(3, &[1], 10)).unwrap();
        builder.on_group_end(&stage(4, &[2, 3], 10)).unwrap();

        assert_eq!(builder.children_of(StageId::new(1)), vec![StageId::new(2), StageId::new(3)]);
        assert_eq!(builder.parents_of(StageId::new(4)), vec![StageId::new(2), StageId::new(3)]);
        assert!(builder.children_of(StageId::new(4)).is_empty());

        let records = builder.finalize_job(JobId::new(1));
        for record in &records {
            for child in &record.children {
                let child_record = records.iter().find(|r| r.id == *child).unwrap();
                assert!(child_record.parents.contains(&record.id));
            }
        }
        assert_eq!(records.iter().find(|r| r.id == 1).unwrap().children, vec![2, 3]);
    }

    #[test]
    fn stage_records_are_emitted_only_at_job_end() {
        let (_dir, builder) = builder(true);
        start(&builder, 1, &[1]);
        builder.on_group_end(&stage(1, &[], 25)).unwrap();

        builder.pool.wait_idle();
        assert!(builder.output().is_empty());

        let records = builder.finalize_job(JobId::new(1));
        builder.pool.wait_idle();

        let emitted = builder.output().drain_all();
        assert_eq!(emitted, records);
        assert_eq!(emitted[0].task_type, "stage");
        assert_eq!(emitted[0].runtime, 25);
        assert_eq!(emitted[0].disk_space_requested, 15.0);
        assert_eq!(emitted[0].workflow_id, 1);
    }

    #[test]
    fn task_level_keeps_stage_records_internal() {
        let (_dir, builder) = builder(false);
        start(&builder, 1, &[1]);
        builder.on_group_end(&stage(1, &[], 25)).unwrap();

        let records = builder.finalize_job(JobId::new(1));
        builder.pool.wait_idle();

        assert_eq!(records.len(), 1);
        assert!(builder.output().is_empty());
    }

    #[test]
    fn discarded_job_emits_nothing() {
        let (_dir, builder) = builder(true);
        start(&builder, 1, &[1, 2]);
        builder.on_group_end(&stage(1, &[], 10)).unwrap();
        builder.on_group_end(&stage(2, &[1], 10)).unwrap();

        assert_eq!(builder.discard_job(JobId::new(1)), 2);
        builder.pool.wait_idle();

        assert!(builder.output().is_empty());
        assert!(builder.children_of(StageId::new(1)).is_empty());
        assert!(builder.finalize_job(JobId::new(1)).is_empty());
    }

    #[test]
    fn unowned_stage_is_rejected() {
        let (_dir, builder) = builder(true);
        let result = builder.on_group_end(&stage(5, &[], 10));
        assert!(matches!(result, Err(Error::UnresolvedOwner { entity: "stage", id: 5 })));
        assert!(builder.children_of(StageId::new(5)).is_empty());
        assert_eq!(builder.resource_profile_of(StageId::new(5)), None);
    }

    #[test]
    fn remembers_resource_profiles() {
        let (_dir, builder) = builder(true);
        start(&builder, 1, &[1]);
        builder.on_group_end(&StageCompleted { resource_profile_id: 3, ..stage(1, &[], 10) }).unwrap();
        builder.finalize_job(JobId::new(1));
        assert_eq!(builder.resource_profile_of(StageId::new(1)), Some(3));
    }
}
