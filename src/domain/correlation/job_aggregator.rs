use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};

use crate::domain::correlation::events::{ApplicationEnded, JobEnded, JobStarted};
use crate::domain::correlation::listener::TraceListener;
use crate::domain::correlation::stage_graph_builder::StageGraphBuilder;
use crate::domain::runtime_config::RuntimeConfig;
use crate::domain::stream::StreamBuffer;
use crate::domain::trace::sentinel::{is_known_i64, sum_known_f64, sum_known_i64};
use crate::domain::trace::workflow::max_concurrent_tasks;
use crate::domain::trace::{Task, Workflow};
use crate::domain::utils::id::{JobId, StageId};
use crate::error::{Error, Result};

pub const APPLICATION_FIELD: &str = "ETL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Pending,
    Finalizing,
}

#[derive(Debug, Clone)]
struct JobEntry {
    submit_timestamp: i64,
    stage_ids: Vec<StageId>,
    phase: JobPhase,
}

/// Everything needed to derive one [`Workflow`].
#[derive(Debug, Clone)]
pub struct JobFacts {
    pub job_id: JobId,
    pub submit_timestamp: i64,
    pub end_timestamp: i64,
    pub stage_ids: Vec<StageId>,

    /// Units the workflow owns: tasks, or stage records at stage level.
    pub units: Vec<Task>,

    /// Runtime of every completed stage of the job.
    pub stage_runtimes: Vec<i64>,

    /// Slowest unit runtime per stage, in `stage_ids` order.
    pub slowest_per_stage: Vec<i64>,
}

/// Wall-clock time of the job not spent inside any of its stages.
pub fn driver_time(facts: &JobFacts) -> i64 {
    let stage_time: i64 = facts.stage_runtimes.iter().copied().filter(|r| is_known_i64(*r)).sum();
    (facts.end_timestamp - facts.submit_timestamp) - stage_time
}

/// Derives the workflow record of a finished job.
pub fn build_workflow(facts: JobFacts, config: &RuntimeConfig) -> Workflow {
    let driver = driver_time(&facts);
    let critical_path_length = driver + facts.slowest_per_stage.iter().sum::<i64>();
    let tasks = facts.units;

    Workflow {
        id: facts.job_id.value(),
        submit_timestamp: facts.submit_timestamp,
        task_count: tasks.len(),
        critical_path_length,
        critical_path_task_count: facts.stage_ids.len(),
        max_concurrent_tasks: max_concurrent_tasks(&tasks),
        nfrs: String::new(),
        scheduler: config.scheduler_mode.clone(),
        domain: config.domain.clone(),
        application_name: config.application_name.clone(),
        application_field: APPLICATION_FIELD.to_string(),
        total_resources: sum_known_f64(tasks.iter().map(|t| t.resource_amount_requested)),
        total_memory_usage: sum_known_f64(tasks.iter().map(|t| t.memory_requested)),
        total_network_usage: sum_known_i64(tasks.iter().map(|t| t.network_io_time)),
        total_disk_space_usage: sum_known_f64(tasks.iter().map(|t| t.disk_space_requested)),
        total_energy_consumption: sum_known_f64(tasks.iter().map(|t| t.energy_consumption)),
        tasks,
    }
}

/// Joins job start and end events with the records of the correlators and emits one
/// [`Workflow`] per job.
///
/// A job is `Pending` from its start until its end event arrives, `Finalizing` while the
/// workflow is derived, and then done: its entry is dropped and a repeated end is rejected.
pub struct JobAggregator {
    config: Arc<RuntimeConfig>,
    graph: Arc<StageGraphBuilder>,
    output: Arc<StreamBuffer<Workflow>>,
    jobs: DashMap<JobId, JobEntry>,
    done: DashSet<JobId>,
}

impl JobAggregator {
    pub fn new(graph: Arc<StageGraphBuilder>) -> Self {
        let config = Arc::clone(graph.base().config());
        let output = Arc::new(graph.output().sibling());
        JobAggregator { config, graph, output, jobs: DashMap::new(), done: DashSet::new() }
    }

    pub fn output(&self) -> &Arc<StreamBuffer<Workflow>> {
        &self.output
    }

    pub fn phase_of(&self, job: JobId) -> Option<JobPhase> {
        self.jobs.get(&job).map(|entry| entry.phase)
    }

    pub fn is_done(&self, job: JobId) -> bool {
        self.done.contains(&job)
    }

    pub fn pending_jobs(&self) -> usize {
        self.jobs.len()
    }

    pub fn start(&self, event: &JobStarted) -> Result<()> {
        let job = event.job_id;
        if self.done.contains(&job) {
            return Err(Error::DuplicateJob(job.value()));
        }
        match self.jobs.entry(job) {
            Entry::Occupied(_) => Err(Error::DuplicateJob(job.value())),
            Entry::Vacant(slot) => {
                slot.insert(JobEntry { submit_timestamp: event.start_timestamp, stage_ids: event.stage_ids.clone(), phase: JobPhase::Pending });
                Ok(())
            }
        }
    }

    /// Finalizes `event.job_id`, appends its workflow to the output and returns it.
    pub fn finish(&self, event: &JobEnded) -> Result<Workflow> {
        let job = event.job_id;
        if self.done.contains(&job) {
            return Err(Error::JobAlreadyFinalized(job.value()));
        }

        let entry = {
            let mut entry = self.jobs.get_mut(&job).ok_or(Error::UnresolvedOwner { entity: "job", id: job.value() })?;
            if entry.phase != JobPhase::Pending {
                return Err(Error::JobAlreadyFinalized(job.value()));
            }
            entry.phase = JobPhase::Finalizing;
            entry.clone()
        };

        let stages = self.graph.finalize_job(job);
        let stage_runtimes = stages.iter().map(|s| s.runtime).collect();
        let base_units = self.graph.base().take_job(job);

        let (units, slowest_per_stage) = if self.config.is_stage_level {
            let slowest = entry
                .stage_ids
                .iter()
                .map(|id| stages.iter().find(|s| s.id == id.value()).map(|s| s.runtime.max(0)).unwrap_or(0))
                .collect();
            (stages, slowest)
        } else {
            (base_units.tasks, base_units.slowest_per_stage)
        };

        let facts = JobFacts {
            job_id: job,
            submit_timestamp: entry.submit_timestamp,
            end_timestamp: event.end_timestamp,
            stage_ids: entry.stage_ids,
            units,
            stage_runtimes,
            slowest_per_stage,
        };
        let workflow = build_workflow(facts, &self.config);
        if !self.config.is_stage_level {
            self.graph.base().publish(workflow.tasks.clone());
        }

        log::info!(
            "Workflow {} finished: {} tasks, critical path {} ms over {} stages, max concurrency {}",
            workflow.id,
            workflow.task_count,
            workflow.critical_path_length,
            workflow.critical_path_task_count,
            workflow.max_concurrent_tasks
        );

        self.output.append(workflow.clone());
        self.jobs.remove(&job);
        self.done.insert(job);
        Ok(workflow)
    }

    /// Discards jobs that never ended together with every record held for them, so no emitted
    /// task points at a workflow that does not exist. Returns the discarded job ids.
    pub fn abandon_pending(&self) -> Vec<JobId> {
        let mut abandoned: Vec<JobId> = self.jobs.iter().map(|entry| *entry.key()).collect();
        abandoned.sort();

        for job in &abandoned {
            let stages = self.graph.discard_job(*job);
            let tasks = self.graph.base().take_job(*job).tasks.len();
            log::warn!("Job {} never ended; dropping its {} task and {} stage records, no workflow is emitted for it", job, tasks, stages);
            self.jobs.remove(job);
        }
        abandoned
    }
}

impl TraceListener for JobAggregator {
    fn on_job_start(&self, event: &JobStarted) -> Result<()> {
        self.start(event)
    }

    fn on_job_end(&self, event: &JobEnded) -> Result<()> {
        self.finish(event).map(|_| ())
    }

    fn on_application_end(&self, _event: &ApplicationEnded) -> Result<()> {
        self.abandon_pending();
        Ok(())
    }
}
