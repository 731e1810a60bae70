use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::correlation::events::SchedulerEvent;
use crate::domain::correlation::job_aggregator::JobAggregator;
use crate::domain::correlation::listener::TraceListener;
use crate::domain::correlation::stage_graph_builder::StageGraphBuilder;
use crate::domain::correlation::task_correlator::TaskCorrelator;
use crate::domain::resource::ResourceRegistry;
use crate::domain::runtime_config::RuntimeConfig;
use crate::domain::trace::{ResourceSample, Task, Workflow};
use crate::domain::utils::id::SourceId;
use crate::domain::utils::worker_pool::WorkerPool;
use crate::error::{Error, Result};

/// Read-only result of a run, handed to a writer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceSnapshot {
    pub tasks: Vec<Task>,
    pub workflows: Vec<Workflow>,
    pub resources: BTreeMap<SourceId, Vec<ResourceSample>>,
}

/// Wires the correlators together and feeds them scheduler events.
///
/// Events that cannot be correlated are logged and dropped; dispatch never fails the run.
pub struct TraceCollector {
    config: Arc<RuntimeConfig>,
    pool: Arc<WorkerPool>,
    graph: Arc<StageGraphBuilder>,
    aggregator: Arc<JobAggregator>,
    resources: Arc<ResourceRegistry>,

    /// Job bookkeeping runs before the correlators so a rejected job start reaches neither.
    listeners: Vec<Arc<dyn TraceListener>>,
}

impl TraceCollector {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        let pool = Arc::new(WorkerPool::new(config.worker_threads));
        let base = Arc::new(TaskCorrelator::new(Arc::clone(&config)));
        let graph = Arc::new(StageGraphBuilder::new(base, Arc::clone(&pool)));
        let aggregator = Arc::new(JobAggregator::new(Arc::clone(&graph)));
        let resources = Arc::new(ResourceRegistry::from_config(&config));

        let listeners: Vec<Arc<dyn TraceListener>> = vec![aggregator.clone() as Arc<dyn TraceListener>, graph.clone() as Arc<dyn TraceListener>];

        log::info!(
            "Trace collector ready ({} level, schema {}, {} workers)",
            if config.is_stage_level { "stage" } else { "task" },
            config.schema_version,
            config.worker_threads
        );

        TraceCollector { config, pool, graph, aggregator, resources, listeners }
    }

    pub fn config(&self) -> &Arc<RuntimeConfig> {
        &self.config
    }

    pub fn graph(&self) -> &Arc<StageGraphBuilder> {
        &self.graph
    }

    pub fn aggregator(&self) -> &Arc<JobAggregator> {
        &self.aggregator
    }

    /// Per-source sample streams; hand this to a sampler or a resource server.
    pub fn resources(&self) -> &Arc<ResourceRegistry> {
        &self.resources
    }

    /// Delivers one event to every listener, stopping at the first that rejects it.
    pub fn try_dispatch(&self, event: &SchedulerEvent) -> Result<()> {
        for listener in &self.listeners {
            match event {
                SchedulerEvent::JobStarted(e) => listener.on_job_start(e)?,
                SchedulerEvent::UnitStarted(e) => listener.on_unit_start(e)?,
                SchedulerEvent::UnitCompleted(e) => listener.on_unit_end(e)?,
                SchedulerEvent::StageCompleted(e) => listener.on_group_end(e)?,
                SchedulerEvent::JobEnded(e) => listener.on_job_end(e)?,
                SchedulerEvent::ApplicationEnded(e) => listener.on_application_end(e)?,
            }
        }
        Ok(())
    }

    /// Delivers one event, logging and dropping it if it cannot be correlated. Returns whether it
    /// was accepted.
    pub fn dispatch(&self, event: &SchedulerEvent) -> bool {
        match self.try_dispatch(event) {
            Ok(()) => true,
            Err(e @ (Error::UnresolvedOwner { .. } | Error::DuplicateJob(_) | Error::JobAlreadyFinalized(_))) => {
                log::warn!("Dropping {} event: {}", event.kind(), e);
                false
            }
            Err(e) => {
                log::error!("Failed to process {} event: {}", event.kind(), e);
                false
            }
        }
    }

    /// Dispatches every event in order and returns how many were dropped.
    pub fn replay<I: IntoIterator<Item = SchedulerEvent>>(&self, events: I) -> usize {
        events.into_iter().filter(|event| !self.dispatch(event)).count()
    }

    /// Waits for queued emissions, discards jobs that never ended and hands out everything
    /// collected. Call once, after the last event was dispatched.
    pub fn finalize(&self) -> TraceSnapshot {
        if self.aggregator.pending_jobs() > 0 {
            self.aggregator.abandon_pending();
        }
        self.pool.wait_idle();

        let tasks = if self.config.is_stage_level { self.graph.output().drain_all() } else { self.graph.base().output().drain_all() };
        let snapshot = TraceSnapshot { tasks, workflows: self.aggregator.output().drain_all(), resources: self.resources.collect() };

        log::info!(
            "Trace finalized: {} tasks, {} workflows, {} resource sources",
            snapshot.tasks.len(),
            snapshot.workflows.len(),
            snapshot.resources.len()
        );
        snapshot
    }
}

impl Drop for TraceCollector {
    fn drop(&mut self) {
        self.pool.shutdown();
    }
}
