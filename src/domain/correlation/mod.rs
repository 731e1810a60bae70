pub mod events;
pub mod job_aggregator;
pub mod listener;
pub mod stage_graph_builder;
pub mod task_correlator;
pub mod trace_collector;

pub use events::{ApplicationEnded, JobEnded, JobStarted, SchedulerEvent, StageCompleted, UnitCompleted, UnitStarted};
pub use job_aggregator::{JobAggregator, JobPhase};
pub use listener::TraceListener;
pub use stage_graph_builder::StageGraphBuilder;
pub use task_correlator::TaskCorrelator;
pub use trace_collector::{TraceCollector, TraceSnapshot};
