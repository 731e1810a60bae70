pub mod metric_sampler;
pub mod probe;
pub mod proc_probes;

pub use metric_sampler::MetricSampler;
pub use probe::MetricProbe;
pub use proc_probes::{LoadAverageProbe, MemInfoProbe};
