pub mod resource_sample;
pub mod sentinel;
pub mod task;
pub mod workflow;

pub use resource_sample::{ResourceSample, Snapshot};
pub use task::Task;
pub use workflow::Workflow;
