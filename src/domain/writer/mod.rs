pub mod trace_writer;

pub use trace_writer::{FileTraceWriter, TraceWriter, WorkloadSummary};
