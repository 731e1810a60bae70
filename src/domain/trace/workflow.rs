use serde::{Deserialize, Serialize};

use crate::domain::trace::sentinel::UNKNOWN_I64;
use crate::domain::trace::task::Task;

/// A finished job together with the tasks it owned and the metrics derived from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: u64,

    #[serde(rename = "ts_submit")]
    pub submit_timestamp: i64,

    pub tasks: Vec<Task>,
    pub task_count: usize,
    pub critical_path_length: i64,
    pub critical_path_task_count: usize,
    pub max_concurrent_tasks: i64,
    pub nfrs: String,
    pub scheduler: String,
    pub domain: String,
    pub application_name: String,
    pub application_field: String,
    pub total_resources: f64,
    pub total_memory_usage: f64,
    pub total_network_usage: i64,
    pub total_disk_space_usage: f64,
    pub total_energy_consumption: f64,
}

/// Largest number of tasks running at the same instant.
///
/// Intervals are half-open, `[submit, submit + runtime)`, so a task ending exactly when another
/// starts does not overlap it. Unknown when there are no tasks or any task lacks timing.
pub fn max_concurrent_tasks(tasks: &[Task]) -> i64 {
    if tasks.is_empty() {
        return UNKNOWN_I64;
    }

    let mut edges = Vec::with_capacity(tasks.len() * 2);
    for task in tasks {
        let Some(end) = task.end_timestamp() else {
            return UNKNOWN_I64;
        };
        if end > task.submit_timestamp {
            edges.push((task.submit_timestamp, 1i64));
            edges.push((end, -1i64));
        }
    }

    // At equal timestamps the -1 sorts first.
    edges.sort_unstable();

    let mut running = 0;
    let mut peak = 0;
    for (_, delta) in edges {
        running += delta;
        peak = peak.max(running);
    }
    peak
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timed(id: u64, submit: i64, runtime: i64) -> Task {
        Task { submit_timestamp: submit, runtime, ..Task::unmeasured(id, 1) }
    }

    #[test]
    fn counts_overlapping_intervals() {
        let tasks = vec![timed(1, 0, 10), timed(2, 5, 10), timed(3, 6, 2), timed(4, 20, 5)];
        assert_eq!(max_concurrent_tasks(&tasks), 3);
    }

    #[test]
    fn touching_intervals_do_not_overlap() {
        let tasks = vec![timed(1, 0, 10), timed(2, 10, 10)];
        assert_eq!(max_concurrent_tasks(&tasks), 1);
    }

    #[test]
    fn unknown_timing_gives_sentinel() {
        assert_eq!(max_concurrent_tasks(&[]), -1);
        assert_eq!(max_concurrent_tasks(&[timed(1, 0, 10), Task::unmeasured(2, 1)]), -1);
    }
}
