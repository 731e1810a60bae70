use serde::{Deserialize, Serialize};

use crate::domain::trace::sentinel::{UNKNOWN_F64, UNKNOWN_I32, UNKNOWN_I64, UNKNOWN_STR};

/// One unit of work in the trace: a task, or a whole stage when tracing at stage granularity.
///
/// Built once by a correlator and never changed afterwards; a record that needs more information
/// (stage children) is rebuilt with [`Task::with_children`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,

    #[serde(rename = "type")]
    pub task_type: String,

    #[serde(rename = "ts_submit")]
    pub submit_timestamp: i64,

    pub submission_site: i32,

    /// Runtime in milliseconds.
    pub runtime: i64,

    pub resource_type: String,
    pub resource_amount_requested: f64,

    /// Ids of the units this one depends on.
    pub parents: Vec<u64>,

    /// Ids of the units depending on this one.
    pub children: Vec<u64>,

    pub user_id: i32,
    pub group_id: i32,
    pub nfrs: String,

    /// Owning job.
    pub workflow_id: u64,

    pub wait_time: i64,
    pub params: String,
    pub memory_requested: f64,
    pub network_io_time: i64,
    pub disk_io_time: i64,
    pub disk_space_requested: f64,
    pub energy_consumption: f64,
    pub resource_used: i64,
}

impl Task {
    /// A record for `id` owned by `workflow_id` with every measurement unknown.
    pub fn unmeasured(id: u64, workflow_id: u64) -> Self {
        Task {
            id,
            task_type: String::new(),
            submit_timestamp: UNKNOWN_I64,
            submission_site: UNKNOWN_I32,
            runtime: UNKNOWN_I64,
            resource_type: UNKNOWN_STR.to_string(),
            resource_amount_requested: UNKNOWN_F64,
            parents: Vec::new(),
            children: Vec::new(),
            user_id: UNKNOWN_I32,
            group_id: UNKNOWN_I32,
            nfrs: String::new(),
            workflow_id,
            wait_time: UNKNOWN_I64,
            params: String::new(),
            memory_requested: UNKNOWN_F64,
            network_io_time: UNKNOWN_I64,
            disk_io_time: UNKNOWN_I64,
            disk_space_requested: UNKNOWN_F64,
            energy_consumption: UNKNOWN_F64,
            resource_used: UNKNOWN_I64,
        }
    }

    pub fn with_children(self, children: Vec<u64>) -> Self {
        Task { children, ..self }
    }

    /// End of the task's execution, if both submit time and runtime are known.
    pub fn end_timestamp(&self) -> Option<i64> {
        if self.submit_timestamp >= 0 && self.runtime >= 0 { Some(self.submit_timestamp + self.runtime) } else { None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmeasured_uses_sentinels() {
        let task = Task::unmeasured(3, 1);
        assert_eq!(task.runtime, -1);
        assert_eq!(task.resource_type, "N/A");
        assert_eq!(task.memory_requested, -1.0);
        assert!(task.parents.is_empty());
        assert_eq!(task.end_timestamp(), None);
    }

    #[test]
    fn serializes_with_trace_column_names() {
        let task = Task { task_type: "ResultTask".to_string(), submit_timestamp: 10, ..Task::unmeasured(1, 2) };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["type"], "ResultTask");
        assert_eq!(json["ts_submit"], 10);
        assert_eq!(json["workflow_id"], 2);
    }

    #[test]
    fn with_children_keeps_everything_else() {
        let task = Task { runtime: 5, parents: vec![1], ..Task::unmeasured(2, 1) };
        let rebuilt = task.clone().with_children(vec![4, 5]);
        assert_eq!(rebuilt.children, vec![4, 5]);
        assert_eq!(rebuilt.parents, task.parents);
        assert_eq!(rebuilt.runtime, 5);
    }
}
