use serde::Deserialize;

/// Runtime configuration as written in the JSON config file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfigDto {
    pub author: Option<String>,
    pub domain: Option<String>,
    pub description: Option<String>,
    pub schema_version: Option<String>,
    pub is_stage_level: Option<bool>,
    pub resource_ping_interval_ms: Option<u64>,
    pub executor_synchronization_interval_ms: Option<u64>,
    pub output_path: Option<String>,
    pub spill_directory: Option<String>,
    pub spill_threshold: Option<usize>,
    pub worker_threads: Option<usize>,
    pub probe_timeout_ms: Option<u64>,
    pub scheduler_mode: Option<String>,
    pub application_name: Option<String>,
    pub log_level: Option<String>,
}
