use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::domain::correlation::TraceSnapshot;
use crate::domain::runtime_config::RuntimeConfig;
use crate::domain::trace::sentinel::{UNKNOWN_F64, UNKNOWN_STR};
use crate::error::Result;

/// Persists a finished trace.
pub trait TraceWriter {
    fn write(&self, snapshot: &TraceSnapshot) -> Result<()>;
}

/// Run-level metadata written next to the trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkloadSummary {
    pub author: String,
    pub domain: String,
    pub description: String,
    pub schema_version: String,
    pub application_name: String,
    pub task_count: usize,
    pub workflow_count: usize,
    pub resource_sources: Vec<String>,
    pub resource_sample_count: usize,
}

impl WorkloadSummary {
    pub fn new(config: &RuntimeConfig, snapshot: &TraceSnapshot) -> Self {
        WorkloadSummary {
            author: config.author.clone(),
            domain: config.domain.clone(),
            description: config.description.clone(),
            schema_version: config.schema_version.clone(),
            application_name: config.application_name.clone(),
            task_count: snapshot.tasks.len(),
            workflow_count: snapshot.workflows.len(),
            resource_sources: snapshot.resources.keys().cloned().collect(),
            resource_sample_count: snapshot.resources.values().map(Vec::len).sum(),
        }
    }
}

/// Writes JSON records and a `;`-separated resource CSV under
/// `<output>/<kind>/<schema version>/`.
pub struct FileTraceWriter {
    config: Arc<RuntimeConfig>,
    root: PathBuf,
}

impl FileTraceWriter {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        let root = config.output_path.clone();
        FileTraceWriter { config, root }
    }

    pub fn with_root(config: Arc<RuntimeConfig>, root: impl Into<PathBuf>) -> Self {
        FileTraceWriter { config, root: root.into() }
    }

    /// Directory holding the files of one record kind.
    pub fn kind_dir(&self, kind: &str) -> PathBuf {
        self.root.join(kind).join(&self.config.schema_version)
    }

    fn write_json<T: Serialize + ?Sized>(&self, kind: &str, file_name: &str, value: &T) -> Result<PathBuf> {
        let dir = self.kind_dir(kind);
        fs::create_dir_all(&dir)?;
        let path = dir.join(file_name);

        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;

        log::debug!("Wrote {}", path.display());
        Ok(path)
    }

    fn write_resources(&self, snapshot: &TraceSnapshot) -> Result<PathBuf> {
        let dir = self.kind_dir("resources");
        fs::create_dir_all(&dir)?;
        let path = dir.join("resources.csv");
        write_resource_csv(&path, snapshot)?;
        log::debug!("Wrote {}", path.display());
        Ok(path)
    }
}

/// One row per metric reading. A probe that produced nothing gets a single sentinel row.
fn write_resource_csv(path: &Path, snapshot: &TraceSnapshot) -> Result<()> {
    let mut csv_wtr = csv::WriterBuilder::new().delimiter(b';').from_path(path)?;
    csv_wtr.write_record(["source", "timestamp", "probe", "metric", "value"])?;

    for (source, samples) in &snapshot.resources {
        for sample in samples {
            let timestamp = sample.timestamp.to_string();
            for (probe, reading) in &sample.readings {
                match reading {
                    Some(snapshot) => {
                        for (metric, value) in &snapshot.metrics {
                            csv_wtr.write_record([source.as_str(), timestamp.as_str(), probe.as_str(), metric.as_str(), value.to_string().as_str()])?;
                        }
                    }
                    None => csv_wtr.write_record([source.as_str(), timestamp.as_str(), probe.as_str(), UNKNOWN_STR, UNKNOWN_F64.to_string().as_str()])?,
                }
            }
        }
    }

    csv_wtr.flush()?;
    Ok(())
}

impl TraceWriter for FileTraceWriter {
    fn write(&self, snapshot: &TraceSnapshot) -> Result<()> {
        self.write_json("tasks", "tasks.json", &snapshot.tasks)?;
        self.write_json("workflows", "workflows.json", &snapshot.workflows)?;
        self.write_json("workload", "generic_information.json", &WorkloadSummary::new(&self.config, snapshot))?;
        self.write_resources(snapshot)?;

        log::info!("Trace written to {}", self.root.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trace::{ResourceSample, Snapshot, Task};
    use std::collections::BTreeMap;

    fn snapshot() -> TraceSnapshot {
        let mut readings = BTreeMap::new();
        readings.insert("load_average".to_string(), Some(Snapshot::default().with_metric("load1", 0.5)));
        readings.insert("mem_info".to_string(), None);

        let mut resources = BTreeMap::new();
        resources.insert("exec-1".to_string(), vec![ResourceSample { source: "exec-1".to_string(), timestamp: 7, readings }]);

        TraceSnapshot { tasks: vec![Task::unmeasured(1, 1)], workflows: Vec::new(), resources }
    }

    #[test]
    fn writes_versioned_layout() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(RuntimeConfig { schema_version: "1.0".to_string(), author: "ops".to_string(), ..Default::default() });
        let writer = FileTraceWriter::with_root(config, dir.path());

        writer.write(&snapshot()).unwrap();

        let tasks: serde_json::Value = serde_json::from_str(&fs::read_to_string(dir.path().join("tasks/1.0/tasks.json")).unwrap()).unwrap();
        assert_eq!(tasks[0]["id"], 1);
        assert!(dir.path().join("workflows/1.0/workflows.json").exists());

        let summary: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("workload/1.0/generic_information.json")).unwrap()).unwrap();
        assert_eq!(summary["author"], "ops");
        assert_eq!(summary["task_count"], 1);
        assert_eq!(summary["resource_sample_count"], 1);
    }

    #[test]
    fn resource_csv_marks_absent_readings() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FileTraceWriter::with_root(Arc::new(RuntimeConfig::default()), dir.path());

        writer.write(&snapshot()).unwrap();

        let csv = fs::read_to_string(dir.path().join("resources/1.0/resources.csv")).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines, vec!["source;timestamp;probe;metric;value", "exec-1;7;load_average;load1;0.5", "exec-1;7;mem_info;N/A;-1"]);
    }
}
