use std::path::PathBuf;

use async_trait::async_trait;

use crate::domain::sampler::probe::MetricProbe;
use crate::domain::trace::Snapshot;

const LOADAVG_PATH: &str = "/proc/loadavg";
const MEMINFO_PATH: &str = "/proc/meminfo";

/// Reads a procfs file, or `None` (logged at debug) when it cannot be read.
async fn read_proc_file(path: &PathBuf) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Some(content),
        Err(e) => {
            log::debug!("Probe source {} unavailable: {}", path.display(), e);
            None
        }
    }
}

/// 1, 5 and 15 minute load averages plus the runnable/total process counts.
#[derive(Debug, Clone)]
pub struct LoadAverageProbe {
    path: PathBuf,
}

impl LoadAverageProbe {
    pub fn new() -> Self {
        Self::with_path(LOADAVG_PATH)
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        LoadAverageProbe { path: path.into() }
    }
}

impl Default for LoadAverageProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses the `/proc/loadavg` format: `0.20 0.18 0.12 1/80 11206`.
pub fn parse_loadavg(content: &str) -> Option<Snapshot> {
    let mut fields = content.split_whitespace();
    let load1 = fields.next()?.parse::<f64>().ok()?;
    let load5 = fields.next()?.parse::<f64>().ok()?;
    let load15 = fields.next()?.parse::<f64>().ok()?;
    let (runnable, total) = fields.next()?.split_once('/')?;

    Some(
        Snapshot::default()
            .with_metric("load1", load1)
            .with_metric("load5", load5)
            .with_metric("load15", load15)
            .with_metric("procs_runnable", runnable.parse::<f64>().ok()?)
            .with_metric("procs_total", total.parse::<f64>().ok()?),
    )
}

#[async_trait]
impl MetricProbe for LoadAverageProbe {
    fn name(&self) -> &str {
        "load_average"
    }

    fn is_available(&self) -> bool {
        cfg!(target_os = "linux") && self.path.exists()
    }

    async fn snapshot(&self) -> Option<Snapshot> {
        parse_loadavg(&read_proc_file(&self.path).await?)
    }
}

/// Memory totals from `/proc/meminfo`, in bytes.
#[derive(Debug, Clone)]
pub struct MemInfoProbe {
    path: PathBuf,
}

impl MemInfoProbe {
    pub fn new() -> Self {
        Self::with_path(MEMINFO_PATH)
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        MemInfoProbe { path: path.into() }
    }
}

impl Default for MemInfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Picks the memory lines the trace cares about out of `/proc/meminfo`. Values there are in kB.
pub fn parse_meminfo(content: &str) -> Option<Snapshot> {
    const KEYS: [(&str, &str); 5] = [
        ("MemTotal", "mem_total_bytes"),
        ("MemFree", "mem_free_bytes"),
        ("MemAvailable", "mem_available_bytes"),
        ("Cached", "mem_cached_bytes"),
        ("SwapFree", "swap_free_bytes"),
    ];

    let mut snapshot = Snapshot::default();
    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let Some((_, metric)) = KEYS.iter().find(|(k, _)| *k == key.trim()) else {
            continue;
        };
        if let Some(kb) = rest.split_whitespace().next().and_then(|v| v.parse::<f64>().ok()) {
            snapshot = snapshot.with_metric(*metric, kb * 1024.0);
        }
    }

    if snapshot.metrics.is_empty() { None } else { Some(snapshot) }
}

#[async_trait]
impl MetricProbe for MemInfoProbe {
    fn name(&self) -> &str {
        "mem_info"
    }

    fn is_available(&self) -> bool {
        cfg!(target_os = "linux") && self.path.exists()
    }

    async fn snapshot(&self) -> Option<Snapshot> {
        parse_meminfo(&read_proc_file(&self.path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_loadavg_line() {
        let snapshot = parse_loadavg("0.20 0.18 0.12 1/80 11206\n").unwrap();
        assert_eq!(snapshot.get("load1"), Some(0.20));
        assert_eq!(snapshot.get("load15"), Some(0.12));
        assert_eq!(snapshot.get("procs_runnable"), Some(1.0));
        assert_eq!(snapshot.get("procs_total"), Some(80.0));
    }

    #[test]
    fn malformed_loadavg_gives_nothing() {
        assert!(parse_loadavg("").is_none());
        assert!(parse_loadavg("0.20 0.18 0.12 80 11206").is_none());
    }

    #[test]
    fn parses_meminfo_in_bytes() {
        let content = "MemTotal:       16384 kB\nMemFree:         1024 kB\nBuffers:           10 kB\nSwapFree:           0 kB\n";
        let snapshot = parse_meminfo(content).unwrap();
        assert_eq!(snapshot.get("mem_total_bytes"), Some(16384.0 * 1024.0));
        assert_eq!(snapshot.get("swap_free_bytes"), Some(0.0));
        assert_eq!(snapshot.get("mem_available_bytes"), None);
        assert!(parse_meminfo("Buffers: 10 kB").is_none());
    }

    #[tokio::test]
    async fn missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let probe = LoadAverageProbe::with_path(dir.path().join("loadavg"));
        assert!(!probe.is_available());
        assert!(probe.snapshot().await.is_none());
    }

    #[tokio::test]
    async fn reads_from_custom_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meminfo");
        std::fs::write(&path, "MemTotal: 2 kB\n").unwrap();

        let probe = MemInfoProbe::with_path(&path);
        assert_eq!(probe.snapshot().await.unwrap().get("mem_total_bytes"), Some(2048.0));
    }
}
