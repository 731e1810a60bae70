use std::path::PathBuf;
use std::time::Duration;

use log::LevelFilter;

use crate::api::config_dto::RuntimeConfigDto;
use crate::error::{Error, Result};
use crate::loader::parser::parse_json_file;

pub const DEFAULT_SCHEMA_VERSION: &str = "1.0";
pub const DEFAULT_PING_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_SPILL_THRESHOLD: usize = 10_000;
pub const DEFAULT_WORKER_THREADS: usize = 4;

/// Immutable settings shared by every component of a tracing run.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub author: String,
    pub domain: String,
    pub description: String,

    /// Version tag of the emitted trace files.
    pub schema_version: String,

    /// Trace whole stages instead of individual tasks.
    pub is_stage_level: bool,

    pub resource_ping_interval: Duration,
    pub executor_synchronization_interval: Duration,
    pub output_path: PathBuf,
    pub spill_directory: PathBuf,

    /// Resident elements per stream before it spills on its own. `0` disables automatic spilling.
    pub spill_threshold: usize,

    pub worker_threads: usize,

    /// Upper bound for a single probe call. `None` waits for the probe to settle.
    pub probe_timeout: Option<Duration>,

    pub scheduler_mode: String,
    pub application_name: String,
    pub log_level: LevelFilter,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            author: String::new(),
            domain: String::new(),
            description: String::new(),
            schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
            is_stage_level: false,
            resource_ping_interval: Duration::from_millis(DEFAULT_PING_INTERVAL_MS),
            executor_synchronization_interval: Duration::from_millis(DEFAULT_SYNC_INTERVAL_MS),
            output_path: PathBuf::from("wta-output"),
            spill_directory: std::env::temp_dir().join("wta-spill"),
            spill_threshold: DEFAULT_SPILL_THRESHOLD,
            worker_threads: DEFAULT_WORKER_THREADS,
            probe_timeout: None,
            scheduler_mode: "FIFO".to_string(),
            application_name: "wta-application".to_string(),
            log_level: LevelFilter::Info,
        }
    }
}

impl RuntimeConfig {
    /// Reads and validates the JSON configuration at `file_path`.
    pub fn load(file_path: &str) -> Result<Self> {
        let dto = parse_json_file::<RuntimeConfigDto>(file_path)?;
        RuntimeConfig::try_from(dto)
    }
}

fn positive_interval(name: &str, value: Option<u64>, default: u64) -> Result<Duration> {
    match value.unwrap_or(default) {
        0 => Err(Error::ConfigError(format!("{} must be greater than zero", name))),
        ms => Ok(Duration::from_millis(ms)),
    }
}

impl TryFrom<RuntimeConfigDto> for RuntimeConfig {
    type Error = Error;

    fn try_from(dto: RuntimeConfigDto) -> Result<Self> {
        let defaults = RuntimeConfig::default();

        let worker_threads = dto.worker_threads.unwrap_or(defaults.worker_threads);
        if worker_threads == 0 {
            return Err(Error::ConfigError("workerThreads must be at least 1".to_string()));
        }

        let log_level = match dto.log_level {
            Some(level) => level.parse::<LevelFilter>().map_err(|_| Error::ConfigError(format!("unknown logLevel '{}'", level)))?,
            None => defaults.log_level,
        };

        let schema_version = dto.schema_version.unwrap_or(defaults.schema_version);
        if schema_version.trim().is_empty() {
            return Err(Error::ConfigError("schemaVersion must not be empty".to_string()));
        }

        Ok(RuntimeConfig {
            author: dto.author.unwrap_or(defaults.author),
            domain: dto.domain.unwrap_or(defaults.domain),
            description: dto.description.unwrap_or(defaults.description),
            schema_version,
            is_stage_level: dto.is_stage_level.unwrap_or(defaults.is_stage_level),
            resource_ping_interval: positive_interval("resourcePingIntervalMs", dto.resource_ping_interval_ms, DEFAULT_PING_INTERVAL_MS)?,
            executor_synchronization_interval: positive_interval(
                "executorSynchronizationIntervalMs",
                dto.executor_synchronization_interval_ms,
                DEFAULT_SYNC_INTERVAL_MS,
            )?,
            output_path: dto.output_path.map(PathBuf::from).unwrap_or(defaults.output_path),
            spill_directory: dto.spill_directory.map(PathBuf::from).unwrap_or(defaults.spill_directory),
            spill_threshold: dto.spill_threshold.unwrap_or(defaults.spill_threshold),
            worker_threads,
            probe_timeout: dto.probe_timeout_ms.map(Duration::from_millis),
            scheduler_mode: dto.scheduler_mode.unwrap_or(defaults.scheduler_mode),
            application_name: dto.application_name.unwrap_or(defaults.application_name),
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_dto_gives_defaults() {
        let config = RuntimeConfig::try_from(RuntimeConfigDto::default()).unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn camel_case_keys_are_read() {
        let dto: RuntimeConfigDto = serde_json::from_str(
            r#"{ "isStageLevel": true, "resourcePingIntervalMs": 250, "probeTimeoutMs": 50, "schedulerMode": "FAIR", "logLevel": "debug" }"#,
        )
        .unwrap();
        let config = RuntimeConfig::try_from(dto).unwrap();

        assert!(config.is_stage_level);
        assert_eq!(config.resource_ping_interval, Duration::from_millis(250));
        assert_eq!(config.probe_timeout, Some(Duration::from_millis(50)));
        assert_eq!(config.scheduler_mode, "FAIR");
        assert_eq!(config.log_level, LevelFilter::Debug);
    }

    #[test]
    fn rejects_invalid_values() {
        let zero_ping = RuntimeConfigDto { resource_ping_interval_ms: Some(0), ..Default::default() };
        assert!(matches!(RuntimeConfig::try_from(zero_ping), Err(Error::ConfigError(_))));

        let no_workers = RuntimeConfigDto { worker_threads: Some(0), ..Default::default() };
        assert!(matches!(RuntimeConfig::try_from(no_workers), Err(Error::ConfigError(_))));

        let bad_level = RuntimeConfigDto { log_level: Some("loud".to_string()), ..Default::default() };
        assert!(matches!(RuntimeConfig::try_from(bad_level), Err(Error::ConfigError(_))));
    }
}
