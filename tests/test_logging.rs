use std::sync::Arc;

use log::Level;

use wta_trace::domain::correlation::{JobEnded, JobStarted, SchedulerEvent, TraceCollector, UnitCompleted};
use wta_trace::domain::runtime_config::RuntimeConfig;
use wta_trace::domain::utils::id::{JobId, StageId, TaskId};

// logtest installs a process-wide logger, so this binary holds a single test.
#[test]
fn test_dropped_events_are_logged_as_warnings() {
    let mut logger = logtest::Logger::start();
    let dir = tempfile::tempdir().unwrap();
    let config = RuntimeConfig { spill_directory: dir.path().to_path_buf(), ..Default::default() };
    let collector = TraceCollector::new(Arc::new(config));

    collector.dispatch(&SchedulerEvent::JobStarted(JobStarted { job_id: JobId::new(1), start_timestamp: 0, stage_ids: vec![StageId::new(1)] }));
    collector.dispatch(&SchedulerEvent::UnitCompleted(UnitCompleted {
        unit_id: TaskId::new(1),
        stage_id: StageId::new(99),
        unit_type: "ResultTask".to_string(),
        launch_timestamp: 0,
        runtime: 1,
        executor_id: "1".to_string(),
        deserialize_time: None,
        serialization_time: None,
        disk_bytes_spilled: None,
        shuffle_bytes_written: None,
        user: None,
    }));
    collector.dispatch(&SchedulerEvent::JobEnded(JobEnded { job_id: JobId::new(7), end_timestamp: 5 }));
    collector.dispatch(&SchedulerEvent::JobEnded(JobEnded { job_id: JobId::new(1), end_timestamp: 5 }));
    collector.finalize();

    let warnings: Vec<String> = std::iter::from_fn(|| logger.pop()).filter(|record| record.level() == Level::Warn).map(|record| record.args().to_string()).collect();

    assert_eq!(warnings.len(), 2);
    assert!(warnings[0].contains("UnitCompleted") && warnings[0].contains("stage 99"));
    assert!(warnings[1].contains("JobEnded") && warnings[1].contains("job 7"));
}
