use std::sync::Arc;

use crate::api::event_dto::SchedulerEventDto;
use crate::domain::correlation::{SchedulerEvent, TraceCollector, TraceSnapshot};
use crate::domain::runtime_config::RuntimeConfig;
use crate::error::Result;
use crate::loader::parser::parse_events_file;

pub mod api;
pub mod domain;
pub mod error;
pub mod loader;
pub mod logger;

/// Reads a recorded scheduler event log and replays it through a fresh collector.
///
/// The log is either a JSON array or one event per line, with host-native ids.
pub fn replay_event_log(file_path: &str, config: Arc<RuntimeConfig>) -> Result<TraceSnapshot> {
    let events: Vec<SchedulerEventDto> = parse_events_file(file_path)?;
    log::info!("Parsed {} scheduler events from '{}'.", events.len(), file_path);

    let collector = TraceCollector::new(config);
    let dropped = collector.replay(events.into_iter().map(SchedulerEvent::from));
    if dropped > 0 {
        log::warn!("{} events could not be correlated and were dropped.", dropped);
    }

    Ok(collector.finalize())
}
