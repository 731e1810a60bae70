use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

use crate::api::resource_dto::ResourceCollectionDto;
use crate::domain::runtime_config::RuntimeConfig;
use crate::domain::stream::StreamBuffer;
use crate::domain::trace::ResourceSample;
use crate::domain::utils::id::SourceId;

/// One sample stream per reporting process, shared between the local sampler and the remote
/// receiver.
#[derive(Debug)]
pub struct ResourceRegistry {
    spill_dir: PathBuf,
    spill_threshold: usize,
    streams: DashMap<SourceId, Arc<StreamBuffer<ResourceSample>>>,
}

impl ResourceRegistry {
    pub fn new(spill_dir: impl Into<PathBuf>, spill_threshold: usize) -> Self {
        ResourceRegistry { spill_dir: spill_dir.into(), spill_threshold, streams: DashMap::new() }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(config.spill_directory.clone(), config.spill_threshold)
    }

    /// Stream of `source`, created on first use.
    pub fn buffer_for(&self, source: &str) -> Arc<StreamBuffer<ResourceSample>> {
        if let Some(existing) = self.streams.get(source) {
            return Arc::clone(existing.value());
        }
        let entry = self
            .streams
            .entry(source.to_string())
            .or_insert_with(|| Arc::new(StreamBuffer::with_threshold(self.spill_dir.clone(), self.spill_threshold)));
        Arc::clone(entry.value())
    }

    /// Routes every sample of a remote batch into its source's stream. Returns the number routed.
    pub fn receive(&self, message: ResourceCollectionDto) -> usize {
        let count = message.samples.len();
        for sample in message.samples {
            self.buffer_for(&sample.source).append(sample);
        }
        tracing::debug!(samples = count, sources = self.streams.len(), "received resource batch");
        count
    }

    pub fn sources(&self) -> Vec<SourceId> {
        let mut sources: Vec<SourceId> = self.streams.iter().map(|entry| entry.key().clone()).collect();
        sources.sort();
        sources
    }

    /// Empties every stream and hands back the samples per source, each in arrival order.
    pub fn collect(&self) -> BTreeMap<SourceId, Vec<ResourceSample>> {
        let buffers: Vec<(SourceId, Arc<StreamBuffer<ResourceSample>>)> =
            self.streams.iter().map(|entry| (entry.key().clone(), Arc::clone(entry.value()))).collect();

        buffers.into_iter().map(|(source, buffer)| (source, buffer.drain_all())).filter(|(_, samples)| !samples.is_empty()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn sample(source: &str, timestamp: i64) -> ResourceSample {
        ResourceSample { source: source.to_string(), timestamp, readings: Map::new() }
    }

    #[test]
    fn routes_samples_by_source() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ResourceRegistry::new(dir.path(), 0);

        let routed = registry.receive(ResourceCollectionDto::new(vec![sample("exec-2", 1), sample("exec-1", 2), sample("exec-2", 3)]));

        assert_eq!(routed, 3);
        assert_eq!(registry.sources(), vec!["exec-1".to_string(), "exec-2".to_string()]);

        let collected = registry.collect();
        assert_eq!(collected["exec-1"].len(), 1);
        assert_eq!(collected["exec-2"].iter().map(|s| s.timestamp).collect::<Vec<_>>(), vec![1, 3]);
        assert!(registry.collect().is_empty());
    }

    #[test]
    fn local_and_remote_share_a_stream() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ResourceRegistry::new(dir.path(), 2);

        let local = registry.buffer_for("driver");
        local.append(sample("driver", 1));
        registry.receive(ResourceCollectionDto::new(vec![sample("driver", 2), sample("driver", 3)]));
        local.append(sample("driver", 4));

        assert!(Arc::ptr_eq(&local, &registry.buffer_for("driver")));
        let timestamps: Vec<i64> = registry.collect()["driver"].iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![1, 2, 3, 4]);
    }
}
