use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use wta_trace::api::resource_dto::ResourceCollectionDto;
use wta_trace::domain::resource::{ResourceRegistry, ResourceReporter, ResourceServer};
use wta_trace::domain::sampler::{MetricProbe, MetricSampler};
use wta_trace::domain::stream::StreamBuffer;
use wta_trace::domain::trace::{ResourceSample, Snapshot};

struct CounterProbe;

#[async_trait]
impl MetricProbe for CounterProbe {
    fn name(&self) -> &str {
        "counter"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn snapshot(&self) -> Option<Snapshot> {
        Some(Snapshot::default().with_metric("ticks", 1.0))
    }
}

fn sample(source: &str, timestamp: i64) -> ResourceSample {
    ResourceSample { source: source.to_string(), timestamp, readings: BTreeMap::new() }
}

async fn wait_for_samples(registry: &ResourceRegistry, source: &str, expected: usize) {
    for _ in 0..200 {
        if registry.buffer_for(source).len() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {} samples from {}", expected, source);
}

#[tokio::test]
async fn test_batches_are_routed_per_source() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(ResourceRegistry::new(dir.path(), 0));
    let cancel = CancellationToken::new();

    let server = ResourceServer::bind("127.0.0.1:0", Arc::clone(&registry)).await.unwrap();
    let addr = server.local_addr().unwrap();
    let server_task = tokio::spawn(server.serve(cancel.clone()));

    let mut reporter = ResourceReporter::connect(addr).await.unwrap();
    reporter.send(ResourceCollectionDto::new(vec![sample("exec-1", 1), sample("exec-2", 2)])).await.unwrap();
    reporter.send(ResourceCollectionDto::new(vec![sample("exec-1", 3)])).await.unwrap();

    wait_for_samples(&registry, "exec-1", 2).await;
    wait_for_samples(&registry, "exec-2", 1).await;

    cancel.cancel();
    server_task.await.unwrap().unwrap();

    let collected = registry.collect();
    assert_eq!(collected["exec-1"].iter().map(|s| s.timestamp).collect::<Vec<_>>(), vec![1, 3]);
    assert_eq!(collected["exec-2"].len(), 1);
}

#[tokio::test]
async fn test_reporter_ships_sampler_output() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(ResourceRegistry::new(dir.path().join("collector"), 0));
    let server_cancel = CancellationToken::new();

    let server = ResourceServer::bind("127.0.0.1:0", Arc::clone(&registry)).await.unwrap();
    let addr = server.local_addr().unwrap();
    let server_task = tokio::spawn(server.serve(server_cancel.clone()));

    let local = Arc::new(StreamBuffer::new(dir.path().join("worker")));
    let sampler = Arc::new(MetricSampler::new("worker-1", vec![Arc::new(CounterProbe) as Arc<dyn MetricProbe>], local));
    sampler.start_pinging(Duration::from_millis(10));

    let reporter = ResourceReporter::connect(addr).await.unwrap();
    let reporter_cancel = CancellationToken::new();
    let reporter_task = {
        let sampler = Arc::clone(&sampler);
        let cancel = reporter_cancel.clone();
        tokio::spawn(async move { reporter.run(&sampler, Duration::from_millis(20), cancel).await })
    };

    wait_for_samples(&registry, "worker-1", 3).await;
    sampler.stop_pinging();
    reporter_cancel.cancel();
    reporter_task.await.unwrap().unwrap();

    wait_for_samples(&registry, "worker-1", 3).await;
    server_cancel.cancel();
    server_task.await.unwrap().unwrap();

    let samples = registry.collect().remove("worker-1").unwrap();
    assert!(samples.len() >= 3);
    assert!(samples.iter().all(|s| s.reading("counter").and_then(|r| r.get("ticks")) == Some(1.0)));
    assert!(samples.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert!(sampler.get_and_clear().is_empty());
}
