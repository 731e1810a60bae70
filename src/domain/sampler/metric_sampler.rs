use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::sampler::probe::MetricProbe;
use crate::domain::stream::StreamBuffer;
use crate::domain::trace::{ResourceSample, Snapshot};
use crate::domain::utils::id::SourceId;

/// Handle of the running tick loop. Dropping the join handle detaches the task; the token stops it.
struct Ticker {
    cancel: CancellationToken,
    _handle: JoinHandle<()>,
}

/// Periodically polls a fixed set of probes and appends one composite [`ResourceSample`] per tick.
///
/// Probes of one tick run concurrently; the next tick is only taken once the previous sample has
/// been composed, so a slow probe never builds a backlog.
pub struct MetricSampler {
    source: SourceId,
    probes: Vec<Arc<dyn MetricProbe>>,
    buffer: Arc<StreamBuffer<ResourceSample>>,

    /// `None` waits for every probe to settle.
    probe_timeout: Option<Duration>,
    ticker: Mutex<Option<Ticker>>,
}

impl MetricSampler {
    pub fn new(source: impl Into<SourceId>, probes: Vec<Arc<dyn MetricProbe>>, buffer: Arc<StreamBuffer<ResourceSample>>) -> Self {
        MetricSampler { source: source.into(), probes, buffer, probe_timeout: None, ticker: Mutex::new(None) }
    }

    pub fn with_probe_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    pub fn buffer(&self) -> &Arc<StreamBuffer<ResourceSample>> {
        &self.buffer
    }

    pub fn is_pinging(&self) -> bool {
        self.ticker.lock().expect("sampler lock poisoned").is_some()
    }

    /// Queries every probe once, in parallel, and composes the results.
    pub async fn sample_once(&self) -> ResourceSample {
        compose_sample(&self.source, &self.probes, self.probe_timeout).await
    }

    /// Starts ticking every `interval`. A loop that is already running is stopped first.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_pinging(&self, interval: Duration) {
        let mut guard = self.ticker.lock().expect("sampler lock poisoned");
        if let Some(previous) = guard.take() {
            previous.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();
        let source = self.source.clone();
        let probes = self.probes.clone();
        let buffer = Arc::clone(&self.buffer);
        let probe_timeout = self.probe_timeout;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = loop_cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        let sample = compose_sample(&source, &probes, probe_timeout).await;
                        if loop_cancel.is_cancelled() {
                            tracing::debug!(source = %source, "sampler stopped mid-tick, discarding sample");
                            return;
                        }
                        buffer.append(sample);
                    }
                }
            }
        });

        tracing::info!(source = %self.source, interval_ms = interval.as_millis() as u64, probes = self.probes.len(), "sampler started");
        *guard = Some(Ticker { cancel, _handle: handle });
    }

    /// Cancels future ticks. Probes already in flight are not interrupted; their results are dropped.
    pub fn stop_pinging(&self) {
        if let Some(ticker) = self.ticker.lock().expect("sampler lock poisoned").take() {
            ticker.cancel.cancel();
            tracing::info!(source = %self.source, "sampler stopped");
        }
    }

    /// Empties the sample buffer and returns everything it held, oldest first.
    pub fn get_and_clear(&self) -> Vec<ResourceSample> {
        self.buffer.drain_all()
    }

    /// Puts samples taken by [`MetricSampler::get_and_clear`] back, behind anything sampled since.
    pub fn requeue(&self, samples: Vec<ResourceSample>) {
        for sample in samples {
            self.buffer.append(sample);
        }
    }
}

impl Drop for MetricSampler {
    fn drop(&mut self) {
        self.stop_pinging();
    }
}

async fn compose_sample(source: &SourceId, probes: &[Arc<dyn MetricProbe>], probe_timeout: Option<Duration>) -> ResourceSample {
    let calls = probes.iter().map(|probe| {
        let probe = Arc::clone(probe);
        let handle = tokio::spawn(async move { query_probe(probe.as_ref(), probe_timeout).await });
        async move {
            handle.await.unwrap_or_else(|e| {
                log::warn!("Probe task failed: {}", e);
                None
            })
        }
    });
    let results = join_all(calls).await;

    let readings: BTreeMap<String, Option<Snapshot>> = probes.iter().map(|p| p.name().to_string()).zip(results).collect();

    ResourceSample { source: source.clone(), timestamp: Utc::now().timestamp_millis(), readings }
}

async fn query_probe(probe: &dyn MetricProbe, probe_timeout: Option<Duration>) -> Option<Snapshot> {
    if !probe.is_available() {
        log::debug!("Probe {} unavailable on this host", probe.name());
        return None;
    }

    match probe_timeout {
        None => probe.snapshot().await,
        Some(limit) => match tokio::time::timeout(limit, probe.snapshot()).await {
            Ok(snapshot) => snapshot,
            Err(_) => {
                tracing::warn!(probe = probe.name(), timeout_ms = limit.as_millis() as u64, "probe timed out");
                None
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProbe {
        name: &'static str,
        available: bool,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FixedProbe {
        fn new(name: &'static str, available: bool, delay: Duration) -> Arc<Self> {
            Arc::new(FixedProbe { name, available, delay, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl MetricProbe for FixedProbe {
        fn name(&self) -> &str {
            self.name
        }

        fn is_available(&self) -> bool {
            self.available
        }

        async fn snapshot(&self) -> Option<Snapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Some(Snapshot::default().with_metric("value", 1.0))
        }
    }

    fn sampler(probes: Vec<Arc<dyn MetricProbe>>) -> (tempfile::TempDir, MetricSampler) {
        let dir = tempfile::tempdir().unwrap();
        let buffer = Arc::new(StreamBuffer::new(dir.path()));
        (dir, MetricSampler::new("host-1", probes, buffer))
    }

    #[tokio::test]
    async fn unavailable_probe_contributes_absent_reading() {
        let available = FixedProbe::new("cpu", true, Duration::ZERO);
        let missing = FixedProbe::new("energy", false, Duration::ZERO);
        let (_dir, sampler) = sampler(vec![available.clone(), missing.clone()]);

        let sample = sampler.sample_once().await;

        assert_eq!(sample.source, "host-1");
        assert_eq!(sample.readings.len(), 2);
        assert_eq!(sample.reading("cpu").and_then(|s| s.get("value")), Some(1.0));
        assert_eq!(sample.readings.get("energy"), Some(&None));
        assert_eq!(missing.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn timed_out_probe_is_absent() {
        let slow = FixedProbe::new("slow", true, Duration::from_secs(5));
        let fast = FixedProbe::new("fast", true, Duration::ZERO);
        let (_dir, sampler) = sampler(vec![slow, fast]);
        let sampler = sampler.with_probe_timeout(Some(Duration::from_millis(20)));

        let sample = sampler.sample_once().await;

        assert!(sample.reading("slow").is_none());
        assert!(sample.reading("fast").is_some());
    }

    #[tokio::test]
    async fn pinging_accumulates_until_stopped() {
        let probe = FixedProbe::new("cpu", true, Duration::ZERO);
        let (_dir, sampler) = sampler(vec![probe]);

        sampler.start_pinging(Duration::from_millis(10));
        assert!(sampler.is_pinging());
        tokio::time::sleep(Duration::from_millis(80)).await;
        sampler.stop_pinging();
        assert!(!sampler.is_pinging());

        // Let a tick that was mid-flight observe the cancellation.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let collected = sampler.get_and_clear();
        assert!(!collected.is_empty());
        assert!(collected.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(sampler.get_and_clear().is_empty());
        assert!(sampler.buffer().is_empty());
    }
}
