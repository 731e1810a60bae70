use async_trait::async_trait;

use crate::domain::trace::Snapshot;

/// A source of host metrics polled by the sampler.
///
/// A probe that is unsupported on this host reports `false` from [`MetricProbe::is_available`] and
/// is skipped; a probe that fails mid-read returns `None` from [`MetricProbe::snapshot`]. Neither is
/// an error for the caller.
#[async_trait]
pub trait MetricProbe: Send + Sync {
    /// Key under which this probe's readings appear in a sample.
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    async fn snapshot(&self) -> Option<Snapshot>;
}
