use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::utils::id::SourceId;

/// Readings of a single probe at one instant, keyed by metric name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub metrics: BTreeMap<String, f64>,
}

impl Snapshot {
    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

/// Composite sample produced by one sampler tick on one host process.
///
/// Every probe the sampler knows about has an entry; `None` marks a probe that produced nothing
/// for this tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub source: SourceId,

    /// Capture time, milliseconds since the Unix epoch.
    pub timestamp: i64,

    pub readings: BTreeMap<String, Option<Snapshot>>,
}

impl ResourceSample {
    pub fn reading(&self, probe: &str) -> Option<&Snapshot> {
        self.readings.get(probe).and_then(|r| r.as_ref())
    }
}
