use serde::{Deserialize, Serialize};

use crate::domain::trace::ResourceSample;

/// Batch of samples a worker process ships to the collector in one message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceCollectionDto {
    pub samples: Vec<ResourceSample>,
}

impl ResourceCollectionDto {
    pub fn new(samples: Vec<ResourceSample>) -> Self {
        ResourceCollectionDto { samples }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
