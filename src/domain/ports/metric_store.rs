//! Metric store port - loads metric definitions referenced by success
//! criteria.
//!
//! Definitions are loaded once per experiment at metrics sync and recorded on
//! the experiment record so the analytics request can be built without
//! re-reading the store.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::domain::errors::MetricStoreError;
use crate::domain::models::MetricDefinition;

/// Source of metric definitions.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Resolve every named metric. Fails with [`MetricStoreError::Missing`]
    /// naming the first metric the store does not define.
    async fn load_definitions(
        &self,
        names: &[String],
    ) -> Result<BTreeMap<String, MetricDefinition>, MetricStoreError>;
}

/// Store backed by a fixed in-memory table.
#[derive(Debug, Default, Clone)]
pub struct StaticMetricStore {
    definitions: BTreeMap<String, MetricDefinition>,
}

impl StaticMetricStore {
    pub fn new(definitions: BTreeMap<String, MetricDefinition>) -> Self {
        Self { definitions }
    }

    pub fn with_definition(mut self, name: impl Into<String>, def: MetricDefinition) -> Self {
        self.definitions.insert(name.into(), def);
        self
    }
}

#[async_trait]
impl MetricStore for StaticMetricStore {
    async fn load_definitions(
        &self,
        names: &[String],
    ) -> Result<BTreeMap<String, MetricDefinition>, MetricStoreError> {
        let mut out = BTreeMap::new();
        for name in names {
            let def = self
                .definitions
                .get(name)
                .ok_or_else(|| MetricStoreError::Missing(name.clone()))?;
            out.insert(name.clone(), def.clone());
        }
        Ok(out)
    }
}
