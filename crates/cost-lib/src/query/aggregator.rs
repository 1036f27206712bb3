//! Concurrent dimension queries joined into cost records
//!
//! Every dimension of a call runs as its own task. The call waits for all of
//! them, then either joins every result by `(entity, timestamp)` or, when
//! any dimension failed, returns every collected error together.

use super::client::{MetricsBackend, Series};
use crate::error::{AggregateError, CostError, Result};
use crate::models::{CostRecord, EntityKey, Field, TimeWindow};
use crate::schema::labels;
use crate::units::{average_over_step, hourly_rate, SAMPLE_PERIOD_SECONDS};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// How a dimension is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// One point at the given time, or the backend's now
    Instant { at: Option<i64> },
    /// One point per step of the window
    Range,
}

/// How many series a dimension may return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Exactly one series; anything else is a data inconsistency
    Single,
    Many,
}

/// Conversion applied to every returned value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalize {
    None,
    /// Quantity-hours accumulated over a step back to the average quantity
    PerStepHour,
    /// Sample count over a step back to the average count per sample
    SamplesPerStep,
}

impl Normalize {
    fn apply(&self, value: f64, step_seconds: u64) -> f64 {
        match self {
            Normalize::None => value,
            Normalize::PerStepHour => hourly_rate(value, step_seconds),
            Normalize::SamplesPerStep => {
                average_over_step(value, step_seconds, SAMPLE_PERIOD_SECONDS)
            }
        }
    }
}

/// Entity a series belongs to, derived from its labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityMapping {
    Cluster,
    Namespace,
    Pod,
    Workload,
}

impl EntityMapping {
    fn key(&self, series: &Series) -> Option<EntityKey> {
        let label = |key: &str| series.label(key).map(str::to_string);
        match self {
            EntityMapping::Cluster => Some(EntityKey::Cluster),
            EntityMapping::Namespace => Some(EntityKey::Namespace {
                namespace: label(labels::NAMESPACE)?,
            }),
            EntityMapping::Pod => Some(EntityKey::Pod {
                namespace: label(labels::NAMESPACE)?,
                name: label(labels::POD)?,
            }),
            EntityMapping::Workload => Some(EntityKey::Workload {
                workload_type: label(labels::WORKLOAD_TYPE)?,
                namespace: label(labels::NAMESPACE)?,
                name: label(labels::WORKLOAD_NAME)?,
            }),
        }
    }
}

/// Record field a series writes
#[derive(Clone, Copy)]
pub enum FieldMapping {
    Fixed(Field),
    /// Field picked from one label's value; unmapped values are dropped
    ByLabel {
        label: &'static str,
        field: fn(&str) -> Option<Field>,
    },
}

impl FieldMapping {
    fn field(&self, series: &Series) -> Option<Field> {
        match self {
            FieldMapping::Fixed(field) => Some(*field),
            FieldMapping::ByLabel { label, field } => series.label(label).and_then(field),
        }
    }
}

/// One parameterized query of an aggregate call
#[derive(Clone)]
pub struct Dimension {
    pub name: &'static str,
    pub promql: String,
    pub mode: QueryMode,
    pub entity: EntityMapping,
    pub field: FieldMapping,
    pub cardinality: Cardinality,
    pub normalize: Normalize,
}

impl Dimension {
    pub fn range(
        name: &'static str,
        promql: String,
        entity: EntityMapping,
        field: FieldMapping,
    ) -> Self {
        Self {
            name,
            promql,
            mode: QueryMode::Range,
            entity,
            field,
            cardinality: Cardinality::Many,
            normalize: Normalize::None,
        }
    }

    pub fn instant(
        name: &'static str,
        promql: String,
        at: Option<i64>,
        entity: EntityMapping,
        field: FieldMapping,
    ) -> Self {
        Self {
            mode: QueryMode::Instant { at },
            ..Self::range(name, promql, entity, field)
        }
    }

    pub fn single(mut self) -> Self {
        self.cardinality = Cardinality::Single;
        self
    }

    pub fn normalized(mut self, normalize: Normalize) -> Self {
        self.normalize = normalize;
        self
    }
}

/// Tenant and cluster every query is scoped to
#[derive(Debug, Clone, Default)]
pub struct AggregatorConfig {
    pub tenant: Option<String>,
    pub cluster_id: String,
}

impl AggregatorConfig {
    pub fn new(cluster_id: impl Into<String>) -> Self {
        Self {
            tenant: None,
            cluster_id: cluster_id.into(),
        }
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }
}

/// Runs dimension queries against a metrics backend and joins the results
#[derive(Clone)]
pub struct QueryAggregator {
    backend: Arc<dyn MetricsBackend>,
    config: AggregatorConfig,
}

impl QueryAggregator {
    pub fn new(backend: Arc<dyn MetricsBackend>, config: AggregatorConfig) -> Result<Self> {
        if config.cluster_id.is_empty() {
            return Err(CostError::Config("cluster id is required".to_string()));
        }
        Ok(Self { backend, config })
    }

    pub fn cluster_id(&self) -> &str {
        &self.config.cluster_id
    }

    /// Query every dimension concurrently and join the results
    ///
    /// Records come back sorted by entity, then timestamp. Nothing is
    /// returned unless every dimension succeeded.
    pub async fn aggregate(
        &self,
        window: &TimeWindow,
        dimensions: &[Dimension],
    ) -> Result<Vec<CostRecord>> {
        let handles: Vec<_> = dimensions
            .iter()
            .map(|dim| {
                let backend = Arc::clone(&self.backend);
                let tenant = self.config.tenant.clone();
                let promql = dim.promql.clone();
                let mode = dim.mode;
                let window = *window;
                tokio::spawn(async move {
                    match mode {
                        QueryMode::Instant { at } => {
                            backend.instant(tenant.as_deref(), &promql, at).await
                        }
                        QueryMode::Range => {
                            backend.range(tenant.as_deref(), &promql, &window).await
                        }
                    }
                })
            })
            .collect();

        // slot i holds the outcome of dimensions[i]
        let mut slots = Vec::with_capacity(handles.len());
        for handle in handles {
            slots.push(handle.await.unwrap_or_else(|e| {
                Err(CostError::UpstreamQuery(format!("query task failed: {e}")))
            }));
        }

        let mut errors = Vec::new();
        let mut results = Vec::with_capacity(slots.len());
        for (dim, slot) in dimensions.iter().zip(slots) {
            match slot {
                Ok(series) if dim.cardinality == Cardinality::Single && series.len() != 1 => {
                    errors.push(CostError::DataInconsistency {
                        dimension: dim.name.to_string(),
                        matched: series.len(),
                    });
                }
                Ok(series) => results.push((dim, series)),
                Err(e) => {
                    warn!(dimension = dim.name, error = %e, "Dimension query failed");
                    errors.push(e);
                }
            }
        }
        if let Some(aggregate) = AggregateError::from_errors(errors) {
            return Err(CostError::Aggregate(aggregate));
        }

        let mut joined: BTreeMap<(EntityKey, i64), CostRecord> = BTreeMap::new();
        for (dim, series) in results {
            for s in &series {
                let (Some(key), Some(field)) = (dim.entity.key(s), dim.field.field(s)) else {
                    debug!(dimension = dim.name, labels = ?s.labels, "Dropping unmapped series");
                    continue;
                };
                for &(timestamp, raw) in &s.points {
                    if !raw.is_finite() {
                        continue;
                    }
                    let value = dim.normalize.apply(raw, window.step_seconds);
                    let record = joined
                        .entry((key.clone(), timestamp))
                        .or_insert_with(|| CostRecord::new(key.clone(), timestamp));
                    *record.values.entry(field).or_insert(0.0) += value;
                }
            }
        }

        debug!(
            dimensions = dimensions.len(),
            records = joined.len(),
            "Aggregate joined"
        );
        Ok(joined.into_values().collect())
    }
}
