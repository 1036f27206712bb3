//! Gauge sink the emitter writes to
//!
//! Every write names a [`MetricSchema`] and passes labels as key/value
//! pairs. A label set that does not match the schema exactly is rejected
//! and logged instead of creating a stray series.

use crate::error::{CostError, Result};
use crate::schema::{self, MetricSchema};
use prometheus::{GaugeVec, Opts, Registry};
use std::collections::HashMap;
use tracing::error;

/// Write-only, thread-safe labeled gauge store
pub trait MetricsSink: Send + Sync {
    fn set_gauge(&self, schema: &MetricSchema, labels: &[(&str, &str)], value: f64);

    /// Drop every series of a metric before a fresh snapshot is written
    fn clear(&self, schema: &MetricSchema);
}

/// Order label values as the schema declares them
///
/// Fails when a key is missing, unknown or given twice.
pub fn label_values<'a>(schema: &MetricSchema, labels: &[(&str, &'a str)]) -> Result<Vec<&'a str>> {
    if labels.len() != schema.labels.len() {
        return Err(label_mismatch(schema, labels));
    }
    schema
        .labels
        .iter()
        .map(|key| {
            let mut matches = labels.iter().filter(|(k, _)| k == key);
            match (matches.next(), matches.next()) {
                (Some((_, v)), None) => Ok(*v),
                _ => Err(label_mismatch(schema, labels)),
            }
        })
        .collect()
}

fn label_mismatch(schema: &MetricSchema, labels: &[(&str, &str)]) -> CostError {
    let given: Vec<&str> = labels.iter().map(|(k, _)| *k).collect();
    CostError::Config(format!(
        "labels {:?} do not match schema {:?} of {}",
        given, schema.labels, schema.name
    ))
}

/// Sink backed by Prometheus gauge vectors, one per schema entry
pub struct PrometheusSink {
    gauges: HashMap<&'static str, GaugeVec>,
}

impl PrometheusSink {
    /// Create and register a gauge for every schema on `registry`
    pub fn register(registry: &Registry) -> Result<Self> {
        let mut gauges = HashMap::new();
        for schema in schema::ALL {
            let gauge = GaugeVec::new(Opts::new(schema.full_name(), schema.help), schema.labels)
                .map_err(|e| CostError::Config(format!("gauge {}: {e}", schema.name)))?;
            registry
                .register(Box::new(gauge.clone()))
                .map_err(|e| CostError::Config(format!("register {}: {e}", schema.name)))?;
            gauges.insert(schema.name, gauge);
        }
        Ok(Self { gauges })
    }
}

impl MetricsSink for PrometheusSink {
    fn set_gauge(&self, schema: &MetricSchema, labels: &[(&str, &str)], value: f64) {
        let Some(gauge) = self.gauges.get(schema.name) else {
            error!(metric = %schema.name, "Gauge not registered");
            return;
        };
        match label_values(schema, labels) {
            Ok(values) => gauge.with_label_values(&values).set(value),
            Err(e) => error!(metric = %schema.name, error = %e, "Rejected gauge write"),
        }
    }

    fn clear(&self, schema: &MetricSchema) {
        if let Some(gauge) = self.gauges.get(schema.name) {
            gauge.reset();
        }
    }
}

/// In-memory sink recording the last value of every series
#[cfg(test)]
#[derive(Default)]
pub(crate) struct MemorySink {
    series: std::sync::Mutex<HashMap<(String, Vec<(String, String)>), f64>>,
}

#[cfg(test)]
impl MemorySink {
    /// Value of the series whose labels include every given pair
    pub(crate) fn find(&self, metric: &str, labels: &[(&str, &str)]) -> Vec<f64> {
        let series = self.series.lock().unwrap();
        series
            .iter()
            .filter(|((name, set), _)| {
                name == metric
                    && labels
                        .iter()
                        .all(|(k, v)| set.iter().any(|(sk, sv)| sk == k && sv == v))
            })
            .map(|(_, v)| *v)
            .collect()
    }

    pub(crate) fn count(&self, metric: &str) -> usize {
        self.find(metric, &[]).len()
    }
}

#[cfg(test)]
impl MetricsSink for MemorySink {
    fn set_gauge(&self, schema: &MetricSchema, labels: &[(&str, &str)], value: f64) {
        if label_values(schema, labels).is_err() {
            return;
        }
        let mut set: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        set.sort();
        self.series
            .lock()
            .unwrap()
            .insert((schema.name.to_string(), set), value);
    }

    fn clear(&self, schema: &MetricSchema) {
        self.series
            .lock()
            .unwrap()
            .retain(|(name, _), _| name != schema.name);
    }
}
