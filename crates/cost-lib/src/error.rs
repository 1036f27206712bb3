//! Error taxonomy for the cost accounting pipeline

use std::fmt;
use thiserror::Error;

/// Errors produced by pricing, tracking, emission and aggregation
#[derive(Debug, Clone, Error)]
pub enum CostError {
    /// Required cluster identity or configuration is missing
    #[error("configuration error: {0}")]
    Config(String),

    /// Backend unreachable, non-success status or malformed body
    #[error("upstream query failed: {0}")]
    UpstreamQuery(String),

    /// A single-valued dimension matched zero or several series
    #[error(
        "data inconsistency in dimension {dimension}: expected exactly one series, got {matched}"
    )]
    DataInconsistency { dimension: String, matched: usize },

    /// Instance type or region missing from the catalog
    #[error("price resolution failed for {instance_type} in {region}: {reason}")]
    PriceResolution {
        region: String,
        instance_type: String,
        reason: String,
    },

    /// A node or pod lacks the labels or resource data the caller needs
    #[error("{kind} {name}: {reason}")]
    PerEntity {
        kind: &'static str,
        name: String,
        reason: String,
    },

    /// A resource quantity string could not be parsed
    #[error("invalid quantity {0:?}")]
    Quantity(String),

    /// A background component stopped and can no longer answer
    #[error("{0} is not running")]
    Stopped(&'static str),

    /// Several concurrent subtasks failed
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

impl CostError {
    pub fn per_entity(
        kind: &'static str,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::PerEntity {
            kind,
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that should only skip one entity for one tick
    pub fn is_per_entity(&self) -> bool {
        matches!(
            self,
            CostError::PerEntity { .. } | CostError::PriceResolution { .. } | CostError::Quantity(_)
        )
    }
}

impl From<reqwest::Error> for CostError {
    fn from(err: reqwest::Error) -> Self {
        CostError::UpstreamQuery(err.to_string())
    }
}

/// Collected failures of a fan-out, reported once every subtask finished
#[derive(Debug, Clone, Default)]
pub struct AggregateError {
    errors: Vec<CostError>,
}

impl AggregateError {
    /// Build from a list of errors, `None` when the list is empty
    pub fn from_errors(errors: Vec<CostError>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self { errors })
        }
    }

    pub fn errors(&self) -> &[CostError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.len() == 1 {
            return write!(f, "{}", self.errors[0]);
        }
        write!(f, "[")?;
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", err)?;
        }
        write!(f, "]")
    }
}

impl std::error::Error for AggregateError {}

pub type Result<T> = std::result::Result<T, CostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_error_empty_is_none() {
        assert!(AggregateError::from_errors(vec![]).is_none());
    }

    #[test]
    fn test_aggregate_error_lists_every_member() {
        let agg = AggregateError::from_errors(vec![
            CostError::UpstreamQuery("a down".into()),
            CostError::UpstreamQuery("b down".into()),
        ])
        .unwrap();

        let rendered = agg.to_string();
        assert_eq!(agg.len(), 2);
        assert!(rendered.contains("a down"));
        assert!(rendered.contains("b down"));
    }

    #[test]
    fn test_per_entity_classification() {
        assert!(CostError::per_entity("node", "n1", "missing label").is_per_entity());
        assert!(!CostError::UpstreamQuery("x".into()).is_per_entity());
        assert!(!CostError::DataInconsistency {
            dimension: "total".into(),
            matched: 2
        }
        .is_per_entity());
    }
}
