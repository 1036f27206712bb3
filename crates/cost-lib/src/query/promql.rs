//! PromQL composition over the emitted metric schema
//!
//! Gauges are sampled every [`SAMPLE_PERIOD_SECONDS`]. Summing an hourly
//! price over a window and dividing by the samples per hour gives the cost
//! accumulated in that window; summing a quantity the same way gives
//! quantity-hours.

use crate::models::ResourceKind;
use crate::schema::{self, labels, MetricSchema};
use crate::units::{samples_per_hour, SAMPLE_PERIOD_SECONDS};

fn selector(cluster_id: &str, extra: &[(&str, &str)]) -> String {
    let mut matchers = vec![format!("{}='{}'", labels::CLUSTER_ID, escape(cluster_id))];
    matchers.extend(extra.iter().map(|(k, v)| format!("{k}='{}'", escape(v))));
    format!("{{{}}}", matchers.join(","))
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn grouping(by: &[&str]) -> String {
    if by.is_empty() {
        String::new()
    } else {
        format!(" by ({})", by.join(","))
    }
}

/// Value accumulated over each `range_seconds`, grouped by `by`
pub fn accumulated(
    metric: &MetricSchema,
    cluster_id: &str,
    extra: &[(&str, &str)],
    range_seconds: u64,
    by: &[&str],
) -> String {
    format!(
        "sum(sum_over_time({}{}[{}s])/{}){}",
        metric.full_name(),
        selector(cluster_id, extra),
        range_seconds,
        samples_per_hour(SAMPLE_PERIOD_SECONDS),
        grouping(by)
    )
}

/// Number of samples over each `range_seconds`, grouped by `by`
pub fn sample_count(
    metric: &MetricSchema,
    cluster_id: &str,
    range_seconds: u64,
    by: &[&str],
) -> String {
    format!(
        "sum(count_over_time({}{}[{}s])){}",
        metric.full_name(),
        selector(cluster_id, &[]),
        range_seconds,
        grouping(by)
    )
}

/// Current sum of a gauge, grouped by `by`
pub fn current_sum(
    metric: &MetricSchema,
    cluster_id: &str,
    extra: &[(&str, &str)],
    by: &[&str],
) -> String {
    format!(
        "sum({}{}){}",
        metric.full_name(),
        selector(cluster_id, extra),
        grouping(by)
    )
}

/// Current number of series of a gauge, grouped by `by`
pub fn current_count(metric: &MetricSchema, cluster_id: &str, by: &[&str]) -> String {
    format!(
        "count({}{}){}",
        metric.full_name(),
        selector(cluster_id, &[]),
        grouping(by)
    )
}

/// Seconds the cluster reported during the last `range_seconds`
pub fn active_seconds(cluster_id: &str, range_seconds: u64) -> String {
    format!(
        "sum(count_over_time({}{}[{}s]))*{}",
        schema::CLUSTER_ACTIVE.full_name(),
        selector(cluster_id, &[]),
        range_seconds,
        SAMPLE_PERIOD_SECONDS
    )
}

/// Workload matcher on `workload_type`, a regex alternation
fn workload_selector(cluster_id: &str, types: &[&str]) -> String {
    format!(
        "{{{}='{}',{}=~'{}'}}",
        labels::CLUSTER_ID,
        escape(cluster_id),
        labels::WORKLOAD_TYPE,
        types.join("|")
    )
}

/// Accumulated value of a workload metric restricted to `types`
pub fn workload_accumulated(
    metric: &MetricSchema,
    cluster_id: &str,
    types: &[&str],
    range_seconds: u64,
    by: &[&str],
) -> String {
    format!(
        "sum(sum_over_time({}{}[{}s])/{}){}",
        metric.full_name(),
        workload_selector(cluster_id, types),
        range_seconds,
        samples_per_hour(SAMPLE_PERIOD_SECONDS),
        grouping(by)
    )
}

/// Raw sample sum of a workload metric restricted to `types`
pub fn workload_sample_sum(
    metric: &MetricSchema,
    cluster_id: &str,
    types: &[&str],
    range_seconds: u64,
    by: &[&str],
) -> String {
    format!(
        "sum(sum_over_time({}{}[{}s])){}",
        metric.full_name(),
        workload_selector(cluster_id, types),
        range_seconds,
        grouping(by)
    )
}

pub fn resource_matcher(resource: ResourceKind) -> (&'static str, &'static str) {
    (labels::RESOURCE, resource.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulated_cluster_cost() {
        let q = accumulated(&schema::NODE_TOTAL_HOURLY_COST, "c1", &[], 3600, &[]);
        assert_eq!(
            q,
            "sum(sum_over_time(costwise_node_total_hourly_cost{cluster_id='c1'}[3600s])/240)"
        );
    }

    #[test]
    fn test_grouping_and_extra_matchers() {
        let q = accumulated(
            &schema::NODE_RESOURCE_USAGE,
            "c1",
            &[resource_matcher(ResourceKind::Memory)],
            600,
            &[labels::NAMESPACE, labels::RESOURCE],
        );
        assert_eq!(
            q,
            concat!(
                "sum(sum_over_time(costwise_node_resource_usage",
                "{cluster_id='c1',resource='memory'}[600s])/240) by (namespace,resource)"
            )
        );
    }

    #[test]
    fn test_workload_type_regex() {
        let q = workload_sample_sum(
            &schema::WORKLOAD_POD_COUNT,
            "c1",
            &schema::workload_types::ALL,
            3600,
            &[labels::WORKLOAD_NAME],
        );
        assert!(q.contains("workload_type=~'deployment|statefulset|daemonset'"));
        assert!(q.starts_with("sum(sum_over_time(costwise_workload_pod_count{"));
    }

    #[test]
    fn test_active_seconds_and_counts() {
        assert_eq!(
            active_seconds("c1", 86400),
            "sum(count_over_time(costwise_cluster_active{cluster_id='c1'}[86400s]))*15"
        );
        assert_eq!(
            current_count(&schema::POD_RESOURCE_COST, "c1", &[labels::SCHEDULED]),
            "count(costwise_pod_resource_cost{cluster_id='c1'}) by (scheduled)"
        );
    }

    #[test]
    fn test_cluster_id_is_escaped() {
        let q = current_sum(&schema::NODE_RESOURCE_TOTAL, "it's", &[], &[]);
        assert!(q.contains("cluster_id='it\\'s'"));
    }
}
