//! Client for a Prometheus-compatible metrics backend
//!
//! Instant queries are POSTed to `/api/v1/query`, range queries use
//! `GET /api/v1/query_range`. A tenant id, when given, travels in the
//! `X-Scope-OrgID` header.

use crate::error::{CostError, Result};
use crate::models::TimeWindow;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Header carrying the tenant id on multi-tenant backends
pub const TENANT_HEADER: &str = "X-Scope-OrgID";

/// One returned series: its label set and `(unix seconds, value)` points
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    pub labels: BTreeMap<String, String>,
    pub points: Vec<(i64, f64)>,
}

impl Series {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Time-series store answering PromQL
#[async_trait]
pub trait MetricsBackend: Send + Sync {
    /// Evaluate `query` at `time` (backend "now" when `None`)
    async fn instant(
        &self,
        tenant: Option<&str>,
        query: &str,
        time: Option<i64>,
    ) -> Result<Vec<Series>>;

    /// Evaluate `query` at every step of `window`
    async fn range(
        &self,
        tenant: Option<&str>,
        query: &str,
        window: &TimeWindow,
    ) -> Result<Vec<Series>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    status: String,
    #[serde(default)]
    data: Option<EnvelopeData>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeData {
    result_type: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    value: (f64, String),
}

#[derive(Debug, Deserialize)]
struct MatrixSeries {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    values: Vec<(f64, String)>,
}

fn malformed(detail: impl std::fmt::Display) -> CostError {
    CostError::UpstreamQuery(format!("malformed query response: {detail}"))
}

fn point((ts, raw): (f64, String)) -> Result<(i64, f64)> {
    let value = match raw.as_str() {
        "NaN" => f64::NAN,
        "+Inf" => f64::INFINITY,
        "-Inf" => f64::NEG_INFINITY,
        other => other
            .parse()
            .map_err(|_| malformed(format_args!("sample value {other:?}")))?,
    };
    Ok((ts as i64, value))
}

/// Decode a query response body into series
pub fn parse_response(body: &str) -> Result<Vec<Series>> {
    let envelope: Envelope = serde_json::from_str(body).map_err(malformed)?;

    if envelope.status != "success" {
        return Err(CostError::UpstreamQuery(format!(
            "query failed ({}): {}",
            envelope.error_type.unwrap_or_default(),
            envelope.error.unwrap_or_default()
        )));
    }
    let data = envelope
        .data
        .ok_or_else(|| malformed("missing data"))?;

    match data.result_type.as_str() {
        "vector" => {
            let samples: Vec<VectorSample> =
                serde_json::from_value(data.result).map_err(malformed)?;
            samples
                .into_iter()
                .map(|s| {
                    Ok(Series {
                        labels: s.metric,
                        points: vec![point(s.value)?],
                    })
                })
                .collect()
        }
        "matrix" => {
            let series: Vec<MatrixSeries> = serde_json::from_value(data.result).map_err(malformed)?;
            series
                .into_iter()
                .map(|s| {
                    Ok(Series {
                        labels: s.metric,
                        points: s.values.into_iter().map(point).collect::<Result<_>>()?,
                    })
                })
                .collect()
        }
        "scalar" => {
            let value: (f64, String) = serde_json::from_value(data.result).map_err(malformed)?;
            Ok(vec![Series {
                labels: BTreeMap::new(),
                points: vec![point(value)?],
            }])
        }
        other => Err(malformed(format_args!("unsupported result type {other:?}"))),
    }
}

/// reqwest-backed [`MetricsBackend`]
pub struct PromClient {
    client: Client,
    query_url: Url,
    range_url: Url,
}

impl PromClient {
    /// `base_url` is the backend root, e.g. `http://prometheus:9090`
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CostError::Config(format!("failed to create HTTP client: {e}")))?;

        let mut base = Url::parse(base_url)
            .map_err(|e| CostError::Config(format!("invalid metrics backend URL: {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = |path: &str| {
            base.join(path)
                .map_err(|e| CostError::Config(format!("invalid metrics backend URL: {e}")))
        };

        Ok(Self {
            query_url: endpoint("api/v1/query")?,
            range_url: endpoint("api/v1/query_range")?,
            client,
        })
    }

    async fn send(request: reqwest::RequestBuilder, tenant: Option<&str>) -> Result<Vec<Series>> {
        let request = match tenant {
            Some(tenant) if !tenant.is_empty() => request.header(TENANT_HEADER, tenant),
            _ => request,
        };

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(CostError::UpstreamQuery(format!(
                "metrics backend returned {status}: {body}"
            )));
        }
        parse_response(&body)
    }
}

#[async_trait]
impl MetricsBackend for PromClient {
    async fn instant(
        &self,
        tenant: Option<&str>,
        query: &str,
        time: Option<i64>,
    ) -> Result<Vec<Series>> {
        let mut form = vec![("query", query.to_string())];
        if let Some(time) = time {
            form.push(("time", time.to_string()));
        }
        debug!(query = %query, "Instant query");

        let request = self.client.post(self.query_url.clone()).form(&form);
        Self::send(request, tenant).await
    }

    async fn range(
        &self,
        tenant: Option<&str>,
        query: &str,
        window: &TimeWindow,
    ) -> Result<Vec<Series>> {
        let resolution = window.resolution_seconds();
        let params = [
            ("query", query.to_string()),
            ("start", window.start.to_string()),
            ("end", window.end.to_string()),
            ("step", format!("{resolution}s")),
        ];
        debug!(query = %query, step = window.step_seconds, resolution, "Range query");

        let request = self.client.get(self.range_url.clone()).query(&params);
        Self::send(request, tenant).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const VECTOR: &str = r#"{
        "status": "success",
        "data": {"resultType": "vector", "result": [
            {"metric": {"billing_mode": "ondemand"}, "value": [1700000000.5, "3"]},
            {"metric": {"billing_mode": "spot"}, "value": [1700000000.5, "1"]}
        ]}
    }"#;

    const MATRIX: &str = r#"{
        "status": "success",
        "data": {"resultType": "matrix", "result": [
            {"metric": {"namespace": "default"}, "values": [[0, "1.5"], [3600, "2"]]}
        ]}
    }"#;

    #[test]
    fn test_parse_vector_and_matrix() {
        let series = parse_response(VECTOR).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[1].label("billing_mode"), Some("spot"));
        assert_eq!(series[0].points, vec![(1_700_000_000, 3.0)]);

        let series = parse_response(MATRIX).unwrap();
        assert_eq!(series[0].points, vec![(0, 1.5), (3600, 2.0)]);
    }

    #[test]
    fn test_parse_scalar() {
        let body = r#"{"status":"success","data":{"resultType":"scalar","result":[10,"42"]}}"#;
        let series = parse_response(body).unwrap();
        assert_eq!(series.len(), 1);
        assert!(series[0].labels.is_empty());
        assert_eq!(series[0].points, vec![(10, 42.0)]);
    }

    #[test]
    fn test_parse_error_envelope() {
        let body = r#"{"status":"error","errorType":"bad_data","error":"parse error at char 4"}"#;
        let err = parse_response(body).unwrap_err();
        assert!(matches!(err, CostError::UpstreamQuery(ref m) if m.contains("parse error")));
    }

    #[test]
    fn test_parse_malformed_body() {
        assert!(matches!(
            parse_response("<html>"),
            Err(CostError::UpstreamQuery(_))
        ));
        let bad_value = r#"{"status":"success","data":{"resultType":"vector","result":[
            {"metric":{},"value":[0,"many"]}]}}"#;
        assert!(parse_response(bad_value).is_err());
    }

    #[tokio::test]
    async fn test_instant_posts_form_with_tenant() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/query")
            .match_header(TENANT_HEADER, "team-a")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("query".into(), "up".into()),
                Matcher::UrlEncoded("time".into(), "1700000000".into()),
            ]))
            .with_status(200)
            .with_body(VECTOR)
            .create_async()
            .await;

        let client = PromClient::new(&server.url()).unwrap();
        let series = client
            .instant(Some("team-a"), "up", Some(1_700_000_000))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(series.len(), 2);
    }

    #[tokio::test]
    async fn test_range_sends_step_in_seconds() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/query_range")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("query".into(), "sum(x)".into()),
                Matcher::UrlEncoded("start".into(), "0".into()),
                Matcher::UrlEncoded("end".into(), "7200".into()),
                Matcher::UrlEncoded("step".into(), "3600s".into()),
            ]))
            .with_status(200)
            .with_body(MATRIX)
            .create_async()
            .await;

        let client = PromClient::new(&server.url()).unwrap();
        let window = TimeWindow::new(0, 7200, 3600).unwrap();
        let series = client.range(None, "sum(x)", &window).await.unwrap();

        mock.assert_async().await;
        assert_eq!(series[0].label("namespace"), Some("default"));
    }

    #[tokio::test]
    async fn test_range_step_capped_for_month_window() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/query_range")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("start".into(), "1709251200".into()),
                Matcher::UrlEncoded("end".into(), "1711929600".into()),
                Matcher::UrlEncoded("step".into(), "267s".into()),
            ]))
            .with_status(200)
            .with_body(MATRIX)
            .create_async()
            .await;

        let client = PromClient::new(&server.url()).unwrap();
        let window = TimeWindow::new(1_709_251_200, 1_711_929_600, 15).unwrap();
        client.range(None, "sum(x)", &window).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_carries_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/query")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let client = PromClient::new(&server.url()).unwrap();
        let err = client.instant(None, "up", None).await.unwrap_err();
        assert!(matches!(err, CostError::UpstreamQuery(ref m) if m.contains("overloaded")));
    }
}
