//! Query function backed by a Prometheus-compatible HTTP API

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::rules::{Labels, QueryContext, QueryError, QueryFunc, Sample, Vector};

/// Header carrying the tenant (or pipe-joined tenants) of a query
pub const ORG_ID_HEADER: &str = "X-Scope-OrgID";

/// Issues instant queries against `<base_url>/api/v1/query`
#[derive(Debug, Clone)]
pub struct PrometheusQuerier {
    http_client: reqwest::Client,
    base_url: String,
}

impl PrometheusQuerier {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, QueryError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QueryError::Failed(e.to_string()))?;
        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    result_type: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    metric: BTreeMap<String, String>,
    /// `[unix_seconds, "value"]`
    value: (f64, String),
}

#[derive(Debug, Deserialize)]
struct ScalarSample(f64, String);

fn parse_value(raw: &str) -> Result<f64, QueryError> {
    match raw {
        "NaN" => Ok(f64::NAN),
        "+Inf" | "Inf" => Ok(f64::INFINITY),
        "-Inf" => Ok(f64::NEG_INFINITY),
        other => other
            .parse()
            .map_err(|_| QueryError::Failed(format!("invalid sample value {:?}", other))),
    }
}

/// Convert a query API response body into a vector
fn decode_response(response: QueryResponse) -> Result<Vector, QueryError> {
    if response.status != "success" {
        return Err(QueryError::Failed(
            response.error.unwrap_or_else(|| "query failed".to_string()),
        ));
    }
    let data = response
        .data
        .ok_or_else(|| QueryError::Failed("missing data in query response".to_string()))?;

    match data.result_type.as_str() {
        "vector" => {
            let samples: Vec<VectorSample> = serde_json::from_value(data.result)
                .map_err(|e| QueryError::Failed(e.to_string()))?;
            samples
                .into_iter()
                .map(|s| {
                    Ok(Sample::new(
                        Labels::from(&s.metric),
                        parse_value(&s.value.1)?,
                        (s.value.0 * 1000.0) as i64,
                    ))
                })
                .collect()
        }
        "scalar" => {
            let ScalarSample(ts, value) = serde_json::from_value(data.result)
                .map_err(|e| QueryError::Failed(e.to_string()))?;
            Ok(vec![Sample::new(
                Labels::new(),
                parse_value(&value)?,
                (ts * 1000.0) as i64,
            )])
        }
        other => Err(QueryError::Failed(format!(
            "rule result is not a vector or scalar: {}",
            other
        ))),
    }
}

#[async_trait]
impl QueryFunc for PrometheusQuerier {
    async fn query(
        &self,
        ctx: &QueryContext,
        expr: &str,
        ts: DateTime<Utc>,
    ) -> Result<Vector, QueryError> {
        let url = format!("{}/api/v1/query", self.base_url);
        let time = format!("{:.3}", ts.timestamp_millis() as f64 / 1000.0);

        let response = self
            .http_client
            .get(&url)
            .header(ORG_ID_HEADER, ctx.org_id())
            .query(&[("query", expr), ("time", time.as_str())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    QueryError::Timeout
                } else {
                    QueryError::Failed(e.to_string())
                }
            })?;

        let status = response.status();
        let body: QueryResponse = response.json().await.map_err(|e| {
            QueryError::Failed(format!("unable to decode query response ({}): {}", status, e))
        })?;

        decode_response(body)
    }
}
