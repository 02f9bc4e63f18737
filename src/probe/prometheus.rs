//! Prometheus-backed probe
//!
//! Evaluates a rule with an instant query (`/api/v1/query`) against a
//! Prometheus-compatible endpoint. The decision policy over the returned
//! vector: the verdict is true when the first sample's value equals 1;
//! any other value is false; an empty vector is a valid "false" answer
//! (the rule selected nothing), not an error.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::Probe;
use crate::Error;

/// Timeout for a single instant query
const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Probe evaluating a Prometheus rule
pub struct PrometheusProbe {
    server_url: String,
    rule: String,
    http: reqwest::Client,
}

impl PrometheusProbe {
    /// Create a probe querying `rule` against the Prometheus at `server_url`
    pub fn new(server_url: &str, rule: &str) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(QUERY_TIMEOUT)
            .build()
            .map_err(|e| Error::probe(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            rule: rule.to_string(),
            http,
        })
    }
}

#[async_trait]
impl Probe for PrometheusProbe {
    async fn evaluate(&self) -> Result<bool, Error> {
        let url = format!("{}/api/v1/query", self.server_url);

        let response = self
            .http
            .get(&url)
            .query(&[("query", self.rule.as_str())])
            .send()
            .await
            .map_err(|e| Error::probe(format!("query request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::probe(format!(
                "query returned http status {}",
                response.status()
            )));
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| Error::probe(format!("failed to decode query response: {}", e)))?;

        let verdict = body.verdict()?;
        debug!(rule = %self.rule, verdict = verdict, "evaluated prometheus rule");
        Ok(verdict)
    }
}

/// Instant query response envelope
///
/// Only the fields the decision policy needs; everything else in the
/// response is ignored.
#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<VectorSample>,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    /// Instant vector sample: `[timestamp, "value"]`
    value: (f64, String),
}

impl QueryResponse {
    /// Apply the decision policy to a decoded response
    fn verdict(&self) -> Result<bool, Error> {
        if self.status != "success" {
            return Err(Error::probe(format!(
                "query returned status {:?}: {}",
                self.status,
                self.error.as_deref().unwrap_or("no error detail")
            )));
        }

        let samples = match self.data {
            Some(ref data) => &data.result,
            None => {
                return Err(Error::probe("successful query carried no data section"));
            }
        };

        // A rule that evaluates to false selects no series at all
        match samples.first() {
            None => Ok(false),
            Some(sample) => {
                let value: f64 = sample.value.1.parse().map_err(|_| {
                    Error::probe(format!("sample value {:?} is not numeric", sample.value.1))
                })?;
                Ok(value == 1.0)
            }
        }
    }
}
