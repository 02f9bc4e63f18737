//! PodCondition Custom Resource Definition
//!
//! A PodCondition declares a named status condition over a labeled set of
//! pods. The condition type written to each matching pod equals the
//! PodCondition's metadata name; the boolean value is driven by the
//! configured signal source on the configured polling interval.

use std::collections::BTreeMap;
use std::time::Duration;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for a PodCondition
///
/// The declaration names its condition implicitly (metadata name), selects
/// target pods by label, and configures exactly one signal source plus the
/// polling interval.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "conditioner.dev",
    version = "v1alpha1",
    kind = "PodCondition",
    plural = "podconditions",
    shortname = "pc",
    status = "PodConditionStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Interval","type":"integer","jsonPath":".spec.interval"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PodConditionSpec {
    /// Pods carrying all of these labels receive the condition
    pub label_selector: LabelSelector,

    /// Prometheus-backed signal source - if present, the condition value is
    /// the result of evaluating the rule against the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus_source: Option<PrometheusSourceSpec>,

    /// Interval between signal evaluations, in milliseconds
    pub interval: u64,
}

impl PodConditionSpec {
    /// Validate the PodCondition specification
    ///
    /// Runs before any worker is constructed; a spec that fails here never
    /// gets a polling loop.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.interval == 0 {
            return Err(crate::Error::validation(
                "interval must be a positive number of milliseconds",
            ));
        }

        // An empty selector would select every pod in the cluster
        if self.label_selector.match_labels.is_empty() {
            return Err(crate::Error::validation(
                "labelSelector.matchLabels must not be empty",
            ));
        }

        if let Some(ref source) = self.prometheus_source {
            if source.server_url.is_empty() {
                return Err(crate::Error::validation(
                    "prometheusSource.serverUrl must not be empty",
                ));
            }
            if source.rule.is_empty() {
                return Err(crate::Error::validation(
                    "prometheusSource.rule must not be empty",
                ));
            }
        }

        Ok(())
    }

    /// Polling interval as a Duration
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval)
    }
}

/// Label selector for target pods
///
/// Constraints are AND-combined: a pod matches when it carries every listed
/// key with the listed value.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Exact key=value constraints, all of which must hold
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    /// Build a selector from key=value pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            match_labels: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Render as a Kubernetes label selector query string (`k=v,k2=v2`)
    pub fn to_query(&self) -> String {
        self.match_labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Prometheus-backed signal source configuration
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusSourceSpec {
    /// Address where Prometheus is reachable (e.g. `http://prometheus:9090`)
    pub server_url: String,

    /// Rule to evaluate. The condition is true when the rule's first sample
    /// equals 1.
    pub rule: String,
}

/// Lifecycle phase of a PodCondition's worker
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum PodConditionPhase {
    /// Declaration observed, worker not yet started
    #[default]
    Pending,
    /// Worker loop is polling the signal source
    Running,
    /// Spec rejected or worker could not be constructed
    Failed,
}

impl std::fmt::Display for PodConditionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Status for a PodCondition
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodConditionStatus {
    /// Current phase of the worker lifecycle
    #[serde(default)]
    pub phase: PodConditionPhase,

    /// Human-readable message about current state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PodConditionStatus {
    /// Create a new status with the given phase
    pub fn with_phase(phase: PodConditionPhase) -> Self {
        Self {
            phase,
            ..Default::default()
        }
    }

    /// Set the message and return self for chaining
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Test Fixtures
    // =========================================================================

    fn sample_spec() -> PodConditionSpec {
        PodConditionSpec {
            label_selector: LabelSelector::from_pairs([("env", "prod")]),
            prometheus_source: Some(PrometheusSourceSpec {
                server_url: "http://prometheus:9090".to_string(),
                rule: "up{job=\"api\"} == 1".to_string(),
            }),
            interval: 1000,
        }
    }

    // =========================================================================
    // Validation Stories
    // =========================================================================
    //
    // These tests ensure declaration specs are validated before a worker
    // loop is ever constructed for them.

    /// Story: a complete spec passes validation
    #[test]
    fn story_valid_spec_passes_validation() {
        assert!(sample_spec().validate().is_ok());
    }

    /// Story: a zero interval is rejected
    ///
    /// A zero-millisecond ticker would spin the worker loop; the spec is
    /// rejected before construction instead.
    #[test]
    fn story_zero_interval_fails_validation() {
        let mut spec = sample_spec();
        spec.interval = 0;

        let result = spec.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("positive"));
    }

    /// Story: an empty label selector is rejected
    ///
    /// An empty matchLabels map selects every pod in the cluster, which is
    /// never what a condition declaration intends.
    #[test]
    fn story_empty_selector_fails_validation() {
        let mut spec = sample_spec();
        spec.label_selector = LabelSelector::default();

        let result = spec.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("matchLabels"));
    }

    /// Story: a Prometheus source with no server address is rejected
    #[test]
    fn story_blank_prometheus_server_fails_validation() {
        let mut spec = sample_spec();
        spec.prometheus_source = Some(PrometheusSourceSpec {
            server_url: String::new(),
            rule: "vector(1)".to_string(),
        });

        assert!(spec.validate().is_err());
    }

    /// Story: a spec with no source at all still validates
    ///
    /// Source presence is a worker-construction concern (the probe resolver
    /// rejects it); validation only checks the fields that are present.
    #[test]
    fn story_absent_source_is_a_construction_concern() {
        let mut spec = sample_spec();
        spec.prometheus_source = None;

        assert!(spec.validate().is_ok());
    }

    // =========================================================================
    // Selector Behavior
    // =========================================================================

    #[test]
    fn test_selector_query_joins_pairs() {
        let selector = LabelSelector::from_pairs([("env", "prod"), ("app", "web")]);
        // BTreeMap keeps keys sorted
        assert_eq!(selector.to_query(), "app=web,env=prod");
    }

    #[test]
    fn test_single_pair_query_has_no_separator() {
        let selector = LabelSelector::from_pairs([("env", "staging")]);
        assert_eq!(selector.to_query(), "env=staging");
    }

    // =========================================================================
    // YAML Serialization Stories
    // =========================================================================
    //
    // PodConditions are authored as YAML manifests. These tests pin the
    // wire format.

    /// Story: user declares a Prometheus-backed condition in YAML
    #[test]
    fn story_yaml_manifest_defines_prometheus_condition() {
        let yaml = r#"
labelSelector:
  matchLabels:
    env: prod
prometheusSource:
  serverUrl: "http://prometheus.monitoring:9090"
  rule: "sum(rate(http_errors_total[5m])) == 0"
interval: 5000
"#;
        let spec: PodConditionSpec = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(
            spec.label_selector.match_labels.get("env").map(String::as_str),
            Some("prod")
        );
        let source = spec.prometheus_source.unwrap();
        assert_eq!(source.server_url, "http://prometheus.monitoring:9090");
        assert!(source.rule.contains("http_errors_total"));
        assert_eq!(spec.interval, 5000);
    }

    /// Story: interval deserializes into a usable Duration
    #[test]
    fn story_interval_converts_to_duration() {
        let spec = sample_spec();
        assert_eq!(spec.interval(), std::time::Duration::from_millis(1000));
    }

    /// Story: spec survives serialization roundtrip
    ///
    /// Specs are stored in etcd and read back by the controller; all data
    /// must be preserved.
    #[test]
    fn story_spec_survives_yaml_roundtrip() {
        let spec = sample_spec();

        let yaml = serde_yaml::to_string(&spec).unwrap();
        let parsed: PodConditionSpec = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(spec, parsed);
    }

    /// Story: phases render with Kubernetes-style capitalization
    #[test]
    fn story_phase_display_matches_printcolumn() {
        assert_eq!(PodConditionPhase::Pending.to_string(), "Pending");
        assert_eq!(PodConditionPhase::Running.to_string(), "Running");
        assert_eq!(PodConditionPhase::Failed.to_string(), "Failed");
    }

    /// Story: status builder chains phase and message
    #[test]
    fn story_status_builder_carries_failure_message() {
        let status = PodConditionStatus::with_phase(PodConditionPhase::Failed)
            .message("no signal source configured");

        assert_eq!(status.phase, PodConditionPhase::Failed);
        assert_eq!(
            status.message.as_deref(),
            Some("no signal source configured")
        );
    }
}
