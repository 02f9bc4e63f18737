//! Error types for the Conditioner operator

use thiserror::Error;

/// Main error type for Conditioner operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Validation error for CRD specs
    #[error("validation error: {0}")]
    Validation(String),

    /// Probe evaluation error (transport, query or decode failure)
    #[error("probe error: {0}")]
    Probe(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a probe error with the given message
    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Story Tests: Error Propagation in Condition Workers
    // ==========================================================================
    //
    // These tests demonstrate how errors flow through the system while
    // conditions are being maintained. Each error type represents a failure
    // category with its own handling policy in the worker loop.

    /// Story: spec validation catches misconfigurations before a worker starts
    ///
    /// When a user creates a PodCondition with an invalid spec, validation
    /// rejects it before any polling loop exists.
    #[test]
    fn story_validation_prevents_invalid_condition_creation() {
        // Scenario: no signal source configured
        let err = Error::validation("no signal source configured");
        assert!(err.to_string().contains("validation error"));
        assert!(err.to_string().contains("signal source"));

        // Scenario: non-positive polling interval
        let err = Error::validation("interval must be a positive number of milliseconds");
        assert!(err.to_string().contains("positive"));

        // Scenario: empty label selector would match every pod in the cluster
        let err = Error::validation("labelSelector.matchLabels must not be empty");
        assert!(err.to_string().contains("matchLabels"));

        // Validation errors are categorized correctly for handling
        match Error::validation("any message") {
            Error::Validation(msg) => assert_eq!(msg, "any message"),
            _ => panic!("Expected Validation variant"),
        }
    }

    /// Story: probe errors surface signal evaluation failures
    ///
    /// When the external signal cannot be evaluated (server unreachable,
    /// malformed response), the error names what failed so the worker log
    /// is actionable.
    #[test]
    fn story_probe_errors_during_evaluation() {
        // Scenario: Prometheus is unreachable
        let err = Error::probe("query request failed: connection refused");
        assert!(err.to_string().contains("probe error"));
        assert!(err.to_string().contains("connection refused"));

        // Scenario: unexpected response shape
        let err = Error::probe("query returned status \"error\": parse error at char 3");
        assert!(err.to_string().contains("parse error"));

        // Probe errors are categorized correctly
        match Error::probe("any probe issue") {
            Error::Probe(msg) => assert_eq!(msg, "any probe issue"),
            _ => panic!("Expected Probe variant"),
        }
    }

    /// Story: error helper functions accept both String and &str
    ///
    /// For ergonomic API usage, error constructors accept anything that
    /// implements Into<String>.
    #[test]
    fn story_error_construction_ergonomics() {
        // From String
        let dynamic_msg = format!("condition {} not found", "ready");
        let err = Error::validation(dynamic_msg);
        assert!(err.to_string().contains("ready"));

        // From &str literal
        let err = Error::probe("static message");
        assert!(err.to_string().contains("static message"));

        // From formatted string
        let rule = "up{job=\"api\"} == 1";
        let err = Error::probe(format!("rule {} did not evaluate", rule));
        assert!(err.to_string().contains("did not evaluate"));
    }

    /// Story: errors are categorized for proper handling in the worker loop
    ///
    /// Different error types get different treatment: validation failures
    /// are terminal until the spec changes, probe failures are retried with
    /// backoff before giving up, kube API failures are requeued.
    #[test]
    fn story_error_categorization_for_worker_handling() {
        fn categorize_error(err: &Error) -> &'static str {
            match err {
                Error::Validation(_) => "await_spec_change", // user error, don't retry
                Error::Probe(_) => "retry_then_stop",        // signal might recover briefly
                Error::Kube(_) => "requeue",                 // K8s API might recover
                Error::Serialization(_) => "await_spec_change", // code/config bug
            }
        }

        assert_eq!(
            categorize_error(&Error::validation("bad spec")),
            "await_spec_change"
        );
        assert_eq!(categorize_error(&Error::probe("timeout")), "retry_then_stop");
        assert_eq!(
            categorize_error(&Error::serialization("bad yaml")),
            "await_spec_change"
        );
    }
}
