//! Controller implementation for the PodCondition CRD
//!
//! This module contains the reconciliation logic routing declaration events
//! into the worker registry, following the Kubernetes controller pattern.

mod pod_condition;

pub use pod_condition::{
    error_policy, reconcile, Context, PodConditionClient, PodConditionClientImpl,
};
