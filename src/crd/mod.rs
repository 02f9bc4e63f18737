//! Custom Resource Definitions for Conditioner
//!
//! This module contains the CRD definitions used by the Conditioner operator.

mod pod_condition;

pub use pod_condition::{
    LabelSelector, PodCondition, PodConditionPhase, PodConditionSpec, PodConditionStatus,
    PrometheusSourceSpec,
};
