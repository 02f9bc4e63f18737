//! Conditioner - Kubernetes operator that drives pod status conditions from
//! external signals
//!
//! A `PodCondition` resource names a condition, selects a set of pods by
//! label, points at a boolean signal (e.g. a Prometheus rule) and sets a
//! polling interval. For every live `PodCondition` the operator runs a
//! dedicated worker loop that evaluates the signal on each tick and writes
//! the verdict into the `status.conditions` of every matching pod.
//!
//! # Architecture
//!
//! - The controller watches `PodCondition` resources and routes each event
//!   to the worker registry: create a worker, restart it when the spec
//!   changed, tear it down when the resource is deleted.
//! - Each worker owns one polling loop. A tick evaluates the probe and, on
//!   success, syncs the verdict into matching pods. Probes that keep failing
//!   after retries terminate their worker.
//! - Pod writes are best-effort: a failed status update on one pod is logged
//!   and never blocks the rest of the batch.
//!
//! # Modules
//!
//! - [`crd`] - PodCondition Custom Resource Definition
//! - [`controller`] - Kubernetes controller reconciliation logic
//! - [`worker`] - per-condition polling loops and the worker registry
//! - [`conditions`] - pod condition entry computation and status sync
//! - [`probe`] - boolean signal sources (static, Prometheus)
//! - [`retry`] - backoff helper for transient failures
//! - [`error`] - error types for the operator

#![deny(missing_docs)]

pub mod conditions;
pub mod controller;
pub mod crd;
pub mod error;
pub mod probe;
pub mod retry;
pub mod worker;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group for the PodCondition CRD
pub const API_GROUP: &str = "conditioner.dev";

/// Finalizer that ties a PodCondition to its running worker
///
/// Added on first reconcile so deletion is observed and the worker loop is
/// stopped before the resource goes away.
pub const WORKER_FINALIZER: &str = "conditioner.dev/worker";

/// Field manager name used for server-side apply patches
pub const FIELD_MANAGER: &str = "conditioner-controller";

/// How many times a probe evaluation is attempted per tick before the
/// worker gives up and stops
pub const DEFAULT_EVALUATION_ATTEMPTS: u32 = 3;
