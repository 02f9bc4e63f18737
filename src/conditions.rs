//! Pod condition computation and status sync
//!
//! One sync pass takes a verdict and pushes it into the status of every pod
//! matching a selector. The membership snapshot is taken at call time; pods
//! that enter or leave the match set between ticks are picked up on the
//! next pass. Writes are best-effort per pod: a failed update is logged and
//! the rest of the batch continues, while a failed listing aborts the whole
//! pass before any pod is touched.
//!
//! Two declarations whose selectors overlap can drive the same condition
//! type on the same pod. Their writes race last-writer-wins; no precedence
//! between declarations is defined.

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::{Pod, PodCondition};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::{Client, ResourceExt};
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use crate::crd::LabelSelector;
use crate::Error;

/// Condition status string for a boolean verdict
///
/// Pod conditions are tri-state in the API (`True`/`False`/`Unknown`); this
/// operator only ever drives the first two.
pub fn condition_status(verdict: bool) -> &'static str {
    if verdict {
        "True"
    } else {
        "False"
    }
}

/// Trait abstracting the pod status store
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PodClient: Send + Sync {
    /// List all pods matching the given label selector, across namespaces
    async fn list_pods(&self, selector: &LabelSelector) -> Result<Vec<Pod>, Error>;

    /// Write one condition entry into a pod's status
    ///
    /// The write replaces the entry of the same type if present, appends
    /// otherwise, and leaves every other condition entry alone.
    async fn patch_condition(
        &self,
        namespace: &str,
        name: &str,
        condition: &PodCondition,
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct PodClientImpl {
    client: Client,
}

impl PodClientImpl {
    /// Create a new PodClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PodClient for PodClientImpl {
    async fn list_pods(&self, selector: &LabelSelector) -> Result<Vec<Pod>, Error> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let params = ListParams::default().labels(&selector.to_query());
        let pods = api.list(&params).await?;
        Ok(pods.items)
    }

    async fn patch_condition(
        &self,
        namespace: &str,
        name: &str,
        condition: &PodCondition,
    ) -> Result<(), Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);

        // Strategic merge keys pod conditions by type, so this touches only
        // the one entry this worker owns.
        let patch = serde_json::json!({
            "status": {
                "conditions": [condition]
            }
        });

        api.patch_status(
            name,
            &PatchParams::apply(crate::FIELD_MANAGER),
            &Patch::Strategic(&patch),
        )
        .await?;

        Ok(())
    }
}

/// Compute the next condition entry for one pod
///
/// Timestamp semantics: `lastProbeTime` always moves to `now`;
/// `lastTransitionTime` moves only when the status value flips, and on the
/// first observation both are equal.
pub fn next_condition(
    existing: &[PodCondition],
    condition_type: &str,
    verdict: bool,
    now: &Time,
) -> PodCondition {
    let status = condition_status(verdict);

    match existing.iter().find(|c| c.type_ == condition_type) {
        Some(current) => {
            let transitioned = current.status != status;
            PodCondition {
                type_: condition_type.to_string(),
                status: status.to_string(),
                last_probe_time: Some(now.clone()),
                last_transition_time: if transitioned {
                    Some(now.clone())
                } else {
                    current.last_transition_time.clone()
                },
                ..Default::default()
            }
        }
        None => PodCondition {
            type_: condition_type.to_string(),
            status: status.to_string(),
            last_probe_time: Some(now.clone()),
            last_transition_time: Some(now.clone()),
            ..Default::default()
        },
    }
}

/// Push one verdict into every pod currently matching the selector
///
/// Write failures on individual pods are logged and skipped; only a listing
/// failure aborts the pass.
pub async fn sync_condition(
    pods: &dyn PodClient,
    condition_type: &str,
    selector: &LabelSelector,
    verdict: bool,
) -> Result<(), Error> {
    let matched = pods.list_pods(selector).await?;
    let now = Time(Utc::now());

    debug!(
        condition = %condition_type,
        verdict = verdict,
        pods = matched.len(),
        "syncing condition into matching pods"
    );

    for pod in &matched {
        let name = pod.name_any();
        let namespace = pod.namespace().unwrap_or_else(|| "default".to_string());

        let existing = pod
            .status
            .as_ref()
            .and_then(|s| s.conditions.as_deref())
            .unwrap_or(&[]);

        let entry = next_condition(existing, condition_type, verdict, &now);

        // Written even when nothing changed, to refresh lastProbeTime
        if let Err(e) = pods.patch_condition(&namespace, &name, &entry).await {
            warn!(
                pod = %name,
                namespace = %namespace,
                condition = %condition_type,
                error = %e,
                "failed to update pod condition"
            );
        }
    }

    Ok(())
}
