//! PodCondition controller implementation
//!
//! The controller is the dispatch half of the system: it watches
//! PodCondition resources and routes every observed create/update/delete
//! into the worker registry. Declaration events arrive serially; the
//! polling itself happens in the workers, so a successful reconcile ends
//! with `Action::await_change()` rather than a requeue.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, warn};

#[cfg(test)]
use mockall::automock;

use crate::conditions::{PodClient, PodClientImpl};
use crate::crd::{PodCondition, PodConditionPhase, PodConditionStatus};
use crate::worker::WorkerRegistry;
use crate::{Error, WORKER_FINALIZER};

/// Trait abstracting Kubernetes client operations for PodCondition
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PodConditionClient: Send + Sync {
    /// Patch the status of a PodCondition
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &PodConditionStatus,
    ) -> Result<(), Error>;

    /// Add the worker finalizer to a PodCondition
    async fn add_finalizer(&self, namespace: &str, name: &str) -> Result<(), Error>;

    /// Remove the worker finalizer from a PodCondition
    async fn remove_finalizer(&self, namespace: &str, name: &str) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct PodConditionClientImpl {
    client: Client,
}

impl PodConditionClientImpl {
    /// Create a new PodConditionClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<PodCondition> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl PodConditionClient for PodConditionClientImpl {
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &PodConditionStatus,
    ) -> Result<(), Error> {
        let status_patch = serde_json::json!({
            "status": status
        });

        self.api(namespace)
            .patch_status(
                name,
                &PatchParams::apply(crate::FIELD_MANAGER),
                &Patch::Merge(&status_patch),
            )
            .await?;

        Ok(())
    }

    async fn add_finalizer(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api = self.api(namespace);
        let current = api.get(name).await?;

        let mut finalizers = current.metadata.finalizers.unwrap_or_default();
        if finalizers.iter().any(|f| f == WORKER_FINALIZER) {
            return Ok(());
        }
        finalizers.push(WORKER_FINALIZER.to_string());

        let patch = serde_json::json!({
            "metadata": { "finalizers": finalizers }
        });
        api.patch(
            name,
            &PatchParams::apply(crate::FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;

        Ok(())
    }

    async fn remove_finalizer(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api = self.api(namespace);
        let current = api.get(name).await?;

        let finalizers: Vec<String> = current
            .metadata
            .finalizers
            .unwrap_or_default()
            .into_iter()
            .filter(|f| f != WORKER_FINALIZER)
            .collect();

        let patch = serde_json::json!({
            "metadata": { "finalizers": finalizers }
        });
        api.patch(
            name,
            &PatchParams::apply(crate::FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;

        Ok(())
    }
}

/// Controller context containing shared state and clients
///
/// Shared across all reconciliation calls; holds the worker registry and
/// the clients that are expensive to create.
pub struct Context {
    /// Client for pod listing and status writes (trait object for testability)
    pub pods: Arc<dyn PodClient>,
    /// Client for PodCondition status and finalizer writes
    pub declarations: Arc<dyn PodConditionClient>,
    /// Registry owning all worker loops
    pub registry: WorkerRegistry,
}

impl Context {
    /// Create a new controller context with the given Kubernetes client
    pub fn new(client: Client) -> Self {
        Self {
            pods: Arc::new(PodClientImpl::new(client.clone())),
            declarations: Arc::new(PodConditionClientImpl::new(client)),
            registry: WorkerRegistry::new(),
        }
    }

    /// Create a context for testing with custom mock clients
    #[cfg(test)]
    pub fn for_testing(
        pods: Arc<dyn PodClient>,
        declarations: Arc<dyn PodConditionClient>,
    ) -> Self {
        Self {
            pods,
            declarations,
            registry: WorkerRegistry::new(),
        }
    }
}

/// Reconcile a PodCondition resource
///
/// Routes the declaration event into the worker registry: first observation
/// starts a worker, a spec change restarts it, deletion tears it down. The
/// registry owns all polling; this function never evaluates a signal itself.
pub async fn reconcile(condition: Arc<PodCondition>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = condition.name_any();
    let namespace = condition
        .namespace()
        .unwrap_or_else(|| "default".to_string());
    info!(condition = %name, namespace = %namespace, "reconciling pod condition");

    // Deletion teardown is first-class: stop the loop, drop the registry
    // entry, then release the resource by clearing the finalizer.
    if condition.meta().deletion_timestamp.is_some() {
        if ctx.registry.remove(&namespace, &name) {
            info!(condition = %name, "stopped worker for deleted pod condition");
        } else {
            debug!(condition = %name, "no worker registered for deleted pod condition");
        }

        if has_finalizer(&condition) {
            ctx.declarations.remove_finalizer(&namespace, &name).await?;
        }
        return Ok(Action::await_change());
    }

    // The finalizer must be in place before any worker starts, otherwise a
    // deletion could race past us and leak the loop.
    if !has_finalizer(&condition) {
        ctx.declarations.add_finalizer(&namespace, &name).await?;
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    // Validate the spec
    if let Err(e) = condition.spec.validate() {
        warn!(condition = %name, error = %e, "pod condition validation failed");
        update_status_failed(&condition, &ctx, &e.to_string()).await?;
        // Don't requeue for validation errors - they require spec changes
        return Ok(Action::await_change());
    }

    match ctx
        .registry
        .apply(&namespace, &name, &condition.spec, ctx.pods.clone())
    {
        Ok(applied) => {
            debug!(condition = %name, outcome = ?applied, "worker registry updated");
            update_status_running(&condition, &ctx).await?;
            Ok(Action::await_change())
        }
        Err(e) => {
            // No automatic retry of worker creation: the declaration stays
            // inert until the store re-delivers it.
            warn!(condition = %name, error = %e, "could not start worker for pod condition");
            update_status_failed(&condition, &ctx, &e.to_string()).await?;
            Ok(Action::await_change())
        }
    }
}

/// Error policy for the controller
///
/// Called when reconciliation fails (kube API errors on status or finalizer
/// writes). Requeues after a short delay.
pub fn error_policy(condition: Arc<PodCondition>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        condition = %condition.name_any(),
        "reconciliation failed"
    );

    Action::requeue(Duration::from_secs(5))
}

fn has_finalizer(condition: &PodCondition) -> bool {
    condition
        .meta()
        .finalizers
        .as_ref()
        .map(|f| f.iter().any(|name| name == WORKER_FINALIZER))
        .unwrap_or(false)
}

/// Update status to Running
async fn update_status_running(condition: &PodCondition, ctx: &Context) -> Result<(), Error> {
    let status = PodConditionStatus::with_phase(PodConditionPhase::Running);
    patch_status(condition, ctx, &status).await
}

/// Update status to Failed with an explanation
async fn update_status_failed(
    condition: &PodCondition,
    ctx: &Context,
    message: &str,
) -> Result<(), Error> {
    let status = PodConditionStatus::with_phase(PodConditionPhase::Failed).message(message);
    patch_status(condition, ctx, &status).await
}

async fn patch_status(
    condition: &PodCondition,
    ctx: &Context,
    status: &PodConditionStatus,
) -> Result<(), Error> {
    let namespace = condition
        .namespace()
        .unwrap_or_else(|| "default".to_string());
    ctx.declarations
        .patch_status(&namespace, &condition.name_any(), status)
        .await
}
