//! Conditioner Operator - pod status conditions driven by external signals

use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use conditioner::controller::{error_policy, reconcile, Context};
use conditioner::crd::PodCondition;

/// Conditioner - drive pod status conditions from external signals
#[derive(Parser, Debug)]
#[command(name = "conditioner", version, about, long_about = None)]
struct Cli {
    /// Generate the CRD manifest and exit
    #[arg(long)]
    crd: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        // Generate CRD YAML
        let crd = serde_yaml::to_string(&PodCondition::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    run_controller().await
}

/// Run the controller: watch PodConditions and route them to workers
async fn run_controller() -> anyhow::Result<()> {
    tracing::info!("Conditioner controller starting...");

    // Create Kubernetes client
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    // Operator installs its own CRD on startup
    ensure_crd_installed(&client).await?;

    let conditions: Api<PodCondition> = Api::all(client.clone());
    let ctx = Arc::new(Context::new(client));

    tracing::info!("Starting PodCondition controller");

    Controller::new(conditions, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(obj) => {
                    tracing::debug!(?obj, "reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("Conditioner controller shutting down");
    Ok(())
}

/// Ensure the PodCondition CRD is installed
///
/// The operator installs its own CRD on startup using server-side apply.
/// This ensures the CRD version always matches the operator version.
async fn ensure_crd_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(conditioner::FIELD_MANAGER).force();

    tracing::info!("Installing PodCondition CRD...");
    let crd_name = format!("podconditions.{}", conditioner::API_GROUP);
    crds.patch(&crd_name, &params, &Patch::Apply(&PodCondition::crd()))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to install PodCondition CRD: {}", e))?;

    tracing::info!("PodCondition CRD installed/updated");
    Ok(())
}
