//! HetznerCluster controller driving the reconciliation engine

use futures::StreamExt;
use hcloud_api::HetznerCluster;
use hcloud_core::{CancelSignal, ClusterIdentity, CoreError, Engine, ReconcileOutcome};
use kube::{Api, Client, ResourceExt};
use kube_runtime::{controller::Action, watcher, Controller};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::metrics::ControllerMetrics;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("HetznerCluster {0} has no namespace")]
    MissingNamespace(String),

    #[error(transparent)]
    Fatal(#[from] CoreError),
}

struct ControllerContext {
    engine: Engine,
    metrics: ControllerMetrics,
    deadline: Duration,
}

pub struct HetznerClusterController {
    client: Client,
    namespace: Option<String>,
    context: Arc<ControllerContext>,
}

impl HetznerClusterController {
    pub fn new(
        client: Client,
        namespace: Option<String>,
        engine: Engine,
        metrics: ControllerMetrics,
        deadline: Duration,
    ) -> Self {
        Self {
            client,
            namespace,
            context: Arc::new(ControllerContext {
                engine,
                metrics,
                deadline,
            }),
        }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let clusters: Api<HetznerCluster> = match &self.namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        };
        info!(
            "Watching HetznerClusters in {}",
            self.namespace.as_deref().unwrap_or("all namespaces")
        );

        let mut stream = Controller::new(clusters, watcher::Config::default())
            .run(reconcile, error_policy, self.context.clone())
            .boxed();

        while let Some(item) = stream.next().await {
            match item {
                Ok((object, action)) => debug!("Reconciled {}, next {:?}", object, action),
                Err(e) => warn!("Reconciliation stream error: {}", e),
            }
        }

        Ok(())
    }
}

/// Identity of the cluster an event refers to
pub fn cluster_identity(cluster: &HetznerCluster) -> Result<ClusterIdentity, ReconcileError> {
    let name = cluster.name_any();
    let namespace = cluster
        .namespace()
        .ok_or_else(|| ReconcileError::MissingNamespace(name.clone()))?;
    Ok(ClusterIdentity::new(namespace, name))
}

/// Translate an engine outcome into the controller's requeue decision
pub fn to_action(outcome: ReconcileOutcome, resync: Duration) -> Result<Action, ReconcileError> {
    match outcome {
        ReconcileOutcome::Done => Ok(Action::requeue(resync)),
        ReconcileOutcome::RetryAfter { after, reason } => {
            debug!("Retrying in {:?} ({})", after, reason);
            Ok(Action::requeue(after))
        }
        ReconcileOutcome::Fatal(e) => Err(e.into()),
    }
}

async fn reconcile(cluster: Arc<HetznerCluster>, ctx: Arc<ControllerContext>) -> Result<Action, ReconcileError> {
    let identity = cluster_identity(&cluster)?;
    let cancel = CancelSignal::never().with_deadline(Instant::now() + ctx.deadline);

    let started = Instant::now();
    let outcome = ctx.engine.reconcile(&identity, &cancel).await;
    ctx.metrics.observe(&outcome, started.elapsed());

    to_action(outcome, ctx.engine.config().resync_interval)
}

fn error_policy(cluster: Arc<HetznerCluster>, error: &ReconcileError, ctx: Arc<ControllerContext>) -> Action {
    error!("Error reconciling HetznerCluster {}: {}", cluster.name_any(), error);
    Action::requeue(ctx.engine.config().transient_requeue)
}
