//! HetznerCluster objects in the Kubernetes API

use async_trait::async_trait;
use hcloud_api::HetznerCluster;
use hcloud_api::v1beta1::HetznerClusterStatus;
use hcloud_core::store::CLUSTER_FINALIZER;
use hcloud_core::{ClusterIdentity, ClusterObject, ClusterStore, StatusUpdate, StoreError};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use serde_json::json;
use tracing::debug;

/// Cluster store backed by the HetznerCluster custom resource.
///
/// Versioned writes are JSON merge patches carrying
/// `metadata.resourceVersion`, which the API server rejects with 409 once
/// the object has moved on.
#[derive(Clone)]
pub struct KubeClusterStore {
    client: Client,
}

impl KubeClusterStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, cluster: &ClusterIdentity) -> Api<HetznerCluster> {
        Api::namespaced(self.client.clone(), &cluster.namespace)
    }
}

/// Convert a fetched object into the store's view of it
pub fn to_cluster_object(identity: ClusterIdentity, object: HetznerCluster) -> ClusterObject {
    ClusterObject {
        identity,
        spec: object.spec,
        status: object.status.unwrap_or_default(),
        resource_version: object.metadata.resource_version.unwrap_or_default(),
        deleting: object.metadata.deletion_timestamp.is_some(),
        finalizers: object.metadata.finalizers.unwrap_or_default(),
    }
}

/// Finalizer list after adding or removing the cluster finalizer
pub fn with_finalizer(existing: &[String], present: bool) -> Vec<String> {
    let mut finalizers: Vec<String> = existing
        .iter()
        .filter(|f| f.as_str() != CLUSTER_FINALIZER)
        .cloned()
        .collect();
    if present {
        finalizers.push(CLUSTER_FINALIZER.to_string());
    }
    finalizers
}

fn patch_outcome(result: Result<HetznerCluster, kube::Error>) -> Result<StatusUpdate, StoreError> {
    match result {
        Ok(object) => Ok(StatusUpdate::Applied {
            resource_version: object.metadata.resource_version.unwrap_or_default(),
        }),
        Err(kube::Error::Api(response)) if response.code == 409 => Ok(StatusUpdate::Conflict),
        Err(e) => Err(StoreError::Backend(e.to_string())),
    }
}

#[async_trait]
impl ClusterStore for KubeClusterStore {
    async fn get(&self, cluster: &ClusterIdentity) -> Result<Option<ClusterObject>, StoreError> {
        let object = self
            .api(cluster)
            .get_opt(&cluster.name)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(object.map(|o| to_cluster_object(cluster.clone(), o)))
    }

    async fn compare_and_swap_status(
        &self,
        cluster: &ClusterIdentity,
        expected_version: &str,
        status: &HetznerClusterStatus,
    ) -> Result<StatusUpdate, StoreError> {
        let patch = json!({
            "metadata": { "resourceVersion": expected_version },
            "status": status,
        });
        let result = self
            .api(cluster)
            .patch_status(&cluster.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await;
        let outcome = patch_outcome(result)?;
        if outcome == StatusUpdate::Conflict {
            debug!("Status of {} changed since version {}", cluster, expected_version);
        }
        Ok(outcome)
    }

    async fn set_finalizer(
        &self,
        cluster: &ClusterIdentity,
        expected_version: &str,
        present: bool,
    ) -> Result<StatusUpdate, StoreError> {
        let api = self.api(cluster);
        let current = api
            .get_opt(&cluster.name)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .ok_or_else(|| StoreError::Backend(format!("{} not found", cluster)))?;
        if current.metadata.resource_version.as_deref() != Some(expected_version) {
            return Ok(StatusUpdate::Conflict);
        }

        let existing = current.metadata.finalizers.unwrap_or_default();
        let patch = json!({
            "metadata": {
                "resourceVersion": expected_version,
                "finalizers": with_finalizer(&existing, present),
            }
        });
        let result = api
            .patch(&cluster.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await;
        match result {
            // The object is gone once the last finalizer of a deleted object is removed
            Err(kube::Error::Api(response)) if response.code == 404 && !present => {
                Ok(StatusUpdate::Applied {
                    resource_version: String::new(),
                })
            }
            other => patch_outcome(other),
        }
    }
}
