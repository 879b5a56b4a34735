//! Collaborators owning the cluster object and its credentials

use async_trait::async_trait;
use hcloud_api::v1beta1::{HetznerClusterSpec, HetznerClusterStatus, HetznerSecretRef};
use std::fmt;
use thiserror::Error;

use crate::ownership::ClusterIdentity;

/// Finalizer protecting a cluster until its owned resources are gone
pub const CLUSTER_FINALIZER: &str = "infrastructure.cluster.x-k8s.io/hetznercluster";

/// A cluster object as read from the store
#[derive(Clone, Debug)]
pub struct ClusterObject {
    pub identity: ClusterIdentity,
    pub spec: HetznerClusterSpec,
    pub status: HetznerClusterStatus,
    /// Opaque version used for optimistic concurrency
    pub resource_version: String,
    /// Deletion has been requested
    pub deleting: bool,
    pub finalizers: Vec<String>,
}

impl ClusterObject {
    pub fn has_finalizer(&self) -> bool {
        self.finalizers.iter().any(|f| f == CLUSTER_FINALIZER)
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("cluster store backend error: {0}")]
    Backend(String),
}

/// Outcome of a versioned write
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusUpdate {
    Applied { resource_version: String },
    Conflict,
}

/// Declarative store holding cluster objects
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Read the current object, `None` once it is gone
    async fn get(&self, cluster: &ClusterIdentity) -> Result<Option<ClusterObject>, StoreError>;

    /// Replace the status if the object is still at `expected_version`
    async fn compare_and_swap_status(
        &self,
        cluster: &ClusterIdentity,
        expected_version: &str,
        status: &HetznerClusterStatus,
    ) -> Result<StatusUpdate, StoreError>;

    /// Add or remove the cluster finalizer if the object is still at `expected_version`
    async fn set_finalizer(
        &self,
        cluster: &ClusterIdentity,
        expected_version: &str,
        present: bool,
    ) -> Result<StatusUpdate, StoreError>;
}

/// Bearer token for the Hetzner Cloud API
#[derive(Clone, PartialEq, Eq)]
pub struct ApiToken(String);

impl ApiToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken(***)")
    }
}

/// Why no token could be resolved
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("secret {0} not found")]
    NotFound(String),

    #[error("secret {secret} could not be read: {message}")]
    Unreachable { secret: String, message: String },

    #[error("secret {secret} has no key {key}")]
    MissingKey { secret: String, key: String },

    #[error("key {key} in secret {secret} is empty")]
    EmptyValue { secret: String, key: String },
}

/// Resolves the API token referenced by a cluster
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn resolve(
        &self,
        namespace: &str,
        secret: &HetznerSecretRef,
    ) -> Result<ApiToken, CredentialError>;
}
