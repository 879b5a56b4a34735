//! Hetzner Cloud API surface used by the reconcilers

use async_trait::async_trait;
use hcloud_api::hcloud::{
    ListOpts, LoadBalancer, LoadBalancerCreateOpts, LoadBalancerUpdateOpts, Network,
    NetworkCreateOpts, PlacementGroup, PlacementGroupCreateOpts,
};
use hcloud_api::v1beta1::{LoadBalancerAlgorithm, LoadBalancerServiceSpec};
use std::sync::Arc;

use crate::error::HCloudError;
use crate::store::ApiToken;

pub type HCloudResult<T> = std::result::Result<T, HCloudError>;

/// Client for one Hetzner Cloud project
///
/// `get_*` calls return `Ok(None)` for unknown IDs; every other call reports
/// a missing resource as [`HCloudError::NotFound`].
#[async_trait]
pub trait HCloudClient: Send + Sync {
    async fn get_network(&self, id: i64) -> HCloudResult<Option<Network>>;
    async fn list_networks(&self, opts: &ListOpts) -> HCloudResult<Vec<Network>>;
    async fn create_network(&self, opts: &NetworkCreateOpts) -> HCloudResult<Network>;
    async fn delete_network(&self, id: i64) -> HCloudResult<()>;

    async fn get_load_balancer(&self, id: i64) -> HCloudResult<Option<LoadBalancer>>;
    async fn list_load_balancers(&self, opts: &ListOpts) -> HCloudResult<Vec<LoadBalancer>>;
    async fn create_load_balancer(&self, opts: &LoadBalancerCreateOpts)
        -> HCloudResult<LoadBalancer>;
    async fn update_load_balancer(
        &self,
        id: i64,
        opts: &LoadBalancerUpdateOpts,
    ) -> HCloudResult<LoadBalancer>;
    async fn change_load_balancer_type(&self, id: i64, load_balancer_type: &str)
        -> HCloudResult<()>;
    async fn change_load_balancer_algorithm(
        &self,
        id: i64,
        algorithm: LoadBalancerAlgorithm,
    ) -> HCloudResult<()>;
    async fn add_load_balancer_service(
        &self,
        id: i64,
        service: &LoadBalancerServiceSpec,
    ) -> HCloudResult<()>;
    async fn delete_load_balancer_service(&self, id: i64, listen_port: u16) -> HCloudResult<()>;
    async fn delete_load_balancer(&self, id: i64) -> HCloudResult<()>;

    async fn list_placement_groups(&self, opts: &ListOpts) -> HCloudResult<Vec<PlacementGroup>>;
    async fn create_placement_group(
        &self,
        opts: &PlacementGroupCreateOpts,
    ) -> HCloudResult<PlacementGroup>;
    async fn delete_placement_group(&self, id: i64) -> HCloudResult<()>;
}

/// Builds a client for a resolved token
pub trait HCloudClientFactory: Send + Sync {
    fn new_client(&self, token: &ApiToken) -> Arc<dyn HCloudClient>;
}
