//! Hetzner Cloud REST client

use async_trait::async_trait;
use hcloud_api::hcloud::{
    ListOpts, LoadBalancer, LoadBalancerCreateOpts, LoadBalancerUpdateOpts, Network,
    NetworkCreateOpts, PlacementGroup, PlacementGroupCreateOpts,
};
use hcloud_api::v1beta1::{LoadBalancerAlgorithm, LoadBalancerServiceSpec};
use hcloud_core::provider::HCloudResult;
use hcloud_core::{ApiToken, HCloudClient, HCloudClientFactory, HCloudError};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{ClientError, Result};
use crate::wire::{
    self, AddServiceRequest, AlgorithmWire, CreateLoadBalancerRequest, CreateNetworkRequest,
    CreatePlacementGroupRequest, LoadBalancerWire, Meta, NetworkWire, PlacementGroupWire,
};

pub const DEFAULT_ENDPOINT: &str = "https://api.hetzner.cloud/v1";

const PER_PAGE: u32 = 50;

/// Client for one Hetzner Cloud project, authenticated with its token
pub struct HCloudRestClient {
    http: Client,
    endpoint: String,
    token: ApiToken,
}

#[derive(Deserialize)]
struct NetworkEnvelope {
    network: NetworkWire,
}

#[derive(Deserialize)]
struct LoadBalancerEnvelope {
    load_balancer: LoadBalancerWire,
}

#[derive(Deserialize)]
struct PlacementGroupEnvelope {
    placement_group: PlacementGroupWire,
}

#[derive(Serialize)]
struct UpdateLoadBalancerRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    labels: Option<&'a hcloud_api::hcloud::Labels>,
}

impl HCloudRestClient {
    pub fn new(http: Client, endpoint: impl Into<String>, token: ApiToken) -> Self {
        Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.endpoint, path))
            .bearer_auth(self.token.expose())
    }

    async fn send(&self, request: RequestBuilder) -> HCloudResult<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| wire::map_transport_error(&e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            trace!("Hetzner API responded {}: {}", status, body);
            return Err(wire::map_error(status, &body));
        }
        Ok(response)
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> HCloudResult<T> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| HCloudError::Transient(format!("invalid response body: {}", e)))
    }

    /// GET a single resource; a 404 is `None`
    async fn get_one<T: DeserializeOwned>(&self, path: &str) -> HCloudResult<Option<T>> {
        match self.json(self.request(Method::GET, path)).await {
            Ok(value) => Ok(Some(value)),
            Err(HCloudError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Follow `meta.pagination.next_page` until every item under `key` is read
    async fn list_all<T: DeserializeOwned>(&self, path: &str, key: &str, opts: &ListOpts) -> HCloudResult<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let request = self
                .request(Method::GET, path)
                .query(&list_query(opts, page));
            let mut body: Value = self.json(request).await?;

            let batch: Vec<T> = serde_json::from_value(body.get_mut(key).map(Value::take).unwrap_or(Value::Null))
                .map_err(|e| HCloudError::Transient(format!("invalid {} list: {}", key, e)))?;
            items.extend(batch);

            let meta: Meta = body
                .get_mut("meta")
                .map(Value::take)
                .and_then(|m| serde_json::from_value(m).ok())
                .unwrap_or_default();
            match meta.pagination.next_page {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }
        debug!("Listed {} {} from {}", items.len(), key, path);
        Ok(items)
    }

    async fn action(&self, path: &str, body: &impl Serialize) -> HCloudResult<()> {
        self.send(self.request(Method::POST, path).json(body))
            .await
            .map(|_| ())
    }

    async fn delete(&self, path: &str) -> HCloudResult<()> {
        self.send(self.request(Method::DELETE, path)).await.map(|_| ())
    }
}

/// Query parameters of one list page
pub fn list_query(opts: &ListOpts, page: u32) -> Vec<(&'static str, String)> {
    let mut query = vec![("page", page.to_string()), ("per_page", PER_PAGE.to_string())];
    if let Some(name) = &opts.name {
        query.push(("name", name.clone()));
    }
    if let Some(selector) = &opts.label_selector {
        query.push(("label_selector", selector.clone()));
    }
    query
}

#[async_trait]
impl HCloudClient for HCloudRestClient {
    async fn get_network(&self, id: i64) -> HCloudResult<Option<Network>> {
        let found: Option<NetworkEnvelope> = self.get_one(&format!("/networks/{}", id)).await?;
        Ok(found.map(|e| e.network.into()))
    }

    async fn list_networks(&self, opts: &ListOpts) -> HCloudResult<Vec<Network>> {
        let items: Vec<NetworkWire> = self.list_all("/networks", "networks", opts).await?;
        Ok(items.into_iter().map(Network::from).collect())
    }

    async fn create_network(&self, opts: &NetworkCreateOpts) -> HCloudResult<Network> {
        let request = self
            .request(Method::POST, "/networks")
            .json(&CreateNetworkRequest::from(opts));
        let created: NetworkEnvelope = self.json(request).await?;
        Ok(created.network.into())
    }

    async fn delete_network(&self, id: i64) -> HCloudResult<()> {
        self.delete(&format!("/networks/{}", id)).await
    }

    async fn get_load_balancer(&self, id: i64) -> HCloudResult<Option<LoadBalancer>> {
        let found: Option<LoadBalancerEnvelope> = self.get_one(&format!("/load_balancers/{}", id)).await?;
        Ok(found.map(|e| e.load_balancer.into()))
    }

    async fn list_load_balancers(&self, opts: &ListOpts) -> HCloudResult<Vec<LoadBalancer>> {
        let items: Vec<LoadBalancerWire> = self.list_all("/load_balancers", "load_balancers", opts).await?;
        Ok(items.into_iter().map(LoadBalancer::from).collect())
    }

    async fn create_load_balancer(&self, opts: &LoadBalancerCreateOpts) -> HCloudResult<LoadBalancer> {
        let request = self
            .request(Method::POST, "/load_balancers")
            .json(&CreateLoadBalancerRequest::from(opts));
        let created: LoadBalancerEnvelope = self.json(request).await?;
        Ok(created.load_balancer.into())
    }

    async fn update_load_balancer(&self, id: i64, opts: &LoadBalancerUpdateOpts) -> HCloudResult<LoadBalancer> {
        let body = UpdateLoadBalancerRequest {
            name: opts.name.as_deref(),
            labels: opts.labels.as_ref(),
        };
        let request = self
            .request(Method::PUT, &format!("/load_balancers/{}", id))
            .json(&body);
        let updated: LoadBalancerEnvelope = self.json(request).await?;
        Ok(updated.load_balancer.into())
    }

    async fn change_load_balancer_type(&self, id: i64, load_balancer_type: &str) -> HCloudResult<()> {
        self.action(
            &format!("/load_balancers/{}/actions/change_type", id),
            &json!({ "load_balancer_type": load_balancer_type }),
        )
        .await
    }

    async fn change_load_balancer_algorithm(&self, id: i64, algorithm: LoadBalancerAlgorithm) -> HCloudResult<()> {
        self.action(
            &format!("/load_balancers/{}/actions/change_algorithm", id),
            &AlgorithmWire {
                type_: algorithm.to_string(),
            },
        )
        .await
    }

    async fn add_load_balancer_service(&self, id: i64, service: &LoadBalancerServiceSpec) -> HCloudResult<()> {
        self.action(
            &format!("/load_balancers/{}/actions/add_service", id),
            &AddServiceRequest::from(service),
        )
        .await
    }

    async fn delete_load_balancer_service(&self, id: i64, listen_port: u16) -> HCloudResult<()> {
        self.action(
            &format!("/load_balancers/{}/actions/delete_service", id),
            &json!({ "listen_port": listen_port }),
        )
        .await
    }

    async fn delete_load_balancer(&self, id: i64) -> HCloudResult<()> {
        self.delete(&format!("/load_balancers/{}", id)).await
    }

    async fn list_placement_groups(&self, opts: &ListOpts) -> HCloudResult<Vec<PlacementGroup>> {
        let items: Vec<PlacementGroupWire> = self
            .list_all("/placement_groups", "placement_groups", opts)
            .await?;
        Ok(items.into_iter().map(PlacementGroup::from).collect())
    }

    async fn create_placement_group(&self, opts: &PlacementGroupCreateOpts) -> HCloudResult<PlacementGroup> {
        let request = self
            .request(Method::POST, "/placement_groups")
            .json(&CreatePlacementGroupRequest::from(opts));
        let created: PlacementGroupEnvelope = self.json(request).await?;
        Ok(created.placement_group.into())
    }

    async fn delete_placement_group(&self, id: i64) -> HCloudResult<()> {
        self.delete(&format!("/placement_groups/{}", id)).await
    }
}

/// Hands out REST clients sharing one connection pool
#[derive(Clone)]
pub struct RestClientFactory {
    http: Client,
    endpoint: String,
}

impl RestClientFactory {
    /// `request_timeout` bounds each HTTP exchange at the transport level
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let endpoint = endpoint.into();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(ClientError::InvalidEndpoint(endpoint));
        }
        let http = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("hcloud-cluster-controller/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, endpoint })
    }
}

impl HCloudClientFactory for RestClientFactory {
    fn new_client(&self, token: &ApiToken) -> Arc<dyn HCloudClient> {
        Arc::new(HCloudRestClient::new(
            self.http.clone(),
            self.endpoint.clone(),
            token.clone(),
        ))
    }
}
