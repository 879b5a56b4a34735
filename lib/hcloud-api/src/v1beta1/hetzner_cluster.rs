use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::conditions::Condition;

/// HetznerCluster describes the shared Hetzner Cloud infrastructure a set of
/// cluster nodes attaches to: a private network, the control-plane load
/// balancer and a list of placement groups.
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1beta1",
    kind = "HetznerCluster",
    plural = "hetznerclusters",
    namespaced,
    derive = "Default",
    status = "HetznerClusterStatus",
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Network","type":"integer","jsonPath":".status.network.id"}"#,
    printcolumn = r#"{"name":"LoadBalancer","type":"integer","jsonPath":".status.controlPlaneLoadBalancer.id"}"#,
)]
#[serde(rename_all = "camelCase")]
pub struct HetznerClusterSpec {
    /// Private network of the cluster
    #[serde(default)]
    pub hcloud_network: HCloudNetworkSpec,

    /// Load balancer in front of the control plane
    #[serde(default)]
    pub control_plane_load_balancer: LoadBalancerSpec,

    /// Anti-affinity placement groups, unique by name
    #[serde(default)]
    pub hcloud_placement_groups: Vec<HCloudPlacementGroupSpec>,

    /// Externally supplied control-plane endpoint, used when the load
    /// balancer is disabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_endpoint: Option<ApiEndpoint>,

    /// Secret holding the Hetzner Cloud API token
    pub hetzner_secret_ref: HetznerSecretRef,
}

/// Reference to the secret holding the API token
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct HetznerSecretRef {
    /// Name of the secret in the cluster's namespace
    pub name: String,

    /// Key inside the secret data
    #[serde(default = "default_token_key")]
    pub key: String,
}

impl Default for HetznerSecretRef {
    fn default() -> Self {
        Self {
            name: "hetzner".to_string(),
            key: default_token_key(),
        }
    }
}

/// Desired private network
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HCloudNetworkSpec {
    /// Whether the cluster uses a private network at all
    #[serde(default)]
    pub enabled: bool,

    /// Attach to an existing network by ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Attach to (or create) a network with this name; defaults to the cluster name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// IP range of the network
    #[serde(default = "default_cidr_block")]
    pub cidr_block: String,

    /// IP range of the cloud subnet inside the network
    #[serde(default = "default_subnet_cidr_block")]
    pub subnet_cidr_block: String,

    /// Network zone of the subnet (e.g. "eu-central")
    #[serde(default = "default_network_zone")]
    pub network_zone: String,
}

impl Default for HCloudNetworkSpec {
    fn default() -> Self {
        Self {
            enabled: false,
            id: None,
            name: None,
            cidr_block: default_cidr_block(),
            subnet_cidr_block: default_subnet_cidr_block(),
            network_zone: default_network_zone(),
        }
    }
}

/// Desired control-plane load balancer
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerSpec {
    /// Whether a load balancer is managed for the control plane
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Use an existing load balancer by ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Name of the load balancer; defaults to "<cluster>-kube-apiserver"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Load balancer type (e.g. "lb11")
    #[serde(rename = "type", default = "default_load_balancer_type")]
    pub type_: String,

    /// Balancing algorithm
    #[serde(default)]
    pub algorithm: LoadBalancerAlgorithm,

    /// Location the load balancer is created in (e.g. "fsn1")
    #[serde(default = "default_region")]
    pub region: String,

    /// Port the control-plane endpoint is published on
    #[serde(default = "default_api_server_port")]
    pub port: u16,

    /// Additional services exposed through the load balancer
    #[serde(default)]
    pub extra_services: Vec<LoadBalancerServiceSpec>,
}

impl Default for LoadBalancerSpec {
    fn default() -> Self {
        Self {
            enabled: true,
            id: None,
            name: None,
            type_: default_load_balancer_type(),
            algorithm: LoadBalancerAlgorithm::default(),
            region: default_region(),
            port: default_api_server_port(),
            extra_services: Vec::new(),
        }
    }
}

/// A service on a load balancer, identified by its ports and protocol
#[derive(
    Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerServiceSpec {
    /// Port the load balancer listens on
    pub listen_port: u16,

    /// Port traffic is forwarded to on the targets
    pub destination_port: u16,

    /// Protocol of the service
    #[serde(default)]
    pub protocol: LoadBalancerProtocol,
}

/// Load balancer service protocol
#[derive(
    Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash,
    PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum LoadBalancerProtocol {
    #[default]
    Tcp,
    Http,
    Https,
}

impl fmt::Display for LoadBalancerProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Http => write!(f, "http"),
            Self::Https => write!(f, "https"),
        }
    }
}

/// Load balancing algorithm
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancerAlgorithm {
    /// Round-robin distribution
    #[default]
    RoundRobin,
    /// Send to the target with the fewest open connections
    LeastConnections,
}

impl fmt::Display for LoadBalancerAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoundRobin => write!(f, "round_robin"),
            Self::LeastConnections => write!(f, "least_connections"),
        }
    }
}

/// Error returned when parsing an enum from its wire name
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for LoadBalancerAlgorithm {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round_robin" => Ok(Self::RoundRobin),
            "least_connections" => Ok(Self::LeastConnections),
            _ => Err(ParseError {
                kind: "load balancer algorithm",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for LoadBalancerProtocol {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            _ => Err(ParseError {
                kind: "load balancer protocol",
                value: s.to_string(),
            }),
        }
    }
}

/// Desired placement group
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct HCloudPlacementGroupSpec {
    /// Name of the group, unique within the cluster
    pub name: String,

    /// Placement group type (only "spread" exists today)
    #[serde(rename = "type", default = "default_placement_group_type")]
    pub type_: String,
}

/// Host and port of the control-plane API server
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ApiEndpoint {
    pub host: String,
    pub port: u16,
}

impl ApiEndpoint {
    /// An endpoint is usable once both host and port are set
    pub fn is_valid(&self) -> bool {
        !self.host.is_empty() && self.port != 0
    }
}

impl fmt::Display for ApiEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Status of a HetznerCluster
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HetznerClusterStatus {
    /// Whether all applicable infrastructure is in place
    #[serde(default)]
    pub ready: bool,

    /// Network the cluster is attached to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkStatus>,

    /// Control-plane load balancer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_load_balancer: Option<LoadBalancerStatus>,

    /// Placement groups, by name
    #[serde(default)]
    pub hcloud_placement_groups: Vec<PlacementGroupStatus>,

    /// Endpoint under which the control plane is reachable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_endpoint: Option<ApiEndpoint>,

    /// Conditions describing the status
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// How the cluster relates to its network
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum NetworkAttachment {
    /// Created or adopted by this cluster; deleted with it
    Owned,
    /// Pre-existing network used read-only
    Attached,
}

/// Observed network
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    pub id: i64,
    pub name: String,
    pub ip_range: String,
    pub attachment: NetworkAttachment,
}

/// Observed load balancer
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerStatus {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub algorithm: LoadBalancerAlgorithm,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<String>,
    #[serde(default)]
    pub services: Vec<LoadBalancerServiceSpec>,
}

/// Observed placement group
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PlacementGroupStatus {
    pub name: String,
    pub id: i64,
    #[serde(rename = "type")]
    pub type_: String,
}

// Default values
fn default_true() -> bool {
    true
}

fn default_token_key() -> String {
    "hcloud".to_string()
}

fn default_cidr_block() -> String {
    "10.0.0.0/16".to_string()
}

fn default_subnet_cidr_block() -> String {
    "10.0.0.0/24".to_string()
}

fn default_network_zone() -> String {
    "eu-central".to_string()
}

fn default_load_balancer_type() -> String {
    "lb11".to_string()
}

fn default_region() -> String {
    "fsn1".to_string()
}

fn default_api_server_port() -> u16 {
    6443
}

fn default_placement_group_type() -> String {
    "spread".to_string()
}
