//! JSON shapes of the Hetzner Cloud API and their mapping to resource handles

use hcloud_api::hcloud::{
    Labels, LoadBalancer, LoadBalancerCreateOpts, Network, NetworkCreateOpts, PlacementGroup,
    PlacementGroupCreateOpts,
};
use hcloud_api::v1beta1::{LoadBalancerAlgorithm, LoadBalancerProtocol, LoadBalancerServiceSpec};
use hcloud_core::HCloudError;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct NetworkWire {
    pub id: i64,
    pub name: String,
    pub ip_range: String,
    #[serde(default)]
    pub labels: Labels,
}

impl From<NetworkWire> for Network {
    fn from(w: NetworkWire) -> Self {
        Network {
            id: w.id,
            name: w.name,
            ip_range: w.ip_range,
            labels: w.labels,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubnetRequest<'a> {
    #[serde(rename = "type")]
    pub type_: &'static str,
    pub ip_range: &'a str,
    pub network_zone: &'a str,
}

#[derive(Debug, Serialize)]
pub struct CreateNetworkRequest<'a> {
    pub name: &'a str,
    pub ip_range: &'a str,
    pub labels: &'a Labels,
    pub subnets: Vec<SubnetRequest<'a>>,
}

impl<'a> From<&'a NetworkCreateOpts> for CreateNetworkRequest<'a> {
    fn from(opts: &'a NetworkCreateOpts) -> Self {
        CreateNetworkRequest {
            name: &opts.name,
            ip_range: &opts.ip_range,
            labels: &opts.labels,
            subnets: opts
                .subnets
                .iter()
                .map(|s| SubnetRequest {
                    type_: "cloud",
                    ip_range: &s.ip_range,
                    network_zone: &s.network_zone,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NamedWire {
    pub name: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AlgorithmWire {
    #[serde(rename = "type")]
    pub type_: String,
}

#[derive(Debug, Deserialize)]
pub struct IpWire {
    pub ip: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PublicNetWire {
    pub ipv4: Option<IpWire>,
    pub ipv6: Option<IpWire>,
}

#[derive(Debug, Deserialize)]
pub struct PrivateNetWire {
    pub network: i64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServiceWire {
    pub protocol: String,
    pub listen_port: u16,
    pub destination_port: u16,
}

#[derive(Debug, Deserialize)]
pub struct LoadBalancerWire {
    pub id: i64,
    pub name: String,
    pub load_balancer_type: NamedWire,
    pub algorithm: AlgorithmWire,
    pub location: NamedWire,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub services: Vec<ServiceWire>,
    #[serde(default)]
    pub public_net: PublicNetWire,
    #[serde(default)]
    pub private_net: Vec<PrivateNetWire>,
}

impl From<LoadBalancerWire> for LoadBalancer {
    fn from(w: LoadBalancerWire) -> Self {
        let algorithm = w.algorithm.type_.parse().unwrap_or_else(|e| {
            warn!("Load balancer {}: {}", w.id, e);
            LoadBalancerAlgorithm::default()
        });
        let services = w
            .services
            .into_iter()
            .filter_map(|s| match s.protocol.parse::<LoadBalancerProtocol>() {
                Ok(protocol) => Some(LoadBalancerServiceSpec {
                    listen_port: s.listen_port,
                    destination_port: s.destination_port,
                    protocol,
                }),
                Err(e) => {
                    warn!("Load balancer {}: skipping service {}: {}", w.id, s.listen_port, e);
                    None
                }
            })
            .collect();

        LoadBalancer {
            id: w.id,
            name: w.name,
            load_balancer_type: w.load_balancer_type.name,
            algorithm,
            location: w.location.name,
            labels: w.labels,
            services,
            public_ipv4: w.public_net.ipv4.and_then(|ip| ip.ip),
            public_ipv6: w.public_net.ipv6.and_then(|ip| ip.ip),
            private_networks: w.private_net.into_iter().map(|n| n.network).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateLoadBalancerRequest<'a> {
    pub name: &'a str,
    pub load_balancer_type: &'a str,
    pub algorithm: AlgorithmWire,
    pub location: &'a str,
    pub labels: &'a Labels,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<i64>,
}

impl<'a> From<&'a LoadBalancerCreateOpts> for CreateLoadBalancerRequest<'a> {
    fn from(opts: &'a LoadBalancerCreateOpts) -> Self {
        CreateLoadBalancerRequest {
            name: &opts.name,
            load_balancer_type: &opts.load_balancer_type,
            algorithm: AlgorithmWire {
                type_: opts.algorithm.to_string(),
            },
            location: &opts.location,
            labels: &opts.labels,
            network: opts.network,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AddServiceRequest {
    pub protocol: String,
    pub listen_port: u16,
    pub destination_port: u16,
    pub proxyprotocol: bool,
}

impl From<&LoadBalancerServiceSpec> for AddServiceRequest {
    fn from(s: &LoadBalancerServiceSpec) -> Self {
        AddServiceRequest {
            protocol: s.protocol.to_string(),
            listen_port: s.listen_port,
            destination_port: s.destination_port,
            proxyprotocol: false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PlacementGroupWire {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub servers: Vec<i64>,
}

impl From<PlacementGroupWire> for PlacementGroup {
    fn from(w: PlacementGroupWire) -> Self {
        PlacementGroup {
            id: w.id,
            name: w.name,
            type_: w.type_,
            labels: w.labels,
            servers: w.servers,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreatePlacementGroupRequest<'a> {
    pub name: &'a str,
    #[serde(rename = "type")]
    pub type_: &'a str,
    pub labels: &'a Labels,
}

impl<'a> From<&'a PlacementGroupCreateOpts> for CreatePlacementGroupRequest<'a> {
    fn from(opts: &'a PlacementGroupCreateOpts) -> Self {
        CreatePlacementGroupRequest {
            name: &opts.name,
            type_: &opts.type_,
            labels: &opts.labels,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub next_page: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Classify a failed API response by its error code, falling back to the
/// HTTP status when the body carries none
pub fn map_error(status: StatusCode, body: &str) -> HCloudError {
    let (code, message) = match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => (parsed.error.code, parsed.error.message),
        Err(_) => (String::new(), body.trim().to_string()),
    };
    let message = if message.is_empty() {
        status.to_string()
    } else {
        message
    };

    match code.as_str() {
        "rate_limit_exceeded" => return HCloudError::RateLimited,
        "not_found" => return HCloudError::NotFound(message),
        "uniqueness_error" | "conflict" | "resource_in_use" | "locked" => {
            return HCloudError::Conflict(message)
        }
        "unauthorized" | "forbidden" => return HCloudError::Unauthorized(message),
        "invalid_input" | "json_error" => return HCloudError::Invalid(message),
        _ => {}
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => HCloudError::RateLimited,
        StatusCode::NOT_FOUND => HCloudError::NotFound(message),
        StatusCode::CONFLICT | StatusCode::LOCKED => HCloudError::Conflict(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => HCloudError::Unauthorized(message),
        s if s.is_client_error() => HCloudError::Invalid(message),
        _ => HCloudError::Transient(message),
    }
}

/// Classify a transport-level failure
pub fn map_transport_error(e: &reqwest::Error) -> HCloudError {
    if e.is_timeout() {
        HCloudError::Timeout
    } else {
        HCloudError::Transient(e.to_string())
    }
}
