use super::Labels;
use crate::v1beta1::{LoadBalancerAlgorithm, LoadBalancerServiceSpec};

/// A load balancer with its services
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadBalancer {
    pub id: i64,
    pub name: String,
    /// Type name, e.g. "lb11"
    pub load_balancer_type: String,
    pub algorithm: LoadBalancerAlgorithm,
    pub location: String,
    pub labels: Labels,
    pub services: Vec<LoadBalancerServiceSpec>,
    pub public_ipv4: Option<String>,
    pub public_ipv6: Option<String>,
    /// Networks the load balancer is attached to
    pub private_networks: Vec<i64>,
}

/// Options for creating a load balancer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadBalancerCreateOpts {
    pub name: String,
    pub load_balancer_type: String,
    pub algorithm: LoadBalancerAlgorithm,
    pub location: String,
    pub labels: Labels,
    /// Network to attach the load balancer to
    pub network: Option<i64>,
}

/// Options for updating name and labels of a load balancer
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadBalancerUpdateOpts {
    pub name: Option<String>,
    pub labels: Option<Labels>,
}
