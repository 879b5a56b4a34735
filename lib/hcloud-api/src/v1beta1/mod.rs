/// API version v1beta1 for the Hetzner infrastructure CRDs

pub mod hetzner_cluster;
pub mod conditions;

pub use hetzner_cluster::{
    ApiEndpoint, HCloudNetworkSpec, HCloudPlacementGroupSpec, HetznerCluster, HetznerClusterSpec,
    HetznerClusterStatus, HetznerSecretRef, LoadBalancerAlgorithm, LoadBalancerProtocol,
    LoadBalancerServiceSpec, LoadBalancerSpec, LoadBalancerStatus, NetworkAttachment,
    NetworkStatus, ParseError, PlacementGroupStatus,
};
pub use conditions::{Condition, ConditionStatus};

/// API group for the Hetzner infrastructure resources
pub const API_GROUP: &str = "infrastructure.cluster.x-k8s.io";
/// API version for the Hetzner infrastructure resources
pub const API_VERSION: &str = "v1beta1";
