//! Condition types and reasons reported on a HetznerCluster

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The Hetzner Cloud API accepted the most recent calls
pub const HETZNER_API_REACHABLE_CONDITION: &str = "HetznerAPIReachable";
/// A usable API token was found in the referenced secret
pub const HCLOUD_TOKEN_AVAILABLE_CONDITION: &str = "HCloudTokenAvailable";
/// The cluster network is resolved and recorded
pub const NETWORK_ATTACHED_CONDITION: &str = "NetworkAttached";
/// The control-plane load balancer exists and matches the spec
pub const LOAD_BALANCER_READY_CONDITION: &str = "LoadBalancerReady";
/// Remote placement groups match the spec by name
pub const PLACEMENT_GROUPS_SYNCED_CONDITION: &str = "PlacementGroupsSynced";
/// Derived cluster readiness
pub const READY_CONDITION: &str = "Ready";

pub const RATE_LIMIT_EXCEEDED_REASON: &str = "RateLimitExceeded";
pub const HETZNER_SECRET_UNREACHABLE_REASON: &str = "HetznerSecretUnreachable";
pub const HCLOUD_CREDENTIALS_INVALID_REASON: &str = "HCloudCredentialsInvalid";
pub const NETWORK_NOT_FOUND_REASON: &str = "NetworkNotFound";
pub const NETWORK_INVALID_SPEC_REASON: &str = "InvalidNetworkSpec";
pub const NETWORK_RECONCILE_FAILED_REASON: &str = "NetworkReconcileFailed";
pub const LOAD_BALANCER_NOT_FOUND_REASON: &str = "LoadBalancerNotFound";
pub const LOAD_BALANCER_FAILED_TO_OWN_REASON: &str = "LoadBalancerFailedToOwnReason";
pub const LOAD_BALANCER_RECONCILE_FAILED_REASON: &str = "LoadBalancerReconcileFailed";
pub const PLACEMENT_GROUP_RECONCILE_FAILED_REASON: &str = "PlacementGroupReconcileFailed";
pub const COMPONENTS_NOT_READY_REASON: &str = "ComponentsNotReady";
pub const CONTROL_PLANE_ENDPOINT_NOT_SET_REASON: &str = "ControlPlaneEndpointNotSet";
pub const DELETING_REASON: &str = "Deleting";

/// Condition status following Kubernetes conventions
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g. NetworkAttached)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition
    pub status: ConditionStatus,

    /// Machine-readable reason, empty for True conditions
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// Last time status or reason changed
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }

    pub fn is_false(&self) -> bool {
        self.status == ConditionStatus::False
    }
}
