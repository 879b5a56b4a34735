//! Cluster readiness derived from component conditions

use chrono::{DateTime, Utc};
use hcloud_api::v1beta1::conditions::{
    COMPONENTS_NOT_READY_REASON, CONTROL_PLANE_ENDPOINT_NOT_SET_REASON,
    HCLOUD_TOKEN_AVAILABLE_CONDITION, LOAD_BALANCER_READY_CONDITION, NETWORK_ATTACHED_CONDITION,
    PLACEMENT_GROUPS_SYNCED_CONDITION, READY_CONDITION,
};
use hcloud_api::v1beta1::{HetznerClusterSpec, HetznerClusterStatus};

use crate::conditions::ConditionSet;

/// Component conditions that must be True for `spec`
pub fn applicable_conditions(spec: &HetznerClusterSpec) -> Vec<&'static str> {
    let mut types = vec![HCLOUD_TOKEN_AVAILABLE_CONDITION];
    if spec.hcloud_network.enabled {
        types.push(NETWORK_ATTACHED_CONDITION);
    }
    if spec.control_plane_load_balancer.enabled {
        types.push(LOAD_BALANCER_READY_CONDITION);
    }
    types.push(PLACEMENT_GROUPS_SYNCED_CONDITION);
    types
}

/// Recompute `status.ready` and the `Ready` condition.
///
/// Readiness is never carried over from a previous pass.
pub fn aggregate(
    spec: &HetznerClusterSpec,
    status: &mut HetznerClusterStatus,
    conditions: &mut ConditionSet,
    now: DateTime<Utc>,
) -> bool {
    let pending: Vec<&str> = applicable_conditions(spec)
        .into_iter()
        .filter(|type_| !conditions.is_true(type_))
        .collect();

    let endpoint_set = status
        .control_plane_endpoint
        .as_ref()
        .is_some_and(|e| e.is_valid());

    status.ready = if !pending.is_empty() {
        conditions.mark_false(
            READY_CONDITION,
            COMPONENTS_NOT_READY_REASON,
            format!("waiting for {}", pending.join(", ")),
            now,
        );
        false
    } else if !endpoint_set {
        conditions.mark_false(
            READY_CONDITION,
            CONTROL_PLANE_ENDPOINT_NOT_SET_REASON,
            "control plane endpoint not set",
            now,
        );
        false
    } else {
        conditions.mark_true(READY_CONDITION, now);
        true
    };
    status.ready
}
