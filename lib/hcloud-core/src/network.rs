//! Network reconciler

use hcloud_api::hcloud::{ListOpts, Network, NetworkCreateOpts, NetworkSubnet};
use hcloud_api::v1beta1::conditions::{
    NETWORK_ATTACHED_CONDITION, NETWORK_INVALID_SPEC_REASON, NETWORK_NOT_FOUND_REASON,
    NETWORK_RECONCILE_FAILED_REASON,
};
use hcloud_api::v1beta1::{HCloudNetworkSpec, HetznerClusterStatus, NetworkAttachment, NetworkStatus};
use ipnetwork::IpNetwork;
use tracing::{debug, info, warn};

use crate::conditions::ConditionSet;
use crate::context::PassContext;
use crate::error::HCloudError;
use crate::ownership::ClusterIdentity;
use crate::provider::HCloudResult;

enum Resolution {
    Ready(NetworkStatus),
    Unavailable { reason: &'static str, message: String },
}

/// Name of the network when the spec does not give one
pub fn desired_name(spec: &HCloudNetworkSpec, cluster: &ClusterIdentity) -> String {
    spec.name.clone().unwrap_or_else(|| cluster.name.clone())
}

/// Converge the cluster network and record it in `status`.
///
/// Errors are recorded on `NetworkAttached` before they are returned.
pub async fn reconcile(
    ctx: &PassContext,
    spec: &HCloudNetworkSpec,
    status: &mut HetznerClusterStatus,
    conditions: &mut ConditionSet,
) -> HCloudResult<()> {
    let result = if spec.enabled {
        ensure(ctx, spec, status, conditions).await
    } else {
        disable(ctx, status, conditions).await
    };

    if let Err(e) = &result {
        if *e != HCloudError::Cancelled {
            conditions.mark_false(
                NETWORK_ATTACHED_CONDITION,
                NETWORK_RECONCILE_FAILED_REASON,
                e.to_string(),
                ctx.now,
            );
        }
    }
    result
}

/// Delete every network owned by the cluster and forget the recorded one
pub async fn delete(ctx: &PassContext, status: &mut HetznerClusterStatus) -> HCloudResult<()> {
    if let Some(recorded) = status.network.clone() {
        delete_if_owned(ctx, recorded.id).await?;
        status.network = None;
    }

    let selector = ListOpts::by_label_selector(ctx.ownership.label_selector());
    let owned = ctx.read("list networks", ctx.client.list_networks(&selector)).await?;
    for network in owned {
        delete_by_id(ctx, &network).await?;
    }
    Ok(())
}

async fn ensure(
    ctx: &PassContext,
    spec: &HCloudNetworkSpec,
    status: &mut HetznerClusterStatus,
    conditions: &mut ConditionSet,
) -> HCloudResult<()> {
    match resolve(ctx, spec, status.network.as_ref()).await? {
        Resolution::Ready(network) => {
            debug!("Network {} ({}) attached to {}", network.name, network.id, ctx.cluster);
            status.network = Some(network);
            conditions.mark_true(NETWORK_ATTACHED_CONDITION, ctx.now);
        }
        Resolution::Unavailable { reason, message } => {
            warn!("Network for {} unavailable: {}", ctx.cluster, message);
            status.network = None;
            conditions.mark_false(NETWORK_ATTACHED_CONDITION, reason, message, ctx.now);
        }
    }
    Ok(())
}

async fn resolve(
    ctx: &PassContext,
    spec: &HCloudNetworkSpec,
    recorded: Option<&NetworkStatus>,
) -> HCloudResult<Resolution> {
    if let Some(id) = spec.id {
        let found = ctx.read("get network", ctx.client.get_network(id)).await?;
        return Ok(match found {
            Some(network) => Resolution::Ready(observed(ctx, network)),
            None => Resolution::Unavailable {
                reason: NETWORK_NOT_FOUND_REASON,
                message: format!("network {} not found", id),
            },
        });
    }

    let name = desired_name(spec, &ctx.cluster);

    if let Some(recorded) = recorded {
        match ctx.read("get network", ctx.client.get_network(recorded.id)).await? {
            Some(network) if network.name == name => {
                return Ok(Resolution::Ready(observed(ctx, network)));
            }
            // Renamed; an owned network under the old name is no longer wanted
            Some(network) if ctx.ownership.is_owned(&network.labels) => {
                info!("Replacing network {} ({}) of {} by {}", network.name, network.id, ctx.cluster, name);
                delete_by_id(ctx, &network).await?;
            }
            _ => {}
        }
    }

    let mut matches = ctx
        .read("list networks", ctx.client.list_networks(&ListOpts::by_name(&name)))
        .await?;
    match matches.len() {
        0 => create(ctx, spec, name).await,
        1 => Ok(Resolution::Ready(observed(ctx, matches.remove(0)))),
        n => Ok(Resolution::Unavailable {
            reason: NETWORK_RECONCILE_FAILED_REASON,
            message: format!("{} networks are named {}", n, name),
        }),
    }
}

async fn create(ctx: &PassContext, spec: &HCloudNetworkSpec, name: String) -> HCloudResult<Resolution> {
    if let Err(message) = validate_cidr(spec) {
        return Ok(Resolution::Unavailable {
            reason: NETWORK_INVALID_SPEC_REASON,
            message,
        });
    }

    let opts = NetworkCreateOpts {
        name,
        ip_range: spec.cidr_block.clone(),
        subnets: vec![NetworkSubnet {
            ip_range: spec.subnet_cidr_block.clone(),
            network_zone: spec.network_zone.clone(),
        }],
        labels: ctx.ownership.labels(),
    };
    let network = ctx.mutate("create network", ctx.client.create_network(&opts)).await?;
    info!("Created network {} ({}) for {}", network.name, network.id, ctx.cluster);

    Ok(Resolution::Ready(NetworkStatus {
        id: network.id,
        name: network.name,
        ip_range: network.ip_range,
        attachment: NetworkAttachment::Owned,
    }))
}

async fn disable(
    ctx: &PassContext,
    status: &mut HetznerClusterStatus,
    conditions: &mut ConditionSet,
) -> HCloudResult<()> {
    if let Some(recorded) = status.network.clone() {
        delete_if_owned(ctx, recorded.id).await?;
        status.network = None;
    }
    conditions.remove(NETWORK_ATTACHED_CONDITION);
    Ok(())
}

fn observed(ctx: &PassContext, network: Network) -> NetworkStatus {
    let attachment = if ctx.ownership.is_owned(&network.labels) {
        NetworkAttachment::Owned
    } else {
        NetworkAttachment::Attached
    };
    NetworkStatus {
        id: network.id,
        name: network.name,
        ip_range: network.ip_range,
        attachment,
    }
}

/// Delete the network if its labels still say we own it
async fn delete_if_owned(ctx: &PassContext, id: i64) -> HCloudResult<()> {
    match ctx.read("get network", ctx.client.get_network(id)).await? {
        Some(network) if ctx.ownership.is_owned(&network.labels) => delete_by_id(ctx, &network).await,
        Some(network) => {
            info!("Leaving foreign network {} ({}) in place", network.name, id);
            Ok(())
        }
        None => Ok(()),
    }
}

async fn delete_by_id(ctx: &PassContext, network: &Network) -> HCloudResult<()> {
    match ctx.mutate("delete network", ctx.client.delete_network(network.id)).await {
        Ok(()) => {
            info!("Deleted network {} ({}) of {}", network.name, network.id, ctx.cluster);
            Ok(())
        }
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}

/// Check that the subnet lies inside the network range
fn validate_cidr(spec: &HCloudNetworkSpec) -> Result<(), String> {
    let range: IpNetwork = spec
        .cidr_block
        .parse()
        .map_err(|e| format!("invalid network range {}: {}", spec.cidr_block, e))?;
    let subnet: IpNetwork = spec
        .subnet_cidr_block
        .parse()
        .map_err(|e| format!("invalid subnet range {}: {}", spec.subnet_cidr_block, e))?;

    if subnet.prefix() < range.prefix() || !range.contains(subnet.network()) {
        return Err(format!("subnet {} is not inside network range {}", subnet, range));
    }
    Ok(())
}
