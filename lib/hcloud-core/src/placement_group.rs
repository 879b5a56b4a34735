//! Placement group reconciler
//!
//! Groups are matched by name between the spec and the groups carrying the
//! cluster's ownership label. Remote names are prefixed with the cluster
//! name so that clusters sharing a project do not collide.

use hcloud_api::hcloud::{ListOpts, PlacementGroup, PlacementGroupCreateOpts};
use hcloud_api::v1beta1::conditions::{
    PLACEMENT_GROUPS_SYNCED_CONDITION, PLACEMENT_GROUP_RECONCILE_FAILED_REASON,
};
use hcloud_api::v1beta1::{HCloudPlacementGroupSpec, HetznerClusterStatus, PlacementGroupStatus};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::conditions::ConditionSet;
use crate::context::PassContext;
use crate::error::HCloudError;
use crate::ownership::ClusterIdentity;
use crate::provider::HCloudResult;

/// Remote name of a placement group of `cluster`
pub fn remote_name(cluster: &ClusterIdentity, group: &str) -> String {
    format!("{}-{}", cluster.name, group)
}

/// Converge the owned placement groups to the desired set
pub async fn reconcile(
    ctx: &PassContext,
    desired: &[HCloudPlacementGroupSpec],
    status: &mut HetznerClusterStatus,
    conditions: &mut ConditionSet,
) -> HCloudResult<()> {
    let result = sync(ctx, desired, status).await;
    match &result {
        Ok(()) => conditions.mark_true(PLACEMENT_GROUPS_SYNCED_CONDITION, ctx.now),
        Err(HCloudError::Cancelled) => {}
        Err(e) => conditions.mark_false(
            PLACEMENT_GROUPS_SYNCED_CONDITION,
            PLACEMENT_GROUP_RECONCILE_FAILED_REASON,
            e.to_string(),
            ctx.now,
        ),
    }
    result
}

/// Delete every placement group owned by the cluster
pub async fn delete(ctx: &PassContext, status: &mut HetznerClusterStatus) -> HCloudResult<()> {
    let selector = ListOpts::by_label_selector(ctx.ownership.label_selector());
    let owned = ctx
        .read("list placement groups", ctx.client.list_placement_groups(&selector))
        .await?;
    for group in &owned {
        delete_group(ctx, group).await?;
    }
    status.hcloud_placement_groups.clear();
    Ok(())
}

async fn sync(
    ctx: &PassContext,
    desired: &[HCloudPlacementGroupSpec],
    status: &mut HetznerClusterStatus,
) -> HCloudResult<()> {
    let selector = ListOpts::by_label_selector(ctx.ownership.label_selector());
    let observed = ctx
        .read("list placement groups", ctx.client.list_placement_groups(&selector))
        .await?;

    let mut present: BTreeMap<String, PlacementGroup> = BTreeMap::new();
    let mut stale = Vec::new();
    for group in observed {
        let wanted = spec_name(&ctx.cluster, &group.name)
            .filter(|name| desired.iter().any(|d| d.name == *name))
            .map(str::to_string);
        match wanted {
            Some(name) => {
                present.insert(name, group);
            }
            None => stale.push(group),
        }
    }

    let mut first_error = None;

    for group in &stale {
        if let Err(e) = delete_group(ctx, group).await {
            first_error.get_or_insert(e);
        }
    }

    for spec in desired {
        match present.get(&spec.name) {
            Some(group) => {
                if group.type_ != spec.type_ {
                    // Placement group types cannot be changed after creation
                    warn!(
                        "Placement group {} of {} is {} but {} is requested; leaving it as is",
                        group.name, ctx.cluster, group.type_, spec.type_
                    );
                }
            }
            None => match create_group(ctx, spec).await {
                Ok(group) => {
                    present.insert(spec.name.clone(), group);
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            },
        }
    }

    status.hcloud_placement_groups = desired
        .iter()
        .filter_map(|spec| {
            present.get(&spec.name).map(|group| PlacementGroupStatus {
                name: spec.name.clone(),
                id: group.id,
                type_: group.type_.clone(),
            })
        })
        .collect();

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn spec_name<'a>(cluster: &ClusterIdentity, remote: &'a str) -> Option<&'a str> {
    remote
        .strip_prefix(cluster.name.as_str())
        .and_then(|rest| rest.strip_prefix('-'))
        .filter(|name| !name.is_empty())
}

async fn create_group(ctx: &PassContext, spec: &HCloudPlacementGroupSpec) -> HCloudResult<PlacementGroup> {
    let opts = PlacementGroupCreateOpts {
        name: remote_name(&ctx.cluster, &spec.name),
        type_: spec.type_.clone(),
        labels: ctx.ownership.labels(),
    };
    let group = ctx
        .mutate("create placement group", ctx.client.create_placement_group(&opts))
        .await?;
    info!("Created placement group {} ({}) for {}", group.name, group.id, ctx.cluster);
    Ok(group)
}

async fn delete_group(ctx: &PassContext, group: &PlacementGroup) -> HCloudResult<()> {
    match ctx
        .mutate("delete placement group", ctx.client.delete_placement_group(group.id))
        .await
    {
        Ok(()) => {
            info!("Deleted placement group {} ({}) of {}", group.name, group.id, ctx.cluster);
            Ok(())
        }
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}
