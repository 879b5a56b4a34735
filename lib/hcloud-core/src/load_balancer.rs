//! Control-plane load balancer reconciler
//!
//! Resolution order is explicit ID, then the ID recorded in status, then
//! name. Whatever is found has to carry the cluster's ownership label (or
//! be claimable) before any property or service is changed on it.

use hcloud_api::hcloud::{ListOpts, LoadBalancer, LoadBalancerCreateOpts, LoadBalancerUpdateOpts};
use hcloud_api::v1beta1::conditions::{
    LOAD_BALANCER_FAILED_TO_OWN_REASON, LOAD_BALANCER_NOT_FOUND_REASON,
    LOAD_BALANCER_READY_CONDITION, LOAD_BALANCER_RECONCILE_FAILED_REASON,
};
use hcloud_api::v1beta1::{
    ApiEndpoint, HetznerClusterSpec, HetznerClusterStatus, LoadBalancerServiceSpec,
    LoadBalancerSpec, LoadBalancerStatus,
};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::conditions::ConditionSet;
use crate::context::PassContext;
use crate::error::HCloudError;
use crate::ownership::{ClusterIdentity, Ownership};
use crate::provider::HCloudResult;

enum Resolution {
    Found(LoadBalancer),
    Unavailable { reason: &'static str, message: String },
}

/// Name of the load balancer when the spec does not give one
pub fn default_name(cluster: &ClusterIdentity) -> String {
    format!("{}-kube-apiserver", cluster.name)
}

pub fn desired_name(spec: &LoadBalancerSpec, cluster: &ClusterIdentity) -> String {
    spec.name.clone().unwrap_or_else(|| default_name(cluster))
}

/// Converge the control-plane load balancer and the control-plane endpoint.
///
/// Errors are recorded on `LoadBalancerReady` before they are returned.
pub async fn reconcile(
    ctx: &PassContext,
    spec: &HetznerClusterSpec,
    status: &mut HetznerClusterStatus,
    conditions: &mut ConditionSet,
) -> HCloudResult<()> {
    let lb_spec = &spec.control_plane_load_balancer;
    let result = if lb_spec.enabled {
        ensure(ctx, lb_spec, status, conditions).await
    } else {
        disable(ctx, spec.control_plane_endpoint.as_ref(), status, conditions).await
    };

    if let Err(e) = &result {
        if *e != HCloudError::Cancelled {
            conditions.mark_false(
                LOAD_BALANCER_READY_CONDITION,
                LOAD_BALANCER_RECONCILE_FAILED_REASON,
                e.to_string(),
                ctx.now,
            );
        }
    }
    result
}

/// Delete every load balancer owned by the cluster and forget the recorded one
pub async fn delete(ctx: &PassContext, status: &mut HetznerClusterStatus) -> HCloudResult<()> {
    if let Some(recorded) = status.control_plane_load_balancer.clone() {
        delete_if_owned(ctx, recorded.id).await?;
        status.control_plane_load_balancer = None;
    }

    let selector = ListOpts::by_label_selector(ctx.ownership.label_selector());
    let owned = ctx
        .read("list load balancers", ctx.client.list_load_balancers(&selector))
        .await?;
    for lb in &owned {
        delete_load_balancer(ctx, lb).await?;
    }
    Ok(())
}

async fn ensure(
    ctx: &PassContext,
    spec: &LoadBalancerSpec,
    status: &mut HetznerClusterStatus,
    conditions: &mut ConditionSet,
) -> HCloudResult<()> {
    let lb = match resolve(ctx, spec, status).await? {
        Resolution::Found(lb) => lb,
        Resolution::Unavailable { reason, message } => {
            warn!("Load balancer for {} unavailable: {}", ctx.cluster, message);
            status.control_plane_load_balancer = None;
            status.control_plane_endpoint = None;
            conditions.mark_false(LOAD_BALANCER_READY_CONDITION, reason, message, ctx.now);
            return Ok(());
        }
    };

    // Keep the handle even if the sync below is interrupted
    record(status, &lb, spec.port);
    let lb = sync(ctx, spec, lb).await?;
    record(status, &lb, spec.port);

    conditions.mark_true(LOAD_BALANCER_READY_CONDITION, ctx.now);
    Ok(())
}

async fn resolve(
    ctx: &PassContext,
    spec: &LoadBalancerSpec,
    status: &HetznerClusterStatus,
) -> HCloudResult<Resolution> {
    if let Some(id) = spec.id {
        return match get(ctx, id).await? {
            Some(lb) => claim(ctx, lb).await,
            None => Ok(Resolution::Unavailable {
                reason: LOAD_BALANCER_NOT_FOUND_REASON,
                message: format!("load balancer {} not found", id),
            }),
        };
    }

    if let Some(recorded) = &status.control_plane_load_balancer {
        match get(ctx, recorded.id).await? {
            Some(lb) => return claim(ctx, lb).await,
            None => debug!("Recorded load balancer {} of {} is gone", recorded.id, ctx.cluster),
        }
    }

    let name = desired_name(spec, &ctx.cluster);
    let mut matches = ctx
        .read("list load balancers", ctx.client.list_load_balancers(&ListOpts::by_name(&name)))
        .await?;
    match matches.len() {
        0 => {
            let network = status.network.as_ref().map(|n| n.id);
            create(ctx, spec, name, network).await.map(Resolution::Found)
        }
        1 => claim(ctx, matches.remove(0)).await,
        n => Ok(Resolution::Unavailable {
            reason: LOAD_BALANCER_RECONCILE_FAILED_REASON,
            message: format!("{} load balancers are named {}", n, name),
        }),
    }
}

async fn get(ctx: &PassContext, id: i64) -> HCloudResult<Option<LoadBalancer>> {
    ctx.read("get load balancer", ctx.client.get_load_balancer(id)).await
}

async fn create(
    ctx: &PassContext,
    spec: &LoadBalancerSpec,
    name: String,
    network: Option<i64>,
) -> HCloudResult<LoadBalancer> {
    let opts = LoadBalancerCreateOpts {
        name,
        load_balancer_type: spec.type_.clone(),
        algorithm: spec.algorithm,
        location: spec.region.clone(),
        labels: ctx.ownership.labels(),
        network,
    };
    let lb = ctx
        .mutate("create load balancer", ctx.client.create_load_balancer(&opts))
        .await?;
    info!("Created load balancer {} ({}) for {}", lb.name, lb.id, ctx.cluster);
    Ok(lb)
}

/// Make sure the cluster owns `candidate`, labelling it if nobody does.
///
/// Labels are read again right before tagging so that a concurrent claim by
/// another cluster is seen as foreign ownership.
async fn claim(ctx: &PassContext, candidate: LoadBalancer) -> HCloudResult<Resolution> {
    match ctx.ownership.classify(&candidate.labels) {
        Ownership::Owned => return Ok(Resolution::Found(candidate)),
        Ownership::Foreign { owner_key } => return Ok(failed_to_own(&candidate, &owner_key)),
        Ownership::Absent => {}
    }

    let Some(current) = get(ctx, candidate.id).await? else {
        return Ok(Resolution::Unavailable {
            reason: LOAD_BALANCER_NOT_FOUND_REASON,
            message: format!("load balancer {} disappeared", candidate.id),
        });
    };

    match ctx.ownership.classify(&current.labels) {
        Ownership::Owned => Ok(Resolution::Found(current)),
        Ownership::Foreign { owner_key } => Ok(failed_to_own(&current, &owner_key)),
        Ownership::Absent => {
            let opts = LoadBalancerUpdateOpts {
                name: None,
                labels: Some(ctx.ownership.claim(&current.labels)),
            };
            let lb = ctx
                .mutate("label load balancer", ctx.client.update_load_balancer(current.id, &opts))
                .await?;
            info!("Took over load balancer {} ({}) for {}", lb.name, lb.id, ctx.cluster);
            Ok(Resolution::Found(lb))
        }
    }
}

fn failed_to_own(lb: &LoadBalancer, owner_key: &str) -> Resolution {
    Resolution::Unavailable {
        reason: LOAD_BALANCER_FAILED_TO_OWN_REASON,
        message: format!(
            "load balancer {} ({}) is owned by {}",
            lb.name, lb.id, owner_key
        ),
    }
}

/// Bring name, type, algorithm and services of an owned load balancer in line
async fn sync(ctx: &PassContext, spec: &LoadBalancerSpec, mut lb: LoadBalancer) -> HCloudResult<LoadBalancer> {
    let name = match (&spec.name, spec.id) {
        (Some(name), _) => name.clone(),
        (None, Some(_)) => lb.name.clone(),
        (None, None) => default_name(&ctx.cluster),
    };
    if lb.name != name {
        let opts = LoadBalancerUpdateOpts {
            name: Some(name),
            labels: None,
        };
        lb = ctx
            .mutate("rename load balancer", ctx.client.update_load_balancer(lb.id, &opts))
            .await?;
    }

    if lb.load_balancer_type != spec.type_ {
        ctx.mutate(
            "change load balancer type",
            ctx.client.change_load_balancer_type(lb.id, &spec.type_),
        )
        .await?;
        lb.load_balancer_type = spec.type_.clone();
    }

    if lb.algorithm != spec.algorithm {
        ctx.mutate(
            "change load balancer algorithm",
            ctx.client.change_load_balancer_algorithm(lb.id, spec.algorithm),
        )
        .await?;
        lb.algorithm = spec.algorithm;
    }

    let desired: BTreeSet<&LoadBalancerServiceSpec> = spec.extra_services.iter().collect();

    // Removals first so a changed service can reuse its listen port
    let unwanted: Vec<LoadBalancerServiceSpec> = lb
        .services
        .iter()
        .filter(|s| !desired.contains(s))
        .cloned()
        .collect();
    for service in unwanted {
        ctx.mutate(
            "delete load balancer service",
            ctx.client.delete_load_balancer_service(lb.id, service.listen_port),
        )
        .await?;
        debug!("Removed service {} from load balancer {}", service.listen_port, lb.id);
        lb.services.retain(|s| s.listen_port != service.listen_port);
    }

    for service in desired {
        if lb.services.contains(service) {
            continue;
        }
        ctx.mutate(
            "add load balancer service",
            ctx.client.add_load_balancer_service(lb.id, service),
        )
        .await?;
        debug!("Added service {} to load balancer {}", service.listen_port, lb.id);
        lb.services.push(service.clone());
    }

    Ok(lb)
}

fn record(status: &mut HetznerClusterStatus, lb: &LoadBalancer, port: u16) {
    status.control_plane_load_balancer = Some(LoadBalancerStatus {
        id: lb.id,
        name: lb.name.clone(),
        type_: lb.load_balancer_type.clone(),
        algorithm: lb.algorithm,
        ipv4: lb.public_ipv4.clone(),
        ipv6: lb.public_ipv6.clone(),
        services: lb.services.clone(),
    });
    status.control_plane_endpoint = lb
        .public_ipv4
        .clone()
        .map(|host| ApiEndpoint { host, port });
}

async fn disable(
    ctx: &PassContext,
    external_endpoint: Option<&ApiEndpoint>,
    status: &mut HetznerClusterStatus,
    conditions: &mut ConditionSet,
) -> HCloudResult<()> {
    if let Some(recorded) = status.control_plane_load_balancer.clone() {
        delete_if_owned(ctx, recorded.id).await?;
        status.control_plane_load_balancer = None;
    }
    conditions.remove(LOAD_BALANCER_READY_CONDITION);
    status.control_plane_endpoint = external_endpoint.cloned();
    Ok(())
}

async fn delete_if_owned(ctx: &PassContext, id: i64) -> HCloudResult<()> {
    match get(ctx, id).await? {
        Some(lb) if ctx.ownership.is_owned(&lb.labels) => delete_load_balancer(ctx, &lb).await,
        Some(lb) => {
            info!("Leaving foreign load balancer {} ({}) in place", lb.name, id);
            Ok(())
        }
        None => Ok(()),
    }
}

async fn delete_load_balancer(ctx: &PassContext, lb: &LoadBalancer) -> HCloudResult<()> {
    match ctx
        .mutate("delete load balancer", ctx.client.delete_load_balancer(lb.id))
        .await
    {
        Ok(()) => {
            info!("Deleted load balancer {} ({}) of {}", lb.name, lb.id, ctx.cluster);
            Ok(())
        }
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{cluster, labels, pass_context, FakeHCloud, Mutation};
    use hcloud_api::hcloud::Labels;
    use hcloud_api::v1beta1::{LoadBalancerAlgorithm, LoadBalancerProtocol};
    use std::sync::Arc;

    fn service(port: u16) -> LoadBalancerServiceSpec {
        LoadBalancerServiceSpec {
            listen_port: port,
            destination_port: port,
            protocol: LoadBalancerProtocol::Tcp,
        }
    }

    fn cluster_spec(lb: LoadBalancerSpec) -> HetznerClusterSpec {
        HetznerClusterSpec {
            control_plane_load_balancer: lb,
            ..Default::default()
        }
    }

    async fn pass(fake: &Arc<FakeHCloud>, spec: &HetznerClusterSpec, status: &mut HetznerClusterStatus, conditions: &mut ConditionSet) -> u32 {
        let ctx = pass_context(fake);
        reconcile(&ctx, spec, status, conditions).await.unwrap();
        ctx.mutations()
    }

    #[tokio::test]
    async fn test_creates_owned_load_balancer_and_endpoint() {
        let fake = Arc::new(FakeHCloud::new());
        let spec = cluster_spec(LoadBalancerSpec::default());
        let mut status = HetznerClusterStatus::default();
        let mut conditions = ConditionSet::new();

        pass(&fake, &spec, &mut status, &mut conditions).await;

        let lbs = fake.load_balancers();
        assert_eq!(lbs.len(), 1);
        assert_eq!(lbs[0].name, "c1-kube-apiserver");
        assert!(cluster().ownership().is_owned(&lbs[0].labels));
        assert_eq!(lbs[0].algorithm, LoadBalancerAlgorithm::RoundRobin);

        let recorded = status.control_plane_load_balancer.clone().unwrap();
        assert_eq!(recorded.id, lbs[0].id);
        let endpoint = status.control_plane_endpoint.clone().unwrap();
        assert_eq!(endpoint.host, lbs[0].public_ipv4.clone().unwrap());
        assert_eq!(endpoint.port, 6443);
        assert!(conditions.is_true(LOAD_BALANCER_READY_CONDITION));

        assert_eq!(pass(&fake, &spec, &mut status, &mut conditions).await, 0);
    }

    #[tokio::test]
    async fn test_attaches_created_load_balancer_to_recorded_network() {
        let fake = Arc::new(FakeHCloud::new());
        let spec = cluster_spec(LoadBalancerSpec::default());
        let mut status = HetznerClusterStatus {
            network: Some(hcloud_api::v1beta1::NetworkStatus {
                id: 99,
                name: "c1".into(),
                ip_range: "10.0.0.0/16".into(),
                attachment: hcloud_api::v1beta1::NetworkAttachment::Owned,
            }),
            ..Default::default()
        };
        let mut conditions = ConditionSet::new();

        pass(&fake, &spec, &mut status, &mut conditions).await;

        assert_eq!(fake.load_balancers()[0].private_networks, vec![99]);
    }

    #[tokio::test]
    async fn test_takes_over_unlabelled_load_balancer_by_name() {
        let fake = Arc::new(FakeHCloud::new());
        let existing = fake.insert_load_balancer("L", labels(&[("team", "infra")]));
        let spec = cluster_spec(LoadBalancerSpec {
            name: Some("L".into()),
            algorithm: LoadBalancerAlgorithm::LeastConnections,
            ..Default::default()
        });
        let mut status = HetznerClusterStatus::default();
        let mut conditions = ConditionSet::new();

        let mutations = pass(&fake, &spec, &mut status, &mut conditions).await;

        assert_eq!(mutations, 1);
        assert_eq!(fake.load_balancers().len(), 1);
        let lb = fake.load_balancer(existing.id).unwrap();
        assert!(cluster().ownership().is_owned(&lb.labels));
        assert_eq!(lb.labels.get("team").map(String::as_str), Some("infra"));
        assert_eq!(status.control_plane_load_balancer.unwrap().id, existing.id);
        assert!(conditions.is_true(LOAD_BALANCER_READY_CONDITION));
    }

    #[tokio::test]
    async fn test_refuses_load_balancer_owned_by_other_cluster() {
        let fake = Arc::new(FakeHCloud::new());
        let other_key = format!("{}s", cluster().tag_key());
        let existing = fake.insert_load_balancer("L", labels(&[(&other_key, "owned")]));
        let spec = cluster_spec(LoadBalancerSpec {
            name: Some("L".into()),
            ..Default::default()
        });
        let mut status = HetznerClusterStatus::default();
        let mut conditions = ConditionSet::new();

        pass(&fake, &spec, &mut status, &mut conditions).await;

        assert!(fake.mutations().is_empty());
        assert_eq!(fake.load_balancer(existing.id).unwrap(), existing);
        assert!(conditions.is_false_with_reason(
            LOAD_BALANCER_READY_CONDITION,
            LOAD_BALANCER_FAILED_TO_OWN_REASON
        ));
        assert!(status.control_plane_load_balancer.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_claim_is_treated_as_foreign() {
        let fake = Arc::new(FakeHCloud::new());
        let existing = fake.insert_load_balancer("L", Labels::new());
        fake.relabel_load_balancer_on_next_get(
            existing.id,
            labels(&[("caph-cluster-default.c2", "owned")]),
        );
        let spec = cluster_spec(LoadBalancerSpec {
            name: Some("L".into()),
            ..Default::default()
        });
        let mut status = HetznerClusterStatus::default();
        let mut conditions = ConditionSet::new();

        pass(&fake, &spec, &mut status, &mut conditions).await;

        assert!(fake.mutations().is_empty());
        assert!(conditions.is_false_with_reason(
            LOAD_BALANCER_READY_CONDITION,
            LOAD_BALANCER_FAILED_TO_OWN_REASON
        ));
    }

    #[tokio::test]
    async fn test_explicit_id_not_found() {
        let fake = Arc::new(FakeHCloud::new());
        let spec = cluster_spec(LoadBalancerSpec {
            id: Some(1234),
            ..Default::default()
        });
        let mut status = HetznerClusterStatus::default();
        let mut conditions = ConditionSet::new();

        pass(&fake, &spec, &mut status, &mut conditions).await;

        assert!(fake.load_balancers().is_empty());
        assert!(conditions.is_false_with_reason(
            LOAD_BALANCER_READY_CONDITION,
            LOAD_BALANCER_NOT_FOUND_REASON
        ));
    }

    #[tokio::test]
    async fn test_extra_services_are_diffed() {
        let fake = Arc::new(FakeHCloud::new());
        let mut status = HetznerClusterStatus::default();
        let mut conditions = ConditionSet::new();
        let mut spec = cluster_spec(LoadBalancerSpec::default());
        pass(&fake, &spec, &mut status, &mut conditions).await;
        let id = status.control_plane_load_balancer.clone().unwrap().id;

        spec.control_plane_load_balancer.extra_services = vec![service(8134)];
        assert_eq!(pass(&fake, &spec, &mut status, &mut conditions).await, 1);
        assert_eq!(fake.load_balancer(id).unwrap().services, vec![service(8134)]);

        spec.control_plane_load_balancer.extra_services = vec![service(8134), service(8135)];
        fake.clear_mutations();
        assert_eq!(pass(&fake, &spec, &mut status, &mut conditions).await, 1);
        assert_eq!(fake.mutations(), vec![Mutation::AddService(id, service(8135))]);

        spec.control_plane_load_balancer.extra_services = vec![service(8135)];
        fake.clear_mutations();
        assert_eq!(pass(&fake, &spec, &mut status, &mut conditions).await, 1);
        assert_eq!(fake.mutations(), vec![Mutation::DeleteService(id, 8134)]);

        spec.control_plane_load_balancer.extra_services = Vec::new();
        pass(&fake, &spec, &mut status, &mut conditions).await;
        assert!(fake.load_balancer(id).unwrap().services.is_empty());
        assert!(status.control_plane_load_balancer.unwrap().services.is_empty());
    }

    #[tokio::test]
    async fn test_changed_service_is_removed_before_readded() {
        let fake = Arc::new(FakeHCloud::new());
        let mut status = HetznerClusterStatus::default();
        let mut conditions = ConditionSet::new();
        let mut spec = cluster_spec(LoadBalancerSpec {
            extra_services: vec![service(8134)],
            ..Default::default()
        });
        pass(&fake, &spec, &mut status, &mut conditions).await;
        let id = status.control_plane_load_balancer.clone().unwrap().id;

        let changed = LoadBalancerServiceSpec {
            destination_port: 9000,
            ..service(8134)
        };
        spec.control_plane_load_balancer.extra_services = vec![changed.clone()];
        fake.clear_mutations();
        pass(&fake, &spec, &mut status, &mut conditions).await;

        assert_eq!(
            fake.mutations(),
            vec![Mutation::DeleteService(id, 8134), Mutation::AddService(id, changed)]
        );
    }

    #[tokio::test]
    async fn test_interrupted_service_sync_converges_without_duplicates() {
        let fake = Arc::new(FakeHCloud::new());
        let mut status = HetznerClusterStatus::default();
        let mut conditions = ConditionSet::new();
        let mut spec = cluster_spec(LoadBalancerSpec::default());
        pass(&fake, &spec, &mut status, &mut conditions).await;
        let id = status.control_plane_load_balancer.clone().unwrap().id;

        spec.control_plane_load_balancer.extra_services = vec![service(8134), service(8135), service(8136)];
        fake.fail_mutation_after(1, HCloudError::Transient("connection reset".into()));
        let ctx = pass_context(&fake);
        assert!(reconcile(&ctx, &spec, &mut status, &mut conditions).await.is_err());
        assert_eq!(fake.load_balancer(id).unwrap().services, vec![service(8134)]);
        assert!(conditions.is_false_with_reason(
            LOAD_BALANCER_READY_CONDITION,
            LOAD_BALANCER_RECONCILE_FAILED_REASON
        ));

        // The failed call reached the provider after all
        fake.set_load_balancer_services(id, vec![service(8134), service(8135)]);
        fake.clear_mutations();
        pass(&fake, &spec, &mut status, &mut conditions).await;

        assert_eq!(fake.mutations(), vec![Mutation::AddService(id, service(8136))]);
        let expected = vec![service(8134), service(8135), service(8136)];
        assert_eq!(fake.load_balancer(id).unwrap().services, expected);
        assert_eq!(status.control_plane_load_balancer.unwrap().services, expected);
        assert!(conditions.is_true(LOAD_BALANCER_READY_CONDITION));
    }

    #[tokio::test]
    async fn test_property_drift_is_corrected() {
        let fake = Arc::new(FakeHCloud::new());
        let existing = fake.insert_load_balancer("c1-kube-apiserver", cluster().ownership().labels());
        let spec = cluster_spec(LoadBalancerSpec {
            type_: "lb21".into(),
            ..Default::default()
        });
        let mut status = HetznerClusterStatus::default();
        let mut conditions = ConditionSet::new();

        pass(&fake, &spec, &mut status, &mut conditions).await;

        assert_eq!(
            fake.mutations(),
            vec![
                Mutation::ChangeLoadBalancerType(existing.id, "lb21".into()),
                Mutation::ChangeLoadBalancerAlgorithm(existing.id, LoadBalancerAlgorithm::RoundRobin),
            ]
        );
        let recorded = status.control_plane_load_balancer.unwrap();
        assert_eq!(recorded.type_, "lb21");
        assert_eq!(recorded.algorithm, LoadBalancerAlgorithm::RoundRobin);
    }

    #[tokio::test]
    async fn test_recorded_load_balancer_is_renamed() {
        let fake = Arc::new(FakeHCloud::new());
        let mut status = HetznerClusterStatus::default();
        let mut conditions = ConditionSet::new();
        let mut spec = cluster_spec(LoadBalancerSpec::default());
        pass(&fake, &spec, &mut status, &mut conditions).await;

        spec.control_plane_load_balancer.name = Some("api".into());
        pass(&fake, &spec, &mut status, &mut conditions).await;

        let lbs = fake.load_balancers();
        assert_eq!(lbs.len(), 1);
        assert_eq!(lbs[0].name, "api");
    }

    #[tokio::test]
    async fn test_disabled_copies_external_endpoint() {
        let fake = Arc::new(FakeHCloud::new());
        let spec = HetznerClusterSpec {
            control_plane_load_balancer: LoadBalancerSpec {
                enabled: false,
                ..Default::default()
            },
            control_plane_endpoint: Some(ApiEndpoint {
                host: "my.test.host".into(),
                port: 6443,
            }),
            ..Default::default()
        };
        let mut status = HetznerClusterStatus::default();
        let mut conditions = ConditionSet::new();

        assert_eq!(pass(&fake, &spec, &mut status, &mut conditions).await, 0);

        assert!(fake.load_balancers().is_empty());
        assert!(status.control_plane_load_balancer.is_none());
        assert_eq!(status.control_plane_endpoint, spec.control_plane_endpoint);
        assert!(conditions.get(LOAD_BALANCER_READY_CONDITION).is_none());
    }

    #[tokio::test]
    async fn test_disable_transition_deletes_owned_but_not_foreign() {
        let fake = Arc::new(FakeHCloud::new());
        let mut status = HetznerClusterStatus::default();
        let mut conditions = ConditionSet::new();
        let mut spec = cluster_spec(LoadBalancerSpec::default());
        pass(&fake, &spec, &mut status, &mut conditions).await;

        spec.control_plane_load_balancer.enabled = false;
        pass(&fake, &spec, &mut status, &mut conditions).await;
        assert!(fake.load_balancers().is_empty());

        let foreign = fake.insert_load_balancer("shared", labels(&[("caph-cluster-default.c2", "owned")]));
        status.control_plane_load_balancer = Some(LoadBalancerStatus {
            id: foreign.id,
            name: foreign.name.clone(),
            type_: foreign.load_balancer_type.clone(),
            algorithm: foreign.algorithm,
            ipv4: None,
            ipv6: None,
            services: Vec::new(),
        });
        pass(&fake, &spec, &mut status, &mut conditions).await;
        assert_eq!(fake.load_balancers(), vec![foreign]);
        assert!(status.control_plane_load_balancer.is_none());
    }

    #[tokio::test]
    async fn test_delete_removes_owned_load_balancers() {
        let fake = Arc::new(FakeHCloud::new());
        let foreign = fake.insert_load_balancer("shared", Labels::new());
        let mut status = HetznerClusterStatus::default();
        let mut conditions = ConditionSet::new();
        pass(&fake, &cluster_spec(LoadBalancerSpec::default()), &mut status, &mut conditions).await;

        delete(&pass_context(&fake), &mut status).await.unwrap();

        assert_eq!(fake.load_balancers(), vec![foreign]);
        assert!(status.control_plane_load_balancer.is_none());
    }
}
