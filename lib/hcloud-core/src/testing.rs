//! In-memory collaborators for unit tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hcloud_api::hcloud::{
    Labels, ListOpts, LoadBalancer, LoadBalancerCreateOpts, LoadBalancerUpdateOpts, Network,
    NetworkCreateOpts, PlacementGroup, PlacementGroupCreateOpts,
};
use hcloud_api::v1beta1::{
    HetznerClusterSpec, HetznerClusterStatus, HetznerSecretRef, LoadBalancerAlgorithm,
    LoadBalancerServiceSpec,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::context::Clock;
use crate::error::HCloudError;
use crate::ownership::ClusterIdentity;
use crate::provider::{HCloudClient, HCloudClientFactory, HCloudResult};
use crate::store::{
    ApiToken, ClusterObject, ClusterStore, CredentialError, CredentialSource, StatusUpdate,
    StoreError, CLUSTER_FINALIZER,
};

/// A mutating call received by [`FakeHCloud`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    CreateNetwork(String),
    DeleteNetwork(i64),
    CreateLoadBalancer(String),
    UpdateLoadBalancer(i64),
    ChangeLoadBalancerType(i64, String),
    ChangeLoadBalancerAlgorithm(i64, LoadBalancerAlgorithm),
    AddService(i64, LoadBalancerServiceSpec),
    DeleteService(i64, u16),
    DeleteLoadBalancer(i64),
    CreatePlacementGroup(String),
    DeletePlacementGroup(i64),
}

impl Mutation {
    /// The resource ID a mutation targets, if it targets an existing one
    pub fn target(&self) -> Option<i64> {
        match self {
            Self::DeleteNetwork(id)
            | Self::UpdateLoadBalancer(id)
            | Self::ChangeLoadBalancerType(id, _)
            | Self::ChangeLoadBalancerAlgorithm(id, _)
            | Self::AddService(id, _)
            | Self::DeleteService(id, _)
            | Self::DeleteLoadBalancer(id)
            | Self::DeletePlacementGroup(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Default)]
struct FakeState {
    next_id: i64,
    networks: BTreeMap<i64, Network>,
    load_balancers: BTreeMap<i64, LoadBalancer>,
    placement_groups: BTreeMap<i64, PlacementGroup>,
    mutations: Vec<Mutation>,
    rate_limited: bool,
    failing_mutations: Option<HCloudError>,
    fail_after: Option<(usize, HCloudError)>,
    relabel_on_get: Option<(i64, Labels)>,
}

impl FakeState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory Hetzner Cloud project
#[derive(Default)]
pub struct FakeHCloud {
    state: Mutex<FakeState>,
}

impl FakeHCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_network(&self, name: &str, labels: Labels) -> Network {
        let mut state = self.state.lock().unwrap();
        let network = Network {
            id: state.next_id(),
            name: name.to_string(),
            ip_range: "10.0.0.0/16".to_string(),
            labels,
        };
        state.networks.insert(network.id, network.clone());
        network
    }

    pub fn insert_load_balancer(&self, name: &str, labels: Labels) -> LoadBalancer {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        let lb = LoadBalancer {
            id,
            name: name.to_string(),
            load_balancer_type: "lb11".to_string(),
            algorithm: LoadBalancerAlgorithm::LeastConnections,
            location: "fsn1".to_string(),
            labels,
            services: Vec::new(),
            public_ipv4: Some(format!("192.0.2.{}", id)),
            public_ipv6: None,
            private_networks: Vec::new(),
        };
        state.load_balancers.insert(id, lb.clone());
        lb
    }

    pub fn insert_placement_group(&self, name: &str, labels: Labels) -> PlacementGroup {
        let mut state = self.state.lock().unwrap();
        let pg = PlacementGroup {
            id: state.next_id(),
            name: name.to_string(),
            type_: "spread".to_string(),
            labels,
            servers: Vec::new(),
        };
        state.placement_groups.insert(pg.id, pg.clone());
        pg
    }

    pub fn networks(&self) -> Vec<Network> {
        self.state.lock().unwrap().networks.values().cloned().collect()
    }

    pub fn load_balancers(&self) -> Vec<LoadBalancer> {
        self.state.lock().unwrap().load_balancers.values().cloned().collect()
    }

    pub fn load_balancer(&self, id: i64) -> Option<LoadBalancer> {
        self.state.lock().unwrap().load_balancers.get(&id).cloned()
    }

    pub fn placement_groups(&self) -> Vec<PlacementGroup> {
        self.state.lock().unwrap().placement_groups.values().cloned().collect()
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.state.lock().unwrap().mutations.clone()
    }

    pub fn clear_mutations(&self) {
        self.state.lock().unwrap().mutations.clear();
    }

    /// Reject every call with a rate-limit error
    pub fn set_rate_limited(&self, rate_limited: bool) {
        self.state.lock().unwrap().rate_limited = rate_limited;
    }

    /// Fail every mutating call with `error`
    pub fn fail_mutations_with(&self, error: Option<HCloudError>) {
        self.state.lock().unwrap().failing_mutations = error;
    }

    /// Replace the labels of a load balancer right before the next read of
    /// it is answered, as if another controller tagged it concurrently
    pub fn relabel_load_balancer_on_next_get(&self, id: i64, labels: Labels) {
        self.state.lock().unwrap().relabel_on_get = Some((id, labels));
    }

    /// Let `count` more mutating calls through, then fail the next one once
    pub fn fail_mutation_after(&self, count: usize, error: HCloudError) {
        self.state.lock().unwrap().fail_after = Some((count, error));
    }

    pub fn set_load_balancer_services(&self, id: i64, services: Vec<LoadBalancerServiceSpec>) {
        if let Some(lb) = self.state.lock().unwrap().load_balancers.get_mut(&id) {
            lb.services = services;
        }
    }

    fn check_read(&self) -> HCloudResult<std::sync::MutexGuard<'_, FakeState>> {
        let state = self.state.lock().unwrap();
        if state.rate_limited {
            return Err(HCloudError::RateLimited);
        }
        Ok(state)
    }

    fn check_mutation(&self, mutation: Mutation) -> HCloudResult<std::sync::MutexGuard<'_, FakeState>> {
        let mut state = self.check_read()?;
        if let Some(err) = state.failing_mutations.clone() {
            return Err(err);
        }
        if let Some((remaining, err)) = state.fail_after.as_mut() {
            if *remaining == 0 {
                let err = err.clone();
                state.fail_after = None;
                return Err(err);
            }
            *remaining -= 1;
        }
        state.mutations.push(mutation);
        Ok(state)
    }
}

#[async_trait]
impl HCloudClient for FakeHCloud {
    async fn get_network(&self, id: i64) -> HCloudResult<Option<Network>> {
        Ok(self.check_read()?.networks.get(&id).cloned())
    }

    async fn list_networks(&self, opts: &ListOpts) -> HCloudResult<Vec<Network>> {
        Ok(self
            .check_read()?
            .networks
            .values()
            .filter(|n| opts.matches(&n.name, &n.labels))
            .cloned()
            .collect())
    }

    async fn create_network(&self, opts: &NetworkCreateOpts) -> HCloudResult<Network> {
        let mut state = self.check_mutation(Mutation::CreateNetwork(opts.name.clone()))?;
        if state.networks.values().any(|n| n.name == opts.name) {
            return Err(HCloudError::Conflict(format!("network {} exists", opts.name)));
        }
        let network = Network {
            id: state.next_id(),
            name: opts.name.clone(),
            ip_range: opts.ip_range.clone(),
            labels: opts.labels.clone(),
        };
        state.networks.insert(network.id, network.clone());
        Ok(network)
    }

    async fn delete_network(&self, id: i64) -> HCloudResult<()> {
        let mut state = self.check_mutation(Mutation::DeleteNetwork(id))?;
        state
            .networks
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| HCloudError::NotFound(format!("network {}", id)))
    }

    async fn get_load_balancer(&self, id: i64) -> HCloudResult<Option<LoadBalancer>> {
        let mut state = self.check_read()?;
        if let Some((target, labels)) = state.relabel_on_get.take() {
            if target == id {
                if let Some(lb) = state.load_balancers.get_mut(&id) {
                    lb.labels = labels;
                }
            } else {
                state.relabel_on_get = Some((target, labels));
            }
        }
        Ok(state.load_balancers.get(&id).cloned())
    }

    async fn list_load_balancers(&self, opts: &ListOpts) -> HCloudResult<Vec<LoadBalancer>> {
        Ok(self
            .check_read()?
            .load_balancers
            .values()
            .filter(|lb| opts.matches(&lb.name, &lb.labels))
            .cloned()
            .collect())
    }

    async fn create_load_balancer(&self, opts: &LoadBalancerCreateOpts) -> HCloudResult<LoadBalancer> {
        let mut state = self.check_mutation(Mutation::CreateLoadBalancer(opts.name.clone()))?;
        if state.load_balancers.values().any(|lb| lb.name == opts.name) {
            return Err(HCloudError::Conflict(format!("load balancer {} exists", opts.name)));
        }
        let id = state.next_id();
        let lb = LoadBalancer {
            id,
            name: opts.name.clone(),
            load_balancer_type: opts.load_balancer_type.clone(),
            algorithm: opts.algorithm,
            location: opts.location.clone(),
            labels: opts.labels.clone(),
            services: Vec::new(),
            public_ipv4: Some(format!("192.0.2.{}", id)),
            public_ipv6: None,
            private_networks: opts.network.into_iter().collect(),
        };
        state.load_balancers.insert(id, lb.clone());
        Ok(lb)
    }

    async fn update_load_balancer(&self, id: i64, opts: &LoadBalancerUpdateOpts) -> HCloudResult<LoadBalancer> {
        let mut state = self.check_mutation(Mutation::UpdateLoadBalancer(id))?;
        let lb = state
            .load_balancers
            .get_mut(&id)
            .ok_or_else(|| HCloudError::NotFound(format!("load balancer {}", id)))?;
        if let Some(name) = &opts.name {
            lb.name = name.clone();
        }
        if let Some(labels) = &opts.labels {
            lb.labels = labels.clone();
        }
        Ok(lb.clone())
    }

    async fn change_load_balancer_type(&self, id: i64, load_balancer_type: &str) -> HCloudResult<()> {
        let mut state = self.check_mutation(Mutation::ChangeLoadBalancerType(id, load_balancer_type.to_string()))?;
        let lb = state
            .load_balancers
            .get_mut(&id)
            .ok_or_else(|| HCloudError::NotFound(format!("load balancer {}", id)))?;
        lb.load_balancer_type = load_balancer_type.to_string();
        Ok(())
    }

    async fn change_load_balancer_algorithm(&self, id: i64, algorithm: LoadBalancerAlgorithm) -> HCloudResult<()> {
        let mut state = self.check_mutation(Mutation::ChangeLoadBalancerAlgorithm(id, algorithm))?;
        let lb = state
            .load_balancers
            .get_mut(&id)
            .ok_or_else(|| HCloudError::NotFound(format!("load balancer {}", id)))?;
        lb.algorithm = algorithm;
        Ok(())
    }

    async fn add_load_balancer_service(&self, id: i64, service: &LoadBalancerServiceSpec) -> HCloudResult<()> {
        let mut state = self.check_mutation(Mutation::AddService(id, service.clone()))?;
        let lb = state
            .load_balancers
            .get_mut(&id)
            .ok_or_else(|| HCloudError::NotFound(format!("load balancer {}", id)))?;
        if lb.services.iter().any(|s| s.listen_port == service.listen_port) {
            return Err(HCloudError::Conflict(format!("listen port {} in use", service.listen_port)));
        }
        lb.services.push(service.clone());
        Ok(())
    }

    async fn delete_load_balancer_service(&self, id: i64, listen_port: u16) -> HCloudResult<()> {
        let mut state = self.check_mutation(Mutation::DeleteService(id, listen_port))?;
        let lb = state
            .load_balancers
            .get_mut(&id)
            .ok_or_else(|| HCloudError::NotFound(format!("load balancer {}", id)))?;
        lb.services.retain(|s| s.listen_port != listen_port);
        Ok(())
    }

    async fn delete_load_balancer(&self, id: i64) -> HCloudResult<()> {
        let mut state = self.check_mutation(Mutation::DeleteLoadBalancer(id))?;
        state
            .load_balancers
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| HCloudError::NotFound(format!("load balancer {}", id)))
    }

    async fn list_placement_groups(&self, opts: &ListOpts) -> HCloudResult<Vec<PlacementGroup>> {
        Ok(self
            .check_read()?
            .placement_groups
            .values()
            .filter(|pg| opts.matches(&pg.name, &pg.labels))
            .cloned()
            .collect())
    }

    async fn create_placement_group(&self, opts: &PlacementGroupCreateOpts) -> HCloudResult<PlacementGroup> {
        let mut state = self.check_mutation(Mutation::CreatePlacementGroup(opts.name.clone()))?;
        if state.placement_groups.values().any(|pg| pg.name == opts.name) {
            return Err(HCloudError::Conflict(format!("placement group {} exists", opts.name)));
        }
        let pg = PlacementGroup {
            id: state.next_id(),
            name: opts.name.clone(),
            type_: opts.type_.clone(),
            labels: opts.labels.clone(),
            servers: Vec::new(),
        };
        state.placement_groups.insert(pg.id, pg.clone());
        Ok(pg)
    }

    async fn delete_placement_group(&self, id: i64) -> HCloudResult<()> {
        let mut state = self.check_mutation(Mutation::DeletePlacementGroup(id))?;
        state
            .placement_groups
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| HCloudError::NotFound(format!("placement group {}", id)))
    }
}

/// Hands out the same fake project for every token
pub struct FakeClientFactory(pub Arc<FakeHCloud>);

impl HCloudClientFactory for FakeClientFactory {
    fn new_client(&self, _token: &ApiToken) -> Arc<dyn HCloudClient> {
        self.0.clone()
    }
}

#[derive(Default)]
struct StoreState {
    objects: BTreeMap<ClusterIdentity, ClusterObject>,
    version: u64,
    pending_conflicts: u32,
    status_writes: u32,
}

impl StoreState {
    fn bump(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

/// Cluster store with optimistic versioning
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<StoreState>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, identity: ClusterIdentity, spec: HetznerClusterSpec) {
        let mut state = self.state.lock().unwrap();
        let resource_version = state.bump();
        state.objects.insert(
            identity.clone(),
            ClusterObject {
                identity,
                spec,
                status: HetznerClusterStatus::default(),
                resource_version,
                deleting: false,
                finalizers: Vec::new(),
            },
        );
    }

    pub fn object(&self, identity: &ClusterIdentity) -> Option<ClusterObject> {
        self.state.lock().unwrap().objects.get(identity).cloned()
    }

    pub fn status(&self, identity: &ClusterIdentity) -> HetznerClusterStatus {
        self.object(identity).map(|o| o.status).unwrap_or_default()
    }

    /// Edit the spec as an external writer would
    pub fn update_spec(&self, identity: &ClusterIdentity, edit: impl FnOnce(&mut HetznerClusterSpec)) {
        let mut state = self.state.lock().unwrap();
        let version = state.bump();
        if let Some(object) = state.objects.get_mut(identity) {
            edit(&mut object.spec);
            object.resource_version = version;
        }
    }

    pub fn mark_deleting(&self, identity: &ClusterIdentity) {
        let mut state = self.state.lock().unwrap();
        let version = state.bump();
        if let Some(object) = state.objects.get_mut(identity) {
            object.deleting = true;
            object.resource_version = version;
        }
        let finalized = state
            .objects
            .get(identity)
            .is_some_and(|o| o.finalizers.is_empty());
        if finalized {
            state.objects.remove(identity);
        }
    }

    /// Make the next `count` versioned writes fail after an external edit
    pub fn inject_conflicts(&self, count: u32) {
        self.state.lock().unwrap().pending_conflicts = count;
    }

    pub fn status_writes(&self) -> u32 {
        self.state.lock().unwrap().status_writes
    }

    fn take_conflict(state: &mut StoreState, identity: &ClusterIdentity) -> bool {
        if state.pending_conflicts == 0 {
            return false;
        }
        state.pending_conflicts -= 1;
        let version = state.bump();
        if let Some(object) = state.objects.get_mut(identity) {
            object.resource_version = version;
        }
        true
    }
}

#[async_trait]
impl ClusterStore for FakeStore {
    async fn get(&self, cluster: &ClusterIdentity) -> Result<Option<ClusterObject>, StoreError> {
        Ok(self.object(cluster))
    }

    async fn compare_and_swap_status(
        &self,
        cluster: &ClusterIdentity,
        expected_version: &str,
        status: &HetznerClusterStatus,
    ) -> Result<StatusUpdate, StoreError> {
        let mut state = self.state.lock().unwrap();
        if Self::take_conflict(&mut state, cluster) {
            return Ok(StatusUpdate::Conflict);
        }
        let version = state.bump();
        let Some(object) = state.objects.get_mut(cluster) else {
            return Err(StoreError::Backend(format!("{} not found", cluster)));
        };
        if object.resource_version != expected_version {
            return Ok(StatusUpdate::Conflict);
        }
        object.status = status.clone();
        object.resource_version = version.clone();
        state.status_writes += 1;
        Ok(StatusUpdate::Applied { resource_version: version })
    }

    async fn set_finalizer(
        &self,
        cluster: &ClusterIdentity,
        expected_version: &str,
        present: bool,
    ) -> Result<StatusUpdate, StoreError> {
        let mut state = self.state.lock().unwrap();
        if Self::take_conflict(&mut state, cluster) {
            return Ok(StatusUpdate::Conflict);
        }
        let version = state.bump();
        let Some(object) = state.objects.get_mut(cluster) else {
            return Err(StoreError::Backend(format!("{} not found", cluster)));
        };
        if object.resource_version != expected_version {
            return Ok(StatusUpdate::Conflict);
        }
        object.finalizers.retain(|f| f != CLUSTER_FINALIZER);
        if present {
            object.finalizers.push(CLUSTER_FINALIZER.to_string());
        }
        object.resource_version = version.clone();
        if object.deleting && object.finalizers.is_empty() {
            state.objects.remove(cluster);
        }
        Ok(StatusUpdate::Applied { resource_version: version })
    }
}

/// Credential source returning a fixed lookup result
pub struct FakeCredentials {
    result: Mutex<Result<ApiToken, CredentialError>>,
}

impl FakeCredentials {
    pub fn valid() -> Self {
        Self {
            result: Mutex::new(Ok(ApiToken::new("test-token"))),
        }
    }

    pub fn failing(error: CredentialError) -> Self {
        Self {
            result: Mutex::new(Err(error)),
        }
    }

    pub fn set(&self, result: Result<ApiToken, CredentialError>) {
        *self.result.lock().unwrap() = result;
    }
}

#[async_trait]
impl CredentialSource for FakeCredentials {
    async fn resolve(
        &self,
        _namespace: &str,
        _secret: &HetznerSecretRef,
    ) -> Result<ApiToken, CredentialError> {
        self.result.lock().unwrap().clone()
    }
}

/// Clock advanced by hand
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Build a label map from pairs
pub fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Identity used by most tests
pub fn cluster() -> ClusterIdentity {
    ClusterIdentity::new("default", "c1")
}

/// Pass context for [`cluster`] against `fake`
pub fn pass_context(fake: &Arc<FakeHCloud>) -> crate::context::PassContext {
    crate::context::PassContext::new(
        cluster(),
        fake.clone(),
        Utc::now(),
        std::time::Duration::from_secs(5),
        crate::context::CancelSignal::never(),
    )
}
