//! Reconciliation pass engine
//!
//! One call to [`Engine::reconcile`] reads the cluster object, runs the gate
//! and the resource stages, and writes the resulting status back with a
//! compare-and-swap. A conflicting write discards the computed status and
//! starts over from a fresh read.

use hcloud_api::v1beta1::conditions::{DELETING_REASON, READY_CONDITION};
use hcloud_api::v1beta1::{HetznerClusterSpec, HetznerClusterStatus};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::conditions::ConditionSet;
use crate::context::{CancelSignal, Clock, PassContext, SystemClock};
use crate::error::{CoreError, HCloudError, Result};
use crate::gate::{self, GateDecision, RATE_LIMIT_WINDOW};
use crate::ownership::ClusterIdentity;
use crate::provider::{HCloudClientFactory, HCloudResult};
use crate::store::{ClusterObject, ClusterStore, CredentialSource, StatusUpdate};
use crate::{load_balancer, network, placement_group, status};

/// Timing knobs of the engine
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Upper bound of a single provider call
    pub call_timeout: Duration,
    /// Requeue after the credentials could not be resolved
    pub credential_requeue: Duration,
    /// Requeue after a stage failed with a provider error
    pub transient_requeue: Duration,
    /// Requeue while the cluster is not ready yet
    pub not_ready_requeue: Duration,
    /// Periodic resync of a ready cluster
    pub resync_interval: Duration,
    /// Status write conflicts tolerated within one reconcile call
    pub max_conflicts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(20),
            credential_requeue: Duration::from_secs(5 * 60),
            transient_requeue: Duration::from_secs(30),
            not_ready_requeue: Duration::from_secs(10),
            resync_interval: Duration::from_secs(5 * 60),
            max_conflicts: 3,
        }
    }
}

/// Why a pass asked to be run again
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryReason {
    Credentials,
    RateLimited,
    Transient,
    NotReady,
}

impl fmt::Display for RetryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Credentials => write!(f, "credentials"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Transient => write!(f, "transient"),
            Self::NotReady => write!(f, "not_ready"),
        }
    }
}

/// Result of one reconcile call
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// Converged; nothing left to do until the next change or resync
    Done,
    /// Run again after the given duration
    RetryAfter { after: Duration, reason: RetryReason },
    /// No status could be produced
    Fatal(CoreError),
}

impl ReconcileOutcome {
    fn retry(after: Duration, reason: RetryReason) -> Self {
        Self::RetryAfter { after, reason }
    }

    /// Requeue delay, if any
    pub fn requeue_after(&self) -> Option<Duration> {
        match self {
            Self::RetryAfter { after, .. } => Some(*after),
            _ => None,
        }
    }
}

/// What a pass computed before it is written back
struct PassResult {
    status: HetznerClusterStatus,
    outcome: ReconcileOutcome,
    release_finalizer: bool,
}

#[derive(Default)]
struct StageReport {
    failed: Vec<&'static str>,
    cancelled: bool,
}

impl StageReport {
    fn note(&mut self, stage: &'static str, result: HCloudResult<()>) {
        match result {
            Ok(()) => {}
            Err(HCloudError::Cancelled) => self.cancelled = true,
            Err(e) => {
                warn!("{} stage failed: {}", stage, e);
                self.failed.push(stage);
            }
        }
    }

    fn must_stop(&self, ctx: &PassContext) -> bool {
        self.cancelled || ctx.is_rate_limited()
    }
}

pub struct Engine {
    store: Arc<dyn ClusterStore>,
    credentials: Arc<dyn CredentialSource>,
    clients: Arc<dyn HCloudClientFactory>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        store: Arc<dyn ClusterStore>,
        credentials: Arc<dyn CredentialSource>,
        clients: Arc<dyn HCloudClientFactory>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            credentials,
            clients,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one reconciliation pass for `cluster`
    #[instrument(skip_all, fields(cluster = %cluster))]
    pub async fn reconcile(&self, cluster: &ClusterIdentity, cancel: &CancelSignal) -> ReconcileOutcome {
        match self.run(cluster, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Reconciliation of {} failed: {}", cluster, e);
                ReconcileOutcome::Fatal(e)
            }
        }
    }

    async fn run(&self, cluster: &ClusterIdentity, cancel: &CancelSignal) -> Result<ReconcileOutcome> {
        let mut conflicts = 0;

        loop {
            let Some(mut object) = self.store.get(cluster).await? else {
                debug!("Cluster {} is gone", cluster);
                return Ok(ReconcileOutcome::Done);
            };

            if object.deleting && !object.has_finalizer() {
                return Ok(ReconcileOutcome::Done);
            }

            if !object.deleting && !object.has_finalizer() {
                match self
                    .store
                    .set_finalizer(cluster, &object.resource_version, true)
                    .await?
                {
                    StatusUpdate::Applied { resource_version } => {
                        object.resource_version = resource_version;
                    }
                    StatusUpdate::Conflict => {
                        self.note_conflict(&mut conflicts)?;
                        continue;
                    }
                }
            }

            let pass = if object.deleting {
                self.deletion_pass(&object, cancel).await?
            } else {
                self.apply_pass(&object, cancel).await?
            };

            if pass.release_finalizer {
                match self
                    .store
                    .set_finalizer(cluster, &object.resource_version, false)
                    .await?
                {
                    StatusUpdate::Applied { .. } => {
                        info!("Released finalizer of {}", cluster);
                        return Ok(pass.outcome);
                    }
                    StatusUpdate::Conflict => {
                        self.note_conflict(&mut conflicts)?;
                        continue;
                    }
                }
            }

            if pass.status == object.status {
                return Ok(pass.outcome);
            }

            match self
                .store
                .compare_and_swap_status(cluster, &object.resource_version, &pass.status)
                .await?
            {
                StatusUpdate::Applied { .. } => return Ok(pass.outcome),
                StatusUpdate::Conflict => {
                    self.note_conflict(&mut conflicts)?;
                }
            }
        }
    }

    fn note_conflict(&self, conflicts: &mut u32) -> Result<()> {
        *conflicts += 1;
        if *conflicts >= self.config.max_conflicts {
            return Err(CoreError::PersistentConflict(*conflicts));
        }
        debug!("Cluster object changed underneath, recomputing ({} conflicts)", conflicts);
        Ok(())
    }

    /// Resolve credentials and run the gate, returning a pass context when
    /// provider calls are allowed
    async fn admit(
        &self,
        object: &ClusterObject,
        conditions: &mut ConditionSet,
        cancel: &CancelSignal,
    ) -> std::result::Result<PassContext, ReconcileOutcome> {
        let now = self.clock.now();
        let lookup = self
            .credentials
            .resolve(&object.identity.namespace, &object.spec.hetzner_secret_ref)
            .await;

        match gate::evaluate(lookup, conditions, now) {
            GateDecision::Proceed(token) => Ok(PassContext::new(
                object.identity.clone(),
                self.clients.new_client(&token),
                now,
                self.config.call_timeout,
                cancel.clone(),
            )),
            GateDecision::Blocked { reason } => {
                info!("Not reconciling {}: {}", object.identity, reason);
                Err(ReconcileOutcome::retry(
                    self.config.credential_requeue,
                    RetryReason::Credentials,
                ))
            }
            GateDecision::Backoff(after) => {
                info!("Hetzner API rate limit backoff for {}, retrying in {:?}", object.identity, after);
                Err(ReconcileOutcome::retry(after, RetryReason::RateLimited))
            }
        }
    }

    async fn apply_pass(&self, object: &ClusterObject, cancel: &CancelSignal) -> Result<PassResult> {
        let spec = &object.spec;
        let mut status = object.status.clone();
        let mut conditions = ConditionSet::from_conditions(&status.conditions);

        let pending = match self.admit(object, &mut conditions, cancel).await {
            Ok(ctx) => {
                let report = run_stages(&ctx, spec, &mut status, &mut conditions).await;
                if report.cancelled {
                    return Err(CoreError::Cancelled);
                }
                gate::record_api_outcome(ctx.api_outcome(), &mut conditions, ctx.now);

                if ctx.is_rate_limited() {
                    Some(ReconcileOutcome::retry(RATE_LIMIT_WINDOW, RetryReason::RateLimited))
                } else if !report.failed.is_empty() {
                    Some(ReconcileOutcome::retry(
                        self.config.transient_requeue,
                        RetryReason::Transient,
                    ))
                } else {
                    None
                }
            }
            Err(outcome) => Some(outcome),
        };

        let ready = status::aggregate(spec, &mut status, &mut conditions, self.clock.now());
        status.conditions = conditions.to_conditions();

        let outcome = match pending {
            Some(outcome) => outcome,
            None if ready => ReconcileOutcome::Done,
            None => ReconcileOutcome::retry(self.config.not_ready_requeue, RetryReason::NotReady),
        };

        Ok(PassResult {
            status,
            outcome,
            release_finalizer: false,
        })
    }

    async fn deletion_pass(&self, object: &ClusterObject, cancel: &CancelSignal) -> Result<PassResult> {
        let mut status = object.status.clone();
        let mut conditions = ConditionSet::from_conditions(&status.conditions);
        conditions.mark_false(READY_CONDITION, DELETING_REASON, "cluster is being deleted", self.clock.now());
        status.ready = false;

        let ctx = match self.admit(object, &mut conditions, cancel).await {
            Ok(ctx) => ctx,
            Err(outcome) => {
                status.conditions = conditions.to_conditions();
                return Ok(PassResult {
                    status,
                    outcome,
                    release_finalizer: false,
                });
            }
        };

        let result = delete_owned(&ctx, &mut status).await;
        gate::record_api_outcome(ctx.api_outcome(), &mut conditions, ctx.now);
        status.conditions = conditions.to_conditions();

        let (outcome, release_finalizer) = match result {
            Ok(()) => {
                info!("Deleted all Hetzner resources owned by {}", object.identity);
                (ReconcileOutcome::Done, true)
            }
            Err(HCloudError::Cancelled) => return Err(CoreError::Cancelled),
            Err(e) if e.is_rate_limit() => (
                ReconcileOutcome::retry(RATE_LIMIT_WINDOW, RetryReason::RateLimited),
                false,
            ),
            Err(e) => {
                warn!("Deleting resources of {} failed: {}", object.identity, e);
                (
                    ReconcileOutcome::retry(self.config.transient_requeue, RetryReason::Transient),
                    false,
                )
            }
        };

        Ok(PassResult {
            status,
            outcome,
            release_finalizer,
        })
    }
}

/// Network, placement groups, then the load balancer, which attaches to the network
async fn run_stages(
    ctx: &PassContext,
    spec: &HetznerClusterSpec,
    status: &mut HetznerClusterStatus,
    conditions: &mut ConditionSet,
) -> StageReport {
    let mut report = StageReport::default();

    report.note(
        "network",
        network::reconcile(ctx, &spec.hcloud_network, status, conditions).await,
    );
    if report.must_stop(ctx) {
        return report;
    }

    report.note(
        "placement groups",
        placement_group::reconcile(ctx, &spec.hcloud_placement_groups, status, conditions).await,
    );
    if report.must_stop(ctx) {
        return report;
    }

    report.note(
        "load balancer",
        load_balancer::reconcile(ctx, spec, status, conditions).await,
    );
    report
}

/// The load balancer goes first since it may still be attached to the network
async fn delete_owned(ctx: &PassContext, status: &mut HetznerClusterStatus) -> HCloudResult<()> {
    load_balancer::delete(ctx, status).await?;
    status.control_plane_endpoint = None;
    placement_group::delete(ctx, status).await?;
    network::delete(ctx, status).await
}
