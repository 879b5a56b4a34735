//! Reconciliation core for Hetzner cluster infrastructure
//!
//! This library provides:
//! - Ownership tagging that tells controller-owned resources from foreign ones
//! - The credential and rate-limit gate admitting a reconciliation pass
//! - Network, load balancer and placement group reconcilers
//! - Aggregation of component conditions into cluster readiness
//! - The pass engine driving all of the above against the cluster store

pub mod error;
pub mod ownership;
pub mod conditions;
pub mod gate;
pub mod provider;
pub mod store;
pub mod context;
pub mod network;
pub mod load_balancer;
pub mod placement_group;
pub mod status;
pub mod engine;

#[cfg(test)]
pub(crate) mod testing;

pub use conditions::ConditionSet;
pub use context::{CancelHandle, CancelSignal, Clock, SystemClock};
pub use engine::{Engine, EngineConfig, ReconcileOutcome, RetryReason};
pub use error::{CoreError, HCloudError, Result};
pub use gate::{compute_backoff, GateDecision, RATE_LIMIT_WINDOW};
pub use ownership::{ClusterIdentity, Ownership, ResourceOwnership};
pub use provider::{HCloudClient, HCloudClientFactory};
pub use store::{
    ApiToken, ClusterObject, ClusterStore, CredentialError, CredentialSource, StatusUpdate,
    StoreError,
};
