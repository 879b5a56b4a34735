//! Per-pass context shared by the reconciler stages

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use crate::error::HCloudError;
use crate::ownership::{ClusterIdentity, ResourceOwnership};
use crate::provider::HCloudClient;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Cancellation signal checked before every provider call
#[derive(Clone, Debug, Default)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// Sending side of a [`CancelSignal`]
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl CancelSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        Self::default()
    }

    pub fn channel() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (
            CancelHandle { tx },
            CancelSignal {
                rx: Some(rx),
                deadline: None,
            },
        )
    }

    /// Also fire once `deadline` has passed
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return true;
        }
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

/// How the provider API behaved during a pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiOutcome {
    /// No call was issued
    Untouched,
    /// At least one call succeeded and none was rate limited
    Reachable,
    /// A call was rejected by the rate limiter
    RateLimited,
}

/// Everything a stage needs to talk to the provider for one cluster
pub struct PassContext {
    pub cluster: ClusterIdentity,
    pub ownership: ResourceOwnership,
    pub client: Arc<dyn HCloudClient>,
    pub now: DateTime<Utc>,
    call_timeout: Duration,
    cancel: CancelSignal,
    rate_limited: AtomicBool,
    succeeded: AtomicBool,
    mutations: AtomicU32,
}

impl PassContext {
    pub fn new(
        cluster: ClusterIdentity,
        client: Arc<dyn HCloudClient>,
        now: DateTime<Utc>,
        call_timeout: Duration,
        cancel: CancelSignal,
    ) -> Self {
        let ownership = cluster.ownership();
        Self {
            cluster,
            ownership,
            client,
            now,
            call_timeout,
            cancel,
            rate_limited: AtomicBool::new(false),
            succeeded: AtomicBool::new(false),
            mutations: AtomicU32::new(0),
        }
    }

    /// Issue a read-only provider call
    pub async fn read<T, F>(&self, op: &str, call: F) -> Result<T, HCloudError>
    where
        F: Future<Output = Result<T, HCloudError>>,
    {
        self.call(op, call).await
    }

    /// Issue a mutating provider call
    pub async fn mutate<T, F>(&self, op: &str, call: F) -> Result<T, HCloudError>
    where
        F: Future<Output = Result<T, HCloudError>>,
    {
        let result = self.call(op, call).await;
        if result.is_ok() {
            self.mutations.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    async fn call<T, F>(&self, op: &str, call: F) -> Result<T, HCloudError>
    where
        F: Future<Output = Result<T, HCloudError>>,
    {
        if self.cancel.is_cancelled() {
            return Err(HCloudError::Cancelled);
        }
        // The provider already rejected us in this pass; don't keep knocking.
        if self.is_rate_limited() {
            return Err(HCloudError::RateLimited);
        }

        let result = match time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(HCloudError::Timeout),
        };

        match &result {
            Ok(_) => {
                self.succeeded.store(true, Ordering::Relaxed);
            }
            Err(e) if e.is_rate_limit() => {
                warn!("Hetzner API rate limit hit during {} for {}", op, self.cluster);
                self.rate_limited.store(true, Ordering::Relaxed);
            }
            Err(e) => {
                debug!("{} failed for {}: {}", op, self.cluster, e);
            }
        }
        result
    }

    pub fn is_rate_limited(&self) -> bool {
        self.rate_limited.load(Ordering::Relaxed)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn api_outcome(&self) -> ApiOutcome {
        if self.is_rate_limited() {
            ApiOutcome::RateLimited
        } else if self.succeeded.load(Ordering::Relaxed) {
            ApiOutcome::Reachable
        } else {
            ApiOutcome::Untouched
        }
    }

    /// Number of successful mutating calls issued so far
    pub fn mutations(&self) -> u32 {
        self.mutations.load(Ordering::Relaxed)
    }
}
