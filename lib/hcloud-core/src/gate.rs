//! Credential and rate-limit gate
//!
//! The gate is the only admission point to the provider API: a pass whose
//! gate decision is not [`GateDecision::Proceed`] issues no provider calls.

use chrono::{DateTime, Utc};
use hcloud_api::v1beta1::conditions::{
    HCLOUD_CREDENTIALS_INVALID_REASON, HCLOUD_TOKEN_AVAILABLE_CONDITION,
    HETZNER_API_REACHABLE_CONDITION, HETZNER_SECRET_UNREACHABLE_REASON,
    RATE_LIMIT_EXCEEDED_REASON,
};
use hcloud_api::v1beta1::{Condition, ConditionStatus};
use std::time::Duration;
use tracing::{debug, warn};

use crate::conditions::ConditionSet;
use crate::context::ApiOutcome;
use crate::store::{ApiToken, CredentialError};

/// Cool-down after the provider rejected a call for rate limiting
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, PartialEq, Eq)]
pub enum GateDecision {
    /// Reconciliation may call the provider with this token
    Proceed(ApiToken),
    /// No usable credentials; `reason` was recorded on `HCloudTokenAvailable`
    Blocked { reason: &'static str },
    /// Still inside the rate-limit window; come back after the duration
    Backoff(Duration),
}

/// Decide whether this pass may talk to the provider.
///
/// Records `HCloudTokenAvailable`. A pending rate-limit backoff leaves
/// `HetznerAPIReachable` untouched so its transition time keeps counting.
pub fn evaluate(
    lookup: Result<ApiToken, CredentialError>,
    conditions: &mut ConditionSet,
    now: DateTime<Utc>,
) -> GateDecision {
    let token = match lookup {
        Ok(token) => token,
        Err(e) => {
            let reason = match e {
                CredentialError::NotFound(_) | CredentialError::Unreachable { .. } => {
                    HETZNER_SECRET_UNREACHABLE_REASON
                }
                CredentialError::MissingKey { .. } | CredentialError::EmptyValue { .. } => {
                    HCLOUD_CREDENTIALS_INVALID_REASON
                }
            };
            warn!("Hetzner credentials unavailable: {}", e);
            conditions.mark_false(HCLOUD_TOKEN_AVAILABLE_CONDITION, reason, e.to_string(), now);
            return GateDecision::Blocked { reason };
        }
    };
    conditions.mark_true(HCLOUD_TOKEN_AVAILABLE_CONDITION, now);

    if let Some(remaining) = conditions
        .get(HETZNER_API_REACHABLE_CONDITION)
        .and_then(|c| compute_backoff(c, now))
    {
        debug!("Rate limit backoff active for another {:?}", remaining);
        return GateDecision::Backoff(remaining);
    }

    // An elapsed window is reopened as Unknown so a fresh rejection is a new
    // transition and starts a full window again
    if conditions.is_false_with_reason(HETZNER_API_REACHABLE_CONDITION, RATE_LIMIT_EXCEEDED_REASON) {
        debug!("Rate limit window elapsed, probing the Hetzner API again");
        conditions.set(
            HETZNER_API_REACHABLE_CONDITION,
            ConditionStatus::Unknown,
            RATE_LIMIT_EXCEEDED_REASON,
            "rate limit window elapsed",
            now,
        );
    }

    GateDecision::Proceed(token)
}

/// Time left in the rate-limit window recorded by `condition`, if any.
///
/// Returns `None` unless the condition is False with reason
/// `RateLimitExceeded` and less than [`RATE_LIMIT_WINDOW`] has passed since
/// its last transition.
pub fn compute_backoff(condition: &Condition, now: DateTime<Utc>) -> Option<Duration> {
    if !condition.is_false() || condition.reason != RATE_LIMIT_EXCEEDED_REASON {
        return None;
    }

    let window = chrono::Duration::from_std(RATE_LIMIT_WINDOW).ok()?;
    let elapsed = now.signed_duration_since(condition.last_transition_time);
    (window - elapsed)
        .to_std()
        .ok()
        .filter(|remaining| !remaining.is_zero())
        .map(|remaining| remaining.min(RATE_LIMIT_WINDOW))
}

/// Fold the API behaviour of a finished pass into `HetznerAPIReachable`
pub fn record_api_outcome(outcome: ApiOutcome, conditions: &mut ConditionSet, now: DateTime<Utc>) {
    match outcome {
        ApiOutcome::RateLimited => conditions.mark_false(
            HETZNER_API_REACHABLE_CONDITION,
            RATE_LIMIT_EXCEEDED_REASON,
            "Hetzner Cloud API rate limit exceeded",
            now,
        ),
        ApiOutcome::Reachable => conditions.mark_true(HETZNER_API_REACHABLE_CONDITION, now),
        ApiOutcome::Untouched => {}
    }
}
