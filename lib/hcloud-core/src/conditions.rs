//! Ordered condition map carried through a reconciliation pass
//!
//! Conditions are read from the stored status once, mutated by the gate and
//! the stages, and written back as a whole at the end of the pass.

use chrono::{DateTime, Utc};
use hcloud_api::v1beta1::{Condition, ConditionStatus};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConditionSet {
    conditions: BTreeMap<String, Condition>,
}

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_conditions(conditions: &[Condition]) -> Self {
        Self {
            conditions: conditions
                .iter()
                .map(|c| (c.type_.clone(), c.clone()))
                .collect(),
        }
    }

    /// Conditions ordered by type
    pub fn to_conditions(&self) -> Vec<Condition> {
        self.conditions.values().cloned().collect()
    }

    pub fn get(&self, type_: &str) -> Option<&Condition> {
        self.conditions.get(type_)
    }

    pub fn is_true(&self, type_: &str) -> bool {
        self.get(type_).is_some_and(Condition::is_true)
    }

    /// Whether the condition is False with the given reason
    pub fn is_false_with_reason(&self, type_: &str, reason: &str) -> bool {
        self.get(type_)
            .is_some_and(|c| c.is_false() && c.reason == reason)
    }

    /// Set a condition. The transition time only moves when status or reason
    /// change; otherwise only the message is refreshed.
    pub fn set(
        &mut self,
        type_: &str,
        status: ConditionStatus,
        reason: &str,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        let message = message.into();
        match self.conditions.get_mut(type_) {
            Some(existing) if existing.status == status && existing.reason == reason => {
                existing.message = message;
            }
            _ => {
                self.conditions.insert(
                    type_.to_string(),
                    Condition {
                        type_: type_.to_string(),
                        status,
                        reason: reason.to_string(),
                        message,
                        last_transition_time: now,
                    },
                );
            }
        }
    }

    pub fn mark_true(&mut self, type_: &str, now: DateTime<Utc>) {
        self.set(type_, ConditionStatus::True, "", String::new(), now);
    }

    pub fn mark_false(
        &mut self,
        type_: &str,
        reason: &str,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        self.set(type_, ConditionStatus::False, reason, message, now);
    }

    /// Drop a condition that no longer applies
    pub fn remove(&mut self, type_: &str) -> Option<Condition> {
        self.conditions.remove(type_)
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}
