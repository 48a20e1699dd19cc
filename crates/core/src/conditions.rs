//! Condition model.
//!
//! A resource status carries an ordered set of named boolean conditions. Each
//! controller owns a subset of condition types: on every full reconcile pass it
//! replaces its owned conditions, and when persisting only those are written
//! over the stored object. Conditions outside the owned set are left as found.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Reason used when a reconcile pass converged.
pub const SUCCEEDED_REASON: &str = "Succeeded";

/// Reason used while a new generation is being processed.
pub const PROGRESSING_REASON: &str = "Progressing";

/// Catch-all reason for failures outside the registry taxonomy.
pub const FAILED_REASON: &str = "Failed";

/// Name of a condition.
///
/// The controller works with the fixed set below; any other name is preserved
/// verbatim as [`ConditionType::Other`] so foreign conditions survive a patch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionType {
    Ready,
    Reconciling,
    Stalled,
    CreateFailed,
    UpdateFailed,
    FetchFailed,
    Other(String),
}

impl ConditionType {
    /// Get the wire name of the condition.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ready => "Ready",
            Self::Reconciling => "Reconciling",
            Self::Stalled => "Stalled",
            Self::CreateFailed => "CreateFailed",
            Self::UpdateFailed => "UpdateFailed",
            Self::FetchFailed => "FetchFailed",
            Self::Other(name) => name,
        }
    }

    const fn rank(&self) -> u8 {
        match self {
            Self::Ready => 0,
            Self::Reconciling => 1,
            Self::Stalled => 2,
            _ => 3,
        }
    }
}

impl From<String> for ConditionType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Ready" => Self::Ready,
            "Reconciling" => Self::Reconciling,
            "Stalled" => Self::Stalled,
            "CreateFailed" => Self::CreateFailed,
            "UpdateFailed" => Self::UpdateFailed,
            "FetchFailed" => Self::FetchFailed,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for ConditionType {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<ConditionType> for String {
    fn from(value: ConditionType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Ord for ConditionType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.as_str().cmp(other.as_str()))
    }
}

impl PartialOrd for ConditionType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A single named boolean condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: bool,
    pub reason: String,
    pub message: String,
    #[serde(default)]
    pub observed_generation: i64,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a condition stamped with the current time.
    pub fn new(
        type_: ConditionType,
        status: bool,
        reason: impl Into<String>,
        message: impl Into<String>,
        observed_generation: i64,
    ) -> Self {
        Self {
            type_,
            status,
            reason: reason.into(),
            message: message.into(),
            observed_generation,
            last_transition_time: Utc::now(),
        }
    }
}

/// Ordered set of conditions keyed by type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    /// Create an empty condition set.
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Get a condition by type.
    pub fn get(&self, type_: &ConditionType) -> Option<&Condition> {
        self.0.iter().find(|c| &c.type_ == type_)
    }

    /// Whether the condition is present with value `true`.
    pub fn is_true(&self, type_: &ConditionType) -> bool {
        self.get(type_).is_some_and(|c| c.status)
    }

    /// Whether the condition is present with value `false`.
    pub fn is_false(&self, type_: &ConditionType) -> bool {
        self.get(type_).is_some_and(|c| !c.status)
    }

    /// Ready iff the Ready condition is true.
    pub fn is_ready(&self) -> bool {
        self.is_true(&ConditionType::Ready)
    }

    /// Stalled iff the Stalled condition is true.
    pub fn is_stalled(&self) -> bool {
        self.is_true(&ConditionType::Stalled)
    }

    /// Insert or replace a condition.
    ///
    /// The transition time of the replaced condition is kept when the boolean
    /// value did not change.
    pub fn set(&mut self, mut condition: Condition) {
        match self.0.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) => {
                if existing.status == condition.status {
                    condition.last_transition_time = existing.last_transition_time;
                }
                *existing = condition;
            }
            None => {
                self.0.push(condition);
                self.0.sort_by(|a, b| a.type_.cmp(&b.type_));
            }
        }
    }

    /// Set a condition to true.
    pub fn mark_true(
        &mut self,
        type_: ConditionType,
        reason: &str,
        message: impl Into<String>,
        generation: i64,
    ) {
        self.set(Condition::new(type_, true, reason, message, generation));
    }

    /// Set a condition to false.
    pub fn mark_false(
        &mut self,
        type_: ConditionType,
        reason: &str,
        message: impl Into<String>,
        generation: i64,
    ) {
        self.set(Condition::new(type_, false, reason, message, generation));
    }

    /// Mark the object as reconciling. Clears Stalled.
    pub fn mark_reconciling(&mut self, reason: &str, message: impl Into<String>, generation: i64) {
        self.delete(&ConditionType::Stalled);
        self.mark_true(ConditionType::Reconciling, reason, message, generation);
    }

    /// Mark the object as stalled. Clears Reconciling.
    pub fn mark_stalled(&mut self, reason: &str, message: impl Into<String>, generation: i64) {
        self.delete(&ConditionType::Reconciling);
        self.mark_true(ConditionType::Stalled, reason, message, generation);
    }

    /// Remove a condition.
    pub fn delete(&mut self, type_: &ConditionType) {
        self.0.retain(|c| &c.type_ != type_);
    }

    /// Remove every condition in the owned set.
    pub fn clear_owned(&mut self, owned: &[ConditionType]) {
        self.0.retain(|c| !owned.contains(&c.type_));
    }

    /// Restore transition times from `previous` for conditions whose value did not flip.
    pub fn carry_transition_times(&mut self, previous: &Self) {
        for condition in &mut self.0 {
            if let Some(prev) = previous.get(&condition.type_) {
                if prev.status == condition.status {
                    condition.last_transition_time = prev.last_transition_time;
                }
            }
        }
    }

    /// Merge a locally computed set into the stored set.
    ///
    /// Owned types take the local value (including absence). Every other type
    /// keeps the stored value.
    pub fn merge_owned(stored: &Self, local: &Self, owned: &[ConditionType]) -> Self {
        let merged = stored
            .0
            .iter()
            .filter(|c| !owned.contains(&c.type_))
            .chain(local.0.iter().filter(|c| owned.contains(&c.type_)))
            .cloned()
            .sorted_by(|a, b| a.type_.cmp(&b.type_))
            .collect_vec();
        Self(merged)
    }

    /// Iterate over the conditions in order.
    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    /// Number of conditions.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Objects carrying a generation and a condition set in their status.
pub trait Conditioned {
    /// Current metadata generation.
    fn generation(&self) -> i64;

    /// Conditions in the status subtree.
    fn conditions(&self) -> &Conditions;

    /// Mutable conditions in the status subtree.
    fn conditions_mut(&mut self) -> &mut Conditions;

    /// Generation the status was last computed for.
    fn observed_generation(&self) -> i64;

    /// Record the generation the status reflects.
    fn set_observed_generation(&mut self, generation: i64);

    fn mark_true(&mut self, type_: ConditionType, reason: &str, message: impl Into<String>) {
        let generation = self.generation();
        self.conditions_mut()
            .mark_true(type_, reason, message, generation);
    }

    fn mark_false(&mut self, type_: ConditionType, reason: &str, message: impl Into<String>) {
        let generation = self.generation();
        self.conditions_mut()
            .mark_false(type_, reason, message, generation);
    }

    fn mark_reconciling(&mut self, reason: &str, message: impl Into<String>) {
        let generation = self.generation();
        self.conditions_mut()
            .mark_reconciling(reason, message, generation);
    }

    fn mark_stalled(&mut self, reason: &str, message: impl Into<String>) {
        let generation = self.generation();
        self.conditions_mut()
            .mark_stalled(reason, message, generation);
    }

    fn is_ready(&self) -> bool {
        self.conditions().is_ready()
    }

    fn is_stalled(&self) -> bool {
        self.conditions().is_stalled()
    }
}
