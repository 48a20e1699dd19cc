//! Core types for the reconciler.

use cfp_core::ConditionType;

/// Condition types written by both reconcilers.
pub const OWNED_CONDITIONS: &[ConditionType] = &[
    ConditionType::Ready,
    ConditionType::Reconciling,
    ConditionType::Stalled,
    ConditionType::CreateFailed,
    ConditionType::UpdateFailed,
    ConditionType::FetchFailed,
];

/// Outcome of a successful reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileResult {
    /// Re-deliver the key immediately.
    pub requeue: bool,
}

impl ReconcileResult {
    /// Converged; nothing to schedule.
    pub const fn done() -> Self {
        Self { requeue: false }
    }

    /// Reconcile again right away.
    pub const fn requeue() -> Self {
        Self { requeue: true }
    }
}
