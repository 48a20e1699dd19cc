//! The `Reconciler` seam and the status bookkeeping shared by both kinds.
//!
//! A pass reads the object, performs its convergence step and writes the
//! object back exactly once. Owned conditions are rebuilt from scratch on every
//! full pass; transition times survive when a value did not flip.

use async_trait::async_trait;
use cfp_core::{
    ConditionType, Conditioned, Conditions, FAILED_REASON, ObjectKey, PROGRESSING_REASON,
    Resource, SUCCEEDED_REASON,
};
use cfp_registry::{ErrorReason, Operation};
use cfp_store::{ObjectStore, PatchOptions};
use tracing::warn;

use crate::error::{Error, Result};
use crate::types::ReconcileResult;

/// Converges one object of a kind toward its spec.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    /// Kind handled by this reconciler.
    type Object: Resource;

    /// Run one pass for `key`. A missing object is not an error.
    async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileResult>;
}

/// Start a full pass: drop owned conditions and flag a new generation.
///
/// Returns the conditions as they were before the pass.
pub(crate) fn begin_pass<R: Resource>(obj: &mut R, owned: &[ConditionType]) -> Conditions {
    let previous = obj.conditions().clone();
    obj.conditions_mut().clear_owned(owned);

    let generation = obj.generation();
    if generation != obj.observed_generation() {
        obj.mark_reconciling(
            PROGRESSING_REASON,
            format!("Reconciling a new generation of the object {generation}"),
        );
    }
    previous
}

/// Finish a pass by translating its outcome into conditions.
pub(crate) fn finish_pass<R: Resource>(
    obj: &mut R,
    previous: &Conditions,
    outcome: &Result<ReconcileResult>,
) {
    match outcome {
        Ok(result) if !result.requeue => mark_succeeded(obj),
        Ok(_) => {}
        Err(err) => record_failure(obj, err),
    }
    obj.conditions_mut().carry_transition_times(previous);
}

/// Start a deletion pass: drop owned conditions without flagging a generation.
pub(crate) fn begin_delete_pass<R: Resource>(obj: &mut R, owned: &[ConditionType]) -> Conditions {
    let previous = obj.conditions().clone();
    obj.conditions_mut().clear_owned(owned);
    previous
}

/// Finish a deletion pass. Only a failure leaves conditions behind.
pub(crate) fn finish_delete_pass<R: Resource>(
    obj: &mut R,
    previous: &Conditions,
    outcome: &Result<ReconcileResult>,
) {
    if let Err(err) = outcome {
        record_failure(obj, err);
    }
    obj.conditions_mut().carry_transition_times(previous);
}

fn mark_succeeded<R: Resource>(obj: &mut R) {
    for type_ in [
        ConditionType::Reconciling,
        ConditionType::CreateFailed,
        ConditionType::UpdateFailed,
        ConditionType::FetchFailed,
    ] {
        obj.conditions_mut().delete(&type_);
    }
    let message = format!("reconciled '{}' successfully", obj.meta().name);
    obj.mark_true(ConditionType::Ready, SUCCEEDED_REASON, message);
}

/// Condition raised for a rejected registry operation.
const fn failure_condition(reason: ErrorReason) -> Option<ConditionType> {
    match reason.operation() {
        Some(Operation::Create) => Some(ConditionType::CreateFailed),
        Some(Operation::Update) => Some(ConditionType::UpdateFailed),
        Some(Operation::Fetch) => Some(ConditionType::FetchFailed),
        Some(Operation::Delete) | None => None,
    }
}

/// Map a failed pass onto exactly one failure update plus `Ready=False`.
pub(crate) fn record_failure<R: Resource>(obj: &mut R, err: &Error) {
    let message = err.to_string();

    match (err, err.registry_reason()) {
        (_, Some(ErrorReason::InvalidRequest)) => {
            let code = ErrorReason::InvalidRequest.code();
            obj.mark_stalled(code, message.clone());
            obj.mark_false(ConditionType::Ready, code, message);
        }
        (_, Some(ErrorReason::Unknown)) => {
            obj.mark_false(ConditionType::Ready, FAILED_REASON, message);
        }
        (_, Some(reason)) => {
            if let Some(condition) = failure_condition(reason) {
                obj.mark_true(condition, reason.code(), message.clone());
            }
            obj.mark_false(ConditionType::Ready, reason.code(), message);
        }
        (Error::UnresolvedSpeaker { .. }, None) => {
            let code = ConditionType::FetchFailed.as_str().to_string();
            obj.mark_true(ConditionType::FetchFailed, &code, message.clone());
            obj.mark_false(ConditionType::Ready, FAILED_REASON, message);
        }
        (_, None) => {
            obj.mark_false(ConditionType::Ready, FAILED_REASON, message);
        }
    }
}

/// Persist finalizers and status.
///
/// Observed generation is recorded only when the object ends the pass Ready or
/// Stalled. A vanished object is fine once deletion was requested.
pub(crate) async fn write_back<R: Resource>(
    store: &dyn ObjectStore<R>,
    obj: &mut R,
    owned: &[ConditionType],
    field_owner: &str,
) -> Result<()> {
    if obj.is_ready() || obj.is_stalled() {
        let generation = obj.generation();
        obj.set_observed_generation(generation);
    }

    let options = PatchOptions::new()
        .with_owned_conditions(owned)
        .with_field_owner(field_owner);

    match store.patch(obj, &options).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_not_found() && obj.meta().is_being_deleted() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Combine the pass outcome with the write-back result.
pub(crate) fn settle(
    key: &ObjectKey,
    outcome: Result<ReconcileResult>,
    written: Result<()>,
) -> Result<ReconcileResult> {
    match (outcome, written) {
        (outcome, Ok(())) => outcome,
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Err(write_err)) => {
            warn!(object = %key, error = %write_err, "Status write-back failed after failed pass");
            Err(e)
        }
    }
}
