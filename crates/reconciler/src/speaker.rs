//! Speaker reconciler.
//!
//! ```text
//! NoFinalizer -> AwaitingFirstReconcile -> {Creating | Updating} -> Converged
//!                       any live state -> Deleting -> Removed
//! ```
//!
//! The finalizer is persisted before any remote side effect. A Speaker with no
//! remote id is created in the registry; one with an id is fetched and only
//! updated when the remote content differs.

use std::sync::Arc;

use async_trait::async_trait;
use cfp_core::{FINALIZER, ObjectKey, ResourceKind, Speaker};
use cfp_registry::{Record, Registry, SpeakerRecord};
use cfp_store::ObjectStore;
use tracing::{debug, info};

use crate::error::Result;
use crate::reconciler::{
    Reconciler, begin_delete_pass, begin_pass, finish_delete_pass, finish_pass, settle, write_back,
};
use crate::types::{OWNED_CONDITIONS, ReconcileResult};

/// Reconciles Speakers against the registry.
pub struct SpeakerReconciler {
    store: Arc<dyn ObjectStore<Speaker>>,
    registry: Arc<dyn Registry>,
    field_owner: String,
}

impl SpeakerReconciler {
    /// Create a new speaker reconciler.
    pub fn new(
        store: Arc<dyn ObjectStore<Speaker>>,
        registry: Arc<dyn Registry>,
        field_owner: impl Into<String>,
    ) -> Self {
        Self {
            store,
            registry,
            field_owner: field_owner.into(),
        }
    }

    async fn reconcile_live(&self, obj: &mut Speaker) -> Result<ReconcileResult> {
        let record = SpeakerRecord::from_speaker(obj);
        let payload = record.to_payload()?;

        if obj.has_remote_id() {
            return self.sync(obj, &record, &payload).await;
        }

        match self.registry.create(ResourceKind::Speaker, &payload).await {
            Ok(_) => {
                info!(speaker = %obj.metadata.key(), id = %record.id, "Created speaker in registry");
                obj.status.id = record.id;
                Ok(ReconcileResult::done())
            }
            Err(err) => {
                // A previous pass may have created the record without recording the id
                if self.registry.get(ResourceKind::Speaker, &record.id).await.is_err() {
                    return Err(err.into());
                }
                info!(speaker = %obj.metadata.key(), id = %record.id, "Adopted existing registry record");
                obj.status.id = record.id.clone();
                self.sync(obj, &record, &payload).await
            }
        }
    }

    /// Update the remote record only when its content differs.
    async fn sync(
        &self,
        obj: &Speaker,
        record: &SpeakerRecord,
        payload: &[u8],
    ) -> Result<ReconcileResult> {
        let id = obj.status.id.as_str();
        let fetched = self.registry.get(ResourceKind::Speaker, id).await?;

        if record.matches(&fetched) {
            debug!(speaker = %obj.metadata.key(), id, "Registry record up to date");
            return Ok(ReconcileResult::done());
        }

        self.registry.update(ResourceKind::Speaker, id, payload).await?;
        info!(speaker = %obj.metadata.key(), id, "Updated speaker in registry");
        Ok(ReconcileResult::done())
    }

    async fn reconcile_delete(&self, obj: &mut Speaker) -> Result<ReconcileResult> {
        if obj.has_remote_id() {
            match self
                .registry
                .delete(ResourceKind::Speaker, &obj.status.id)
                .await
            {
                Ok(()) => {
                    info!(speaker = %obj.metadata.key(), id = %obj.status.id, "Deleted speaker from registry");
                }
                Err(e) if e.is_not_found() => {
                    debug!(speaker = %obj.metadata.key(), "Registry record already absent");
                }
                Err(e) => return Err(e.into()),
            }
        }
        obj.metadata.remove_finalizer(FINALIZER);
        Ok(ReconcileResult::done())
    }
}

#[async_trait]
impl Reconciler for SpeakerReconciler {
    type Object = Speaker;

    async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileResult> {
        let Some(mut obj) = self.store.get(key).await? else {
            debug!(speaker = %key, "Speaker no longer exists");
            return Ok(ReconcileResult::done());
        };

        info!(speaker = %key, "Reconciling speaker");

        if !obj.metadata.has_finalizer(FINALIZER) {
            if obj.metadata.is_being_deleted() {
                return Ok(ReconcileResult::done());
            }
            obj.metadata.add_finalizer(FINALIZER);
            write_back(self.store.as_ref(), &mut obj, OWNED_CONDITIONS, &self.field_owner).await?;
            return Ok(ReconcileResult::requeue());
        }

        let outcome = if obj.metadata.is_being_deleted() {
            let previous = begin_delete_pass(&mut obj, OWNED_CONDITIONS);
            let outcome = self.reconcile_delete(&mut obj).await;
            finish_delete_pass(&mut obj, &previous, &outcome);
            outcome
        } else {
            let previous = begin_pass(&mut obj, OWNED_CONDITIONS);
            let outcome = self.reconcile_live(&mut obj).await;
            finish_pass(&mut obj, &previous, &outcome);
            outcome
        };

        let written =
            write_back(self.store.as_ref(), &mut obj, OWNED_CONDITIONS, &self.field_owner).await;
        settle(key, outcome, written)
    }
}
