//! Proposal reconciler.
//!
//! Every live pass first resolves the referenced Speaker; a Proposal cannot be
//! created remotely before its Speaker has a registry identity. Submission
//! status then drives the remote call:
//!
//! | status  | `spec.final` | action                          |
//! |---------|--------------|---------------------------------|
//! | unset   | false / true | create as draft / final         |
//! | draft   | true         | unconditional update to final   |
//! | draft   | false        | fetch, update only on drift     |
//! | final   | any          | none                            |

use std::sync::Arc;

use async_trait::async_trait;
use cfp_core::{FINALIZER, ObjectKey, Proposal, ResourceKind, Speaker, SubmissionStatus};
use cfp_registry::{ProposalRecord, Record, Registry};
use cfp_store::ObjectStore;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::reconciler::{
    Reconciler, begin_delete_pass, begin_pass, finish_delete_pass, finish_pass, settle, write_back,
};
use crate::types::{OWNED_CONDITIONS, ReconcileResult};

/// Reconciles Proposals against the registry.
pub struct ProposalReconciler {
    proposals: Arc<dyn ObjectStore<Proposal>>,
    speakers: Arc<dyn ObjectStore<Speaker>>,
    registry: Arc<dyn Registry>,
    field_owner: String,
}

impl ProposalReconciler {
    /// Create a new proposal reconciler.
    pub fn new(
        proposals: Arc<dyn ObjectStore<Proposal>>,
        speakers: Arc<dyn ObjectStore<Speaker>>,
        registry: Arc<dyn Registry>,
        field_owner: impl Into<String>,
    ) -> Self {
        Self {
            proposals,
            speakers,
            registry,
            field_owner: field_owner.into(),
        }
    }

    /// Registry id of the referenced Speaker.
    async fn resolve_speaker(&self, proposal: &Proposal) -> Result<String> {
        let key = proposal.speaker_key();
        let speaker = self
            .speakers
            .get(&key)
            .await?
            .ok_or_else(|| Error::unresolved_speaker(key.clone(), "speaker not found"))?;

        if !speaker.has_remote_id() {
            return Err(Error::unresolved_speaker(
                key,
                "speaker has no registry id yet",
            ));
        }
        Ok(speaker.status.id)
    }

    async fn reconcile_live(&self, obj: &mut Proposal) -> Result<ReconcileResult> {
        let speaker_id = self.resolve_speaker(obj).await?;

        match obj.status.submission {
            None => self.create(obj, &speaker_id).await,
            Some(status) => self.converge_existing(obj, &speaker_id, status).await,
        }
    }

    async fn create(&self, obj: &mut Proposal, speaker_id: &str) -> Result<ReconcileResult> {
        let status = if obj.spec.final_ {
            SubmissionStatus::Final
        } else {
            SubmissionStatus::Draft
        };
        let record = ProposalRecord::from_proposal(obj, speaker_id, status);
        let payload = record.to_payload()?;

        match self.registry.create(ResourceKind::Proposal, &payload).await {
            Ok(response) => {
                info!(proposal = %obj.metadata.key(), id = %record.id, status = %status, "Created proposal in registry");
                apply_response(obj, &response, status);
                Ok(ReconcileResult::done())
            }
            Err(err) => {
                let Ok(existing) = self.registry.get(ResourceKind::Proposal, &record.id).await
                else {
                    return Err(err.into());
                };
                let Ok(remote) = ProposalRecord::from_payload(&existing) else {
                    return Err(err.into());
                };
                info!(proposal = %obj.metadata.key(), id = %record.id, "Adopted existing registry record");
                obj.status.submission = Some(remote.submission.status);
                obj.status.last_update = remote.submission.last_update;
                self.converge_existing(obj, speaker_id, remote.submission.status)
                    .await
            }
        }
    }

    /// Handle a Proposal that already has a remote submission.
    async fn converge_existing(
        &self,
        obj: &mut Proposal,
        speaker_id: &str,
        submission: SubmissionStatus,
    ) -> Result<ReconcileResult> {
        match submission {
            SubmissionStatus::Final => {
                debug!(proposal = %obj.metadata.key(), "Submission is final, no remote change");
                Ok(ReconcileResult::done())
            }
            SubmissionStatus::Draft if obj.spec.final_ => {
                self.write_update(obj, speaker_id, SubmissionStatus::Final)
                    .await
            }
            SubmissionStatus::Draft => self.sync_draft(obj, speaker_id).await,
        }
    }

    /// Update a draft only when its remote content drifted.
    async fn sync_draft(&self, obj: &mut Proposal, speaker_id: &str) -> Result<ReconcileResult> {
        let record = ProposalRecord::from_proposal(obj, speaker_id, SubmissionStatus::Draft);
        let fetched = self.registry.get(ResourceKind::Proposal, &record.id).await?;

        if record.matches(&fetched) {
            debug!(proposal = %obj.metadata.key(), "Registry record up to date");
            return Ok(ReconcileResult::done());
        }
        self.write_update(obj, speaker_id, SubmissionStatus::Draft)
            .await
    }

    async fn write_update(
        &self,
        obj: &mut Proposal,
        speaker_id: &str,
        status: SubmissionStatus,
    ) -> Result<ReconcileResult> {
        let record = ProposalRecord::from_proposal(obj, speaker_id, status);
        let payload = record.to_payload()?;
        let response = self
            .registry
            .update(ResourceKind::Proposal, &record.id, &payload)
            .await?;

        info!(proposal = %obj.metadata.key(), id = %record.id, status = %status, "Updated proposal in registry");
        apply_response(obj, &response, status);
        Ok(ReconcileResult::done())
    }

    async fn reconcile_delete(&self, obj: &mut Proposal) -> Result<ReconcileResult> {
        if obj.status.submission == Some(SubmissionStatus::Draft) {
            let id = obj.metadata.key().remote_id();
            match self.registry.delete(ResourceKind::Proposal, &id).await {
                Ok(()) => info!(proposal = %obj.metadata.key(), id = %id, "Deleted draft from registry"),
                Err(e) if e.is_not_found() => {
                    debug!(proposal = %obj.metadata.key(), "Registry record already absent");
                }
                Err(e) => return Err(e.into()),
            }
        }
        obj.metadata.remove_finalizer(FINALIZER);
        Ok(ReconcileResult::done())
    }
}

/// Record the submission state returned by a registry write.
fn apply_response(obj: &mut Proposal, response: &[u8], sent: SubmissionStatus) {
    match ProposalRecord::from_payload(response) {
        Ok(record) => {
            obj.status.submission = Some(record.submission.status);
            obj.status.last_update = record.submission.last_update.or_else(|| Some(Utc::now()));
        }
        Err(e) => {
            warn!(proposal = %obj.metadata.key(), error = %e, "Undecodable registry response");
            obj.status.submission = Some(sent);
            obj.status.last_update = Some(Utc::now());
        }
    }
}

#[async_trait]
impl Reconciler for ProposalReconciler {
    type Object = Proposal;

    async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileResult> {
        let Some(mut obj) = self.proposals.get(key).await? else {
            debug!(proposal = %key, "Proposal no longer exists");
            return Ok(ReconcileResult::done());
        };

        info!(proposal = %key, "Reconciling proposal");

        if !obj.metadata.has_finalizer(FINALIZER) {
            if obj.metadata.is_being_deleted() {
                return Ok(ReconcileResult::done());
            }
            obj.metadata.add_finalizer(FINALIZER);
            write_back(
                self.proposals.as_ref(),
                &mut obj,
                OWNED_CONDITIONS,
                &self.field_owner,
            )
            .await?;
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

        let written = write_back(
            self.proposals.as_ref(),
            &mut obj,
            OWNED_CONDITIONS,
            &self.field_owner,
        )
        .await;
        settle(key, outcome, written)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use cfp_core::{ConditionType, Conditioned, ProposalSpec, SpeakerRef, SpeakerSpec};
    use cfp_registry::{Error as RegistryError, InMemoryRegistry, Operation};
    use cfp_store::{InMemoryStore, PatchOptions};

    struct Fixture {
        proposals: Arc<InMemoryStore<Proposal>>,
        speakers: Arc<InMemoryStore<Speaker>>,
        registry: Arc<InMemoryRegistry>,
        reconciler: ProposalReconciler,
    }

    fn fixture() -> Fixture {
        let proposals = Arc::new(InMemoryStore::<Proposal>::new());
        let speakers = Arc::new(InMemoryStore::<Speaker>::new());
        let registry = Arc::new(InMemoryRegistry::new());
        let reconciler = ProposalReconciler::new(
            proposals.clone(),
            speakers.clone(),
            registry.clone(),
            "test",
        );
        Fixture {
            proposals,
            speakers,
            registry,
            reconciler,
        }
    }

    fn key() -> ObjectKey {
        ObjectKey::new("ns", "intro")
    }

    /// Store a Speaker that already owns registry id `ns-Ada`.
    async fn registered_speaker(fx: &Fixture) {
        let mut speaker = fx
            .speakers
            .create(Speaker::new("ns", "Ada", SpeakerSpec::new("Ada")))
            .await
            .unwrap();
        speaker.status.id = "ns-Ada".to_string();
        fx.speakers.patch(&speaker, &PatchOptions::new()).await.unwrap();
        fx.registry
            .insert(
                ResourceKind::Speaker,
                "ns-Ada",
                serde_json::json!({"id": "ns-Ada", "name": "Ada", "bio": "", "email": ""}),
            )
            .await;
    }

    async fn create_proposal(fx: &Fixture, final_: bool) {
        let spec = ProposalSpec::new("T", "A", SpeakerRef::new("Ada")).with_final(final_);
        fx.proposals
            .create(Proposal::new("ns", "intro", spec))
            .await
            .unwrap();
    }

    async fn get(fx: &Fixture) -> Proposal {
        fx.proposals.get(&key()).await.unwrap().expect("proposal exists")
    }

    /// Attach the finalizer, then run one full pass.
    async fn converge(fx: &Fixture) -> Result<ReconcileResult> {
        if !get(fx).await.metadata.has_finalizer(FINALIZER) {
            fx.reconciler.reconcile(&key()).await.unwrap();
        }
        fx.reconciler.reconcile(&key()).await
    }

    async fn set_final(fx: &Fixture) {
        let mut obj = get(fx).await;
        obj.spec.final_ = true;
        fx.proposals.update(obj).await.unwrap();
    }

    /// Given a Speaker without a registry id
    /// When the Proposal reconciles
    /// Then submission stays unset and FetchFailed names the Speaker
    #[tokio::test]
    async fn test_unresolved_speaker_blocks_creation() {
        let fx = fixture();
        fx.speakers
            .create(Speaker::new("ns", "Ada", SpeakerSpec::new("Ada")))
            .await
            .unwrap();
        create_proposal(&fx, false).await;

        let err = converge(&fx).await.unwrap_err();
        assert!(matches!(err, Error::UnresolvedSpeaker { .. }));

        let obj = get(&fx).await;
        assert!(obj.status.submission.is_none());
        let fetch = obj.conditions().get(&ConditionType::FetchFailed).unwrap();
        assert!(fetch.status);
        assert!(fetch.message.contains("ns/Ada"));
        assert!(obj.conditions().is_false(&ConditionType::Ready));
        assert_eq!(fx.registry.calls(ResourceKind::Proposal).await.total(), 0);
    }

    #[tokio::test]
    async fn test_missing_speaker_is_unresolved() {
        let fx = fixture();
        create_proposal(&fx, false).await;

        assert!(converge(&fx).await.is_err());
        let obj = get(&fx).await;
        let ready = obj.conditions().get(&ConditionType::Ready).unwrap();
        assert!(ready.message.contains("speaker not found"));
    }

    #[tokio::test]
    async fn test_creates_draft_and_records_status() {
        let fx = fixture();
        registered_speaker(&fx).await;
        create_proposal(&fx, false).await;

        converge(&fx).await.unwrap();

        let obj = get(&fx).await;
        assert_eq!(obj.status.submission, Some(SubmissionStatus::Draft));
        assert!(obj.status.last_update.is_some());
        assert!(obj.is_ready());

        let remote = fx.registry.record(ResourceKind::Proposal, "ns-intro").await.unwrap();
        assert_eq!(remote["submission"]["status"], "draft");
        assert_eq!(remote["speakerID"], "ns-Ada");
    }

    #[tokio::test]
    async fn test_final_spec_creates_final_directly() {
        let fx = fixture();
        registered_speaker(&fx).await;
        create_proposal(&fx, true).await;

        converge(&fx).await.unwrap();

        assert_eq!(get(&fx).await.status.submission, Some(SubmissionStatus::Final));
        let calls = fx.registry.calls(ResourceKind::Proposal).await;
        assert_eq!((calls.create, calls.update), (1, 0));
    }

    /// Given a draft Proposal
    /// When spec.final flips to true
    /// Then exactly one update transitions it, and later passes are silent
    #[tokio::test]
    async fn test_draft_to_final_updates_once() {
        let fx = fixture();
        registered_speaker(&fx).await;
        create_proposal(&fx, false).await;
        converge(&fx).await.unwrap();
        fx.registry.reset_calls().await;

        set_final(&fx).await;
        converge(&fx).await.unwrap();
        assert_eq!(fx.registry.calls(ResourceKind::Proposal).await.update, 1);
        assert_eq!(get(&fx).await.status.submission, Some(SubmissionStatus::Final));

        fx.registry.reset_calls().await;
        let mut obj = get(&fx).await;
        obj.spec.title = "Retitled".to_string();
        fx.proposals.update(obj).await.unwrap();
        for _ in 0..3 {
            converge(&fx).await.unwrap();
        }
        assert_eq!(fx.registry.calls(ResourceKind::Proposal).await.total(), 0);

        let remote = fx.registry.record(ResourceKind::Proposal, "ns-intro").await.unwrap();
        assert_eq!(remote["submission"]["status"], "final");
        assert_eq!(remote["title"], "T");
    }

    #[tokio::test]
    async fn test_draft_drift_is_repaired() {
        let fx = fixture();
        registered_speaker(&fx).await;
        create_proposal(&fx, false).await;
        converge(&fx).await.unwrap();
        fx.registry.reset_calls().await;

        converge(&fx).await.unwrap();
        assert_eq!(fx.registry.calls(ResourceKind::Proposal).await.writes(), 0);

        let mut obj = get(&fx).await;
        obj.spec.abstract_ = "Longer abstract".to_string();
        fx.proposals.update(obj).await.unwrap();
        converge(&fx).await.unwrap();

        assert_eq!(fx.registry.calls(ResourceKind::Proposal).await.update, 1);
        let remote = fx.registry.record(ResourceKind::Proposal, "ns-intro").await.unwrap();
        assert_eq!(remote["abstract"], "Longer abstract");
        assert_eq!(remote["submission"]["status"], "draft");
    }

    #[tokio::test]
    async fn test_existing_remote_record_is_adopted() {
        let fx = fixture();
        registered_speaker(&fx).await;
        create_proposal(&fx, false).await;
        fx.registry
            .insert(
                ResourceKind::Proposal,
                "ns-intro",
                serde_json::json!({
                    "id": "ns-intro", "title": "T", "abstract": "A", "type": "talk",
                    "speakerID": "ns-Ada", "final": true,
                    "submission": {"status": "final"}
                }),
            )
            .await;

        converge(&fx).await.unwrap();

        let obj = get(&fx).await;
        assert_eq!(obj.status.submission, Some(SubmissionStatus::Final));
        assert!(obj.is_ready());
        assert!(obj.conditions().get(&ConditionType::CreateFailed).is_none());
    }

    #[tokio::test]
    async fn test_deleting_draft_issues_one_remote_delete() {
        let fx = fixture();
        registered_speaker(&fx).await;
        create_proposal(&fx, false).await;
        converge(&fx).await.unwrap();

        fx.proposals.delete(&key()).await.unwrap();
        fx.reconciler.reconcile(&key()).await.unwrap();

        assert!(fx.proposals.get(&key()).await.unwrap().is_none());
        assert_eq!(fx.registry.calls(ResourceKind::Proposal).await.delete, 1);
        assert_eq!(fx.registry.len(ResourceKind::Proposal).await, 0);
    }

    #[tokio::test]
    async fn test_deleting_final_keeps_remote_record() {
        let fx = fixture();
        registered_speaker(&fx).await;
        create_proposal(&fx, true).await;
        converge(&fx).await.unwrap();

        fx.proposals.delete(&key()).await.unwrap();
        fx.reconciler.reconcile(&key()).await.unwrap();

        assert!(fx.proposals.get(&key()).await.unwrap().is_none());
        assert_eq!(fx.registry.calls(ResourceKind::Proposal).await.delete, 0);
        assert_eq!(fx.registry.len(ResourceKind::Proposal).await, 1);
    }

    #[tokio::test]
    async fn test_deleting_never_submitted_proposal_clears_finalizer() {
        let fx = fixture();
        create_proposal(&fx, false).await;
        assert!(converge(&fx).await.is_err());

        fx.proposals.delete(&key()).await.unwrap();
        fx.reconciler.reconcile(&key()).await.unwrap();
        assert!(fx.proposals.get(&key()).await.unwrap().is_none());
        assert_eq!(fx.registry.calls(ResourceKind::Proposal).await.total(), 0);
    }

    /// Given a draft Proposal whose last update failed
    /// When its remote delete fails too
    /// Then Ready=False carries the delete failure and nothing else remains
    #[tokio::test]
    async fn test_failed_delete_replaces_earlier_failure_conditions() {
        let fx = fixture();
        registered_speaker(&fx).await;
        create_proposal(&fx, false).await;
        converge(&fx).await.unwrap();

        fx.registry
            .inject_failure(
                ResourceKind::Proposal,
                Operation::Update,
                RegistryError::rejected(Operation::Update, ResourceKind::Proposal, "500")
                    .with_status(500),
                1,
            )
            .await;
        let mut obj = get(&fx).await;
        obj.spec.abstract_ = "Longer abstract".to_string();
        fx.proposals.update(obj).await.unwrap();
        assert!(converge(&fx).await.is_err());
        assert!(get(&fx).await.conditions().is_true(&ConditionType::UpdateFailed));

        fx.registry
            .inject_failure(
                ResourceKind::Proposal,
                Operation::Delete,
                RegistryError::rejected(Operation::Delete, ResourceKind::Proposal, "500")
                    .with_status(500),
                1,
            )
            .await;
        fx.proposals.delete(&key()).await.unwrap();
        assert!(fx.reconciler.reconcile(&key()).await.is_err());

        let obj = get(&fx).await;
        assert!(obj.metadata.has_finalizer(FINALIZER));
        let conditions: Vec<_> = obj.conditions().iter().map(|c| c.type_.clone()).collect();
        assert_eq!(conditions, vec![ConditionType::Ready]);
        let ready = obj.conditions().get(&ConditionType::Ready).unwrap();
        assert!(!ready.status);
        assert_eq!(ready.reason, "DeleteProposalFailed");
    }

    #[tokio::test]
    async fn test_deleted_speaker_marks_fetch_failed() {
        let fx = fixture();
        registered_speaker(&fx).await;
        create_proposal(&fx, false).await;
        converge(&fx).await.unwrap();
        assert!(get(&fx).await.is_ready());

        fx.speakers.delete(&ObjectKey::new("ns", "Ada")).await.unwrap();
        assert!(converge(&fx).await.is_err());

        let obj = get(&fx).await;
        assert!(obj.conditions().is_true(&ConditionType::FetchFailed));
        let ready = obj.conditions().get(&ConditionType::Ready).unwrap();
        assert!(!ready.status);
        assert!(ready.message.contains("ns/Ada"));
    }
}
