//! Dependency index and change router.
//!
//! Proposals are indexed by the name of the Speaker they reference. Speaker
//! watch events pass through [`SpeakerChangePredicate`]; the ones that matter
//! are mapped to the dependent Proposal keys by [`ChangeRouter`].

use std::sync::Arc;

use cfp_core::{ObjectKey, Proposal, Speaker};
use cfp_store::{Error as StoreError, IndexFn, ObjectStore, WatchEvent};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::controller::{Source, stopped};
use crate::error::Result;
use crate::queue::WorkQueue;

/// Field index of Proposals by referenced Speaker name.
pub const SPEAKER_INDEX: &str = "spec.speakerRef.name";

/// Extract the Speaker name a Proposal depends on.
pub fn index_proposal_by_speaker(proposal: &Proposal) -> Vec<String> {
    let name = &proposal.spec.speaker_ref.name;
    if name.is_empty() {
        Vec::new()
    } else {
        vec![name.clone()]
    }
}

/// The extraction function registered with the Proposal store.
pub fn speaker_index_fn() -> IndexFn<Proposal> {
    Arc::new(index_proposal_by_speaker)
}

/// Decides which Speaker changes concern dependent Proposals.
///
/// Only a change of registry identity or a deletion is relevant. A new Speaker
/// has no identity yet, so creation never propagates.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpeakerChangePredicate;

impl SpeakerChangePredicate {
    pub const fn on_create(&self, _speaker: &Speaker) -> bool {
        false
    }

    pub fn on_update(&self, old: &Speaker, new: &Speaker) -> bool {
        let (old_id, new_id) = (old.status.id.as_str(), new.status.id.as_str());
        match (old_id.is_empty(), new_id.is_empty()) {
            (true, false) => true,
            (false, false) => old_id != new_id,
            _ => false,
        }
    }

    pub const fn on_delete(&self, _speaker: &Speaker) -> bool {
        true
    }

    /// Apply the predicate to a watch event.
    pub fn matches(&self, event: &WatchEvent<Speaker>) -> bool {
        match event {
            WatchEvent::Added(speaker) => self.on_create(speaker),
            WatchEvent::Modified { old, new } => self.on_update(old, new),
            WatchEvent::Deleted(speaker) => self.on_delete(speaker),
        }
    }
}

/// Maps a Speaker to the Proposals that must be reconciled again.
pub struct ChangeRouter {
    proposals: Arc<dyn ObjectStore<Proposal>>,
    predicate: SpeakerChangePredicate,
}

impl ChangeRouter {
    /// Create a router over the Proposal store.
    pub fn new(proposals: Arc<dyn ObjectStore<Proposal>>) -> Self {
        Self {
            proposals,
            predicate: SpeakerChangePredicate,
        }
    }

    /// Keys of every Proposal indexed under the Speaker's name.
    ///
    /// # Errors
    ///
    /// Returns an error if the index has not been registered.
    pub async fn requests_for(&self, speaker: &Speaker) -> Result<Vec<ObjectKey>> {
        let name = &speaker.metadata.name;
        let keys: Vec<ObjectKey> = self
            .proposals
            .list_by_index(SPEAKER_INDEX, name)
            .await?
            .iter()
            .map(|p| p.metadata.key())
            .collect();

        debug!(speaker = %speaker.metadata.key(), dependents = keys.len(), "Mapped speaker change");
        Ok(keys)
    }

    /// Dependent keys for a watch event, or nothing when the predicate rejects it.
    ///
    /// # Errors
    ///
    /// Returns an error if the index lookup fails.
    pub async fn route(&self, event: &WatchEvent<Speaker>) -> Result<Vec<ObjectKey>> {
        if !self.predicate.matches(event) {
            return Ok(Vec::new());
        }
        self.requests_for(event.object()).await
    }

    /// Keys of every stored Proposal, used after the watch lagged.
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails.
    pub async fn all(&self) -> Result<Vec<ObjectKey>> {
        Ok(self
            .proposals
            .list(None)
            .await?
            .iter()
            .map(|p| p.metadata.key())
            .collect())
    }
}

/// Feeds the Proposal queue from Speaker watch events.
pub struct SpeakerChangeSource {
    speakers: Arc<dyn ObjectStore<Speaker>>,
    router: Arc<ChangeRouter>,
}

impl SpeakerChangeSource {
    pub fn new(speakers: Arc<dyn ObjectStore<Speaker>>, router: Arc<ChangeRouter>) -> Self {
        Self { speakers, router }
    }
}

impl Source for SpeakerChangeSource {
    fn start(&self, queue: Arc<WorkQueue>, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        let mut events = self.speakers.watch();
        let router = Arc::clone(&self.router);

        tokio::spawn(async move {
            loop {
                let keys = tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => router.route(&event).await,
                        Err(StoreError::WatchLagged { skipped }) => {
                            warn!(skipped, "Speaker watch lagged, requeueing all proposals");
                            router.all().await
                        }
                        Err(_) => break,
                    },
                    () = stopped(&mut stop) => break,
                };

                match keys {
                    Ok(keys) => {
                        for key in keys {
                            queue.add(key).await;
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to map speaker change"),
                }
            }
            debug!("Speaker change source stopped");
        })
    }
}
