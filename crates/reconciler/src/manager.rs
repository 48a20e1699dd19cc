//! Runs the Speaker and Proposal controllers together.

use std::sync::Arc;

use cfp_core::{Proposal, Speaker};
use cfp_registry::Registry;
use cfp_store::ObjectStore;
use tokio::sync::watch;
use tracing::{error, info};

use crate::config::ControllerConfig;
use crate::controller::{Controller, stopped};
use crate::dependency::{ChangeRouter, SPEAKER_INDEX, SpeakerChangeSource, speaker_index_fn};
use crate::error::Result;
use crate::proposal::ProposalReconciler;
use crate::speaker::SpeakerReconciler;

/// Owns both controllers and their shared stop signal.
pub struct Manager {
    speakers: Arc<dyn ObjectStore<Speaker>>,
    proposals: Arc<dyn ObjectStore<Proposal>>,
    registry: Arc<dyn Registry>,
    config: ControllerConfig,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl Manager {
    pub fn new(
        speakers: Arc<dyn ObjectStore<Speaker>>,
        proposals: Arc<dyn ObjectStore<Proposal>>,
        registry: Arc<dyn Registry>,
        config: ControllerConfig,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            speakers,
            proposals,
            registry,
            config,
            stop_tx,
            stop_rx,
        }
    }

    /// Run both controllers until stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the dependency
    /// index cannot be registered.
    pub async fn run(&self) -> Result<()> {
        self.config.validate()?;

        self.proposals
            .register_index(SPEAKER_INDEX, speaker_index_fn())
            .await?;

        let field_owner = self.config.controller_name.clone();
        let speaker_controller = Controller::new(
            Arc::new(SpeakerReconciler::new(
                Arc::clone(&self.speakers),
                Arc::clone(&self.registry),
                field_owner.clone(),
            )),
            Arc::clone(&self.speakers),
            self.config.clone(),
        );

        let router = Arc::new(ChangeRouter::new(Arc::clone(&self.proposals)));
        let proposal_controller = Controller::new(
            Arc::new(ProposalReconciler::new(
                Arc::clone(&self.proposals),
                Arc::clone(&self.speakers),
                Arc::clone(&self.registry),
                field_owner,
            )),
            Arc::clone(&self.proposals),
            self.config.clone(),
        )
        .with_source(Box::new(SpeakerChangeSource::new(
            Arc::clone(&self.speakers),
            router,
        )));

        let stop = self.stop_rx.clone();
        let mut handles = speaker_controller.start_sources(&stop);
        handles.extend(proposal_controller.start_sources(&stop));
        handles.extend(speaker_controller.start_workers(&stop));
        handles.extend(proposal_controller.start_workers(&stop));

        info!(controller = %self.config.controller_name, "Manager started");

        let mut stop = self.stop_rx.clone();
        stopped(&mut stop).await;

        speaker_controller.queue().shut_down().await;
        proposal_controller.queue().shut_down().await;

        for joined in futures::future::join_all(handles).await {
            if let Err(e) = joined {
                error!(error = %e, "Controller task failed");
            }
        }

        info!("Manager stopped");
        Ok(())
    }

    /// Stop the manager.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Get a stopper handle.
    pub fn stopper(&self) -> ManagerStopper {
        ManagerStopper {
            stop_tx: self.stop_tx.clone(),
        }
    }
}

/// Handle to stop a running [`Manager`].
#[derive(Clone)]
pub struct ManagerStopper {
    stop_tx: watch::Sender<bool>,
}

impl ManagerStopper {
    /// Stop the manager.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::time::Duration;

    use super::*;
    use cfp_registry::InMemoryRegistry;
    use cfp_store::InMemoryStore;

    fn manager(config: ControllerConfig) -> Manager {
        Manager::new(
            InMemoryStore::<Speaker>::new_arc(),
            InMemoryStore::<Proposal>::new_arc(),
            Arc::new(InMemoryRegistry::new()),
            config,
        )
    }

    /// Given a running manager
    /// When its stopper fires
    /// Then run() returns cleanly
    #[tokio::test]
    async fn test_stopper_terminates_run() {
        let manager = Arc::new(manager(ControllerConfig::default()));
        let stopper = manager.stopper();

        let runner = Arc::clone(&manager);
        let handle = tokio::spawn(async move { runner.run().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        stopper.stop();

        let result = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(result.is_ok(), "manager should stop within timeout");
        assert!(result.ok().and_then(|r| r.ok()).is_some_and(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_before_start() {
        let manager = manager(ControllerConfig::default().with_workers(0));
        let result = manager.run().await;
        assert!(matches!(result, Err(crate::Error::InvalidConfig { .. })));
    }
}
