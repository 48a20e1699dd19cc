//! Level-triggered reconcilers for Speaker and Proposal resources.
//!
//! Each controller keeps its kind converged with the CFP registry:
//!
//! - **Speaker**: create the registry record, update it when the spec drifts,
//!   delete it before the finalizer is released.
//! - **Proposal**: resolve the referenced Speaker, create a draft (or final)
//!   submission, move it to final once, then leave it frozen.
//! - **Dependency routing**: a Speaker whose registry id appears, changes or
//!   vanishes requeues every Proposal that references it.
//!
//! # Runtime
//!
//! Watch events and a periodic resync feed a deduplicating [`WorkQueue`];
//! workers run at most one pass per object at a time and requeue failures with
//! exponential backoff. Every pass writes the object back exactly once.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use cfp_reconciler::{ControllerConfig, Manager};
//! use cfp_registry::RegistryClient;
//! use cfp_store::InMemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let manager = Manager::new(
//!         InMemoryStore::new_arc(),
//!         InMemoryStore::new_arc(),
//!         Arc::new(RegistryClient::new()?),
//!         ControllerConfig::default(),
//!     );
//!     let stopper = manager.stopper();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         stopper.stop();
//!     });
//!     manager.run().await?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config;
pub mod controller;
pub mod dependency;
pub mod error;
pub mod manager;
pub mod proposal;
pub mod queue;
pub mod reconciler;
pub mod speaker;
pub mod types;

pub use config::ControllerConfig;
pub use controller::{Controller, KindSource, Source};
pub use dependency::{
    ChangeRouter, SPEAKER_INDEX, SpeakerChangePredicate, SpeakerChangeSource,
    index_proposal_by_speaker, speaker_index_fn,
};
pub use error::{Error, Result};
pub use manager::{Manager, ManagerStopper};
pub use proposal::ProposalReconciler;
pub use queue::WorkQueue;
pub use reconciler::Reconciler;
pub use speaker::SpeakerReconciler;
pub use types::{OWNED_CONDITIONS, ReconcileResult};
