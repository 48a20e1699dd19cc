//! Resource store for the CFP controller.
//!
//! Holds Speaker and Proposal objects the way an API server would: it
//! validates specs, tracks generations, defers deletion while finalizers are
//! present, and fans out [`WatchEvent`]s to every subscriber.
//!
//! Controllers write back through [`ObjectStore::patch`], which merges only the
//! condition types named in [`PatchOptions::owned_conditions`].

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod store;
pub mod watch;

pub use error::{Error, Result};
pub use store::{InMemoryStore, IndexFn, ObjectStore, PatchOptions};
pub use watch::{WatchEvent, WatchStream};
