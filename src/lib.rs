#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # CFP controller
//!
//! Keeps Speaker and Proposal resources in sync with the CFP registry API.
//!
//! This library re-exports the workspace crates and holds the configuration
//! used by the `cfp-controller` binary.

pub use cfp_core;
pub use cfp_reconciler;
pub use cfp_registry;
pub use cfp_store;

pub mod cli;
pub mod config;
pub mod error;

pub use cli::Cli;
pub use config::OperatorConfig;
pub use error::{Error, Result};
