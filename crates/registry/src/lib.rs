//! Client for the CFP registry API.
//!
//! - [`Registry`]: create/update/get/delete of raw JSON records per kind
//! - [`RegistryClient`]: the HTTP implementation over `reqwest`
//! - [`InMemoryRegistry`]: a double that mimics the API and counts calls
//! - [`SpeakerRecord`] / [`ProposalRecord`]: the wire shapes
//!
//! Every failure is an [`Error`] tagged with one [`ErrorReason`].
//!
//! # Example
//!
//! ```ignore
//! use cfp_registry::{Registry, RegistryClient, Record, SpeakerRecord};
//!
//! let client = RegistryClient::with_endpoint("http://localhost:50001/api")?;
//! let record = SpeakerRecord::from_speaker(&speaker);
//! client.create(ResourceKind::Speaker, &record.to_payload()?).await?;
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod client;
pub mod config;
pub mod error;
pub mod memory;
pub mod record;

pub use client::{Registry, RegistryClient, resource_path};
pub use config::{DEFAULT_ENDPOINT, RegistryConfig};
pub use error::{Error, ErrorReason, Operation, Result};
pub use memory::{CallCounts, InMemoryRegistry};
pub use record::{ProposalRecord, Record, SpeakerRecord, Submission};
