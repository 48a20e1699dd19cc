//! Core types for the CFP controller.
//!
//! - **Resources**: [`Speaker`] and [`Proposal`], each with a user-declared
//!   spec and a controller-owned status
//! - **Metadata**: [`ObjectMeta`] (generation, finalizers, deletion marker) and
//!   the [`ObjectKey`] identity
//! - **Conditions**: the ordered condition set reported in every status
//!
//! # Example
//!
//! ```ignore
//! use cfp_core::{Conditioned, ConditionType, Speaker, SpeakerSpec, SUCCEEDED_REASON};
//!
//! let mut speaker = Speaker::new("default", "ada", SpeakerSpec::new("Ada"));
//! speaker.mark_true(ConditionType::Ready, SUCCEEDED_REASON, "reconciled 'ada' successfully");
//! assert!(speaker.is_ready());
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod conditions;
pub mod error;
pub mod meta;
pub mod proposal;
pub mod resource;
pub mod speaker;

pub use conditions::{
    Condition, ConditionType, Conditioned, Conditions, FAILED_REASON, PROGRESSING_REASON,
    SUCCEEDED_REASON,
};
pub use error::{Error, Result};
pub use meta::{FINALIZER, ObjectKey, ObjectMeta};
pub use proposal::{
    Proposal, ProposalSpec, ProposalStatus, SpeakerRef, SubmissionStatus, TalkType,
};
pub use resource::{Resource, ResourceKind};
pub use speaker::{Speaker, SpeakerSpec, SpeakerStatus};
