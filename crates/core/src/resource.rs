//! The `Resource` abstraction shared by Speaker and Proposal.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::conditions::Conditioned;
use crate::error::Result;
use crate::meta::{ObjectKey, ObjectMeta};

/// Kind of a declaratively managed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Speaker,
    Proposal,
}

impl ResourceKind {
    /// Get the kind name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Speaker => "Speaker",
            Self::Proposal => "Proposal",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored object with user-owned spec and controller-owned status.
pub trait Resource: Conditioned + Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// User-declared desired state.
    type Spec: Clone + PartialEq + fmt::Debug + Send + Sync;
    /// Controller-derived observed state.
    type Status: Clone + Default + fmt::Debug + Send + Sync;

    /// Kind of this resource.
    const KIND: ResourceKind;

    fn meta(&self) -> &ObjectMeta;
    fn meta_mut(&mut self) -> &mut ObjectMeta;
    fn spec(&self) -> &Self::Spec;
    fn spec_mut(&mut self) -> &mut Self::Spec;
    fn status(&self) -> &Self::Status;
    fn status_mut(&mut self) -> &mut Self::Status;

    /// Check the spec against the resource schema.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidSpec` naming the offending field.
    fn validate(&self) -> Result<()>;

    /// Key of this object.
    fn key(&self) -> ObjectKey {
        self.meta().key()
    }
}
