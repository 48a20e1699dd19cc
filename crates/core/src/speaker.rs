//! Speaker resource.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::conditions::{Conditioned, Conditions};
use crate::error::{Error, Result};
use crate::meta::ObjectMeta;
use crate::resource::{Resource, ResourceKind};

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9.-]+@([a-zA-Z0-9]+.)+[a-zA-Z0-9-]{2,15}$";

static EMAIL_REGEX: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(EMAIL_PATTERN).ok());

/// Desired state of a Speaker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bio: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
}

impl SpeakerSpec {
    /// Create a spec with just a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the bio.
    #[must_use]
    pub fn with_bio(mut self, bio: impl Into<String>) -> Self {
        self.bio = bio.into();
        self
    }

    /// Set the email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }
}

/// Observed state of a Speaker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakerStatus {
    #[serde(default)]
    pub observed_generation: i64,
    /// Registry identity (`namespace-name`); empty until the remote create succeeded.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub conditions: Conditions,
}

/// A conference speaker mirrored into the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speaker {
    pub metadata: ObjectMeta,
    pub spec: SpeakerSpec,
    #[serde(default)]
    pub status: SpeakerStatus,
}

impl Speaker {
    /// Create a new Speaker object.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: SpeakerSpec) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
            status: SpeakerStatus::default(),
        }
    }

    /// Whether the registry record exists.
    pub fn has_remote_id(&self) -> bool {
        !self.status.id.is_empty()
    }
}

impl Conditioned for Speaker {
    fn generation(&self) -> i64 {
        self.metadata.generation
    }

    fn conditions(&self) -> &Conditions {
        &self.status.conditions
    }

    fn conditions_mut(&mut self) -> &mut Conditions {
        &mut self.status.conditions
    }

    fn observed_generation(&self) -> i64 {
        self.status.observed_generation
    }

    fn set_observed_generation(&mut self, generation: i64) {
        self.status.observed_generation = generation;
    }
}

impl Resource for Speaker {
    type Spec = SpeakerSpec;
    type Status = SpeakerStatus;

    const KIND: ResourceKind = ResourceKind::Speaker;

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn spec(&self) -> &SpeakerSpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut SpeakerSpec {
        &mut self.spec
    }

    fn status(&self) -> &SpeakerStatus {
        &self.status
    }

    fn status_mut(&mut self) -> &mut SpeakerStatus {
        &mut self.status
    }

    fn validate(&self) -> Result<()> {
        if self.spec.name.trim().is_empty() {
            return Err(Error::invalid_spec(Self::KIND, "name", "must not be empty"));
        }
        if !self.spec.email.is_empty() {
            let regex = EMAIL_REGEX
                .as_ref()
                .ok_or_else(|| Error::invalid_spec(Self::KIND, "email", "pattern unavailable"))?;
            if !regex.is_match(&self.spec.email) {
                return Err(Error::invalid_spec(
                    Self::KIND,
                    "email",
                    format!("'{}' does not match {EMAIL_PATTERN}", self.spec.email),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_speaker() {
        let speaker = Speaker::new("ns", "ada", SpeakerSpec::new("Ada").with_email("a@x.com"));
        assert!(speaker.validate().is_ok());
        assert!(!speaker.has_remote_id());
    }

    #[test]
    fn test_email_pattern_rejected() {
        let speaker = Speaker::new("ns", "ada", SpeakerSpec::new("Ada").with_email("not-an-email"));
        let err = speaker.validate();
        assert!(matches!(err, Err(Error::InvalidSpec { ref field, .. }) if field == "email"));
    }

    #[test]
    fn test_empty_name_rejected() {
        let speaker = Speaker::new("ns", "ada", SpeakerSpec::new(" "));
        assert!(speaker.validate().is_err());
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let mut speaker = Speaker::new("ns", "ada", SpeakerSpec::new("Ada"));
        speaker.status.id = "ns-ada".to_string();
        speaker.status.observed_generation = 3;
        let value = serde_json::to_value(&speaker).unwrap_or_default();
        assert_eq!(value["status"]["observedGeneration"], 3);
        assert_eq!(value["status"]["id"], "ns-ada");
    }
}
