//! Proposal resource.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conditions::{Conditioned, Conditions};
use crate::error::{Error, Result};
use crate::meta::{ObjectKey, ObjectMeta};
use crate::resource::{Resource, ResourceKind};

const MAX_TEXT_LEN: usize = 50;

/// Format of the talk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TalkType {
    #[default]
    Talk,
    Tutorial,
    Keynote,
    Lightning,
}

impl TalkType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Talk => "talk",
            Self::Tutorial => "tutorial",
            Self::Keynote => "keynote",
            Self::Lightning => "lightning",
        }
    }
}

impl fmt::Display for TalkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Submission state of a proposal in the registry.
///
/// `Final` is terminal: no further remote mutation is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Draft,
    Final,
}

impl SubmissionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Final => "final",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(Self::Draft),
            "final" => Ok(Self::Final),
            other => Err(Error::invalid_submission(other)),
        }
    }
}

/// Reference to the Speaker submitting a proposal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerRef {
    pub name: String,
    /// Defaults to the proposal's own namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl SpeakerRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
        }
    }

    #[must_use]
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// Desired state of a Proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalSpec {
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_: String,
    #[serde(rename = "type", default)]
    pub talk_type: TalkType,
    #[serde(rename = "final", default)]
    pub final_: bool,
    pub speaker_ref: SpeakerRef,
}

impl ProposalSpec {
    /// Create a draft talk proposal.
    pub fn new(title: impl Into<String>, abstract_: impl Into<String>, speaker: SpeakerRef) -> Self {
        Self {
            title: title.into(),
            abstract_: abstract_.into(),
            talk_type: TalkType::default(),
            final_: false,
            speaker_ref: speaker,
        }
    }

    #[must_use]
    pub const fn with_type(mut self, talk_type: TalkType) -> Self {
        self.talk_type = talk_type;
        self
    }

    #[must_use]
    pub const fn with_final(mut self, final_: bool) -> Self {
        self.final_ = final_;
        self
    }
}

/// Observed state of a Proposal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalStatus {
    #[serde(default)]
    pub observed_generation: i64,
    /// When the registry last accepted a write for this proposal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
    /// Unset until the remote create succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission: Option<SubmissionStatus>,
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub conditions: Conditions,
}

/// A talk proposal submitted by a Speaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub metadata: ObjectMeta,
    pub spec: ProposalSpec,
    #[serde(default)]
    pub status: ProposalStatus,
}

impl Proposal {
    /// Create a new Proposal object.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: ProposalSpec) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
            status: ProposalStatus::default(),
        }
    }

    /// Key of the referenced Speaker, defaulting to this proposal's namespace.
    pub fn speaker_key(&self) -> ObjectKey {
        let namespace = self
            .spec
            .speaker_ref
            .namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(&self.metadata.namespace);
        ObjectKey::new(namespace, self.spec.speaker_ref.name.clone())
    }
}

impl Conditioned for Proposal {
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

fn check_text(field: &str, value: &str) -> Result<()> {
    let len = value.chars().count();
    if len == 0 {
        return Err(Error::invalid_spec(ResourceKind::Proposal, field, "must not be empty"));
    }
    if len > MAX_TEXT_LEN {
        return Err(Error::invalid_spec(
            ResourceKind::Proposal,
            field,
            format!("must be at most {MAX_TEXT_LEN} characters, got {len}"),
        ));
    }
    Ok(())
}

/// Object references are looked up verbatim.
fn check_reference(field: &str, value: &str) -> Result<()> {
    if value.trim() != value {
        return Err(Error::invalid_spec(
            ResourceKind::Proposal,
            field,
            "must not have leading or trailing whitespace",
        ));
    }
    Ok(())
}

impl Resource for Proposal {
    type Spec = ProposalSpec;
    type Status = ProposalStatus;

    const KIND: ResourceKind = ResourceKind::Proposal;

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn spec(&self) -> &ProposalSpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut ProposalSpec {
        &mut self.spec
    }

    fn status(&self) -> &ProposalStatus {
        &self.status
    }

    fn status_mut(&mut self) -> &mut ProposalStatus {
        &mut self.status
    }

    fn validate(&self) -> Result<()> {
        check_text("title", &self.spec.title)?;
        check_text("abstract", &self.spec.abstract_)?;
        let name = &self.spec.speaker_ref.name;
        if name.trim().is_empty() {
            return Err(Error::invalid_spec(
                Self::KIND,
                "speakerRef.name",
                "must not be empty",
            ));
        }
        check_reference("speakerRef.name", name)?;
        if let Some(namespace) = &self.spec.speaker_ref.namespace {
            check_reference("speakerRef.namespace", namespace)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal(title: &str) -> Proposal {
        Proposal::new(
            "ns",
            "talk",
            ProposalSpec::new(title, "About things", SpeakerRef::new("ada")),
        )
    }

    #[test]
    fn test_speaker_key_defaults_to_own_namespace() {
        let p = proposal("T");
        assert_eq!(p.speaker_key(), ObjectKey::new("ns", "ada"));

        let mut other = proposal("T");
        other.spec.speaker_ref = SpeakerRef::new("ada").in_namespace("speakers");
        assert_eq!(other.speaker_key(), ObjectKey::new("speakers", "ada"));
    }

    #[test]
    fn test_title_length_bounds() {
        assert!(proposal("T").validate().is_ok());
        assert!(proposal("").validate().is_err());
        assert!(proposal(&"x".repeat(51)).validate().is_err());
        assert!(proposal(&"x".repeat(50)).validate().is_ok());
    }

    #[test]
    fn test_padded_speaker_reference_rejected() {
        let mut p = proposal("T");
        p.spec.speaker_ref = SpeakerRef::new(" ada");
        assert!(matches!(
            p.validate(),
            Err(Error::InvalidSpec { ref field, .. }) if field == "speakerRef.name"
        ));

        p.spec.speaker_ref = SpeakerRef::new("ada").in_namespace("speakers ");
        assert!(p.validate().is_err());

        p.spec.speaker_ref = SpeakerRef::new("ada").in_namespace("speakers");
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_spec_wire_names() {
        let p = proposal("T");
        let value = serde_json::to_value(&p.spec).unwrap_or_default();
        assert_eq!(value["abstract"], "About things");
        assert_eq!(value["type"], "talk");
        assert_eq!(value["final"], false);
        assert_eq!(value["speakerRef"]["name"], "ada");
    }

    #[test]
    fn test_type_defaults_to_talk() {
        let json = serde_json::json!({
            "title": "T",
            "abstract": "A",
            "speakerRef": { "name": "ada" }
        });
        let spec: std::result::Result<ProposalSpec, _> = serde_json::from_value(json);
        assert_eq!(spec.map(|s| s.talk_type).ok(), Some(TalkType::Talk));
    }

    #[test]
    fn test_submission_status_parse() {
        assert_eq!("draft".parse::<SubmissionStatus>().ok(), Some(SubmissionStatus::Draft));
        assert_eq!("final".parse::<SubmissionStatus>().ok(), Some(SubmissionStatus::Final));
        assert!("published".parse::<SubmissionStatus>().is_err());
    }
}
