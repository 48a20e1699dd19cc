//! Wire records exchanged with the registry.

use cfp_core::{Proposal, Speaker, SubmissionStatus, TalkType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

/// Record types that can be posted to and read back from the registry.
pub trait Record: Serialize + DeserializeOwned + Sized {
    /// Registry identity of the record.
    fn id(&self) -> &str;

    /// Whether two records carry the same user-visible content.
    fn same_content(&self, other: &Self) -> bool;

    /// Encode as a JSON request body.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Decode a registry response body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not a valid record.
    fn from_payload(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }

    /// Whether fetched bytes match this record. Undecodable bytes never match.
    fn matches(&self, fetched: &[u8]) -> bool {
        Self::from_payload(fetched).is_ok_and(|remote| self.same_content(&remote))
    }
}

/// Speaker as stored by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub email: String,
}

impl SpeakerRecord {
    /// Build the canonical record for a Speaker.
    pub fn from_speaker(speaker: &Speaker) -> Self {
        Self {
            id: speaker.metadata.key().remote_id(),
            name: speaker.spec.name.clone(),
            bio: speaker.spec.bio.clone(),
            email: speaker.spec.email.clone(),
        }
    }
}

impl Record for SpeakerRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn same_content(&self, other: &Self) -> bool {
        self == other
    }
}

/// Submission block of a proposal record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub status: SubmissionStatus,
    /// Assigned by the registry on every write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
}

/// Proposal as stored by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalRecord {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_: String,
    #[serde(rename = "type", default)]
    pub talk_type: TalkType,
    #[serde(rename = "speakerID")]
    pub speaker_id: String,
    #[serde(rename = "final", default)]
    pub final_: bool,
    pub submission: Submission,
}

impl ProposalRecord {
    /// Build the canonical record for a Proposal in the given submission state.
    pub fn from_proposal(proposal: &Proposal, speaker_id: &str, status: SubmissionStatus) -> Self {
        Self {
            id: proposal.metadata.key().remote_id(),
            title: proposal.spec.title.clone(),
            abstract_: proposal.spec.abstract_.clone(),
            talk_type: proposal.spec.talk_type,
            speaker_id: speaker_id.to_string(),
            final_: status == SubmissionStatus::Final,
            submission: Submission {
                status,
                last_update: None,
            },
        }
    }
}

impl Record for ProposalRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn same_content(&self, other: &Self) -> bool {
        self.id == other.id
            && self.title == other.title
            && self.abstract_ == other.abstract_
            && self.talk_type == other.talk_type
            && self.speaker_id == other.speaker_id
            && self.final_ == other.final_
            && self.submission.status == other.submission.status
    }
}
