//! In-memory registry double.
//!
//! Behaves like the CFP API: duplicate creates and updates of absent records
//! are rejected with 400, reads and deletes of absent records answer 404,
//! proposals must reference an existing speaker, and every proposal write
//! stamps `submission.lastUpdate`. Calls are counted per kind and failures can
//! be injected per operation.

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use cfp_core::ResourceKind;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::client::Registry;
use crate::error::{Error, Operation, Result};

/// Number of calls issued per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub create: usize,
    pub update: usize,
    pub get: usize,
    pub delete: usize,
}

impl CallCounts {
    /// Calls that mutate the registry.
    pub const fn writes(&self) -> usize {
        self.create
            .saturating_add(self.update)
            .saturating_add(self.delete)
    }

    /// All calls.
    pub const fn total(&self) -> usize {
        self.writes().saturating_add(self.get)
    }

    fn bump(&mut self, operation: Operation) {
        let slot = match operation {
            Operation::Create => &mut self.create,
            Operation::Update => &mut self.update,
            Operation::Fetch => &mut self.get,
            Operation::Delete => &mut self.delete,
        };
        *slot = slot.saturating_add(1);
    }
}

#[derive(Default)]
struct State {
    records: HashMap<ResourceKind, BTreeMap<String, Value>>,
    calls: HashMap<ResourceKind, CallCounts>,
    failures: HashMap<(ResourceKind, Operation), VecDeque<Error>>,
}

impl State {
    fn records(&mut self, kind: ResourceKind) -> &mut BTreeMap<String, Value> {
        self.records.entry(kind).or_default()
    }

    fn exists(&self, kind: ResourceKind, id: &str) -> bool {
        self.records
            .get(&kind)
            .is_some_and(|records| records.contains_key(id))
    }

    /// Count the call and pop an injected failure, if any.
    fn enter(&mut self, kind: ResourceKind, operation: Operation) -> Result<()> {
        self.calls.entry(kind).or_default().bump(operation);
        match self
            .failures
            .get_mut(&(kind, operation))
            .and_then(VecDeque::pop_front)
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Registry double holding records in memory.
#[derive(Default)]
pub struct InMemoryRegistry {
    state: Mutex<State>,
}

impl InMemoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls issued so far for a kind.
    pub async fn calls(&self, kind: ResourceKind) -> CallCounts {
        let state = self.state.lock().await;
        state.calls.get(&kind).copied().unwrap_or_default()
    }

    /// Reset call counters.
    pub async fn reset_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    /// Fail the next `times` calls of an operation with `error`.
    pub async fn inject_failure(
        &self,
        kind: ResourceKind,
        operation: Operation,
        error: Error,
        times: usize,
    ) {
        let mut state = self.state.lock().await;
        let queue = state.failures.entry((kind, operation)).or_default();
        queue.extend(std::iter::repeat_n(error, times));
    }

    /// Current stored record.
    pub async fn record(&self, kind: ResourceKind, id: &str) -> Option<Value> {
        let state = self.state.lock().await;
        state.records.get(&kind).and_then(|r| r.get(id)).cloned()
    }

    /// Number of stored records of a kind.
    pub async fn len(&self, kind: ResourceKind) -> usize {
        let state = self.state.lock().await;
        state.records.get(&kind).map_or(0, BTreeMap::len)
    }

    /// Store a record directly, bypassing validation and counters.
    pub async fn insert(&self, kind: ResourceKind, id: impl Into<String>, record: Value) {
        self.state.lock().await.records(kind).insert(id.into(), record);
    }

    /// Remove a record directly, bypassing counters.
    pub async fn remove(&self, kind: ResourceKind, id: &str) -> Option<Value> {
        self.state.lock().await.records(kind).remove(id)
    }
}

fn bad_request(operation: Operation, kind: ResourceKind, message: impl Into<String>) -> Error {
    Error::rejected(operation, kind, message).with_status(400)
}

fn not_found(operation: Operation, kind: ResourceKind, id: &str) -> Error {
    Error::rejected(
        operation,
        kind,
        format!("could not find {} with ID '{id}'", kind.as_str().to_lowercase()),
    )
    .with_status(404)
}

fn decode(operation: Operation, kind: ResourceKind, payload: &[u8]) -> Result<Value> {
    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| bad_request(operation, kind, format!("invalid body: {e}")))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(bad_request(operation, kind, "body must be a JSON object"))
    }
}

fn record_id(value: &Value) -> Option<&str> {
    value
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}

fn encode(operation: Operation, kind: ResourceKind, value: &Value) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| Error::rejected(operation, kind, e.to_string()).with_status(500))
}

impl State {
    /// Validate and stamp a record before it is written.
    fn prepare(&self, operation: Operation, kind: ResourceKind, value: &mut Value) -> Result<()> {
        if kind == ResourceKind::Proposal {
            let speaker_id = value
                .get("speakerID")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| bad_request(operation, kind, "speaker ID must be specified"))?;
            if !self.exists(ResourceKind::Speaker, speaker_id) {
                return Err(bad_request(
                    operation,
                    kind,
                    format!("failed to get speaker: could not find speaker with ID '{speaker_id}'"),
                ));
            }
            if let Some(submission) = value.get_mut("submission").and_then(Value::as_object_mut) {
                submission.insert("lastUpdate".to_string(), Value::String(Utc::now().to_rfc3339()));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn create(&self, kind: ResourceKind, payload: &[u8]) -> Result<Vec<u8>> {
        let operation = Operation::Create;
        let mut state = self.state.lock().await;
        state.enter(kind, operation)?;

        let mut value = decode(operation, kind, payload)?;
        let id = record_id(&value)
            .map(str::to_string)
            .ok_or_else(|| bad_request(operation, kind, "ID must be specified"))?;
        if state.exists(kind, &id) {
            return Err(bad_request(
                operation,
                kind,
                format!("{} with ID '{id}' already exists", kind.as_str().to_lowercase()),
            ));
        }
        state.prepare(operation, kind, &mut value)?;

        debug!(%kind, id = %id, "Registry double stored record");
        let body = encode(operation, kind, &value)?;
        state.records(kind).insert(id, value);
        Ok(body)
    }

    async fn update(&self, kind: ResourceKind, id: &str, payload: &[u8]) -> Result<Vec<u8>> {
        let operation = Operation::Update;
        let mut state = self.state.lock().await;
        state.enter(kind, operation)?;

        let mut value = decode(operation, kind, payload)?;
        if record_id(&value) != Some(id) {
            return Err(bad_request(
                operation,
                kind,
                format!("ID '{id}' does not match ID in request body"),
            ));
        }
        if !state.exists(kind, id) {
            return Err(bad_request(
                operation,
                kind,
                format!("{} with ID '{id}' was not found", kind.as_str().to_lowercase()),
            ));
        }
        state.prepare(operation, kind, &mut value)?;

        let body = encode(operation, kind, &value)?;
        state.records(kind).insert(id.to_string(), value);
        Ok(body)
    }

    async fn get(&self, kind: ResourceKind, id: &str) -> Result<Vec<u8>> {
        let operation = Operation::Fetch;
        let mut state = self.state.lock().await;
        state.enter(kind, operation)?;

        let value = state
            .records
            .get(&kind)
            .and_then(|records| records.get(id))
            .ok_or_else(|| not_found(operation, kind, id))?;
        encode(operation, kind, value)
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<()> {
        let operation = Operation::Delete;
        let mut state = self.state.lock().await;
        state.enter(kind, operation)?;

        state
            .records(kind)
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| not_found(operation, kind, id))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::error::ErrorReason;
    use serde_json::json;

    fn speaker() -> Vec<u8> {
        serde_json::to_vec(&json!({"id": "ns-Ada", "name": "Ada", "bio": "", "email": ""})).unwrap()
    }

    fn proposal(speaker_id: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": "ns-intro",
            "title": "T",
            "abstract": "A",
            "type": "talk",
            "speakerID": speaker_id,
            "final": false,
            "submission": {"status": "draft"}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let registry = InMemoryRegistry::new();
        registry.create(ResourceKind::Speaker, &speaker()).await.unwrap();

        let err = registry
            .create(ResourceKind::Speaker, &speaker())
            .await
            .unwrap_err();
        assert_eq!(err.reason, ErrorReason::CreateSpeakerFailed);
        assert_eq!(err.status, Some(400));
        assert_eq!(registry.calls(ResourceKind::Speaker).await.create, 2);
    }

    #[tokio::test]
    async fn test_proposal_requires_speaker_and_gets_timestamp() {
        let registry = InMemoryRegistry::new();
        let err = registry
            .create(ResourceKind::Proposal, &proposal("ns-Ada"))
            .await
            .unwrap_err();
        assert_eq!(err.reason, ErrorReason::CreateProposalFailed);

        registry.create(ResourceKind::Speaker, &speaker()).await.unwrap();
        let stored = registry
            .create(ResourceKind::Proposal, &proposal("ns-Ada"))
            .await
            .unwrap();
        let stored: Value = serde_json::from_slice(&stored).unwrap();
        assert!(stored["submission"]["lastUpdate"].is_string());
    }

    #[tokio::test]
    async fn test_get_and_delete_missing_are_not_found() {
        let registry = InMemoryRegistry::new();
        let get = registry.get(ResourceKind::Speaker, "ns-Ada").await.unwrap_err();
        assert!(get.is_not_found());
        assert_eq!(get.reason, ErrorReason::FetchSpeakerFailed);

        let delete = registry
            .delete(ResourceKind::Speaker, "ns-Ada")
            .await
            .unwrap_err();
        assert!(delete.is_not_found());
    }

    #[tokio::test]
    async fn test_update_requires_existing_record() {
        let registry = InMemoryRegistry::new();
        let err = registry
            .update(ResourceKind::Speaker, "ns-Ada", &speaker())
            .await
            .unwrap_err();
        assert_eq!(err.reason, ErrorReason::UpdateSpeakerFailed);

        let mismatched = registry
            .update(ResourceKind::Speaker, "ns-Bob", &speaker())
            .await
            .unwrap_err();
        assert_eq!(mismatched.status, Some(400));
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let registry = InMemoryRegistry::new();
        registry
            .inject_failure(
                ResourceKind::Speaker,
                Operation::Create,
                Error::request_failed("connection reset"),
                1,
            )
            .await;

        let first = registry.create(ResourceKind::Speaker, &speaker()).await;
        assert!(first.is_err_and(|e| e.reason == ErrorReason::RequestFailed));
        assert!(registry.create(ResourceKind::Speaker, &speaker()).await.is_ok());

        let calls = registry.calls(ResourceKind::Speaker).await;
        assert_eq!(calls.create, 2);
        assert_eq!(calls.writes(), 2);
        assert_eq!(registry.len(ResourceKind::Speaker).await, 1);
    }
}
