//! Object store trait and in-memory implementation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use cfp_core::{ConditionType, Conditioned, Conditions, ObjectKey, Resource};
use chrono::Utc;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::watch::{WatchEvent, WatchStream};

/// Extracts index values from an object.
pub type IndexFn<R> = Arc<dyn Fn(&R) -> Vec<String> + Send + Sync>;

/// Options controlling how a controller writes back an object.
#[derive(Debug, Clone, Default)]
pub struct PatchOptions {
    /// Condition types written last-writer-wins; all others keep the stored value.
    pub owned_conditions: Vec<ConditionType>,
    /// Name recorded as the manager of the written fields.
    pub field_owner: Option<String>,
}

impl PatchOptions {
    /// Create empty patch options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the owned condition types.
    #[must_use]
    pub fn with_owned_conditions(mut self, owned: &[ConditionType]) -> Self {
        self.owned_conditions = owned.to_vec();
        self
    }

    /// Set the field owner.
    #[must_use]
    pub fn with_field_owner(mut self, owner: impl Into<String>) -> Self {
        self.field_owner = Some(owner.into());
        self
    }
}

/// Trait for resource storage backends.
///
/// User-facing writes are `create`, `update` (spec) and `delete`; controllers
/// read with `get`/`list` and write back metadata and status with `patch`.
#[async_trait]
pub trait ObjectStore<R: Resource>: Send + Sync {
    /// Get an object by key.
    async fn get(&self, key: &ObjectKey) -> Result<Option<R>>;

    /// List objects, optionally restricted to one namespace.
    async fn list(&self, namespace: Option<&str>) -> Result<Vec<R>>;

    /// List objects whose extracted index values contain `value`.
    async fn list_by_index(&self, index: &str, value: &str) -> Result<Vec<R>>;

    /// Register a field index and index every stored object.
    async fn register_index(&self, index: &str, extract: IndexFn<R>) -> Result<()>;

    /// Create a new object.
    async fn create(&self, obj: R) -> Result<R>;

    /// Replace the spec of an existing object.
    async fn update(&self, obj: R) -> Result<R>;

    /// Request deletion. Deferred while finalizers remain.
    async fn delete(&self, key: &ObjectKey) -> Result<()>;

    /// Write back finalizers and status with owned-condition merging.
    async fn patch(&self, obj: &R, options: &PatchOptions) -> Result<()>;

    /// Subscribe to changes.
    fn watch(&self) -> WatchStream<R>;
}

struct FieldIndex<R> {
    extract: IndexFn<R>,
    entries: HashMap<String, BTreeSet<ObjectKey>>,
    values_by_key: HashMap<ObjectKey, Vec<String>>,
}

impl<R> FieldIndex<R> {
    fn new(extract: IndexFn<R>) -> Self {
        Self {
            extract,
            entries: HashMap::new(),
            values_by_key: HashMap::new(),
        }
    }

    fn remove(&mut self, key: &ObjectKey) {
        for value in self.values_by_key.remove(key).unwrap_or_default() {
            if let Some(keys) = self.entries.get_mut(&value) {
                keys.remove(key);
                if keys.is_empty() {
                    self.entries.remove(&value);
                }
            }
        }
    }

    fn insert(&mut self, key: &ObjectKey, obj: &R) {
        self.remove(key);
        let values = (self.extract)(obj);
        for value in &values {
            self.entries
                .entry(value.clone())
                .or_default()
                .insert(key.clone());
        }
        self.values_by_key.insert(key.clone(), values);
    }
}

struct StoreState<R> {
    objects: BTreeMap<ObjectKey, R>,
    indexes: HashMap<String, FieldIndex<R>>,
}

impl<R> StoreState<R> {
    fn reindex(&mut self, key: &ObjectKey, obj: &R) {
        for index in self.indexes.values_mut() {
            index.insert(key, obj);
        }
    }

    fn unindex(&mut self, key: &ObjectKey) {
        for index in self.indexes.values_mut() {
            index.remove(key);
        }
    }
}

/// In-memory object store.
///
/// Tracks generations, defers deletion behind finalizers, maintains field
/// indexes and broadcasts every effective change to watchers.
pub struct InMemoryStore<R: Resource> {
    state: RwLock<StoreState<R>>,
    events: broadcast::Sender<WatchEvent<R>>,
    resource_version: AtomicU64,
}

impl<R: Resource> InMemoryStore<R> {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a store whose watch channel buffers `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            state: RwLock::new(StoreState {
                objects: BTreeMap::new(),
                indexes: HashMap::new(),
            }),
            events,
            resource_version: AtomicU64::new(0),
        }
    }

    /// Create a new in-memory store wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn next_version(&self) -> u64 {
        self.resource_version
            .fetch_add(1, Ordering::Relaxed)
            .saturating_add(1)
    }

    fn publish(&self, event: WatchEvent<R>) {
        trace!(
            kind = %R::KIND,
            key = %event.object().key(),
            event_type = event.event_type(),
            "Publishing watch event"
        );
        // No receivers is fine
        let _ = self.events.send(event);
    }
}

impl<R: Resource> Default for InMemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Resource> ObjectStore<R> for InMemoryStore<R> {
    async fn get(&self, key: &ObjectKey) -> Result<Option<R>> {
        let state = self.state.read().await;
        Ok(state.objects.get(key).cloned())
    }

    async fn list(&self, namespace: Option<&str>) -> Result<Vec<R>> {
        let state = self.state.read().await;
        Ok(state
            .objects
            .iter()
            .filter(|(key, _)| namespace.is_none_or(|ns| key.namespace == ns))
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn list_by_index(&self, index: &str, value: &str) -> Result<Vec<R>> {
        let state = self.state.read().await;
        let field_index = state
            .indexes
            .get(index)
            .ok_or_else(|| Error::unknown_index(index))?;
        Ok(field_index
            .entries
            .get(value)
            .map(|keys| {
                keys.iter()
                    .filter_map(|key| state.objects.get(key).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn register_index(&self, index: &str, extract: IndexFn<R>) -> Result<()> {
        let mut state = self.state.write().await;
        let mut field_index = FieldIndex::new(extract);
        for (key, obj) in &state.objects {
            field_index.insert(key, obj);
        }
        state.indexes.insert(index.to_string(), field_index);
        debug!(kind = %R::KIND, index, "Registered field index");
        Ok(())
    }

    async fn create(&self, mut obj: R) -> Result<R> {
        obj.validate()?;
        let key = obj.key();

        let mut state = self.state.write().await;
        if state.objects.contains_key(&key) {
            return Err(Error::already_exists(R::KIND, key));
        }

        let version = self.next_version();
        let meta = obj.meta_mut();
        meta.generation = 1;
        meta.resource_version = version;
        meta.deletion_timestamp = None;
        *obj.status_mut() = R::Status::default();

        state.reindex(&key, &obj);
        state.objects.insert(key.clone(), obj.clone());
        drop(state);

        debug!(kind = %R::KIND, key = %key, "Created object");
        self.publish(WatchEvent::Added(obj.clone()));
        Ok(obj)
    }

    async fn update(&self, obj: R) -> Result<R> {
        obj.validate()?;
        let key = obj.key();

        let mut state = self.state.write().await;
        let existing = state
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::not_found(R::KIND, key.clone()))?;

        if existing.spec() == obj.spec() {
            return Ok(existing);
        }

        let mut updated = existing.clone();
        *updated.spec_mut() = obj.spec().clone();
        let version = self.next_version();
        let meta = updated.meta_mut();
        meta.generation = meta.generation.saturating_add(1);
        meta.resource_version = version;

        state.reindex(&key, &updated);
        state.objects.insert(key.clone(), updated.clone());
        drop(state);

        debug!(
            kind = %R::KIND,
            key = %key,
            generation = updated.generation(),
            "Updated object spec"
        );
        self.publish(WatchEvent::Modified {
            old: existing,
            new: updated.clone(),
        });
        Ok(updated)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<()> {
        let mut state = self.state.write().await;
        let existing = state
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| Error::not_found(R::KIND, key.clone()))?;

        if existing.meta().finalizers.is_empty() {
            state.objects.remove(key);
            state.unindex(key);
            drop(state);
            debug!(kind = %R::KIND, key = %key, "Deleted object");
            self.publish(WatchEvent::Deleted(existing));
            return Ok(());
        }

        if existing.meta().is_being_deleted() {
            return Ok(());
        }

        let mut marked = existing.clone();
        let version = self.next_version();
        let meta = marked.meta_mut();
        meta.deletion_timestamp = Some(Utc::now());
        meta.resource_version = version;
        state.objects.insert(key.clone(), marked.clone());
        drop(state);

        debug!(
            kind = %R::KIND,
            key = %key,
            finalizers = ?marked.meta().finalizers,
            "Deletion deferred by finalizers"
        );
        self.publish(WatchEvent::Modified {
            old: existing,
            new: marked,
        });
        Ok(())
    }

    async fn patch(&self, obj: &R, options: &PatchOptions) -> Result<()> {
        let key = obj.key();

        let mut state = self.state.write().await;
        let existing = state
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::not_found(R::KIND, key.clone()))?;

        let mut patched = existing.clone();
        patched.meta_mut().finalizers = obj.meta().finalizers.clone();
        if options.field_owner.is_some() {
            patched.meta_mut().field_manager = options.field_owner.clone();
        }
        let merged = Conditions::merge_owned(
            existing.conditions(),
            obj.conditions(),
            &options.owned_conditions,
        );
        *patched.status_mut() = obj.status().clone();
        *patched.conditions_mut() = merged;

        if patched.meta().is_being_deleted() && patched.meta().finalizers.is_empty() {
            state.objects.remove(&key);
            state.unindex(&key);
            drop(state);
            debug!(kind = %R::KIND, key = %key, "Finalizers cleared, object removed");
            self.publish(WatchEvent::Deleted(patched));
            return Ok(());
        }

        if patched == existing {
            trace!(kind = %R::KIND, key = %key, "Patch is a no-op");
            return Ok(());
        }

        patched.meta_mut().resource_version = self.next_version();
        state.reindex(&key, &patched);
        state.objects.insert(key.clone(), patched.clone());
        drop(state);

        debug!(kind = %R::KIND, key = %key, "Patched object");
        self.publish(WatchEvent::Modified {
            old: existing,
            new: patched,
        });
        Ok(())
    }

    fn watch(&self) -> WatchStream<R> {
        WatchStream::new(self.events.subscribe())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use cfp_core::{
        FINALIZER, Proposal, ProposalSpec, SUCCEEDED_REASON, Speaker, SpeakerRef, SpeakerSpec,
    };

    fn speaker(name: &str) -> Speaker {
        Speaker::new("ns", name, SpeakerSpec::new(name).with_email("a@x.com"))
    }

    #[tokio::test]
    async fn test_create_sets_generation_and_emits_added() {
        let store = InMemoryStore::<Speaker>::new();
        let mut watch = store.watch();

        let created = store.create(speaker("ada")).await.unwrap();
        assert_eq!(created.metadata.generation, 1);

        let event = watch.recv().await.unwrap();
        assert!(matches!(event, WatchEvent::Added(ref s) if s.metadata.name == "ada"));
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_spec() {
        let store = InMemoryStore::<Speaker>::new();
        let mut bad = speaker("ada");
        bad.spec.email = "nope".to_string();
        let result = store.create(bad).await;
        assert!(matches!(result, Err(Error::Invalid(_))));
    }

    #[tokio::test]
    async fn test_update_bumps_generation_only_on_spec_change() {
        let store = InMemoryStore::<Speaker>::new();
        let created = store.create(speaker("ada")).await.unwrap();

        let same = store.update(created.clone()).await.unwrap();
        assert_eq!(same.metadata.generation, 1);

        let mut changed = created;
        changed.spec.bio = "Countess".to_string();
        let updated = store.update(changed).await.unwrap();
        assert_eq!(updated.metadata.generation, 2);
    }

    #[tokio::test]
    async fn test_delete_without_finalizer_removes_immediately() {
        let store = InMemoryStore::<Speaker>::new();
        store.create(speaker("ada")).await.unwrap();
        let key = ObjectKey::new("ns", "ada");

        store.delete(&key).await.unwrap();
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_with_finalizer_is_deferred_until_patch_clears_it() {
        let store = InMemoryStore::<Speaker>::new();
        let mut obj = store.create(speaker("ada")).await.unwrap();
        let key = obj.key();

        obj.metadata.add_finalizer(FINALIZER);
        store.patch(&obj, &PatchOptions::new()).await.unwrap();

        store.delete(&key).await.unwrap();
        let marked = store.get(&key).await.unwrap().unwrap();
        assert!(marked.metadata.is_being_deleted());

        let mut watch = store.watch();
        let mut cleared = marked;
        cleared.metadata.remove_finalizer(FINALIZER);
        store.patch(&cleared, &PatchOptions::new()).await.unwrap();

        assert!(store.get(&key).await.unwrap().is_none());
        assert!(matches!(watch.recv().await.unwrap(), WatchEvent::Deleted(_)));
    }

    #[tokio::test]
    async fn test_patch_merges_owned_conditions_only() {
        let store = InMemoryStore::<Speaker>::new();
        let created = store.create(speaker("ada")).await.unwrap();

        // another controller records its own condition
        let mut foreign = created.clone();
        foreign.mark_true(ConditionType::Other("Audited".into()), "Checked", "ok");
        store
            .patch(
                &foreign,
                &PatchOptions::new().with_owned_conditions(&[ConditionType::Other("Audited".into())]),
            )
            .await
            .unwrap();

        // our stale copy does not know about it
        let mut ours = created;
        ours.status.id = "ns-ada".to_string();
        ours.mark_true(ConditionType::Ready, SUCCEEDED_REASON, "done");
        store
            .patch(
                &ours,
                &PatchOptions::new()
                    .with_owned_conditions(&[ConditionType::Ready])
                    .with_field_owner("cfp-controller"),
            )
            .await
            .unwrap();

        let stored = store.get(&ours.key()).await.unwrap().unwrap();
        assert!(stored.is_ready());
        assert!(stored.conditions().is_true(&ConditionType::Other("Audited".into())));
        assert_eq!(stored.status.id, "ns-ada");
        assert_eq!(stored.metadata.field_manager.as_deref(), Some("cfp-controller"));
    }

    #[tokio::test]
    async fn test_noop_patch_emits_nothing() {
        let store = InMemoryStore::<Speaker>::new();
        let created = store.create(speaker("ada")).await.unwrap();
        let mut watch = store.watch();

        store.patch(&created, &PatchOptions::new()).await.unwrap();

        let mut edited = created.clone();
        edited.spec.bio = "mathematician".to_string();
        store.update(edited).await.unwrap();

        let event = watch.recv().await.unwrap();
        assert!(matches!(
            &event,
            WatchEvent::Modified { old, new }
                if old.spec.bio == created.spec.bio && new.spec.bio == "mathematician"
        ));
    }

    #[tokio::test]
    async fn test_patch_missing_object_is_not_found() {
        let store = InMemoryStore::<Speaker>::new();
        let result = store.patch(&speaker("ghost"), &PatchOptions::new()).await;
        assert!(result.is_err_and(|e| e.is_not_found()));
    }

    #[tokio::test]
    async fn test_index_tracks_spec_changes() {
        let store = InMemoryStore::<Proposal>::new();
        store
            .register_index(
                "speaker",
                Arc::new(|p: &Proposal| vec![p.spec.speaker_ref.name.clone()]),
            )
            .await
            .unwrap();

        let proposal = Proposal::new(
            "ns",
            "talk",
            ProposalSpec::new("T", "A", SpeakerRef::new("ada")),
        );
        let created = store.create(proposal).await.unwrap();
        assert_eq!(store.list_by_index("speaker", "ada").await.unwrap().len(), 1);

        let mut moved = created;
        moved.spec.speaker_ref = SpeakerRef::new("grace");
        store.update(moved).await.unwrap();

        assert!(store.list_by_index("speaker", "ada").await.unwrap().is_empty());
        assert_eq!(store.list_by_index("speaker", "grace").await.unwrap().len(), 1);
        assert!(store.list_by_index("missing", "ada").await.is_err());
    }

    #[tokio::test]
    async fn test_list_filters_namespace() {
        let store = InMemoryStore::<Speaker>::new();
        store.create(speaker("ada")).await.unwrap();
        store
            .create(Speaker::new("other", "grace", SpeakerSpec::new("Grace")))
            .await
            .unwrap();

        assert_eq!(store.list(None).await.unwrap().len(), 2);
        assert_eq!(store.list(Some("other")).await.unwrap().len(), 1);
    }
}
