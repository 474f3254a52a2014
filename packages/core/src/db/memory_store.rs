//! In-memory DocumentStore
//!
//! A process-local implementation of [`DocumentStore`] used for tests, demos
//! and offline-first development. Collections live behind a single lock so
//! batches apply atomically, and every write is published as a
//! [`StoreChange`] on a broadcast channel that drives subscriptions.
//!
//! Failures can be injected to exercise retry and classification paths:
//! [`MemoryDocumentStore::fail_next`] queues one-shot errors and
//! [`MemoryDocumentStore::set_unavailable`] simulates an outage.

use crate::db::{
    compare_values, BatchOp, Document, DocumentStore, Filter, SnapshotStream, StoreChange,
    StoreError,
};
use crate::config::CoreConfig;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

type Collections = HashMap<String, BTreeMap<String, Map<String, Value>>>;

/// Process-local document store with change broadcasting
pub struct MemoryDocumentStore {
    collections: Arc<RwLock<Collections>>,
    events: broadcast::Sender<StoreChange>,
    injected_failures: Mutex<VecDeque<StoreError>>,
    unavailable: AtomicBool,
    batch_calls: AtomicUsize,
    last_batch_size: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a store whose change channel buffers `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            events,
            injected_failures: Mutex::new(VecDeque::new()),
            unavailable: AtomicBool::new(false),
            batch_calls: AtomicUsize::new(0),
            last_batch_size: AtomicUsize::new(0),
        }
    }

    /// Create a store sized by `config.event_channel_capacity`
    pub fn from_config(config: &CoreConfig) -> Self {
        Self::with_capacity(config.event_channel_capacity)
    }

    /// Raw change feed, one event per written or removed document
    pub fn subscribe_to_changes(&self) -> broadcast::Receiver<StoreChange> {
        self.events.subscribe()
    }

    /// Make the next store call fail with `error`
    pub fn fail_next(&self, error: StoreError) {
        self.injected_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(error);
    }

    /// Simulate the store being unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `atomic_batch` calls that were applied
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    /// Number of writes in the most recently applied batch
    pub fn last_batch_size(&self) -> usize {
        self.last_batch_size.load(Ordering::SeqCst)
    }

    /// Number of documents currently stored in `collection`
    pub fn len(&self, collection: &str) -> usize {
        self.read()
            .get(collection)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if let Some(error) = self
            .injected_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
        {
            return Err(error);
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("memory store is offline"));
        }
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Collections> {
        self.collections.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Collections> {
        self.collections.write().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, changes: Vec<StoreChange>) {
        for change in changes {
            tracing::trace!(
                event = change.event_type(),
                collection = change.collection(),
                id = change.document_id(),
                "Publishing store change"
            );
            // no subscribers is fine
            let _ = self.events.send(change);
        }
    }

    fn snapshot(
        collections: &RwLock<Collections>,
        collection: &str,
        filters: &[Filter],
    ) -> Vec<Document> {
        let collections = collections.read().unwrap_or_else(|e| e.into_inner());
        collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .filter(|doc| doc.matches(filters))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn apply_put(
        collections: &mut Collections,
        collection: &str,
        document: Document,
        merge: bool,
    ) -> StoreChange {
        let docs = collections.entry(collection.to_string()).or_default();
        let previous = docs.get(&document.id).cloned();

        let fields = match (&previous, merge) {
            (Some(existing), true) => {
                let mut merged = existing.clone();
                merged.extend(document.fields);
                merged
            }
            _ => document.fields,
        };
        docs.insert(document.id.clone(), fields.clone());

        StoreChange::Put {
            collection: collection.to_string(),
            document: Document::new(document.id.clone(), fields),
            previous: previous.map(|fields| Document::new(document.id, fields)),
        }
    }

    fn apply_delete(collections: &mut Collections, collection: &str, id: &str) -> Option<StoreChange> {
        let removed = collections.get_mut(collection)?.remove(id)?;
        Some(StoreChange::Deleted {
            collection: collection.to_string(),
            document: Document::new(id, removed),
        })
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.check_available()?;
        Ok(self
            .read()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn query(
        &self,
        collection: &str,
        filters: &[Filter],
        order_by: Option<&str>,
    ) -> Result<Vec<Document>, StoreError> {
        self.check_available()?;
        let mut docs = Self::snapshot(&self.collections, collection, filters);
        if let Some(field) = order_by {
            // stable sort keeps id order among equal keys
            docs.sort_by(|a, b| compare_values(a.field(field), b.field(field)));
        }
        Ok(docs)
    }

    async fn put(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
        merge: bool,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let change = {
            let mut collections = self.write();
            Self::apply_put(&mut collections, collection, Document::new(id, fields), merge)
        };
        self.publish(vec![change]);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.check_available()?;
        let change = {
            let mut collections = self.write();
            Self::apply_delete(&mut collections, collection, id)
        };
        self.publish(change.into_iter().collect());
        Ok(())
    }

    async fn atomic_batch(&self, ops: Vec<BatchOp>) -> Result<(), StoreError> {
        self.check_available()?;
        let size = ops.len();
        let changes = {
            let mut collections = self.write();
            let mut changes = Vec::with_capacity(size);
            for op in ops {
                match op {
                    BatchOp::Put {
                        collection,
                        document,
                        merge,
                    } => changes.push(Self::apply_put(&mut collections, &collection, document, merge)),
                    BatchOp::Delete { collection, id } => {
                        changes.extend(Self::apply_delete(&mut collections, &collection, &id))
                    }
                }
            }
            changes
        };

        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.last_batch_size.store(size, Ordering::SeqCst);
        self.publish(changes);
        Ok(())
    }

    fn subscribe(&self, collection: &str, filters: Vec<Filter>) -> SnapshotStream {
        let receiver = self.events.subscribe();
        let collections = self.collections.clone();
        let collection = collection.to_string();

        let initial = Self::snapshot(&collections, &collection, &filters);
        let updates = BroadcastStream::new(receiver).filter_map(move |event| match event {
            Ok(change) if !change.affects(&collection, &filters) => None,
            // a lagged receiver resyncs from a fresh snapshot
            _ => Some(Self::snapshot(&collections, &collection, &filters)),
        });

        Box::pin(tokio_stream::once(initial).chain(updates))
    }
}
