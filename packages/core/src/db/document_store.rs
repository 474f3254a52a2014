//! DocumentStore Trait - Backing Store Abstraction
//!
//! The authoritative store for pages and blocks is a remote document database.
//! This trait captures the small capability set the storage core relies on:
//! point reads, equality queries with ordering, put (replace or merge), delete,
//! all-or-nothing batches, and real-time snapshot subscriptions.
//!
//! # Ordering
//!
//! `query` with an `order_by` field sorts ascending. String fields compare
//! byte-wise, which is the sibling ordering relation for block positions.
//!
//! # Subscriptions
//!
//! `subscribe` returns a lazy stream of snapshots. The first item is the
//! current result set; every later item is a fresh result set after a change
//! that could affect it. Consumers pull at their own pace; dropping the stream
//! ends the subscription.

use crate::db::StoreError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::pin::Pin;
use tokio_stream::Stream;

/// Stream of query snapshots produced by [`DocumentStore::subscribe`]
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Vec<Document>> + Send>>;

/// A stored document: id plus top-level fields
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Encode a serializable record as document fields
    pub fn from_record<T: Serialize>(id: impl Into<String>, record: &T) -> Result<Self, StoreError> {
        match serde_json::to_value(record)? {
            Value::Object(fields) => Ok(Self::new(id, fields)),
            other => Err(StoreError::Serialization(format!(
                "expected an object, got {}",
                other
            ))),
        }
    }

    /// Decode the document fields into a record
    pub fn into_record<T: DeserializeOwned>(self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(Value::Object(self.fields))?)
    }

    /// Field value, missing fields read as `null`
    pub fn field(&self, name: &str) -> &Value {
        self.fields.get(name).unwrap_or(&Value::Null)
    }

    /// Whether every equality filter holds for this document
    pub fn matches(&self, filters: &[Filter]) -> bool {
        filters.iter().all(|filter| self.field(&filter.field) == &filter.value)
    }
}

/// Equality filter on a top-level field; `null` matches missing fields
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            value,
        }
    }
}

/// A single write inside [`DocumentStore::atomic_batch`]
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    Put {
        collection: String,
        document: Document,
        merge: bool,
    },
    Delete {
        collection: String,
        id: String,
    },
}

impl BatchOp {
    pub fn put(collection: impl Into<String>, document: Document) -> Self {
        BatchOp::Put {
            collection: collection.into(),
            document,
            merge: false,
        }
    }

    pub fn delete(collection: impl Into<String>, id: impl Into<String>) -> Self {
        BatchOp::Delete {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

/// Ascending order over JSON field values
///
/// `null` sorts first, then booleans, numbers, strings (byte-wise); arrays and
/// objects compare equal to each other.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn class(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) | Value::Object(_) => 4,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.as_bytes().cmp(y.as_bytes()),
        _ => class(a).cmp(&class(b)),
    }
}

/// Abstraction over the authoritative document database
///
/// Implementations must be `Send + Sync`; every call may suspend on the network.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Get a document by id; `Ok(None)` when it does not exist
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// All documents matching every filter, ascending by `order_by` when given
    async fn query(
        &self,
        collection: &str,
        filters: &[Filter],
        order_by: Option<&str>,
    ) -> Result<Vec<Document>, StoreError>;

    /// Write a document; `merge` updates top-level fields instead of replacing
    async fn put(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
        merge: bool,
    ) -> Result<(), StoreError>;

    /// Delete a document; deleting a missing id succeeds
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Apply all writes or none
    async fn atomic_batch(&self, ops: Vec<BatchOp>) -> Result<(), StoreError>;

    /// Real-time snapshots of the documents matching `filters`
    fn subscribe(&self, collection: &str, filters: Vec<Filter>) -> SnapshotStream;
}
