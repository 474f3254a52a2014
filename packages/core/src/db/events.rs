//! Change events for document stores
//!
//! Stores publish one `StoreChange` per written or removed document on a tokio
//! broadcast channel. Subscriptions turn these into fresh query snapshots.

use crate::db::{Document, Filter};

/// A single document-level change
#[derive(Debug, Clone)]
pub enum StoreChange {
    /// A document was created or overwritten
    Put {
        collection: String,
        document: Document,
        previous: Option<Document>,
    },

    /// A document was removed
    Deleted {
        collection: String,
        document: Document,
    },
}

impl StoreChange {
    pub fn collection(&self) -> &str {
        match self {
            StoreChange::Put { collection, .. } | StoreChange::Deleted { collection, .. } => {
                collection
            }
        }
    }

    pub fn document_id(&self) -> &str {
        match self {
            StoreChange::Put { document, .. } | StoreChange::Deleted { document, .. } => {
                &document.id
            }
        }
    }

    /// Event type label for logging
    pub fn event_type(&self) -> &str {
        match self {
            StoreChange::Put { previous: None, .. } => "document:created",
            StoreChange::Put { .. } => "document:updated",
            StoreChange::Deleted { .. } => "document:deleted",
        }
    }

    /// Whether this change can alter the result set of `filters` on `collection`
    pub fn affects(&self, collection: &str, filters: &[Filter]) -> bool {
        if self.collection() != collection {
            return false;
        }
        match self {
            StoreChange::Put {
                document, previous, ..
            } => {
                document.matches(filters)
                    || previous.as_ref().is_some_and(|prev| prev.matches(filters))
            }
            StoreChange::Deleted { document, .. } => document.matches(filters),
        }
    }
}
