//! Queued mutations for offline delivery
//!
//! Each queued record carries exactly one strongly-typed `Operation`. Records
//! are immutable once enqueued except for `retry_count`.

use crate::models::{BlockUpdate, CreateBlockParams, PageUpdate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Operation kind tag, used for storage columns and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    PageUpdate,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::PageUpdate => "page-update",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deferred block-store mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum Operation {
    Create(CreateBlockParams),
    #[serde(rename_all = "camelCase")]
    Update {
        block_id: String,
        update: BlockUpdate,
        user_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Delete { block_id: String, cascade: bool },
    #[serde(rename_all = "camelCase")]
    PageUpdate {
        page_id: String,
        update: PageUpdate,
        user_id: String,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Create(_) => OperationKind::Create,
            Operation::Update { .. } => OperationKind::Update,
            Operation::Delete { .. } => OperationKind::Delete,
            Operation::PageUpdate { .. } => OperationKind::PageUpdate,
        }
    }

    /// Page this operation targets, when known
    pub fn page_id(&self) -> Option<&str> {
        match self {
            Operation::Create(params) => Some(&params.page_id),
            Operation::PageUpdate { page_id, .. } => Some(page_id),
            Operation::Update { .. } | Operation::Delete { .. } => None,
        }
    }

    /// Block this operation targets, when known
    pub fn block_id(&self) -> Option<&str> {
        match self {
            Operation::Create(params) => params.id.as_deref(),
            Operation::Update { block_id, .. } | Operation::Delete { block_id, .. } => {
                Some(block_id)
            }
            Operation::PageUpdate { .. } => None,
        }
    }
}

/// Durable record of a pending mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedOperation {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub retry_count: u32,
    pub operation: Operation,
}

impl QueuedOperation {
    /// Wrap an operation for enqueueing, stamped now with `retry_count = 0`
    ///
    /// A create without a block id gets one here, so every replay writes the
    /// same block and later operations can target it.
    pub fn new(mut operation: Operation) -> Self {
        if let Operation::Create(params) = &mut operation {
            if params.id.is_none() {
                params.id = Some(Uuid::new_v4().to_string());
            }
        }
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            retry_count: 0,
            operation,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.operation.kind()
    }

    pub fn page_id(&self) -> Option<&str> {
        self.operation.page_id()
    }

    pub fn block_id(&self) -> Option<&str> {
        self.operation.block_id()
    }
}

/// An operation that will not be retried automatically
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedOperation {
    pub operation: QueuedOperation,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

impl FailedOperation {
    pub fn new(operation: QueuedOperation, error: impl Into<String>) -> Self {
        Self {
            operation,
            error: error.into(),
            failed_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.operation.id
    }
}
