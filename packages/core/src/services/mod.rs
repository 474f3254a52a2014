//! Business Services
//!
//! - `BlockService` - block CRUD, tree traversal and positioning
//! - `OfflineQueue` - durable, order-preserving replay of mutations
//! - `ConnectivityMonitor` - online/offline signal
//! - `SyncCoordinator` - decides when the queue drains, mirrors pages locally

pub mod block_service;
pub mod connectivity;
pub mod error;
pub mod offline_queue;
pub mod sync_coordinator;

pub use block_service::{
    BlockService, BlockStream, OperationExecutor, BLOCKS_COLLECTION, PAGES_COLLECTION,
};
pub use connectivity::ConnectivityMonitor;
pub use error::{classify, BlockServiceError, OperationFailure};
pub use offline_queue::{DrainReport, OfflineQueue, QueueStatus};
pub use sync_coordinator::{SyncCoordinator, SyncHandle};
