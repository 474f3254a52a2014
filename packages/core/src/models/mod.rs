//! Data Models
//!
//! This module contains the data structures shared by the storage core:
//!
//! - `Block` - a content node in a page's tree, ordered by `position`
//! - `RichTextNode` - the recursive rich-text document held by a block
//! - `Page` / `CachedPage` - page metadata and its local mirror
//! - `QueuedOperation` - a durable record of a deferred mutation

mod block;
mod operation;
mod page;
mod rich_text;

pub use block::{
    Block, BlockProperties, BlockType, BlockUpdate, CreateBlockParams, DeleteResult,
};
pub use operation::{FailedOperation, Operation, OperationKind, QueuedOperation};
pub use page::{CachedPage, Page, PageUpdate};
pub use rich_text::{Mark, RichTextNode};
