//! PageSpace Core Storage Layer
//!
//! Block storage for a collaborative page editor: blocks form a tree per page,
//! siblings are ordered by fractional-index position keys, and mutations made
//! offline are queued durably and replayed in submission order once the
//! client reconnects.
//!
//! # Modules
//!
//! - [`models`] - Blocks, pages, rich text and queued operations
//! - [`db`] - Position keys, document store abstraction, Local Cache
//! - [`services`] - Block service, offline queue, sync coordination
//! - [`config`] - JSON configuration with defaults
//! - [`logging`] - tracing subscriber setup

pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::CoreConfig;
pub use models::*;
pub use services::*;
