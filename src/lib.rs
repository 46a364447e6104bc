//! Stratasync - one-way directory mirroring into object storage
//!
//! Scans a local tree and a bucket prefix, plans the uploads and deletes
//! that make the prefix mirror the tree, and applies them with bounded
//! concurrency.

pub mod compare;
pub mod config;
pub mod error;
pub mod executor;
pub mod filter;
pub mod fs;
pub mod planner;
pub mod scanner;
pub mod store;
pub mod sync;
pub mod types;

pub use config::{parse_remote_uri, ComparatorKind, SyncConfig};
pub use error::{Result, SyncError};
pub use store::{MemoryStore, ObjectStore};
pub use sync::{SyncManager, SyncPhase};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
