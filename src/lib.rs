pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

pub use config::SyncConfig;
pub use core::{sync, Action, ActionSummary, SyncEngine, SyncReport};
pub use error::{Result, SyncError};
pub use storage::{Bucket, Locator, MemoryBucket, S3Bucket};
