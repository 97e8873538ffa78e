pub mod applier;
pub mod comparator;
pub mod engine;
pub mod fingerprint;
pub mod remote_index;
pub mod scanner;

pub use applier::{apply, ApplyContext};
pub use comparator::{diff, Action, ActionSummary};
pub use engine::{sync, SyncEngine, SyncReport};
pub use fingerprint::fingerprint;
pub use remote_index::{RemoteIndex, RemoteIndexBuilder, RemoteObject};
pub use scanner::{FileEntry, FileScanner};
