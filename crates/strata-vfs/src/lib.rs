//! strata-vfs: a mounted virtual filesystem facade with sandboxed
//! external execution.
//!
//! A [`FileSystem`] presents one forward-slash namespace assembled from
//! prioritized mounts on a [`StorageBackend`]. Reads resolve through the
//! search path front to back; writes go to a single designated write
//! directory. An access whitelist gates every operation that touches
//! paths, and its mere non-emptiness disables external command
//! execution.
//!
//! ```no_run
//! use std::sync::Arc;
//! use strata_vfs::{FileSystem, HostBackend};
//!
//! # async fn demo() {
//! let fs = FileSystem::new(Arc::new(HostBackend::new()));
//! fs.load_identity("acme", "tool").await;
//! fs.write_file("settings/video.ini", b"vsync=1").await;
//! # }
//! ```

pub mod access;
pub mod backend;
pub mod error;
pub mod exec;
pub mod facade;
pub mod paths;

pub use backend::{FileType, HostBackend, MemoryBackend, StatRecord, StorageBackend};
pub use error::{FsError, FsResult};
pub use exec::{AsyncExecFinished, ExecKind, INVALID_EXEC_ID, SPAWN_FAILURE_EXIT};
pub use facade::{FileSystem, ScanFlags, TYPE_NAME};
