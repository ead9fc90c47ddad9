//! Storage backends behind the facade.
//!
//! The [`StorageBackend`] trait is the substitution seam: the facade talks
//! only to it, so a host pass-through, an archive reader, or an in-memory
//! store can sit underneath without the facade changing.

mod host;
mod memory;
mod traits;

pub use host::HostBackend;
pub use memory::MemoryBackend;
pub use traits::{FileType, StatRecord, StorageBackend};
