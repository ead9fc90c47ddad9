//! Storage backend contract and metadata types.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};

/// Kind of entry a stat resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
    Other,
}

/// Metadata for a virtual path, resolved against the first matching mount.
#[derive(Debug, Clone)]
pub struct StatRecord {
    /// Kind of entry.
    pub file_type: FileType,
    /// Last modification time in seconds since the Unix epoch.
    pub mod_time: u64,
    /// Size in bytes (0 for directories).
    pub size: u64,
}

impl StatRecord {
    /// True if this entry behaves as a directory for existence queries.
    pub fn is_dir_like(&self) -> bool {
        matches!(self.file_type, FileType::Directory | FileType::Symlink)
    }

    /// True if this entry behaves as a regular file for existence queries.
    pub fn is_file_like(&self) -> bool {
        matches!(self.file_type, FileType::Regular | FileType::Symlink)
    }
}

/// Abstract storage backend behind the facade.
///
/// Virtual paths are internal form (forward slashes); a leading `/` is
/// accepted and ignored. Reads resolve left-to-right along the ordered
/// search path of mounts; all mutations target the single write directory.
///
/// Implementations must be safe for concurrent readers and may serialize
/// mutators. Any backend satisfying this contract is substitutable: a host
/// pass-through, an archive reader, or an in-memory store.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Add a real path to the search path under a virtual mount point.
    ///
    /// `append=false` prepends (highest priority), `append=true` appends
    /// (lowest). An empty mount point mounts at the virtual root. Fails if
    /// `real` is unreadable or already mounted.
    async fn mount(&self, real: &Path, mount_point: &str, append: bool) -> io::Result<()>;

    /// Remove a mount by its real path.
    async fn unmount(&self, real: &Path) -> io::Result<()>;

    /// Designate the write directory. Must be an existing real directory;
    /// it is also placed at the front of the search path if not already
    /// mounted, so newly written files are immediately visible to readers.
    async fn set_write_dir(&self, real: &Path) -> io::Result<()>;

    /// Current write directory, if set.
    fn write_dir(&self) -> Option<PathBuf>;

    /// Ordered list of mounted real paths, highest priority first.
    fn search_path(&self) -> Vec<PathBuf>;

    /// Real path of the mount containing the first match of `vpath`.
    async fn real_dir(&self, vpath: &str) -> Option<PathBuf>;

    /// Virtual mount point for a mounted real path.
    fn mount_point(&self, real: &Path) -> Option<String>;

    /// Host-conventional per-user preference directory, created on demand.
    fn pref_dir(&self, org: &str, app: &str) -> Option<PathBuf>;

    /// Directory containing the running program's executable.
    fn base_dir(&self) -> PathBuf;

    /// Metadata for the first match of `vpath` in search order.
    async fn stat(&self, vpath: &str) -> io::Result<StatRecord>;

    /// Names in a virtual directory, merged across mounts and de-duplicated.
    async fn enumerate(&self, vdir: &str) -> io::Result<Vec<String>>;

    /// Read the first match of `vpath` in search order.
    async fn read(&self, vpath: &str) -> io::Result<Vec<u8>>;

    /// Write a file under the write directory, creating parents as needed.
    async fn write(&self, vpath: &str, data: &[u8]) -> io::Result<()>;

    /// Create a directory (and parents) under the write directory.
    async fn mkdir(&self, vpath: &str) -> io::Result<()>;

    /// Remove a file or empty directory under the write directory.
    async fn remove(&self, vpath: &str) -> io::Result<()>;

    /// Globally toggle symlink traversal. Off by default: symlinked entries
    /// are invisible to stat, enumerate, and read.
    fn permit_symlinks(&self, allow: bool);

    /// Human-readable description of the most recent failure.
    fn last_error(&self) -> String;

    /// Check if a virtual path exists on any mount.
    async fn exists(&self, vpath: &str) -> bool {
        self.stat(vpath).await.is_ok()
    }
}

/// Strip a normalized virtual path down to the part below a mount point.
///
/// `vpath` must have no leading slash; `mount_point` is the normalized
/// mount point ("" for the root). Returns `None` when the path is outside
/// the mount.
pub(crate) fn strip_mount_point<'a>(vpath: &'a str, mount_point: &str) -> Option<&'a str> {
    if mount_point.is_empty() {
        return Some(vpath);
    }
    if vpath == mount_point {
        return Some("");
    }
    vpath
        .strip_prefix(mount_point)
        .and_then(|rest| rest.strip_prefix('/'))
}

/// Normalize a virtual path: internal form, no leading or trailing slash.
///
/// Rejects `.`/`..` segments; the virtual namespace has no relative
/// traversal.
pub(crate) fn normalize_vpath(vpath: &str) -> io::Result<String> {
    let fixed = crate::paths::internal(vpath.trim());
    let trimmed = fixed.trim_matches('/');
    if trimmed
        .split('/')
        .any(|segment| segment == "." || segment == "..")
    {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("relative segments not allowed in virtual path: {vpath}"),
        ));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_mount_point() {
        assert_eq!(strip_mount_point("data/x.txt", ""), Some("data/x.txt"));
        assert_eq!(strip_mount_point("data/x.txt", "data"), Some("x.txt"));
        assert_eq!(strip_mount_point("data", "data"), Some(""));
        assert_eq!(strip_mount_point("database/x", "data"), None);
        assert_eq!(strip_mount_point("other/x", "data"), None);
    }

    #[test]
    fn test_normalize_vpath() {
        assert_eq!(normalize_vpath("/data/x.txt").unwrap(), "data/x.txt");
        assert_eq!(normalize_vpath("data\\x.txt").unwrap(), "data/x.txt");
        assert_eq!(normalize_vpath("dir/").unwrap(), "dir");
        assert_eq!(normalize_vpath("/").unwrap(), "");
        assert!(normalize_vpath("a/../b").is_err());
        assert!(normalize_vpath("./a").is_err());
    }

    #[test]
    fn test_stat_record_kinds() {
        let dir = StatRecord {
            file_type: FileType::Directory,
            mod_time: 0,
            size: 0,
        };
        assert!(dir.is_dir_like());
        assert!(!dir.is_file_like());

        let link = StatRecord {
            file_type: FileType::Symlink,
            mod_time: 0,
            size: 0,
        };
        assert!(link.is_dir_like());
        assert!(link.is_file_like());
    }
}
