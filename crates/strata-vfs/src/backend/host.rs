//! Host filesystem backend.
//!
//! A pass-through over the host OS filesystem: real directories are mounted
//! into the virtual namespace and consulted in search-path order. Archive
//! sources plug in behind the same [`StorageBackend`] contract; this
//! backend only handles directories.

use async_trait::async_trait;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::UNIX_EPOCH;
use tokio::fs;

use super::traits::{FileType, StatRecord, StorageBackend, normalize_vpath, strip_mount_point};

#[derive(Debug, Clone)]
struct Mount {
    real: PathBuf,
    /// Normalized mount point: internal form, no surrounding slashes,
    /// empty for the virtual root.
    mount_point: String,
}

#[derive(Debug, Default)]
struct State {
    /// Ordered search path, highest priority first.
    mounts: Vec<Mount>,
    write_dir: Option<PathBuf>,
    follow_symlinks: bool,
    last_error: String,
}

/// Backend over the host filesystem.
///
/// The lock is never held across an await point: resolution snapshots the
/// mount list, then performs I/O.
#[derive(Debug, Default)]
pub struct HostBackend {
    state: RwLock<State>,
}

impl HostBackend {
    /// Create a backend with an empty search path and no write directory.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, err: io::Error) -> io::Error {
        if let Ok(mut state) = self.state.write() {
            state.last_error = err.to_string();
        }
        err
    }

    fn mounts(&self) -> io::Result<Vec<Mount>> {
        Ok(self
            .state
            .read()
            .map_err(|_| io::Error::other("lock poisoned"))?
            .mounts
            .clone())
    }

    fn follow_symlinks(&self) -> bool {
        self.state
            .read()
            .map(|state| state.follow_symlinks)
            .unwrap_or(false)
    }

    /// Real-path candidates for a virtual path, in search order.
    fn candidates(&self, vpath: &str) -> io::Result<Vec<(PathBuf, PathBuf)>> {
        let vpath = normalize_vpath(vpath)?;
        let mut out = Vec::new();
        for mount in self.mounts()? {
            if let Some(rest) = strip_mount_point(&vpath, &mount.mount_point) {
                let candidate = if rest.is_empty() {
                    mount.real.clone()
                } else {
                    mount.real.join(rest)
                };
                out.push((mount.real, candidate));
            }
        }
        Ok(out)
    }

    /// Stat one real path, honoring the symlink traversal toggle.
    ///
    /// Returns `Ok(None)` when the entry does not exist or is a symlink
    /// while traversal is disabled.
    async fn stat_real(&self, real: &Path, follow: bool) -> io::Result<Option<StatRecord>> {
        let meta = match fs::symlink_metadata(real).await {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };

        if meta.file_type().is_symlink() {
            if !follow {
                return Ok(None);
            }
            // Report the link itself but take size and mtime from the target.
            let target = fs::metadata(real).await?;
            return Ok(Some(StatRecord {
                file_type: FileType::Symlink,
                mod_time: mod_time_secs(&target),
                size: target.len(),
            }));
        }

        let file_type = if meta.is_dir() {
            FileType::Directory
        } else if meta.is_file() {
            FileType::Regular
        } else {
            FileType::Other
        };

        Ok(Some(StatRecord {
            file_type,
            mod_time: mod_time_secs(&meta),
            size: meta.len(),
        }))
    }

    fn write_target(&self, vpath: &str) -> io::Result<PathBuf> {
        let vpath = normalize_vpath(vpath)?;
        let write_dir = self
            .state
            .read()
            .map_err(|_| io::Error::other("lock poisoned"))?
            .write_dir
            .clone()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::PermissionDenied, "no write directory set")
            })?;
        if vpath.is_empty() {
            Ok(write_dir)
        } else {
            Ok(write_dir.join(&vpath))
        }
    }
}

fn mod_time_secs(meta: &std::fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

#[async_trait]
impl StorageBackend for HostBackend {
    async fn mount(&self, real: &Path, mount_point: &str, append: bool) -> io::Result<()> {
        // The source must be readable up front.
        fs::metadata(real).await.map_err(|err| {
            self.record(io::Error::new(
                err.kind(),
                format!("cannot mount '{}': {err}", real.display()),
            ))
        })?;

        let mount_point = normalize_vpath(mount_point).map_err(|err| self.record(err))?;

        let mut state = self
            .state
            .write()
            .map_err(|_| io::Error::other("lock poisoned"))?;
        if state.mounts.iter().any(|m| m.real == real) {
            let err = io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("already mounted: {}", real.display()),
            );
            state.last_error = err.to_string();
            return Err(err);
        }

        let mount = Mount {
            real: real.to_path_buf(),
            mount_point,
        };
        if append {
            state.mounts.push(mount);
        } else {
            state.mounts.insert(0, mount);
        }
        Ok(())
    }

    async fn unmount(&self, real: &Path) -> io::Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| io::Error::other("lock poisoned"))?;
        let before = state.mounts.len();
        state.mounts.retain(|m| m.real != real);
        if state.mounts.len() == before {
            let err = io::Error::new(
                io::ErrorKind::NotFound,
                format!("not mounted: {}", real.display()),
            );
            state.last_error = err.to_string();
            return Err(err);
        }
        Ok(())
    }

    async fn set_write_dir(&self, real: &Path) -> io::Result<()> {
        let meta = fs::metadata(real).await.map_err(|err| self.record(err))?;
        if !meta.is_dir() {
            return Err(self.record(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("write directory is not a directory: {}", real.display()),
            )));
        }

        let mut state = self
            .state
            .write()
            .map_err(|_| io::Error::other("lock poisoned"))?;
        // Keep the write directory visible to readers at highest priority.
        if !state.mounts.iter().any(|m| m.real == real) {
            state.mounts.insert(
                0,
                Mount {
                    real: real.to_path_buf(),
                    mount_point: String::new(),
                },
            );
        }
        state.write_dir = Some(real.to_path_buf());
        Ok(())
    }

    fn write_dir(&self) -> Option<PathBuf> {
        self.state.read().ok()?.write_dir.clone()
    }

    fn search_path(&self) -> Vec<PathBuf> {
        self.state
            .read()
            .map(|state| state.mounts.iter().map(|m| m.real.clone()).collect())
            .unwrap_or_default()
    }

    async fn real_dir(&self, vpath: &str) -> Option<PathBuf> {
        let follow = self.follow_symlinks();
        for (mount_real, candidate) in self.candidates(vpath).ok()? {
            if let Ok(Some(_)) = self.stat_real(&candidate, follow).await {
                return Some(mount_real);
            }
        }
        None
    }

    fn mount_point(&self, real: &Path) -> Option<String> {
        self.state
            .read()
            .ok()?
            .mounts
            .iter()
            .find(|m| m.real == real)
            .map(|m| m.mount_point.clone())
    }

    fn pref_dir(&self, org: &str, app: &str) -> Option<PathBuf> {
        let dirs = directories::ProjectDirs::from("", org, app)?;
        let dir = dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&dir).ok()?;
        Some(dir)
    }

    fn base_dir(&self) -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    async fn stat(&self, vpath: &str) -> io::Result<StatRecord> {
        let follow = self.follow_symlinks();
        for (_, candidate) in self.candidates(vpath).map_err(|err| self.record(err))? {
            if let Some(stat) = self.stat_real(&candidate, follow).await? {
                return Ok(stat);
            }
        }
        Err(self.record(io::Error::new(
            io::ErrorKind::NotFound,
            format!("not found on any mount: {vpath}"),
        )))
    }

    async fn enumerate(&self, vdir: &str) -> io::Result<Vec<String>> {
        let follow = self.follow_symlinks();
        let candidates = self.candidates(vdir).map_err(|err| self.record(err))?;

        let mut seen = HashSet::new();
        let mut names = Vec::new();
        let mut found_any = false;

        for (_, candidate) in candidates {
            let mut dir = match fs::read_dir(&candidate).await {
                Ok(dir) => dir,
                Err(_) => continue,
            };
            found_any = true;

            while let Some(entry) = dir.next_entry().await? {
                if !follow {
                    let file_type = entry.file_type().await?;
                    if file_type.is_symlink() {
                        continue;
                    }
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                if seen.insert(name.clone()) {
                    names.push(name);
                }
            }
        }

        if !found_any {
            return Err(self.record(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no mount contains directory: {vdir}"),
            )));
        }

        names.sort();
        Ok(names)
    }

    async fn read(&self, vpath: &str) -> io::Result<Vec<u8>> {
        let follow = self.follow_symlinks();
        for (_, candidate) in self.candidates(vpath).map_err(|err| self.record(err))? {
            match self.stat_real(&candidate, follow).await? {
                Some(stat) if stat.is_file_like() => {
                    return fs::read(&candidate).await.map_err(|err| self.record(err));
                }
                _ => continue,
            }
        }
        Err(self.record(io::Error::new(
            io::ErrorKind::NotFound,
            format!("not found on any mount: {vpath}"),
        )))
    }

    async fn write(&self, vpath: &str, data: &[u8]) -> io::Result<()> {
        let target = self.write_target(vpath).map_err(|err| self.record(err))?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| self.record(err))?;
        }
        fs::write(&target, data).await.map_err(|err| self.record(err))
    }

    async fn mkdir(&self, vpath: &str) -> io::Result<()> {
        let target = self.write_target(vpath).map_err(|err| self.record(err))?;
        fs::create_dir_all(&target)
            .await
            .map_err(|err| self.record(err))
    }

    async fn remove(&self, vpath: &str) -> io::Result<()> {
        let target = self.write_target(vpath).map_err(|err| self.record(err))?;
        let meta = fs::metadata(&target).await.map_err(|err| self.record(err))?;
        if meta.is_dir() {
            fs::remove_dir(&target).await.map_err(|err| self.record(err))
        } else {
            fs::remove_file(&target).await.map_err(|err| self.record(err))
        }
    }

    fn permit_symlinks(&self, allow: bool) {
        if let Ok(mut state) = self.state.write() {
            state.follow_symlinks = allow;
        }
    }

    fn last_error(&self) -> String {
        self.state
            .read()
            .map(|state| state.last_error.clone())
            .unwrap_or_default()
    }
}
