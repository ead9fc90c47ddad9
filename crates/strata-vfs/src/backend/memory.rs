//! In-memory backend.
//!
//! Stores are ephemeral archives addressed by a label path; tests and
//! embedders preload them, mount them, and exercise the facade without
//! touching the host filesystem.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use super::traits::{FileType, StatRecord, StorageBackend, normalize_vpath, strip_mount_point};

#[derive(Debug, Clone)]
enum Entry {
    File { data: Vec<u8>, modified: u64 },
    Directory { modified: u64 },
}

/// One ephemeral archive: entries keyed by normalized relative path.
/// The root directory is implicit.
#[derive(Debug, Default, Clone)]
struct Store {
    entries: HashMap<String, Entry>,
}

#[derive(Debug, Clone)]
struct Mount {
    store: PathBuf,
    mount_point: String,
}

#[derive(Debug, Default)]
struct State {
    stores: HashMap<PathBuf, Store>,
    mounts: Vec<Mount>,
    write_dir: Option<PathBuf>,
    last_error: String,
}

/// Ephemeral backend holding everything in memory.
///
/// All data is lost on drop. Symlinks do not exist here, so
/// `permit_symlinks` is a no-op.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: RwLock<State>,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

impl MemoryBackend {
    /// Create a backend with no stores.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an empty store under a label path.
    pub fn add_store(&self, label: impl Into<PathBuf>) {
        if let Ok(mut state) = self.state.write() {
            state.stores.entry(label.into()).or_default();
        }
    }

    /// Preload a file into a store, creating the store and parent
    /// directories as needed.
    pub fn preload(&self, label: impl Into<PathBuf>, vpath: &str, data: &[u8]) {
        let Ok(path) = normalize_vpath(vpath) else {
            return;
        };
        let Ok(mut state) = self.state.write() else {
            return;
        };
        let store = state.stores.entry(label.into()).or_default();
        ensure_parents(store, &path);
        store.entries.insert(
            path,
            Entry::File {
                data: data.to_vec(),
                modified: now_secs(),
            },
        );
    }

    fn record(&self, err: io::Error) -> io::Error {
        if let Ok(mut state) = self.state.write() {
            state.last_error = err.to_string();
        }
        err
    }

    fn lock_err() -> io::Error {
        io::Error::other("lock poisoned")
    }

    /// Resolve a virtual path against the search order, returning the first
    /// store that holds it and the store-relative path.
    fn resolve(&self, vpath: &str) -> io::Result<(PathBuf, String, Entry)> {
        let vpath = normalize_vpath(vpath)?;
        let state = self.state.read().map_err(|_| Self::lock_err())?;
        for mount in &state.mounts {
            let Some(rest) = strip_mount_point(&vpath, &mount.mount_point) else {
                continue;
            };
            let Some(store) = state.stores.get(&mount.store) else {
                continue;
            };
            if rest.is_empty() {
                // Store root, always a directory.
                return Ok((
                    mount.store.clone(),
                    String::new(),
                    Entry::Directory { modified: 0 },
                ));
            }
            if let Some(entry) = store.entries.get(rest) {
                return Ok((mount.store.clone(), rest.to_string(), entry.clone()));
            }
        }
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("not found on any mount: {vpath}"),
        ))
    }

    fn write_store_path(state: &State, vpath: &str) -> io::Result<(PathBuf, String)> {
        let path = normalize_vpath(vpath)?;
        let store = state.write_dir.clone().ok_or_else(|| {
            io::Error::new(io::ErrorKind::PermissionDenied, "no write directory set")
        })?;
        Ok((store, path))
    }
}

fn ensure_parents(store: &mut Store, path: &str) {
    let mut current = String::new();
    let Some((dirs, _)) = path.rsplit_once('/') else {
        return;
    };
    for segment in dirs.split('/') {
        if !current.is_empty() {
            current.push('/');
        }
        current.push_str(segment);
        store
            .entries
            .entry(current.clone())
            .or_insert(Entry::Directory {
                modified: now_secs(),
            });
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn mount(&self, real: &Path, mount_point: &str, append: bool) -> io::Result<()> {
        let mount_point = normalize_vpath(mount_point).map_err(|err| self.record(err))?;
        let mut state = self.state.write().map_err(|_| Self::lock_err())?;

        if !state.stores.contains_key(real) {
            let err = io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such store: {}", real.display()),
            );
            state.last_error = err.to_string();
            return Err(err);
        }
        if state.mounts.iter().any(|m| m.store == real) {
            let err = io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("already mounted: {}", real.display()),
            );
            state.last_error = err.to_string();
            return Err(err);
        }

        let mount = Mount {
            store: real.to_path_buf(),
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
        let mut state = self.state.write().map_err(|_| Self::lock_err())?;
        let before = state.mounts.len();
        state.mounts.retain(|m| m.store != real);
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
        let mut state = self.state.write().map_err(|_| Self::lock_err())?;
        state.stores.entry(real.to_path_buf()).or_default();
        if !state.mounts.iter().any(|m| m.store == real) {
            state.mounts.insert(
                0,
                Mount {
                    store: real.to_path_buf(),
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
            .map(|state| state.mounts.iter().map(|m| m.store.clone()).collect())
            .unwrap_or_default()
    }

    async fn real_dir(&self, vpath: &str) -> Option<PathBuf> {
        self.resolve(vpath).ok().map(|(store, _, _)| store)
    }

    fn mount_point(&self, real: &Path) -> Option<String> {
        self.state
            .read()
            .ok()?
            .mounts
            .iter()
            .find(|m| m.store == real)
            .map(|m| m.mount_point.clone())
    }

    fn pref_dir(&self, org: &str, app: &str) -> Option<PathBuf> {
        // Synthesize and register a per-app store so load_identity works
        // against this backend the same way it does on the host.
        let label = PathBuf::from(format!("/pref/{org}/{app}"));
        self.add_store(label.clone());
        Some(label)
    }

    fn base_dir(&self) -> PathBuf {
        PathBuf::from("/base")
    }

    async fn stat(&self, vpath: &str) -> io::Result<StatRecord> {
        let (_, _, entry) = self.resolve(vpath).map_err(|err| self.record(err))?;
        Ok(match entry {
            Entry::File { data, modified } => StatRecord {
                file_type: FileType::Regular,
                mod_time: modified,
                size: data.len() as u64,
            },
            Entry::Directory { modified } => StatRecord {
                file_type: FileType::Directory,
                mod_time: modified,
                size: 0,
            },
        })
    }

    async fn enumerate(&self, vdir: &str) -> io::Result<Vec<String>> {
        let vdir = normalize_vpath(vdir).map_err(|err| self.record(err))?;
        let state = self.state.read().map_err(|_| Self::lock_err())?;

        let mut names: Vec<String> = Vec::new();
        let mut found_any = false;

        for mount in &state.mounts {
            let Some(rest) = strip_mount_point(&vdir, &mount.mount_point) else {
                continue;
            };
            let Some(store) = state.stores.get(&mount.store) else {
                continue;
            };
            if !rest.is_empty() {
                match store.entries.get(rest) {
                    Some(Entry::Directory { .. }) => {}
                    _ => continue,
                }
            }
            found_any = true;

            for path in store.entries.keys() {
                let child = if rest.is_empty() {
                    Some(path.as_str())
                } else {
                    path.strip_prefix(rest).and_then(|p| p.strip_prefix('/'))
                };
                if let Some(child) = child {
                    if !child.is_empty() && !child.contains('/') && !names.iter().any(|n| n == child)
                    {
                        names.push(child.to_string());
                    }
                }
            }
        }

        if !found_any {
            drop(state);
            return Err(self.record(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no mount contains directory: {vdir}"),
            )));
        }

        names.sort();
        Ok(names)
    }

    async fn read(&self, vpath: &str) -> io::Result<Vec<u8>> {
        let (_, _, entry) = self.resolve(vpath).map_err(|err| self.record(err))?;
        match entry {
            Entry::File { data, .. } => Ok(data),
            Entry::Directory { .. } => Err(self.record(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {vpath}"),
            ))),
        }
    }

    async fn write(&self, vpath: &str, data: &[u8]) -> io::Result<()> {
        let mut state = self.state.write().map_err(|_| Self::lock_err())?;
        let (label, path) = Self::write_store_path(&state, vpath).map_err(|err| {
            state.last_error = err.to_string();
            err
        })?;

        let store = state.stores.entry(label).or_default();
        if let Some(Entry::Directory { .. }) = store.entries.get(&path) {
            let err = io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("is a directory: {vpath}"),
            );
            state.last_error = err.to_string();
            return Err(err);
        }
        ensure_parents(store, &path);
        store.entries.insert(
            path,
            Entry::File {
                data: data.to_vec(),
                modified: now_secs(),
            },
        );
        Ok(())
    }

    async fn mkdir(&self, vpath: &str) -> io::Result<()> {
        let mut state = self.state.write().map_err(|_| Self::lock_err())?;
        let (label, path) = Self::write_store_path(&state, vpath).map_err(|err| {
            state.last_error = err.to_string();
            err
        })?;

        let store = state.stores.entry(label).or_default();
        if let Some(Entry::File { .. }) = store.entries.get(&path) {
            let err = io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("file exists: {vpath}"),
            );
            state.last_error = err.to_string();
            return Err(err);
        }
        ensure_parents(store, &path);
        if !path.is_empty() {
            store.entries.entry(path).or_insert(Entry::Directory {
                modified: now_secs(),
            });
        }
        Ok(())
    }

    async fn remove(&self, vpath: &str) -> io::Result<()> {
        let mut state = self.state.write().map_err(|_| Self::lock_err())?;
        let (label, path) = Self::write_store_path(&state, vpath).map_err(|err| {
            state.last_error = err.to_string();
            err
        })?;

        let store = state.stores.entry(label).or_default();
        if path.is_empty() {
            let err =
                io::Error::new(io::ErrorKind::PermissionDenied, "cannot remove store root");
            state.last_error = err.to_string();
            return Err(err);
        }
        if let Some(Entry::Directory { .. }) = store.entries.get(&path) {
            let prefix = format!("{path}/");
            if store.entries.keys().any(|k| k.starts_with(&prefix)) {
                let err = io::Error::new(
                    io::ErrorKind::DirectoryNotEmpty,
                    format!("directory not empty: {vpath}"),
                );
                state.last_error = err.to_string();
                return Err(err);
            }
        }
        if store.entries.remove(&path).is_none() {
            let err = io::Error::new(io::ErrorKind::NotFound, format!("not found: {vpath}"));
            state.last_error = err.to_string();
            return Err(err);
        }
        Ok(())
    }

    fn permit_symlinks(&self, _allow: bool) {}

    fn last_error(&self) -> String {
        self.state
            .read()
            .map(|state| state.last_error.clone())
            .unwrap_or_default()
    }
}
