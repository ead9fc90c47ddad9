//! The public filesystem facade.
//!
//! Presents one forward-slash namespace over the backend's mounted sources,
//! gates every mutating and metadata operation through the access
//! whitelist, and brokers external execution, with async completions
//! drained on the host's frame-begin tick.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use bitflags::bitflags;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::access::AccessGate;
use crate::backend::{FileType, StorageBackend};
use crate::error::{FsError, FsResult};
use crate::exec::{AsyncExecFinished, ExecKind, ExecQueue, INVALID_EXEC_ID};
use crate::paths;

bitflags! {
    /// Entry selection for [`FileSystem::scan_dir`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScanFlags: u32 {
        /// Include regular files.
        const FILES = 0x1;
        /// Include directories.
        const DIRS = 0x2;
        /// Include entries whose names start with `.`.
        const HIDDEN = 0x4;
    }
}

/// Identifier the console bridge matches against incoming command events.
pub const TYPE_NAME: &str = "FileSystem";

/// Filesystem facade over a [`StorageBackend`].
///
/// Reads resolve across the backend's priority-ordered search path; all
/// writes land in the single write directory designated by
/// [`load_identity`](Self::load_identity). Mutators return `bool` and log
/// one error line on failure; existence and metadata queries collapse
/// failures to benign defaults.
pub struct FileSystem {
    backend: Arc<dyn StorageBackend>,
    gate: RwLock<AccessGate>,
    exec: ExecQueue,
    exec_events: Mutex<Option<mpsc::UnboundedSender<AsyncExecFinished>>>,
    execute_console_commands: AtomicBool,
}

impl FileSystem {
    /// Create a facade over the given backend.
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            gate: RwLock::new(AccessGate::new()),
            exec: ExecQueue::new(),
            exec_events: Mutex::new(None),
            execute_console_commands: AtomicBool::new(true),
        }
    }

    /// The backend this facade routes through.
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Resolve the per-user preference directory for `org`/`app`, mount it
    /// at highest priority, and make it the write directory.
    ///
    /// Must succeed before any write operation. Returns false (and logs)
    /// when resolution, mounting, or designation fails.
    pub async fn load_identity(&self, org: &str, app: &str) -> bool {
        let Some(pref) = self.backend.pref_dir(org, app) else {
            error!("Failed to find preference directory for '{org}', '{app}'");
            return false;
        };

        if let Err(err) = self.backend.mount(&pref, "", false).await {
            error!(
                "Failed to mount preference directory: '{}' reason: {err}",
                pref.display()
            );
            return false;
        }
        if let Err(err) = self.backend.set_write_dir(&pref).await {
            error!(
                "Failed to set write directory to preference directory: '{}' reason: {err}",
                pref.display()
            );
            return false;
        }

        info!("Set preference directory: {}", pref.display());
        true
    }

    /// Enable symlink traversal on the backend.
    pub fn permit_symlinks(&self) {
        self.backend.permit_symlinks(true);
    }

    // ── Access whitelist ───────────────────────────────────────────────

    /// Register an allowed directory prefix. Once any prefix is
    /// registered, operations outside the whitelist are refused.
    pub fn register_path(&self, path: &str) {
        if let Ok(mut gate) = self.gate.write() {
            gate.register(path);
        }
    }

    /// Check a path against the whitelist.
    pub fn check_access(&self, path: &str) -> bool {
        self.gate.read().map(|gate| gate.check(path)).unwrap_or(false)
    }

    fn gate_unrestricted(&self) -> bool {
        self.gate
            .read()
            .map(|gate| gate.is_unrestricted())
            .unwrap_or(false)
    }

    // ── Mounts ─────────────────────────────────────────────────────────

    /// Mount an archive or directory into the search path.
    ///
    /// Relative paths are prefixed with the real directory the backend
    /// reports for them. `priority=false` prepends (the mount shadows
    /// earlier ones); `priority=true` appends at lowest priority.
    pub async fn mount_archive(&self, file: &str, mount_point: &str, priority: bool) -> bool {
        let path_name = self.resolve_archive_path(file).await;
        info!("Mounting archive: '{path_name}' at '{mount_point}'");

        match self
            .backend
            .mount(Path::new(&path_name), mount_point, priority)
            .await
        {
            Ok(()) => true,
            Err(_) => {
                error!(
                    "Failed to mount archive: '{path_name}' reason: {}",
                    self.backend.last_error()
                );
                false
            }
        }
    }

    /// Remove a previously mounted archive from the search path.
    pub async fn unmount_archive(&self, file: &str) -> bool {
        let path_name = self.resolve_archive_path(file).await;
        info!("Unmounting archive: '{path_name}'");

        match self.backend.unmount(Path::new(&path_name)).await {
            Ok(()) => true,
            Err(_) => {
                error!(
                    "Failed to unmount archive: '{path_name}' reason: {}",
                    self.backend.last_error()
                );
                false
            }
        }
    }

    async fn resolve_archive_path(&self, file: &str) -> String {
        let mut path_name = file.to_string();
        if !paths::is_absolute(&path_name) {
            if let Some(real) = self.backend.real_dir(&path_name).await {
                path_name = format!("{}/{}", real.display(), path_name);
            }
        }
        paths::native(&paths::remove_trailing_slash(&path_name))
    }

    /// Newline-joined listing of the current search order, for diagnostics.
    pub fn search_paths(&self) -> String {
        let mut out = String::new();
        for real in self.backend.search_path() {
            out.push_str(&real.display().to_string());
            out.push('\n');
        }
        out
    }

    /// Virtual mount point of a mounted real path; empty string if unknown.
    pub fn mount_point(&self, dir: &str) -> String {
        match self.backend.mount_point(Path::new(dir)) {
            Some(point) => point,
            None => {
                error!(
                    "Failed to get mount point: '{dir}' reason: {}",
                    self.backend.last_error()
                );
                String::new()
            }
        }
    }

    /// Current write directory; empty string if identity is not loaded.
    pub fn write_directory(&self) -> String {
        self.backend
            .write_dir()
            .map(|dir| dir.display().to_string())
            .unwrap_or_default()
    }

    // ── Directory operations ───────────────────────────────────────────

    /// Create a directory under the write directory, creating parents
    /// first. Idempotent when the directory already exists.
    pub async fn create_dir(&self, path_name: &str) -> bool {
        self.create_dir_inner(path_name.to_string()).await
    }

    fn create_dir_inner(&self, path_name: String) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            if !self.check_access(&path_name) {
                error!("Access denied to {path_name}");
                return false;
            }

            // Guard against recursing forever at the root.
            let parent = paths::parent(&path_name);
            if parent.len() > 1 && !self.dir_exists(&parent).await {
                if !self.create_dir_inner(parent).await {
                    return false;
                }
            }

            let path = paths::remove_trailing_slash(&path_name);
            match self.backend.mkdir(&path).await {
                Ok(()) => {
                    debug!("Created directory {path}");
                    true
                }
                Err(_) => {
                    error!(
                        "Failed to create directory: '{path}' reason: {}",
                        self.backend.last_error()
                    );
                    false
                }
            }
        })
    }

    /// True iff the path resolves to a directory (or symlink).
    pub async fn dir_exists(&self, path_name: &str) -> bool {
        if !self.check_access(path_name) {
            return false;
        }
        let fixed = paths::remove_trailing_slash(path_name);
        match self.backend.stat(&fixed).await {
            Ok(stat) => stat.is_dir_like(),
            Err(_) => false,
        }
    }

    /// Recursively scan a virtual directory.
    ///
    /// Results are paths relative to `path_name`. Hidden entries need
    /// [`ScanFlags::HIDDEN`]; directories are emitted with
    /// [`ScanFlags::DIRS`] and descended when `recursive`. The filter is an
    /// extension pattern: the substring from its last `.` must match the
    /// end of the file name, and any `*` in that substring (or no dot at
    /// all) matches everything.
    pub async fn scan_dir(
        &self,
        path_name: &str,
        filter: &str,
        flags: ScanFlags,
        recursive: bool,
    ) -> Vec<String> {
        let mut result = Vec::new();
        if !self.check_access(path_name) {
            return result;
        }

        let filter_extension = match filter.rfind('.') {
            Some(pos) if !filter[pos..].contains('*') => filter[pos..].to_string(),
            _ => String::new(),
        };

        let initial = paths::add_trailing_slash(path_name);
        self.scan_dir_internal(
            &mut result,
            initial.clone(),
            &initial,
            &filter_extension,
            flags,
            recursive,
        )
        .await;
        result
    }

    fn scan_dir_internal<'a>(
        &'a self,
        result: &'a mut Vec<String>,
        path: String,
        start_path: &'a str,
        filter_extension: &'a str,
        flags: ScanFlags,
        recursive: bool,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let path = paths::add_trailing_slash(&path);
            let delta_path = if path.len() > start_path.len() {
                path[start_path.len()..].to_string()
            } else {
                String::new()
            };

            let Ok(names) = self.backend.enumerate(&path).await else {
                return;
            };

            for name in names {
                if name.starts_with('.') && !flags.contains(ScanFlags::HIDDEN) {
                    continue;
                }

                let path_and_name = format!("{path}{name}");
                let Ok(stat) = self.backend.stat(&path_and_name).await else {
                    continue;
                };

                match stat.file_type {
                    FileType::Directory => {
                        if flags.contains(ScanFlags::DIRS) {
                            result.push(format!("{delta_path}{name}"));
                        }
                        if recursive {
                            self.scan_dir_internal(
                                result,
                                path_and_name,
                                start_path,
                                filter_extension,
                                flags,
                                recursive,
                            )
                            .await;
                        }
                    }
                    _ => {
                        if flags.contains(ScanFlags::FILES)
                            && (filter_extension.is_empty() || name.ends_with(filter_extension))
                        {
                            result.push(format!("{delta_path}{name}"));
                        }
                    }
                }
            }
        })
    }

    // ── File operations ────────────────────────────────────────────────

    /// True iff the path resolves to a regular file (or symlink).
    pub async fn file_exists(&self, file_name: &str) -> bool {
        if !self.check_access(&paths::dir_name(file_name)) {
            return false;
        }
        match self.backend.stat(file_name).await {
            Ok(stat) => stat.is_file_like(),
            Err(_) => false,
        }
    }

    /// Read a whole file from the first mount that has it.
    pub async fn read_file(&self, file_name: &str) -> FsResult<Vec<u8>> {
        if !self.check_access(&paths::dir_name(file_name)) {
            return Err(FsError::AccessDenied(file_name.to_string()));
        }
        self.backend
            .read(file_name)
            .await
            .map_err(|err| FsError::backend("Failed to read file", file_name, &err))
    }

    /// Write a whole file under the write directory.
    pub async fn write_file(&self, file_name: &str, data: &[u8]) -> bool {
        if !self.check_access(&paths::dir_name(file_name)) {
            error!("Access denied to {file_name}");
            return false;
        }
        match self.backend.write(file_name, data).await {
            Ok(()) => true,
            Err(_) => {
                error!(
                    "Failed to write file: '{file_name}' reason: {}",
                    self.backend.last_error()
                );
                false
            }
        }
    }

    /// Copy a file. Succeeds only when the byte count read matches the
    /// source's stat size and everything was written.
    pub async fn copy(&self, src_file_name: &str, dest_file_name: &str) -> bool {
        if !self.check_access(&paths::dir_name(src_file_name)) {
            error!("Access denied to {src_file_name}");
            return false;
        }
        if !self.check_access(&paths::dir_name(dest_file_name)) {
            error!("Access denied to {dest_file_name}");
            return false;
        }

        let Ok(stat) = self.backend.stat(src_file_name).await else {
            return false;
        };
        let Ok(data) = self.backend.read(src_file_name).await else {
            return false;
        };
        if data.len() as u64 != stat.size {
            return false;
        }

        self.backend.write(dest_file_name, &data).await.is_ok()
    }

    /// Rename by copy-then-delete. Not atomic: a crash in between can
    /// leave both names present.
    pub async fn rename(&self, src_file_name: &str, dest_file_name: &str) -> bool {
        if !self.check_access(&paths::dir_name(src_file_name)) {
            error!("Access denied to {src_file_name}");
            return false;
        }
        if !self.check_access(&paths::dir_name(dest_file_name)) {
            error!("Access denied to {dest_file_name}");
            return false;
        }

        self.copy(src_file_name, dest_file_name).await && self.delete(src_file_name).await
    }

    /// Delete a file or empty directory under the write directory.
    pub async fn delete(&self, file_name: &str) -> bool {
        if !self.check_access(&paths::dir_name(file_name)) {
            error!("Access denied to {file_name}");
            return false;
        }
        match self.backend.remove(file_name).await {
            Ok(()) => true,
            Err(_) => {
                error!(
                    "Failed to delete file: '{file_name}' reason: {}",
                    self.backend.last_error()
                );
                false
            }
        }
    }

    /// Last modification time in seconds since the epoch; 0 on an empty
    /// path, access denial, or any failure.
    pub async fn last_modified(&self, file_name: &str) -> u64 {
        if file_name.is_empty() || !self.check_access(file_name) {
            return 0;
        }
        match self.backend.stat(file_name).await {
            Ok(stat) => stat.mod_time,
            Err(_) => 0,
        }
    }

    // ── Discovery ──────────────────────────────────────────────────────

    /// Directory of the running program's executable,
    /// trailing-slash-terminated.
    pub fn program_dir(&self) -> String {
        paths::add_trailing_slash(&self.backend.base_dir().display().to_string())
    }

    /// Alias of [`program_dir`](Self::program_dir): the backend exposes
    /// only the base directory, so both entry points report it.
    pub fn current_dir(&self) -> String {
        self.program_dir()
    }

    /// Per-user preference directory for `org`/`app`; empty (with a
    /// warning logged) when it cannot be resolved.
    pub fn app_preferences_dir(&self, org: &str, app: &str) -> String {
        match self.backend.pref_dir(org, app) {
            Some(dir) => paths::add_trailing_slash(&dir.display().to_string()),
            None => {
                warn!("Could not get application preferences directory");
                String::new()
            }
        }
    }

    /// Host-conventional temporary directory, trailing-slash-terminated.
    ///
    /// On Unix-family hosts `TMPDIR` wins, falling back to `/tmp/`;
    /// Windows asks the OS.
    pub fn temporary_dir(&self) -> String {
        if cfg!(windows) {
            return paths::add_trailing_slash(&std::env::temp_dir().display().to_string());
        }
        match std::env::var("TMPDIR") {
            Ok(dir) if !dir.is_empty() => paths::add_trailing_slash(&dir),
            _ => "/tmp/".to_string(),
        }
    }

    // ── External execution ─────────────────────────────────────────────

    /// Run a command line through the host shell and wait for it.
    ///
    /// Refused with -1 while the access whitelist is non-empty. With
    /// `redirect_to_log`, output is forwarded line by line into the log.
    pub async fn system_command(&self, command_line: &str, redirect_to_log: bool) -> i32 {
        if !self.gate_unrestricted() {
            error!("Executing an external command is not allowed");
            return crate::exec::SPAWN_FAILURE_EXIT;
        }
        crate::exec::system_command(command_line, redirect_to_log).await
    }

    /// Spawn a program with an argv vector and wait for it. Refused with
    /// -1 while the access whitelist is non-empty.
    pub async fn system_run(&self, file_name: &str, arguments: &[String]) -> i32 {
        if !self.gate_unrestricted() {
            error!("Executing an external command is not allowed");
            return crate::exec::SPAWN_FAILURE_EXIT;
        }
        crate::exec::system_run(file_name, arguments).await
    }

    /// Queue a shell command for asynchronous execution. Returns the
    /// request id, or [`INVALID_EXEC_ID`] when refused.
    pub fn system_command_async(&self, command_line: &str) -> u32 {
        if !self.gate_unrestricted() {
            error!("Executing an external command is not allowed");
            return INVALID_EXEC_ID;
        }
        self.exec
            .submit(ExecKind::Command(command_line.to_string()))
    }

    /// Queue a process spawn for asynchronous execution. Returns the
    /// request id, or [`INVALID_EXEC_ID`] when refused.
    pub fn system_run_async(&self, file_name: &str, arguments: &[String]) -> u32 {
        if !self.gate_unrestricted() {
            error!("Executing an external command is not allowed");
            return INVALID_EXEC_ID;
        }
        self.exec
            .submit(ExecKind::Run(file_name.to_string(), arguments.to_vec()))
    }

    /// Drain pass for the host's frame-begin tick.
    ///
    /// Emits a completion event for every finished async request, removes
    /// it from the queue, and returns the batch. Events also go to the
    /// sink from [`subscribe_exec_events`](Self::subscribe_exec_events)
    /// when one is attached.
    pub fn begin_frame(&self) -> Vec<AsyncExecFinished> {
        let finished = self.exec.drain_completed();
        if !finished.is_empty() {
            if let Ok(mut sink) = self.exec_events.lock() {
                let delivered = match sink.as_ref() {
                    Some(sender) => finished.iter().all(|event| sender.send(*event).is_ok()),
                    None => true,
                };
                if !delivered {
                    // Receiver dropped; stop emitting.
                    *sink = None;
                }
            }
        }
        finished
    }

    /// Attach a channel that receives async completion events from the
    /// drain pass. Replaces any previous subscription.
    pub fn subscribe_exec_events(&self) -> mpsc::UnboundedReceiver<AsyncExecFinished> {
        let (sender, receiver) = mpsc::unbounded_channel();
        if let Ok(mut sink) = self.exec_events.lock() {
            *sink = Some(sender);
        }
        receiver
    }

    // ── Console bridge ─────────────────────────────────────────────────

    /// Toggle execution of console commands addressed to this facade.
    pub fn set_execute_console_commands(&self, enable: bool) {
        self.execute_console_commands.store(enable, Ordering::Relaxed);
    }

    /// Whether console commands are currently executed.
    pub fn execute_console_commands(&self) -> bool {
        self.execute_console_commands.load(Ordering::Relaxed)
    }

    /// Handle a console-command event. Runs the command (output redirected
    /// to the log) when enabled and `id` matches [`TYPE_NAME`]; otherwise
    /// returns `None`.
    pub async fn handle_console_command(&self, id: &str, command: &str) -> Option<i32> {
        if !self.execute_console_commands() || id != TYPE_NAME {
            return None;
        }
        Some(self.system_command(command, true).await)
    }
}
