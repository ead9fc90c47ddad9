//! Blocking external execution: shell commands and argv process spawns.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::paths;

/// Exit code reported when process creation itself fails.
pub const SPAWN_FAILURE_EXIT: i32 = -1;

fn shell_command(command_line: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command_line);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command_line);
        cmd
    }
}

#[cfg(windows)]
fn suppress_window(cmd: &mut Command) {
    // CREATE_NO_WINDOW
    cmd.creation_flags(0x0800_0000);
}

#[cfg(not(windows))]
fn suppress_window(_cmd: &mut Command) {}

fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(SPAWN_FAILURE_EXIT)
}

/// Run a command line through the host shell and wait for it.
///
/// With `redirect_to_log`, stdout and stderr are captured and forwarded
/// line by line into the log. Returns the child's exit code, or
/// [`SPAWN_FAILURE_EXIT`] if it could not be started.
pub async fn system_command(command_line: &str, redirect_to_log: bool) -> i32 {
    let mut cmd = shell_command(command_line);

    if !redirect_to_log {
        return match cmd.status().await {
            Ok(status) => exit_code(status),
            Err(err) => {
                error!("failed to run command '{command_line}': {err}");
                SPAWN_FAILURE_EXIT
            }
        };
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            error!("failed to run command '{command_line}': {err}");
            return SPAWN_FAILURE_EXIT;
        }
    };

    // stderr drains concurrently so a chatty child cannot deadlock on a
    // full pipe while we read stdout.
    let stderr_task = child.stderr.take().map(|stderr| {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(target: "strata_vfs::exec", "{line}");
            }
        })
    });

    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            info!(target: "strata_vfs::exec", "{line}");
        }
    }

    if let Some(task) = stderr_task {
        let _ = task.await;
    }

    match child.wait().await {
        Ok(status) => exit_code(status),
        Err(err) => {
            error!("failed to wait for command '{command_line}': {err}");
            SPAWN_FAILURE_EXIT
        }
    }
}

/// Spawn a program with an argv vector (no shell interpolation) and wait.
///
/// On Windows, `.exe` is appended when the file has no extension and the
/// child gets no console window. Returns the exit code, or
/// [`SPAWN_FAILURE_EXIT`] on spawn failure.
pub async fn system_run(file: &str, args: &[String]) -> i32 {
    let mut fixed = paths::native(file);
    if cfg!(windows) && paths::extension(&fixed, false).is_empty() {
        fixed.push_str(".exe");
    }

    let mut cmd = Command::new(&fixed);
    cmd.args(args);
    suppress_window(&mut cmd);

    match cmd.status().await {
        Ok(status) => exit_code(status),
        Err(err) => {
            error!("failed to run '{fixed}': {err}");
            SPAWN_FAILURE_EXIT
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_system_command_exit_codes() {
        assert_eq!(system_command("true", false).await, 0);
        assert_eq!(system_command("exit 3", false).await, 3);
    }

    #[tokio::test]
    async fn test_system_command_redirected() {
        // Output goes to the log; only the exit code is observable here.
        assert_eq!(system_command("echo hello && echo oops >&2", true).await, 0);
    }

    #[tokio::test]
    async fn test_system_run_argv() {
        let args = vec!["0.01".to_string()];
        assert_eq!(system_run("sleep", &args).await, 0);
    }

    #[tokio::test]
    async fn test_system_run_missing_program() {
        assert_eq!(
            system_run("definitely_not_a_real_program_12345", &[]).await,
            SPAWN_FAILURE_EXIT
        );
    }
}
