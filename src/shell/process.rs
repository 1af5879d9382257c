//! One-shot command execution with bounded time and output.
//!
//! Every command goes through [`Executor::run`]: `<shell> -c <command>` in its
//! own process group, `PATH` augmented with the configured directories, stdout
//! and stderr captured concurrently and each capped. On timeout the whole
//! process group is killed and the child is reaped before returning.

use std::ffi::OsString;
use std::fmt::{self, Write};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::ExecConfig;

/// Runs allow-listed command strings according to [`ExecConfig`].
#[derive(Debug, Clone)]
pub struct Executor {
    shell: String,
    timeout: Duration,
    max_output: usize,
    path: OsString,
    working_dir: Option<PathBuf>,
}

impl Executor {
    /// Build an executor, resolving the augmented `PATH` once from the
    /// current process environment.
    pub fn new(config: &ExecConfig) -> Self {
        Self {
            shell: config.shell.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            max_output: config.max_output_bytes,
            path: augmented_path(&config.extra_path, std::env::var_os("PATH")),
            working_dir: config.working_dir.as_deref().map(PathBuf::from),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute `command` and capture its output.
    ///
    /// A non-zero exit is an `Ok` result; only spawn/wait failures and
    /// timeouts are errors.
    pub async fn run(&self, command: &str) -> Result<ExecResult, ExecError> {
        let start = Instant::now();

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .env("PATH", &self.path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        // SAFETY: setpgid is async-signal-safe per POSIX.
        unsafe {
            cmd.pre_exec(|| {
                libc::setpgid(0, 0);
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(ExecError::SpawnFailed)?;
        let pid = child.id();

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecError::ProcessFailed("Failed to take stdout pipe".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExecError::ProcessFailed("Failed to take stderr pipe".to_string()))?;

        let max = self.max_output;
        let outcome = Box::pin(tokio::time::timeout(self.timeout, async {
            // Read both streams concurrently to avoid pipe deadlock
            let (stdout_data, stderr_data) = tokio::join!(
                read_capped(&mut stdout, max),
                read_capped(&mut stderr, max),
            );
            let status = child
                .wait()
                .await
                .map_err(|e| ExecError::ProcessFailed(e.to_string()))?;
            Ok::<_, ExecError>((status, stdout_data, stderr_data))
        }))
        .await;

        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok((status, stdout, stderr))) => {
                debug!(?pid, code = ?status.code(), duration_ms, "command finished");
                Ok(ExecResult {
                    exit_code: status.code(),
                    stdout,
                    stderr,
                    duration_ms,
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(?pid, duration_ms, "command timed out, killing process group");
                if let Some(pid) = pid {
                    kill_group(pid);
                }
                // Reap the shell so it does not linger as a zombie.
                let _ = child.kill().await;
                Err(ExecError::Timeout(self.timeout))
            }
        }
    }
}

fn kill_group(pid: u32) {
    #[allow(clippy::cast_possible_wrap)]
    let pgid = Pid::from_raw(pid as i32);
    if let Err(e) = killpg(pgid, Signal::SIGKILL) {
        debug!("killpg({pgid}) failed: {e}");
    }
}

/// Prepend `extra` directories to an inherited `PATH` value.
pub fn augmented_path(extra: &[String], inherited: Option<OsString>) -> OsString {
    let mut dirs: Vec<PathBuf> = extra.iter().map(PathBuf::from).collect();
    if let Some(existing) = inherited {
        dirs.extend(std::env::split_paths(&existing));
    }
    std::env::join_paths(dirs).unwrap_or_else(|_| OsString::from("/usr/bin:/bin"))
}

/// Read from an async reader, keeping the first `max_bytes` and discarding the
/// rest.
///
/// Keeps draining past the cap instead of closing the pipe early, so a chatty
/// child never blocks on a full pipe or dies of SIGPIPE.
async fn read_capped(reader: &mut (impl tokio::io::AsyncRead + Unpin), max_bytes: usize) -> String {
    let mut buf = Vec::with_capacity(max_bytes.min(65536));
    let mut tmp = [0u8; 8192];
    let mut total_read = 0usize;
    loop {
        match reader.read(&mut tmp).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                total_read += n;
                if buf.len() < max_bytes {
                    let take = n.min(max_bytes - buf.len());
                    buf.extend_from_slice(&tmp[..take]);
                }
            }
        }
    }
    let mut s = String::from_utf8_lossy(&buf).into_owned();
    if total_read > max_bytes {
        let _ = write!(
            s,
            "\n[truncated: {total_read} bytes total, showing first {max_bytes}]"
        );
    }
    s
}

/// Output of a command that ran to completion.
#[derive(Debug)]
pub struct ExecResult {
    /// Exit code, `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Errors that can occur during [`Executor::run`].
#[derive(Debug)]
pub enum ExecError {
    /// The shell binary could not be started (e.g. not found, permission denied).
    SpawnFailed(std::io::Error),
    /// The child process started but waiting on it failed.
    ProcessFailed(String),
    /// The command exceeded its wall-clock limit and was killed.
    Timeout(Duration),
}

impl ExecError {
    /// Numeric code reported to the client alongside the failure.
    pub fn code(&self) -> Option<i32> {
        match self {
            ExecError::SpawnFailed(e) => e.raw_os_error(),
            ExecError::ProcessFailed(_) | ExecError::Timeout(_) => None,
        }
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::SpawnFailed(e) => write!(f, "Failed to spawn process: {e}"),
            ExecError::ProcessFailed(e) => write!(f, "Process error: {e}"),
            ExecError::Timeout(d) => write!(f, "Command timed out after {}ms", d.as_millis()),
        }
    }
}

impl std::error::Error for ExecError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor(timeout_ms: u64, max_output_bytes: usize) -> Executor {
        Executor::new(&ExecConfig {
            shell: "/bin/sh".to_string(),
            timeout_ms,
            max_output_bytes,
            extra_path: vec!["/opt/kai-test/bin".to_string()],
            working_dir: None,
        })
    }

    /// Live, non-zombie process check via procfs.
    #[cfg(target_os = "linux")]
    fn is_running(pid: i32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => {
                // State is the first field after the parenthesised comm.
                let state = stat.rsplit(')').next().and_then(|r| r.trim().chars().next());
                !matches!(state, Some('Z' | 'X'))
            }
            Err(_) => false,
        }
    }

    #[test]
    fn path_prepends_extra_dirs() {
        let path = augmented_path(
            &["/a".to_string(), "/b".to_string()],
            Some(OsString::from("/usr/bin:/bin")),
        );
        assert_eq!(path, OsString::from("/a:/b:/usr/bin:/bin"));
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let result = executor(5_000, 1024).run("echo hello").await.unwrap();
        assert_eq!(result.exit_code, Some(0));
        assert!(result.success());
        assert_eq!(result.stdout, "hello\n");
        assert!(result.stderr.is_empty());
    }

    #[tokio::test]
    async fn nonzero_exit_is_not_an_error() {
        let result = executor(5_000, 1024)
            .run("echo oops >&2; exit 3")
            .await
            .unwrap();
        assert_eq!(result.exit_code, Some(3));
        assert!(!result.success());
        assert_eq!(result.stderr, "oops\n");
    }

    #[tokio::test]
    async fn child_sees_augmented_path() {
        let result = executor(5_000, 4096).run("echo \"$PATH\"").await.unwrap();
        assert!(result.stdout.starts_with("/opt/kai-test/bin:"));
    }

    #[tokio::test]
    async fn output_is_truncated_at_cap() {
        let result = executor(5_000, 16)
            .run("printf '%0100d' 0")
            .await
            .unwrap();
        assert!(result.stdout.starts_with("0000000000000000\n[truncated: 100 bytes total"));
    }

    #[tokio::test]
    async fn missing_shell_is_spawn_failure() {
        let mut exec = executor(1_000, 1024);
        exec.shell = "/nonexistent/shell".to_string();
        let err = exec.run("true").await.unwrap_err();
        assert!(matches!(err, ExecError::SpawnFailed(_)));
        assert!(err.code().is_some());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn timeout_kills_shell_and_descendants() {
        let dir = tempfile::tempdir().unwrap();
        let pids = dir.path().join("pids");
        let command = format!(
            "sleep 60 & echo $$ $! > {}; wait",
            pids.display()
        );

        let err = executor(500, 1024).run(&command).await.unwrap_err();
        assert!(matches!(err, ExecError::Timeout(_)));

        let recorded = std::fs::read_to_string(&pids).unwrap();
        let mut ids = recorded.split_whitespace().map(|p| p.parse::<i32>().unwrap());
        let shell_pid = ids.next().unwrap();
        let sleep_pid = ids.next().unwrap();

        assert!(!is_running(shell_pid));
        // The orphaned sleep is reparented; allow the reaper a moment.
        for _ in 0..20 {
            if !is_running(sleep_pid) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!is_running(sleep_pid));
    }
}
