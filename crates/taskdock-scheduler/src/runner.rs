//! Shell process runner.
//!
//! Spawns `sh -c <command>` with piped output, waits on a detached task, and
//! reports the exit through a completion callback. The returned
//! [`ProcessHandle`] is the signal-delivery surface for the terminator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::process::Command;
use tracing::warn;

/// Graceful termination signal.
#[cfg(unix)]
pub const SIGTERM: i32 = libc::SIGTERM;
#[cfg(not(unix))]
pub const SIGTERM: i32 = 15;

/// Forceful kill signal.
#[cfg(unix)]
pub const SIGKILL: i32 = libc::SIGKILL;
#[cfg(not(unix))]
pub const SIGKILL: i32 = 9;

/// Cap on captured output included in failure logs.
const OUTPUT_LOG_MAX: usize = 1000;

/// Outcome of one shell invocation.
#[derive(Debug, Clone)]
pub struct ExitReport {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal, if it was killed (Unix).
    pub signal: Option<i32>,
    /// Captured stdout followed by stderr.
    pub output: String,
}

/// Cloneable view of a spawned process: PID plus shared exit state.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pid: Option<u32>,
    finished: Arc<AtomicBool>,
    exit_signal: Arc<Mutex<Option<i32>>>,
}

impl ProcessHandle {
    fn new(pid: Option<u32>) -> Self {
        Self {
            pid,
            finished: Arc::new(AtomicBool::new(false)),
            exit_signal: Arc::new(Mutex::new(None)),
        }
    }

    /// Handle for a process that never started (spawn failure) or for tests.
    pub fn already_finished() -> Self {
        let handle = Self::new(None);
        handle.finished.store(true, Ordering::SeqCst);
        handle
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Signal that ended the process, when it was killed.
    pub fn exit_signal(&self) -> Option<i32> {
        *self.exit_signal.lock().unwrap()
    }

    fn mark_finished(&self, signal: Option<i32>) {
        *self.exit_signal.lock().unwrap() = signal;
        self.finished.store(true, Ordering::SeqCst);
    }

    /// Deliver `sig` to the process. No-op once it has exited or when it
    /// never spawned.
    pub fn signal(&self, sig: i32) {
        if self.is_finished() {
            return;
        }
        let Some(pid) = self.pid else {
            return;
        };
        #[cfg(unix)]
        // Safety: pid is our direct child; a stale pid after exit is caught
        // by the finished flag above in all but a narrow race.
        unsafe {
            libc::kill(pid as libc::pid_t, sig);
        }
        #[cfg(not(unix))]
        {
            // Best effort on non-Unix platforms: only forceful kill exists.
            if sig == SIGKILL {
                let _ = std::process::Command::new("taskkill")
                    .args(["/F", "/PID", &pid.to_string()])
                    .output();
            }
        }
    }
}

/// Spawn `command` under `sh -c` and invoke `on_exit` exactly once when the
/// process ends. A spawn failure is logged and reported through `on_exit`
/// immediately — completion bookkeeping always runs.
pub fn spawn_shell<F>(command: &str, on_exit: F) -> ProcessHandle
where
    F: FnOnce(&ExitReport) + Send + 'static,
{
    let spawned = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn();

    let child = match spawned {
        Ok(child) => child,
        Err(e) => {
            warn!(error = %e, "failed to spawn job command");
            let handle = ProcessHandle::already_finished();
            on_exit(&ExitReport {
                code: None,
                signal: None,
                output: format!("spawn failed: {e}"),
            });
            return handle;
        }
    };

    let handle = ProcessHandle::new(child.id());
    let exit_view = handle.clone();
    let command = command.to_string();

    tokio::spawn(async move {
        let report = match child.wait_with_output().await {
            Ok(output) => {
                let code = output.status.code();
                #[cfg(unix)]
                let signal = {
                    use std::os::unix::process::ExitStatusExt;
                    output.status.signal()
                };
                #[cfg(not(unix))]
                let signal = None;

                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                if !output.status.success() {
                    warn!(
                        %command,
                        code = ?code,
                        output = %tail(&text, OUTPUT_LOG_MAX),
                        "job command failed"
                    );
                }
                ExitReport {
                    code,
                    signal,
                    output: text,
                }
            }
            Err(e) => {
                warn!(%command, error = %e, "waiting for job command failed");
                ExitReport {
                    code: None,
                    signal: None,
                    output: format!("wait failed: {e}"),
                }
            }
        };
        // Order matters: the terminator polls the finished flag and then
        // reads the exit signal.
        exit_view.mark_finished(report.signal);
        on_exit(&report);
    });

    handle
}

/// Last `max` characters of `text`, respecting char boundaries.
fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn tail_respects_char_boundaries() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 10), "ab");
        // multi-byte char straddling the cut point gets dropped whole
        assert_eq!(tail("xé", 1), "");
        assert_eq!(tail("xé", 2), "é");
    }

    async fn wait_finished(handle: &ProcessHandle) {
        for _ in 0..50 {
            if handle.is_finished() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("process did not finish in time");
    }

    #[tokio::test]
    async fn successful_command_reports_zero_exit() {
        let (tx, rx) = std::sync::mpsc::channel();
        let handle = spawn_shell("true", move |report| {
            tx.send(report.clone()).unwrap();
        });
        wait_finished(&handle).await;
        let report = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(report.code, Some(0));
        assert_eq!(report.signal, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn output_is_captured() {
        let (tx, rx) = std::sync::mpsc::channel();
        spawn_shell("echo hello", move |report| {
            tx.send(report.output.clone()).unwrap();
        });
        let output = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(output.contains("hello"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn nonzero_exit_still_reports() {
        let (tx, rx) = std::sync::mpsc::channel();
        spawn_shell("exit 3", move |report| {
            tx.send(report.code).unwrap();
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), Some(3));
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn sigterm_shows_up_as_exit_signal() {
        let (tx, rx) = std::sync::mpsc::channel();
        let handle = spawn_shell("sleep 30", move |report| {
            tx.send(report.signal).unwrap();
        });
        // give the shell a moment to exec
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.signal(SIGTERM);
        let signal = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(signal, Some(SIGTERM));
        assert!(handle.is_finished());
    }
}
