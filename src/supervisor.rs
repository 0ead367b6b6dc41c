//! Supervision of the external trading-engine process.
//!
//! The dashboard launches the engine executable on behalf of a user action
//! and tracks at most one run at a time. The supervisor owns the child
//! handle exclusively: starting, status polling, and the two-phase stop
//! (graceful signal, then unconditional kill after a fixed grace period)
//! all go through it.
//!
//! Child exit is detected lazily: a crash is only observed on the next
//! `status()` or `stop()` call, never pushed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Window after spawn in which an immediate exit is reported as a failed
/// startup rather than a completed run.
pub const STARTUP_GRACE: Duration = Duration::from_millis(500);

/// How long a stopped engine gets to honor the graceful signal before the
/// supervisor escalates to an unconditional kill.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Per-stream cap on captured startup diagnostics, in characters.
const CAPTURE_LIMIT: usize = 500;

/// Errors returned by [`EngineSupervisor`] operations.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("engine is already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("engine is not running")]
    NotRunning,

    #[error("engine executable not found at {}", path.display())]
    ExecutableNotFound { path: PathBuf },

    #[error("engine exited during startup")]
    StartupFailed { stdout: String, stderr: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Derived snapshot of the current engine run, recomputed on every call.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub pid: Option<u32>,
    /// Requested run duration in seconds; zero when idle.
    pub duration: u64,
    pub elapsed_ms: f64,
    pub time_remaining: f64,
    pub progress_percent: f64,
    pub started_at: Option<DateTime<Utc>>,
}

impl EngineStatus {
    fn idle() -> Self {
        Self {
            running: false,
            pid: None,
            duration: 0,
            elapsed_ms: 0.0,
            time_remaining: 0.0,
            progress_percent: 0.0,
            started_at: None,
        }
    }
}

/// One tracked run of the engine executable.
struct EngineSession {
    child: Child,
    pid: u32,
    started_at: Instant,
    started_wall: DateTime<Utc>,
    duration_secs: u64,
}

/// Owns the lifecycle of at most one external engine process.
///
/// All operations serialize on the session mutex, so a `start` racing a
/// `stop` (or two concurrent `start`s) cannot corrupt the single-session
/// invariant. The bounded waits inside `start`/`stop` are held under the
/// lock as well; they yield to the runtime rather than spin, so broadcasts
/// and unrelated requests keep flowing.
pub struct EngineSupervisor {
    engine_path: PathBuf,
    session: Mutex<Option<EngineSession>>,
}

impl EngineSupervisor {
    pub fn new(engine_path: impl Into<PathBuf>) -> Self {
        Self {
            engine_path: engine_path.into(),
            session: Mutex::new(None),
        }
    }

    pub fn engine_path(&self) -> &Path {
        &self.engine_path
    }

    /// Spawn the engine with `duration_secs` as its sole argument.
    ///
    /// Returns the child pid on success. A child that exits within
    /// [`STARTUP_GRACE`] is treated as a failed startup and its output
    /// streams (truncated) are returned in the error; the session is left
    /// idle and `start` is safely retryable.
    pub async fn start(&self, duration_secs: u64) -> Result<u32, SupervisorError> {
        let mut session = self.session.lock().await;

        // Reap a child that exited since the last call before deciding
        // whether the slot is taken.
        if let Some(existing) = session.as_mut() {
            if existing.child.try_wait()?.is_none() {
                return Err(SupervisorError::AlreadyRunning { pid: existing.pid });
            }
            *session = None;
        }

        if !self.engine_path.exists() {
            return Err(SupervisorError::ExecutableNotFound {
                path: self.engine_path.clone(),
            });
        }

        let mut child = Command::new(&self.engine_path)
            .arg(duration_secs.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let started_at = Instant::now();
        let started_wall = Utc::now();

        let Some(pid) = child.id() else {
            // Already exited and reaped before we could record the pid.
            return Err(capture_startup_failure(child).await);
        };

        // Give the engine a moment to fall over on bad arguments or
        // missing config before reporting success.
        tokio::time::sleep(STARTUP_GRACE).await;

        if child.try_wait()?.is_some() {
            warn!(pid, "engine exited during startup grace window");
            return Err(capture_startup_failure(child).await);
        }

        info!(pid, duration_secs, "engine started");
        *session = Some(EngineSession {
            child,
            pid,
            started_at,
            started_wall,
            duration_secs,
        });
        Ok(pid)
    }

    /// Report the current run, detecting a crashed or finished child lazily.
    pub async fn status(&self) -> EngineStatus {
        let mut session = self.session.lock().await;

        if let Some(existing) = session.as_mut() {
            match existing.child.try_wait() {
                Ok(None) => {}
                Ok(Some(exit)) => {
                    info!(pid = existing.pid, status = %exit, "engine exited");
                    *session = None;
                }
                Err(e) => {
                    warn!(pid = existing.pid, error = %e, "could not poll engine; dropping session");
                    *session = None;
                }
            }
        }

        match session.as_ref() {
            Some(s) => {
                let (elapsed_ms, time_remaining, progress_percent) =
                    derive_progress(s.started_at.elapsed(), s.duration_secs);
                EngineStatus {
                    running: true,
                    pid: Some(s.pid),
                    duration: s.duration_secs,
                    elapsed_ms,
                    time_remaining,
                    progress_percent,
                    started_at: Some(s.started_wall),
                }
            }
            None => EngineStatus::idle(),
        }
    }

    /// Stop the tracked engine: graceful signal first, unconditional kill
    /// if it has not exited within [`SHUTDOWN_GRACE`].
    ///
    /// The escalation is the expected recovery path, not an error; a caller
    /// cannot tell a forced stop from a graceful one. Returns the pid that
    /// was stopped.
    pub async fn stop(&self) -> Result<u32, SupervisorError> {
        let mut session = self.session.lock().await;

        let Some(mut s) = session.take() else {
            return Err(SupervisorError::NotRunning);
        };

        if s.child.try_wait()?.is_some() {
            // Exited on its own since the last status check.
            info!(pid = s.pid, "engine already exited");
            return Err(SupervisorError::NotRunning);
        }

        send_graceful_signal(&mut s.child, s.pid);

        match tokio::time::timeout(SHUTDOWN_GRACE, s.child.wait()).await {
            Ok(exit) => {
                let exit = exit?;
                info!(pid = s.pid, status = %exit, "engine stopped gracefully");
            }
            Err(_) => {
                warn!(pid = s.pid, "engine ignored graceful stop; killing");
                s.child.start_kill()?;
                s.child.wait().await?;
            }
        }

        Ok(s.pid)
    }
}

/// Cooperative stop request. ESRCH just means the child already exited;
/// the wait that follows observes it either way.
#[cfg(unix)]
fn send_graceful_signal(_child: &mut Child, pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn send_graceful_signal(child: &mut Child, _pid: u32) {
    let _ = child.start_kill();
}

/// Collect the exited child's output streams for the `StartupFailed` error.
async fn capture_startup_failure(child: Child) -> SupervisorError {
    match child.wait_with_output().await {
        Ok(output) => SupervisorError::StartupFailed {
            stdout: truncate_chars(String::from_utf8_lossy(&output.stdout).into_owned()),
            stderr: truncate_chars(String::from_utf8_lossy(&output.stderr).into_owned()),
        },
        Err(e) => SupervisorError::Io(e),
    }
}

fn truncate_chars(mut s: String) -> String {
    if let Some((idx, _)) = s.char_indices().nth(CAPTURE_LIMIT) {
        s.truncate(idx);
    }
    s
}

/// Pure derivation of the status timing fields from elapsed time and the
/// requested duration. Progress is clamped to 100%, remaining to zero.
fn derive_progress(elapsed: Duration, duration_secs: u64) -> (f64, f64, f64) {
    let elapsed_secs = elapsed.as_secs_f64();
    let elapsed_ms = (elapsed_secs * 1000.0).round();
    if duration_secs == 0 {
        return (elapsed_ms, 0.0, 0.0);
    }
    let duration = duration_secs as f64;
    let progress = round1((elapsed_secs / duration * 100.0).min(100.0));
    let remaining = round1((duration - elapsed_secs).max(0.0));
    (elapsed_ms, remaining, progress)
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_halfway() {
        let (elapsed_ms, remaining, progress) = derive_progress(Duration::from_secs(5), 10);
        assert_eq!(elapsed_ms, 5000.0);
        assert_eq!(remaining, 5.0);
        assert_eq!(progress, 50.0);
    }

    #[test]
    fn test_progress_clamps_at_completion() {
        let (elapsed_ms, remaining, progress) = derive_progress(Duration::from_secs(20), 10);
        assert_eq!(elapsed_ms, 20000.0);
        assert_eq!(remaining, 0.0);
        assert_eq!(progress, 100.0);
    }

    #[test]
    fn test_progress_zero_duration() {
        let (_, remaining, progress) = derive_progress(Duration::from_secs(3), 0);
        assert_eq!(remaining, 0.0);
        assert_eq!(progress, 0.0);
    }

    #[test]
    fn test_truncate_chars() {
        let long = "x".repeat(CAPTURE_LIMIT + 50);
        assert_eq!(truncate_chars(long).chars().count(), CAPTURE_LIMIT);
        assert_eq!(truncate_chars("short".to_string()), "short");
    }

    #[tokio::test]
    async fn test_start_missing_executable() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = EngineSupervisor::new(dir.path().join("missing_engine"));

        let err = supervisor.start(10).await.unwrap_err();
        assert!(matches!(err, SupervisorError::ExecutableNotFound { .. }));

        let status = supervisor.status().await;
        assert!(!status.running);
        assert_eq!(status.pid, None);
    }

    #[tokio::test]
    async fn test_stop_without_session() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = EngineSupervisor::new(dir.path().join("missing_engine"));

        let err = supervisor.stop().await.unwrap_err();
        assert!(matches!(err, SupervisorError::NotRunning));
    }

    #[cfg(unix)]
    mod unix {
        use super::super::*;
        use std::io::Write;

        /// Write an executable shell script standing in for the engine.
        fn fake_engine(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
            use std::os::unix::fs::PermissionsExt;

            let path = dir.path().join(name);
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "#!/bin/sh").unwrap();
            writeln!(file, "{body}").unwrap();
            drop(file);

            let mut perms = std::fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
            path
        }

        #[tokio::test]
        async fn test_start_reports_running() {
            let dir = tempfile::tempdir().unwrap();
            let path = fake_engine(&dir, "engine.sh", "exec sleep \"$1\"");
            let supervisor = EngineSupervisor::new(path);

            let pid = supervisor.start(30).await.unwrap();

            let status = supervisor.status().await;
            assert!(status.running);
            assert_eq!(status.pid, Some(pid));
            assert_eq!(status.duration, 30);
            // Only the startup grace has passed.
            assert!(status.elapsed_ms < 2000.0);
            assert!(status.progress_percent < 10.0);

            supervisor.stop().await.unwrap();
        }

        #[tokio::test]
        async fn test_double_start_rejected() {
            let dir = tempfile::tempdir().unwrap();
            let path = fake_engine(&dir, "engine.sh", "exec sleep \"$1\"");
            let supervisor = EngineSupervisor::new(path);

            let pid = supervisor.start(30).await.unwrap();
            let err = supervisor.start(30).await.unwrap_err();
            match err {
                SupervisorError::AlreadyRunning { pid: existing } => assert_eq!(existing, pid),
                other => panic!("expected AlreadyRunning, got {other:?}"),
            }

            // The original run is untouched.
            assert_eq!(supervisor.status().await.pid, Some(pid));
            supervisor.stop().await.unwrap();
        }

        #[tokio::test]
        async fn test_startup_failure_captures_output() {
            let dir = tempfile::tempdir().unwrap();
            let path = fake_engine(&dir, "engine.sh", "echo ready\necho 'bad config' >&2\nexit 3");
            let supervisor = EngineSupervisor::new(path);

            let err = supervisor.start(10).await.unwrap_err();
            match err {
                SupervisorError::StartupFailed { stdout, stderr } => {
                    assert!(stdout.contains("ready"));
                    assert!(stderr.contains("bad config"));
                }
                other => panic!("expected StartupFailed, got {other:?}"),
            }

            // Failed start leaves the slot free.
            assert!(!supervisor.status().await.running);
        }

        #[tokio::test]
        async fn test_stop_graceful_frees_slot() {
            let dir = tempfile::tempdir().unwrap();
            let path = fake_engine(&dir, "engine.sh", "exec sleep \"$1\"");
            let supervisor = EngineSupervisor::new(path);

            let pid = supervisor.start(30).await.unwrap();
            let stopped = supervisor.stop().await.unwrap();
            assert_eq!(stopped, pid);

            assert!(!supervisor.status().await.running);

            // Slot is free for a new run.
            let pid2 = supervisor.start(30).await.unwrap();
            assert_ne!(pid2, 0);
            supervisor.stop().await.unwrap();
        }

        #[tokio::test]
        async fn test_stop_escalates_to_kill() {
            let dir = tempfile::tempdir().unwrap();
            // Ignores SIGTERM, so only the forced kill can end it.
            let path = fake_engine(&dir, "engine.sh", "trap '' TERM\nwhile true; do sleep 1; done");
            let supervisor = EngineSupervisor::new(path);

            let pid = supervisor.start(60).await.unwrap();

            let begun = Instant::now();
            let stopped = supervisor.stop().await.unwrap();
            assert_eq!(stopped, pid);
            // Graceful window plus kill overhead, nothing unbounded.
            assert!(begun.elapsed() < Duration::from_secs(8));

            assert!(!supervisor.status().await.running);
        }

        #[tokio::test]
        async fn test_crash_detected_lazily() {
            let dir = tempfile::tempdir().unwrap();
            // Outlives the startup grace, then exits on its own.
            let path = fake_engine(&dir, "engine.sh", "exec sleep 1");
            let supervisor = EngineSupervisor::new(path);

            supervisor.start(30).await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;

            // Exit is only observed here.
            assert!(!supervisor.status().await.running);
            assert!(matches!(
                supervisor.stop().await.unwrap_err(),
                SupervisorError::NotRunning
            ));
        }
    }
}
