//! Shell command execution with cancellation and optional timeout.

use anyhow::{Context, Result, bail};
use std::io::Read;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Default timeout applied by short-lived helper invocations; build-step
/// commands pass `None` because compile times are unbounded.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Per-step cancellation token. Signalled is terminal; tasks poll it before
/// taking a slot, before spawning, and after the subprocess completes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_signalled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct ExecOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed(ExecOutput),
    /// The token fired; the child (if started) was killed.
    Cancelled,
}

/// Run `command_line` through the platform shell (`cmd /s /c` on Windows,
/// `sh -c` elsewhere), capturing output. The child is killed when `timeout`
/// expires or `cancel` fires.
pub fn run_shell(
    command_line: &str,
    cwd: &Path,
    timeout: Option<Duration>,
    cancel: &CancelToken,
) -> Result<RunOutcome> {
    if cancel.is_signalled() {
        return Ok(RunOutcome::Cancelled);
    }

    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.args(["/s", "/c", command_line]);
        c
    } else {
        let mut c = Command::new("sh");
        c.args(["-c", command_line]);
        c
    };
    cmd.current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn '{}'", command_line))?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let deadline = timeout.map(|t| Instant::now() + t);

    loop {
        if let Some(status) = child.try_wait().context("failed to wait for command")? {
            return Ok(RunOutcome::Completed(ExecOutput {
                status,
                stdout: stdout.join().unwrap_or_default(),
                stderr: stderr.join().unwrap_or_default(),
            }));
        }
        if cancel.is_signalled() {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(RunOutcome::Cancelled);
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                bail!(
                    "command timed out after {}s: {}",
                    timeout.unwrap_or_default().as_secs(),
                    command_line
                );
            }
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn drain(pipe: Option<impl Read + Send + 'static>) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}
