//! Probe executor: runs the health-check executable as a child process.
//!
//! The probe is started with exactly one positional argument, passed as a
//! discrete argv entry (no shell). It runs in its own process group so a
//! timeout can take down everything it started. Standard output and error
//! are read concurrently into bounded buffers; whatever was captured before a
//! kill is still returned.
//!
//! Lifecycle of one run:
//! 1. Spawn with piped stdout/stderr and a fresh process group
//! 2. Wait for exit, bounded by the invocation deadline
//! 3. On timeout: SIGTERM the group, wait `kill_grace`, SIGKILL the group
//! 4. Collect output; kill any descendants still holding the pipes open
//!
//! If the future is dropped mid-run (client went away), a guard kills the
//! group and `kill_on_drop` lets tokio reap the child.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::config::{
    ProbeConfig, DEFAULT_KILL_GRACE_MILLIS, DEFAULT_MAX_OUTPUT_BYTES, PROBE_DRAIN_TIMEOUT_MILLIS,
};

use super::mode::ProbeMode;

/// Size of a single read from a probe pipe
const READ_CHUNK_SIZE: usize = 8192;

/// Deadline used when the requested budget overflows `Instant` (about 30 years)
const FAR_FUTURE_SECS: u64 = 86_400 * 365 * 30;

/// One requested probe run. Created per request and consumed by [`ProbeExecutor::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeInvocation {
    pub mode: ProbeMode,
    pub argument: &'static str,
    pub timeout: Duration,
}

impl ProbeInvocation {
    pub fn new(mode: ProbeMode, timeout: Duration) -> Self {
        Self {
            mode,
            argument: mode.argument(),
            timeout,
        }
    }
}

/// Outcome of a probe that was spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// Exit code, or `-<signal>` if the probe died from a signal.
    /// `None` when the run timed out and was killed.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl ProbeResult {
    /// True only for a probe that finished in time with exit code 0.
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("failed to start probe {executable}: {source}")]
    Spawn {
        executable: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for probe: {0}")]
    Wait(#[source] std::io::Error),
}

/// Runs the configured probe executable.
#[derive(Debug, Clone)]
pub struct ProbeExecutor {
    executable: PathBuf,
    kill_grace: Duration,
    max_output_bytes: usize,
}

impl ProbeExecutor {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            kill_grace: Duration::from_millis(DEFAULT_KILL_GRACE_MILLIS),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    pub fn from_config(config: &ProbeConfig) -> Self {
        Self::new(config.executable.clone())
            .with_kill_grace(config.kill_grace())
            .with_max_output_bytes(config.max_output_bytes)
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn with_max_output_bytes(mut self, limit: usize) -> Self {
        self.max_output_bytes = limit;
        self
    }

    /// Run the probe with `argument` and a hard wall-clock `timeout`.
    ///
    /// Only fails if the process cannot be started or waited on. A non-zero
    /// exit or a timeout is reported through the returned [`ProbeResult`].
    pub async fn run(&self, argument: &str, timeout: Duration) -> Result<ProbeResult, ExecutionError> {
        let started = Instant::now();
        let deadline = deadline_after(timeout);

        let mut std_command = std::process::Command::new(&self.executable);
        std_command
            .arg(argument)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            // Own process group so the whole probe tree can be signalled
            use std::os::unix::process::CommandExt;
            std_command.process_group(0);
        }

        let mut command = Command::from(std_command);
        command.kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| ExecutionError::Spawn {
            executable: self.executable.display().to_string(),
            source,
        })?;

        let mut group = ProcessGroup::new(child.id());
        tracing::debug!(
            pid = ?child.id(),
            executable = %self.executable.display(),
            argument,
            "Probe spawned"
        );

        let mut stdout = Capture::start(child.stdout.take(), self.max_output_bytes);
        let mut stderr = Capture::start(child.stderr.take(), self.max_output_bytes);

        let (status, timed_out) = match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(status) => (Some(status.map_err(ExecutionError::Wait)?), false),
            Err(_elapsed) => {
                tracing::warn!(
                    timeout_secs = timeout.as_secs(),
                    argument,
                    "Probe exceeded its time budget, terminating"
                );
                self.terminate(&mut child, &group)
                    .await
                    .map_err(ExecutionError::Wait)?;
                (None, true)
            }
        };

        // Descendants can keep the pipes open after the probe itself exited.
        let drain = Duration::from_millis(PROBE_DRAIN_TIMEOUT_MILLIS);
        let drain_until = if timed_out {
            deadline_after(drain)
        } else {
            deadline_after(drain).min(deadline)
        };
        let drained = stdout.wait_until(drain_until).await && stderr.wait_until(drain_until).await;
        if !drained {
            tracing::warn!("Probe descendants still hold output pipes, killing process group");
            group.kill();
            let until = deadline_after(drain);
            stdout.wait_until(until).await;
            stderr.wait_until(until).await;
        }
        group.disarm();

        let (stdout, stdout_truncated) = stdout.finish();
        let (stderr, stderr_truncated) = stderr.finish();

        Ok(ProbeResult {
            exit_code: status.map(exit_code),
            stdout,
            stderr,
            stdout_truncated,
            stderr_truncated,
            timed_out,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// SIGTERM the group, give it `kill_grace`, then SIGKILL whatever is left.
    async fn terminate(&self, child: &mut Child, group: &ProcessGroup) -> std::io::Result<ExitStatus> {
        group.terminate();
        if let Ok(status) = tokio::time::timeout(self.kill_grace, child.wait()).await {
            group.kill();
            return status;
        }

        group.kill();
        if let Err(e) = child.start_kill() {
            tracing::debug!(error = %e, "Probe already gone when force-killing");
        }
        child.wait().await
    }
}

/// `now + timeout`, saturating to a far-future instant for budgets too large to represent.
fn deadline_after(timeout: Duration) -> tokio::time::Instant {
    let now = tokio::time::Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(FAR_FUTURE_SECS))
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

/// Signals the probe's process group. Kills the group on drop unless disarmed.
struct ProcessGroup {
    pgid: Option<u32>,
    armed: bool,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid, armed: true }
    }

    fn terminate(&self) {
        #[cfg(unix)]
        self.send(nix::sys::signal::Signal::SIGTERM);
    }

    fn kill(&self) {
        #[cfg(unix)]
        self.send(nix::sys::signal::Signal::SIGKILL);
    }

    fn disarm(&mut self) {
        self.armed = false;
    }

    #[cfg(unix)]
    fn send(&self, signal: nix::sys::signal::Signal) {
        use nix::errno::Errno;
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        let Some(pgid) = self.pgid else {
            return;
        };
        match killpg(Pid::from_raw(pgid as i32), signal) {
            Ok(()) => tracing::debug!(pgid, ?signal, "Signalled probe process group"),
            Err(Errno::ESRCH) => {}
            Err(e) => tracing::warn!(pgid, ?signal, error = %e, "Failed to signal probe process group"),
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        if self.armed {
            self.kill();
        }
    }
}

#[derive(Debug, Default)]
struct CaptureBuffer {
    bytes: Vec<u8>,
    truncated: bool,
}

impl CaptureBuffer {
    fn push(&mut self, chunk: &[u8], limit: usize) {
        let room = limit.saturating_sub(self.bytes.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }
}

/// Background reader for one output stream.
struct Capture {
    buffer: Arc<Mutex<CaptureBuffer>>,
    task: Option<JoinHandle<()>>,
}

impl Capture {
    fn start<R>(stream: Option<R>, limit: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(CaptureBuffer::default()));
        let task = stream.map(|stream| tokio::spawn(read_into(stream, buffer.clone(), limit)));
        Self { buffer, task }
    }

    /// Wait for the stream to hit EOF. Returns false if `until` passed first.
    async fn wait_until(&mut self, until: tokio::time::Instant) -> bool {
        match self.task.as_mut() {
            Some(task) => {
                let done = tokio::time::timeout_at(until, task).await.is_ok();
                if done {
                    self.task = None;
                }
                done
            }
            None => true,
        }
    }

    fn finish(self) -> (String, bool) {
        if let Some(task) = self.task {
            task.abort();
        }
        let buffer = lock(&self.buffer);
        (String::from_utf8_lossy(&buffer.bytes).into_owned(), buffer.truncated)
    }
}

fn lock(buffer: &Mutex<CaptureBuffer>) -> MutexGuard<'_, CaptureBuffer> {
    buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Read until EOF. Bytes past `limit` are read and dropped so the probe never blocks on a full pipe.
async fn read_into<R>(mut stream: R, buffer: Arc<Mutex<CaptureBuffer>>, limit: usize)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => lock(&buffer).push(&chunk[..n], limit),
            Err(e) => {
                tracing::debug!(error = %e, "Probe output stream failed");
                break;
            }
        }
    }
}
