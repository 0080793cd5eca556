/*!
 * Subprocess execution with streamed output and cooperative cancellation.
 *
 * `ProcessRunner::run` spawns one child, pumps stderr line by line through a
 * caller callback while stdout is collected in the background, and resolves
 * when the child exits or the `CancellationToken` fires. On cancellation the
 * child's whole process tree is killed and whatever output was captured so
 * far is still returned.
 */

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace, warn};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;

use crate::errors::MediaError;

/// How long to keep draining stdout after the child was killed
const STDOUT_DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Cloneable cancellation signal shared between a caller and its operations
#[derive(Debug, Clone)]
pub struct CancellationToken {
    state: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    /// Create a token in the not-cancelled state
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(false);
        Self {
            state: Arc::new(sender),
        }
    }

    /// Fire the signal; every clone observes it
    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    /// Whether `cancel` has been called on this token or a clone
    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolve once the token is cancelled
    pub async fn cancelled(&self) {
        let mut receiver = self.state.subscribe();
        // The sender lives as long as `self`, so `wait_for` only returns on cancellation
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Output captured from a finished (or killed) process
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Exit code; `None` when killed by a signal or cancelled
    pub exit_code: Option<i32>,
    /// Full stdout text
    pub stdout: String,
    /// Full stderr text, newline-separated
    pub stderr: String,
}

impl ProcessOutput {
    /// Whether the process exited with status 0
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stderr with the transcoder's banner and stream-metadata noise removed
    pub fn diagnostics(&self) -> String {
        filter_tool_stderr(&self.stderr)
    }
}

/// How a run ended
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The process exited on its own
    Exited(ProcessOutput),
    /// The token fired; the process was killed
    Cancelled(ProcessOutput),
}

/// Spawns media tools and streams their output
pub struct ProcessRunner;

impl ProcessRunner {
    /// Run `program` with `args`, calling `on_stderr_line` for every stderr line.
    ///
    /// Lines are split on both `\n` and `\r`, since the transcoder rewrites its
    /// progress line in place with carriage returns. A failure to start the
    /// process is reported as `MediaError::Spawn`, never as an exit code.
    pub async fn run<S, F>(
        program: &Path,
        args: &[S],
        cancel: &CancellationToken,
        mut on_stderr_line: F,
    ) -> Result<RunOutcome, MediaError>
    where
        S: AsRef<OsStr>,
        F: FnMut(&str) + Send,
    {
        if cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled(ProcessOutput::default()));
        }

        let mut command = hidden_command(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so cancellation reaches everything the tool spawns
        #[cfg(unix)]
        command.process_group(0);

        debug!(
            "Running {} {}",
            program.display(),
            args.iter()
                .map(|a| a.as_ref().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let mut child = command.spawn().map_err(|source| MediaError::Spawn {
            program: program.to_path_buf(),
            source,
        })?;

        let stdout_buffer = Arc::new(Mutex::new(Vec::<u8>::new()));
        let stdout_task = child.stdout.take().map(|stdout| {
            let buffer = Arc::clone(&stdout_buffer);
            tokio::spawn(collect_stream(stdout, buffer))
        });

        let mut stderr_text = String::new();
        let mut splitter = LineSplitter::default();
        let mut cancelled = false;

        if let Some(mut stderr) = child.stderr.take() {
            let mut chunk = [0u8; 4096];
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    read = stderr.read(&mut chunk) => match read {
                        Ok(0) => break,
                        Ok(n) => {
                            for line in splitter.push(&chunk[..n]) {
                                trace!("stderr: {}", line);
                                on_stderr_line(&line);
                                stderr_text.push_str(&line);
                                stderr_text.push('\n');
                            }
                        }
                        Err(e) => {
                            warn!("Error reading stderr of {}: {}", program.display(), e);
                            break;
                        }
                    }
                }
            }
        }

        if let Some(line) = splitter.finish() {
            on_stderr_line(&line);
            stderr_text.push_str(&line);
            stderr_text.push('\n');
        }

        let exit_code = if cancelled {
            None
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    None
                }
                status = child.wait() => match status {
                    Ok(status) => status.code(),
                    Err(e) => {
                        warn!("Failed to wait for {}: {}", program.display(), e);
                        None
                    }
                }
            }
        };

        if cancelled {
            terminate(&mut child, program).await;
        }

        if let Some(task) = stdout_task {
            if cancelled {
                if tokio::time::timeout(STDOUT_DRAIN_GRACE, task).await.is_err() {
                    debug!("Stopped draining stdout of {} after cancellation", program.display());
                }
            } else {
                let _ = task.await;
            }
        }
        let stdout = String::from_utf8_lossy(&stdout_buffer.lock()).into_owned();

        let output = ProcessOutput {
            exit_code,
            stdout,
            stderr: stderr_text,
        };

        if cancelled {
            Ok(RunOutcome::Cancelled(output))
        } else {
            Ok(RunOutcome::Exited(output))
        }
    }
}

/// Build a command that does not flash a console window on Windows
pub(crate) fn hidden_command(program: impl AsRef<OsStr>) -> Command {
    #[allow(unused_mut)]
    let mut command = Command::new(program);
    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        command.creation_flags(CREATE_NO_WINDOW);
    }
    command
}

async fn terminate(child: &mut Child, program: &Path) {
    if let Some(pid) = child.id() {
        kill_process_tree(pid, program).await;
    }
    match child.start_kill() {
        Ok(()) => warn!(
            "Killed {} (pid {:?}) due to cancellation",
            program.display(),
            child.id()
        ),
        Err(e) => debug!("Kill of {} failed (already exited?): {}", program.display(), e),
    }
    let _ = child.wait().await;
}

#[cfg(unix)]
async fn kill_process_tree(pid: u32, program: &Path) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        debug!("Kill of process group {} ({}) failed: {}", raw, program.display(), e);
    }
}

#[cfg(windows)]
async fn kill_process_tree(pid: u32, program: &Path) {
    let status = hidden_command("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(e) = status {
        debug!("taskkill for {} (pid {}) failed: {}", program.display(), pid, e);
    }
}

async fn collect_stream<R>(mut reader: R, buffer: Arc<Mutex<Vec<u8>>>)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buffer.lock().extend_from_slice(&chunk[..n]),
        }
    }
}

/// Splits a byte stream into lines on `\n` or `\r`, skipping empty lines
#[derive(Debug, Default)]
struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in bytes {
            if byte == b'\n' || byte == b'\r' {
                if !self.pending.is_empty() {
                    lines.push(String::from_utf8_lossy(&self.pending).into_owned());
                    self.pending.clear();
                }
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            let line = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            Some(line)
        }
    }
}

/// Filter transcoder stderr to only show meaningful error lines, stripping the
/// version banner, build configuration, stream metadata and progress noise.
pub fn filter_tool_stderr(stderr: &str) -> String {
    let noise_prefixes = [
        "ffmpeg version",
        "ffprobe version",
        "built with",
        "configuration:",
        "lib",
        "Input #",
        "Metadata:",
        "Duration:",
        "Chapter",
        "Stream #",
        "title",
        "encoder",
        "handler_name",
        "vendor_id",
        "major_brand",
        "minor_version",
        "compatible_brands",
        "creation_time",
        "Output #",
        "Stream mapping:",
        "Press [q]",
        "frame=",
        "size=",
    ];

    let meaningful: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !noise_prefixes.iter().any(|p| line.starts_with(p)))
        .collect();

    if meaningful.is_empty() {
        "unknown error (stderr was empty after filtering)".to_string()
    } else {
        meaningful.join("\n")
    }
}
