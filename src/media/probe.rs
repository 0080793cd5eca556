/*!
 * Duration queries through the prober.
 */

use std::path::Path;
use std::time::Duration;

use log::{debug, error};

use crate::errors::MediaError;
use crate::file_utils::FileManager;
use crate::media::locator::ToolPaths;
use crate::media::runner::{CancellationToken, ProcessRunner, RunOutcome};

/// Reads container-level facts about media files
#[derive(Debug, Clone)]
pub struct MediaProber {
    tools: ToolPaths,
}

impl MediaProber {
    /// Create a prober over verified tool paths
    pub fn new(tools: ToolPaths) -> Self {
        Self { tools }
    }

    /// Container duration of `path`.
    ///
    /// A non-zero exit, empty output or a non-positive value is a `Probe` error.
    pub async fn duration(&self, path: &Path, cancel: &CancellationToken) -> Result<Duration, MediaError> {
        let prober = self.tools.require_prober()?;
        if !FileManager::file_exists(path) {
            return Err(MediaError::InvalidInput(format!(
                "Media file not found: {}",
                path.display()
            )));
        }

        let args = duration_args(path);
        let output = match ProcessRunner::run(prober, &args, cancel, |_| {}).await? {
            RunOutcome::Exited(output) => output,
            RunOutcome::Cancelled(_) => return Err(MediaError::Cancelled),
        };

        if !output.success() {
            let diagnostics = output.diagnostics();
            error!("Duration probe failed for {}: {}", path.display(), diagnostics);
            return Err(MediaError::Probe(format!(
                "prober exited with {:?} for {}: {}",
                output.exit_code,
                path.display(),
                diagnostics
            )));
        }

        let duration = parse_duration_output(&output.stdout).ok_or_else(|| {
            MediaError::Probe(format!(
                "could not determine duration of {} (output: '{}')",
                path.display(),
                output.stdout.trim()
            ))
        })?;
        debug!("Duration of {}: {:.3}s", path.display(), duration.as_secs_f64());
        Ok(duration)
    }
}

fn duration_args(path: &Path) -> Vec<String> {
    vec![
        "-v".into(),
        "error".into(),
        "-show_entries".into(),
        "format=duration".into(),
        "-of".into(),
        "default=noprint_wrappers=1:nokey=1".into(),
        path.to_string_lossy().into_owned(),
    ]
}

/// Parse the first non-empty line as positive fractional seconds
pub fn parse_duration_output(stdout: &str) -> Option<Duration> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let seconds: f64 = line.parse().ok()?;
    if seconds.is_finite() && seconds > 0.0 {
        Some(Duration::from_secs_f64(seconds))
    } else {
        None
    }
}
