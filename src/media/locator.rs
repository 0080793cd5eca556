/*!
 * Discovery and verification of the transcoder (`ffmpeg`) and prober (`ffprobe`).
 *
 * Candidates are taken first from an application-local `bin` directory, then
 * from the search path. A pair is accepted only if both binaries answer a
 * `-version` query with exit code 0 within the verification timeout, and
 * their output mentions both their own name and "version".
 */

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::errors::MediaError;
use crate::media::runner::{CancellationToken, ProcessRunner, RunOutcome};

/// Default bound for a single version probe
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Base name of the transcoder executable
pub const TRANSCODER_NAME: &str = "ffmpeg";

/// Base name of the prober executable
pub const PROBER_NAME: &str = "ffprobe";

/// Verified tool locations, created once and shared read-only afterwards
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolPaths {
    /// Transcoder path, when verified
    pub transcoder_path: Option<PathBuf>,
    /// Prober path, when verified
    pub prober_path: Option<PathBuf>,
    /// True only when both tools were verified
    pub available: bool,
}

impl ToolPaths {
    /// Paths for an already-verified pair
    pub fn new(transcoder_path: PathBuf, prober_path: PathBuf) -> Self {
        Self {
            transcoder_path: Some(transcoder_path),
            prober_path: Some(prober_path),
            available: true,
        }
    }

    /// The "nothing found" value
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Transcoder path or a fail-fast `Unavailable` error
    pub fn require_transcoder(&self) -> Result<&Path, MediaError> {
        match (&self.transcoder_path, self.available) {
            (Some(path), true) => Ok(path),
            _ => Err(MediaError::Unavailable(format!(
                "{} is not available or failed verification",
                TRANSCODER_NAME
            ))),
        }
    }

    /// Prober path or a fail-fast `Unavailable` error
    pub fn require_prober(&self) -> Result<&Path, MediaError> {
        match (&self.prober_path, self.available) {
            (Some(path), true) => Ok(path),
            _ => Err(MediaError::Unavailable(format!(
                "{} is not available or failed verification",
                PROBER_NAME
            ))),
        }
    }
}

/// Searches for and verifies the tool pair
#[derive(Debug, Clone)]
pub struct ExecutableLocator {
    bin_dir: Option<PathBuf>,
    search_path: Option<OsString>,
    verify_timeout: Duration,
}

impl Default for ExecutableLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutableLocator {
    /// Locator using `<executable dir>/bin` and the process `PATH`
    pub fn new() -> Self {
        let bin_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("bin")));
        Self {
            bin_dir,
            search_path: None,
            verify_timeout: DEFAULT_VERIFY_TIMEOUT,
        }
    }

    /// Override the application-local bin directory
    pub fn with_bin_dir(mut self, bin_dir: impl Into<PathBuf>) -> Self {
        self.bin_dir = Some(bin_dir.into());
        self
    }

    /// Search this path list instead of the process `PATH`
    pub fn with_search_path(mut self, search_path: impl Into<OsString>) -> Self {
        self.search_path = Some(search_path.into());
        self
    }

    /// Override the per-binary verification timeout
    pub fn with_verify_timeout(mut self, timeout: Duration) -> Self {
        self.verify_timeout = timeout;
        self
    }

    /// Find the first candidate pair where both binaries verify.
    ///
    /// Never fails: an unverifiable setup yields `available == false`.
    pub async fn locate(&self) -> ToolPaths {
        info!("Locating {} and {}...", TRANSCODER_NAME, PROBER_NAME);

        for (source, transcoder, prober) in self.candidate_pairs() {
            debug!(
                "Checking {} candidates: {:?}, {:?}",
                source, transcoder, prober
            );
            if self.verify(&transcoder).await && self.verify(&prober).await {
                info!(
                    "Verified {} tools: '{}', '{}'",
                    source,
                    transcoder.display(),
                    prober.display()
                );
                return ToolPaths::new(transcoder, prober);
            }
            warn!("{} candidates found but failed verification", source);
        }

        error!(
            "{}/{} could not be located or verified; media processing is unavailable",
            TRANSCODER_NAME, PROBER_NAME
        );
        ToolPaths::unavailable()
    }

    fn candidate_pairs(&self) -> Vec<(&'static str, PathBuf, PathBuf)> {
        let mut pairs = Vec::new();

        if let Some(bin_dir) = &self.bin_dir {
            let transcoder = bin_dir.join(platform_bin(TRANSCODER_NAME));
            let prober = bin_dir.join(platform_bin(PROBER_NAME));
            if transcoder.is_file() && prober.is_file() {
                pairs.push(("bundled", transcoder, prober));
            } else {
                debug!("No bundled tools in {}", bin_dir.display());
            }
        }

        match (self.find_on_path(TRANSCODER_NAME), self.find_on_path(PROBER_NAME)) {
            (Some(transcoder), Some(prober)) => pairs.push(("PATH", transcoder, prober)),
            _ => debug!("{}/{} not found on the search path", TRANSCODER_NAME, PROBER_NAME),
        }

        pairs
    }

    fn find_on_path(&self, name: &str) -> Option<PathBuf> {
        let paths = match &self.search_path {
            Some(paths) => paths.clone(),
            None => std::env::var_os("PATH")?,
        };
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        which::which_in(name, Some(paths), cwd).ok()
    }

    /// Run `<binary> -version` and check exit code and output
    pub async fn verify(&self, binary: &Path) -> bool {
        match verify_executable(binary, self.verify_timeout).await {
            Ok(()) => {
                debug!("Verification successful for {}", binary.display());
                true
            }
            Err(e) => {
                warn!("Verification failed for {}: {}", binary.display(), e);
                false
            }
        }
    }
}

/// Version probe of a single binary, bounded by `timeout`
pub async fn verify_executable(binary: &Path, timeout: Duration) -> Result<(), MediaError> {
    if !binary.is_file() {
        return Err(MediaError::InvalidInput(format!(
            "{} does not exist",
            binary.display()
        )));
    }

    let cancel = CancellationToken::new();
    let run = ProcessRunner::run(binary, &["-version"], &cancel, |_| {});
    let outcome = tokio::time::timeout(timeout, run)
        .await
        .map_err(|_| MediaError::Timeout {
            program: binary.to_path_buf(),
            after: timeout,
        })??;

    let output = match outcome {
        RunOutcome::Exited(output) => output,
        RunOutcome::Cancelled(_) => return Err(MediaError::Cancelled),
    };

    let name = binary
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let combined = format!("{}\n{}", output.stdout, output.stderr);

    if output.success() && !name.is_empty() && combined.contains(&name) && combined.contains("version") {
        Ok(())
    } else {
        Err(MediaError::ToolFailure {
            tool: format!("{} -version", name),
            exit_code: output.exit_code,
            diagnostics: combined.lines().next().unwrap_or_default().to_string(),
        })
    }
}

/// Platform executable file name
pub fn platform_bin(name: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}
