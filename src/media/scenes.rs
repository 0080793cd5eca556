/*!
 * Scene-change detection.
 *
 * A single transcoder pass scores every frame for visual discontinuity and
 * prints the frames above the threshold through the `metadata` filter. The
 * timestamp and score may appear on the same line or on consecutive lines,
 * so parsing is stateful.
 */

use std::path::Path;
use std::time::Duration;

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::MediaError;
use crate::file_utils::FileManager;
use crate::media::locator::ToolPaths;
use crate::media::progress::{ProgressEvent, ProgressParser, ProgressReporter};
use crate::media::runner::{CancellationToken, ProcessRunner, RunOutcome};

// @const: frame timestamp printed by the metadata filter
static PTS_TIME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"pts_time:\s*(-?\d+(?:\.\d+)?)").unwrap()
});

// @const: scene score printed by the metadata filter
static SCORE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"lavfi\.scene_score=\s*(\d+(?:\.\d+)?)").unwrap()
});

/// Timestamps closer to zero than this count as "at the start"
const ZERO_EPSILON: f64 = 0.001;

/// One detected scene boundary
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneChange {
    /// Boundary position in seconds
    pub timestamp_seconds: f64,
    /// Scene score, `None` for the synthesized start entry
    pub score: Option<f64>,
}

/// Accumulates scene changes from stderr lines
#[derive(Debug, Default)]
pub struct SceneLineParser {
    pending_pts: Option<f64>,
    changes: Vec<SceneChange>,
}

impl SceneLineParser {
    /// Create an empty parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one stderr line; returns the change it completed, if any
    pub fn push_line(&mut self, line: &str) -> Option<SceneChange> {
        let pts = PTS_TIME_REGEX
            .captures(line)
            .and_then(|caps| caps[1].parse::<f64>().ok());
        let score = SCORE_REGEX
            .captures(line)
            .and_then(|caps| caps[1].parse::<f64>().ok());

        let change = match (pts, score) {
            (Some(timestamp), Some(score)) => {
                self.pending_pts = None;
                Some(SceneChange { timestamp_seconds: timestamp, score: Some(score) })
            }
            (Some(timestamp), None) => {
                self.pending_pts = Some(timestamp);
                None
            }
            (None, Some(score)) => self
                .pending_pts
                .take()
                .map(|timestamp| SceneChange { timestamp_seconds: timestamp, score: Some(score) }),
            (None, None) => None,
        };

        if let Some(change) = change {
            self.changes.push(change);
        }
        change
    }

    /// Number of changes parsed so far
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Whether nothing has been parsed yet
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Sorted, deduplicated list starting at 0.0
    pub fn finish(self) -> Vec<SceneChange> {
        normalize_scene_changes(self.changes)
    }
}

/// Sort by timestamp, drop negative and duplicate timestamps, and make sure
/// the list starts with an entry at 0.0.
pub fn normalize_scene_changes(mut changes: Vec<SceneChange>) -> Vec<SceneChange> {
    changes.retain(|c| c.timestamp_seconds.is_finite() && c.timestamp_seconds >= 0.0);
    if !changes.iter().any(|c| c.timestamp_seconds.abs() < ZERO_EPSILON) {
        changes.push(SceneChange { timestamp_seconds: 0.0, score: None });
    }
    changes.sort_by(|a, b| a.timestamp_seconds.total_cmp(&b.timestamp_seconds));
    changes.dedup_by(|later, earlier| (later.timestamp_seconds - earlier.timestamp_seconds).abs() < ZERO_EPSILON);
    changes
}

/// Transcoder arguments for a detection pass
pub fn build_scene_args(input: &Path, threshold: f64) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-vf".into(),
        format!("select='gt(scene,{})',metadata=print:key=lavfi.scene_score", threshold),
        "-an".into(),
        "-f".into(),
        "null".into(),
        "-".into(),
    ]
}

/// Runs scene-change detection passes
#[derive(Debug, Clone)]
pub struct SceneDetector {
    tools: ToolPaths,
    accept_partial_results: bool,
}

impl SceneDetector {
    /// Detector that treats "matches parsed but non-zero exit" as success
    pub fn new(tools: ToolPaths) -> Self {
        Self {
            tools,
            accept_partial_results: true,
        }
    }

    /// Choose whether a failing exit with parsed matches is still a success
    pub fn with_partial_results(mut self, accept: bool) -> Self {
        self.accept_partial_results = accept;
        self
    }

    /// Detect scene changes with `threshold` in (0, 1]
    pub async fn detect(
        &self,
        input: &Path,
        threshold: f64,
        cancel: &CancellationToken,
    ) -> Result<Vec<SceneChange>, MediaError> {
        self.detect_with_progress(input, threshold, None, &|_event: ProgressEvent| {}, cancel)
            .await
    }

    /// Detect scene changes, reporting progress against `total` when known
    pub async fn detect_with_progress(
        &self,
        input: &Path,
        threshold: f64,
        total: Option<Duration>,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<Vec<SceneChange>, MediaError> {
        let transcoder = self.tools.require_transcoder()?;
        if !FileManager::file_exists(input) {
            return Err(MediaError::InvalidInput(format!(
                "Input video not found: {}",
                input.display()
            )));
        }
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(MediaError::InvalidInput(format!(
                "Scene threshold must be in (0, 1], got {}",
                threshold
            )));
        }

        info!("Detecting scenes in {} (threshold {})", input.display(), threshold);
        let args = build_scene_args(input, threshold);
        let mut parser = SceneLineParser::new();
        let mut progress_parser = ProgressParser::new(total.unwrap_or_default(), "Detecting scenes");

        let outcome = ProcessRunner::run(transcoder, &args, cancel, |line| {
            if let Some(change) = parser.push_line(line) {
                debug!("Scene change at {:.3}s", change.timestamp_seconds);
            } else if total.is_some() {
                progress.report(progress_parser.parse_line(line));
            }
        })
        .await?;

        let output = match outcome {
            RunOutcome::Exited(output) => output,
            RunOutcome::Cancelled(_) => return Err(MediaError::Cancelled),
        };

        if !output.success() {
            if parser.is_empty() || !self.accept_partial_results {
                return Err(MediaError::ToolFailure {
                    tool: "scene detection".to_string(),
                    exit_code: output.exit_code,
                    diagnostics: output.diagnostics(),
                });
            }
            warn!(
                "Scene detection exited with {:?} but parsed {} changes; keeping them",
                output.exit_code,
                parser.len()
            );
        }

        let changes = parser.finish();
        info!("Detected {} scene boundaries in {}", changes.len(), input.display());
        progress.report(ProgressEvent::message(1.0, "Scene detection complete"));
        Ok(changes)
    }
}
