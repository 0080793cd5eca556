/*!
 * Clip extraction: trim a time range out of a source video, optionally
 * reframing it vertically, mirroring it and boosting contrast/saturation.
 *
 * Extraction prefers a stream copy when no filter is needed. Some inputs
 * cannot be copied into the output container; that specific failure triggers
 * exactly one retry with a full re-encode. The flow is an explicit state
 * machine: Attempt -> Inspect -> (Retry ->) Terminal.
 */

use std::path::PathBuf;
use std::time::Duration;

use log::{debug, error, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::MediaError;
use crate::file_utils::FileManager;
use crate::media::locator::ToolPaths;
use crate::media::progress::{ProgressEvent, ProgressParser, ProgressReporter};
use crate::media::runner::{CancellationToken, ProcessOutput, ProcessRunner, RunOutcome};

/// Crop to 9:16 around the centre, scale to 1080x1920, square pixels
pub const VERTICAL_FILTER: &str = "crop=ih*9/16:ih,scale=1080:1920,setsar=1";

/// Horizontal flip
pub const MIRROR_FILTER: &str = "hflip";

/// Fixed contrast/saturation boost
pub const ENHANCE_FILTER: &str = "eq=contrast=1.1:saturation=1.1";

/// Video encoder arguments used whenever video is re-encoded
pub const VIDEO_ENCODE_ARGS: [&str; 6] = ["-c:v", "libx264", "-preset", "medium", "-crf", "23"];

/// Audio encoder arguments used whenever audio is re-encoded
pub const AUDIO_ENCODE_ARGS: [&str; 4] = ["-c:a", "aac", "-b:a", "128k"];

/// One extraction job
#[derive(Debug, Clone, PartialEq)]
pub struct ClipRequest {
    /// Source video
    pub input_path: PathBuf,
    /// Destination file, created or overwritten
    pub output_path: PathBuf,
    /// Offset into the source
    pub start: Duration,
    /// Clip length
    pub length: Duration,
    /// Reframe to a 1080x1920 vertical frame
    pub vertical_format: bool,
    /// Drop the audio stream
    pub remove_audio: bool,
    /// Flip horizontally
    pub mirror: bool,
    /// Apply the contrast/saturation boost
    pub enhance: bool,
}

impl ClipRequest {
    /// A plain trim with every transform disabled
    pub fn new(
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        start: Duration,
        length: Duration,
    ) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            start,
            length,
            vertical_format: false,
            remove_audio: false,
            mirror: false,
            enhance: false,
        }
    }
}

/// How the video stream is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// Re-mux without re-encoding
    Copy,
    /// Re-encode with the fixed encoder settings
    Encode,
}

/// How the audio stream is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    /// Re-mux without re-encoding
    Copy,
    /// Re-encode with the fixed encoder settings
    Encode,
    /// No audio in the output
    Drop,
}

/// Filters and codec choices for one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodePlan {
    /// Video filters in application order
    pub filters: Vec<&'static str>,
    /// Video codec decision
    pub video: VideoCodec,
    /// Audio codec decision
    pub audio: AudioCodec,
}

impl EncodePlan {
    /// First-attempt plan: copy when no filter is active
    pub fn for_request(request: &ClipRequest) -> Self {
        let mut filters = Vec::new();
        if request.vertical_format {
            filters.push(VERTICAL_FILTER);
        }
        if request.mirror {
            filters.push(MIRROR_FILTER);
        }
        if request.enhance {
            filters.push(ENHANCE_FILTER);
        }

        let video = if filters.is_empty() {
            VideoCodec::Copy
        } else {
            VideoCodec::Encode
        };
        let audio = match (request.remove_audio, video) {
            (true, _) => AudioCodec::Drop,
            (false, VideoCodec::Encode) => AudioCodec::Encode,
            (false, VideoCodec::Copy) => AudioCodec::Copy,
        };

        Self { filters, video, audio }
    }

    /// Retry plan: full re-encode, no filters, audio still dropped if requested
    pub fn forced_reencode(request: &ClipRequest) -> Self {
        Self {
            filters: Vec::new(),
            video: VideoCodec::Encode,
            audio: if request.remove_audio {
                AudioCodec::Drop
            } else {
                AudioCodec::Encode
            },
        }
    }

    /// Whether this plan tries a stream copy of the video
    pub fn attempts_copy(&self) -> bool {
        self.video == VideoCodec::Copy
    }

    /// Comma-joined filter chain, if any filter is active
    pub fn filter_chain(&self) -> Option<String> {
        if self.filters.is_empty() {
            None
        } else {
            Some(self.filters.join(","))
        }
    }
}

/// Transcoder arguments for a request under a plan
pub fn build_clip_args(request: &ClipRequest, plan: &EncodePlan) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-ss".into(),
        format_seconds(request.start),
        "-i".into(),
        request.input_path.to_string_lossy().into_owned(),
        "-t".into(),
        format_seconds(request.length),
    ];

    if let Some(chain) = plan.filter_chain() {
        args.push("-vf".into());
        args.push(chain);
    }

    match plan.video {
        VideoCodec::Copy => args.extend(["-c:v".to_string(), "copy".to_string()]),
        VideoCodec::Encode => args.extend(VIDEO_ENCODE_ARGS.iter().map(|a| a.to_string())),
    }

    match plan.audio {
        AudioCodec::Drop => args.push("-an".into()),
        AudioCodec::Copy => args.extend(["-c:a".to_string(), "copy".to_string()]),
        AudioCodec::Encode => args.extend(AUDIO_ENCODE_ARGS.iter().map(|a| a.to_string())),
    }

    args.extend([
        "-movflags".to_string(),
        "+faststart".to_string(),
        request.output_path.to_string_lossy().into_owned(),
    ]);
    args
}

/// Seconds with millisecond precision, as the transcoder accepts them
pub fn format_seconds(duration: Duration) -> String {
    format!("{:.3}", duration.as_secs_f64())
}

// Stream-copy rejections, e.g. "codec not currently supported in container"
static COPY_UNSUPPORTED_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)codec copy.*unsupported|could not find tag for codec|not (currently )?supported in container")
        .unwrap()
});

/// Whether stderr says the stream cannot be copied into the output
pub fn is_copy_unsupported(stderr: &str) -> bool {
    stderr.lines().any(|line| COPY_UNSUPPORTED_REGEX.is_match(line))
}

/// Map a failed run to the error it represents under `plan`
pub fn classify_failure(plan: &EncodePlan, output: &ProcessOutput) -> MediaError {
    if plan.attempts_copy() && is_copy_unsupported(&output.stderr) {
        MediaError::RecoverableToolFailure {
            diagnostics: output.diagnostics(),
        }
    } else {
        MediaError::ToolFailure {
            tool: "clip extraction".to_string(),
            exit_code: output.exit_code,
            diagnostics: output.diagnostics(),
        }
    }
}

// @state: extraction state machine
enum ExtractionState {
    Attempt { plan: EncodePlan, is_retry: bool },
    Inspect { plan: EncodePlan, is_retry: bool, output: ProcessOutput },
    Terminal(Result<(), MediaError>),
}

/// Runs clip extractions through the transcoder
#[derive(Debug, Clone)]
pub struct ClipExtractor {
    tools: ToolPaths,
}

impl ClipExtractor {
    /// Create an extractor over verified tool paths
    pub fn new(tools: ToolPaths) -> Self {
        Self { tools }
    }

    /// Extract one clip.
    ///
    /// Progress is reported per stderr line. On cancellation or terminal
    /// failure the partially written output file is removed.
    pub async fn extract(
        &self,
        request: &ClipRequest,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<(), MediaError> {
        let transcoder = self.tools.require_transcoder()?;
        validate_request(request)?;
        if let Some(parent) = request.output_path.parent() {
            FileManager::ensure_dir(parent)?;
        }

        let mut state = ExtractionState::Attempt {
            plan: EncodePlan::for_request(request),
            is_retry: false,
        };

        let result = loop {
            state = match state {
                ExtractionState::Attempt { plan, is_retry } => {
                    let args = build_clip_args(request, &plan);
                    let label = if is_retry { "Re-encoding clip" } else { "Extracting clip" };
                    let mut parser = ProgressParser::new(request.length, label);
                    let run = ProcessRunner::run(transcoder, &args, cancel, |line| {
                        progress.report(parser.parse_line(line));
                    })
                    .await;

                    match run {
                        Ok(RunOutcome::Exited(output)) => ExtractionState::Inspect { plan, is_retry, output },
                        Ok(RunOutcome::Cancelled(_)) => ExtractionState::Terminal(Err(MediaError::Cancelled)),
                        Err(e) => ExtractionState::Terminal(Err(e)),
                    }
                }
                ExtractionState::Inspect { plan, is_retry, output } => {
                    if output.success() {
                        ExtractionState::Terminal(Ok(()))
                    } else {
                        match classify_failure(&plan, &output) {
                            MediaError::RecoverableToolFailure { diagnostics } if !is_retry => {
                                warn!(
                                    "Stream copy not possible for {} ({}); retrying with re-encode",
                                    request.input_path.display(),
                                    diagnostics
                                );
                                progress.report(ProgressEvent::message(0.0, "Stream copy failed, re-encoding"));
                                ExtractionState::Attempt {
                                    plan: EncodePlan::forced_reencode(request),
                                    is_retry: true,
                                }
                            }
                            err => ExtractionState::Terminal(Err(err)),
                        }
                    }
                }
                ExtractionState::Terminal(result) => break result,
            };
        };

        match &result {
            Ok(()) => {
                info!("Extracted clip to {}", request.output_path.display());
                progress.report(ProgressEvent::message(1.0, "Clip extracted"));
            }
            Err(e) => {
                if e.is_cancelled() {
                    info!("Clip extraction cancelled: {}", request.output_path.display());
                } else {
                    error!("Clip extraction failed for {}: {}", request.input_path.display(), e);
                }
                FileManager::remove_partial_output(&request.output_path);
            }
        }
        result
    }
}

fn validate_request(request: &ClipRequest) -> Result<(), MediaError> {
    if !FileManager::file_exists(&request.input_path) {
        return Err(MediaError::InvalidInput(format!(
            "Input video not found: {}",
            request.input_path.display()
        )));
    }
    if request.length.is_zero() {
        return Err(MediaError::InvalidInput("Clip length must be positive".to_string()));
    }
    if request.input_path == request.output_path {
        return Err(MediaError::InvalidInput(
            "Output path must differ from the input path".to_string(),
        ));
    }
    debug!(
        "Clip request validated: {} [{} +{}]",
        request.input_path.display(),
        format_seconds(request.start),
        format_seconds(request.length)
    );
    Ok(())
}
