use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app_config::Config;
use crate::clip_planner::{ClipPlanner, PlannedClip};
use crate::file_utils::FileManager;
use crate::media::{
    CancellationToken, ClipExtractor, ClipRequest, CombineRequest, Combiner, ExecutableLocator,
    MediaProber, ProgressEvent, ProgressReporter, SceneChange, SceneDetector, ToolPaths,
};
use crate::subtitles::{self, Cue, SpeechMark, SubtitleSynthesizer};

// @module: Application controller for clipping and short composition

// @const: Organizer type folder for clips
pub const CLIPS_OUTPUT_TYPE: &str = "clips";

// @const: Organizer type folder for narrated shorts
pub const SHORTS_OUTPUT_TYPE: &str = "ai_short";

/// Outcome of a batch clipping run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClippingSummary {
    /// Videos looked at (including skipped and failed ones)
    pub videos: usize,
    /// Clips written
    pub clips_generated: usize,
    /// Videos too short to clip
    pub skipped: usize,
    /// Failures counted across probing, detection, extraction and organizing
    pub errors: usize,
    /// Whether the run was stopped by cancellation
    pub cancelled: bool,
}

/// Inputs of a narrated short
#[derive(Debug, Clone, PartialEq)]
pub struct ShortRequest {
    /// Looped background video
    pub background_path: PathBuf,
    /// Narration audio
    pub audio_path: PathBuf,
    /// Narration text
    pub narration: String,
    /// Optional speech marks (JSON lines or array)
    pub speech_marks_path: Option<PathBuf>,
    /// Directory that receives the short
    pub output_dir: PathBuf,
}

/// Forwards engine progress to an indicatif bar
pub struct ProgressBarReporter {
    bar: ProgressBar,
}

impl ProgressBarReporter {
    /// A percentage bar with message and ETA
    pub fn new() -> Self {
        let bar = ProgressBar::new(1000);
        let template_result = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {msg}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {percent}% {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(template_result.progress_chars("█▓▒░"));
        Self { bar }
    }

    /// Close the bar with a final message
    pub fn finish(&self, message: impl Into<String>) {
        self.bar.finish_with_message(message.into());
    }
}

impl Default for ProgressBarReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for ProgressBarReporter {
    fn report(&self, event: ProgressEvent) {
        self.bar.set_position((event.fraction * 1000.0).round() as u64);
        let position = match (event.item_index, event.item_count) {
            (Some(index), Some(count)) => format!("[{}/{}] ", index + 1, count),
            _ => String::new(),
        };
        let eta = event
            .eta
            .map(|eta| format!(" (ETA {})", Controller::format_duration(eta)))
            .unwrap_or_default();
        self.bar.set_message(format!("{}{}{}", position, event.message, eta));
    }
}

/// Main application controller
pub struct Controller {
    // @field: App configuration
    config: Config,

    // @field: Verified tool locations
    tools: ToolPaths,
}

impl Controller {
    // @method: Create a controller; tools stay unavailable until `initialize`
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            tools: ToolPaths::unavailable(),
        }
    }

    /// Create a controller over already-located tools
    pub fn with_tools(config: Config, tools: ToolPaths) -> Self {
        Self { config, tools }
    }

    /// Locate and verify the transcoder and prober
    pub async fn initialize(&mut self) -> &ToolPaths {
        let mut locator = ExecutableLocator::new()
            .with_verify_timeout(Duration::from_secs(self.config.tools.verify_timeout_secs));
        if let Some(bin_dir) = &self.config.tools.bin_dir {
            locator = locator.with_bin_dir(bin_dir);
        }
        self.tools = locator.locate().await;
        &self.tools
    }

    pub fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Check if the media tools were verified
    pub fn is_initialized(&self) -> bool {
        self.tools.available
    }

    /// Duration of a media file
    pub async fn probe_duration(&self, path: &Path, cancel: &CancellationToken) -> Result<Duration> {
        let duration = MediaProber::new(self.tools.clone()).duration(path, cancel).await?;
        Ok(duration)
    }

    /// Extract a single clip
    pub async fn extract_clip(
        &self,
        request: &ClipRequest,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<()> {
        ClipExtractor::new(self.tools.clone())
            .extract(request, progress, cancel)
            .await?;
        Ok(())
    }

    /// Scene boundaries of a video
    pub async fn detect_scenes(
        &self,
        input: &Path,
        threshold: f64,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<Vec<SceneChange>> {
        let total = MediaProber::new(self.tools.clone()).duration(input, cancel).await.ok();
        let scenes = self
            .scene_detector()
            .detect_with_progress(input, threshold, total, progress, cancel)
            .await?;
        Ok(scenes)
    }

    /// Build cues for a narration and write them as SRT
    pub fn generate_subtitles(
        &self,
        narration: &str,
        total: Duration,
        speech_marks_path: Option<&Path>,
        output: &Path,
    ) -> Result<Vec<Cue>> {
        let marks = self.load_marks(speech_marks_path)?;
        let cues = SubtitleSynthesizer::new(self.config.subtitles.clone())
            .synthesize(narration, total, marks.as_deref())
            .context("Failed to synthesize subtitles")?;
        subtitles::write_srt(&cues, output)?;
        info!("Wrote {} cues to {}", cues.len(), output.display());
        Ok(cues)
    }

    fn load_marks(&self, path: Option<&Path>) -> Result<Option<Vec<SpeechMark>>> {
        path.map(subtitles::load_speech_marks).transpose()
    }

    fn scene_detector(&self) -> SceneDetector {
        SceneDetector::new(self.tools.clone())
            .with_partial_results(self.config.clipping.accept_partial_scene_results)
    }

    fn clip_request(&self, input: &Path, output: PathBuf, clip: &PlannedClip) -> ClipRequest {
        let clipping = &self.config.clipping;
        ClipRequest {
            input_path: input.to_path_buf(),
            output_path: output,
            start: clip.start,
            length: clip.length,
            vertical_format: clipping.vertical,
            remove_audio: clipping.remove_audio,
            mirror: clipping.mirror,
            enhance: clipping.enhance,
        }
    }

    /// Clip every video in `inputs` into `output_dir` with an OS-seeded planner
    pub async fn run_clipping(
        &self,
        inputs: &[PathBuf],
        output_dir: &Path,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<ClippingSummary> {
        let mut rng = StdRng::from_os_rng();
        self.run_clipping_with_rng(inputs, output_dir, progress, cancel, &mut rng)
            .await
    }

    /// Batch clipping with an explicit random source.
    ///
    /// Per-video and per-clip failures are counted, not fatal; cancellation
    /// stops the batch and is reported in the summary.
    pub async fn run_clipping_with_rng<R: Rng + Send + ?Sized>(
        &self,
        inputs: &[PathBuf],
        output_dir: &Path,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
        rng: &mut R,
    ) -> Result<ClippingSummary> {
        if !self.tools.available {
            return Err(anyhow!("Media tools are not available; run initialization first"));
        }
        FileManager::ensure_dir(output_dir)?;

        let clipping = &self.config.clipping;
        let planner = ClipPlanner::new(clipping.clip_count, clipping.min_clip_secs, clipping.max_clip_secs);
        let prober = MediaProber::new(self.tools.clone());
        let extractor = ClipExtractor::new(self.tools.clone());
        let detector = self.scene_detector();

        let video_count = inputs.len();
        let expected_clips = (clipping.clip_count * video_count).max(1);
        let mut attempted = 0usize;
        let mut summary = ClippingSummary::default();
        let start_time = std::time::Instant::now();

        'videos: for (video_index, input) in inputs.iter().enumerate() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            summary.videos += 1;
            info!("Processing video {}/{}: {}", video_index + 1, video_count, input.display());
            progress.report(
                ProgressEvent::message(
                    attempted as f64 / expected_clips as f64,
                    format!("Processing video {}/{}", video_index + 1, video_count),
                )
                .with_item(video_index, video_count),
            );

            let duration = match prober.duration(input, cancel).await {
                Ok(duration) => duration,
                Err(e) if e.is_cancelled() => {
                    summary.cancelled = true;
                    break;
                }
                Err(e) => {
                    error!("Failed to get duration for {}: {}", input.display(), e);
                    summary.errors += 1;
                    continue;
                }
            };

            if duration.as_secs_f64() <= clipping.min_clip_secs as f64 {
                warn!(
                    "Skipping {}: duration {:.1}s is not longer than the minimum clip length",
                    input.display(),
                    duration.as_secs_f64()
                );
                summary.skipped += 1;
                continue;
            }

            let mut scenes: Option<Vec<SceneChange>> = None;
            if clipping.use_scene_detection {
                match detector.detect(input, clipping.scene_threshold, cancel).await {
                    Ok(found) if found.len() >= 2 => {
                        info!("Detected {} potential scenes for {}", found.len() - 1, input.display());
                        scenes = Some(found);
                    }
                    Ok(_) => warn!(
                        "Scene detection yielded insufficient results for {}. Falling back to random clips.",
                        input.display()
                    ),
                    Err(e) if e.is_cancelled() => {
                        summary.cancelled = true;
                        break;
                    }
                    Err(e) => {
                        error!("Scene detection failed for {}: {}", input.display(), e);
                        summary.errors += 1;
                        continue;
                    }
                }
            }

            let plan = match &scenes {
                Some(scenes) => planner.plan_from_scenes(scenes, rng),
                None => planner.plan_random(duration, rng),
            };
            debug!("Planned {} clips for {}", plan.len(), input.display());

            let mut clips_for_video = 0usize;
            for (clip_index, clip) in plan.iter().enumerate() {
                if cancel.is_cancelled() {
                    summary.cancelled = true;
                    break 'videos;
                }

                let output = FileManager::clip_output_path(input, output_dir, clips_for_video + 1);
                let request = self.clip_request(input, output.clone(), clip);
                let done_before = attempted;
                attempted += 1;

                let clip_progress = |event: ProgressEvent| {
                    let overall = (done_before as f64 + event.fraction) / expected_clips as f64;
                    progress.report(ProgressEvent {
                        fraction: overall.clamp(0.0, 1.0),
                        message: format!("Clip {}/{} of video {}: {}", clip_index + 1, plan.len(), video_index + 1, event.message),
                        ..event
                    }
                    .with_item(video_index, video_count));
                };

                match extractor.extract(&request, &clip_progress, cancel).await {
                    Ok(()) => {
                        clips_for_video += 1;
                        summary.clips_generated += 1;
                        if self.config.output.organize_output {
                            match FileManager::organize_output_file(&output, input, output_dir, CLIPS_OUTPUT_TYPE) {
                                Ok(path) => info!("Clip {} for {} organized to {}", clip_index + 1, input.display(), path.display()),
                                Err(e) => {
                                    error!("Failed to organize {}. File remains in place: {}", output.display(), e);
                                    summary.errors += 1;
                                }
                            }
                        }
                    }
                    Err(e) if e.is_cancelled() => {
                        summary.cancelled = true;
                        break 'videos;
                    }
                    Err(e) => {
                        error!("Failed to extract clip {} for {}: {}", clip_index + 1, input.display(), e);
                        summary.errors += 1;
                    }
                }
            }
        }

        let status = if summary.cancelled { "cancelled" } else { "finished" };
        info!(
            "Clipping {} in {}. Videos: {}/{}, clips generated: {}, skipped: {}, errors: {}",
            status,
            Self::format_duration(start_time.elapsed()),
            summary.videos,
            video_count,
            summary.clips_generated,
            summary.skipped,
            summary.errors
        );
        progress.report(ProgressEvent::message(1.0, format!("Clipping {}", status)));
        Ok(summary)
    }

    /// Compose a narrated short and return where it ended up
    pub async fn run_short(
        &self,
        request: &ShortRequest,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        if !self.tools.available {
            return Err(anyhow!("Media tools are not available; run initialization first"));
        }
        FileManager::ensure_dir(&request.output_dir)?;

        progress.report(ProgressEvent::message(0.0, "Getting audio duration..."));
        let duration = self.probe_duration(&request.audio_path, cancel).await?;
        info!("Narration duration: {}", Self::format_duration(duration));

        progress.report(ProgressEvent::message(0.0, "Generating subtitles..."));
        let cue_file = tempfile::Builder::new()
            .prefix("autotube_sub_")
            .suffix(".srt")
            .tempfile()
            .context("Failed to create temporary subtitle file")?;
        self.generate_subtitles(
            &request.narration,
            duration,
            request.speech_marks_path.as_deref(),
            cue_file.path(),
        )?;

        let stem = request
            .background_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "background".to_string());
        let output_path = request.output_dir.join(format!(
            "AI_Short_{}_{}.mp4",
            stem,
            chrono::Local::now().format("%Y%m%d%H%M%S")
        ));

        let combine = CombineRequest {
            background_path: request.background_path.clone(),
            audio_path: request.audio_path.clone(),
            cues_path: cue_file.path().to_path_buf(),
            output_path: output_path.clone(),
        };
        Combiner::new(self.tools.clone())
            .combine(&combine, &self.config.style, progress, cancel)
            .await?;

        if !self.config.output.organize_output {
            return Ok(output_path);
        }
        progress.report(ProgressEvent::message(1.0, "Organizing output..."));
        match FileManager::organize_output_file(&output_path, &request.background_path, &request.output_dir, SHORTS_OUTPUT_TYPE) {
            Ok(path) => Ok(path),
            Err(e) => {
                warn!("Short created but could not be organized; it remains at {}: {}", output_path.display(), e);
                Ok(output_path)
            }
        }
    }

    // Format duration in a human-readable format
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}
