/*!
 * # autotube - short-form video toolkit
 *
 * A Rust library that drives ffmpeg/ffprobe to cut short clips out of long
 * videos and to compose narrated vertical shorts with burned-in captions.
 *
 * ## Features
 *
 * - Locate and verify bundled or system ffmpeg/ffprobe
 * - Probe media duration
 * - Extract clips with stream copy, falling back to re-encoding when copy fails
 * - Detect scene changes and plan clips along them
 * - Build timed captions from narration text, optionally aligned to speech marks
 * - Combine a background video, narration audio and captions into a short
 * - Cancellation and progress reporting for every long-running operation
 *
 * ## Architecture
 *
 * - `media`: external tool plumbing:
 *   - `media::runner`: process execution, cancellation, stderr streaming
 *   - `media::locator`: tool discovery and verification
 *   - `media::probe`: duration probing
 *   - `media::clip`: clip extraction with copy/re-encode fallback
 *   - `media::scenes`: scene change detection
 *   - `media::combine`: short composition with styled captions
 *   - `media::progress`: progress parsing and reporting
 * - `subtitles`: cues, SRT files, speech marks and caption synthesis
 * - `clip_planner`: choosing clip segments
 * - `app_config`: configuration management
 * - `app_controller`: batch clipping and short workflows
 * - `file_utils`: file system operations and output organization
 * - `errors`: custom error types
 */

// Global lints configuration
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

pub mod app_config;
pub mod app_controller;
pub mod clip_planner;
pub mod errors;
pub mod file_utils;
pub mod media;
pub mod subtitles;

// Re-export main types for easier usage
pub use app_config::Config;
pub use app_controller::{ClippingSummary, Controller, ShortRequest};
pub use clip_planner::{ClipPlanner, PlannedClip};
pub use errors::MediaError;
pub use media::{CancellationToken, ProgressEvent, ProgressReporter, ToolPaths};
pub use subtitles::{Cue, SubtitleSynthesizer};
