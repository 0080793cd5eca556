/*!
 * Media-processing engine built on the external transcoder and prober.
 *
 * - `locator`: finds and verifies the two executables
 * - `runner`: subprocess lifecycle, stderr streaming, cancellation
 * - `progress`: stderr time tokens to progress/ETA events
 * - `probe`: duration queries
 * - `clip`: clip extraction with the copy-then-re-encode retry
 * - `scenes`: scene-change detection
 * - `combine`: looping background + narration + burned-in captions
 */

pub mod clip;
pub mod combine;
pub mod locator;
pub mod probe;
pub mod progress;
pub mod runner;
pub mod scenes;

pub use clip::{ClipExtractor, ClipRequest, EncodePlan};
pub use combine::{CombineRequest, Combiner, Rgba, SubtitleAlignment, SubtitleStyle};
pub use locator::{ExecutableLocator, ToolPaths};
pub use probe::MediaProber;
pub use progress::{ProgressEvent, ProgressParser, ProgressReporter};
pub use runner::{CancellationToken, ProcessOutput, ProcessRunner, RunOutcome};
pub use scenes::{SceneChange, SceneDetector};
