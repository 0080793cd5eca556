/*!
 * Progress events derived from the transcoder's stderr.
 *
 * The transcoder periodically prints `... time=HH:MM:SS.ff ...`; that elapsed
 * media time divided by the known total gives the completed fraction. An ETA
 * is extrapolated from wall-clock time once enough work has been observed.
 */

use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;

// @const: elapsed media time token
static TIME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"time=(\d{2,}):(\d{2}):(\d{2})\.(\d+)").unwrap()
});

/// Fraction that must be exceeded before an ETA is estimated
const ETA_MIN_FRACTION: f64 = 0.01;

/// Wall-clock time that must elapse before an ETA is estimated
const ETA_MIN_WALL: Duration = Duration::from_secs(1);

/// One progress report for a running operation
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// Completed fraction in [0, 1]
    pub fraction: f64,
    /// Media time reached by the tool
    pub current_media_time: Option<Duration>,
    /// Total media time of the operation
    pub total_media_time: Option<Duration>,
    /// Human-readable status
    pub message: String,
    /// Estimated time remaining
    pub eta: Option<Duration>,
    /// Index of the current item in a batch (0-based)
    pub item_index: Option<usize>,
    /// Number of items in the batch
    pub item_count: Option<usize>,
}

impl ProgressEvent {
    /// A status-only event at the given fraction
    pub fn message(fraction: f64, message: impl Into<String>) -> Self {
        Self {
            fraction: fraction.clamp(0.0, 1.0),
            current_media_time: None,
            total_media_time: None,
            message: message.into(),
            eta: None,
            item_index: None,
            item_count: None,
        }
    }

    /// Attach batch position information
    pub fn with_item(mut self, index: usize, count: usize) -> Self {
        self.item_index = Some(index);
        self.item_count = Some(count);
        self
    }
}

/// Receives progress events; implemented for any `Fn(ProgressEvent)` closure
pub trait ProgressReporter: Send + Sync {
    /// Deliver one event
    fn report(&self, event: ProgressEvent);
}

impl<F> ProgressReporter for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn report(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Converts stderr lines into `ProgressEvent`s for one operation
#[derive(Debug, Clone)]
pub struct ProgressParser {
    total: Duration,
    label: String,
    started: Instant,
    last_fraction: f64,
}

impl ProgressParser {
    /// Create a parser for an operation covering `total` media time
    pub fn new(total: Duration, label: impl Into<String>) -> Self {
        Self {
            total,
            label: label.into(),
            started: Instant::now(),
            last_fraction: 0.0,
        }
    }

    /// Parse a line using the wall-clock time since the parser was created
    pub fn parse_line(&mut self, line: &str) -> ProgressEvent {
        let wall = self.started.elapsed();
        self.parse_line_at(line, wall)
    }

    /// Parse a line given an explicit wall-clock elapsed time.
    ///
    /// Lines without a time token become status messages that keep the
    /// previous fraction.
    pub fn parse_line_at(&mut self, line: &str, wall_elapsed: Duration) -> ProgressEvent {
        let Some(elapsed) = parse_time_token(line) else {
            return ProgressEvent::message(self.last_fraction, line.trim());
        };

        let fraction = compute_fraction(elapsed, self.total);
        self.last_fraction = fraction;

        ProgressEvent {
            fraction,
            current_media_time: Some(elapsed),
            total_media_time: Some(self.total),
            message: format!("{}... {:.1}%", self.label, fraction * 100.0),
            eta: estimate_eta(fraction, wall_elapsed),
            item_index: None,
            item_count: None,
        }
    }
}

/// Extract the elapsed media time from a `time=HH:MM:SS.frac` token
pub fn parse_time_token(line: &str) -> Option<Duration> {
    let caps = TIME_REGEX.captures(line)?;
    let hours: u64 = caps.get(1)?.as_str().parse().ok()?;
    let minutes: u64 = caps.get(2)?.as_str().parse().ok()?;
    let seconds: u64 = caps.get(3)?.as_str().parse().ok()?;
    let frac = caps.get(4)?.as_str();
    let frac_value: f64 = format!("0.{}", frac).parse().ok()?;

    let whole = hours * 3600 + minutes * 60 + seconds;
    Some(Duration::from_secs(whole) + Duration::from_secs_f64(frac_value))
}

/// `clamp(elapsed / total, 0, 1)`, zero when the total is unknown
pub fn compute_fraction(elapsed: Duration, total: Duration) -> f64 {
    if total.is_zero() {
        return 0.0;
    }
    (elapsed.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0)
}

/// Linear extrapolation `wall * (1/fraction - 1)`, floored at zero
pub fn estimate_eta(fraction: f64, wall_elapsed: Duration) -> Option<Duration> {
    if fraction <= ETA_MIN_FRACTION || wall_elapsed <= ETA_MIN_WALL {
        return None;
    }
    let remaining = wall_elapsed.as_secs_f64() * (1.0 / fraction - 1.0);
    Some(Duration::from_secs_f64(remaining.max(0.0)))
}
