use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;

// @module: Caption cues and SRT file I/O

// @const: SRT timestamp regex
static TIMESTAMP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{2,}):(\d{2}):(\d{2}),(\d{3})\s*-->\s*(\d{2,}):(\d{2}):(\d{2}),(\d{3})").unwrap()
});

// @struct: Single timed caption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    // @field: 1-based sequence number
    pub sequence: usize,

    // @field: Start time in ms
    pub start_ms: u64,

    // @field: End time in ms
    pub end_ms: u64,

    // @field: Display lines, top to bottom
    pub lines: Vec<String>,
}

impl Cue {
    /// Creates a new cue
    pub fn new(sequence: usize, start_ms: u64, end_ms: u64, lines: Vec<String>) -> Self {
        Cue {
            sequence,
            start_ms,
            end_ms,
            lines,
        }
    }

    // @creates: Validated cue
    // @validates: Time range and non-empty text
    pub fn new_validated(sequence: usize, start_ms: u64, end_ms: u64, lines: Vec<String>) -> Result<Self> {
        if end_ms <= start_ms {
            return Err(anyhow!(
                "Invalid time range: end time {} <= start time {}",
                end_ms, start_ms
            ));
        }

        let lines: Vec<String> = lines
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        if lines.is_empty() {
            return Err(anyhow!("Empty caption text for cue {}", sequence));
        }

        Ok(Cue {
            sequence,
            start_ms,
            end_ms,
            lines,
        })
    }

    /// Start as a duration
    pub fn start(&self) -> Duration {
        Duration::from_millis(self.start_ms)
    }

    /// End as a duration
    pub fn end(&self) -> Duration {
        Duration::from_millis(self.end_ms)
    }

    /// All lines joined with spaces
    pub fn text(&self) -> String {
        self.lines.join(" ")
    }

    /// Format a timestamp in milliseconds to SRT format (HH:MM:SS,mmm)
    pub fn format_timestamp(ms: u64) -> String {
        let hours = ms / 3_600_000;
        let minutes = (ms % 3_600_000) / 60_000;
        let seconds = (ms % 60_000) / 1_000;
        let millis = ms % 1_000;

        format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
    }
}

impl fmt::Display for Cue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.sequence)?;
        writeln!(
            f,
            "{} --> {}",
            Self::format_timestamp(self.start_ms),
            Self::format_timestamp(self.end_ms)
        )?;
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        writeln!(f)
    }
}

/// Render cues as SRT text
pub fn to_srt_string(cues: &[Cue]) -> String {
    cues.iter().map(|cue| cue.to_string()).collect()
}

/// Write cues to an SRT file, creating the parent directory
pub fn write_srt<P: AsRef<Path>>(cues: &[Cue], path: P) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }

    let mut file = File::create(path)
        .with_context(|| format!("Failed to create subtitle file: {}", path.display()))?;
    for cue in cues {
        write!(file, "{}", cue)?;
    }
    file.flush()?;

    debug!("Wrote {} cues to {}", cues.len(), path.display());
    Ok(())
}

/// Read and parse an SRT file
pub fn parse_srt_file<P: AsRef<Path>>(path: P) -> Result<Vec<Cue>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read subtitle file: {}", path.display()))?;
    parse_srt_string(&content)
}

/// Parse SRT content, sorting by start time and renumbering contiguously.
///
/// Malformed entries are skipped with a warning; content without a single
/// valid entry is an error.
pub fn parse_srt_string(content: &str) -> Result<Vec<Cue>> {
    let mut cues = Vec::new();

    let mut current_seq: Option<usize> = None;
    let mut current_times: Option<(u64, u64)> = None;
    let mut current_lines: Vec<String> = Vec::new();

    let mut flush = |seq: usize, (start, end): (u64, u64), lines: &mut Vec<String>| {
        match Cue::new_validated(seq, start, end, std::mem::take(lines)) {
            Ok(cue) => cues.push(cue),
            Err(e) => warn!("Skipping invalid cue {}: {}", seq, e),
        }
    };

    for (line_no, line) in content.lines().enumerate() {
        let trimmed = line.trim().trim_start_matches('\u{feff}');

        if trimmed.is_empty() {
            if let (Some(seq), Some(times)) = (current_seq, current_times) {
                flush(seq, times, &mut current_lines);
                current_seq = None;
                current_times = None;
            }
            continue;
        }

        if current_seq.is_none() {
            match trimmed.parse::<usize>() {
                Ok(num) => current_seq = Some(num),
                Err(_) => warn!("Unexpected text at line {} before sequence number: {}", line_no + 1, trimmed),
            }
            continue;
        }

        if current_times.is_none() {
            let times = TIMESTAMP_REGEX
                .captures(trimmed)
                .ok_or_else(|| anyhow!("no timestamp range"))
                .and_then(|caps| Ok((timestamp_to_ms(&caps, 1)?, timestamp_to_ms(&caps, 5)?)));
            match times {
                Ok(times) => current_times = Some(times),
                Err(e) => {
                    warn!("Invalid timestamp line {} ({}): {}", line_no + 1, e, trimmed);
                    current_seq = None;
                }
            }
            continue;
        }

        current_lines.push(trimmed.to_string());
    }

    if let (Some(seq), Some(times)) = (current_seq, current_times) {
        flush(seq, times, &mut current_lines);
    }

    if cues.is_empty() {
        return Err(anyhow!("No valid subtitle entries were found in the SRT content"));
    }

    cues.sort_by_key(|cue| cue.start_ms);
    for (i, cue) in cues.iter_mut().enumerate() {
        cue.sequence = i + 1;
    }

    Ok(cues)
}

fn timestamp_to_ms(caps: &regex::Captures, start_idx: usize) -> Result<u64> {
    let part = |i: usize| -> Result<u64> {
        caps.get(start_idx + i)
            .ok_or_else(|| anyhow!("Missing timestamp component"))?
            .as_str()
            .parse::<u64>()
            .context("Failed to parse timestamp component")
    };
    let (hours, minutes, seconds, millis) = (part(0)?, part(1)?, part(2)?, part(3)?);
    if minutes >= 60 || seconds >= 60 {
        return Err(anyhow!("Invalid time components in timestamp"));
    }
    Ok(hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + millis)
}
