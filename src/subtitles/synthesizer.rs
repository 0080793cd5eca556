/*!
 * Narration text to timed caption cues.
 *
 * Timing sources in priority order: word marks, sentence marks, then a
 * words-per-minute estimate over sentence-like segments. Every path ends in
 * the same line wrapper. The result depends only on the inputs.
 */

use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::subtitles::cue::Cue;
use crate::subtitles::speech_marks::{SpeechMark, SpeechMarkKind};

/// Gap left before the next cue starts
pub const CUE_BUFFER_MS: u64 = 50;

/// Shortest cue the marked paths produce when there is room
pub const MIN_CUE_MS: u64 = 500;

/// Shortest estimated segment
pub const MIN_ESTIMATED_MS: u64 = 1_000;

/// Upper bound for the configurable line count
pub const MAX_LINES_LIMIT: usize = 3;

// @const: abbreviation endings that do not close a sentence ("e.g.", "Mr.")
static ABBREVIATION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\w\.\w.|[A-Z][a-z]\.)$").unwrap()
});

/// Pacing and layout settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisOptions {
    /// Speaking rate for the estimation fallback
    pub words_per_minute: u32,
    /// Line width in characters
    pub max_chars_per_line: usize,
    /// Lines per cue; overflow words are dropped
    pub max_lines: usize,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            words_per_minute: 150,
            max_chars_per_line: 42,
            max_lines: 3,
        }
    }
}

impl SynthesisOptions {
    pub fn validate(&self) -> Result<()> {
        if self.words_per_minute == 0 {
            return Err(anyhow!("Words per minute must be positive"));
        }
        if self.max_chars_per_line == 0 {
            return Err(anyhow!("Max chars per line must be positive"));
        }
        if !(1..=MAX_LINES_LIMIT).contains(&self.max_lines) {
            return Err(anyhow!(
                "Max lines must be between 1 and {}, got {}",
                MAX_LINES_LIMIT,
                self.max_lines
            ));
        }
        Ok(())
    }
}

// Text that starts at a known time; its end is derived from its neighbours
#[derive(Debug, Clone)]
struct MarkedSegment {
    start_ms: u64,
    text: String,
}

/// Builds caption cues from narration
#[derive(Debug, Clone, Default)]
pub struct SubtitleSynthesizer {
    options: SynthesisOptions,
}

impl SubtitleSynthesizer {
    pub fn new(options: SynthesisOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SynthesisOptions {
        &self.options
    }

    /// Produce contiguous, non-overlapping cues covering at most `total`.
    ///
    /// Fails only on invalid input: bad options, a zero total, or no text at
    /// all (neither narration nor usable marks).
    pub fn synthesize(&self, narration: &str, total: Duration, marks: Option<&[SpeechMark]>) -> Result<Vec<Cue>> {
        self.options.validate()?;
        let total_ms = u64::try_from(total.as_millis()).unwrap_or(u64::MAX);
        if total_ms == 0 {
            return Err(anyhow!("Total duration must be positive"));
        }

        let marks = marks.unwrap_or_default();
        let words = marks_of_kind(marks, SpeechMarkKind::Word);
        let sentences = marks_of_kind(marks, SpeechMarkKind::Sentence);

        if !words.is_empty() {
            info!("Timing {} words from word marks", words.len());
            let timed = assemble_marked(self.group_words(&words), total_ms);
            if !timed.is_empty() {
                return Ok(self.build_cues(timed));
            }
            warn!("Word marks produced no usable cues");
        }

        if !sentences.is_empty() {
            info!("Timing {} sentences from sentence marks", sentences.len());
            let segments = sentences
                .iter()
                .map(|m| MarkedSegment { start_ms: m.time_ms, text: m.text.trim().to_string() })
                .collect();
            let timed = assemble_marked(segments, total_ms);
            if !timed.is_empty() {
                return Ok(self.build_cues(timed));
            }
            warn!("Sentence marks produced no usable cues");
        }

        if narration.trim().is_empty() {
            return Err(anyhow!("Narration text cannot be empty"));
        }
        info!("Estimating caption timing at {} words per minute", self.options.words_per_minute);
        Ok(self.build_cues(self.estimate(narration, total_ms)))
    }

    // Greedy packing of word marks into one line per segment
    fn group_words(&self, words: &[&SpeechMark]) -> Vec<MarkedSegment> {
        let max = self.options.max_chars_per_line;
        let mut segments: Vec<MarkedSegment> = Vec::new();
        let mut current: Option<(MarkedSegment, usize)> = None;

        for mark in words {
            let word = mark.text.trim();
            let word_len = word.chars().count();
            current = match current.take() {
                Some((mut segment, len)) if len + 1 + word_len <= max => {
                    segment.text.push(' ');
                    segment.text.push_str(word);
                    Some((segment, len + 1 + word_len))
                }
                previous => {
                    if let Some((segment, _)) = previous {
                        segments.push(segment);
                    }
                    Some((MarkedSegment { start_ms: mark.time_ms, text: word.to_string() }, word_len))
                }
            };
        }
        if let Some((segment, _)) = current {
            segments.push(segment);
        }
        segments
    }

    fn estimate(&self, narration: &str, total_ms: u64) -> Vec<(u64, u64, String)> {
        let ms_per_word = 60_000.0 / f64::from(self.options.words_per_minute);
        let segments = split_sentences(narration);
        debug!("Split narration into {} segments for estimation", segments.len());

        let mut timed: Vec<(u64, u64, String)> = Vec::new();
        let mut current = 0u64;

        for segment in segments {
            let remaining = total_ms.saturating_sub(current);
            if remaining == 0 {
                // Out of time: keep the words on the last cue
                match timed.last_mut() {
                    Some(last) => {
                        last.2.push(' ');
                        last.2.push_str(&segment);
                    }
                    None => break,
                }
                continue;
            }

            let word_count = segment.split_whitespace().count() as f64;
            let estimated = ((word_count * ms_per_word).round() as u64).max(MIN_ESTIMATED_MS);
            let cap = remaining.saturating_sub(100).max(100);
            let end = (current + estimated.min(cap)).min(total_ms);

            timed.push((current, end, segment));
            current = end;
        }
        timed
    }

    fn build_cues(&self, timed: Vec<(u64, u64, String)>) -> Vec<Cue> {
        timed
            .into_iter()
            .filter_map(|(start, end, text)| {
                let lines = wrap_lines(&text, self.options.max_chars_per_line, self.options.max_lines);
                (!lines.is_empty()).then_some((start, end, lines))
            })
            .enumerate()
            .map(|(i, (start, end, lines))| Cue::new(i + 1, start, end, lines))
            .collect()
    }
}

fn marks_of_kind(marks: &[SpeechMark], kind: SpeechMarkKind) -> Vec<&SpeechMark> {
    let mut selected: Vec<&SpeechMark> = marks
        .iter()
        .filter(|m| m.kind == kind && !m.text.trim().is_empty())
        .collect();
    selected.sort_by_key(|m| m.time_ms);
    selected
}

/// End times for marked segments.
///
/// Each segment ends `CUE_BUFFER_MS` before the next one starts (the last at
/// `total_ms`), is stretched towards `MIN_CUE_MS` without reaching into the
/// next segment, and is clamped to `total_ms`. A segment left with no length
/// hands its start and text to the next segment, or its text to the previous
/// one when it is last.
fn assemble_marked(segments: Vec<MarkedSegment>, total_ms: u64) -> Vec<(u64, u64, String)> {
    let starts: Vec<u64> = segments.iter().map(|s| s.start_ms).collect();
    let mut timed: Vec<(u64, u64, String)> = Vec::new();
    let mut carry: Option<(u64, String)> = None;

    for (i, segment) in segments.into_iter().enumerate() {
        let (start, text) = match carry.take() {
            Some((start, carried)) => (start, format!("{} {}", carried, segment.text)),
            None => (segment.start_ms, segment.text),
        };
        let next_start = starts.get(i + 1).copied();
        let limit = next_start.map_or(total_ms, |next| next.min(total_ms));

        let mut end = match next_start {
            Some(_) => limit.saturating_sub(CUE_BUFFER_MS),
            None => total_ms,
        };
        if end < start + MIN_CUE_MS {
            end = (start + MIN_CUE_MS).min(limit);
        }
        end = end.min(total_ms);

        if end > start {
            timed.push((start, end, text));
        } else if next_start.is_some() {
            carry = Some((start, text));
        } else if let Some(last) = timed.last_mut() {
            last.2.push(' ');
            last.2.push_str(&text);
        } else {
            debug!("Dropping caption text with no room before the end: {}", text);
        }
    }
    timed
}

/// Greedy word wrap to `max_chars` per line, keeping at most `max_lines`.
///
/// Words are never split; a single word longer than the limit gets its own line.
pub fn wrap_lines(text: &str, max_chars: usize, max_lines: usize) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if current.is_empty() {
            current.push_str(word);
            current_len = word_len;
        } else if current_len + 1 + word_len <= max_chars {
            current.push(' ');
            current.push_str(word);
            current_len += 1 + word_len;
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
            current_len = word_len;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }

    lines.truncate(max_lines);
    lines
}

/// Split narration after `.`, `?` or `!` followed by whitespace, except after
/// abbreviations like "e.g." or "Mr.". Returns trimmed, non-empty segments.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut segment_start = 0usize;
    let mut previous: Option<char> = None;

    for (i, c) in text.char_indices() {
        if c.is_whitespace() && matches!(previous, Some('.' | '?' | '!')) {
            let prefix = &text[..i];
            let tail_start = prefix.char_indices().rev().nth(3).map_or(0, |(idx, _)| idx);
            if !ABBREVIATION_REGEX.is_match(&prefix[tail_start..]) {
                segments.push(text[segment_start..i].trim().to_string());
                segment_start = i;
            }
        }
        previous = Some(c);
    }
    segments.push(text[segment_start..].trim().to_string());

    segments.retain(|s| !s.is_empty());
    segments
}
