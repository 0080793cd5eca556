/*!
 * Timing annotations produced by a speech-synthesis provider.
 *
 * Marks arrive either as JSON lines (one object per line) or as a JSON array,
 * with objects shaped like `{"time": 370, "type": "word", "value": "Hello"}`.
 * Only word and sentence marks are kept.
 */

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Granularity of a speech mark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechMarkKind {
    Word,
    Sentence,
    /// Viseme, ssml and any other provider-specific kinds
    #[serde(other)]
    Other,
}

/// One timing annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechMark {
    /// Offset into the audio in milliseconds
    #[serde(rename = "time")]
    pub time_ms: u64,
    #[serde(rename = "type")]
    pub kind: SpeechMarkKind,
    /// Spoken text
    #[serde(rename = "value")]
    pub text: String,
}

impl SpeechMark {
    pub fn word(time_ms: u64, text: impl Into<String>) -> Self {
        Self { time_ms, kind: SpeechMarkKind::Word, text: text.into() }
    }

    pub fn sentence(time_ms: u64, text: impl Into<String>) -> Self {
        Self { time_ms, kind: SpeechMarkKind::Sentence, text: text.into() }
    }
}

/// Parse JSON-lines or JSON-array content, dropping unsupported kinds
pub fn parse_speech_marks(content: &str) -> Result<Vec<SpeechMark>> {
    let trimmed = content.trim_start_matches('\u{feff}').trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let marks: Vec<SpeechMark> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).context("Failed to parse speech marks array")?
    } else {
        trimmed
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str::<SpeechMark>(line.trim())
                    .with_context(|| format!("Invalid speech mark on line {}", i + 1))
            })
            .collect::<Result<_>>()?
    };

    let total = marks.len();
    let kept: Vec<SpeechMark> = marks
        .into_iter()
        .filter(|m| m.kind != SpeechMarkKind::Other)
        .collect();
    if kept.len() < total {
        debug!("Ignored {} speech marks of unsupported kinds", total - kept.len());
    }
    Ok(kept)
}

/// Load speech marks from a file
pub fn load_speech_marks<P: AsRef<Path>>(path: P) -> Result<Vec<SpeechMark>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read speech marks file: {}", path.display()))?;
    let marks = parse_speech_marks(&content)?;
    if marks.is_empty() {
        warn!("No usable speech marks in {}", path.display());
    }
    Ok(marks)
}
