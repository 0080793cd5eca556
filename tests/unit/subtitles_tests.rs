/*!
 * Tests for cue files, speech marks and caption synthesis
 */

use anyhow::Result;
use std::time::Duration;

use autotube::subtitles::{
    parse_speech_marks, parse_srt_file, parse_srt_string, write_srt, Cue, SpeechMark, SpeechMarkKind,
    SubtitleSynthesizer, SynthesisOptions,
};
use crate::common;

#[test]
fn test_parse_srt_file_withSampleFile_shouldReadAllEntries() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_subtitle(temp_dir.path(), "sample.srt")?;

    let cues = parse_srt_file(&path)?;
    assert_eq!(cues.len(), 3);
    assert_eq!(cues[0].start(), Duration::from_secs(1));
    assert_eq!(cues[2].text(), "For testing purposes.");
    Ok(())
}

#[test]
fn test_parse_srt_string_withUnorderedEntries_shouldSortAndRenumber() -> Result<()> {
    let content = "7\n00:00:05,000 --> 00:00:06,000\nSecond\n\n3\n00:00:01,000 --> 00:00:02,000\nFirst\n";
    let cues = parse_srt_string(content)?;
    assert_eq!(cues.iter().map(|c| c.sequence).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(cues[0].text(), "First");
    Ok(())
}

#[test]
fn test_write_srt_withMultiLineCue_shouldRoundTripThroughFile() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("captions.srt");
    let cues = vec![
        Cue::new(1, 0, 1_250, vec!["First line".to_string(), "second line".to_string()]),
        Cue::new(2, 1_250, 3_000, vec!["Next".to_string()]),
    ];

    write_srt(&cues, &path)?;
    let content = std::fs::read_to_string(&path)?;
    assert!(content.starts_with("1\n00:00:00,000 --> 00:00:01,250\nFirst line\nsecond line\n\n"));
    assert_eq!(parse_srt_file(&path)?, cues);
    Ok(())
}

#[test]
fn test_parse_speech_marks_withArrayForm_shouldDropOtherKinds() -> Result<()> {
    let marks = parse_speech_marks(
        r#"[{"time":0,"type":"sentence","value":"Hi there."},
            {"time":10,"type":"viseme","value":"p"},
            {"time":20,"type":"word","value":"Hi"}]"#,
    )?;
    assert_eq!(marks, vec![SpeechMark::sentence(0, "Hi there."), SpeechMark::word(20, "Hi")]);
    assert!(marks.iter().all(|m| m.kind != SpeechMarkKind::Other));
    Ok(())
}

/// Estimated cues cover the narration without overlapping or exceeding the total
#[test]
fn test_synthesize_withoutMarks_shouldStayWithinTotal() -> Result<()> {
    let synthesizer = SubtitleSynthesizer::new(SynthesisOptions::default());
    let narration = "The quick brown fox jumps over the lazy dog. It was not amused. \
                     Neither was the farmer, who had seen this many times before.";
    let total = Duration::from_secs(8);

    let cues = synthesizer.synthesize(narration, total, None)?;
    assert!(!cues.is_empty());
    for pair in cues.windows(2) {
        assert!(pair[0].end_ms <= pair[1].start_ms);
    }
    for cue in &cues {
        assert!(cue.start_ms < cue.end_ms);
        assert!(cue.end() <= total);
        assert!(cue.lines.len() <= synthesizer.options().max_lines);
    }
    Ok(())
}

#[test]
fn test_synthesize_withBlankNarration_shouldFail() {
    let synthesizer = SubtitleSynthesizer::new(SynthesisOptions::default());
    assert!(synthesizer.synthesize("   ", Duration::from_secs(3), None).is_err());
}
