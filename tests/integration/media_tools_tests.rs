/*!
 * Integration tests for the media engine against fake ffmpeg/ffprobe scripts
 */

#![cfg(unix)]

use anyhow::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use autotube::errors::MediaError;
use autotube::media::locator::{platform_bin, verify_executable};
use autotube::media::{
    CancellationToken, ClipExtractor, ClipRequest, CombineRequest, Combiner, ExecutableLocator, MediaProber,
    ProgressEvent, SceneDetector, SubtitleStyle, ToolPaths,
};
use crate::common::{self, fake_tools, write_script};

fn silent(_event: ProgressEvent) {}

#[tokio::test]
async fn test_locate_withBundledTools_shouldVerifyAndBeIdempotent() -> Result<()> {
    common::init_logging();
    let fakes = fake_tools(common::TRANSCODER_SUCCESS, "10.0")?;
    let locator = ExecutableLocator::new()
        .with_bin_dir(fakes.dir.path())
        .with_search_path("");

    let first = locator.locate().await;
    assert!(first.available);
    assert_eq!(first.transcoder_path, Some(fakes.dir.path().join(platform_bin("ffmpeg"))));
    assert_eq!(first.prober_path, Some(fakes.dir.path().join(platform_bin("ffprobe"))));
    assert_eq!(locator.locate().await, first);
    Ok(())
}

#[tokio::test]
async fn test_locate_withToolsOnSearchPath_shouldFindThem() -> Result<()> {
    let fakes = fake_tools(common::TRANSCODER_SUCCESS, "10.0")?;
    let empty_bin = common::create_temp_dir()?;
    let tools = ExecutableLocator::new()
        .with_bin_dir(empty_bin.path())
        .with_search_path(fakes.dir.path().as_os_str())
        .locate()
        .await;
    assert!(tools.available);
    assert_eq!(tools.transcoder_path, Some(fakes.dir.path().join("ffmpeg")));
    Ok(())
}

#[tokio::test]
async fn test_locate_withFailingVersionProbe_shouldBeUnavailable() -> Result<()> {
    let dir = common::create_temp_dir()?;
    write_script(dir.path(), "ffmpeg", "#!/bin/sh\necho 'ffmpeg version 6.1'\nexit 1\n")?;
    write_script(dir.path(), "ffprobe", "#!/bin/sh\necho 'ffprobe version 6.1'\n")?;

    let tools = ExecutableLocator::new()
        .with_bin_dir(dir.path())
        .with_search_path("")
        .locate()
        .await;
    assert!(!tools.available);
    assert_eq!(tools.transcoder_path, None);
    assert!(matches!(tools.require_transcoder(), Err(MediaError::Unavailable(_))));
    Ok(())
}

#[tokio::test]
async fn test_verifyExecutable_withoutVersionText_shouldFail() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let binary = write_script(dir.path(), "ffmpeg", "#!/bin/sh\necho 'hello'\n")?;
    let result = verify_executable(&binary, Duration::from_secs(5)).await;
    assert!(matches!(result, Err(MediaError::ToolFailure { .. })));
    Ok(())
}

#[tokio::test]
async fn test_verifyExecutable_withHangingBinary_shouldTimeOut() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let binary = write_script(dir.path(), "ffprobe", "#!/bin/sh\nexec sleep 30\n")?;
    let started = std::time::Instant::now();
    let result = verify_executable(&binary, Duration::from_millis(300)).await;
    assert!(matches!(result, Err(MediaError::Timeout { .. })));
    assert!(started.elapsed() < Duration::from_secs(10));
    Ok(())
}

#[tokio::test]
async fn test_duration_withFakeProber_shouldParseSeconds() -> Result<()> {
    let fakes = fake_tools(common::TRANSCODER_SUCCESS, "83.520000")?;
    let media = common::create_test_file(fakes.dir.path(), "in.mp4", "")?;
    let prober = MediaProber::new(fakes.paths.clone());

    let duration = prober.duration(&media, &CancellationToken::new()).await?;
    assert_eq!(duration, Duration::from_millis(83_520));

    let missing = prober.duration(&fakes.dir.path().join("missing.mp4"), &CancellationToken::new()).await;
    assert!(matches!(missing, Err(MediaError::InvalidInput(_))));
    Ok(())
}

#[tokio::test]
async fn test_duration_withUnusableOutput_shouldReturnProbeError() -> Result<()> {
    let fakes = fake_tools(common::TRANSCODER_SUCCESS, "N/A")?;
    let media = common::create_test_file(fakes.dir.path(), "in.mp4", "")?;
    let result = MediaProber::new(fakes.paths.clone())
        .duration(&media, &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(MediaError::Probe(_))));
    Ok(())
}

#[tokio::test]
async fn test_extract_withPlainTrim_shouldWriteOutputAndReportProgress() -> Result<()> {
    common::init_logging();
    let fakes = fake_tools(common::TRANSCODER_SUCCESS, "60.0")?;
    let input = common::create_test_file(fakes.dir.path(), "in.mp4", "")?;
    let output = fakes.dir.path().join("out").join("clip.mp4");
    let request = ClipRequest::new(&input, &output, Duration::from_secs(5), Duration::from_secs(2));

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let progress = move |event: ProgressEvent| sink.lock().unwrap().push(event);
    ClipExtractor::new(fakes.paths.clone())
        .extract(&request, &progress, &CancellationToken::new())
        .await?;

    assert!(output.is_file());
    let invocations = fakes.invocations();
    assert_eq!(invocations.len(), 1);
    assert!(invocations[0].contains("-ss 5.000"));
    assert!(invocations[0].contains("-c:v copy"));

    let events = events.lock().unwrap();
    assert!(events.iter().any(|e| (e.fraction - 0.5).abs() < 1e-6));
    assert_eq!(events.last().map(|e| e.fraction), Some(1.0));
    Ok(())
}

/// A stream-copy rejection is retried once with a re-encode
#[tokio::test]
async fn test_extract_withCopyUnsupported_shouldRetryWithReencode() -> Result<()> {
    let fakes = fake_tools(common::TRANSCODER_REJECTS_COPY, "60.0")?;
    let input = common::create_test_file(fakes.dir.path(), "in.mp4", "")?;
    let output = fakes.dir.path().join("clip.mp4");
    let request = ClipRequest::new(&input, &output, Duration::ZERO, Duration::from_secs(3));

    ClipExtractor::new(fakes.paths.clone())
        .extract(&request, &silent, &CancellationToken::new())
        .await?;

    let invocations = fakes.invocations();
    assert_eq!(invocations.len(), 2);
    assert!(invocations[0].contains("-c:v copy"));
    assert!(invocations[1].contains("-c:v libx264"));
    assert!(output.is_file());
    Ok(())
}

/// When re-encoding is already planned there is nothing to fall back to
#[tokio::test]
async fn test_extract_withFailingReencode_shouldNotRetry() -> Result<()> {
    let body = "echo 'codec copy unsupported' >&2\nexit 1";
    let fakes = fake_tools(body, "60.0")?;
    let input = common::create_test_file(fakes.dir.path(), "in.mp4", "")?;
    let output = fakes.dir.path().join("clip.mp4");
    let mut request = ClipRequest::new(&input, &output, Duration::ZERO, Duration::from_secs(3));
    request.mirror = true;

    let result = ClipExtractor::new(fakes.paths.clone())
        .extract(&request, &silent, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(MediaError::ToolFailure { exit_code: Some(1), .. })));
    assert_eq!(fakes.invocations().len(), 1);
    assert!(!output.exists());
    Ok(())
}

#[tokio::test]
async fn test_extract_withCancellation_shouldRemovePartialOutput() -> Result<()> {
    let fakes = fake_tools(common::TRANSCODER_HANGS, "60.0")?;
    let input = common::create_test_file(fakes.dir.path(), "in.mp4", "")?;
    let output = fakes.dir.path().join("clip.mp4");
    let request = ClipRequest::new(&input, &output, Duration::ZERO, Duration::from_secs(3));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let result = ClipExtractor::new(fakes.paths.clone())
        .extract(&request, &silent, &cancel)
        .await;

    assert!(matches!(result, Err(MediaError::Cancelled)));
    assert!(!output.exists());
    assert!(started.elapsed() < Duration::from_secs(10));
    Ok(())
}

/// A failed re-encode after a copy rejection is terminal
#[tokio::test]
async fn test_extract_withRetryAlsoFailing_shouldStopAfterTwoAttempts() -> Result<()> {
    let fakes = fake_tools(common::TRANSCODER_ALWAYS_FAILS, "60.0")?;
    let input = common::create_test_file(fakes.dir.path(), "in.mp4", "")?;
    let output = fakes.dir.path().join("clip.mp4");
    let request = ClipRequest::new(&input, &output, Duration::ZERO, Duration::from_secs(3));

    let result = ClipExtractor::new(fakes.paths.clone())
        .extract(&request, &silent, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(MediaError::ToolFailure { exit_code: Some(1), .. })));
    let invocations = fakes.invocations();
    assert_eq!(invocations.len(), 2);
    assert!(invocations[0].contains("-c:v copy"));
    assert!(invocations[1].contains("-c:v libx264"));
    assert!(!output.exists());
    Ok(())
}

#[tokio::test]
async fn test_extract_withCancellation_shouldKillBackgroundChildren() -> Result<()> {
    let fakes = fake_tools(common::TRANSCODER_SPAWNS_CHILD_THEN_HANGS, "60.0")?;
    let input = common::create_test_file(fakes.dir.path(), "in.mp4", "")?;
    let output = fakes.dir.path().join("clip.mp4");
    let marker = fakes.dir.path().join("grandchild.marker");
    let request = ClipRequest::new(&input, &output, Duration::ZERO, Duration::from_secs(3));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let result = ClipExtractor::new(fakes.paths.clone())
        .extract(&request, &silent, &cancel)
        .await;
    assert!(matches!(result, Err(MediaError::Cancelled)));

    // the background child would have written the marker by now
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!marker.exists());
    Ok(())
}

#[tokio::test]
async fn test_extract_withMissingBinary_shouldReportSpawnError() -> Result<()> {
    let fakes = fake_tools(common::TRANSCODER_SUCCESS, "60.0")?;
    let input = common::create_test_file(fakes.dir.path(), "in.mp4", "")?;
    let output = fakes.dir.path().join("clip.mp4");
    let request = ClipRequest::new(&input, &output, Duration::ZERO, Duration::from_secs(3));

    let prober = fakes.paths.prober_path.clone().unwrap();
    let missing = ToolPaths::new(fakes.dir.path().join("no-such-ffmpeg"), prober.clone());
    let result = ClipExtractor::new(missing)
        .extract(&request, &silent, &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(MediaError::Spawn { .. })));

    // present but not executable
    let plain = common::create_test_file(fakes.dir.path(), "plain-ffmpeg", "#!/bin/sh\nexit 0\n")?;
    let result = ClipExtractor::new(ToolPaths::new(plain, prober))
        .extract(&request, &silent, &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(MediaError::Spawn { .. })));
    assert!(fakes.invocations().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_extract_withMissingInput_shouldNotSpawn() -> Result<()> {
    let fakes = fake_tools(common::TRANSCODER_SUCCESS, "60.0")?;
    let request = ClipRequest::new(
        fakes.dir.path().join("missing.mp4"),
        fakes.dir.path().join("clip.mp4"),
        Duration::ZERO,
        Duration::from_secs(3),
    );
    let result = ClipExtractor::new(fakes.paths.clone())
        .extract(&request, &silent, &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(MediaError::InvalidInput(_))));
    assert!(fakes.invocations().is_empty());
    Ok(())
}

/// Three reported changes plus the implicit start, kept despite the non-zero exit
#[tokio::test]
async fn test_detect_withPartialResults_shouldReturnFourEntries() -> Result<()> {
    let fakes = fake_tools(common::TRANSCODER_SCENES_THEN_FAIL, "60.0")?;
    let input = common::create_test_file(fakes.dir.path(), "in.mp4", "")?;

    let scenes = SceneDetector::new(fakes.paths.clone())
        .detect(&input, 0.3, &CancellationToken::new())
        .await?;
    let times: Vec<f64> = scenes.iter().map(|s| s.timestamp_seconds).collect();
    assert_eq!(times, vec![0.0, 10.0, 30.0, 55.0]);
    assert_eq!(scenes[2].score, Some(0.7));

    let strict = SceneDetector::new(fakes.paths.clone())
        .with_partial_results(false)
        .detect(&input, 0.3, &CancellationToken::new())
        .await;
    assert!(matches!(strict, Err(MediaError::ToolFailure { .. })));
    Ok(())
}

#[tokio::test]
async fn test_detect_withInvalidThreshold_shouldFail() -> Result<()> {
    let fakes = fake_tools(common::TRANSCODER_SCENES_THEN_FAIL, "60.0")?;
    let input = common::create_test_file(fakes.dir.path(), "in.mp4", "")?;
    let result = SceneDetector::new(fakes.paths.clone())
        .detect(&input, 0.0, &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(MediaError::InvalidInput(_))));
    Ok(())
}

#[tokio::test]
async fn test_combine_withStyledCaptions_shouldPassFilterGraph() -> Result<()> {
    let fakes = fake_tools(common::TRANSCODER_SUCCESS, "12.0")?;
    let background = common::create_test_file(fakes.dir.path(), "bg.mp4", "")?;
    let audio = common::create_test_file(fakes.dir.path(), "voice.mp3", "")?;
    let cues = common::create_test_subtitle(fakes.dir.path(), "captions.srt")?;
    let output = fakes.dir.path().join("short.mp4");

    let mut style = SubtitleStyle::default();
    style.blur_background = true;
    style.background_box = true;

    let request = CombineRequest {
        background_path: background,
        audio_path: audio,
        cues_path: cues,
        output_path: output.clone(),
    };
    Combiner::new(fakes.paths.clone())
        .combine(&request, &style, &silent, &CancellationToken::new())
        .await?;

    assert!(output.is_file());
    let invocations = fakes.invocations();
    assert_eq!(invocations.len(), 1);
    assert!(invocations[0].contains("-stream_loop -1"));
    assert!(invocations[0].contains("boxblur=10:2"));
    assert!(invocations[0].contains("BorderStyle=3"));
    assert!(invocations[0].contains("-t 12.000"));
    Ok(())
}

fn combine_request(fakes: &common::FakeTools) -> Result<CombineRequest> {
    Ok(CombineRequest {
        background_path: common::create_test_file(fakes.dir.path(), "bg.mp4", "")?,
        audio_path: common::create_test_file(fakes.dir.path(), "voice.mp3", "")?,
        cues_path: common::create_test_subtitle(fakes.dir.path(), "captions.srt")?,
        output_path: fakes.dir.path().join("short.mp4"),
    })
}

#[tokio::test]
async fn test_combine_withFailingTranscoder_shouldRemovePartialOutput() -> Result<()> {
    let fakes = fake_tools(common::TRANSCODER_ALWAYS_FAILS, "12.0")?;
    let request = combine_request(&fakes)?;

    let result = Combiner::new(fakes.paths.clone())
        .combine(&request, &SubtitleStyle::default(), &silent, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(MediaError::ToolFailure { exit_code: Some(1), .. })));
    assert_eq!(fakes.invocations().len(), 1);
    assert!(!request.output_path.exists());
    Ok(())
}

#[tokio::test]
async fn test_combine_withCancellation_shouldRemovePartialOutput() -> Result<()> {
    let fakes = fake_tools(common::TRANSCODER_HANGS, "12.0")?;
    let request = combine_request(&fakes)?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let result = Combiner::new(fakes.paths.clone())
        .combine(&request, &SubtitleStyle::default(), &silent, &cancel)
        .await;

    assert!(matches!(result, Err(MediaError::Cancelled)));
    assert!(!request.output_path.exists());
    Ok(())
}
