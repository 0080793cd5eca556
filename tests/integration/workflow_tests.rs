/*!
 * End-to-end controller workflows against fake ffmpeg/ffprobe scripts
 */

#![cfg(unix)]

use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use autotube::app_config::Config;
use autotube::app_controller::{Controller, ShortRequest, SHORTS_OUTPUT_TYPE};
use autotube::media::{CancellationToken, ProgressEvent};
use crate::common::{self, fake_tools};

fn files_under(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().strip_prefix(dir).unwrap().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Scenes 10-30 and 30-55 fit the 15-45s bounds; 0-10 is too short
#[tokio::test]
async fn test_run_clipping_withSceneDetection_shouldOrganizeClipsPerSource() -> Result<()> {
    common::init_logging();
    let fakes = fake_tools(common::TRANSCODER_SCENES_THEN_FAIL, "60.0")?;
    let input = common::create_test_file(fakes.dir.path(), "videos/holiday.mp4", "")?;
    let output_dir = fakes.dir.path().join("out");

    let controller = Controller::with_tools(Config::default(), fakes.paths.clone());
    let events = Arc::new(Mutex::new(Vec::<f64>::new()));
    let sink = Arc::clone(&events);
    let progress = move |event: ProgressEvent| sink.lock().unwrap().push(event.fraction);

    let summary = controller
        .run_clipping_with_rng(
            &[input],
            &output_dir,
            &progress,
            &CancellationToken::new(),
            &mut StdRng::seed_from_u64(5),
        )
        .await?;

    assert_eq!(summary.videos, 1);
    assert_eq!(summary.clips_generated, 2);
    assert_eq!(summary.errors, 0);
    assert!(!summary.cancelled);
    assert_eq!(
        files_under(&output_dir),
        vec!["holiday/clips/holiday_clip_1.mp4", "holiday/clips/holiday_clip_2.mp4"]
    );

    let events = events.lock().unwrap();
    assert!(events.windows(2).all(|w| w[1] >= w[0] - 1e-9));
    assert_eq!(events.last().copied(), Some(1.0));
    Ok(())
}

#[tokio::test]
async fn test_run_clipping_withShortVideo_shouldSkipIt() -> Result<()> {
    let fakes = fake_tools(common::TRANSCODER_SUCCESS, "9.5")?;
    let input = common::create_test_file(fakes.dir.path(), "tiny.mp4", "")?;
    let output_dir = fakes.dir.path().join("out");

    let controller = Controller::with_tools(Config::default(), fakes.paths.clone());
    let summary = controller
        .run_clipping(&[input], &output_dir, &|_e: ProgressEvent| {}, &CancellationToken::new())
        .await?;

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.clips_generated, 0);
    assert!(fakes.invocations().is_empty());
    Ok(())
}

/// Random planning without organizing leaves clips flat in the output directory
#[tokio::test]
async fn test_run_clipping_withRandomPlanning_shouldWriteRequestedCount() -> Result<()> {
    let fakes = fake_tools(common::TRANSCODER_SUCCESS, "120.0")?;
    let input = common::create_test_file(fakes.dir.path(), "long.mkv", "")?;
    let output_dir = fakes.dir.path().join("out");

    let mut config = Config::default();
    config.clipping.clip_count = 3;
    config.clipping.use_scene_detection = false;
    config.clipping.vertical = true;
    config.output.organize_output = false;
    let controller = Controller::with_tools(config, fakes.paths.clone());

    let summary = controller
        .run_clipping_with_rng(
            &[input],
            &output_dir,
            &|_e: ProgressEvent| {},
            &CancellationToken::new(),
            &mut StdRng::seed_from_u64(11),
        )
        .await?;

    assert_eq!(summary.clips_generated, 3);
    assert_eq!(
        files_under(&output_dir),
        vec!["long_clip_1.mp4", "long_clip_2.mp4", "long_clip_3.mp4"]
    );
    let invocations = fakes.invocations();
    assert_eq!(invocations.len(), 3);
    assert!(invocations.iter().all(|args| args.contains("scale=1080:1920") && args.contains("libx264")));
    Ok(())
}

#[tokio::test]
async fn test_run_clipping_withCancelledToken_shouldStopBeforeWork() -> Result<()> {
    let fakes = fake_tools(common::TRANSCODER_SUCCESS, "120.0")?;
    let input = common::create_test_file(fakes.dir.path(), "long.mkv", "")?;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let controller = Controller::with_tools(Config::default(), fakes.paths.clone());
    let summary = controller
        .run_clipping(&[input], &fakes.dir.path().join("out"), &|_e: ProgressEvent| {}, &cancel)
        .await?;

    assert!(summary.cancelled);
    assert_eq!(summary.clips_generated, 0);
    assert!(fakes.invocations().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_run_short_withFakeTools_shouldOrganizeUnderShortFolder() -> Result<()> {
    common::init_logging();
    let fakes = fake_tools(common::TRANSCODER_SUCCESS, "6.0")?;
    let background = common::create_test_file(fakes.dir.path(), "gameplay.mp4", "")?;
    let audio = common::create_test_file(fakes.dir.path(), "voice.mp3", "")?;
    let output_dir = fakes.dir.path().join("out");

    let controller = Controller::with_tools(Config::default(), fakes.paths.clone());
    let request = ShortRequest {
        background_path: background,
        audio_path: audio,
        narration: "Did you know? Octopuses have three hearts.".to_string(),
        speech_marks_path: None,
        output_dir: output_dir.clone(),
    };

    let output = controller
        .run_short(&request, &|_e: ProgressEvent| {}, &CancellationToken::new())
        .await?;

    assert!(output.is_file());
    assert_eq!(output.parent(), Some(output_dir.join("gameplay").join(SHORTS_OUTPUT_TYPE).as_path()));
    let name = output.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("AI_Short_gameplay_") && name.ends_with(".mp4"));

    let invocations = fakes.invocations();
    assert_eq!(invocations.len(), 1);
    assert!(invocations[0].contains("subtitles="));
    assert!(invocations[0].contains("-t 6.000"));
    assert_eq!(fs::read_dir(&output_dir)?.count(), 1);
    Ok(())
}
