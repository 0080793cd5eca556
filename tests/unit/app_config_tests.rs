/*!
 * Tests for application configuration functionality
 */

use anyhow::Result;
use std::path::PathBuf;

use autotube::app_config::{Config, LogLevel};
use autotube::media::{Rgba, SubtitleAlignment};
use crate::common;

/// Test default configuration values
#[test]
fn test_default_config_withNoParameters_shouldHaveCorrectDefaults() {
    let config = Config::default();

    assert_eq!(config.clipping.clip_count, 5);
    assert_eq!(config.clipping.min_clip_secs, 15);
    assert_eq!(config.clipping.max_clip_secs, 45);
    assert!(config.clipping.use_scene_detection);
    assert!((config.clipping.scene_threshold - 0.3).abs() < f64::EPSILON);
    assert!(config.output.organize_output);
    assert_eq!(config.tools.verify_timeout_secs, 5);
    assert_eq!(config.subtitles.words_per_minute, 150);
    assert_eq!(config.style.font_name, "Arial");
    assert_eq!(config.style.alignment, SubtitleAlignment::Bottom);
    assert_eq!(config.log_level, LogLevel::Info);
    assert!(config.validate().is_ok());
}

/// Test configuration validation
#[test]
fn test_config_validation_withVariousConfigs_shouldValidateCorrectly() {
    let mut config = Config::default();

    config.clipping.clip_count = 0;
    assert!(config.validate().is_err());
    config.clipping.clip_count = 3;

    config.clipping.min_clip_secs = 60;
    assert!(config.validate().is_err());
    config.clipping.min_clip_secs = 15;

    config.clipping.scene_threshold = 0.0;
    assert!(config.validate().is_err());
    config.clipping.scene_threshold = 1.5;
    assert!(config.validate().is_err());
    config.clipping.scene_threshold = 1.0;
    assert!(config.validate().is_ok());

    config.subtitles.max_chars_per_line = 0;
    assert!(config.validate().is_err());
    config.subtitles.max_chars_per_line = 42;

    config.style.font_size = 0;
    assert!(config.validate().is_err());
}

/// Test that a partial JSON file falls back to defaults for missing keys
#[test]
fn test_from_file_withPartialJson_shouldFillDefaults() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(
        temp_dir.path(),
        "conf.json",
        r##"{
            "clipping": { "clip_count": 2, "vertical": true },
            "style": { "font_color": "#FFFF00", "alignment": "top" },
            "log_level": "debug"
        }"##,
    )?;

    let config = Config::from_file(&path)?;
    assert_eq!(config.clipping.clip_count, 2);
    assert!(config.clipping.vertical);
    assert_eq!(config.clipping.max_clip_secs, 45);
    assert_eq!(config.style.font_color, Rgba::opaque(255, 255, 0));
    assert_eq!(config.style.alignment, SubtitleAlignment::Top);
    assert_eq!(config.log_level, LogLevel::Debug);
    assert!(config.output.organize_output);
    Ok(())
}

/// Test that a missing file is created with defaults and reloads identically
#[test]
fn test_load_or_create_withMissingFile_shouldWriteDefaults() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("conf.json");

    let created = Config::load_or_create(&path)?;
    assert!(path.exists());
    assert_eq!(created, Config::default());

    let mut changed = created.clone();
    changed.output.default_output_dir = Some(PathBuf::from("/tmp/autotube-out"));
    changed.save(&path)?;
    assert_eq!(Config::load_or_create(&path)?, changed);
    Ok(())
}

/// Test that invalid JSON is reported with the file name
#[test]
fn test_from_file_withInvalidJson_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(temp_dir.path(), "broken.json", "{ not json")?;
    let error = Config::from_file(&path).unwrap_err();
    assert!(error.to_string().contains("broken.json"));
    Ok(())
}

/// Test the configured output directory wins over the platform default
#[test]
fn test_resolve_output_dir_withConfiguredDir_shouldUseIt() {
    let mut config = Config::default();
    config.output.default_output_dir = Some(PathBuf::from("/data/out"));
    assert_eq!(config.output.resolve_output_dir(), PathBuf::from("/data/out"));

    config.output.default_output_dir = None;
    assert!(config.output.resolve_output_dir().ends_with("autotube"));
}

#[test]
fn test_logLevel_toLevelFilter_shouldMapEveryLevel() {
    assert_eq!(LogLevel::Error.to_level_filter(), log::LevelFilter::Error);
    assert_eq!(LogLevel::Trace.to_level_filter(), log::LevelFilter::Trace);
}
