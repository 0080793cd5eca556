use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::errors::MediaError;

// @module: File and directory utilities

// @const: Video container extensions picked up by directory scans
pub const VIDEO_EXTENSIONS: [&str; 12] = [
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "ts", "m2ts",
];

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_file()
    }

    // @checks: Directory existence
    pub fn dir_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_dir()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<(), MediaError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() || Self::dir_exists(path) {
            return Ok(());
        }
        fs::create_dir_all(path)
            .map_err(|e| MediaError::io(format!("Failed to create directory {}", path.display()), e))
    }

    /// Best-effort removal of a partially written output file
    pub fn remove_partial_output<P: AsRef<Path>>(path: P) {
        let path = path.as_ref();
        if !path.exists() {
            return;
        }
        match fs::remove_file(path) {
            Ok(()) => debug!("Removed partial output {}", path.display()),
            Err(e) => warn!("Could not remove partial output {}: {}", path.display(), e),
        }
    }

    /// Whether the path has a known video extension
    pub fn is_video_file<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .map(|ext| {
                let ext = ext.to_string_lossy().to_lowercase();
                VIDEO_EXTENSIONS.contains(&ext.as_str())
            })
            .unwrap_or(false)
    }

    /// Video files under `input`, or `input` itself if it is a file.
    ///
    /// Results are sorted so batches run in a stable order.
    pub fn find_video_files<P: AsRef<Path>>(input: P) -> Result<Vec<PathBuf>> {
        let input = input.as_ref();
        if Self::file_exists(input) {
            return Ok(vec![input.to_path_buf()]);
        }
        if !Self::dir_exists(input) {
            return Err(anyhow!("Input path does not exist: {}", input.display()));
        }

        let mut result = Vec::new();
        for entry in WalkDir::new(input).follow_links(true) {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();
            if path.is_file() && Self::is_video_file(path) {
                result.push(path.to_path_buf());
            }
        }
        result.sort();
        Ok(result)
    }

    // @generates: Output path for the n-th clip of a source video
    pub fn clip_output_path<P1: AsRef<Path>, P2: AsRef<Path>>(input_file: P1, output_dir: P2, index: usize) -> PathBuf {
        let stem = input_file.as_ref().file_stem().unwrap_or_default().to_string_lossy();
        output_dir.as_ref().join(format!("{}_clip_{}.mp4", stem, index))
    }

    /// Replace characters that are not allowed in folder names
    pub fn sanitize_folder_name(name: &str) -> String {
        let sanitized: String = name
            .chars()
            .map(|c| match c {
                '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect();
        let trimmed = sanitized.trim();
        if trimmed.is_empty() {
            "output".to_string()
        } else {
            trimmed.to_string()
        }
    }

    /// Move a finished file to `base/<original stem>/<output type>/<file name>`.
    ///
    /// An existing file at the target is overwritten.
    pub fn organize_output_file<P1, P2, P3>(
        processed: P1,
        original_input: P2,
        base_dir: P3,
        output_type: &str,
    ) -> Result<PathBuf>
    where
        P1: AsRef<Path>,
        P2: AsRef<Path>,
        P3: AsRef<Path>,
    {
        let processed = processed.as_ref();
        let base_dir = base_dir.as_ref();

        if !Self::file_exists(processed) {
            return Err(anyhow!("Processed file does not exist: {}", processed.display()));
        }
        let original_stem = original_input
            .as_ref()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow!("Original input path is missing a file name"))?;
        if !Self::dir_exists(base_dir) {
            return Err(anyhow!("Base output directory does not exist: {}", base_dir.display()));
        }
        let file_name = processed
            .file_name()
            .ok_or_else(|| anyhow!("Processed path has no file name: {}", processed.display()))?;

        let target_dir = base_dir
            .join(&original_stem)
            .join(Self::sanitize_folder_name(output_type));
        Self::ensure_dir(&target_dir)?;
        let target = target_dir.join(file_name);

        if target == processed {
            return Ok(target);
        }
        if target.exists() {
            warn!("Target file {} already exists. Overwriting.", target.display());
            fs::remove_file(&target)
                .with_context(|| format!("Failed to replace existing file: {}", target.display()))?;
        }

        if fs::rename(processed, &target).is_err() {
            // Different filesystems: fall back to copy + delete
            fs::copy(processed, &target)
                .with_context(|| format!("Failed to copy {} to {}", processed.display(), target.display()))?;
            fs::remove_file(processed)
                .with_context(|| format!("Failed to remove {}", processed.display()))?;
        }

        info!("Organized output to {}", target.display());
        Ok(target)
    }
}
