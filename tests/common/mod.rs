/*!
 * Common test utilities for the autotube test suite
 */

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[cfg(unix)]
use autotube::media::ToolPaths;

/// Route library logging to the test output
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Writes an executable shell script
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, content: &str) -> Result<PathBuf> {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    fs::create_dir_all(dir)?;
    let path = dir.join(name);
    {
        let mut file = fs::File::create(&path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
    }
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

/// Shell body that makes the fake transcoder write its output file and succeed
pub const TRANSCODER_SUCCESS: &str = r#"echo "frame=  10 fps=0.0 time=00:00:01.00 bitrate=N/A speed=2x" >&2
: > "$last"
exit 0"#;

/// Shell body that rejects stream copy and succeeds when re-encoding
pub const TRANSCODER_REJECTS_COPY: &str = r#"case "$*" in
  *"-c:v copy"*) echo "[mp4 @ 0x1] codec not currently supported in container" >&2; exit 1;;
esac
: > "$last"
exit 0"#;

/// Shell body that writes part of the output, then fails every attempt
pub const TRANSCODER_ALWAYS_FAILS: &str = r#": > "$last"
echo "[mp4 @ 0x1] codec not currently supported in container" >&2
exit 1"#;

/// Shell body whose background child writes `grandchild.marker` after a second
pub const TRANSCODER_SPAWNS_CHILD_THEN_HANGS: &str = r#"(sleep 1; : > "$(dirname "$last")/grandchild.marker") &
exec sleep 30"#;

/// Shell body that reports three scene changes, then fails
pub const TRANSCODER_SCENES_THEN_FAIL: &str = r#"case "$*" in
  *select=*)
    echo "[Parsed_metadata_1 @ 0x1] frame:0 pts:10 pts_time:10.0 lavfi.scene_score=0.5" >&2
    echo "[Parsed_metadata_1 @ 0x1] frame:1 pts:30 pts_time:30.0" >&2
    echo "[Parsed_metadata_1 @ 0x1] lavfi.scene_score=0.7" >&2
    echo "[Parsed_metadata_1 @ 0x1] frame:2 pts:55 pts_time:55.0 lavfi.scene_score=0.4" >&2
    exit 1;;
esac
: > "$last"
exit 0"#;

/// Shell body that creates the output and then blocks
pub const TRANSCODER_HANGS: &str = r#": > "$last"
exec sleep 30"#;

/// A fake transcoder/prober pair living in a temporary directory
#[cfg(unix)]
pub struct FakeTools {
    pub dir: TempDir,
    pub paths: ToolPaths,
    /// One line of arguments per transcoder invocation (excluding `-version`)
    pub invocation_log: PathBuf,
}

#[cfg(unix)]
impl FakeTools {
    /// Transcoder invocations recorded so far
    pub fn invocations(&self) -> Vec<String> {
        fs::read_to_string(&self.invocation_log)
            .map(|content| content.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// Create `ffmpeg` running `transcoder_body` and `ffprobe` printing `duration`
#[cfg(unix)]
pub fn fake_tools(transcoder_body: &str, duration: &str) -> Result<FakeTools> {
    let dir = create_temp_dir()?;
    let invocation_log = dir.path().join("invocations.log");

    let transcoder = write_script(
        dir.path(),
        "ffmpeg",
        &format!(
            "#!/bin/sh\nif [ \"$1\" = \"-version\" ]; then echo \"ffmpeg version 6.1-test Copyright (c) the FFmpeg developers\"; exit 0; fi\necho \"$*\" >> \"{}\"\nfor last; do :; done\n{}\n",
            invocation_log.display(),
            transcoder_body
        ),
    )?;
    let prober = write_script(
        dir.path(),
        "ffprobe",
        &format!(
            "#!/bin/sh\nif [ \"$1\" = \"-version\" ]; then echo \"ffprobe version 6.1-test\"; exit 0; fi\necho \"{}\"\n",
            duration
        ),
    )?;

    Ok(FakeTools {
        paths: ToolPaths::new(transcoder, prober),
        dir,
        invocation_log,
    })
}

/// Creates a sample subtitle file for testing
pub fn create_test_subtitle(dir: &Path, filename: &str) -> Result<PathBuf> {
    let content = r#"1
00:00:01,000 --> 00:00:04,000
This is a test subtitle.

2
00:00:05,000 --> 00:00:09,000
It contains multiple entries.

3
00:00:10,000 --> 00:00:14,000
For testing purposes.
"#;
    create_test_file(dir, filename, content)
}
