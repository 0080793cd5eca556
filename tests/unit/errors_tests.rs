/*!
 * Tests for error types and conversions
 */

use std::path::PathBuf;
use std::time::Duration;

use autotube::errors::MediaError;

#[test]
fn test_mediaError_toolFailure_shouldDisplayExitCodeAndDiagnostics() {
    let error = MediaError::ToolFailure {
        tool: "clip extraction".to_string(),
        exit_code: Some(1),
        diagnostics: "Invalid data found when processing input".to_string(),
    };
    let display = error.to_string();
    assert!(display.contains("clip extraction"));
    assert!(display.contains("exit code 1"));
    assert!(display.contains("Invalid data found"));
}

#[test]
fn test_mediaError_toolFailure_withoutExitCode_shouldSayNone() {
    let error = MediaError::ToolFailure {
        tool: "combine".to_string(),
        exit_code: None,
        diagnostics: String::new(),
    };
    assert!(error.to_string().contains("exit code none"));
}

#[test]
fn test_mediaError_isCancelled_shouldOnlyMatchCancellation() {
    assert!(MediaError::Cancelled.is_cancelled());
    assert!(!MediaError::Unavailable("missing".to_string()).is_cancelled());
    assert!(!MediaError::Timeout {
        program: PathBuf::from("ffmpeg"),
        after: Duration::from_secs(5),
    }
    .is_cancelled());
}

#[test]
fn test_mediaError_io_shouldKeepContextAndSource() {
    let error = MediaError::io(
        "Failed to create directory out",
        std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
    );
    let display = error.to_string();
    assert!(display.starts_with("Failed to create directory out"));
    assert!(display.contains("denied"));
    assert!(std::error::Error::source(&error).is_some());
}
