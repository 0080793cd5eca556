/*!
 * Error types for the autotube application.
 *
 * `MediaError` covers everything the media engine can report: missing tools,
 * rejected inputs, processes that could not start or failed, cancellation and
 * probe timeouts.
 */

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by the media-processing engine
#[derive(Error, Debug)]
pub enum MediaError {
    /// The transcoder/prober pair was not located or failed verification
    #[error("Media tools unavailable: {0}")]
    Unavailable(String),

    /// Missing file or malformed parameter, rejected before any process spawn
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Filesystem operation failed
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted
        context: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The process could not be started at all
    #[error("Failed to start {program:?}: {source}")]
    Spawn {
        /// Executable that failed to start
        program: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The tool exited unsuccessfully without a recoverable pattern
    #[error("{tool} failed (exit code {}): {diagnostics}", exit_code_label(.exit_code))]
    ToolFailure {
        /// Short name of the tool or operation
        tool: String,
        /// Exit code, if the process exited normally
        exit_code: Option<i32>,
        /// Filtered stderr text
        diagnostics: String,
    },

    /// Stream copy is not possible for this input; a re-encode may succeed
    #[error("Codec copy unsupported: {diagnostics}")]
    RecoverableToolFailure {
        /// Filtered stderr text
        diagnostics: String,
    },

    /// The operation was cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// A bounded wait expired (version probe)
    #[error("{program:?} did not finish within {after:?}")]
    Timeout {
        /// Executable being waited on
        program: PathBuf,
        /// Bound that expired
        after: Duration,
    },

    /// The prober ran but its output could not be used
    #[error("Probe failed: {0}")]
    Probe(String),
}

impl MediaError {
    /// Build an `Io` error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// True when the error represents operator cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

fn exit_code_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}
