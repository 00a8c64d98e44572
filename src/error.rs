//! Error types for the s5cmd-runner library.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while preparing or supervising an s5cmd run.
#[derive(Error, Debug)]
pub enum Error {
    /// An operation was given zero transfer requests.
    #[error("no transfer requests given")]
    EmptyInput,

    /// The s5cmd executable could not be found or installed.
    #[error("s5cmd is not available at {path}")]
    ToolUnavailable {
        /// Path where the executable was expected.
        path: PathBuf,
    },

    /// The requested combination of locators is not supported by s5cmd.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The operating system refused to start the subprocess.
    #[error("failed to start {program}: {source}")]
    StartFailed {
        /// Program that was being launched.
        program: String,
        /// Underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// The merged output stream of a running subprocess could not be read.
    #[error("failed to read s5cmd output: {0}")]
    StreamRead(#[source] std::io::Error),

    /// Materializing a remote locator into scratch storage failed.
    #[error("download of {url} failed: {reason}")]
    Download {
        /// Locator that was being fetched.
        url: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// s5cmd exited with a non-success status.
    #[error("s5cmd exited with {}", .code.map_or_else(|| "a signal".to_string(), |c| format!("status {c}")))]
    ToolFailed {
        /// Exit code, if the process was not terminated by a signal.
        code: Option<i32>,
    },

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A specialized `Result` type for s5cmd-runner operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_failed_message_includes_code() {
        let err = Error::ToolFailed { code: Some(3) };
        assert_eq!(err.to_string(), "s5cmd exited with status 3");
        let err = Error::ToolFailed { code: None };
        assert_eq!(err.to_string(), "s5cmd exited with a signal");
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
