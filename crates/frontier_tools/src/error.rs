//! Error type for the command-line tools.

use frontier_core::error::GameError;
use thiserror::Error;

/// Errors raised by the tools.
#[derive(Error, Debug)]
pub enum ToolError {
    /// Data file or directory missing.
    #[error("Data file not found: {0}")]
    FileNotFound(String),
    /// Failed to read a file.
    #[error("Failed to read '{path}': {source}")]
    Read {
        /// File being read.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// Config failed to parse or validate.
    #[error(transparent)]
    Config(#[from] GameError),
    /// Bad command-line value.
    #[error("Invalid argument '{name}': {message}")]
    InvalidArgument {
        /// Argument name.
        name: &'static str,
        /// What was wrong with it.
        message: String,
    },
    /// Failed to encode a report.
    #[error("Failed to encode report: {0}")]
    Report(#[from] serde_json::Error),
}
