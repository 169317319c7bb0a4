//! # Frontier Development Tools
//!
//! Command-line tools for development:
//! - RON config validators
//! - Formation planning from the command line

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod error;
pub mod plan;
pub mod validate;

pub use error::ToolError;
