//! Error types for the harvestd CLI.
//!
//! Everything the CLI can fail on is folded into [`HarvestdErrors`] so `main` can propagate
//! with `?`. Variants are transparent: the user sees the underlying message.

use thiserror::Error;

/// Errors that can occur during CLI operations.
#[derive(Error, Debug)]
pub enum HarvestdErrors {
  /// Errors from user interaction dialogs
  #[error(transparent)]
  Dialoguer(#[from] dialoguer::Error),

  /// Errors from the harvest library
  #[error(transparent)]
  Harvest(#[from] harvest::HarvestError),

  /// File system and IO operation errors
  #[error(transparent)]
  IO(#[from] std::io::Error),

  /// The rolling log file could not be opened
  #[error(transparent)]
  LogFile(#[from] tracing_appender::rolling::InitError),

  /// Serializing statistics for `--json` output
  #[error(transparent)]
  Json(#[from] serde_json::Error),
}
