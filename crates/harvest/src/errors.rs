//! Error types for the harvest library.
//!
//! Only *setup* failures surface as a [`HarvestError`]: a missing project, a project without
//! any query tables, an unreadable manifest, or a report directory that cannot be created.
//! Everything that can go wrong while fetching a single paper is folded into that paper's
//! [`AcquisitionOutcome`](crate::AcquisitionOutcome) instead, so a batch never aborts because
//! one publisher misbehaved.
//!
//! # Examples
//!
//! ```no_run
//! use harvest::{errors::HarvestError, Harvester, HarvestConfig};
//!
//! # async fn example() -> Result<(), HarvestError> {
//! let mut harvester = Harvester::new("literature_reviews", HarvestConfig::default())?;
//! match harvester.consolidate("missing_project").await {
//!   Err(HarvestError::ProjectNotFound(path)) => println!("No project at {}", path.display()),
//!   Err(HarvestError::NoQueryTables(project)) => println!("{project} has no query results"),
//!   Err(e) => println!("Other error: {e}"),
//!   Ok(rows) => println!("Manifest holds {rows} papers"),
//! }
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when setting up or persisting an acquisition run.
#[derive(Error, Debug)]
pub enum HarvestError {
  /// The project directory does not exist.
  #[error("Project not found at {}", .0.display())]
  ProjectNotFound(PathBuf),

  /// The project exists but no query result tables could be loaded from it.
  #[error("No query result tables found for project `{0}`")]
  NoQueryTables(String),

  /// The project has not been consolidated yet, so there is no manifest to download from.
  #[error("No manifest for project `{0}`, run consolidation first")]
  ManifestMissing(String),

  /// A paper id was requested that the manifest does not contain.
  #[error("Paper {0} is not in the manifest")]
  PaperNotFound(u64),

  /// A paper cannot be marked as a duplicate of itself.
  #[error("Paper {0} cannot duplicate itself")]
  SelfDuplicate(u64),

  /// A URL could not be parsed or uses an unsupported scheme.
  #[error("Invalid URL: {0}")]
  InvalidUrl(String),

  /// The configuration file could not be understood.
  #[error("Configuration error: {0}")]
  Config(String),

  /// An HTTP client could not be constructed or a request failed at the transport level.
  #[error(transparent)]
  Network(#[from] reqwest::Error),

  /// Failed to parse a URL.
  #[error(transparent)]
  UrlParse(#[from] url::ParseError),

  /// JSON (de)serialization of a table or report failed.
  #[error(transparent)]
  Json(#[from] serde_json::Error),

  /// A SQLite operation failed.
  #[error(transparent)]
  Sqlite(#[from] rusqlite::Error),

  /// An async SQLite operation failed.
  #[error(transparent)]
  AsyncSqlite(#[from] tokio_rusqlite::Error),

  /// A file system operation failed.
  #[error(transparent)]
  Io(#[from] std::io::Error),

  /// Atomically replacing a report pointer failed.
  #[error(transparent)]
  Persist(#[from] tempfile::PersistError),

  /// A report glob pattern was malformed.
  #[error(transparent)]
  Glob(#[from] glob::PatternError),

  /// A blocking report write panicked or was cancelled.
  #[error(transparent)]
  Join(#[from] tokio::task::JoinError),
}
