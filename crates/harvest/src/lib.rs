//! A library for turning literature-review search results into a folder of full-text PDFs.
//!
//! Search exports carry partial and inconsistent metadata: some rows have a DOI, some a
//! publisher landing page, some a direct full-text link, and many nothing at all. `harvest`
//! resolves every row into an ordered list of candidate URLs, tries them one at a time, and
//! records exactly one [`AcquisitionOutcome`] per paper. Re-running is always safe: a paper
//! whose PDF is already on disk is reported as [`AcquisitionStatus::AlreadyExisted`] without
//! touching the network.
//!
//! # Example
//! ```rust,no_run
//! use harvest::{Harvester, HarvestConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!   let mut harvester = Harvester::new("literature_reviews", HarvestConfig::default())?;
//!   harvester.consolidate("quantum_planning").await?;
//!
//!   let by_query = harvester.download_project("quantum_planning", None).await?;
//!   for (query_id, outcomes) in by_query {
//!     println!("{query_id}: {} papers", outcomes.len());
//!   }
//!
//!   Ok(())
//! }
//! ```

#![warn(missing_docs, clippy::missing_docs_in_private_items)]
use std::{
  collections::{BTreeMap, HashMap},
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};
#[cfg(test)] use tracing_test::traced_test;

pub mod acquire;
pub mod batch;
pub mod clients;
pub mod config;
pub mod database;
pub mod errors;
pub mod format;
pub mod harvester;
pub mod hints;
pub mod outcome;
pub mod paper;
pub mod project;
pub mod report;
pub mod resolve;
#[cfg(test)] mod tests;

pub use acquire::Acquirer;
pub use batch::{BatchOptions, BatchRunner, CancelFlag};
pub use clients::{Fetch, FetchResponse, HttpClient};
pub use config::HarvestConfig;
pub use database::ManifestStore;
pub use errors::HarvestError;
pub use harvester::Harvester;
pub use hints::{ManualHints, PublisherHint};
pub use outcome::{AcquisitionOutcome, AcquisitionStatus, Summary};
pub use paper::PaperRecord;
pub use project::{JsonTables, ProjectLayout, QueryTables};
pub use report::{ReportScope, Reporter, Statistics};
pub use resolve::{Candidate, CandidateQuery, CandidateSource};
