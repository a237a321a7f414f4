//! Durable machine- and human-readable records of acquisition runs.
//!
//! Every reported run writes, into the project's reports directory:
//!
//! - a timestamped JSON snapshot with summary counts and every outcome,
//! - a `_latest` JSON pointer with the same content, replaced atomically so a concurrent
//!   reader sees either the previous or the new report and never a torn file,
//! - a plain-text summary,
//! - text and HTML manual download guides, when the run downloaded or gave up on anything.
//!
//! Project-wide runs use the same names with a `project_` prefix.
//!
//! | file | query scope | project scope |
//! |---|---|---|
//! | snapshot | `download_status_{id}_{ts}.json` | `project_download_status_{id}_{ts}.json` |
//! | latest | `download_status_{id}_latest.json` | `project_download_status_{id}_latest.json` |
//! | summary | `download_summary_{id}_{ts}.txt` | `project_download_summary_{id}_{ts}.txt` |
//! | guides | `manual_download_guide_{id}_{ts}.{html,txt}` | `project_manual_download_guide_{id}_{ts}.{html,txt}` |

use std::io::Write;

use tempfile::NamedTempFile;

use super::*;
use crate::project::REPORTS_README;

mod guide;
mod stats;

pub use stats::Statistics;

/// Format of the timestamp embedded in report filenames.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// What a report covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReportScope {
  /// One search query
  Query(String),
  /// A whole project, run over its consolidated manifest
  Project(String),
}

impl ReportScope {
  /// The query or project id.
  pub fn id(&self) -> &str {
    match self {
      ReportScope::Query(id) | ReportScope::Project(id) => id,
    }
  }

  /// Filename prefix distinguishing project reports.
  fn prefix(&self) -> &'static str {
    match self {
      ReportScope::Query(_) => "",
      ReportScope::Project(_) => "project_",
    }
  }

  /// `download_status_{id}_{suffix}.json`, prefixed for projects.
  fn status_file(&self, suffix: &str) -> String {
    format!("{}download_status_{}_{suffix}.json", self.prefix(), self.id())
  }

  /// `download_summary_{id}_{timestamp}.txt`, prefixed for projects.
  fn summary_file(&self, timestamp: &str) -> String {
    format!("{}download_summary_{}_{timestamp}.txt", self.prefix(), self.id())
  }

  /// `manual_download_guide_{id}_{timestamp}.{extension}`, prefixed for projects.
  fn guide_file(&self, timestamp: &str, extension: &str) -> String {
    format!("{}manual_download_guide_{}_{timestamp}.{extension}", self.prefix(), self.id())
  }

  /// Heading used in human-readable reports.
  fn heading(&self) -> String {
    match self {
      ReportScope::Query(id) => format!("Query {id}"),
      ReportScope::Project(id) => format!("Project {id}"),
    }
  }
}

impl std::fmt::Display for ReportScope {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ReportScope::Query(id) => write!(f, "query `{id}`"),
      ReportScope::Project(id) => write!(f, "project `{id}`"),
    }
  }
}

/// The JSON body of snapshot and latest reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
  /// Set for query reports
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub query_id:   Option<String>,
  /// Set for project reports
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub project_id: Option<String>,
  /// When the report was written, in [`TIMESTAMP_FORMAT`]
  pub timestamp:  String,
  /// Aggregated counts
  #[serde(default)]
  pub summary:    Summary,
  /// Every outcome of the run
  #[serde(default)]
  pub results:    Vec<AcquisitionOutcome>,
}

impl StatusReport {
  /// Builds the report for a run.
  pub fn new(scope: &ReportScope, timestamp: &str, outcomes: &[AcquisitionOutcome]) -> Self {
    let (query_id, project_id) = match scope {
      ReportScope::Query(id) => (Some(id.clone()), None),
      ReportScope::Project(id) => (None, Some(id.clone())),
    };
    Self {
      query_id,
      project_id,
      timestamp: timestamp.to_string(),
      summary: Summary::from_outcomes(outcomes),
      results: outcomes.to_vec(),
    }
  }
}

/// Files written for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WrittenReports {
  /// Timestamped JSON snapshot
  pub snapshot: PathBuf,
  /// Latest JSON pointer
  pub latest:   PathBuf,
  /// Text summary
  pub summary:  PathBuf,
  /// HTML and text guides, when written
  pub guides:   Vec<PathBuf>,
}

/// Writes and reads reports in one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reporter {
  /// Reports directory
  reports_dir: PathBuf,
}

impl Reporter {
  /// A reporter writing into `reports_dir`.
  pub fn new(reports_dir: impl Into<PathBuf>) -> Self { Self { reports_dir: reports_dir.into() } }

  /// The reports directory.
  pub fn reports_dir(&self) -> &Path { &self.reports_dir }

  /// Writes every report for one run.
  ///
  /// `papers` and `outcomes` must be aligned: `outcomes[i]` belongs to `papers[i]`.
  pub async fn write_run_reports(
    &self,
    scope: &ReportScope,
    papers: &[PaperRecord],
    outcomes: &[AcquisitionOutcome],
  ) -> Result<WrittenReports, HarvestError> {
    tokio::fs::create_dir_all(&self.reports_dir).await?;
    let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
    let report = StatusReport::new(scope, &timestamp, outcomes);
    let json = serde_json::to_vec_pretty(&report)?;

    let snapshot = self.reports_dir.join(scope.status_file(&timestamp));
    tokio::fs::write(&snapshot, &json).await?;
    debug!("Snapshot written to {}", snapshot.display());

    let latest = self.reports_dir.join(scope.status_file("latest"));
    let target = latest.clone();
    tokio::task::spawn_blocking(move || write_latest_atomic(&target, &json)).await??;

    let summary = self.reports_dir.join(scope.summary_file(&timestamp));
    tokio::fs::write(&summary, text_summary(scope, &timestamp, &report.summary)).await?;

    let mut guides = Vec::new();
    let needs_guide = outcomes.iter().any(|o| {
      matches!(o.status(), AcquisitionStatus::ManualRequired | AcquisitionStatus::Success)
    });
    if needs_guide {
      let html = self.reports_dir.join(scope.guide_file(&timestamp, "html"));
      tokio::fs::write(&html, guide::html_guide(scope, papers, outcomes)).await?;
      let text = self.reports_dir.join(scope.guide_file(&timestamp, "txt"));
      tokio::fs::write(&text, guide::text_guide(scope, papers, outcomes)).await?;
      guides.extend([html, text]);
    }

    info!("Reports for {scope} written to {}", self.reports_dir.display());
    Ok(WrittenReports { snapshot, latest, summary, guides })
  }

  /// Reads the latest report of a scope, if one exists.
  pub async fn read_latest(&self, scope: &ReportScope) -> Result<Option<StatusReport>, HarvestError> {
    let path = self.reports_dir.join(scope.status_file("latest"));
    match tokio::fs::read_to_string(&path).await {
      Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e.into()),
    }
  }

  /// Aggregate counts; see [`Statistics`].
  pub async fn statistics(&self, query_id: Option<&str>) -> Result<Statistics, HarvestError> {
    stats::statistics(&self.reports_dir, query_id).await
  }

  /// Removes every file in the reports directory except its `README.md`.
  ///
  /// Returns the number of files removed. A missing directory is created.
  pub async fn clean(&self) -> Result<usize, HarvestError> {
    if tokio::fs::metadata(&self.reports_dir).await.is_err() {
      info!("Reports directory does not exist, creating it");
      tokio::fs::create_dir_all(&self.reports_dir).await?;
      return Ok(0);
    }

    let mut removed = 0;
    let mut entries = tokio::fs::read_dir(&self.reports_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
      if !entry.file_type().await?.is_file() || entry.file_name() == REPORTS_README {
        continue;
      }
      match tokio::fs::remove_file(entry.path()).await {
        Ok(()) => {
          trace!("Removed report file {}", entry.path().display());
          removed += 1;
        },
        Err(e) => warn!("Could not remove {}: {e}", entry.path().display()),
      }
    }
    info!("Cleaned {removed} report files from {}", self.reports_dir.display());
    Ok(removed)
  }
}

/// Replaces `path` with `bytes` so readers never observe a partial file.
///
/// The content goes to a temporary file in the same directory, which is then renamed over
/// the target. This blocks; async callers run it on the blocking pool.
pub fn write_latest_atomic(path: &Path, bytes: &[u8]) -> Result<(), HarvestError> {
  let dir = path.parent().unwrap_or_else(|| Path::new("."));
  let mut file = NamedTempFile::new_in(dir)?;
  file.write_all(bytes)?;
  file.as_file().sync_all()?;
  file.persist(path)?;
  trace!("Latest pointer replaced at {}", path.display());
  Ok(())
}

/// The plain-text run summary.
fn text_summary(scope: &ReportScope, timestamp: &str, summary: &Summary) -> String {
  format!(
    "PDF Download Summary for {}\nGenerated: {timestamp}\n{}\n\nTotal papers: {}\nSuccessful \
     downloads: {}\nAlready downloaded: {}\nFailed downloads: {}\nManual downloads required: \
     {}\nSkipped: {}\n",
    scope.heading(),
    "=".repeat(50),
    summary.total_papers,
    summary.successful_downloads,
    summary.already_existed,
    summary.failed_downloads,
    summary.manual_required,
    summary.skipped,
  )
}
