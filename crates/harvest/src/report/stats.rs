//! Aggregate statistics read back from latest reports.

use super::*;

/// Only the summary of a report; unreadable outcome lists do not spoil the counts.
#[derive(Debug, Default, Deserialize)]
struct SummaryOnly {
  /// The report's counts
  #[serde(default)]
  summary: Summary,
}

/// Counts answered from report files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
  /// Aggregated counts
  #[serde(flatten)]
  pub summary: Summary,
  /// Report files the counts were read from
  pub sources: Vec<PathBuf>,
}

/// Reads the summary of one latest file.
async fn read_summary(path: &Path) -> Result<Summary, HarvestError> {
  let text = tokio::fs::read_to_string(path).await?;
  Ok(serde_json::from_str::<SummaryOnly>(&text)?.summary)
}

/// Latest files matching `pattern` inside `reports_dir`.
fn latest_files(reports_dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, HarvestError> {
  Ok(crate::project::glob_in(reports_dir, pattern)?.filter_map(Result::ok).collect())
}

/// Statistics for a project or one query.
///
/// Without a query id the most recently modified project report wins; if there is none, or
/// it cannot be read, the per-query latest reports are summed. With a query id only that
/// query's latest report counts, and a missing report yields zeros.
pub(super) async fn statistics(
  reports_dir: &Path,
  query_id: Option<&str>,
) -> Result<Statistics, HarvestError> {
  if let Some(query_id) = query_id {
    let path = reports_dir.join(ReportScope::Query(query_id.to_string()).status_file("latest"));
    if tokio::fs::metadata(&path).await.is_err() {
      return Ok(Statistics::default());
    }
    let summary = read_summary(&path).await?;
    return Ok(Statistics { summary, sources: vec![path] });
  }

  let mut project_files = Vec::new();
  for path in latest_files(reports_dir, "project_download_status_*_latest.json")? {
    let modified = tokio::fs::metadata(&path).await?.modified()?;
    project_files.push((modified, path));
  }
  if let Some((_, newest)) = project_files.into_iter().max_by_key(|(modified, _)| *modified) {
    match read_summary(&newest).await {
      Ok(summary) => return Ok(Statistics { summary, sources: vec![newest] }),
      Err(e) => warn!("Could not read project report {}: {e}", newest.display()),
    }
  }

  let mut statistics = Statistics::default();
  for path in latest_files(reports_dir, "download_status_*_latest.json")? {
    match read_summary(&path).await {
      Ok(summary) => {
        statistics.summary.merge(&summary);
        statistics.sources.push(path);
      },
      Err(e) => warn!("Could not read query report {}: {e}", path.display()),
    }
  }
  Ok(statistics)
}
