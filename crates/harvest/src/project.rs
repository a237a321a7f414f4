//! Project layout and consolidation of query tables into one manifest.
//!
//! A project is a directory under the projects root:
//!
//! ```text
//! <root>/<project_id>/
//!   results/<query_id>.json      one table per search query (input)
//!   pdfs/manifest.db             consolidated manifest
//!   pdfs/automatic/              PDFs fetched by batch runs
//!   pdfs/automatic/reports/      JSON snapshots, summaries and guides
//!   pdfs/manual/                 PDFs fetched from operator-submitted URLs
//! ```
//!
//! Consolidation concatenates every query's rows into one manifest. Rows are *not* merged by
//! fuzzy identity: two rows collapse only when they carry exactly the same exported content,
//! which happens when the same search hit shows up in several query exports. The collapsed
//! row remembers every query that found it, which is what lets a single project-wide run be
//! reported back per query afterwards.

use std::collections::BTreeSet;

use async_trait::async_trait;

use super::*;
use crate::paper::RecordKey;

/// Name of the notes file kept when the reports directory is cleaned.
pub const REPORTS_README: &str = "README.md";

/// Paths of one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
  /// Project id, the directory name
  project_id: String,
  /// `<root>/<project_id>`
  root:       PathBuf,
}

impl ProjectLayout {
  /// Layout of `project_id` under `projects_root`.
  pub fn new(projects_root: impl AsRef<Path>, project_id: impl Into<String>) -> Self {
    let project_id = project_id.into();
    let root = projects_root.as_ref().join(&project_id);
    Self { project_id, root }
  }

  /// The project id.
  pub fn project_id(&self) -> &str { &self.project_id }

  /// The project directory.
  pub fn root(&self) -> &Path { &self.root }

  /// Directory holding the query tables.
  pub fn results_dir(&self) -> PathBuf { self.root.join("results") }

  /// Directory holding everything the pipeline writes.
  pub fn pdfs_dir(&self) -> PathBuf { self.root.join("pdfs") }

  /// Shared output directory of batch runs.
  pub fn automatic_dir(&self) -> PathBuf { self.pdfs_dir().join("automatic") }

  /// Output directory for operator-submitted URLs.
  pub fn manual_dir(&self) -> PathBuf { self.pdfs_dir().join("manual") }

  /// Report directory.
  pub fn reports_dir(&self) -> PathBuf { self.automatic_dir().join("reports") }

  /// The manifest database.
  pub fn manifest_path(&self) -> PathBuf { self.pdfs_dir().join("manifest.db") }

  /// Whether the project directory exists.
  pub fn exists(&self) -> bool { self.root.is_dir() }

  /// Fails with [`HarvestError::ProjectNotFound`] unless the project directory exists.
  pub fn require(&self) -> Result<(), HarvestError> {
    if self.exists() {
      Ok(())
    } else {
      Err(HarvestError::ProjectNotFound(self.root.clone()))
    }
  }

  /// Creates every directory of the layout.
  pub async fn ensure_dirs(&self) -> Result<(), HarvestError> {
    for dir in [self.results_dir(), self.automatic_dir(), self.manual_dir(), self.reports_dir()] {
      tokio::fs::create_dir_all(&dir).await?;
    }
    let readme = self.reports_dir().join(REPORTS_README);
    if tokio::fs::metadata(&readme).await.is_err() {
      tokio::fs::write(
        &readme,
        format!(
          "# Download reports for `{}`\n\nGenerated by harvest. Files other than this one are \
           removed by `clean-reports`.\n",
          self.project_id
        ),
      )
      .await?;
    }
    Ok(())
  }

  /// Lists downloaded PDFs from both the automatic and the manual directory.
  pub async fn list_downloads(&self) -> Result<Vec<DownloadedFile>, HarvestError> {
    let mut files = Vec::new();
    for (origin, dir) in
      [(DownloadOrigin::Automatic, self.automatic_dir()), (DownloadOrigin::Manual, self.manual_dir())]
    {
      for path in glob_in(&dir, "*.pdf")? {
        let path = match path {
          Ok(path) => path,
          Err(e) => {
            warn!("Skipping unreadable entry: {e}");
            continue;
          },
        };
        let size = tokio::fs::metadata(&path).await?.len();
        files.push(DownloadedFile { path, origin, size });
      }
    }
    Ok(files)
  }
}

/// Matches `file_pattern` against the entries of `dir`.
///
/// Only `file_pattern` is a glob; `dir` is escaped, so roots such as `reviews[2024]` match
/// literally.
pub(crate) fn glob_in(dir: &Path, file_pattern: &str) -> Result<glob::Paths, HarvestError> {
  let pattern = format!(
    "{}{}{file_pattern}",
    glob::Pattern::escape(&dir.to_string_lossy()),
    std::path::MAIN_SEPARATOR
  );
  Ok(glob::glob(&pattern)?)
}

/// Where a downloaded PDF came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadOrigin {
  /// Written by a batch run
  Automatic,
  /// Written from an operator-submitted URL
  Manual,
}

/// A PDF found in a project's output directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedFile {
  /// Full path
  pub path:   PathBuf,
  /// Which directory it is in
  pub origin: DownloadOrigin,
  /// Size in bytes
  pub size:   u64,
}

/// Source of a project's per-query paper tables.
#[async_trait]
pub trait QueryTables: Send + Sync {
  /// Ids of every query of the project, sorted.
  async fn query_ids(&self, layout: &ProjectLayout) -> Result<Vec<String>, HarvestError>;

  /// The table of one query; row `i` has `paper_id == i`.
  async fn load(
    &self,
    layout: &ProjectLayout,
    query_id: &str,
  ) -> Result<Vec<PaperRecord>, HarvestError>;
}

/// Query tables stored as `results/<query_id>.json`, each a JSON array of export rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTables;

#[async_trait]
impl QueryTables for JsonTables {
  async fn query_ids(&self, layout: &ProjectLayout) -> Result<Vec<String>, HarvestError> {
    let mut ids: Vec<String> = glob_in(&layout.results_dir(), "*.json")?
      .filter_map(Result::ok)
      .filter_map(|path| path.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
      .collect();
    ids.sort();
    trace!("Found query tables {ids:?}");
    Ok(ids)
  }

  async fn load(
    &self,
    layout: &ProjectLayout,
    query_id: &str,
  ) -> Result<Vec<PaperRecord>, HarvestError> {
    let path = layout.results_dir().join(format!("{query_id}.json"));
    let text = tokio::fs::read_to_string(&path).await?;
    let mut papers: Vec<PaperRecord> = serde_json::from_str(&text)?;
    for (index, paper) in papers.iter_mut().enumerate() {
      paper.paper_id = index as u64;
    }
    debug!("Loaded {} papers for query {query_id}", papers.len());
    Ok(papers)
  }
}

/// Concatenates query tables into a manifest.
///
/// Rows are visited query by query, in table order, and numbered sequentially. A row whose
/// exported content exactly matches an earlier manifest row is folded into it by adding its
/// query id to `source_queries`.
pub fn consolidate(tables: &[(String, Vec<PaperRecord>)]) -> Vec<PaperRecord> {
  let mut manifest: Vec<PaperRecord> = Vec::new();
  let mut index: HashMap<RecordKey, usize> = HashMap::new();

  for (query_id, papers) in tables {
    for paper in papers {
      let key = paper.record_key();
      if let Some(&position) = index.get(&key) {
        manifest[position].source_queries.insert(query_id.clone());
        continue;
      }

      let mut row = paper.clone();
      row.paper_id = manifest.len() as u64;
      row.source_queries = BTreeSet::from([query_id.clone()]);
      row.is_duplicate = false;
      row.duplicate_of = None;
      index.insert(key, manifest.len());
      manifest.push(row);
    }
  }

  info!(
    "Consolidated {} rows from {} queries into {} manifest papers",
    tables.iter().map(|(_, papers)| papers.len()).sum::<usize>(),
    tables.len(),
    manifest.len()
  );
  manifest
}

/// Copies operator duplicate marks from a previous manifest onto a new one.
///
/// Rows are matched by exported content. A mark survives only if both the marked row and
/// the row it points at still exist; `duplicate_of` is renumbered to the new ids.
pub fn carry_duplicate_marks(previous: &[PaperRecord], manifest: &mut [PaperRecord]) {
  let new_ids: HashMap<RecordKey, u64> =
    manifest.iter().map(|paper| (paper.record_key(), paper.paper_id)).collect();
  let old_to_new: HashMap<u64, u64> = previous
    .iter()
    .filter_map(|paper| new_ids.get(&paper.record_key()).map(|&new| (paper.paper_id, new)))
    .collect();
  let marks: HashMap<RecordKey, u64> = previous
    .iter()
    .filter(|paper| paper.is_duplicate)
    .filter_map(|paper| {
      let target = old_to_new.get(&paper.duplicate_of?)?;
      Some((paper.record_key(), *target))
    })
    .collect();

  for paper in manifest.iter_mut() {
    if let Some(&target) = marks.get(&paper.record_key()) {
      if target != paper.paper_id {
        paper.is_duplicate = true;
        paper.duplicate_of = Some(target);
      }
    }
  }
}

/// The slice of a project run that belongs to one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResults {
  /// Manifest rows found by the query
  pub papers:   Vec<PaperRecord>,
  /// Their outcomes, in the same order
  pub outcomes: Vec<AcquisitionOutcome>,
}

/// Re-expands a project run onto every source query.
///
/// `outcomes[i]` must belong to `manifest[i]`; rows past the end of `outcomes` (cut off by
/// `max_downloads`) are left out. Outcomes keep manifest paper ids.
pub fn back_project(
  manifest: &[PaperRecord],
  outcomes: &[AcquisitionOutcome],
) -> BTreeMap<String, QueryResults> {
  let mut by_query: BTreeMap<String, QueryResults> = BTreeMap::new();
  for (paper, outcome) in manifest.iter().zip(outcomes) {
    for query_id in &paper.source_queries {
      let entry = by_query.entry(query_id.clone()).or_default();
      entry.papers.push(paper.clone());
      entry.outcomes.push(outcome.clone());
    }
  }
  by_query
}
