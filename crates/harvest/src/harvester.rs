//! The project-level orchestrator.
//!
//! [`Harvester`] ties the pieces together for one projects root: it owns the HTTP seam, the
//! source of query tables and a cache of loaded tables keyed by `(project_id, query_id)`.
//! Re-consolidating a project drops that project's cache entries.
//!
//! # Examples
//!
//! ```no_run
//! use harvest::{Harvester, HarvestConfig};
//!
//! # async fn example() -> Result<(), harvest::HarvestError> {
//! let mut harvester = Harvester::new("/data/reviews", HarvestConfig::default())?;
//!
//! let papers = harvester.consolidate("quantum_planning").await?;
//! println!("Manifest holds {papers} papers");
//!
//! let by_query = harvester.download_project("quantum_planning", Some(25)).await?;
//! for (query_id, outcomes) in &by_query {
//!   println!("{query_id}: {} outcomes", outcomes.len());
//! }
//!
//! let stats = harvester.statistics("quantum_planning", None).await?;
//! println!("{} downloaded so far", stats.summary.successful_downloads);
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;

use super::*;
use crate::{
  project::{back_project, carry_duplicate_marks, consolidate, DownloadedFile},
  report::StatusReport,
};

/// Cached query tables, keyed by `(project_id, query_id)`.
type TableCache = HashMap<(String, String), Arc<Vec<PaperRecord>>>;

/// Runs the acquisition pipeline for projects under one root directory.
pub struct Harvester {
  /// Directory containing one subdirectory per project
  projects_root: PathBuf,
  /// Run configuration
  config:        HarvestConfig,
  /// HTTP seam shared by every run
  fetcher:       Arc<dyn Fetch>,
  /// Where query tables come from
  tables:        Arc<dyn QueryTables>,
  /// Loaded query tables
  cache:         TableCache,
  /// Raised to stop the current run
  cancel:        CancelFlag,
}

impl Harvester {
  /// Creates a harvester with a real HTTP client and JSON query tables.
  pub fn new(projects_root: impl Into<PathBuf>, config: HarvestConfig) -> Result<Self, HarvestError> {
    let fetcher = Arc::new(HttpClient::new(&config)?);
    Ok(Self::with_fetcher(projects_root, config, fetcher))
  }

  /// Creates a harvester around any fetcher.
  pub fn with_fetcher(
    projects_root: impl Into<PathBuf>,
    config: HarvestConfig,
    fetcher: Arc<dyn Fetch>,
  ) -> Self {
    Self {
      projects_root: projects_root.into(),
      config,
      fetcher,
      tables: Arc::new(JsonTables),
      cache: HashMap::new(),
      cancel: CancelFlag::new(),
    }
  }

  /// Replaces the source of query tables.
  pub fn with_tables(mut self, tables: Arc<dyn QueryTables>) -> Self {
    self.tables = tables;
    self
  }

  /// The flag that stops the current run before its next paper.
  ///
  /// Every run lowers the flag when it starts, so a cancelled run does not cancel the next.
  pub fn cancel_flag(&self) -> CancelFlag { self.cancel.clone() }

  /// The projects root.
  pub fn projects_root(&self) -> &Path { &self.projects_root }

  /// Layout of a project under this root.
  pub fn layout(&self, project_id: &str) -> ProjectLayout {
    ProjectLayout::new(&self.projects_root, project_id)
  }

  /// Creates a project's directories.
  pub async fn init_project(&self, project_id: &str) -> Result<ProjectLayout, HarvestError> {
    let layout = self.layout(project_id);
    layout.ensure_dirs().await?;
    info!("Initialized project at {}", layout.root().display());
    Ok(layout)
  }

  /// Loads a query table, from the cache when possible.
  async fn query_table(
    &mut self,
    layout: &ProjectLayout,
    query_id: &str,
  ) -> Result<Arc<Vec<PaperRecord>>, HarvestError> {
    let key = (layout.project_id().to_string(), query_id.to_string());
    if let Some(table) = self.cache.get(&key) {
      trace!("Query table {query_id} served from cache");
      return Ok(table.clone());
    }
    let table = Arc::new(self.tables.load(layout, query_id).await?);
    self.cache.insert(key, table.clone());
    Ok(table)
  }

  /// Drops every cached table of a project.
  fn invalidate(&mut self, project_id: &str) {
    self.cache.retain(|(project, _), _| project != project_id);
  }

  /// Opens a project's manifest store, failing if the project was never consolidated.
  async fn manifest_store(&self, layout: &ProjectLayout) -> Result<ManifestStore, HarvestError> {
    layout.require()?;
    if !layout.manifest_path().exists() {
      return Err(HarvestError::ManifestMissing(layout.project_id().to_string()));
    }
    ManifestStore::open(layout.manifest_path()).await
  }

  /// Merges every query table of a project into its manifest.
  ///
  /// Returns the number of manifest papers. Operator duplicate marks on rows that still exist
  /// are kept.
  pub async fn consolidate(&mut self, project_id: &str) -> Result<usize, HarvestError> {
    let layout = self.layout(project_id);
    layout.require()?;

    let query_ids = self.tables.query_ids(&layout).await?;
    if query_ids.is_empty() {
      return Err(HarvestError::NoQueryTables(project_id.to_string()));
    }

    self.invalidate(project_id);
    let mut tables = Vec::with_capacity(query_ids.len());
    for query_id in query_ids {
      let table = self.query_table(&layout, &query_id).await?;
      tables.push((query_id, table.as_ref().clone()));
    }

    let mut manifest = consolidate(&tables);
    let store = ManifestStore::open(layout.manifest_path()).await?;
    carry_duplicate_marks(&store.load().await?, &mut manifest);
    store.replace(&manifest).await?;

    Ok(manifest.len())
  }

  /// Runs the whole manifest once into `pdfs/automatic/` and reports per project and query.
  ///
  /// Returns the outcomes re-expanded onto every source query.
  pub async fn download_project(
    &mut self,
    project_id: &str,
    max_downloads: Option<usize>,
  ) -> Result<BTreeMap<String, Vec<AcquisitionOutcome>>, HarvestError> {
    let layout = self.layout(project_id);
    let manifest = self.manifest_store(&layout).await?.load().await?;
    layout.ensure_dirs().await?;

    let options = self.run_options().max_downloads(max_downloads);
    let outcomes = self.runner().run(&manifest, &layout.automatic_dir(), &options).await;

    let papers = &manifest[..outcomes.len()];
    Ok(self.report_project(&layout, papers, &outcomes).await)
  }

  /// Re-runs only the papers whose latest project outcome left no PDF behind.
  ///
  /// Papers without a previous outcome are included. The project report written afterwards
  /// combines the new outcomes with the previous ones for everything that was not retried.
  pub async fn retry_failed(
    &mut self,
    project_id: &str,
  ) -> Result<BTreeMap<String, Vec<AcquisitionOutcome>>, HarvestError> {
    let layout = self.layout(project_id);
    let manifest = self.manifest_store(&layout).await?.load().await?;
    layout.ensure_dirs().await?;

    let reporter = Reporter::new(layout.reports_dir());
    let previous: HashMap<u64, AcquisitionOutcome> = reporter
      .read_latest(&ReportScope::Project(project_id.to_string()))
      .await?
      .map(|report: StatusReport| report.results)
      .unwrap_or_default()
      .into_iter()
      .map(|outcome| (outcome.paper_id(), outcome))
      .collect();

    let retry: Vec<PaperRecord> = manifest
      .iter()
      .filter(|paper| previous.get(&paper.paper_id).map_or(true, |o| !o.status().has_file()))
      .cloned()
      .collect();
    info!("Retrying {} of {} papers", retry.len(), manifest.len());

    let options = self.run_options();
    let fresh = self.runner().run(&retry, &layout.automatic_dir(), &options).await;
    let retried: HashSet<u64> = retry.iter().map(|paper| paper.paper_id).collect();
    let mut fresh: HashMap<u64, AcquisitionOutcome> =
      fresh.into_iter().map(|outcome| (outcome.paper_id(), outcome)).collect();

    let mut papers = Vec::new();
    let mut outcomes = Vec::new();
    for paper in manifest {
      let outcome = if retried.contains(&paper.paper_id) {
        fresh.remove(&paper.paper_id)
      } else {
        previous.get(&paper.paper_id).cloned()
      };
      if let Some(outcome) = outcome {
        papers.push(paper);
        outcomes.push(outcome);
      }
    }

    Ok(self.report_project(&layout, &papers, &outcomes).await)
  }

  /// Downloads the papers of one query.
  ///
  /// After consolidation this runs the manifest rows found by the query, so filenames agree
  /// with project runs; before consolidation it runs the raw query table.
  pub async fn download_query(
    &mut self,
    project_id: &str,
    query_id: &str,
    max_downloads: Option<usize>,
  ) -> Result<Vec<AcquisitionOutcome>, HarvestError> {
    let layout = self.layout(project_id);
    layout.require()?;

    let papers: Vec<PaperRecord> = if layout.manifest_path().exists() {
      let store = ManifestStore::open(layout.manifest_path()).await?;
      store.load().await?.into_iter().filter(|p| p.source_queries.contains(query_id)).collect()
    } else {
      self.query_table(&layout, query_id).await?.as_ref().clone()
    };
    layout.ensure_dirs().await?;

    let options = self
      .run_options()
      .max_downloads(max_downloads)
      .report_as(ReportScope::Query(query_id.to_string()));
    let runner = self.runner().with_reporter(Reporter::new(layout.reports_dir()));
    Ok(runner.run(&papers, &layout.automatic_dir(), &options).await)
  }

  /// Fetches an operator-submitted URL for one manifest paper into `pdfs/manual/`.
  pub async fn submit_url(
    &self,
    project_id: &str,
    paper_id: u64,
    submitted_url: &str,
  ) -> Result<AcquisitionOutcome, HarvestError> {
    let parsed = url::Url::parse(submitted_url.trim())?;
    if !matches!(parsed.scheme(), "http" | "https") {
      return Err(HarvestError::InvalidUrl(submitted_url.to_string()));
    }

    let layout = self.layout(project_id);
    let store = self.manifest_store(&layout).await?;
    let paper = store.get(paper_id).await?.ok_or(HarvestError::PaperNotFound(paper_id))?;
    layout.ensure_dirs().await?;

    Ok(self.acquirer().acquire_from_url(&paper, parsed.as_str(), &layout.manual_dir()).await)
  }

  /// Marks a manifest paper as a duplicate of another; later runs skip it.
  pub async fn mark_duplicate(
    &self,
    project_id: &str,
    paper_id: u64,
    duplicate_of: u64,
  ) -> Result<(), HarvestError> {
    self.manifest_store(&self.layout(project_id)).await?.mark_duplicate(paper_id, duplicate_of).await
  }

  /// Removes a duplicate mark.
  pub async fn clear_duplicate(&self, project_id: &str, paper_id: u64) -> Result<(), HarvestError> {
    self.manifest_store(&self.layout(project_id)).await?.clear_duplicate(paper_id).await
  }

  /// Aggregate statistics for a project, or for one of its queries.
  pub async fn statistics(
    &self,
    project_id: &str,
    query_id: Option<&str>,
  ) -> Result<Statistics, HarvestError> {
    let layout = self.layout(project_id);
    layout.require()?;
    Reporter::new(layout.reports_dir()).statistics(query_id).await
  }

  /// Removes every report of a project except the reports `README.md`.
  pub async fn clean_reports(&self, project_id: &str) -> Result<usize, HarvestError> {
    let layout = self.layout(project_id);
    layout.require()?;
    Reporter::new(layout.reports_dir()).clean().await
  }

  /// PDFs currently on disk for a project.
  pub async fn list_downloads(&self, project_id: &str) -> Result<Vec<DownloadedFile>, HarvestError> {
    let layout = self.layout(project_id);
    layout.require()?;
    layout.list_downloads().await
  }

  /// A fresh acquirer over the shared fetcher.
  fn acquirer(&self) -> Acquirer { Acquirer::new(self.fetcher.clone(), self.config.manual_hints()) }

  /// A batch runner without its own reporting.
  fn runner(&self) -> BatchRunner { BatchRunner::new(self.acquirer()) }

  /// Options for a new run, sharing the harvester's cancel flag after lowering it.
  fn run_options(&self) -> BatchOptions {
    self.cancel.reset();
    BatchOptions::new(self.config.rate_limit()).cancel_flag(self.cancel.clone())
  }

  /// Writes the project report and one report per source query. Reporting errors are logged.
  async fn report_project(
    &self,
    layout: &ProjectLayout,
    papers: &[PaperRecord],
    outcomes: &[AcquisitionOutcome],
  ) -> BTreeMap<String, Vec<AcquisitionOutcome>> {
    let reporter = Reporter::new(layout.reports_dir());
    let project_scope = ReportScope::Project(layout.project_id().to_string());
    if let Err(e) = reporter.write_run_reports(&project_scope, papers, outcomes).await {
      error!("Failed to write reports for {project_scope}: {e}");
    }

    let mut by_query = BTreeMap::new();
    for (query_id, results) in back_project(papers, outcomes) {
      let scope = ReportScope::Query(query_id.clone());
      if let Err(e) = reporter.write_run_reports(&scope, &results.papers, &results.outcomes).await {
        error!("Failed to write reports for {scope}: {e}");
      }
      by_query.insert(query_id, results.outcomes);
    }
    by_query
  }
}
