//! Running the acquirer over a whole paper table.
//!
//! The batch runner takes one paper at a time, in table order. On top of [`Acquirer`] it
//! adds isolation and bookkeeping:
//!
//! - an optional cutoff (`max_downloads`) is applied to the table before anything else,
//! - rows flagged as operator-marked duplicates are `Skipped` without network access,
//! - every row is acquired in its own task, so even a panic inside acquisition becomes a
//!   `Failed` outcome instead of taking the run down,
//! - a fixed delay follows every `Success` to stay polite to publishers,
//! - a [`CancelFlag`] is polled before every row; rows not reached are `Skipped`,
//! - reports are written once the loop is done, and a reporting failure is logged without
//!   touching the downloads.
//!
//! The returned list always has one outcome per row of the (cut-off) table, in order.

use std::sync::atomic::{AtomicBool, Ordering};

use super::*;
use crate::report::{ReportScope, Reporter};

/// Cooperative cancellation shared between a run and whoever wants to stop it.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
  /// A flag that is not yet raised.
  pub fn new() -> Self { Self::default() }

  /// Asks the run to stop before its next paper.
  pub fn cancel(&self) { self.0.store(true, Ordering::SeqCst) }

  /// Whether cancellation was requested.
  pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::SeqCst) }

  /// Lowers the flag again so the next run starts fresh.
  pub fn reset(&self) { self.0.store(false, Ordering::SeqCst) }
}

/// Per-run knobs.
#[derive(Debug, Clone)]
pub struct BatchOptions {
  /// Process at most this many rows from the top of the table
  pub max_downloads: Option<usize>,
  /// Pause after every successful download
  pub rate_limit:    Duration,
  /// Raised to stop the run early
  pub cancel:        CancelFlag,
  /// Where to file the run's reports; `None` skips reporting
  pub report_scope:  Option<ReportScope>,
}

impl BatchOptions {
  /// Options with the given rate limit and nothing else.
  pub fn new(rate_limit: Duration) -> Self {
    Self { max_downloads: None, rate_limit, cancel: CancelFlag::new(), report_scope: None }
  }

  /// Sets the row cutoff.
  pub fn max_downloads(mut self, max_downloads: Option<usize>) -> Self {
    self.max_downloads = max_downloads;
    self
  }

  /// Shares a cancel flag with the caller.
  pub fn cancel_flag(mut self, cancel: CancelFlag) -> Self {
    self.cancel = cancel;
    self
  }

  /// Files reports under the given scope.
  pub fn report_as(mut self, scope: ReportScope) -> Self {
    self.report_scope = Some(scope);
    self
  }
}

impl Default for BatchOptions {
  fn default() -> Self { Self::new(HarvestConfig::default().rate_limit()) }
}

/// Sequentially acquires every paper of a table.
#[derive(Clone)]
pub struct BatchRunner {
  /// Single-paper primitive
  acquirer: Acquirer,
  /// Report writer, if the run should be reported
  reporter: Option<Reporter>,
}

impl BatchRunner {
  /// A runner that does not write reports.
  pub fn new(acquirer: Acquirer) -> Self { Self { acquirer, reporter: None } }

  /// Attaches a report writer.
  pub fn with_reporter(mut self, reporter: Reporter) -> Self {
    self.reporter = Some(reporter);
    self
  }

  /// Runs the acquirer over `papers`, writing PDFs into `output_dir`.
  pub async fn run(
    &self,
    papers: &[PaperRecord],
    output_dir: &Path,
    options: &BatchOptions,
  ) -> Vec<AcquisitionOutcome> {
    let papers = match options.max_downloads {
      Some(max) if max < papers.len() => {
        info!("Limiting run to the first {max} of {} papers", papers.len());
        &papers[..max]
      },
      _ => papers,
    };
    let total = papers.len();
    info!("Processing {total} papers into {}", output_dir.display());

    let mut outcomes = Vec::with_capacity(total);
    for (index, paper) in papers.iter().enumerate() {
      if options.cancel.is_cancelled() {
        warn!("Run cancelled, skipping the remaining {} papers", total - index);
        outcomes.extend(papers[index..].iter().map(AcquisitionOutcome::skipped));
        break;
      }

      if paper.is_duplicate {
        debug!("Paper {} is marked as a duplicate of {:?}", paper.paper_id, paper.duplicate_of);
        outcomes.push(AcquisitionOutcome::skipped(paper));
        continue;
      }

      info!("[{}/{total}] {}", index + 1, paper.title_or_default());
      let outcome = self.acquire_isolated(paper, output_dir).await;
      let succeeded = outcome.status() == AcquisitionStatus::Success;
      outcomes.push(outcome);

      if succeeded && !options.rate_limit.is_zero() {
        tokio::time::sleep(options.rate_limit).await;
      }
    }

    let summary = Summary::from_outcomes(&outcomes);
    info!(
      "Run finished: {} downloaded, {} already present, {} manual, {} failed, {} skipped",
      summary.successful_downloads,
      summary.already_existed,
      summary.manual_required,
      summary.failed_downloads,
      summary.skipped
    );

    if let (Some(reporter), Some(scope)) = (&self.reporter, &options.report_scope) {
      if let Err(e) = reporter.write_run_reports(scope, papers, &outcomes).await {
        error!("Failed to write reports for {scope}: {e}");
      }
    }

    outcomes
  }

  /// Acquires one paper in its own task so that a panic stays contained.
  async fn acquire_isolated(&self, paper: &PaperRecord, output_dir: &Path) -> AcquisitionOutcome {
    let acquirer = self.acquirer.clone();
    let task_paper = paper.clone();
    let output_dir = output_dir.to_path_buf();

    match tokio::spawn(async move { acquirer.acquire(&task_paper, &output_dir).await }).await {
      Ok(outcome) => outcome,
      Err(e) => {
        error!("Processing paper {} aborted: {e}", paper.paper_id);
        AcquisitionOutcome::failed(paper, format!("Unexpected error: {e}"))
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use tempfile::tempdir;

  use super::*;
  use crate::{clients::mock::MockFetcher, hints::ManualHints};

  fn paper(id: u64, doi: Option<&str>) -> PaperRecord {
    let mut paper = PaperRecord::new(id, format!("Paper number {id}"));
    paper.authors = Some("Doe, Jane".into());
    paper.year = Some("2024".into());
    paper.doi = doi.map(str::to_string);
    paper
  }

  fn runner(fetcher: Arc<MockFetcher>) -> BatchRunner {
    BatchRunner::new(Acquirer::new(fetcher, ManualHints::default()))
  }

  #[traced_test]
  #[tokio::test]
  async fn test_panicking_row_is_isolated() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let fetcher = Arc::new(
      MockFetcher::new()
        .pdf("https://doi.org/10.1/a", b"%PDF-a")
        .explode("https://doi.org/10.1/boom")
        .pdf("https://doi.org/10.1/c", b"%PDF-c"),
    );
    let papers =
      vec![paper(0, Some("10.1/a")), paper(1, Some("10.1/boom")), paper(2, Some("10.1/c"))];

    let outcomes =
      runner(fetcher).run(&papers, dir.path(), &BatchOptions::new(Duration::ZERO)).await;

    let statuses: Vec<_> = outcomes.iter().map(|o| o.status()).collect();
    assert_eq!(statuses, vec![
      AcquisitionStatus::Success,
      AcquisitionStatus::Failed,
      AcquisitionStatus::Success
    ]);
    assert!(outcomes[1].error_message().is_some());
    Ok(())
  }

  #[traced_test]
  #[tokio::test]
  async fn test_cutoff_and_duplicates() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let fetcher = Arc::new(MockFetcher::new());
    let mut papers: Vec<_> = (0..5).map(|id| paper(id, None)).collect();
    papers[1].is_duplicate = true;
    papers[1].duplicate_of = Some(0);

    let options = BatchOptions::new(Duration::ZERO).max_downloads(Some(3));
    let outcomes = runner(fetcher.clone()).run(&papers, dir.path(), &options).await;

    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[1].status(), AcquisitionStatus::Skipped);
    assert_eq!(outcomes[0].status(), AcquisitionStatus::ManualRequired);
    assert_eq!(fetcher.call_count(), 0);
    Ok(())
  }

  #[traced_test]
  #[tokio::test]
  async fn test_cancelled_run_skips_remaining_rows() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let fetcher = Arc::new(MockFetcher::new());
    let papers: Vec<_> = (0..4).map(|id| paper(id, Some("10.1/x"))).collect();

    let cancel = CancelFlag::new();
    cancel.cancel();
    let options = BatchOptions::new(Duration::ZERO).cancel_flag(cancel);
    let outcomes = runner(fetcher.clone()).run(&papers, dir.path(), &options).await;

    assert_eq!(outcomes.len(), 4);
    assert!(outcomes.iter().all(|o| o.status() == AcquisitionStatus::Skipped));
    assert_eq!(fetcher.call_count(), 0);
    Ok(())
  }

  #[tokio::test(start_paused = true)]
  async fn test_rate_limit_follows_success_only() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let fetcher = Arc::new(
      MockFetcher::new()
        .pdf("https://doi.org/10.1/a", b"%PDF-a")
        .pdf("https://doi.org/10.1/b", b"%PDF-b"),
    );
    let papers = vec![
      paper(0, Some("10.1/a")),
      paper(1, Some("10.1/missing")),
      paper(2, Some("10.1/b")),
      paper(3, None),
    ];

    let start = tokio::time::Instant::now();
    let options = BatchOptions::new(Duration::from_secs(5));
    let outcomes = runner(fetcher).run(&papers, dir.path(), &options).await;

    assert_eq!(Summary::from_outcomes(&outcomes).successful_downloads, 2);
    assert_eq!(start.elapsed().as_secs(), 10);
    Ok(())
  }
}
