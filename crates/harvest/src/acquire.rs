//! Single-paper acquisition.
//!
//! [`Acquirer::acquire`] is the workhorse of the pipeline. Given one paper and a target
//! directory it always returns exactly one [`AcquisitionOutcome`], in this order of checks:
//!
//! 1. a paper with none of DOI, URL, ArticleURL or FullTextURL is `ManualRequired` right
//!    away, without touching the network,
//! 2. a paper whose deterministic PDF filename already exists in the directory is
//!    `AlreadyExisted`, again without touching the network,
//! 3. otherwise the resolved candidates are fetched in priority order; the first `200`
//!    response with a PDF content type is written to disk and the paper is a `Success`,
//! 4. if every candidate is exhausted the paper is `ManualRequired`, with a publisher hint.
//!
//! Anything unexpected along the way, such as a failed disk write, yields `Failed` rather
//! than an error, so callers never need to handle a per-paper `Err`.
//!
//! # Examples
//!
//! ```no_run
//! use std::{path::Path, sync::Arc};
//!
//! use harvest::{Acquirer, AcquisitionStatus, HarvestConfig, HttpClient, PaperRecord};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HarvestConfig::default();
//! let acquirer = Acquirer::new(Arc::new(HttpClient::new(&config)?), config.manual_hints());
//!
//! let mut paper = PaperRecord::new(0, "Attention Is All You Need");
//! paper.url = Some("https://arxiv.org/abs/1706.03762".into());
//!
//! let outcome = acquirer.acquire(&paper, Path::new("pdfs/automatic")).await;
//! if outcome.status() == AcquisitionStatus::Success {
//!   println!("Saved to {}", outcome.file_path().unwrap().display());
//! }
//! # Ok(())
//! # }
//! ```

use super::*;
use crate::{
  clients::Fetch,
  hints::ManualHints,
  resolve::{resolve_candidates, Candidate, CandidateQuery, CandidateSource},
};

/// Message for papers that carry no identifier at all.
pub const NO_IDENTIFIERS_MESSAGE: &str =
  "No DOI, URL, ArticleURL, or FullTextURL available for automatic download";

/// Downloads PDFs for single papers.
#[derive(Clone)]
pub struct Acquirer {
  /// Shared HTTP seam
  fetcher: Arc<dyn Fetch>,
  /// Guidance for exhausted papers
  hints:   ManualHints,
}

impl Acquirer {
  /// Creates an acquirer around a fetcher.
  pub fn new(fetcher: Arc<dyn Fetch>, hints: ManualHints) -> Self { Self { fetcher, hints } }

  /// Acquires the PDF for one paper into `output_dir`.
  pub async fn acquire(&self, paper: &PaperRecord, output_dir: &Path) -> AcquisitionOutcome {
    match self.try_acquire(paper, output_dir).await {
      Ok(outcome) => outcome,
      Err(e) => {
        error!("Paper {} failed: {e}", paper.paper_id);
        AcquisitionOutcome::failed(paper, format!("Unexpected error: {e}"))
      },
    }
  }

  /// Fetches one operator-submitted URL for a paper into `output_dir`.
  ///
  /// The submitted URL is the only candidate. A `404` answer yields `NotFound`, any other
  /// non-PDF answer or transport failure yields `ManualRequired`.
  pub async fn acquire_from_url(
    &self,
    paper: &PaperRecord,
    submitted_url: &str,
    output_dir: &Path,
  ) -> AcquisitionOutcome {
    match self.try_acquire_from_url(paper, submitted_url, output_dir).await {
      Ok(outcome) => outcome,
      Err(e) => {
        error!("Submitted URL for paper {} failed: {e}", paper.paper_id);
        AcquisitionOutcome::failed(paper, format!("Error downloading from submitted URL: {e}"))
      },
    }
  }

  /// The fallible body of [`Acquirer::acquire`].
  async fn try_acquire(
    &self,
    paper: &PaperRecord,
    output_dir: &Path,
  ) -> Result<AcquisitionOutcome, HarvestError> {
    if !paper.has_identifiers() {
      debug!("Paper {} has no identifiers", paper.paper_id);
      return Ok(AcquisitionOutcome::manual_required(paper, NO_IDENTIFIERS_MESSAGE));
    }

    let target = output_dir.join(paper.pdf_filename());
    if let Some(outcome) = existing(paper, &target).await? {
      return Ok(outcome);
    }

    let candidates = resolve_candidates(&CandidateQuery::from(paper));
    debug!("Paper {}: trying {} candidates", paper.paper_id, candidates.len());

    for candidate in &candidates {
      match self.fetcher.fetch(candidate).await {
        Ok(response) if response.is_pdf() => {
          let size = write_pdf(&target, &response.body).await?;
          info!("Downloaded paper {} from {}", paper.paper_id, candidate.source);
          return Ok(AcquisitionOutcome::success(paper, target, candidate.source, size));
        },
        Ok(response) if response.is_ok() => {
          debug!("{} served {:?}, not a PDF", candidate.source, response.content_type);
        },
        Ok(response) => debug!("{} answered {}", candidate.source, response.status),
        Err(e) => debug!("{} failed: {e}", candidate.source),
      }
    }

    let identifiers: Vec<&str> =
      [paper.doi(), paper.url(), paper.article_url(), paper.fulltext_url()]
        .into_iter()
        .flatten()
        .collect();
    Ok(AcquisitionOutcome::manual_required(paper, self.hints.message_for(&identifiers)))
  }

  /// The fallible body of [`Acquirer::acquire_from_url`].
  async fn try_acquire_from_url(
    &self,
    paper: &PaperRecord,
    submitted_url: &str,
    output_dir: &Path,
  ) -> Result<AcquisitionOutcome, HarvestError> {
    let target = output_dir.join(paper.pdf_filename());
    if let Some(outcome) = existing(paper, &target).await? {
      return Ok(outcome);
    }

    let candidate = Candidate::new(CandidateSource::SubmittedUrl, submitted_url.trim());
    match self.fetcher.fetch(&candidate).await {
      Ok(response) if response.is_pdf() => {
        let size = write_pdf(&target, &response.body).await?;
        info!("Downloaded paper {} from submitted URL", paper.paper_id);
        Ok(AcquisitionOutcome::success(paper, target, candidate.source, size))
      },
      Ok(response) if response.status == 404 => Ok(AcquisitionOutcome::not_found(paper)),
      Ok(response) if response.is_ok() => Ok(AcquisitionOutcome::manual_required(
        paper,
        format!(
          "Submitted URL did not serve a PDF (content-type: {})",
          response.content_type.as_deref().unwrap_or("unknown")
        ),
      )),
      Ok(response) => Ok(AcquisitionOutcome::manual_required(
        paper,
        format!("Submitted URL answered HTTP {}", response.status),
      )),
      Err(e) => Ok(AcquisitionOutcome::manual_required(
        paper,
        format!("Submitted URL could not be fetched: {e}"),
      )),
    }
  }
}

/// `AlreadyExisted` for a target that is already on disk.
async fn existing(
  paper: &PaperRecord,
  target: &Path,
) -> Result<Option<AcquisitionOutcome>, HarvestError> {
  match tokio::fs::metadata(target).await {
    Ok(metadata) => {
      debug!("Paper {} already at {}", paper.paper_id, target.display());
      Ok(Some(AcquisitionOutcome::already_existed(paper, target.to_path_buf(), metadata.len())))
    },
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
    Err(e) => Err(e.into()),
  }
}

/// Writes a PDF next to its final name, then renames it into place.
///
/// Returns the number of bytes written.
async fn write_pdf(target: &Path, bytes: &[u8]) -> Result<u64, HarvestError> {
  if let Some(parent) = target.parent() {
    tokio::fs::create_dir_all(parent).await?;
  }
  let partial = target.with_extension("pdf.part");
  tokio::fs::write(&partial, bytes).await?;
  if let Err(e) = tokio::fs::rename(&partial, target).await {
    let _ = tokio::fs::remove_file(&partial).await;
    return Err(e.into());
  }
  trace!("Wrote {} bytes to {}", bytes.len(), target.display());
  Ok(bytes.len() as u64)
}

#[cfg(test)]
mod tests {
  use tempfile::tempdir;

  use super::*;
  use crate::clients::{mock::MockFetcher, FetchResponse};

  fn paper_with_doi() -> PaperRecord {
    let mut paper = PaperRecord::new(123, "Test Paper");
    paper.authors = Some("Smith, John".into());
    paper.year = Some("2023".into());
    paper.doi = Some("10.1000/test".into());
    paper
  }

  fn acquirer(fetcher: Arc<MockFetcher>) -> Acquirer {
    Acquirer::new(fetcher, ManualHints::default())
  }

  #[traced_test]
  #[tokio::test]
  async fn test_no_identifiers_short_circuits() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let fetcher = Arc::new(MockFetcher::new());
    let paper = PaperRecord::new(1, "No Links");

    let outcome = acquirer(fetcher.clone()).acquire(&paper, dir.path()).await;
    assert_eq!(outcome.status(), AcquisitionStatus::ManualRequired);
    assert_eq!(outcome.error_message(), Some(NO_IDENTIFIERS_MESSAGE));
    assert_eq!(fetcher.call_count(), 0);
    Ok(())
  }

  #[traced_test]
  #[tokio::test]
  async fn test_existing_file_is_not_refetched() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let paper = paper_with_doi();
    std::fs::write(dir.path().join(paper.pdf_filename()), b"%PDF-existing")?;
    let fetcher = Arc::new(MockFetcher::new().pdf("https://doi.org/10.1000/test", b"%PDF-new"));

    let outcome = acquirer(fetcher.clone()).acquire(&paper, dir.path()).await;
    assert_eq!(outcome.status(), AcquisitionStatus::AlreadyExisted);
    assert_eq!(outcome.file_size(), Some(13));
    assert_eq!(fetcher.call_count(), 0);
    assert_eq!(std::fs::read(dir.path().join(paper.pdf_filename()))?, b"%PDF-existing");
    Ok(())
  }

  #[traced_test]
  #[tokio::test]
  async fn test_falls_through_to_first_pdf() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let mut paper = paper_with_doi();
    paper.article_url = Some("https://publisher.example/article/1".into());
    paper.url = Some("https://search.example/record/1".into());

    let fetcher = Arc::new(
      MockFetcher::new()
        .respond(
          "https://publisher.example/article/1",
          FetchResponse::status(200, Some("text/html; charset=utf-8")),
        )
        .fail("https://doi.org/10.1000/test")
        .pdf("https://search.example/record/1", b"%PDF-1.5 body"),
    );

    let outcome = acquirer(fetcher.clone()).acquire(&paper, dir.path()).await;
    assert_eq!(outcome.status(), AcquisitionStatus::Success);
    assert_eq!(outcome.download_source(), Some(CandidateSource::OriginalUrl));
    assert_eq!(outcome.file_size(), Some(13));
    assert_eq!(fetcher.call_count(), 3);

    let path = outcome.file_path().unwrap();
    assert_eq!(path, dir.path().join("123_Smith_2023_Test_Paper.pdf"));
    assert_eq!(std::fs::read(path)?, b"%PDF-1.5 body");
    assert!(!dir.path().join("123_Smith_2023_Test_Paper.pdf.part").exists());
    Ok(())
  }

  #[traced_test]
  #[tokio::test]
  async fn test_exhausted_candidates_get_hint() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let mut paper = paper_with_doi();
    paper.article_url = Some("https://ieeexplore.ieee.org/document/9876543".into());

    let fetcher = Arc::new(
      MockFetcher::new()
        .respond("https://ieeexplore.ieee.org/document/9876543", FetchResponse::status(403, None)),
    );

    let outcome = acquirer(fetcher.clone()).acquire(&paper, dir.path()).await;
    assert_eq!(outcome.status(), AcquisitionStatus::ManualRequired);
    assert!(outcome.error_message().unwrap().starts_with("IEEE papers"));
    assert_eq!(outcome.file_path(), None);
    // article, stamp, stampPDF, doi
    assert_eq!(fetcher.call_count(), 4);
    Ok(())
  }

  #[traced_test]
  #[tokio::test]
  async fn test_submitted_url() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let paper = paper_with_doi();
    let fetcher = Arc::new(
      MockFetcher::new()
        .pdf("https://mirror.example/paper.pdf", b"%PDF-manual")
        .respond("https://mirror.example/html", FetchResponse::status(200, Some("text/html"))),
    );
    let acquirer = acquirer(fetcher.clone());

    let missing = acquirer.acquire_from_url(&paper, "https://mirror.example/gone", dir.path()).await;
    assert_eq!(missing.status(), AcquisitionStatus::NotFound);

    let html = acquirer.acquire_from_url(&paper, "https://mirror.example/html", dir.path()).await;
    assert_eq!(html.status(), AcquisitionStatus::ManualRequired);

    let ok = acquirer
      .acquire_from_url(&paper, " https://mirror.example/paper.pdf ", dir.path())
      .await;
    assert_eq!(ok.status(), AcquisitionStatus::Success);
    assert_eq!(ok.download_source(), Some(CandidateSource::SubmittedUrl));

    let again =
      acquirer.acquire_from_url(&paper, "https://mirror.example/paper.pdf", dir.path()).await;
    assert_eq!(again.status(), AcquisitionStatus::AlreadyExisted);
    assert_eq!(fetcher.call_count(), 3);
    Ok(())
  }
}
