//! Acquisition outcomes and their aggregation.
//!
//! Every paper processed in a run yields exactly one [`AcquisitionOutcome`]. Outcomes are
//! created through status-specific constructors and expose their data read-only, so the
//! pairing rules hold for every value in the program:
//!
//! - `file_path` is set iff the status is [`AcquisitionStatus::Success`] or
//!   [`AcquisitionStatus::AlreadyExisted`],
//! - `error_message` is set iff the status is [`AcquisitionStatus::Failed`] or
//!   [`AcquisitionStatus::ManualRequired`].

use super::*;
use crate::resolve::CandidateSource;

/// The terminal state of one paper in one run.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionStatus {
  /// A PDF was downloaded in this run
  Success,
  /// The PDF was already on disk; nothing was fetched
  AlreadyExisted,
  /// Every automatic candidate was exhausted; an operator has to fetch this one
  ManualRequired,
  /// An unexpected error stopped processing of this paper
  Failed,
  /// A single submitted URL pointed at nothing
  NotFound,
  /// The paper was deliberately not processed (operator-marked duplicate, or the run was
  /// cancelled before reaching it)
  Skipped,
}

impl AcquisitionStatus {
  /// Whether a usable PDF exists after this outcome.
  pub fn has_file(&self) -> bool {
    matches!(self, AcquisitionStatus::Success | AcquisitionStatus::AlreadyExisted)
  }

  /// The label used in reports.
  pub fn label(&self) -> &'static str {
    match self {
      AcquisitionStatus::Success => "success",
      AcquisitionStatus::AlreadyExisted => "already_existed",
      AcquisitionStatus::ManualRequired => "manual_required",
      AcquisitionStatus::Failed => "failed",
      AcquisitionStatus::NotFound => "not_found",
      AcquisitionStatus::Skipped => "skipped",
    }
  }
}

impl std::fmt::Display for AcquisitionStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.label()) }
}

/// The result of processing one paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionOutcome {
  /// Id of the paper in the table that was processed
  paper_id:        u64,
  /// The paper's title, for display
  title:           String,
  /// What happened
  status:          AcquisitionStatus,
  /// Where the PDF is
  file_path:       Option<PathBuf>,
  /// Why no PDF was obtained
  error_message:   Option<String>,
  /// Which candidate produced the PDF
  download_source: Option<CandidateSource>,
  /// Size of the PDF in bytes
  file_size:       Option<u64>,
  /// When this outcome was recorded
  timestamp:       DateTime<Utc>,
}

impl AcquisitionOutcome {
  /// Shared constructor.
  fn new(paper: &PaperRecord, status: AcquisitionStatus) -> Self {
    Self {
      paper_id: paper.paper_id,
      title: paper.title_or_default().to_string(),
      status,
      file_path: None,
      error_message: None,
      download_source: None,
      file_size: None,
      timestamp: Utc::now(),
    }
  }

  /// A PDF was fetched from `source` and written to `file_path`.
  pub fn success(
    paper: &PaperRecord,
    file_path: PathBuf,
    source: CandidateSource,
    file_size: u64,
  ) -> Self {
    Self {
      file_path: Some(file_path),
      download_source: Some(source),
      file_size: Some(file_size),
      ..Self::new(paper, AcquisitionStatus::Success)
    }
  }

  /// The target file was already present.
  pub fn already_existed(paper: &PaperRecord, file_path: PathBuf, file_size: u64) -> Self {
    Self {
      file_path: Some(file_path),
      file_size: Some(file_size),
      ..Self::new(paper, AcquisitionStatus::AlreadyExisted)
    }
  }

  /// No candidate produced a PDF.
  pub fn manual_required(paper: &PaperRecord, message: impl Into<String>) -> Self {
    Self { error_message: Some(message.into()), ..Self::new(paper, AcquisitionStatus::ManualRequired) }
  }

  /// Processing the paper failed unexpectedly.
  pub fn failed(paper: &PaperRecord, message: impl Into<String>) -> Self {
    Self { error_message: Some(message.into()), ..Self::new(paper, AcquisitionStatus::Failed) }
  }

  /// A submitted URL answered "not found".
  pub fn not_found(paper: &PaperRecord) -> Self { Self::new(paper, AcquisitionStatus::NotFound) }

  /// The paper was not processed.
  pub fn skipped(paper: &PaperRecord) -> Self { Self::new(paper, AcquisitionStatus::Skipped) }

  /// Id of the processed paper.
  pub fn paper_id(&self) -> u64 { self.paper_id }

  /// Title of the processed paper.
  pub fn title(&self) -> &str { &self.title }

  /// The terminal status.
  pub fn status(&self) -> AcquisitionStatus { self.status }

  /// Path of the PDF, for `Success` and `AlreadyExisted`.
  pub fn file_path(&self) -> Option<&Path> { self.file_path.as_deref() }

  /// Human-readable reason, for `Failed` and `ManualRequired`.
  pub fn error_message(&self) -> Option<&str> { self.error_message.as_deref() }

  /// The winning candidate, for `Success`.
  pub fn download_source(&self) -> Option<CandidateSource> { self.download_source }

  /// Size of the PDF in bytes.
  pub fn file_size(&self) -> Option<u64> { self.file_size }

  /// When the outcome was recorded.
  pub fn timestamp(&self) -> DateTime<Utc> { self.timestamp }
}

/// Aggregated counts over a set of outcomes.
///
/// Every status lands in exactly one bucket, so the buckets always sum to `total_papers`.
/// Missing fields deserialize as zero so older and newer report files stay readable.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Summary {
  /// Number of outcomes
  pub total_papers:         usize,
  /// `Success`
  pub successful_downloads: usize,
  /// `AlreadyExisted`
  pub already_existed:      usize,
  /// `Failed` and `NotFound`
  pub failed_downloads:     usize,
  /// `ManualRequired`
  pub manual_required:      usize,
  /// `Skipped`
  pub skipped:              usize,
}

impl Summary {
  /// Counts a set of outcomes.
  pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a AcquisitionOutcome>) -> Self {
    let mut summary = Self::default();
    for outcome in outcomes {
      summary.record(outcome.status());
    }
    summary
  }

  /// Adds one outcome to the counts.
  pub fn record(&mut self, status: AcquisitionStatus) {
    self.total_papers += 1;
    match status {
      AcquisitionStatus::Success => self.successful_downloads += 1,
      AcquisitionStatus::AlreadyExisted => self.already_existed += 1,
      AcquisitionStatus::Failed | AcquisitionStatus::NotFound => self.failed_downloads += 1,
      AcquisitionStatus::ManualRequired => self.manual_required += 1,
      AcquisitionStatus::Skipped => self.skipped += 1,
    }
  }

  /// Adds another summary's counts to this one.
  pub fn merge(&mut self, other: &Summary) {
    self.total_papers += other.total_papers;
    self.successful_downloads += other.successful_downloads;
    self.already_existed += other.already_existed;
    self.failed_downloads += other.failed_downloads;
    self.manual_required += other.manual_required;
    self.skipped += other.skipped;
  }

  /// Sum of all status buckets.
  pub fn bucket_total(&self) -> usize {
    self.successful_downloads
      + self.already_existed
      + self.failed_downloads
      + self.manual_required
      + self.skipped
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_constructors_pair_fields() {
    let paper = PaperRecord::new(123, "Test Paper");

    let ok = AcquisitionOutcome::success(
      &paper,
      PathBuf::from("/test/path.pdf"),
      CandidateSource::DoiDirect,
      1024,
    );
    assert_eq!(ok.status(), AcquisitionStatus::Success);
    assert_eq!(ok.file_path(), Some(Path::new("/test/path.pdf")));
    assert_eq!(ok.error_message(), None);
    assert_eq!(ok.download_source(), Some(CandidateSource::DoiDirect));
    assert_eq!(ok.file_size(), Some(1024));

    let manual = AcquisitionOutcome::manual_required(&paper, "go to the library");
    assert_eq!(manual.file_path(), None);
    assert_eq!(manual.error_message(), Some("go to the library"));

    let skipped = AcquisitionOutcome::skipped(&paper);
    assert_eq!(skipped.file_path(), None);
    assert_eq!(skipped.error_message(), None);
  }

  #[test]
  fn test_outcome_serialization() {
    let paper = PaperRecord::new(123, "Test Paper");
    let outcome = AcquisitionOutcome::success(
      &paper,
      PathBuf::from("/test/path.pdf"),
      CandidateSource::FulltextUrl,
      1024,
    );

    let value = serde_json::to_value(&outcome).unwrap();
    assert_eq!(value["paper_id"], 123);
    assert_eq!(value["title"], "Test Paper");
    assert_eq!(value["status"], "success");
    assert_eq!(value["file_path"], "/test/path.pdf");
    assert_eq!(value["download_source"], "fulltext_url");
    assert_eq!(value["file_size"], 1024);
    assert!(value["timestamp"].is_string());

    let back: AcquisitionOutcome = serde_json::from_value(value).unwrap();
    assert_eq!(back, outcome);
  }

  #[test]
  fn test_summary_buckets_sum_to_total() {
    let paper = PaperRecord::new(1, "P");
    let outcomes = vec![
      AcquisitionOutcome::success(&paper, "a.pdf".into(), CandidateSource::Arxiv, 1),
      AcquisitionOutcome::already_existed(&paper, "a.pdf".into(), 1),
      AcquisitionOutcome::manual_required(&paper, "m"),
      AcquisitionOutcome::failed(&paper, "f"),
      AcquisitionOutcome::not_found(&paper),
      AcquisitionOutcome::skipped(&paper),
    ];

    let summary = Summary::from_outcomes(&outcomes);
    assert_eq!(summary.total_papers, 6);
    assert_eq!(summary.failed_downloads, 2);
    assert_eq!(summary.bucket_total(), summary.total_papers);
  }

  #[test]
  fn test_summary_tolerates_missing_fields() {
    let summary: Summary =
      serde_json::from_str(r#"{ "total_papers": 4, "successful_downloads": 3 }"#).unwrap();
    assert_eq!(summary.already_existed, 0);
    assert_eq!(summary.manual_required, 0);
    assert_eq!(summary.total_papers, 4);
  }
}
