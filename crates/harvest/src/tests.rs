use tempfile::{tempdir, TempDir};

use super::*;
use crate::clients::mock::MockFetcher;

const PDF: &[u8] = b"%PDF-1.4 test body";

fn quick_config() -> HarvestConfig { HarvestConfig { rate_limit_delay_secs: 0.0, ..Default::default() } }

/// Creates `root/<project>/results/` and writes each `(query_id, rows)` table.
fn project_with_tables(root: &Path, project: &str, tables: &[(&str, serde_json::Value)]) {
  let results = root.join(project).join("results");
  std::fs::create_dir_all(&results).unwrap();
  for (query_id, rows) in tables {
    std::fs::write(results.join(format!("{query_id}.json")), rows.to_string()).unwrap();
  }
}

fn review_project() -> (TempDir, Arc<MockFetcher>, Harvester) {
  let dir = tempdir().unwrap();
  project_with_tables(dir.path(), "review", &[
    (
      "q1",
      serde_json::json!([
        { "Title": "Planning with Qubits", "Authors": "Smith, John", "Year": 2021,
          "FullTextURL": "https://example.org/qubits.pdf" },
        { "Title": "Paywalled Survey", "Authors": "Doe, Jane", "Year": "2019",
          "DOI": "10.1109/5.771073" },
      ]),
    ),
    (
      "q2",
      serde_json::json!([
        { "Title": "Planning with Qubits", "Authors": "Smith, John", "Year": 2021,
          "FullTextURL": "https://example.org/qubits.pdf" },
        { "Title": "No Links At All" },
      ]),
    ),
  ]);

  let mock = Arc::new(MockFetcher::new().pdf("https://example.org/qubits.pdf", PDF));
  let harvester = Harvester::with_fetcher(dir.path(), quick_config(), mock.clone());
  (dir, mock, harvester)
}

#[traced_test]
#[tokio::test]
async fn test_consolidate_tracks_provenance() -> anyhow::Result<()> {
  let (_dir, _mock, mut harvester) = review_project();

  assert_eq!(harvester.consolidate("review").await?, 3);

  let layout = harvester.layout("review");
  let manifest = ManifestStore::open(layout.manifest_path()).await?.load().await?;
  let ids: Vec<u64> = manifest.iter().map(|p| p.paper_id).collect();
  assert_eq!(ids, vec![0, 1, 2]);
  assert_eq!(manifest[0].source_queries.len(), 2);
  assert!(manifest[2].source_queries.contains("q2"));
  Ok(())
}

#[tokio::test]
async fn test_consolidate_without_tables() -> anyhow::Result<()> {
  let dir = tempdir()?;
  std::fs::create_dir_all(dir.path().join("empty").join("results"))?;
  let mut harvester = Harvester::with_fetcher(dir.path(), quick_config(), Arc::new(MockFetcher::new()));

  assert!(matches!(harvester.consolidate("empty").await, Err(HarvestError::NoQueryTables(_))));
  assert!(matches!(harvester.consolidate("missing").await, Err(HarvestError::ProjectNotFound(_))));
  Ok(())
}

#[tokio::test]
async fn test_download_requires_manifest() -> anyhow::Result<()> {
  let (_dir, _mock, mut harvester) = review_project();
  let result = harvester.download_project("review", None).await;
  assert!(matches!(result, Err(HarvestError::ManifestMissing(_))));
  Ok(())
}

#[traced_test]
#[tokio::test]
async fn test_project_run_reports_per_query() -> anyhow::Result<()> {
  let (_dir, _mock, mut harvester) = review_project();
  harvester.consolidate("review").await?;

  let by_query = harvester.download_project("review", None).await?;
  assert_eq!(by_query.keys().collect::<Vec<_>>(), vec!["q1", "q2"]);
  assert_eq!(by_query["q1"][0].status(), AcquisitionStatus::Success);
  assert_eq!(by_query["q1"][1].status(), AcquisitionStatus::ManualRequired);
  assert_eq!(by_query["q2"][1].error_message(), Some(acquire::NO_IDENTIFIERS_MESSAGE));

  let layout = harvester.layout("review");
  let reports = layout.reports_dir();
  assert!(reports.join("project_download_status_review_latest.json").exists());
  assert!(reports.join("download_status_q1_latest.json").exists());
  assert!(reports.join("download_status_q2_latest.json").exists());
  assert!(layout.automatic_dir().join("0_Smith_2021_Planning_with_Qubits.pdf").exists());

  let stats = harvester.statistics("review", None).await?;
  assert_eq!(stats.summary.total_papers, 3);
  assert_eq!(stats.summary.successful_downloads, 1);
  assert_eq!(stats.summary.manual_required, 2);

  let q2 = harvester.statistics("review", Some("q2")).await?;
  assert_eq!(q2.summary.total_papers, 2);
  Ok(())
}

#[tokio::test]
async fn test_second_run_is_idempotent() -> anyhow::Result<()> {
  let (_dir, mock, mut harvester) = review_project();
  harvester.consolidate("review").await?;

  harvester.download_project("review", None).await?;
  let fetches = mock.call_count();
  let by_query = harvester.download_project("review", None).await?;

  assert_eq!(by_query["q1"][0].status(), AcquisitionStatus::AlreadyExisted);
  // Only the paywalled paper is retried over the network.
  assert!(mock.calls()[fetches..].iter().all(|url| !url.contains("qubits")));
  Ok(())
}

#[tokio::test]
async fn test_retry_failed_keeps_previous_successes() -> anyhow::Result<()> {
  let (_dir, mock, mut harvester) = review_project();
  harvester.consolidate("review").await?;
  harvester.download_project("review", Some(1)).await?;
  assert_eq!(mock.call_count(), 1);

  let by_query = harvester.retry_failed("review").await?;
  assert_eq!(by_query["q1"].len(), 2);
  assert_eq!(by_query["q1"][0].status(), AcquisitionStatus::Success);
  assert!(!mock.calls()[1..].iter().any(|url| url.contains("qubits")));

  let stats = harvester.statistics("review", None).await?;
  assert_eq!(stats.summary.total_papers, 3);
  Ok(())
}

#[tokio::test]
async fn test_duplicate_marks_survive_reconsolidation() -> anyhow::Result<()> {
  let (_dir, mock, mut harvester) = review_project();
  harvester.consolidate("review").await?;
  harvester.mark_duplicate("review", 1, 0).await?;

  harvester.consolidate("review").await?;
  let by_query = harvester.download_project("review", None).await?;
  assert_eq!(by_query["q1"][1].status(), AcquisitionStatus::Skipped);
  assert!(!mock.calls().iter().any(|url| url.contains("doi.org")));

  harvester.clear_duplicate("review", 1).await?;
  let by_query = harvester.download_project("review", None).await?;
  assert_eq!(by_query["q1"][1].status(), AcquisitionStatus::ManualRequired);
  Ok(())
}

#[tokio::test]
async fn test_reversed_duplicate_marks_leave_one_paper_fetchable() -> anyhow::Result<()> {
  let (_dir, _mock, mut harvester) = review_project();
  harvester.consolidate("review").await?;
  harvester.mark_duplicate("review", 1, 0).await?;
  harvester.mark_duplicate("review", 0, 1).await?;

  let by_query = harvester.download_project("review", None).await?;
  let statuses: Vec<_> = by_query["q1"].iter().map(AcquisitionOutcome::status).collect();
  assert_eq!(statuses, vec![AcquisitionStatus::Skipped, AcquisitionStatus::ManualRequired]);
  Ok(())
}

#[tokio::test]
async fn test_root_with_glob_characters() -> anyhow::Result<()> {
  let dir = tempdir()?;
  let root = dir.path().join("reviews[2024]?");
  project_with_tables(&root, "review", &[(
    "q1",
    serde_json::json!([
      { "Title": "Planning with Qubits", "Authors": "Smith, John", "Year": 2021,
        "FullTextURL": "https://example.org/qubits.pdf" },
    ]),
  )]);
  let mock = Arc::new(MockFetcher::new().pdf("https://example.org/qubits.pdf", PDF));
  let mut harvester = Harvester::with_fetcher(&root, quick_config(), mock);

  assert_eq!(harvester.consolidate("review").await?, 1);
  harvester.download_project("review", None).await?;

  let stats = harvester.statistics("review", None).await?;
  assert_eq!(stats.summary.successful_downloads, 1);
  let q1 = harvester.statistics("review", Some("q1")).await?;
  assert_eq!(q1.summary.total_papers, 1);
  assert_eq!(harvester.list_downloads("review").await?.len(), 1);
  Ok(())
}

#[tokio::test]
async fn test_cancelled_run_does_not_cancel_the_next() -> anyhow::Result<()> {
  let (_dir, _mock, mut harvester) = review_project();
  harvester.consolidate("review").await?;

  let cancel = harvester.cancel_flag();
  cancel.cancel();
  // a raised flag before the run starts is lowered by the run itself
  let by_query = harvester.download_project("review", None).await?;
  assert_eq!(by_query["q1"][0].status(), AcquisitionStatus::Success);
  assert!(!cancel.is_cancelled());

  let outcomes = harvester.download_query("review", "q2", None).await?;
  assert!(outcomes.iter().all(|o| o.status() != AcquisitionStatus::Skipped));
  Ok(())
}

#[tokio::test]
async fn test_download_query_uses_manifest_rows() -> anyhow::Result<()> {
  let (_dir, _mock, mut harvester) = review_project();
  harvester.consolidate("review").await?;

  let outcomes = harvester.download_query("review", "q2", None).await?;
  let ids: Vec<u64> = outcomes.iter().map(AcquisitionOutcome::paper_id).collect();
  assert_eq!(ids, vec![0, 2]);

  let layout = harvester.layout("review");
  assert!(layout.reports_dir().join("download_status_q2_latest.json").exists());
  assert!(!layout.reports_dir().join("project_download_status_review_latest.json").exists());
  Ok(())
}

#[tokio::test]
async fn test_submit_url() -> anyhow::Result<()> {
  let dir = tempdir()?;
  project_with_tables(dir.path(), "review", &[(
    "q1",
    serde_json::json!([{ "Title": "Paywalled Survey", "Authors": "Doe, Jane", "Year": 2019,
                         "DOI": "10.1109/5.771073" }]),
  )]);
  let mock = Arc::new(
    MockFetcher::new()
      .pdf("https://mirror.example.edu/survey.pdf", PDF)
      .respond("https://mirror.example.edu/page", FetchResponse::status(200, Some("text/html"))),
  );
  let mut harvester = Harvester::with_fetcher(dir.path(), quick_config(), mock);
  harvester.consolidate("review").await?;

  let bad = harvester.submit_url("review", 0, "ftp://mirror.example.edu/survey.pdf").await;
  assert!(matches!(bad, Err(HarvestError::InvalidUrl(_))));
  let unknown = harvester.submit_url("review", 42, "https://mirror.example.edu/survey.pdf").await;
  assert!(matches!(unknown, Err(HarvestError::PaperNotFound(42))));

  let page = harvester.submit_url("review", 0, "https://mirror.example.edu/page").await?;
  assert_eq!(page.status(), AcquisitionStatus::ManualRequired);
  let gone = harvester.submit_url("review", 0, "https://mirror.example.edu/gone.pdf").await?;
  assert_eq!(gone.status(), AcquisitionStatus::NotFound);

  let outcome = harvester.submit_url("review", 0, "https://mirror.example.edu/survey.pdf").await?;
  assert_eq!(outcome.status(), AcquisitionStatus::Success);
  assert_eq!(outcome.download_source(), Some(CandidateSource::SubmittedUrl));
  let path = outcome.file_path().unwrap();
  assert!(path.starts_with(harvester.layout("review").manual_dir()));

  let downloads = harvester.list_downloads("review").await?;
  assert_eq!(downloads.len(), 1);
  assert_eq!(downloads[0].origin, project::DownloadOrigin::Manual);
  Ok(())
}

#[tokio::test]
async fn test_clean_reports_keeps_readme() -> anyhow::Result<()> {
  let (_dir, _mock, mut harvester) = review_project();
  harvester.consolidate("review").await?;
  harvester.download_project("review", None).await?;

  let removed = harvester.clean_reports("review").await?;
  assert!(removed > 0);

  let remaining: Vec<_> = std::fs::read_dir(harvester.layout("review").reports_dir())?
    .filter_map(Result::ok)
    .map(|entry| entry.file_name())
    .collect();
  assert_eq!(remaining, vec![std::ffi::OsString::from("README.md")]);
  Ok(())
}

#[tokio::test]
async fn test_cached_tables_refresh_on_consolidate() -> anyhow::Result<()> {
  let (dir, _mock, mut harvester) = review_project();
  harvester.download_query("review", "q1", Some(0)).await?;

  project_with_tables(dir.path(), "review", &[(
    "q1",
    serde_json::json!([{ "Title": "Only Row", "DOI": "10.1/x" }]),
  )]);
  harvester.consolidate("review").await?;

  let manifest =
    ManifestStore::open(harvester.layout("review").manifest_path()).await?.load().await?;
  assert!(manifest.iter().any(|p| p.title.as_deref() == Some("Only Row")));
  Ok(())
}
