//! The production [`Fetch`] implementation backed by `reqwest`.
//!
//! Every request carries a desktop user agent and the usual browser headers. Requests to
//! IEEE Xplore also send a referer from its own host and an `Accept` that lists PDF first. Requests answered with `429`, `500`, `502`, `503` or `504`, and connection or
//! timeout failures, are retried with exponential backoff before the answer is handed back.

use reqwest::header::{self, HeaderMap, HeaderValue};

use super::*;
use crate::config::HarvestConfig;

/// Statuses worth retrying after a pause.
const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Default `Accept` header.
const BROWSER_ACCEPT: &str =
  "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// `Referer` sent to IEEE Xplore.
const IEEE_REFERER: &str = "https://ieeexplore.ieee.org/";

/// `Accept` sent to IEEE Xplore.
const IEEE_ACCEPT: &str = "application/pdf,text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// HTTP client shared by every acquisition in a run.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
  /// Underlying client with default headers and timeout applied
  client: reqwest::Client,
  /// Retry count and backoff
  config: Arc<HarvestConfig>,
}

impl HttpClient {
  /// Builds a client from the run configuration.
  pub fn new(config: &HarvestConfig) -> Result<Self, HarvestError> {
    let client = reqwest::Client::builder()
      .user_agent(config.user_agent.clone())
      .default_headers(browser_headers())
      .timeout(config.request_timeout())
      .build()?;

    Ok(Self { client, config: Arc::new(config.clone()) })
  }

  /// Performs exactly one request without retrying.
  async fn send_once(&self, candidate: &Candidate) -> Result<FetchResponse, reqwest::Error> {
    let mut request = self.client.get(&candidate.url);
    if candidate.is_ieee() {
      request = request.header(header::REFERER, IEEE_REFERER).header(header::ACCEPT, IEEE_ACCEPT);
    }

    let response = request.send().await?;
    let status = response.status().as_u16();
    let content_type = response
      .headers()
      .get(header::CONTENT_TYPE)
      .and_then(|value| value.to_str().ok())
      .map(str::to_string);
    trace!("{} answered {status} ({content_type:?})", candidate.url);

    let mut fetched = FetchResponse { status, content_type, body: Vec::new() };
    if fetched.is_pdf() {
      fetched.body = response.bytes().await?.to_vec();
    }
    Ok(fetched)
  }
}

#[async_trait]
impl Fetch for HttpClient {
  async fn fetch(&self, candidate: &Candidate) -> Result<FetchResponse, HarvestError> {
    let max_retries = self.config.max_retries;
    let mut attempt = 0;
    loop {
      match self.send_once(candidate).await {
        Ok(response) if is_retryable_status(response.status) && attempt < max_retries => {
          attempt += 1;
          warn!(
            attempt,
            max_retries,
            status = response.status,
            url = %candidate.url,
            "Retryable response, backing off"
          );
        },
        Err(e) if (e.is_timeout() || e.is_connect()) && attempt < max_retries => {
          attempt += 1;
          warn!(
            attempt,
            max_retries,
            error = %e,
            url = %candidate.url,
            "Request failed, backing off"
          );
        },
        result => return result.map_err(HarvestError::from),
      }
      tokio::time::sleep(self.config.backoff(attempt)).await;
    }
  }
}

/// Whether a status is answered by retrying.
pub fn is_retryable_status(status: u16) -> bool { RETRY_STATUSES.contains(&status) }

/// Browser headers sent with every request. `Accept-Encoding` is managed by `reqwest`.
fn browser_headers() -> HeaderMap {
  let mut headers = HeaderMap::new();
  headers.insert(header::ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
  headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
  headers.insert(header::DNT, HeaderValue::from_static("1"));
  headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
  headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
  headers
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::resolve::CandidateSource;

  #[test]
  fn test_retryable_statuses() {
    for status in [429, 500, 502, 503, 504] {
      assert!(is_retryable_status(status));
    }
    for status in [200, 403, 404, 501] {
      assert!(!is_retryable_status(status));
    }
  }

  #[test]
  fn test_browser_headers() {
    let headers = browser_headers();
    assert_eq!(headers.get(header::ACCEPT_LANGUAGE).unwrap(), "en-US,en;q=0.5");
    assert_eq!(headers.get(header::DNT).unwrap(), "1");
  }

  #[test]
  fn test_client_builds_from_default_config() {
    assert!(HttpClient::new(&HarvestConfig::default()).is_ok());
  }

  fn no_backoff(max_retries: u32) -> HarvestConfig {
    HarvestConfig { max_retries, backoff_factor_secs: 0.0, ..Default::default() }
  }

  #[traced_test]
  #[tokio::test]
  async fn test_fetch_retries_unavailable() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;
    let unavailable =
      server.mock("GET", "/paper.pdf").with_status(503).expect(2).create_async().await;
    let ok = server
      .mock("GET", "/paper.pdf")
      .with_status(200)
      .with_header("content-type", "application/pdf")
      .with_body("%PDF-1.4 body")
      .expect(1)
      .create_async()
      .await;

    let client = HttpClient::new(&no_backoff(2))?;
    let candidate = Candidate::new(CandidateSource::FulltextUrl, format!("{}/paper.pdf", server.url()));
    let response = client.fetch(&candidate).await?;

    assert_eq!(response.status, 200);
    assert!(response.body.starts_with(b"%PDF"));
    unavailable.assert_async().await;
    ok.assert_async().await;
    Ok(())
  }

  #[tokio::test]
  async fn test_fetch_gives_up_after_max_retries() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;
    let unavailable =
      server.mock("GET", "/paper.pdf").with_status(503).expect(3).create_async().await;

    let client = HttpClient::new(&no_backoff(2))?;
    let candidate = Candidate::new(CandidateSource::FulltextUrl, format!("{}/paper.pdf", server.url()));
    let response = client.fetch(&candidate).await?;

    assert_eq!(response.status, 503);
    unavailable.assert_async().await;
    Ok(())
  }

  #[tokio::test]
  async fn test_fetch_does_not_retry_not_found() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;
    let missing = server.mock("GET", "/paper.pdf").with_status(404).expect(1).create_async().await;

    let client = HttpClient::new(&no_backoff(3))?;
    let candidate = Candidate::new(CandidateSource::FulltextUrl, format!("{}/paper.pdf", server.url()));

    assert_eq!(client.fetch(&candidate).await?.status, 404);
    missing.assert_async().await;
    Ok(())
  }

  #[tokio::test]
  async fn test_ieee_candidates_send_referer() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;
    // the host check is a substring match, so the path can carry it
    let stamp = server
      .mock("GET", "/ieeexplore.ieee.org/stamp/stamp.jsp")
      .match_header("referer", IEEE_REFERER)
      .match_header("accept", IEEE_ACCEPT)
      .with_status(200)
      .with_header("content-type", "application/pdf")
      .with_body("%PDF-1.4 body")
      .expect(1)
      .create_async()
      .await;

    let client = HttpClient::new(&no_backoff(0))?;
    let candidate = Candidate::new(
      CandidateSource::IeeeStamp,
      format!("{}/ieeexplore.ieee.org/stamp/stamp.jsp", server.url()),
    );
    assert!(candidate.is_ieee());

    assert!(client.fetch(&candidate).await?.is_pdf());
    stamp.assert_async().await;
    Ok(())
  }

  #[ignore = "requires network access"]
  #[traced_test]
  #[tokio::test]
  async fn test_fetch_arxiv_pdf() -> anyhow::Result<()> {
    let client = HttpClient::new(&HarvestConfig::default())?;
    let candidate =
      Candidate::new(CandidateSource::Arxiv, "https://arxiv.org/pdf/2301.07041.pdf");

    let response = client.fetch(&candidate).await?;
    assert!(response.is_pdf());
    assert!(response.body.starts_with(b"%PDF"));
    Ok(())
  }
}
