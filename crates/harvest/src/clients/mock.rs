//! In-memory [`Fetch`] implementation for network-free tests.

use std::sync::Mutex;

use super::*;

/// Answers from a fixed URL → response table and records every URL it was asked for.
///
/// Unknown URLs answer `404`. URLs registered with [`MockFetcher::fail`] produce a transport
/// error, and URLs registered with [`MockFetcher::explode`] panic.
#[derive(Debug, Default)]
pub struct MockFetcher {
  /// Canned responses
  responses: HashMap<String, FetchResponse>,
  /// URLs that fail at the transport level
  failing:   Vec<String>,
  /// URLs that panic
  exploding: Vec<String>,
  /// Every URL fetched, in order
  calls:     Mutex<Vec<String>>,
}

impl MockFetcher {
  /// Creates a fetcher that answers `404` to everything.
  pub fn new() -> Self { Self::default() }

  /// Registers a response for a URL.
  pub fn respond(mut self, url: &str, response: FetchResponse) -> Self {
    self.responses.insert(url.to_string(), response);
    self
  }

  /// Registers a PDF response for a URL.
  pub fn pdf(self, url: &str, body: &[u8]) -> Self { self.respond(url, FetchResponse::pdf(body)) }

  /// Makes a URL fail with a transport error.
  pub fn fail(mut self, url: &str) -> Self {
    self.failing.push(url.to_string());
    self
  }

  /// Makes a URL panic.
  pub fn explode(mut self, url: &str) -> Self {
    self.exploding.push(url.to_string());
    self
  }

  /// URLs fetched so far.
  pub fn calls(&self) -> Vec<String> { self.calls.lock().unwrap().clone() }

  /// Number of fetches so far.
  pub fn call_count(&self) -> usize { self.calls.lock().unwrap().len() }
}

#[async_trait]
impl Fetch for MockFetcher {
  async fn fetch(&self, candidate: &Candidate) -> Result<FetchResponse, HarvestError> {
    self.calls.lock().unwrap().push(candidate.url.clone());

    if self.exploding.contains(&candidate.url) {
      panic!("mock fetcher exploded on {}", candidate.url);
    }
    if self.failing.contains(&candidate.url) {
      return Err(HarvestError::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        "connection refused",
      )));
    }
    Ok(self.responses.get(&candidate.url).cloned().unwrap_or_else(|| FetchResponse::status(404, None)))
  }
}
