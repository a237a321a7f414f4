//! The HTTP seam between the acquisition pipeline and the outside world.
//!
//! Acquisition never talks to `reqwest` directly. It goes through the [`Fetch`] trait, which
//! turns one [`Candidate`] into one [`FetchResponse`]. The production implementation is
//! [`HttpClient`], which layers retries, browser-like headers and a timeout over a shared
//! `reqwest::Client`. Tests substitute an in-memory fetcher that records every call.
//!
//! # Examples
//!
//! ```no_run
//! use harvest::{Candidate, CandidateSource, Fetch, HarvestConfig, HttpClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new(&HarvestConfig::default())?;
//! let candidate = Candidate::new(CandidateSource::Arxiv, "https://arxiv.org/pdf/2301.07041.pdf");
//!
//! let response = client.fetch(&candidate).await?;
//! if response.is_pdf() {
//!   println!("Got {} bytes", response.body.len());
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use super::*;
use crate::resolve::Candidate;

pub mod http;
#[cfg(test)] pub(crate) mod mock;

pub use http::HttpClient;

/// What a single GET of a candidate URL produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResponse {
  /// HTTP status code
  pub status:       u16,
  /// The `Content-Type` header, if any
  pub content_type: Option<String>,
  /// Response body; only read for `200` responses that look like a PDF
  pub body:         Vec<u8>,
}

impl FetchResponse {
  /// A `200` response carrying a PDF body.
  pub fn pdf(body: impl Into<Vec<u8>>) -> Self {
    Self { status: 200, content_type: Some("application/pdf".into()), body: body.into() }
  }

  /// A bodyless response with the given status and content type.
  pub fn status(status: u16, content_type: Option<&str>) -> Self {
    Self { status, content_type: content_type.map(str::to_string), body: Vec::new() }
  }

  /// Whether the server answered `200 OK`.
  pub fn is_ok(&self) -> bool { self.status == 200 }

  /// Whether this is a `200` whose content type mentions `pdf`.
  pub fn is_pdf(&self) -> bool {
    self.is_ok() && self.content_type.as_deref().is_some_and(is_pdf_content_type)
  }
}

/// Whether a `Content-Type` value announces a PDF.
pub fn is_pdf_content_type(content_type: &str) -> bool {
  content_type.to_lowercase().contains("pdf")
}

/// Fetches candidate URLs.
///
/// Implementations must be shareable across tasks; the batch runner hands one fetcher to
/// every paper of a run.
#[async_trait]
pub trait Fetch: Send + Sync {
  /// Performs a GET of `candidate.url`.
  ///
  /// Any status code is a successful fetch; only transport-level failures (DNS, TLS, timeout
  /// after all retries) are errors.
  async fn fetch(&self, candidate: &Candidate) -> Result<FetchResponse, HarvestError>;
}
