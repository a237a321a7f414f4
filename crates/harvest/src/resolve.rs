//! Candidate URL resolution.
//!
//! Given whatever identifiers a search export happened to record for a paper, produce the
//! ordered list of URLs worth trying. The order is fixed and reflects how likely each source
//! is to serve a PDF directly:
//!
//! 1. the export's full-text link,
//! 2. the publisher landing page,
//! 3. IEEE Xplore PDF endpoints derived from an article number,
//! 4. the DOI resolver,
//! 5. the export's original link,
//! 6. arXiv's PDF endpoint, when an arXiv id can be found.
//!
//! Resolution is pure: identical input always produces the identical list, which makes the
//! sequence of network attempts for a paper reproducible.
//!
//! # Examples
//!
//! ```
//! use harvest::resolve::{resolve_candidates, CandidateQuery, CandidateSource};
//!
//! let query = CandidateQuery {
//!   doi: Some("10.1000/xyz"),
//!   url: Some("https://arxiv.org/abs/2301.12345"),
//!   article_url: Some("https://example.org/article/1"),
//!   ..Default::default()
//! };
//!
//! let candidates = resolve_candidates(&query);
//! assert_eq!(candidates[0].source, CandidateSource::ArticleUrl);
//! assert_eq!(candidates[1].url, "https://doi.org/10.1000/xyz");
//! assert_eq!(candidates[2].source, CandidateSource::OriginalUrl);
//! assert_eq!(candidates[3].url, "https://arxiv.org/pdf/2301.12345.pdf");
//! ```

use lazy_static::lazy_static;
use regex::Regex;

use super::*;

/// Host serving IEEE Xplore full texts.
pub const IEEE_HOST: &str = "ieeexplore.ieee.org";

lazy_static! {
    static ref IEEE_ARNUMBER: Regex = Regex::new(r"arnumber=(\d+)").unwrap();
    static ref IEEE_DOCUMENT: Regex = Regex::new(r"/document/(\d+)").unwrap();

    // arXiv patterns, tried in order against lowercased text
    static ref ARXIV_PREFIXED: Regex = Regex::new(r"arxiv[:/](\d+\.\d+)").unwrap();
    static ref ARXIV_URL: Regex =
        Regex::new(r"arxiv\.org/(?:abs|pdf)/([0-9]{4}\.[0-9]{4,5})").unwrap();
    static ref ARXIV_PLAIN: Regex = Regex::new(r"arxiv[: ]([0-9]{4}\.[0-9]{4,5})").unwrap();

    static ref DOI_RESOLVER: Regex =
        Regex::new(r"^(?i)https?://(?:dx\.)?doi\.org/").unwrap();
}

/// Where a candidate URL came from.
///
/// The serialized label is what reports record as an outcome's `download_source`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
  /// The export's `FullTextURL` column
  FulltextUrl,
  /// The export's `ArticleURL` column
  ArticleUrl,
  /// IEEE Xplore's `stamp.jsp` viewer endpoint
  IeeeStamp,
  /// IEEE Xplore's `getPDF.jsp` endpoint
  IeeePdf,
  /// `https://doi.org/{doi}`
  DoiDirect,
  /// The export's `URL` column
  OriginalUrl,
  /// `https://arxiv.org/pdf/{id}.pdf`
  Arxiv,
  /// A URL an operator submitted by hand
  SubmittedUrl,
}

impl CandidateSource {
  /// The label used in logs and reports.
  pub fn label(&self) -> &'static str {
    match self {
      CandidateSource::FulltextUrl => "fulltext_url",
      CandidateSource::ArticleUrl => "article_url",
      CandidateSource::IeeeStamp => "ieee_stamp",
      CandidateSource::IeeePdf => "ieee_pdf",
      CandidateSource::DoiDirect => "doi_direct",
      CandidateSource::OriginalUrl => "original_url",
      CandidateSource::Arxiv => "arxiv",
      CandidateSource::SubmittedUrl => "submitted_url",
    }
  }

  /// A human description, used in manual download guides.
  pub fn description(&self) -> &'static str {
    match self {
      CandidateSource::FulltextUrl => "Full Text URL (most likely PDF)",
      CandidateSource::ArticleUrl => "Article Page",
      CandidateSource::IeeeStamp => "IEEE Xplore viewer",
      CandidateSource::IeeePdf => "IEEE Xplore PDF",
      CandidateSource::DoiDirect => "DOI Link",
      CandidateSource::OriginalUrl => "Original URL",
      CandidateSource::Arxiv => "arXiv PDF",
      CandidateSource::SubmittedUrl => "Submitted URL",
    }
  }
}

impl std::fmt::Display for CandidateSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.label()) }
}

/// One URL to try for a paper, labeled with its origin.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
  /// Where the URL came from
  pub source: CandidateSource,
  /// The URL to request
  pub url:    String,
}

impl Candidate {
  /// Creates a candidate.
  pub fn new(source: CandidateSource, url: impl Into<String>) -> Self {
    Self { source, url: url.into() }
  }

  /// Whether this candidate is served by IEEE Xplore.
  pub fn is_ieee(&self) -> bool { self.url.to_lowercase().contains(IEEE_HOST) }
}

/// The identifiers a resolver works from.
///
/// All fields are optional; blank values should already be filtered out, which
/// [`CandidateQuery::from`] does for a [`PaperRecord`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CandidateQuery<'a> {
  /// Digital Object Identifier, bare or as a resolver URL
  pub doi:          Option<&'a str>,
  /// The export's original link
  pub url:          Option<&'a str>,
  /// Publisher landing page
  pub article_url:  Option<&'a str>,
  /// Direct full-text link
  pub fulltext_url: Option<&'a str>,
  /// Extra free text searched for arXiv ids, typically the venue description
  pub extra_text:   Option<&'a str>,
}

impl<'a> From<&'a PaperRecord> for CandidateQuery<'a> {
  fn from(paper: &'a PaperRecord) -> Self {
    Self {
      doi:          paper.doi(),
      url:          paper.url(),
      article_url:  paper.article_url(),
      fulltext_url: paper.fulltext_url(),
      extra_text:   paper.source(),
    }
  }
}

impl CandidateQuery<'_> {
  /// All identifier text joined and lowercased, for substring heuristics.
  pub fn combined_text(&self) -> String {
    [self.url, self.doi, self.article_url, self.fulltext_url, self.extra_text]
      .into_iter()
      .flatten()
      .collect::<Vec<_>>()
      .join(" ")
      .to_lowercase()
  }
}

/// Resolves a paper's identifiers into an ordered, deduplicated list of candidate URLs.
pub fn resolve_candidates(query: &CandidateQuery<'_>) -> Vec<Candidate> {
  let mut candidates = Vec::new();

  if let Some(fulltext_url) = query.fulltext_url {
    candidates.push(Candidate::new(CandidateSource::FulltextUrl, fulltext_url));
  }

  if let Some(article_url) = query.article_url {
    candidates.push(Candidate::new(CandidateSource::ArticleUrl, article_url));
  }

  let ieee_sources = [query.fulltext_url, query.article_url, query.url];
  if let Some(arnumber) = ieee_sources.into_iter().flatten().find_map(extract_ieee_article_number)
  {
    candidates.push(Candidate::new(
      CandidateSource::IeeeStamp,
      format!("https://{IEEE_HOST}/stamp/stamp.jsp?tp=&arnumber={arnumber}"),
    ));
    candidates.push(Candidate::new(
      CandidateSource::IeeePdf,
      format!("https://{IEEE_HOST}/stampPDF/getPDF.jsp?tp=&arnumber={arnumber}"),
    ));
  }

  if let Some(doi) = query.doi.map(normalize_doi).filter(|doi| !doi.is_empty()) {
    candidates.push(Candidate::new(CandidateSource::DoiDirect, format!("https://doi.org/{doi}")));
  }

  if let Some(url) = query.url {
    candidates.push(Candidate::new(CandidateSource::OriginalUrl, url));
  }

  let text = query.combined_text();
  if text.contains("arxiv") {
    if let Some(arxiv_id) = extract_arxiv_id(&text) {
      candidates.push(Candidate::new(
        CandidateSource::Arxiv,
        format!("https://arxiv.org/pdf/{arxiv_id}.pdf"),
      ));
    }
  }

  let mut seen = std::collections::HashSet::new();
  candidates.retain(|candidate| seen.insert(candidate.url.clone()));
  trace!("Resolved {} candidates: {candidates:?}", candidates.len());
  candidates
}

/// Extracts an IEEE Xplore article number from a URL on the IEEE host.
///
/// Understands both `...?arnumber=1234567` and `.../document/1234567/` forms.
pub fn extract_ieee_article_number(url: &str) -> Option<String> {
  if !url.to_lowercase().contains(IEEE_HOST) {
    return None;
  }
  IEEE_ARNUMBER
    .captures(url)
    .or_else(|| IEEE_DOCUMENT.captures(url))
    .and_then(|cap| cap.get(1))
    .map(|m| m.as_str().to_string())
}

/// Extracts a new-style arXiv identifier (e.g. `2301.12345`) from free text.
///
/// Recognizes `arxiv:ID`, `arxiv/ID`, `arxiv.org/abs/ID`, `arxiv.org/pdf/ID` and `arxiv ID`,
/// case-insensitively.
///
/// ```
/// use harvest::resolve::extract_arxiv_id;
///
/// assert_eq!(extract_arxiv_id("arXiv:2301.12345").as_deref(), Some("2301.12345"));
/// assert_eq!(extract_arxiv_id("no arxiv here"), None);
/// ```
pub fn extract_arxiv_id(text: &str) -> Option<String> {
  let text = text.to_lowercase();
  [&*ARXIV_PREFIXED, &*ARXIV_URL, &*ARXIV_PLAIN]
    .into_iter()
    .find_map(|re| re.captures(&text))
    .and_then(|cap| cap.get(1))
    .map(|m| m.as_str().to_string())
}

/// Strips a resolver prefix (`https://doi.org/`) from a DOI.
fn normalize_doi(doi: &str) -> &str { DOI_RESOLVER.find(doi).map_or(doi, |m| &doi[m.end()..]).trim() }
