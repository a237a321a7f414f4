//! Paper records as they arrive from search-query result tables.
//!
//! A [`PaperRecord`] is one row of a query table or of the consolidated project manifest.
//! The rows come from spreadsheet-like exports, so every text field is optional and may hold
//! junk such as an empty string or a literal `nan`. Use the accessor methods
//! ([`PaperRecord::doi`], [`PaperRecord::url`], ...) rather than the raw fields; they treat
//! such values as absent.
//!
//! # Examples
//!
//! ```
//! use harvest::paper::PaperRecord;
//!
//! let row: PaperRecord = serde_json::from_str(
//!   r#"{ "Title": "Attention Is All You Need", "Authors": "A. Vaswani, N. Shazeer",
//!        "Year": 2017.0, "DOI": "nan", "ArticleURL": "https://arxiv.org/abs/1706.03762" }"#,
//! )?;
//!
//! assert_eq!(row.year.as_deref(), Some("2017.0"));
//! assert_eq!(row.doi(), None);
//! assert!(row.has_identifiers());
//! # Ok::<(), serde_json::Error>(())
//! ```

use std::collections::BTreeSet;

use serde::Deserializer;

use super::*;

/// One paper row from a query table or the consolidated manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
  /// Stable integer identity, unique within its table.
  #[serde(default)]
  pub paper_id:       u64,
  /// The paper's title
  #[serde(default, alias = "Title", deserialize_with = "lenient_string")]
  pub title:          Option<String>,
  /// Free-text author list, e.g. `"Smith, John; Doe, Jane"`
  #[serde(default, alias = "Authors", deserialize_with = "lenient_string")]
  pub authors:        Option<String>,
  /// Publication year as exported (may be `"2023"`, `2023` or `2023.0`)
  #[serde(default, alias = "Year", deserialize_with = "lenient_string")]
  pub year:           Option<String>,
  /// Digital Object Identifier
  #[serde(default, alias = "DOI", deserialize_with = "lenient_string")]
  pub doi:            Option<String>,
  /// The search engine's link for the record
  #[serde(default, alias = "URL", deserialize_with = "lenient_string")]
  pub url:            Option<String>,
  /// Publisher landing page
  #[serde(default, alias = "ArticleURL", deserialize_with = "lenient_string")]
  pub article_url:    Option<String>,
  /// Direct full-text link, when the search engine found one
  #[serde(default, alias = "FullTextURL", deserialize_with = "lenient_string")]
  pub fulltext_url:   Option<String>,
  /// Abstract text
  #[serde(default, alias = "Abstract", deserialize_with = "lenient_string")]
  pub abstract_text:  Option<String>,
  /// Venue or source description, e.g. `"arXiv preprint arXiv:2301.12345"`
  #[serde(default, alias = "Source", deserialize_with = "lenient_string")]
  pub source:         Option<String>,
  /// Publisher name
  #[serde(default, alias = "Publisher", deserialize_with = "lenient_string")]
  pub publisher:      Option<String>,
  /// Citation count
  #[serde(default, alias = "Cites", deserialize_with = "lenient_count")]
  pub cites:          Option<u64>,
  /// Query ids this row was found by (manifest only)
  #[serde(default)]
  pub source_queries: BTreeSet<String>,
  /// Operator flag: this row duplicates another manifest row (manifest only)
  #[serde(default)]
  pub is_duplicate:   bool,
  /// The manifest row this one duplicates, if flagged (manifest only)
  #[serde(default)]
  pub duplicate_of:   Option<u64>,
}

impl PaperRecord {
  /// Creates an empty record with the given id and title.
  pub fn new(paper_id: u64, title: impl Into<String>) -> Self {
    Self { paper_id, title: Some(title.into()), ..Default::default() }
  }

  /// The title, or `"Unknown Title"` when the export has none.
  pub fn title_or_default(&self) -> &str { present(&self.title).unwrap_or("Unknown Title") }

  /// The DOI, if present.
  pub fn doi(&self) -> Option<&str> { present(&self.doi) }

  /// The search-engine URL, if present.
  pub fn url(&self) -> Option<&str> { present(&self.url) }

  /// The publisher landing page, if present.
  pub fn article_url(&self) -> Option<&str> { present(&self.article_url) }

  /// The direct full-text URL, if present.
  pub fn fulltext_url(&self) -> Option<&str> { present(&self.fulltext_url) }

  /// The authors, if present.
  pub fn authors(&self) -> Option<&str> { present(&self.authors) }

  /// The year as exported, if present.
  pub fn year(&self) -> Option<&str> { present(&self.year) }

  /// The venue description, if present.
  pub fn source(&self) -> Option<&str> { present(&self.source) }

  /// The publisher, if present.
  pub fn publisher(&self) -> Option<&str> { present(&self.publisher) }

  /// The abstract, if present.
  pub fn abstract_text(&self) -> Option<&str> { present(&self.abstract_text) }

  /// Whether any of DOI, URL, ArticleURL or FullTextURL is available.
  ///
  /// Papers without any of these cannot be fetched automatically at all.
  pub fn has_identifiers(&self) -> bool {
    self.doi().is_some()
      || self.url().is_some()
      || self.article_url().is_some()
      || self.fulltext_url().is_some()
  }

  /// The deterministic on-disk filename for this paper.
  pub fn pdf_filename(&self) -> String {
    format::pdf_filename(
      self.paper_id,
      self.authors().unwrap_or_default(),
      self.year().unwrap_or_default(),
      present(&self.title).unwrap_or_default(),
    )
  }

  /// A one-line citation: `Authors (Year). Title. Source. DOI: ...`
  pub fn citation(&self) -> String {
    let mut citation = format!(
      "{} ({}). {}.",
      self.authors().unwrap_or("Unknown Authors"),
      self.year().unwrap_or("Unknown Year"),
      self.title_or_default()
    );
    if let Some(source) = self.source() {
      citation.push_str(&format!(" {source}."));
    }
    if let Some(doi) = self.doi() {
      citation.push_str(&format!(" DOI: {doi}"));
    }
    citation
  }

  /// The exported bibliographic content of this row, ignoring ids and manifest-only
  /// bookkeeping. Two rows with equal keys are the same exported record.
  pub fn record_key(&self) -> RecordKey {
    (
      [
        self.title.clone(),
        self.authors.clone(),
        self.year.clone(),
        self.doi.clone(),
        self.url.clone(),
        self.article_url.clone(),
        self.fulltext_url.clone(),
        self.abstract_text.clone(),
        self.source.clone(),
        self.publisher.clone(),
      ],
      self.cites,
    )
  }

  /// Whether two rows carry identical exported content.
  ///
  /// This is exact equality of every exported field, not a fuzzy identity check.
  pub fn same_record(&self, other: &Self) -> bool { self.record_key() == other.record_key() }
}

/// Hashable exported content of a [`PaperRecord`], see [`PaperRecord::record_key`].
pub type RecordKey = ([Option<String>; 10], Option<u64>);

/// Returns the trimmed value unless it is empty or the spreadsheet artefact `nan`.
pub(crate) fn present(value: &Option<String>) -> Option<&str> {
  value.as_deref().map(str::trim).filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("nan"))
}

/// Accepts a string, a number or null for a text column.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where D: Deserializer<'de> {
  let value = Option::<serde_json::Value>::deserialize(deserializer)?;
  Ok(match value {
    Some(serde_json::Value::String(s)) => Some(s),
    Some(serde_json::Value::Number(n)) => Some(n.to_string()),
    Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
    _ => None,
  })
}

/// Accepts an integer, a float, a numeric string or null for a count column.
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where D: Deserializer<'de> {
  let value = Option::<serde_json::Value>::deserialize(deserializer)?;
  Ok(match value {
    Some(serde_json::Value::Number(n)) =>
      n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
    Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok().map(|f| f as u64),
    _ => None,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_export_columns_deserialize() {
    let row: PaperRecord = serde_json::from_str(
      r#"{
        "Title": "Planning with Qubits",
        "Authors": "Smith, John; Doe, Jane",
        "Year": 2023.0,
        "DOI": "10.1000/xyz",
        "URL": "",
        "ArticleURL": "  ",
        "FullTextURL": "NaN",
        "Cites": "12.0"
      }"#,
    )
    .unwrap();

    assert_eq!(row.paper_id, 0);
    assert_eq!(row.title_or_default(), "Planning with Qubits");
    assert_eq!(row.year(), Some("2023.0"));
    assert_eq!(row.doi(), Some("10.1000/xyz"));
    assert_eq!(row.url(), None);
    assert_eq!(row.article_url(), None);
    assert_eq!(row.fulltext_url(), None);
    assert_eq!(row.cites, Some(12));
    assert!(row.has_identifiers());
  }

  #[test]
  fn test_no_identifiers() {
    let mut row = PaperRecord::new(3, "Lost Paper");
    row.url = Some("nan".into());
    assert!(!row.has_identifiers());
  }

  #[test]
  fn test_citation() {
    let mut row = PaperRecord::new(1, "A Study");
    row.authors = Some("Smith, J.".into());
    row.year = Some("2021".into());
    row.source = Some("Journal of Studies".into());
    row.doi = Some("10.1/abc".into());
    assert_eq!(row.citation(), "Smith, J. (2021). A Study. Journal of Studies. DOI: 10.1/abc");

    let bare = PaperRecord::default();
    assert_eq!(bare.citation(), "Unknown Authors (Unknown Year). Unknown Title.");
  }

  #[test]
  fn test_same_record_ignores_bookkeeping() {
    let mut a = PaperRecord::new(1, "Same");
    a.doi = Some("10.1/x".into());
    let mut b = a.clone();
    b.paper_id = 7;
    b.source_queries.insert("q2".into());
    assert!(a.same_record(&b));

    b.year = Some("2020".into());
    assert!(!a.same_record(&b));
  }
}
