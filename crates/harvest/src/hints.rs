//! Operator guidance attached to `ManualRequired` outcomes.
//!
//! When every candidate URL for a paper has been tried without getting a PDF, the outcome
//! carries a short message telling the operator where to look next. The message is picked
//! by substring-matching the paper's identifier text against a table of [`PublisherHint`]s,
//! first match wins. The table is data, so new publishers can be added through
//! [`HarvestConfig`](crate::HarvestConfig) without code changes.
//!
//! # Examples
//!
//! ```
//! use harvest::ManualHints;
//!
//! let hints = ManualHints::default();
//! let message = hints.message_for(&["10.1109/5.771073", "https://ieeexplore.ieee.org/document/771073"]);
//! assert!(message.starts_with("IEEE papers often require institutional access"));
//! ```

use super::*;

/// Message used when none of the configured hints match.
pub const GENERIC_MESSAGE: &str = "Could not download automatically from available sources";

/// Message used when the paper has no URL text at all.
pub const NO_URLS_MESSAGE: &str = "No download URLs available for this paper.";

/// Message used when nothing in the URL text mentions a PDF.
pub const NO_PDF_URLS_MESSAGE: &str = "No direct PDF URLs found. The available URLs may lead to \
                                       publisher pages that require manual download.";

/// A single substring → message rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherHint {
  /// Substring looked for in the paper's identifier text, case-insensitively
  pub pattern: String,
  /// Guidance shown to the operator when the pattern matches
  pub message: String,
}

impl PublisherHint {
  /// Creates a hint; the pattern is lowercased.
  pub fn new(pattern: impl Into<String>, message: impl Into<String>) -> Self {
    Self { pattern: pattern.into().to_lowercase(), message: message.into() }
  }

  /// The hints shipped by default: IEEE, Springer and ACM.
  pub fn defaults() -> Vec<Self> {
    vec![
      Self::new(
        "ieeexplore.ieee.org",
        "IEEE papers often require institutional access. Try downloading manually from your \
         institution's library or use the IEEE Xplore direct download if you have access.",
      ),
      Self::new(
        "springer",
        "Springer papers may require subscription access. Try downloading manually through \
         your institution.",
      ),
      Self::new(
        "acm.org",
        "ACM papers may require ACM Digital Library access. Try downloading manually through \
         your institution.",
      ),
    ]
  }
}

/// An ordered table of publisher hints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualHints {
  /// Rules, tried in order
  hints: Vec<PublisherHint>,
}

impl ManualHints {
  /// Builds a table from the given rules.
  pub fn new(hints: Vec<PublisherHint>) -> Self { Self { hints } }

  /// Picks the guidance message for a paper whose automatic download was exhausted.
  ///
  /// `identifiers` are the paper's raw DOI/URL/ArticleURL/FullTextURL values; absent ones
  /// may simply be left out.
  pub fn message_for(&self, identifiers: &[&str]) -> String {
    let text = identifiers.join(" ").to_lowercase();

    if let Some(hint) = self.hints.iter().find(|hint| text.contains(&hint.pattern.to_lowercase())) {
      trace!("Matched publisher hint `{}`", hint.pattern);
      return hint.message.clone();
    }
    if identifiers.iter().all(|id| id.trim().is_empty()) {
      return NO_URLS_MESSAGE.to_string();
    }
    if !text.contains("pdf") {
      return NO_PDF_URLS_MESSAGE.to_string();
    }
    GENERIC_MESSAGE.to_string()
  }
}

impl Default for ManualHints {
  fn default() -> Self { Self::new(PublisherHint::defaults()) }
}
