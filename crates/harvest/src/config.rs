//! Tunables for a harvest run.
//!
//! Everything has a sensible default; a JSON file can override any subset of the fields.
//!
//! ```json
//! {
//!   "rate_limit_delay_secs": 2.5,
//!   "publisher_hints": [
//!     { "pattern": "sciencedirect", "message": "Try ScienceDirect through your library." }
//!   ]
//! }
//! ```

use super::*;
use crate::hints::{ManualHints, PublisherHint};

/// Browser-like user agent sent with every request by default.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                                      AppleWebKit/537.36 (KHTML, like Gecko) \
                                      Chrome/91.0.4472.124 Safari/537.36";

/// Configuration shared by the HTTP client, the acquirer and the batch runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
  /// Pause after every successful download, in seconds
  pub rate_limit_delay_secs: f64,
  /// Per-request timeout, in seconds
  pub request_timeout_secs:  u64,
  /// Extra attempts for a request answered with 429/500/502/503/504
  pub max_retries:           u32,
  /// Base of the exponential backoff between retries, in seconds
  pub backoff_factor_secs:   f64,
  /// User-Agent header value
  pub user_agent:            String,
  /// Guidance table for papers that need a manual download
  pub publisher_hints:       Vec<PublisherHint>,
}

impl HarvestConfig {
  /// Reads a configuration file; missing fields keep their defaults.
  pub fn load(path: impl AsRef<Path>) -> Result<Self, HarvestError> {
    let path = path.as_ref();
    debug!("Loading configuration from {}", path.display());
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text)
      .map_err(|e| HarvestError::Config(format!("{}: {e}", path.display())))
  }

  /// Default location of the projects root: the user's data directory.
  pub fn default_root() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("harvest")
  }

  /// The rate-limit delay.
  pub fn rate_limit(&self) -> Duration {
    Duration::from_secs_f64(self.rate_limit_delay_secs.max(0.0))
  }

  /// The per-request timeout.
  pub fn request_timeout(&self) -> Duration { Duration::from_secs(self.request_timeout_secs) }

  /// Backoff before retry number `attempt` (starting at 1): `factor * 2^(attempt - 1)`.
  pub fn backoff(&self, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    Duration::from_secs_f64(self.backoff_factor_secs.max(0.0) * f64::from(1u32 << exponent))
  }

  /// The publisher hint table.
  pub fn manual_hints(&self) -> ManualHints { ManualHints::new(self.publisher_hints.clone()) }
}

impl Default for HarvestConfig {
  fn default() -> Self {
    Self {
      rate_limit_delay_secs: 1.0,
      request_timeout_secs:  30,
      max_retries:           3,
      backoff_factor_secs:   1.0,
      user_agent:            DEFAULT_USER_AGENT.to_string(),
      publisher_hints:       PublisherHint::defaults(),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use tempfile::NamedTempFile;

  use super::*;

  #[test]
  fn test_partial_file_keeps_defaults() -> anyhow::Result<()> {
    let mut file = NamedTempFile::new()?;
    write!(file, r#"{{ "rate_limit_delay_secs": 0.25, "max_retries": 5 }}"#)?;

    let config = HarvestConfig::load(file.path())?;
    assert_eq!(config.rate_limit(), Duration::from_millis(250));
    assert_eq!(config.max_retries, 5);
    assert_eq!(config.request_timeout(), Duration::from_secs(30));
    assert_eq!(config.publisher_hints.len(), 3);
    Ok(())
  }

  #[test]
  fn test_malformed_file_is_config_error() -> anyhow::Result<()> {
    let mut file = NamedTempFile::new()?;
    write!(file, "not json")?;
    assert!(matches!(HarvestConfig::load(file.path()), Err(HarvestError::Config(_))));
    Ok(())
  }

  #[test]
  fn test_backoff_doubles() {
    let config = HarvestConfig::default();
    assert_eq!(config.backoff(1), Duration::from_secs(1));
    assert_eq!(config.backoff(2), Duration::from_secs(2));
    assert_eq!(config.backoff(3), Duration::from_secs(4));
  }
}
