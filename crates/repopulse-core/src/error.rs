use std::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur across the repopulse workspace.
///
/// Library crates use this type directly; the binary crate converts to
/// `miette::Report` at the boundary.
///
/// # Examples
///
/// ```
/// use repopulse_core::PulseError;
///
/// let err = PulseError::InvalidRepository("no-slash".into());
/// assert!(err.to_string().contains("no-slash"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum PulseError {
    /// Malformed `owner/name` string, or the repository does not exist.
    #[error("invalid repository: {0}")]
    InvalidRepository(String),

    /// Non-positive window length or record limit.
    #[error("invalid analysis window: {0}")]
    InvalidWindow(String),

    /// The record collector gave up after exhausting its retry budget.
    #[error("fetch failed while loading {stage}: {reason}")]
    FetchFailed {
        /// Which fetch stage failed.
        stage: FetchStage,
        /// Collector-provided description.
        reason: String,
    },

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PulseError {
    /// Shorthand for a [`PulseError::FetchFailed`] at `stage`.
    pub fn fetch(stage: FetchStage, reason: impl Into<String>) -> Self {
        PulseError::FetchFailed {
            stage,
            reason: reason.into(),
        }
    }
}

/// The collector call a [`PulseError::FetchFailed`] originated from.
///
/// # Examples
///
/// ```
/// use repopulse_core::FetchStage;
///
/// assert_eq!(FetchStage::PullRequests.to_string(), "pull requests");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStage {
    /// Repository metadata lookup.
    Repository,
    /// Commit listing.
    Commits,
    /// Contributor listing.
    Contributors,
    /// Issue listing.
    Issues,
    /// Pull request listing.
    PullRequests,
    /// Rate limit status.
    RateLimit,
}

impl fmt::Display for FetchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchStage::Repository => write!(f, "repository"),
            FetchStage::Commits => write!(f, "commits"),
            FetchStage::Contributors => write!(f, "contributors"),
            FetchStage::Issues => write!(f, "issues"),
            FetchStage::PullRequests => write!(f, "pull requests"),
            FetchStage::RateLimit => write!(f, "rate limit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PulseError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn config_error_displays_message() {
        let err = PulseError::Config("bad value".into());
        assert_eq!(err.to_string(), "configuration error: bad value");
    }

    #[test]
    fn fetch_failed_names_the_stage() {
        let err = PulseError::fetch(FetchStage::Issues, "HTTP 502 after 3 retries");
        assert_eq!(
            err.to_string(),
            "fetch failed while loading issues: HTTP 502 after 3 retries"
        );
    }
}
