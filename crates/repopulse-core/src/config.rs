use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PulseError;
use crate::types::AnalysisOptions;

/// Top-level configuration loaded from `.repopulse.toml`.
///
/// Supports layered resolution: CLI flags > env vars > local config > defaults.
///
/// # Examples
///
/// ```
/// use repopulse_core::PulseConfig;
///
/// let config = PulseConfig::default();
/// assert_eq!(config.analysis.days, 365);
/// assert_eq!(config.github.max_retries, 3);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PulseConfig {
    /// Window, limits and category switches.
    #[serde(default)]
    pub analysis: AnalysisOptions,
    /// GitHub collector settings.
    #[serde(default)]
    pub github: GitHubConfig,
}

impl PulseConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Io`] if the file cannot be read, or
    /// [`PulseError::Toml`] if the content is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self, PulseError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use repopulse_core::PulseConfig;
    ///
    /// let toml = r#"
    /// [analysis]
    /// days = 90
    /// analyze_prs = false
    /// "#;
    /// let config = PulseConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.analysis.days, 90);
    /// assert!(!config.analysis.analyze_prs);
    /// assert_eq!(config.analysis.max_commits, 1000);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, PulseError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }
}

/// GitHub collector configuration.
///
/// # Examples
///
/// ```
/// use repopulse_core::GitHubConfig;
///
/// let config = GitHubConfig::default();
/// assert_eq!(config.base_url, "https://api.github.com");
/// assert!(config.commit_line_stats);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Personal access token. Falls back to `GITHUB_TOKEN`, then `GH_TOKEN`.
    pub token: Option<String>,
    /// REST API base URL (default: `https://api.github.com`).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Retries for transient failures before giving up (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff unit in milliseconds; attempt `n` waits `n` units (default: 1000).
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Fetch each commit to get line statistics (default: true).
    #[serde(default = "default_true")]
    pub commit_line_stats: bool,
    /// Fetch user profiles for company and location (default: true).
    #[serde(default = "default_true")]
    pub contributor_profiles: bool,
    /// Fetch review lists to count reviews per pull request (default: true).
    #[serde(default = "default_true")]
    pub count_reviews: bool,
}

fn default_base_url() -> String {
    "https://api.github.com".into()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: default_base_url(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            commit_line_stats: true,
            contributor_profiles: true,
            count_reviews: true,
        }
    }
}

impl GitHubConfig {
    /// The configured token, or the first of `GITHUB_TOKEN` / `GH_TOKEN` that is set.
    pub fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .or_else(|| std::env::var("GH_TOKEN").ok())
    }
}

/// Commented template written by `repopulse init`.
pub const CONFIG_TEMPLATE: &str = r#"# repopulse configuration

[analysis]
# days = 365
# max_commits = 1000
# max_contributors = 100
# max_issues = 500
# max_prs = 300
# analyze_issues = true
# analyze_prs = true
# require_all_categories = false
# top_n = 10

[github]
# token = "ghp_..."            # or export GITHUB_TOKEN
# base_url = "https://api.github.com"
# max_retries = 3
# retry_base_delay_ms = 1000
# commit_line_stats = true     # one extra request per commit
# contributor_profiles = true  # one extra request per contributor
# count_reviews = true         # one extra request per pull request
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = PulseConfig::default();
        assert_eq!(config.analysis.max_issues, 500);
        assert_eq!(config.analysis.max_prs, 300);
        assert_eq!(config.analysis.top_n, 10);
        assert!(!config.analysis.require_all_categories);
        assert!(config.github.token.is_none());
        assert_eq!(config.github.retry_base_delay_ms, 1000);
        assert!(config.github.contributor_profiles);
        assert!(config.github.count_reviews);
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[analysis]
days = 30
max_commits = 50
max_contributors = 20
max_issues = 10
max_prs = 5
analyze_issues = false
require_all_categories = true
top_n = 3

[github]
token = "ghp_test"
base_url = "https://ghe.example.com/api/v3"
max_retries = 5
commit_line_stats = false
"#;
        let config = PulseConfig::from_toml(toml).unwrap();
        assert_eq!(config.analysis.days, 30);
        assert_eq!(config.analysis.max_commits, 50);
        assert!(!config.analysis.analyze_issues);
        assert!(config.analysis.analyze_prs);
        assert!(config.analysis.require_all_categories);
        assert_eq!(config.analysis.top_n, 3);
        assert_eq!(config.github.token.as_deref(), Some("ghp_test"));
        assert_eq!(config.github.base_url, "https://ghe.example.com/api/v3");
        assert_eq!(config.github.max_retries, 5);
        assert!(!config.github.commit_line_stats);
        assert!(config.github.contributor_profiles);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = PulseConfig::from_toml("").unwrap();
        assert_eq!(config.analysis, AnalysisOptions::default());
        assert_eq!(config.github.max_retries, 3);
    }

    #[test]
    fn template_parses_to_defaults() {
        let config = PulseConfig::from_toml(CONFIG_TEMPLATE).unwrap();
        assert_eq!(config.analysis, AnalysisOptions::default());
    }

    #[test]
    fn configured_token_wins_over_environment() {
        let config = GitHubConfig {
            token: Some("ghp_from_file".into()),
            ..GitHubConfig::default()
        };
        assert_eq!(config.resolve_token().as_deref(), Some("ghp_from_file"));
    }

    #[test]
    fn invalid_toml_returns_error() {
        let result = PulseConfig::from_toml("{{invalid}}");
        assert!(result.is_err());
    }
}
