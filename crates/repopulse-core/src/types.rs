use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PulseError;

/// Settings for one `full_analysis` run.
///
/// Doubles as the `[analysis]` table of `.repopulse.toml`.
///
/// # Examples
///
/// ```
/// use repopulse_core::AnalysisOptions;
///
/// let opts = AnalysisOptions::default();
/// assert_eq!(opts.days, 365);
/// assert_eq!(opts.max_commits, 1000);
/// assert_eq!(opts.max_contributors, 100);
/// assert_eq!(opts.max_issues, 500);
/// assert_eq!(opts.max_prs, 300);
/// assert!(opts.analyze_issues && opts.analyze_prs);
/// assert!(opts.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    /// Window length in days (default: 365).
    #[serde(default = "default_days")]
    pub days: u32,
    /// Maximum commits to analyze (default: 1000).
    #[serde(default = "default_max_commits")]
    pub max_commits: usize,
    /// Maximum contributors to analyze (default: 100).
    #[serde(default = "default_max_contributors")]
    pub max_contributors: usize,
    /// Maximum issues to analyze (default: 500).
    #[serde(default = "default_max_issues")]
    pub max_issues: usize,
    /// Maximum pull requests to analyze (default: 300).
    #[serde(default = "default_max_prs")]
    pub max_prs: usize,
    /// Run the issue analyzer (default: true).
    #[serde(default = "default_true")]
    pub analyze_issues: bool,
    /// Run the pull request analyzer (default: true).
    #[serde(default = "default_true")]
    pub analyze_prs: bool,
    /// Abort the whole run when any category fails to fetch (default: false).
    #[serde(default)]
    pub require_all_categories: bool,
    /// Length of "top" rankings (default: 10).
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

fn default_days() -> u32 {
    365
}

fn default_max_commits() -> usize {
    1000
}

fn default_max_contributors() -> usize {
    100
}

fn default_max_issues() -> usize {
    500
}

fn default_max_prs() -> usize {
    300
}

fn default_top_n() -> usize {
    10
}

fn default_true() -> bool {
    true
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            days: default_days(),
            max_commits: default_max_commits(),
            max_contributors: default_max_contributors(),
            max_issues: default_max_issues(),
            max_prs: default_max_prs(),
            analyze_issues: true,
            analyze_prs: true,
            require_all_categories: false,
            top_n: default_top_n(),
        }
    }
}

impl AnalysisOptions {
    /// Reject zero-length windows and zero limits.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::InvalidWindow`] naming the first offending field.
    pub fn validate(&self) -> Result<(), PulseError> {
        if self.days == 0 {
            return Err(PulseError::InvalidWindow("days must be positive".into()));
        }
        let limits = [
            ("max_commits", self.max_commits),
            ("max_contributors", self.max_contributors),
            ("max_issues", self.max_issues),
            ("max_prs", self.max_prs),
            ("top_n", self.top_n),
        ];
        for (field, value) in limits {
            if value == 0 {
                return Err(PulseError::InvalidWindow(format!("{field} must be positive")));
            }
        }
        Ok(())
    }

    /// The per-category limits of these options.
    pub fn limits(&self) -> AnalysisLimits {
        AnalysisLimits {
            max_commits: self.max_commits,
            max_contributors: self.max_contributors,
            max_issues: self.max_issues,
            max_prs: self.max_prs,
        }
    }
}

/// Per-category record limits used for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisLimits {
    /// Commit limit.
    pub max_commits: usize,
    /// Contributor limit.
    pub max_contributors: usize,
    /// Issue limit.
    pub max_issues: usize,
    /// Pull request limit.
    pub max_prs: usize,
}

/// The `[since, until]` window a run covered.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use repopulse_core::AnalysisWindow;
///
/// let now = Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap();
/// let window = AnalysisWindow::ending_at(now, 30).unwrap();
/// assert_eq!(window.since, Utc.with_ymd_and_hms(2024, 5, 31, 12, 0, 0).unwrap());
/// assert!(window.contains(now));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisWindow {
    /// Inclusive start.
    pub since: DateTime<Utc>,
    /// Inclusive end, the run's "now".
    pub until: DateTime<Utc>,
    /// Window length in days.
    pub days: u32,
}

impl AnalysisWindow {
    /// The window of `days` days ending at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::InvalidWindow`] when the start would fall before
    /// the earliest representable timestamp.
    pub fn ending_at(now: DateTime<Utc>, days: u32) -> Result<Self, PulseError> {
        let since = TimeDelta::try_days(i64::from(days))
            .and_then(|span| now.checked_sub_signed(span))
            .ok_or_else(|| {
                PulseError::InvalidWindow(format!("days = {days} reaches past the earliest date"))
            })?;
        Ok(Self {
            since,
            until: now,
            days,
        })
    }

    /// Whether `at` falls inside the window.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.since && at <= self.until
    }
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use repopulse_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summaries.
    #[default]
    Text,
    /// The serialized `AnalysisResult`.
    Json,
    /// Markdown tables.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_from_str() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("sarif".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn zero_days_is_rejected() {
        let opts = AnalysisOptions {
            days: 0,
            ..AnalysisOptions::default()
        };
        let err = opts.validate().unwrap_err();
        assert!(matches!(err, PulseError::InvalidWindow(_)));
        assert!(err.to_string().contains("days"));
    }

    #[test]
    fn zero_limit_is_rejected_by_name() {
        let opts = AnalysisOptions {
            max_prs: 0,
            ..AnalysisOptions::default()
        };
        let err = opts.validate().unwrap_err();
        assert!(err.to_string().contains("max_prs"));
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let now = Utc::now();
        let window = AnalysisWindow::ending_at(now, 1).unwrap();
        assert!(window.contains(window.since));
        assert!(window.contains(now));
        assert!(!window.contains(now + TimeDelta::seconds(1)));
    }

    #[test]
    fn oversized_window_is_an_error_not_a_panic() {
        let opts = AnalysisOptions {
            days: 200_000_000,
            ..AnalysisOptions::default()
        };
        assert!(opts.validate().is_ok());
        let err = AnalysisWindow::ending_at(Utc::now(), opts.days).unwrap_err();
        assert!(matches!(err, PulseError::InvalidWindow(_)));
        assert!(err.to_string().contains("200000000"));
    }

    #[test]
    fn largest_u32_window_never_panics() {
        let now = Utc::now();
        assert!(AnalysisWindow::ending_at(now, u32::MAX).is_err());
        assert!(AnalysisWindow::ending_at(now, 36_500).is_ok());
    }
}
