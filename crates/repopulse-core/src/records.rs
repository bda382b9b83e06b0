use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PulseError;

/// A validated `owner/name` repository reference.
///
/// # Examples
///
/// ```
/// use repopulse_core::RepoName;
///
/// let repo = RepoName::parse("rust-lang/rust").unwrap();
/// assert_eq!(repo.owner(), "rust-lang");
/// assert_eq!(repo.name(), "rust");
/// assert_eq!(repo.to_string(), "rust-lang/rust");
///
/// assert!(RepoName::parse("rust-lang").is_err());
/// assert!(RepoName::parse("a/b/c").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoName {
    owner: String,
    name: String,
}

impl RepoName {
    /// Parse an `owner/name` string.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::InvalidRepository`] unless the input is exactly two
    /// non-empty segments of ASCII letters, digits, `.`, `_` or `-`.
    pub fn parse(input: &str) -> Result<Self, PulseError> {
        let invalid = || {
            PulseError::InvalidRepository(format!("'{input}' is not of the form owner/name"))
        };

        let Some((owner, name)) = input.split_once('/') else {
            return Err(invalid());
        };
        if !is_valid_segment(owner) || !is_valid_segment(name) {
            return Err(invalid());
        }
        // "." and ".." are path tricks, not repositories
        if matches!(name, "." | "..") || matches!(owner, "." | "..") {
            return Err(invalid());
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    /// Repository owner (user or organization).
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Repository name without the owner.
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoName {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// One commit as seen by the analysis engine.
///
/// Line data and timestamps are optional because the platform does not
/// always provide them; such commits still count toward totals.
///
/// # Examples
///
/// ```
/// use repopulse_core::CommitRecord;
///
/// let commit = CommitRecord {
///     sha: "a1b2c3d".into(),
///     author: Some("alice".into()),
///     timestamp: chrono::DateTime::parse_from_rfc3339("2024-03-01T09:30:00Z").ok(),
///     additions: Some(12),
///     deletions: Some(3),
///     files_changed: Some(2),
/// };
/// assert!(commit.has_line_data());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Commit identifier.
    pub sha: String,
    /// Author name or login, if the platform linked one.
    pub author: Option<String>,
    /// Author timestamp with its original UTC offset.
    pub timestamp: Option<DateTime<FixedOffset>>,
    /// Lines added.
    pub additions: Option<u64>,
    /// Lines deleted.
    pub deletions: Option<u64>,
    /// Files touched.
    pub files_changed: Option<u64>,
}

impl CommitRecord {
    /// `true` when both additions and deletions are known.
    pub fn has_line_data(&self) -> bool {
        self.additions.is_some() && self.deletions.is_some()
    }
}

/// One contributor with their commit count in the analysis window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorRecord {
    /// Login or display identity.
    pub login: String,
    /// Commits attributed to this contributor.
    pub commits: u64,
    /// Self-reported company.
    pub company: Option<String>,
    /// Self-reported location.
    pub location: Option<String>,
    /// When the account was created, if the profile was fetched.
    #[serde(default)]
    pub account_created_at: Option<DateTime<Utc>>,
}

/// Issue lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    /// Still open.
    Open,
    /// Closed, for any reason.
    Closed,
}

/// One issue (pull requests excluded).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    /// Issue number within the repository.
    pub number: u64,
    /// Current state.
    pub state: IssueState,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Close time; `None` while open.
    pub closed_at: Option<DateTime<Utc>>,
    /// Label names attached to the issue.
    pub labels: Vec<String>,
    /// Login of the issue author.
    pub creator: Option<String>,
}

/// Pull request lifecycle state.
///
/// `Closed` means closed without being merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestState {
    /// Still open.
    Open,
    /// Merged into the base branch.
    Merged,
    /// Closed without merging.
    Closed,
}

/// One pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestRecord {
    /// Pull request number within the repository.
    pub number: u64,
    /// Current state.
    pub state: PullRequestState,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Merge time, if merged.
    pub merged_at: Option<DateTime<Utc>>,
    /// Close time, if closed or merged.
    pub closed_at: Option<DateTime<Utc>>,
    /// Lines added.
    pub additions: u64,
    /// Lines deleted.
    pub deletions: u64,
    /// Files touched.
    pub changed_files: u64,
    /// Number of submitted reviews, when known.
    pub review_count: Option<u64>,
    /// Login of the pull request author.
    pub author: Option<String>,
}

impl PullRequestRecord {
    /// `additions + deletions`.
    pub fn changed_lines(&self) -> u64 {
        self.additions.saturating_add(self.deletions)
    }
}

/// A record that was left out of aggregates, with the reason.
///
/// # Examples
///
/// ```
/// use repopulse_core::RecordAnomaly;
///
/// let anomaly = RecordAnomaly::new("issue #12", "closed before it was created");
/// assert_eq!(anomaly.to_string(), "issue #12: closed before it was created");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordAnomaly {
    /// Identifier of the offending record.
    pub id: String,
    /// Why it was excluded.
    pub reason: String,
}

impl RecordAnomaly {
    /// Build an anomaly entry.
    pub fn new(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RecordAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.reason)
    }
}

/// A bounded batch of records returned by a collector.
///
/// `truncated` is set when the source had more records than the requested
/// limit. `anomalies` lists raw records that could not be converted.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch<T> {
    /// Converted records, at most the requested limit.
    pub records: Vec<T>,
    /// Whether more records existed than were returned.
    pub truncated: bool,
    /// Raw records dropped during conversion.
    pub anomalies: Vec<RecordAnomaly>,
}

impl<T> RecordBatch<T> {
    /// A complete batch with no dropped records.
    pub fn complete(records: Vec<T>) -> Self {
        Self {
            records,
            truncated: false,
            anomalies: Vec::new(),
        }
    }

    /// Enforce `limit`, marking the batch truncated if records were cut.
    ///
    /// # Examples
    ///
    /// ```
    /// use repopulse_core::RecordBatch;
    ///
    /// let batch = RecordBatch::complete((0..50).collect::<Vec<u32>>()).enforce_limit(10);
    /// assert_eq!(batch.records.len(), 10);
    /// assert!(batch.truncated);
    /// ```
    pub fn enforce_limit(mut self, limit: usize) -> Self {
        if self.records.len() > limit {
            self.records.truncate(limit);
            self.truncated = true;
        }
        self
    }
}

impl<T> Default for RecordBatch<T> {
    fn default() -> Self {
        Self::complete(Vec::new())
    }
}

/// Repository metadata reported alongside the analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoInfo {
    /// `owner/name` as reported by the platform.
    pub full_name: String,
    /// Repository description.
    pub description: Option<String>,
    /// Primary language.
    pub language: Option<String>,
    /// Star count.
    pub stars: u64,
    /// Fork count.
    pub forks: u64,
    /// Open issues and pull requests.
    pub open_issues: u64,
    /// Default branch name.
    pub default_branch: Option<String>,
    /// SPDX name of the license.
    pub license: Option<String>,
    /// Repository topics.
    #[serde(default)]
    pub topics: Vec<String>,
    /// Creation time.
    pub created_at: Option<DateTime<Utc>>,
    /// Last push time.
    pub pushed_at: Option<DateTime<Utc>>,
    /// Web URL.
    pub html_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_common_names() {
        for input in ["octocat/hello-world", "a.b/c_d", "Org-1/repo.rs"] {
            assert!(RepoName::parse(input).is_ok(), "{input} should parse");
        }
    }

    #[test]
    fn parse_rejects_malformed_names() {
        for input in ["", "/", "owner/", "/name", "a/b/c", "own er/name", "owner/..", "o/n#1"] {
            let err = RepoName::parse(input).unwrap_err();
            assert!(
                matches!(err, PulseError::InvalidRepository(_)),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn enforce_limit_keeps_short_batches_intact() {
        let batch = RecordBatch::complete(vec![1, 2, 3]).enforce_limit(3);
        assert_eq!(batch.records, vec![1, 2, 3]);
        assert!(!batch.truncated);
    }

    #[test]
    fn enforce_limit_preserves_collector_truncation_flag() {
        let batch = RecordBatch {
            records: vec![1, 2],
            truncated: true,
            anomalies: Vec::new(),
        }
        .enforce_limit(5);
        assert!(batch.truncated);
    }

    #[test]
    fn changed_lines_saturates() {
        let pr = PullRequestRecord {
            number: 1,
            state: PullRequestState::Open,
            created_at: Utc::now(),
            merged_at: None,
            closed_at: None,
            additions: u64::MAX,
            deletions: 1,
            changed_files: 1,
            review_count: None,
            author: None,
        };
        assert_eq!(pr.changed_lines(), u64::MAX);
    }
}
