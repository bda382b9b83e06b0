//! Raw GitHub REST payloads and their conversion into records.
//!
//! Every conversion is pure. A payload that cannot become a valid record
//! turns into a [`RecordAnomaly`] naming the item and the problem.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use repopulse_core::{
    CommitRecord, ContributorRecord, IssueRecord, IssueState, PullRequestRecord,
    PullRequestState, RecordAnomaly, RepoInfo,
};

#[derive(Debug, Clone, Deserialize)]
pub struct RawUser {
    pub login: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLicense {
    pub spdx_id: Option<String>,
    pub name: Option<String>,
}

/// `GET /repos/{owner}/{repo}`
#[derive(Debug, Clone, Deserialize)]
pub struct RawRepo {
    pub full_name: String,
    pub description: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    #[serde(default)]
    pub open_issues_count: u64,
    pub default_branch: Option<String>,
    pub license: Option<RawLicense>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub created_at: Option<String>,
    pub pushed_at: Option<String>,
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawGitActor {
    pub name: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCommitDetail {
    pub author: Option<RawGitActor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCommitStats {
    pub additions: u64,
    pub deletions: u64,
}

/// `GET /repos/{owner}/{repo}/commits` items, and the single-commit payload
/// which adds `stats` and `files`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCommit {
    pub sha: String,
    pub commit: RawCommitDetail,
    pub author: Option<RawUser>,
    pub stats: Option<RawCommitStats>,
    pub files: Option<Vec<serde_json::Value>>,
}

/// `GET /repos/{owner}/{repo}/contributors` items.
#[derive(Debug, Clone, Deserialize)]
pub struct RawContributor {
    pub login: Option<String>,
    #[serde(default)]
    pub contributions: u64,
}

/// `GET /users/{login}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProfile {
    pub company: Option<String>,
    pub location: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLabel {
    pub name: String,
}

/// `GET /repos/{owner}/{repo}/issues` items. Pull requests carry `pull_request`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawIssue {
    pub number: u64,
    pub state: String,
    pub created_at: Option<String>,
    pub closed_at: Option<String>,
    #[serde(default)]
    pub labels: Vec<RawLabel>,
    pub user: Option<RawUser>,
    pub pull_request: Option<serde_json::Value>,
}

impl RawIssue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

/// `GET /repos/{owner}/{repo}/pulls` items and the single pull request
/// payload, which adds the size fields.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPull {
    pub number: u64,
    pub state: String,
    pub created_at: Option<String>,
    pub merged_at: Option<String>,
    pub closed_at: Option<String>,
    pub user: Option<RawUser>,
    pub additions: Option<u64>,
    pub deletions: Option<u64>,
    pub changed_files: Option<u64>,
}

impl RawPull {
    /// Creation time, if present and well formed.
    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.created_at.as_deref().and_then(|ts| parse_utc(ts).ok())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRate {
    pub limit: u64,
    pub remaining: u64,
    #[serde(default)]
    pub used: u64,
    pub reset: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRateResources {
    pub core: RawRate,
    pub search: Option<RawRate>,
}

/// `GET /rate_limit`
#[derive(Debug, Clone, Deserialize)]
pub struct RawRateLimit {
    pub resources: RawRateResources,
}

/// Remaining API budget for one resource.
///
/// # Examples
///
/// ```
/// use repopulse_github::RateLimitStatus;
///
/// let status = RateLimitStatus { limit: 5000, remaining: 4990, used: 10, reset_at: None };
/// assert!(!status.is_exhausted());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    /// Requests allowed per window.
    pub limit: u64,
    /// Requests left in the current window.
    pub remaining: u64,
    /// Requests spent in the current window.
    pub used: u64,
    /// When the window resets.
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateLimitStatus {
    /// `true` when no requests remain.
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// Core and search budgets reported by `GET /rate_limit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    /// REST API budget.
    pub core: RateLimitStatus,
    /// Search API budget.
    pub search: Option<RateLimitStatus>,
}

fn rate_status(raw: &RawRate) -> RateLimitStatus {
    RateLimitStatus {
        limit: raw.limit,
        remaining: raw.remaining,
        used: raw.used,
        reset_at: DateTime::from_timestamp(raw.reset, 0),
    }
}

pub fn rate_limits(raw: &RawRateLimit) -> RateLimits {
    RateLimits {
        core: rate_status(&raw.resources.core),
        search: raw.resources.search.as_ref().map(rate_status),
    }
}

fn parse_fixed(ts: &str) -> Result<DateTime<FixedOffset>, String> {
    DateTime::parse_from_rfc3339(ts).map_err(|e| format!("unparseable timestamp '{ts}': {e}"))
}

fn parse_utc(ts: &str) -> Result<DateTime<Utc>, String> {
    parse_fixed(ts).map(|dt| dt.with_timezone(&Utc))
}

/// Parse an optional timestamp; `Ok(None)` when absent.
fn parse_optional(ts: Option<&str>) -> Result<Option<DateTime<Utc>>, String> {
    ts.map(parse_utc).transpose()
}

fn login(user: Option<&RawUser>) -> Option<String> {
    user.and_then(|u| u.login.clone())
        .filter(|l| !l.trim().is_empty())
}

/// Repository metadata. Malformed timestamps are dropped rather than rejected.
pub fn repo_info(raw: RawRepo) -> RepoInfo {
    RepoInfo {
        full_name: raw.full_name,
        description: raw.description,
        language: raw.language,
        stars: raw.stargazers_count,
        forks: raw.forks_count,
        open_issues: raw.open_issues_count,
        default_branch: raw.default_branch,
        license: raw
            .license
            .and_then(|l| l.spdx_id.filter(|id| id != "NOASSERTION").or(l.name)),
        topics: raw.topics,
        created_at: raw.created_at.as_deref().and_then(|ts| parse_utc(ts).ok()),
        pushed_at: raw.pushed_at.as_deref().and_then(|ts| parse_utc(ts).ok()),
        html_url: raw.html_url,
    }
}

/// A commit record. A missing date is legal; a malformed one is an anomaly.
///
/// The author is the linked GitHub login, else the git author name.
pub fn commit_record(raw: &RawCommit) -> Result<CommitRecord, RecordAnomaly> {
    let id = || format!("commit {}", short_sha(&raw.sha));
    let git_author = raw.commit.author.as_ref();

    let timestamp = git_author
        .and_then(|a| a.date.as_deref())
        .map(parse_fixed)
        .transpose()
        .map_err(|reason| RecordAnomaly::new(id(), reason))?;

    let author = login(raw.author.as_ref()).or_else(|| {
        git_author
            .and_then(|a| a.name.clone())
            .filter(|n| !n.trim().is_empty())
    });

    Ok(CommitRecord {
        sha: raw.sha.clone(),
        author,
        timestamp,
        additions: raw.stats.as_ref().map(|s| s.additions),
        deletions: raw.stats.as_ref().map(|s| s.deletions),
        files_changed: raw.files.as_ref().map(|f| f.len() as u64),
    })
}

/// A contributor record, enriched with a profile when one was fetched.
///
/// A malformed profile `created_at` leaves the account age unknown.
pub fn contributor_record(
    raw: &RawContributor,
    profile: Option<&RawProfile>,
) -> Result<ContributorRecord, RecordAnomaly> {
    let Some(login) = raw.login.clone().filter(|l| !l.trim().is_empty()) else {
        return Err(RecordAnomaly::new(
            "contributor",
            "anonymous contributor without a login",
        ));
    };
    Ok(ContributorRecord {
        login,
        commits: raw.contributions,
        company: profile.and_then(|p| p.company.clone()),
        location: profile.and_then(|p| p.location.clone()),
        account_created_at: profile
            .and_then(|p| p.created_at.as_deref())
            .and_then(|ts| parse_utc(ts).ok()),
    })
}

/// An issue record. Requires a valid `created_at` and a known state.
pub fn issue_record(raw: &RawIssue) -> Result<IssueRecord, RecordAnomaly> {
    let anomaly = |reason: String| RecordAnomaly::new(format!("issue #{}", raw.number), reason);

    let state = match raw.state.as_str() {
        "open" => IssueState::Open,
        "closed" => IssueState::Closed,
        other => return Err(anomaly(format!("unknown state '{other}'"))),
    };
    let created_at = match raw.created_at.as_deref() {
        Some(ts) => parse_utc(ts).map_err(anomaly)?,
        None => return Err(anomaly("missing created_at".into())),
    };
    let closed_at = parse_optional(raw.closed_at.as_deref()).map_err(anomaly)?;

    Ok(IssueRecord {
        number: raw.number,
        state,
        created_at,
        closed_at,
        labels: raw.labels.iter().map(|l| l.name.clone()).collect(),
        creator: login(raw.user.as_ref()),
    })
}

/// A pull request record from the single pull request payload.
///
/// A closed pull request with `merged_at` is merged.
pub fn pull_record(raw: &RawPull, review_count: Option<u64>) -> Result<PullRequestRecord, RecordAnomaly> {
    let anomaly =
        |reason: String| RecordAnomaly::new(format!("pull request #{}", raw.number), reason);

    let created_at = match raw.created_at.as_deref() {
        Some(ts) => parse_utc(ts).map_err(anomaly)?,
        None => return Err(anomaly("missing created_at".into())),
    };
    let merged_at = parse_optional(raw.merged_at.as_deref()).map_err(anomaly)?;
    let closed_at = parse_optional(raw.closed_at.as_deref()).map_err(anomaly)?;

    let state = match (raw.state.as_str(), merged_at) {
        ("open", _) => PullRequestState::Open,
        ("closed", Some(_)) => PullRequestState::Merged,
        ("closed", None) => PullRequestState::Closed,
        (other, _) => return Err(anomaly(format!("unknown state '{other}'"))),
    };

    let (Some(additions), Some(deletions), Some(changed_files)) =
        (raw.additions, raw.deletions, raw.changed_files)
    else {
        return Err(anomaly("missing size fields".into()));
    };

    Ok(PullRequestRecord {
        number: raw.number,
        state,
        created_at,
        merged_at,
        closed_at,
        additions,
        deletions,
        changed_files,
        review_count,
        author: login(raw.user.as_ref()),
    })
}

fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> T {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn commit_prefers_login_over_git_name() {
        let commit: RawCommit = raw(json!({
            "sha": "0123456789abcdef",
            "commit": { "author": { "name": "Alice A.", "date": "2024-03-01T09:30:00+02:00" } },
            "author": { "login": "alice" },
            "stats": { "additions": 12, "deletions": 3, "total": 15 },
            "files": [{ "filename": "a.rs" }, { "filename": "b.rs" }]
        }));
        let record = commit_record(&commit).unwrap();
        assert_eq!(record.author.as_deref(), Some("alice"));
        assert_eq!(record.timestamp.unwrap().offset().local_minus_utc(), 7200);
        assert_eq!(record.additions, Some(12));
        assert_eq!(record.files_changed, Some(2));
    }

    #[test]
    fn commit_list_item_has_no_line_data() {
        let commit: RawCommit = raw(json!({
            "sha": "abc",
            "commit": { "author": { "name": "Bob", "date": "2024-03-01T09:30:00Z" } },
            "author": null
        }));
        let record = commit_record(&commit).unwrap();
        assert_eq!(record.author.as_deref(), Some("Bob"));
        assert!(!record.has_line_data());
        assert!(record.files_changed.is_none());
    }

    #[test]
    fn commit_with_bad_date_is_an_anomaly() {
        let commit: RawCommit = raw(json!({
            "sha": "deadbeefcafe",
            "commit": { "author": { "name": "x", "date": "yesterday" } }
        }));
        let anomaly = commit_record(&commit).unwrap_err();
        assert_eq!(anomaly.id, "commit deadbee");
        assert!(anomaly.reason.contains("yesterday"));
    }

    #[test]
    fn commit_without_date_keeps_record() {
        let commit: RawCommit = raw(json!({ "sha": "abc", "commit": { "author": null } }));
        let record = commit_record(&commit).unwrap();
        assert!(record.timestamp.is_none());
        assert!(record.author.is_none());
    }

    #[test]
    fn anonymous_contributor_is_an_anomaly() {
        let anon: RawContributor = raw(json!({ "contributions": 4, "type": "Anonymous" }));
        assert!(contributor_record(&anon, None).is_err());

        let named: RawContributor = raw(json!({ "login": "octo", "contributions": 9 }));
        let profile = RawProfile {
            company: Some("@github".into()),
            location: None,
            created_at: Some("2011-01-25T18:44:36Z".into()),
        };
        let record = contributor_record(&named, Some(&profile)).unwrap();
        assert_eq!(record.commits, 9);
        assert_eq!(record.company.as_deref(), Some("@github"));
        assert_eq!(
            record.account_created_at.unwrap().to_rfc3339(),
            "2011-01-25T18:44:36+00:00"
        );
    }

    #[test]
    fn malformed_profile_date_leaves_age_unknown() {
        let named: RawContributor = raw(json!({ "login": "octo", "contributions": 1 }));
        let profile: RawProfile = raw(json!({ "created_at": "yesterday" }));
        let record = contributor_record(&named, Some(&profile)).unwrap();
        assert!(record.account_created_at.is_none());

        let bare = contributor_record(&named, None).unwrap();
        assert!(bare.account_created_at.is_none());
    }

    #[test]
    fn issue_conversion_checks_state_and_dates() {
        let issue: RawIssue = raw(json!({
            "number": 7,
            "state": "closed",
            "created_at": "2024-01-01T00:00:00Z",
            "closed_at": "2024-01-02T00:00:00Z",
            "labels": [{ "name": "bug" }],
            "user": { "login": "reporter" }
        }));
        let record = issue_record(&issue).unwrap();
        assert_eq!(record.state, IssueState::Closed);
        assert_eq!(record.labels, ["bug"]);
        assert_eq!(record.creator.as_deref(), Some("reporter"));
        assert!(!issue.is_pull_request());

        let broken: RawIssue = raw(json!({ "number": 8, "state": "open", "created_at": null }));
        assert_eq!(issue_record(&broken).unwrap_err().id, "issue #8");

        let weird: RawIssue = raw(json!({
            "number": 9, "state": "locked", "created_at": "2024-01-01T00:00:00Z"
        }));
        assert!(issue_record(&weird).unwrap_err().reason.contains("locked"));
    }

    #[test]
    fn issue_payload_flags_pull_requests() {
        let issue: RawIssue = raw(json!({
            "number": 10,
            "state": "open",
            "created_at": "2024-01-01T00:00:00Z",
            "pull_request": { "url": "https://api.github.com/repos/o/r/pulls/10" }
        }));
        assert!(issue.is_pull_request());
    }

    #[test]
    fn pull_state_follows_merged_at() {
        let base = json!({
            "number": 3,
            "state": "closed",
            "created_at": "2024-01-01T00:00:00Z",
            "closed_at": "2024-01-01T05:00:00Z",
            "merged_at": "2024-01-01T05:00:00Z",
            "user": { "login": "dev" },
            "additions": 10, "deletions": 2, "changed_files": 1
        });
        let merged: RawPull = raw(base.clone());
        let record = pull_record(&merged, Some(2)).unwrap();
        assert_eq!(record.state, PullRequestState::Merged);
        assert_eq!(record.review_count, Some(2));

        let mut closed = base;
        closed["merged_at"] = serde_json::Value::Null;
        let record = pull_record(&raw(closed), None).unwrap();
        assert_eq!(record.state, PullRequestState::Closed);
    }

    #[test]
    fn pull_list_item_without_sizes_is_an_anomaly() {
        let item: RawPull = raw(json!({
            "number": 4, "state": "open", "created_at": "2024-01-01T00:00:00Z"
        }));
        assert!(item.created().is_some());
        let anomaly = pull_record(&item, None).unwrap_err();
        assert_eq!(anomaly.id, "pull request #4");
    }

    #[test]
    fn repo_info_prefers_spdx_id() {
        let repo: RawRepo = raw(json!({
            "full_name": "octo/hello",
            "stargazers_count": 42,
            "license": { "spdx_id": "MIT", "name": "MIT License" },
            "topics": ["cli"],
            "created_at": "2020-01-01T00:00:00Z",
            "pushed_at": "garbage"
        }));
        let info = repo_info(repo);
        assert_eq!(info.stars, 42);
        assert_eq!(info.license.as_deref(), Some("MIT"));
        assert!(info.created_at.is_some());
        assert!(info.pushed_at.is_none());
    }

    #[test]
    fn rate_limits_convert_reset_time() {
        let payload: RawRateLimit = raw(json!({
            "resources": {
                "core": { "limit": 5000, "remaining": 0, "used": 5000, "reset": 1700000000 },
                "search": { "limit": 30, "remaining": 30, "used": 0, "reset": 1700000000 }
            }
        }));
        let limits = rate_limits(&payload);
        assert!(limits.core.is_exhausted());
        assert_eq!(limits.core.reset_at.unwrap().timestamp(), 1_700_000_000);
        assert_eq!(limits.search.unwrap().remaining, 30);
    }
}
