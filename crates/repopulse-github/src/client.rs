use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use repopulse_core::{
    AnalysisWindow, CommitRecord, ContributorRecord, FetchStage, GitHubConfig, IssueRecord,
    PullRequestRecord, PulseError, RecordAnomaly, RecordBatch, RepoInfo, RepoName, Result,
};
use repopulse_engine::RecordCollector;

use crate::models::{self, RateLimits, RawCommit, RawContributor, RawIssue, RawProfile, RawPull};
use crate::retry::{classify, Disposition, RetryPolicy};

/// Items per page requested from list endpoints.
pub const PER_PAGE: usize = 100;

/// Reviews counted per pull request before giving up on the listing.
const MAX_REVIEWS: usize = 1000;

const USER_AGENT: &str = concat!("repopulse/", env!("CARGO_PKG_VERSION"));

/// Per-item decision while paging through a list endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Keep,
    Skip,
    Stop,
}

/// Items gathered from a list endpoint, with the truncation marker.
struct Page<R> {
    items: Vec<R>,
    truncated: bool,
}

/// [`RecordCollector`] backed by the GitHub REST API.
///
/// List endpoints are paged with `per_page=100` until a short page or the
/// requested limit. One item past the limit marks the batch truncated.
///
/// # Examples
///
/// ```no_run
/// # async fn run() -> repopulse_core::Result<()> {
/// use repopulse_core::{GitHubConfig, RepoName};
/// use repopulse_engine::RecordCollector;
/// use repopulse_github::GitHubCollector;
///
/// let collector = GitHubCollector::new(&GitHubConfig::default())?;
/// let info = collector.repository(&RepoName::parse("rust-lang/rust")?).await?;
/// assert!(info.is_some());
/// # Ok(())
/// # }
/// ```
pub struct GitHubCollector {
    octocrab: octocrab::Octocrab,
    http: reqwest::Client,
    token: Option<String>,
    base_url: String,
    retry: RetryPolicy,
    commit_line_stats: bool,
    contributor_profiles: bool,
    count_reviews: bool,
}

impl GitHubCollector {
    /// Create a collector from the `[github]` config table.
    ///
    /// The token is optional; without one GitHub applies the anonymous rate
    /// limit.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Config`] if the base URL is invalid or the HTTP
    /// clients cannot be built.
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let token = config.resolve_token();
        let base_url = config.base_url.trim_end_matches('/').to_string();

        let mut builder = octocrab::Octocrab::builder()
            .base_uri(base_url.as_str())
            .map_err(|e| PulseError::Config(format!("invalid GitHub base URL '{base_url}': {e}")))?;
        if let Some(token) = &token {
            builder = builder.personal_token(token.clone());
        }
        let octocrab = builder
            .build()
            .map_err(|e| PulseError::Config(format!("failed to create GitHub client: {e}")))?;

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PulseError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            octocrab,
            http,
            token,
            base_url,
            retry: RetryPolicy::from_config(config),
            commit_line_stats: config.commit_line_stats,
            contributor_profiles: config.contributor_profiles,
            count_reviews: config.count_reviews,
        })
    }

    /// Whether requests are authenticated.
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Current core and search API budgets.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::FetchFailed`] at [`FetchStage::RateLimit`] on
    /// network or API errors.
    pub async fn rate_limit(&self) -> Result<RateLimits> {
        let raw: models::RawRateLimit = self
            .octocrab
            .get("/rate_limit", None::<&()>)
            .await
            .map_err(|e| PulseError::fetch(FetchStage::RateLimit, e.to_string()))?;
        Ok(models::rate_limits(&raw))
    }

    /// GET `path` and decode the JSON body, retrying transient failures.
    ///
    /// Returns `Ok(None)` for 404, 204 and 409 responses.
    async fn get_json<T: DeserializeOwned>(
        &self,
        stage: FetchStage,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        let url = format!("{}{path}", self.base_url);
        let mut retry = 0u32;

        loop {
            let mut request = self
                .http
                .get(&url)
                .query(query)
                .header("Accept", "application/vnd.github+json")
                .header("X-GitHub-Api-Version", "2022-11-28");
            if let Some(token) = &self.token {
                request = request.header("Authorization", format!("Bearer {token}"));
            }

            let failure = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    let rate_limited = response
                        .headers()
                        .get("x-ratelimit-remaining")
                        .and_then(|v| v.to_str().ok())
                        .is_some_and(|v| v == "0")
                        || response.headers().contains_key("retry-after");

                    match classify(status.as_u16(), rate_limited) {
                        Disposition::Success => {
                            let body = response.json::<T>().await.map_err(|e| {
                                PulseError::fetch(stage, format!("invalid response from {path}: {e}"))
                            })?;
                            return Ok(Some(body));
                        }
                        Disposition::Empty => {
                            debug!(%stage, path, %status, "no content");
                            return Ok(None);
                        }
                        Disposition::Fail => {
                            let body = response.text().await.unwrap_or_default();
                            return Err(PulseError::fetch(
                                stage,
                                format!("GitHub API error {status} for {path}: {body}"),
                            ));
                        }
                        Disposition::Retry => format!("GitHub API error {status} for {path}"),
                    }
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    format!("request to {path} failed: {e}")
                }
                Err(e) => {
                    return Err(PulseError::fetch(stage, format!("request to {path} failed: {e}")));
                }
            };

            retry += 1;
            if !self.retry.allows(retry) {
                return Err(PulseError::fetch(
                    stage,
                    format!("{failure} (gave up after {} retries)", self.retry.max_retries),
                ));
            }
            let delay = self.retry.delay(retry);
            warn!(%stage, retry, delay_ms = delay.as_millis() as u64, "{failure}, backing off");
            tokio::time::sleep(delay).await;
        }
    }

    /// Page through a list endpoint, keeping items until `limit + 1` are held
    /// or `step` says stop.
    async fn paginate<R: DeserializeOwned>(
        &self,
        stage: FetchStage,
        path: &str,
        params: &[(&str, String)],
        limit: usize,
        step: impl Fn(&R) -> Step,
    ) -> Result<Page<R>> {
        let mut items = Vec::new();
        let mut page_number = 1usize;

        loop {
            let mut query = params.to_vec();
            query.push(("per_page", PER_PAGE.to_string()));
            query.push(("page", page_number.to_string()));

            let page: Vec<R> = self.get_json(stage, path, &query).await?.unwrap_or_default();
            let fetched = page.len();
            debug!(%stage, page = page_number, fetched, "fetched page");

            for item in page {
                match step(&item) {
                    Step::Keep => items.push(item),
                    Step::Skip => continue,
                    Step::Stop => return Ok(Page { items, truncated: false }),
                }
                if items.len() > limit {
                    items.truncate(limit);
                    return Ok(Page { items, truncated: true });
                }
            }

            if fetched < PER_PAGE {
                return Ok(Page { items, truncated: false });
            }
            page_number += 1;
        }
    }

    async fn commit_detail(&self, repo: &RepoName, sha: &str) -> Option<RawCommit> {
        let path = format!("/repos/{}/{}/commits/{sha}", repo.owner(), repo.name());
        match self.get_json(FetchStage::Commits, &path, &[]).await {
            Ok(detail) => detail,
            Err(e) => {
                warn!(sha, error = %e, "commit detail unavailable, keeping it without line data");
                None
            }
        }
    }

    async fn profile(&self, login: &str) -> Option<RawProfile> {
        let path = format!("/users/{login}");
        match self.get_json(FetchStage::Contributors, &path, &[]).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(login, error = %e, "profile unavailable");
                None
            }
        }
    }

    async fn review_count(&self, repo: &RepoName, number: u64) -> Option<u64> {
        let path = format!("/repos/{}/{}/pulls/{number}/reviews", repo.owner(), repo.name());
        let page: Result<Page<serde_json::Value>> = self
            .paginate(FetchStage::PullRequests, &path, &[], MAX_REVIEWS, |_| Step::Keep)
            .await;
        match page {
            Ok(page) => Some(page.items.len() as u64),
            Err(e) => {
                warn!(number, error = %e, "reviews unavailable");
                None
            }
        }
    }
}

/// Convert raw items, splitting successes from anomalies.
fn convert<R, T>(
    raw: &[R],
    mut f: impl FnMut(&R) -> std::result::Result<T, RecordAnomaly>,
) -> (Vec<T>, Vec<RecordAnomaly>) {
    let mut records = Vec::with_capacity(raw.len());
    let mut anomalies = Vec::new();
    for item in raw {
        match f(item) {
            Ok(record) => records.push(record),
            Err(anomaly) => anomalies.push(anomaly),
        }
    }
    (records, anomalies)
}

impl RecordCollector for GitHubCollector {
    async fn repository(&self, repo: &RepoName) -> Result<Option<RepoInfo>> {
        let path = format!("/repos/{}/{}", repo.owner(), repo.name());
        let raw: Option<models::RawRepo> = self.get_json(FetchStage::Repository, &path, &[]).await?;
        Ok(raw.map(models::repo_info))
    }

    async fn commits(
        &self,
        repo: &RepoName,
        window: &AnalysisWindow,
        limit: usize,
    ) -> Result<RecordBatch<CommitRecord>> {
        let path = format!("/repos/{}/{}/commits", repo.owner(), repo.name());
        let params = [
            ("since", window.since.to_rfc3339()),
            ("until", window.until.to_rfc3339()),
        ];
        let page: Page<RawCommit> = self
            .paginate(FetchStage::Commits, &path, &params, limit, |_| Step::Keep)
            .await?;

        let mut raw = page.items;
        if self.commit_line_stats {
            for item in &mut raw {
                if let Some(detail) = self.commit_detail(repo, &item.sha).await {
                    *item = detail;
                }
            }
        }

        let (records, anomalies) = convert(&raw, models::commit_record);
        debug!(records = records.len(), anomalies = anomalies.len(), "converted commits");
        Ok(RecordBatch {
            records,
            truncated: page.truncated,
            anomalies,
        })
    }

    async fn contributors(
        &self,
        repo: &RepoName,
        _window: &AnalysisWindow,
        limit: usize,
    ) -> Result<RecordBatch<ContributorRecord>> {
        // GitHub reports all-time contribution counts; there is no windowed listing.
        let path = format!("/repos/{}/{}/contributors", repo.owner(), repo.name());
        let page: Page<RawContributor> = self
            .paginate(FetchStage::Contributors, &path, &[], limit, |_| Step::Keep)
            .await?;

        let mut records = Vec::with_capacity(page.items.len());
        let mut anomalies = Vec::new();
        for raw in &page.items {
            let profile = match (&raw.login, self.contributor_profiles) {
                (Some(login), true) => self.profile(login).await,
                _ => None,
            };
            match models::contributor_record(raw, profile.as_ref()) {
                Ok(record) => records.push(record),
                Err(anomaly) => anomalies.push(anomaly),
            }
        }

        Ok(RecordBatch {
            records,
            truncated: page.truncated,
            anomalies,
        })
    }

    async fn issues(
        &self,
        repo: &RepoName,
        window: &AnalysisWindow,
        limit: usize,
    ) -> Result<RecordBatch<IssueRecord>> {
        let path = format!("/repos/{}/{}/issues", repo.owner(), repo.name());
        let params = [
            ("state", "all".to_string()),
            ("since", window.since.to_rfc3339()),
        ];
        let page: Page<RawIssue> = self
            .paginate(FetchStage::Issues, &path, &params, limit, |issue: &RawIssue| {
                if issue.is_pull_request() {
                    Step::Skip
                } else {
                    Step::Keep
                }
            })
            .await?;

        let (records, anomalies) = convert(&page.items, models::issue_record);
        Ok(RecordBatch {
            records,
            truncated: page.truncated,
            anomalies,
        })
    }

    async fn pull_requests(
        &self,
        repo: &RepoName,
        window: &AnalysisWindow,
        limit: usize,
    ) -> Result<RecordBatch<PullRequestRecord>> {
        let path = format!("/repos/{}/{}/pulls", repo.owner(), repo.name());
        let params = [
            ("state", "all".to_string()),
            ("sort", "created".to_string()),
            ("direction", "desc".to_string()),
        ];
        let since = window.since;
        let until = window.until;
        let page: Page<RawPull> = self
            .paginate(FetchStage::PullRequests, &path, &params, limit, |pr: &RawPull| {
                match pr.created() {
                    Some(created) if created < since => Step::Stop,
                    Some(created) if created > until => Step::Skip,
                    _ => Step::Keep,
                }
            })
            .await?;

        let mut records = Vec::with_capacity(page.items.len());
        let mut anomalies = Vec::new();
        for item in &page.items {
            // list items lack sizes; the single pull request payload has them
            let detail_path = format!("{path}/{}", item.number);
            let detail: RawPull = self
                .get_json(FetchStage::PullRequests, &detail_path, &[])
                .await?
                .unwrap_or_else(|| item.clone());
            let reviews = if self.count_reviews {
                self.review_count(repo, item.number).await
            } else {
                None
            };
            match models::pull_record(&detail, reviews) {
                Ok(record) => records.push(record),
                Err(anomaly) => anomalies.push(anomaly),
            }
        }

        Ok(RecordBatch {
            records,
            truncated: page.truncated,
            anomalies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn collector_for(server: &MockServer, max_retries: u32) -> GitHubCollector {
        let config = GitHubConfig {
            token: Some("ghp_test".into()),
            base_url: server.uri(),
            max_retries,
            retry_base_delay_ms: 1,
            commit_line_stats: false,
            contributor_profiles: false,
            count_reviews: false,
        };
        GitHubCollector::new(&config).unwrap()
    }

    fn repo() -> RepoName {
        RepoName::parse("octo/pulse").unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 0, 0, 0).unwrap()
    }

    fn window() -> AnalysisWindow {
        AnalysisWindow::ending_at(now(), 30).unwrap()
    }

    fn raw_commits(count: usize, offset: usize) -> Vec<Value> {
        (offset..offset + count)
            .map(|n| {
                json!({
                    "sha": format!("{n:040x}"),
                    "commit": { "author": { "name": "Octo Cat", "date": "2024-06-01T12:00:00Z" } },
                    "author": { "login": "octocat" },
                })
            })
            .collect()
    }

    async fn mount_page(server: &MockServer, page: &str, body: Vec<Value>, times: u64) {
        Mock::given(method("GET"))
            .and(path("/repos/octo/pulse/commits"))
            .and(query_param("per_page", "100"))
            .and(query_param("page", page))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(times)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn one_item_past_the_limit_marks_the_batch_truncated() {
        let server = MockServer::start().await;
        mount_page(&server, "1", raw_commits(100, 0), 1).await;
        mount_page(&server, "2", raw_commits(1, 100), 1).await;
        mount_page(&server, "3", Vec::new(), 0).await;

        let batch = collector_for(&server, 0)
            .commits(&repo(), &window(), 100)
            .await
            .unwrap();

        assert!(batch.truncated);
        assert_eq!(batch.records.len(), 100);
        assert_eq!(batch.records[99].sha, format!("{:040x}", 99));
        assert!(batch.anomalies.is_empty());
    }

    #[tokio::test]
    async fn exactly_the_limit_is_not_truncated() {
        let server = MockServer::start().await;
        mount_page(&server, "1", raw_commits(100, 0), 1).await;
        mount_page(&server, "2", Vec::new(), 1).await;

        let batch = collector_for(&server, 0)
            .commits(&repo(), &window(), 100)
            .await
            .unwrap();

        assert!(!batch.truncated);
        assert_eq!(batch.records.len(), 100);
    }

    #[tokio::test]
    async fn short_page_ends_the_listing_below_the_limit() {
        let server = MockServer::start().await;
        mount_page(&server, "1", raw_commits(100, 0), 1).await;
        mount_page(&server, "2", raw_commits(30, 100), 1).await;
        mount_page(&server, "3", Vec::new(), 0).await;

        let batch = collector_for(&server, 0)
            .commits(&repo(), &window(), 150)
            .await
            .unwrap();

        assert!(!batch.truncated);
        assert_eq!(batch.records.len(), 130);
        assert_eq!(batch.records[0].author.as_deref(), Some("octocat"));
    }

    #[tokio::test]
    async fn server_errors_exhaust_retries_into_fetch_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/pulse"))
            .respond_with(ResponseTemplate::new(502))
            .expect(3)
            .mount(&server)
            .await;

        let err = collector_for(&server, 2).repository(&repo()).await.unwrap_err();

        match err {
            PulseError::FetchFailed { stage, reason } => {
                assert_eq!(stage, FetchStage::Repository);
                assert!(reason.contains("502"), "{reason}");
                assert!(reason.contains("gave up after 2 retries"), "{reason}");
            }
            other => panic!("expected FetchFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn forbidden_without_rate_limit_fails_without_retrying() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/pulse"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Resource not accessible"))
            .expect(1)
            .mount(&server)
            .await;

        let err = collector_for(&server, 3).repository(&repo()).await.unwrap_err();
        assert!(matches!(err, PulseError::FetchFailed { stage: FetchStage::Repository, .. }));
    }

    #[tokio::test]
    async fn exhausted_rate_limit_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/pulse"))
            .respond_with(ResponseTemplate::new(403).insert_header("x-ratelimit-remaining", "0"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/pulse"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "full_name": "octo/pulse",
                "stargazers_count": 7,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let info = collector_for(&server, 1).repository(&repo()).await.unwrap();
        assert_eq!(info.map(|i| i.full_name), Some("octo/pulse".to_string()));
    }

    #[tokio::test]
    async fn missing_repository_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/pulse"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        assert!(collector_for(&server, 3).repository(&repo()).await.unwrap().is_none());
    }

    fn raw_pull(number: u64, created_at: &str) -> Value {
        json!({
            "number": number,
            "state": "open",
            "created_at": created_at,
            "user": { "login": "octocat" },
        })
    }

    async fn mount_pull_detail(server: &MockServer, number: u64, created_at: &str, times: u64) {
        let mut detail = raw_pull(number, created_at);
        detail["additions"] = json!(12);
        detail["deletions"] = json!(3);
        detail["changed_files"] = json!(2);
        Mock::given(method("GET"))
            .and(path(format!("/repos/octo/pulse/pulls/{number}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(detail))
            .expect(times)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn pull_listing_skips_newer_and_stops_at_older() {
        let server = MockServer::start().await;
        // newest first: #5 after the window, #4 and #3 inside, #2 before it
        let listing = vec![
            raw_pull(5, "2024-07-02T00:00:00Z"),
            raw_pull(4, "2024-06-20T00:00:00Z"),
            raw_pull(3, "2024-06-01T00:00:00Z"),
            raw_pull(2, "2024-05-01T00:00:00Z"),
            raw_pull(1, "2024-06-15T00:00:00Z"),
        ];
        Mock::given(method("GET"))
            .and(path("/repos/octo/pulse/pulls"))
            .and(query_param("sort", "created"))
            .and(query_param("direction", "desc"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing))
            .expect(1)
            .mount(&server)
            .await;
        mount_pull_detail(&server, 4, "2024-06-20T00:00:00Z", 1).await;
        mount_pull_detail(&server, 3, "2024-06-01T00:00:00Z", 1).await;
        mount_pull_detail(&server, 5, "2024-07-02T00:00:00Z", 0).await;
        mount_pull_detail(&server, 1, "2024-06-15T00:00:00Z", 0).await;

        let batch = collector_for(&server, 0)
            .pull_requests(&repo(), &window(), 300)
            .await
            .unwrap();

        let numbers: Vec<u64> = batch.records.iter().map(|pr| pr.number).collect();
        assert_eq!(numbers, [4, 3]);
        assert!(!batch.truncated);
        assert_eq!(batch.records[0].additions, 12);
        assert_eq!(batch.records[0].review_count, None);
    }

    #[tokio::test]
    async fn trims_base_url_and_keeps_token() {
        let config = GitHubConfig {
            token: Some("ghp_test".into()),
            base_url: "https://ghe.example.com/api/v3/".into(),
            ..GitHubConfig::default()
        };
        let collector = GitHubCollector::new(&config).unwrap();
        assert!(collector.is_authenticated());
        assert_eq!(collector.base_url, "https://ghe.example.com/api/v3");
    }

    #[test]
    fn convert_splits_anomalies() {
        let raw = [1u32, 2, 3, 4];
        let (records, anomalies) = convert(&raw, |&n| {
            if n % 2 == 0 {
                Ok(n)
            } else {
                Err(RecordAnomaly::new(format!("item {n}"), "odd"))
            }
        });
        assert_eq!(records, [2, 4]);
        assert_eq!(anomalies.len(), 2);
    }
}
