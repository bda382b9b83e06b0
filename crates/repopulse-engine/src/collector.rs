//! The boundary between the analyzers and a hosting platform.

use repopulse_core::{
    AnalysisWindow, CommitRecord, ContributorRecord, IssueRecord, PullRequestRecord, RecordBatch,
    RepoInfo, RepoName, Result,
};

/// Source of typed repository records.
///
/// Implementations own transport, pagination, and retries. Each fetch returns
/// at most `limit` records and sets [`RecordBatch::truncated`] when more were
/// available. Raw records that cannot be converted go into
/// [`RecordBatch::anomalies`] rather than failing the fetch.
#[allow(async_fn_in_trait)]
pub trait RecordCollector {
    /// Repository metadata, `None` when the repository does not exist.
    async fn repository(&self, repo: &RepoName) -> Result<Option<RepoInfo>>;

    /// Commits authored inside `window`, newest first.
    async fn commits(
        &self,
        repo: &RepoName,
        window: &AnalysisWindow,
        limit: usize,
    ) -> Result<RecordBatch<CommitRecord>>;

    /// Contributors with their commit counts.
    async fn contributors(
        &self,
        repo: &RepoName,
        window: &AnalysisWindow,
        limit: usize,
    ) -> Result<RecordBatch<ContributorRecord>>;

    /// Issues (pull requests excluded) active inside `window`.
    async fn issues(
        &self,
        repo: &RepoName,
        window: &AnalysisWindow,
        limit: usize,
    ) -> Result<RecordBatch<IssueRecord>>;

    /// Pull requests created inside `window`.
    async fn pull_requests(
        &self,
        repo: &RepoName,
        window: &AnalysisWindow,
        limit: usize,
    ) -> Result<RecordBatch<PullRequestRecord>>;
}
