//! Orchestration: fetch every category, analyze, and assemble the result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use repopulse_core::{
    AnalysisLimits, AnalysisOptions, AnalysisWindow, FetchStage, PulseError, RecordAnomaly,
    RecordBatch, RepoInfo, RepoName, Result,
};

use crate::collector::RecordCollector;
use crate::commits::{analyze_commits, CommitStats};
use crate::contributors::{analyze_contributors, ContributorStats};
use crate::issues::{analyze_issues, IssueStats};
use crate::pulls::{analyze_pull_requests, PullRequestStats};

/// What happened to one category during a run.
///
/// Serialized with a `status` tag: `"analyzed"`, `"skipped"`, or `"failed"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CategoryOutcome<S> {
    /// Records were fetched and analyzed.
    Analyzed(CategoryReport<S>),
    /// The category was disabled for this run.
    Skipped {
        /// Why the category was not analyzed.
        reason: String,
    },
    /// Fetching failed; the other categories were still analyzed.
    Failed {
        /// Fetch stage that failed.
        stage: FetchStage,
        /// Collector error message.
        error: String,
    },
}

impl<S> CategoryOutcome<S> {
    /// The report, if the category was analyzed.
    pub fn report(&self) -> Option<&CategoryReport<S>> {
        match self {
            CategoryOutcome::Analyzed(report) => Some(report),
            _ => None,
        }
    }

    /// The statistics, if the category was analyzed.
    pub fn stats(&self) -> Option<&S> {
        self.report().map(|r| &r.stats)
    }

    /// Whether the analyzed sample was cut at its limit.
    pub fn is_truncated(&self) -> bool {
        self.report().is_some_and(|r| r.sample_truncated)
    }

    /// Whether fetching this category failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, CategoryOutcome::Failed { .. })
    }
}

/// Statistics for one analyzed category plus the sampling context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryReport<S> {
    /// More records existed than `limit`; only the first `limit` were analyzed.
    pub sample_truncated: bool,
    /// Effective record limit.
    pub limit: usize,
    /// Effective time window.
    pub window: AnalysisWindow,
    /// Records handed to the analyzer.
    pub records_analyzed: usize,
    /// Raw records the collector could not convert.
    pub anomalies: Vec<RecordAnomaly>,
    /// Analyzer output.
    pub stats: S,
}

/// The complete outcome of [`RepoAnalyzer::full_analysis`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// `owner/name`.
    pub repository: String,
    /// The run's "now".
    pub generated_at: DateTime<Utc>,
    /// Effective time window.
    pub window: AnalysisWindow,
    /// Effective per-category limits.
    pub limits: AnalysisLimits,
    /// Repository metadata.
    pub repo_info: RepoInfo,
    /// Any analyzed category was truncated.
    pub sample_truncated: bool,
    /// Commit statistics.
    pub commits: CategoryOutcome<CommitStats>,
    /// Contributor statistics.
    pub contributors: CategoryOutcome<ContributorStats>,
    /// Issue statistics.
    pub issues: CategoryOutcome<IssueStats>,
    /// Pull request statistics.
    pub pull_requests: CategoryOutcome<PullRequestStats>,
}

impl AnalysisResult {
    /// Stages whose fetch failed, in category order.
    pub fn failed_stages(&self) -> Vec<FetchStage> {
        [
            (self.commits.is_failed(), FetchStage::Commits),
            (self.contributors.is_failed(), FetchStage::Contributors),
            (self.issues.is_failed(), FetchStage::Issues),
            (self.pull_requests.is_failed(), FetchStage::PullRequests),
        ]
        .into_iter()
        .filter_map(|(failed, stage)| failed.then_some(stage))
        .collect()
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Runs a full repository analysis against a [`RecordCollector`].
///
/// # Examples
///
/// ```no_run
/// # async fn run<C: repopulse_engine::RecordCollector>(collector: C) -> repopulse_core::Result<()> {
/// use repopulse_core::AnalysisOptions;
/// use repopulse_engine::RepoAnalyzer;
///
/// let analyzer = RepoAnalyzer::new(collector);
/// let result = analyzer.full_analysis("rust-lang/rust", &AnalysisOptions::default()).await?;
/// println!("{}", result.to_json()?);
/// # Ok(())
/// # }
/// ```
pub struct RepoAnalyzer<C> {
    collector: C,
}

impl<C: RecordCollector> RepoAnalyzer<C> {
    /// Wrap a collector.
    pub fn new(collector: C) -> Self {
        Self { collector }
    }

    /// The wrapped collector.
    pub fn collector(&self) -> &C {
        &self.collector
    }

    /// Analyze `repo_name` with the window ending at the current time.
    pub async fn full_analysis(
        &self,
        repo_name: &str,
        options: &AnalysisOptions,
    ) -> Result<AnalysisResult> {
        self.full_analysis_at(repo_name, options, Utc::now()).await
    }

    /// Analyze `repo_name` with the window ending at `now`.
    ///
    /// The same records, options and `now` always produce the same result.
    pub async fn full_analysis_at(
        &self,
        repo_name: &str,
        options: &AnalysisOptions,
        now: DateTime<Utc>,
    ) -> Result<AnalysisResult> {
        let repo = RepoName::parse(repo_name)?;
        options.validate()?;

        let window = AnalysisWindow::ending_at(now, options.days)?;
        let limits = options.limits();
        info!(repo = %repo, days = options.days, "starting analysis");

        let repo_info = self
            .collector
            .repository(&repo)
            .await?
            .ok_or_else(|| PulseError::InvalidRepository(format!("{repo} was not found")))?;

        let collector = &self.collector;
        let (commits, contributors, issues, pulls) = tokio::join!(
            collector.commits(&repo, &window, limits.max_commits),
            collector.contributors(&repo, &window, limits.max_contributors),
            async {
                if options.analyze_issues {
                    Some(collector.issues(&repo, &window, limits.max_issues).await)
                } else {
                    None
                }
            },
            async {
                if options.analyze_prs {
                    Some(collector.pull_requests(&repo, &window, limits.max_prs).await)
                } else {
                    None
                }
            },
        );

        let settle = Settler {
            window,
            require_all: options.require_all_categories,
        };
        let top_n = options.top_n;

        let commits = settle.category(
            FetchStage::Commits,
            Some(commits),
            limits.max_commits,
            |records| analyze_commits(records, now, top_n),
        )?;
        let contributors = settle.category(
            FetchStage::Contributors,
            Some(contributors),
            limits.max_contributors,
            |records| analyze_contributors(records, now, top_n),
        )?;
        let issues = settle.category(FetchStage::Issues, issues, limits.max_issues, |records| {
            analyze_issues(records, now, top_n)
        })?;
        let pull_requests =
            settle.category(FetchStage::PullRequests, pulls, limits.max_prs, |records| {
                analyze_pull_requests(records, top_n)
            })?;

        let sample_truncated = commits.is_truncated()
            || contributors.is_truncated()
            || issues.is_truncated()
            || pull_requests.is_truncated();

        info!(repo = %repo, sample_truncated, "analysis complete");

        Ok(AnalysisResult {
            repository: repo.to_string(),
            generated_at: now,
            window,
            limits,
            repo_info,
            sample_truncated,
            commits,
            contributors,
            issues,
            pull_requests,
        })
    }
}

/// Turns one fetch result into a [`CategoryOutcome`].
struct Settler {
    window: AnalysisWindow,
    require_all: bool,
}

impl Settler {
    /// `fetched` is `None` when the category is disabled.
    fn category<T, S>(
        &self,
        stage: FetchStage,
        fetched: Option<Result<RecordBatch<T>>>,
        limit: usize,
        analyze: impl FnOnce(&[T]) -> S,
    ) -> Result<CategoryOutcome<S>> {
        let batch = match fetched {
            None => {
                debug!(%stage, "category disabled");
                return Ok(CategoryOutcome::Skipped {
                    reason: format!("{stage} analysis disabled"),
                });
            }
            Some(Ok(batch)) => batch.enforce_limit(limit),
            Some(Err(err)) => {
                let reason = match err {
                    PulseError::FetchFailed { reason, .. } => reason,
                    other => other.to_string(),
                };
                if self.require_all {
                    return Err(PulseError::fetch(stage, reason));
                }
                warn!(%stage, error = %reason, "fetch failed, continuing without it");
                return Ok(CategoryOutcome::Failed {
                    stage,
                    error: reason,
                });
            }
        };

        info!(
            %stage,
            records = batch.records.len(),
            truncated = batch.truncated,
            anomalies = batch.anomalies.len(),
            "fetched records"
        );

        Ok(CategoryOutcome::Analyzed(CategoryReport {
            sample_truncated: batch.truncated,
            limit,
            window: self.window,
            records_analyzed: batch.records.len(),
            stats: analyze(&batch.records),
            anomalies: batch.anomalies,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn settler(require_all: bool) -> Settler {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Settler {
            window: AnalysisWindow::ending_at(now, 30).unwrap(),
            require_all,
        }
    }

    #[test]
    fn oversized_batch_is_cut_to_limit() {
        let batch = RecordBatch::complete((0..50u32).collect());
        let outcome = settler(false)
            .category(FetchStage::Commits, Some(Ok(batch)), 10, |r| r.len())
            .unwrap();
        let report = outcome.report().unwrap();
        assert!(report.sample_truncated);
        assert_eq!(report.records_analyzed, 10);
        assert_eq!(report.stats, 10);
    }

    #[test]
    fn collector_truncation_flag_is_kept() {
        let batch = RecordBatch {
            truncated: true,
            ..RecordBatch::complete(vec![1u32, 2])
        };
        let outcome = settler(false)
            .category(FetchStage::Issues, Some(Ok(batch)), 10, |r| r.len())
            .unwrap();
        assert!(outcome.is_truncated());
    }

    #[test]
    fn disabled_category_is_skipped() {
        let outcome = settler(true)
            .category::<u32, usize>(FetchStage::Issues, None, 10, |r| r.len())
            .unwrap();
        assert!(matches!(outcome, CategoryOutcome::Skipped { .. }));
        assert!(outcome.stats().is_none());
    }

    #[test]
    fn failure_is_recorded_or_propagated() {
        let failed = || Some(Err(PulseError::fetch(FetchStage::Issues, "boom")));

        let outcome = settler(false)
            .category::<u32, usize>(FetchStage::Issues, failed(), 10, |r| r.len())
            .unwrap();
        assert_eq!(
            outcome,
            CategoryOutcome::Failed {
                stage: FetchStage::Issues,
                error: "boom".into()
            }
        );

        let err = settler(true)
            .category::<u32, usize>(FetchStage::Issues, failed(), 10, |r| r.len())
            .unwrap_err();
        assert!(matches!(
            err,
            PulseError::FetchFailed {
                stage: FetchStage::Issues,
                ..
            }
        ));
    }

    #[test]
    fn outcomes_serialize_with_status_tag() {
        let skipped: CategoryOutcome<usize> = CategoryOutcome::Skipped {
            reason: "issues analysis disabled".into(),
        };
        let json = serde_json::to_value(&skipped).unwrap();
        assert_eq!(json["status"], "skipped");

        let analyzed = settler(false)
            .category(FetchStage::Commits, Some(Ok(RecordBatch::complete(vec![1u32]))), 5, |r| {
                r.len()
            })
            .unwrap();
        let json = serde_json::to_value(&analyzed).unwrap();
        assert_eq!(json["status"], "analyzed");
        assert_eq!(json["sample_truncated"], false);
        assert_eq!(json["records_analyzed"], 1);
        assert_eq!(json["stats"], 1);
    }
}
