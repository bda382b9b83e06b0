//! Contributor concentration: ranking, Gini coefficient, Pareto analysis,
//! company / location grouping and account age.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use repopulse_core::{CommitRecord, ContributorRecord};

use crate::stats::{self, identity_or_unknown, rank_counts, Distribution, RankedCount};

/// Cumulative share the Pareto analysis looks for, in percent.
pub const PARETO_TARGET_PERCENT: u64 = 80;

/// Accounts older than this many days count as established.
pub const ESTABLISHED_ACCOUNT_DAYS: i64 = 365;

/// Contribution tiers as `(label, inclusive upper bound)`; the last is open-ended.
const TIERS: [(&str, u64); 5] = [
    ("1-10", 10),
    ("11-50", 50),
    ("51-100", 100),
    ("101-500", 500),
    ("500+", u64::MAX),
];

/// Concentration and grouping statistics over contributors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContributorStats {
    /// Contributors analyzed.
    pub total_contributors: usize,
    /// Sum of their commit counts.
    pub total_commits: u64,
    /// Mean commits per contributor.
    pub mean_commits: Option<f64>,
    /// Median commits per contributor.
    pub median_commits: Option<f64>,
    /// Sample standard deviation of commits per contributor.
    pub std_commits: Option<f64>,
    /// Highest-ranked contributors.
    pub top_contributors: Vec<RankedContributor>,
    /// Gini coefficient of commit counts; `None` without contributors.
    pub gini: Option<f64>,
    /// Minimal set of contributors reaching 80% of commits.
    pub pareto: ParetoStats,
    /// Share of commits held by the top 20% of contributors.
    pub top_fifth_share: Option<f64>,
    /// Contributors per commit-count tier.
    pub tiers: Distribution,
    /// Contributors per normalized company.
    pub companies: Vec<RankedCount>,
    /// Contributors per normalized location.
    pub locations: Vec<RankedCount>,
    /// Contributors that list a company.
    pub with_company: usize,
    /// Contributors that list a location.
    pub with_location: usize,
    /// Age of contributor accounts at analysis time.
    pub account_age: AccountAgeStats,
}

/// Account age in whole days, over contributors with a known creation date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountAgeStats {
    /// Contributors with a known creation date.
    pub known: usize,
    /// Mean age.
    pub mean_days: Option<f64>,
    /// Age of the oldest account.
    pub oldest_days: Option<i64>,
    /// Age of the newest account.
    pub newest_days: Option<i64>,
    /// Accounts older than a year.
    pub older_than_year: usize,
    /// Accounts a year old or younger.
    pub newer_than_year: usize,
}

/// A contributor in the ranking, with their share of all commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedContributor {
    /// Login.
    pub login: String,
    /// Commit count.
    pub commits: u64,
    /// `commits / total_commits`.
    pub share: Option<f64>,
}

/// Result of the 80/20 analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParetoStats {
    /// Smallest number of top contributors reaching the target share.
    pub contributors: Option<usize>,
    /// That number as a share of all contributors.
    pub population_share: Option<f64>,
    /// Commit share actually reached by those contributors.
    pub commit_share: Option<f64>,
}

/// Analyze contributors, keeping the top `top_n` in the ranking.
///
/// Account ages are measured against `now`.
///
/// # Examples
///
/// ```
/// use repopulse_core::ContributorRecord;
/// use repopulse_engine::contributors::analyze_contributors;
///
/// let record = |login: &str, commits| ContributorRecord {
///     login: login.into(),
///     commits,
///     company: None,
///     location: None,
///     account_created_at: None,
/// };
/// let records = [record("ann", 3), record("bo", 1), record("cy", 1)];
/// let stats = analyze_contributors(&records, chrono::Utc::now(), 10);
/// assert_eq!(stats.top_contributors[0].login, "ann");
/// assert!(stats.gini.unwrap() > 0.0);
/// assert_eq!(stats.pareto.contributors, Some(2));
/// ```
pub fn analyze_contributors(
    contributors: &[ContributorRecord],
    now: DateTime<Utc>,
    top_n: usize,
) -> ContributorStats {
    let mut ranked: Vec<&ContributorRecord> = contributors.iter().collect();
    ranked.sort_by(|a, b| b.commits.cmp(&a.commits).then_with(|| a.login.cmp(&b.login)));

    let counts_desc: Vec<u64> = ranked.iter().map(|c| c.commits).collect();
    let total_commits: u64 = counts_desc.iter().sum();
    let summary = stats::NumericSummary::from_counts(&counts_desc);

    let top_contributors = ranked
        .iter()
        .take(top_n)
        .map(|c| RankedContributor {
            login: c.login.clone(),
            commits: c.commits,
            share: stats::ratio(c.commits, total_commits),
        })
        .collect();

    ContributorStats {
        total_contributors: contributors.len(),
        total_commits,
        mean_commits: summary.mean,
        median_commits: summary.median,
        std_commits: summary.std_dev,
        top_contributors,
        gini: gini(&counts_desc),
        pareto: pareto(&counts_desc),
        top_fifth_share: top_fifth_share(&counts_desc),
        tiers: tiers(&counts_desc),
        companies: group_by(contributors.iter().map(|c| c.company.as_deref())),
        locations: group_by(contributors.iter().map(|c| c.location.as_deref())),
        with_company: contributors.iter().filter(|c| has_value(c.company.as_deref())).count(),
        with_location: contributors.iter().filter(|c| has_value(c.location.as_deref())).count(),
        account_age: account_age(contributors, now),
    }
}

/// Whole-day account ages; accounts dated after `now` count as zero days old.
fn account_age(contributors: &[ContributorRecord], now: DateTime<Utc>) -> AccountAgeStats {
    let ages: Vec<i64> = contributors
        .iter()
        .filter_map(|c| c.account_created_at)
        .map(|created| (now - created).num_days().max(0))
        .collect();
    if ages.is_empty() {
        return AccountAgeStats::default();
    }

    let as_f64: Vec<f64> = ages.iter().map(|&d| d as f64).collect();
    let older_than_year = ages.iter().filter(|&&d| d > ESTABLISHED_ACCOUNT_DAYS).count();
    AccountAgeStats {
        known: ages.len(),
        mean_days: stats::mean(&as_f64),
        oldest_days: ages.iter().max().copied(),
        newest_days: ages.iter().min().copied(),
        older_than_year,
        newer_than_year: ages.len() - older_than_year,
    }
}

/// Gini coefficient of `counts` (any order).
///
/// `G = (2·Σ(i·x_i) − (n+1)·Σx_i) / (n·Σx_i)` over the ascending vector with
/// 1-indexed `i`. Zero for a single value or all-equal values, `None` for no
/// values. Sums are accumulated in `u128`.
///
/// # Examples
///
/// ```
/// use repopulse_engine::contributors::gini;
///
/// assert_eq!(gini(&[5, 5, 5, 5]), Some(0.0));
/// assert_eq!(gini(&[0, 0, 0, 12]), Some(0.75));
/// assert_eq!(gini(&[]), None);
/// ```
pub fn gini(counts: &[u64]) -> Option<f64> {
    let n = counts.len();
    if n == 0 {
        return None;
    }
    if n == 1 || counts.iter().all(|&c| c == counts[0]) {
        return Some(0.0);
    }

    let mut ascending = counts.to_vec();
    ascending.sort_unstable();

    let sum: u128 = ascending.iter().map(|&x| u128::from(x)).sum();
    let weighted: u128 = ascending
        .iter()
        .enumerate()
        .map(|(i, &x)| (i as u128 + 1) * u128::from(x))
        .sum();

    let n = n as u128;
    // non-negative for an ascending vector
    let numerator = 2 * weighted - (n + 1) * sum;
    Some(numerator as f64 / (n * sum) as f64)
}

/// Smallest prefix of `counts_desc` holding at least 80% of the total.
fn pareto(counts_desc: &[u64]) -> ParetoStats {
    let total: u128 = counts_desc.iter().map(|&c| u128::from(c)).sum();
    if total == 0 {
        return ParetoStats::default();
    }

    let target = total * u128::from(PARETO_TARGET_PERCENT);
    let mut cumulative: u128 = 0;
    for (i, &count) in counts_desc.iter().enumerate() {
        cumulative += u128::from(count);
        if cumulative * 100 >= target {
            let k = i + 1;
            return ParetoStats {
                contributors: Some(k),
                population_share: Some(k as f64 / counts_desc.len() as f64),
                commit_share: Some(cumulative as f64 / total as f64),
            };
        }
    }

    // unreachable for a non-zero total, the full prefix always reaches 100%
    ParetoStats::default()
}

fn top_fifth_share(counts_desc: &[u64]) -> Option<f64> {
    let total: u64 = counts_desc.iter().sum();
    if counts_desc.is_empty() || total == 0 {
        return None;
    }
    let take = (counts_desc.len() / 5).max(1);
    let top: u64 = counts_desc.iter().take(take).sum();
    stats::ratio(top, total)
}

fn tiers(counts: &[u64]) -> Distribution {
    let mut tallies = [0u64; TIERS.len()];
    for &count in counts {
        let idx = TIERS
            .iter()
            .position(|&(_, upper)| count <= upper)
            .unwrap_or(TIERS.len() - 1);
        tallies[idx] += 1;
    }
    Distribution::from_counts(TIERS.iter().map(|&(label, _)| label).zip(tallies))
}

/// Case-normalized grouping with an `unknown` bucket.
fn group_by<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Vec<RankedCount> {
    let mut groups: HashMap<String, u64> = HashMap::new();
    for value in values {
        let key = identity_or_unknown(value).to_lowercase();
        *groups.entry(key).or_default() += 1;
    }
    rank_counts(groups)
}

fn has_value(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

/// Derive contributor records from commit authorship.
///
/// Commits without an author are attributed to [`UNKNOWN`](crate::stats::UNKNOWN). Output is ranked
/// by commit count descending, then login.
///
/// # Examples
///
/// ```
/// use repopulse_core::CommitRecord;
/// use repopulse_engine::contributors::contributors_from_commits;
///
/// let commit = |author: Option<&str>| CommitRecord {
///     sha: "x".into(),
///     author: author.map(Into::into),
///     timestamp: None,
///     additions: None,
///     deletions: None,
///     files_changed: None,
/// };
/// let records = contributors_from_commits(&[commit(Some("ann")), commit(None), commit(Some("ann"))]);
/// assert_eq!(records[0].login, "ann");
/// assert_eq!(records[0].commits, 2);
/// assert_eq!(records[1].login, "(unknown)");
/// ```
pub fn contributors_from_commits(commits: &[CommitRecord]) -> Vec<ContributorRecord> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for commit in commits {
        *counts
            .entry(identity_or_unknown(commit.author.as_deref()))
            .or_default() += 1;
    }
    rank_counts(counts)
        .into_iter()
        .map(|r| ContributorRecord {
            login: r.name,
            commits: r.count,
            company: None,
            location: None,
            account_created_at: None,
        })
        .collect()
}
