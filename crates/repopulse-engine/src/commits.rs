//! Commit time distributions, line-change statistics, and streaks.
//!
//! All calendar bucketing happens in the repository's observed UTC offset:
//! the offset shared by most timestamped commits.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};

use repopulse_core::CommitRecord;

use crate::stats::{self, CreatorStats, Distribution, NumericSummary};

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Hours 9 through 17 count as working hours.
const WORKING_HOURS: std::ops::Range<usize> = 9..18;

/// Everything derived from a set of commits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitStats {
    /// Commits analyzed, with or without timestamps.
    pub total_commits: usize,
    /// Commits lacking a timestamp; excluded from calendar statistics.
    pub missing_timestamps: usize,
    /// Offset used for calendar bucketing, e.g. `+02:00`.
    pub utc_offset: Option<String>,
    /// Earliest commit day.
    pub first_commit_date: Option<NaiveDate>,
    /// Latest commit day.
    pub last_commit_date: Option<NaiveDate>,
    /// Whole days between the latest commit and `now`.
    pub days_since_last_commit: Option<i64>,
    /// Commits per hour of day, `00`..`23`.
    pub hourly: Distribution,
    /// Commits per weekday, `Mon`..`Sun`.
    pub weekday: Distribution,
    /// Commits per `YYYY-MM`, chronological, observed months only.
    pub monthly: Distribution,
    /// Share of commits made between 09:00 and 18:00.
    pub working_hours_ratio: Option<f64>,
    /// Share of commits made on Saturday or Sunday.
    pub weekend_ratio: Option<f64>,
    /// Mean commits per observed month.
    pub average_per_month: Option<f64>,
    /// Line-change statistics.
    pub lines: LineStats,
    /// Day-level activity and streaks.
    pub activity: ActivityStats,
    /// Commit counts per author.
    pub authors: CreatorStats,
}

/// Additions and deletions over commits that carry line data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineStats {
    /// Commits with both additions and deletions known.
    pub commits_with_line_data: usize,
    /// Sum of additions.
    pub total_additions: u64,
    /// Sum of deletions.
    pub total_deletions: u64,
    /// Per-commit additions.
    pub additions: NumericSummary,
    /// Per-commit deletions.
    pub deletions: NumericSummary,
    /// `total_additions / total_deletions`; `None` without deletions.
    pub change_ratio: Option<f64>,
    /// Largest `additions + deletions` of a single commit.
    pub max_single_commit_changes: Option<u64>,
    /// Mean files touched per commit, over commits reporting it.
    pub mean_files_changed: Option<f64>,
}

/// Day-level commit activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityStats {
    /// Distinct days with at least one commit.
    pub active_days: usize,
    /// Longest run of consecutive active days.
    pub longest_streak_days: u32,
    /// First day of the longest streak (earliest if several tie).
    pub longest_streak_start: Option<NaiveDate>,
    /// Day with the most commits (earliest on ties).
    pub busiest_day: Option<NaiveDate>,
    /// Commits on the busiest day.
    pub busiest_day_commits: u64,
    /// Mean commits per active day.
    pub mean_commits_per_active_day: Option<f64>,
    /// Commits per 7 days over the first-to-last commit span.
    pub commits_per_week: Option<f64>,
}

/// Analyze commits relative to `now`, keeping the top `top_n` authors.
///
/// Never fails: an empty slice produces empty distributions, `None`
/// statistics, and a streak of zero.
///
/// # Examples
///
/// ```
/// use chrono::{DateTime, Utc};
/// use repopulse_core::CommitRecord;
/// use repopulse_engine::commits::analyze_commits;
///
/// let at = |ts: &str| DateTime::parse_from_rfc3339(ts).ok();
/// let commit = |sha: &str, ts: &str| CommitRecord {
///     sha: sha.into(),
///     author: Some("alice".into()),
///     timestamp: at(ts),
///     additions: Some(10),
///     deletions: Some(2),
///     files_changed: Some(1),
/// };
/// let commits = vec![
///     commit("a", "2024-05-01T10:00:00Z"),
///     commit("b", "2024-05-02T10:30:00Z"),
///     commit("c", "2024-05-04T16:00:00Z"),
/// ];
/// let now = DateTime::parse_from_rfc3339("2024-05-10T00:00:00Z").unwrap().with_timezone(&Utc);
/// let stats = analyze_commits(&commits, now, 10);
/// assert_eq!(stats.activity.longest_streak_days, 2);
/// assert_eq!(stats.hourly.peak.unwrap().label, "10");
/// assert_eq!(stats.days_since_last_commit, Some(6));
/// ```
pub fn analyze_commits(commits: &[CommitRecord], now: DateTime<Utc>, top_n: usize) -> CommitStats {
    let offset = observed_offset(commits);
    let local: Vec<DateTime<FixedOffset>> = commits
        .iter()
        .filter_map(|c| c.timestamp)
        .map(|ts| ts.with_timezone(&offset))
        .collect();

    let mut stats = CommitStats {
        total_commits: commits.len(),
        missing_timestamps: commits.len() - local.len(),
        lines: line_stats(commits),
        authors: CreatorStats::from_identities(commits.iter().map(|c| c.author.as_deref()), top_n),
        ..CommitStats::default()
    };

    if local.is_empty() {
        return stats;
    }

    let mut hours = [0u64; 24];
    let mut weekdays = [0u64; 7];
    let mut months: BTreeMap<String, u64> = BTreeMap::new();
    let mut days: BTreeMap<NaiveDate, u64> = BTreeMap::new();

    for ts in &local {
        hours[ts.hour() as usize] += 1;
        weekdays[ts.weekday().num_days_from_monday() as usize] += 1;
        *months.entry(ts.format("%Y-%m").to_string()).or_default() += 1;
        *days.entry(ts.date_naive()).or_default() += 1;
    }

    let timestamped = local.len() as u64;
    let working: u64 = hours[WORKING_HOURS].iter().sum();
    let weekend = weekdays[5] + weekdays[6];
    let month_count = months.len() as u64;

    stats.utc_offset = Some(offset.to_string());
    stats.hourly = Distribution::from_counts(
        hours
            .iter()
            .enumerate()
            .map(|(hour, &count)| (format!("{hour:02}"), count)),
    );
    stats.weekday = Distribution::from_counts(WEEKDAYS.iter().copied().zip(weekdays));
    stats.monthly = Distribution::from_counts(months);
    stats.working_hours_ratio = stats::ratio(working, timestamped);
    stats.weekend_ratio = stats::ratio(weekend, timestamped);
    stats.average_per_month = stats::ratio(timestamped, month_count);

    let first = days.keys().next().copied();
    let last = days.keys().next_back().copied();
    stats.first_commit_date = first;
    stats.last_commit_date = last;
    stats.days_since_last_commit = last.map(|last| {
        let today = now.with_timezone(&offset).date_naive();
        (today - last).num_days().max(0)
    });
    stats.activity = activity_stats(&days, timestamped);

    stats
}

/// Longest run of consecutive days in `dates`, with the day it starts on.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use repopulse_engine::commits::longest_streak;
///
/// let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
/// assert_eq!(longest_streak([d(1), d(2), d(4)]).0, 2);
/// assert_eq!(longest_streak([d(1)]).0, 1);
/// assert_eq!(longest_streak(Vec::new()).0, 0);
/// ```
pub fn longest_streak(dates: impl IntoIterator<Item = NaiveDate>) -> (u32, Option<NaiveDate>) {
    let distinct: BTreeSet<NaiveDate> = dates.into_iter().collect();

    let mut best = 0u32;
    let mut best_start = None;
    let mut current = 0u32;
    let mut current_start = None;
    let mut previous: Option<NaiveDate> = None;

    for day in distinct {
        let continues = previous.and_then(|p| p.succ_opt()) == Some(day);
        if continues {
            current += 1;
        } else {
            current = 1;
            current_start = Some(day);
        }
        if current > best {
            best = current;
            best_start = current_start;
        }
        previous = Some(day);
    }

    (best, best_start)
}

/// The most common UTC offset among timestamped commits, smallest on ties.
fn observed_offset(commits: &[CommitRecord]) -> FixedOffset {
    let mut counts: HashMap<i32, usize> = HashMap::new();
    for ts in commits.iter().filter_map(|c| c.timestamp) {
        *counts.entry(ts.offset().local_minus_utc()).or_default() += 1;
    }

    let seconds = counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        .map_or(0, |(secs, _)| secs);

    FixedOffset::east_opt(seconds).unwrap_or_else(|| Utc.fix())
}

fn line_stats(commits: &[CommitRecord]) -> LineStats {
    let mut additions = Vec::new();
    let mut deletions = Vec::new();
    let mut max_changes: Option<u64> = None;

    for commit in commits {
        let (Some(added), Some(deleted)) = (commit.additions, commit.deletions) else {
            continue;
        };
        additions.push(added);
        deletions.push(deleted);
        let changes = added.saturating_add(deleted);
        max_changes = Some(max_changes.map_or(changes, |m| m.max(changes)));
    }

    let files: Vec<f64> = commits
        .iter()
        .filter_map(|c| c.files_changed)
        .map(|f| f as f64)
        .collect();

    let total_additions: u64 = additions.iter().sum();
    let total_deletions: u64 = deletions.iter().sum();

    LineStats {
        commits_with_line_data: additions.len(),
        total_additions,
        total_deletions,
        additions: NumericSummary::from_counts(&additions),
        deletions: NumericSummary::from_counts(&deletions),
        change_ratio: stats::ratio(total_additions, total_deletions),
        max_single_commit_changes: max_changes,
        mean_files_changed: stats::mean(&files),
    }
}

fn activity_stats(days: &BTreeMap<NaiveDate, u64>, timestamped: u64) -> ActivityStats {
    let (longest, longest_start) = longest_streak(days.keys().copied());

    let mut busiest: Option<(NaiveDate, u64)> = None;
    for (&day, &count) in days {
        if busiest.map_or(true, |(_, best)| count > best) {
            busiest = Some((day, count));
        }
    }

    let span_days = match (days.keys().next(), days.keys().next_back()) {
        (Some(first), Some(last)) => (*last - *first).num_days() as u64 + 1,
        _ => 0,
    };

    ActivityStats {
        active_days: days.len(),
        longest_streak_days: longest,
        longest_streak_start: longest_start,
        busiest_day: busiest.map(|(day, _)| day),
        busiest_day_commits: busiest.map_or(0, |(_, count)| count),
        mean_commits_per_active_day: stats::ratio(timestamped, days.len() as u64),
        commits_per_week: stats::ratio(timestamped * 7, span_days),
    }
}
