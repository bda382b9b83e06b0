//! Issue status, resolution time, labels, and creators.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use repopulse_core::{IssueRecord, IssueState, RecordAnomaly};

use crate::stats::{self, rank_counts, CreatorStats, DurationStats, RankedCount};

/// Statistics over a set of issues.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueStats {
    /// Issues analyzed.
    pub total_issues: usize,
    /// Open and closed counts.
    pub status: IssueStatus,
    /// `closed / total`.
    pub close_rate: Option<f64>,
    /// Creation-to-close time of closed issues.
    pub resolution: DurationStats,
    /// Age of still-open issues at analysis time.
    pub open_age: DurationStats,
    /// Issues per label, most used first.
    pub labels: Vec<RankedCount>,
    /// Issues without any label.
    pub unlabeled: usize,
    /// Who opens issues.
    pub creators: CreatorStats,
    /// Created and closed counts per month.
    pub monthly_trend: Vec<MonthlyTrend>,
    /// Issues excluded from time statistics.
    pub anomalies: Vec<RecordAnomaly>,
}

/// Open vs closed counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueStatus {
    /// Open issues.
    pub open: usize,
    /// Closed issues.
    pub closed: usize,
}

/// Activity within one `YYYY-MM` month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyTrend {
    /// Month label.
    pub month: String,
    /// Items created in the month.
    pub created: u64,
    /// Items closed in the month.
    pub closed: u64,
}

/// Analyze issues; open-issue ages are measured against `now`.
///
/// Closed issues without a close time, or closed before they were created,
/// are left out of the resolution statistics and listed in `anomalies`.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use repopulse_engine::issues::analyze_issues;
///
/// let stats = analyze_issues(&[], Utc::now(), 10);
/// assert_eq!(stats.status.open, 0);
/// assert_eq!(stats.status.closed, 0);
/// assert!(stats.resolution.mean_hours.is_none());
/// ```
pub fn analyze_issues(issues: &[IssueRecord], now: DateTime<Utc>, top_n: usize) -> IssueStats {
    let mut status = IssueStatus::default();
    let mut resolution_hours = Vec::new();
    let mut open_hours = Vec::new();
    let mut anomalies = Vec::new();
    let mut labels: HashMap<String, u64> = HashMap::new();
    let mut unlabeled = 0usize;
    let mut trend: BTreeMap<String, (u64, u64)> = BTreeMap::new();

    for issue in issues {
        let id = format!("issue #{}", issue.number);
        trend.entry(month_of(issue.created_at)).or_default().0 += 1;

        match issue.state {
            IssueState::Open => {
                status.open += 1;
                match elapsed_hours(issue.created_at, now) {
                    Some(hours) => open_hours.push(hours),
                    None => anomalies.push(RecordAnomaly::new(id, "created after the analysis time")),
                }
            }
            IssueState::Closed => {
                status.closed += 1;
                match issue.closed_at {
                    None => anomalies.push(RecordAnomaly::new(id, "closed without a close time")),
                    Some(closed_at) => {
                        trend.entry(month_of(closed_at)).or_default().1 += 1;
                        match elapsed_hours(issue.created_at, closed_at) {
                            Some(hours) => resolution_hours.push(hours),
                            None => anomalies
                                .push(RecordAnomaly::new(id, "closed before it was created")),
                        }
                    }
                }
            }
        }

        if issue.labels.is_empty() {
            unlabeled += 1;
        }
        // a label repeated on one issue still counts once for that issue
        let mut seen: Vec<&str> = Vec::with_capacity(issue.labels.len());
        for label in &issue.labels {
            if !seen.contains(&label.as_str()) {
                seen.push(label);
                *labels.entry(label.clone()).or_default() += 1;
            }
        }
    }

    IssueStats {
        total_issues: issues.len(),
        status,
        close_rate: stats::ratio(status.closed as u64, issues.len() as u64),
        resolution: DurationStats::from_hours(&resolution_hours),
        open_age: DurationStats::from_hours(&open_hours),
        labels: rank_counts(labels),
        unlabeled,
        creators: CreatorStats::from_identities(issues.iter().map(|i| i.creator.as_deref()), top_n),
        monthly_trend: trend
            .into_iter()
            .map(|(month, (created, closed))| MonthlyTrend {
                month,
                created,
                closed,
            })
            .collect(),
        anomalies,
    }
}

/// Hours from `start` to `end`; `None` if `end` precedes `start`.
pub(crate) fn elapsed_hours(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<f64> {
    let delta = end - start;
    if delta < chrono::Duration::zero() {
        return None;
    }
    Some(delta.num_seconds() as f64 / 3600.0)
}

pub(crate) fn month_of(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    fn open(number: u64, created: DateTime<Utc>) -> IssueRecord {
        IssueRecord {
            number,
            state: IssueState::Open,
            created_at: created,
            closed_at: None,
            labels: Vec::new(),
            creator: Some("reporter".into()),
        }
    }

    fn closed(number: u64, created: DateTime<Utc>, closed_at: DateTime<Utc>) -> IssueRecord {
        IssueRecord {
            state: IssueState::Closed,
            closed_at: Some(closed_at),
            ..open(number, created)
        }
    }

    #[test]
    fn zero_issues_produce_undefined_stats() {
        let stats = analyze_issues(&[], at(1, 0), 10);
        assert_eq!(stats.status, IssueStatus { open: 0, closed: 0 });
        assert!(stats.close_rate.is_none());
        assert_eq!(stats.resolution.count, 0);
        assert!(stats.resolution.median_hours.is_none());
        assert!(stats.labels.is_empty());
        assert!(stats.anomalies.is_empty());
    }

    #[test]
    fn resolution_time_in_hours() {
        let issues = vec![
            closed(1, at(1, 0), at(1, 12)),
            closed(2, at(1, 0), at(3, 0)),
            closed(3, at(1, 0), at(1, 6)),
            open(4, at(2, 0)),
        ];
        let stats = analyze_issues(&issues, at(5, 0), 10);
        assert_eq!(stats.status.open, 1);
        assert_eq!(stats.status.closed, 3);
        assert_eq!(stats.close_rate, Some(0.75));
        assert_eq!(stats.resolution.count, 3);
        assert_eq!(stats.resolution.min_hours, Some(6.0));
        assert_eq!(stats.resolution.max_hours, Some(48.0));
        assert_eq!(stats.resolution.median_hours, Some(12.0));
        assert_eq!(stats.resolution.mean_hours, Some(22.0));
        assert_eq!(stats.resolution.within_24_hours, 2);
        assert_eq!(stats.open_age.max_hours, Some(72.0));
    }

    #[test]
    fn negative_durations_become_anomalies() {
        let issues = vec![
            closed(1, at(5, 0), at(4, 0)),
            closed(2, at(1, 0), at(1, 1)),
            IssueRecord {
                closed_at: None,
                ..closed(3, at(1, 0), at(1, 0))
            },
        ];
        let stats = analyze_issues(&issues, at(10, 0), 10);
        assert_eq!(stats.status.closed, 3);
        assert_eq!(stats.resolution.count, 1);
        assert_eq!(stats.anomalies.len(), 2);
        assert_eq!(stats.anomalies[0].id, "issue #1");
        assert!(stats.resolution.min_hours.unwrap() >= 0.0);
    }

    #[test]
    fn labels_count_each_issue_once_per_label() {
        let mut a = open(1, at(1, 0));
        a.labels = vec!["bug".into(), "ui".into(), "bug".into()];
        let mut b = open(2, at(1, 0));
        b.labels = vec!["bug".into()];
        let c = open(3, at(1, 0));

        let stats = analyze_issues(&[a, b, c], at(2, 0), 10);
        assert_eq!(stats.labels[0], RankedCount { name: "bug".into(), count: 2 });
        assert_eq!(stats.labels[1], RankedCount { name: "ui".into(), count: 1 });
        assert_eq!(stats.unlabeled, 1);
    }

    #[test]
    fn creators_rank_with_unknown_bucket() {
        let mut anon = open(2, at(1, 0));
        anon.creator = None;
        let stats = analyze_issues(&[open(1, at(1, 0)), anon, open(3, at(1, 0))], at(2, 0), 10);
        assert_eq!(stats.creators.distinct, 2);
        assert_eq!(stats.creators.top[0].name, "reporter");
        assert_eq!(stats.creators.top[1].name, crate::stats::UNKNOWN);
    }

    #[test]
    fn monthly_trend_tracks_created_and_closed_months() {
        let feb = Utc.with_ymd_and_hms(2024, 2, 20, 0, 0, 0).unwrap();
        let issues = vec![closed(1, feb, at(2, 0)), open(2, at(3, 0))];
        let stats = analyze_issues(&issues, at(10, 0), 10);
        assert_eq!(
            stats.monthly_trend,
            vec![
                MonthlyTrend { month: "2024-02".into(), created: 1, closed: 0 },
                MonthlyTrend { month: "2024-03".into(), created: 1, closed: 1 },
            ]
        );
    }
}
