//! Pull request status, merge time, reviews, and size tiers.

use serde::{Deserialize, Serialize};

use repopulse_core::{PullRequestRecord, PullRequestState, RecordAnomaly};

use crate::issues::elapsed_hours;
use crate::stats::{self, CreatorStats, Distribution, DurationStats, NumericSummary};

/// Size tiers by changed lines as `(label, exclusive upper bound)`.
///
/// `tiny < 10 ≤ small < 50 ≤ medium < 200 ≤ large < 500 ≤ huge`.
pub const SIZE_TIERS: [(&str, u64); 5] = [
    ("tiny", 10),
    ("small", 50),
    ("medium", 200),
    ("large", 500),
    ("huge", u64::MAX),
];

/// Statistics over a set of pull requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullRequestStats {
    /// Pull requests analyzed.
    pub total_prs: usize,
    /// Open, merged, and closed-unmerged counts.
    pub status: PullRequestStatus,
    /// `merged / total`.
    pub merge_rate: Option<f64>,
    /// Creation-to-merge time of merged pull requests.
    pub merge_time: DurationStats,
    /// Review activity.
    pub reviews: ReviewStats,
    /// Change size.
    pub size: SizeStats,
    /// Who opens pull requests.
    pub authors: CreatorStats,
    /// Pull requests excluded from merge-time statistics.
    pub anomalies: Vec<RecordAnomaly>,
}

/// Pull request counts per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestStatus {
    /// Still open.
    pub open: usize,
    /// Merged.
    pub merged: usize,
    /// Closed without merging.
    pub closed: usize,
}

/// Reviews per pull request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewStats {
    /// Pull requests with a known review count.
    pub prs_with_review_data: usize,
    /// Mean reviews per pull request.
    pub mean_reviews: Option<f64>,
    /// Median reviews per pull request.
    pub median_reviews: Option<f64>,
    /// Pull requests with at least one review.
    pub reviewed: usize,
    /// Pull requests with zero reviews.
    pub unreviewed: usize,
    /// `reviewed / prs_with_review_data`.
    pub review_rate: Option<f64>,
}

/// Change size of pull requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SizeStats {
    /// Pull requests per [`SIZE_TIERS`] tier.
    pub tiers: Distribution,
    /// Additions per pull request.
    pub additions: NumericSummary,
    /// Deletions per pull request.
    pub deletions: NumericSummary,
    /// Changed lines per pull request.
    pub changed_lines: NumericSummary,
    /// Changed files per pull request.
    pub changed_files: NumericSummary,
}

/// Tier label for a change of `lines` lines.
///
/// # Examples
///
/// ```
/// use repopulse_engine::pulls::size_tier;
///
/// assert_eq!(size_tier(0), "tiny");
/// assert_eq!(size_tier(10), "small");
/// assert_eq!(size_tier(199), "medium");
/// assert_eq!(size_tier(500), "huge");
/// ```
pub fn size_tier(lines: u64) -> &'static str {
    SIZE_TIERS[size_tier_index(lines)].0
}

/// Position in [`SIZE_TIERS`]; the last tier is open-ended.
fn size_tier_index(lines: u64) -> usize {
    SIZE_TIERS
        .iter()
        .position(|&(_, upper)| lines < upper)
        .unwrap_or(SIZE_TIERS.len() - 1)
}

/// Analyze pull requests, keeping the top `top_n` authors.
///
/// # Examples
///
/// ```
/// use repopulse_engine::pulls::analyze_pull_requests;
///
/// let stats = analyze_pull_requests(&[], 10);
/// assert_eq!(stats.total_prs, 0);
/// assert!(stats.merge_time.mean_hours.is_none());
/// assert_eq!(stats.size.tiers.total, 0);
/// ```
pub fn analyze_pull_requests(pulls: &[PullRequestRecord], top_n: usize) -> PullRequestStats {
    let mut status = PullRequestStatus::default();
    let mut merge_hours = Vec::new();
    let mut anomalies = Vec::new();
    let mut tiers = [0u64; SIZE_TIERS.len()];

    for pr in pulls {
        match pr.state {
            PullRequestState::Open => status.open += 1,
            PullRequestState::Closed => status.closed += 1,
            PullRequestState::Merged => {
                status.merged += 1;
                let id = format!("pull request #{}", pr.number);
                match pr.merged_at {
                    None => anomalies.push(RecordAnomaly::new(id, "merged without a merge time")),
                    Some(merged_at) => match elapsed_hours(pr.created_at, merged_at) {
                        Some(hours) => merge_hours.push(hours),
                        None => {
                            anomalies.push(RecordAnomaly::new(id, "merged before it was created"))
                        }
                    },
                }
            }
        }

        tiers[size_tier_index(pr.changed_lines())] += 1;
    }

    let reviews: Vec<u64> = pulls.iter().filter_map(|pr| pr.review_count).collect();
    let review_summary = NumericSummary::from_counts(&reviews);
    let reviewed = reviews.iter().filter(|&&r| r > 0).count();

    let column = |f: fn(&PullRequestRecord) -> u64| -> Vec<u64> { pulls.iter().map(f).collect() };

    PullRequestStats {
        total_prs: pulls.len(),
        status,
        merge_rate: stats::ratio(status.merged as u64, pulls.len() as u64),
        merge_time: DurationStats::from_hours(&merge_hours),
        reviews: ReviewStats {
            prs_with_review_data: reviews.len(),
            mean_reviews: review_summary.mean,
            median_reviews: review_summary.median,
            reviewed,
            unreviewed: reviews.len() - reviewed,
            review_rate: stats::ratio(reviewed as u64, reviews.len() as u64),
        },
        size: SizeStats {
            tiers: Distribution::from_counts(SIZE_TIERS.iter().map(|&(label, _)| label).zip(tiers)),
            additions: NumericSummary::from_counts(&column(|pr| pr.additions)),
            deletions: NumericSummary::from_counts(&column(|pr| pr.deletions)),
            changed_lines: NumericSummary::from_counts(&column(PullRequestRecord::changed_lines)),
            changed_files: NumericSummary::from_counts(&column(|pr| pr.changed_files)),
        },
        authors: CreatorStats::from_identities(pulls.iter().map(|pr| pr.author.as_deref()), top_n),
        anomalies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, day, hour, 0, 0).unwrap()
    }

    fn pr(number: u64, state: PullRequestState, lines: (u64, u64)) -> PullRequestRecord {
        PullRequestRecord {
            number,
            state,
            created_at: at(1, 0),
            merged_at: None,
            closed_at: None,
            additions: lines.0,
            deletions: lines.1,
            changed_files: 1,
            review_count: None,
            author: Some("dev".into()),
        }
    }

    fn merged(number: u64, merged_at: DateTime<Utc>) -> PullRequestRecord {
        PullRequestRecord {
            merged_at: Some(merged_at),
            closed_at: Some(merged_at),
            ..pr(number, PullRequestState::Merged, (5, 5))
        }
    }

    #[test]
    fn status_counts_sum_to_total() {
        let pulls = vec![
            pr(1, PullRequestState::Open, (1, 1)),
            pr(2, PullRequestState::Closed, (1, 1)),
            merged(3, at(1, 5)),
            merged(4, at(2, 0)),
        ];
        let stats = analyze_pull_requests(&pulls, 10);
        assert_eq!(stats.status, PullRequestStatus { open: 1, merged: 2, closed: 1 });
        assert_eq!(stats.merge_rate, Some(0.5));
        assert_eq!(stats.merge_time.count, 2);
        assert_eq!(stats.merge_time.min_hours, Some(5.0));
        assert_eq!(stats.merge_time.max_hours, Some(24.0));
        assert_eq!(stats.merge_time.mean_hours, Some(14.5));
    }

    #[test]
    fn merge_before_creation_is_an_anomaly() {
        let mut bad = merged(7, at(1, 0));
        bad.created_at = at(3, 0);
        let missing = PullRequestRecord {
            merged_at: None,
            ..merged(8, at(1, 0))
        };
        let stats = analyze_pull_requests(&[bad, missing], 10);
        assert_eq!(stats.status.merged, 2);
        assert_eq!(stats.merge_time.count, 0);
        assert!(stats.merge_time.mean_hours.is_none());
        let ids: Vec<_> = stats.anomalies.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["pull request #7", "pull request #8"]);
    }

    #[test]
    fn size_tiers_follow_thresholds() {
        let pulls = vec![
            pr(1, PullRequestState::Open, (9, 0)),
            pr(2, PullRequestState::Open, (5, 5)),
            pr(3, PullRequestState::Open, (49, 0)),
            pr(4, PullRequestState::Open, (100, 100)),
            pr(5, PullRequestState::Open, (499, 0)),
            pr(6, PullRequestState::Open, (250, 250)),
        ];
        let stats = analyze_pull_requests(&pulls, 10);
        let tiers = &stats.size.tiers;
        assert_eq!(tiers.count("tiny"), 1);
        assert_eq!(tiers.count("small"), 2);
        assert_eq!(tiers.count("medium"), 0);
        assert_eq!(tiers.count("large"), 2);
        assert_eq!(tiers.count("huge"), 1);
        assert_eq!(tiers.total, 6);
        let labels: Vec<_> = tiers.buckets.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, ["tiny", "small", "medium", "large", "huge"]);
    }

    #[test]
    fn saturated_line_count_lands_in_last_tier() {
        assert_eq!(size_tier(u64::MAX), "huge");
        assert_eq!(size_tier_index(u64::MAX), SIZE_TIERS.len() - 1);

        let stats = analyze_pull_requests(&[pr(1, PullRequestState::Open, (u64::MAX, 1))], 10);
        assert_eq!(stats.size.tiers.count("huge"), 1);
        assert_eq!(stats.size.tiers.total, 1);
    }

    #[test]
    fn tier_index_matches_label_at_every_boundary() {
        for lines in [0, 9, 10, 49, 50, 199, 200, 499, 500] {
            assert_eq!(SIZE_TIERS[size_tier_index(lines)].0, size_tier(lines));
        }
        assert_eq!(size_tier_index(9), 0);
        assert_eq!(size_tier_index(10), 1);
        assert_eq!(size_tier_index(500), 4);
    }

    #[test]
    fn thresholds_are_strictly_increasing() {
        assert!(SIZE_TIERS.windows(2).all(|w| w[0].1 < w[1].1));
    }

    #[test]
    fn reviews_only_count_known_values() {
        let mut a = pr(1, PullRequestState::Open, (1, 0));
        a.review_count = Some(0);
        let mut b = pr(2, PullRequestState::Open, (1, 0));
        b.review_count = Some(3);
        let mut c = pr(3, PullRequestState::Open, (1, 0));
        c.review_count = Some(2);
        let d = pr(4, PullRequestState::Open, (1, 0));

        let stats = analyze_pull_requests(&[a, b, c, d], 10);
        assert_eq!(stats.reviews.prs_with_review_data, 3);
        assert_eq!(stats.reviews.mean_reviews, Some(5.0 / 3.0));
        assert_eq!(stats.reviews.median_reviews, Some(2.0));
        assert_eq!(stats.reviews.reviewed, 2);
        assert_eq!(stats.reviews.unreviewed, 1);
        assert_eq!(stats.reviews.review_rate, Some(2.0 / 3.0));
    }

    #[test]
    fn review_stats_undefined_without_data() {
        let stats = analyze_pull_requests(&[pr(1, PullRequestState::Open, (1, 0))], 10);
        assert!(stats.reviews.mean_reviews.is_none());
        assert!(stats.reviews.review_rate.is_none());
    }

    #[test]
    fn size_means_cover_all_prs() {
        let pulls = vec![
            pr(1, PullRequestState::Open, (10, 0)),
            pr(2, PullRequestState::Closed, (30, 20)),
        ];
        let stats = analyze_pull_requests(&pulls, 10);
        assert_eq!(stats.size.additions.mean, Some(20.0));
        assert_eq!(stats.size.changed_lines.max, Some(50.0));
        assert_eq!(stats.authors.top[0].count, 2);
    }
}
