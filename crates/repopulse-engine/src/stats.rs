//! Shared statistical building blocks.
//!
//! Every "undefined" value is an `Option` so that serialized output carries
//! `null` instead of NaN or infinity.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Bucket name for records with a missing or empty identity.
///
/// Parentheses are not valid in a GitHub login, so a real account named
/// `unknown` never lands here.
pub const UNKNOWN: &str = "(unknown)";

const HOURS_PER_DAY: f64 = 24.0;
const HOURS_PER_WEEK: f64 = 168.0;
const HOURS_PER_MONTH: f64 = 720.0;

/// A labeled count inside a [`Distribution`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    /// Bucket label (`"09"`, `"Mon"`, `"2024-03"`, `"small"`, ...).
    pub label: String,
    /// Records in this bucket.
    pub count: u64,
}

/// Counts over an ordered set of buckets, with the peak bucket.
///
/// # Examples
///
/// ```
/// use repopulse_engine::stats::Distribution;
///
/// let dist = Distribution::from_counts([("a", 2), ("b", 5), ("c", 5)]);
/// assert_eq!(dist.total, 12);
/// // ties resolve to the earliest bucket
/// assert_eq!(dist.peak.unwrap().label, "b");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    /// Buckets in their natural order.
    pub buckets: Vec<Bucket>,
    /// Sum of all bucket counts.
    pub total: u64,
    /// First bucket holding the maximum count; `None` when every bucket is empty.
    pub peak: Option<Bucket>,
}

impl Distribution {
    /// Build a distribution from `(label, count)` pairs in bucket order.
    pub fn from_counts<L: Into<String>>(counts: impl IntoIterator<Item = (L, u64)>) -> Self {
        let buckets: Vec<Bucket> = counts
            .into_iter()
            .map(|(label, count)| Bucket {
                label: label.into(),
                count,
            })
            .collect();
        let total = buckets.iter().map(|b| b.count).sum();

        let mut peak: Option<&Bucket> = None;
        for bucket in &buckets {
            if bucket.count == 0 {
                continue;
            }
            // strict comparison keeps the earliest of tied buckets
            if peak.map_or(true, |p| bucket.count > p.count) {
                peak = Some(bucket);
            }
        }
        let peak = peak.cloned();

        Self {
            buckets,
            total,
            peak,
        }
    }

    /// Count for `label`, zero if absent.
    pub fn count(&self, label: &str) -> u64 {
        self.buckets
            .iter()
            .find(|b| b.label == label)
            .map_or(0, |b| b.count)
    }

    /// `true` if the distribution has no buckets.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// An identity with its count, used for rankings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedCount {
    /// Identity, label, or group name.
    pub name: String,
    /// Occurrences.
    pub count: u64,
}

/// Sort counts descending, ties broken by name ascending.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use repopulse_engine::stats::rank_counts;
///
/// let counts = HashMap::from([("bob".to_string(), 2), ("alice".to_string(), 2), ("carol".to_string(), 5)]);
/// let ranked = rank_counts(counts);
/// let names: Vec<_> = ranked.iter().map(|r| r.name.as_str()).collect();
/// assert_eq!(names, ["carol", "alice", "bob"]);
/// ```
pub fn rank_counts(counts: HashMap<String, u64>) -> Vec<RankedCount> {
    let mut ranked: Vec<RankedCount> = counts
        .into_iter()
        .map(|(name, count)| RankedCount { name, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    ranked
}

/// Trimmed identity, or [`UNKNOWN`] when missing or blank.
pub fn identity_or_unknown(identity: Option<&str>) -> String {
    match identity.map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => UNKNOWN.to_string(),
    }
}

/// Count, mean, spread and extremes over a set of values.
///
/// # Examples
///
/// ```
/// use repopulse_engine::stats::NumericSummary;
///
/// let summary = NumericSummary::from_counts(&[2, 4, 4, 4, 5, 5, 7, 9]);
/// assert_eq!(summary.mean, Some(5.0));
/// assert_eq!(summary.median, Some(4.5));
/// // sample standard deviation, n - 1 in the denominator
/// assert!((summary.std_dev.unwrap() - 2.138_089_935).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    /// Number of values summarized.
    pub count: usize,
    /// Arithmetic mean.
    pub mean: Option<f64>,
    /// Sample standard deviation; `None` below two values.
    pub std_dev: Option<f64>,
    /// Median (mean of the middle pair for even counts).
    pub median: Option<f64>,
    /// Smallest value.
    pub min: Option<f64>,
    /// Largest value.
    pub max: Option<f64>,
}

impl NumericSummary {
    /// Summarize `values`; every measure is `None` for an empty slice.
    pub fn from_values(values: &[f64]) -> Self {
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        Self {
            count: sorted.len(),
            mean: mean(&sorted),
            std_dev: sample_std_dev(&sorted),
            median: median_of_sorted(&sorted),
            min: sorted.first().copied(),
            max: sorted.last().copied(),
        }
    }

    /// Summarize integer counts.
    pub fn from_counts(values: &[u64]) -> Self {
        let as_f64: Vec<f64> = values.iter().map(|&v| v as f64).collect();
        Self::from_values(&as_f64)
    }
}

/// Elapsed-time statistics in hours.
///
/// # Examples
///
/// ```
/// use repopulse_engine::stats::DurationStats;
///
/// let stats = DurationStats::from_hours(&[2.0, 30.0, 800.0]);
/// assert_eq!(stats.count, 3);
/// assert_eq!(stats.median_hours, Some(30.0));
/// assert_eq!(stats.within_24_hours, 1);
/// assert_eq!(stats.within_week, 2);
/// assert_eq!(stats.over_month, 1);
///
/// let empty = DurationStats::from_hours(&[]);
/// assert!(empty.mean_hours.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DurationStats {
    /// Number of durations measured.
    pub count: usize,
    /// Mean duration.
    pub mean_hours: Option<f64>,
    /// Median duration.
    pub median_hours: Option<f64>,
    /// Shortest duration.
    pub min_hours: Option<f64>,
    /// Longest duration.
    pub max_hours: Option<f64>,
    /// Durations of at most 24 hours.
    pub within_24_hours: usize,
    /// Durations of at most 7 days.
    pub within_week: usize,
    /// Durations longer than 30 days.
    pub over_month: usize,
}

impl DurationStats {
    /// Summarize non-negative durations given in hours.
    pub fn from_hours(hours: &[f64]) -> Self {
        let summary = NumericSummary::from_values(hours);
        Self {
            count: summary.count,
            mean_hours: summary.mean,
            median_hours: summary.median,
            min_hours: summary.min,
            max_hours: summary.max,
            within_24_hours: hours.iter().filter(|&&h| h <= HOURS_PER_DAY).count(),
            within_week: hours.iter().filter(|&&h| h <= HOURS_PER_WEEK).count(),
            over_month: hours.iter().filter(|&&h| h > HOURS_PER_MONTH).count(),
        }
    }
}

/// Who created the items of a category and how concentrated that is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreatorStats {
    /// Distinct identities, `unknown` included.
    pub distinct: usize,
    /// Top identities by count.
    pub top: Vec<RankedCount>,
    /// Identities that created exactly one item.
    pub single_item_creators: usize,
    /// Mean items per identity.
    pub mean_per_creator: Option<f64>,
}

impl CreatorStats {
    /// Tally identities (missing ones under [`UNKNOWN`]) and keep the top `top_n`.
    pub fn from_identities<'a>(
        identities: impl IntoIterator<Item = Option<&'a str>>,
        top_n: usize,
    ) -> Self {
        let mut counts: HashMap<String, u64> = HashMap::new();
        let mut items = 0u64;
        for identity in identities {
            *counts.entry(identity_or_unknown(identity)).or_default() += 1;
            items += 1;
        }

        let mut ranked = rank_counts(counts);
        let distinct = ranked.len();
        let single_item_creators = ranked.iter().filter(|r| r.count == 1).count();
        ranked.truncate(top_n);

        Self {
            distinct,
            top: ranked,
            single_item_creators,
            mean_per_creator: ratio(items, distinct as u64),
        }
    }
}

/// `numerator / denominator`, `None` when the denominator is zero.
pub fn ratio(numerator: u64, denominator: u64) -> Option<f64> {
    if denominator == 0 {
        None
    } else {
        Some(numerator as f64 / denominator as f64)
    }
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation, `None` for fewer than two values.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = mean(values)?;
    let squares: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    Some((squares / (values.len() - 1) as f64).sqrt())
}

/// Median of an already sorted slice.
fn median_of_sorted(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    if n % 2 == 1 {
        Some(sorted[n / 2])
    } else {
        Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0)
    }
}

/// Median of an unsorted slice.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    median_of_sorted(&sorted)
}
