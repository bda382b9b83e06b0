//! Monthly trend forecasting, seasonality and outlier detection.
//!
//! Works on the per-month series an [`AnalysisResult`] already carries:
//! commits per month and issues opened / closed per month. Months with no
//! activity between the first and last observed month count as zero.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::repo::AnalysisResult;
use crate::stats;

/// Months forecast when the caller does not choose.
pub const DEFAULT_PERIODS: usize = 6;

/// Points averaged by the moving-average model.
pub const MOVING_AVERAGE_WINDOW: usize = 3;

/// Relative monthly slope beyond which a series counts as rising or falling.
pub const TREND_THRESHOLD: f64 = 0.05;

/// Standard deviations from the mean that make a month an outlier.
pub const ANOMALY_SENSITIVITY: f64 = 2.0;

/// Coefficient of variation across calendar months that counts as seasonal.
pub const SEASONALITY_CV: f64 = 0.2;

const HIGH_SEVERITY_Z: f64 = 3.0;
const SMOOTHING_ALPHA: f64 = 0.5;
const SMOOTHING_BETA: f64 = 0.5;
const MIN_POINTS_FOR_REGRESSION: usize = 5;
const STRONG_TREND: f64 = 0.5;
const BREAK_WINDOW: usize = 3;
const BREAK_CHANGE: f64 = 0.5;
const LOW_ACTIVITY_SHARE: f64 = 0.3;

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// One month of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyPoint {
    /// `YYYY-MM` label.
    pub month: String,
    /// Observed value.
    pub value: f64,
}

/// Build a gap-free monthly series from `(YYYY-MM, count)` pairs.
///
/// Labels that are not `YYYY-MM` are ignored, repeated labels are summed,
/// and missing months between the first and last label are filled with zero.
///
/// # Examples
///
/// ```
/// use repopulse_engine::trend::monthly_series;
///
/// let series = monthly_series([("2024-01", 4), ("2024-03", 2)]);
/// let months: Vec<_> = series.iter().map(|p| p.month.as_str()).collect();
/// assert_eq!(months, ["2024-01", "2024-02", "2024-03"]);
/// assert_eq!(series[1].value, 0.0);
/// ```
pub fn monthly_series<'a>(counts: impl IntoIterator<Item = (&'a str, u64)>) -> Vec<MonthlyPoint> {
    let mut by_index: BTreeMap<i32, u64> = BTreeMap::new();
    for (label, count) in counts {
        if let Some(index) = month_index(label) {
            *by_index.entry(index).or_default() += count;
        }
    }
    let (Some(&first), Some(&last)) = (by_index.keys().next(), by_index.keys().next_back()) else {
        return Vec::new();
    };
    (first..=last)
        .map(|index| MonthlyPoint {
            month: month_label(index),
            value: by_index.get(&index).copied().unwrap_or(0) as f64,
        })
        .collect()
}

/// Months since year zero, so consecutive months differ by one.
fn month_index(label: &str) -> Option<i32> {
    let date = NaiveDate::parse_from_str(&format!("{label}-01"), "%Y-%m-%d").ok()?;
    Some(date.year() * 12 + date.month0() as i32)
}

fn month_label(index: i32) -> String {
    format!("{:04}-{:02}", index.div_euclid(12), index.rem_euclid(12) + 1)
}

fn month_name(index: i32) -> &'static str {
    MONTH_NAMES[index.rem_euclid(12) as usize]
}

/// Least-squares line through `(i, values[i])`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    /// Change per month.
    pub slope: f64,
    /// Fitted value at the first month.
    pub intercept: f64,
    /// Coefficient of determination; 1 for a flat series.
    pub r_squared: f64,
}

impl LinearFit {
    /// Fitted value at position `x`.
    pub fn at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Fit a line to `values`; `None` for fewer than two points.
///
/// # Examples
///
/// ```
/// use repopulse_engine::trend::linear_fit;
///
/// let fit = linear_fit(&[1.0, 2.0, 3.0, 4.0]).unwrap();
/// assert_eq!(fit.slope, 1.0);
/// assert_eq!(fit.intercept, 1.0);
/// assert_eq!(fit.r_squared, 1.0);
/// assert!(linear_fit(&[7.0]).is_none());
/// ```
pub fn linear_fit(values: &[f64]) -> Option<LinearFit> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = stats::mean(values)?;

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        numerator += dx * (y - y_mean);
        denominator += dx * dx;
    }
    // positive whenever n >= 2
    let slope = numerator / denominator;
    let intercept = y_mean - slope * x_mean;

    let ss_tot: f64 = values.iter().map(|y| (y - y_mean).powi(2)).sum();
    let r_squared = if ss_tot == 0.0 {
        1.0
    } else {
        let ss_res: f64 = values
            .iter()
            .enumerate()
            .map(|(i, y)| (y - (slope * i as f64 + intercept)).powi(2))
            .sum();
        1.0 - ss_res / ss_tot
    };

    Some(LinearFit {
        slope,
        intercept,
        r_squared,
    })
}

/// Forecast by repeatedly averaging the last `window` values, feeding each
/// prediction back in.
pub fn moving_average_forecast(values: &[f64], window: usize, periods: usize) -> Vec<f64> {
    let window = window.max(1);
    let Some(overall) = stats::mean(values) else {
        return vec![0.0; periods];
    };
    if values.len() < window {
        return vec![overall; periods];
    }
    let mut working = values.to_vec();
    for _ in 0..periods {
        let recent = &working[working.len() - window..];
        let next = recent.iter().sum::<f64>() / window as f64;
        working.push(next);
    }
    working.split_off(values.len())
}

/// Double exponential smoothing (level and trend), floored at zero.
pub fn holt_forecast(values: &[f64], periods: usize) -> Vec<f64> {
    let (first, second) = match values {
        [] => return vec![0.0; periods],
        [only] => return vec![only.max(0.0); periods],
        [first, second, ..] => (*first, *second),
    };
    let mut level = first;
    let mut trend = second - first;
    for &y in &values[1..] {
        let previous = level;
        level = SMOOTHING_ALPHA * y + (1.0 - SMOOTHING_ALPHA) * (level + trend);
        trend = SMOOTHING_BETA * (level - previous) + (1.0 - SMOOTHING_BETA) * trend;
    }
    (1..=periods)
        .map(|i| (level + i as f64 * trend).max(0.0))
        .collect()
}

/// Direction of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    /// Relative slope above [`TREND_THRESHOLD`].
    Increasing,
    /// Relative slope below `-TREND_THRESHOLD`.
    Decreasing,
    /// Neither.
    Stable,
}

/// Which model produced a [`Forecast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastModel {
    /// Short series.
    MovingAverage,
    /// Default for five or more months.
    LinearRegression,
    /// Strong trends.
    HoltWinters,
}

/// Predicted values for the months after the series ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    /// Model used.
    pub model: ForecastModel,
    /// Last observed value.
    pub current: f64,
    /// Labels of the predicted months.
    pub months: Vec<String>,
    /// One prediction per month.
    pub predicted: Vec<f64>,
    /// Lower bound of the rough 95% band around the mean prediction.
    pub lower: f64,
    /// Upper bound of that band.
    pub upper: f64,
}

/// How strongly calendar months differ from each other.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Seasonality {
    /// Coefficient of variation above [`SEASONALITY_CV`].
    pub has_seasonality: bool,
    /// Population standard deviation over mean of the calendar-month means.
    pub coefficient_of_variation: Option<f64>,
    /// Mean value per calendar month, January first.
    pub monthly_means: Vec<CalendarMonthMean>,
    /// Up to three busiest calendar months, busiest first.
    pub peak_months: Vec<String>,
    /// Up to three quietest calendar months, quietest first.
    pub low_months: Vec<String>,
}

/// Mean of one calendar month across years.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarMonthMean {
    /// `Jan` .. `Dec`.
    pub month: String,
    /// Mean value.
    pub mean: f64,
}

/// Whether an outlier is above or below the mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Above.
    Spike,
    /// Below.
    Drop,
}

/// How far outside the normal range something is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Worth a look.
    Medium,
    /// Worth acting on.
    High,
}

/// A month whose value lies more than the sensitivity in standard deviations
/// from the series mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesAnomaly {
    /// `YYYY-MM` label.
    pub month: String,
    /// Observed value.
    pub value: f64,
    /// Signed distance from the mean in population standard deviations.
    pub z_score: f64,
    /// Spike or drop.
    pub kind: AnomalyKind,
    /// `High` beyond three standard deviations.
    pub severity: Severity,
}

/// Flag outlier months by z-score.
///
/// Needs at least three points and some variation; otherwise nothing is
/// flagged.
///
/// # Examples
///
/// ```
/// use repopulse_engine::trend::{detect_anomalies, monthly_series, AnomalyKind};
///
/// let series = monthly_series([
///     ("2024-01", 10), ("2024-02", 10), ("2024-03", 10), ("2024-04", 10),
///     ("2024-05", 10), ("2024-06", 10), ("2024-07", 90),
/// ]);
/// let anomalies = detect_anomalies(&series, 2.0);
/// assert_eq!(anomalies.len(), 1);
/// assert_eq!(anomalies[0].month, "2024-07");
/// assert_eq!(anomalies[0].kind, AnomalyKind::Spike);
/// ```
pub fn detect_anomalies(series: &[MonthlyPoint], sensitivity: f64) -> Vec<SeriesAnomaly> {
    if series.len() < 3 {
        return Vec::new();
    }
    let values: Vec<f64> = series.iter().map(|p| p.value).collect();
    let Some((mean, std_dev)) = mean_and_population_std(&values) else {
        return Vec::new();
    };
    if std_dev == 0.0 {
        return Vec::new();
    }

    series
        .iter()
        .filter_map(|point| {
            let z_score = (point.value - mean) / std_dev;
            if z_score.abs() <= sensitivity {
                return None;
            }
            Some(SeriesAnomaly {
                month: point.month.clone(),
                value: point.value,
                z_score,
                kind: if z_score > 0.0 {
                    AnomalyKind::Spike
                } else {
                    AnomalyKind::Drop
                },
                severity: if z_score.abs() > HIGH_SEVERITY_Z {
                    Severity::High
                } else {
                    Severity::Medium
                },
            })
        })
        .collect()
}

/// A month where the following three months differ sharply from the
/// preceding three.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendBreak {
    /// First month of the later window.
    pub month: String,
    /// Mean of the earlier window.
    pub before_mean: f64,
    /// Mean of the later window.
    pub after_mean: f64,
    /// `(after - before) / before`.
    pub change: f64,
    /// `Increasing` or `Decreasing`.
    pub direction: TrendDirection,
}

/// Find level shifts of more than 50% between adjacent three-month windows.
pub fn trend_breaks(series: &[MonthlyPoint]) -> Vec<TrendBreak> {
    let n = series.len();
    if n < 2 * BREAK_WINDOW {
        return Vec::new();
    }
    let window_mean = |range: std::ops::Range<usize>| {
        series[range].iter().map(|p| p.value).sum::<f64>() / BREAK_WINDOW as f64
    };

    let mut breaks = Vec::new();
    for i in BREAK_WINDOW..=n - BREAK_WINDOW {
        let before_mean = window_mean(i - BREAK_WINDOW..i);
        let after_mean = window_mean(i..i + BREAK_WINDOW);
        if before_mean == 0.0 {
            continue;
        }
        let change = (after_mean - before_mean) / before_mean;
        if change.abs() > BREAK_CHANGE {
            breaks.push(TrendBreak {
                month: series[i].month.clone(),
                before_mean,
                after_mean,
                change,
                direction: if change > 0.0 {
                    TrendDirection::Increasing
                } else {
                    TrendDirection::Decreasing
                },
            });
        }
    }
    breaks
}

/// Group a series by calendar month and measure how much the months differ.
pub fn seasonality(series: &[MonthlyPoint]) -> Seasonality {
    let mut by_month: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
    for point in series {
        if let Some(index) = month_index(&point.month) {
            by_month.entry(index.rem_euclid(12)).or_default().push(point.value);
        }
    }

    let means: Vec<(i32, f64)> = by_month
        .iter()
        .filter_map(|(&month, values)| stats::mean(values).map(|m| (month, m)))
        .collect();
    let averages: Vec<f64> = means.iter().map(|&(_, m)| m).collect();
    let Some((mean, std_dev)) = mean_and_population_std(&averages) else {
        return Seasonality::default();
    };
    if mean == 0.0 {
        return Seasonality::default();
    }
    let cv = std_dev / mean;

    let mut busiest = means.clone();
    busiest.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let mut quietest = means.clone();
    quietest.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    let names = |months: &[(i32, f64)]| -> Vec<String> {
        months
            .iter()
            .take(3)
            .map(|&(m, _)| month_name(m).to_string())
            .collect()
    };

    Seasonality {
        has_seasonality: cv > SEASONALITY_CV,
        coefficient_of_variation: Some(cv),
        monthly_means: means
            .iter()
            .map(|&(m, mean)| CalendarMonthMean {
                month: month_name(m).to_string(),
                mean,
            })
            .collect(),
        peak_months: names(busiest.as_slice()),
        low_months: names(quietest.as_slice()),
    }
}

/// Trend, forecast and irregularities of one monthly series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesTrend {
    /// The gap-free series analyzed.
    pub points: Vec<MonthlyPoint>,
    /// Least-squares fit; `None` below two months.
    pub fit: Option<LinearFit>,
    /// Direction from the relative slope.
    pub direction: TrendDirection,
    /// `min(1, |relative slope| · R² · 10)`.
    pub strength: f64,
    /// Months ahead.
    pub forecast: Forecast,
    /// Calendar-month pattern.
    pub seasonality: Seasonality,
    /// Outlier months.
    pub anomalies: Vec<SeriesAnomaly>,
    /// Level shifts.
    pub breaks: Vec<TrendBreak>,
}

/// Analyze a monthly series and forecast `periods` months; `None` when the
/// series is empty.
///
/// Fewer than five months use a three-month moving average, strong trends
/// use Holt-Winters smoothing, everything else a linear regression.
pub fn analyze_series(points: Vec<MonthlyPoint>, periods: usize) -> Option<SeriesTrend> {
    let values: Vec<f64> = points.iter().map(|p| p.value).collect();
    let last = points.last()?;
    let current = last.value;
    let last_index = month_index(&last.month)?;

    let fit = linear_fit(&values);
    let (direction, strength) = direction(&values, fit.as_ref());

    let (model, predicted) = if values.len() < MIN_POINTS_FOR_REGRESSION {
        (
            ForecastModel::MovingAverage,
            moving_average_forecast(&values, MOVING_AVERAGE_WINDOW, periods),
        )
    } else if strength > STRONG_TREND {
        (ForecastModel::HoltWinters, holt_forecast(&values, periods))
    } else {
        let n = values.len();
        let predicted = match &fit {
            Some(fit) => (0..periods)
                .map(|i| fit.at((n + i) as f64).max(0.0))
                .collect(),
            None => vec![current; periods],
        };
        (ForecastModel::LinearRegression, predicted)
    };
    let (lower, upper) = band(&values, &predicted);
    let months = (1..=periods as i32)
        .map(|offset| month_label(last_index + offset))
        .collect();

    Some(SeriesTrend {
        fit,
        direction,
        strength,
        forecast: Forecast {
            model,
            current,
            months,
            predicted,
            lower,
            upper,
        },
        seasonality: seasonality(&points),
        anomalies: detect_anomalies(&points, ANOMALY_SENSITIVITY),
        breaks: trend_breaks(&points),
        points,
    })
}

fn direction(values: &[f64], fit: Option<&LinearFit>) -> (TrendDirection, f64) {
    let (Some(fit), Some(mean)) = (fit, stats::mean(values)) else {
        return (TrendDirection::Stable, 0.0);
    };
    let relative = if mean == 0.0 { 0.0 } else { fit.slope / mean };
    let direction = if relative > TREND_THRESHOLD {
        TrendDirection::Increasing
    } else if relative < -TREND_THRESHOLD {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    };
    let strength = (relative.abs() * fit.r_squared.max(0.0) * 10.0).min(1.0);
    (direction, strength)
}

/// Mean prediction ± two population standard deviations of the history.
fn band(history: &[f64], predicted: &[f64]) -> (f64, f64) {
    let centre = stats::mean(predicted).unwrap_or(0.0);
    match mean_and_population_std(history) {
        Some((_, std_dev)) if history.len() >= 2 => {
            ((centre - 2.0 * std_dev).max(0.0), centre + 2.0 * std_dev)
        }
        _ => (centre * 0.8, centre * 1.2),
    }
}

fn mean_and_population_std(values: &[f64]) -> Option<(f64, f64)> {
    let mean = stats::mean(values)?;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some((mean, variance.sqrt()))
}

/// Overall direction across the forecast series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outlook {
    /// More series rising than falling.
    Positive,
    /// More series falling than rising.
    Negative,
    /// Balanced.
    Neutral,
}

/// A warning derived from the forecasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendRisk {
    /// How serious it is.
    pub level: Severity,
    /// Machine-readable kind.
    pub kind: RiskKind,
    /// Human-readable explanation.
    pub description: String,
}

/// What a [`TrendRisk`] is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskKind {
    /// Commits are trending down.
    ActivityDecline,
    /// Forecast commits drop far below the busiest month.
    LowActivity,
}

/// Forecasts for a whole analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    /// `owner/name`.
    pub repository: String,
    /// Analysis time the series end at.
    pub generated_at: DateTime<Utc>,
    /// Months forecast.
    pub periods: usize,
    /// Commits per month; `None` without commit data.
    pub commits: Option<SeriesTrend>,
    /// Issues opened per month.
    pub issues_opened: Option<SeriesTrend>,
    /// Issues closed per month.
    pub issues_closed: Option<SeriesTrend>,
    /// Combined direction of commits and closed issues.
    pub outlook: Outlook,
    /// Warnings, most severe first.
    pub risks: Vec<TrendRisk>,
}

/// Forecast the monthly series of `result` for `periods` months.
pub fn predict(result: &AnalysisResult, periods: usize) -> TrendReport {
    let commits = result.commits.stats().and_then(|stats| {
        let counts = stats.monthly.buckets.iter().map(|b| (b.label.as_str(), b.count));
        analyze_series(monthly_series(counts), periods)
    });
    let issue_months = result.issues.stats().map(|stats| stats.monthly_trend.as_slice());
    let issues_opened = issue_months.and_then(|months| {
        let counts = months.iter().map(|m| (m.month.as_str(), m.created));
        analyze_series(monthly_series(counts), periods)
    });
    let issues_closed = issue_months.and_then(|months| {
        let counts = months.iter().map(|m| (m.month.as_str(), m.closed));
        analyze_series(monthly_series(counts), periods)
    });

    let outlook = outlook([commits.as_ref(), issues_closed.as_ref()]);
    let risks = risks(commits.as_ref());

    TrendReport {
        repository: result.repository.clone(),
        generated_at: result.generated_at,
        periods,
        commits,
        issues_opened,
        issues_closed,
        outlook,
        risks,
    }
}

fn outlook<'a>(series: impl IntoIterator<Item = Option<&'a SeriesTrend>>) -> Outlook {
    let (mut rising, mut falling) = (0, 0);
    for trend in series.into_iter().flatten() {
        match trend.direction {
            TrendDirection::Increasing => rising += 1,
            TrendDirection::Decreasing => falling += 1,
            TrendDirection::Stable => {}
        }
    }
    match rising.cmp(&falling) {
        std::cmp::Ordering::Greater => Outlook::Positive,
        std::cmp::Ordering::Less => Outlook::Negative,
        std::cmp::Ordering::Equal => Outlook::Neutral,
    }
}

fn risks(commits: Option<&SeriesTrend>) -> Vec<TrendRisk> {
    let Some(commits) = commits else {
        return Vec::new();
    };
    let mut risks = Vec::new();

    let busiest = commits.points.iter().map(|p| p.value).fold(0.0, f64::max);
    let lowest_forecast = commits.forecast.predicted.iter().copied().reduce(f64::min);
    if let Some(lowest) = lowest_forecast {
        if busiest > 0.0 && lowest / busiest < LOW_ACTIVITY_SHARE {
            risks.push(TrendRisk {
                level: Severity::High,
                kind: RiskKind::LowActivity,
                description: format!(
                    "forecast drops to {lowest:.0} commits a month against a peak of {busiest:.0}"
                ),
            });
        }
    }
    if commits.direction == TrendDirection::Decreasing {
        risks.push(TrendRisk {
            level: Severity::Medium,
            kind: RiskKind::ActivityDecline,
            description: "monthly commit volume is trending down".into(),
        });
    }
    risks
}
