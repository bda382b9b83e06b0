//! Text, Markdown and JSON renderers for analysis results.

use std::fmt::{self, Write};

use miette::{IntoDiagnostic, Result};

use repopulse_core::{OutputFormat, RepoInfo};
use repopulse_engine::commits::CommitStats;
use repopulse_engine::contributors::ContributorStats;
use repopulse_engine::issues::IssueStats;
use repopulse_engine::pulls::PullRequestStats;
use repopulse_engine::stats::{DurationStats, RankedCount};
use repopulse_engine::trend::{Outlook, SeriesTrend, Severity, TrendDirection, TrendReport};
use repopulse_engine::{AnalysisResult, CategoryOutcome};
use repopulse_github::{RateLimitStatus, RateLimits};

const NOT_AVAILABLE: &str = "n/a";

/// One titled block of `label: value` rows.
struct Section {
    title: String,
    notes: Vec<String>,
    rows: Vec<(String, String)>,
}

impl Section {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            notes: Vec::new(),
            rows: Vec::new(),
        }
    }

    fn row(&mut self, label: impl Into<String>, value: impl Into<String>) {
        self.rows.push((label.into(), value.into()));
    }

    fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }
}

/// Render monthly forecasts in `format`.
pub fn render_trends(report: &TrendReport, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return serde_json::to_string_pretty(report).into_diagnostic();
    }

    let mut overview = Section::new(format!("Repository outlook: {}", report.repository));
    overview.row("Outlook", outlook_label(report.outlook));
    overview.row("Forecast", format!("{} months", report.periods));
    for risk in &report.risks {
        let level = match risk.level {
            Severity::High => "high",
            Severity::Medium => "medium",
        };
        overview.note(format!("Risk ({level}): {}.", risk.description));
    }

    let series = [
        ("Commits per month", &report.commits),
        ("Issues opened per month", &report.issues_opened),
        ("Issues closed per month", &report.issues_closed),
    ];
    let mut sections = vec![overview];
    for (title, trend) in series {
        let mut section = Section::new(title);
        match trend {
            Some(trend) => trend_rows(trend, &mut section),
            None => section.note("No monthly data."),
        }
        sections.push(section);
    }
    write_sections(&sections, format).into_diagnostic()
}

fn trend_rows(trend: &SeriesTrend, s: &mut Section) {
    s.row("Months observed", trend.points.len().to_string());
    s.row(
        "Direction",
        format!(
            "{} (strength {:.2})",
            direction_label(trend.direction),
            trend.strength
        ),
    );
    s.row("R squared", float(trend.fit.map(|f| f.r_squared)));
    let forecast = &trend.forecast;
    s.row("Current", format!("{:.0}", forecast.current));
    let predicted = forecast
        .months
        .iter()
        .zip(&forecast.predicted)
        .map(|(month, value)| format!("{month} {value:.0}"))
        .collect::<Vec<_>>();
    s.row("Forecast", join_or_na(&predicted));
    s.row(
        "Expected range",
        format!("{:.0} to {:.0}", forecast.lower, forecast.upper),
    );
    s.row("Model", format!("{:?}", forecast.model));
    if trend.seasonality.has_seasonality {
        s.row("Peak months", join_or_na(&trend.seasonality.peak_months));
    }
    let anomalies = trend
        .anomalies
        .iter()
        .map(|a| format!("{} {:.0} (z {:+.1})", a.month, a.value, a.z_score))
        .collect::<Vec<_>>();
    if !anomalies.is_empty() {
        s.row("Unusual months", anomalies.join(", "));
    }
    for shift in &trend.breaks {
        s.note(format!(
            "Level shift at {}: {:.0} to {:.0} per month.",
            shift.month, shift.before_mean, shift.after_mean
        ));
    }
}

fn outlook_label(outlook: Outlook) -> &'static str {
    match outlook {
        Outlook::Positive => "growing",
        Outlook::Negative => "declining",
        Outlook::Neutral => "steady",
    }
}

fn direction_label(direction: TrendDirection) -> &'static str {
    match direction {
        TrendDirection::Increasing => "increasing",
        TrendDirection::Decreasing => "decreasing",
        TrendDirection::Stable => "stable",
    }
}

/// Render a full analysis in `format`.
pub fn render_analysis(result: &AnalysisResult, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return serde_json::to_string_pretty(result).into_diagnostic();
    }

    let mut overview = Section::new(format!("Repository pulse: {}", result.repository));
    if let Some(description) = &result.repo_info.description {
        overview.row("Description", description.clone());
    }
    overview.row(
        "Window",
        format!(
            "{} to {} ({} days)",
            result.window.since.format("%Y-%m-%d"),
            result.window.until.format("%Y-%m-%d"),
            result.window.days
        ),
    );
    overview.row("Generated", result.generated_at.to_rfc3339());
    if result.sample_truncated {
        overview.note("Some categories hit their record limit; statistics cover a sample.");
    }

    let sections = vec![
        overview,
        category("Commits", &result.commits, commit_rows),
        category("Contributors", &result.contributors, contributor_rows),
        category("Issues", &result.issues, issue_rows),
        category("Pull requests", &result.pull_requests, pull_rows),
    ];
    write_sections(&sections, format).into_diagnostic()
}

/// Render repository metadata in `format`.
pub fn render_repo_info(info: &RepoInfo, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return serde_json::to_string_pretty(info).into_diagnostic();
    }
    let mut section = Section::new(info.full_name.clone());
    section.row("Description", opt_str(info.description.as_deref()));
    section.row("Language", opt_str(info.language.as_deref()));
    section.row("Stars", info.stars.to_string());
    section.row("Forks", info.forks.to_string());
    section.row("Open issues", info.open_issues.to_string());
    section.row("Default branch", opt_str(info.default_branch.as_deref()));
    section.row("License", opt_str(info.license.as_deref()));
    if !info.topics.is_empty() {
        section.row("Topics", info.topics.join(", "));
    }
    section.row(
        "Created",
        info.created_at.map_or(NOT_AVAILABLE.to_string(), |t| t.format("%Y-%m-%d").to_string()),
    );
    section.row(
        "Last push",
        info.pushed_at.map_or(NOT_AVAILABLE.to_string(), |t| t.format("%Y-%m-%d").to_string()),
    );
    if let Some(url) = &info.html_url {
        section.row("URL", url.clone());
    }
    write_sections(&[section], format).into_diagnostic()
}

/// Render API budgets in `format`.
pub fn render_rate_limits(limits: &RateLimits, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return serde_json::to_string_pretty(limits).into_diagnostic();
    }
    let mut section = Section::new("GitHub API rate limits");
    let mut budget = |name: &str, status: &RateLimitStatus| {
        let reset = status
            .reset_at
            .map_or(NOT_AVAILABLE.to_string(), |t| t.format("%H:%M:%S UTC").to_string());
        section.row(
            name,
            format!("{}/{} remaining, resets {reset}", status.remaining, status.limit),
        );
    };
    budget("Core", &limits.core);
    if let Some(search) = &limits.search {
        budget("Search", search);
    }
    if limits.core.is_exhausted() {
        section.note("Core budget exhausted; analysis requests will be retried until it resets.");
    }
    write_sections(&[section], format).into_diagnostic()
}

fn category<S>(
    title: &str,
    outcome: &CategoryOutcome<S>,
    rows: impl FnOnce(&S, &mut Section),
) -> Section {
    let mut section = Section::new(title);
    match outcome {
        CategoryOutcome::Analyzed(report) => {
            if report.sample_truncated {
                section.note(format!(
                    "Sample truncated: only the first {} records were analyzed.",
                    report.limit
                ));
            }
            if !report.anomalies.is_empty() {
                section.note(format!(
                    "{} records could not be read (first: {}).",
                    report.anomalies.len(),
                    report.anomalies[0]
                ));
            }
            rows(&report.stats, &mut section);
        }
        CategoryOutcome::Skipped { reason } => section.note(format!("Skipped: {reason}.")),
        CategoryOutcome::Failed { error, .. } => section.note(format!("Failed: {error}")),
    }
    section
}

fn commit_rows(stats: &CommitStats, s: &mut Section) {
    s.row("Total commits", stats.total_commits.to_string());
    if stats.missing_timestamps > 0 {
        s.row("Without timestamp", stats.missing_timestamps.to_string());
    }
    s.row(
        "Active period",
        match (stats.first_commit_date, stats.last_commit_date) {
            (Some(first), Some(last)) => format!("{first} to {last}"),
            _ => NOT_AVAILABLE.to_string(),
        },
    );
    s.row("Days since last commit", opt_num(stats.days_since_last_commit));
    s.row(
        "Peak hour",
        stats.hourly.peak.as_ref().map_or(NOT_AVAILABLE.to_string(), |b| {
            format!("{}:00 ({} commits)", b.label, b.count)
        }),
    );
    s.row(
        "Peak weekday",
        stats.weekday.peak.as_ref().map_or(NOT_AVAILABLE.to_string(), |b| {
            format!("{} ({} commits)", b.label, b.count)
        }),
    );
    s.row("Working hours", pct(stats.working_hours_ratio));
    s.row("Weekend", pct(stats.weekend_ratio));
    s.row("Commits per month", float(stats.average_per_month));
    if stats.lines.commits_with_line_data > 0 {
        s.row(
            "Lines changed",
            format!(
                "+{} / -{} (ratio {})",
                stats.lines.total_additions,
                stats.lines.total_deletions,
                float(stats.lines.change_ratio)
            ),
        );
        s.row("Mean additions", float(stats.lines.additions.mean));
    }
    s.row("Longest streak", format!("{} days", stats.activity.longest_streak_days));
    s.row("Active days", stats.activity.active_days.to_string());
    s.row("Commits per week", float(stats.activity.commits_per_week));
    s.row("Top authors", ranked(&stats.authors.top));
}

fn contributor_rows(stats: &ContributorStats, s: &mut Section) {
    s.row("Contributors", stats.total_contributors.to_string());
    s.row("Total commits", stats.total_commits.to_string());
    s.row("Mean commits", float(stats.mean_commits));
    s.row("Commits std dev", float(stats.std_commits));
    s.row("Gini coefficient", float(stats.gini));
    s.row(
        "80% of commits from",
        match (stats.pareto.contributors, stats.pareto.population_share) {
            (Some(k), Some(share)) => format!("{k} contributors ({})", pct(Some(share))),
            _ => NOT_AVAILABLE.to_string(),
        },
    );
    s.row("Top 20% share", pct(stats.top_fifth_share));
    let top = stats
        .top_contributors
        .iter()
        .map(|c| format!("{} ({}, {})", c.login, c.commits, pct(c.share)))
        .collect::<Vec<_>>();
    s.row("Top contributors", join_or_na(&top));
    if stats.with_company > 0 {
        s.row("Companies", ranked(&stats.companies));
    }
    if stats.with_location > 0 {
        s.row("Locations", ranked(&stats.locations));
    }
    let age = &stats.account_age;
    if age.known > 0 {
        s.row("Mean account age", days(age.mean_days));
        s.row(
            "Accounts older than a year",
            format!("{} of {}", age.older_than_year, age.known),
        );
    }
}

fn issue_rows(stats: &IssueStats, s: &mut Section) {
    s.row(
        "Issues",
        format!(
            "{} ({} open, {} closed)",
            stats.total_issues, stats.status.open, stats.status.closed
        ),
    );
    s.row("Close rate", pct(stats.close_rate));
    duration_rows("Resolution", &stats.resolution, s);
    s.row("Oldest open issue", hours(stats.open_age.max_hours));
    s.row("Top labels", ranked(&stats.labels));
    s.row("Unlabeled", stats.unlabeled.to_string());
    s.row("Top creators", ranked(&stats.creators.top));
    if !stats.anomalies.is_empty() {
        s.note(format!(
            "{} issues left out of time statistics.",
            stats.anomalies.len()
        ));
    }
}

fn pull_rows(stats: &PullRequestStats, s: &mut Section) {
    s.row(
        "Pull requests",
        format!(
            "{} ({} open, {} merged, {} closed)",
            stats.total_prs, stats.status.open, stats.status.merged, stats.status.closed
        ),
    );
    s.row("Merge rate", pct(stats.merge_rate));
    duration_rows("Merge time", &stats.merge_time, s);
    s.row("Mean reviews", float(stats.reviews.mean_reviews));
    s.row("Review rate", pct(stats.reviews.review_rate));
    let tiers = stats
        .size
        .tiers
        .buckets
        .iter()
        .map(|b| format!("{} {}", b.label, b.count))
        .collect::<Vec<_>>();
    s.row("Size tiers", join_or_na(&tiers));
    s.row("Mean changed lines", float(stats.size.changed_lines.mean));
    s.row("Top authors", ranked(&stats.authors.top));
    if !stats.anomalies.is_empty() {
        s.note(format!(
            "{} pull requests left out of merge-time statistics.",
            stats.anomalies.len()
        ));
    }
}

fn duration_rows(label: &str, stats: &DurationStats, s: &mut Section) {
    s.row(format!("{label} (median)"), hours(stats.median_hours));
    s.row(format!("{label} (mean)"), hours(stats.mean_hours));
    if stats.count > 0 {
        s.row(
            format!("{label} within 24h"),
            format!("{} of {}", stats.within_24_hours, stats.count),
        );
    }
}

fn write_sections(sections: &[Section], format: OutputFormat) -> std::result::Result<String, fmt::Error> {
    let mut out = String::new();
    let markdown = format == OutputFormat::Markdown;

    for (i, section) in sections.iter().enumerate() {
        if markdown {
            let level = if i == 0 { "#" } else { "##" };
            writeln!(out, "{level} {}\n", section.title)?;
            for note in &section.notes {
                writeln!(out, "> {note}\n")?;
            }
            if !section.rows.is_empty() {
                writeln!(out, "| Metric | Value |")?;
                writeln!(out, "|--------|-------|")?;
                for (label, value) in &section.rows {
                    writeln!(out, "| {label} | {} |", value.replace('|', "\\|"))?;
                }
                writeln!(out)?;
            }
        } else {
            writeln!(out, "{}", section.title)?;
            writeln!(out, "{}", "=".repeat(section.title.chars().count()))?;
            for note in &section.notes {
                writeln!(out, "  ! {note}")?;
            }
            let width = section.rows.iter().map(|(l, _)| l.len()).max().unwrap_or(0);
            for (label, value) in &section.rows {
                writeln!(out, "  {label:<width$}  {value}")?;
            }
            writeln!(out)?;
        }
    }
    Ok(out)
}

fn opt_str(value: Option<&str>) -> String {
    value.unwrap_or(NOT_AVAILABLE).to_string()
}

fn opt_num(value: Option<i64>) -> String {
    value.map_or(NOT_AVAILABLE.to_string(), |v| v.to_string())
}

fn float(value: Option<f64>) -> String {
    value.map_or(NOT_AVAILABLE.to_string(), |v| format!("{v:.2}"))
}

fn pct(value: Option<f64>) -> String {
    value.map_or(NOT_AVAILABLE.to_string(), |v| format!("{:.1}%", v * 100.0))
}

fn days(value: Option<f64>) -> String {
    value.map_or(NOT_AVAILABLE.to_string(), |d| format!("{d:.0} days"))
}

/// Hours below two days, days above.
fn hours(value: Option<f64>) -> String {
    match value {
        None => NOT_AVAILABLE.to_string(),
        Some(h) if h < 48.0 => format!("{h:.1}h"),
        Some(h) => format!("{:.1}d", h / 24.0),
    }
}

fn ranked(items: &[RankedCount]) -> String {
    let items: Vec<String> = items
        .iter()
        .take(5)
        .map(|r| format!("{} ({})", r.name, r.count))
        .collect();
    join_or_na(&items)
}

fn join_or_na(items: &[String]) -> String {
    if items.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        items.join(", ")
    }
}
