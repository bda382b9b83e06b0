use std::process::Command;

use repopulse_core::{AnalysisOptions, GitHubConfig, PulseConfig};

fn init_in(dir: &std::path::Path) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_repopulse"))
        .arg("init")
        .current_dir(dir)
        .env("NO_COLOR", "1")
        .output()
        .unwrap()
}

/// Uncomments every `# key = value` line, dropping trailing notes and the token placeholder.
fn uncommented(template: &str) -> String {
    template
        .lines()
        .map(|line| match line.strip_prefix("# ") {
            Some(setting) if setting.contains(" = ") && !setting.starts_with("token") => {
                setting.split("  #").next().unwrap_or(setting).trim_end().to_string()
            }
            _ => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn init_writes_a_config_that_loads_as_defaults() {
    let dir = tempfile::tempdir().unwrap();

    let output = init_in(dir.path());
    assert!(output.status.success(), "repopulse init failed: {}", String::from_utf8_lossy(&output.stderr));

    let content = std::fs::read_to_string(dir.path().join(".repopulse.toml")).unwrap();
    let config: PulseConfig = toml::from_str(&content).unwrap();
    assert_eq!(config.analysis, AnalysisOptions::default());
    assert!(config.github.token.is_none(), "template must not ship a token");
}

#[test]
fn documented_values_match_the_real_defaults() {
    let dir = tempfile::tempdir().unwrap();
    assert!(init_in(dir.path()).status.success());

    let content = std::fs::read_to_string(dir.path().join(".repopulse.toml")).unwrap();
    let enabled = uncommented(&content);
    assert!(enabled.contains("\nretry_base_delay_ms = 1000"), "unexpected template:\n{enabled}");

    let config: PulseConfig = toml::from_str(&enabled).unwrap();
    assert_eq!(config.analysis, AnalysisOptions::default());

    let github = config.github;
    let defaults = GitHubConfig::default();
    assert_eq!(github.token, None);
    assert_eq!(github.base_url, defaults.base_url);
    assert_eq!(github.max_retries, defaults.max_retries);
    assert_eq!(github.retry_base_delay_ms, defaults.retry_base_delay_ms);
    assert_eq!(github.commit_line_stats, defaults.commit_line_stats);
    assert_eq!(github.contributor_profiles, defaults.contributor_profiles);
    assert_eq!(github.count_reviews, defaults.count_reviews);
}

#[test]
fn init_leaves_an_existing_config_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".repopulse.toml");
    std::fs::write(&path, "[analysis]\ndays = 30\n").unwrap();

    let output = init_in(dir.path());

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("already exists"), "unexpected stderr: {stderr}");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "[analysis]\ndays = 30\n");
}
