use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::builder::TypedValueParser;
use clap::{Args, CommandFactory, Parser, Subcommand};
use miette::{IntoDiagnostic, Result, WrapErr};
use tracing_subscriber::EnvFilter;

use repopulse_core::{AnalysisOptions, OutputFormat, PulseConfig, RepoName, CONFIG_TEMPLATE};
use repopulse_engine::trend::{self, DEFAULT_PERIODS};
use repopulse_engine::{AnalysisResult, RecordCollector, RepoAnalyzer};
use repopulse_github::GitHubCollector;

mod render;

const CONFIG_FILE: &str = ".repopulse.toml";

#[derive(Parser)]
#[command(
    name = "repopulse",
    version,
    about = "Repository health analytics for GitHub projects",
    long_about = "repopulse measures how a repository is doing: when people commit, how\n\
                   concentrated contributions are, and how fast issues and pull requests move.\n\n\
                   Examples:\n  \
                     repopulse analyze rust-lang/rust              Analyze the last 365 days\n  \
                     repopulse analyze tokio-rs/tokio --days 90    Analyze a shorter window\n  \
                     repopulse analyze owner/repo --format json    Machine-readable output\n  \
                     repopulse predict owner/repo --periods 3      Forecast monthly activity\n  \
                     repopulse info owner/repo                     Show repository metadata\n  \
                     repopulse rate-limit                          Show the remaining API budget"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (default: .repopulse.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable summaries (default)\n  \
                         json      Machine-readable JSON with snake_case keys\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze commits, contributors, issues and pull requests of a repository
    #[command(long_about = "Analyze commits, contributors, issues and pull requests.\n\n\
        Fetches up to the configured number of records per category inside the\n\
        window and reports distributions, concentration and flow statistics.\n\
        Categories that hit their limit are marked as sampled.\n\n\
        Examples:\n  repopulse analyze octocat/hello-world\n  \
        repopulse analyze owner/repo --days 30 --no-prs\n  \
        repopulse analyze owner/repo --format markdown --output PULSE.md")]
    Analyze(AnalyzeArgs),
    /// Forecast monthly commit and issue activity
    #[command(long_about = "Forecast monthly commit and issue activity.\n\n\
        Runs the same analysis as `analyze`, then fits a trend to the monthly\n\
        series, forecasts the coming months, and flags unusual months,\n\
        level shifts and seasonal peaks.\n\n\
        Examples:\n  repopulse predict octocat/hello-world\n  \
        repopulse predict owner/repo --days 730 --periods 12 --format json")]
    Predict {
        #[command(flatten)]
        analysis: AnalyzeArgs,

        /// Months to forecast
        #[arg(
            long,
            default_value_t = DEFAULT_PERIODS,
            value_parser = clap::value_parser!(u64).range(1..=24).map(|n| n as usize)
        )]
        periods: usize,
    },
    /// Show repository metadata
    Info {
        /// Repository as owner/name
        repo: String,
    },
    /// Show the remaining GitHub API budget
    RateLimit,
    /// Create a default .repopulse.toml configuration file
    #[command(long_about = "Create a default .repopulse.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .repopulse.toml already exists.")]
    Init,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Args, Debug, Default)]
struct AnalyzeArgs {
    /// Repository as owner/name
    repo: String,

    /// Window length in days (default: 365)
    #[arg(long)]
    days: Option<u32>,

    /// Maximum commits to analyze (default: 1000)
    #[arg(long)]
    max_commits: Option<usize>,

    /// Maximum contributors to analyze (default: 100)
    #[arg(long)]
    max_contributors: Option<usize>,

    /// Maximum issues to analyze (default: 500)
    #[arg(long)]
    max_issues: Option<usize>,

    /// Maximum pull requests to analyze (default: 300)
    #[arg(long)]
    max_prs: Option<usize>,

    /// Entries shown in rankings (default: 10)
    #[arg(long)]
    top: Option<usize>,

    /// Skip issue analysis
    #[arg(long)]
    no_issues: bool,

    /// Skip pull request analysis
    #[arg(long)]
    no_prs: bool,

    /// Fail instead of reporting a category whose fetch failed
    #[arg(long)]
    require_all: bool,

    /// Write the report to a file instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,
}

impl AnalyzeArgs {
    /// Layer command-line flags over the configured options.
    fn apply(&self, mut options: AnalysisOptions) -> AnalysisOptions {
        if let Some(days) = self.days {
            options.days = days;
        }
        if let Some(n) = self.max_commits {
            options.max_commits = n;
        }
        if let Some(n) = self.max_contributors {
            options.max_contributors = n;
        }
        if let Some(n) = self.max_issues {
            options.max_issues = n;
        }
        if let Some(n) = self.max_prs {
            options.max_prs = n;
        }
        if let Some(n) = self.top {
            options.top_n = n;
        }
        if self.no_issues {
            options.analyze_issues = false;
        }
        if self.no_prs {
            options.analyze_prs = false;
        }
        if self.require_all {
            options.require_all_categories = true;
        }
        options
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<PulseConfig> {
    match path {
        Some(path) => PulseConfig::from_file(path)
            .into_diagnostic()
            .wrap_err(format!("reading {}", path.display())),
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                PulseConfig::from_file(default_path)
                    .into_diagnostic()
                    .wrap_err(format!("reading {CONFIG_FILE}"))
            } else {
                Ok(PulseConfig::default())
            }
        }
    }
}

fn spinner(message: &str) -> Option<indicatif::ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return None;
    }
    let pb = indicatif::ProgressBar::new_spinner();
    if let Ok(style) = indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
    {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    Some(pb)
}

/// Run a full analysis against GitHub with a spinner on stderr.
async fn run_analysis(config: &PulseConfig, args: &AnalyzeArgs) -> Result<AnalysisResult> {
    let options = args.apply(config.analysis.clone());
    options.validate().into_diagnostic()?;

    let collector = GitHubCollector::new(&config.github).into_diagnostic()?;
    if !collector.is_authenticated() {
        tracing::warn!("no GitHub token found; unauthenticated requests are heavily rate limited");
    }
    let analyzer = RepoAnalyzer::new(collector);

    let pb = spinner(&format!("Analyzing {}...", args.repo));
    let result = analyzer.full_analysis(&args.repo, &options).await;
    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }
    let result = result.into_diagnostic()?;

    for stage in result.failed_stages() {
        tracing::warn!(%stage, "category could not be fetched");
    }
    Ok(result)
}

fn emit(output: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, output)
                .into_diagnostic()
                .wrap_err(format!("writing {}", path.display()))?;
            eprintln!("Wrote report to {}", path.display());
        }
        None => print!("{output}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Analyze(ref args) => {
            let result = run_analysis(&config, args).await?;
            let output = render::render_analysis(&result, cli.format)?;
            emit(&output, args.output.as_deref())?;
        }
        Command::Predict {
            ref analysis,
            periods,
        } => {
            let result = run_analysis(&config, analysis).await?;
            let report = trend::predict(&result, periods);
            let output = render::render_trends(&report, cli.format)?;
            emit(&output, analysis.output.as_deref())?;
        }
        Command::Info { ref repo } => {
            let name = RepoName::parse(repo).into_diagnostic()?;
            let collector = GitHubCollector::new(&config.github).into_diagnostic()?;
            let Some(info) = collector.repository(&name).await.into_diagnostic()? else {
                miette::bail!("repository {name} was not found");
            };
            print!("{}", render::render_repo_info(&info, cli.format)?);
        }
        Command::RateLimit => {
            let collector = GitHubCollector::new(&config.github).into_diagnostic()?;
            let limits = collector.rate_limit().await.into_diagnostic()?;
            print!("{}", render::render_rate_limits(&limits, cli.format)?);
        }
        Command::Init => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, CONFIG_TEMPLATE).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "repopulse", &mut std::io::stdout());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let args = AnalyzeArgs {
            repo: "o/r".into(),
            days: Some(30),
            max_prs: Some(5),
            no_issues: true,
            require_all: true,
            ..AnalyzeArgs::default()
        };
        let config = AnalysisOptions {
            days: 90,
            max_commits: 42,
            ..AnalysisOptions::default()
        };
        let options = args.apply(config);
        assert_eq!(options.days, 30);
        assert_eq!(options.max_commits, 42);
        assert_eq!(options.max_prs, 5);
        assert!(!options.analyze_issues);
        assert!(options.analyze_prs);
        assert!(options.require_all_categories);
    }

    #[test]
    fn cli_parses_analyze_flags() {
        let cli = Cli::try_parse_from([
            "repopulse",
            "analyze",
            "octocat/hello-world",
            "--days",
            "14",
            "--no-prs",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Command::Analyze(args) => {
                assert_eq!(args.repo, "octocat/hello-world");
                assert_eq!(args.days, Some(14));
                assert!(args.no_prs);
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn predict_shares_analysis_flags() {
        let cli = Cli::try_parse_from([
            "repopulse",
            "predict",
            "octocat/hello-world",
            "--days",
            "730",
            "--periods",
            "12",
        ])
        .unwrap();
        match cli.command {
            Command::Predict { analysis, periods } => {
                assert_eq!(analysis.repo, "octocat/hello-world");
                assert_eq!(analysis.days, Some(730));
                assert_eq!(periods, 12);
            }
            _ => panic!("expected predict"),
        }
    }

    #[test]
    fn predict_periods_are_bounded() {
        let parsed = Cli::try_parse_from(["repopulse", "predict", "o/r"]).unwrap();
        assert!(matches!(parsed.command, Command::Predict { periods: 6, .. }));
        assert!(Cli::try_parse_from(["repopulse", "predict", "o/r", "--periods", "0"]).is_err());
        assert!(Cli::try_parse_from(["repopulse", "predict", "o/r", "--periods", "25"]).is_err());
    }

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }
}
