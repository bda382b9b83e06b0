//! Core types, configuration, and error handling for repopulse.
//!
//! This crate provides the shared foundation used by the other crates:
//! - [`PulseError`]: unified error type using `thiserror`
//! - [`PulseConfig`]: configuration loaded from `.repopulse.toml`
//! - Record schemas: [`CommitRecord`], [`ContributorRecord`], [`IssueRecord`],
//!   [`PullRequestRecord`], plus [`RecordBatch`] and [`RecordAnomaly`]
//! - Run settings: [`AnalysisOptions`], [`AnalysisWindow`], [`AnalysisLimits`]

mod config;
mod error;
mod records;
mod types;

pub use config::{GitHubConfig, PulseConfig, CONFIG_TEMPLATE};
pub use error::{FetchStage, PulseError};
pub use records::{
    CommitRecord, ContributorRecord, IssueRecord, IssueState, PullRequestRecord,
    PullRequestState, RecordAnomaly, RecordBatch, RepoInfo, RepoName,
};
pub use types::{AnalysisLimits, AnalysisOptions, AnalysisWindow, OutputFormat};

/// A convenience `Result` type for repopulse operations.
pub type Result<T> = std::result::Result<T, PulseError>;
