//! Repository health analysis: commit patterns, contributor concentration,
//! issue resolution, and pull request flow.
//!
//! Analyzers are pure functions over borrowed record slices. [`RepoAnalyzer`]
//! pulls records from a [`RecordCollector`], runs every analyzer, and
//! assembles an [`AnalysisResult`] with per-category outcomes and sampling
//! markers. [`trend::predict`] forecasts the monthly series of a result.

pub mod collector;
pub mod commits;
pub mod contributors;
pub mod issues;
pub mod pulls;
pub mod repo;
pub mod stats;
pub mod trend;

pub use collector::RecordCollector;
pub use repo::{AnalysisResult, CategoryOutcome, CategoryReport, RepoAnalyzer};
