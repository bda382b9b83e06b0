//! GitHub REST collector for repopulse.
//!
//! [`GitHubCollector`] implements [`repopulse_engine::RecordCollector`]:
//! it pages through the commit, contributor, issue and pull request
//! listings, retries transient failures with linear backoff, and converts
//! raw payloads into typed records. Payloads that fail conversion are
//! reported as anomalies instead of aborting the fetch.

mod client;
pub mod models;
pub mod retry;

pub use client::{GitHubCollector, PER_PAGE};
pub use models::{RateLimitStatus, RateLimits};
