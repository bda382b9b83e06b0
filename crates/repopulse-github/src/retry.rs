//! Response classification and linear backoff.

use std::time::Duration;

use repopulse_core::GitHubConfig;

/// What to do with an HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Read the body.
    Success,
    /// Treat as "nothing there": not found, no content, or an empty repository.
    Empty,
    /// Transient; try again after backing off.
    Retry,
    /// Give up immediately.
    Fail,
}

/// Classify a response by status code.
///
/// `rate_limited` is true when the rate limit headers show an exhausted
/// budget; only then is a 403 worth retrying.
///
/// # Examples
///
/// ```
/// use repopulse_github::retry::{classify, Disposition};
///
/// assert_eq!(classify(200, false), Disposition::Success);
/// assert_eq!(classify(404, false), Disposition::Empty);
/// assert_eq!(classify(502, false), Disposition::Retry);
/// assert_eq!(classify(403, true), Disposition::Retry);
/// assert_eq!(classify(403, false), Disposition::Fail);
/// ```
pub fn classify(status: u16, rate_limited: bool) -> Disposition {
    match status {
        204 | 404 | 409 => Disposition::Empty,
        200..=299 => Disposition::Success,
        429 => Disposition::Retry,
        403 if rate_limited => Disposition::Retry,
        500..=599 => Disposition::Retry,
        _ => Disposition::Fail,
    }
}

/// How many times to retry and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Wait before retry `n` is `n × base_delay`.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Policy from the `[github]` config table.
    pub fn from_config(config: &GitHubConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    /// Backoff before the given retry (1-based).
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use repopulse_github::retry::RetryPolicy;
    ///
    /// let policy = RetryPolicy { max_retries: 3, base_delay: Duration::from_millis(500) };
    /// assert_eq!(policy.delay(1), Duration::from_millis(500));
    /// assert_eq!(policy.delay(3), Duration::from_millis(1500));
    /// ```
    pub fn delay(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(retry)
    }

    /// Whether retry number `retry` (1-based) is still allowed.
    pub fn allows(&self, retry: u32) -> bool {
        retry <= self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_fail_fast() {
        for status in [400, 401, 422] {
            assert_eq!(classify(status, false), Disposition::Fail);
        }
    }

    #[test]
    fn rate_limited_responses_retry() {
        assert_eq!(classify(429, false), Disposition::Retry);
        assert_eq!(classify(403, true), Disposition::Retry);
    }

    #[test]
    fn empty_repository_is_not_an_error() {
        assert_eq!(classify(409, false), Disposition::Empty);
        assert_eq!(classify(204, false), Disposition::Empty);
    }

    #[test]
    fn budget_follows_config() {
        let config = GitHubConfig {
            max_retries: 2,
            retry_base_delay_ms: 10,
            ..GitHubConfig::default()
        };
        let policy = RetryPolicy::from_config(&config);
        assert!(policy.allows(1));
        assert!(policy.allows(2));
        assert!(!policy.allows(3));
        assert_eq!(policy.delay(2), Duration::from_millis(20));
    }

    #[test]
    fn zero_retries_never_allows() {
        let policy = RetryPolicy {
            max_retries: 0,
            base_delay: Duration::from_secs(1),
        };
        assert!(!policy.allows(1));
    }
}
