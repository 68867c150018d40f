use std::time::Duration;

use chrono::NaiveDate;
use regex::{Regex, RegexBuilder};
use thiserror::Error;
use url::Url;

use crate::fetch::RetryPolicy;

pub const DEFAULT_LISTING_URL: &str = "http://austintexas.gov/department/news/296";
pub const DEFAULT_LINK_PATTERN: &str = "traffic-fatality";
pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("from date {from} is after to date {to}")]
    InvertedRange { from: NaiveDate, to: NaiveDate },
    #[error("max attempts must be at least 1")]
    ZeroAttempts,
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("backoff multiplier must be a finite number > 1 (got {0})")]
    InvalidMultiplier(f64),
    #[error("attempt timeout must be positive")]
    ZeroTimeout,
    #[error("max pages must be at least 1 when set")]
    ZeroMaxPages,
    #[error("listing url must be http or https: {0}")]
    UnsupportedScheme(Url),
    #[error("invalid link pattern {pattern:?}")]
    InvalidLinkPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Everything one retrieval run needs.
#[derive(Debug, Clone)]
pub struct RetrieveConfig {
    pub listing_url: Url,
    /// Case-insensitive regex matched against each listing anchor's href and text.
    pub link_pattern: String,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub max_pages: Option<u32>,
    pub max_concurrent_fetches: usize,
    /// Emit results in discovery order instead of completion order.
    pub ordered: bool,
    pub retry: RetryPolicy,
    /// Resolves two-digit years and bounds plausible dates of birth.
    pub reference_date: NaiveDate,
}

impl RetrieveConfig {
    pub fn new(listing_url: Url) -> Self {
        Self {
            listing_url,
            link_pattern: DEFAULT_LINK_PATTERN.to_string(),
            from_date: None,
            to_date: None,
            max_pages: None,
            max_concurrent_fetches: DEFAULT_CONCURRENCY,
            ordered: false,
            retry: RetryPolicy::default(),
            reference_date: chrono::Local::now().date_naive(),
        }
    }

    /// Checks the invariants and compiles the link pattern.
    pub fn validate(&self) -> Result<Regex, ConfigError> {
        if let (Some(from), Some(to)) = (self.from_date, self.to_date)
            && from > to
        {
            return Err(ConfigError::InvertedRange { from, to });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.max_concurrent_fetches == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier <= 1.0 {
            return Err(ConfigError::InvalidMultiplier(self.retry.multiplier));
        }
        if self.retry.attempt_timeout == Duration::ZERO {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.max_pages == Some(0) {
            return Err(ConfigError::ZeroMaxPages);
        }
        if !matches!(self.listing_url.scheme(), "http" | "https") {
            return Err(ConfigError::UnsupportedScheme(self.listing_url.clone()));
        }
        RegexBuilder::new(&self.link_pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| ConfigError::InvalidLinkPattern {
                pattern: self.link_pattern.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RetrieveConfig {
        RetrieveConfig::new(Url::parse(DEFAULT_LISTING_URL).unwrap())
    }

    #[test]
    fn defaults_are_valid() {
        let config = config();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_backoff, Duration::from_secs(3));
        assert_eq!(config.max_concurrent_fetches, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_inverted_range() {
        let mut config = config();
        config.from_date = NaiveDate::from_ymd_opt(2020, 2, 1);
        config.to_date = NaiveDate::from_ymd_opt(2020, 1, 31);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvertedRange { .. })
        ));
    }

    #[test]
    fn rejects_degenerate_settings() {
        let mut zero_attempts = config();
        zero_attempts.retry.max_attempts = 0;
        assert!(matches!(zero_attempts.validate(), Err(ConfigError::ZeroAttempts)));

        let mut zero_concurrency = config();
        zero_concurrency.max_concurrent_fetches = 0;
        assert!(matches!(
            zero_concurrency.validate(),
            Err(ConfigError::ZeroConcurrency)
        ));

        for multiplier in [0.5, 1.0, f64::NAN] {
            let mut flat = config();
            flat.retry.multiplier = multiplier;
            assert!(matches!(
                flat.validate(),
                Err(ConfigError::InvalidMultiplier(_))
            ));
        }

        let mut no_pages = config();
        no_pages.max_pages = Some(0);
        assert!(matches!(no_pages.validate(), Err(ConfigError::ZeroMaxPages)));

        let mut ftp = config();
        ftp.listing_url = Url::parse("ftp://example.test/news").unwrap();
        assert!(matches!(
            ftp.validate(),
            Err(ConfigError::UnsupportedScheme(_))
        ));

        let mut bad_pattern = config();
        bad_pattern.link_pattern = "(".to_string();
        assert!(matches!(
            bad_pattern.validate(),
            Err(ConfigError::InvalidLinkPattern { .. })
        ));
    }
}
