//! Retrieval pipeline configuration

use std::time::Duration;

use anyhow::{Result, ensure};
use pubbatch_core::RetryPolicy;

/// Runtime configuration for the retrieval pipeline
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Identifiers requested per search page (and fetched per fetch call)
    pub page_size: usize,
    /// Cap on identifiers considered across the whole run
    pub max_results: usize,
    /// Remote calls per second (search and fetch share the budget)
    pub rate_limit: f64,
    /// Retries after the first attempt of a call
    pub max_retries: u32,
    /// First backoff delay; doubles per retry
    pub backoff_base: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            page_size: 200,
            max_results: 100,
            rate_limit: 3.0,
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.page_size > 0, "page_size must be at least 1");
        ensure!(self.max_results > 0, "max_results must be at least 1");
        ensure!(
            self.rate_limit.is_finite() && self.rate_limit > 0.0,
            "rate_limit must be a positive number of calls per second, got {}",
            self.rate_limit
        );
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: self.backoff_base,
        }
    }
}
