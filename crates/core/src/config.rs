//! Configuration types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{CoreError, CoreResult, Ticker};

/// How computed index prices are written out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `<unix seconds>, <amount>` per line
    #[default]
    Csv,
    Json,
}

/// Complete process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub ticker: Ticker,
    /// Bucket size of the index and the relevance window of samples
    pub resolution_secs: u64,
    /// Number of simulated exchanges to subscribe to
    pub exchanges: usize,
    pub push_interval_ms: u64,
    /// Upper bound of the artificial network latency added per sample
    pub max_latency_ms: u64,
    pub start_price: String,
    pub output: OutputFormat,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            ticker: Ticker::BTC_USD,
            resolution_secs: 60,
            exchanges: 100,
            push_interval_ms: 5_000,
            max_latency_ms: 3_000,
            start_price: "23270".to_string(),
            output: OutputFormat::Csv,
        }
    }
}

impl IndexConfig {
    pub fn resolution(&self) -> Duration {
        Duration::from_secs(self.resolution_secs)
    }

    pub fn push_interval(&self) -> Duration {
        Duration::from_millis(self.push_interval_ms)
    }

    pub fn max_latency(&self) -> Duration {
        Duration::from_millis(self.max_latency_ms)
    }

    pub fn start_price(&self) -> CoreResult<Decimal> {
        Decimal::from_str_exact(self.start_price.trim()).map_err(|e| {
            CoreError::InvalidConfig(format!("start_price {:?}: {}", self.start_price, e))
        })
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.resolution_secs == 0 {
            return Err(CoreError::InvalidConfig("resolution_secs must be positive".into()));
        }
        if self.exchanges == 0 {
            return Err(CoreError::InvalidConfig("at least one exchange is required".into()));
        }
        self.start_price()?;
        Ok(())
    }
}
