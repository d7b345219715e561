//! Core type definitions

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

use crate::{CoreError, CoreResult};

/// Instrument symbol a sample is quoted for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ticker(Cow<'static, str>);

impl Ticker {
    pub const BTC_USD: Ticker = Ticker(Cow::Borrowed("BTC_USD"));

    pub fn new(symbol: impl Into<String>) -> Self {
        Self(Cow::Owned(symbol.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One timestamped price observation from a feed.
///
/// `observed_at` is assigned by the feed, not by the receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub ticker: Ticker,
    pub observed_at: DateTime<Utc>,
    pub price: Decimal,
}

impl Sample {
    pub fn new(ticker: Ticker, observed_at: DateTime<Utc>, price: Decimal) -> Self {
        Self { ticker, observed_at, price }
    }

    /// Build a sample from a decimal string such as `"13.2345122"`.
    ///
    /// Garbage input is rejected here so it can never reach the averaging
    /// arithmetic disguised as zero.
    pub fn parse(ticker: Ticker, observed_at: DateTime<Utc>, price: &str) -> CoreResult<Self> {
        let price = Decimal::from_str_exact(price.trim()).map_err(|e| CoreError::MalformedPrice {
            input: price.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(ticker, observed_at, price))
    }
}

/// Aggregated index price for one time bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub time: DateTime<Utc>,
    pub amount: Decimal,
}

impl Price {
    pub fn new(time: DateTime<Utc>, amount: Decimal) -> Self {
        Self { time, amount }
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.time.timestamp(), self.amount)
    }
}
