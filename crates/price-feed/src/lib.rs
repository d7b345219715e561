//! Rolling index price from many asynchronous price feeds
//!
//! Features:
//! - Two-generation time window with O(1) eviction
//! - Concurrent fan-in of any number of feeds
//! - Exact decimal time-weighted averaging
//! - Cooperative shutdown of every forwarding task

pub mod aggregator;
pub mod feeds;
pub mod shutdown;
pub mod wam;
pub mod window;

pub use aggregator::{AggregatorConfig, AggregatorStats, PriceAggregator, SourceId, SourceStatus};
pub use feeds::{FeedEvent, FeedEvents, PriceFeed, SimulatedExchange, SimulatedExchangeConfig, Termination};
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use wam::{round_amount, weighted_average, PRICE_SCALE};
pub use window::{Admission, StoreStats, WindowedStore};
