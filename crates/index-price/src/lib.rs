//! Index price process
//!
//! Wires simulated exchanges into a price aggregator and publishes one index
//! price per resolution period.

pub mod output;
pub mod runner;
pub mod settings;

pub use output::format_price;
pub use runner::subscribe_price_stream;
