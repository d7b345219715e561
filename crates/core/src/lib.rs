//! Core types and utilities for the index price aggregator
//!
//! This crate provides shared types used across all components:
//! - Price samples and aggregated index prices
//! - Clock abstraction and time bucket truncation
//! - Configuration and error types

pub mod types;
pub mod clock;
pub mod config;
pub mod errors;

pub use types::*;
pub use clock::*;
pub use config::*;
pub use errors::*;
