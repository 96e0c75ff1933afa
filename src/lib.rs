//! pidmeter - CPU, memory, network and disk usage sampling for Linux.
//!
//! This library provides:
//! - `collector` - readers for `/proc` and `/sys`, with an in-memory mock
//! - `rates` - conversion of two snapshots into percentages and throughput
//! - `metrics` - the blocking per-metric getters and concurrent reports
//!
//! The `pidmeter` binary prints a report per sampling cycle.

pub mod collector;
pub mod fmt;
pub mod metrics;
pub mod models;
pub mod rates;

pub use metrics::{Metrics, MetricsConfig};
