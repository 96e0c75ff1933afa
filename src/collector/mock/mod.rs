//! Mock filesystem and device implementations for testing.
//!
//! This module provides `MockFs`, `StaticDevices` and pre-built scenarios for
//! testing collectors without requiring actual Linux `/proc` or `/sys` access.

mod devices;
mod filesystem;
mod scenarios;

pub use devices::StaticDevices;
pub use filesystem::MockFs;
