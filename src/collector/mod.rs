//! Usage sampling from the Linux `/proc` and `/sys` filesystems.
//!
//! This module provides the readers that turn pseudo-files into typed stat
//! records, with support for mocking so tests run anywhere.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SnapshotCollector                       │
//! │  ┌─────────────────────┐   ┌─────────────────────────────┐  │
//! │  │  FieldSet           │   │     DeviceEnv               │  │
//! │  │  - /proc/stat       │   │  - /sys/class/net/*/flags   │  │
//! │  │  - /proc/[pid]/*    │   │  - /sys/block/*             │  │
//! │  │  - /proc/net/dev    │   └──────────────┬──────────────┘  │
//! │  │  - /proc/diskstats  │                  │                 │
//! │  └──────────┬──────────┘                  │                 │
//! │             └──────────────┬──────────────┘                 │
//! │                            │                                │
//! │                     ┌──────▼──────┐                         │
//! │                     │  FileSystem │ (trait)                 │
//! │                     └──────┬──────┘                         │
//! └────────────────────────────┼────────────────────────────────┘
//!                              │
//!              ┌───────────────┼───────────────┐
//!              │               │               │
//!       ┌──────▼──────┐ ┌──────▼──────┐ ┌──────▼──────┐
//!       │   RealFs    │ │   MockFs    │ │  Scenarios  │
//!       │ (Linux)     │ │ (Testing)   │ │ (Fixtures)  │
//!       └─────────────┘ └─────────────┘ └─────────────┘
//! ```
//!
//! # Usage
//!
//! ## Production (Linux)
//!
//! ```ignore
//! use pidmeter::collector::{RealFs, SnapshotCollector, SysfsDevices};
//!
//! let devices = SysfsDevices::new(RealFs::new(), "/sys");
//! let collector = SnapshotCollector::new(&RealFs::new(), &devices, "/proc".as_ref());
//! let cpu = collector.cpu_snapshot(0).unwrap();
//! ```
//!
//! ## Testing (with MockFs)
//!
//! ```
//! use std::path::Path;
//! use pidmeter::collector::{MockFs, SnapshotCollector, SysfsDevices};
//!
//! let fs = MockFs::typical_system();
//! let devices = SysfsDevices::new(fs.clone(), "/sys");
//! let collector = SnapshotCollector::new(&fs, &devices, Path::new("/proc"));
//! let ram = collector.ram_snapshot(0).unwrap();
//! assert_eq!(ram.total, 8_000_000);
//! ```

pub mod devices;
pub mod error;
pub mod mock;
pub mod procfs;
pub mod snapshot;
pub mod traits;

pub use devices::{DeviceEnv, SysfsDevices};
pub use error::MetricError;
pub use mock::{MockFs, StaticDevices};
pub use procfs::{Field, FieldSet, FieldSource, ProcessTree, ReadError, TreeDepth};
pub use snapshot::SnapshotCollector;
pub use traits::{FileSystem, RealFs};
