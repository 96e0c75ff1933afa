//! Point-in-time stat records and metric results.
//!
//! Every record is a plain `Copy` value produced by one snapshot call and
//! owned by that call. Counters are cumulative since boot; rates come from
//! the difference of two records (see [`crate::rates`]).

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collector::MetricError;

/// CPU tick counters.
///
/// Source: `/proc/stat` (aggregate `cpu` line) and `/proc/[pid]/stat`.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct CpuStat {
    /// Time spent in user mode, system-wide (ticks).
    /// Source: `/proc/stat` column 1
    pub user: u64,

    /// Time spent in user mode with low priority, system-wide (ticks).
    /// Source: `/proc/stat` column 2
    pub nice: u64,

    /// Time spent in kernel mode, system-wide (ticks).
    /// Source: `/proc/stat` column 3
    pub system: u64,

    /// Idle time, system-wide (ticks).
    /// Source: `/proc/stat` column 4
    pub idle: u64,

    /// Process user time (ticks).
    /// Source: `/proc/[pid]/stat` field 14
    pub utime: u64,

    /// Process kernel time (ticks).
    /// Source: `/proc/[pid]/stat` field 15
    pub stime: u64,

    /// User time of waited-for children (ticks).
    /// Source: `/proc/[pid]/stat` field 16
    pub cutime: u64,

    /// Kernel time of waited-for children (ticks).
    /// Source: `/proc/[pid]/stat` field 17
    pub cstime: u64,
}

impl CpuStat {
    /// Sum of the system-wide counters.
    pub fn system_total(&self) -> u64 {
        self.user
            .saturating_add(self.nice)
            .saturating_add(self.system)
            .saturating_add(self.idle)
    }

    /// Sum of the process counters.
    pub fn process_total(&self) -> u64 {
        self.utime
            .saturating_add(self.stime)
            .saturating_add(self.cutime)
            .saturating_add(self.cstime)
    }

    /// Adds another process's counters to this one.
    ///
    /// System-wide counters are host-wide and are not summed.
    pub fn accumulate(&mut self, other: &CpuStat) {
        self.utime = self.utime.saturating_add(other.utime);
        self.stime = self.stime.saturating_add(other.stime);
        self.cutime = self.cutime.saturating_add(other.cutime);
        self.cstime = self.cstime.saturating_add(other.cstime);
    }
}

/// Memory occupancy.
///
/// Source: `/proc/meminfo` and `/proc/[pid]/status`.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct RamStat {
    /// Total usable RAM (KB).
    /// Source: `/proc/meminfo` MemTotal
    pub total: u64,

    /// RAM available for new allocations without swapping (KB).
    /// Source: `/proc/meminfo` MemAvailable
    pub available: u64,

    /// Process the resident size belongs to; `None` for a system-wide reading.
    pub pid: Option<u32>,

    /// Resident set size (KB).
    /// Source: `/proc/[pid]/status` VmRSS
    pub resident: u64,
}

impl RamStat {
    /// Adds another process's resident size to this one.
    pub fn accumulate(&mut self, other: &RamStat) {
        self.resident = self.resident.saturating_add(other.resident);
    }
}

/// Network byte counters summed over active interfaces.
///
/// Source: `/proc/net/dev` or `/proc/[pid]/net/dev`.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct NetStat {
    /// Bytes received.
    pub received: u64,
    /// Bytes transmitted.
    pub sent: u64,
    pub pid: Option<u32>,
}

impl NetStat {
    pub fn accumulate(&mut self, other: &NetStat) {
        self.received = self.received.saturating_add(other.received);
        self.sent = self.sent.saturating_add(other.sent);
    }
}

/// Block I/O byte counters.
///
/// System-wide: `/proc/diskstats` sectors times the device sector size,
/// summed over non-loopback block devices. Per process: `/proc/[pid]/io`
/// `rchar` / `wchar`.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct BdStat {
    /// Bytes read.
    pub read: u64,
    /// Bytes written.
    pub written: u64,
    pub pid: Option<u32>,
}

impl BdStat {
    pub fn accumulate(&mut self, other: &BdStat) {
        self.read = self.read.saturating_add(other.read);
        self.written = self.written.saturating_add(other.written);
    }
}

/// Kilobytes moved in each direction over one sampling period.
///
/// For network metrics `read_kb` is received (down) and `write_kb` is sent (up).
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct Throughput {
    pub read_kb: u64,
    pub write_kb: u64,
}

impl Throughput {
    /// Normalises the per-period amounts to KB/s.
    ///
    /// A zero period yields the raw amounts.
    pub fn per_second(&self, period: Duration) -> (f64, f64) {
        let secs = period.as_secs_f64();
        if secs <= 0.0 {
            return (self.read_kb as f64, self.write_kb as f64);
        }
        (self.read_kb as f64 / secs, self.write_kb as f64 / secs)
    }
}

/// Every public metric for one target, sampled concurrently.
#[derive(Debug, Clone)]
pub struct Report {
    pub timestamp: DateTime<Utc>,
    pub pid: u32,
    pub period: Duration,
    pub general_cpu: Result<f64, MetricError>,
    pub cpu: Result<f64, MetricError>,
    pub general_ram: Result<f64, MetricError>,
    pub ram: Result<f64, MetricError>,
    pub general_ram_mb: Result<u64, MetricError>,
    pub ram_mb: Result<u64, MetricError>,
    pub general_net: Result<Throughput, MetricError>,
    pub net: Result<Throughput, MetricError>,
    pub general_io: Result<Throughput, MetricError>,
    pub io: Result<Throughput, MetricError>,
}

impl Report {
    /// Errors carried by the report, labelled by metric.
    pub fn errors(&self) -> Vec<(&'static str, &MetricError)> {
        [
            ("general_cpu", self.general_cpu.as_ref().err()),
            ("cpu", self.cpu.as_ref().err()),
            ("general_ram", self.general_ram.as_ref().err()),
            ("ram", self.ram.as_ref().err()),
            ("general_ram_mb", self.general_ram_mb.as_ref().err()),
            ("ram_mb", self.ram_mb.as_ref().err()),
            ("general_net", self.general_net.as_ref().err()),
            ("net", self.net.as_ref().err()),
            ("general_io", self.general_io.as_ref().err()),
            ("io", self.io.as_ref().err()),
        ]
        .into_iter()
        .filter_map(|(name, err)| err.map(|e| (name, e)))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_accumulate_keeps_system_counters() {
        let mut parent = CpuStat {
            user: 100,
            nice: 1,
            system: 50,
            idle: 850,
            utime: 10,
            stime: 5,
            cutime: 1,
            cstime: 2,
        };
        let child = CpuStat {
            user: 101,
            nice: 1,
            system: 51,
            idle: 851,
            utime: 3,
            stime: 4,
            cutime: 0,
            cstime: 0,
        };

        parent.accumulate(&child);

        assert_eq!(parent.user, 100);
        assert_eq!(parent.idle, 850);
        assert_eq!(parent.process_total(), 25);
        assert_eq!(parent.system_total(), 1001);
    }

    #[test]
    fn test_accumulate_saturates() {
        let mut net = NetStat {
            received: u64::MAX - 1,
            sent: 10,
            pid: Some(1000),
        };
        net.accumulate(&NetStat {
            received: 5,
            sent: 5,
            pid: Some(1001),
        });
        assert_eq!(net.received, u64::MAX);
        assert_eq!(net.sent, 15);

        let cpu = CpuStat {
            idle: u64::MAX,
            utime: u64::MAX,
            stime: 1,
            ..Default::default()
        };
        assert_eq!(cpu.system_total(), u64::MAX);
        assert_eq!(cpu.process_total(), u64::MAX);
    }

    #[test]
    fn test_ram_accumulate_sums_resident_only() {
        let mut parent = RamStat {
            total: 8_000_000,
            available: 2_000_000,
            pid: Some(1000),
            resident: 1024,
        };
        parent.accumulate(&RamStat {
            total: 8_000_000,
            available: 1_999_000,
            pid: Some(1001),
            resident: 2048,
        });

        assert_eq!(parent.resident, 3072);
        assert_eq!(parent.available, 2_000_000);
        assert_eq!(parent.pid, Some(1000));
    }

    #[test]
    fn test_throughput_per_second() {
        let t = Throughput {
            read_kb: 100,
            write_kb: 50,
        };
        assert_eq!(t.per_second(Duration::from_secs(2)), (50.0, 25.0));
        assert_eq!(t.per_second(Duration::from_millis(500)), (200.0, 100.0));
        assert_eq!(t.per_second(Duration::ZERO), (100.0, 50.0));
    }

    #[test]
    fn test_report_errors() {
        let report = Report {
            timestamp: Utc::now(),
            pid: 0,
            period: Duration::from_secs(1),
            general_cpu: Ok(12.5),
            cpu: Err(MetricError::DivisionUndefined),
            general_ram: Ok(75.0),
            ram: Ok(75.0),
            general_ram_mb: Ok(5859),
            ram_mb: Ok(5859),
            general_net: Ok(Throughput::default()),
            net: Ok(Throughput::default()),
            general_io: Err(MetricError::CounterRegression),
            io: Ok(Throughput::default()),
        };

        let errors = report.errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].0, "cpu");
        assert_eq!(errors[1], ("general_io", &MetricError::CounterRegression));
    }
}
