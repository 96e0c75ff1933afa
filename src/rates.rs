//! Delta computation over two snapshots of the same kind.
//!
//! Every function here is pure: it takes a `before` and an `after` record and
//! returns a percentage or a throughput, or the reason none can be computed.
//! Counters are `u64` throughout so long sampling periods cannot overflow the
//! accumulators; only the final result is narrowed.

use crate::collector::MetricError;
use crate::models::{BdStat, CpuStat, NetStat, RamStat, Throughput};

// ---------------------------------------------------------------------------
// Delta helpers
// ---------------------------------------------------------------------------

/// Compute u64 delta, returning `None` on counter regression (reset or wraparound).
pub fn du64(curr: u64, prev: u64) -> Option<u64> {
    curr.checked_sub(prev)
}

fn delta(curr: u64, prev: u64) -> Result<u64, MetricError> {
    du64(curr, prev).ok_or(MetricError::CounterRegression)
}

/// Floor conversion from bytes to kilobytes.
pub fn bytes_to_kb(bytes: u64) -> u64 {
    bytes / 1024
}

/// Floor conversion from kilobytes to megabytes.
pub fn kb_to_mb(kb: u64) -> u64 {
    kb >> 10
}

/// Converts a sector count to bytes for a device with the given sector size.
pub fn sectors_to_bytes(sectors: u64, sector_size: u64) -> u64 {
    sectors.saturating_mul(sector_size)
}

// ---------------------------------------------------------------------------
// CPU
// ---------------------------------------------------------------------------

/// System-wide CPU usage in percent.
///
/// `used = Δuser + Δnice + Δsystem`, `total = used + Δidle`.
/// Any counter that went backwards yields [`MetricError::CounterRegression`];
/// no elapsed ticks yields [`MetricError::DivisionUndefined`].
pub fn cpu_percent(before: &CpuStat, after: &CpuStat) -> Result<f64, MetricError> {
    let user = delta(after.user, before.user)?;
    let nice = delta(after.nice, before.nice)?;
    let system = delta(after.system, before.system)?;
    let idle = delta(after.idle, before.idle)?;

    let used = user.saturating_add(nice).saturating_add(system);
    let total = used.saturating_add(idle);
    if total == 0 {
        return Err(MetricError::DivisionUndefined);
    }

    Ok(used as f64 * 100.0 / total as f64)
}

/// Process CPU usage in percent of all system ticks elapsed.
///
/// `usedProc` is the change in `utime + stime + cutime + cstime`, `usedTotal`
/// the change in `user + nice + system + idle`. Each counter is checked on
/// its own, so one that went backwards cannot hide behind the others.
pub fn process_cpu_percent(before: &CpuStat, after: &CpuStat) -> Result<f64, MetricError> {
    let used_proc = [
        delta(after.utime, before.utime)?,
        delta(after.stime, before.stime)?,
        delta(after.cutime, before.cutime)?,
        delta(after.cstime, before.cstime)?,
    ]
    .into_iter()
    .fold(0u64, u64::saturating_add);
    let used_total = [
        delta(after.user, before.user)?,
        delta(after.nice, before.nice)?,
        delta(after.system, before.system)?,
        delta(after.idle, before.idle)?,
    ]
    .into_iter()
    .fold(0u64, u64::saturating_add);
    if used_total == 0 {
        return Err(MetricError::DivisionUndefined);
    }

    Ok(used_proc as f64 * 100.0 / used_total as f64)
}

// ---------------------------------------------------------------------------
// RAM
// ---------------------------------------------------------------------------

/// Occupied memory in KB: the resident size for a process reading,
/// `total - available` for a system-wide one.
pub fn ram_occupied(stat: &RamStat) -> u64 {
    match stat.pid {
        Some(_) => stat.resident,
        None => stat.total.saturating_sub(stat.available),
    }
}

/// Occupied memory as a percentage of total RAM.
pub fn ram_percent(stat: &RamStat) -> Result<f64, MetricError> {
    if stat.total == 0 {
        return Err(MetricError::DivisionUndefined);
    }
    Ok(ram_occupied(stat) as f64 * 100.0 / stat.total as f64)
}

/// Occupied memory in MB (floor).
pub fn ram_megabytes(stat: &RamStat) -> u64 {
    kb_to_mb(ram_occupied(stat))
}

// ---------------------------------------------------------------------------
// Network and block I/O
// ---------------------------------------------------------------------------

/// Kilobytes received and sent between two network snapshots.
pub fn net_delta(before: &NetStat, after: &NetStat) -> Result<Throughput, MetricError> {
    Ok(Throughput {
        read_kb: bytes_to_kb(delta(after.received, before.received)?),
        write_kb: bytes_to_kb(delta(after.sent, before.sent)?),
    })
}

/// Kilobytes read and written between two block I/O snapshots.
pub fn io_delta(before: &BdStat, after: &BdStat) -> Result<Throughput, MetricError> {
    Ok(Throughput {
        read_kb: bytes_to_kb(delta(after.read, before.read)?),
        write_kb: bytes_to_kb(delta(after.written, before.written)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu(user: u64, nice: u64, system: u64, idle: u64) -> CpuStat {
        CpuStat {
            user,
            nice,
            system,
            idle,
            ..Default::default()
        }
    }

    #[test]
    fn test_du64() {
        assert_eq!(du64(30, 10), Some(20));
        assert_eq!(du64(10, 10), Some(0));
        assert_eq!(du64(5, 10), None);
    }

    #[test]
    fn test_cpu_percent_scenario() {
        let before = cpu(100, 0, 50, 850);
        let after = cpu(150, 0, 70, 880);
        // used = 50 + 0 + 20 = 70, total = 70 + 30 = 100
        assert_eq!(cpu_percent(&before, &after).unwrap(), 70.0);
    }

    #[test]
    fn test_cpu_percent_bounds() {
        let before = cpu(1000, 10, 500, 5000);
        let cases = [
            cpu(1000, 10, 500, 5100),
            cpu(1100, 10, 500, 5000),
            cpu(1050, 20, 530, 5200),
            cpu(u64::MAX / 4, 10, 500, 5000),
        ];
        for after in cases {
            let pct = cpu_percent(&before, &after).unwrap();
            assert!((0.0..=100.0).contains(&pct), "{pct} out of range");
        }
    }

    #[test]
    fn test_cpu_percent_regression() {
        let before = cpu(100, 0, 50, 850);
        for after in [
            cpu(99, 0, 70, 880),
            cpu(150, 0, 49, 880),
            cpu(150, 0, 70, 849),
        ] {
            assert_eq!(
                cpu_percent(&before, &after),
                Err(MetricError::CounterRegression)
            );
        }
        let niced = cpu(100, 5, 50, 850);
        assert_eq!(
            cpu_percent(&niced, &before),
            Err(MetricError::CounterRegression)
        );
    }

    #[test]
    fn test_cpu_percent_no_elapsed_ticks() {
        let snap = cpu(100, 0, 50, 850);
        assert_eq!(
            cpu_percent(&snap, &snap),
            Err(MetricError::DivisionUndefined)
        );
    }

    #[test]
    fn test_process_cpu_percent() {
        let before = CpuStat {
            utime: 10,
            stime: 5,
            ..cpu(100, 0, 50, 850)
        };
        let after = CpuStat {
            utime: 30,
            stime: 15,
            cutime: 5,
            cstime: 0,
            ..cpu(150, 0, 70, 880)
        };
        // usedProc = 50 - 15 = 35, usedTotal = 1100 - 1000 = 100
        assert_eq!(process_cpu_percent(&before, &after).unwrap(), 35.0);
    }

    #[test]
    fn test_process_cpu_percent_guards() {
        let snap = CpuStat {
            utime: 10,
            ..cpu(100, 0, 50, 850)
        };
        assert_eq!(
            process_cpu_percent(&snap, &snap),
            Err(MetricError::DivisionUndefined)
        );

        let reset = CpuStat {
            utime: 0,
            ..cpu(150, 0, 70, 880)
        };
        assert_eq!(
            process_cpu_percent(&snap, &reset),
            Err(MetricError::CounterRegression)
        );
    }

    #[test]
    fn test_process_cpu_percent_single_field_regression() {
        let before = CpuStat {
            utime: 10,
            stime: 5,
            ..cpu(100, 0, 50, 850)
        };

        // stime drops while the process sum still grows
        let after = CpuStat {
            utime: 30,
            stime: 2,
            ..cpu(150, 0, 70, 880)
        };
        assert_eq!(
            process_cpu_percent(&before, &after),
            Err(MetricError::CounterRegression)
        );

        // idle drops while the system sum still grows
        let after = CpuStat {
            utime: 30,
            stime: 15,
            ..cpu(200, 0, 70, 840)
        };
        assert_eq!(
            process_cpu_percent(&before, &after),
            Err(MetricError::CounterRegression)
        );
    }

    #[test]
    fn test_ram_percent_scenario() {
        let stat = RamStat {
            total: 8_000_000,
            available: 2_000_000,
            pid: None,
            resident: 0,
        };
        assert_eq!(ram_percent(&stat).unwrap(), 75.0);
        assert_eq!(ram_megabytes(&stat), 6_000_000 >> 10);
    }

    #[test]
    fn test_ram_process_uses_resident() {
        let stat = RamStat {
            total: 8_000_000,
            available: 2_000_000,
            pid: Some(1000),
            resident: 800_000,
        };
        assert_eq!(ram_occupied(&stat), 800_000);
        assert_eq!(ram_percent(&stat).unwrap(), 10.0);
    }

    #[test]
    fn test_ram_percent_zero_total() {
        assert_eq!(
            ram_percent(&RamStat::default()),
            Err(MetricError::DivisionUndefined)
        );
    }

    #[test]
    fn test_kb_to_mb_floors() {
        assert_eq!(kb_to_mb(2047), 1);
        assert_eq!(kb_to_mb(2048), 2);
        assert_eq!(kb_to_mb(1023), 0);
    }

    #[test]
    fn test_block_device_scenario() {
        let before = BdStat {
            read: sectors_to_bytes(10, 512),
            written: 0,
            pid: None,
        };
        let after = BdStat {
            read: sectors_to_bytes(30, 512),
            written: 0,
            pid: None,
        };
        let t = io_delta(&before, &after).unwrap();
        assert_eq!(t.read_kb, 10);
        assert_eq!(t.write_kb, 0);
    }

    #[test]
    fn test_net_delta_floors_and_detects_reset() {
        let before = NetStat {
            received: 1000,
            sent: 5000,
            pid: None,
        };
        let after = NetStat {
            received: 3047,
            sent: 5000,
            pid: None,
        };
        assert_eq!(
            net_delta(&before, &after).unwrap(),
            Throughput {
                read_kb: 1,
                write_kb: 0
            }
        );
        assert_eq!(
            net_delta(&after, &before),
            Err(MetricError::CounterRegression)
        );
    }

    #[test]
    fn test_deltas_commute_with_aggregation() {
        let children = [
            (
                BdStat {
                    read: 4096,
                    written: 0,
                    pid: Some(10),
                },
                BdStat {
                    read: 8192,
                    written: 2048,
                    pid: Some(10),
                },
            ),
            (
                BdStat {
                    read: 1024,
                    written: 1024,
                    pid: Some(11),
                },
                BdStat {
                    read: 3072,
                    written: 1024,
                    pid: Some(11),
                },
            ),
            (
                BdStat {
                    read: 0,
                    written: 0,
                    pid: Some(12),
                },
                BdStat {
                    read: 1024,
                    written: 1024,
                    pid: Some(12),
                },
            ),
        ];

        let mut summed_deltas = Throughput::default();
        let mut before_total = BdStat::default();
        let mut after_total = BdStat::default();
        for (before, after) in &children {
            let d = io_delta(before, after).unwrap();
            summed_deltas.read_kb += d.read_kb;
            summed_deltas.write_kb += d.write_kb;
            before_total.accumulate(before);
            after_total.accumulate(after);
        }

        assert_eq!(io_delta(&before_total, &after_total).unwrap(), summed_deltas);
        assert_eq!(
            summed_deltas,
            Throughput {
                read_kb: 7,
                write_kb: 3
            }
        );
    }
}
