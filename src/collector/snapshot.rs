//! Assembles typed stat records from `/proc` pseudo-files.
//!
//! `pid == 0` selects the system-wide reading; any other pid selects that
//! process. A file that vanishes under a process-specific read is reported as
//! [`MetricError::ProcessGone`] so the aggregation step can drop the process.

use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::collector::devices::DeviceEnv;
use crate::collector::error::MetricError;
use crate::collector::procfs::fields::{Field, FieldSet, FieldSource, ReadError};
use crate::collector::traits::FileSystem;
use crate::models::{BdStat, CpuStat, NetStat, RamStat};
use crate::rates::sectors_to_bytes;

/// Reads one snapshot of each metric family.
pub struct SnapshotCollector<'a, F: FileSystem + ?Sized, D: DeviceEnv + ?Sized> {
    fs: &'a F,
    devices: &'a D,
    proc_path: &'a Path,
}

impl<'a, F: FileSystem + ?Sized, D: DeviceEnv + ?Sized> SnapshotCollector<'a, F, D> {
    pub fn new(fs: &'a F, devices: &'a D, proc_path: &'a Path) -> Self {
        Self {
            fs,
            devices,
            proc_path,
        }
    }

    /// CPU ticks: system counters always, process counters when `pid != 0`.
    pub fn cpu_snapshot(&self, pid: u32) -> Result<CpuStat, MetricError> {
        let system = self.read(FieldSource::SystemStat)?;
        let mut stat = CpuStat {
            user: system.u64_at(Field::User)?,
            nice: system.u64_at(Field::Nice)?,
            system: system.u64_at(Field::System)?,
            idle: system.u64_at(Field::Idle)?,
            ..Default::default()
        };

        if pid != 0 {
            let process = self.read_process(pid, FieldSource::ProcessStat(pid))?;
            stat.utime = process.u64_at(Field::Utime)?;
            stat.stime = process.u64_at(Field::Stime)?;
            stat.cutime = process.u64_at(Field::Cutime)?;
            stat.cstime = process.u64_at(Field::Cstime)?;
        }

        trace!(pid, ?stat, "cpu snapshot");
        Ok(stat)
    }

    /// Memory: total/available always, resident size when `pid != 0`.
    ///
    /// Kernel threads have no `VmRSS` line and report zero resident memory.
    pub fn ram_snapshot(&self, pid: u32) -> Result<RamStat, MetricError> {
        let meminfo = self.read(FieldSource::MemInfo)?;
        let total = meminfo.u64_at(Field::MemTotal)?;
        let available = meminfo.u64_at(Field::MemAvailable)?.min(total);
        let mut stat = RamStat {
            total,
            available,
            pid: None,
            resident: 0,
        };

        if pid != 0 {
            let status = self.read_process(pid, FieldSource::ProcessStatus(pid))?;
            stat.pid = Some(pid);
            stat.resident = match status.u64_at(Field::VmRss) {
                Ok(kb) => kb,
                Err(ReadError::OutOfRange { len: 0, .. }) => 0,
                Err(e) => return Err(e.into()),
            };
        }

        trace!(pid, ?stat, "ram snapshot");
        Ok(stat)
    }

    /// Network bytes summed over the interfaces that are up right now.
    ///
    /// With `pid != 0` the counters come from `/proc/[pid]/net/dev`, the view
    /// of that process's network namespace. `/sys/class/net` only describes
    /// our own namespace, so a foreign namespace keeps every interface except
    /// loopback.
    pub fn net_snapshot(&self, pid: u32) -> Result<NetStat, MetricError> {
        let interfaces = if pid == 0 || self.shares_netns(pid) {
            Some(self.devices.active_interfaces()?)
        } else {
            None
        };
        let keep = |name: &str| match &interfaces {
            Some(up) => up.iter().any(|i| i == name),
            None => name != "lo",
        };

        let source = FieldSource::NetDev((pid != 0).then_some(pid));
        let set = if pid == 0 {
            self.read_filtered(source, keep)?
        } else {
            FieldSet::read_filtered(self.fs, self.proc_path, source, keep)
                .map_err(|e| process_error(pid, e))?
        };

        let stat = NetStat {
            received: set.sum_keyed(Field::RxBytes)?,
            sent: set.sum_keyed(Field::TxBytes)?,
            pid: (pid != 0).then_some(pid),
        };
        trace!(pid, own_netns = interfaces.is_some(), ?stat, "net snapshot");
        Ok(stat)
    }

    /// Block I/O bytes.
    ///
    /// System-wide: sectors times each device's sector size, summed over the
    /// real block devices. Per process: `rchar` / `wchar`.
    pub fn io_snapshot(&self, pid: u32) -> Result<BdStat, MetricError> {
        if pid != 0 {
            let io = self.read_process(pid, FieldSource::ProcessIo(pid))?;
            let stat = BdStat {
                read: io.u64_at(Field::Rchar)?,
                written: io.u64_at(Field::Wchar)?,
                pid: Some(pid),
            };
            trace!(pid, ?stat, "io snapshot");
            return Ok(stat);
        }

        let devices = self.devices.block_devices()?;
        let set = self.read_filtered(FieldSource::DiskStats, |name| {
            devices.iter().any(|d| d == name)
        })?;

        let mut stat = BdStat::default();
        for device in set.keys() {
            let sector_size = self.devices.sector_size(device);
            let read = set.keyed_u64(device, Field::ReadSectors)?;
            let written = set.keyed_u64(device, Field::WriteSectors)?;
            stat.read = stat.read.saturating_add(sectors_to_bytes(read, sector_size));
            stat.written = stat
                .written
                .saturating_add(sectors_to_bytes(written, sector_size));
        }
        trace!(devices = devices.len(), ?stat, "io snapshot");
        Ok(stat)
    }

    /// Network namespace identity of `pid` (`/proc/[pid]/ns/net` target).
    pub fn netns_of(&self, pid: u32) -> Result<PathBuf, MetricError> {
        let path = self.proc_path.join(format!("{}/ns/net", pid));
        self.fs.read_link(&path).map_err(|e| {
            debug!(pid, error = %e, "network namespace unreadable");
            match e.kind() {
                std::io::ErrorKind::NotFound => MetricError::ProcessGone(pid),
                _ => MetricError::SourceUnavailable {
                    path,
                    reason: e.to_string(),
                },
            }
        })
    }

    /// Whether `pid` is in the same network namespace as this process.
    ///
    /// An unreadable link on either side counts as shared.
    fn shares_netns(&self, pid: u32) -> bool {
        let ours = match self.fs.read_link(&self.proc_path.join("self/ns/net")) {
            Ok(target) => target,
            Err(e) => {
                debug!(error = %e, "own network namespace unreadable");
                return true;
            }
        };
        self.netns_of(pid).map_or(true, |theirs| theirs == ours)
    }

    fn read(&self, source: FieldSource) -> Result<FieldSet, MetricError> {
        Ok(FieldSet::read(self.fs, self.proc_path, source)?)
    }

    fn read_filtered<K: Fn(&str) -> bool>(
        &self,
        source: FieldSource,
        keep: K,
    ) -> Result<FieldSet, MetricError> {
        Ok(FieldSet::read_filtered(self.fs, self.proc_path, source, keep)?)
    }

    fn read_process(&self, pid: u32, source: FieldSource) -> Result<FieldSet, MetricError> {
        FieldSet::read(self.fs, self.proc_path, source).map_err(|e| process_error(pid, e))
    }
}

fn process_error(pid: u32, e: ReadError) -> MetricError {
    match e {
        ReadError::NotFound(_) => MetricError::ProcessGone(pid),
        other => other.into(),
    }
}
