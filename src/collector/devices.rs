//! Live enumeration of network interfaces and block devices.
//!
//! The set of interfaces that are up and the set of real block devices change
//! while the system runs, so they are queried on every snapshot rather than
//! cached. [`DeviceEnv`] is the seam; [`SysfsDevices`] answers from `/sys`.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::collector::error::MetricError;
use crate::collector::traits::FileSystem;

/// `IFF_UP` in `/sys/class/net/<if>/flags`.
const IFF_UP: u32 = 0x1;

/// Used when a device does not report its hardware sector size.
pub const DEFAULT_SECTOR_SIZE: u64 = 512;

/// Block device name prefixes that are not backed by real storage, or that
/// stack on top of other disks (device-mapper, software RAID) and would count
/// the same I/O twice.
const VIRTUAL_BLOCK_PREFIXES: &[&str] = &["loop", "ram", "zram", "dm-", "md"];

/// Source of the device names a snapshot sums over.
pub trait DeviceEnv: Send + Sync {
    /// Names of the network interfaces that are administratively up,
    /// excluding loopback.
    fn active_interfaces(&self) -> Result<Vec<String>, MetricError>;

    /// Names of the whole-disk block devices, excluding loop and RAM disks
    /// and stacked devices.
    fn block_devices(&self) -> Result<Vec<String>, MetricError>;

    /// Bytes per sector reported by `device`.
    fn sector_size(&self, device: &str) -> u64;
}

/// [`DeviceEnv`] backed by the sysfs tree.
#[derive(Debug, Clone)]
pub struct SysfsDevices<F: FileSystem> {
    fs: F,
    sys_path: PathBuf,
}

impl<F: FileSystem> SysfsDevices<F> {
    pub fn new(fs: F, sys_path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            sys_path: sys_path.into(),
        }
    }

    fn list(&self, relative: &str) -> Result<Vec<String>, MetricError> {
        let dir = self.sys_path.join(relative);
        let entries = self
            .fs
            .read_dir(&dir)
            .map_err(|e| unavailable(&dir, e))?;

        let mut names: Vec<String> = entries
            .iter()
            .filter_map(|p| p.file_name())
            .filter_map(|n| n.to_str())
            .map(str::to_string)
            .collect();
        names.sort();
        Ok(names)
    }

    fn interface_up(&self, name: &str) -> bool {
        let path = self.sys_path.join("class/net").join(name).join("flags");
        match self.fs.read_to_string(&path) {
            Ok(content) => parse_flags(&content).is_some_and(|flags| flags & IFF_UP != 0),
            Err(e) => {
                debug!(interface = name, error = %e, "interface flags unreadable, skipping");
                false
            }
        }
    }
}

impl<F: FileSystem> DeviceEnv for SysfsDevices<F> {
    fn active_interfaces(&self) -> Result<Vec<String>, MetricError> {
        let names = self.list("class/net")?;
        Ok(names
            .into_iter()
            .filter(|name| name != "lo" && self.interface_up(name))
            .collect())
    }

    fn block_devices(&self) -> Result<Vec<String>, MetricError> {
        let names = self.list("block")?;
        Ok(names
            .into_iter()
            .filter(|name| !is_virtual_block_device(name))
            .collect())
    }

    fn sector_size(&self, device: &str) -> u64 {
        let path = self
            .sys_path
            .join("block")
            .join(device)
            .join("queue/hw_sector_size");
        self.fs
            .read_to_string(&path)
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|&size| size > 0)
            .unwrap_or(DEFAULT_SECTOR_SIZE)
    }
}

/// Whether `name` is a loop device, RAM disk or stacked device.
pub fn is_virtual_block_device(name: &str) -> bool {
    VIRTUAL_BLOCK_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// Parses an interface flags word such as `0x1003`.
fn parse_flags(content: &str) -> Option<u32> {
    let s = content.trim();
    let hex = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
    u32::from_str_radix(hex, 16).ok()
}

fn unavailable(path: &Path, e: io::Error) -> MetricError {
    MetricError::SourceUnavailable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}
