//! Fixed device lists for tests that do not model `/sys`.

use std::collections::HashMap;

use crate::collector::devices::{DEFAULT_SECTOR_SIZE, DeviceEnv};
use crate::collector::error::MetricError;

/// [`DeviceEnv`] that always answers with the same names.
#[derive(Debug, Clone, Default)]
pub struct StaticDevices {
    interfaces: Vec<String>,
    block_devices: Vec<String>,
    sector_sizes: HashMap<String, u64>,
}

impl StaticDevices {
    pub fn new<I, B>(interfaces: I, block_devices: B) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        B: IntoIterator,
        B::Item: Into<String>,
    {
        Self {
            interfaces: interfaces.into_iter().map(Into::into).collect(),
            block_devices: block_devices.into_iter().map(Into::into).collect(),
            sector_sizes: HashMap::new(),
        }
    }

    /// Overrides the sector size reported for `device`.
    pub fn with_sector_size(mut self, device: &str, size: u64) -> Self {
        self.sector_sizes.insert(device.to_string(), size);
        self
    }
}

impl DeviceEnv for StaticDevices {
    fn active_interfaces(&self) -> Result<Vec<String>, MetricError> {
        Ok(self.interfaces.clone())
    }

    fn block_devices(&self) -> Result<Vec<String>, MetricError> {
        Ok(self.block_devices.clone())
    }

    fn sector_size(&self, device: &str) -> u64 {
        self.sector_sizes
            .get(device)
            .copied()
            .unwrap_or(DEFAULT_SECTOR_SIZE)
    }
}
