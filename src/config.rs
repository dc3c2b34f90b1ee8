//! sdspi-store - Bus and mount configuration
//!
//! Built once, handed by value to every mount attempt, never changed after.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the card hangs off the SPI bus. Purely descriptive: the HAL objects
/// handed to [`crate::SpiCardDriver`] are already wired up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    pub host: u8,
    pub clk_pin: u8,
    pub mosi_pin: u8,
    pub miso_pin: u8,
    pub cs_pin: u8,
    pub max_freq_khz: u32,
}

impl BusConfig {
    pub const DEFAULT_FREQ_KHZ: u32 = 1_000;

    pub fn new(clk_pin: u8, mosi_pin: u8, miso_pin: u8, cs_pin: u8) -> Self {
        BusConfig {
            host: 1,
            clk_pin,
            mosi_pin,
            miso_pin,
            cs_pin,
            max_freq_khz: Self::DEFAULT_FREQ_KHZ,
        }
    }

    pub fn with_host(mut self, host: u8) -> Self {
        self.host = host;
        self
    }

    pub fn with_max_freq_khz(mut self, max_freq_khz: u32) -> Self {
        self.max_freq_khz = max_freq_khz;
        self
    }
}

/// How the volume is mounted and supervised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountConfig {
    bus: BusConfig,
    mount_root: PathBuf,
    max_files: usize,
    allocation_unit_size: usize,
    require_crc: bool,
    remount_interval: Duration,
    health_interval: Duration,
}

impl Default for MountConfig {
    fn default() -> Self {
        MountConfig {
            bus: BusConfig::new(18, 23, 19, 5),
            mount_root: PathBuf::from(Self::DEFAULT_MOUNT_ROOT),
            max_files: 5,
            allocation_unit_size: 16 * 1024,
            require_crc: true,
            remount_interval: Duration::from_secs(5),
            health_interval: Duration::from_secs(5),
        }
    }
}

impl MountConfig {
    pub const DEFAULT_MOUNT_ROOT: &'static str = "/sdcard";

    pub fn new(bus: BusConfig) -> Self {
        MountConfig {
            bus,
            ..Default::default()
        }
    }

    pub fn with_mount_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.mount_root = root.into();
        self
    }

    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    pub fn with_allocation_unit_size(mut self, size: usize) -> Self {
        self.allocation_unit_size = size;
        self
    }

    /// Some cards don't support CRC mode.
    pub fn with_require_crc(mut self, require_crc: bool) -> Self {
        self.require_crc = require_crc;
        self
    }

    pub fn with_remount_interval(mut self, interval: Duration) -> Self {
        self.remount_interval = interval;
        self
    }

    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    pub fn bus(&self) -> &BusConfig {
        &self.bus
    }

    pub fn mount_root(&self) -> &Path {
        &self.mount_root
    }

    pub fn max_files(&self) -> usize {
        self.max_files
    }

    pub fn allocation_unit_size(&self) -> usize {
        self.allocation_unit_size
    }

    pub fn require_crc(&self) -> bool {
        self.require_crc
    }

    pub fn remount_interval(&self) -> Duration {
        self.remount_interval
    }

    pub fn health_interval(&self) -> Duration {
        self.health_interval
    }

    /// A card that fails to mount is never formatted.
    pub const fn format_if_mount_failed(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let config = MountConfig::default();
        assert_eq!(config.mount_root(), Path::new("/sdcard"));
        assert_eq!(config.max_files(), 5);
        assert_eq!(config.allocation_unit_size(), 16 * 1024);
        assert!(config.require_crc());
        assert_eq!(config.remount_interval(), Duration::from_secs(5));
        assert_eq!(config.health_interval(), Duration::from_secs(5));
        assert!(!config.format_if_mount_failed());
        assert_eq!(config.bus().max_freq_khz, 1_000);
    }

    #[test]
    fn builder() {
        let bus = BusConfig::new(14, 15, 2, 13).with_host(2).with_max_freq_khz(20_000);
        let config = MountConfig::new(bus.clone())
            .with_mount_root("/data")
            .with_max_files(8)
            .with_allocation_unit_size(32 * 1024)
            .with_require_crc(false)
            .with_remount_interval(Duration::from_secs(30))
            .with_health_interval(Duration::from_millis(500));
        assert_eq!(config.bus(), &bus);
        assert_eq!(config.mount_root(), Path::new("/data"));
        assert_eq!(config.max_files(), 8);
        assert_eq!(config.allocation_unit_size(), 32 * 1024);
        assert_eq!(config.remount_interval(), Duration::from_secs(30));
        assert_eq!(config.health_interval(), Duration::from_millis(500));
        assert!(!config.require_crc());
        assert!(!config.format_if_mount_failed());
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
