//! sdspi-store - Card health probing
//!
//! A mounted card can vanish without the filesystem noticing: the slot has no
//! card-detect line and nothing talks to the card between file operations.
//! Reading sector 0 now and then tells a live card from a dead one.

use log::{debug, warn};

use crate::{BlockDevice, BlockIdx};

/// Probe results and the last status reported for them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HealthMonitor {
    reported: Option<bool>,
    consecutive_failures: u32,
    last_error: Option<String>,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read sector 0 of `device`. No device means unhealthy, without touching
    /// any hardware.
    pub fn check<BD>(&mut self, device: Option<&mut BD>) -> bool
    where
        BD: BlockDevice,
    {
        let device = match device {
            Some(device) => device,
            None => {
                self.consecutive_failures += 1;
                return false;
            }
        };
        match device.read_block(BlockIdx(0)) {
            Ok(_) => {
                self.consecutive_failures = 0;
                true
            }
            Err(e) => {
                warn!("Health probe failed: {:?}", e);
                self.consecutive_failures += 1;
                self.last_error = Some(format!("{:?}", e));
                false
            }
        }
    }

    /// Record the status the caller is about to act on. Returns it only if it
    /// differs from the last one recorded.
    pub fn transition(&mut self, healthy: bool) -> Option<bool> {
        if self.reported == Some(healthy) {
            return None;
        }
        debug!("Card health changed: {:?} -> {}", self.reported, healthy);
        self.reported = Some(healthy);
        Some(healthy)
    }

    /// Last status handed out by [`HealthMonitor::transition`].
    pub fn reported(&self) -> Option<bool> {
        self.reported
    }

    /// Failed probes since the last good one.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// The device error from the most recent failed read.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::MemoryBlockDevice;

    #[test]
    fn probes_sector_zero() {
        let mut monitor = HealthMonitor::new();
        let mut good = MemoryBlockDevice::zeroed(1);
        let mut empty = MemoryBlockDevice::zeroed(0);

        assert!(monitor.check(Some(&mut good)));
        assert!(!monitor.check(Some(&mut empty)));
        assert!(!monitor.check::<MemoryBlockDevice>(None));
        assert_eq!(monitor.consecutive_failures(), 2);
        assert!(monitor.last_error().unwrap().contains("OutOfRange"));

        assert!(monitor.check(Some(&mut good)));
        assert_eq!(monitor.consecutive_failures(), 0);
    }

    #[test]
    fn debounces() {
        let mut monitor = HealthMonitor::new();
        assert_eq!(monitor.transition(false), Some(false));
        assert_eq!(monitor.transition(false), None);
        assert_eq!(monitor.transition(false), None);
        assert_eq!(monitor.transition(true), Some(true));
        assert_eq!(monitor.transition(true), None);
        assert_eq!(monitor.reported(), Some(true));
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
