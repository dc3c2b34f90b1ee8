//! sdspi-store - Mount supervision
//!
//! [`MountManager`] owns the card. It mounts it, probes it, drops it when it
//! stops answering and keeps trying to get it back. Everything else borrows
//! the mounted [`Volume`] per call, so nobody can hold on to a card that has
//! since gone away.
//!
//! ```text
//!              mount ok
//!  Unmounted ------------> Mounted
//!     ^  |                    |
//!     |  | mount failed       | probe or space query failed
//!     |  +--> Unmounted       v
//!     +------------------- Faulted
//!           (unmount)
//! ```

use log::{error, info, warn};

use crate::capacity::format_size;
use crate::card::{CardDescriptor, CardDriver};
use crate::config::MountConfig;
use crate::error::{Error, MountError, Result};
use crate::fat::FreeSpace;
use crate::health::HealthMonitor;
use crate::rows::RowStore;
use crate::telemetry::{names, TelemetrySink};
use crate::volume::Volume;

/// `card_status` text after a successful mount.
pub const STATUS_MOUNTED: &str = "mounted";

/// Where the card is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    Unmounted,
    Mounted,
    /// Seen only between a failure and the forced unmount that follows.
    Faulted,
}

/// What one [`MountManager::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The card was mounted and got probed.
    Probed { healthy: bool },
    /// The card was not mounted, so a mount was attempted.
    Remounted { mounted: bool },
}

/// Owns the card driver and the mounted card, if any.
pub struct MountManager<D>
where
    D: CardDriver,
{
    driver: D,
    config: MountConfig,
    volume: Volume,
    card: Option<D::Card>,
    state: MountState,
    last_failure: Option<MountError>,
    descriptor: Option<CardDescriptor>,
    health: HealthMonitor,
    telemetry: Option<Box<dyn TelemetrySink>>,
}

impl<D> MountManager<D>
where
    D: CardDriver,
{
    /// Starts out unmounted. Call [`MountManager::mount`] or
    /// [`MountManager::tick`] to bring the card up.
    pub fn new(driver: D, config: MountConfig) -> Self {
        MountManager {
            driver,
            volume: Volume::new(config.mount_root()),
            config,
            card: None,
            state: MountState::Unmounted,
            last_failure: None,
            descriptor: None,
            health: HealthMonitor::new(),
            telemetry: None,
        }
    }

    /// Report card type and presence to `sink`.
    pub fn with_telemetry<T>(mut self, sink: T) -> Self
    where
        T: TelemetrySink + 'static,
    {
        self.telemetry = Some(Box::new(sink));
        self
    }

    pub fn state(&self) -> MountState {
        self.state
    }

    pub fn is_mounted(&self) -> bool {
        self.state == MountState::Mounted
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    /// Why the last mount attempt failed. Cleared by a successful mount.
    pub fn last_failure(&self) -> Option<MountError> {
        self.last_failure
    }

    /// The mounted card's type and size.
    pub fn descriptor(&self) -> Option<CardDescriptor> {
        self.descriptor
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    /// The mounted card itself, for raw sector access.
    pub fn card(&mut self) -> Option<&mut D::Card> {
        match self.state {
            MountState::Mounted => self.card.as_mut(),
            _ => None,
        }
    }

    /// The mounted volume.
    pub fn volume(&self) -> Result<&Volume> {
        match self.state {
            MountState::Mounted => Ok(&self.volume),
            _ => Err(Error::Unmounted),
        }
    }

    /// Row access to the mounted volume. Fails closed when unmounted.
    pub fn rows(&self) -> RowStore<'_> {
        RowStore::new(self.volume().ok())
    }

    fn publish_text(&mut self, name: &str, value: &str) {
        if let Some(sink) = self.telemetry.as_mut() {
            sink.publish_text(name, value);
        }
    }

    fn publish_flag(&mut self, name: &str, value: bool) {
        if let Some(sink) = self.telemetry.as_mut() {
            sink.publish_flag(name, value);
        }
    }

    /// Mount the card. Any card already held is released first. A card whose
    /// mount root is not a directory is released again and counts as a
    /// failed mount. Failures are recorded and reported, not returned.
    pub fn mount(&mut self) -> bool {
        if self.card.is_some() {
            self.unmount();
        }
        info!(
            "Mounting SD card at {}",
            self.config.mount_root().display()
        );

        let card = match self.driver.mount(self.config.clone()) {
            Ok(card) => card,
            Err(e) => return self.mount_failed(e),
        };
        if !self.volume.root().is_dir() {
            error!(
                "Mount root {} is not a directory",
                self.volume.root().display()
            );
            self.driver.unmount(card);
            return self.mount_failed(MountError::MountFailed);
        }

        let descriptor = self.driver.descriptor(&card);
        info!(
            "SD card mounted: {}, {}",
            descriptor.kind,
            format_size(descriptor.capacity_bytes)
        );
        self.card = Some(card);
        self.state = MountState::Mounted;
        self.last_failure = None;
        self.descriptor = Some(descriptor);
        self.publish_text(names::CARD_TYPE, &descriptor.kind.to_string());
        self.publish_text(names::CARD_STATUS, STATUS_MOUNTED);
        true
    }

    fn mount_failed(&mut self, e: MountError) -> bool {
        match e {
            MountError::NoCard => warn!("No SD card detected"),
            MountError::MountFailed => error!("Failed to mount filesystem"),
        }
        self.state = MountState::Unmounted;
        self.last_failure = Some(e);
        self.publish_text(names::CARD_STATUS, &e.to_string());
        false
    }

    /// Mount unless already mounted.
    pub fn try_remount(&mut self) -> bool {
        if self.state == MountState::Mounted {
            return true;
        }
        self.mount()
    }

    /// Release the card. Safe to call when nothing is mounted.
    pub fn unmount(&mut self) {
        if let Some(card) = self.card.take() {
            self.driver.unmount(card);
            info!("SD card unmounted");
        }
        self.descriptor = None;
        self.state = MountState::Unmounted;
    }

    /// The card misbehaved: drop it.
    fn fault(&mut self) {
        warn!("SD card faulted, unmounting");
        self.state = MountState::Faulted;
        self.unmount();
    }

    /// Check the card still answers. A failed probe while mounted unmounts
    /// it; the presence flag is only published when it changes.
    pub fn probe(&mut self) -> bool {
        let device = match self.state {
            MountState::Mounted => self.card.as_mut(),
            _ => None,
        };
        let healthy = self.health.check(device);

        if !healthy && self.state == MountState::Mounted {
            self.fault();
        }
        if let Some(present) = self.health.transition(healthy) {
            if present {
                info!("SD card is healthy");
            } else {
                warn!("SD card lost");
            }
            self.publish_flag(names::CARD_PRESENT, present);
        }
        healthy
    }

    /// One scheduler tick: probe if mounted, otherwise try to mount.
    pub fn tick(&mut self) -> TickOutcome {
        match self.state {
            MountState::Mounted => TickOutcome::Probed {
                healthy: self.probe(),
            },
            _ => TickOutcome::Remounted {
                mounted: self.try_remount(),
            },
        }
    }

    /// Volume size and free space. A failed query counts as a dead card.
    pub fn query_free_space(&mut self) -> Option<FreeSpace> {
        if self.state != MountState::Mounted {
            return None;
        }
        let card = self.card.as_mut()?;
        match self.driver.free_space(card) {
            Ok(space) => Some(space),
            Err(e) => {
                warn!("Free space query failed: {:?}", e);
                self.fault();
                None
            }
        }
    }

    /// Log the configuration and, when mounted, what the card reports.
    pub fn dump_config(&mut self) {
        let bus = self.config.bus().clone();
        info!("SD SPI card:");
        info!(
            "  SPI host {}: CLK {}, MOSI {}, MISO {}, CS {}, {} kHz",
            bus.host, bus.clk_pin, bus.mosi_pin, bus.miso_pin, bus.cs_pin, bus.max_freq_khz
        );
        info!("  Mount point: {}", self.config.mount_root().display());
        info!("  Max files: {}", self.config.max_files());
        info!(
            "  Allocation unit: {}",
            format_size(self.config.allocation_unit_size() as u64)
        );
        info!("  State: {:?}", self.state);

        if let Some(descriptor) = self.descriptor {
            info!("  Card type: {}", descriptor.kind);
            info!("  Card size: {}", format_size(descriptor.capacity_bytes));
        }
        if let Some(space) = self.query_free_space() {
            info!("  Free space: {}", format_size(space.free_bytes()));
        }
        if let Some(failure) = self.last_failure {
            info!("  Last mount failure: {}", failure);
        }
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
