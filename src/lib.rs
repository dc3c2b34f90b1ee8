//! # sdspi-store
//!
//! > SD card supervision and crash-tolerant row storage for embedded Rust
//!
//! This crate keeps an SD card on an SPI bus mounted on a long-running
//! device, notices when the card stops answering, mounts it again when it
//! comes back, and stores CSV style row logs on it. Rewrites of a row file
//! (trimming, deleting, editing a cell) go through a temporary copy that is
//! swapped in at the end, so an interrupted rewrite leaves either the old or
//! the new file behind.
//!
//! The card side is a small SD/MMC over SPI driver with just enough FAT16 and
//! FAT32 to find the volume and account for its space. File access goes
//! through `std::fs` below the mount root, where the platform's FAT driver
//! has mounted the card.
//!
//! ## Using the crate
//!
//! You will need an SPI bus implementing `embedded_hal::blocking::spi::Transfer`
//! and a chip select pin implementing `embedded_hal::digital::v2::OutputPin`.
//!
//! ```rust,ignore
//! let driver = sdspi_store::SpiCardDriver::new(spi, cs);
//! let config = sdspi_store::MountConfig::default().with_mount_root("/sdcard");
//! let mut manager = sdspi_store::MountManager::new(driver, config)
//!     .with_telemetry(sdspi_store::LogSink);
//! let mut capacity = sdspi_store::CapacityReporter::new().with_telemetry(sdspi_store::LogSink);
//! capacity.watch_file("/log.csv");
//!
//! loop {
//!     // Probes a mounted card, or tries to mount a missing one.
//!     manager.tick();
//!     capacity.report(&mut manager);
//!
//!     let rows = manager.rows();
//!     if rows.append_row("/log.csv", &[timestamp(), reading()]).is_ok() {
//!         rows.keep_last_n("/log.csv", 1000).ok();
//!     }
//!     sleep(manager.config().health_interval());
//! }
//! ```
//!
//! ## Features
//!
//! `spi` (on by default) builds the SD/MMC over SPI driver and pulls in
//! `embedded-hal`. Without it, bring your own [`CardDriver`]; the FAT
//! accounting in [`fat`] works over any [`BlockDevice`].
//!
//! ## Logging
//!
//! Everything is logged through the `log` facade. Pick any logger.

// ****************************************************************************
//
// Imports
//
// ****************************************************************************

#[macro_use]
mod structure;

pub mod block_device;
pub mod fat;
pub mod mbr;
#[cfg(feature = "spi")]
pub mod sdmmc;
#[cfg(feature = "spi")]
pub mod sdmmc_proto;

pub mod capacity;
pub mod card;
pub mod config;
pub mod csv;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod rewrite;
pub mod rows;
pub mod telemetry;
pub mod volume;

pub use crate::block_device::{
    Block, BlockCount, BlockDevice, BlockIdx, MemoryBlockDevice, MemoryError,
};
pub use crate::capacity::{format_size, CapacityReporter, CapacitySnapshot, MemoryUnit};
pub use crate::card::{CardDescriptor, CardDriver, CardKind};
#[cfg(feature = "spi")]
pub use crate::card::{SpiCard, SpiCardDriver};
pub use crate::config::{BusConfig, MountConfig};
pub use crate::error::{Error, MountError, Result};
pub use crate::fat::FreeSpace;
pub use crate::health::HealthMonitor;
pub use crate::lifecycle::{MountManager, MountState, TickOutcome};
pub use crate::rewrite::{RewriteStats, RowAction};
pub use crate::rows::RowStore;
#[cfg(feature = "spi")]
pub use crate::sdmmc::Error as SdMmcError;
#[cfg(feature = "spi")]
pub use crate::sdmmc::SdMmcSpi;
pub use crate::telemetry::{LogSink, TelemetrySink, UNAVAILABLE};
pub use crate::volume::{FileInfo, Volume};

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
