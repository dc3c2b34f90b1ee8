//! sdspi-store - SD card on SPI
//!
//! [`SpiCardDriver`] brings a card up over [`SdMmcSpi`] and checks it holds a
//! FAT volume before handing it out.

use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;
use log::{debug, info, warn};

use super::{CardDescriptor, CardDriver, CardKind};
use crate::config::MountConfig;
use crate::error::MountError;
use crate::fat::{self, FatError, FreeSpace};
use crate::sdmmc::{self, AcquireOpts, CardType, Initialized, NotInit, SdMmcSpi};
use crate::sdmmc_proto::CMD0;
use crate::{Block, BlockCount, BlockDevice, BlockIdx};

/// SDHC tops out at 32 GiB; anything block addressed and larger is SDXC.
const SDXC_MIN_BYTES: u64 = 32 * 1024 * 1024 * 1024;

impl CardKind {
    pub fn from_card(card_type: CardType, capacity_bytes: u64) -> Self {
        match card_type {
            CardType::SD1 | CardType::SD2 => CardKind::SDSC,
            CardType::SDHC if capacity_bytes > SDXC_MIN_BYTES => CardKind::SDXC,
            CardType::SDHC => CardKind::SDHC,
        }
    }
}

/// A mounted SD card on SPI.
pub struct SpiCard<SPI, CS>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    sdmmc: SdMmcSpi<SPI, CS, Initialized>,
    descriptor: CardDescriptor,
}

impl<SPI, CS> SpiCard<SPI, CS>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    pub fn sdmmc(&mut self) -> &mut SdMmcSpi<SPI, CS, Initialized> {
        &mut self.sdmmc
    }
}

impl<SPI, CS> BlockDevice for SpiCard<SPI, CS>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    type Error = sdmmc::Error;

    fn read(
        &mut self,
        blocks: &mut [Block],
        start_block_idx: BlockIdx,
        reason: &str,
    ) -> Result<(), Self::Error> {
        self.sdmmc.read(blocks, start_block_idx, reason)
    }

    fn write(&mut self, blocks: &[Block], start_block_idx: BlockIdx) -> Result<(), Self::Error> {
        self.sdmmc.write(blocks, start_block_idx)
    }

    fn num_blocks(&mut self) -> Result<BlockCount, Self::Error> {
        Ok(BlockCount((self.descriptor.capacity_bytes / Block::LEN as u64) as u32))
    }
}

/// Drives an SD card over SPI. Holds the bus while no card is mounted.
pub struct SpiCardDriver<SPI, CS>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    idle: Option<SdMmcSpi<SPI, CS, NotInit>>,
}

impl<SPI, CS> SpiCardDriver<SPI, CS>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    pub fn new(spi: SPI, cs: CS) -> Self {
        SpiCardDriver {
            idle: Some(SdMmcSpi::new(spi, cs)),
        }
    }

    /// Give back the bus. `None` while a card is mounted.
    pub fn free(self) -> Option<(SPI, CS)> {
        self.idle.map(SdMmcSpi::free)
    }
}

impl<SPI, CS> CardDriver for SpiCardDriver<SPI, CS>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    type Card = SpiCard<SPI, CS>;
    type Error = FatError<sdmmc::Error>;

    fn mount(&mut self, config: MountConfig) -> Result<Self::Card, MountError> {
        let idle = match self.idle.take() {
            Some(idle) => idle,
            None => {
                warn!("Bus is held by a mounted card");
                return Err(MountError::MountFailed);
            }
        };

        let opts = AcquireOpts {
            require_crc: config.require_crc(),
        };
        let mut sdmmc = match idle.acquire_with_opts(opts) {
            Ok(sdmmc) => sdmmc,
            Err((e, idle)) => {
                self.idle = Some(idle);
                debug!("Card init failed: {:?}", e);
                return Err(match e {
                    sdmmc::Error::CardNotFound | sdmmc::Error::TimeoutCommand(CMD0) => {
                        MountError::NoCard
                    }
                    _ => MountError::MountFailed,
                });
            }
        };

        let capacity_bytes = match sdmmc.card_size_bytes() {
            Ok(size) => size,
            Err(e) => {
                warn!("Failed to read CSD: {:?}", e);
                self.idle = Some(sdmmc.deinit());
                return Err(MountError::MountFailed);
            }
        };

        match fat::locate_volume(&mut sdmmc) {
            Ok(partition) => {
                info!(
                    "Found {:?} volume at block {}",
                    partition.ty, partition.lba_start.0
                );
                let descriptor = CardDescriptor {
                    kind: CardKind::from_card(sdmmc.card_type(), capacity_bytes),
                    capacity_bytes,
                };
                Ok(SpiCard { sdmmc, descriptor })
            }
            Err(e) => {
                warn!("No usable volume on card: {:?}", e);
                self.idle = Some(sdmmc.deinit());
                Err(MountError::MountFailed)
            }
        }
    }

    fn unmount(&mut self, card: Self::Card) {
        self.idle = Some(card.sdmmc.deinit());
    }

    fn free_space(&mut self, card: &mut Self::Card) -> Result<FreeSpace, Self::Error> {
        fat::query_free_space(&mut card.sdmmc)
    }

    fn descriptor(&self, card: &Self::Card) -> CardDescriptor {
        card.descriptor
    }
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
