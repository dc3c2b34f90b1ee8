//! sdspi-store - SD card over SPI
//!
//! Brings a card up in SPI mode and moves 512 byte blocks to and from it.
//! An `SdMmcSpi<_, _, NotInit>` only owns the bus. [`SdMmcSpi::acquire`]
//! walks the card through its power-up sequence and hands back an
//! `SdMmcSpi<_, _, Initialized>`, which is a [`BlockDevice`].

mod busy;
use busy::SdMmcSpiBusy;

#[cfg(test)]
pub(crate) mod test;

use crate::sdmmc_proto::*;
use crate::{Block, BlockCount, BlockDevice, BlockIdx};

use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;
use log::{debug, trace, warn};

/// Polls of a card that is still working before we give up on it.
const POLL_BUDGET: u32 = 32_000;

/// CMD0 attempts before the slot is considered empty.
const CMD0_ATTEMPTS: u32 = 32;

/// Idle bytes clocked out with chip select high. 80 clocks, the card wants
/// at least 74.
const WAKE_BYTES: usize = 10;

/// CMD8 argument: 2.7-3.6V and the check pattern echoed back in R7.
const CMD8_VOLTAGE_AND_PATTERN: u32 = 0x1AA;

/// ACMD41 HCS bit: the host understands block addressed cards.
const HOST_CAPACITY_SUPPORT: u32 = 1 << 30;

/// A card on an SPI bus, either idle (`NotInit`) or ready for block I/O
/// (`Initialized`).
///
/// Chip select is a separate pin rather than part of the bus because the
/// wake-up clocks have to go out with it released.
pub struct SdMmcSpi<SPI, CS, State>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    spi: SPI,
    cs: CS,
    state: State,
}

/// Everything that can go wrong talking to the card.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    /// The SPI peripheral reported an error
    Transport,
    /// The card refused CRC mode and `require_crc` was set
    CantEnableCRC,
    /// No data start token arrived
    TimeoutReadBuffer,
    /// The card held the bus busy too long
    TimeoutWaitNotBusy,
    /// No R1 response to this command
    TimeoutCommand(u8),
    /// No R1 response to this application command
    TimeoutACommand(u8),
    /// CMD58 (read OCR) was rejected
    Cmd58Error,
    /// A register read was rejected or returned an unknown layout
    RegisterReadError,
    /// Data CRC mismatch: (received, computed)
    CrcError(u16, u16),
    /// The card rejected a read or sent an error token
    ReadError,
    /// The card rejected a write
    WriteError,
    /// Wrong state for this operation
    BadState,
    /// Nothing answered CMD0
    CardNotFound,
    /// Chip select could not be driven
    GpioError,
}

/// Typestate: the bus is owned but the card has not been brought up.
pub struct NotInit;

/// Typestate: the card answered the power-up sequence.
pub struct Initialized {
    card_type: CardType,
}

/// Card families, by how they are addressed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CardType {
    /// Version 1 standard capacity card, byte addressed.
    SD1,
    /// Version 2 standard capacity card, byte addressed.
    SD2,
    /// High capacity card (SDHC or SDXC), block addressed.
    SDHC,
}

/// A countdown of polls while the card is busy. Each poll spins the CPU for
/// a moment.
struct Retry {
    left: u32,
}

impl Retry {
    fn new() -> Retry {
        Retry { left: POLL_BUDGET }
    }

    /// Spend one poll, or fail with `err` once none are left.
    fn spend(&mut self, err: Error) -> Result<(), Error> {
        self.left = self.left.checked_sub(1).ok_or(err)?;
        for _ in 0..100 {
            core::hint::spin_loop();
        }
        Ok(())
    }
}

/// Options for acquiring the card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireOpts {
    /// Fail if the card refuses CRC mode. Some cards (at least a 512MiB
    /// Transcend one) never accept it.
    pub require_crc: bool,
}

impl Default for AcquireOpts {
    fn default() -> Self {
        AcquireOpts { require_crc: true }
    }
}

impl<SPI, CS, State> SdMmcSpi<SPI, CS, State>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    fn into_state<Next>(self, state: Next) -> SdMmcSpi<SPI, CS, Next> {
        SdMmcSpi {
            spi: self.spi,
            cs: self.cs,
            state,
        }
    }

    /// One byte of clocks with nothing to say.
    fn clock_idle(&mut self) -> Result<u8, Error> {
        self.spi
            .transfer(&mut [0xFF])
            .map(|b| b[0])
            .map_err(|_| Error::Transport)
    }
}

impl<SPI, CS> SdMmcSpi<SPI, CS, NotInit>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    pub fn new(spi: SPI, cs: CS) -> Self {
        SdMmcSpi {
            spi,
            cs,
            state: NotInit,
        }
    }

    /// Bring the card up with default options.
    pub fn acquire(self) -> Result<SdMmcSpi<SPI, CS, Initialized>, (Error, Self)> {
        self.acquire_with_opts(Default::default())
    }

    pub fn free(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }

    /// Bring the card up. On failure the bus comes back with the error so
    /// the caller can try again later.
    pub fn acquire_with_opts(
        mut self,
        options: AcquireOpts,
    ) -> Result<SdMmcSpi<SPI, CS, Initialized>, (Error, Self)> {
        debug!("Acquiring card with {:?}", options);
        let result = self.power_up(&options);
        // Chip select is released by now; one more byte lets the card let go
        // of MISO.
        let _ = self.clock_idle();
        match result {
            Ok(card_type) => {
                debug!("Card is {:?}", card_type);
                Ok(self.into_state(Initialized { card_type }))
            }
            Err(e) => Err((e, self)),
        }
    }

    fn power_up(&mut self, options: &AcquireOpts) -> Result<CardType, Error> {
        trace!("Waking card");
        self.cs.set_high().map_err(|_| Error::GpioError)?;
        for _ in 0..WAKE_BYTES {
            self.clock_idle()?;
        }

        let mut busy = SdMmcSpiBusy::new(&mut self.spi, &mut self.cs)?;
        go_idle(&mut busy)?;
        enable_crc(&mut busy, options.require_crc)?;
        let version = check_version(&mut busy)?;
        trace!("Interface version {:?}", version);
        wait_ready(&mut busy, version)?;
        match version {
            CardType::SD2 if read_ocr(&mut busy)?.is_high_capacity() => Ok(CardType::SDHC),
            other => Ok(other),
        }
    }
}

/// CMD0 until the card reports idle.
fn go_idle<SPI, CS>(busy: &mut SdMmcSpiBusy<'_, '_, SPI, CS>) -> Result<(), Error>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    let mut retry = Retry::new();
    for attempt in 0..CMD0_ATTEMPTS {
        match busy.card_command(CMD0, 0) {
            Ok(R1_IDLE_STATE) => return Ok(()),
            Ok(r1) => warn!("CMD0 attempt {}: R1 {:#04x}", attempt, r1),
            Err(Error::TimeoutCommand(CMD0)) => trace!("CMD0 attempt {}: no answer", attempt),
            Err(e) => return Err(e),
        }
        retry.spend(Error::TimeoutCommand(CMD0))?;
    }
    Err(Error::CardNotFound)
}

fn enable_crc<SPI, CS>(
    busy: &mut SdMmcSpiBusy<'_, '_, SPI, CS>,
    required: bool,
) -> Result<(), Error>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    let r1 = busy.card_command(CMD59, 1)?;
    if r1 != R1_IDLE_STATE {
        if required {
            return Err(Error::CantEnableCRC);
        }
        warn!("Card refused CRC mode (R1 {:#04x}), carrying on without", r1);
    }
    Ok(())
}

/// CMD8. Version 1 cards don't know it; version 2 cards echo the pattern.
fn check_version<SPI, CS>(busy: &mut SdMmcSpiBusy<'_, '_, SPI, CS>) -> Result<CardType, Error>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    let mut retry = Retry::new();
    loop {
        let r1 = busy.card_command(CMD8, CMD8_VOLTAGE_AND_PATTERN)?;
        if r1 == (R1_ILLEGAL_COMMAND | R1_IDLE_STATE) {
            return Ok(CardType::SD1);
        }
        let mut r7 = [0u8; 4];
        busy.receive_into(&mut r7)?;
        if u32::from_be_bytes(r7) & 0xFF == CMD8_VOLTAGE_AND_PATTERN & 0xFF {
            return Ok(CardType::SD2);
        }
        retry.spend(Error::TimeoutCommand(CMD8))?;
    }
}

/// ACMD41 until the card leaves the idle state.
fn wait_ready<SPI, CS>(
    busy: &mut SdMmcSpiBusy<'_, '_, SPI, CS>,
    version: CardType,
) -> Result<(), Error>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    let arg = match version {
        CardType::SD1 => 0,
        CardType::SD2 | CardType::SDHC => HOST_CAPACITY_SUPPORT,
    };
    let mut retry = Retry::new();
    while busy.card_acmd(ACMD41, arg)? != R1_READY_STATE {
        retry.spend(Error::TimeoutACommand(ACMD41))?;
    }
    Ok(())
}

fn read_ocr<SPI, CS>(busy: &mut SdMmcSpiBusy<'_, '_, SPI, CS>) -> Result<Ocr, Error>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    if busy.card_command(CMD58, 0)? != R1_READY_STATE {
        return Err(Error::Cmd58Error);
    }
    let mut ocr = [0u8; 4];
    busy.receive_into(&mut ocr)?;
    Ok(Ocr::from_bytes(ocr))
}

impl<SPI, CS> SdMmcSpi<SPI, CS, Initialized>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    /// Go back to the idle state, keeping the bus. Infallible so it can be
    /// used on the way out of an error path.
    pub fn deinit(self) -> SdMmcSpi<SPI, CS, NotInit> {
        self.into_state(NotInit)
    }

    pub fn card_type(&self) -> CardType {
        self.state.card_type
    }

    /// Run `f` with chip select asserted. Chip select is released when `f`
    /// returns, error or not.
    fn with_chip_select<F, R>(&mut self, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut SdMmcSpiBusy<'_, '_, SPI, CS>) -> Result<R, Error>,
    {
        let mut busy = SdMmcSpiBusy::new(&mut self.spi, &mut self.cs)?;
        f(&mut busy)
    }

    /// Read the Card Specific Data register.
    pub fn read_csd(&mut self) -> Result<Csd, Error> {
        self.with_chip_select(|busy| {
            if busy.card_command(CMD9, 0)? != R1_READY_STATE {
                return Err(Error::RegisterReadError);
            }
            let mut data = [0u8; 16];
            busy.read_data(&mut data)?;
            Csd::from_bytes(data).ok_or(Error::RegisterReadError)
        })
    }

    pub fn card_size_bytes(&mut self) -> Result<u64, Error> {
        Ok(self.read_csd()?.card_capacity_bytes())
    }

    pub fn erase_single_block_enabled(&mut self) -> Result<bool, Error> {
        Ok(self.read_csd()?.erase_single_block_enabled())
    }

    /// Standard capacity cards take byte addresses, high capacity ones take
    /// block numbers.
    fn card_address(&self, block: BlockIdx) -> u32 {
        match self.card_type() {
            CardType::SDHC => block.0,
            CardType::SD1 | CardType::SD2 => block.0 * Block::LEN_U32,
        }
    }
}

impl<SPI, CS> BlockDevice for SdMmcSpi<SPI, CS, Initialized>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
{
    type Error = Error;

    fn read(&mut self, blocks: &mut [Block], start: BlockIdx, reason: &str) -> Result<(), Error> {
        let address = self.card_address(start);
        trace!("Read {} block(s) at {:?} for {}", blocks.len(), start, reason);
        self.with_chip_select(|busy| match blocks {
            [block] => {
                if busy.card_command(CMD17, address)? != R1_READY_STATE {
                    return Err(Error::ReadError);
                }
                busy.read_data(&mut block.contents)
            }
            blocks => {
                if busy.card_command(CMD18, address)? != R1_READY_STATE {
                    return Err(Error::ReadError);
                }
                for block in blocks.iter_mut() {
                    busy.read_data(&mut block.contents)?;
                }
                busy.card_command(CMD12, 0).map(|_| ())
            }
        })
    }

    fn write(&mut self, blocks: &[Block], start: BlockIdx) -> Result<(), Error> {
        let address = self.card_address(start);
        trace!("Write {} block(s) at {:?}", blocks.len(), start);
        self.with_chip_select(|busy| match blocks {
            [block] => {
                if busy.card_command(CMD24, address)? != R1_READY_STATE {
                    return Err(Error::WriteError);
                }
                busy.write_data(DATA_START_BLOCK, &block.contents)?;
                busy.wait_not_busy()?;
                // CMD13 answers R2: R1 then a second status byte.
                if busy.card_command(CMD13, 0)? != R1_READY_STATE || busy.receive()? != 0 {
                    return Err(Error::WriteError);
                }
                Ok(())
            }
            blocks => {
                if busy.card_command(CMD25, address)? != R1_READY_STATE {
                    return Err(Error::WriteError);
                }
                for block in blocks {
                    busy.wait_not_busy()?;
                    busy.write_data(WRITE_MULTIPLE_TOKEN, &block.contents)?;
                }
                busy.wait_not_busy()?;
                busy.send(STOP_TRAN_TOKEN)
            }
        })
    }

    fn num_blocks(&mut self) -> Result<BlockCount, Error> {
        let blocks = self.card_size_bytes()? / u64::from(Block::LEN_U32);
        Ok(BlockCount(blocks as u32))
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
