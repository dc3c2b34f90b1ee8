//! An SDHC card on the other end of a pretend SPI bus.

use core::convert::Infallible;
use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;
use hex_literal::hex;

use super::busy::command_frame;
use super::*;
use crate::MemoryBlockDevice;

/// CSD of an 8 GB SDHC card.
pub(crate) const CSD_8GB: [u8; 16] = hex!("40 0E 00 32 5B 59 00 00 3B 37 7F 80 0A 40 40 AF");

/// Answers the commands the driver sends while acquiring and reading. Writes
/// are not emulated. While `present` is false the bus floats high, as if the
/// slot were empty.
pub(crate) struct EmulatedCard {
    image: MemoryBlockDevice,
    present: Rc<Cell<bool>>,
    command: Vec<u8>,
    outgoing: VecDeque<u8>,
    app_command: bool,
}

impl EmulatedCard {
    /// A card holding `image`, and the handle that inserts or removes it.
    pub(crate) fn new(image: MemoryBlockDevice) -> (Self, Rc<Cell<bool>>) {
        let present = Rc::new(Cell::new(true));
        let card = EmulatedCard {
            image,
            present: present.clone(),
            command: Vec::new(),
            outgoing: VecDeque::new(),
            app_command: false,
        };
        (card, present)
    }

    fn exchange(&mut self, byte: u8) -> u8 {
        if !self.present.get() {
            self.command.clear();
            self.outgoing.clear();
            self.app_command = false;
            return 0xFF;
        }
        if self.command.is_empty() && byte == 0xFF {
            return self.outgoing.pop_front().unwrap_or(0xFF);
        }
        self.command.push(byte);
        if self.command.len() == 6 {
            let frame: Vec<u8> = self.command.drain(..).collect();
            self.execute(&frame);
        }
        0xFF
    }

    fn execute(&mut self, frame: &[u8]) {
        let command = frame[0] & 0x3F;
        let arg = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]);
        if frame[5] != crc7(&frame[0..5]) {
            // COM CRC error
            self.outgoing.push_back(0x08);
            return;
        }

        if self.app_command {
            self.app_command = false;
            let r1 = if command == ACMD41 { R1_READY_STATE } else { R1_ILLEGAL_COMMAND };
            self.outgoing.push_back(r1);
            return;
        }

        match command {
            CMD0 | CMD59 => self.outgoing.push_back(R1_IDLE_STATE),
            CMD8 => self.outgoing.extend(&[R1_IDLE_STATE, 0x00, 0x00, 0x01, (arg & 0xFF) as u8]),
            CMD55 => {
                self.app_command = true;
                self.outgoing.push_back(R1_IDLE_STATE);
            }
            CMD58 => self.outgoing.extend(&[R1_READY_STATE, 0xC0, 0xFF, 0x80, 0x00]),
            CMD9 => {
                self.outgoing.push_back(R1_READY_STATE);
                self.push_data(&CSD_8GB);
            }
            CMD17 => {
                self.outgoing.push_back(R1_READY_STATE);
                match self.image.read_block(BlockIdx(arg)) {
                    Ok(block) => self.push_data(&block.contents),
                    // Data error token: out of range
                    Err(_) => self.outgoing.push_back(0x08),
                }
            }
            _ => self.outgoing.push_back(R1_ILLEGAL_COMMAND),
        }
    }

    fn push_data(&mut self, data: &[u8]) {
        self.outgoing.push_back(DATA_START_BLOCK);
        self.outgoing.extend(data);
        self.outgoing.extend(&crc16(data).to_be_bytes());
    }
}

impl Transfer<u8> for EmulatedCard {
    type Error = Infallible;

    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], Self::Error> {
        for word in words.iter_mut() {
            *word = self.exchange(*word);
        }
        Ok(words)
    }
}

pub(crate) struct DummyCsPin;

impl OutputPin for DummyCsPin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

fn image_with_marker() -> MemoryBlockDevice {
    let mut image = MemoryBlockDevice::zeroed(8);
    let mut block = Block::new();
    for (i, b) in block.iter_mut().enumerate() {
        *b = i as u8;
    }
    image.write(&[block], BlockIdx(3)).unwrap();
    image
}

#[test]
fn command_frames_carry_crc7() {
    assert_eq!(command_frame(CMD0, 0), [0x40, 0x00, 0x00, 0x00, 0x00, 0x95]);
    assert_eq!(command_frame(CMD8, 0x1AA), [0x48, 0x00, 0x00, 0x01, 0xAA, 0x87]);
}

#[test]
fn acquire_detects_sdhc() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (card, _present) = EmulatedCard::new(image_with_marker());
    let mut sdmmc = SdMmcSpi::new(card, DummyCsPin)
        .acquire()
        .map_err(|(e, _)| e)
        .unwrap();
    assert_eq!(sdmmc.card_type(), CardType::SDHC);
    assert_eq!(sdmmc.card_size_bytes().unwrap(), 7_948_206_080);
    assert_eq!(sdmmc.num_blocks().unwrap(), BlockCount(15_523_840));
    assert!(sdmmc.erase_single_block_enabled().unwrap());
}

#[test]
fn reads_a_block() {
    let (card, _present) = EmulatedCard::new(image_with_marker());
    let mut sdmmc = SdMmcSpi::new(card, DummyCsPin)
        .acquire()
        .map_err(|(e, _)| e)
        .unwrap();
    let block = sdmmc.read_block(BlockIdx(3)).unwrap();
    assert_eq!(block[0], 0);
    assert_eq!(block[200], 200);
    assert_eq!(block[511], 255);
    assert_eq!(sdmmc.read_block(BlockIdx(0)).unwrap(), Block::new());
}

#[test]
fn empty_slot() {
    let (card, present) = EmulatedCard::new(image_with_marker());
    present.set(false);
    let (err, idle) = match SdMmcSpi::new(card, DummyCsPin).acquire() {
        Ok(_) => panic!("acquired a card that is not there"),
        Err(e) => e,
    };
    assert_eq!(err, Error::CardNotFound);

    // The bus comes back and can be retried once a card shows up.
    present.set(true);
    let sdmmc = idle.acquire().map_err(|(e, _)| e).unwrap();
    assert_eq!(sdmmc.card_type(), CardType::SDHC);
}

#[test]
fn pulled_card_times_out() {
    let (card, present) = EmulatedCard::new(image_with_marker());
    let mut sdmmc = SdMmcSpi::new(card, DummyCsPin)
        .acquire()
        .map_err(|(e, _)| e)
        .unwrap();
    present.set(false);
    assert_eq!(
        sdmmc.read_block(BlockIdx(0)).unwrap_err(),
        Error::TimeoutCommand(CMD17)
    );
}

#[test]
fn read_past_the_end() {
    let (card, _present) = EmulatedCard::new(image_with_marker());
    let mut sdmmc = SdMmcSpi::new(card, DummyCsPin)
        .acquire()
        .map_err(|(e, _)| e)
        .unwrap();
    assert_eq!(sdmmc.read_block(BlockIdx(8)).unwrap_err(), Error::ReadError);
}
