//! sdspi-store - SD/MMC Protocol constants and register decoding
//!
//! Based on SD Physical Layer Simplified Specification Version 2.00.

/// GO_IDLE_STATE - init card in spi mode if CS low
pub const CMD0: u8 = 0x00;
/// SEND_IF_COND - verify SD Memory Card interface operating condition.
pub const CMD8: u8 = 0x08;
/// SEND_CSD - read the Card Specific Data (CSD register)
pub const CMD9: u8 = 0x09;
/// STOP_TRANSMISSION - end multiple block read sequence
pub const CMD12: u8 = 0x0C;
/// SEND_STATUS - read the card status register
pub const CMD13: u8 = 0x0D;
/// READ_SINGLE_BLOCK - read a single data block from the card
pub const CMD17: u8 = 0x11;
/// READ_MULTIPLE_BLOCK - read a multiple data blocks from the card
pub const CMD18: u8 = 0x12;
/// WRITE_BLOCK - write a single data block to the card
pub const CMD24: u8 = 0x18;
/// WRITE_MULTIPLE_BLOCK - write blocks of data until a STOP_TRANSMISSION
pub const CMD25: u8 = 0x19;
/// APP_CMD - escape for application specific command
pub const CMD55: u8 = 0x37;
/// READ_OCR - read the OCR register of a card
pub const CMD58: u8 = 0x3A;
/// CRC_ON_OFF - enable or disable CRC checking
pub const CMD59: u8 = 0x3B;
/// SD_SEND_OP_COMD - Sends host capacity support information and activates
/// the card's initialization process
pub const ACMD41: u8 = 0x29;

/// status for card in the ready state
pub const R1_READY_STATE: u8 = 0x00;
/// status for card in the idle state
pub const R1_IDLE_STATE: u8 = 0x01;
/// status bit for illegal command
pub const R1_ILLEGAL_COMMAND: u8 = 0x04;

/// start data token for read or write single block
pub const DATA_START_BLOCK: u8 = 0xFE;
/// stop token for write multiple blocks
pub const STOP_TRAN_TOKEN: u8 = 0xFD;
/// start data token for write multiple blocks
pub const WRITE_MULTIPLE_TOKEN: u8 = 0xFC;
/// mask for data response tokens after a write block operation
pub const DATA_RES_MASK: u8 = 0x1F;
/// write data accepted token
pub const DATA_RES_ACCEPTED: u8 = 0x05;

/// The top bit of an R1 response is always clear.
pub const ERROR_OK: u8 = 0x00;

bitflags::bitflags! {
    /// Operation Conditions Register, as returned by CMD58.
    pub struct Ocr: u32 {
        /// 3.2-3.3V window.
        const VDD_32_33 = 1 << 20;
        /// 3.3-3.4V window.
        const VDD_33_34 = 1 << 21;
        /// Card Capacity Status: set for SDHC/SDXC (block addressed) cards.
        const CCS = 1 << 30;
        /// Clear while the card is still powering up.
        const POWER_UP_DONE = 1 << 31;
    }
}

impl Ocr {
    /// Decode the four OCR bytes that follow the CMD58 R1 response.
    pub fn from_bytes(bytes: [u8; 4]) -> Ocr {
        Ocr::from_bits_truncate(u32::from_be_bytes(bytes))
    }

    /// Is this a block addressed (high capacity) card?
    pub fn is_high_capacity(&self) -> bool {
        self.contains(Ocr::POWER_UP_DONE | Ocr::CCS)
    }
}

/// Card Specific Data, version 1 (standard capacity cards).
#[derive(Default, Debug, Clone)]
pub struct CsdV1 {
    /// The 16 raw register bytes.
    pub data: [u8; 16],
}

/// Card Specific Data, version 2 (high capacity cards).
#[derive(Default, Debug, Clone)]
pub struct CsdV2 {
    /// The 16 raw register bytes.
    pub data: [u8; 16],
}

/// Either version of the CSD register.
#[derive(Debug, Clone)]
pub enum Csd {
    /// A standard capacity card.
    V1(CsdV1),
    /// A high capacity card.
    V2(CsdV2),
}

impl CsdV1 {
    fn data(&self) -> &[u8] {
        &self.data
    }

    define_field!(csd_ver, u8, 0, 6, 2);
    define_field!(read_block_length, u8, 5, 0, 4);
    define_field!(device_size, u32, [(6, 0, 2), (7, 0, 8), (8, 6, 2)]);
    define_field!(device_size_multiplier, u8, [(9, 0, 2), (10, 7, 1)]);
    define_field!(erase_single_block_enabled, bool, 10, 6);
    define_field!(crc, u8, 15, 1, 7);

    /// Returns the card capacity in bytes
    pub fn card_capacity_bytes(&self) -> u64 {
        let multiplier = self.device_size_multiplier() + self.read_block_length() + 2;
        (u64::from(self.device_size()) + 1) << multiplier
    }

    /// Returns the card capacity in 512-byte blocks
    pub fn card_capacity_blocks(&self) -> u32 {
        (self.card_capacity_bytes() / 512) as u32
    }
}

impl CsdV2 {
    fn data(&self) -> &[u8] {
        &self.data
    }

    define_field!(csd_ver, u8, 0, 6, 2);
    define_field!(read_block_length, u8, 5, 0, 4);
    define_field!(device_size, u32, [(7, 0, 6), (8, 0, 8), (9, 0, 8)]);
    define_field!(erase_single_block_enabled, bool, 10, 6);
    define_field!(crc, u8, 15, 1, 7);

    /// Returns the card capacity in bytes
    pub fn card_capacity_bytes(&self) -> u64 {
        (u64::from(self.device_size()) + 1) * 512 * 1024
    }

    /// Returns the card capacity in 512-byte blocks
    pub fn card_capacity_blocks(&self) -> u32 {
        (self.device_size() + 1) * 1024
    }
}

impl Csd {
    /// Pick the layout from the CSD_STRUCTURE bits. `None` for versions we
    /// don't know.
    pub fn from_bytes(data: [u8; 16]) -> Option<Csd> {
        match data[0] >> 6 {
            0 => Some(Csd::V1(CsdV1 { data })),
            1 => Some(Csd::V2(CsdV2 { data })),
            _ => None,
        }
    }

    /// Usable card capacity in bytes.
    pub fn card_capacity_bytes(&self) -> u64 {
        match self {
            Csd::V1(contents) => contents.card_capacity_bytes(),
            Csd::V2(contents) => contents.card_capacity_bytes(),
        }
    }

    /// Can this card erase single blocks?
    pub fn erase_single_block_enabled(&self) -> bool {
        match self {
            Csd::V1(contents) => contents.erase_single_block_enabled(),
            Csd::V2(contents) => contents.erase_single_block_enabled(),
        }
    }
}

/// Perform the 7-bit CRC used on the SD card
pub fn crc7(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for mut d in data.iter().cloned() {
        for _bit in 0..8 {
            crc <<= 1;
            if ((d & 0x80) ^ (crc & 0x80)) != 0 {
                crc ^= 0x09;
            }
            d <<= 1;
        }
    }
    (crc << 1) | 1
}

/// Perform the X25 CRC calculation, as used for data blocks.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0u16;
    for &byte in data {
        crc = ((crc >> 8) & 0xFF) | (crc << 8);
        crc ^= u16::from(byte);
        crc ^= (crc & 0xFF) >> 4;
        crc ^= crc << 12;
        crc ^= (crc & 0xFF) << 5;
    }
    crc
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
