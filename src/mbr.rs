//! sdspi-store - Master Boot Record partition tables
//!
//! Only the four primary entries are understood. A card formatted as a
//! "superfloppy" has no table at all; see [`crate::fat::locate_volume`].

use crate::{Block, BlockCount, BlockDevice, BlockIdx};
use core::fmt::Debug;

/// Something went wrong reading the partition table.
#[derive(Debug)]
pub enum Error<BlockDeviceError>
where
    BlockDeviceError: Debug,
{
    /// The underlying device failed.
    DeviceError(BlockDeviceError),
    /// Block 0 does not end in `55 AA`.
    InvalidMbrSignature,
    /// The status byte was neither `0x00` nor `0x80`.
    InvalidPartitionStatus,
    /// The entry is empty or holds something other than FAT.
    UnsupportedPartitionType(u8),
    /// None of the four entries holds a FAT volume.
    NoFatPartition,
}

impl<BDE> From<BDE> for Error<BDE>
where
    BDE: Debug,
{
    fn from(e: BDE) -> Self {
        Self::DeviceError(e)
    }
}

/// One of the four primary partition slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionNumber {
    One = 0,
    Two = 1,
    Three = 2,
    Four = 3,
}

impl PartitionNumber {
    pub const ALL: [PartitionNumber; 4] = [Self::One, Self::Two, Self::Three, Self::Four];

    /// Map a 1-based partition number onto its slot.
    pub fn from_number(number: usize) -> Option<Self> {
        number
            .checked_sub(1)
            .and_then(|slot| Self::ALL.get(slot))
            .copied()
    }

    /// Byte offset of this entry inside block 0.
    fn table_offset(self) -> usize {
        Mbr::TABLE_START + self as usize * Partition::ENTRY_LEN
    }
}

/// The partition types we can mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionType {
    /// `0x0B`, FAT32 with CHS addressing. macOS Disk Utility writes this.
    Fat32ChsLba,
    /// `0x0C`, FAT32 with LBA. Some formatters use it for FAT16 too.
    Fat32Lba,
    /// `0x0E`, FAT16 with LBA.
    Fat16Lba,
    /// `0x06`, FAT16. The SD Association formatter writes this.
    Fat16,
    /// No partition table: the volume starts at block 0.
    Superfloppy,
}

impl PartitionType {
    /// Decode a partition type byte. Anything but FAT is `None`.
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x0B => Self::Fat32ChsLba,
            0x0C => Self::Fat32Lba,
            0x0E => Self::Fat16Lba,
            0x06 => Self::Fat16,
            _ => return None,
        })
    }
}

/// Errors from a [`PartitionBlockDevice`].
#[derive(Debug)]
pub enum PartitionError<E>
where
    E: Debug,
{
    DeviceError(E),
    OutOfRange { partition_block_count: BlockCount },
}

/// A view of a block device that starts at the partition's first block and
/// refuses to step past its last.
pub struct PartitionBlockDevice<'bd, 'part, BD>
where
    BD: BlockDevice,
{
    block_device: &'bd mut BD,
    partition: &'part Partition,
}

impl<'bd, 'part, BD> PartitionBlockDevice<'bd, 'part, BD>
where
    BD: BlockDevice,
{
    /// Where `count` blocks from `start` land on the whole device.
    fn translate(
        &self,
        start: BlockIdx,
        count: usize,
    ) -> Result<BlockIdx, PartitionError<BD::Error>> {
        let fits = u32::try_from(count)
            .ok()
            .and_then(|count| start.0.checked_add(count))
            .map_or(false, |end| end <= self.partition.block_count.0);
        if !fits {
            return Err(PartitionError::OutOfRange {
                partition_block_count: self.partition.block_count,
            });
        }
        Ok(start + self.partition.lba_start)
    }
}

impl<'bd, 'part, BD> BlockDevice for PartitionBlockDevice<'bd, 'part, BD>
where
    BD: BlockDevice,
{
    type Error = PartitionError<BD::Error>;

    fn read(
        &mut self,
        blocks: &mut [Block],
        start: BlockIdx,
        reason: &str,
    ) -> Result<(), Self::Error> {
        let start = self.translate(start, blocks.len())?;
        self.block_device
            .read(blocks, start, reason)
            .map_err(PartitionError::DeviceError)
    }

    fn write(&mut self, blocks: &[Block], start: BlockIdx) -> Result<(), Self::Error> {
        let start = self.translate(start, blocks.len())?;
        self.block_device
            .write(blocks, start)
            .map_err(PartitionError::DeviceError)
    }

    fn num_blocks(&mut self) -> Result<BlockCount, Self::Error> {
        Ok(self.partition.block_count)
    }
}

/// Where a FAT volume lives on the card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub ty: PartitionType,
    pub lba_start: BlockCount,
    pub block_count: BlockCount,
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

impl Partition {
    pub(crate) const ENTRY_LEN: usize = 16;

    /// Parse one partition table entry.
    ///
    /// Layout: status at 0, type at 4, first LBA at 8, length at 12.
    pub fn from_entry<E>(entry: &[u8; Partition::ENTRY_LEN]) -> Result<Self, Error<E>>
    where
        E: Debug,
    {
        match entry[0] {
            0x00 | 0x80 => {}
            _ => return Err(Error::InvalidPartitionStatus),
        }
        let ty = PartitionType::from_u8(entry[4])
            .ok_or(Error::UnsupportedPartitionType(entry[4]))?;
        Ok(Partition {
            ty,
            lba_start: BlockCount(le_u32(entry, 8)),
            block_count: BlockCount(le_u32(entry, 12)),
        })
    }

    /// Borrow `block_device` as a view of just this partition.
    pub fn with_block_device<'bd, 'part, BD>(
        &'part self,
        block_device: &'bd mut BD,
    ) -> PartitionBlockDevice<'bd, 'part, BD>
    where
        BD: BlockDevice,
    {
        PartitionBlockDevice {
            block_device,
            partition: self,
        }
    }
}

/// Block 0 of a partitioned card.
pub struct Mbr {
    block: Block,
}

impl Mbr {
    const TABLE_START: usize = 446;
    const SIGNATURE: [u8; 2] = [0x55, 0xAA];

    /// Read block 0 and check its boot signature.
    pub fn read<BD>(block_device: &mut BD) -> Result<Mbr, Error<BD::Error>>
    where
        BD: BlockDevice,
    {
        let block = block_device.read_block(BlockIdx(0))?;
        if block[510..512] != Self::SIGNATURE {
            return Err(Error::InvalidMbrSignature);
        }
        Ok(Mbr { block })
    }

    /// Read block 0 and decode one of its entries.
    pub fn read_partition<BD>(
        block_device: &mut BD,
        number: PartitionNumber,
    ) -> Result<Partition, Error<BD::Error>>
    where
        BD: BlockDevice,
    {
        Self::read(block_device)?.partition(number)
    }

    pub fn partition<E>(&self, number: PartitionNumber) -> Result<Partition, Error<E>>
    where
        E: Debug,
    {
        let at = number.table_offset();
        let mut entry = [0u8; Partition::ENTRY_LEN];
        entry.copy_from_slice(&self.block[at..at + Partition::ENTRY_LEN]);
        Partition::from_entry(&entry)
    }

    /// The first entry holding a FAT volume.
    pub fn first_fat_partition<E>(&self) -> Result<Partition, Error<E>>
    where
        E: Debug,
    {
        PartitionNumber::ALL
            .iter()
            .find_map(|&number| self.partition::<E>(number).ok())
            .ok_or(Error::NoFatPartition)
    }
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
