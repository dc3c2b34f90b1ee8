//! sdspi-store - FAT volume accounting
//!
//! Just enough FAT16/FAT32 to find a volume on a card and report how much of
//! it is in use. File access goes through the host filesystem.

use core::fmt::Debug;

use log::{debug, warn};

use crate::mbr::{self, Mbr, Partition, PartitionError, PartitionType};
use crate::{BlockCount, BlockDevice, BlockIdx};

use self::{
    bios_param_block::{BiosParameterBlock, BpbError},
    fs_info::FsInfo,
};

pub mod bios_param_block;
pub mod fs_info;

#[cfg(test)]
mod test;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatType {
    // Fat12
    Fat16,
    Fat32,
}

impl FatType {
    /// Bytes per FAT entry.
    fn entry_len(self) -> usize {
        match self {
            FatType::Fat16 => 2,
            FatType::Fat32 => 4,
        }
    }
}

#[derive(Debug)]
pub enum FatError<E>
where
    E: Debug,
{
    DeviceError(E),
    BpbError(BpbError),
    /// Neither block 0 nor the first partition holds a FAT volume.
    NoVolume,
    /// A read stepped outside the volume.
    OutOfRange,
}

impl<E> From<BpbError> for FatError<E>
where
    E: Debug,
{
    fn from(e: BpbError) -> Self {
        Self::BpbError(e)
    }
}

impl<E> From<mbr::Error<E>> for FatError<E>
where
    E: Debug,
{
    fn from(e: mbr::Error<E>) -> Self {
        match e {
            mbr::Error::DeviceError(e) => Self::DeviceError(e),
            other => {
                warn!("No FAT volume in partition table: {:?}", other);
                Self::NoVolume
            }
        }
    }
}

impl<E> FatError<PartitionError<E>>
where
    E: Debug,
{
    /// Collapse errors seen through a partition view onto the device's own.
    pub fn flatten(self) -> FatError<E> {
        match self {
            FatError::DeviceError(PartitionError::DeviceError(e)) => FatError::DeviceError(e),
            FatError::DeviceError(PartitionError::OutOfRange { .. }) => FatError::OutOfRange,
            FatError::BpbError(e) => FatError::BpbError(e),
            FatError::NoVolume => FatError::NoVolume,
            FatError::OutOfRange => FatError::OutOfRange,
        }
    }
}

/// Space on a volume, in sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeSpace {
    /// Sectors available to file data.
    pub total_sectors: u64,
    /// Of those, sectors in unallocated clusters.
    pub free_sectors: u64,
    /// Bytes per sector.
    pub sector_size: u32,
}

impl FreeSpace {
    pub fn total_bytes(&self) -> u64 {
        self.total_sectors * u64::from(self.sector_size)
    }

    pub fn free_bytes(&self) -> u64 {
        self.free_sectors * u64::from(self.sector_size)
    }

    pub fn used_bytes(&self) -> u64 {
        self.total_bytes().saturating_sub(self.free_bytes())
    }
}

/// A FAT volume whose first sector is block 0 of `block_device`.
pub struct FatVolume<BD>
where
    BD: BlockDevice,
{
    bpb: BiosParameterBlock,
    block_device: BD,
}

impl<BD> core::fmt::Debug for FatVolume<BD>
where
    BD: BlockDevice,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FatVolume").field("bpb", &self.bpb).finish()
    }
}

impl<BD> FatVolume<BD>
where
    BD: BlockDevice,
{
    pub fn new(mut block_device: BD) -> Result<Self, FatError<BD::Error>> {
        let bpb_block = block_device
            .read_block(BlockIdx(0))
            .map_err(FatError::DeviceError)?;

        let bpb = BiosParameterBlock::new(bpb_block)?;
        debug!(
            "{:?} volume: {} clusters of {} sectors",
            bpb.fat_type(),
            bpb.cluster_count(),
            bpb.sectors_per_cluster()
        );

        Ok(Self { bpb, block_device })
    }

    pub fn bpb(&self) -> &BiosParameterBlock {
        &self.bpb
    }

    pub fn fat_type(&self) -> FatType {
        self.bpb.fat_type()
    }

    /// Free clusters, from the FSInfo hint when it is usable and a full FAT
    /// scan otherwise.
    pub fn free_cluster_count(&mut self) -> Result<u32, BD::Error> {
        if let Some(free) = self.fs_info_free_count()? {
            debug!("FSInfo reports {} free clusters", free);
            return Ok(free);
        }
        self.count_free_clusters()
    }

    fn fs_info_free_count(&mut self) -> Result<Option<u32>, BD::Error> {
        let sector = match self.bpb.fs_info() {
            Ok(0) | Ok(0xFFFF) | Err(_) => return Ok(None),
            Ok(sector) => sector,
        };
        let block = self.block_device.read_block(BlockIdx(u32::from(sector)))?;
        Ok(FsInfo::new(block).free_clusters(self.bpb.cluster_count()))
    }

    /// Walk the first FAT and count entries marking free clusters.
    pub fn count_free_clusters(&mut self) -> Result<u32, BD::Error> {
        let fat_type = self.fat_type();
        let entry_len = fat_type.entry_len();
        let last_cluster = self.bpb.maximum_valid_cluster();
        let fat_start = BlockIdx(u32::from(self.bpb.reserved_sector_count().get()));

        let mut free = 0;
        let mut cluster = 0u32;
        for block_idx in fat_start.range(BlockCount(self.bpb.fat_size())) {
            if cluster > last_cluster {
                break;
            }
            let block = self.block_device.read_block(block_idx)?;
            for raw in block.contents.chunks_exact(entry_len) {
                if cluster > last_cluster {
                    break;
                }
                if cluster >= Entry::ALLOC_MIN && Entry::from_bytes(fat_type, raw).is_free()
                {
                    free += 1;
                }
                cluster += 1;
            }
        }
        debug!("FAT scan found {} free clusters", free);
        Ok(free)
    }

    /// Data area size and free space, in sectors.
    pub fn free_space(&mut self) -> Result<FreeSpace, BD::Error> {
        let sectors_per_cluster = u64::from(self.bpb.sectors_per_cluster().get());
        let free = self.free_cluster_count()?;
        Ok(FreeSpace {
            total_sectors: u64::from(self.bpb.cluster_count()) * sectors_per_cluster,
            free_sectors: u64::from(free) * sectors_per_cluster,
            sector_size: u32::from(self.bpb.bytes_per_sector().get()),
        })
    }
}

/// Find the FAT volume on a card: a boot sector in block 0 ("superfloppy"),
/// or failing that the first FAT entry in the MBR.
pub fn locate_volume<BD>(block_device: &mut BD) -> Result<Partition, FatError<BD::Error>>
where
    BD: BlockDevice,
{
    let first = block_device
        .read_block(BlockIdx(0))
        .map_err(FatError::DeviceError)?;
    match BiosParameterBlock::new(first) {
        Ok(bpb) => {
            debug!("Block 0 holds a {:?} boot sector", bpb.fat_type());
            return Ok(Partition {
                ty: PartitionType::Superfloppy,
                lba_start: BlockCount(0),
                block_count: BlockCount(bpb.total_sector_count()),
            });
        }
        Err(e) => debug!("Block 0 is not a boot sector ({:?}), trying the MBR", e),
    }
    Ok(Mbr::read(block_device)?.first_fat_partition::<BD::Error>()?)
}

/// Locate the volume and report its space.
pub fn query_free_space<BD>(block_device: &mut BD) -> Result<FreeSpace, FatError<BD::Error>>
where
    BD: BlockDevice,
{
    let partition = locate_volume(block_device)?;
    let mut volume =
        FatVolume::new(partition.with_block_device(block_device)).map_err(FatError::flatten)?;
    volume
        .free_space()
        .map_err(|e| FatError::DeviceError(e).flatten())
}

/// One FAT entry, with the reserved top nibble of FAT32 entries masked off.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entry(u32);

impl Entry {
    /// Entries 0 and 1 are reserved; clusters are numbered from 2.
    const ALLOC_MIN: u32 = 2;

    pub const FREE: Self = Self(0);

    /// Decode an entry from the first two (FAT16) or four (FAT32) bytes of
    /// `raw`.
    pub fn from_bytes(fat_type: FatType, raw: &[u8]) -> Self {
        match fat_type {
            FatType::Fat16 => Self(u32::from(u16::from_le_bytes([raw[0], raw[1]]))),
            FatType::Fat32 => {
                Self(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) & 0x0FFF_FFFF)
            }
        }
    }

    pub fn is_free(self) -> bool {
        self == Self::FREE
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
