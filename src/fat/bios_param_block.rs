//! sdspi-store - BIOS Parameter Block
//!
//! The geometry of a FAT16 or FAT32 volume, as recorded in its first sector.

use core::num::{NonZeroU16, NonZeroU32, NonZeroU8};

use crate::Block;

use super::FatType;

/// A boot sector that passed validation, with the geometry derived from it.
#[derive(Debug, Clone)]
pub struct BiosParameterBlock {
    raw: BiosParameterBlockRaw,
    fat_type: FatType,
    bytes_per_sector: NonZeroU16,
    sectors_per_cluster: NonZeroU8,
    reserved_sectors: NonZeroU16,
    num_fats: u8,
    fat_size: u32,
    total_sectors: NonZeroU32,
    cluster_count: u32,
}

/// Why a sector was rejected as a boot sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BpbError {
    InvalidSignature([u8; 2]),
    InvalidBytesPerSector(u16),
    InvalidSectorsPerCluster(u8),
    ReservedSectorCountZero,
    NoFats,
    InvalidMedia(u8),
    BothSectorCountsZero,
    BothSectorCountsNotZero,
    /// The metadata regions claim more sectors than the volume has.
    MetadataTooLarge,
    Fat12NotSupported,
    RootEntryCountSize,
    Fat32(Fat32BpbError),
    /// A FAT32-only field was asked of a FAT16 volume.
    Fat32Field(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fat32BpbError {
    Count16NotZero,
    FatSize16NotZero,
    RootEntryCountNotZero,
    FsVerNotZero,
    RootClusterLessThanTwo,
    InvalidBackupBootSector(u16),
}

impl BiosParameterBlock {
    pub(crate) const SIGNATURE: [u8; 2] = [0x55, 0xAA];

    /// Bytes in one directory entry.
    const DIR_ENTRY_LEN: u32 = 32;

    /// Validate `block` as a boot sector. Boot code, labels and the other
    /// BS_* fields are not looked at.
    pub fn new(block: Block) -> Result<Self, BpbError> {
        let raw = BiosParameterBlockRaw::new(block);

        // Random data and partition tables fail here.
        let signature = raw.signature_word();
        if signature != Self::SIGNATURE {
            return Err(BpbError::InvalidSignature(signature));
        }

        // The card driver only moves 512 byte blocks.
        let bytes_per_sector = NonZeroU16::new(raw.bytes_per_sec())
            .filter(|bytes| bytes.get() == 512)
            .ok_or(BpbError::InvalidBytesPerSector(raw.bytes_per_sec()))?;
        let sectors_per_cluster = NonZeroU8::new(raw.sec_per_clu())
            .filter(|sectors| sectors.get().is_power_of_two())
            .ok_or(BpbError::InvalidSectorsPerCluster(raw.sec_per_clu()))?;
        let reserved_sectors =
            NonZeroU16::new(raw.rsvd_sec_cnt()).ok_or(BpbError::ReservedSectorCountZero)?;
        let num_fats = match raw.num_fats() {
            0 => return Err(BpbError::NoFats),
            n => n,
        };
        match raw.media() {
            0xF0 | 0xF8..=0xFF => {}
            other => return Err(BpbError::InvalidMedia(other)),
        }

        let fat_size = match raw.fat_sz_16() {
            0 => raw.fat_sz_32(),
            n => u32::from(n),
        };
        let total_sectors = match (raw.tot_sec_16(), raw.tot_sec_32()) {
            (0, n) => NonZeroU32::new(n).ok_or(BpbError::BothSectorCountsZero)?,
            (n, 0) => NonZeroU32::new(u32::from(n)).ok_or(BpbError::BothSectorCountsZero)?,
            _ => return Err(BpbError::BothSectorCountsNotZero),
        };

        let root_dir_sectors = Self::compute_root_dir_sectors(
            u32::from(raw.root_entr_cnt()),
            u32::from(bytes_per_sector.get()),
        );
        let data_sectors = u32::from(num_fats)
            .checked_mul(fat_size)
            .and_then(|fats| fats.checked_add(u32::from(reserved_sectors.get())))
            .and_then(|metadata| metadata.checked_add(root_dir_sectors))
            .and_then(|metadata| total_sectors.get().checked_sub(metadata))
            .ok_or(BpbError::MetadataTooLarge)?;
        let cluster_count = data_sectors / u32::from(sectors_per_cluster.get());

        // The FAT type follows from the cluster count alone.
        let fat_type = match cluster_count {
            0..=4084 => return Err(BpbError::Fat12NotSupported),
            4085..=65524 => FatType::Fat16,
            _ => FatType::Fat32,
        };
        match fat_type {
            FatType::Fat16 => {
                let root_bytes = u32::from(raw.root_entr_cnt()) * Self::DIR_ENTRY_LEN;
                if root_bytes == 0 || root_bytes % u32::from(bytes_per_sector.get()) != 0 {
                    return Err(BpbError::RootEntryCountSize);
                }
            }
            FatType::Fat32 => Self::check_fat32_zeroes(&raw)?,
        }

        Ok(Self {
            raw,
            fat_type,
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors,
            num_fats,
            fat_size,
            total_sectors,
            cluster_count,
        })
    }

    /// FAT32 leaves the FAT16 size, count and root directory fields at 0.
    fn check_fat32_zeroes(raw: &BiosParameterBlockRaw) -> Result<(), BpbError> {
        let error = if raw.root_entr_cnt() != 0 {
            Fat32BpbError::RootEntryCountNotZero
        } else if raw.tot_sec_16() != 0 {
            Fat32BpbError::Count16NotZero
        } else if raw.fat_sz_16() != 0 {
            Fat32BpbError::FatSize16NotZero
        } else {
            return Ok(());
        };
        Err(BpbError::Fat32(error))
    }

    pub fn compute_root_dir_sectors(root_entry_count: u32, bytes_per_sector: u32) -> u32 {
        let bytes = root_entry_count * Self::DIR_ENTRY_LEN;
        (bytes + bytes_per_sector - 1) / bytes_per_sector
    }

    pub fn fat_type(&self) -> FatType {
        self.fat_type
    }

    pub fn bytes_per_sector(&self) -> NonZeroU16 {
        self.bytes_per_sector
    }

    pub fn sectors_per_cluster(&self) -> NonZeroU8 {
        self.sectors_per_cluster
    }

    /// Sectors before the first FAT, the boot sector included.
    pub fn reserved_sector_count(&self) -> NonZeroU16 {
        self.reserved_sectors
    }

    pub fn num_fats(&self) -> u8 {
        self.num_fats
    }

    /// Sectors occupied by one copy of the FAT.
    pub fn fat_size(&self) -> u32 {
        self.fat_size
    }

    /// Every sector of the volume, metadata included.
    pub fn total_sector_count(&self) -> u32 {
        self.total_sectors.get()
    }

    /// Number of data clusters.
    pub fn cluster_count(&self) -> u32 {
        self.cluster_count
    }

    /// Cluster numbers start at 2.
    pub fn maximum_valid_cluster(&self) -> u32 {
        self.cluster_count + 1
    }

    fn fat32_field(&self, name: &'static str) -> Result<(), BpbError> {
        match self.fat_type {
            FatType::Fat32 => Ok(()),
            FatType::Fat16 => Err(BpbError::Fat32Field(name)),
        }
    }

    pub fn fs_version(&self) -> Result<u16, BpbError> {
        self.fat32_field("fs_version")?;
        match self.raw.fs_ver() {
            0 => Ok(0),
            _ => Err(BpbError::Fat32(Fat32BpbError::FsVerNotZero)),
        }
    }

    pub fn root_cluster(&self) -> Result<u32, BpbError> {
        self.fat32_field("root_cluster")?;
        match self.raw.root_clus() {
            0 | 1 => Err(BpbError::Fat32(Fat32BpbError::RootClusterLessThanTwo)),
            cluster => Ok(cluster),
        }
    }

    /// Sector (relative to the volume) holding the FSInfo structure.
    pub fn fs_info(&self) -> Result<u16, BpbError> {
        self.fat32_field("fs_info")?;
        Ok(self.raw.fs_info())
    }

    /// Sector of the backup boot sector: 6, or 0 for none.
    pub fn bk_boot_sector(&self) -> Result<u16, BpbError> {
        self.fat32_field("bk_boot_sector")?;
        match self.raw.bk_boot_sec() {
            sector @ (0 | 6) => Ok(sector),
            other => Err(BpbError::Fat32(Fat32BpbError::InvalidBackupBootSector(other))),
        }
    }
}

/// Raw field access over a boot sector.
#[derive(Debug, Clone)]
pub struct BiosParameterBlockRaw {
    block: Block,
}

impl BiosParameterBlockRaw {
    /// Wrap a sector without checking anything.
    pub fn new(block: Block) -> Self {
        Self { block }
    }

    /// Give back the sector, including any fields set since.
    pub fn into_block(self) -> Block {
        self.block
    }

    fn data(&self) -> &[u8] {
        &self.block.contents
    }

    fn data_mut(&mut self) -> &mut [u8] {
        &mut self.block.contents
    }

    define_field!(bytes_per_sec, set_bytes_per_sec, u16, 11);
    define_field!(sec_per_clu, set_sec_per_clu, u8, 13);
    define_field!(rsvd_sec_cnt, set_rsvd_sec_cnt, u16, 14);
    define_field!(num_fats, set_num_fats, u8, 16);
    define_field!(root_entr_cnt, set_root_entr_cnt, u16, 17);
    define_field!(tot_sec_16, set_tot_sec_16, u16, 19);
    define_field!(media, set_media, u8, 21);
    define_field!(fat_sz_16, set_fat_sz_16, u16, 22);
    define_field!(tot_sec_32, set_tot_sec_32, u32, 32);

    // FAT32 only
    define_field!(fat_sz_32, set_fat_sz_32, u32, 36);
    define_field!(fs_ver, u16, 42);
    define_field!(root_clus, set_root_clus, u32, 44);
    define_field!(fs_info, set_fs_info, u16, 48);
    define_field!(bk_boot_sec, set_bk_boot_sec, u16, 50);

    fn signature_word(&self) -> [u8; 2] {
        [self.data()[510], self.data()[511]]
    }

    pub fn set_signature(&mut self, signature: [u8; 2]) {
        self.data_mut()[510..512].copy_from_slice(&signature);
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
