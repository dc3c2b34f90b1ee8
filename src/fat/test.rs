use std::collections::HashMap;

use crate::mbr::PartitionType;
use crate::{Block, BlockCount, BlockDevice, BlockIdx, MemoryBlockDevice};

use super::bios_param_block::{BiosParameterBlock, BiosParameterBlockRaw, BpbError};
use super::fs_info::FsInfo;
use super::*;

const FAT16_SECTORS: u32 = 8192;
const FAT16_CLUSTERS: u32 = 8127;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Only blocks that were written take up memory; the rest read as zeroes.
#[derive(Default)]
struct SparseDevice {
    blocks: HashMap<BlockIdx, Block>,
    num_blocks: u32,
    reads: usize,
}

impl BlockDevice for SparseDevice {
    type Error = ();

    fn read(&mut self, blocks: &mut [Block], start: BlockIdx, _reason: &str) -> Result<(), ()> {
        for (idx, block) in start.range(BlockCount(blocks.len() as u32)).zip(blocks.iter_mut()) {
            if idx.0 >= self.num_blocks {
                return Err(());
            }
            self.reads += 1;
            *block = self.blocks.get(&idx).cloned().unwrap_or_default();
        }
        Ok(())
    }

    fn write(&mut self, blocks: &[Block], start: BlockIdx) -> Result<(), ()> {
        for (idx, block) in start.range(BlockCount(blocks.len() as u32)).zip(blocks.iter()) {
            self.blocks.insert(idx, block.clone());
        }
        Ok(())
    }

    fn num_blocks(&mut self) -> Result<BlockCount, ()> {
        Ok(BlockCount(self.num_blocks))
    }
}

// A FAT16 boot sector with 1 reserved sector, one 32 sector FAT and a 32
// sector root directory, followed by single sector clusters.
fn fat16_boot_sector() -> Block {
    let mut raw = BiosParameterBlockRaw::new(Block::new());
    raw.set_bytes_per_sec(512);
    raw.set_sec_per_clu(1);
    raw.set_rsvd_sec_cnt(1);
    raw.set_num_fats(1);
    raw.set_root_entr_cnt(512);
    raw.set_tot_sec_16(FAT16_SECTORS as u16);
    raw.set_fat_sz_16(32);
    raw.set_media(0xF8);
    raw.set_signature(BiosParameterBlock::SIGNATURE);
    raw.into_block()
}

// The first FAT sector with the two reserved entries and clusters 2..=11 in
// use.
fn fat16_first_fat_sector() -> Block {
    let mut fat = Block::new();
    for cluster in 0..12usize {
        let value: u16 = if cluster == 0 { 0xFFF8 } else { 0xFFFF };
        fat[cluster * 2..cluster * 2 + 2].copy_from_slice(&value.to_le_bytes());
    }
    fat
}

fn fat16_volume(offset: u32) -> MemoryBlockDevice {
    let mut bd = MemoryBlockDevice::zeroed(offset + FAT16_SECTORS);
    bd.write(&[fat16_boot_sector()], BlockIdx(offset)).unwrap();
    bd.write(&[fat16_first_fat_sector()], BlockIdx(offset + 1))
        .unwrap();
    bd
}

fn fat32_volume(fs_info_free: Option<u32>) -> SparseDevice {
    let mut bd = SparseDevice {
        num_blocks: 600_000,
        ..Default::default()
    };
    let mut raw = BiosParameterBlockRaw::new(Block::new());
    raw.set_bytes_per_sec(512);
    raw.set_sec_per_clu(8);
    raw.set_rsvd_sec_cnt(32);
    raw.set_num_fats(2);
    raw.set_root_entr_cnt(0);
    raw.set_tot_sec_32(600_000);
    raw.set_fat_sz_32(586);
    raw.set_media(0xF8);
    raw.set_root_clus(2);
    raw.set_fs_info(1);
    raw.set_bk_boot_sec(6);
    raw.set_signature(BiosParameterBlock::SIGNATURE);
    bd.write(&[raw.into_block()], BlockIdx(0)).unwrap();

    if let Some(free) = fs_info_free {
        bd.write(&[FsInfo::with_free_count(free).into_block()], BlockIdx(1))
            .unwrap();
    }

    // Reserved entries, then the root directory chain in clusters 2..=4.
    let mut fat = Block::new();
    for cluster in 0..5usize {
        fat[cluster * 4..cluster * 4 + 4].copy_from_slice(&0x0FFF_FFFFu32.to_le_bytes());
    }
    bd.write(&[fat], BlockIdx(32)).unwrap();

    // Padding after the last cluster must not count as allocated.
    let mut tail = Block::new();
    tail[396..400].copy_from_slice(&0x0FFF_FFFFu32.to_le_bytes());
    bd.write(&[tail], BlockIdx(32 + 584)).unwrap();
    bd
}

#[test]
fn fat16_geometry() {
    init();
    let bpb = BiosParameterBlock::new(fat16_boot_sector()).unwrap();
    assert_eq!(bpb.fat_type(), FatType::Fat16);
    assert_eq!(bpb.cluster_count(), FAT16_CLUSTERS);
    assert_eq!(bpb.total_sector_count(), FAT16_SECTORS);
    assert_eq!(bpb.fat_size(), 32);
    assert_eq!(
        bpb.fs_info().unwrap_err(),
        BpbError::Fat32Field("fs_info")
    );
}

#[test]
fn root_dir_sectors_counts_entry_bytes() {
    assert_eq!(BiosParameterBlock::compute_root_dir_sectors(512, 512), 32);
    assert_eq!(BiosParameterBlock::compute_root_dir_sectors(1, 512), 1);
    assert_eq!(BiosParameterBlock::compute_root_dir_sectors(0, 512), 0);
}

#[test]
fn rejects_bad_boot_sectors() {
    assert!(matches!(
        BiosParameterBlock::new(Block::new()),
        Err(BpbError::InvalidSignature([0, 0]))
    ));

    let mut raw = BiosParameterBlockRaw::new(fat16_boot_sector());
    raw.set_bytes_per_sec(4096);
    assert_eq!(
        BiosParameterBlock::new(raw.into_block()).unwrap_err(),
        BpbError::InvalidBytesPerSector(4096)
    );

    let mut raw = BiosParameterBlockRaw::new(fat16_boot_sector());
    raw.set_tot_sec_16(2048);
    assert_eq!(
        BiosParameterBlock::new(raw.into_block()).unwrap_err(),
        BpbError::Fat12NotSupported
    );

    let mut raw = BiosParameterBlockRaw::new(fat16_boot_sector());
    raw.set_tot_sec_16(40);
    assert_eq!(
        BiosParameterBlock::new(raw.into_block()).unwrap_err(),
        BpbError::MetadataTooLarge
    );

    let mut raw = BiosParameterBlockRaw::new(fat16_boot_sector());
    raw.set_sec_per_clu(3);
    assert_eq!(
        BiosParameterBlock::new(raw.into_block()).unwrap_err(),
        BpbError::InvalidSectorsPerCluster(3)
    );

    let mut raw = BiosParameterBlockRaw::new(fat16_boot_sector());
    raw.set_media(0x12);
    assert_eq!(
        BiosParameterBlock::new(raw.into_block()).unwrap_err(),
        BpbError::InvalidMedia(0x12)
    );

    let mut raw = BiosParameterBlockRaw::new(fat16_boot_sector());
    raw.set_tot_sec_32(FAT16_SECTORS);
    assert_eq!(
        BiosParameterBlock::new(raw.into_block()).unwrap_err(),
        BpbError::BothSectorCountsNotZero
    );
}

#[test]
fn superfloppy_volume() {
    init();
    let mut bd = fat16_volume(0);
    let partition = locate_volume(&mut bd).unwrap();
    assert_eq!(partition.ty, PartitionType::Superfloppy);
    assert_eq!(partition.lba_start, BlockCount(0));
    assert_eq!(partition.block_count, BlockCount(FAT16_SECTORS));
}

#[test]
fn fat16_free_space_scans_the_fat() {
    init();
    let mut bd = fat16_volume(0);
    let space = query_free_space(&mut bd).unwrap();
    assert_eq!(
        space,
        FreeSpace {
            total_sectors: u64::from(FAT16_CLUSTERS),
            free_sectors: u64::from(FAT16_CLUSTERS - 10),
            sector_size: 512,
        }
    );
    assert_eq!(space.used_bytes(), 10 * 512);
}

#[test]
fn fat16_inside_mbr_partition() {
    init();
    let mut bd = fat16_volume(2048);
    let mut mbr = Block::new();
    let entry: [u8; 16] = [
        0x00, 0, 0, 0, 0x0E, 0, 0, 0, 0x00, 0x08, 0x00, 0x00, 0x00, 0x20, 0x00, 0x00,
    ];
    mbr[446..462].copy_from_slice(&entry);
    mbr[510] = 0x55;
    mbr[511] = 0xAA;
    bd.write(&[mbr], BlockIdx(0)).unwrap();

    let partition = locate_volume(&mut bd).unwrap();
    assert_eq!(partition.ty, PartitionType::Fat16Lba);
    assert_eq!(partition.lba_start, BlockCount(2048));

    let space = query_free_space(&mut bd).unwrap();
    assert_eq!(space.free_sectors, u64::from(FAT16_CLUSTERS - 10));
}

#[test]
fn blank_card_has_no_volume() {
    init();
    let mut bd = MemoryBlockDevice::zeroed(16);
    assert!(matches!(locate_volume(&mut bd), Err(FatError::NoVolume)));
    assert!(matches!(query_free_space(&mut bd), Err(FatError::NoVolume)));
}

#[test]
fn fat32_trusts_fs_info() {
    init();
    let mut bd = fat32_volume(Some(70_000));
    let space = query_free_space(&mut bd).unwrap();
    assert_eq!(space.total_sectors, 598_792);
    assert_eq!(space.free_sectors, 560_000);
    assert_eq!(space.sector_size, 512);
    // Block 0 twice (locate, open) and the FSInfo sector: no FAT scan.
    assert_eq!(bd.reads, 3);
}

#[test]
fn fat32_scans_without_fs_info() {
    init();
    let mut bd = fat32_volume(None);
    let mut volume = FatVolume::new(&mut bd).unwrap();
    assert_eq!(volume.fat_type(), FatType::Fat32);
    assert_eq!(volume.bpb().cluster_count(), 74_849);
    assert_eq!(volume.bpb().root_cluster().unwrap(), 2);
    assert_eq!(volume.bpb().fs_version(), Ok(0));
    assert_eq!(volume.bpb().bk_boot_sector(), Ok(6));
    assert_eq!(volume.bpb().num_fats(), 2);
    assert_eq!(volume.free_cluster_count().unwrap(), 74_849 - 3);
}

#[test]
fn fat32_ignores_implausible_fs_info() {
    init();
    let mut bd = fat32_volume(Some(1_000_000));
    let space = query_free_space(&mut bd).unwrap();
    assert_eq!(space.free_sectors, (74_849 - 3) * 8);
}

#[test]
fn device_errors_surface() {
    let mut bd = SparseDevice::default();
    assert!(matches!(
        query_free_space(&mut bd),
        Err(FatError::DeviceError(()))
    ));
}
