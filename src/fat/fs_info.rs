//! sdspi-store - FAT32 FSInfo sector
//!
//! A hint, kept by whoever last wrote the volume, of how many clusters are
//! free. Nothing forces a writer to keep it up to date, so callers fall back
//! to scanning the FAT when it is missing or implausible.

use crate::Block;

/// Raw field access over an FSInfo sector.
#[derive(Debug, Clone)]
pub struct FsInfo {
    block: Block,
}

impl FsInfo {
    pub const LEAD_SIGNATURE: u32 = 0x4161_5252;
    pub const STRUCT_SIGNATURE: u32 = 0x6141_7272;
    pub const TRAIL_SIGNATURE: u32 = 0xAA55_0000;
    /// Written when the free count has never been computed.
    pub const UNKNOWN: u32 = 0xFFFF_FFFF;

    pub fn new(block: Block) -> Self {
        Self { block }
    }

    pub fn into_block(self) -> Block {
        self.block
    }

    fn data(&self) -> &[u8] {
        &self.block.contents
    }

    fn data_mut(&mut self) -> &mut [u8] {
        &mut self.block.contents
    }

    define_field!(lead_sig, set_lead_sig, u32, 0);
    define_field!(struc_sig, set_struc_sig, u32, 484);
    define_field!(free_count, set_free_count, u32, 488);
    define_field!(nxt_free, set_nxt_free, u32, 492);
    define_field!(trail_sig, set_trail_sig, u32, 508);

    /// All three signatures are in place.
    pub fn is_valid(&self) -> bool {
        self.lead_sig() == Self::LEAD_SIGNATURE
            && self.struc_sig() == Self::STRUCT_SIGNATURE
            && self.trail_sig() == Self::TRAIL_SIGNATURE
    }

    /// The free cluster count, if it is recorded and no larger than the
    /// volume.
    pub fn free_clusters(&self, cluster_count: u32) -> Option<u32> {
        if !self.is_valid() {
            return None;
        }
        match self.free_count() {
            Self::UNKNOWN => None,
            n if n > cluster_count => None,
            n => Some(n),
        }
    }

    /// Build a valid sector recording `free_count` free clusters.
    pub fn with_free_count(free_count: u32) -> Self {
        let mut info = Self::new(Block::new());
        info.set_lead_sig(Self::LEAD_SIGNATURE);
        info.set_struc_sig(Self::STRUCT_SIGNATURE);
        info.set_free_count(free_count);
        info.set_nxt_free(Self::UNKNOWN);
        info.set_trail_sig(Self::TRAIL_SIGNATURE);
        info
    }
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
