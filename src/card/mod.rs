//! sdspi-store - Card drivers
//!
//! [`CardDriver`] is the seam between the mount supervision and whatever
//! actually talks to the card. With the `spi` feature, `SpiCardDriver` is the
//! implementation over [`crate::sdmmc::SdMmcSpi`].

use core::fmt::{self, Debug};

use crate::config::MountConfig;
use crate::error::MountError;
use crate::fat::FreeSpace;
use crate::BlockDevice;

#[cfg(feature = "spi")]
mod spi;

#[cfg(feature = "spi")]
pub use self::spi::{SpiCard, SpiCardDriver};

/// Card family, as printed for the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardKind {
    SDSC,
    SDHC,
    SDXC,
}

impl fmt::Display for CardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CardKind::SDSC => "SDSC",
            CardKind::SDHC => "SDHC",
            CardKind::SDXC => "SDXC",
        };
        f.write_str(name)
    }
}

/// What a mounted card reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardDescriptor {
    pub kind: CardKind,
    pub capacity_bytes: u64,
}

/// Something that can bring a card up and take it down again.
pub trait CardDriver {
    /// A mounted card. Sector reads go through its `BlockDevice` impl.
    type Card: BlockDevice;
    /// Errors from querying a mounted card.
    type Error: Debug;

    /// Bring up the card and check that it holds a volume. Never formats.
    fn mount(&mut self, config: MountConfig) -> Result<Self::Card, MountError>;

    /// Release a card. Always succeeds, even if the card is gone.
    fn unmount(&mut self, card: Self::Card);

    /// Size and free space of the mounted volume.
    fn free_space(&mut self, card: &mut Self::Card) -> Result<FreeSpace, Self::Error>;

    /// Captured while mounting.
    fn descriptor(&self, card: &Self::Card) -> CardDescriptor;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn kind_names() {
        assert_eq!(CardKind::SDSC.to_string(), "SDSC");
        assert_eq!(CardKind::SDHC.to_string(), "SDHC");
        assert_eq!(CardKind::SDXC.to_string(), "SDXC");
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
