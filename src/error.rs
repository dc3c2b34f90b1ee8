//! sdspi-store - Errors
//!
//! The driver layers below keep their own small error enums, generic over the
//! block device. Everything that touches files or the mount state reports
//! through [`Error`].

use std::io;
use std::path::PathBuf;

/// Why a mount attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MountError {
    /// Nothing answered on the bus.
    #[error("no card present")]
    NoCard,
    /// A card answered but could not be brought up, or holds no FAT volume.
    #[error("card present but mount failed")]
    MountFailed,
}

/// Everything the storage layer can report to a caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No card detected.
    #[error("no card present")]
    DeviceAbsent,
    /// The card is there but the filesystem could not be mounted.
    #[error("mount failed")]
    MountFailed,
    /// Storage was not mounted when the call was made.
    #[error("storage not mounted")]
    Unmounted,
    /// An open, read, write or seek failed on a mounted volume.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A path or row index does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The temporary file could not be swapped into place.
    #[error("could not rename {} to {}: {source}", .from.display(), .to.display())]
    RenameFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Wrap an I/O error with the path it happened on.
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Error {
        let path = path.into();
        move |source| Error::Io { path, source }
    }

    /// Like [`Error::io`], but a missing file becomes [`Error::NotFound`].
    pub(crate) fn open(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Error {
        let path = path.into();
        move |source| {
            if source.kind() == io::ErrorKind::NotFound {
                Error::NotFound(path.display().to_string())
            } else {
                Error::Io { path, source }
            }
        }
    }
}

impl From<MountError> for Error {
    fn from(e: MountError) -> Self {
        match e {
            MountError::NoCard => Error::DeviceAbsent,
            MountError::MountFailed => Error::MountFailed,
        }
    }
}

/// Short for `core::result::Result<T, sdspi_store::Error>`.
pub type Result<T> = core::result::Result<T, Error>;

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
