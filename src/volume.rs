//! sdspi-store - File operations on the mounted volume
//!
//! Paths are relative to the mount root; a leading `/` is allowed and
//! ignored. A [`Volume`] is only handed out while the card is mounted.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, error};

use crate::error::{Error, Result};

/// One entry from [`Volume::list_directory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Path relative to the mount root, starting with `/`.
    pub path: String,
    /// Zero for directories.
    pub size: u64,
    pub is_directory: bool,
}

/// The mounted filesystem, seen through its mount root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    root: PathBuf,
}

impl Volume {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Volume { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute form of `path`.
    pub fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    pub fn is_directory(&self, path: &str) -> bool {
        self.resolve(path).is_dir()
    }

    /// Create an empty file, truncating any existing one.
    pub fn create_file(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);
        File::create(&full).map_err(|e| {
            error!("Failed to create file: {}", full.display());
            Error::io(&full)(e)
        })?;
        Ok(())
    }

    /// Replace the contents of `path` with `data`.
    pub fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full = self.resolve(path);
        fs::write(&full, data).map_err(Error::io(&full))
    }

    pub fn append_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full = self.resolve(path);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&full)
            .map_err(Error::io(&full))?;
        file.write_all(data).map_err(Error::io(&full))
    }

    /// Append `line` and a newline.
    pub fn append_line(&self, path: &str, line: &str) -> Result<()> {
        let mut data = String::with_capacity(line.len() + 1);
        data.push_str(line);
        data.push('\n');
        self.append_file(path, data.as_bytes())
    }

    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path);
        fs::read(&full).map_err(Error::open(&full))
    }

    pub fn delete_file(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);
        fs::remove_file(&full).map_err(Error::open(&full))
    }

    pub fn create_directory(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);
        fs::create_dir(&full).map_err(Error::io(&full))
    }

    /// Remove an empty directory.
    pub fn remove_directory(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);
        fs::remove_dir(&full).map_err(Error::open(&full))
    }

    /// Size of `path` in bytes, found by seeking to its end.
    pub fn file_size(&self, path: &str) -> Result<u64> {
        let full = self.resolve(path);
        let mut file = File::open(&full).map_err(Error::open(&full))?;
        file.seek(SeekFrom::End(0)).map_err(Error::io(&full))
    }

    /// Entries below `path`, sorted by name. Subdirectories are descended
    /// into `depth` levels deep; `0` lists `path` alone.
    pub fn list_directory(&self, path: &str, depth: usize) -> Result<Vec<FileInfo>> {
        let mut entries = Vec::new();
        let prefix = format!("/{}", path.trim_matches('/'));
        self.list_into(&self.resolve(path), &prefix, depth, &mut entries)?;
        debug!("{} entries under {}", entries.len(), prefix);
        Ok(entries)
    }

    fn list_into(
        &self,
        dir: &Path,
        prefix: &str,
        depth: usize,
        entries: &mut Vec<FileInfo>,
    ) -> Result<()> {
        let mut children = fs::read_dir(dir)
            .map_err(Error::open(dir))?
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(Error::io(dir))?;
        children.sort_by_key(|child| child.file_name());

        for child in children {
            let metadata = child.metadata().map_err(Error::io(child.path()))?;
            let path = format!(
                "{}/{}",
                prefix.trim_end_matches('/'),
                child.file_name().to_string_lossy()
            );
            let is_directory = metadata.is_dir();
            entries.push(FileInfo {
                path: path.clone(),
                size: if is_directory { 0 } else { metadata.len() },
                is_directory,
            });
            if is_directory && depth > 0 {
                self.list_into(&child.path(), &path, depth - 1, entries)?;
            }
        }
        Ok(())
    }
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
