//! sdspi-store - Whole-file rewrites
//!
//! The new contents are streamed into `<path>.tmp`, synced, and then swapped
//! in: delete the original, rename the copy. Until the delete the original is
//! untouched. A crash between delete and rename leaves only the `.tmp` file,
//! which [`recover`] puts back on the next access.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, error, warn};

use crate::error::{Error, Result};

/// Appended to the original path to name the temporary copy.
pub const TMP_SUFFIX: &str = ".tmp";

/// Characters that end a line.
pub(crate) const LINE_END: &[char] = &['\r', '\n'];

/// Read the next line, terminator included, into `buf`. Returns how many of
/// its bytes are content, or `None` at end of file. Bytes are taken as they
/// are; decoding is up to the caller.
pub(crate) fn next_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Option<usize>>
where
    R: BufRead,
{
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(None);
    }
    let content = buf
        .iter()
        .rposition(|&b| b != b'\r' && b != b'\n')
        .map_or(0, |last| last + 1);
    Ok(Some(content))
}

/// What to do with one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowAction {
    Keep,
    /// Write this line instead. Its terminator, if any, is replaced by the
    /// original line's.
    Replace(String),
    Drop,
}

/// Counts of what a rewrite did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RewriteStats {
    pub kept: usize,
    pub modified: usize,
    pub dropped: usize,
}

/// `<path>.tmp`
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(TMP_SUFFIX);
    PathBuf::from(tmp)
}

/// Clean up after an interrupted rewrite. If the original is gone but its
/// copy survived, the copy is renamed into place and `true` returned. A copy
/// left next to an intact original never got as far as the delete, so it is
/// discarded.
pub fn recover(path: &Path) -> Result<bool> {
    let tmp = tmp_path(path);
    if !tmp.exists() {
        return Ok(false);
    }
    if path.exists() {
        debug!("Discarding stale {}", tmp.display());
        fs::remove_file(&tmp).map_err(Error::io(&tmp))?;
        return Ok(false);
    }
    warn!(
        "{} is missing, restoring it from {}",
        path.display(),
        tmp.display()
    );
    fs::rename(&tmp, path).map_err(|source| Error::RenameFailed {
        from: tmp.clone(),
        to: path.to_path_buf(),
        source,
    })?;
    Ok(true)
}

/// Pass every row of `path` through `filter` and replace the file with the
/// result. Rows are numbered from 0; blank lines are not rows and are not
/// carried over.
///
/// `filter` sees each row decoded lossily as UTF-8. Kept rows are copied
/// byte for byte. A file whose last line had no terminator still ends
/// without one, whichever row ends up last.
pub fn rewrite<F>(path: &Path, mut filter: F) -> Result<RewriteStats>
where
    F: FnMut(usize, &str) -> RowAction,
{
    recover(path)?;
    let source = File::open(path).map_err(Error::open(path))?;
    let tmp = tmp_path(path);

    let stats = match stream(path, source, &tmp, &mut filter) {
        Ok(stats) => stats,
        Err(e) => {
            fs::remove_file(&tmp).ok();
            return Err(e);
        }
    };

    if let Err(e) = fs::remove_file(path) {
        fs::remove_file(&tmp).ok();
        return Err(Error::io(path)(e));
    }
    if let Err(source) = fs::rename(&tmp, path) {
        error!(
            "Rename {} -> {} failed, {} is missing: {}",
            tmp.display(),
            path.display(),
            path.display(),
            source
        );
        return Err(Error::RenameFailed {
            from: tmp,
            to: path.to_path_buf(),
            source,
        });
    }

    debug!("Rewrote {}: {:?}", path.display(), stats);
    Ok(stats)
}

fn stream<F>(path: &Path, source: File, tmp: &Path, filter: &mut F) -> Result<RewriteStats>
where
    F: FnMut(usize, &str) -> RowAction,
{
    let mut reader = BufReader::new(source);
    let mut writer = BufWriter::new(File::create(tmp).map_err(Error::io(tmp))?);
    let mut stats = RewriteStats::default();
    let mut line = Vec::new();
    let mut index = 0;
    // Held back until the next row is written, so the last one can lose it.
    let mut pending: Vec<u8> = Vec::new();
    let mut unterminated = false;

    while let Some(len) = next_line(&mut reader, &mut line).map_err(Error::io(path))? {
        if len == 0 {
            unterminated = false;
            continue;
        }
        let (content, terminator) = line.split_at(len);
        unterminated = terminator.is_empty();

        let row = match filter(index, &String::from_utf8_lossy(content)) {
            RowAction::Keep => {
                stats.kept += 1;
                Some(content.to_vec())
            }
            RowAction::Replace(new) => {
                stats.modified += 1;
                Some(new.trim_end_matches(LINE_END).as_bytes().to_vec())
            }
            RowAction::Drop => {
                stats.dropped += 1;
                None
            }
        };
        if let Some(row) = row {
            writer
                .write_all(&pending)
                .and_then(|_| writer.write_all(&row))
                .map_err(Error::io(tmp))?;
            pending.clear();
            pending.extend_from_slice(terminator);
        }
        index += 1;
    }
    if !unterminated {
        writer.write_all(&pending).map_err(Error::io(tmp))?;
    }

    let file = writer
        .into_inner()
        .map_err(|e| Error::io(tmp)(e.into_error()))?;
    file.sync_all().map_err(Error::io(tmp))?;
    Ok(stats)
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
