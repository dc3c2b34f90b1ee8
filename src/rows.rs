//! sdspi-store - Row store
//!
//! CSV style row files on the mounted volume. A [`RowStore`] borrows the
//! volume for as long as it lives; without one every call fails closed:
//! `Result`s carry [`Error::Unmounted`] and column reads come back empty.
//!
//! Rows are the non-blank lines of a file, numbered from 0.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::csv;
use crate::error::{Error, Result};
use crate::rewrite::{self, RowAction};
use crate::volume::Volume;

/// Row operations against one volume.
#[derive(Debug, Clone, Copy)]
pub struct RowStore<'v> {
    volume: Option<&'v Volume>,
}

impl<'v> RowStore<'v> {
    /// `None` gives a store that refuses everything, as when unmounted.
    pub fn new(volume: Option<&'v Volume>) -> Self {
        RowStore { volume }
    }

    pub fn is_mounted(&self) -> bool {
        self.volume.is_some()
    }

    /// Resolve `path`, finishing any interrupted rewrite first.
    fn locate(&self, path: &str) -> Result<PathBuf> {
        let full = self.volume.ok_or(Error::Unmounted)?.resolve(path);
        rewrite::recover(&full)?;
        Ok(full)
    }

    /// Visit rows in order until `visit` returns `false`. Bytes that are not
    /// UTF-8 reach `visit` as U+FFFD.
    fn scan<F>(full: &Path, mut visit: F) -> Result<()>
    where
        F: FnMut(usize, &str) -> bool,
    {
        let mut reader = BufReader::new(File::open(full).map_err(Error::open(full))?);
        let mut line = Vec::new();
        let mut index = 0;
        while let Some(len) = rewrite::next_line(&mut reader, &mut line).map_err(Error::io(full))? {
            if len == 0 {
                continue;
            }
            if !visit(index, &String::from_utf8_lossy(&line[..len])) {
                break;
            }
            index += 1;
        }
        Ok(())
    }

    /// Append one row, creating the file if needed.
    pub fn append_row<S>(&self, path: &str, fields: &[S]) -> Result<()>
    where
        S: AsRef<str>,
    {
        let full = self.locate(path)?;
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&full)
            .map_err(Error::io(&full))?;

        let mut line = String::new();
        // Don't glue the new row onto an unterminated last line.
        if file.metadata().map_err(Error::io(&full))?.len() > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1))
                .and_then(|_| file.read_exact(&mut last))
                .map_err(Error::io(&full))?;
            if last[0] != b'\n' {
                line.push('\n');
            }
        }
        line.push_str(&csv::encode(fields));
        file.write_all(line.as_bytes()).map_err(Error::io(&full))
    }

    /// Number of rows in `path`.
    pub fn row_count(&self, path: &str) -> Result<usize> {
        let full = self.locate(path)?;
        let mut count = 0;
        Self::scan(&full, |_, _| {
            count += 1;
            true
        })?;
        Ok(count)
    }

    /// Drop rows `start..=end`. Succeeds without touching the file when
    /// `start > end`.
    pub fn delete_rows(&self, path: &str, start: usize, end: usize) -> Result<()> {
        let full = self.locate(path)?;
        if start > end {
            return Ok(());
        }
        let stats = rewrite::rewrite(&full, |idx, _| {
            if (start..=end).contains(&idx) {
                RowAction::Drop
            } else {
                RowAction::Keep
            }
        })?;
        debug!("Deleted {} rows from {}", stats.dropped, path);
        Ok(())
    }

    /// Drop all but the last `n` rows. Leaves the file alone if it is already
    /// short enough.
    pub fn keep_last_n(&self, path: &str, n: usize) -> Result<()> {
        let total = self.row_count(path)?;
        if total <= n {
            return Ok(());
        }
        let full = self.locate(path)?;
        let drop = total - n;
        rewrite::rewrite(&full, |idx, _| {
            if idx < drop {
                RowAction::Drop
            } else {
                RowAction::Keep
            }
        })?;
        Ok(())
    }

    /// Field `column` of rows `start..=end`. Rows without that column are
    /// skipped.
    pub fn read_column_range(
        &self,
        path: &str,
        column: usize,
        start: usize,
        end: usize,
    ) -> Vec<String> {
        self.read_column_where(path, column, start, end, |_| true)
    }

    /// Like [`RowStore::read_column_range`], keeping only rows for which
    /// `predicate` holds.
    pub fn read_column_where<P>(
        &self,
        path: &str,
        column: usize,
        start: usize,
        end: usize,
        mut predicate: P,
    ) -> Vec<String>
    where
        P: FnMut(&[String]) -> bool,
    {
        let mut values = Vec::new();
        if start > end {
            return values;
        }
        let result = self.locate(path).and_then(|full| {
            Self::scan(&full, |idx, line| {
                if idx > end {
                    return false;
                }
                if idx >= start {
                    let mut fields = csv::decode(line);
                    if column < fields.len() && predicate(&fields) {
                        values.push(fields.swap_remove(column));
                    }
                }
                true
            })
        });
        if let Err(e) = result {
            warn!("Column read from {} failed: {}", path, e);
        }
        values
    }

    /// Set one cell. A column past the end of the row is reached by padding
    /// with empty fields.
    pub fn replace_cell(&self, path: &str, row: usize, column: usize, value: &str) -> Result<()> {
        let total = self.row_count(path)?;
        if row >= total {
            return Err(Error::NotFound(format!("{} row {}", path, row)));
        }
        let full = self.locate(path)?;
        rewrite::rewrite(&full, |idx, line| {
            if idx != row {
                return RowAction::Keep;
            }
            let mut fields = csv::decode(line);
            if column >= fields.len() {
                fields.resize(column + 1, String::new());
            }
            fields[column] = value.to_string();
            RowAction::Replace(csv::encode(&fields))
        })?;
        Ok(())
    }

    /// Row `index`, decoded.
    pub fn read_row(&self, path: &str, index: usize) -> Result<Vec<String>> {
        let full = self.locate(path)?;
        let mut found = None;
        Self::scan(&full, |idx, line| {
            if idx == index {
                found = Some(csv::decode(line));
                false
            } else {
                true
            }
        })?;
        found.ok_or_else(|| Error::NotFound(format!("{} row {}", path, index)))
    }

    /// The last row, decoded.
    pub fn last_row(&self, path: &str) -> Result<Vec<String>> {
        let full = self.locate(path)?;
        let mut last = None;
        Self::scan(&full, |_, line| {
            last = Some(line.to_string());
            true
        })?;
        last.map(|line| csv::decode(&line))
            .ok_or_else(|| Error::NotFound(format!("{} has no rows", path)))
    }

    /// Replace the whole file with a single row.
    pub fn write_row<S>(&self, path: &str, fields: &[S]) -> Result<()>
    where
        S: AsRef<str>,
    {
        let full = self.locate(path)?;
        fs::write(&full, csv::encode(fields)).map_err(Error::io(&full))
    }

    /// Write a header row unless the file already holds rows. Returns whether
    /// it was written.
    pub fn write_header<S>(&self, path: &str, fields: &[S]) -> Result<bool>
    where
        S: AsRef<str>,
    {
        match self.row_count(path) {
            Ok(0) | Err(Error::NotFound(_)) => {
                self.write_row(path, fields)?;
                Ok(true)
            }
            Ok(_) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Field `column` of the last row, as a number.
    pub fn latest_number(&self, path: &str, column: usize) -> Option<f64> {
        let row = self.last_row(path).ok()?;
        row.get(column)?.trim().parse().ok()
    }
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
