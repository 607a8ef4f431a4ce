/*
 * SPDX-FileCopyrightText: 2026 The webrank developers
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Reading and writing files of newline-delimited records.
//!
//! A record store is either a single file or a directory of files (as
//! written, for example, by a round of the computation, one file per
//! partition). In directories, hidden files and files starting with `_`
//! (e.g., Hadoop's `_SUCCESS` markers) are ignored.

use crate::record::Record;
use anyhow::{ensure, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Expands a list of files and directories into the list of record files
/// they contain, sorting the content of each directory by name.
pub fn record_files<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("Could not access {}", path.display()))?;
        if metadata.is_dir() {
            let mut dir_files = Vec::new();
            for entry in std::fs::read_dir(path)
                .with_context(|| format!("Could not list {}", path.display()))?
            {
                let entry = entry.with_context(|| format!("Could not list {}", path.display()))?;
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name.starts_with('.') || name.starts_with('_') {
                    continue;
                }
                if entry
                    .file_type()
                    .with_context(|| format!("Could not stat {}", entry.path().display()))?
                    .is_file()
                {
                    dir_files.push(entry.path());
                }
            }
            dir_files.sort();
            files.extend(dir_files);
        } else {
            files.push(path.to_owned());
        }
    }
    Ok(files)
}

/// Returns an iterator over the records of a file.
///
/// Empty lines are skipped; any other line that is not a valid
/// [`Record`] is an error carrying the path and line number.
pub fn read_records(path: impl AsRef<Path>) -> Result<impl Iterator<Item = Result<Record>>> {
    let path = path.as_ref().to_owned();
    let file =
        File::open(&path).with_context(|| format!("Could not open {}", path.display()))?;
    Ok(BufReader::new(file)
        .lines()
        .enumerate()
        .filter(|(_, line)| line.as_ref().map_or(true, |l| !l.is_empty()))
        .map(move |(i, line)| {
            let line = line.with_context(|| {
                format!("Error reading line {} of {}", i + 1, path.display())
            })?;
            Record::parse(&line)
                .with_context(|| format!("Error parsing line {} of {}", i + 1, path.display()))
        }))
}

/// Reads all records of the given files and directories in memory.
pub fn load_records<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    for file in record_files(paths)? {
        for record in read_records(&file)? {
            records.push(record?);
        }
    }
    Ok(records)
}

/// A buffered writer of records.
pub struct RecordWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    written: usize,
}

impl RecordWriter {
    /// Creates a new file at `path`, creating parent directories if needed.
    ///
    /// Fails if the file already exists.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        create_parent_dir(path)?;
        let file = File::options()
            .write(true)
            .create_new(true)
            .open(path)
            .with_context(|| format!("Could not create {}", path.display()))?;
        Ok(Self {
            writer: BufWriter::with_capacity(1 << 16, file),
            path: path.to_owned(),
            written: 0,
        })
    }

    /// Creates a new file at `path`, deleting it first if it exists.
    pub fn overwrite(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            log::info!("Deleting existing {}", path.display());
            if path.is_dir() {
                remove_dir_all(path)?;
            } else {
                std::fs::remove_file(path)
                    .with_context(|| format!("Could not delete {}", path.display()))?;
            }
        }
        Self::create(path)
    }

    pub fn write(&mut self, record: &Record) -> Result<()> {
        writeln!(self.writer, "{record}")
            .with_context(|| format!("Could not write to {}", self.path.display()))?;
        self.written += 1;
        Ok(())
    }

    /// Flushes the buffer and returns the number of records written.
    pub fn finish(mut self) -> Result<usize> {
        self.writer
            .flush()
            .with_context(|| format!("Could not flush {}", self.path.display()))?;
        Ok(self.written)
    }

    /// Returns the underlying buffered writer, for non-record output.
    pub fn into_inner(self) -> BufWriter<File> {
        self.writer
    }
}

/// Writes all records to a new file at `path`.
pub fn store_records<'a>(
    path: impl AsRef<Path>,
    records: impl IntoIterator<Item = &'a Record>,
) -> Result<usize> {
    let mut writer = RecordWriter::create(path)?;
    for record in records {
        writer.write(record)?;
    }
    writer.finish()
}

/// Creates all parent directories of the given file path.
pub fn create_parent_dir(file_path: impl AsRef<Path>) -> Result<()> {
    // ensure that the dst directory exists
    if let Some(parent_dir) = file_path.as_ref().parent() {
        if parent_dir.as_os_str().is_empty() {
            return Ok(());
        }
        std::fs::create_dir_all(parent_dir).with_context(|| {
            format!(
                "Failed to create the directory {:?}",
                parent_dir.to_string_lossy()
            )
        })?;
    }
    Ok(())
}

/// Deletes a directory and all its content.
pub fn remove_dir_all(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    ensure!(path.is_dir(), "{} is not a directory", path.display());
    std::fs::remove_dir_all(path).with_context(|| format!("Could not delete {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_read() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sub").join("part-00000");
        let records = vec![Record::new("a", "b,c"), Record::new("b,0.5", "")];
        assert_eq!(store_records(&path, &records)?, 2);
        assert_eq!(load_records([dir.path().join("sub")])?, records);
        // create refuses to clobber
        assert!(RecordWriter::create(&path).is_err());
        // overwrite does not
        let mut writer = RecordWriter::overwrite(&path)?;
        writer.write(&Record::new("z", ""))?;
        writer.finish()?;
        assert_eq!(load_records([&path])?, vec![Record::new("z", "")]);
        Ok(())
    }

    #[test]
    fn test_directory_listing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("part-00001"), "b\t\n")?;
        std::fs::write(dir.path().join("part-00000"), "a\tb\n\n")?;
        std::fs::write(dir.path().join("_SUCCESS"), "")?;
        std::fs::write(dir.path().join(".part-00000.crc"), "garbage")?;
        let files = record_files([dir.path()])?;
        assert_eq!(
            files,
            vec![dir.path().join("part-00000"), dir.path().join("part-00001")]
        );
        assert_eq!(
            load_records([dir.path()])?,
            vec![Record::new("a", "b"), Record::new("b", "")]
        );
        Ok(())
    }

    #[test]
    fn test_malformed_line() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("input");
        std::fs::write(&path, "a\tb\nno separator here\n")?;
        let err = load_records([&path]).unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
        Ok(())
    }

    #[test]
    fn test_remove_dir_all() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let scratch = dir.path().join("scratch");
        store_records(scratch.join("round-01").join("part-00000"), &[Record::new("a", "")])?;
        remove_dir_all(&scratch)?;
        assert!(!scratch.exists());
        assert!(remove_dir_all(&scratch).is_err());
        Ok(())
    }
}
