// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Output archive.
//!
//! Everything the packet layer recovers lands in one ZIP file. The wrapper
//! here owns the [`zip::ZipWriter`] plus the bookkeeping the recovery
//! report needs: per-entry declared vs. written byte counts, a CRC of every
//! file body (checked against ARCserve's file trailers), and in-memory
//! copies of any `.CAT` files seen, which the catalog cross-check replays
//! after extraction.
//!
//! The writer must stay valid through abandonment: an aborted run calls
//! [`TapeArchive::finish`] on whatever was written so far and still gets a
//! readable archive.

use std::io::{self, Seek, Write};

use chrono::{Datelike, NaiveDateTime, Timelike};
use thiserror::Error;
use tracing::{debug, warn};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::arcserve::time::unix_epoch;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("zip error: {0}")]
    Zip(#[from] ZipError),
    #[error("I/O error writing archive: {0}")]
    Io(#[from] io::Error),
    #[error("file data arrived with no open archive entry")]
    NoOpenEntry,
}

/// One recovered entry, as the damage report sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    pub path: String,
    pub is_dir: bool,
    /// Size the packet declared, where the dialect carries one.
    pub declared: u64,
    /// Bytes actually written into the archive.
    pub written: u64,
}

impl EntryRecord {
    pub fn is_damaged(&self) -> bool {
        !self.is_dir && self.declared != self.written
    }
}

/// An in-memory copy of a recovered ARCserve catalog file.
#[derive(Debug, Clone)]
pub struct CatalogBlob {
    pub path: String,
    pub data: Vec<u8>,
}

/// One line of the ordered packet log the archive keeps for correlation.
#[derive(Debug, Clone)]
pub struct PacketSummary {
    pub stream_offset: u64,
    pub kind: &'static str,
    pub detail: String,
}

/// Everything left over once the ZIP central directory is on disk.
pub struct FinishedArchive<W> {
    pub entries: Vec<EntryRecord>,
    pub catalogs: Vec<CatalogBlob>,
    pub packets: Vec<PacketSummary>,
    /// The underlying writer, positioned past the central directory.
    pub writer: W,
}

struct OpenEntry {
    path: String,
    written: u64,
    crc: crc32fast::Hasher,
    /// Set while the entry is a `.CAT` catalog, which the cross-check
    /// wants back after extraction.
    capture: Option<Vec<u8>>,
}

/// The single output archive of a recovery run.
pub struct TapeArchive<W: Write + Seek> {
    zip: ZipWriter<W>,
    /// Root path of the session currently being extracted, supplied by the
    /// last session header.
    pub current_base_path: Option<String>,
    entries: Vec<EntryRecord>,
    catalogs: Vec<CatalogBlob>,
    packets: Vec<PacketSummary>,
    open: Option<OpenEntry>,
    last_file: Option<(String, u32)>,
}

impl<W: Write + Seek> TapeArchive<W> {
    pub fn new(writer: W) -> Self {
        Self {
            zip: ZipWriter::new(writer),
            current_base_path: None,
            entries: Vec::new(),
            catalogs: Vec::new(),
            packets: Vec::new(),
            open: None,
            last_file: None,
        }
    }

    fn options(modified: NaiveDateTime) -> SimpleFileOptions {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        if modified == unix_epoch() {
            return options;
        }
        match zip::DateTime::from_date_and_time(
            modified.year() as u16,
            modified.month() as u8,
            modified.day() as u8,
            modified.hour() as u8,
            modified.minute() as u8,
            modified.second() as u8,
        ) {
            Ok(time) => options.last_modified_time(time),
            Err(_) => {
                // Pre-1980 times cannot be expressed in a ZIP header.
                debug!(%modified, "timestamp not representable in zip, leaving default");
                options
            }
        }
    }

    /// Add a directory entry (trailing separator appended as ARCserve
    /// paths use).
    pub fn add_directory(
        &mut self,
        path: &str,
        modified: NaiveDateTime,
    ) -> Result<(), ArchiveError> {
        self.close_dangling_entry()?;
        let name = format!("{}\\", path.trim_end_matches(['\\', '/']));
        self.zip.add_directory(&name, Self::options(modified))?;
        self.entries.push(EntryRecord {
            path: name,
            is_dir: true,
            declared: 0,
            written: 0,
        });
        Ok(())
    }

    /// Open a file entry; subsequent [`Write`] calls fill it until
    /// [`TapeArchive::end_file`].
    pub fn start_file(
        &mut self,
        path: &str,
        modified: NaiveDateTime,
    ) -> Result<(), ArchiveError> {
        self.close_dangling_entry()?;
        self.zip.start_file(path, Self::options(modified))?;
        let capture = path
            .to_ascii_uppercase()
            .ends_with(".CAT")
            .then(Vec::new);
        self.open = Some(OpenEntry {
            path: path.to_owned(),
            written: 0,
            crc: crc32fast::Hasher::new(),
            capture,
        });
        Ok(())
    }

    /// Close the open file entry, recording how many bytes the packet
    /// declared it should have held.
    pub fn end_file(&mut self, declared: u64) -> Result<&EntryRecord, ArchiveError> {
        let open = self.open.take().ok_or(ArchiveError::NoOpenEntry)?;
        if let Some(data) = open.capture {
            self.catalogs.push(CatalogBlob {
                path: open.path.clone(),
                data,
            });
        }
        self.last_file = Some((open.path.clone(), open.crc.finalize()));
        self.entries.push(EntryRecord {
            path: open.path,
            is_dir: false,
            declared,
            written: open.written,
        });
        Ok(self.entries.last().expect("entry was just pushed"))
    }

    /// Bytes written into the currently open entry.
    pub fn open_entry_written(&self) -> Option<u64> {
        self.open.as_ref().map(|open| open.written)
    }

    /// Path and CRC32 of the most recently closed file, for trailer
    /// verification.
    pub fn last_file(&self) -> Option<&(String, u32)> {
        self.last_file.as_ref()
    }

    pub fn record_packet(&mut self, stream_offset: u64, kind: &'static str, detail: String) {
        self.packets.push(PacketSummary {
            stream_offset,
            kind,
            detail,
        });
    }

    pub fn entries(&self) -> &[EntryRecord] {
        &self.entries
    }

    /// A packet died with its entry still open. Close it so the archive
    /// stays consistent; the record keeps whatever was written.
    fn close_dangling_entry(&mut self) -> Result<(), ArchiveError> {
        if let Some(open) = &self.open {
            warn!(
                path = %open.path,
                written = open.written,
                "archive entry was left open; closing short"
            );
            let written = open.written;
            self.end_file(written)?;
        }
        Ok(())
    }

    /// Write the central directory. Valid even when the run was cut short.
    pub fn finish(mut self) -> Result<FinishedArchive<W>, ArchiveError> {
        self.close_dangling_entry()?;
        let writer = self.zip.finish()?;
        Ok(FinishedArchive {
            entries: self.entries,
            catalogs: self.catalogs,
            packets: self.packets,
            writer,
        })
    }
}

impl<W: Write + Seek> Write for TapeArchive<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let open = self
            .open
            .as_mut()
            .ok_or_else(|| io::Error::other(ArchiveError::NoOpenEntry))?;
        self.zip.write_all(buf)?;
        open.written += buf.len() as u64;
        open.crc.update(buf);
        if let Some(capture) = &mut open.capture {
            capture.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.zip.flush()
    }
}
