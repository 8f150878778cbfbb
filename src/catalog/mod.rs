// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! # ARCserve catalogs
//!
//! At the end of a backup, ARCserve wrote a _catalog_ session: a `.CAT`
//! file listing every file of an earlier session with its size, times and
//! location inside the catalog's 16 KiB pages. When extraction recovers a
//! `.CAT` file it is kept in memory, and after the run each of its entries
//! is checked against what actually landed in the ZIP, the closest thing
//! a recovery has to ground truth.
//!
//! A catalog file is itself an ARCserve session: one session-header sector,
//! then packed entries, each opened by a `0xFF` marker byte:
//!
//! ```text
//! ├──┬──┬──┬──┬────┬────┬────────┬────┬────┬────┬──┬──┬──┬───┬─────────┤
//! │FF│sz│fs│md│ownr│attr│size    │mtim│page│poff│fl│pl│fg│000│path NUL │
//! │  │u8│u8│u8│u32 │u32 │hi,lo   │u32 │u32 │u32 │u16 u16 u8│   │         │
//! └──┴──┴──┴──┴────┴────┴────────┴────┴────┴────┴──┴──┴──┴───┴─────────┘
//! ```
//!
//! The `sz` byte must equal the bytes the entry actually occupies, or the
//! entry (and the rest of the catalog) is written off as corrupt.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};
use chrono::NaiveDateTime;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::arcserve::session::SessionHeader;
use crate::arcserve::time::{FILE_BASE_YEAR, timestamp_or_epoch};
use crate::arcserve::{PacketError, ROOT_SECTOR, signatures};
use crate::archive::{CatalogBlob, EntryRecord};
use crate::utils::io::read_vec;
use crate::utils::text::fixed_string;

/// Marker byte opening every catalog entry.
const ENTRY_MARKER: u8 = 0xFF;

/// Fixed bytes of an entry ahead of its path.
const ENTRY_FIXED: usize = 40;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog truncated: {0}")]
    Io(#[from] std::io::Error),
    #[error("catalog does not open with a session header")]
    MissingSessionHeader,
    #[error("catalog session header unreadable: {0}")]
    Session(#[from] PacketError),
    #[error("entry declares {declared} bytes but occupies {occupies}")]
    EntrySize { declared: usize, occupies: usize },
}

/// One file (or directory) the catalog says the session held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub filesystem: u8,
    pub mode: u8,
    pub owner_id: u32,
    pub attributes: u32,
    pub size: i64,
    pub modified: NaiveDateTime,
    pub page_index: u32,
    pub page_offset: u32,
    pub filename_length: u16,
    pub flags: u8,
    pub full_path: String,
}

impl CatalogEntry {
    /// Parse the bytes following an already-consumed marker byte.
    fn read(reader: &mut Cursor<&[u8]>) -> Result<Self, CatalogError> {
        let declared = usize::from(reader.read_u8()?);
        let filesystem = reader.read_u8()?;
        let mode = reader.read_u8()?;
        let owner_id = reader.read_u32::<LittleEndian>()?;
        let attributes = reader.read_u32::<LittleEndian>()?;
        let size_high = reader.read_u32::<LittleEndian>()?;
        let size_low = reader.read_u32::<LittleEndian>()?;
        let size = ((i64::from(size_high)) << 32) | i64::from(size_low);
        let modified = timestamp_or_epoch(reader.read_u32::<LittleEndian>()?, FILE_BASE_YEAR);
        let page_index = reader.read_u32::<LittleEndian>()?;
        let page_offset = reader.read_u32::<LittleEndian>()?;
        let filename_length = reader.read_u16::<LittleEndian>()?;
        let full_path_length = usize::from(reader.read_u16::<LittleEndian>()?);
        let flags = reader.read_u8()?;
        let mut zeroes = [0u8; 3];
        reader.read_exact(&mut zeroes)?;
        let path_bytes = read_vec(reader, full_path_length.saturating_sub(1))?;
        if full_path_length > 0 {
            let mut nul = [0u8; 1];
            reader.read_exact(&mut nul)?;
        }
        let occupies = ENTRY_FIXED + full_path_length;
        if declared != occupies {
            return Err(CatalogError::EntrySize { declared, occupies });
        }
        Ok(Self {
            filesystem,
            mode,
            owner_id,
            attributes,
            size,
            modified,
            page_index,
            page_offset,
            filename_length,
            flags,
            full_path: fixed_string(&path_bytes),
        })
    }

    pub fn is_file(&self) -> bool {
        self.flags & 1 != 0
    }

    /// Trailing `filename_length - 1` characters of the full path; a zero
    /// filename length yields the empty filename.
    pub fn filename(&self) -> &str {
        let chars = usize::from(self.filename_length).saturating_sub(1);
        let total = self.full_path.chars().count();
        let byte_start = self
            .full_path
            .char_indices()
            .nth(total.saturating_sub(chars))
            .map_or(self.full_path.len(), |(i, _)| i);
        &self.full_path[byte_start..]
    }

    /// Everything ahead of [`CatalogEntry::filename`].
    pub fn folder(&self) -> &str {
        &self.full_path[..self.full_path.len() - self.filename().len()]
    }
}

/// A parsed `.CAT` file.
#[derive(Debug)]
pub struct Catalog {
    pub session: SessionHeader,
    pub entries: Vec<CatalogEntry>,
}

/// Parse a recovered catalog file. Corruption mid-way yields the entries
/// parsed so far plus the error that stopped the walk.
pub fn parse_catalog(data: &[u8]) -> (Option<Catalog>, Option<CatalogError>) {
    let mut cursor = Cursor::new(data);
    let session = match read_catalog_session(&mut cursor) {
        Ok(session) => session,
        Err(err) => return (None, Some(err)),
    };
    let mut entries = Vec::new();
    let error = loop {
        let mut marker = [0u8; 1];
        match cursor.read_exact(&mut marker) {
            Err(_) => break None, // clean end of data
            Ok(()) => match marker[0] {
                ENTRY_MARKER => match CatalogEntry::read(&mut cursor) {
                    Ok(entry) => entries.push(entry),
                    Err(err) => break Some(err),
                },
                // Page padding between entries.
                0 => continue,
                other => {
                    debug!(byte = other, offset = cursor.position(), "catalog walk hit an unexpected byte");
                    break None;
                }
            },
        }
    };
    (Some(Catalog { session, entries }), error)
}

fn read_catalog_session(cursor: &mut Cursor<&[u8]>) -> Result<SessionHeader, CatalogError> {
    let signature = cursor
        .read_u32::<byteorder::BigEndian>()
        .map_err(|_| CatalogError::MissingSessionHeader)?;
    if !matches!(
        signature,
        signatures::SESSION_HEADER
            | signatures::SESSION_HEADER_ALT
            | signatures::SESSION_HEADER_UNKNOWN
    ) {
        return Err(CatalogError::MissingSessionHeader);
    }
    let session = SessionHeader::read_body(signature, cursor)?;
    cursor.seek(SeekFrom::Start(ROOT_SECTOR))?;
    Ok(session)
}

/// How one catalog entry fared against the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryVerdict {
    Recovered,
    /// Present but with the wrong number of bytes; the payload carries the
    /// recovered size.
    Damaged(u64),
    Missing,
}

/// Totals of a catalog cross-check.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CrossCheckReport {
    pub recovered: u64,
    pub damaged: u64,
    pub missing: u64,
    /// Bytes actually recovered for the damaged entries.
    pub damaged_bytes: u64,
}

impl CrossCheckReport {
    pub fn errors(&self) -> u64 {
        self.damaged + self.missing
    }
}

/// Fold `\` and `/`, strip any `\\SERVER\`-style prefix ahead of a drive
/// letter, drop trailing separators, and compare case-insensitively.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('/', "\\");
    let stripped = unified
        .char_indices()
        .find(|&(i, c)| {
            c.is_ascii_alphabetic()
                && unified[i + c.len_utf8()..].starts_with(':')
                && (i == 0 || unified[..i].ends_with('\\'))
        })
        .map_or(unified.as_str(), |(i, _)| &unified[i..]);
    stripped.trim_end_matches('\\').to_ascii_uppercase()
}

/// Check one catalog entry against the archive's entry records, keyed by
/// normalized path.
fn check_entry(
    entry: &CatalogEntry,
    by_path: &HashMap<String, &EntryRecord>,
) -> EntryVerdict {
    let Some(record) = by_path.get(&normalize_path(&entry.full_path)) else {
        return EntryVerdict::Missing;
    };
    if !entry.is_file() {
        // Directories have no length to disagree about.
        return EntryVerdict::Recovered;
    }
    if record.written == entry.size as u64 {
        EntryVerdict::Recovered
    } else {
        EntryVerdict::Damaged(record.written)
    }
}

/// Cross-check every recovered catalog against the archive and log the
/// outcome per entry and in total.
pub fn cross_check(archive_entries: &[EntryRecord], catalogs: &[CatalogBlob]) -> CrossCheckReport {
    let by_path: HashMap<String, &EntryRecord> = archive_entries
        .iter()
        .map(|record| (normalize_path(&record.path), record))
        .collect();

    let mut report = CrossCheckReport::default();
    for blob in catalogs {
        let (catalog, error) = parse_catalog(&blob.data);
        if let Some(err) = error {
            warn!(catalog = %blob.path, %err, "catalog parse stopped early");
        }
        let Some(catalog) = catalog else { continue };
        info!(
            catalog = %blob.path,
            session_root = %catalog.session.root_directory,
            entries = catalog.entries.len(),
            "cross-checking catalog"
        );
        for entry in &catalog.entries {
            match check_entry(entry, &by_path) {
                EntryVerdict::Recovered => report.recovered += 1,
                EntryVerdict::Damaged(written) => {
                    report.damaged += 1;
                    report.damaged_bytes += written;
                    warn!(
                        path = %entry.full_path,
                        expected = entry.size,
                        recovered = written,
                        "catalog size disagrees with the recovered file"
                    );
                }
                EntryVerdict::Missing => {
                    report.missing += 1;
                    warn!(path = %entry.full_path, "catalogued file never made it into the archive");
                }
            }
        }
    }
    info!(
        recovered = report.recovered,
        errors = report.errors(),
        damaged_bytes = report.damaged_bytes,
        "catalog cross-check complete"
    );
    report
}
