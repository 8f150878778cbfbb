// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! File header packets.
//!
//! Every backed-up file opens with a header packet whose signature names
//! the _dialect_ of the source filesystem. All dialects share a 343-byte
//! prefix (the NetWare-era fields); what follows differs:
//!
//! * DOS and the other legacy dialects (AFP, OS/2, Unix, Mac) put the raw
//!   file bytes straight after the prefix.
//! * The Windows dialects extend the prefix with FILETIMEs, a 64-bit size
//!   and UTF-16 names, then the raw bytes.
//! * The universal dialect nests a chunked sub-framing; see [`chunks`].
//!
//! The dialect is picked by the packet signature alone, never by sniffing
//! the body.

pub mod chunks;
mod windows;

pub use windows::WindowsHeader;

use std::io::{Read, Seek, Write};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use chrono::{NaiveDate, NaiveDateTime};
use tracing::{error, warn};

use crate::arcserve::framer::FramerOptions;
use crate::arcserve::time::{FILE_BASE_YEAR, timestamp_or_epoch, unpack_date};
use crate::arcserve::{PacketError, signatures};
use crate::archive::TapeArchive;
use crate::utils::io::read_reserved;
use crate::utils::text::{read_fixed_string, string_looks_like_text};

/// Attribute bit marking a directory, common to every dialect.
pub const ATTRIBUTE_DIRECTORY: u32 = 0x10;

/// Copy buffer for raw file bodies.
const COPY_BUFFER: usize = 2048;

/// Special roles a backed-up file can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum FileClass {
    Normal,
    NtRegistry,
    EventLog,
    HardLink1,
    HardLink2,
    ArcserveCatalog,
    Eisa,
    DriveRoot,
    Other(u8),
}

impl From<u8> for FileClass {
    fn from(raw: u8) -> Self {
        match raw {
            0 => FileClass::Normal,
            1 => FileClass::NtRegistry,
            2 => FileClass::EventLog,
            3 => FileClass::HardLink1,
            4 => FileClass::HardLink2,
            5 => FileClass::ArcserveCatalog,
            6 => FileClass::Eisa,
            7 => FileClass::DriveRoot,
            other => FileClass::Other(other),
        }
    }
}

/// Source-filesystem dialect, from the packet signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum FileDialect {
    Dos,
    Afp,
    Os2,
    Unix,
    Mac,
    WindowsNt,
    WindowsNtWorkstation,
    Windows95,
    Universal,
}

impl FileDialect {
    pub fn from_signature(signature: u32) -> Option<Self> {
        match signature {
            signatures::FILE_DOS => Some(FileDialect::Dos),
            signatures::FILE_AFP => Some(FileDialect::Afp),
            signatures::FILE_OS2 => Some(FileDialect::Os2),
            signatures::FILE_UNIX => Some(FileDialect::Unix),
            signatures::FILE_MAC => Some(FileDialect::Mac),
            signatures::FILE_WINDOWS_NT => Some(FileDialect::WindowsNt),
            signatures::FILE_WINDOWS_NT_WORKSTATION => Some(FileDialect::WindowsNtWorkstation),
            signatures::FILE_WINDOWS_95 => Some(FileDialect::Windows95),
            signatures::FILE_UNIVERSAL => Some(FileDialect::Universal),
            _ => None,
        }
    }

    fn is_windows(self) -> bool {
        matches!(
            self,
            FileDialect::WindowsNt | FileDialect::WindowsNtWorkstation | FileDialect::Windows95
        )
    }
}

/// The prefix every dialect shares.
#[derive(Debug, Clone)]
pub struct FileCommon {
    pub relative_path: String,
    pub afp_long_name: String,
    pub directory_level: u8,
    pub last_modified: NaiveDateTime,
    pub file_size: u32,
    pub resource_fork_size: u32,
    pub attributes: u32,
    pub owner_id: u32,
    pub mask: u16,
    pub file_class: FileClass,
    pub trustee_length: u32,
    pub directory_space_restriction: u32,
    pub last_access: Option<NaiveDate>,
    pub creation: NaiveDateTime,
    reserved_zero: bool,
}

impl FileCommon {
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, PacketError> {
        let relative_path = read_fixed_string(reader, 250)?;
        let afp_long_name = read_fixed_string(reader, 33)?;
        let directory_level = reader.read_u8()?;
        let last_modified =
            timestamp_or_epoch(reader.read_u32::<BigEndian>()?, FILE_BASE_YEAR);
        let file_size = reader.read_u32::<LittleEndian>()?;
        let resource_fork_size = reader.read_u32::<LittleEndian>()?;
        let attributes = reader.read_u32::<LittleEndian>()?;
        let owner_id = reader.read_u32::<LittleEndian>()?;
        let mask = reader.read_u16::<LittleEndian>()?;
        let file_class = FileClass::from(reader.read_u8()?);
        let trustee_length = reader.read_u32::<LittleEndian>()?;
        let directory_space_restriction = reader.read_u32::<LittleEndian>()?;
        let last_access = unpack_date(reader.read_u16::<LittleEndian>()?);
        let creation = timestamp_or_epoch(reader.read_u32::<LittleEndian>()?, FILE_BASE_YEAR);
        let reserved_zero = read_reserved(reader, 22)?;
        Ok(Self {
            relative_path,
            afp_long_name,
            directory_level,
            last_modified,
            file_size,
            resource_fork_size,
            attributes,
            owner_id,
            mask,
            file_class,
            trustee_length,
            directory_space_restriction,
            last_access,
            creation,
            reserved_zero,
        })
    }
}

/// A parsed file header: shared prefix plus the dialect tag and, for the
/// Windows dialects, their extension block.
#[derive(Debug, Clone)]
pub struct FileHeader {
    pub signature: u32,
    pub dialect: FileDialect,
    pub common: FileCommon,
    pub windows: Option<WindowsHeader>,
}

impl FileHeader {
    pub fn read_body<R: Read>(
        signature: u32,
        reader: &mut R,
        options: &FramerOptions,
    ) -> Result<Self, PacketError> {
        let dialect = FileDialect::from_signature(signature)
            .ok_or(PacketError::AppearsInvalid("not a file header signature"))?;
        let common = FileCommon::read(reader)?;
        let windows = dialect
            .is_windows()
            .then(|| WindowsHeader::read(reader, options.skip_extra_section_per_file))
            .transpose()?;
        Ok(Self {
            signature,
            dialect,
            common,
            windows,
        })
    }

    pub fn appears_valid(&self) -> bool {
        self.common.reserved_zero
            && string_looks_like_text(&self.common.relative_path, false)
            && string_looks_like_text(&self.common.afp_long_name, false)
    }

    /// Directories are flagged in the shared attributes; the universal
    /// dialect can also mark them through its chunk stream, which
    /// [`chunks::process_universal`] honours on top of this.
    pub fn is_directory(&self) -> bool {
        self.common.attributes & ATTRIBUTE_DIRECTORY != 0
    }

    /// The path to extract to, relative to the session root. The Windows
    /// dialects prefer their long UTF-16 path over the truncated narrow
    /// one.
    pub fn relative_path(&self) -> &str {
        match &self.windows {
            Some(w) if !w.full_relative_path.is_empty() => &w.full_relative_path,
            _ => &self.common.relative_path,
        }
    }

    /// Bytes the file body declares.
    pub fn declared_size(&self) -> u64 {
        match &self.windows {
            Some(w) => w.precise_size,
            None => u64::from(self.common.file_size),
        }
    }

    /// Modification time for the archive entry.
    pub fn modified(&self) -> NaiveDateTime {
        match &self.windows {
            Some(w) => w.last_write.unwrap_or(self.common.last_modified),
            None => self.common.last_modified,
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "{} file {:?} size={} attributes={:#x} class={} modified={}",
            self.dialect,
            self.relative_path(),
            self.declared_size(),
            self.common.attributes,
            self.common.file_class,
            self.modified(),
        )
    }

    /// Extract the file body into the archive.
    pub fn process<R: Read + Seek, W: Write + Seek>(
        &self,
        stream: &mut R,
        archive: &mut TapeArchive<W>,
        options: &FramerOptions,
    ) -> Result<(), PacketError> {
        if self.dialect == FileDialect::Universal {
            return chunks::process_universal(self, stream, archive, options);
        }

        let full_path = join_backup_path(
            archive.current_base_path.as_deref(),
            self.relative_path(),
        );
        if self.is_directory() {
            archive.add_directory(&full_path, self.modified())?;
            return Ok(());
        }

        let declared = self.declared_size();
        archive.start_file(&full_path, self.modified())?;
        let copied = copy_file_body(stream, archive, declared);
        let written = archive.open_entry_written().unwrap_or(0);
        let entry_damaged = archive.end_file(declared)?.is_damaged();
        copied?;
        if entry_damaged && !options.fast_debug {
            error!(
                path = %full_path,
                declared,
                written,
                "file body size does not match its header"
            );
        }
        Ok(())
    }
}

/// Resolve a file's full path against the session's root directory,
/// without doubling separators.
pub fn join_backup_path(base: Option<&str>, relative: &str) -> String {
    match base {
        None | Some("") => relative.to_owned(),
        Some(base) if base.ends_with('\\') || base.ends_with('/') => {
            format!("{base}{relative}")
        }
        Some(base) => format!("{base}\\{relative}"),
    }
}

/// Copy exactly `len` raw bytes from the tape stream into the archive.
/// A short read is fatal for this file.
fn copy_file_body<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    len: u64,
) -> Result<(), PacketError> {
    let mut scratch = [0u8; COPY_BUFFER];
    let mut remaining = len;
    while remaining > 0 {
        let want = scratch.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let got = reader.read(&mut scratch[..want])?;
        if got == 0 {
            warn!(wanted = len, missing = remaining, "file body ends early");
            return Err(PacketError::ShortRead {
                wanted: len,
                got: len - remaining,
            });
        }
        writer.write_all(&scratch[..got])?;
        remaining -= got as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arcserve::framer::FramerOptions;
    use crate::arcserve::tests::{build_common_prefix, build_dos_file_header};
    use std::io::Cursor;

    #[test]
    fn join_backup_path_separator_policy() {
        assert_eq!(join_backup_path(Some("C:\\"), "A.TXT"), "C:\\A.TXT");
        assert_eq!(join_backup_path(Some("C:"), "A.TXT"), "C:\\A.TXT");
        assert_eq!(
            join_backup_path(Some("D:\\DATA"), "X\\Y.TXT"),
            "D:\\DATA\\X\\Y.TXT"
        );
        assert_eq!(join_backup_path(None, "A.TXT"), "A.TXT");
    }

    #[test]
    fn dos_header_reads_the_shared_prefix() {
        let packet = build_dos_file_header("A.TXT", 5, 0x20);
        let header = FileHeader::read_body(
            signatures::FILE_DOS,
            &mut Cursor::new(&packet[4..]),
            &FramerOptions::default(),
        )
        .unwrap();
        assert_eq!(header.dialect, FileDialect::Dos);
        assert_eq!(header.relative_path(), "A.TXT");
        assert_eq!(header.declared_size(), 5);
        assert!(!header.is_directory());
        assert!(header.appears_valid());
    }

    #[test]
    fn directory_bit_wins() {
        let packet = build_dos_file_header("SUBDIR", 0, ATTRIBUTE_DIRECTORY);
        let header = FileHeader::read_body(
            signatures::FILE_DOS,
            &mut Cursor::new(&packet[4..]),
            &FramerOptions::default(),
        )
        .unwrap();
        assert!(header.is_directory());
    }

    #[test]
    fn garbage_prefix_fails_the_sanity_test() {
        let mut prefix = build_common_prefix("A.TXT", 5, 0);
        // Scribble over the reserved tail, which must be zero.
        let len = prefix.len();
        prefix[len - 3] = 0xAB;
        let header = FileHeader::read_body(
            signatures::FILE_DOS,
            &mut Cursor::new(prefix),
            &FramerOptions::default(),
        )
        .unwrap();
        assert!(!header.appears_valid());
    }

    #[test]
    fn short_body_is_fatal_but_recorded() {
        let mut archive = TapeArchive::new(Cursor::new(Vec::new()));
        let packet = build_dos_file_header("A.TXT", 10, 0x20);
        let header = FileHeader::read_body(
            signatures::FILE_DOS,
            &mut Cursor::new(&packet[4..]),
            &FramerOptions::default(),
        )
        .unwrap();
        // Only 4 of the declared 10 bytes are on tape.
        let err = header
            .process(
                &mut Cursor::new(b"abcd".to_vec()),
                &mut archive,
                &FramerOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            PacketError::ShortRead { wanted: 10, got: 4 }
        ));
        let finished = archive.finish().unwrap();
        assert_eq!(finished.entries.len(), 1);
        assert!(finished.entries[0].is_damaged());
    }
}
