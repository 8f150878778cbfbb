// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Session header packet.
//!
//! A session header opens every backup session and names the root
//! directory the session's file paths are relative to. Its body fills the
//! rest of the root sector with fixed-width fields; the interesting ones
//! are decoded below and the rest are kept raw.
//!
//! Several field meanings were reconstructed from surviving tapes rather
//! than documentation, so enum-like fields keep their wire value: an
//! unobserved session type must survive into the log unmangled.

use std::fmt;
use std::io::Read;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::arcserve::time::{SESSION_BASE_YEAR, timestamp_or_epoch};
use crate::arcserve::{PacketError, signatures};
use crate::utils::io::read_reserved;
use crate::utils::text::{read_fixed_string, string_looks_like_text};

/// Wire value wrappers. The session type/mode/compression enums have
/// values that never appeared on surviving tapes; they are preserved, not
/// normalised.
macro_rules! wire_enum {
    ($(#[$doc:meta])* $name:ident($ty:ty)) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name(pub $ty);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }
    };
}

wire_enum!(
    /// What was backed up (full volume, file list, …).
    SessionType(u16)
);
wire_enum!(
    /// How the session was written (append, overwrite, …).
    SessionMode(u8)
);
wire_enum!(
    /// Compression algorithm tag; zero means uncompressed.
    CompressionType(u8)
);
wire_enum!(
    /// Operating system of the workstation that produced the session.
    WorkstationType(u8)
);
wire_enum!(
    /// OS/2-specific compression method tag.
    Os2CompressionMethod(u8)
);

/// Decoded session header. Field order matches the wire layout.
#[derive(Debug, Clone)]
pub struct SessionHeader {
    pub signature: u32,
    pub root_directory: String,
    pub username: String,
    pub password: String,
    pub description: String,
    pub session_type: SessionType,
    pub mode: SessionMode,
    pub flags: u32,
    pub compression_type: CompressionType,
    pub compression_level: u8,
    pub unix_fs_name_length: u8,
    pub encryption_password_key_size: u8,
    pub encryption_bab_key_size: u8,
    pub encryption_key_tails: [[u8; 12]; 2],
    pub version: u32,
    pub tape_number: u16,
    pub start_time: NaiveDateTime,
    pub workstation_type: WorkstationType,
    pub workstation_name: String,
    pub os2_compression_method: Os2CompressionMethod,
    pub os2_backup_date: u16,
    pub os2_backup_time: u16,
    pub os2_index_file: [u8; 9],
    pub last_session: u8,
    pub extended_session_header: u16,
    pub encryption_key: [u8; 24],
    /// All reserved regions held zero, as the format requires.
    reserved_zero: bool,
}

impl SessionHeader {
    /// Read the body following an already-consumed session signature.
    pub fn read_body<R: Read>(signature: u32, reader: &mut R) -> Result<Self, PacketError> {
        let root_directory = read_fixed_string(reader, 128)?;
        let username = read_fixed_string(reader, 48)?;
        let password = read_fixed_string(reader, 24)?;
        let description = read_fixed_string(reader, 80)?;
        let session_type = SessionType(reader.read_u16::<LittleEndian>()?);
        let mode = SessionMode(reader.read_u8()?);
        let flags = reader.read_u32::<LittleEndian>()?;
        let compression_type = CompressionType(reader.read_u8()?);
        let compression_level = reader.read_u8()?;
        let unix_fs_name_length = reader.read_u8()?;
        let encryption_password_key_size = reader.read_u8()?;
        let encryption_bab_key_size = reader.read_u8()?;
        let mut encryption_key_tails = [[0u8; 12]; 2];
        for tail in &mut encryption_key_tails {
            reader.read_exact(tail)?;
        }
        let version = reader.read_u32::<LittleEndian>()?;
        let mut reserved_zero = read_reserved(reader, 8)?;
        let tape_number = reader.read_u16::<LittleEndian>()?;
        let start_time = timestamp_or_epoch(reader.read_u32::<BigEndian>()?, SESSION_BASE_YEAR);
        let _reserved = reader.read_u8()?;
        let one = reader.read_u8()?;
        if one != 1 {
            debug!(value = one, "session header constant byte is not 1");
        }
        let workstation_type = WorkstationType(reader.read_u8()?);
        let workstation_name = read_fixed_string(reader, 64)?;
        let os2_compression_method = Os2CompressionMethod(reader.read_u8()?);
        let os2_backup_date = reader.read_u16::<LittleEndian>()?;
        let os2_backup_time = reader.read_u16::<LittleEndian>()?;
        let mut os2_index_file = [0u8; 9];
        reader.read_exact(&mut os2_index_file)?;
        let last_session = reader.read_u8()?;
        reserved_zero &= read_reserved(reader, 4)?;
        let extended_session_header = reader.read_u16::<LittleEndian>()?;
        let mut encryption_key = [0u8; 24];
        reader.read_exact(&mut encryption_key)?;
        reserved_zero &= read_reserved(reader, 62)?;

        Ok(Self {
            signature,
            root_directory,
            username,
            password,
            description,
            session_type,
            mode,
            flags,
            compression_type,
            compression_level,
            unix_fs_name_length,
            encryption_password_key_size,
            encryption_bab_key_size,
            encryption_key_tails,
            version,
            tape_number,
            start_time,
            workstation_type,
            workstation_name,
            os2_compression_method,
            os2_backup_date,
            os2_backup_time,
            os2_index_file,
            last_session,
            extended_session_header,
            encryption_key,
            reserved_zero,
        })
    }

    /// Syntactic sanity test: did this sector actually hold a session
    /// header, or did random data collide with the signature?
    pub fn appears_valid(&self) -> bool {
        self.reserved_zero
            && string_looks_like_text(&self.root_directory, true)
            && string_looks_like_text(&self.username, true)
            && string_looks_like_text(&self.description, true)
    }

    /// Whether the session claims encrypted payloads. Recognised only;
    /// decryption is out of scope, so the operator is warned.
    pub fn is_encrypted(&self) -> bool {
        self.encryption_password_key_size != 0 || self.encryption_bab_key_size != 0
    }

    /// One-line summary for the extraction log.
    pub fn describe(&self) -> String {
        format!(
            "session root={:?} user={:?} type={} mode={} compression={}/{} tape={} started={} workstation={:?} ({})",
            self.root_directory,
            self.username,
            self.session_type,
            self.mode,
            self.compression_type,
            self.compression_level,
            self.tape_number,
            self.start_time,
            self.workstation_name,
            self.workstation_type,
        )
    }

    /// Adopt this session as the framer's current one: later file headers
    /// resolve their relative paths against the root directory.
    pub fn process(&self, current_base_path: &mut Option<String>) {
        if self.signature == signatures::SESSION_HEADER_UNKNOWN {
            warn!("session header carries the undeciphered 0x5555AAAA signature variant");
        }
        if self.is_encrypted() {
            warn!("session claims encryption; file bodies will not be legible");
        }
        if string_looks_like_text(&self.root_directory, true) {
            *current_base_path = Some(self.root_directory.clone());
        }
    }
}
