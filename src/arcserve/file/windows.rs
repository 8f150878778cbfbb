// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};
use chrono::NaiveDateTime;

use crate::arcserve::PacketError;
use crate::arcserve::time::unpack_filetime;
use crate::utils::io::skip;
use crate::utils::text::read_utf16_fixed;

/// Extension block the Windows NT / NT workstation / 95 dialects append to
/// the shared prefix: native attributes, 100 ns FILETIMEs, a 64-bit size
/// and the long UTF-16 names the narrow prefix had to truncate.
#[derive(Debug, Clone)]
pub struct WindowsHeader {
    pub attributes: u32,
    pub creation: Option<NaiveDateTime>,
    pub last_access: Option<NaiveDateTime>,
    pub last_write: Option<NaiveDateTime>,
    /// Precise size, reassembled from its two halves (high first).
    pub precise_size: u64,
    pub unknown: [u32; 2],
    pub filename: String,
    pub dos_8_3_name: String,
    pub full_relative_path: String,
}

impl WindowsHeader {
    /// `skip_extra_section` mirrors the tape definition's
    /// `skip_extra_section_per_file`: some writer versions pad each Windows
    /// header with an extra zeroed 512-byte section. There is no way to
    /// detect this from the data; the operator has to say.
    pub fn read<R: Read>(reader: &mut R, skip_extra_section: bool) -> Result<Self, PacketError> {
        let attributes = reader.read_u32::<LittleEndian>()?;
        let creation = unpack_filetime(reader.read_i64::<LittleEndian>()?);
        let last_access = unpack_filetime(reader.read_i64::<LittleEndian>()?);
        let last_write = unpack_filetime(reader.read_i64::<LittleEndian>()?);
        let size_high = reader.read_u32::<LittleEndian>()?;
        let size_low = reader.read_u32::<LittleEndian>()?;
        let precise_size = (u64::from(size_high) << 32) | u64::from(size_low);
        let unknown = [
            reader.read_u32::<LittleEndian>()?,
            reader.read_u32::<LittleEndian>()?,
        ];
        let filename = read_utf16_fixed(reader, 520)?;
        let dos_8_3_name = read_utf16_fixed(reader, 28)?;
        let full_relative_path = read_utf16_fixed(reader, 1024)?;
        // 85 bytes nobody ever deciphered; carried past verbatim.
        skip(reader, 85)?;
        if skip_extra_section {
            skip(reader, 512)?;
        }
        Ok(Self {
            attributes,
            creation,
            last_access,
            last_write,
            precise_size,
            unknown,
            filename,
            dos_8_3_name,
            full_relative_path,
        })
    }
}
