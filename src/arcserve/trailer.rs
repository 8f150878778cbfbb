// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! File trailer packet: ARCserve's end-of-file marker, carrying the path
//! again plus a CRC32 of the file body. The CRC polynomial was never
//! documented, so the check can only warn; a mismatch never rejects a
//! recovered file.

use std::io::{Read, Seek, Write};

use byteorder::{LittleEndian, ReadBytesExt};
use tracing::{debug, warn};

use crate::arcserve::PacketError;
use crate::archive::TapeArchive;
use crate::utils::io::read_reserved;
use crate::utils::text::{read_fixed_string, string_looks_like_text};

#[derive(Debug, Clone)]
pub struct FileTrailer {
    pub relative_path: String,
    pub crc32: u32,
    pub reserved: u8,
    trailing_zero: bool,
}

impl FileTrailer {
    pub fn read_body<R: Read>(reader: &mut R) -> Result<Self, PacketError> {
        let relative_path = read_fixed_string(reader, 246)?;
        let crc32 = reader.read_u32::<LittleEndian>()?;
        let reserved = reader.read_u8()?;
        let trailing_zero = read_reserved(reader, 257)?;
        Ok(Self {
            relative_path,
            crc32,
            reserved,
            trailing_zero,
        })
    }

    /// Valid when the path reads as text, or when the whole trailer is
    /// blank (path empty, CRC zero, reserved zero).
    pub fn appears_valid(&self) -> bool {
        let blank = self.relative_path.is_empty() && self.crc32 == 0 && self.reserved == 0;
        self.trailing_zero
            && (blank || string_looks_like_text(&self.relative_path, false))
    }

    pub fn describe(&self) -> String {
        format!(
            "file trailer {:?} crc={:#010x}",
            self.relative_path, self.crc32
        )
    }

    /// No side effects beyond logging: note the end-of-file marker and
    /// compare the claimed CRC against the one computed while writing.
    pub fn process<W: Write + Seek>(&self, archive: &TapeArchive<W>) {
        debug!("{}", self.describe());
        if self.crc32 == 0 {
            return;
        }
        if let Some((path, computed)) = archive.last_file()
            && *computed != self.crc32
        {
            // The polynomial is undocumented; this is informational only.
            warn!(
                path = %path,
                claimed = format_args!("{:#010x}", self.crc32),
                computed = format_args!("{computed:#010x}"),
                "trailer CRC differs from the recovered file's CRC32"
            );
        }
    }
}
