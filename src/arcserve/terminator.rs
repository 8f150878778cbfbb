// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Session terminator packet: a run of `0x7E` filler bracketing the
//! location of the session's catalog inside the catalog file: a page
//! index and offset into 16 KiB pages.

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::arcserve::PacketError;
use crate::utils::io::read_vec;

/// Catalog files are paged in this unit; the terminator addresses into it.
pub const CATALOG_PAGE_SIZE: u64 = 16_384;

const FILL: u8 = 0x7E;
const LEADING_FILL: usize = 288;
const TRAILING_FILL: usize = 39;

#[derive(Debug, Clone)]
pub struct SessionTerminator {
    pub unknown0: u32,
    pub catalog_page_index: u32,
    pub catalog_page_offset: u32,
    pub unknown1: u32,
    fill_intact: bool,
}

impl SessionTerminator {
    pub fn read_body<R: Read>(reader: &mut R) -> Result<Self, PacketError> {
        let leading = read_vec(reader, LEADING_FILL)?;
        let unknown0 = reader.read_u32::<LittleEndian>()?;
        let catalog_page_index = reader.read_u32::<LittleEndian>()?;
        let catalog_page_offset = reader.read_u32::<LittleEndian>()?;
        let unknown1 = reader.read_u32::<LittleEndian>()?;
        let trailing = read_vec(reader, TRAILING_FILL)?;
        let fill_intact = leading.iter().chain(trailing.iter()).all(|&b| b == FILL);
        Ok(Self {
            unknown0,
            catalog_page_index,
            catalog_page_offset,
            unknown1,
            fill_intact,
        })
    }

    pub fn appears_valid(&self) -> bool {
        self.fill_intact
    }

    /// Byte offset of this session's entries inside the catalog file.
    pub fn catalog_raw_offset(&self) -> u64 {
        u64::from(self.catalog_page_index) * CATALOG_PAGE_SIZE
            + u64::from(self.catalog_page_offset)
    }

    pub fn describe(&self) -> String {
        format!(
            "session terminator; catalog at page {} offset {} (raw {})",
            self.catalog_page_index,
            self.catalog_page_offset,
            self.catalog_raw_offset()
        )
    }
}
