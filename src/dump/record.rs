// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use byteorder::{BigEndian, ByteOrder};

use crate::tape::{AUX_SIZE, PAYLOAD_SIZE};

/// Size of one dump record when auxiliary data is present.
pub const RECORD_SIZE: usize = PAYLOAD_SIZE + AUX_SIZE;

/// Aux magic marking a write-stop frame: padding past the end of written
/// data, never to be counted as payload.
pub const WRITE_STOP_MAGIC: u32 = u32::from_be_bytes(*b"WTST");

/// Physical addresses the drive reports for frames it could not attribute.
const INVALID_ADDRESSES: [u32; 2] = [0, 0xFFFF_FFFF];

/// The two auxiliary fields the scanner cares about. Both are big-endian
/// and sit at the head of the 512-byte area; the remaining bytes are drive
/// internals and are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuxField {
    pub magic: u32,
    pub physical_address: u32,
}

impl AuxField {
    pub fn is_write_stop(&self) -> bool {
        self.magic == WRITE_STOP_MAGIC
    }

    /// Whether the drive recorded a usable physical address.
    pub fn has_address(&self) -> bool {
        !INVALID_ADDRESSES.contains(&self.physical_address)
    }
}

/// Extract the scanner's auxiliary fields. `aux` must hold at least the
/// first 8 bytes of the auxiliary area.
pub fn parse_aux(aux: &[u8]) -> AuxField {
    AuxField {
        magic: BigEndian::read_u32(&aux[0..4]),
        physical_address: BigEndian::read_u32(&aux[4..8]),
    }
}
