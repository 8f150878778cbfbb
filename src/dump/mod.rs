// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! # Dump files
//!
//! A salvage run produces one dump file per pass over the tape, pattern
//! `tape_<id>.dump`. Each file is a sequence of fixed-size records:
//!
//! ```text
//! │◄────────── 33 280 B record ──────────►│
//! ├────────────────────────────┬──────────┤
//! │payload (32 768 B)          │aux (512 B)│
//! └────────────────────────────┴──────────┘
//! ```
//!
//! The auxiliary area is the drive's own frame metadata; the scanner reads
//! only two fields of it (magic and physical address) and never interprets
//! payload bytes. Dumps taken without auxiliary data are bare 32 768-byte
//! payload runs and rely entirely on the tape definition's starting-block
//! hint for attribution.
//!
//! The scanner's output is the _block map_: for every physical frame that
//! was recovered, the dump file and byte offset holding its payload.

mod record;
mod scanner;

pub use record::{AuxField, RECORD_SIZE, WRITE_STOP_MAGIC, parse_aux};
pub use scanner::{BlockMap, DumpSpec, ScanError, ScanStats, Scanner, build_ordered_list};

/// Where one recovered block's payload lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLocator {
    /// Index into the tape definition's ordered dump-file list.
    pub dump_index: u32,
    /// Byte offset of the 32 KiB payload within that dump file (the
    /// auxiliary area is not included).
    pub payload_offset: u64,
    /// Logical position the scanner believed it was at when it attributed
    /// this record, if the dump carried an ordering hint.
    pub hint: Option<u32>,
}
