// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! # ARCserve packet layer
//!
//! ARCserve frames its output as _packets_ aligned to 512-byte _root
//! sectors_ of the logical tape stream. Every packet opens with a 32-bit
//! signature; whatever a packet's body consumes, the next packet starts at
//! the next sector boundary:
//!
//! ```text
//! sector    0        1        2        3        4
//! ├────────┼────────┼────────┼────────┼────────┤
//! │session │file hdr│file data…       │trailer │
//! │header  │ + data │                 │        │
//! └────────┴────────┴────────┴────────┴────────┘
//!  ▲each packet begins with a u32 signature at a sector boundary
//! ```
//!
//! A _session_ is a stretch of packets bracketed by a session header and,
//! usually, a session terminator. File headers come in several dialects
//! (one per source filesystem); the _universal_ dialect nests a second
//! framing layer of [stream chunks](file::chunks) inside the file body.
//!
//! Damage is the normal case, not the exception. The framer resynchronises
//! after anything it cannot parse: a sector whose signature is unknown
//! costs exactly one sector, and a recognised packet that fails its body
//! read costs the distance to the next sector boundary. See [`framer`].

pub mod file;
pub mod framer;
pub mod session;
pub mod terminator;
pub mod time;
pub mod trailer;

use std::io;

use thiserror::Error;

/// Packet alignment: every packet signature sits at a multiple of this.
pub const ROOT_SECTOR: u64 = 512;

/// Largest single allocation a packet body may ask for. Anything bigger is
/// treated as corruption rather than honoured.
pub const MAX_CHUNK_ALLOCATION: u64 = 16 * 1024 * 1024;

/// Packet signatures, read big-endian at a root-sector boundary.
pub mod signatures {
    pub const SESSION_HEADER: u32 = 0xDDDD_DDDD;
    pub const SESSION_HEADER_ALT: u32 = 0xDDDD_D386;
    /// Observed on real tapes; semantics never identified. Parsed as a
    /// session header, logged as the unknown variant.
    pub const SESSION_HEADER_UNKNOWN: u32 = 0x5555_AAAA;
    pub const SESSION_TERMINATOR: u32 = 0x7E7E_7E7E;
    pub const FILE_TRAILER: u32 = 0xCCCC_CCCC;
    /// All-zero sector: not a packet, skipped without counting as a miss.
    pub const EMPTY_SECTOR: u32 = 0x0000_0000;

    pub const FILE_UNIVERSAL: u32 = 0xABBA_ABBA;
    pub const FILE_DOS: u32 = 0xBBBB_BBBB;
    pub const FILE_AFP: u32 = 0xAAAA_AAAA;
    pub const FILE_OS2: u32 = 0x2222_2222;
    pub const FILE_UNIX: u32 = 0x3333_3333;
    pub const FILE_MAC: u32 = 0x4444_4444;
    pub const FILE_WINDOWS_NT: u32 = 0x5555_5555;
    pub const FILE_WINDOWS_NT_WORKSTATION: u32 = 0x5555_5557;
    pub const FILE_WINDOWS_95: u32 = 0x6666_6666;
}

#[derive(Debug, Error)]
pub enum PacketError {
    #[error("I/O error inside packet body: {0}")]
    Io(#[from] io::Error),
    /// The signature matched but the body fails the syntactic sanity test:
    /// almost certainly random data that happened to collide.
    #[error("packet fails its sanity check: {0}")]
    AppearsInvalid(&'static str),
    #[error("short read inside file body: wanted {wanted} bytes, got {got}")]
    ShortRead { wanted: u64, got: u64 },
    #[error("{what} declares {size} bytes, over the {MAX_CHUNK_ALLOCATION}-byte limit")]
    TooLarge { what: &'static str, size: u64 },
    #[error("malformed packet: {0}")]
    Malformed(String),
    #[error("no packet recognised in signature {0:#010x}")]
    UnknownSignature(u32),
    #[error(transparent)]
    Archive(#[from] crate::archive::ArchiveError),
}
