// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! # Tape-physical layer
//!
//! An OnStream ADR cartridge records data on parallel tracks. Each track is a
//! sequence of _frames_; one frame carries a 32 KiB payload plus a 512-byte
//! auxiliary area. The drive addresses frames by `(track, x)` where `x` runs
//! along the length of the tape:
//!
//! ```text
//!            x = 0                15930   16029              31958
//!            │                      │       │                  │
//! track 0    ├──────────────────────┼░░░░░░░┼──────────────────┤
//! track 1    ├──────────────────────┼░░░░░░░┼──────────────────┤
//!   ⋮        │       front          ░parking░       back       │
//! track 23   ├──────────────────────┼░░░░░░░┼──────────────────┤
//! ```
//!
//! The 99 frames in the centre of every track form the _parking zone_: the
//! drive loads and unloads with the head parked there, and the nominal
//! logical-block API cannot address it. ARCserve's firmware tricks could, so
//! dumps may contain parking-zone frames; they are handled separately from
//! the logical stream (see the `merge-parking` subcommand).
//!
//! The drive's logical numbering is a serpentine walk over 1500-frame
//! _partitions_ of the non-parking area, front half first, with track 0
//! (back) and track 23 (front) pulled out as contiguous _fast lanes_.
//! [`layout`] reproduces that bijection; [`stream`] stitches dumped frames
//! into one seekable byte stream in logical order.

pub mod cartridge;
mod layout;
pub mod stream;

pub use cartridge::{ADR_50, Cartridge, CartridgeKind, Location, PhysicalPosition};
pub use layout::{LayoutError, logical_to_physical, max_logical, physical_to_logical};
pub use stream::{GapReport, OrderedBlock, TapeStream};

/// Payload bytes carried by one tape frame.
pub const PAYLOAD_SIZE: usize = 32 * 1024;

/// Auxiliary bytes carried alongside each frame payload.
pub const AUX_SIZE: usize = 512;
