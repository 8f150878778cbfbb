// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Recovery of CA ARCserve backups from raw dumps of OnStream ADR tapes
//! (SC-30 / SC-50 / ADR-50 cartridges).
//!
//! The original writer is long gone and the tapes are fragile, so this
//! crate works from raw dump files only. Recovery is a strict two-layer
//! pipeline:
//!
//! 1. **Tape-physical layer** ([`tape`], [`dump`]): map dump-file records
//!    to physical frames, then stitch them into one logical byte stream,
//!    undoing the drive's serpentine block layout and stepping around its
//!    parking zone.
//! 2. **Packet layer** ([`arcserve`]): a resync-capable parser for
//!    ARCserve's undocumented session / file / stream-chunk framing,
//!    including DEFLATE-compressed payloads.
//!
//! The output is a ZIP of everything recoverable ([`archive`]), a damage
//! report and image ([`damage`]), and a cross-check of the result against
//! ARCserve's own end-of-session catalogs ([`catalog`]).
//!
//! Everything here is read-only with respect to the dumps, synchronous,
//! and single-threaded: tape recovery is I/O-bound and order-dependent,
//! and a deterministic walk is worth more than parallelism.

pub mod arcserve;
pub mod archive;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod damage;
pub mod dump;
pub mod tape;
pub mod utils;
