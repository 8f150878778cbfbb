// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Serpentine logical numbering.
//!
//! The logical stream covers the non-parking frames of the cartridge, front
//! half first. Within each half the non-parking stretch of every track is
//! cut into [`Cartridge::partition_frames`]-sized partitions, numbered
//! outward from the parking zone; partition 0 is the short _edge partition_
//! straddling the zone ([`Cartridge::edge_partition_frames`] frames). The
//! numbering walks one partition at a time across all participating tracks,
//! alternating the track direction per partition and the x direction per
//! track.
//!
//! One track per half is held out of the serpentine as a _fast lane_ and
//! addressed contiguously as the tail of its half: track 0 for the back
//! half (so the final logical block is the last physical frame of the
//! tape), track 23 for the front half (ending at `(23, 0)`, the physical
//! beginning of the tape). Mirroring the two halves puts logical block 0 on
//! track 0, on the frame immediately ahead of the parking zone.

use crate::tape::{Cartridge, Location, PhysicalPosition};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("physical position track {} frame {} is inside the parking zone", .0.track, .0.x)]
    ParkingZone(PhysicalPosition),
    #[error("logical block {0} is out of range (max {1})")]
    OutOfRange(u32, u32),
}

/// Number of logical blocks on the cartridge: every frame outside the
/// parking zone has exactly one logical index.
pub const fn max_logical(c: &Cartridge) -> u32 {
    c.tracks * (c.frames_per_track - c.parking_frames())
}

/// Logical blocks in one half of the tape.
const fn half_len(c: &Cartridge) -> u32 {
    c.tracks * c.half_track_frames()
}

/// Logical blocks covered by the serpentine portion of one half, i.e.
/// everything but the fast lane.
const fn serpentine_len(c: &Cartridge) -> u32 {
    (c.tracks - 1) * c.half_track_frames()
}

/// Logical base, within a half, of partition `p` (0 = edge partition).
const fn partition_base(c: &Cartridge, p: u32) -> u32 {
    let lanes = c.tracks - 1;
    if p == 0 {
        0
    } else {
        c.edge_partition_frames() * lanes + (p - 1) * c.partition_frames * lanes
    }
}

/// Frame count of partition `p`.
const fn partition_len(c: &Cartridge, p: u32) -> u32 {
    if p == 0 {
        c.edge_partition_frames()
    } else {
        c.partition_frames
    }
}

/// Lowest x coordinate of partition `p` in the front half.
const fn front_partition_lo(c: &Cartridge, p: u32) -> u32 {
    c.parking_start - c.edge_partition_frames() - p * c.partition_frames
}

/// Lowest x coordinate of partition `p` in the back half.
const fn back_partition_lo(c: &Cartridge, p: u32) -> u32 {
    if p == 0 {
        c.parking_end
    } else {
        c.parking_end + c.edge_partition_frames() + (p - 1) * c.partition_frames
    }
}

/// Map a physical position to its logical block. Fails for parking-zone
/// positions, which have no logical identity.
pub fn physical_to_logical(c: &Cartridge, pos: PhysicalPosition) -> Result<u32, LayoutError> {
    debug_assert!(pos.track < c.tracks && pos.x < c.frames_per_track);
    match c.classify(pos) {
        Location::Parking => Err(LayoutError::ParkingZone(pos)),
        Location::Front => Ok(front_to_logical(c, pos)),
        Location::Back => Ok(half_len(c) + back_to_logical(c, pos)),
    }
}

fn front_to_logical(c: &Cartridge, pos: PhysicalPosition) -> u32 {
    let fast_lane = c.tracks - 1;
    if pos.track == fast_lane {
        // Fast lane runs outward: x descending toward the start of tape.
        return serpentine_len(c) + (c.parking_start - 1 - pos.x);
    }
    let edge_lo = c.parking_start - c.edge_partition_frames();
    let p = if pos.x >= edge_lo {
        0
    } else {
        (edge_lo - 1 - pos.x) / c.partition_frames + 1
    };
    let lo = front_partition_lo(c, p);
    let len = partition_len(c, p);
    // Even partitions walk tracks upward, odd downward (mirror of the back
    // half); odd tracks read with x ascending, even descending.
    let ti = if p % 2 == 0 {
        pos.track
    } else {
        (c.tracks - 2) - pos.track
    };
    let xi = if pos.track % 2 == 1 {
        pos.x - lo
    } else {
        lo + len - 1 - pos.x
    };
    partition_base(c, p) + ti * len + xi
}

fn back_to_logical(c: &Cartridge, pos: PhysicalPosition) -> u32 {
    if pos.track == 0 {
        // Fast lane runs outward: x ascending toward the end of tape.
        return serpentine_len(c) + (pos.x - c.parking_end);
    }
    let edge_hi = c.parking_end + c.edge_partition_frames();
    let p = if pos.x < edge_hi {
        0
    } else {
        (pos.x - edge_hi) / c.partition_frames + 1
    };
    let lo = back_partition_lo(c, p);
    let len = partition_len(c, p);
    // Odd partitions walk tracks upward, even downward; odd tracks read
    // with x descending, even ascending.
    let ti = if p % 2 == 1 {
        pos.track - 1
    } else {
        (c.tracks - 1) - pos.track
    };
    let xi = if pos.track % 2 == 1 {
        lo + len - 1 - pos.x
    } else {
        pos.x - lo
    };
    partition_base(c, p) + ti * len + xi
}

/// Map a logical block to its physical position. Fails past the end of the
/// logical range.
pub fn logical_to_physical(c: &Cartridge, logical: u32) -> Result<PhysicalPosition, LayoutError> {
    let max = max_logical(c);
    if logical >= max {
        return Err(LayoutError::OutOfRange(logical, max));
    }
    let half = half_len(c);
    if logical < half {
        Ok(front_from_logical(c, logical))
    } else {
        Ok(back_from_logical(c, logical - half))
    }
}

/// Split a within-half logical index into `(partition, track index, x index)`.
fn split_serpentine(c: &Cartridge, r: u32) -> (u32, u32, u32) {
    let lanes = c.tracks - 1;
    let edge_total = c.edge_partition_frames() * lanes;
    let (p, len, poff) = if r < edge_total {
        (0, c.edge_partition_frames(), r)
    } else {
        let full = c.partition_frames * lanes;
        let p = (r - edge_total) / full + 1;
        (p, c.partition_frames, (r - edge_total) % full)
    };
    (p, poff / len, poff % len)
}

fn front_from_logical(c: &Cartridge, r: u32) -> PhysicalPosition {
    let serp = serpentine_len(c);
    if r >= serp {
        return PhysicalPosition::new(c.tracks - 1, c.parking_start - 1 - (r - serp));
    }
    let (p, ti, xi) = split_serpentine(c, r);
    let lo = front_partition_lo(c, p);
    let len = partition_len(c, p);
    let track = if p % 2 == 0 { ti } else { (c.tracks - 2) - ti };
    let x = if track % 2 == 1 {
        lo + xi
    } else {
        lo + len - 1 - xi
    };
    PhysicalPosition::new(track, x)
}

fn back_from_logical(c: &Cartridge, r: u32) -> PhysicalPosition {
    let serp = serpentine_len(c);
    if r >= serp {
        return PhysicalPosition::new(0, c.parking_end + (r - serp));
    }
    let (p, ti, xi) = split_serpentine(c, r);
    let lo = back_partition_lo(c, p);
    let len = partition_len(c, p);
    let track = if p % 2 == 1 { ti + 1 } else { (c.tracks - 1) - ti };
    let x = if track % 2 == 1 {
        lo + len - 1 - xi
    } else {
        lo + xi
    };
    PhysicalPosition::new(track, x)
}
