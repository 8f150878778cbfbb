// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Damage reporting.
//!
//! Two views of the same information: contiguous ranges of logical blocks
//! that no dump file covered (for the log), and a PNG of the physical
//! tape surface (for eyeballing which stretch of tape died). In the image
//! each track is one horizontal band, green where frames were recovered,
//! red where they were not, and grey across the parking zone.

use std::ops::RangeInclusive;
use std::path::Path;

use itertools::Itertools;
use thiserror::Error;
use tiny_skia::{Pixmap, PremultipliedColorU8};
use tracing::info;

use crate::dump::BlockMap;
use crate::tape::{Cartridge, PhysicalPosition, logical_to_physical, max_logical};

/// Horizontal downsampling of the damage image: one pixel column per this
/// many frames.
const FRAMES_PER_PIXEL: u32 = 16;
/// Pixel height of one track band, plus a one-pixel separator.
const TRACK_BAND: u32 = 13;
const TRACK_PITCH: u32 = TRACK_BAND + 1;

#[derive(Debug, Error)]
pub enum DamageError {
    #[error("could not build the damage pixmap")]
    Pixmap,
    #[error("could not encode the damage image: {0}")]
    Png(String),
}

/// Contiguous runs of logical blocks with no recovered payload.
pub fn missing_logical_ranges(
    cartridge: &Cartridge,
    map: &BlockMap,
) -> Vec<RangeInclusive<u32>> {
    let missing = (0..max_logical(cartridge)).filter(|&logical| {
        let pos = logical_to_physical(cartridge, logical)
            .expect("logical index below max maps to a position");
        !map.data.contains_key(&cartridge.raster_index(pos))
    });
    missing
        .enumerate()
        .chunk_by(|(i, logical)| logical - *i as u32)
        .into_iter()
        .map(|(_, mut run)| {
            let (_, first) = run.next().expect("chunk_by groups are never empty");
            let last = run.last().map_or(first, |(_, logical)| logical);
            first..=last
        })
        .collect()
}

/// Write each gap to the log and return the total count of missing blocks.
pub fn log_gaps(ranges: &[RangeInclusive<u32>]) -> u64 {
    let mut total = 0u64;
    for range in ranges {
        let len = u64::from(range.end() - range.start()) + 1;
        total += len;
        info!(
            from = range.start(),
            to = range.end(),
            blocks = len,
            "unrecovered logical block range"
        );
    }
    total
}

fn shade(pixmap: &mut Pixmap, x: u32, track: u32, color: PremultipliedColorU8) {
    let width = pixmap.width();
    let base = track * TRACK_PITCH;
    for y in base..base + TRACK_BAND {
        let index = (y * width + x) as usize;
        pixmap.pixels_mut()[index] = color;
    }
}

/// Render the physical recovery picture of the tape.
pub fn render_damage_map(
    cartridge: &Cartridge,
    map: &BlockMap,
    path: &Path,
) -> Result<(), DamageError> {
    let width = cartridge.frames_per_track.div_ceil(FRAMES_PER_PIXEL);
    let height = cartridge.tracks * TRACK_PITCH;
    let mut pixmap = Pixmap::new(width, height).ok_or(DamageError::Pixmap)?;

    let recovered = PremultipliedColorU8::from_rgba(0x2E, 0xA0, 0x43, 0xFF)
        .expect("opaque color is always premultipliable");
    let lost = PremultipliedColorU8::from_rgba(0xC0, 0x2A, 0x2A, 0xFF)
        .expect("opaque color is always premultipliable");
    let parking = PremultipliedColorU8::from_rgba(0x55, 0x55, 0x55, 0xFF)
        .expect("opaque color is always premultipliable");
    let parking_recovered = PremultipliedColorU8::from_rgba(0x9A, 0xC0, 0x6A, 0xFF)
        .expect("opaque color is always premultipliable");

    for track in 0..cartridge.tracks {
        for column in 0..width {
            let x_lo = column * FRAMES_PER_PIXEL;
            let x_hi = (x_lo + FRAMES_PER_PIXEL).min(cartridge.frames_per_track);
            let mut any_parking = false;
            let mut any_recovered = false;
            for x in x_lo..x_hi {
                let pos = PhysicalPosition::new(track, x);
                let raster = cartridge.raster_index(pos);
                match cartridge.classify(pos) {
                    crate::tape::Location::Parking => {
                        any_parking = true;
                        any_recovered |= map.parking.contains_key(&raster);
                    }
                    _ => any_recovered |= map.data.contains_key(&raster),
                }
            }
            let color = match (any_parking, any_recovered) {
                (true, true) => parking_recovered,
                (true, false) => parking,
                (false, true) => recovered,
                (false, false) => lost,
            };
            shade(&mut pixmap, column, track, color);
        }
    }

    pixmap
        .save_png(path)
        .map_err(|err| DamageError::Png(err.to_string()))
}
