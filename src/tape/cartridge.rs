// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::fmt;

use serde::Deserialize;

/// Geometry of one cartridge class. All fields are fixed constants; two
/// cartridges of the same class compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cartridge {
    /// Parallel tracks on the tape.
    pub tracks: u32,
    /// Frames along each track.
    pub frames_per_track: u32,
    /// First frame of the parking zone, on every track.
    pub parking_start: u32,
    /// One past the last frame of the parking zone.
    pub parking_end: u32,
    /// Frames per serpentine partition.
    pub partition_frames: u32,
}

/// The 50 GB class (SC-50 and the ADR2.50 drives). The 30 GB class is
/// accepted by the configuration parser but has no documented geometry; see
/// `CartridgeKind::geometry`.
pub const ADR_50: Cartridge = Cartridge {
    tracks: 24,
    frames_per_track: 31_959,
    parking_start: 15_930,
    parking_end: 16_029,
    partition_frames: 1_500,
};

impl Cartridge {
    /// Frames in the parking zone of a single track.
    pub const fn parking_frames(&self) -> u32 {
        self.parking_end - self.parking_start
    }

    /// Frames per track on either side of the parking zone. The zone is
    /// centred, so the front and back counts are equal.
    pub const fn half_track_frames(&self) -> u32 {
        self.parking_start
    }

    /// Number of frames in the partition straddling the parking zone.
    pub const fn edge_partition_frames(&self) -> u32 {
        self.parking_start % self.partition_frames
    }

    /// Total physical frames, parking zone included.
    pub const fn total_frames(&self) -> u32 {
        self.tracks * self.frames_per_track
    }

    /// Raster index of a position: `track * frames_per_track + x`. This is
    /// the encoding the drive firmware reports in the auxiliary area of each
    /// dumped frame.
    pub const fn raster_index(&self, pos: PhysicalPosition) -> u32 {
        pos.track * self.frames_per_track + pos.x
    }

    /// Inverse of [`Cartridge::raster_index`]. `None` if the index is off
    /// the end of the grid.
    pub const fn position_at(&self, raster: u32) -> Option<PhysicalPosition> {
        if raster >= self.total_frames() {
            return None;
        }
        Some(PhysicalPosition {
            track: raster / self.frames_per_track,
            x: raster % self.frames_per_track,
        })
    }

    /// Which stretch of tape a position sits on.
    pub const fn classify(&self, pos: PhysicalPosition) -> Location {
        if pos.x < self.parking_start {
            Location::Front
        } else if pos.x < self.parking_end {
            Location::Parking
        } else {
            Location::Back
        }
    }

    /// Raster successor over the whole grid, parking zone included. Returns
    /// `None` only past the final cell of the final track.
    pub const fn next_including_parking(
        &self,
        pos: PhysicalPosition,
    ) -> Option<PhysicalPosition> {
        if pos.x + 1 < self.frames_per_track {
            Some(PhysicalPosition {
                track: pos.track,
                x: pos.x + 1,
            })
        } else if pos.track + 1 < self.tracks {
            Some(PhysicalPosition {
                track: pos.track + 1,
                x: 0,
            })
        } else {
            None
        }
    }
}

/// One frame's identity on the physical tape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysicalPosition {
    pub track: u32,
    pub x: u32,
}

impl PhysicalPosition {
    pub const fn new(track: u32, x: u32) -> Self {
        Self { track, x }
    }
}

impl fmt::Display for PhysicalPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track {} frame {}", self.track, self.x)
    }
}

/// The three stretches of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Front,
    Parking,
    Back,
}

/// Cartridge classes named by tape definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CartridgeKind {
    /// 30 GB SC-30 cartridge. Recognised but unsupported: its geometry
    /// constants never surfaced in surviving documentation.
    Sc30,
    /// 50 GB SC-50 cartridge.
    Sc50,
    /// ADR 50 GB cartridge, same geometry as SC-50.
    Adr50,
}

impl CartridgeKind {
    /// The geometry for this class, if it is documented.
    pub fn geometry(self) -> Option<Cartridge> {
        match self {
            CartridgeKind::Sc30 => None,
            CartridgeKind::Sc50 | CartridgeKind::Adr50 => Some(ADR_50),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adr50_geometry() {
        assert_eq!(ADR_50.parking_frames(), 99);
        assert_eq!(ADR_50.half_track_frames(), 15_930);
        assert_eq!(ADR_50.edge_partition_frames(), 930);
        // The zone is centred: front and back stretches are the same length.
        assert_eq!(
            ADR_50.frames_per_track - ADR_50.parking_end,
            ADR_50.parking_start
        );
    }

    #[test]
    fn classify_boundaries() {
        let c = ADR_50;
        assert_eq!(c.classify(PhysicalPosition::new(0, 15_929)), Location::Front);
        assert_eq!(
            c.classify(PhysicalPosition::new(0, 15_930)),
            Location::Parking
        );
        assert_eq!(
            c.classify(PhysicalPosition::new(0, 16_028)),
            Location::Parking
        );
        assert_eq!(c.classify(PhysicalPosition::new(0, 16_029)), Location::Back);
    }

    #[test]
    fn raster_round_trip() {
        let c = ADR_50;
        for raster in [0, 1, 31_958, 31_959, 500_000, c.total_frames() - 1] {
            let pos = c.position_at(raster).unwrap();
            assert_eq!(c.raster_index(pos), raster);
        }
        assert_eq!(c.position_at(c.total_frames()), None);
    }

    #[test]
    fn raster_successor_is_total() {
        let c = ADR_50;
        assert_eq!(
            c.next_including_parking(PhysicalPosition::new(0, 31_958)),
            Some(PhysicalPosition::new(1, 0))
        );
        assert_eq!(
            c.next_including_parking(PhysicalPosition::new(23, 31_958)),
            None
        );
        // The successor walks straight through the parking zone.
        assert_eq!(
            c.next_including_parking(PhysicalPosition::new(5, 15_929)),
            Some(PhysicalPosition::new(5, 15_930))
        );
    }
}
