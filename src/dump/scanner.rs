// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, warn};

use crate::dump::record::{RECORD_SIZE, parse_aux};
use crate::dump::BlockLocator;
use crate::tape::stream::OrderedBlock;
use crate::tape::{
    Cartridge, Location, PAYLOAD_SIZE, logical_to_physical, max_logical, physical_to_logical,
};

/// One dump file as named by the tape definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpSpec {
    pub path: PathBuf,
    /// Logical block the first record of this dump is believed to hold.
    pub start_block: Option<u32>,
    /// Logical blocks the salvage pass could not read; the dump holds no
    /// record for them, so attribution must jump over them.
    pub bad_blocks: BTreeSet<u32>,
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to read dump file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Tallies for the end-of-scan log line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    pub records: u64,
    pub data_blocks: u64,
    pub parking_blocks: u64,
    pub write_stops: u64,
    pub synthesized_addresses: u64,
    pub unattributable: u64,
    pub duplicates: u64,
}

/// The scanner's product: payload locators keyed by physical raster index.
#[derive(Debug, Default)]
pub struct BlockMap {
    /// Frames outside the parking zone, i.e. the logical stream.
    pub data: BTreeMap<u32, BlockLocator>,
    /// Parking-zone frames, kept aside for the parking merge utility.
    pub parking: BTreeMap<u32, BlockLocator>,
    pub stats: ScanStats,
}

/// Walks dump files record by record and attributes each payload to a
/// physical frame, without ever interpreting payload bytes.
pub struct Scanner {
    cartridge: Cartridge,
    has_aux_data: bool,
}

impl Scanner {
    pub fn new(cartridge: Cartridge, has_aux_data: bool) -> Self {
        Self {
            cartridge,
            has_aux_data,
        }
    }

    /// Scan every dump in order. Later dumps win ties, with a warning.
    pub fn scan(&self, specs: &[DumpSpec]) -> Result<BlockMap, ScanError> {
        let mut map = BlockMap::default();
        for (dump_index, spec) in specs.iter().enumerate() {
            let file = File::open(&spec.path).map_err(|source| ScanError::Io {
                path: spec.path.clone(),
                source,
            })?;
            let mut reader = BufReader::new(file);
            self.scan_source(&mut map, dump_index as u32, spec, &mut reader)
                .map_err(|source| ScanError::Io {
                    path: spec.path.clone(),
                    source,
                })?;
        }
        debug!(stats = ?map.stats, "dump scan complete");
        Ok(map)
    }

    /// Scan a single already-open dump. Exposed for tests and for the
    /// parking merge utility, which re-reads dumps through the same policy.
    pub fn scan_source<R: Read + Seek>(
        &self,
        map: &mut BlockMap,
        dump_index: u32,
        spec: &DumpSpec,
        reader: &mut R,
    ) -> io::Result<()> {
        let record_len = if self.has_aux_data {
            RECORD_SIZE as u64
        } else {
            PAYLOAD_SIZE as u64
        };
        let file_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        let records = file_len / record_len;
        if file_len % record_len != 0 {
            debug!(
                dump_index,
                trailing = file_len % record_len,
                "ignoring trailing partial record"
            );
        }

        // The logical position attribution believes the next record holds.
        let mut cursor = spec.start_block;

        for index in 0..records {
            let payload_offset = index * record_len;
            map.stats.records += 1;
            let locator = |hint| BlockLocator {
                dump_index,
                payload_offset,
                hint,
            };

            if !self.has_aux_data {
                // Bare payload runs carry no aux; every record is
                // attributed from the hint.
                self.attribute_from_hint(map, &mut cursor, &spec.bad_blocks, locator);
                continue;
            }

            let mut aux_head = [0u8; 8];
            reader.seek(SeekFrom::Start(payload_offset + PAYLOAD_SIZE as u64))?;
            reader.read_exact(&mut aux_head)?;
            let aux = parse_aux(&aux_head);

            if aux.is_write_stop() {
                // Padding past the end of written data. Not payload, but it
                // occupied a logical slot on the way out.
                map.stats.write_stops += 1;
                advance(&mut cursor, &spec.bad_blocks);
                continue;
            }

            if !aux.has_address() {
                self.attribute_from_hint(map, &mut cursor, &spec.bad_blocks, locator);
                continue;
            }

            let Some(pos) = self.cartridge.position_at(aux.physical_address) else {
                warn!(
                    dump_index,
                    record = index,
                    address = aux.physical_address,
                    "physical address is off the tape grid; skipping record"
                );
                map.stats.unattributable += 1;
                continue;
            };
            match self.cartridge.classify(pos) {
                Location::Parking => {
                    map.stats.parking_blocks += 1;
                    map.parking.insert(aux.physical_address, locator(cursor));
                }
                Location::Front | Location::Back => {
                    let logical = physical_to_logical(&self.cartridge, pos)
                        .expect("non-parking position maps to a logical block");
                    map.stats.data_blocks += 1;
                    if let Some(prev) = map.data.insert(aux.physical_address, locator(cursor)) {
                        map.stats.duplicates += 1;
                        warn!(
                            dump_index,
                            logical,
                            previous_dump = prev.dump_index,
                            "physical block already owned; last writer wins"
                        );
                    }
                    // Resynchronise the hint to the drive's own numbering.
                    cursor = Some(logical);
                    advance(&mut cursor, &spec.bad_blocks);
                }
            }
        }
        Ok(())
    }

    /// Attribute a record whose aux carries no usable address.
    fn attribute_from_hint(
        &self,
        map: &mut BlockMap,
        cursor: &mut Option<u32>,
        bad_blocks: &BTreeSet<u32>,
        locator: impl Fn(Option<u32>) -> BlockLocator,
    ) {
        let Some(hint) = *cursor else {
            warn!("record carries no physical address and the dump has no ordering hint; skipping");
            map.stats.unattributable += 1;
            return;
        };
        let hint = skip_bad(hint, bad_blocks);
        match logical_to_physical(&self.cartridge, hint) {
            Ok(pos) => {
                let raster = self.cartridge.raster_index(pos);
                map.stats.data_blocks += 1;
                map.stats.synthesized_addresses += 1;
                if let Some(prev) = map.data.insert(raster, locator(Some(hint))) {
                    map.stats.duplicates += 1;
                    warn!(
                        logical = hint,
                        previous_dump = prev.dump_index,
                        "physical block already owned; last writer wins"
                    );
                }
                *cursor = Some(hint);
                advance(cursor, bad_blocks);
            }
            Err(err) => {
                warn!(%err, "ordering hint ran off the logical range; skipping record");
                map.stats.unattributable += 1;
            }
        }
    }
}

/// Advance the attribution cursor by one logical block, jumping over blocks
/// the tape definition marks as never dumped.
fn advance(cursor: &mut Option<u32>, bad_blocks: &BTreeSet<u32>) {
    if let Some(h) = *cursor {
        *cursor = Some(skip_bad(skip_bad(h, bad_blocks) + 1, bad_blocks));
    }
}

fn skip_bad(mut logical: u32, bad_blocks: &BTreeSet<u32>) -> u32 {
    while bad_blocks.contains(&logical) {
        logical += 1;
    }
    logical
}

/// Compute the read order for the stream: every mapped block, in logical
/// order, minus the tape definition's global skip set.
pub fn build_ordered_list(
    cartridge: &Cartridge,
    map: &BlockMap,
    skip_blocks: &BTreeSet<u32>,
) -> Vec<OrderedBlock> {
    let mut ordered = Vec::with_capacity(map.data.len());
    for logical in 0..max_logical(cartridge) {
        if skip_blocks.contains(&logical) {
            continue;
        }
        let pos = logical_to_physical(cartridge, logical)
            .expect("logical index below max maps to a position");
        if let Some(&locator) = map.data.get(&cartridge.raster_index(pos)) {
            ordered.push(OrderedBlock { logical, locator });
        }
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump::record::WRITE_STOP_MAGIC;
    use crate::tape::cartridge::ADR_50;
    use crate::tape::AUX_SIZE;
    use std::io::Cursor;

    fn raster_of(logical: u32) -> u32 {
        ADR_50.raster_index(logical_to_physical(&ADR_50, logical).unwrap())
    }

    /// Append one record with the given aux magic/address.
    fn push_record(dump: &mut Vec<u8>, magic: u32, address: u32) {
        dump.extend(std::iter::repeat_n(0xA5, PAYLOAD_SIZE));
        let mut aux = [0u8; AUX_SIZE];
        aux[..4].copy_from_slice(&magic.to_be_bytes());
        aux[4..8].copy_from_slice(&address.to_be_bytes());
        dump.extend_from_slice(&aux);
    }

    fn spec(start_block: Option<u32>, bad: &[u32]) -> DumpSpec {
        DumpSpec {
            path: PathBuf::from("test.dump"),
            start_block,
            bad_blocks: bad.iter().copied().collect(),
        }
    }

    fn scan_one(spec: &DumpSpec, dump: Vec<u8>) -> BlockMap {
        let scanner = Scanner::new(ADR_50, true);
        let mut map = BlockMap::default();
        scanner
            .scan_source(&mut map, 0, spec, &mut Cursor::new(dump))
            .unwrap();
        map
    }

    #[test]
    fn addressed_records_are_mapped() {
        let mut dump = Vec::new();
        push_record(&mut dump, 1, raster_of(10));
        push_record(&mut dump, 1, raster_of(11));
        let map = scan_one(&spec(None, &[]), dump);
        assert_eq!(map.stats.data_blocks, 2);
        let locator = map.data[&raster_of(11)];
        assert_eq!(locator.payload_offset, RECORD_SIZE as u64);
        // The second record's hint was resynchronised from the first.
        assert_eq!(locator.hint, Some(11));
    }

    #[test]
    fn invalid_addresses_are_synthesized_from_the_hint() {
        let mut dump = Vec::new();
        push_record(&mut dump, 1, 0);
        push_record(&mut dump, 1, 0xFFFF_FFFF);
        let map = scan_one(&spec(Some(500), &[]), dump);
        assert_eq!(map.stats.synthesized_addresses, 2);
        assert!(map.data.contains_key(&raster_of(500)));
        assert!(map.data.contains_key(&raster_of(501)));
    }

    #[test]
    fn unaddressable_records_without_a_hint_are_skipped() {
        let mut dump = Vec::new();
        push_record(&mut dump, 1, 0);
        let map = scan_one(&spec(None, &[]), dump);
        assert!(map.data.is_empty());
        assert_eq!(map.stats.unattributable, 1);
    }

    #[test]
    fn write_stops_advance_the_hint_without_mapping() {
        let mut dump = Vec::new();
        push_record(&mut dump, WRITE_STOP_MAGIC, 0);
        push_record(&mut dump, 1, 0);
        let map = scan_one(&spec(Some(100), &[]), dump);
        assert_eq!(map.stats.write_stops, 1);
        assert_eq!(map.data.len(), 1);
        // The write stop consumed logical 100.
        assert!(map.data.contains_key(&raster_of(101)));
    }

    #[test]
    fn known_bad_blocks_are_jumped_over() {
        let mut dump = Vec::new();
        push_record(&mut dump, 1, 0);
        push_record(&mut dump, 1, 0);
        let map = scan_one(&spec(Some(100), &[101, 102]), dump);
        assert!(map.data.contains_key(&raster_of(100)));
        assert!(map.data.contains_key(&raster_of(103)));
    }

    #[test]
    fn duplicate_owners_are_overwritten() {
        let mut dump = Vec::new();
        push_record(&mut dump, 1, raster_of(7));
        push_record(&mut dump, 1, raster_of(7));
        let map = scan_one(&spec(None, &[]), dump);
        assert_eq!(map.stats.duplicates, 1);
        assert_eq!(map.data[&raster_of(7)].payload_offset, RECORD_SIZE as u64);
    }

    #[test]
    fn parking_blocks_are_kept_aside() {
        let mut dump = Vec::new();
        let parked = ADR_50.raster_index(crate::tape::PhysicalPosition::new(
            3,
            ADR_50.parking_start + 5,
        ));
        push_record(&mut dump, 1, parked);
        let map = scan_one(&spec(None, &[]), dump);
        assert!(map.data.is_empty());
        assert_eq!(map.parking.len(), 1);
    }

    #[test]
    fn trailing_partial_record_is_ignored() {
        let mut dump = Vec::new();
        push_record(&mut dump, 1, raster_of(0));
        dump.extend_from_slice(&[1, 2, 3]);
        let map = scan_one(&spec(None, &[]), dump);
        assert_eq!(map.stats.records, 1);
    }

    #[test]
    fn later_dumps_override_earlier_ones() {
        let scanner = Scanner::new(ADR_50, true);
        let mut map = BlockMap::default();
        for dump_index in 0..2u32 {
            let mut dump = Vec::new();
            push_record(&mut dump, 1, raster_of(9));
            scanner
                .scan_source(&mut map, dump_index, &spec(None, &[]), &mut Cursor::new(dump))
                .unwrap();
        }
        assert_eq!(map.stats.duplicates, 1);
        assert_eq!(map.data[&raster_of(9)].dump_index, 1);
    }

    #[test]
    fn ordered_list_is_logical_and_respects_skips() {
        let mut dump = Vec::new();
        for logical in [5u32, 3, 4] {
            push_record(&mut dump, 1, raster_of(logical));
        }
        let map = scan_one(&spec(None, &[]), dump);
        let ordered = build_ordered_list(&ADR_50, &map, &BTreeSet::from([4]));
        let logicals: Vec<u32> = ordered.iter().map(|b| b.logical).collect();
        assert_eq!(logicals, vec![3, 5]);
    }

    #[test]
    fn bare_payload_dumps_attribute_every_record() {
        let scanner = Scanner::new(ADR_50, false);
        let mut map = BlockMap::default();
        let dump = vec![0u8; PAYLOAD_SIZE * 3];
        scanner
            .scan_source(&mut map, 0, &spec(Some(0), &[]), &mut Cursor::new(dump))
            .unwrap();
        assert_eq!(map.stats.data_blocks, 3);
        assert!(map.data.contains_key(&raster_of(2)));
        assert_eq!(map.data[&raster_of(1)].payload_offset, PAYLOAD_SIZE as u64);
    }
}
