// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! End-to-end pipeline tests: synthetic dump files on disk, through the
//! scanner, the interwoven stream and the packet framer, down to a ZIP
//! that is opened again and checked.

mod common;

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use common::*;
use onstream_recovery::arcserve::framer::{FramerOptions, FramerStats, PacketFramer};
use onstream_recovery::archive::{FinishedArchive, TapeArchive};
use onstream_recovery::catalog::cross_check;
use onstream_recovery::dump::{BlockMap, DumpSpec, Scanner, build_ordered_list};
use onstream_recovery::tape::{ADR_50, PAYLOAD_SIZE, TapeStream};

/// Write each dump to disk, scan them, and run the whole pipeline.
fn extract(
    dir: &tempfile::TempDir,
    dumps: &[Vec<u8>],
) -> (FramerStats, FinishedArchive<Cursor<Vec<u8>>>, BlockMap) {
    let specs: Vec<DumpSpec> = dumps
        .iter()
        .enumerate()
        .map(|(i, bytes)| {
            let path: PathBuf = dir.path().join(format!("tape_{i}.dump"));
            File::create(&path).unwrap().write_all(bytes).unwrap();
            DumpSpec {
                path,
                start_block: None,
                bad_blocks: BTreeSet::new(),
            }
        })
        .collect();

    let scanner = Scanner::new(ADR_50, true);
    let map = scanner.scan(&specs).unwrap();
    let ordered = build_ordered_list(&ADR_50, &map, &BTreeSet::new());
    let sources: Vec<File> = specs
        .iter()
        .map(|spec| File::open(&spec.path).unwrap())
        .collect();
    let mut stream = TapeStream::new(ordered, sources);
    let mut archive = TapeArchive::new(Cursor::new(Vec::new()));
    let stats = PacketFramer::new(&mut stream, &mut archive, FramerOptions::default()).run();
    (stats, archive.finish().unwrap(), map)
}

#[test]
fn empty_tape_yields_an_empty_archive() {
    let dir = tempfile::tempdir().unwrap();
    let mut dump = Vec::new();
    for _ in 0..3 {
        write_stop_record(&mut dump);
    }
    let (stats, finished, map) = extract(&dir, &[dump]);
    assert_eq!(map.stats.write_stops, 3);
    assert_eq!(map.data.len(), 0);
    assert_eq!(stats.packets, 0);
    assert_eq!(stats.missed_sectors, 0);
    assert!(finished.entries.is_empty());

    let zip = zip::ZipArchive::new(finished.writer).unwrap();
    assert_eq!(zip.len(), 0);
}

#[test]
fn single_dos_file_round_trips_through_the_zip() {
    let dir = tempfile::tempdir().unwrap();
    let mut stream = session_header("C:\\");
    stream.extend(dos_file_header("A.TXT", 5, 0x20));
    stream.extend(b"Hello");
    pad_to_sector(&mut stream);
    stream.extend(file_trailer("A.TXT"));
    stream.extend(session_terminator());
    let dump = dump_from_stream(&stream, &[0]);

    let (stats, finished, _) = extract(&dir, &[dump]);
    assert_eq!(stats.sessions, 1);
    assert_eq!(stats.files, 1);
    assert_eq!(stats.trailers, 1);
    assert_eq!(stats.terminators, 1);
    assert_eq!(stats.missed_sectors, 0);

    let mut zip = zip::ZipArchive::new(finished.writer).unwrap();
    let mut content = String::new();
    zip.by_name("C:\\A.TXT")
        .unwrap()
        .read_to_string(&mut content)
        .unwrap();
    assert_eq!(content, "Hello");
}

#[test]
fn blocks_interleaved_across_dumps_read_in_logical_order() {
    // Dump A holds logical blocks 0-2 and 6-8, dump B holds 3-5; the
    // stream must still read contiguously with B's payload at block 3.
    let dir = tempfile::tempdir().unwrap();
    let mut stream_bytes = vec![0u8; 9 * PAYLOAD_SIZE];
    for (i, chunk) in stream_bytes.chunks_mut(PAYLOAD_SIZE).enumerate() {
        chunk.fill(0x30 + i as u8);
    }
    let slice = |l: u32| {
        stream_bytes[l as usize * PAYLOAD_SIZE..(l as usize + 1) * PAYLOAD_SIZE].to_vec()
    };
    let mut dump_a = Vec::new();
    for l in [0u32, 1, 2, 6, 7, 8] {
        dump_a.extend(dump_from_stream(&slice(l), &[l]));
    }
    let mut dump_b = Vec::new();
    for l in [3u32, 4, 5] {
        dump_b.extend(dump_from_stream(&slice(l), &[l]));
    }

    let specs: Vec<DumpSpec> = [("a", dump_a), ("b", dump_b)]
        .into_iter()
        .map(|(name, bytes)| {
            let path = dir.path().join(format!("tape_{name}.dump"));
            File::create(&path).unwrap().write_all(&bytes).unwrap();
            DumpSpec {
                path,
                start_block: None,
                bad_blocks: BTreeSet::new(),
            }
        })
        .collect();
    let map = Scanner::new(ADR_50, true).scan(&specs).unwrap();
    let ordered = build_ordered_list(&ADR_50, &map, &BTreeSet::new());
    assert_eq!(ordered.len(), 9);

    let sources: Vec<File> = specs
        .iter()
        .map(|spec| File::open(&spec.path).unwrap())
        .collect();
    let mut stream = TapeStream::new(ordered, sources);
    assert_eq!(stream.len(), 9 * PAYLOAD_SIZE as u64);

    // The byte at the boundary into block 3 comes from dump B.
    stream
        .seek(SeekFrom::Start(3 * PAYLOAD_SIZE as u64))
        .unwrap();
    let mut byte = [0u8; 1];
    stream.read_exact(&mut byte).unwrap();
    assert_eq!(byte[0], 0x33);

    // And the whole stream is the logical concatenation.
    stream.seek(SeekFrom::Start(0)).unwrap();
    let mut all = Vec::new();
    stream.read_to_end(&mut all).unwrap();
    assert_eq!(all, stream_bytes);
    assert!(stream.gap_since_last_check().is_none());
}

#[test]
fn noise_between_packets_costs_exactly_its_sectors() {
    let dir = tempfile::tempdir().unwrap();
    let mut stream = session_header("C:\\");
    stream.extend(std::iter::repeat_n(0xA7u8, 2048));
    stream.extend(dos_file_header("B.TXT", 3, 0x20));
    stream.extend(b"abc");
    pad_to_sector(&mut stream);
    stream.extend(file_trailer("B.TXT"));
    let dump = dump_from_stream(&stream, &[0]);

    let (stats, finished, _) = extract(&dir, &[dump]);
    assert_eq!(stats.sessions, 1);
    assert_eq!(stats.files, 1);
    assert_eq!(stats.missed_sectors, 4);
    assert_eq!(stats.miss_runs, 1);
    assert_eq!(finished.entries[0].path, "C:\\B.TXT");
    assert_eq!(finished.entries[0].written, 3);
}

#[test]
fn missing_blocks_surface_as_gap_events() {
    // Logical block 1 was never dumped; the framer should log (and count)
    // the jump while continuing to parse what follows in block 2.
    let dir = tempfile::tempdir().unwrap();
    let block0 = {
        let mut b = session_header("C:\\");
        b.resize(PAYLOAD_SIZE, 0);
        b
    };
    let block2 = vec![0u8; PAYLOAD_SIZE];
    let mut dump = dump_from_stream(&block0, &[0]);
    dump.extend(dump_from_stream(&block2, &[2]));

    let (stats, _, map) = extract(&dir, &[dump]);
    assert_eq!(map.data.len(), 2);
    assert_eq!(stats.sessions, 1);
    assert!(stats.gap_events >= 1);
}

#[test]
fn catalog_cross_check_flags_short_files() {
    let dir = tempfile::tempdir().unwrap();

    // The catalog (a DOS file named SESSION.CAT) says Y.TXT has 100
    // bytes; the tape only carries 80.
    let mut catalog = session_header("D:\\");
    catalog.extend(catalog_entry("D:\\X\\Y.TXT", 100, 1));

    let mut stream = session_header("D:\\");
    stream.extend(dos_file_header("X\\Y.TXT", 80, 0x20));
    stream.extend(std::iter::repeat_n(b'y', 80));
    pad_to_sector(&mut stream);
    stream.extend(file_trailer("X\\Y.TXT"));
    stream.extend(dos_file_header("SESSION.CAT", catalog.len() as u32, 0x20));
    stream.extend(&catalog);
    pad_to_sector(&mut stream);
    stream.extend(session_terminator());
    let logicals: Vec<u32> = (0..stream.len().div_ceil(PAYLOAD_SIZE) as u32).collect();
    let dump = dump_from_stream(&stream, &logicals);

    let (stats, finished, _) = extract(&dir, &[dump]);
    assert_eq!(stats.files, 2);
    assert_eq!(finished.catalogs.len(), 1);

    let report = cross_check(&finished.entries, &finished.catalogs);
    assert_eq!(report.recovered, 0);
    assert_eq!(report.damaged, 1);
    assert_eq!(report.missing, 0);
    assert_eq!(report.errors(), 1);
    assert_eq!(report.damaged_bytes, 80);
}
