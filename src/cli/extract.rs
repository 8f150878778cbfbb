// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The `extract` subcommand: the full recovery pipeline.
//!
//! Scan dumps → order blocks → frame packets → ZIP, then the damage image
//! and the catalog cross-check. Stages are strictly sequential; the block
//! map must be complete before the stream exists, and the stream before
//! the framer runs.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::Context;
use tracing::{info, warn};

use crate::arcserve::framer::{FramerOptions, PacketFramer};
use crate::archive::TapeArchive;
use crate::catalog::cross_check;
use crate::config::TapeDefinition;
use crate::damage::{log_gaps, missing_logical_ranges, render_damage_map};
use crate::dump::{Scanner, build_ordered_list};
use crate::tape::TapeStream;

pub fn run(
    definition: &TapeDefinition,
    output_dir: &Path,
    fast_debug: bool,
) -> anyhow::Result<()> {
    let cartridge = definition.geometry()?;
    info!(
        tape = %definition.display_name,
        dumps = definition.dumps.len(),
        "starting extraction"
    );

    let specs = definition.dump_specs();
    let map = Scanner::new(cartridge, definition.has_aux_data)
        .scan(&specs)
        .context("scanning the dump files failed")?;
    info!(
        data_blocks = map.data.len(),
        parking_blocks = map.parking.len(),
        duplicates = map.stats.duplicates,
        write_stops = map.stats.write_stops,
        "dump scan complete"
    );

    let gaps = missing_logical_ranges(&cartridge, &map);
    let missing_blocks = log_gaps(&gaps);
    let damage_path = output_dir.join("tape-damage.png");
    if let Err(err) = render_damage_map(&cartridge, &map, &damage_path) {
        // Diagnostics only; the extraction itself goes on.
        warn!(%err, "could not render the damage image");
    } else {
        info!(path = %damage_path.display(), "damage image written");
    }

    let skip_blocks = definition.skip_set();
    let ordered = build_ordered_list(&cartridge, &map, &skip_blocks);
    if ordered.is_empty() {
        info!("the dumps hold no data blocks; writing an empty archive");
    }

    let sources = specs
        .iter()
        .map(|spec| {
            File::open(&spec.path)
                .with_context(|| format!("cannot reopen dump {}", spec.path.display()))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let mut stream = TapeStream::new(ordered, sources);

    let archive_path = output_dir.join(definition.archive_file_name());
    let archive_file = File::create(&archive_path)
        .with_context(|| format!("cannot create archive {}", archive_path.display()))?;
    let mut archive = TapeArchive::new(BufWriter::new(archive_file));

    let options = FramerOptions {
        skip_extra_section_per_file: definition.skip_extra_section_per_file,
        fast_debug,
    };
    let stats = PacketFramer::new(&mut stream, &mut archive, options).run();

    let finished = archive
        .finish()
        .context("finalising the output archive failed")?;

    for packet in &finished.packets {
        tracing::debug!(
            offset = packet.stream_offset,
            kind = packet.kind,
            "{}",
            packet.detail
        );
    }

    let damaged = finished
        .entries
        .iter()
        .filter(|entry| entry.is_damaged())
        .count();
    for entry in finished.entries.iter().filter(|entry| entry.is_damaged()) {
        warn!(
            path = %entry.path,
            declared = entry.declared,
            written = entry.written,
            "entry recovered with the wrong size"
        );
    }

    let report = cross_check(&finished.entries, &finished.catalogs);

    info!(
        archive = %archive_path.display(),
        entries = finished.entries.len(),
        damaged_entries = damaged,
        sessions = stats.sessions,
        files = stats.files,
        missed_sectors = stats.missed_sectors,
        missing_blocks,
        catalog_recovered = report.recovered,
        catalog_errors = report.errors(),
        "extraction finished"
    );
    Ok(())
}
