// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The `merge-parking` subcommand.
//!
//! ARCserve abused the drive's parking zone as extra storage, so some dumps
//! carry parking-zone records the logical stream never sees. This pass
//! collects every such record across all dumps into one
//! `tape_parking.dump`, in raster order, for separate analysis.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::Context;
use tracing::info;

use crate::config::TapeDefinition;
use crate::dump::{RECORD_SIZE, Scanner};

pub fn run(definition: &TapeDefinition, output_dir: &Path) -> anyhow::Result<()> {
    let cartridge = definition.geometry()?;
    if !definition.has_aux_data {
        anyhow::bail!(
            "parking-zone records are only identifiable through auxiliary data, \
             which this tape's dumps do not carry"
        );
    }

    let specs = definition.dump_specs();
    let map = Scanner::new(cartridge, definition.has_aux_data)
        .scan(&specs)
        .context("scanning the dump files failed")?;
    if map.parking.is_empty() {
        info!("the dumps hold no parking-zone records; nothing to merge");
        return Ok(());
    }

    let mut sources = specs
        .iter()
        .map(|spec| {
            File::open(&spec.path)
                .map(BufReader::new)
                .with_context(|| format!("cannot reopen dump {}", spec.path.display()))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let merged_path = output_dir.join("tape_parking.dump");
    let mut out = BufWriter::new(
        File::create(&merged_path)
            .with_context(|| format!("cannot create {}", merged_path.display()))?,
    );

    // BTreeMap iteration is raster order.
    let mut record = vec![0u8; RECORD_SIZE];
    for (raster, locator) in &map.parking {
        let source = &mut sources[locator.dump_index as usize];
        source.seek(SeekFrom::Start(locator.payload_offset))?;
        source.read_exact(&mut record).with_context(|| {
            format!("parking record for raster index {raster} is truncated")
        })?;
        out.write_all(&record)?;
    }
    out.flush()?;

    info!(
        path = %merged_path.display(),
        records = map.parking.len(),
        "parking-zone records merged"
    );
    Ok(())
}
