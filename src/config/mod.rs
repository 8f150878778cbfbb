// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Tape definitions.
//!
//! A recovery run is described by a small TOML file next to the dumps:
//!
//! ```toml
//! cartridge = "sc50"
//! display_name = "Accounting server 1999"
//! has_aux_data = true
//! skip_extra_section_per_file = false
//! skip_blocks = [70154]
//!
//! [[dump]]
//! path = "tape_1.dump"
//! start_block = 0
//! bad_blocks = [1023, 1024]
//!
//! [[dump]]
//! path = "tape_2.dump"
//! start_block = 382320
//! ```
//!
//! Dump paths are resolved relative to the definition file, so a tape's
//! directory can be moved around wholesale. Validation happens at load
//! time: a bad definition is a startup error, never a mid-run surprise.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::dump::DumpSpec;
use crate::tape::cartridge::CartridgeKind;
use crate::tape::{Cartridge, max_logical};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read tape definition {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("tape definition is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cartridge class {0:?} has no documented geometry")]
    UnsupportedCartridge(CartridgeKind),
    #[error("tape definition names no dump files")]
    NoDumps,
    #[error("dump file {0} does not exist")]
    MissingDump(PathBuf),
    #[error("dump {path}: start block {hint} is past the last logical block {max}")]
    HintOutOfRange { path: PathBuf, hint: u32, max: u32 },
    #[error("dump {0} has no auxiliary data and needs a start_block to be attributable")]
    MissingStartBlock(PathBuf),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DumpFileEntry {
    pub path: PathBuf,
    pub start_block: Option<u32>,
    #[serde(default)]
    pub bad_blocks: Vec<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TapeDefinition {
    pub cartridge: CartridgeKind,
    pub display_name: String,
    #[serde(default = "default_has_aux_data")]
    pub has_aux_data: bool,
    #[serde(default)]
    pub skip_extra_section_per_file: bool,
    #[serde(default)]
    pub skip_blocks: Vec<u32>,
    #[serde(rename = "dump")]
    pub dumps: Vec<DumpFileEntry>,
}

fn default_has_aux_data() -> bool {
    true
}

impl TapeDefinition {
    /// Parse and validate a tape definition file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let mut definition: TapeDefinition = toml::from_str(&text)?;
        let base = path.parent().unwrap_or(Path::new("."));
        for dump in &mut definition.dumps {
            if dump.path.is_relative() {
                dump.path = base.join(&dump.path);
            }
        }
        definition.validate()?;
        Ok(definition)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let geometry = self.geometry()?;
        if self.dumps.is_empty() {
            return Err(ConfigError::NoDumps);
        }
        let max = max_logical(&geometry);
        for dump in &self.dumps {
            if !dump.path.is_file() {
                return Err(ConfigError::MissingDump(dump.path.clone()));
            }
            if let Some(hint) = dump.start_block
                && hint >= max
            {
                return Err(ConfigError::HintOutOfRange {
                    path: dump.path.clone(),
                    hint,
                    max,
                });
            }
            if !self.has_aux_data && dump.start_block.is_none() {
                return Err(ConfigError::MissingStartBlock(dump.path.clone()));
            }
        }
        Ok(())
    }

    pub fn geometry(&self) -> Result<Cartridge, ConfigError> {
        self.cartridge
            .geometry()
            .ok_or(ConfigError::UnsupportedCartridge(self.cartridge))
    }

    /// The scanner's view of the dump list.
    pub fn dump_specs(&self) -> Vec<DumpSpec> {
        self.dumps
            .iter()
            .map(|dump| DumpSpec {
                path: dump.path.clone(),
                start_block: dump.start_block,
                bad_blocks: dump.bad_blocks.iter().copied().collect(),
            })
            .collect()
    }

    /// Logical blocks the operator wants excluded from the stream.
    pub fn skip_set(&self) -> BTreeSet<u32> {
        self.skip_blocks.iter().copied().collect()
    }

    /// Output file names, all derived from the display name.
    pub fn archive_file_name(&self) -> String {
        format!("{}.zip", self.display_name)
    }

    pub fn log_file_name(&self) -> String {
        format!("{} Extraction.log", self.display_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_definition(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("tape.toml");
        fs::write(&path, body).unwrap();
        path
    }

    fn touch_dump(dir: &Path, name: &str) {
        let mut f = fs::File::create(dir.join(name)).unwrap();
        f.write_all(&[0u8; 8]).unwrap();
    }

    #[test]
    fn loads_a_full_definition() {
        let dir = tempfile::tempdir().unwrap();
        touch_dump(dir.path(), "tape_1.dump");
        touch_dump(dir.path(), "tape_2.dump");
        let path = write_definition(
            dir.path(),
            r#"
cartridge = "sc50"
display_name = "Accounting 1999"
skip_blocks = [17, 42]

[[dump]]
path = "tape_1.dump"
start_block = 0
bad_blocks = [5]

[[dump]]
path = "tape_2.dump"
"#,
        );
        let definition = TapeDefinition::load(&path).unwrap();
        assert!(definition.has_aux_data);
        assert!(!definition.skip_extra_section_per_file);
        assert_eq!(definition.skip_set(), BTreeSet::from([17, 42]));
        let specs = definition.dump_specs();
        assert_eq!(specs.len(), 2);
        // Relative dump paths resolve against the definition's directory.
        assert!(specs[0].path.starts_with(dir.path()));
        assert_eq!(specs[0].bad_blocks, BTreeSet::from([5]));
        assert_eq!(definition.archive_file_name(), "Accounting 1999.zip");
        assert_eq!(
            definition.log_file_name(),
            "Accounting 1999 Extraction.log"
        );
    }

    #[test]
    fn sc30_has_no_geometry_yet() {
        let dir = tempfile::tempdir().unwrap();
        touch_dump(dir.path(), "t.dump");
        let path = write_definition(
            dir.path(),
            "cartridge = \"sc30\"\ndisplay_name = \"x\"\n[[dump]]\npath = \"t.dump\"\n",
        );
        assert!(matches!(
            TapeDefinition::load(&path),
            Err(ConfigError::UnsupportedCartridge(CartridgeKind::Sc30))
        ));
    }

    #[test]
    fn missing_dump_is_a_startup_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_definition(
            dir.path(),
            "cartridge = \"sc50\"\ndisplay_name = \"x\"\n[[dump]]\npath = \"nope.dump\"\n",
        );
        assert!(matches!(
            TapeDefinition::load(&path),
            Err(ConfigError::MissingDump(_))
        ));
    }

    #[test]
    fn aux_less_dumps_need_a_hint() {
        let dir = tempfile::tempdir().unwrap();
        touch_dump(dir.path(), "t.dump");
        let path = write_definition(
            dir.path(),
            "cartridge = \"adr50\"\ndisplay_name = \"x\"\nhas_aux_data = false\n[[dump]]\npath = \"t.dump\"\n",
        );
        assert!(matches!(
            TapeDefinition::load(&path),
            Err(ConfigError::MissingStartBlock(_))
        ));
    }

    #[test]
    fn hint_must_be_on_the_tape() {
        let dir = tempfile::tempdir().unwrap();
        touch_dump(dir.path(), "t.dump");
        let path = write_definition(
            dir.path(),
            "cartridge = \"sc50\"\ndisplay_name = \"x\"\n[[dump]]\npath = \"t.dump\"\nstart_block = 999999999\n",
        );
        assert!(matches!(
            TapeDefinition::load(&path),
            Err(ConfigError::HintOutOfRange { .. })
        ));
    }
}
