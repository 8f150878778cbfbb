// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Universal-dialect stream chunks.
//!
//! The universal file header does not carry file bytes directly; its body
//! is a second framing layer of _stream chunks_, each a 30-byte header, an
//! optional NUL-terminated name, and a body:
//!
//! ```text
//! ├──────┬──────┬──────┬──────┬──────┬──────┬─────┬────────┬────────┤
//! │id    │filesys│size  │name  │type  │flags │resvd│name    │body    │
//! │u32 BE│u32 LE│u64 LE│sz u32│u32 BE│u32 LE│u16  │        │        │
//! └──────┴──────┴──────┴──────┴──────┴──────┴─────┴────────┴────────┘
//! ```
//!
//! Chunk starts obey ARCserve's odd `3 mod 4` alignment: after every body
//! the cursor rounds up to the next stream position congruent 3 modulo 4.
//! The 343-byte shared prefix plus the 4-byte packet signature put the
//! first chunk at exactly such a position; the rule keeps every later one
//! there too.
//!
//! File data arrives in `RAW` (or `CATALOG`) chunks, optionally
//! DEFLATE-compressed; names and long paths arrive in their own metadata
//! chunks, which are cached so a malformed stream can still be described
//! in the log after the fact.

use std::io::{self, Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use flate2::read::DeflateDecoder;
use tracing::{debug, error, warn};

use crate::arcserve::framer::FramerOptions;
use crate::arcserve::{MAX_CHUNK_ALLOCATION, PacketError};
use crate::archive::TapeArchive;
use crate::utils::io::{read_vec, skip};
use crate::utils::text::utf16_fixed;

use super::{FileHeader, join_backup_path};

pub const ID_END_OF_STREAM: u32 = 0x0000_0000;
pub const ID_RAW_DATA: u32 = 0x0100_DAAD;
pub const ID_WINDOWS_FILENAME: u32 = 0x2110_DAAD;
pub const ID_CATALOG_DATA: u32 = 0x3010_DAAD;

pub const TYPE_DOS_PATH: u32 = 0x1800_DADA;
pub const TYPE_FULL_PATH: u32 = 0x1900_DADA;
pub const TYPE_FILE: u32 = 0x3000_DADA;
pub const TYPE_DIRECTORY: u32 = 0x3100_DADA;

/// Flag bit 6: the chunk body is a DEFLATE stream prefixed with its
/// uncompressed size.
pub const FLAG_COMPRESSED: u32 = 1 << 6;

/// Longest chunk name honoured before the header is written off as
/// corruption.
const MAX_NAME: u32 = 4096;

/// Fixed layout inside a Windows-filename (or DOS-path) chunk body.
const WINDOWS_NAME_RESERVED: usize = 44;
const WINDOWS_NAME_BYTES: usize = 520;
const WINDOWS_DOS_NAME_BYTES: usize = 28;

#[derive(Debug, Clone)]
pub struct ChunkHeader {
    pub id: u32,
    pub filesystem: u32,
    pub size: u64,
    pub chunk_type: u32,
    pub flags: u32,
    pub name: String,
}

/// The closed set of chunk kinds. Everything else is consumed verbatim as
/// [`ChunkKind::Unsupported`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    EndOfStream,
    RawData,
    CatalogData,
    WindowsFileName,
    DosPath,
    FullPath,
    Unsupported,
}

impl ChunkHeader {
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, PacketError> {
        let id = reader.read_u32::<BigEndian>()?;
        let filesystem = reader.read_u32::<LittleEndian>()?;
        let size = reader.read_u64::<LittleEndian>()?;
        let name_size = reader.read_u32::<LittleEndian>()?;
        let chunk_type = reader.read_u32::<BigEndian>()?;
        let flags = reader.read_u32::<LittleEndian>()?;
        let _reserved = reader.read_u16::<LittleEndian>()?;
        if name_size > MAX_NAME {
            return Err(PacketError::TooLarge {
                what: "stream chunk name",
                size: u64::from(name_size),
            });
        }
        let name = if name_size > 0 {
            let bytes = read_vec(reader, name_size as usize - 1)?;
            skip(reader, 1)?; // terminating NUL
            bytes.iter().map(|&b| char::from(b)).collect()
        } else {
            String::new()
        };
        Ok(Self {
            id,
            filesystem,
            size,
            chunk_type,
            flags,
            name,
        })
    }

    pub fn kind(&self) -> ChunkKind {
        match self.id {
            ID_END_OF_STREAM => ChunkKind::EndOfStream,
            ID_RAW_DATA => ChunkKind::RawData,
            ID_CATALOG_DATA => ChunkKind::CatalogData,
            ID_WINDOWS_FILENAME => ChunkKind::WindowsFileName,
            _ => match self.chunk_type {
                TYPE_DOS_PATH => ChunkKind::DosPath,
                TYPE_FULL_PATH => ChunkKind::FullPath,
                _ => ChunkKind::Unsupported,
            },
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }

    pub fn describe(&self) -> String {
        format!(
            "chunk id={:#010x} type={:#010x} size={} flags={:#x} name={:?}",
            self.id, self.chunk_type, self.size, self.flags, self.name
        )
    }
}

/// Round the cursor up to the next position congruent 3 modulo 4.
fn align_chunk<S: Seek>(stream: &mut S) -> io::Result<()> {
    let pos = stream.stream_position()?;
    let delta = (3 + 4 - (pos % 4)) % 4;
    if delta > 0 {
        stream.seek(SeekFrom::Current(delta as i64))?;
    }
    Ok(())
}

/// Metadata gathered while walking the chunk stream.
#[derive(Default)]
struct UniversalState {
    directory: bool,
    file_marker_seen: bool,
    override_path: Option<String>,
    /// Summaries of every non-data chunk, kept for the log should the
    /// stream turn out malformed.
    cached: Vec<String>,
    entry_open: bool,
}

/// Extract a universal file header's chunked body into the archive.
pub fn process_universal<R: Read + Seek, W: Write + Seek>(
    header: &FileHeader,
    stream: &mut R,
    archive: &mut TapeArchive<W>,
    options: &FramerOptions,
) -> Result<(), PacketError> {
    let mut state = UniversalState {
        directory: header.is_directory(),
        ..Default::default()
    };
    let outcome = walk_chunks(header, stream, archive, &mut state);

    let declared = header.declared_size();
    if state.entry_open {
        let written = archive.open_entry_written().unwrap_or(0);
        let damaged = archive.end_file(declared)?.is_damaged();
        if outcome.is_ok() && damaged && !options.fast_debug {
            error!(
                path = %header.relative_path(),
                declared,
                written,
                "file body size does not match its header"
            );
        }
    } else if outcome.is_ok() {
        // A chunk stream with no data chunks is a directory, or an empty
        // file.
        let relative = state.override_path.as_deref().unwrap_or(header.relative_path());
        let full_path = join_backup_path(archive.current_base_path.as_deref(), relative);
        if state.directory && !state.file_marker_seen {
            archive.add_directory(&full_path, header.modified())?;
        } else {
            archive.start_file(&full_path, header.modified())?;
            let damaged = archive.end_file(declared)?.is_damaged();
            if damaged && !options.fast_debug {
                error!(path = %full_path, declared, "file had no data chunks");
            }
        }
    }

    if let Err(err) = &outcome {
        warn!(%err, path = %header.relative_path(), "universal chunk stream is malformed");
        for line in &state.cached {
            warn!("  metadata recovered before the failure: {line}");
        }
    }
    outcome
}

fn walk_chunks<R: Read + Seek, W: Write + Seek>(
    header: &FileHeader,
    stream: &mut R,
    archive: &mut TapeArchive<W>,
    state: &mut UniversalState,
) -> Result<(), PacketError> {
    loop {
        let chunk = ChunkHeader::read(stream)?;
        // The entity marker rides on the outer type field of whichever
        // chunk carries it.
        match chunk.chunk_type {
            TYPE_DIRECTORY => state.directory = true,
            TYPE_FILE => state.file_marker_seen = true,
            _ => {}
        }
        match chunk.kind() {
            ChunkKind::EndOfStream => {
                align_chunk(stream)?;
                return Ok(());
            }
            ChunkKind::WindowsFileName | ChunkKind::DosPath => {
                let body = read_metadata_body(stream, &chunk)?;
                if body.len() >= WINDOWS_NAME_RESERVED + WINDOWS_NAME_BYTES {
                    let name = utf16_fixed(
                        &body[WINDOWS_NAME_RESERVED..WINDOWS_NAME_RESERVED + WINDOWS_NAME_BYTES],
                    );
                    state.cached.push(format!("{} -> {:?}", chunk.describe(), name));
                } else {
                    state.cached.push(chunk.describe());
                }
                if body.len()
                    >= WINDOWS_NAME_RESERVED + WINDOWS_NAME_BYTES + WINDOWS_DOS_NAME_BYTES
                {
                    debug!(
                        dos_name = %utf16_fixed(
                            &body[WINDOWS_NAME_RESERVED + WINDOWS_NAME_BYTES..]
                                [..WINDOWS_DOS_NAME_BYTES]
                        ),
                        "chunk carries a DOS 8.3 name"
                    );
                }
            }
            ChunkKind::FullPath => {
                let body = read_metadata_body(stream, &chunk)?;
                let path = utf16_fixed(&body);
                state.cached.push(format!("{} -> {:?}", chunk.describe(), path));
                if !path.is_empty() {
                    // The long path wins over the truncated one in the
                    // shared prefix.
                    state.override_path = Some(path);
                }
            }
            ChunkKind::RawData | ChunkKind::CatalogData => {
                if !state.entry_open {
                    let relative = state
                        .override_path
                        .as_deref()
                        .unwrap_or(header.relative_path());
                    let full_path =
                        join_backup_path(archive.current_base_path.as_deref(), relative);
                    archive.start_file(&full_path, header.modified())?;
                    state.entry_open = true;
                }
                write_data_chunk(stream, archive, &chunk)?;
            }
            ChunkKind::Unsupported => {
                debug!(chunk = %chunk.describe(), "unsupported chunk kind; body skipped");
                state.cached.push(chunk.describe());
                skip(stream, chunk.size)?;
            }
        }
        align_chunk(stream)?;
    }
}

fn read_metadata_body<R: Read>(reader: &mut R, chunk: &ChunkHeader) -> Result<Vec<u8>, PacketError> {
    if chunk.size > MAX_CHUNK_ALLOCATION {
        return Err(PacketError::TooLarge {
            what: "stream chunk body",
            size: chunk.size,
        });
    }
    Ok(read_vec(reader, chunk.size as usize)?)
}

/// Copy one data chunk's usable bytes into the open archive entry,
/// inflating if the chunk is compressed.
fn write_data_chunk<R: Read, W: Write + Seek>(
    stream: &mut R,
    archive: &mut TapeArchive<W>,
    chunk: &ChunkHeader,
) -> Result<(), PacketError> {
    if !chunk.is_compressed() {
        return super::copy_file_body(stream, archive, chunk.size);
    }
    if chunk.size < 4 {
        return Err(PacketError::Malformed(format!(
            "compressed chunk of {} bytes cannot hold its size prefix",
            chunk.size
        )));
    }
    let expected = u64::from(stream.read_u32::<LittleEndian>()?);
    let mut compressed = stream.take(chunk.size - 4);
    let written = {
        let mut decoder = DeflateDecoder::new(&mut compressed);
        io::copy(&mut decoder, archive)?
    };
    // The encoder may have padded past the end-of-stream marker; the
    // leftovers still belong to this chunk.
    io::copy(&mut compressed, &mut io::sink())?;
    if written != expected {
        warn!(
            expected,
            written,
            chunk = %chunk.describe(),
            "inflated size differs from the declared uncompressed size"
        );
    }
    Ok(())
}
