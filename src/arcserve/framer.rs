// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Packet framer.
//!
//! Walks the logical tape stream sector by sector, dispatching on the
//! 32-bit signature found at each 512-byte boundary. The framer is the
//! recovery boundary: nothing a packet does wrong propagates past it.
//!
//! * An unknown signature costs one sector and is counted as a _miss_;
//!   consecutive misses are reported as a single skipped range.
//! * A recognised packet whose body fails to read (or fails its syntactic
//!   sanity check) is logged and counted as a miss too; the cursor simply
//!   realigns to the next sector past wherever the read died.
//! * All-zero sectors are filler between sessions, skipped silently.
//!
//! After every packet the framer polls the stream for traversed block gaps
//! so damage lands in the log next to the packet it bit into.

use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, ReadBytesExt};
use tracing::{debug, error, info, trace, warn};

use crate::arcserve::file::{FileDialect, FileHeader};
use crate::arcserve::session::SessionHeader;
use crate::arcserve::terminator::SessionTerminator;
use crate::arcserve::trailer::FileTrailer;
use crate::arcserve::{PacketError, ROOT_SECTOR, signatures};
use crate::archive::TapeArchive;
use crate::tape::TapeStream;
use crate::utils::io::read_vec;

/// Per-run knobs threaded down from the tape definition and CLI.
#[derive(Debug, Default, Clone, Copy)]
pub struct FramerOptions {
    /// Some writer versions pad every Windows file header with an extra
    /// zeroed 512-byte section; the tape definition says whether this tape
    /// is one of them.
    pub skip_extra_section_per_file: bool,
    /// Suppress size-mismatch errors for quick inspection runs.
    pub fast_debug: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FramerStats {
    pub packets: u64,
    pub sessions: u64,
    pub files: u64,
    pub trailers: u64,
    pub terminators: u64,
    pub empty_sectors: u64,
    pub missed_sectors: u64,
    pub miss_runs: u64,
    pub parse_failures: u64,
    pub gap_events: u64,
}

struct MissRun {
    start_offset: u64,
    sectors: u64,
}

/// Running totals for the session currently being extracted, logged when
/// the session closes.
struct SessionAccounting {
    root: String,
    start_offset: u64,
    files: u64,
    directories: u64,
    bytes: u64,
}

/// See the [module documentation](self).
pub struct PacketFramer<'a, S, W: Write + Seek> {
    stream: &'a mut TapeStream<S>,
    archive: &'a mut TapeArchive<W>,
    options: FramerOptions,
    stats: FramerStats,
    miss_run: Option<MissRun>,
    session: Option<SessionAccounting>,
}

impl<'a, S: Read + Seek, W: Write + Seek> PacketFramer<'a, S, W> {
    pub fn new(
        stream: &'a mut TapeStream<S>,
        archive: &'a mut TapeArchive<W>,
        options: FramerOptions,
    ) -> Self {
        Self {
            stream,
            archive,
            options,
            stats: FramerStats::default(),
            miss_run: None,
            session: None,
        }
    }

    /// Consume the stream to its end. Never fails: I/O errors against the
    /// dump files end the run early with whatever was recovered.
    pub fn run(mut self) -> FramerStats {
        loop {
            let sector_start = match self.align_forward() {
                Ok(pos) => pos,
                Err(err) => {
                    error!(%err, "could not realign to the next root sector; ending run");
                    break;
                }
            };
            if self.stream.len().saturating_sub(sector_start) < 4 {
                break;
            }
            let signature = match self.stream.read_u32::<BigEndian>() {
                Ok(signature) => signature,
                Err(err) => {
                    error!(%err, offset = sector_start, "could not read a packet signature; ending run");
                    break;
                }
            };

            if signature == signatures::EMPTY_SECTOR {
                self.flush_miss_run();
                if let Err(err) = self.consume_empty_sector(sector_start) {
                    error!(%err, "dump became unreadable inside an empty sector; ending run");
                    break;
                }
                self.stats.empty_sectors += 1;
            } else {
                match self.handle_packet(signature, sector_start) {
                    Ok(()) => {
                        self.flush_miss_run();
                        self.stats.packets += 1;
                    }
                    Err(err) => {
                        if !matches!(err, PacketError::UnknownSignature(_)) {
                            debug!(offset = sector_start, %err, "packet treated as a miss");
                        }
                        self.note_miss(sector_start);
                    }
                }
            }

            if let Some(gap) = self.stream.gap_since_last_check() {
                self.stats.gap_events += 1;
                error!(
                    blocks_skipped = gap.blocks_skipped,
                    last_valid_block = gap.last_valid_block,
                    "the stream jumped over tape blocks that were never recovered"
                );
            }
        }
        self.flush_miss_run();
        self.close_session(self.stream.position());
        info!(stats = ?self.stats, "packet framing finished");
        self.stats
    }

    /// Log the closing summary of the session being extracted, if any.
    fn close_session(&mut self, offset: u64) {
        if let Some(session) = self.session.take() {
            info!(
                root = %session.root,
                from_offset = session.start_offset,
                to_offset = offset,
                files = session.files,
                directories = session.directories,
                bytes = session.bytes,
                "session closed"
            );
        }
    }

    /// Charge the most recently written archive entry to the session's
    /// running totals.
    fn account_entry(&mut self) {
        let Some(session) = &mut self.session else {
            return;
        };
        if let Some(entry) = self.archive.entries().last() {
            if entry.is_dir {
                session.directories += 1;
            } else {
                session.files += 1;
                session.bytes += entry.written;
            }
        }
    }

    /// Seek forward to the next root-sector boundary (no-op when already
    /// on one).
    fn align_forward(&mut self) -> std::io::Result<u64> {
        let pos = self.stream.position();
        let misalignment = pos % ROOT_SECTOR;
        if misalignment == 0 {
            return Ok(pos);
        }
        self.stream
            .seek(SeekFrom::Start(pos + (ROOT_SECTOR - misalignment)))
    }

    fn handle_packet(&mut self, signature: u32, sector_start: u64) -> Result<(), PacketError> {
        match signature {
            signatures::SESSION_HEADER
            | signatures::SESSION_HEADER_ALT
            | signatures::SESSION_HEADER_UNKNOWN => {
                let header = SessionHeader::read_body(signature, self.stream)?;
                if !header.appears_valid() {
                    return Err(PacketError::AppearsInvalid(
                        "session header strings do not read as text",
                    ));
                }
                info!(offset = sector_start, "{}", header.describe());
                self.archive
                    .record_packet(sector_start, "session header", header.describe());
                header.process(&mut self.archive.current_base_path);
                self.close_session(sector_start);
                self.session = Some(SessionAccounting {
                    root: header.root_directory.clone(),
                    start_offset: sector_start,
                    files: 0,
                    directories: 0,
                    bytes: 0,
                });
                self.stats.sessions += 1;
                Ok(())
            }
            signatures::FILE_TRAILER => {
                let trailer = FileTrailer::read_body(self.stream)?;
                if !trailer.appears_valid() {
                    return Err(PacketError::AppearsInvalid("file trailer is not text-like"));
                }
                self.archive
                    .record_packet(sector_start, "file trailer", trailer.describe());
                trailer.process(self.archive);
                self.stats.trailers += 1;
                Ok(())
            }
            signatures::SESSION_TERMINATOR => {
                let terminator = SessionTerminator::read_body(self.stream)?;
                if !terminator.appears_valid() {
                    return Err(PacketError::AppearsInvalid(
                        "session terminator filler is not intact",
                    ));
                }
                info!(offset = sector_start, "{}", terminator.describe());
                self.archive
                    .record_packet(sector_start, "session terminator", terminator.describe());
                self.close_session(sector_start);
                self.stats.terminators += 1;
                Ok(())
            }
            _ if FileDialect::from_signature(signature).is_some() => {
                let header = FileHeader::read_body(signature, self.stream, &self.options)?;
                if !header.appears_valid() {
                    return Err(PacketError::AppearsInvalid(
                        "file header prefix does not read as a path",
                    ));
                }
                info!(offset = sector_start, "{}", header.describe());
                self.archive
                    .record_packet(sector_start, "file header", header.describe());
                match header.process(self.stream, self.archive, &self.options) {
                    Ok(()) => {
                        self.stats.files += 1;
                        self.account_entry();
                        Ok(())
                    }
                    Err(err) => {
                        // It passed the syntactic check, so print what was
                        // understood before the body died.
                        self.stats.parse_failures += 1;
                        error!(
                            offset = sector_start,
                            %err,
                            understood = %header.describe(),
                            "file packet failed mid-body"
                        );
                        Err(err)
                    }
                }
            }
            other => Err(PacketError::UnknownSignature(other)),
        }
    }

    /// An all-zero signature is inter-session filler, not a packet. Eat the
    /// rest of the sector; any set bit in it is worth an error, but never a
    /// miss.
    fn consume_empty_sector(&mut self, sector_start: u64) -> std::io::Result<()> {
        let pos = self.stream.position();
        let remaining = (ROOT_SECTOR - pos % ROOT_SECTOR) % ROOT_SECTOR;
        let want = remaining.min(self.stream.len().saturating_sub(pos)) as usize;
        let rest = read_vec(self.stream, want)?;
        let nonzero = rest.iter().filter(|&&b| b != 0).count();
        if nonzero > 0 {
            error!(
                offset = sector_start,
                nonzero, "empty sector holds stray nonzero bytes"
            );
        }
        Ok(())
    }

    fn note_miss(&mut self, sector_start: u64) {
        self.stats.missed_sectors += 1;
        let run = self.miss_run.get_or_insert(MissRun {
            start_offset: sector_start,
            sectors: 0,
        });
        run.sectors += 1;
        trace!(offset = sector_start, "miss");
    }

    fn flush_miss_run(&mut self) {
        if let Some(run) = self.miss_run.take() {
            self.stats.miss_runs += 1;
            warn!(
                "skipped {} sectors at offset {}: no recognisable packets",
                run.sectors, run.start_offset
            );
        }
    }
}
