// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Interwoven tape stream.
//!
//! ARCserve laid blocks out in serpentine logical order, and a salvage run
//! may have produced several dump files covering different stretches of the
//! tape. [`TapeStream`] presents the recovered payloads as one read-only,
//! seekable byte stream in logical order: block `i` of the ordered list
//! occupies stream offsets `[i * 32768, (i + 1) * 32768)`.
//!
//! The stream holds exactly one block's payload in memory. Sequential reads
//! refill the buffer from the owning dump file as block boundaries are
//! crossed; a seek only marks the buffer stale, so seeking is cheap until
//! the next read.
//!
//! Missing blocks are not padded: the ordered list simply jumps over them,
//! and the consumer polls [`TapeStream::gap_since_last_check`] to learn
//! whether the bytes it just read straddled a hole in the tape.

use std::io::{self, Read, Seek, SeekFrom};

use tracing::trace;

use crate::dump::BlockLocator;
use crate::tape::PAYLOAD_SIZE;

/// One entry of the ordered block list: where a logical block's payload
/// lives on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderedBlock {
    /// Logical index on the tape.
    pub logical: u32,
    /// Owning dump file and byte offset.
    pub locator: BlockLocator,
}

/// Result of a gap poll: the ordered list jumped over missing blocks
/// somewhere in the stretch read since the previous poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapReport {
    /// Logical blocks with no recovered payload in the traversed stretch.
    pub blocks_skipped: u32,
    /// Last logical block seen before the first jump.
    pub last_valid_block: u32,
}

/// A read-only byte stream over the ordered block list. `SourceT` is one
/// seekable reader per dump file, indexed by [`BlockLocator::dump_index`].
pub struct TapeStream<SourceT> {
    blocks: Vec<OrderedBlock>,
    sources: Vec<SourceT>,
    buf: Box<[u8]>,
    /// Index into `blocks` of the payload currently buffered.
    buffered: Option<usize>,
    pos: u64,
    /// Block index at the last gap poll.
    gap_checkpoint: usize,
}

impl<SourceT: Read + Seek> TapeStream<SourceT> {
    /// `blocks` must be strictly increasing in logical index, and every
    /// `dump_index` must name an entry of `sources`.
    pub fn new(blocks: Vec<OrderedBlock>, sources: Vec<SourceT>) -> Self {
        debug_assert!(blocks.windows(2).all(|w| w[0].logical < w[1].logical));
        debug_assert!(
            blocks
                .iter()
                .all(|b| (b.locator.dump_index as usize) < sources.len())
        );
        Self {
            blocks,
            sources,
            buf: vec![0; PAYLOAD_SIZE].into_boxed_slice(),
            buffered: None,
            pos: 0,
            gap_checkpoint: 0,
        }
    }

    /// Total stream length in bytes.
    pub fn len(&self) -> u64 {
        self.blocks.len() as u64 * PAYLOAD_SIZE as u64
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Blocks in the ordered list.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Current absolute position.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// The block currently buffered, if a read has loaded one yet.
    pub fn current_block(&self) -> Option<&OrderedBlock> {
        self.buffered.map(|i| &self.blocks[i])
    }

    /// Index of the block the cursor sits in (saturating at the last block
    /// when the cursor is at end of stream).
    fn cursor_block(&self) -> usize {
        let idx = (self.pos / PAYLOAD_SIZE as u64) as usize;
        idx.min(self.blocks.len().saturating_sub(1))
    }

    /// Report any jump in logical numbering traversed since the previous
    /// call (or since the start of the stream for the first call).
    pub fn gap_since_last_check(&mut self) -> Option<GapReport> {
        if self.blocks.is_empty() {
            return None;
        }
        let current = self.cursor_block();
        let from = self.gap_checkpoint;
        self.gap_checkpoint = current;
        if current <= from {
            // Backward seeks retraverse nothing.
            return None;
        }
        let mut skipped = 0u32;
        let mut last_valid = None;
        for w in self.blocks[from..=current].windows(2) {
            let jump = w[1].logical - w[0].logical - 1;
            if jump > 0 {
                skipped += jump;
                last_valid.get_or_insert(w[0].logical);
            }
        }
        last_valid.map(|last_valid_block| GapReport {
            blocks_skipped: skipped,
            last_valid_block,
        })
    }

    fn load_block(&mut self, idx: usize) -> io::Result<()> {
        let block = self.blocks[idx];
        let source = self
            .sources
            .get_mut(block.locator.dump_index as usize)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("block locator names dump {}", block.locator.dump_index),
                )
            })?;
        source.seek(SeekFrom::Start(block.locator.payload_offset))?;
        source.read_exact(&mut self.buf)?;
        trace!(
            logical = block.logical,
            dump = block.locator.dump_index,
            offset = block.locator.payload_offset,
            "buffered tape block"
        );
        self.buffered = Some(idx);
        Ok(())
    }
}

impl<SourceT: Read + Seek> Read for TapeStream<SourceT> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() || self.pos >= self.len() {
            return Ok(0);
        }
        let idx = (self.pos / PAYLOAD_SIZE as u64) as usize;
        let off = (self.pos % PAYLOAD_SIZE as u64) as usize;
        if self.buffered != Some(idx) {
            self.load_block(idx)?;
        }
        let n = out.len().min(PAYLOAD_SIZE - off);
        out[..n].copy_from_slice(&self.buf[off..off + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl<SourceT: Read + Seek> Seek for TapeStream<SourceT> {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        let next = match target {
            SeekFrom::Start(offset) => offset,
            SeekFrom::Current(delta) => self.pos.saturating_add_signed(delta),
            SeekFrom::End(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "tape streams do not support seeking from the end",
                ));
            }
        };
        // Clamp rather than fail: a resync that overshoots the tape simply
        // lands at end-of-stream.
        self.pos = next.min(self.len());
        Ok(self.pos)
    }
}
