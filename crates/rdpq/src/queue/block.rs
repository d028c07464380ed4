//! Recorded command blocks.
//!
//! A block captures a command sequence into a chain of uncached buffers so it
//! can be replayed later at CP speed with no CPU re-encoding. Buffers start
//! small and double on every overflow: short blocks stay cheap, long blocks
//! amortize allocation.
//!
//! Writer invariant: after every append either the current buffer still has
//! room for one maximum-size command, or a fresh buffer has already been
//! chained in. The overflow check therefore runs against `len - 44` words,
//! never against the true end.

use alloc::vec::Vec;

use rdpq_hal::{BufferId, CommandArena, CpTransport, SubmitToken};

use super::{PendingSubmit, RdpQueue, RdpqError, SyncResources, MAX_COMMAND_WORDS};

/// First buffer size in 32-bit words.
pub(crate) const BLOCK_MIN_WORDS: usize = 64;
/// Growth cap in 32-bit words.
pub(crate) const BLOCK_MAX_WORDS: usize = 4192;

/// One buffer of a block's chain.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BufferSeg {
    pub(crate) id: BufferId,
}

/// Append cursor into the newest buffer of the chain.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ActiveBuffer {
    pub(crate) id: BufferId,
    pub(crate) phys: u32,
    pub(crate) tail: usize,
    pub(crate) limit: usize,
}

/// Recording state, alive between `block_begin` and `block_end`.
#[derive(Debug)]
pub(crate) struct BlockRecorder {
    pub(crate) segs: Vec<BufferSeg>,
    pub(crate) cur: Option<ActiveBuffer>,
    pub(crate) next_size: usize,
}

/// A finished, replayable block.
///
/// Owns its buffer chain and the CP-side recorded program, plus the
/// dirty-resource mask observed when recording ended: replaying the block
/// leaves the hardware in exactly the state that mask describes, so the
/// auto-sync engine reloads it on every run.
pub struct Block<B> {
    pub(crate) segs: Vec<BufferSeg>,
    pub(crate) autosync: SyncResources,
    pub(crate) cp_block: B,
}

impl<T: CpTransport + CommandArena> RdpQueue<T> {
    /// Start recording a block. Subsequent writes are captured instead of
    /// executed, until [`block_end`](Self::block_end).
    pub fn block_begin(&mut self) -> Result<(), RdpqError<T::Error>> {
        if self.rec.is_some() {
            return Err(RdpqError::RecordingActive);
        }
        self.cp.block_begin();
        // A block can be replayed in any context, so while recording assume
        // every resource is dirty; that generates all the SYNCs the most
        // hostile replay environment would need.
        self.autosync_saved = self.autosync;
        self.autosync = SyncResources::all();
        self.last_submit = None;
        self.rec = Some(BlockRecorder {
            segs: Vec::new(),
            cur: None,
            next_size: BLOCK_MIN_WORDS,
        });
        log::debug!("rdpq: block recording started");
        Ok(())
    }

    /// Finish recording and return the owning block handle. The caller's
    /// pre-recording dirty mask is restored.
    pub fn block_end(&mut self) -> Result<Block<T::Block>, RdpqError<T::Error>> {
        let rec = self.rec.take().ok_or(RdpqError::NotRecording)?;
        let cp_block = self.cp.block_end();
        let mask = self.autosync;
        self.autosync = self.autosync_saved;
        self.last_submit = None;
        log::debug!("rdpq: block recording ended ({} buffers)", rec.segs.len());
        Ok(Block {
            segs: rec.segs,
            autosync: mask,
            cp_block,
        })
    }

    /// Replay a recorded block. The auto-sync engine adopts the dirty mask
    /// the block recorded at its end.
    pub fn block_run(&mut self, block: &Block<T::Block>) -> Result<(), RdpqError<T::Error>> {
        if self.rec.is_some() {
            return Err(RdpqError::RecordingActive);
        }
        self.cp.block_run(&block.cp_block)?;
        self.autosync = block.autosync;
        Ok(())
    }

    /// Release a block's buffers back to the arena.
    pub fn block_free(&mut self, block: Block<T::Block>) {
        for seg in &block.segs {
            self.cp.free(seg.id);
        }
    }

    // ------------------------------------------------------------------
    // Recorder internals
    // ------------------------------------------------------------------

    /// Make sure the lazily allocated first buffer exists before a static
    /// write or skip.
    pub(crate) fn block_check(&mut self) -> Result<(), RdpqError<T::Error>> {
        if matches!(&self.rec, Some(rec) if rec.cur.is_none()) {
            self.block_next_buffer()?;
        }
        Ok(())
    }

    /// Append command words to the block tail and submit (or grow the last
    /// submit over) the new byte range.
    pub(crate) fn static_write(&mut self, words: &[u32]) -> Result<(), RdpqError<T::Error>> {
        let rec = match &mut self.rec {
            Some(rec) => rec,
            None => return Ok(()),
        };
        let cur = match &mut rec.cur {
            Some(cur) => cur,
            None => return Ok(()),
        };
        self.cp.write(cur.id, cur.tail, words);
        let start = cur.phys + (cur.tail * 4) as u32;
        let end = start + (words.len() * 4) as u32;
        cur.tail += words.len();
        let overflow = cur.tail > cur.limit;
        Self::flush_submit(&mut self.cp, &mut self.last_submit, start, end)?;
        if overflow {
            self.block_next_buffer()?;
        }
        Ok(())
    }

    /// Reserve space in the block for fixup output that the CP will write at
    /// replay time.
    pub(crate) fn static_skip(&mut self, words: usize) -> Result<(), RdpqError<T::Error>> {
        let rec = match &mut self.rec {
            Some(rec) => rec,
            None => return Ok(()),
        };
        let cur = match &mut rec.cur {
            Some(cur) => cur,
            None => return Ok(()),
        };
        cur.tail += words;
        if cur.tail > cur.limit {
            self.block_next_buffer()?;
        }
        Ok(())
    }

    /// Chain in the next buffer, doubling its size up to the cap, and point
    /// the CP's stream end at it so fixup output lands in the right place.
    pub(crate) fn block_next_buffer(&mut self) -> Result<(), RdpqError<T::Error>> {
        let rec = match &mut self.rec {
            Some(rec) => rec,
            None => return Ok(()),
        };
        let size = rec.next_size;
        let id = self.cp.alloc(size);
        let phys = self.cp.phys_addr(id, 0);
        rec.segs.push(BufferSeg { id });
        rec.cur = Some(ActiveBuffer {
            id,
            phys,
            tail: 0,
            limit: size - MAX_COMMAND_WORDS,
        });
        if rec.next_size < BLOCK_MAX_WORDS {
            rec.next_size = (rec.next_size * 2).min(BLOCK_MAX_WORDS);
        }
        log::debug!("rdpq: block buffer chained ({size} words)");
        // Zero-length flush: repositions the CP stream end at the new buffer
        // so static fixup commands keep writing at the right offset.
        Self::flush_submit(&mut self.cp, &mut self.last_submit, phys, phys)
    }

    /// Hand `[start, end)` to the CP, growing the previous submit in place
    /// when the new range simply extends it.
    pub(crate) fn flush_submit(
        cp: &mut T,
        last: &mut Option<PendingSubmit>,
        start: u32,
        end: u32,
    ) -> Result<(), RdpqError<T::Error>> {
        if start & 7 != 0 || end & 7 != 0 {
            return Err(RdpqError::UnalignedSubmit { start, end });
        }
        if let Some(pending) = last {
            if pending.end == start && cp.extend_rdp_submit(pending.token, end)? {
                pending.end = end;
                return Ok(());
            }
        }
        let token: SubmitToken = cp.submit_rdp(start, end)?;
        *last = Some(PendingSubmit { token, end });
        Ok(())
    }
}
