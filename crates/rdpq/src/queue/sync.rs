//! Auto-synchronization engine.
//!
//! The RDP pipelines aggressively: a drawing command may still be reading a
//! tile descriptor or TMEM while the CPU is already queueing a command that
//! rewrites them. The hardware offers no interlock beyond the explicit
//! `SYNC_PIPE` / `SYNC_TILE` / `SYNC_LOAD` barriers, so the queue tracks
//! which resources each command leaves in flight and injects the minimal
//! barrier set right before a conflicting reconfiguration.
//!
//! Commands *use* resources (draws read tiles, pipe state, TMEM) and
//! *change* them (mode and tile setup commands). A change that intersects
//! the dirty set emits the matching sync commands and clears those bits.

use bitflags::bitflags;
use rdp_commands::ops::Opcode;
use rdpq_hal::{CommandArena, CpTransport};

use super::{RdpQueue, RdpqError};

bitflags! {
    /// Configuration flags: each enables one class of automatic
    /// synchronization. All are on by default; turning one off makes the
    /// programmer responsible for that barrier class.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Config: u32 {
        const AUTOSYNC_PIPE = 1 << 0;
        const AUTOSYNC_LOAD = 1 << 1;
        const AUTOSYNC_TILE = 1 << 2;
    }
}

bitflags! {
    /// The dirty-resource mask: one bit per tile descriptor, one per TMEM
    /// half, and one for the pipeline-wide state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SyncResources: u32 {
        /// All eight tile descriptor bits.
        const TILES = 0x00FF;
        /// Lower 2048 bytes of TMEM.
        const TMEM_LOW = 1 << 8;
        /// Upper 2048 bytes of TMEM (palettes, 32-bit/YUV upper halves).
        const TMEM_HIGH = 1 << 9;
        /// Both TMEM halves.
        const TMEMS = 0x0300;
        /// Pipeline-wide state: modes, colors, images.
        const PIPE = 1 << 10;
    }
}

impl SyncResources {
    /// The bit for one tile descriptor.
    #[must_use]
    pub fn tile(n: u8) -> Self {
        Self::from_bits_retain(1 << (n & 7))
    }
}

impl<T: CpTransport + CommandArena> RdpQueue<T> {
    /// Record that the command being emitted reads or writes `res`.
    pub(crate) fn autosync_use(&mut self, res: SyncResources) {
        self.autosync |= res;
    }

    /// The command being emitted is about to modify `res`: emit barriers for
    /// whatever part of it is still in flight.
    pub(crate) fn autosync_change(
        &mut self,
        res: SyncResources,
    ) -> Result<(), RdpqError<T::Error>> {
        let hit = res & self.autosync;
        if hit.is_empty() {
            return Ok(());
        }
        if hit.intersects(SyncResources::TILES) && self.config.contains(Config::AUTOSYNC_TILE) {
            self.sync_tile()?;
        }
        if hit.intersects(SyncResources::TMEMS) && self.config.contains(Config::AUTOSYNC_LOAD) {
            self.sync_load()?;
        }
        if hit.contains(SyncResources::PIPE) && self.config.contains(Config::AUTOSYNC_PIPE) {
            self.sync_pipe()?;
        }
        Ok(())
    }

    /// Wait for the pipeline to drain before the next command. Clears the
    /// pipe dirty bit.
    pub fn sync_pipe(&mut self) -> Result<(), RdpqError<T::Error>> {
        self.write(&[Opcode::SyncPipe.word_hi(0), 0])?;
        self.autosync.remove(SyncResources::PIPE);
        Ok(())
    }

    /// Wait for tile descriptor reads to finish. Clears all tile dirty bits.
    pub fn sync_tile(&mut self) -> Result<(), RdpqError<T::Error>> {
        self.write(&[Opcode::SyncTile.word_hi(0), 0])?;
        self.autosync.remove(SyncResources::TILES);
        Ok(())
    }

    /// Wait for texture loads to land in TMEM. Clears both TMEM dirty bits.
    pub fn sync_load(&mut self) -> Result<(), RdpqError<T::Error>> {
        self.write(&[Opcode::SyncLoad.word_hi(0), 0])?;
        self.autosync.remove(SyncResources::TMEMS);
        Ok(())
    }
}
