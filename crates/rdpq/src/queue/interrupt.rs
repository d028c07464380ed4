//! SYNC_FULL and the interrupt bridge.
//!
//! `SYNC_FULL` is the end-of-frame barrier: the RDP raises an interrupt once
//! everything before it has retired. A callback can ride along: it is
//! registered in a small table and its 1-based slot index travels in the top
//! 24 bits of the command's first word, with a free-form u32 argument in the
//! second word. Slot 0 means "no callback". The hardware copies the executed
//! command into the CP's shared state area, which is where the interrupt
//! handler reads it back.
//!
//! Slots are never recycled: a recorded block replays its SYNC_FULL with the
//! same slot index, so the callback must stay valid for the queue's
//! lifetime.

use alloc::boxed::Box;

use rdp_commands::ops::Opcode;
use rdpq_hal::{CommandArena, CpCommand, CpTransport, FixupOp};

use super::{RdpQueue, RdpqError, SyncResources};

/// Callback invoked from the SYNC_FULL interrupt with the argument carried
/// in the command.
pub type SyncCallback = Box<dyn FnMut(u32)>;

const CALLBACK_SLOTS: usize = 16;

/// Registered SYNC_FULL callbacks, addressed by the 1-based index embedded
/// in the command word.
pub(crate) struct CallbackTable {
    slots: heapless::Vec<SyncCallback, CALLBACK_SLOTS>,
}

impl CallbackTable {
    pub(crate) fn new() -> Self {
        Self {
            slots: heapless::Vec::new(),
        }
    }

    /// Store a callback; returns its 1-based slot index, or `None` when the
    /// table is full.
    pub(crate) fn register(&mut self, cb: SyncCallback) -> Option<usize> {
        self.slots.push(cb).ok()?;
        Some(self.slots.len())
    }

    pub(crate) fn dispatch(&mut self, slot: usize, arg: u32) {
        if let Some(cb) = slot.checked_sub(1).and_then(|i| self.slots.get_mut(i)) {
            cb(arg);
        }
    }
}

impl<T: CpTransport + CommandArena> RdpQueue<T> {
    /// Emit the end-of-frame barrier, optionally with a callback to invoke
    /// from the completion interrupt.
    ///
    /// The CP must see the callback slot even when the command itself lives
    /// in a block, so in block mode the command is recorded both statically
    /// (the RDP words) and dynamically (the CP-side bookkeeping).
    pub fn sync_full(
        &mut self,
        callback: Option<(SyncCallback, u32)>,
    ) -> Result<(), RdpqError<T::Error>> {
        let (slot, arg) = match callback {
            Some((cb, arg)) => {
                let slot = self
                    .callbacks
                    .register(cb)
                    .ok_or(RdpqError::CallbackTableFull)?;
                (slot as u32, arg)
            }
            None => (0, 0),
        };
        let words = [Opcode::SyncFull.word_hi(slot), arg];
        if self.rec.is_some() {
            self.block_check()?;
            self.cp.queue_push(CpCommand::FixupToBlock {
                op: FixupOp::SyncFull,
                args: &words,
            })?;
            self.static_write(&words)?;
        } else {
            self.cp.queue_push(CpCommand::Fixup {
                op: FixupOp::SyncFull,
                args: &words,
            })?;
        }
        // The RDP is fully idle once this retires; nothing stays in flight.
        self.autosync = SyncResources::empty();
        Ok(())
    }

    /// Emit SYNC_FULL and block until the RDP reports idle.
    pub fn fence(&mut self) -> Result<(), RdpqError<T::Error>> {
        self.sync_full(None)?;
        self.cp.wait_rdp_idle()?;
        Ok(())
    }

    /// Service a SYNC_FULL completion interrupt.
    ///
    /// Reads the shadow copy of the executed command, acknowledges the
    /// status *before* dispatching so further SYNC_FULLs can be scheduled
    /// while the callback runs, then invokes the callback if one was
    /// attached. Must not be re-entered; must not be called from writer code.
    pub fn handle_sync_full_interrupt(&mut self) {
        let state = self.cp.shadow_state();
        let slot = ((state.last_sync_full >> 32) & 0x00FF_FFFF) as u32;
        let arg = state.last_sync_full as u32;
        self.cp.clear_sync_full();
        if slot != 0 {
            self.callbacks.dispatch(slot as usize, arg);
        }
    }
}
