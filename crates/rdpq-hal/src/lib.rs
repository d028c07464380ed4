#![no_std]

//! Platform abstraction for the RDP command queue.
//!
//! The queue library never touches hardware directly: everything flows
//! through the command processor (CP), the upstream coprocessor that owns the
//! dynamic command stream and DMAs prebuilt command ranges to the RDP. These
//! traits capture exactly the primitives the queue consumes, so the library
//! stays platform-agnostic and fully testable against a mock.

/// CPU-assisted command forms.
///
/// Some commands cannot be emitted verbatim: their final bits depend on state
/// only known at dispatch time (current cycle type, framebuffer bit depth).
/// The CP carries a small routine per such command that derives the final
/// words. `args` semantics per op:
///
/// - `Scissor`, `FillColor`, `TexImage`, `ZImage`, `ColorImage`,
///   `TextureRectangle`, `SyncFull`: the unfixed RDP command words, opcode
///   included.
/// - `OtherModes`: the raw SET_OTHER_MODES words.
/// - `ModifyOtherModes`: `[byte_offset, and_mask, or_value]` applied to the
///   stored SET_OTHER_MODES word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixupOp {
    Scissor,
    FillColor,
    TexImage,
    ZImage,
    ColorImage,
    OtherModes,
    ModifyOtherModes,
    TextureRectangle,
    SyncFull,
}

/// One entry for the CP's dynamic stream.
#[derive(Debug, Clone, Copy)]
pub enum CpCommand<'a> {
    /// Pass-through RDP command words, forwarded to the RDP verbatim.
    Rdp { words: &'a [u32] },
    /// CPU-assisted command; the CP derives the final words and forwards
    /// them through its dynamic stream.
    Fixup { op: FixupOp, args: &'a [u32] },
    /// Same derivation, but the output is written into reserved space at the
    /// end of the current static command range instead of the dynamic
    /// stream. Used while a block is being recorded.
    FixupToBlock { op: FixupOp, args: &'a [u32] },
}

/// Handle for a previously issued `submit_rdp`, used to grow its range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitToken(pub u32);

/// Handle for a buffer allocated from the command arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferId(pub u32);

/// Snapshot of the CP-managed shared state block.
///
/// The CP keeps a small uncached memory area the queue may inspect: the copy
/// of the last executed SYNC_FULL (carrying the callback slot and argument),
/// the address translation table, and the mode state the fixup routines work
/// from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpShadowState {
    pub last_sync_full: u64,
    pub address_table: [u32; 16],
    pub other_modes: u64,
    pub scissor_rect: u64,
    pub fill_color: u32,
    pub self_phys_addr: u32,
    pub target_bitdepth: u8,
}

impl Default for CpShadowState {
    fn default() -> Self {
        Self {
            last_sync_full: 0,
            address_table: [0; 16],
            other_modes: 0,
            scissor_rect: 0,
            fill_color: 0,
            self_phys_addr: 0,
            target_bitdepth: 0,
        }
    }
}

/// Dispatch-time assertion raised by the CP while translating a command.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpAssert {
    /// TEXTURE_RECTANGLE_FLIP dispatched while the pipeline is in copy mode.
    FlipCopy = 0x0001,
    /// A triangle dispatched while the pipeline is in copy or fill mode.
    TriFill = 0x0002,
}

impl CpAssert {
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            0x0001 => Some(Self::FlipCopy),
            0x0002 => Some(Self::TriFill),
            _ => None,
        }
    }

    /// Human-readable cause, for the assert handler.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::FlipCopy => "TextureRectangleFlip cannot be used in copy mode",
            Self::TriFill => "Triangles cannot be used in copy or fill mode",
        }
    }
}

/// The command processor seen from the queue.
///
/// Ordering contract: commands pushed with `queue_push` and ranges handed to
/// `submit_rdp` reach the RDP in call order. While a block is being recorded
/// (`block_begin`..`block_end`) the same calls are captured instead of
/// executed; `block_run` replays a capture in order.
pub trait CpTransport {
    type Error: core::fmt::Debug;
    /// A recorded CP program, owned by the caller after `block_end`.
    type Block;

    /// Append one command to the dynamic stream.
    fn queue_push(&mut self, cmd: CpCommand<'_>) -> Result<(), Self::Error>;

    /// Ask the CP to DMA the physical byte range `[start, end)` of prebuilt
    /// RDP commands. Both ends MUST be 8-byte aligned. `start == end` is a
    /// valid empty range that still repositions the CP's stream pointers
    /// (fixup output lands at the stream end).
    fn submit_rdp(&mut self, start: u32, end: u32) -> Result<SubmitToken, Self::Error>;

    /// Try to grow the end pointer of an earlier submit. Returns false if the
    /// submit is no longer the newest stream entry, in which case the caller
    /// must issue a fresh `submit_rdp`.
    fn extend_rdp_submit(&mut self, token: SubmitToken, new_end: u32)
        -> Result<bool, Self::Error>;

    /// Block until the RDP reports idle.
    fn wait_rdp_idle(&mut self) -> Result<(), Self::Error>;

    /// Start capturing the dynamic stream into a block.
    fn block_begin(&mut self);

    /// Finish capturing and hand the recorded program to the caller.
    fn block_end(&mut self) -> Self::Block;

    /// Replay a recorded program.
    fn block_run(&mut self, block: &Self::Block) -> Result<(), Self::Error>;

    /// Read the CP-managed shared state block.
    fn shadow_state(&self) -> CpShadowState;

    /// Acknowledge the SYNC_FULL completion status. MUST be called before the
    /// user callback runs so further SYNC_FULLs can be scheduled meanwhile.
    fn clear_sync_full(&mut self);
}

/// Uncached, DMA-safe memory for recorded command buffers.
///
/// Buffers hold 32-bit command words; their physical base address is 8-byte
/// aligned. Allocation failure is fatal on the platform side (there is no
/// recovery path once a recording is underway), so the interface is
/// infallible by contract.
pub trait CommandArena {
    /// Allocate a zeroed buffer of `words` 32-bit words.
    fn alloc(&mut self, words: usize) -> BufferId;

    /// Copy `words` into the buffer starting at word `offset`.
    /// Writing past the allocated length is a caller bug and may panic.
    fn write(&mut self, buf: BufferId, offset: usize, words: &[u32]);

    /// Physical address of word `offset` of the buffer.
    fn phys_addr(&self, buf: BufferId, offset: usize) -> u32;

    /// Return a buffer to the arena. The id must not be used afterwards.
    fn free(&mut self, buf: BufferId);
}
