//! The command queue: typed operations, write routing, submission glue.
//!
//! Every operation funnels into a single internal writer with two tails: in
//! dynamic mode the encoded words go straight to the CP's stream; while a
//! block is being recorded they are appended to the block's static buffers
//! and a CP-level submit covering the new bytes is emitted (or the previous
//! submit is grown in place when the ranges are contiguous).
//!
//! Commands whose final bits depend on dispatch-time state (scissor edge
//! adjustment by cycle type, fill-color conversion by framebuffer depth, …)
//! take the fixup path instead: the CP derives the final words, and in block
//! mode equivalent-sized padding is reserved in the static buffer so the
//! output lands at the right stream offset on replay.

mod block;
mod interrupt;
mod sync;

pub use block::Block;
pub use interrupt::SyncCallback;
pub use sync::{Config, SyncResources};

use rdp_commands::ops::{Opcode, TexFormat, TexSize};
use rdp_commands::{Color, CombineMode};
use rdpq_hal::{CommandArena, CpCommand, CpTransport, FixupOp};

use crate::math::fixed::{float_to_10_2, float_to_s10_5, float_to_s5_10};
use crate::tri::{self, VertexLayout};

use block::BlockRecorder;
use interrupt::CallbackTable;

/// Largest single command in 32-bit words (a fully loaded triangle).
pub(crate) const MAX_COMMAND_WORDS: usize = 44;

/// Errors surfaced by queue operations.
#[derive(Debug)]
pub enum RdpqError<E> {
    /// CP transport failure.
    Transport(E),
    /// A block operation that requires no active recording was called while
    /// recording.
    RecordingActive,
    /// `block_end` without a matching `block_begin`.
    NotRecording,
    /// All SYNC_FULL callback slots are in use.
    CallbackTableFull,
    /// A submit range was not 8-byte aligned at both ends.
    UnalignedSubmit { start: u32, end: u32 },
}

impl<E: core::fmt::Debug> From<E> for RdpqError<E> {
    fn from(e: E) -> Self {
        RdpqError::Transport(e)
    }
}

/// The last CP-level submit the writer emitted, kept so contiguous writes can
/// grow it instead of stacking up new submit commands.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PendingSubmit {
    pub(crate) token: rdpq_hal::SubmitToken,
    pub(crate) end: u32,
}

/// The RDP command queue.
///
/// Owns the CP transport. One instance drives one RDP; create it with
/// [`RdpQueue::new`] and tear it down with [`RdpQueue::close`].
pub struct RdpQueue<T: CpTransport + CommandArena> {
    pub(crate) cp: T,
    pub(crate) config: Config,
    pub(crate) autosync: SyncResources,
    pub(crate) autosync_saved: SyncResources,
    pub(crate) rec: Option<BlockRecorder>,
    pub(crate) last_submit: Option<PendingSubmit>,
    pub(crate) callbacks: CallbackTable,
}

impl<T: CpTransport + CommandArena> RdpQueue<T> {
    /// Create a queue over a CP transport. All auto-sync classes start
    /// enabled.
    pub fn new(cp: T) -> Self {
        log::debug!("rdpq: init");
        Self {
            cp,
            config: Config::all(),
            autosync: SyncResources::empty(),
            autosync_saved: SyncResources::empty(),
            rec: None,
            last_submit: None,
            callbacks: CallbackTable::new(),
        }
    }

    /// Tear down the queue, releasing the transport.
    pub fn close(self) -> T {
        log::debug!("rdpq: close");
        self.cp
    }

    /// Borrow the underlying transport.
    pub fn transport(&self) -> &T {
        &self.cp
    }

    /// Current configuration flags.
    pub fn config(&self) -> Config {
        self.config
    }

    /// Replace the configuration flags.
    pub fn set_config(&mut self, cfg: Config) {
        self.config = cfg;
    }

    /// Turn flags on and off in one step; returns the previous configuration.
    pub fn change_config(&mut self, on: Config, off: Config) -> Config {
        let old = self.config;
        self.config |= on;
        self.config &= !off;
        old
    }

    // ------------------------------------------------------------------
    // Write plumbing
    // ------------------------------------------------------------------

    /// Emit a fully encoded command: dynamic stream, or block tail while
    /// recording.
    pub(crate) fn write(&mut self, words: &[u32]) -> Result<(), RdpqError<T::Error>> {
        if self.rec.is_some() {
            self.block_check()?;
            self.static_write(words)
        } else {
            self.cp.queue_push(CpCommand::Rdp { words })?;
            Ok(())
        }
    }

    /// Emit a CPU-assisted command. In dynamic mode the CP derives and
    /// forwards the final words; in block mode the fixup output is redirected
    /// into `skip_words` of reserved space in the static buffer.
    pub(crate) fn fixup_write(
        &mut self,
        op: FixupOp,
        args: &[u32],
        skip_words: usize,
    ) -> Result<(), RdpqError<T::Error>> {
        if self.rec.is_some() {
            self.block_check()?;
            self.cp.queue_push(CpCommand::FixupToBlock { op, args })?;
            self.static_skip(skip_words)
        } else {
            self.cp.queue_push(CpCommand::Fixup { op, args })?;
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // Pipeline state
    // ------------------------------------------------------------------

    /// Set the full 64-bit pipeline mode word (`SET_OTHER_MODES`).
    ///
    /// The CP also re-derives the scissor rectangle, whose right edge depends
    /// on the cycle type, so in block mode the raw mode word is recorded
    /// verbatim and padding for the derived scissor follows it.
    pub fn set_other_modes(&mut self, modes: u64) -> Result<(), RdpqError<T::Error>> {
        self.autosync_change(SyncResources::PIPE)?;
        let words = [
            Opcode::SetOtherModes.word_hi((modes >> 32) as u32),
            modes as u32,
        ];
        if self.rec.is_some() {
            self.block_check()?;
            self.static_write(&words)?;
            self.cp.queue_push(CpCommand::FixupToBlock {
                op: FixupOp::OtherModes,
                args: &words,
            })?;
            self.static_skip(2)
        } else {
            self.cp.queue_push(CpCommand::Fixup {
                op: FixupOp::OtherModes,
                args: &words,
            })?;
            Ok(())
        }
    }

    /// Modify part of the stored mode word: `som = (som & and_mask) |
    /// or_value` on the 32-bit half selected by `byte_offset` (0 = upper,
    /// 4 = lower).
    pub fn modify_other_modes(
        &mut self,
        byte_offset: u32,
        and_mask: u32,
        or_value: u32,
    ) -> Result<(), RdpqError<T::Error>> {
        self.autosync_change(SyncResources::PIPE)?;
        self.fixup_write(
            FixupOp::ModifyOtherModes,
            &[byte_offset, and_mask, or_value],
            4,
        )
    }

    /// Set the color combiner equation from a raw 56-bit encoding.
    pub fn set_combine_raw(&mut self, cc: u64) -> Result<(), RdpqError<T::Error>> {
        self.autosync_change(SyncResources::PIPE)?;
        self.write(&[Opcode::SetCombineMode.word_hi((cc >> 32) as u32), cc as u32])
    }

    /// Set the color combiner equation.
    pub fn set_combine(&mut self, cc: &CombineMode) -> Result<(), RdpqError<T::Error>> {
        self.set_combine_raw(cc.encode())
    }

    /// Set the scissor rectangle, in pixels. Coordinates are quantized to
    /// quarter pixels.
    pub fn set_scissor(
        &mut self,
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
    ) -> Result<(), RdpqError<T::Error>> {
        // Scissor updates are safe mid-pipe; no sync needed.
        let words = [
            Opcode::SetScissor.word_hi(q10_2(x0) << 12 | q10_2(y0)),
            q10_2(x1) << 12 | q10_2(y1),
        ];
        self.fixup_write(FixupOp::Scissor, &words, 2)
    }

    /// Set the fill color from a 32-bit RGBA color. The CP converts it to
    /// the framebuffer's pixel format at dispatch time.
    pub fn set_fill_color(&mut self, color: Color) -> Result<(), RdpqError<T::Error>> {
        self.autosync_change(SyncResources::PIPE)?;
        let words = [Opcode::SetFillColor.word_hi(0), color.rgba32()];
        self.fixup_write(FixupOp::FillColor, &words, 2)
    }

    /// Set the fill color from a pre-encoded framebuffer pattern (e.g. an
    /// RGBA5551 pixel duplicated into both halves).
    pub fn set_fill_color_pattern(&mut self, pattern: u32) -> Result<(), RdpqError<T::Error>> {
        self.autosync_change(SyncResources::PIPE)?;
        self.write(&[Opcode::SetFillColor.word_hi(0), pattern])
    }

    pub fn set_fog_color(&mut self, color: Color) -> Result<(), RdpqError<T::Error>> {
        self.autosync_change(SyncResources::PIPE)?;
        self.write(&[Opcode::SetFogColor.word_hi(0), color.rgba32()])
    }

    pub fn set_blend_color(&mut self, color: Color) -> Result<(), RdpqError<T::Error>> {
        self.autosync_change(SyncResources::PIPE)?;
        self.write(&[Opcode::SetBlendColor.word_hi(0), color.rgba32()])
    }

    pub fn set_prim_color(&mut self, color: Color) -> Result<(), RdpqError<T::Error>> {
        self.autosync_change(SyncResources::PIPE)?;
        self.write(&[Opcode::SetPrimColor.word_hi(0), color.rgba32()])
    }

    pub fn set_env_color(&mut self, color: Color) -> Result<(), RdpqError<T::Error>> {
        self.autosync_change(SyncResources::PIPE)?;
        self.write(&[Opcode::SetEnvColor.word_hi(0), color.rgba32()])
    }

    /// Set the primitive depth and delta-Z used when Z-source is primitive.
    pub fn set_prim_depth(&mut self, z: u16, dz: u16) -> Result<(), RdpqError<T::Error>> {
        self.write(&[
            Opcode::SetPrimDepth.word_hi(0),
            (z as u32) << 16 | dz as u32,
        ])
    }

    // ------------------------------------------------------------------
    // Images
    // ------------------------------------------------------------------

    /// Point the texture loader at a DRAM image.
    pub fn set_tex_image(
        &mut self,
        dram_addr: u32,
        fmt: TexFormat,
        size: TexSize,
        width: u16,
    ) -> Result<(), RdpqError<T::Error>> {
        self.autosync_change(SyncResources::PIPE)?;
        let words = image_words(Opcode::SetTexImage, dram_addr, fmt, size, width);
        self.fixup_write(FixupOp::TexImage, &words, 2)
    }

    /// Point the depth buffer at a DRAM address (64-byte aligned).
    pub fn set_z_image(&mut self, dram_addr: u32) -> Result<(), RdpqError<T::Error>> {
        self.autosync_change(SyncResources::PIPE)?;
        let words = [Opcode::SetZImage.word_hi(0), dram_addr & 0x03FF_FFFF];
        self.fixup_write(FixupOp::ZImage, &words, 2)
    }

    /// Point the color framebuffer at a DRAM image (64-byte aligned). The CP
    /// records the target bit depth for later fill-color conversion and
    /// re-derives the scissor, so the block-mode padding covers both.
    pub fn set_color_image(
        &mut self,
        dram_addr: u32,
        fmt: TexFormat,
        size: TexSize,
        width: u16,
    ) -> Result<(), RdpqError<T::Error>> {
        self.autosync_change(SyncResources::PIPE)?;
        let words = image_words(Opcode::SetColorImage, dram_addr, fmt, size, width);
        self.fixup_write(FixupOp::ColorImage, &words, 4)
    }

    // ------------------------------------------------------------------
    // Tiles and loads
    // ------------------------------------------------------------------

    /// Configure a tile descriptor. `tmem_pitch` and `tmem_addr` are in
    /// bytes and must be multiples of 8.
    pub fn set_tile(
        &mut self,
        tile: u8,
        fmt: TexFormat,
        size: TexSize,
        tmem_pitch: u16,
        tmem_addr: u16,
        palette: u8,
    ) -> Result<(), RdpqError<T::Error>> {
        self.autosync_change(SyncResources::tile(tile))?;
        let hi = ((fmt.bits() as u32) << 21)
            | ((size.bits() as u32) << 19)
            | ((tmem_pitch as u32 / 8) & 0x1FF) << 9
            | ((tmem_addr as u32 / 8) & 0x1FF);
        let lo = ((tile as u32 & 7) << 24) | ((palette as u32 & 0xF) << 20);
        self.write(&[Opcode::SetTile.word_hi(hi), lo])
    }

    /// Set a tile's screen-space extents, in pixels.
    pub fn set_tile_size(
        &mut self,
        tile: u8,
        s0: f32,
        t0: f32,
        s1: f32,
        t1: f32,
    ) -> Result<(), RdpqError<T::Error>> {
        self.autosync_change(SyncResources::tile(tile))?;
        self.write(&tile_extent_words(Opcode::SetTileSize, tile, s0, t0, s1, t1))
    }

    /// Load a rectangle of the current texture image into the tile's TMEM
    /// area, setting the tile extents as a side effect.
    pub fn load_tile(
        &mut self,
        tile: u8,
        s0: f32,
        t0: f32,
        s1: f32,
        t1: f32,
    ) -> Result<(), RdpqError<T::Error>> {
        self.autosync_change(SyncResources::tile(tile) | SyncResources::TMEM_LOW)?;
        self.autosync_use(SyncResources::TMEM_LOW);
        self.write(&tile_extent_words(Opcode::LoadTile, tile, s0, t0, s1, t1))
    }

    /// Load `num_texels` texels as one contiguous block, with `dxt` as the
    /// per-line deinterleave step (1.11 fixed point).
    pub fn load_block(
        &mut self,
        tile: u8,
        s0: u16,
        t0: u16,
        num_texels: u16,
        dxt: u16,
    ) -> Result<(), RdpqError<T::Error>> {
        self.autosync_change(SyncResources::tile(tile) | SyncResources::TMEM_LOW)?;
        self.autosync_use(SyncResources::TMEM_LOW);
        let hi = ((s0 as u32 & 0xFFF) << 12) | (t0 as u32 & 0xFFF);
        let lo = ((tile as u32 & 7) << 24)
            | ((num_texels.saturating_sub(1) as u32 & 0xFFF) << 12)
            | (dxt as u32 & 0xFFF);
        self.write(&[Opcode::LoadBlock.word_hi(hi), lo])
    }

    /// Load palette entries `[first_color, last_color]` into the tile's TMEM
    /// area. Palettes live in the upper TMEM half.
    pub fn load_tlut(
        &mut self,
        tile: u8,
        first_color: u8,
        last_color: u8,
    ) -> Result<(), RdpqError<T::Error>> {
        self.autosync_change(SyncResources::tile(tile) | SyncResources::TMEM_HIGH)?;
        self.autosync_use(SyncResources::TMEM_HIGH);
        let hi = ((first_color as u32) << 2) << 12;
        let lo = ((tile as u32 & 7) << 24) | (((last_color as u32) << 2) << 12);
        self.write(&[Opcode::LoadTlut.word_hi(hi), lo])
    }

    // ------------------------------------------------------------------
    // Drawing
    // ------------------------------------------------------------------

    /// Fill a rectangle with the fill color. Coordinates in pixels,
    /// quantized to quarter pixels; the right/bottom edge is exclusive in
    /// 1-cycle mode and inclusive in fill/copy mode.
    pub fn fill_rectangle(
        &mut self,
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
    ) -> Result<(), RdpqError<T::Error>> {
        self.autosync_use(SyncResources::PIPE);
        self.write(&[
            Opcode::FillRectangle.word_hi(q10_2(x1) << 12 | q10_2(y1)),
            q10_2(x0) << 12 | q10_2(y0),
        ])
    }

    /// Draw a textured rectangle sampling the given tile. `s`/`t` are the
    /// texture coordinates at the top-left corner; `dsdx`/`dtdy` the texel
    /// steps per pixel. In copy mode the CP rescales `dsdx` for the
    /// four-texels-per-clock fetch, hence the fixup path.
    #[allow(clippy::too_many_arguments)]
    pub fn texture_rectangle(
        &mut self,
        tile: u8,
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
        s: f32,
        t: f32,
        dsdx: f32,
        dtdy: f32,
    ) -> Result<(), RdpqError<T::Error>> {
        self.autosync_use(
            SyncResources::PIPE | SyncResources::tile(tile) | SyncResources::TMEM_LOW,
        );
        let words = tex_rect_words(
            Opcode::TextureRectangle,
            tile,
            x0,
            y0,
            x1,
            y1,
            s,
            t,
            dsdx,
            dtdy,
        );
        self.fixup_write(FixupOp::TextureRectangle, &words, 4)
    }

    /// As [`texture_rectangle`](Self::texture_rectangle) but with S/T axes
    /// exchanged while rasterizing. Not valid in copy mode.
    #[allow(clippy::too_many_arguments)]
    pub fn texture_rectangle_flip(
        &mut self,
        tile: u8,
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
        s: f32,
        t: f32,
        dsdx: f32,
        dtdy: f32,
    ) -> Result<(), RdpqError<T::Error>> {
        self.autosync_use(
            SyncResources::PIPE | SyncResources::tile(tile) | SyncResources::TMEM_LOW,
        );
        let words = tex_rect_words(
            Opcode::TextureRectangleFlip,
            tile,
            x0,
            y0,
            x1,
            y1,
            s,
            t,
            dsdx,
            dtdy,
        );
        self.write(&words)
    }

    /// Draw a screen-space triangle.
    ///
    /// `layout` names where the position, shade, texture and Z sub-arrays
    /// live inside each vertex slice; the optional attributes select the
    /// triangle variant. `levels` is the mipmap level field of the command.
    pub fn triangle(
        &mut self,
        tile: u8,
        levels: u8,
        layout: &VertexLayout,
        v1: &[f32],
        v2: &[f32],
        v3: &[f32],
    ) -> Result<(), RdpqError<T::Error>> {
        let mut res = SyncResources::PIPE;
        if layout.tex.is_some() {
            res |= SyncResources::tile(tile);
        }
        self.autosync_use(res);
        let tri = tri::compute(tile, levels, layout, v1, v2, v3);
        self.write(tri.as_words())
    }

    // ------------------------------------------------------------------
    // Debug channel
    // ------------------------------------------------------------------

    /// Toggle the trace log from inside the command stream, so the output
    /// brackets exactly the commands of interest.
    pub fn debug_show_log(&mut self, on: bool) -> Result<(), RdpqError<T::Error>> {
        self.write(&[Opcode::Debug.word_hi(0x01 << 16), on as u32])
    }

    /// Emit a debug message marker carrying the physical address of a
    /// NUL-terminated string.
    pub fn debug_message(&mut self, msg_phys: u32) -> Result<(), RdpqError<T::Error>> {
        self.write(&[Opcode::Debug.word_hi(0x02 << 16), msg_phys])
    }
}

/// Quantize a pixel coordinate to an unsigned 12-bit 10.2 field.
fn q10_2(v: f32) -> u32 {
    (float_to_10_2(v) as u32) & 0xFFF
}

fn image_words(op: Opcode, dram_addr: u32, fmt: TexFormat, size: TexSize, width: u16) -> [u32; 2] {
    let hi = ((fmt.bits() as u32) << 21)
        | ((size.bits() as u32) << 19)
        | (width.saturating_sub(1) as u32 & 0x3FF);
    [op.word_hi(hi), dram_addr & 0x03FF_FFFF]
}

fn tile_extent_words(op: Opcode, tile: u8, s0: f32, t0: f32, s1: f32, t1: f32) -> [u32; 2] {
    [
        op.word_hi(q10_2(s0) << 12 | q10_2(t0)),
        ((tile as u32 & 7) << 24) | q10_2(s1) << 12 | q10_2(t1),
    ]
}

#[allow(clippy::too_many_arguments)]
fn tex_rect_words(
    op: Opcode,
    tile: u8,
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
    s: f32,
    t: f32,
    dsdx: f32,
    dtdy: f32,
) -> [u32; 4] {
    [
        op.word_hi(q10_2(x1) << 12 | q10_2(y1)),
        ((tile as u32 & 7) << 24) | q10_2(x0) << 12 | q10_2(y0),
        ((float_to_s10_5(s) as u32 & 0xFFFF) << 16) | (float_to_s10_5(t) as u32 & 0xFFFF),
        ((float_to_s5_10(dsdx) as u32 & 0xFFFF) << 16) | (float_to_s5_10(dtdy) as u32 & 0xFFFF),
    ]
}
