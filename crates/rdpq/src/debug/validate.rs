//! Semantic stream validator.
//!
//! Mirrors the RDP's internal state as commands flow past and checks each
//! one against the programming model. Two severities:
//!
//! - **errors**: undefined or visibly broken hardware behavior (garbled
//!   pixels, hangs);
//! - **warnings**: deviations from documented practice that may still work,
//!   including missing `SYNC_*` barriers (the hardware does not always
//!   actually stall).
//!
//! Mode validation is lazy: SET_OTHER_MODES and SET_COMBINE_MODE can arrive
//! in any order, so their mutual consistency is only judged at the next
//! drawing command. Each finding cites the offending command's address and,
//! where relevant, the addresses of the mode commands that produced the
//! conflicting configuration.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use rdp_commands::combine::CombineMode;
use rdp_commands::fields::bits;
use rdp_commands::som::{CycleType, OtherModes};

use super::disasm::disasm_size;

const FMT_NAMES: [&str; 8] = ["RGBA", "YUV", "CI", "IA", "I", "?", "?", "?"];
const TEXINTERP: [&str; 4] = ["point", "point", "bilinear", "median"];

/// Finding context citations.
const CITE_SOM: u8 = 1 << 0;
const CITE_CC: u8 = 1 << 1;
const CITE_TEX: u8 = 1 << 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// One validator finding.
#[derive(Debug, Clone)]
pub struct Finding {
    pub severity: Severity,
    /// Address of the offending command.
    pub addr: u32,
    pub message: String,
    /// Address of the SET_OTHER_MODES that configured the conflicting state.
    pub som_addr: Option<u32>,
    /// Address of the SET_COMBINE_MODE involved.
    pub cc_addr: Option<u32>,
    /// Address of the SET_TEX_IMAGE involved.
    pub tex_addr: Option<u32>,
}

/// Shadow tile descriptor.
#[derive(Debug, Clone, Copy, Default)]
struct TileShadow {
    fmt: u8,
    size: u8,
    pal: u8,
    has_extents: bool,
    s0: f32,
    t0: f32,
    s1: f32,
    t1: f32,
    tmem_addr: i32,
    tmem_pitch: i32,
}

/// The validator: shadow hardware state plus accumulated findings.
pub struct Validator {
    busy_pipe: bool,
    busy_tile: [bool; 8],
    /// One bit per 8-byte TMEM word; set while a load is in flight.
    busy_tmem: [u8; 64],
    sent_scissor: bool,
    sent_color_image: bool,
    sent_zprim: bool,
    mode_changed: bool,
    last_som: Option<(u32, u64)>,
    last_cc: Option<(u32, u64)>,
    last_tex: Option<(u32, u64)>,
    som: OtherModes,
    cc: CombineMode,
    tile: [TileShadow; 8],
    tex_fmt: u8,
    tex_size: u8,
    errs: u32,
    warns: u32,
    cur_addr: u32,
    findings: Vec<Finding>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            busy_pipe: false,
            busy_tile: [false; 8],
            busy_tmem: [0; 64],
            sent_scissor: false,
            sent_color_image: false,
            sent_zprim: false,
            mode_changed: false,
            last_som: None,
            last_cc: None,
            last_tex: None,
            som: OtherModes::default(),
            cc: CombineMode::default(),
            tile: [TileShadow::default(); 8],
            tex_fmt: 0,
            tex_size: 0,
            errs: 0,
            warns: 0,
            cur_addr: 0,
            findings: Vec::new(),
        }
    }

    /// Total error and warning counts since creation.
    pub fn totals(&self) -> (u32, u32) {
        (self.errs, self.warns)
    }

    /// All findings so far.
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// Drain the accumulated findings.
    pub fn take_findings(&mut self) -> Vec<Finding> {
        core::mem::take(&mut self.findings)
    }

    /// Validate a whole captured stream; returns the (errors, warnings)
    /// emitted for it.
    pub fn validate_stream(&mut self, base_addr: u32, words: &[u64]) -> (u32, u32) {
        let (e0, w0) = (self.errs, self.warns);
        let mut i = 0;
        while i < words.len() {
            let sz = disasm_size(words[i]).min(words.len() - i);
            self.validate(base_addr + (i as u32) * 8, &words[i..i + sz]);
            i += sz;
        }
        (self.errs - e0, self.warns - w0)
    }

    /// Validate one command (with its extra words); returns the (errors,
    /// warnings) it produced.
    pub fn validate(&mut self, addr: u32, words: &[u64]) -> (u32, u32) {
        let (e0, warns0) = (self.errs, self.warns);
        self.cur_addr = addr;
        let w0 = words[0];
        let cmd = bits(w0, 56, 61) as u8;
        match cmd {
            0x3F => {
                // SET_COLOR_IMAGE
                self.check_busy_pipe();
                self.sent_color_image = true;
                let fmt = bits(w0, 53, 55) as usize;
                let size = 4u32 << bits(w0, 51, 52);
                if bits(w0, 0, 5) != 0 {
                    self.err(0, "color image must be aligned to 64 bytes".into());
                }
                if !((fmt == 0 && (size == 32 || size == 16)) || (fmt == 2 && size == 8)) {
                    self.err(
                        0,
                        format!(
                            "color image has invalid format {}{}: must be RGBA32, RGBA16 or CI8",
                            FMT_NAMES[fmt], size
                        ),
                    );
                }
            }
            0x3E => {
                // SET_Z_IMAGE
                self.check_busy_pipe();
                if bits(w0, 0, 5) != 0 {
                    self.err(0, "Z image must be aligned to 64 bytes".into());
                }
            }
            0x3D => {
                // SET_TEX_IMAGE
                self.check_busy_pipe();
                if bits(w0, 0, 2) != 0 {
                    self.err(0, "texture image must be aligned to 8 bytes".into());
                }
                self.tex_fmt = bits(w0, 53, 55) as u8;
                self.tex_size = bits(w0, 51, 52) as u8;
                self.last_tex = Some((addr, w0));
            }
            0x35 => {
                // SET_TILE
                let tidx = bits(w0, 24, 26) as usize;
                self.check_busy_tile(tidx);
                let t = TileShadow {
                    fmt: bits(w0, 53, 55) as u8,
                    size: bits(w0, 51, 52) as u8,
                    pal: bits(w0, 20, 23) as u8,
                    has_extents: false,
                    s0: 0.0,
                    t0: 0.0,
                    s1: 0.0,
                    t1: 0.0,
                    tmem_addr: (bits(w0, 32, 40) * 8) as i32,
                    tmem_pitch: (bits(w0, 41, 49) * 8) as i32,
                };
                self.tile[tidx] = t;
                if t.fmt == 2 && t.size == 1 && t.pal != 0 {
                    self.warn(0, "invalid non-zero palette for CI8 tile".into());
                }
                if (t.fmt == 1 || (t.fmt == 0 && t.size == 3)) && t.tmem_addr >= 0x800 {
                    self.err(
                        0,
                        format!(
                            "format {} requires address in low TMEM (< 0x800)",
                            if t.fmt == 1 { "YUV" } else { "RGBA32" }
                        ),
                    );
                }
            }
            0x32 | 0x34 => {
                // SET_TILE_SIZE, LOAD_TILE
                let load = cmd == 0x34;
                let tidx = bits(w0, 24, 26) as usize;
                self.check_busy_tile(tidx);
                if load && self.tex_size == 0 {
                    self.err(CITE_TEX, "LOAD_TILE does not support 4-bit textures".into());
                }
                let t = &mut self.tile[tidx];
                t.has_extents = true;
                t.s0 = bits(w0, 44, 55) as f32 * 0.25;
                t.t0 = bits(w0, 32, 43) as f32 * 0.25;
                t.s1 = bits(w0, 12, 23) as f32 * 0.25;
                t.t1 = bits(w0, 0, 11) as f32 * 0.25;
                if load {
                    let t = self.tile[tidx];
                    let size = ((t.t1 - t.t0 + 1.0) * t.tmem_pitch as f32) as i32;
                    self.check_busy_tmem(t.tmem_addr, size);
                    self.mark_busy_tmem(t.tmem_addr, size);
                }
            }
            0x30 => {
                // LOAD_TLUT
                let tidx = bits(w0, 24, 26) as usize;
                let t = self.tile[tidx];
                let low = bits(w0, 44, 55);
                let high = bits(w0, 12, 23);
                if !(self.tex_fmt == 0 && self.tex_size == 2) {
                    self.err(CITE_TEX, "LOAD_TLUT requires texture in RGBA16 format".into());
                }
                if t.tmem_addr < 0x800 {
                    self.err(
                        0,
                        "palettes must be loaded in upper half of TMEM (address >= 0x800)".into(),
                    );
                }
                if low & 3 != 0 || high & 3 != 0 {
                    self.warn(0, "lowest 2 bits of palette start/stop must be 0".into());
                }
                if low >> 2 >= 256 {
                    self.err(0, "palette start index must be < 256".into());
                }
                if high >> 2 >= 256 {
                    self.err(0, "palette stop index must be < 256".into());
                }
                // Each palette entry is quadruplicated into 16 bytes.
                let entries = (high >> 2) as i32 - (low >> 2) as i32 + 1;
                if entries > 0 {
                    self.check_busy_tmem(t.tmem_addr, entries * 16);
                    self.mark_busy_tmem(t.tmem_addr, entries * 16);
                }
            }
            0x2F => {
                // SET_OTHER_MODES
                self.check_busy_pipe();
                self.som = OtherModes::decode(w0);
                self.last_som = Some((addr, w0));
                self.mode_changed = true;
            }
            0x3C => {
                // SET_COMBINE_MODE
                self.check_busy_pipe();
                self.cc = CombineMode::decode(w0);
                self.last_cc = Some((addr, w0));
                self.mode_changed = true;
            }
            0x2D => {
                self.sent_scissor = true;
            }
            0x24 | 0x25 => {
                // TEX_RECT, TEX_RECT_FLIP
                if cmd == 0x25 && self.som.cycle_type.is_bypass() {
                    self.err(0, "cannot draw texture rectangle flip in copy/fill mode".into());
                }
                self.busy_pipe = true;
                self.lazy_validate_rendermode();
                self.validate_draw_cmd(false, true, false, false);
                self.use_tile(bits(w0, 24, 26) as usize, 0);
            }
            0x36 => {
                // FILL_RECTANGLE
                self.busy_pipe = true;
                self.lazy_validate_rendermode();
                self.validate_draw_cmd(false, false, false, false);
            }
            0x08..=0x0F => {
                // Triangle family
                self.busy_pipe = true;
                if self.som.cycle_type.is_bypass() {
                    self.err(CITE_SOM, "cannot draw triangles in copy/fill mode".into());
                }
                self.lazy_validate_rendermode();
                self.validate_draw_cmd(cmd & 4 != 0, cmd & 2 != 0, cmd & 1 != 0, cmd & 2 != 0);
                if cmd & 2 != 0 {
                    self.use_tile(bits(w0, 48, 50) as usize, 0);
                }
                let mipmaps = bits(w0, 51, 53);
                if mipmaps != 0 && !self.som.tex_lod {
                    self.warn(
                        CITE_SOM,
                        format!(
                            "triangle with {} mipmaps specified, but mipmapping is disabled",
                            mipmaps + 1
                        ),
                    );
                }
            }
            0x27 => {
                // SYNC_PIPE
                self.busy_pipe = false;
            }
            0x28 => {
                // SYNC_TILE
                self.busy_tile = [false; 8];
            }
            0x26 => {
                // SYNC_LOAD
                self.busy_tmem = [0; 64];
            }
            0x29 => {
                // SYNC_FULL
                self.busy_pipe = false;
                self.busy_tile = [false; 8];
                self.busy_tmem = [0; 64];
            }
            0x2E => {
                // SET_PRIM_DEPTH
                self.sent_zprim = true;
            }
            // Prim color is not pipelined; no sync needed.
            0x3A => {}
            0x37 | 0x38 | 0x39 | 0x3B => {
                // SET_FILL/FOG/BLEND/ENV_COLOR
                self.check_busy_pipe();
            }
            _ => {}
        }
        (self.errs - e0, self.warns - warns0)
    }

    // ------------------------------------------------------------------
    // Finding emission
    // ------------------------------------------------------------------

    fn emit(&mut self, severity: Severity, cites: u8, message: String) {
        match severity {
            Severity::Error => {
                self.errs += 1;
                log::error!("[rdpq validation] {:#010x}: {}", self.cur_addr, message);
            }
            Severity::Warning => {
                self.warns += 1;
                log::warn!("[rdpq validation] {:#010x}: {}", self.cur_addr, message);
            }
        }
        self.findings.push(Finding {
            severity,
            addr: self.cur_addr,
            message,
            som_addr: (cites & CITE_SOM != 0)
                .then(|| self.last_som.map(|(a, _)| a))
                .flatten(),
            cc_addr: (cites & CITE_CC != 0)
                .then(|| self.last_cc.map(|(a, _)| a))
                .flatten(),
            tex_addr: (cites & CITE_TEX != 0)
                .then(|| self.last_tex.map(|(a, _)| a))
                .flatten(),
        });
    }

    fn err(&mut self, cites: u8, message: String) {
        self.emit(Severity::Error, cites, message);
    }

    fn warn(&mut self, cites: u8, message: String) {
        self.emit(Severity::Warning, cites, message);
    }

    // ------------------------------------------------------------------
    // Busy tracking
    // ------------------------------------------------------------------

    fn check_busy_pipe(&mut self) {
        if self.busy_pipe {
            self.warn(0, "pipe might be busy, SYNC_PIPE is missing".into());
        }
        self.busy_pipe = false;
    }

    fn check_busy_tile(&mut self, tidx: usize) {
        if self.busy_tile[tidx] {
            self.warn(0, format!("tile {tidx} might be busy, SYNC_TILE is missing"));
        }
        self.busy_tile[tidx] = false;
    }

    fn mark_busy_tmem(&mut self, addr: i32, size: i32) {
        let x0 = (addr.clamp(0, 0x1000) / 8) as usize;
        let x1 = ((addr + size).clamp(0, 0x1000) / 8) as usize;
        for x in x0..x1 {
            self.busy_tmem[x / 8] |= 1 << (x & 7);
        }
    }

    fn is_busy_tmem(&self, addr: i32, size: i32) -> bool {
        let x0 = (addr.clamp(0, 0x1000) / 8) as usize;
        let x1 = ((addr + size).clamp(0, 0x1000) / 8) as usize;
        (x0..x1).any(|x| self.busy_tmem[x / 8] & (1 << (x & 7)) != 0)
    }

    fn check_busy_tmem(&mut self, addr: i32, size: i32) {
        if self.is_busy_tmem(addr, size) {
            self.warn(
                0,
                format!(
                    "writing to TMEM[{:#x}:{:#x}] while busy, SYNC_LOAD missing",
                    addr,
                    addr + size
                ),
            );
        }
    }

    // ------------------------------------------------------------------
    // Mode validation
    // ------------------------------------------------------------------

    /// True if the current combiner reads the second texture. Only possible
    /// in 2-cycle mode: cycle 0's TEX1 slot is the next tile, and cycle 1's
    /// TEX0 slot actually refers to it as well because of the pipelining.
    fn cc_use_tex1(&self) -> bool {
        let cc = &self.cc.cyc;
        if self.som.cycle_type != CycleType::Two {
            return false;
        }
        // TEX1 as color-conversion of TEX0 does not read a second tile.
        if self.som.tf_mode & 3 == 1 {
            return false;
        }
        (cc[0].rgb_sub_a == 2
            || cc[0].rgb_sub_b == 2
            || cc[0].rgb_mul == 2
            || cc[0].rgb_mul == 9
            || cc[0].rgb_add == 2)
            || (cc[1].rgb_sub_a == 1
                || cc[1].rgb_sub_b == 1
                || cc[1].rgb_mul == 1
                || cc[1].rgb_mul == 8
                || cc[1].rgb_add == 1)
    }

    /// Judge SOM/CC consistency at the first draw after a mode change.
    fn lazy_validate_rendermode(&mut self) {
        if !self.mode_changed {
            return;
        }
        self.mode_changed = false;

        // The combiner does not run in fill/copy mode.
        if self.som.cycle_type.is_bypass() {
            return;
        }

        let b0 = self.som.blender[0];
        let b1 = self.som.blender[1];
        if !(self.som.blend || self.som.aa) && (b0.is_configured() || b1.is_configured()) {
            self.warn(
                CITE_SOM,
                "blender function will be ignored because SOM_BLENDING and SOM_ANTIALIAS are both disabled"
                    .into(),
            );
        }

        if self.som.tex_lod {
            if self.som.cycle_type != CycleType::Two {
                self.err(CITE_SOM, "in 1-cycle mode, texture LOD does not work".into());
            }
        } else if self.som.tex_sharpen || self.som.tex_detail {
            self.err(
                CITE_SOM,
                "sharpen/detail texture require texture LOD to be active".into(),
            );
        }

        if self.last_som.is_none() {
            self.err(0, "SET_OTHER_MODES not called before drawing primitive".into());
        }
        if self.last_cc.is_none() {
            self.err(0, "SET_COMBINE not called before drawing primitive".into());
            return;
        }
        let c0 = self.cc.cyc[0];
        let c1 = self.cc.cyc[1];
        if self.som.cycle_type == CycleType::One {
            if c0 != c1 {
                self.warn(
                    CITE_CC,
                    "in 1cycle mode, the color combiner should be programmed identically in both cycles. Cycle 0 will be ignored."
                        .into(),
                );
            }
            if c1.rgb_sub_a == 0
                || c1.rgb_sub_b == 0
                || c1.rgb_mul == 0
                || c1.rgb_add == 0
                || c1.alpha_sub_a == 0
                || c1.alpha_sub_b == 0
                || c1.alpha_add == 0
            {
                self.err(
                    CITE_CC,
                    "in 1cycle mode, the color combiner cannot access the COMBINED slot".into(),
                );
            }
            if c1.slots().contains(&2) {
                self.err(
                    CITE_CC,
                    "in 1cycle mode, the color combiner cannot access the TEX1 slot".into(),
                );
            }
            if c1.rgb_mul == 7 {
                self.err(
                    CITE_CC,
                    "in 1cycle mode, the color combiner cannot access the COMBINED_ALPHA slot"
                        .into(),
                );
            }
            if c1.rgb_mul == 9 {
                self.err(
                    CITE_CC,
                    "in 1cycle mode, the color combiner cannot access the TEX1_ALPHA slot".into(),
                );
            }
        } else {
            if c0.rgb_sub_a == 0
                || c0.rgb_sub_b == 0
                || c0.rgb_mul == 0
                || c0.rgb_add == 0
                || c0.alpha_sub_a == 0
                || c0.alpha_sub_b == 0
                || c0.alpha_add == 0
            {
                self.err(
                    CITE_CC,
                    "in 2cycle mode, the color combiner cannot access the COMBINED slot in the first cycle"
                        .into(),
                );
            }
            if c1.slots().contains(&2) {
                self.err(
                    CITE_CC,
                    "in 2cycle mode, the color combiner cannot access the TEX1 slot in the second cycle (but TEX0 contains the second texture)"
                        .into(),
                );
            }
            if c0.rgb_mul == 7 {
                self.err(
                    CITE_CC,
                    "in 2cycle mode, the color combiner cannot access the COMBINED_ALPHA slot in the first cycle"
                        .into(),
                );
            }
            if c1.rgb_mul == 9 {
                self.err(
                    CITE_CC,
                    "in 2cycle mode, the color combiner cannot access the TEX1_ALPHA slot in the second cycle (but TEX0_ALPHA contains the second texture)"
                        .into(),
                );
            }
            // INV_MUX_ALPHA, or ONE/ZERO (which still works).
            if !(b0.b == 0 || (b0.b == 2 && b0.a == 3)) {
                self.err(
                    CITE_SOM,
                    "in 2 cycle mode, the first pass of the blender must use INV_MUX_ALPHA or equivalent"
                        .into(),
                );
            }
        }
    }

    /// Check a draw against the attributes it actually supplies.
    fn validate_draw_cmd(&mut self, use_colors: bool, use_tex: bool, use_z: bool, use_w: bool) {
        if !self.sent_scissor {
            self.err(
                0,
                "undefined behavior: drawing command before a SET_SCISSOR was sent".into(),
            );
        }
        if !self.sent_color_image {
            self.err(
                0,
                "undefined behavior: drawing command before a SET_COLOR_IMAGE was sent".into(),
            );
        }

        let mut use_z = use_z;
        if self.som.z_prim {
            if use_z {
                self.warn(
                    CITE_SOM,
                    "per-vertex Z value will be ignored because Z-source is set to primitive"
                        .into(),
                );
            }
            if !self.sent_zprim {
                self.err(
                    CITE_SOM,
                    "Z-source is set to primitive but SET_PRIM_DEPTH was never sent".into(),
                );
            }
            use_z = true;
        }

        if self.som.cycle_type.is_bypass() {
            return;
        }

        for i in 0..=self.som.cycle_type.bits() as usize {
            let bls = self.som.blender[i];
            let ccs = self.cc.cyc[i ^ 1];
            let slots = ccs.slots();

            if !use_tex {
                if slots.contains(&1) {
                    self.err(
                        CITE_CC,
                        "cannot draw a non-textured primitive with a color combiner using the TEX0 slot"
                            .into(),
                    );
                }
                if slots.contains(&2) {
                    self.err(
                        CITE_CC,
                        "cannot draw a non-textured primitive with a color combiner using the TEX1 slot"
                            .into(),
                    );
                }
                if ccs.rgb_mul == 8 || ccs.rgb_mul == 9 {
                    self.err(
                        CITE_CC,
                        "cannot draw a non-textured primitive with a color combiner using the TEX_ALPHA slot"
                            .into(),
                    );
                }
            }
            if !use_colors {
                if slots.contains(&4) {
                    self.err(
                        CITE_CC,
                        "cannot draw a non-shaded primitive with a color combiner using the SHADE slot"
                            .into(),
                    );
                }
                if ccs.rgb_mul == 11 {
                    self.err(
                        CITE_CC,
                        "cannot draw a non-shaded primitive with a color combiner using the SHADE_ALPHA slot"
                            .into(),
                    );
                }
                if bls.a == 2 {
                    self.err(
                        CITE_SOM,
                        "cannot draw a non-shaded primitive with a blender using the SHADE_ALPHA slot"
                            .into(),
                    );
                }
            }
        }

        if use_tex && !use_w && self.som.tex_persp {
            self.err(
                CITE_SOM,
                "cannot draw a textured primitive with perspective correction but without per-vertex W coordinate"
                    .into(),
            );
        }

        if !use_z && (self.som.z_compare || self.som.z_write) {
            self.err(
                CITE_SOM,
                "cannot draw a primitive without Z coordinate if Z buffer access is activated"
                    .into(),
            );
        }
    }

    /// Validate one tile read by a draw, mark its TMEM area busy, and chase
    /// the implicit second tile when the combiner samples TEX1.
    fn use_tile(&mut self, tidx: usize, cycle: u8) {
        let t = self.tile[tidx];
        if !t.has_extents {
            self.err(
                0,
                format!("tile {tidx} has no extents set, missing LOAD_TILE or SET_TILE_SIZE"),
            );
        }
        self.busy_tile[tidx] = true;

        if !self.som.cycle_type.is_bypass() {
            // YUV conversion steering only matters when the combiner runs;
            // copy mode moves YUV texels untouched.
            if t.fmt == 1 {
                if self.som.tf_mode & (4 >> cycle) != 0 {
                    self.err(
                        CITE_SOM,
                        format!(
                            "tile {tidx} is YUV but texture filter in cycle {cycle} does not activate YUV color conversion"
                        ),
                    );
                }
                if self.som.sample_type > 1 {
                    let filt = TEXINTERP[self.som.sample_type as usize];
                    if !(self.som.tf_mode == 6 && self.som.cycle_type == CycleType::Two) {
                        self.err(
                            CITE_SOM,
                            format!(
                                "tile {tidx} is YUV and {filt} filtering is active: TF1_YUVTEX0 mode must be configured in SOM"
                            ),
                        );
                    }
                    if self.som.cycle_type != CycleType::Two {
                        self.err(
                            CITE_SOM,
                            format!(
                                "tile {tidx} is YUV and {filt} filtering is active: 2-cycle mode must be configured"
                            ),
                        );
                    }
                }
            } else if self.som.tf_mode & (4 >> cycle) == 0 {
                self.err(
                    CITE_SOM,
                    format!(
                        "tile {tidx} is RGB-based, but cycle {cycle} is configured for YUV color conversion; try setting SOM_TF{cycle}_RGB"
                    ),
                );
            }
        }

        if t.fmt == 2 {
            if !self.som.tlut_enable {
                self.err(
                    CITE_SOM,
                    format!("tile {tidx} is CI (color index), but TLUT mode was not activated"),
                );
            }
        } else if self.som.tlut_enable {
            self.err(
                CITE_SOM,
                format!("tile {tidx} is not CI (color index), but TLUT mode is active"),
            );
        }

        let rows_bytes = ((t.t1 - t.t0 + 1.0) * t.tmem_pitch as f32) as i32;
        match t.fmt {
            // RGBA, IA, I
            0 | 3 | 4 => {
                if t.size == 3 {
                    // 32-bit: split between low and high TMEM
                    self.mark_busy_tmem(t.tmem_addr, rows_bytes / 2);
                    self.mark_busy_tmem(t.tmem_addr + 0x800, rows_bytes / 2);
                } else {
                    self.mark_busy_tmem(t.tmem_addr, rows_bytes);
                }
            }
            // YUV: chroma and luma split between low and high TMEM
            1 => {
                self.mark_busy_tmem(t.tmem_addr, rows_bytes / 2);
                self.mark_busy_tmem(t.tmem_addr + 0x800, rows_bytes / 2);
            }
            // Color index: the palette area is read too
            2 => {
                self.mark_busy_tmem(t.tmem_addr, rows_bytes);
                if t.size == 0 {
                    self.mark_busy_tmem(0x800 + t.pal as i32 * 64, 64);
                }
                if t.size == 1 {
                    self.mark_busy_tmem(0x800, 0x800);
                }
            }
            _ => {}
        }

        if cycle == 0 && tidx < 7 && self.cc_use_tex1() {
            self.use_tile(tidx + 1, 1);
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}
