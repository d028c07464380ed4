//! SET_OTHER_MODES: the 64-bit pipeline mode-control word.

use crate::fields::{bit, bits};

/// Freeze primitive rendering until the current one retires.
pub const SOM_ATOMIC_PRIM: u64 = 1 << 55;

/// Perspective-correct texture sampling.
pub const SOM_TEX_PERSP: u64 = 1 << 51;
/// Detail texture mode (requires LOD).
pub const SOM_TEX_DETAIL: u64 = 1 << 50;
/// Sharpen texture mode (requires LOD).
pub const SOM_TEX_SHARPEN: u64 = 1 << 49;
/// Per-pixel LOD computation.
pub const SOM_TEX_LOD: u64 = 1 << 48;

/// Palette lookup through the TLUT.
pub const SOM_TLUT_ENABLE: u64 = 1 << 47;
/// TLUT entries are IA16 instead of RGBA16.
pub const SOM_TLUT_IA: u64 = 1 << 46;

/// Bilinear sampling (sample-type field, bits 44-45).
pub const SOM_SAMPLE_BILINEAR: u64 = 2 << 44;
/// Median-of-four sampling.
pub const SOM_SAMPLE_MEDIAN: u64 = 3 << 44;

/// Texture-filter mode field (bits 41-43); 6 = RGB in both cycles.
pub const SOM_TF_SHIFT: u32 = 41;
/// Both cycles sample RGB textures (the common configuration).
pub const SOM_TF0_RGB_TF1_RGB: u64 = 6 << 41;

/// Chroma-key comparison.
pub const SOM_CHROMA_KEY: u64 = 1 << 40;

/// RGB dither field (bits 38-39); 3 = none.
pub const SOM_RGBDITHER_NONE: u64 = 3 << 38;
/// Alpha dither field (bits 36-37); 3 = none.
pub const SOM_ALPHADITHER_NONE: u64 = 3 << 36;

/// Enable the blender stage.
pub const SOM_BLENDING: u64 = 1 << 14;
/// Framebuffer read-modify-write.
pub const SOM_READ_ENABLE: u64 = 1 << 6;
/// Coverage-based antialiasing.
pub const SOM_AA_ENABLE: u64 = 1 << 3;

/// Z-buffer compare on draw.
pub const SOM_Z_COMPARE: u64 = 1 << 4;
/// Z-buffer update on draw.
pub const SOM_Z_WRITE: u64 = 1 << 5;
/// Take Z from SET_PRIM_DEPTH instead of per-pixel interpolation.
pub const SOM_Z_SOURCE_PRIM: u64 = 1 << 2;

/// Alpha-compare against blend alpha.
pub const SOM_ALPHA_COMPARE: u64 = 1 << 0;
/// Dither the alpha-compare threshold.
pub const SOM_ALPHA_COMPARE_DITHER: u64 = 1 << 1;

/// Pipeline cycle type (bits 52-53).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CycleType {
    /// One combiner/blender pass per pixel.
    One = 0,
    /// Two chained passes per pixel.
    Two = 1,
    /// TMEM-to-framebuffer copy, four texels per clock.
    Copy = 2,
    /// Constant fill, four pixels per clock.
    Fill = 3,
}

impl CycleType {
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 3 {
            0 => Self::One,
            1 => Self::Two,
            2 => Self::Copy,
            _ => Self::Fill,
        }
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// The SET_OTHER_MODES bits selecting this cycle type.
    #[must_use]
    pub const fn som(self) -> u64 {
        (self as u64) << 52
    }

    /// True for the copy and fill cycle types, where the combiner and
    /// blender do not run.
    #[must_use]
    pub const fn is_bypass(self) -> bool {
        (self as u8) >= 2
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::One => "1cyc",
            Self::Two => "2cyc",
            Self::Copy => "copy",
            Self::Fill => "fill",
        }
    }
}

/// One blender stage: `(P * A + Q * B)`, selector fields only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlenderStage {
    pub p: u8,
    pub a: u8,
    pub q: u8,
    pub b: u8,
}

impl BlenderStage {
    /// True if any selector is nonzero, i.e. a formula has been configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.p != 0 || self.a != 0 || self.q != 0 || self.b != 0
    }
}

/// Decoded view of a SET_OTHER_MODES word.
///
/// Field positions match the hardware layout; see `decode` for the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtherModes {
    pub atomic: bool,
    pub cycle_type: CycleType,
    pub tex_persp: bool,
    pub tex_detail: bool,
    pub tex_sharpen: bool,
    pub tex_lod: bool,
    pub tlut_enable: bool,
    pub tlut_ia: bool,
    /// Sample type: 0 = point, 2 = bilinear, 3 = median.
    pub sample_type: u8,
    /// Texture-filter mode (YUV conversion steering), 3 bits.
    pub tf_mode: u8,
    pub chroma_key: bool,
    pub rgb_dither: u8,
    pub alpha_dither: u8,
    pub blender: [BlenderStage; 2],
    pub blend: bool,
    pub read: bool,
    pub aa: bool,
    pub cvg_mode: u8,
    pub cvg_color: bool,
    pub cvg_mul_alpha: bool,
    pub cvg_sel_alpha: bool,
    pub z_mode: u8,
    pub z_write: bool,
    pub z_compare: bool,
    pub z_prim: bool,
    pub alpha_compare: bool,
    pub alpha_compare_dither: bool,
}

impl OtherModes {
    /// Decode a raw SET_OTHER_MODES word.
    #[must_use]
    pub fn decode(w: u64) -> Self {
        Self {
            atomic: bit(w, 55),
            cycle_type: CycleType::from_bits(bits(w, 52, 53) as u8),
            tex_persp: bit(w, 51),
            tex_detail: bit(w, 50),
            tex_sharpen: bit(w, 49),
            tex_lod: bit(w, 48),
            tlut_enable: bit(w, 47),
            tlut_ia: bit(w, 46),
            sample_type: bits(w, 44, 45) as u8,
            tf_mode: bits(w, 41, 43) as u8,
            chroma_key: bit(w, 40),
            rgb_dither: bits(w, 38, 39) as u8,
            alpha_dither: bits(w, 36, 37) as u8,
            blender: [
                BlenderStage {
                    p: bits(w, 30, 31) as u8,
                    a: bits(w, 26, 27) as u8,
                    q: bits(w, 22, 23) as u8,
                    b: bits(w, 18, 19) as u8,
                },
                BlenderStage {
                    p: bits(w, 28, 29) as u8,
                    a: bits(w, 24, 25) as u8,
                    q: bits(w, 20, 21) as u8,
                    b: bits(w, 16, 17) as u8,
                },
            ],
            blend: bit(w, 14),
            read: bit(w, 6),
            aa: bit(w, 3),
            cvg_mode: bits(w, 8, 9) as u8,
            cvg_color: bit(w, 7),
            cvg_mul_alpha: bit(w, 12),
            cvg_sel_alpha: bit(w, 13),
            z_mode: bits(w, 10, 11) as u8,
            z_write: bit(w, 5),
            z_compare: bit(w, 4),
            z_prim: bit(w, 2),
            alpha_compare: bit(w, 0),
            alpha_compare_dither: bit(w, 1),
        }
    }
}

impl Default for OtherModes {
    fn default() -> Self {
        Self::decode(0)
    }
}
