//! Command stream disassembler.
//!
//! Renders one command (including its extra words) as human-readable text
//! with decoded bit fields and fixed-point values converted to floats. The
//! output format is stable enough to diff captured streams.

use alloc::string::String;
use core::fmt::{self, Write};

use rdp_commands::combine::{CombineCycle, CombineMode};
use rdp_commands::fields::{bit, bits, sbits};
use rdp_commands::ops::Opcode;
use rdp_commands::som::OtherModes;

const FMT_NAMES: [&str; 8] = ["rgba", "yuv", "ci", "ia", "i", "?fmt=5?", "?fmt=6?", "?fmt=7?"];
const SIZE_NAMES: [&str; 4] = ["4", "8", "16", "32"];
const TEXINTERP: [&str; 4] = ["point", "point", "bilinear", "median"];

/// Unsigned fixed point with `frac` fractional bits, as f32.
fn fx(v: u32, frac: u32) -> f32 {
    v as f32 / (1u32 << frac) as f32
}

/// Signed fixed point with `frac` fractional bits, as f32.
fn sfx(v: i32, frac: u32) -> f32 {
    v as f32 / (1u32 << frac) as f32
}

/// Reassemble a coefficient from its split 16-bit halves (s16.16).
fn fx32(hi: u32, lo: u32) -> f32 {
    hi as f32 + lo as f32 / 65536.0
}

/// Number of 64-bit words occupied by the command starting with `word0`.
pub fn disasm_size(word0: u64) -> usize {
    Opcode::from_word(word0).map_or(1, Opcode::word_count)
}

/// Disassemble one command into a string.
pub fn disasm_to_string(addr: u32, words: &[u64]) -> String {
    let mut s = String::new();
    let _ = disasm(addr, words, &mut s);
    s
}

/// Space-joined flag list builder for mode words.
struct FlagJoin(String);

impl FlagJoin {
    fn new() -> Self {
        Self(String::new())
    }

    fn add(&mut self, cond: bool, name: &str) {
        if cond {
            if !self.0.is_empty() {
                self.0.push(' ');
            }
            self.0.push_str(name);
        }
    }
}

fn write_word_prefix(out: &mut dyn Write, addr: u32, w: u64, first: bool) -> fmt::Result {
    if first {
        write!(out, "[{addr:#010x}] {w:016x}    ")
    } else {
        write!(out, "[{addr:#010x}] {w:016x}                     ")
    }
}

/// Disassemble the command starting at `words[0]`; `addr` is its physical
/// address, used only for display. Multi-word commands read the rest of the
/// slice.
pub fn disasm(addr: u32, words: &[u64], out: &mut dyn Write) -> fmt::Result {
    let w0 = words[0];
    write_word_prefix(out, addr, w0, true)?;
    let cmd = bits(w0, 56, 61) as u8;
    match cmd {
        0x00 => writeln!(out, "NOP"),
        0x26 => writeln!(out, "SYNC_LOAD"),
        0x27 => writeln!(out, "SYNC_PIPE"),
        0x28 => writeln!(out, "SYNC_TILE"),
        0x29 => writeln!(out, "SYNC_FULL"),
        0x2A => writeln!(
            out,
            "SET_KEY_GB       WidthG={} CenterG={} ScaleG={}, WidthB={} CenterB={} ScaleB={}",
            bits(w0, 44, 55),
            bits(w0, 24, 31),
            bits(w0, 16, 23),
            bits(w0, 32, 43),
            bits(w0, 8, 15),
            bits(w0, 0, 7)
        ),
        0x2B => writeln!(
            out,
            "SET_KEY_R        WidthR={} CenterR={} ScaleR={}",
            bits(w0, 16, 27),
            bits(w0, 8, 15),
            bits(w0, 0, 7)
        ),
        0x2C => writeln!(
            out,
            "SET_CONVERT      k0={} k1={} k2={} k3={} k4={} k5={}",
            bits(w0, 45, 53),
            bits(w0, 36, 44),
            bits(w0, 27, 35),
            bits(w0, 18, 26),
            bits(w0, 9, 17),
            bits(w0, 0, 8)
        ),
        0x2D => {
            write!(
                out,
                "SET_SCISSOR      xy=({:.2},{:.2})-({:.2},{:.2})",
                fx(bits(w0, 44, 55), 2),
                fx(bits(w0, 32, 43), 2),
                fx(bits(w0, 12, 23), 2),
                fx(bits(w0, 0, 11), 2)
            )?;
            if bit(w0, 25) {
                write!(out, " field={}", if bit(w0, 24) { "odd" } else { "even" })?;
            }
            writeln!(out)
        }
        0x2E => writeln!(
            out,
            "SET_PRIM_DEPTH   z=0x{:x} deltaz=0x{:x}",
            bits(w0, 16, 31),
            bits(w0, 0, 15)
        ),
        0x2F => disasm_set_other_modes(w0, out),
        0x30 => writeln!(
            out,
            "LOAD_TLUT        tile={} palidx=({}-{})",
            bits(w0, 24, 26),
            bits(w0, 44, 55) >> 2,
            bits(w0, 12, 23) >> 2
        ),
        0x31 => match bits(w0, 48, 55) {
            0x01 => writeln!(out, "RDPQ_SHOWLOG     show={}", bits(w0, 0, 0)),
            0x02 => writeln!(out, "RDPQ_MESSAGE     msg=0x{:07x}", bits(w0, 0, 24)),
            _ => writeln!(out, "RDPQ_DEBUG       <unknown>"),
        },
        0x32 | 0x34 => {
            if cmd == 0x32 {
                write!(out, "SET_TILE_SIZE    ")?;
            } else {
                write!(out, "LOAD_TILE        ")?;
            }
            writeln!(
                out,
                "tile={} st=({:.2},{:.2})-({:.2},{:.2})",
                bits(w0, 24, 26),
                fx(bits(w0, 44, 55), 2),
                fx(bits(w0, 32, 43), 2),
                fx(bits(w0, 12, 23), 2),
                fx(bits(w0, 0, 11), 2)
            )
        }
        0x33 => writeln!(
            out,
            "LOAD_BLOCK       tile={} st=({},{}) n={} dxt={:.5}",
            bits(w0, 24, 26),
            bits(w0, 44, 55),
            bits(w0, 32, 43),
            bits(w0, 12, 23) + 1,
            fx(bits(w0, 0, 11), 11)
        ),
        0x35 => {
            let f = bits(w0, 53, 55) as usize;
            write!(
                out,
                "SET_TILE         tile={} {}{} tmem[0x{:x},line={}]",
                bits(w0, 24, 26),
                FMT_NAMES[f],
                SIZE_NAMES[bits(w0, 51, 52) as usize],
                bits(w0, 32, 40) * 8,
                bits(w0, 41, 49) * 8
            )?;
            if f == 2 {
                write!(out, " pal={}", bits(w0, 20, 23))?;
            }
            writeln!(out)
        }
        0x24 | 0x25 => {
            if cmd == 0x24 {
                write!(out, "TEX_RECT         ")?;
            } else {
                write!(out, "TEX_RECT_FLIP    ")?;
            }
            writeln!(
                out,
                "tile={} xy=({:.2},{:.2})-({:.2},{:.2})",
                bits(w0, 24, 26),
                fx(bits(w0, 12, 23), 2),
                fx(bits(w0, 0, 11), 2),
                fx(bits(w0, 44, 55), 2),
                fx(bits(w0, 32, 43), 2)
            )?;
            let w1 = words[1];
            write_word_prefix(out, addr + 8, w1, false)?;
            writeln!(
                out,
                "st=({:.2},{:.2}) dst=({:.5},{:.5})",
                sfx(sbits(w1, 48, 63), 5),
                sfx(sbits(w1, 32, 47), 5),
                sfx(sbits(w1, 16, 31), 10),
                sfx(sbits(w1, 0, 15), 10)
            )
        }
        0x36 => writeln!(
            out,
            "FILL_RECT        xy=({:.2},{:.2})-({:.2},{:.2})",
            fx(bits(w0, 12, 23), 2),
            fx(bits(w0, 0, 11), 2),
            fx(bits(w0, 44, 55), 2),
            fx(bits(w0, 32, 43), 2)
        ),
        0x37 => writeln!(
            out,
            "SET_FILL_COLOR   rgba16=({},{},{},{}) rgba32=({},{},{},{})",
            bits(w0, 11, 15),
            bits(w0, 6, 10),
            bits(w0, 1, 5),
            bits(w0, 0, 0),
            bits(w0, 24, 31),
            bits(w0, 16, 23),
            bits(w0, 8, 15),
            bits(w0, 0, 7)
        ),
        0x38 | 0x39 | 0x3A | 0x3B => {
            let name = match cmd {
                0x38 => "SET_FOG_COLOR  ",
                0x39 => "SET_BLEND_COLOR",
                0x3A => "SET_PRIM_COLOR ",
                _ => "SET_ENV_COLOR  ",
            };
            writeln!(
                out,
                "{name}  rgba32=({},{},{},{})",
                bits(w0, 24, 31),
                bits(w0, 16, 23),
                bits(w0, 8, 15),
                bits(w0, 0, 7)
            )
        }
        0x3C => disasm_set_combine(w0, out),
        0x3D => writeln!(
            out,
            "SET_TEX_IMAGE    dram=0x{:08x} w={} {}{}",
            bits(w0, 0, 25),
            bits(w0, 32, 41) + 1,
            FMT_NAMES[bits(w0, 53, 55) as usize],
            SIZE_NAMES[bits(w0, 51, 52) as usize]
        ),
        0x3E => writeln!(out, "SET_Z_IMAGE      dram=0x{:08x}", bits(w0, 0, 25)),
        0x3F => writeln!(
            out,
            "SET_COLOR_IMAGE  dram=0x{:08x} w={} {}{}",
            bits(w0, 0, 25),
            bits(w0, 32, 41) + 1,
            FMT_NAMES[bits(w0, 53, 55) as usize],
            SIZE_NAMES[bits(w0, 51, 52) as usize]
        ),
        0x08..=0x0F => disasm_triangle(addr, words, out),
        _ => writeln!(out, "???"),
    }
}

fn disasm_set_other_modes(w0: u64, out: &mut dyn Write) -> fmt::Result {
    const ZMODE: [&str; 4] = ["opaque", "inter", "trans", "decal"];
    const RGBDITHER: [&str; 4] = ["square", "bayer", "noise", "none"];
    const ALPHADITHER: [&str; 4] = ["pat", "inv", "noise", "none"];
    const CVGMODE: [&str; 4] = ["clamp", "wrap", "zap", "save"];
    const BLEND_A: [&str; 4] = ["in", "mem", "blend", "fog"];
    const BLEND2_A: [&str; 4] = ["cyc1", "mem", "blend", "fog"];
    const BLEND_B1: [&str; 4] = ["in.a", "fog.a", "shade.a", "0"];
    const BLEND_B1INV: [&str; 4] = ["(1-in.a)", "(1-fog.a)", "(1-shade.a)", "1"];
    const BLEND_B2: [&str; 4] = ["", "mem.a", "1", "0"];

    let som = OtherModes::decode(w0);
    write!(out, "SET_OTHER_MODES  {}", som.cycle_type.name())?;

    let cyc = som.cycle_type.bits();
    if cyc < 2
        && (som.tex_persp
            || som.tex_detail
            || som.tex_sharpen
            || som.tex_lod
            || som.sample_type != 0
            || som.tf_mode != 6)
    {
        let mut f = FlagJoin::new();
        f.add(som.tex_persp, "persp");
        f.add(som.tex_detail, "detail");
        f.add(som.tex_sharpen, "sharpen");
        f.add(som.tex_lod, "lod");
        f.add(som.tf_mode & 4 == 0, "yuv0");
        f.add(
            som.tf_mode & 2 == 0,
            ["yuv1", "yuv1_tex0"][(som.tf_mode & 1) as usize],
        );
        f.add(som.sample_type != 0, TEXINTERP[som.sample_type as usize]);
        write!(out, " tex=[{}]", f.0)?;
    }
    if som.tlut_enable {
        write!(out, " tlut{}", if som.tlut_ia { "=[ia]" } else { "" })?;
    }
    if bits(w0, 16, 31) != 0 {
        let b0 = som.blender[0];
        let b1 = som.blender[1];
        if !b0.is_configured() {
            write!(out, " blend=[<passthrough>, ")?;
        } else {
            write!(
                out,
                " blend=[{}*{} + {}*{}, ",
                BLEND_A[b0.p as usize],
                BLEND_B1[b0.a as usize],
                BLEND_A[b0.q as usize],
                if b0.b != 0 {
                    BLEND_B2[b0.b as usize]
                } else {
                    BLEND_B1INV[b0.a as usize]
                }
            )?;
        }
        write!(
            out,
            "{}*{} + {}*{}]",
            BLEND2_A[b1.p as usize],
            BLEND_B1[b1.a as usize],
            BLEND2_A[b1.q as usize],
            if b1.b != 0 {
                BLEND_B2[b1.b as usize]
            } else {
                BLEND_B1INV[b1.a as usize]
            }
        )?;
    }
    if som.z_write || som.z_compare {
        let mut f = FlagJoin::new();
        f.add(som.z_compare, "cmp");
        f.add(som.z_write, "upd");
        f.add(som.z_prim, "prim");
        f.add(true, ZMODE[som.z_mode as usize]);
        write!(out, " z=[{}]", f.0)?;
    }
    if som.aa {
        write!(out, " aa")?;
    }
    if som.read {
        write!(out, " read")?;
    }
    if som.blend {
        write!(out, " blend")?;
    }
    if som.chroma_key {
        write!(out, " chroma_key")?;
    }
    if som.atomic {
        write!(out, " atomic")?;
    }
    if som.alpha_compare {
        write!(
            out,
            " alpha_compare{}",
            if som.alpha_compare_dither { "[dither]" } else { "" }
        )?;
    }
    if cyc < 2 && (som.rgb_dither != 3 || som.alpha_dither != 3) {
        write!(
            out,
            " dither=[{},{}]",
            RGBDITHER[som.rgb_dither as usize], ALPHADITHER[som.alpha_dither as usize]
        )?;
    }
    if som.cvg_mode != 0 || som.cvg_color || som.cvg_sel_alpha || som.cvg_mul_alpha {
        let mut f = FlagJoin::new();
        f.add(som.cvg_mode != 0, CVGMODE[som.cvg_mode as usize]);
        f.add(som.cvg_color, "color_ovf");
        f.add(som.cvg_mul_alpha, "mul_alpha");
        f.add(som.cvg_sel_alpha, "sel_alpha");
        write!(out, " cvg=[{}]", f.0)?;
    }
    writeln!(out)
}

fn disasm_set_combine(w0: u64, out: &mut dyn Write) -> fmt::Result {
    const RGB_SUBA: [&str; 16] = [
        "comb", "tex0", "tex1", "prim", "shade", "env", "1", "noise", "0", "0", "0", "0", "0",
        "0", "0", "0",
    ];
    const RGB_SUBB: [&str; 16] = [
        "comb", "tex0", "tex1", "prim", "shade", "env", "keycenter", "k4", "0", "0", "0", "0",
        "0", "0", "0", "0",
    ];
    const RGB_MUL: [&str; 32] = [
        "comb",
        "tex0",
        "tex1",
        "prim",
        "shade",
        "env",
        "keyscale",
        "comb.a",
        "tex0.a",
        "tex1.a",
        "prim.a",
        "shade.a",
        "env.a",
        "lod_frac",
        "prim_lod_frac",
        "k5",
        "0",
        "0",
        "0",
        "0",
        "0",
        "0",
        "0",
        "0",
        "0",
        "0",
        "0",
        "0",
        "0",
        "0",
        "0",
        "0",
    ];
    const RGB_ADD: [&str; 8] = ["comb", "tex0", "tex1", "prim", "shade", "env", "1", "0"];
    const ALPHA_ADDSUB: [&str; 8] = ["comb", "tex0", "tex1", "prim", "shade", "env", "1", "0"];
    const ALPHA_MUL: [&str; 8] = [
        "lod_frac",
        "tex0",
        "tex1",
        "prim",
        "shade",
        "env",
        "prim_lod_frac",
        "0",
    ];

    let cc = CombineMode::decode(w0);
    let c0 = cc.cyc[0];
    let c1 = cc.cyc[1];
    write!(
        out,
        "SET_COMBINE_MODE cyc0=[({}-{})*{}+{}, ({}-{})*{}+{}], ",
        RGB_SUBA[c0.rgb_sub_a as usize],
        RGB_SUBB[c0.rgb_sub_b as usize],
        RGB_MUL[c0.rgb_mul as usize],
        RGB_ADD[c0.rgb_add as usize],
        ALPHA_ADDSUB[c0.alpha_sub_a as usize],
        ALPHA_ADDSUB[c0.alpha_sub_b as usize],
        ALPHA_MUL[c0.alpha_mul as usize],
        ALPHA_ADDSUB[c0.alpha_add as usize]
    )?;
    if c1 == CombineCycle::default() {
        writeln!(out, "cyc1=[<passthrough>]")
    } else {
        writeln!(
            out,
            "cyc1=[({}-{})*{}+{}, ({}-{})*{}+{}]",
            RGB_SUBA[c1.rgb_sub_a as usize],
            RGB_SUBB[c1.rgb_sub_b as usize],
            RGB_MUL[c1.rgb_mul as usize],
            RGB_ADD[c1.rgb_add as usize],
            ALPHA_ADDSUB[c1.alpha_sub_a as usize],
            ALPHA_ADDSUB[c1.alpha_sub_b as usize],
            ALPHA_MUL[c1.alpha_mul as usize],
            ALPHA_ADDSUB[c1.alpha_add as usize]
        )
    }
}

fn disasm_triangle(addr: u32, words: &[u64], out: &mut dyn Write) -> fmt::Result {
    const NAMES: [&str; 8] = [
        "TRI              ",
        "TRI_Z            ",
        "TRI_TEX          ",
        "TRI_TEX_Z        ",
        "TRI_SHADE        ",
        "TRI_SHADE_Z      ",
        "TRI_TEX_SHADE    ",
        "TRI_TEX_SHADE_Z  ",
    ];
    let w0 = words[0];
    let cmd = (bits(w0, 56, 61) - 0x8) as usize;
    write!(out, "{}", NAMES[cmd])?;
    writeln!(
        out,
        "{} tile={} lvl={} y=({:.2}, {:.2}, {:.2})",
        if bit(w0, 55) { "left" } else { "right" },
        bits(w0, 48, 50),
        bits(w0, 51, 53) + 1,
        sfx(sbits(w0, 32, 45), 2),
        sfx(sbits(w0, 16, 29), 2),
        sfx(sbits(w0, 0, 13), 2)
    )?;
    let word_at = |i: usize| words[i];
    let waddr = |i: usize| addr + (i as u32) * 8;
    for (i, names) in [(1usize, ["xl", "dxld"]), (2, ["xh", "dxhd"]), (3, ["xm", "dxmd"])] {
        let w = word_at(i);
        write_word_prefix(out, waddr(i), w, false)?;
        writeln!(
            out,
            "{}={:.4} {}={:.4}",
            names[0],
            sfx(sbits(w, 32, 63), 16),
            names[1],
            sfx(sbits(w, 0, 31), 16)
        )?;
    }

    let mut i = 4;
    if cmd & 0x4 != 0 {
        i = disasm_attr_block(addr, words, i, &["r", "g", "b", "a"], out)?;
    }
    if cmd & 0x2 != 0 {
        i = disasm_attr_block(addr, words, i, &["s", "t", "w"], out)?;
    }
    if cmd & 0x1 != 0 {
        let w = word_at(i);
        write_word_prefix(out, waddr(i), w, false)?;
        writeln!(
            out,
            "z={:.5} dzdx={:.5}",
            fx32(bits(w, 48, 63), bits(w, 32, 47)),
            fx32(bits(w, 16, 31), bits(w, 0, 15))
        )?;
        let w = word_at(i + 1);
        write_word_prefix(out, waddr(i + 1), w, false)?;
        writeln!(
            out,
            "dzde={:.5} dzdy={:.5}",
            fx32(bits(w, 48, 63), bits(w, 32, 47)),
            fx32(bits(w, 16, 31), bits(w, 0, 15))
        )?;
    }
    Ok(())
}

/// Print one 8-word attribute block (shade or texture). Each coefficient's
/// integer word pairs with the fraction word two rows below it; the
/// fraction-only rows print bare.
fn disasm_attr_block(
    addr: u32,
    words: &[u64],
    start: usize,
    channels: &[&str],
    out: &mut dyn Write,
) -> Result<usize, fmt::Error> {
    let mut i = start;
    for row in 0..8 {
        let w = words[i];
        write_word_prefix(out, addr + (i as u32) * 8, w, false)?;
        // Row layout: 0 = value, 1 = DDx, 4 = DDe, 5 = DDy; rows 2-3 and 6-7
        // hold the fraction halves of the two rows above them.
        let decoded: Option<(&str, &str)> = match row {
            0 => Some(("", "")),
            1 => Some(("d", "dx")),
            4 => Some(("d", "de")),
            5 => Some(("d", "dy")),
            _ => None,
        };
        if let Some((pre, post)) = decoded {
            let frac = words[i + 2];
            for (ch, name) in channels.iter().enumerate() {
                let lo = 48 - (ch as u32) * 16;
                let v = fx32(bits(w, lo, lo + 15), bits(frac, lo, lo + 15));
                let sep = if ch == 0 { "" } else { " " };
                write!(out, "{sep}{pre}{name}{post}={v:.5}")?;
            }
        }
        writeln!(out)?;
        i += 1;
    }
    Ok(i)
}
