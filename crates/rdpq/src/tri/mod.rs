//! Triangle coefficient computer.
//!
//! The RDP does not take vertices: it takes the rasterization coefficients
//! directly, edge slopes in s16.16 plus one initial-value/slope block per
//! interpolated attribute. This module converts three screen-space vertices
//! into that exact binary layout.
//!
//! Coefficient words pair two attributes each, and every coefficient's high
//! and low 16 bits land in *different* 64-bit words two apart, matching the
//! hardware register file. The low three bits of the opcode say which
//! attribute blocks follow the edges (shade / texture / Z).

use glam::Vec2;
use libm::{fabsf, floorf};

use rdp_commands::fields::truncate_s11_2;
use rdp_commands::ops::{triangle_opcode, Opcode, TRI_ATTR_SHADE, TRI_ATTR_TEX, TRI_ATTR_Z};

use crate::math::fixed::float_to_s16_16;
use crate::queue::MAX_COMMAND_WORDS;

/// Where each attribute sub-array lives inside a vertex slice.
///
/// `pos` points at `[x, y]`; `shade` at `[r, g, b, a]` (0-255 range);
/// `tex` at `[s, t, w]`; `z` at `[z]`. The optional attributes select the
/// triangle variant to emit.
#[derive(Debug, Clone, Copy)]
pub struct VertexLayout {
    pub pos: usize,
    pub shade: Option<usize>,
    pub tex: Option<usize>,
    pub z: Option<usize>,
}

impl VertexLayout {
    /// A flat (edges-only) triangle with positions at `pos`.
    pub const fn pos(pos: usize) -> Self {
        Self {
            pos,
            shade: None,
            tex: None,
            z: None,
        }
    }

    pub const fn with_shade(mut self, offset: usize) -> Self {
        self.shade = Some(offset);
        self
    }

    pub const fn with_tex(mut self, offset: usize) -> Self {
        self.tex = Some(offset);
        self
    }

    pub const fn with_z(mut self, offset: usize) -> Self {
        self.z = Some(offset);
        self
    }
}

/// Encoded triangle command, at most [`MAX_COMMAND_WORDS`] words.
pub(crate) struct TriangleWords {
    words: [u32; MAX_COMMAND_WORDS],
    len: usize,
}

impl TriangleWords {
    fn push(&mut self, w: u32) {
        self.words[self.len] = w;
        self.len += 1;
    }

    fn push_i(&mut self, w: i32) {
        self.push(w as u32);
    }

    pub(crate) fn as_words(&self) -> &[u32] {
        &self.words[..self.len]
    }
}

/// Edge deltas shared by all attribute blocks.
struct EdgeData {
    /// High edge: top vertex to bottom vertex.
    h: Vec2,
    /// Middle edge: top vertex to mid vertex.
    m: Vec2,
    /// Sub-pixel Y correction from the top vertex to its snap line.
    fy: f32,
    /// Inverse slope of the high edge.
    ish: f32,
    /// `-1 / cross(h, m)`; zero for degenerate triangles.
    attr_factor: f32,
}

/// Compute the full coefficient block for one triangle.
pub(crate) fn compute(
    tile: u8,
    levels: u8,
    layout: &VertexLayout,
    v1: &[f32],
    v2: &[f32],
    v3: &[f32],
) -> TriangleWords {
    let mut attrs = 0u8;
    if layout.shade.is_some() {
        attrs |= TRI_ATTR_SHADE;
    }
    if layout.tex.is_some() {
        attrs |= TRI_ATTR_TEX;
    }
    if layout.z.is_some() {
        attrs |= TRI_ATTR_Z;
    }
    let op = triangle_opcode(attrs);

    // Sort so y1 <= y2 <= y3 on the Y values the hardware will actually see,
    // i.e. after 10.2 quantization. Raw-float comparisons can disagree with
    // the quantized order for sub-quarter-pixel differences.
    let yq = |v: &[f32]| floorf(v[layout.pos + 1] * 4.0) as i32;
    let (mut a, mut b, mut c) = (v1, v2, v3);
    if yq(a) > yq(b) {
        core::mem::swap(&mut a, &mut b);
    }
    if yq(b) > yq(c) {
        core::mem::swap(&mut b, &mut c);
    }
    if yq(a) > yq(b) {
        core::mem::swap(&mut a, &mut b);
    }

    let mut out = TriangleWords {
        words: [0; MAX_COMMAND_WORDS],
        len: 0,
    };
    let data = edge_coeffs(
        &mut out,
        op,
        tile,
        levels,
        &a[layout.pos..],
        &b[layout.pos..],
        &c[layout.pos..],
    );
    if let Some(off) = layout.shade {
        shade_coeffs(&mut out, &data, &a[off..], &b[off..], &c[off..]);
    }
    if let Some(off) = layout.tex {
        tex_coeffs(&mut out, &data, &a[off..], &b[off..], &c[off..]);
    }
    if let Some(off) = layout.z {
        z_coeffs(&mut out, &data, &a[off..], &b[off..], &c[off..]);
    }
    out
}

fn edge_coeffs(
    out: &mut TriangleWords,
    op: Opcode,
    tile: u8,
    levels: u8,
    v1: &[f32],
    v2: &[f32],
    v3: &[f32],
) -> EdgeData {
    let x1 = v1[0];
    let x2 = v2[0];
    let x3 = v3[0];
    let y1 = floorf(v1[1] * 4.0) / 4.0;
    let y2 = floorf(v2[1] * 4.0) / 4.0;
    let y3 = floorf(v3[1] * 4.0) / 4.0;

    let y1f = truncate_s11_2(floorf(v1[1] * 4.0) as i32);
    let y2f = truncate_s11_2(floorf(v2[1] * 4.0) as i32);
    let y3f = truncate_s11_2(floorf(v3[1] * 4.0) as i32);

    let h = Vec2::new(x3 - x1, y3 - y1);
    let m = Vec2::new(x2 - x1, y2 - y1);
    let l = Vec2::new(x3 - x2, y3 - y2);

    // cross(h, m): its sign picks the major edge side; zero or denormal
    // means a degenerate triangle, which must not become a division trap.
    let nz = h.perp_dot(m);
    let attr_factor = if fabsf(nz) > f32::MIN_POSITIVE {
        -1.0 / nz
    } else {
        0.0
    };
    let lft = (nz < 0.0) as u32;

    let ish = if fabsf(h.y) > f32::MIN_POSITIVE {
        h.x / h.y
    } else {
        0.0
    };
    let ism = if fabsf(m.y) > f32::MIN_POSITIVE {
        m.x / m.y
    } else {
        0.0
    };
    let isl = if fabsf(l.y) > f32::MIN_POSITIVE {
        l.x / l.y
    } else {
        0.0
    };
    let fy = floorf(y1) - y1;

    let xh = x1 + fy * ish;
    let xm = x1 + fy * ism;
    let xl = x2;

    out.push(op.word_hi(
        (lft & 1) << 23
            | ((levels as u32 & 7) << 19)
            | ((tile as u32 & 7) << 16)
            | (y3f as u32 & 0x3FFF),
    ));
    out.push(((y2f as u32 & 0x3FFF) << 16) | (y1f as u32 & 0x3FFF));
    out.push_i(float_to_s16_16(xl));
    out.push_i(float_to_s16_16(isl));
    out.push_i(float_to_s16_16(xh));
    out.push_i(float_to_s16_16(ish));
    out.push_i(float_to_s16_16(xm));
    out.push_i(float_to_s16_16(ism));

    EdgeData {
        h,
        m,
        fy,
        ish,
        attr_factor,
    }
}

/// High halves of two coefficients packed into one word.
fn hi_pair(a: i32, b: i32) -> u32 {
    (a as u32 & 0xFFFF_0000) | ((b as u32 >> 16) & 0xFFFF)
}

/// Low halves of two coefficients packed into one word.
fn lo_pair(a: i32, b: i32) -> u32 {
    ((a as u32) << 16) | (b as u32 & 0xFFFF)
}

/// Per-attribute slope set: initial value, DDx, DDe (along the high edge)
/// and DDy, each in s16.16.
struct AttrSlopes<const N: usize> {
    fin: [i32; N],
    dx: [i32; N],
    de: [i32; N],
    dy: [i32; N],
}

fn attr_slopes<const N: usize>(d: &EdgeData, v1: &[f32], v2: &[f32], v3: &[f32]) -> AttrSlopes<N> {
    let mut s = AttrSlopes {
        fin: [0; N],
        dx: [0; N],
        de: [0; N],
        dy: [0; N],
    };
    for ch in 0..N {
        let mv = v2[ch] - v1[ch];
        let hv = v3[ch] - v1[ch];
        let nx = d.h.y * mv - d.m.y * hv;
        let ny = d.m.x * hv - d.h.x * mv;
        let ddx = nx * d.attr_factor;
        let ddy = ny * d.attr_factor;
        let dde = ddy + ddx * d.ish;
        s.fin[ch] = float_to_s16_16(v1[ch] + d.fy * dde);
        s.dx[ch] = float_to_s16_16(ddx);
        s.de[ch] = float_to_s16_16(dde);
        s.dy[ch] = float_to_s16_16(ddy);
    }
    s
}

fn shade_coeffs(out: &mut TriangleWords, d: &EdgeData, v1: &[f32], v2: &[f32], v3: &[f32]) {
    let s: AttrSlopes<4> = attr_slopes(d, v1, v2, v3);
    out.push(hi_pair(s.fin[0], s.fin[1]));
    out.push(hi_pair(s.fin[2], s.fin[3]));
    out.push(hi_pair(s.dx[0], s.dx[1]));
    out.push(hi_pair(s.dx[2], s.dx[3]));
    out.push(lo_pair(s.fin[0], s.fin[1]));
    out.push(lo_pair(s.fin[2], s.fin[3]));
    out.push(lo_pair(s.dx[0], s.dx[1]));
    out.push(lo_pair(s.dx[2], s.dx[3]));
    out.push(hi_pair(s.de[0], s.de[1]));
    out.push(hi_pair(s.de[2], s.de[3]));
    out.push(hi_pair(s.dy[0], s.dy[1]));
    out.push(hi_pair(s.dy[2], s.dy[3]));
    out.push(lo_pair(s.de[0], s.de[1]));
    out.push(lo_pair(s.de[2], s.de[3]));
    out.push(lo_pair(s.dy[0], s.dy[1]));
    out.push(lo_pair(s.dy[2], s.dy[3]));
}

fn tex_coeffs(out: &mut TriangleWords, d: &EdgeData, v1: &[f32], v2: &[f32], v3: &[f32]) {
    // Normalize W into [-1, 1] by the largest W of the three vertices, then
    // scale the W channel itself to the hardware's 0x7FFF range. S and T are
    // premultiplied by the normalized 1/W for perspective correction.
    let w_factor = 1.0 / v1[2].max(v2[2]).max(v3[2]);
    let prep = |v: &[f32]| {
        let w = v[2] * w_factor;
        [v[0] * w, v[1] * w, w * 0x7FFF as f32]
    };
    let p1 = prep(v1);
    let p2 = prep(v2);
    let p3 = prep(v3);

    let s: AttrSlopes<3> = attr_slopes(d, &p1, &p2, &p3);
    out.push(hi_pair(s.fin[0], s.fin[1]));
    out.push(hi_pair(s.fin[2], 0));
    out.push(hi_pair(s.dx[0], s.dx[1]));
    out.push(hi_pair(s.dx[2], 0));
    out.push(lo_pair(s.fin[0], s.fin[1]));
    out.push(lo_pair(s.fin[2], 0));
    out.push(lo_pair(s.dx[0], s.dx[1]));
    out.push(lo_pair(s.dx[2], 0));
    out.push(hi_pair(s.de[0], s.de[1]));
    out.push(hi_pair(s.de[2], 0));
    out.push(hi_pair(s.dy[0], s.dy[1]));
    out.push(hi_pair(s.dy[2], 0));
    out.push(lo_pair(s.de[0], s.de[1]));
    out.push(lo_pair(s.de[2], 0));
    out.push(lo_pair(s.dy[0], s.dy[1]));
    out.push(lo_pair(s.dy[2], 0));
}

fn z_coeffs(out: &mut TriangleWords, d: &EdgeData, v1: &[f32], v2: &[f32], v3: &[f32]) {
    let s: AttrSlopes<1> = attr_slopes(d, v1, v2, v3);
    out.push_i(s.fin[0]);
    out.push_i(s.dx[0]);
    out.push_i(s.de[0]);
    out.push_i(s.dy[0]);
}
