//! Fixed-point conversion helpers for RDP command formats.
//!
//! The RDP uses several fixed-point encodings:
//! - s16.16 for edge slopes and shade/texture/Z coefficients
//! - 10.2 for screen coordinates (scissor, rectangles, triangle Y)
//! - s10.5 for texture rectangle S/T
//! - s5.10 for texture rectangle per-pixel deltas
//!
//! All conversions round toward negative infinity, matching the hardware's
//! interpretation of the bit patterns.

use libm::floorf;

/// Convert f32 to s16.16 fixed point.
///
/// Rounds toward negative infinity and saturates: anything at or above
/// 32768.0 becomes 0x7FFFFFFF, anything below -32768.0 becomes 0x80000000.
/// Monotone over the representable range.
pub fn float_to_s16_16(f: f32) -> i32 {
    if f >= 32768.0 {
        return 0x7FFF_FFFF;
    }
    if f < -32768.0 {
        return i32::MIN;
    }
    floorf(f * 65536.0) as i32
}

/// Convert f32 to 10.2 fixed point (quarter-pixel screen coordinates).
pub fn float_to_10_2(v: f32) -> i32 {
    floorf(v * 4.0) as i32
}

/// Convert f32 to s10.5 fixed point (texture rectangle S/T).
pub fn float_to_s10_5(v: f32) -> i32 {
    floorf(v * 32.0) as i32
}

/// Convert f32 to s5.10 fixed point (texture rectangle DsDx/DtDy).
pub fn float_to_s5_10(v: f32) -> i32 {
    floorf(v * 1024.0) as i32
}

/// Convert an s16.16 pair (high and low 16 bits) back to f32, for
/// disassembly output.
pub fn s16_16_to_float(hi: u32, lo: u32) -> f32 {
    hi as i16 as f32 + lo as u16 as f32 / 65536.0
}
