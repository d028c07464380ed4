//! RDP command-word definitions.
//!
//! The RDP consumes a stream of 64-bit big-endian command words; the top six
//! bits (bits 56-61) select the opcode. This crate is the single source of
//! truth for opcode numbers, per-opcode word counts, bit-field extraction and
//! insertion, the SET_OTHER_MODES layout, the color combiner encoding, and
//! color packing. Everything here is pure and allocation-free.

#![no_std]

pub mod color;
pub mod combine;
pub mod fields;
pub mod ops;
pub mod som;

pub use color::Color;
pub use combine::{CombineCycle, CombineMode};
pub use fields::{bit, bits, field, sbits, truncate_s11_2};
pub use ops::Opcode;
pub use som::{CycleType, OtherModes};
