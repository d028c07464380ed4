//! Command queue for the RDP, the fixed-function rasterization coprocessor.
//!
//! The RDP consumes a linear stream of 64-bit command words and draws pixels.
//! This crate builds those streams: typed operations are encoded into command
//! words and routed either to the command processor's live dynamic stream or
//! into a recorded, replayable block. Along the way the auto-sync engine
//! tracks which hardware resources are in flight and injects the `SYNC_*`
//! barriers the pipeline needs; without them, reconfiguring a busy resource
//! corrupts pixels that are still being drawn.
//!
//! The crate is platform-agnostic: all hardware access goes through the
//! [`rdpq_hal`] traits, so the whole queue runs unmodified against a mock
//! transport in tests.
//!
//! The [`debug`] module carries an independent validator that disassembles a
//! captured stream and checks it against a shadow model of the hardware
//! state, flagging undefined or dubious command combinations.

#![no_std]

extern crate alloc;

pub mod cmd;
pub mod debug;
pub mod math;
pub mod queue;
pub mod tri;

pub use queue::{Block, Config, RdpQueue, RdpqError, SyncResources};
pub use tri::VertexLayout;
