//! Stream debugging: disassembler, semantic validator, trace ring.
//!
//! Everything here is observational. The validator mirrors the hardware
//! state as commands flow past and reports findings; it never rewrites the
//! stream and never blocks a submission.

pub mod disasm;
pub mod trace;
pub mod validate;

pub use disasm::{disasm, disasm_size, disasm_to_string};
pub use trace::{Span, Tracer};
pub use validate::{Finding, Severity, Validator};
