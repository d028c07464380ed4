//! Command-word definitions, re-exported from the `rdp-commands` crate
//! (single source of truth).

pub use rdp_commands::*;
