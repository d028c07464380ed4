//! Ring of submitted command spans awaiting validation/disassembly.
//!
//! The platform records every physical range handed to the RDP; the debug
//! loop drains the ring and walks the commands. Submissions usually arrive
//! as a range that only grew since last time, so spans coalesce by start
//! address. When the ring overflows the oldest span is dropped: losing old
//! history beats losing the commands closest to a hang.

use rdp_commands::fields::{bit, bits};

/// Capacity of the span ring.
pub const TRACE_SPANS: usize = 12;

/// One submitted physical byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

/// Span ring plus the nesting counter of the in-stream `show-log` toggle.
pub struct Tracer {
    spans: heapless::Deque<Span, TRACE_SPANS>,
    show_log: i32,
}

impl Tracer {
    pub fn new() -> Self {
        Self {
            spans: heapless::Deque::new(),
            show_log: 0,
        }
    }

    /// Record a submitted range, coalescing a re-submission that extends the
    /// previous span.
    pub fn record(&mut self, start: u32, end: u32) {
        if start == end {
            return;
        }
        if start > end {
            log::error!("rdpq trace: invalid span {start:#010x}-{end:#010x}");
            return;
        }
        if let Some(last) = self.spans.back_mut() {
            if last.start == start {
                if end < last.end {
                    log::error!(
                        "rdpq trace: span shrinking ({:#010x}-{:#010x} => {:#010x}-{:#010x})",
                        last.start,
                        last.end,
                        start,
                        end
                    );
                }
                last.end = end;
                return;
            }
        }
        if self.spans.is_full() {
            if let Some(dropped) = self.spans.pop_front() {
                log::warn!(
                    "rdpq trace: ring full, dropping {} bytes",
                    dropped.end - dropped.start
                );
            }
        }
        let _ = self.spans.push_back(Span { start, end });
    }

    /// Take the oldest pending span.
    pub fn pop(&mut self) -> Option<Span> {
        self.spans.pop_front()
    }

    /// Apply an in-stream debug command (opcode 0x31). Subcode 0x01 nests
    /// the show-log toggle; subcode 0x02 is a message marker handled by the
    /// disassembler.
    pub fn apply_debug_command(&mut self, w0: u64) {
        if bits(w0, 48, 55) == 0x01 {
            self.show_log += if bit(w0, 0) { 1 } else { -1 };
        }
    }

    /// True while the in-stream toggle holds the log open.
    pub fn log_enabled(&self) -> bool {
        self.show_log > 0
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new()
    }
}
