//! Mock command processor + arena shared by the integration tests.
//!
//! Implements both hal traits over one shared store (clone handles around
//! `Rc<RefCell<..>>`), and executes the CP's side of the contract faithfully
//! enough to resolve every submitted physical range back to bytes: plain
//! commands are forwarded, fixup commands derive their final words from the
//! shadow state, block mode records entries and replays them. That is what
//! lets tests compare full RDP streams byte for byte between dynamic and
//! recorded execution.

use std::cell::RefCell;
use std::rc::Rc;

use rdpq_hal::{
    BufferId, CommandArena, CpCommand, CpShadowState, CpTransport, FixupOp, SubmitToken,
};

/// One recorded CP-stream entry.
#[derive(Clone, Debug)]
pub enum Entry {
    Rdp(Vec<u32>),
    Fixup(FixupOp, Vec<u32>),
    FixupToBlock(FixupOp, Vec<u32>),
    Submit { token: u32, start: u32, end: u32 },
}

#[derive(Debug)]
pub struct MockError;

/// Fixup working state, mirroring the CP's shared memory block.
struct State {
    last_sync_full: u64,
    other_modes: u64,
    scissor: [u32; 2],
    fill_color: u32,
    target_bitdepth: u8,
}

impl Default for State {
    fn default() -> Self {
        Self {
            last_sync_full: 0,
            other_modes: 0,
            // One subpixel of right-edge slack so the fill/copy adjustment
            // cannot underflow before the first real scissor arrives.
            scissor: [0x2D00_0000, 1 << 12],
            fill_color: 0,
            target_bitdepth: 0,
        }
    }
}

#[derive(Default)]
struct Inner {
    // Arena
    buffers: Vec<Option<Vec<u32>>>,
    phys_base: Vec<u32>,
    next_phys: u32,
    alloc_sizes: Vec<usize>,
    freed: Vec<u32>,
    // CP
    recording: Option<Vec<Entry>>,
    next_token: u32,
    rdp_stream: Vec<u32>,
    dyn_words: Vec<u32>,
    submits: Vec<(u32, u32)>,
    dp_end: u32,
    state: State,
    sync_full_status: bool,
    idle_waits: u32,
    events: Vec<String>,
}

impl Inner {
    fn buf_at(&self, phys: u32) -> Option<(usize, usize)> {
        for (i, base) in self.phys_base.iter().enumerate() {
            if let Some(buf) = &self.buffers[i] {
                let len_bytes = (buf.len() * 4) as u32;
                if phys >= *base && phys < *base + len_bytes {
                    return Some((i, ((phys - base) / 4) as usize));
                }
            }
        }
        None
    }

    fn read_phys(&self, start: u32, end: u32) -> Vec<u32> {
        if start == end {
            return Vec::new();
        }
        let (bi, off) = self.buf_at(start).expect("submit range outside arena");
        let n = ((end - start) / 4) as usize;
        self.buffers[bi].as_ref().unwrap()[off..off + n].to_vec()
    }

    fn write_phys(&mut self, start: u32, words: &[u32]) {
        let (bi, off) = self.buf_at(start).expect("fixup output outside arena");
        self.buffers[bi].as_mut().unwrap()[off..off + words.len()].copy_from_slice(words);
    }

    fn cycle_type(&self) -> u32 {
        ((self.state.other_modes >> 52) & 3) as u32
    }

    /// Current scissor command, with the right edge pulled in one subpixel
    /// in fill/copy cycle types.
    fn emit_scissor(&self) -> Vec<u32> {
        let [w0, mut w1] = self.state.scissor;
        if self.cycle_type() >= 2 {
            w1 -= 1 << 12;
        }
        vec![w0, w1]
    }

    /// Derive the final words of a CPU-assisted command.
    fn fixup(&mut self, op: FixupOp, args: &[u32], to_block: bool) -> Vec<u32> {
        match op {
            FixupOp::Scissor => {
                self.state.scissor = [args[0], args[1]];
                self.emit_scissor()
            }
            FixupOp::OtherModes => {
                self.state.other_modes = ((args[0] as u64) << 32) | args[1] as u64;
                let mut out = if to_block {
                    // The raw mode word was recorded statically; only the
                    // derived scissor goes into the reserved space.
                    Vec::new()
                } else {
                    args.to_vec()
                };
                out.extend(self.emit_scissor());
                out
            }
            FixupOp::ModifyOtherModes => {
                let (offset, and_mask, or_val) = (args[0], args[1], args[2]);
                let (mut hi, mut lo) = (
                    (self.state.other_modes >> 32) as u32,
                    self.state.other_modes as u32,
                );
                if offset == 0 {
                    hi = (hi & and_mask) | or_val;
                } else {
                    lo = (lo & and_mask) | or_val;
                }
                self.state.other_modes = ((hi as u64) << 32) | lo as u64;
                let mut out = vec![hi, lo];
                out.extend(self.emit_scissor());
                out
            }
            FixupOp::FillColor => {
                self.state.fill_color = args[1];
                let pattern = if self.state.target_bitdepth == 16 {
                    let (r, g, b, a) = (
                        (args[1] >> 24) & 0xFF,
                        (args[1] >> 16) & 0xFF,
                        (args[1] >> 8) & 0xFF,
                        args[1] & 0xFF,
                    );
                    let p16 = ((r >> 3) << 11) | ((g >> 3) << 6) | ((b >> 3) << 1) | (a >> 7);
                    (p16 << 16) | p16
                } else {
                    args[1]
                };
                vec![args[0], pattern]
            }
            FixupOp::TexImage | FixupOp::ZImage => args.to_vec(),
            FixupOp::ColorImage => {
                self.state.target_bitdepth = 4 << ((args[0] >> 19) & 3) as u8;
                let mut out = args.to_vec();
                out.extend(self.emit_scissor());
                out
            }
            FixupOp::TextureRectangle => {
                let mut out = args.to_vec();
                if self.cycle_type() == 2 {
                    // Copy mode steps four texels per clock.
                    let dsdx = (out[3] >> 16) & 0xFFFF;
                    out[3] = (out[3] & 0xFFFF) | (((dsdx << 2) & 0xFFFF) << 16);
                }
                out
            }
            FixupOp::SyncFull => {
                self.state.last_sync_full = ((args[0] as u64) << 32) | args[1] as u64;
                self.sync_full_status = true;
                if to_block {
                    Vec::new()
                } else {
                    args.to_vec()
                }
            }
        }
    }

    fn exec(&mut self, e: &Entry) {
        match e {
            Entry::Rdp(words) => self.rdp_stream.extend_from_slice(words),
            Entry::Fixup(op, args) => {
                let out = self.fixup(*op, args, false);
                self.dyn_words.extend_from_slice(&out);
                self.rdp_stream.extend_from_slice(&out);
            }
            Entry::FixupToBlock(op, args) => {
                let out = self.fixup(*op, args, true);
                if !out.is_empty() {
                    self.write_phys(self.dp_end, &out);
                    self.rdp_stream.extend_from_slice(&out);
                    self.dp_end += (out.len() * 4) as u32;
                }
            }
            Entry::Submit { start, end, .. } => {
                let words = self.read_phys(*start, *end);
                self.rdp_stream.extend_from_slice(&words);
                self.submits.push((*start, *end));
                self.dp_end = *end;
            }
        }
    }
}

/// Clone handles share the same store: the queue owns one handle, the test
/// keeps another for inspection.
#[derive(Clone, Default)]
pub struct MockCp {
    inner: Rc<RefCell<Inner>>,
}

impl MockCp {
    pub fn new() -> Self {
        let mock = Self::default();
        mock.inner.borrow_mut().next_phys = 0x1000;
        mock
    }

    /// Everything the RDP would have consumed, in order, as 64-bit words.
    pub fn rdp_stream(&self) -> Vec<u64> {
        let inner = self.inner.borrow();
        inner
            .rdp_stream
            .chunks(2)
            .map(|c| ((c[0] as u64) << 32) | c.get(1).copied().unwrap_or(0) as u64)
            .collect()
    }

    /// Opcode (bits 56-61) of every command in the consumed stream, honoring
    /// multi-word commands.
    pub fn rdp_opcodes(&self) -> Vec<u8> {
        let words = self.rdp_stream();
        let mut ops = Vec::new();
        let mut i = 0;
        while i < words.len() {
            let op = ((words[i] >> 56) & 0x3F) as u8;
            ops.push(op);
            i += rdpq::debug::disasm_size(words[i]).min(words.len() - i);
        }
        ops
    }

    /// Words that went through the CP's dynamic stream (fixup output).
    pub fn dyn_stream(&self) -> Vec<u64> {
        let inner = self.inner.borrow();
        inner
            .dyn_words
            .chunks(2)
            .map(|c| ((c[0] as u64) << 32) | c.get(1).copied().unwrap_or(0) as u64)
            .collect()
    }

    pub fn submits(&self) -> Vec<(u32, u32)> {
        self.inner.borrow().submits.clone()
    }

    pub fn alloc_sizes(&self) -> Vec<usize> {
        self.inner.borrow().alloc_sizes.clone()
    }

    pub fn freed_count(&self) -> usize {
        self.inner.borrow().freed.len()
    }

    pub fn idle_waits(&self) -> u32 {
        self.inner.borrow().idle_waits
    }

    pub fn events(&self) -> Vec<String> {
        self.inner.borrow().events.clone()
    }

    pub fn push_event(&self, e: &str) {
        self.inner.borrow_mut().events.push(e.to_string());
    }

    /// Forget consumed streams and reset the fixup state, keeping the arena
    /// (recorded blocks stay replayable). Used to compare two executions of
    /// the same sequence from identical starting state.
    pub fn reset_execution(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.rdp_stream.clear();
        inner.dyn_words.clear();
        inner.submits.clear();
        inner.state = State::default();
        inner.dp_end = 0;
    }
}

impl CpTransport for MockCp {
    type Error = MockError;
    type Block = Vec<Entry>;

    fn queue_push(&mut self, cmd: CpCommand<'_>) -> Result<(), MockError> {
        let entry = match cmd {
            CpCommand::Rdp { words } => Entry::Rdp(words.to_vec()),
            CpCommand::Fixup { op, args } => Entry::Fixup(op, args.to_vec()),
            CpCommand::FixupToBlock { op, args } => Entry::FixupToBlock(op, args.to_vec()),
        };
        let mut inner = self.inner.borrow_mut();
        if inner.recording.is_some() {
            inner.recording.as_mut().expect("recording").push(entry);
        } else {
            inner.exec(&entry);
        }
        Ok(())
    }

    fn submit_rdp(&mut self, start: u32, end: u32) -> Result<SubmitToken, MockError> {
        let mut inner = self.inner.borrow_mut();
        let token = inner.next_token;
        inner.next_token += 1;
        let entry = Entry::Submit { token, start, end };
        if inner.recording.is_some() {
            inner.recording.as_mut().expect("recording").push(entry);
        } else {
            inner.exec(&entry);
        }
        Ok(SubmitToken(token))
    }

    fn extend_rdp_submit(&mut self, token: SubmitToken, new_end: u32) -> Result<bool, MockError> {
        let mut inner = self.inner.borrow_mut();
        if let Some(rec) = &mut inner.recording {
            if let Some(Entry::Submit { token: t, end, .. }) = rec.last_mut() {
                if *t == token.0 {
                    *end = new_end;
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn wait_rdp_idle(&mut self) -> Result<(), MockError> {
        self.inner.borrow_mut().idle_waits += 1;
        Ok(())
    }

    fn block_begin(&mut self) {
        self.inner.borrow_mut().recording = Some(Vec::new());
    }

    fn block_end(&mut self) -> Vec<Entry> {
        self.inner.borrow_mut().recording.take().unwrap_or_default()
    }

    fn block_run(&mut self, block: &Vec<Entry>) -> Result<(), MockError> {
        let mut inner = self.inner.borrow_mut();
        for entry in block {
            inner.exec(entry);
        }
        Ok(())
    }

    fn shadow_state(&self) -> CpShadowState {
        let inner = self.inner.borrow();
        CpShadowState {
            last_sync_full: inner.state.last_sync_full,
            address_table: [0; 16],
            other_modes: inner.state.other_modes,
            scissor_rect: ((inner.state.scissor[0] as u64) << 32) | inner.state.scissor[1] as u64,
            fill_color: inner.state.fill_color,
            self_phys_addr: 0,
            target_bitdepth: inner.state.target_bitdepth,
        }
    }

    fn clear_sync_full(&mut self) {
        let mut inner = self.inner.borrow_mut();
        inner.sync_full_status = false;
        inner.events.push("clear-sync-full".to_string());
    }
}

impl CommandArena for MockCp {
    fn alloc(&mut self, words: usize) -> BufferId {
        let mut inner = self.inner.borrow_mut();
        let id = inner.buffers.len() as u32;
        let base = inner.next_phys;
        inner.buffers.push(Some(vec![0; words]));
        inner.phys_base.push(base);
        inner.next_phys = base + ((words * 4 + 7) & !7) as u32;
        inner.alloc_sizes.push(words);
        BufferId(id)
    }

    fn write(&mut self, buf: BufferId, offset: usize, words: &[u32]) {
        let mut inner = self.inner.borrow_mut();
        let b = inner.buffers[buf.0 as usize]
            .as_mut()
            .expect("write to freed buffer");
        b[offset..offset + words.len()].copy_from_slice(words);
    }

    fn phys_addr(&self, buf: BufferId, offset: usize) -> u32 {
        let inner = self.inner.borrow();
        inner.phys_base[buf.0 as usize] + (offset * 4) as u32
    }

    fn free(&mut self, buf: BufferId) {
        let mut inner = self.inner.borrow_mut();
        inner.buffers[buf.0 as usize] = None;
        inner.freed.push(buf.0);
    }
}
