//! A restartable scanner for the DEC/ANSI escape sequence grammar as
//! practiced by xterm, including the VT52 submode.
//!
//! The scanner walks input byte by byte through an explicit state machine
//! (ground, the ESC/CSI/DCS/OSC/ignore families, and the VT52 states) and
//! reports recognized units to an implementation of [`VtActor`].  It does
//! not ascribe meaning to the sequences themselves; the embedding terminal
//! decides what `CSI ? 25 h` does.
//!
//! Input may end in the middle of a sequence, or in the middle of a UTF-8
//! encoded character inside an OSC or DCS string; [`Scanner::advance`]
//! returns the number of bytes it consumed and the caller re-presents the
//! unconsumed tail together with the next read.  All accumulated state is
//! kept inside the `Scanner` value between calls.
#![allow(clippy::upper_case_acronyms)]

mod selector;

pub use selector::Selector;

/// CSI and DCS sequences accept at most this many parameters; further
/// separators overwrite the last slot, matching xterm.
pub const MAX_PARAMS: usize = 32;

/// OSC/DCS strings shorter than this live in an inline buffer; longer
/// strings are promoted to the heap.
const MAX_INLINE_STR: usize = 256;

/// Hard cap for heap promoted strings.  When reached the string is
/// dropped and the remainder of the sequence is ignored.
const MAX_HEAP_STR: usize = 0x1000_0000;

#[inline]
fn is_c0(b: u8) -> bool {
    b < 0x20
}

#[inline]
fn is_c1(b: u8) -> bool {
    (0x80..0xa0).contains(&b)
}

/// Control byte in the sense of the dispatcher: C0 or C1.
#[inline]
fn is_cbyte(b: u8) -> bool {
    b & 0x60 == 0
}

/// BEL, CAN, SUB and ESC all terminate string states.
#[inline]
fn is_strend(b: u8) -> bool {
    b == 0x07 || b == 0x18 || b == 0x1a || b == 0x1b
}

/// Number of continuation bytes that follow a UTF-8 lead byte in
/// 0xC0..0xF8.
#[inline]
fn utf8_tail_len(lead: u8) -> usize {
    [1, 1, 1, 1, 2, 2, 3][(lead >> 3) as usize - 24]
}

/// Parameter list of a CSI or DCS sequence.
///
/// Slots hold `-1` for parameters that were omitted; a bit in the
/// subparameter mask marks slots that were introduced by `:` rather
/// than `;`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Params {
    vals: [i32; MAX_PARAMS],
    len: usize,
    subpar_mask: u32,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            vals: [-1; MAX_PARAMS],
            len: 0,
            subpar_mask: 0,
        }
    }
}

impl Params {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Value of parameter `i` with `default` substituted for omitted
    /// and zero parameters, which share a meaning for most sequences.
    pub fn get(&self, i: usize, default: i32) -> i32 {
        match self.vals.get(i) {
            Some(&v) if i < self.len && v > 0 => v,
            _ => default,
        }
    }

    /// Raw slot value: `-1` when the parameter was omitted.  Needed by
    /// the few consumers that distinguish `0` from "not given"
    /// (DECSCUSR, SGR colon forms).
    pub fn raw(&self, i: usize) -> i32 {
        if i < self.len {
            self.vals[i]
        } else {
            -1
        }
    }

    /// True when parameter `i` was introduced with a colon.
    pub fn is_subparam(&self, i: usize) -> bool {
        i < MAX_PARAMS && self.subpar_mask & (1 << i) != 0
    }

    /// Index of the first slot after `i` that is not a subparameter,
    /// i.e. the start of the next top-level parameter.
    pub fn next_arg(&self, i: usize) -> usize {
        let mut j = i + 1;
        while j < self.len && self.is_subparam(j) {
            j += 1;
        }
        j
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.vals[..self.len]
    }

    fn clear(&mut self) {
        self.vals[..self.len.max(1)].iter_mut().for_each(|v| *v = -1);
        self.len = 1;
        self.subpar_mask = 0;
    }

    fn push_digit(&mut self, d: u8) {
        let slot = &mut self.vals[self.len - 1];
        *slot = (d - b'0') as i32 + (*slot * 10).max(0);
    }

    fn next_param(&mut self, sub: bool) {
        if self.len < MAX_PARAMS {
            self.len += 1;
            if sub {
                self.subpar_mask |= 1 << (self.len - 1);
            }
        }
    }
}

/// The explicit machine states.  The grammar needs no transition tables:
/// each state is a handful of range checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ground,
    EscEntry,
    Esc1,
    Esc2,
    EscIgnore,
    CsiEntry,
    Csi0,
    Csi1,
    Csi2,
    CsiIgnore,
    DcsEntry,
    Dcs0,
    Dcs1,
    Dcs2,
    DcsString,
    OscEntry,
    Osc1,
    Osc2,
    OscString,
    IgnEntry,
    IgnString,
    Vt52Entry,
    Vt52Cup0,
    Vt52Cup1,
}

impl State {
    fn is_dcs_header(self) -> bool {
        matches!(self, State::DcsEntry | State::Dcs0 | State::Dcs1 | State::Dcs2)
    }

    fn is_osc(self) -> bool {
        matches!(self, State::Osc1 | State::Osc2 | State::OscString)
    }
}

/// The host side of the scanner.  Each callback corresponds to one
/// recognized unit of the grammar.
pub trait VtActor {
    /// A run of printable bytes arrived while in the ground state.
    ///
    /// The actor consumes a prefix of `run` (decoding UTF-8 and applying
    /// character set translation as it sees fit) and returns the number
    /// of bytes it consumed.  Returning less than `run.len()` is how a
    /// partial UTF-8 sequence at the end of a read is deferred: the
    /// scanner stops and the caller re-presents the tail later.
    /// Returning `0` always stops the scan.
    fn print_run(&mut self, run: &[u8]) -> usize;

    /// A C0 control that the scanner did not swallow for its own state
    /// management (ESC, CAN and string-terminating BEL never arrive
    /// here).
    fn control(&mut self, byte: u8);

    /// Final byte of an ESC sequence, with intermediates packed into
    /// the selector.  CSI/OSC/DCS/SOS/PM/APC introducers are handled
    /// by the scanner and never reach this callback.
    fn esc_dispatch(&mut self, selector: Selector);

    /// Final byte of a CSI sequence.
    fn csi_dispatch(&mut self, selector: Selector, params: &Params);

    /// A complete DCS, terminated by ST/BEL/CAN/SUB, with its
    /// accumulated data string.
    fn dcs_dispatch(&mut self, selector: Selector, params: &Params, data: &[u8]);

    /// A complete OSC.  `num` is the numeric selector; `data` holds the
    /// bytes after the `;` (not split further).
    fn osc_dispatch(&mut self, num: u32, data: &[u8]);

    /// A VT52 final byte (the scanner handles `Y` itself).
    fn vt52_dispatch(&mut self, byte: u8);

    /// VT52 direct cursor address, decoded from the two bytes after
    /// `ESC Y`.  Values are zero based.
    fn vt52_cup(&mut self, row: u8, col: u8);
}

enum Step {
    Continue,
    NeedMore,
}

/// The scanner itself.  One instance per terminal; survives across
/// reads.
pub struct Scanner {
    state: State,
    /// State and selector at the time the last ESC or C1 was seen,
    /// consulted when a subsequent ST has to terminate a string.
    old_state: State,
    old_selector: Selector,

    selector: Selector,
    params: Params,

    /// OSC numeric selector.
    osc_num: u32,

    str_len: usize,
    str_inline: [u8; MAX_INLINE_STR],
    str_heap: Option<Vec<u8>>,

    /// Emulation properties mirrored from the terminal; they gate C1
    /// recognition, VT52 entry and string UTF-8 atomicity.
    utf8: bool,
    vt_level: u8,
    osc_title_utf8: bool,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner {
    pub fn new() -> Self {
        Self {
            state: State::Ground,
            old_state: State::Ground,
            old_selector: Selector::default(),
            selector: Selector::default(),
            params: Params::default(),
            osc_num: 0,
            str_len: 0,
            str_inline: [0; MAX_INLINE_STR],
            str_heap: None,
            utf8: true,
            vt_level: 4,
            osc_title_utf8: true,
        }
    }

    /// Abandon any partially accumulated sequence and return to the
    /// ground state.  Used by RIS and DECSTR.
    pub fn reset(&mut self) {
        self.state = State::Ground;
        self.old_state = State::Ground;
        self.discard_string();
    }

    pub fn is_ground(&self) -> bool {
        self.state == State::Ground
    }

    pub fn set_utf8(&mut self, utf8: bool) {
        self.utf8 = utf8;
    }

    /// Emulation level; level 0 means VT52 mode, level >= 2 enables
    /// raw C1 recognition in every state.
    pub fn set_vt_level(&mut self, level: u8) {
        self.vt_level = level;
    }

    /// Whether OSC 0/1/2 payloads are decoded as UTF-8 even when the
    /// terminal itself runs in an eight bit charset.
    pub fn set_osc_title_utf8(&mut self, enabled: bool) {
        self.osc_title_utf8 = enabled;
    }

    /// Feed a chunk of input.  Returns the number of bytes consumed;
    /// the caller must keep the remainder at the head of its buffer.
    pub fn advance(&mut self, bytes: &[u8], actor: &mut dyn VtActor) -> usize {
        let mut pos = 0;
        while pos < bytes.len() {
            match self.step(bytes, &mut pos, actor) {
                Step::Continue => {}
                Step::NeedMore => break,
            }
        }
        pos
    }

    fn step(&mut self, buf: &[u8], pos: &mut usize, actor: &mut dyn VtActor) -> Step {
        let ch = buf[*pos];

        // Fast path: graphical bytes in the ground state go straight to
        // the printer, a whole run at a time.
        if self.state == State::Ground && !is_cbyte(ch) {
            let consumed = actor.print_run(&buf[*pos..]);
            *pos += consumed;
            return if consumed == 0 { Step::NeedMore } else { Step::Continue };
        }

        // String states consume multiple bytes at once so that UTF-8
        // sequences stay atomic; they stop just before C0 and C1 bytes
        // which are then handled below on the next step.
        match self.state {
            State::OscString | State::DcsString | State::IgnString
                if !is_c0(ch) && !is_c1(ch) =>
            {
                return self.accumulate_string(buf, pos);
            }
            _ => {}
        }

        *pos += 1;

        // C1 controls act in every state when the emulation level
        // allows them: they behave as ESC plus the corresponding final.
        if is_c1(ch) && self.vt_level >= 2 {
            self.old_state = self.state;
            self.old_selector = self.selector;
            self.state = State::EscEntry;
            self.selector = Selector::default();
            self.esc_final(ch ^ 0xc0, actor);
            return Step::Continue;
        }

        // Apart from strings and C1, bytes with the eighth bit set act
        // as their seven bit counterparts.
        let ch = ch & 0x7f;

        match self.state {
            State::Ground => self.dispatch_c0(ch, actor),

            State::EscEntry | State::Esc1 | State::Esc2 | State::EscIgnore => {
                if self.state == State::EscEntry {
                    self.selector = Selector::default();
                }
                match ch {
                    0x20..=0x2f if self.state == State::EscEntry => {
                        self.selector = self.selector.with_i0(ch);
                        self.state = State::Esc1;
                    }
                    0x20..=0x2f if self.state == State::Esc1 => {
                        self.selector = self.selector.with_i1(ch);
                        self.state = State::Esc2;
                    }
                    0x30..=0x7e if self.state != State::EscIgnore => self.esc_final(ch, actor),
                    0x30..=0x7e => self.state = State::Ground,
                    _ if is_c0(ch) => self.dispatch_c0(ch, actor),
                    0x7f => {}
                    _ => self.state = State::EscIgnore,
                }
            }

            State::CsiEntry
            | State::Csi0
            | State::Csi1
            | State::Csi2
            | State::CsiIgnore
            | State::DcsEntry
            | State::Dcs0
            | State::Dcs1
            | State::Dcs2 => self.seq_byte(ch, actor),

            State::OscEntry | State::Osc1 | State::Osc2 => {
                if self.state == State::OscEntry {
                    self.start_string();
                    self.osc_num = 0;
                    self.state = State::Osc1;
                    if ch == b'l' || ch == b'L' {
                        // xterm legacy title forms.
                        self.osc_num = if ch == b'L' { 1 } else { 2 };
                        self.state = State::Osc2;
                        return Step::Continue;
                    }
                }
                match ch {
                    b'0'..=b'9' if self.state == State::Osc1 => {
                        self.osc_num = self.osc_num.saturating_mul(10) + (ch - b'0') as u32;
                    }
                    b';' => self.state = State::OscString,
                    _ if is_strend(ch) => self.dispatch_c0(ch, actor),
                    _ => self.state = State::IgnString,
                }
            }

            State::IgnEntry => {
                self.start_string();
                self.state = State::IgnString;
                if is_strend(ch) {
                    self.dispatch_c0(ch, actor);
                }
            }

            State::OscString | State::DcsString | State::IgnString => {
                if is_strend(ch) {
                    self.dispatch_c0(ch, actor);
                }
                // Other C0 bytes (and DEL inside DCS) are dropped from
                // strings; C1 was handled above.
            }

            State::Vt52Entry => {
                if is_c0(ch) {
                    self.dispatch_c0(ch, actor);
                } else if ch == b'Y' {
                    self.state = State::Vt52Cup0;
                } else {
                    self.state = State::Ground;
                    actor.vt52_dispatch(ch);
                }
            }

            State::Vt52Cup0 | State::Vt52Cup1 => {
                if is_c0(ch) {
                    self.dispatch_c0(ch, actor);
                } else if self.state == State::Vt52Cup0 {
                    self.params.clear();
                    self.params.vals[0] = ch.wrapping_sub(b' ') as i32;
                    self.state = State::Vt52Cup1;
                } else {
                    let row = self.params.vals[0].max(0) as u8;
                    let col = ch.wrapping_sub(b' ');
                    self.state = State::Ground;
                    actor.vt52_cup(row, col);
                }
            }
        }

        Step::Continue
    }

    /// Shared CSI/DCS header logic: private markers, parameters,
    /// intermediates, final byte.
    fn seq_byte(&mut self, ch: u8, actor: &mut dyn VtActor) {
        let dcs = self.state.is_dcs_header();

        if matches!(self.state, State::CsiEntry | State::DcsEntry) {
            if dcs {
                self.start_string();
            }
            self.params.clear();
            self.selector = Selector::default();
            self.state = if dcs { State::Dcs0 } else { State::Csi0 };
            if (0x3c..=0x3f).contains(&ch) {
                self.selector = self.selector.with_private(ch);
                return;
            }
        }

        match ch {
            b'0'..=b'9' if matches!(self.state, State::Csi0 | State::Dcs0) => {
                self.params.push_digit(ch);
            }
            b';' if matches!(self.state, State::Csi0 | State::Dcs0) => {
                self.params.next_param(false);
            }
            b':' if matches!(self.state, State::Csi0 | State::Dcs0) => {
                self.params.next_param(true);
            }
            0x20..=0x2f if matches!(self.state, State::Csi0 | State::Dcs0) => {
                self.selector = self.selector.with_i0(ch);
                self.state = if dcs { State::Dcs1 } else { State::Csi1 };
            }
            0x20..=0x2f if matches!(self.state, State::Csi1 | State::Dcs1) => {
                self.selector = self.selector.with_i1(ch);
                self.state = if dcs { State::Dcs2 } else { State::Csi2 };
            }
            0x40..=0x7e if self.state != State::CsiIgnore => {
                self.selector = self.selector.with_final(ch);
                if dcs {
                    self.state = State::DcsString;
                } else {
                    let params = std::mem::take(&mut self.params);
                    self.state = State::Ground;
                    actor.csi_dispatch(self.selector, &params);
                    self.params = params;
                }
            }
            _ if is_c0(ch) => {
                // C0 executes during CSI accumulation but is swallowed
                // inside DCS headers.
                if !dcs {
                    self.dispatch_c0(ch, actor);
                }
            }
            0x7f => {}
            _ if dcs => self.state = State::IgnString,
            0x40..=0x7e => self.state = State::Ground,
            _ => self.state = State::CsiIgnore,
        }
    }

    fn esc_final(&mut self, ch: u8, actor: &mut dyn VtActor) {
        self.selector = self.selector.with_esc_final(ch);

        // Introducers are state transitions owned by the scanner; all
        // other finals belong to the terminal.
        if self.selector.intermediates() == (None, None) {
            match ch {
                b'[' => {
                    self.state = State::CsiEntry;
                    self.old_state = State::Ground;
                    return;
                }
                b'P' => {
                    self.state = State::DcsEntry;
                    self.old_state = State::Ground;
                    return;
                }
                b']' => {
                    self.state = State::OscEntry;
                    self.old_state = State::Ground;
                    return;
                }
                b'X' | b'^' | b'_' => {
                    self.state = State::IgnEntry;
                    self.old_state = State::Ground;
                    return;
                }
                b'k' => {
                    // Old style title set: `ESC k text ST`.
                    self.start_string();
                    self.osc_num = 2;
                    self.state = State::OscString;
                    self.old_state = State::Ground;
                    return;
                }
                b'\\' => {
                    // ST: terminate whichever string was being built.
                    match self.old_state {
                        State::DcsString => {
                            self.selector = self.old_selector;
                            self.dispatch_dcs(actor);
                        }
                        s if s.is_osc() => self.dispatch_osc(actor),
                        _ => {}
                    }
                    self.old_state = State::Ground;
                    self.state = State::Ground;
                    return;
                }
                _ => {}
            }
        }

        let selector = self.selector;
        self.discard_string();
        self.old_state = State::Ground;
        self.state = State::Ground;
        actor.esc_dispatch(selector);
    }

    fn dispatch_c0(&mut self, ch: u8, actor: &mut dyn VtActor) {
        match ch {
            0x07 => {
                // BEL doubles as a string terminator.
                if self.state == State::DcsString {
                    self.dispatch_dcs(actor);
                } else if self.state.is_osc() {
                    self.dispatch_osc(actor);
                } else if self.state == State::IgnString {
                    self.discard_string();
                    self.state = State::Ground;
                } else {
                    actor.control(ch);
                }
            }
            0x1a => {
                // SUB displays a reversed question mark and cancels.
                actor.control(ch);
                self.discard_string();
                self.state = State::Ground;
            }
            0x18 => {
                // CAN cancels silently.
                self.discard_string();
                self.state = State::Ground;
            }
            0x1b => {
                self.old_state = self.state;
                self.old_selector = self.selector;
                self.state = if self.vt_level > 0 {
                    State::EscEntry
                } else {
                    State::Vt52Entry
                };
            }
            0x0e | 0x0f => {
                actor.control(ch);
                // VT52 has no locking shift escapes; SO/SI abort any
                // sequence in progress there.
                if self.vt_level == 0 {
                    self.state = State::Ground;
                }
            }
            _ => actor.control(ch),
        }
    }

    /// Accumulate printable bytes (and UTF-8 sequences, atomically)
    /// into the current string.  Stops before string terminators, C1
    /// bytes and at partial sequences.
    fn accumulate_string(&mut self, buf: &[u8], pos: &mut usize) -> Step {
        let dcs = self.state == State::DcsString;
        let utf8 = self.utf8
            || (self.osc_title_utf8 && self.state == State::OscString && self.osc_num < 3);

        while *pos < buf.len() {
            let ch = buf[*pos];
            if is_strend(ch) || is_c1(ch) {
                break;
            }

            let mut len = 1;
            if (0xc0..0xf8).contains(&ch) && utf8 {
                len += utf8_tail_len(ch);
            } else if is_c0(ch) || (dcs && ch == 0x7f) {
                *pos += 1;
                continue;
            }

            // Defer a sequence that runs off the end of this read.
            if *pos + len > buf.len() {
                return Step::NeedMore;
            }

            for _ in 0..len {
                let b = buf[*pos];
                // Stop copying continuations at a malformed boundary.
                if len > 1 && b != ch && b & 0xc0 != 0x80 {
                    break;
                }
                // The overflow path flips the state to IgnString, so
                // re-check it rather than caching the flag.
                if self.state != State::IgnString {
                    self.push_str_byte(b);
                }
                *pos += 1;
            }
        }
        Step::Continue
    }

    fn push_str_byte(&mut self, b: u8) {
        if let Some(heap) = self.str_heap.as_mut() {
            if heap.len() >= MAX_HEAP_STR {
                // Resource exhaustion: drop the string and ignore the
                // rest of the sequence rather than corrupting state.
                log::warn!("string sequence exceeded {} bytes, dropping", MAX_HEAP_STR);
                self.discard_string();
                self.state = State::IgnString;
                return;
            }
            heap.push(b);
        } else if self.str_len < MAX_INLINE_STR {
            self.str_inline[self.str_len] = b;
            self.str_len += 1;
        } else {
            let mut heap = Vec::with_capacity(MAX_INLINE_STR * 2);
            heap.extend_from_slice(&self.str_inline[..self.str_len]);
            heap.push(b);
            self.str_heap = Some(heap);
        }
    }

    fn start_string(&mut self) {
        self.str_len = 0;
        self.str_heap = None;
    }

    fn discard_string(&mut self) {
        self.str_len = 0;
        self.str_heap = None;
    }

    fn str_data(&self) -> &[u8] {
        match &self.str_heap {
            Some(heap) => heap,
            None => &self.str_inline[..self.str_len],
        }
    }

    fn dispatch_osc(&mut self, actor: &mut dyn VtActor) {
        let heap = self.str_heap.take();
        let data: &[u8] = match &heap {
            Some(h) => h,
            None => &self.str_inline[..self.str_len],
        };
        actor.osc_dispatch(self.osc_num, data);
        self.str_len = 0;
        self.old_state = State::Ground;
        self.state = State::Ground;
    }

    fn dispatch_dcs(&mut self, actor: &mut dyn VtActor) {
        let heap = self.str_heap.take();
        let data: &[u8] = match &heap {
            Some(h) => h,
            None => &self.str_inline[..self.str_len],
        };
        let params = std::mem::take(&mut self.params);
        actor.dcs_dispatch(self.selector, &params, data);
        self.params = params;
        self.str_len = 0;
        self.old_state = State::Ground;
        self.state = State::Ground;
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("state", &self.state)
            .field("selector", &self.selector)
            .field("str_len", &self.str_data().len())
            .finish()
    }
}

/// An event recorded by [`CollectingVtActor`]; mirrors the `VtActor`
/// callbacks with owned data for comparisons in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VtEvent {
    Print(String),
    Control(u8),
    Esc(Selector),
    Csi(Selector, Vec<i32>),
    Dcs(Selector, Vec<i32>, Vec<u8>),
    Osc(u32, Vec<u8>),
    Vt52(u8),
    Vt52Cup(u8, u8),
}

/// A `VtActor` that records everything it sees; useful for tests and
/// for tracing.  The print runs are decoded as UTF-8 (lossily).
#[derive(Default)]
pub struct CollectingVtActor {
    events: Vec<VtEvent>,
}

impl CollectingVtActor {
    pub fn into_vec(self) -> Vec<VtEvent> {
        self.events
    }
}

impl VtActor for CollectingVtActor {
    fn print_run(&mut self, run: &[u8]) -> usize {
        let end = run
            .iter()
            .position(|&b| is_cbyte(b))
            .unwrap_or(run.len());
        let text = String::from_utf8_lossy(&run[..end]).into_owned();
        if let Some(VtEvent::Print(prev)) = self.events.last_mut() {
            prev.push_str(&text);
        } else {
            self.events.push(VtEvent::Print(text));
        }
        end
    }

    fn control(&mut self, byte: u8) {
        self.events.push(VtEvent::Control(byte));
    }

    fn esc_dispatch(&mut self, selector: Selector) {
        self.events.push(VtEvent::Esc(selector));
    }

    fn csi_dispatch(&mut self, selector: Selector, params: &Params) {
        self.events
            .push(VtEvent::Csi(selector, params.as_slice().to_vec()));
    }

    fn dcs_dispatch(&mut self, selector: Selector, params: &Params, data: &[u8]) {
        self.events.push(VtEvent::Dcs(
            selector,
            params.as_slice().to_vec(),
            data.to_vec(),
        ));
    }

    fn osc_dispatch(&mut self, num: u32, data: &[u8]) {
        self.events.push(VtEvent::Osc(num, data.to_vec()));
    }

    fn vt52_dispatch(&mut self, byte: u8) {
        self.events.push(VtEvent::Vt52(byte));
    }

    fn vt52_cup(&mut self, row: u8, col: u8) {
        self.events.push(VtEvent::Vt52Cup(row, col));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use k9::assert_equal as assert_eq;

    fn scan(bytes: &[u8]) -> Vec<VtEvent> {
        let mut scanner = Scanner::new();
        let mut actor = CollectingVtActor::default();
        let consumed = scanner.advance(bytes, &mut actor);
        assert_eq!(consumed, bytes.len());
        actor.into_vec()
    }

    fn csi(fin: u8) -> Selector {
        Selector::default().with_final(fin)
    }

    #[test]
    fn mixed_text_and_sgr() {
        assert_eq!(
            scan(b"yo\x07\x1b[32mwoot\x1b[0mdone"),
            vec![
                VtEvent::Print("yo".into()),
                VtEvent::Control(0x07),
                VtEvent::Csi(csi(b'm'), vec![32]),
                VtEvent::Print("woot".into()),
                VtEvent::Csi(csi(b'm'), vec![0]),
                VtEvent::Print("done".into()),
            ]
        );
    }

    #[test]
    fn decset_private_marker() {
        assert_eq!(
            scan(b"\x1b[?1l"),
            vec![VtEvent::Csi(
                Selector::default().with_private(b'?').with_final(b'l'),
                vec![1]
            )]
        );
    }

    #[test]
    fn omitted_params_are_minus_one() {
        assert_eq!(
            scan(b"\x1b[;5H"),
            vec![VtEvent::Csi(csi(b'H'), vec![-1, 5])]
        );
    }

    #[test]
    fn subparams_sgr_underline() {
        let mut scanner = Scanner::new();

        struct Check;
        impl VtActor for Check {
            fn print_run(&mut self, run: &[u8]) -> usize {
                run.len()
            }
            fn control(&mut self, _: u8) {}
            fn esc_dispatch(&mut self, _: Selector) {}
            fn csi_dispatch(&mut self, sel: Selector, params: &Params) {
                assert!(sel.final_byte() == b'm');
                assert!(params.as_slice() == [4, 3]);
                assert!(!params.is_subparam(0));
                assert!(params.is_subparam(1));
            }
            fn dcs_dispatch(&mut self, _: Selector, _: &Params, _: &[u8]) {}
            fn osc_dispatch(&mut self, _: u32, _: &[u8]) {}
            fn vt52_dispatch(&mut self, _: u8) {}
            fn vt52_cup(&mut self, _: u8, _: u8) {}
        }

        scanner.advance(b"\x1b[4:3m", &mut Check);
    }

    #[test]
    fn osc_with_bel_and_st() {
        assert_eq!(
            scan(b"\x1b]0;hello\x07"),
            vec![VtEvent::Osc(0, b"hello".to_vec())]
        );
        assert_eq!(
            scan(b"\x1b]2;there\x1b\\"),
            vec![VtEvent::Osc(2, b"there".to_vec())]
        );
    }

    #[test]
    fn osc_with_c1_terminator() {
        assert_eq!(
            scan(b"\x1b]0;there\x9c"),
            vec![VtEvent::Osc(0, b"there".to_vec())]
        );
    }

    #[test]
    fn osc_utf8_payload() {
        assert_eq!(
            scan("\x1b]2;\u{00af}\x07".as_bytes()),
            vec![VtEvent::Osc(2, "\u{00af}".as_bytes().to_vec())]
        );
    }

    #[test]
    fn dcs_with_data() {
        assert_eq!(
            scan(b"\x1bP1$thello\x1b\\"),
            vec![VtEvent::Dcs(
                Selector::default().with_i0(b'$').with_final(b't'),
                vec![1],
                b"hello".to_vec(),
            )]
        );
    }

    #[test]
    fn apc_and_pm_are_ignored() {
        assert_eq!(
            scan(b"\x1b_Gf=24;payload\x1b\\before"),
            vec![VtEvent::Print("before".into())]
        );
        assert_eq!(scan(b"\x1b^ignored\x07"), vec![]);
    }

    #[test]
    fn can_aborts_a_sequence() {
        assert_eq!(
            scan(b"\x1b[1;2\x18x"),
            vec![VtEvent::Print("x".into())]
        );
    }

    #[test]
    fn c0_executes_inside_csi() {
        assert_eq!(
            scan(b"\x1b[1\x0d2H"),
            vec![VtEvent::Control(0x0d), VtEvent::Csi(csi(b'H'), vec![12])]
        );
    }

    #[test]
    fn partial_sequence_resumes_across_reads() {
        let mut scanner = Scanner::new();
        let mut actor = CollectingVtActor::default();

        let consumed = scanner.advance(b"\x1b[3", &mut actor);
        assert_eq!(consumed, 3);
        assert_eq!(actor.events.len(), 0);

        scanner.advance(b"8;5;21m", &mut actor);
        assert_eq!(
            actor.into_vec(),
            vec![VtEvent::Csi(csi(b'm'), vec![38, 5, 21])]
        );
    }

    #[test]
    fn partial_utf8_in_osc_is_deferred() {
        let mut scanner = Scanner::new();
        let mut actor = CollectingVtActor::default();

        let bytes = "\x1b]2;é\x07".as_bytes();
        // Split in the middle of the two byte encoding of é.
        let split = bytes.len() - 2;
        let consumed = scanner.advance(&bytes[..split], &mut actor);
        assert_eq!(consumed, split - 1);

        scanner.advance(&bytes[consumed..], &mut actor);
        assert_eq!(
            actor.into_vec(),
            vec![VtEvent::Osc(2, "é".as_bytes().to_vec())]
        );
    }

    #[test]
    fn vt52_finals_and_cup() {
        let mut scanner = Scanner::new();
        scanner.set_vt_level(0);
        let mut actor = CollectingVtActor::default();
        scanner.advance(b"\x1bA\x1bY%*x", &mut actor);
        assert_eq!(
            actor.into_vec(),
            vec![
                VtEvent::Vt52(b'A'),
                VtEvent::Vt52Cup(5, 10),
                VtEvent::Print("x".into()),
            ]
        );
    }

    #[test]
    fn esc_intermediates() {
        assert_eq!(
            scan(b"\x1b#8"),
            vec![VtEvent::Esc(
                Selector::default().with_i0(b'#').with_esc_final(b'8')
            )]
        );
    }

    #[test]
    fn too_many_params_overwrite_the_last_slot() {
        let input = format!("\x1b[{}m", (0..40).map(|i| i.to_string()).collect::<Vec<_>>().join(";"));
        let events = scan(input.as_bytes());
        match &events[0] {
            VtEvent::Csi(_, params) => assert_eq!(params.len(), MAX_PARAMS),
            other => panic!("expected CSI, got {:?}", other),
        };
    }
}
