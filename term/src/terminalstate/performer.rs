//! The dispatcher: implements the scanner's actor trait and routes
//! every recognized unit into screen, mode, report or window
//! operations.

use crate::clipboard::ClipboardTarget;
use crate::input::KeyMap;
use crate::modes::ModeStatus;
use crate::nrcs::{self, Charset};
use crate::screen::ChecksumMode;
use crate::terminalstate::mouse::{MouseFormat, MouseMode};
use crate::terminalstate::TerminalState;
use crate::urimatch::UriMatchEvent;
use crate::window::TitleTarget;
use crate::{CSI, DCS, ST};
use cellgrid::{Attr, Color, LineId, Rgba, Underline};
use std::fmt::Write as _;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use url::Url;
use vtscan::{Params, Selector, VtActor};

/// Borrows the terminal state for the duration of one input chunk and
/// adapts it to the scanner's callback interface.
pub(crate) struct Performer<'a> {
    pub state: &'a mut TerminalState,
}

impl<'a> Deref for Performer<'a> {
    type Target = TerminalState;

    fn deref(&self) -> &TerminalState {
        self.state
    }
}

impl<'a> DerefMut for Performer<'a> {
    fn deref_mut(&mut self) -> &mut TerminalState {
        self.state
    }
}

impl<'a> Performer<'a> {
    pub fn new(state: &'a mut TerminalState) -> Self {
        Self { state }
    }
}

impl<'a> VtActor for Performer<'a> {
    fn print_run(&mut self, run: &[u8]) -> usize {
        let utf8 = self.mode.utf8;
        let nrcs = self.mode.enable_nrcs;
        if self.mode.scroll_on_output {
            self.screen.reset_view(true);
        }
        let consumed = self.state.screen.dispatch_print(run, utf8, nrcs);
        self.state.feed_uri_matcher(&run[..consumed]);
        self.state.flush_screen_events();
        consumed
    }

    fn control(&mut self, byte: u8) {
        self.state.uri_match_interrupt();
        self.state.control_byte(byte);
        self.state.flush_screen_events();
    }

    fn esc_dispatch(&mut self, selector: Selector) {
        self.state.uri_match_interrupt();
        self.state.esc_dispatch(selector);
    }

    fn csi_dispatch(&mut self, selector: Selector, params: &Params) {
        self.state.uri_match_interrupt();
        self.state.csi_dispatch(selector, params);
        self.state.flush_screen_events();
    }

    fn dcs_dispatch(&mut self, selector: Selector, params: &Params, data: &[u8]) {
        self.state.uri_match_interrupt();
        self.state.dcs_dispatch(selector, params, data);
    }

    fn osc_dispatch(&mut self, num: u32, data: &[u8]) {
        self.state.uri_match_interrupt();
        self.state.osc_dispatch(num, data);
    }

    fn vt52_dispatch(&mut self, byte: u8) {
        self.state.vt52_dispatch(byte);
        self.state.flush_screen_events();
    }

    fn vt52_cup(&mut self, row: u8, col: u8) {
        let (ox, oy) = (
            self.screen.min_ox() as isize,
            self.screen.min_oy() as isize,
        );
        self.state
            .screen
            .move_width_origin(ox + col as isize, oy + row as isize);
    }
}

/* URI auto-match integration */

impl TerminalState {
    /// Walk `n` cells backwards from the cursor; URIs never cross hard
    /// line boundaries (a control would have reset the match), so
    /// running off the line start clamps.
    fn cursor_cell_back(&self, n: usize) -> (LineId, usize) {
        let span = self.screen.span(self.screen.c.y);
        let pos = span.offset + self.screen.c.x;
        if n <= pos {
            (span.line, pos - n)
        } else {
            (span.line, 0)
        }
    }

    pub(crate) fn feed_uri_matcher(&mut self, consumed: &[u8]) {
        if consumed.is_empty() {
            return;
        }
        for (i, &b) in consumed.iter().enumerate() {
            match self.urim.advance(b) {
                UriMatchEvent::None => {}
                UriMatchEvent::Start { lookback } => {
                    let back = (consumed.len() - i) + lookback;
                    let (line, off) = self.cursor_cell_back(back);
                    self.set_uri_bookmark(line, off);
                }
                UriMatchEvent::Finished => self.finish_uri_match(),
                UriMatchEvent::Abort => self.drop_uri_bookmark(),
            }
        }
    }

    pub(crate) fn uri_match_interrupt(&mut self) {
        match self.urim.interrupt() {
            UriMatchEvent::Finished => self.finish_uri_match(),
            _ => self.drop_uri_bookmark(),
        }
    }

    fn set_uri_bookmark(&mut self, line: LineId, offset: usize) {
        self.drop_uri_bookmark();
        let storage = if self.screen.mode.altscreen {
            &mut self.screen.alt
        } else {
            &mut self.screen.main
        };
        self.uri_bookmark = Some(storage.store.register_handle(line, offset));
    }

    fn drop_uri_bookmark(&mut self) {
        if let Some(h) = self.uri_bookmark.take() {
            let storage = if self.screen.mode.altscreen {
                &mut self.screen.alt
            } else {
                &mut self.screen.main
            };
            storage.store.unregister_handle(h);
        }
    }

    fn finish_uri_match(&mut self) {
        let len = self.urim.matched_len();
        let uri = self.urim.take_uri();
        let bookmark = match self.uri_bookmark.take() {
            Some(h) => h,
            None => return,
        };
        let storage = if self.screen.mode.altscreen {
            &mut self.screen.alt
        } else {
            &mut self.screen.main
        };
        let start = storage.store.handle_pos(bookmark);
        storage.store.unregister_handle(bookmark);
        let (line, offset) = match start {
            Some(pos) => pos,
            None => return,
        };
        if uri.is_empty() {
            return;
        }
        let id = self.screen.uris.intern(&uri, None);
        self.screen.apply_uri_range(line, offset, len, id);
        // The range now holds its own references.
        self.screen.uris.decref(id);
    }
}

/* C0 controls */

impl TerminalState {
    pub(crate) fn control_byte(&mut self, byte: u8) {
        match byte {
            0x05 => {
                // ENQ
                let answer = self.config().answerback_string();
                if !answer.is_empty() {
                    self.answerback(&answer);
                }
            }
            0x07 => self.bell(),
            0x08 => self.backspace(),
            0x09 => self.screen.tab_jump(1),
            0x0a | 0x0b | 0x0c => {
                if self.screen.mode.print_auto {
                    let line = self.screen.row_bytes(self.screen.c.y);
                    self.screen.events.autoprint.push(line);
                }
                if self.mode.scroll_on_output {
                    self.screen.reset_view(true);
                }
                self.screen.index();
                if self.mode.crlf {
                    self.screen.cr();
                }
            }
            0x0d => self.screen.cr(),
            0x0e => self.screen.c.set_gl(1, false),
            0x0f => self.screen.c.set_gl(0, false),
            0x1a => {
                // SUB prints a reversed question mark.
                self.screen.put_char('?');
            }
            _ => {
                log::trace!("ignored control 0x{:02x}", byte);
            }
        }
    }

    fn backspace(&mut self) {
        let scr = &self.screen;
        let (min_x, max_x) = (scr.min_x(), scr.max_x());
        let (min_y, max_y) = (scr.min_y(), scr.max_y());
        let c = scr.c;

        if scr.mode.reverse_wrap && scr.mode.wrap && c.x == min_x && c.y == min_y {
            // Reverse wrap off the top left lands at the bottom right.
            self.screen
                .move_to(max_x as isize - 1, max_y as isize - 1);
        } else if scr.mode.reverse_wrap && scr.mode.wrap && c.x <= min_x {
            self.screen
                .move_to(max_x as isize - 1, c.y as isize - 1);
        } else if scr.mode.reverse_wrap && scr.mode.wrap && c.x + 1 == max_x && c.pending {
            // At the margin right after output, BS is a no-op.
        } else {
            self.screen.move_left(1);
        }
    }
}

/* ESC dispatch */

impl TerminalState {
    pub(crate) fn esc_dispatch(&mut self, selector: Selector) {
        match selector.esc_parts() {
            (None, None, b'D') => {
                self.screen.index();
            }
            (None, None, b'E') => {
                self.screen.index();
                self.screen.cr();
            }
            (None, None, b'F') => {
                // HP home down.
                let (x, y) = (self.screen.min_ox() as isize, self.screen.max_oy() as isize - 1);
                self.screen.move_to(x, y);
            }
            (None, None, b'H') => {
                let x = self.screen.c.x;
                self.screen.set_tab(x, true);
            }
            (None, None, b'M') => self.screen.rindex(),
            (None, None, b'N') => self.screen.c.set_gl(2, true),
            (None, None, b'O') => self.screen.c.set_gl(3, true),
            (None, None, b'V') => {
                self.screen.sgr.set_protected(true);
                self.mode.protected = true;
            }
            (None, None, b'W') => {
                self.screen.sgr.set_protected(false);
                self.mode.protected = true;
            }
            (None, None, b'Z') => self.report_da1(),
            (None, None, b'6') => {
                if self.vt_level >= 4 {
                    self.screen.rindex_horizontal();
                }
            }
            (None, None, b'7') => self.screen.save_cursor(true),
            (None, None, b'8') => self.screen.save_cursor(false),
            (None, None, b'9') => {
                if self.vt_level >= 4 {
                    self.screen.index_horizontal();
                }
            }
            (None, None, b'=') => self.kstate.appkey = true,
            (None, None, b'>') => self.kstate.appkey = false,
            (None, None, b'c') => self.reset(true),
            (None, None, b'l') => {
                // HP memory lock.
                let y = self.screen.c.y;
                let bottom = self.screen.max_y() - 1;
                self.screen.set_tb_margins(y, bottom);
            }
            (None, None, b'm') => {
                let bottom = self.screen.max_y() - 1;
                self.screen.set_tb_margins(0, bottom);
            }
            (None, None, b'n') => self.screen.c.set_gl(2, false),
            (None, None, b'o') => self.screen.c.set_gl(3, false),
            (None, None, b'|') => self.screen.c.set_gr(3),
            (None, None, b'}') => self.screen.c.set_gr(2),
            (None, None, b'~') => self.screen.c.set_gr(1),

            (Some(b' '), None, b'F') => {
                if self.vt_level >= 2 {
                    self.mode.eight_bit = false;
                }
            }
            (Some(b' '), None, b'G') => {
                if self.vt_level >= 2 {
                    self.mode.eight_bit = true;
                }
            }
            (Some(b' '), None, b'L') | (Some(b' '), None, b'M') => {
                // ANSI conformance levels 1 and 2.
                self.screen.c.gn[1] = Charset::Ascii;
                self.screen.c.set_gr(1);
                self.screen.c.gn[0] = Charset::Ascii;
                self.screen.c.set_gl(0, false);
            }
            (Some(b' '), None, b'N') => {
                self.screen.c.gn[0] = Charset::Ascii;
                self.screen.c.set_gl(0, false);
            }

            (Some(b'#'), None, b'8') => {
                // DECALN: E-fill, reset margins, home.
                self.screen.reset_margins();
                self.screen.move_to(0, 0);
                let (w, h) = (self.screen.width() as isize, self.screen.height() as isize);
                self.screen.fill(0, 0, w, h, false, 'E');
            }

            (Some(b'%'), None, b'@') => {
                self.mode.utf8 = false;
                self.mark_scanner_dirty();
            }
            (Some(b'%'), None, b'G') | (Some(b'%'), None, b'8') => {
                self.mode.utf8 = true;
                self.mark_scanner_dirty();
            }

            // Charset designations.
            (Some(i0 @ (b'(' | b')' | b'*' | b'+')), i1, fin) => {
                let slot = (i0 - b'(') as usize;
                if let Some(cs) =
                    nrcs::parse(fin, i1, false, self.vt_level, self.mode.enable_nrcs)
                {
                    self.screen.c.gn[slot] = cs;
                } else {
                    self.unhandled_esc(selector);
                }
            }
            (Some(i0 @ (b'-' | b'.' | b'/')), i1, fin) => {
                let slot = 1 + (i0 - b'-') as usize;
                if let Some(cs) = nrcs::parse(fin, i1, true, self.vt_level, self.mode.enable_nrcs)
                {
                    self.screen.c.gn[slot] = cs;
                } else {
                    self.unhandled_esc(selector);
                }
            }

            _ => self.unhandled_esc(selector),
        }
    }

    fn unhandled_esc(&mut self, selector: Selector) {
        if self.config().trace_controls() {
            log::warn!("unrecognized ESC {}", selector);
        }
    }

    pub(crate) fn vt52_dispatch(&mut self, byte: u8) {
        match byte {
            b'<' => {
                if self.vt_version >= 100 {
                    self.set_vt52(false);
                }
            }
            b'=' => self.kstate.appkey = true,
            b'>' => self.kstate.appkey = false,
            b'A' => {
                let (x, y) = (self.screen.c.x as isize, self.screen.c.y as isize);
                self.screen.move_width_origin(x, y - 1);
            }
            b'B' => {
                let (x, y) = (self.screen.c.x as isize, self.screen.c.y as isize);
                self.screen.move_width_origin(x, y + 1);
            }
            b'C' => {
                let (x, y) = (self.screen.c.x as isize, self.screen.c.y as isize);
                self.screen.move_width_origin(x + 1, y);
            }
            b'D' => {
                let (x, y) = (self.screen.c.x as isize, self.screen.c.y as isize);
                self.screen.move_width_origin(x - 1, y);
            }
            b'F' => self.screen.c.set_gl(1, false),
            b'G' => self.screen.c.set_gl(0, false),
            b'H' => {
                let (x, y) = (self.screen.min_ox() as isize, self.screen.min_oy() as isize);
                self.screen.move_to(x, y);
            }
            b'I' => self.screen.rindex(),
            b'J' => {
                self.screen.cursor_adjust_wide_left();
                let (cx, cy) = (self.screen.c.x as isize, self.screen.c.y as isize);
                let (w, h) = (self.screen.width() as isize, self.screen.height() as isize);
                self.screen.erase(cx, cy, w, cy + 1, false);
                self.screen.erase(0, cy + 1, w, h, false);
            }
            b'K' => {
                self.screen.cursor_adjust_wide_left();
                let (cx, cy) = (self.screen.c.x as isize, self.screen.c.y as isize);
                let w = self.screen.width() as isize;
                self.screen.erase(cx, cy, w, cy + 1, false);
            }
            b'V' => self.media_copy(true, 1),
            b'W' => self.media_copy(false, 5),
            b'X' => self.media_copy(false, 4),
            b'Z' => self.answerback("\x1b/Z"),
            b']' => self.media_copy(false, 0),
            b'^' => self.media_copy(true, 5),
            b'_' => self.media_copy(true, 4),
            _ => log::trace!("unrecognized VT52 final {:?}", byte as char),
        }
    }

    /// MC: route screen content or the raw stream to the printer.
    pub(crate) fn media_copy(&mut self, private: bool, func: i32) {
        if private {
            match func {
                1 => {
                    let mut line = self.screen.row_bytes(self.screen.c.y);
                    line.push(b'\n');
                    self.print_bytes(&line);
                }
                4 => self.screen.mode.print_auto = false,
                5 => self.screen.mode.print_auto = true,
                _ => log::trace!("unhandled MC ? {}", func),
            }
        } else {
            match func {
                0 => self.print_screen(false),
                4 => self.print_controller = false,
                5 => {
                    if self.printer_available() {
                        self.print_controller = true;
                    }
                }
                _ => log::trace!("unhandled MC {}", func),
            }
        }
    }

    pub(crate) fn print_screen(&mut self, force_extend: bool) {
        let (top, bottom) = if force_extend || self.screen.mode.print_extend {
            (0, self.screen.height())
        } else {
            (self.screen.min_y(), self.screen.max_y())
        };
        for y in top..bottom {
            let mut line = self.screen.row_bytes(y);
            line.push(b'\n');
            self.print_bytes(&line);
        }
        if self.screen.mode.print_form_feed {
            self.print_bytes(b"\x0c");
        }
    }
}

/* CSI dispatch */

impl TerminalState {
    fn unhandled_csi(&mut self, sel: Selector, params: &Params) {
        if self.config().trace_controls() {
            log::warn!("unrecognized CSI {:?} {}", params.as_slice(), sel);
        }
    }

    pub(crate) fn csi_dispatch(&mut self, sel: Selector, params: &Params) {
        let p = |i: usize, d: i32| params.get(i, d) as isize;
        let pu = |i: usize, d: i32| params.get(i, d).max(0) as usize;

        macro_rules! chk_vt {
            ($lvl:expr) => {
                if self.vt_level < $lvl {
                    return self.unhandled_csi(sel, params);
                }
            };
        }

        match sel.parts() {
            /* Cursor motion */
            (None, None, None, b'A') => {
                let c = self.screen.c;
                let top = if c.y >= self.screen.min_y() {
                    self.screen.min_y()
                } else {
                    0
                };
                let y = (c.y as isize - p(0, 1)).max(top as isize);
                self.screen.move_to(c.x as isize, y);
            }
            (None, None, None, b'B') | (None, None, None, b'e') => {
                let c = self.screen.c;
                let bottom = if c.y < self.screen.max_y() {
                    self.screen.max_y()
                } else {
                    self.screen.height()
                };
                let y = (c.y as isize + p(0, 1)).min(bottom as isize - 1);
                self.screen.move_to(c.x as isize, y);
            }
            (None, None, None, b'C') | (None, None, None, b'a') => {
                let c = self.screen.c;
                let right = if c.x < self.screen.max_x() {
                    self.screen.max_x()
                } else {
                    self.screen.width()
                };
                let x = (c.x as isize + p(0, 1)).min(right as isize - 1);
                self.screen.move_to(x, c.y as isize);
            }
            (None, None, None, b'D') => {
                let c = self.screen.c;
                let left = if c.x >= self.screen.min_x() {
                    self.screen.min_x()
                } else {
                    0
                };
                let x = (c.x as isize - p(0, 1)).max(left as isize);
                self.screen.move_to(x, c.y as isize);
            }
            (None, None, None, b'E') => {
                let c = self.screen.c;
                let y = (c.y as isize + p(0, 1)).min(self.screen.max_y() as isize - 1);
                self.screen.move_to(c.x as isize, y);
                self.screen.cr();
            }
            (None, None, None, b'F') => {
                let c = self.screen.c;
                let y = (c.y as isize - p(0, 1)).max(self.screen.min_y() as isize);
                self.screen.move_to(c.x as isize, y);
                self.screen.cr();
            }
            (None, None, None, b'G') | (None, None, None, b'`') => {
                let y = self.screen.c.y as isize;
                let x = self.screen.min_ox() as isize + p(0, 1) - 1;
                self.screen.move_width_origin(x, y);
            }
            (None, None, None, b'H') | (None, None, None, b'f') => {
                let y = self.screen.min_oy() as isize + p(0, 1) - 1;
                let x = self.screen.min_ox() as isize + p(1, 1) - 1;
                self.screen.move_width_origin(x, y);
            }
            (None, None, None, b'd') => {
                let x = self.screen.c.x as isize;
                let y = self.screen.min_oy() as isize + p(0, 1) - 1;
                self.screen.move_width_origin(x, y);
            }
            (None, None, None, b'I') => self.screen.tab_jump(p(0, 1)),
            (None, None, None, b'Z') => self.screen.tab_jump(-p(0, 1)),

            /* Editing */
            (None, None, None, b'@') => self.screen.insert_cells(pu(0, 1)),
            (None, Some(b' '), None, b'@') => {
                chk_vt!(4);
                let n = p(0, 1);
                let left = self.screen.min_x();
                self.screen.scroll_horizontal(left, n);
            }
            (None, Some(b' '), None, b'A') => {
                chk_vt!(4);
                let n = p(0, 1);
                let left = self.screen.min_x();
                self.screen.scroll_horizontal(left, -n);
            }
            (None, None, None, b'P') => self.screen.delete_cells(pu(0, 1)),
            (None, None, None, b'L') => self.screen.insert_lines(pu(0, 1)),
            (None, None, None, b'M') => self.screen.delete_lines(pu(0, 1)),
            (None, None, None, b'X') => {
                let n = pu(0, 1);
                self.screen.cursor_adjust_wide_left();
                let (cx, cy) = (self.screen.c.x as isize, self.screen.c.y as isize);
                self.screen.erase(cx, cy, cx + n as isize, cy + 1, false);
                self.screen.c.pending = false;
            }
            (None, None, None, b'b') => self.screen.rep(pu(0, 1)),
            (None, None, None, b'S') => {
                let top = self.screen.min_y();
                self.screen.scroll(top, p(0, 1), false);
            }
            (None, None, None, b'T') | (None, None, None, b'^') => {
                if params.len() > 1 {
                    // Multi-parameter T is legacy mouse tracking; drop.
                    return self.unhandled_csi(sel, params);
                }
                let top = self.screen.min_y();
                self.screen.scroll(top, -p(0, 1), false);
            }

            /* Erases */
            (private @ (None | Some(b'?')), None, None, b'J') => {
                let selective = private.is_some();
                let protected = self.mode.protected;
                let (w, h) = (self.screen.width() as isize, self.screen.height() as isize);
                let (cx, cy) = (self.screen.c.x as isize, self.screen.c.y as isize);
                let do_erase = |scr: &mut crate::screen::Screen,
                                xs: isize,
                                ys: isize,
                                xe: isize,
                                ye: isize| {
                    if selective {
                        if protected {
                            scr.erase(xs, ys, xe, ye, false);
                        } else {
                            scr.selective_erase(xs, ys, xe, ye, false);
                        }
                    } else if protected {
                        scr.protective_erase(xs, ys, xe, ye, false);
                    } else {
                        scr.erase(xs, ys, xe, ye, false);
                    }
                };
                match params.get(0, 0) {
                    0 => {
                        self.screen.cursor_adjust_wide_left();
                        do_erase(&mut self.screen, cx, cy, w, cy + 1);
                        do_erase(&mut self.screen, 0, cy + 1, w, h);
                    }
                    1 => {
                        self.screen.cursor_adjust_wide_right();
                        do_erase(&mut self.screen, 0, 0, w, cy);
                        do_erase(&mut self.screen, 0, cy, cx + 1, cy + 1);
                    }
                    2 => do_erase(&mut self.screen, 0, 0, w, h),
                    3 => {
                        let caps = self.config().scrollback_size();
                        self.screen.free_scrollback(caps);
                    }
                    _ => self.unhandled_csi(sel, params),
                }
                self.screen.c.pending = false;
            }
            (private @ (None | Some(b'?')), None, None, b'K') => {
                let selective = private.is_some();
                let protected = self.mode.protected;
                let w = self.screen.width() as isize;
                let (cx, cy) = (self.screen.c.x as isize, self.screen.c.y as isize);
                let do_erase = |scr: &mut crate::screen::Screen, xs: isize, xe: isize| {
                    if selective {
                        if protected {
                            scr.erase(xs, cy, xe, cy + 1, false);
                        } else {
                            scr.selective_erase(xs, cy, xe, cy + 1, false);
                        }
                    } else if protected {
                        scr.protective_erase(xs, cy, xe, cy + 1, false);
                    } else {
                        scr.erase(xs, cy, xe, cy + 1, false);
                    }
                };
                match params.get(0, 0) {
                    0 => {
                        self.screen.cursor_adjust_wide_left();
                        do_erase(&mut self.screen, cx, w);
                    }
                    1 => {
                        self.screen.cursor_adjust_wide_right();
                        do_erase(&mut self.screen, 0, cx + 1);
                    }
                    2 => do_erase(&mut self.screen, 0, w),
                    _ => self.unhandled_csi(sel, params),
                }
                self.screen.c.pending = false;
            }

            /* Device reports */
            (None, None, None, b'c') => self.report_da1(),
            (Some(b'>'), None, None, b'c') => self.report_da2(),
            (Some(b'='), None, None, b'c') => {
                chk_vt!(4);
                self.report_da3();
            }
            (None, None, None, b'n') => match params.get(0, 0) {
                5 => self.answerback(&format!("{}0n", CSI)),
                6 => {
                    let row = self.screen.c.y + 1 - self.screen.min_oy();
                    let col = self.screen.c.x + 1 - self.screen.min_ox();
                    self.answerback(&format!("{}{};{}R", CSI, row, col));
                }
                _ => self.unhandled_csi(sel, params),
            },
            (Some(b'?'), None, None, b'n') => self.report_decdsr(params),

            /* Tabs */
            (None, None, None, b'g') => match params.get(0, 0) {
                0 => {
                    let x = self.screen.c.x;
                    self.screen.set_tab(x, false);
                }
                3 => self.screen.clear_tabs(),
                _ => self.unhandled_csi(sel, params),
            },

            /* Media copy */
            (private @ (None | Some(b'?')), None, None, b'i') => {
                self.media_copy(private.is_some(), params.get(0, 0));
            }

            /* Modes */
            (None, None, None, b'h') => {
                for i in 0..params.len() {
                    if !params.is_subparam(i) {
                        self.set_mode(false, params.get(i, 0) as u32, true);
                    }
                }
            }
            (None, None, None, b'l') => {
                for i in 0..params.len() {
                    if !params.is_subparam(i) {
                        self.set_mode(false, params.get(i, 0) as u32, false);
                    }
                }
            }
            (Some(b'?'), None, None, b'h') => {
                for i in 0..params.len() {
                    if !params.is_subparam(i) {
                        self.set_mode(true, params.get(i, 0) as u32, true);
                    }
                }
            }
            (Some(b'?'), None, None, b'l') => {
                for i in 0..params.len() {
                    if !params.is_subparam(i) {
                        self.set_mode(true, params.get(i, 0) as u32, false);
                    }
                }
            }

            (None, None, None, b'm') => self.csi_sgr(params),
            (Some(b'>'), None, None, b'm') => self.xtmodkeys(params, true),
            (Some(b'>'), None, None, b'n') => self.xtmodkeys(params, false),

            /* Margins, save/restore */
            (None, None, None, b'r') => {
                let top = pu(0, 1) - 1;
                let bottom = pu(1, self.screen.height() as i32) - 1;
                self.screen.set_tb_margins(top, bottom);
                let (x, y) = (self.screen.min_ox() as isize, self.screen.min_oy() as isize);
                self.screen.move_width_origin(x, y);
            }
            (Some(b'?'), None, None, b'r') => {
                // XTRESTORE
                for i in 0..params.len() {
                    let mode = params.get(i, 0) as u32;
                    if let Some(enabled) = self.saved_modes.saved(mode) {
                        self.set_mode(true, mode, enabled);
                    }
                }
            }
            (None, None, None, b's') => {
                if self.screen.mode.lr_margins {
                    let left = pu(0, 1) - 1;
                    let right = pu(1, self.screen.width() as i32) - 1;
                    if self.screen.set_lr_margins(left, right) {
                        let (x, y) =
                            (self.screen.min_ox() as isize, self.screen.min_oy() as isize);
                        self.screen.move_width_origin(x, y);
                    }
                } else {
                    self.screen.save_cursor(true);
                }
            }
            (Some(b'?'), None, None, b's') => {
                // XTSAVE
                for i in 0..params.len() {
                    let mode = params.get(i, 0) as u32;
                    match self.mode_status(true, mode) {
                        ModeStatus::Enabled | ModeStatus::AlwaysEnabled => {
                            self.saved_modes.save(mode, true);
                        }
                        ModeStatus::Disabled | ModeStatus::AlwaysDisabled => {
                            self.saved_modes.save(mode, false);
                        }
                        ModeStatus::Unrecognized => {}
                    }
                }
            }
            (None, None, None, b'u') => self.screen.save_cursor(false),

            /* Window ops and bells */
            (None, None, None, b't') => self.xtwinops(params),
            (Some(b'>'), None, None, b't') => {
                for i in 0..params.len() {
                    match params.get(i, 0) {
                        0 => self.mode.title_set_hex = true,
                        1 => self.mode.title_query_hex = true,
                        2 => self.mode.title_set_utf8 = true,
                        3 => self.mode.title_query_utf8 = true,
                        _ => {}
                    }
                }
                self.mark_scanner_dirty();
            }
            (Some(b'>'), None, None, b'T') => {
                for i in 0..params.len() {
                    match params.get(i, 0) {
                        0 => self.mode.title_set_hex = false,
                        1 => self.mode.title_query_hex = false,
                        2 => self.mode.title_set_utf8 = false,
                        3 => self.mode.title_query_utf8 = false,
                        _ => {}
                    }
                }
                self.mark_scanner_dirty();
            }
            (None, Some(b' '), None, b't') => {
                // DECSWBV
                let vol = match params.get(0, 0) {
                    0 | 1 => 0,
                    v @ 2..=4 => v as u8 * 2,
                    _ => 8,
                };
                self.set_bell_volume(vol);
            }
            (None, Some(b' '), None, b'u') => {
                // DECSMBV
                let vol = match params.get(0, 0) {
                    0 | 1 => 0,
                    v @ 2..=4 => v as u8 * 2,
                    _ => 8,
                };
                self.screen.set_margin_bell_volume(vol);
            }

            /* Cursor style, protection, conformance */
            (None, None, None, b'q') => {
                // DECLL: keyboard LEDs.
                for i in 0..params.len() {
                    match params.get(i, 0) {
                        0 => {
                            self.mode.led_num_lock = false;
                            self.mode.led_caps_lock = false;
                            self.mode.led_scroll_lock = false;
                        }
                        1 => self.mode.led_num_lock = true,
                        2 => self.mode.led_caps_lock = true,
                        3 => self.mode.led_scroll_lock = true,
                        _ => {}
                    }
                }
            }
            (None, Some(b' '), None, b'q') => {
                self.cursor_shape = params.get(0, 0).clamp(0, 6) as u8;
            }
            (None, Some(b'"'), None, b'q') => {
                // DECSCA
                self.screen.sgr.set_protected(params.get(0, 0) == 1);
                self.mode.protected = false;
            }
            (None, Some(b'"'), None, b'p') => {
                // DECSCL
                chk_vt!(1);
                let level = (params.get(0, 62) - 60).clamp(1, 5) as u8;
                let level = level.min((self.config().vt_version() / 100).max(1) as u8);
                self.reset(false);
                self.vt_level = level;
                self.vt_version = level as u16 * 100;
                if level >= 2 {
                    self.mode.eight_bit = params.get(1, 0) != 1;
                }
                self.mark_scanner_dirty();
            }
            (None, Some(b'!'), None, b'p') => self.reset(false),
            (None, Some(b'$'), None, b'p') => {
                let mode = params.get(0, 0) as u32;
                let status = self.mode_status(false, mode);
                self.answerback(&format!("{}{};{}$y", CSI, mode, status.param()));
            }
            (Some(b'?'), Some(b'$'), None, b'p') => {
                let mode = params.get(0, 0) as u32;
                let status = self.mode_status(true, mode);
                self.answerback(&format!("{}?{};{}$y", CSI, mode, status.param()));
            }
            (None, None, None, b'x') => {
                // DECREQTPARM
                let arg = params.get(0, 0);
                if arg <= 1 {
                    self.answerback(&format!("{}{};1;1;120;120;1;0x", CSI, arg + 2));
                }
            }
            (None, Some(b'*'), None, b'x') => {
                // DECSACE
                self.screen.mode.attr_ext_rectangle = params.get(0, 0) == 2;
            }

            /* Rectangular operations */
            (None, Some(b'$'), None, b'x') => {
                chk_vt!(4);
                let ch = char::from_u32(params.get(0, 0).max(0) as u32)
                    .filter(|c| !c.is_control())
                    .unwrap_or(' ');
                let (ox, oy) = (self.screen.min_ox() as isize, self.screen.min_oy() as isize);
                let (mx, my) = (self.screen.max_ox() as i32, self.screen.max_oy() as i32);
                let (o_x, o_y) = (self.screen.min_ox() as i32, self.screen.min_oy() as i32);
                self.screen.fill(
                    ox + p(2, 1) - 1,
                    oy + p(1, 1) - 1,
                    ox + p(4, mx - o_x),
                    oy + p(3, my - o_y),
                    true,
                    ch,
                );
            }
            (None, Some(b'$'), None, b'z') => {
                chk_vt!(4);
                let (ox, oy) = (self.screen.min_ox() as isize, self.screen.min_oy() as isize);
                let (mx, my) = (self.screen.max_ox() as i32, self.screen.max_oy() as i32);
                let (o_x, o_y) = (self.screen.min_ox() as i32, self.screen.min_oy() as i32);
                let (xs, ys) = (ox + p(1, 1) - 1, oy + p(0, 1) - 1);
                let (xe, ye) = (ox + p(3, mx - o_x), oy + p(2, my - o_y));
                if self.mode.protected {
                    self.screen.protective_erase(xs, ys, xe, ye, true);
                } else {
                    self.screen.erase(xs, ys, xe, ye, true);
                }
            }
            (None, Some(b'$'), None, b'{') => {
                chk_vt!(4);
                let (ox, oy) = (self.screen.min_ox() as isize, self.screen.min_oy() as isize);
                let (mx, my) = (self.screen.max_ox() as i32, self.screen.max_oy() as i32);
                let (o_x, o_y) = (self.screen.min_ox() as i32, self.screen.min_oy() as i32);
                let (xs, ys) = (ox + p(1, 1) - 1, oy + p(0, 1) - 1);
                let (xe, ye) = (ox + p(3, mx - o_x), oy + p(2, my - o_y));
                if self.mode.protected {
                    self.screen.erase(xs, ys, xe, ye, true);
                } else {
                    self.screen.selective_erase(xs, ys, xe, ye, true);
                }
            }
            (None, Some(b'$'), None, b'v') => {
                chk_vt!(4);
                // DECCRA.  Page parameters are accepted and ignored;
                // the six-parameter form without pages is recognized
                // as well.
                let (td, ld) = if params.len() == 6 { (4, 5) } else { (5, 6) };
                let (ox, oy) = (self.screen.min_ox() as isize, self.screen.min_oy() as isize);
                let (mx, my) = (self.screen.max_ox() as i32, self.screen.max_oy() as i32);
                let (o_x, o_y) = (self.screen.min_ox() as i32, self.screen.min_oy() as i32);
                self.screen.copy(
                    ox + p(1, 1) - 1,
                    oy + p(0, 1) - 1,
                    ox + p(3, mx - o_x),
                    oy + p(2, my - o_y),
                    ox + p(ld, 1) - 1,
                    oy + p(td, 1) - 1,
                    true,
                );
            }
            (None, Some(b'$'), None, b'w') => match params.get(0, 0) {
                1 => self.report_cursor_info(),
                2 => self.report_tabs(),
                _ => self.unhandled_csi(sel, params),
            },
            (None, Some(b'$'), None, b'r') => {
                chk_vt!(4);
                let (mask, value) = Self::rect_sgr_args(params, 4);
                let (ox, oy) = (self.screen.min_ox() as isize, self.screen.min_oy() as isize);
                let (mx, my) = (self.screen.max_ox() as i32, self.screen.max_oy() as i32);
                let (o_x, o_y) = (self.screen.min_ox() as i32, self.screen.min_oy() as i32);
                self.screen.apply_sgr_rect(
                    ox + p(1, 1) - 1,
                    oy + p(0, 1) - 1,
                    ox + p(3, mx - o_x),
                    oy + p(2, my - o_y),
                    &mask,
                    &value,
                );
            }
            (None, Some(b'$'), None, b't') => {
                chk_vt!(4);
                let (mask, _) = Self::rect_sgr_args(params, 4);
                let (ox, oy) = (self.screen.min_ox() as isize, self.screen.min_oy() as isize);
                let (mx, my) = (self.screen.max_ox() as i32, self.screen.max_oy() as i32);
                let (o_x, o_y) = (self.screen.min_ox() as i32, self.screen.min_oy() as i32);
                self.screen.reverse_sgr_rect(
                    ox + p(1, 1) - 1,
                    oy + p(0, 1) - 1,
                    ox + p(3, mx - o_x),
                    oy + p(2, my - o_y),
                    &mask,
                );
            }
            (None, Some(b'*'), None, b'y') => {
                chk_vt!(4);
                let (ox, oy) = (self.screen.min_ox() as isize, self.screen.min_oy() as isize);
                let (mx, my) = (self.screen.max_ox() as i32, self.screen.max_oy() as i32);
                let (o_x, o_y) = (self.screen.min_ox() as i32, self.screen.min_oy() as i32);
                let mode = self.checksum_mode;
                let nrcs_enabled = self.mode.enable_nrcs;
                let sum = self.screen.checksum(
                    ox + p(3, 1) - 1,
                    oy + p(2, 1) - 1,
                    ox + p(5, mx - o_x),
                    oy + p(4, my - o_y),
                    mode,
                    nrcs_enabled,
                );
                self.answerback(&format!("{}{}!~{:04X}{}", DCS, params.get(0, 0), sum, ST));
            }
            (None, Some(b'#'), None, b'y') => {
                self.checksum_mode = ChecksumMode::from_bits(params.get(0, 0).max(0) as u32);
            }

            /* Locator and mouse */
            (None, Some(b'\''), None, b'w') => self.decefr(params),
            (None, Some(b'\''), None, b'z') => self.decelr(params),
            (None, Some(b'\''), None, b'{') => self.decsle(params),
            (None, Some(b'\''), None, b'|') => self.decrqlp(),
            (None, Some(b'\''), None, b'}') => {
                chk_vt!(4);
                self.screen.insert_columns(pu(0, 1));
            }
            (None, Some(b'\''), None, b'~') => {
                chk_vt!(4);
                self.screen.delete_columns(pu(0, 1));
            }

            (Some(b'>'), None, None, b'q') => {
                // XTVERSION
                if params.get(0, 0) == 0 {
                    let reply = format!(
                        "{}>|{}({}){}",
                        DCS,
                        self.config().term_name(),
                        self.config().term_version(),
                        ST
                    );
                    self.answerback(&reply);
                }
            }

            _ => self.unhandled_csi(sel, params),
        }
    }

    /// Shared DECCARA/DECRARA tail: build the attribute mask and value
    /// from the SGR parameters starting at `from`.
    fn rect_sgr_args(params: &Params, from: usize) -> (Attr, Attr) {
        let mut mask = Attr::default();
        let mut value = Attr::default();
        let mut i = from;
        let mut saw_any = false;
        while i < params.len() {
            let v = params.get(i, 0);
            saw_any = true;
            match v {
                0 => {
                    // All of bold/underline/blink/reverse, cleared.
                    mask.set_bold(true);
                    mask.set_underline(Underline::Single);
                    mask.set_blink(true);
                    mask.set_reverse(true);
                    value = Attr::default();
                }
                1 => {
                    mask.set_bold(true);
                    value.set_bold(true);
                }
                4 => {
                    mask.set_underline(Underline::Curly);
                    value.set_underline(Underline::Single);
                }
                5 => {
                    mask.set_blink(true);
                    value.set_blink(true);
                }
                7 => {
                    mask.set_reverse(true);
                    value.set_reverse(true);
                }
                22 => {
                    mask.set_bold(true);
                    value.set_bold(false);
                }
                24 => {
                    mask.set_underline(Underline::Curly);
                    value.set_underline(Underline::None);
                }
                25 => {
                    mask.set_blink(true);
                    value.set_blink(false);
                }
                27 => {
                    mask.set_reverse(true);
                    value.set_reverse(false);
                }
                _ => {}
            }
            i = params.next_arg(i);
        }
        if !saw_any {
            // No parameters behaves like a full reset.
            mask.set_bold(true);
            mask.set_underline(Underline::Single);
            mask.set_blink(true);
            mask.set_reverse(true);
        }
        (mask, value)
    }
}

/* SGR */

impl TerminalState {
    /// Extended color following a 38/48/58 introducer.  Handles both
    /// the `;`-separated legacy form and the `:` subparameter form
    /// with its optional leading colorspace id.
    fn parse_sgr_color(params: &Params, i: &mut usize) -> Option<Color> {
        let at = *i;
        let colon = params.is_subparam(at + 1);
        let end = params.next_arg(at);

        if colon {
            // 38:5:I or 38:2[:CS]:R:G:B, all subparameters of slot i.
            let args: Vec<i32> = (at + 1..end).map(|k| params.raw(k).max(0)).collect();
            match args.first() {
                Some(5) => args.get(1).map(|&idx| Color::Palette(idx.clamp(0, 255) as u16)),
                Some(2) => {
                    let rgb: &[i32] = if args.len() >= 5 { &args[2..5] } else { &args[1..] };
                    if rgb.len() >= 3 {
                        Some(Color::Direct(Rgba::rgb(
                            rgb[0].clamp(0, 255) as u8,
                            rgb[1].clamp(0, 255) as u8,
                            rgb[2].clamp(0, 255) as u8,
                        )))
                    } else {
                        None
                    }
                }
                _ => None,
            }
        } else {
            // Legacy: consume following top-level parameters.
            match params.raw(at + 1) {
                5 => {
                    let idx = params.raw(at + 2).clamp(0, 255);
                    *i = at + 2;
                    Some(Color::Palette(idx as u16))
                }
                2 => {
                    let r = params.raw(at + 2).clamp(0, 255);
                    let g = params.raw(at + 3).clamp(0, 255);
                    let b = params.raw(at + 4).clamp(0, 255);
                    *i = at + 4;
                    Some(Color::Direct(Rgba::rgb(r as u8, g as u8, b as u8)))
                }
                _ => None,
            }
        }
    }

    pub(crate) fn csi_sgr(&mut self, params: &Params) {
        let mut i = 0;
        while i < params.len() {
            if params.is_subparam(i) {
                i += 1;
                continue;
            }
            let v = params.get(i, 0);
            let sgr = &mut self.screen.sgr;
            match v {
                0 => {
                    // Reset everything except the hyperlink, which is
                    // scoped by OSC 8 rather than SGR.
                    let uri = sgr.uri;
                    *sgr = Attr::default();
                    sgr.uri = uri;
                }
                1 => {
                    sgr.set_bold(true);
                }
                2 => {
                    sgr.set_faint(true);
                }
                3 => {
                    sgr.set_italic(true);
                }
                4 => {
                    let style = if params.is_subparam(i + 1) {
                        match params.raw(i + 1) {
                            0 => Underline::None,
                            2 => Underline::Double,
                            3 => Underline::Curly,
                            _ => Underline::Single,
                        }
                    } else {
                        Underline::Single
                    };
                    sgr.set_underline(style);
                }
                5 | 6 => {
                    sgr.set_blink(true);
                }
                7 => {
                    sgr.set_reverse(true);
                }
                8 => {
                    sgr.set_invisible(true);
                }
                9 => {
                    sgr.set_strikethrough(true);
                }
                21 => {
                    sgr.set_underline(Underline::Double);
                }
                22 => {
                    sgr.set_bold(false);
                    sgr.set_faint(false);
                }
                23 => {
                    sgr.set_italic(false);
                }
                24 => {
                    sgr.set_underline(Underline::None);
                }
                25 => {
                    sgr.set_blink(false);
                }
                27 => {
                    sgr.set_reverse(false);
                }
                28 => {
                    sgr.set_invisible(false);
                }
                29 => {
                    sgr.set_strikethrough(false);
                }
                30..=37 => sgr.fg = Color::Palette((v - 30) as u16),
                38 => {
                    if let Some(color) = Self::parse_sgr_color(params, &mut i) {
                        self.screen.sgr.fg = color;
                    }
                }
                39 => sgr.fg = Color::fg(),
                40..=47 => sgr.bg = Color::Palette((v - 40) as u16),
                48 => {
                    if let Some(color) = Self::parse_sgr_color(params, &mut i) {
                        self.screen.sgr.bg = color;
                    }
                }
                49 => sgr.bg = Color::bg(),
                58 => {
                    if let Some(color) = Self::parse_sgr_color(params, &mut i) {
                        self.screen.sgr.ul = color;
                    }
                }
                59 => sgr.ul = Color::fg(),
                90..=97 => sgr.fg = Color::Palette((v - 90 + 8) as u16),
                100..=107 => sgr.bg = Color::Palette((v - 100 + 8) as u16),
                _ => log::trace!("unhandled SGR {}", v),
            }
            i = params.next_arg(i);
        }
    }

    fn xtmodkeys(&mut self, params: &Params, set: bool) {
        let resource = params.get(0, 0);
        let value = if set { params.get(1, 0).clamp(0, 4) as u8 } else { 0 };
        let config = Arc::clone(self.config());
        match resource {
            0 => {}
            1 => {
                self.kstate.modkey_cursor = if set { value } else { config.modify_cursor() };
            }
            2 => {
                self.kstate.modkey_fn = if set { value } else { config.modify_function() };
            }
            3 => {
                self.kstate.modkey_keypad = if set { value } else { config.modify_keypad() };
            }
            4 => {
                self.kstate.modkey_other = if set {
                    value.min(2)
                } else {
                    config.modify_other()
                };
            }
            _ => {}
        }
    }
}

/* Mode registry */

impl TerminalState {
    pub(crate) fn set_mode(&mut self, private: bool, mode: u32, set: bool) {
        if !private {
            match mode {
                2 => self.mode.keyboard_locked = set,
                4 => self.screen.mode.insert = set,
                12 => self.mode.echo = !set,
                20 => self.mode.crlf = set,
                _ => log::trace!("unrecognized ANSI mode {}", mode),
            }
            return;
        }

        match mode {
            1 => self.kstate.appcursor = set,
            2 => {
                // DECANM: resetting drops to VT52.
                if !set {
                    self.set_vt52(true);
                }
            }
            3 => {
                if self.mode.enable_columns_132 {
                    self.set_columns_132(set);
                } else {
                    log::trace!("DECCOLM ignored: 132 column mode disabled");
                }
            }
            4 => self.screen.mode.smooth_scroll = set,
            5 => self.set_reverse_video(set),
            6 => {
                self.screen.c.origin = set;
                let (x, y) = (self.screen.min_ox() as isize, self.screen.min_oy() as isize);
                self.screen.move_to(x, y);
            }
            7 => self.screen.mode.wrap = set,
            8 => {
                // DECARM autorepeat: the window layer owns the
                // keyboard; nothing to store.
            }
            9 => {
                self.mstate.mode = if set { MouseMode::X10 } else { MouseMode::None };
            }
            12 => self.mstate.blinking_cursor = set,
            25 => self.screen.mode.hide_cursor = !set,
            40 => self.mode.enable_columns_132 = set,
            41 => self.screen.mode.xterm_more_hack = set,
            42 => self.mode.enable_nrcs = set,
            44 => self.screen.mode.margin_bell = set,
            45 => self.screen.mode.reverse_wrap = set,
            47 => self.screen.set_altscreen(set, false, false),
            66 => self.kstate.appkey = set,
            67 => self.kstate.backspace_is_del = !set,
            69 => {
                self.screen.mode.lr_margins = set;
                if !set {
                    let right = self.screen.width() - 1;
                    self.screen.set_lr_margins(0, right);
                }
            }
            95 => self.mode.preserve_display_132 = set,
            1000 => {
                self.mstate.mode = if set { MouseMode::Button } else { MouseMode::None };
            }
            1002 => {
                self.mstate.mode = if set { MouseMode::Drag } else { MouseMode::None };
            }
            1003 => {
                self.mstate.mode = if set { MouseMode::Motion } else { MouseMode::None };
            }
            1004 => self.mode.track_focus = set,
            1005 => self.set_mouse_format(MouseFormat::Utf8, set),
            1006 => self.set_mouse_format(MouseFormat::Sgr, set),
            1015 => self.set_mouse_format(MouseFormat::Urxvt, set),
            1016 => self.set_mouse_format(MouseFormat::SgrPixel, set),
            1010 => self.mode.scroll_on_output = set,
            1011 => self.mode.no_scroll_on_input = !set,
            1034 => self.kstate.has_meta = set,
            1035 => self.kstate.allow_numlock = set,
            1036 => self.kstate.meta_escape = set,
            1037 => self.kstate.delete_is_del = set,
            1040 => self.mode.keep_clipboard = set,
            1041 => self.mode.select_to_clipboard = set,
            1042 => self.mode.bell_urgent = set,
            1043 => self.mode.bell_raise = set,
            1044 => self.mode.allow_change_clipboard = set,
            1046 => {
                self.screen.mode.disable_altscreen = !set;
                if !set && self.screen.altscreen() {
                    self.screen.set_altscreen(false, false, false);
                }
            }
            1047 => {
                if set {
                    self.screen.set_altscreen(true, true, false);
                } else {
                    self.screen.set_altscreen(false, false, false);
                }
            }
            1048 => self.screen.save_cursor(set),
            1049 => self.screen.set_altscreen(set, set, true),
            1050 => {
                // Termcap/terminfo function keys: the default layout.
                if set {
                    self.kstate.mapping = KeyMap::Default;
                } else {
                    self.kstate.mapping = self.config().keyboard_mapping();
                }
            }
            1051 => self.set_keymap(KeyMap::Sun, set),
            1052 => self.set_keymap(KeyMap::Hp, set),
            1053 => self.set_keymap(KeyMap::Sco, set),
            1060 => self.set_keymap(KeyMap::Legacy, set),
            1061 => self.set_keymap(KeyMap::Vt220, set),
            2004 => self.mode.bracketed_paste = set,
            2005 => self.mode.paste_quote = set,
            2006 => self.mode.paste_literal_nl = set,
            2026 => {
                self.mode.synchronized_updates = set;
                if let Some(win) = self.window() {
                    win.set_sync(set);
                }
            }
            _ => log::trace!("unrecognized DEC mode {}", mode),
        }
    }

    fn set_mouse_format(&mut self, format: MouseFormat, set: bool) {
        if set {
            self.mstate.format = format;
        } else if self.mstate.format == format {
            self.mstate.format = MouseFormat::Default;
        }
    }

    fn set_keymap(&mut self, map: KeyMap, set: bool) {
        if set {
            self.kstate.mapping = map;
        } else if self.kstate.mapping == map {
            self.kstate.mapping = self.config().keyboard_mapping();
        }
    }

    pub(crate) fn mode_status(&self, private: bool, mode: u32) -> ModeStatus {
        use ModeStatus::*;
        if !private {
            return match mode {
                2 => ModeStatus::from_flag(self.mode.keyboard_locked),
                4 => ModeStatus::from_flag(self.screen.mode.insert),
                12 => ModeStatus::from_flag(!self.mode.echo),
                20 => ModeStatus::from_flag(self.mode.crlf),
                _ => Unrecognized,
            };
        }
        match mode {
            1 => ModeStatus::from_flag(self.kstate.appcursor),
            2 => ModeStatus::from_flag(!self.kstate.vt52),
            3 => ModeStatus::from_flag(self.mode.columns_132),
            4 => ModeStatus::from_flag(self.screen.mode.smooth_scroll),
            5 => ModeStatus::from_flag(self.mode.reverse_video),
            6 => ModeStatus::from_flag(self.screen.c.origin),
            7 => ModeStatus::from_flag(self.screen.mode.wrap),
            8 => AlwaysEnabled,
            9 => ModeStatus::from_flag(self.mstate.mode == MouseMode::X10),
            12 => ModeStatus::from_flag(self.mstate.blinking_cursor),
            25 => ModeStatus::from_flag(!self.screen.mode.hide_cursor),
            40 => ModeStatus::from_flag(self.mode.enable_columns_132),
            41 => ModeStatus::from_flag(self.screen.mode.xterm_more_hack),
            42 => ModeStatus::from_flag(self.mode.enable_nrcs),
            44 => ModeStatus::from_flag(self.screen.mode.margin_bell),
            45 => ModeStatus::from_flag(self.screen.mode.reverse_wrap),
            47 | 1047 => ModeStatus::from_flag(self.screen.altscreen()),
            66 => ModeStatus::from_flag(self.kstate.appkey),
            67 => ModeStatus::from_flag(!self.kstate.backspace_is_del),
            69 => ModeStatus::from_flag(self.screen.mode.lr_margins),
            95 => ModeStatus::from_flag(self.mode.preserve_display_132),
            1000 => ModeStatus::from_flag(self.mstate.mode == MouseMode::Button),
            1002 => ModeStatus::from_flag(self.mstate.mode == MouseMode::Drag),
            1003 => ModeStatus::from_flag(self.mstate.mode == MouseMode::Motion),
            1004 => ModeStatus::from_flag(self.mode.track_focus),
            1005 => ModeStatus::from_flag(self.mstate.format == MouseFormat::Utf8),
            1006 => ModeStatus::from_flag(self.mstate.format == MouseFormat::Sgr),
            1015 => ModeStatus::from_flag(self.mstate.format == MouseFormat::Urxvt),
            1016 => ModeStatus::from_flag(self.mstate.format == MouseFormat::SgrPixel),
            1010 => ModeStatus::from_flag(self.mode.scroll_on_output),
            1011 => ModeStatus::from_flag(!self.mode.no_scroll_on_input),
            1034 => ModeStatus::from_flag(self.kstate.has_meta),
            1035 => ModeStatus::from_flag(self.kstate.allow_numlock),
            1036 => ModeStatus::from_flag(self.kstate.meta_escape),
            1037 => ModeStatus::from_flag(self.kstate.delete_is_del),
            1040 => ModeStatus::from_flag(self.mode.keep_clipboard),
            1041 => ModeStatus::from_flag(self.mode.select_to_clipboard),
            1042 => ModeStatus::from_flag(self.mode.bell_urgent),
            1043 => ModeStatus::from_flag(self.mode.bell_raise),
            1044 => ModeStatus::from_flag(self.mode.allow_change_clipboard),
            1046 => ModeStatus::from_flag(!self.screen.mode.disable_altscreen),
            1048 => Enabled,
            1049 => ModeStatus::from_flag(self.screen.altscreen()),
            1050 => ModeStatus::from_flag(self.kstate.mapping == KeyMap::Default),
            1051 => ModeStatus::from_flag(self.kstate.mapping == KeyMap::Sun),
            1052 => ModeStatus::from_flag(self.kstate.mapping == KeyMap::Hp),
            1053 => ModeStatus::from_flag(self.kstate.mapping == KeyMap::Sco),
            1060 => ModeStatus::from_flag(self.kstate.mapping == KeyMap::Legacy),
            1061 => ModeStatus::from_flag(self.kstate.mapping == KeyMap::Vt220),
            2004 => ModeStatus::from_flag(self.mode.bracketed_paste),
            2005 => ModeStatus::from_flag(self.mode.paste_quote),
            2006 => ModeStatus::from_flag(self.mode.paste_literal_nl),
            2026 => ModeStatus::from_flag(self.mode.synchronized_updates),
            _ => Unrecognized,
        }
    }
}

/* XTWINOPS */

impl TerminalState {
    fn xtwinops(&mut self, params: &Params) {
        if !self.config().allow_window_ops() {
            log::trace!("XTWINOPS {} ignored", params.get(0, 0));
            return;
        }
        match params.get(0, 0) {
            1 | 2 | 5 | 6 | 9 | 10 => {
                // Iconify/deiconify/stacking: deliberately not plumbed.
                log::trace!("window stacking op {} ignored", params.get(0, 0));
            }
            3 => {
                // Move: reported but not acted upon.
            }
            4 => {
                let h = params.get(1, 0).max(0) as usize;
                let w = params.get(2, 0).max(0) as usize;
                if let Some(win) = self.window() {
                    win.resize(w, h);
                }
            }
            7 => {
                self.screen.damage_lines(0, self.screen.height());
            }
            8 => {
                let rows = params.get(1, 24).max(1) as usize;
                let cols = params.get(2, 80).max(1) as usize;
                self.request_resize_cells(Some(cols), Some(rows));
            }
            11 => self.answerback(&format!("{}1t", CSI)),
            13 => {
                let pos = self.window().map(|w| w.get_position()).unwrap_or((0, 0));
                self.answerback(&format!("{}3;{};{}t", CSI, pos.0, pos.1));
            }
            14 => {
                let size = self
                    .window()
                    .map(|w| {
                        let cell = w.get_cell_size();
                        let grid = w.get_grid_size();
                        (grid.width * cell.width, grid.height * cell.height)
                    })
                    .unwrap_or((0, 0));
                self.answerback(&format!("{}4;{};{}t", CSI, size.1, size.0));
            }
            16 => {
                let cell = self
                    .window()
                    .map(|w| w.get_cell_size())
                    .unwrap_or_default();
                self.answerback(&format!("{}6;{};{}t", CSI, cell.height, cell.width));
            }
            18 => {
                let (w, h) = (self.screen.width(), self.screen.height());
                self.answerback(&format!("{}8;{};{}t", CSI, h, w));
            }
            19 => {
                let screen = self
                    .window()
                    .map(|w| w.get_screen_size())
                    .unwrap_or_default();
                let cell = self
                    .window()
                    .map(|w| w.get_cell_size())
                    .unwrap_or_default();
                let (w, h) = if cell.width > 0 && cell.height > 0 {
                    (screen.width / cell.width, screen.height / cell.height)
                } else {
                    (0, 0)
                };
                self.answerback(&format!("{}9;{};{}t", CSI, h, w));
            }
            20 => {
                let label = self.icon_title().to_string();
                let label = self.encode_title(&label);
                self.answerback(&format!("{}L{}{}", crate::OSC, label, ST));
            }
            21 => {
                let title = self.title().to_string();
                let title = self.encode_title(&title);
                self.answerback(&format!("{}l{}{}", crate::OSC, title, ST));
            }
            22 => self.title_push(),
            23 => self.title_pop(),
            n if n >= 24 => {
                self.request_resize_cells(None, Some(n.max(1) as usize));
            }
            _ => log::trace!("unhandled XTWINOPS {}", params.get(0, 0)),
        }
    }
}

/* OSC dispatch */

impl TerminalState {
    /// Title payloads honor the hex and UTF-8 set flags.
    fn decode_title(&self, data: &[u8]) -> String {
        if self.mode.title_set_hex {
            if let Some(bytes) = hex_decode(data) {
                return String::from_utf8_lossy(&bytes).into_owned();
            }
        }
        if self.mode.title_set_utf8 || self.mode.utf8 {
            String::from_utf8_lossy(data).into_owned()
        } else {
            data.iter().map(|&b| b as char).collect()
        }
    }

    fn encode_title(&self, title: &str) -> String {
        if self.mode.title_query_hex {
            let mut out = String::new();
            for b in title.bytes() {
                write!(&mut out, "{:02X}", b).ok();
            }
            out
        } else if self.mode.title_query_utf8 {
            title.to_string()
        } else {
            title.chars().map(|c| if (c as u32) < 0x100 { c } else { '?' }).collect()
        }
    }

    fn osc_color_slot(&self, num: u32) -> Option<u16> {
        use cellgrid::{SPECIAL_BG, SPECIAL_CURSOR_BG, SPECIAL_CURSOR_FG, SPECIAL_FG};
        let rev = self.mode.reverse_video;
        Some(match num {
            10 => {
                if rev {
                    SPECIAL_BG
                } else {
                    SPECIAL_FG
                }
            }
            11 => {
                if rev {
                    SPECIAL_FG
                } else {
                    SPECIAL_BG
                }
            }
            12 => {
                if rev {
                    SPECIAL_CURSOR_FG
                } else {
                    SPECIAL_CURSOR_BG
                }
            }
            _ => return None,
        })
    }

    pub(crate) fn osc_dispatch(&mut self, num: u32, data: &[u8]) {
        match num {
            0 => {
                let title = self.decode_title(data);
                self.update_title(TitleTarget::Both, title);
            }
            1 => {
                let title = self.decode_title(data);
                self.update_title(TitleTarget::IconLabel, title);
            }
            2 => {
                let title = self.decode_title(data);
                self.update_title(TitleTarget::Title, title);
            }
            4 | 5 => {
                // Color pairs: idx;spec;idx;spec...  OSC 5 addresses
                // the special slots above 255.
                let base = if num == 5 { 256 } else { 0 };
                let mut parts = data.split(|&b| b == b';');
                while let (Some(idx), Some(spec)) = (parts.next(), parts.next()) {
                    let idx = match std::str::from_utf8(idx).ok().and_then(|s| s.parse::<usize>().ok())
                    {
                        Some(idx) => idx + base,
                        None => continue,
                    };
                    if idx >= cellgrid::PALETTE_SIZE {
                        continue;
                    }
                    if spec == b"?" {
                        let color = self.palette.colors[idx];
                        let reply = format!(
                            "{}{};{};{}{}",
                            crate::OSC,
                            num,
                            idx - base,
                            color,
                            ST
                        );
                        self.answerback(&reply);
                    } else if let Some(color) =
                        std::str::from_utf8(spec).ok().and_then(Rgba::parse)
                    {
                        self.palette.colors[idx] = color;
                        self.screen.damage_lines(0, self.screen.height());
                    }
                }
            }
            104 | 105 => {
                let base = if num == 105 { 256 } else { 0 };
                if data.is_empty() {
                    for i in 0..256 {
                        self.palette.colors[i] = cellgrid::color::base256(i as u8);
                    }
                } else {
                    for idx in data.split(|&b| b == b';') {
                        if let Some(idx) =
                            std::str::from_utf8(idx).ok().and_then(|s| s.parse::<usize>().ok())
                        {
                            let idx = idx + base;
                            if idx < 256 {
                                self.palette.colors[idx] = cellgrid::color::base256(idx as u8);
                            }
                        }
                    }
                }
                self.screen.damage_lines(0, self.screen.height());
            }
            10..=19 => {
                let slot = match self.osc_color_slot(num) {
                    Some(slot) => slot as usize,
                    None => {
                        log::trace!("unhandled dynamic color OSC {}", num);
                        return;
                    }
                };
                if data == b"?" {
                    let color = self.palette.colors[slot];
                    let reply = format!("{}{};{}{}", crate::OSC, num, color, ST);
                    self.answerback(&reply);
                } else if let Some(color) = std::str::from_utf8(data).ok().and_then(Rgba::parse) {
                    self.palette.colors[slot] = color;
                    let (bg, cur_fg) = (
                        self.palette.colors[cellgrid::SPECIAL_BG as usize],
                        self.palette.colors[cellgrid::SPECIAL_CURSOR_FG as usize],
                    );
                    if let Some(win) = self.window() {
                        win.set_colors(bg, cur_fg);
                    }
                    self.screen.damage_lines(0, self.screen.height());
                }
            }
            110..=119 => {
                if let Some(slot) = self.osc_color_slot(num - 100) {
                    let default = match slot {
                        s if s == cellgrid::SPECIAL_BG => Rgba::rgb(0, 0, 0),
                        s if s == cellgrid::SPECIAL_CURSOR_FG => Rgba::rgb(0, 0, 0),
                        _ => Rgba::rgb(0xff, 0xff, 0xff),
                    };
                    self.palette.colors[slot as usize] = default;
                    self.screen.damage_lines(0, self.screen.height());
                }
            }
            7 => {
                let text = String::from_utf8_lossy(data);
                self.current_dir = Url::parse(&text).ok();
            }
            8 => {
                // params;uri
                let mut split = data.splitn(2, |&b| b == b';');
                let params = split.next().unwrap_or(b"");
                let uri = split.next().unwrap_or(b"");
                let external_id = params
                    .split(|&b| b == b':')
                    .find_map(|kv| kv.strip_prefix(b"id="))
                    .map(|v| String::from_utf8_lossy(v).into_owned());

                let new_uri = if uri.is_empty() {
                    None
                } else {
                    let text = String::from_utf8_lossy(uri).into_owned();
                    Some(self.screen.uris.intern(&text, external_id.as_deref()))
                };
                let old = self.screen.sgr.uri;
                self.screen.sgr.uri = new_uri;
                if let Some(old) = old {
                    self.screen.uris.decref(old);
                }
            }
            52 => {
                let mut split = data.splitn(2, |&b| b == b';');
                let targets = split.next().unwrap_or(b"");
                let payload = split.next().unwrap_or(b"");
                let targets: Vec<ClipboardTarget> = if targets.is_empty() {
                    vec![ClipboardTarget::Select]
                } else {
                    targets
                        .iter()
                        .filter_map(|&b| ClipboardTarget::from_selector(b))
                        .collect()
                };
                if payload == b"?" {
                    let target = targets.first().copied().unwrap_or(ClipboardTarget::Clipboard);
                    let data = self
                        .clipboard_cached(target)
                        .map(crate::clipboard::base64_encode)
                        .unwrap_or_default();
                    let reply = format!(
                        "{}52;{};{}{}",
                        crate::OSC,
                        target.selector(),
                        data,
                        ST
                    );
                    self.answerback(&reply);
                } else if self.mode.allow_change_clipboard || !self.mode.keep_clipboard {
                    let decoded = crate::clipboard::base64_decode(payload);
                    for target in targets {
                        self.clipboard_set(target, decoded.clone());
                    }
                }
            }
            133 => {
                // Shell integration marks.
                match data.first() {
                    Some(b'A') => {
                        self.screen.ensure_new_paragraph();
                        let span = self.screen.span(self.screen.c.y);
                        let storage = if self.screen.mode.altscreen {
                            &mut self.screen.alt
                        } else {
                            &mut self.screen.main
                        };
                        storage.store.line_mut(span.line).sh_ps1_start = true;
                    }
                    Some(b'B') => {
                        let y = self.screen.c.y;
                        let at_left = self.screen.c.x <= self.screen.min_x();
                        let span = self.screen.span(y);
                        let storage = if self.screen.mode.altscreen {
                            &mut self.screen.alt
                        } else {
                            &mut self.screen.main
                        };
                        let line = if at_left {
                            storage.store.line(span.line).prev().unwrap_or(span.line)
                        } else {
                            span.line
                        };
                        storage.store.line_mut(line).sh_cmd_start = true;
                    }
                    Some(b'C') | Some(b'D') => {}
                    _ => log::trace!("unhandled OSC 133 {:?}", data),
                }
            }
            _ => {
                if self.config().trace_controls() {
                    log::warn!("unhandled OSC {} {:?}", num, String::from_utf8_lossy(data));
                }
            }
        }
    }
}

fn hex_decode(data: &[u8]) -> Option<Vec<u8>> {
    if data.len() % 2 != 0 {
        return None;
    }
    let digit = |b: u8| (b as char).to_digit(16).map(|d| d as u8);
    let mut out = Vec::with_capacity(data.len() / 2);
    for pair in data.chunks(2) {
        out.push(digit(pair[0])? << 4 | digit(pair[1])?);
    }
    Some(out)
}

fn hex_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for &b in data {
        write!(&mut out, "{:02X}", b).ok();
    }
    out
}

/* DCS dispatch */

impl TerminalState {
    pub(crate) fn dcs_dispatch(&mut self, sel: Selector, params: &Params, data: &[u8]) {
        match sel.parts() {
            (None, Some(b'$'), None, b'q') => self.decrqss(data),
            (Some(b'='), None, None, b's') => {
                // iTerm2 synchronized update begin/end.
                match params.get(0, 0) {
                    1 => {
                        self.mode.synchronized_updates = true;
                        if let Some(win) = self.window() {
                            win.set_sync(true);
                        }
                    }
                    2 => {
                        self.mode.synchronized_updates = false;
                        if let Some(win) = self.window() {
                            win.set_sync(false);
                        }
                    }
                    _ => log::trace!("unhandled sync update {:?}", params.as_slice()),
                }
            }
            (None, None, None, b'|') => {
                // DECUDK
                let clear = params.get(0, 0) == 0;
                let lock = params.get(1, 0) == 0;
                self.set_udk(data, clear, lock);
            }
            (None, Some(b'!'), None, b'u') => {
                // DECAUPSS
                let (fin, i1) = match data.len() {
                    1 => (data[0], None),
                    2 => (data[1], Some(data[0])),
                    _ => return,
                };
                let is96 = params.get(0, 0) == 1;
                if let Some(cs) = nrcs::parse(fin, i1, is96, self.vt_level, self.mode.enable_nrcs)
                {
                    self.screen.upcs = cs;
                }
            }
            (None, Some(b'$'), None, b't') => {
                // DECRSPS: restore a presentation report.
                match params.get(0, 0) {
                    1 => {
                        if !self.parse_cursor_report(data) {
                            log::trace!("malformed DECCIR payload");
                        }
                    }
                    2 => {
                        if !self.parse_tabs_report(data) {
                            log::trace!("malformed DECTABSR payload");
                        }
                    }
                    _ => log::trace!("unhandled DECRSPS {:?}", params.as_slice()),
                }
            }
            (None, Some(b'+'), None, b'q') => {
                // XTGETTCAP, termcap names hex encoded.
                let name = hex_decode(data).unwrap_or_default();
                let known = name == b"Co" || name == b"colors";
                if known {
                    let value = format!("{}", 256);
                    let reply = format!(
                        "{}1+r{}={}{}",
                        DCS,
                        hex_encode(&name),
                        hex_encode(value.as_bytes()),
                        ST
                    );
                    self.answerback(&reply);
                } else {
                    self.answerback(&format!("{}0+r{}", DCS, ST));
                }
            }
            (_, None, None, b'q') => {
                // Sixel; recognized and discarded (graphics are out of
                // scope).
                log::trace!("sixel data ignored ({} bytes)", data.len());
            }
            _ => {
                if self.config().trace_controls() {
                    log::warn!("unhandled DCS {} ({} bytes)", sel, data.len());
                }
            }
        }
    }

    /// DECUDK payload: `key/hexvalue;key/hexvalue...`
    fn set_udk(&mut self, data: &[u8], clear: bool, lock: bool) {
        if self.kstate.udk_locked {
            return;
        }
        if clear {
            self.udk.clear();
        }
        for entry in data.split(|&b| b == b';') {
            let mut kv = entry.splitn(2, |&b| b == b'/');
            let key = kv
                .next()
                .and_then(|k| std::str::from_utf8(k).ok())
                .and_then(|k| k.parse::<u32>().ok());
            let val = kv.next().and_then(hex_decode);
            if let (Some(key), Some(val)) = (key, val) {
                self.udk.insert(key, val);
            }
        }
        self.kstate.udk_locked = lock;
    }

    pub(crate) fn udk_lookup(&self, key: u32) -> Option<&[u8]> {
        self.udk.get(&key).map(|v| v.as_slice())
    }
}
