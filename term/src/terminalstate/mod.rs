//! The terminal state machine: everything that is not the screen
//! model itself.  Modes, reports, input translation and mouse
//! reporting live in the submodules; this module owns the state
//! struct, the answerback encoder and mode dispatch.

use crate::cellspec::Palette;
use crate::clipboard::{ClipboardTarget, Paster};
use crate::config::TerminalConfiguration;
use crate::cursor::Cursor;
use crate::input::{KeyMap, ModifyOtherFormat};
use crate::modes::{SavedModes, TermMode};
use crate::screen::{ChecksumMode, Screen, ScreenMode};
use crate::urimatch::UriMatcher;
use crate::window::{TitleTarget, WindowOps};
use cellgrid::Rgba;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use url::Url;

pub(crate) mod keyboard;
pub(crate) mod mouse;
pub(crate) mod performer;
pub(crate) mod reports;

pub use mouse::{MouseFormat, MouseMode};

/// Everything the input translator consults per key event.
#[derive(Debug, Clone)]
pub struct KeyboardState {
    pub vt52: bool,
    pub appkey: bool,
    pub appcursor: bool,
    pub keylock: bool,
    pub has_meta: bool,
    pub meta_escape: bool,
    pub backspace_is_del: bool,
    pub delete_is_del: bool,
    pub allow_numlock: bool,
    pub fkey_inc_step: u8,
    pub mapping: KeyMap,
    pub modkey_cursor: u8,
    pub modkey_fn: u8,
    pub modkey_keypad: u8,
    pub modkey_other: u8,
    pub modkey_other_fmt: ModifyOtherFormat,
    pub udk_locked: bool,
}

impl KeyboardState {
    fn from_config(config: &dyn TerminalConfiguration) -> Self {
        KeyboardState {
            vt52: false,
            appkey: config.app_keypad(),
            appcursor: config.app_cursor(),
            keylock: false,
            has_meta: config.has_meta(),
            meta_escape: config.meta_is_escape(),
            backspace_is_del: config.backspace_is_delete(),
            delete_is_del: config.delete_is_delete(),
            allow_numlock: config.allow_numlock(),
            fkey_inc_step: config.fkey_increment(),
            mapping: config.keyboard_mapping(),
            modkey_cursor: config.modify_cursor(),
            modkey_fn: config.modify_function(),
            modkey_keypad: config.modify_keypad(),
            modkey_other: config.modify_other(),
            modkey_other_fmt: config.modify_other_format(),
            udk_locked: false,
        }
    }
}

/// State saved around VT52 mode so `ESC <` can restore the ANSI
/// personality.
struct Vt52Saved {
    cursor: Cursor,
    mode: TermMode,
    screen_mode: ScreenMode,
}

pub struct TerminalState {
    pub screen: Screen,
    config: Arc<dyn TerminalConfiguration>,

    pub mode: TermMode,
    saved_modes: SavedModes,
    pub kstate: KeyboardState,
    pub mstate: mouse::MouseState,
    pub checksum_mode: ChecksumMode,

    vt_version: u16,
    vt_level: u8,
    vt52_saved: Option<Vt52Saved>,

    /// Warning bell volume (DECSWBV).
    bvol: u8,
    /// DECSCUSR shape: 0/1 blinking block through 6 steady bar.
    pub cursor_shape: u8,

    pub palette: Palette,

    title: String,
    icon_title: String,
    title_stack: Vec<(String, String)>,
    pub current_dir: Option<Url>,

    /// DECUDK definitions, keyed by the function key number.
    udk: HashMap<u32, Vec<u8>>,

    /// Local mirror of clipboard contents, consulted by OSC 52
    /// queries and refreshed by the window layer.
    clip_cache: HashMap<char, Vec<u8>>,

    pub paster: Paster,
    pub urim: UriMatcher,
    /// Anchor of the URI match in progress on the output line.
    pub(crate) uri_bookmark: Option<cellgrid::HandleId>,

    window: Option<Box<dyn WindowOps>>,
    writer: Box<dyn Write>,
    /// MC print destination; absent means "no printer attached".
    printer_sink: Option<Box<dyn Write>>,
    /// MC 5 engaged: the embedder's TTY layer must sieve the stream
    /// through its printer controller until `CSI 4 i` comes back.
    pub print_controller: bool,

    /// The scanner needs re-syncing after these change.
    scanner_dirty: bool,
}

impl TerminalState {
    pub fn new(
        width: usize,
        height: usize,
        config: Arc<dyn TerminalConfiguration>,
        writer: Box<dyn Write>,
    ) -> TerminalState {
        let vt_version = config.vt_version();
        let screen = Screen::new(width, height, Arc::clone(&config));
        let mut state = TerminalState {
            screen,
            mode: TermMode {
                utf8: config.utf8(),
                title_set_utf8: config.utf8(),
                title_query_utf8: config.utf8(),
                enable_columns_132: config.enable_columns_132(),
                enable_nrcs: config.enable_nrcs(),
                scroll_on_output: config.scroll_on_output(),
                no_scroll_on_input: !config.scroll_on_input(),
                keep_clipboard: config.keep_clipboard(),
                paste_literal_nl: config.paste_literal_nl(),
                ..TermMode::default()
            },
            saved_modes: SavedModes::default(),
            kstate: KeyboardState::from_config(config.as_ref()),
            mstate: mouse::MouseState::default(),
            checksum_mode: ChecksumMode::default(),
            vt_version,
            vt_level: (vt_version / 100).min(5) as u8,
            vt52_saved: None,
            bvol: config.bell_volume(),
            cursor_shape: 0,
            palette: Palette::default(),
            title: String::new(),
            icon_title: String::new(),
            title_stack: Vec::new(),
            current_dir: None,
            udk: HashMap::new(),
            clip_cache: HashMap::new(),
            paster: Paster::default(),
            urim: UriMatcher::new(&config.uri_protocols()),
            uri_bookmark: None,
            window: None,
            writer,
            printer_sink: None,
            print_controller: false,
            scanner_dirty: false,
            config,
        };
        if state.vt_level == 0 {
            state.set_vt52(true);
        }
        state
    }

    pub fn set_window(&mut self, window: Box<dyn WindowOps>) {
        self.window = Some(window);
    }

    pub fn window(&mut self) -> Option<&mut Box<dyn WindowOps>> {
        self.window.as_mut()
    }

    pub fn config(&self) -> &Arc<dyn TerminalConfiguration> {
        &self.config
    }

    pub fn vt_level(&self) -> u8 {
        self.vt_level
    }

    pub fn vt_version(&self) -> u16 {
        self.vt_version
    }

    pub fn utf8(&self) -> bool {
        self.mode.utf8
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn icon_title(&self) -> &str {
        &self.icon_title
    }

    /// Propagate emulation properties into the scanner between reads.
    pub fn sync_scanner(&mut self, scanner: &mut vtscan::Scanner) {
        if self.scanner_dirty {
            scanner.set_utf8(self.mode.utf8);
            scanner.set_vt_level(if self.kstate.vt52 { 0 } else { self.vt_level });
            scanner.set_osc_title_utf8(self.mode.title_set_utf8 && !self.mode.title_set_hex);
            self.scanner_dirty = false;
        }
    }

    pub(crate) fn mark_scanner_dirty(&mut self) {
        self.scanner_dirty = true;
    }

    /* Reply plumbing */

    /// Write a report to the PTY.  The string uses 8-bit C1 controls;
    /// they are rewritten as `ESC Fe` pairs unless S8C1T is in effect
    /// at VT200 level or above.
    pub fn answerback(&mut self, s: &str) {
        let eight_bit = self.mode.eight_bit && self.vt_level >= 2;
        let mut bytes = Vec::with_capacity(s.len() + 8);
        for ch in s.chars() {
            let cp = ch as u32;
            if (0x80..0xa0).contains(&cp) {
                if eight_bit {
                    bytes.push(cp as u8);
                } else {
                    bytes.push(0x1b);
                    bytes.push((cp as u8) ^ 0xc0);
                }
            } else if cp < 0x80 {
                bytes.push(cp as u8);
            } else {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
        }
        log::trace!("reply: {}", String::from_utf8_lossy(&bytes).escape_debug());
        if self.writer.write_all(&bytes).is_err() {
            log::warn!("tty is gone, dropping reply");
        }
        self.writer.flush().ok();
    }

    /// Bytes that must reach the PTY verbatim (legacy mouse coords
    /// carry raw high bytes that are not C1 controls).
    pub(crate) fn reply_raw(&mut self, bytes: &[u8]) {
        if self.writer.write_all(bytes).is_err() {
            log::warn!("tty is gone, dropping reply");
        }
        self.writer.flush().ok();
    }

    /// Raw key/paste bytes toward the PTY, honoring LNM translation.
    pub fn send_input(&mut self, bytes: &[u8]) {
        if self.mode.crlf && bytes.contains(&b'\r') {
            let mut rewritten = Vec::with_capacity(bytes.len() + 4);
            for &b in bytes {
                rewritten.push(b);
                if b == b'\r' {
                    rewritten.push(b'\n');
                }
            }
            self.writer.write_all(&rewritten).ok();
        } else {
            self.writer.write_all(bytes).ok();
        }
        self.writer.flush().ok();

        if !self.mode.no_scroll_on_input {
            self.screen.reset_view(true);
        }

        if self.mode.echo {
            // Local echo shows controls in caret notation.
            let bytes = bytes.to_vec();
            for b in bytes {
                if b < 0x20 || b == 0x7f {
                    self.screen.put_char('^');
                    self.screen.put_char((b ^ 0x40) as char);
                } else {
                    self.screen.put_char(b as char);
                }
            }
        }
    }

    /* Window conveniences */

    pub fn bell(&mut self) {
        let vol = self.bvol;
        let urgent = self.mode.bell_urgent;
        if let Some(win) = self.window.as_mut() {
            win.bell(vol);
            if urgent {
                win.set_urgency(true);
            }
        }
    }

    pub fn set_bell_volume(&mut self, vol: u8) {
        self.bvol = vol;
    }

    pub fn bell_volume(&self) -> u8 {
        self.bvol
    }

    fn update_title(&mut self, target: TitleTarget, text: String) {
        match target {
            TitleTarget::Title => self.title = text.clone(),
            TitleTarget::IconLabel => self.icon_title = text.clone(),
            TitleTarget::Both => {
                self.title = text.clone();
                self.icon_title = text.clone();
            }
        }
        if let Some(win) = self.window.as_mut() {
            win.set_title(target, Some(&text));
        }
    }

    pub(crate) fn title_push(&mut self) {
        self.title_stack
            .push((self.title.clone(), self.icon_title.clone()));
        // xterm caps the stack at ten entries.
        if self.title_stack.len() > 10 {
            self.title_stack.remove(0);
        }
    }

    pub(crate) fn title_pop(&mut self) {
        if let Some((title, icon)) = self.title_stack.pop() {
            self.update_title(TitleTarget::Title, title);
            self.update_title(TitleTarget::IconLabel, icon);
        }
    }

    /// Drain pending screen side effects into the window.
    pub fn flush_screen_events(&mut self) {
        let bell = self.screen.events.bell.take();
        let flush = std::mem::take(&mut self.screen.events.scroll_flush);
        let autoprint = std::mem::take(&mut self.screen.events.autoprint);
        if let Some(vol) = bell {
            if let Some(win) = self.window.as_mut() {
                win.bell(vol);
            }
        }
        if flush {
            if let Some(win) = self.window.as_mut() {
                win.request_scroll_flush();
            }
        }
        for line in autoprint {
            self.print_bytes(&line);
        }
    }

    pub fn set_printer_sink(&mut self, sink: Option<Box<dyn Write>>) {
        self.printer_sink = sink;
    }

    pub fn printer_available(&self) -> bool {
        self.printer_sink.is_some()
    }

    /// Feed bytes to the printer sink; silently dropped without one.
    pub fn print_bytes(&mut self, bytes: &[u8]) {
        if let Some(sink) = self.printer_sink.as_mut() {
            sink.write_all(bytes).ok();
        }
    }

    /* Clipboard */

    pub fn clipboard_cached(&self, target: ClipboardTarget) -> Option<&[u8]> {
        self.clip_cache.get(&target.selector()).map(|v| v.as_slice())
    }

    /// The window layer reports fresh clipboard contents.
    pub fn clipboard_available(&mut self, target: ClipboardTarget, data: Vec<u8>) {
        self.clip_cache.insert(target.selector(), data);
    }

    pub(crate) fn clipboard_set(&mut self, target: ClipboardTarget, data: Option<Vec<u8>>) {
        match &data {
            Some(d) => {
                self.clip_cache.insert(target.selector(), d.clone());
            }
            None => {
                self.clip_cache.remove(&target.selector());
            }
        }
        if let Some(win) = self.window.as_mut() {
            win.set_clip(target, data);
        }
    }

    /* Paste pipeline */

    pub fn paste_begin(&mut self) {
        let flags = crate::clipboard::PasteFlags {
            bracketed: self.mode.bracketed_paste,
            quote: self.mode.paste_quote,
            literal_nl: self.mode.paste_literal_nl,
        };
        let head = self.paster.begin(flags);
        if !head.is_empty() {
            self.writer.write_all(&head).ok();
        }
    }

    pub fn paste_chunk(&mut self, data: &[u8]) {
        let chunk = self.paster.chunk(data);
        if !chunk.is_empty() {
            self.writer.write_all(&chunk).ok();
            self.writer.flush().ok();
        }
    }

    pub fn paste_end(&mut self) {
        let tail = self.paster.end();
        if !tail.is_empty() {
            self.writer.write_all(&tail).ok();
            self.writer.flush().ok();
        }
    }

    pub fn paste_cancel(&mut self) {
        self.paster.cancel();
    }

    /* Focus */

    pub fn focus_changed(&mut self, focused: bool) {
        self.mode.focused = focused;
        if self.mode.track_focus {
            self.answerback(if focused { "\u{9b}I" } else { "\u{9b}O" });
        }
    }

    /* Resize entry point */

    pub fn resize(&mut self, width: usize, height: usize) {
        self.screen.resize(width, height);
    }

    /* VT52 */

    pub(crate) fn set_vt52(&mut self, enter: bool) {
        use crate::nrcs::Charset;
        if enter {
            self.kstate.vt52 = true;
            self.vt_level = 0;
            self.vt52_saved = Some(Vt52Saved {
                cursor: self.screen.c,
                mode: self.mode.clone(),
                screen_mode: self.screen.mode.clone(),
            });
            let c = &mut self.screen.c;
            c.gl = 0;
            c.gl_ss = 0;
            c.gr = 2;
            c.gn = [
                Charset::Ascii,
                Charset::Ascii,
                Charset::Ascii,
                Charset::DecGraph,
            ];
            let focused = self.mode.focused;
            let reverse = self.mode.reverse_video;
            self.mode = TermMode {
                focused,
                reverse_video: reverse,
                utf8: false,
                ..TermMode::default()
            };
            self.screen.mode = ScreenMode {
                wrap: true,
                ..ScreenMode::default()
            };
            self.screen.set_altscreen(false, false, false);
        } else {
            self.kstate.vt52 = false;
            self.vt_level = (self.vt_version / 100).min(5).max(1) as u8;
            if let Some(saved) = self.vt52_saved.take() {
                let (x, y, pending) = (self.screen.c.x, self.screen.c.y, self.screen.c.pending);
                self.screen.c = saved.cursor;
                self.screen.c.x = x;
                self.screen.c.y = y;
                self.screen.c.pending = pending;
                let was_alt = self.screen.mode.altscreen;
                self.screen.mode = saved.screen_mode;
                self.screen.mode.altscreen = false;
                self.mode = saved.mode;
                self.screen.set_altscreen(was_alt, false, false);
            }
        }
        self.mark_scanner_dirty();
    }

    /* Reverse video swaps the defining palette entries. */

    pub(crate) fn set_reverse_video(&mut self, set: bool) {
        use cellgrid::{SPECIAL_BG, SPECIAL_CURSOR_BG, SPECIAL_CURSOR_FG, SPECIAL_FG};
        if set != self.mode.reverse_video {
            let colors = &mut self.palette.colors;
            colors.swap(SPECIAL_BG as usize, SPECIAL_FG as usize);
            colors.swap(0, 7);
            colors.swap(8, 15);
            colors.swap(SPECIAL_CURSOR_BG as usize, SPECIAL_CURSOR_FG as usize);
            let (bg, cur_fg) = (
                colors[SPECIAL_BG as usize],
                colors[SPECIAL_CURSOR_FG as usize],
            );
            if let Some(win) = self.window.as_mut() {
                win.set_colors(bg, cur_fg);
            }
            self.screen.damage_lines(0, self.screen.height());
        }
        self.mode.reverse_video = set;
    }

    pub fn palette_color(&self, idx: usize) -> Rgba {
        self.palette.colors[idx.min(self.palette.colors.len() - 1)]
    }

    /* Reset */

    /// DECSTR (soft) and RIS (hard).
    pub fn reset(&mut self, hard: bool) {
        if self.mode.columns_132 {
            self.set_columns_132(false);
        }
        self.screen.set_altscreen(false, false, false);

        let saved_cursor = (self.screen.c.x, self.screen.c.y, self.screen.c.pending);

        self.screen.c = Cursor::default();
        self.screen.sgr = Default::default();
        self.screen.saved_sgr = Default::default();
        self.screen.reset_margins();
        self.screen.reset_tabs();
        self.screen.mode = ScreenMode {
            wrap: self.config.autowrap(),
            disable_altscreen: !self.config.allow_altscreen(),
            ..ScreenMode::default()
        };
        self.screen.selection_clear();

        let focused = self.mode.focused;
        self.mode = TermMode {
            focused,
            utf8: self.config.utf8(),
            title_set_utf8: self.config.utf8(),
            title_query_utf8: self.config.utf8(),
            enable_columns_132: self.config.enable_columns_132(),
            enable_nrcs: self.config.enable_nrcs(),
            scroll_on_output: self.config.scroll_on_output(),
            no_scroll_on_input: !self.config.scroll_on_input(),
            keep_clipboard: self.config.keep_clipboard(),
            paste_literal_nl: self.config.paste_literal_nl(),
            ..TermMode::default()
        };
        self.kstate = KeyboardState::from_config(self.config.as_ref());
        self.mstate = mouse::MouseState::default();
        self.udk.clear();
        self.urim.reset();

        if hard {
            let (w, h) = (self.screen.width(), self.screen.height());
            self.screen.erase(0, 0, w as isize, h as isize, false);
            self.screen.free_scrollback(self.config.scrollback_size());
            self.vt_version = self.config.vt_version();
            self.vt_level = (self.vt_version / 100).min(5) as u8;
            if self.vt_level == 0 {
                self.set_vt52(true);
            }
            self.title_stack.clear();
            self.update_title(TitleTarget::Both, String::new());
        } else {
            self.screen.c.x = saved_cursor.0;
            self.screen.c.y = saved_cursor.1;
            self.screen.c.pending = saved_cursor.2;
        }
        self.mark_scanner_dirty();
    }

    /* DECCOLM */

    pub(crate) fn set_columns_132(&mut self, set: bool) {
        self.mode.columns_132 = set;
        self.screen.reset_margins();
        let (ox, oy) = (self.screen.min_ox() as isize, self.screen.min_oy() as isize);
        self.screen.move_to(ox, oy);
        if !self.mode.preserve_display_132 {
            let (w, h) = (self.screen.width() as isize, self.screen.height() as isize);
            self.screen.erase(0, 0, w, h, false);
        }
        if self.config.allow_window_ops() {
            let cols = if set { 132 } else { 80 };
            self.request_resize_cells(Some(cols), Some(24));
        }
    }

    pub(crate) fn request_resize_cells(&mut self, cols: Option<usize>, rows: Option<usize>) {
        let (cell, border) = match self.window.as_mut() {
            Some(win) => (win.get_cell_size(), win.get_border()),
            None => return,
        };
        let cur = self
            .window
            .as_mut()
            .map(|w| w.get_grid_size())
            .unwrap_or_default();
        let w = cols.unwrap_or(cur.width) * cell.width + border.width * 2;
        let h = rows.unwrap_or(cur.height) * cell.height + border.height * 2;
        if let Some(win) = self.window.as_mut() {
            win.resize(w, h);
        }
    }
}

/* Renderer pull surface */

impl TerminalState {
    /// Resolve one displayed row into cell specs.  `y` indexes the
    /// current view (which may be scrolled back).
    pub fn row_specs(
        &self,
        y: usize,
        blink_phase_off: bool,
        active_uri: Option<cellgrid::UriId>,
        uri_pressed: bool,
    ) -> Vec<crate::cellspec::CellSpec> {
        let rows = self.screen.view_rows();
        let span = rows[y.min(rows.len() - 1)];
        let width = self.screen.width();
        let storage = self.screen.cur();
        let store = &storage.store;
        let line = store.line(span.line);
        let cells = store.cells(span.line);

        let mut specs = Vec::with_capacity(width);
        for x in 0..width {
            let (cell, attr_id) = if x < span.width {
                let cell = cells[span.offset + x];
                (cell, cell.attr_id())
            } else {
                (cellgrid::Cell::blank(line.pad_attr_id), line.pad_attr_id)
            };
            let attr = line.attrs.get(attr_id);
            let ctx = crate::cellspec::SpecContext {
                palette: &self.palette,
                blink_phase_off,
                selected: self.screen.is_cell_selected(span.line, span.offset + x),
                active_uri,
                uri_pressed,
            };
            specs.push(crate::cellspec::derive(cell, attr, &ctx));
        }
        specs
    }

    /// Cursor position in view coordinates, with visibility resolved
    /// against the hide flag and the scrolled-back state.
    pub fn cursor_for_render(&self) -> (usize, usize, bool, bool) {
        let visible = !self.screen.mode.hide_cursor && self.screen.at_bottom();
        let on_margin = self.screen.c.pending;
        (self.screen.c.x, self.screen.c.y, visible, on_margin)
    }
}
