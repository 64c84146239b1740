//! The screen model: main and alternate storages, the viewport span
//! array, margins, scrolling, rectangular operations, resize reflow
//! and the print path.
//!
//! A viewport row is a [`LineSpan`] into a possibly much longer
//! [`cellgrid::Line`]; soft wrapped output stays a single line and the
//! span array shows consecutive slices of it.  Scrolling on the
//! primary screen moves whole lines between the viewport and the
//! scrollback by relinking, never by copying cells.

use crate::config::TerminalConfiguration;
use crate::cursor::Cursor;
use crate::nrcs::{self, Charset};
use crate::selection::SelectionState;
use cellgrid::{
    is_combining, is_wide, try_precompose, uncompact_char, Attr, Cell, HandleId, LineId, LineSpan,
    LineStore, SelectionStore, UriTable, MAX_LINE_LEN,
};
use std::sync::Arc;

/// Cells per allocation pool; a few screens worth of typical lines.
const POOL_SIZE: usize = 16384;

/// Flags that live per screen rather than per terminal.
#[derive(Debug, Clone, Default)]
pub struct ScreenMode {
    pub altscreen: bool,
    pub lr_margins: bool,
    pub disable_altscreen: bool,
    pub hide_cursor: bool,
    /// DECSACE: rectangle SGR operations affect the exact rectangle.
    pub attr_ext_rectangle: bool,
    pub smooth_scroll: bool,
    pub wrap: bool,
    pub insert: bool,
    pub reverse_wrap: bool,
    pub margin_bell: bool,
    /// MC 0: print the whole page instead of the scroll region.
    pub print_extend: bool,
    /// MC ?5: every completed line also goes to the printer.
    pub print_auto: bool,
    pub print_form_feed: bool,
    pub xterm_more_hack: bool,
}

/// Side effects the embedding layer must pick up after an operation;
/// the screen itself has no window reference.
#[derive(Debug, Default)]
pub struct ScreenEvents {
    /// Margin bell was crossed; holds the volume.
    pub bell: Option<u8>,
    /// Smooth scroll step filled up; flush the scroll damage.
    pub scroll_flush: bool,
    /// A line should be fed to the printer (autoprint).
    pub autoprint: Vec<Vec<u8>>,
}

/// One screen's backing data: the line arena, the viewport mapping and
/// the per line selection segments.
#[derive(Debug)]
pub struct Storage {
    pub store: LineStore,
    pub spans: Vec<LineSpan>,
    pub sels: SelectionStore,
}

impl Storage {
    fn new(width: usize) -> Self {
        Storage {
            store: LineStore::new(POOL_SIZE.max(width * 4), width, 4),
            spans: Vec::new(),
            sels: SelectionStore::default(),
        }
    }
}

pub struct Screen {
    pub main: Storage,
    pub alt: Storage,
    pub uris: UriTable,

    /// Oldest retained scrollback line (no `prev`), registered in the
    /// main store.
    top_line: Option<HandleId>,
    /// First visible row when the user has scrolled back; equals
    /// `spans[0]` when tracking live output.
    view_pos: Option<HandleId>,
    sb_limit: usize,
    sb_max_caps: usize,

    pub mode: ScreenMode,

    /// Margins, inclusive on all four sides.
    top: usize,
    bottom: usize,
    left: usize,
    right: usize,

    width: usize,
    height: usize,

    pub c: Cursor,
    pub saved_c: Cursor,
    pub back_saved_c: Cursor,
    /// Cursor on the primary screen while the alternate is shown.
    pub last_scr_c: Cursor,

    pub sgr: Attr,
    pub saved_sgr: Attr,
    pub back_saved_sgr: Attr,

    tabs: Vec<bool>,

    /// Smooth scroll accumulator.
    scrolled: usize,
    pub scroll_damage: bool,

    /// Last printed character, for REP.
    pub prev_ch: Option<char>,

    /// Margin bell volume (DECSMBV).
    mbvol: u8,
    /// User preferred supplemental set (DECAUPSS).
    pub upcs: Charset,

    pub sstate: SelectionState,
    pub events: ScreenEvents,

    config: Arc<dyn TerminalConfiguration>,
}

impl Screen {
    pub fn new(width: usize, height: usize, config: Arc<dyn TerminalConfiguration>) -> Screen {
        let width = width.max(2);
        let height = height.max(1);
        let mut scr = Screen {
            main: Storage::new(width),
            alt: Storage::new(width),
            uris: UriTable::default(),
            top_line: None,
            view_pos: None,
            sb_limit: 0,
            sb_max_caps: config.scrollback_size(),
            mode: ScreenMode {
                wrap: config.autowrap(),
                disable_altscreen: !config.allow_altscreen(),
                ..ScreenMode::default()
            },
            top: 0,
            bottom: height - 1,
            left: 0,
            right: width - 1,
            width,
            height,
            c: Cursor::default(),
            saved_c: Cursor::default(),
            back_saved_c: Cursor::default(),
            last_scr_c: Cursor::default(),
            sgr: Attr::default(),
            saved_sgr: Attr::default(),
            back_saved_sgr: Attr::default(),
            tabs: Vec::new(),
            scrolled: 0,
            scroll_damage: false,
            prev_ch: None,
            mbvol: config.margin_bell_volume(),
            upcs: Charset::DecSupGraph,
            sstate: SelectionState::default(),
            events: ScreenEvents::default(),
            config,
        };
        scr.reset_tabs();
        scr.init_storage(false);
        scr.init_storage(true);
        let first = scr.main.spans[0];
        scr.top_line = Some(scr.main.store.register_handle(first.line, 0));
        scr.view_pos = Some(scr.main.store.register_handle(first.line, 0));
        scr
    }

    fn init_storage(&mut self, alt: bool) {
        let (width, height) = (self.width, self.height);
        let storage = if alt { &mut self.alt } else { &mut self.main };
        let mut prev: Option<LineId> = None;
        for _ in 0..height {
            let id = storage.store.create_line(&Attr::default(), width, &mut self.uris);
            if let Some(p) = prev {
                storage.store.attach_next(p, id);
            }
            storage.spans.push(LineSpan {
                line: id,
                offset: 0,
                width: 0,
            });
            prev = Some(id);
        }
    }

    /* Geometry */

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn min_y(&self) -> usize {
        self.top
    }

    pub fn max_y(&self) -> usize {
        self.bottom + 1
    }

    pub fn min_x(&self) -> usize {
        if self.mode.lr_margins {
            self.left
        } else {
            0
        }
    }

    pub fn max_x(&self) -> usize {
        if self.mode.lr_margins {
            self.right + 1
        } else {
            self.width
        }
    }

    /// Origin-mode aware bounds.
    pub fn min_ox(&self) -> usize {
        if self.mode.lr_margins && self.c.origin {
            self.left
        } else {
            0
        }
    }

    pub fn max_ox(&self) -> usize {
        if self.mode.lr_margins && self.c.origin {
            self.right + 1
        } else {
            self.width
        }
    }

    pub fn min_oy(&self) -> usize {
        if self.c.origin {
            self.top
        } else {
            0
        }
    }

    pub fn max_oy(&self) -> usize {
        if self.c.origin {
            self.bottom + 1
        } else {
            self.height
        }
    }

    pub fn cursor_in_region(&self) -> bool {
        self.c.x >= self.min_x()
            && self.c.x < self.max_x()
            && self.c.y >= self.min_y()
            && self.c.y < self.max_y()
    }

    pub fn config(&self) -> &Arc<dyn TerminalConfiguration> {
        &self.config
    }

    pub fn scrollback_depth(&self) -> usize {
        self.sb_limit
    }

    pub fn margin_bell_volume(&self) -> u8 {
        self.mbvol
    }

    pub fn set_margin_bell_volume(&mut self, vol: u8) {
        self.mbvol = vol;
    }

    /* Storage selection */

    pub fn cur(&self) -> &Storage {
        if self.mode.altscreen {
            &self.alt
        } else {
            &self.main
        }
    }

    fn cur_parts(&mut self) -> (&mut Storage, &mut UriTable) {
        if self.mode.altscreen {
            (&mut self.alt, &mut self.uris)
        } else {
            (&mut self.main, &mut self.uris)
        }
    }

    pub fn span(&self, y: usize) -> LineSpan {
        self.cur().spans[y]
    }

    /* Wide glyph boundary repair */

    fn adjust_wide_left_at(storage: &mut Storage, span: LineSpan, x: usize) {
        let at = span.offset + x;
        let line = storage.store.line(span.line);
        if at == 0 || at >= line.size() {
            return;
        }
        let cells = storage.store.cells_mut(span.line);
        if cells[at].raw_ch() == 0 && cells[at - 1].wide() {
            let attr = cells[at - 1].attr_id();
            cells[at - 1] = Cell::blank(attr);
            cells[at] = Cell::blank(cells[at].attr_id());
        }
    }

    fn adjust_wide_right_at(storage: &mut Storage, span: LineSpan, x: usize) {
        let at = span.offset + x;
        let line = storage.store.line(span.line);
        if at >= line.size() {
            return;
        }
        let cells = storage.store.cells_mut(span.line);
        if cells[at].wide() {
            let attr = cells[at].attr_id();
            cells[at] = Cell::blank(attr);
            if at + 1 < cells.len() {
                cells[at + 1] = Cell::blank(cells[at + 1].attr_id());
            }
        }
    }

    pub fn cursor_adjust_wide_left(&mut self) {
        let span = self.span(self.c.y);
        let x = self.c.x;
        let (storage, _) = self.cur_parts();
        Self::adjust_wide_left_at(storage, span, x);
    }

    pub fn cursor_adjust_wide_right(&mut self) {
        let span = self.span(self.c.y);
        let x = self.c.x;
        let (storage, _) = self.cur_parts();
        Self::adjust_wide_right_at(storage, span, x);
    }

    /* Line preparation */

    /// Grow row `y` so that columns up to `size` exist, filling the
    /// gap from the old end to `clear_to` with pad cells.
    fn adjust_line_ex(&mut self, alt: bool, y: usize, clear_to: usize, size: usize) {
        let width = self.width;
        let storage = if alt { &mut self.alt } else { &mut self.main };
        let span = storage.spans[y];
        let old_size = storage.store.line(span.line).size();
        let new_size = span.offset + size;
        let clear_to = clear_to + span.offset;

        if old_size >= new_size {
            return;
        }

        storage.store.ensure_caps(span.line, new_size);
        let (line, cells) = storage.store.line_and_cells_mut(span.line);
        if clear_to > old_size {
            let pad = Cell::blank(line.pad_attr_id);
            for cell in &mut cells[old_size..clear_to] {
                *cell = pad;
            }
        }
        line.set_size(new_size);
        storage.spans[y].width = size.min(width);
    }

    pub fn adjust_line(&mut self, y: usize, size: usize) {
        let alt = self.mode.altscreen;
        self.adjust_line_ex(alt, y, size, size);
    }

    /// Rewrite span entries after `old` was split at `at` into `new`.
    fn patch_spans_split(&mut self, old: LineId, at: usize, new: LineId) {
        let alt = self.mode.altscreen;
        let width = self.width;
        let storage = if alt { &mut self.alt } else { &mut self.main };
        for span in &mut storage.spans {
            if span.line == old && span.offset >= at {
                span.line = new;
                span.offset -= at;
            }
        }
        for span in &mut storage.spans {
            if span.line == old || span.line == new {
                span.width = storage.store.span_width(span.line, span.offset, width);
            }
        }
    }

    /// Rewrite span entries after `freed` was concatenated into
    /// `merged` (whose old size was `shift`).
    fn patch_spans_concat(&mut self, merged: LineId, freed: LineId, shift: usize) {
        let alt = self.mode.altscreen;
        let width = self.width;
        let storage = if alt { &mut self.alt } else { &mut self.main };
        for span in &mut storage.spans {
            if span.line == freed {
                span.line = merged;
                span.offset += shift;
            }
        }
        for span in &mut storage.spans {
            if span.line == merged {
                span.width = storage.store.span_width(span.line, span.offset, width);
            }
        }
    }

    /// Force the top border of row `y` to be a line border.
    pub fn split_line_before(&mut self, y: usize) {
        let span = self.span(y);
        if span.offset == 0 {
            return;
        }
        let (storage, uris) = self.cur_parts();
        let new = storage
            .store
            .split_line(span.line, span.offset, uris, &mut storage.sels);
        self.patch_spans_split(span.line, span.offset, new);
    }

    /// Force the bottom border of row `y` to be a line border.
    pub fn split_line_after(&mut self, y: usize) {
        let span = self.span(y);
        let cut = span.offset + span.width;
        // Only split when the next row continues the same line.
        let continues = match self.cur().spans.get(y + 1) {
            Some(next) => next.line == span.line,
            None => {
                let line = self.cur().store.line(span.line);
                cut < line.size()
            }
        };
        if !continues {
            return;
        }
        let (storage, uris) = self.cur_parts();
        let new = storage
            .store
            .split_line(span.line, cut, uris, &mut storage.sels);
        self.patch_spans_split(span.line, cut, new);
    }

    /* Cell access helpers */

    /// Read the cell at visual position (x, y); pad cells beyond the
    /// row's width read as blanks.
    pub fn cell_at(&self, x: usize, y: usize) -> Cell {
        let span = self.span(y);
        let store = &self.cur().store;
        let line = store.line(span.line);
        if x < span.width {
            store.cells(span.line)[span.offset + x]
        } else {
            Cell::blank(line.pad_attr_id)
        }
    }

    pub fn attr_at(&self, x: usize, y: usize) -> &Attr {
        let span = self.span(y);
        let store = &self.cur().store;
        let line = store.line(span.line);
        let id = if x < span.width {
            store.cells(span.line)[span.offset + x].attr_id()
        } else {
            line.pad_attr_id
        };
        store.attr_of(span.line, id)
    }

    /* Erase, fill, copy */

    fn clamp_rect(
        &self,
        xs: isize,
        ys: isize,
        xe: isize,
        ye: isize,
        origin: bool,
    ) -> (usize, usize, usize, usize) {
        let (mut xs, mut ys, mut xe, mut ye) = (xs, ys, xe, ye);
        if ye < ys {
            std::mem::swap(&mut ys, &mut ye);
        }
        if xe < xs {
            std::mem::swap(&mut xs, &mut xe);
        }
        let (lo_x, hi_x, lo_y, hi_y) = if origin {
            (
                self.min_ox() as isize,
                self.max_ox() as isize,
                self.min_oy() as isize,
                self.max_oy() as isize,
            )
        } else {
            (0, self.width as isize, 0, self.height as isize)
        };
        let xs = xs.clamp(lo_x, hi_x);
        let xe = xe.clamp(lo_x, hi_x);
        let ys = ys.clamp(lo_y, hi_y);
        let ye = ye.clamp(lo_y, hi_y);
        (xs as usize, ys as usize, xe as usize, ye as usize)
    }

    /// Common preparation for erases and fills: clamp, force line
    /// borders, drop intersecting selections and either trim or grow
    /// the affected rows.
    fn erase_pre(
        &mut self,
        xs: isize,
        ys: isize,
        xe: isize,
        ye: isize,
        origin: bool,
        to_blank: bool,
    ) -> (usize, usize, usize, usize) {
        let (xs, ys, xe, ye) = self.clamp_rect(xs, ys, xe, ye, origin);

        if to_blank {
            if xs == 0 && ys < ye {
                self.split_line_before(ys);
            }
            for y in ys..ye {
                self.split_line_after(y);
                let span = self.span(y);
                let pad_is_sgr = {
                    let store = &self.cur().store;
                    let line = store.line(span.line);
                    *store.attr_of(span.line, line.pad_attr_id) == self.sgr
                };
                if span.width <= xe && pad_is_sgr {
                    if span.width > xs {
                        // Trim: the erased tail becomes implicit pad.
                        let (storage, _) = self.cur_parts();
                        let line = storage.store.line_mut(span.line);
                        line.set_size(span.offset + xs);
                        storage.spans[y].width = xs;
                    }
                } else {
                    self.adjust_line(y, xe);
                }
            }
        } else {
            for y in ys..ye {
                self.split_line_after(y);
                self.adjust_line(y, xe);
            }
        }

        self.selection_clear_if_intersects(xs, ys, xe, ye);
        (xs, ys, xe, ye)
    }

    /// Fill the rectangle with `ch` (0 erases) in the current SGR.
    pub fn fill(&mut self, xs: isize, ys: isize, xe: isize, ye: isize, origin: bool, ch: char) {
        let blank = ch == '\0';
        let (xs, ys, xe, ye) = self.erase_pre(xs, ys, xe, ye, origin, blank);
        let sgr = self.sgr.clone();
        for y in ys..ye {
            let span = self.span(y);
            let xe1 = xe.min(span.width);
            if xe1 <= xs {
                continue;
            }
            let (storage, uris) = self.cur_parts();
            let attr_id = storage.store.intern_attr(span.line, &sgr, uris);
            let cells = storage.store.cells_mut(span.line);
            let fill = if blank {
                Cell::blank(attr_id)
            } else {
                Cell::new(ch, attr_id)
            };
            for cell in &mut cells[span.offset + xs..span.offset + xe1] {
                *cell = fill;
            }
        }
    }

    pub fn erase(&mut self, xs: isize, ys: isize, xe: isize, ye: isize, origin: bool) {
        self.fill(xs, ys, xe, ye, origin, '\0');
    }

    /// DECSCA-aware erase: protected cells survive.
    pub fn protective_erase(&mut self, xs: isize, ys: isize, xe: isize, ye: isize, origin: bool) {
        let (xs, ys, xe, ye) = self.erase_pre(xs, ys, xe, ye, origin, false);
        let sgr = self.sgr.clone();
        for y in ys..ye {
            let span = self.span(y);
            let (storage, uris) = self.cur_parts();
            let attr_id = storage.store.intern_attr(span.line, &sgr, uris);
            let size = storage.store.line(span.line).size();
            for x in xs..xe {
                let at = span.offset + x;
                if at >= size {
                    break;
                }
                let id = storage.store.cells(span.line)[at].attr_id();
                if !storage.store.attr_of(span.line, id).protected() {
                    storage.store.cells_mut(span.line)[at] = Cell::blank(attr_id);
                }
            }
        }
    }

    /// DECSED/DECSEL/DECSERA: erase only unprotected cells, keeping
    /// their attributes.
    pub fn selective_erase(&mut self, xs: isize, ys: isize, xe: isize, ye: isize, origin: bool) {
        let (xs, ys, xe, ye) = self.erase_pre(xs, ys, xe, ye, origin, false);
        for y in ys..ye {
            let span = self.span(y);
            let (storage, _) = self.cur_parts();
            let size = storage.store.line(span.line).size();
            for x in xs..xe.min(size.saturating_sub(span.offset)) {
                let at = span.offset + x;
                let protected = {
                    let id = storage.store.cells(span.line)[at].attr_id();
                    storage.store.attr_of(span.line, id).protected()
                };
                if !protected {
                    let cells = storage.store.cells_mut(span.line);
                    cells[at].set_raw_ch(0);
                    cells[at].set_wide(false);
                }
            }
        }
    }

    /// Rectangular copy (DECCRA).  Source is left intact; overlapping
    /// copies pick a direction that preserves the source data.
    pub fn copy(
        &mut self,
        xs: isize,
        ys: isize,
        xe: isize,
        ye: isize,
        xd: isize,
        yd: isize,
        origin: bool,
    ) {
        let (mut xs, mut ys, mut xe, mut ye) = (xs, ys, xe, ye);
        if ye < ys {
            std::mem::swap(&mut ys, &mut ye);
        }
        if xe < xs {
            std::mem::swap(&mut xs, &mut xe);
        }

        let (lo_x, hi_x, lo_y, hi_y) = if origin {
            (
                self.min_ox() as isize,
                self.max_ox() as isize,
                self.min_oy() as isize,
                self.max_oy() as isize,
            )
        } else {
            (0, self.width as isize, 0, self.height as isize)
        };

        let xd = xd.clamp(lo_x, hi_x - 1);
        let yd = yd.clamp(lo_y, hi_y - 1);
        let xs = xs.clamp(lo_x, hi_x - 1);
        let ys = ys.clamp(lo_y, hi_y - 1);
        let xe = xe.clamp(lo_x, (hi_x - xd + xs).min(hi_x));
        let ye = ye.clamp(lo_y, (hi_y - yd + ys).min(hi_y));

        if xs >= xe || ys >= ye {
            return;
        }
        let (xs, ys, xe, ye, xd, yd) = (
            xs as usize,
            ys as usize,
            xe as usize,
            ye as usize,
            xd as usize,
            yd as usize,
        );

        self.selection_clear_if_intersects(xd, yd, xd + (xe - xs), yd + (ye - ys));

        let rows: Vec<(usize, usize)> = if yd <= ys {
            (0..ye - ys).map(|i| (ys + i, yd + i)).collect()
        } else {
            (0..ye - ys).rev().map(|i| (ys + i, yd + i)).collect()
        };

        for (sy, dy) in rows {
            self.adjust_line(sy, xe);
            self.adjust_line(dy, xd + (xe - xs));
            self.split_line_after(dy);
            self.copy_row(sy, xs, xe, dy, xd);
        }
    }

    /// Copy `xe - xs` cells of row `sy` into row `dy` at `xd`,
    /// re-interning attributes into the destination line.
    fn copy_row(&mut self, sy: usize, xs: usize, xe: usize, dy: usize, xd: usize) {
        let src_span = self.span(sy);
        let dst_span = self.span(dy);
        let (storage, uris) = self.cur_parts();

        let src: Vec<Cell> = storage.store.cells(src_span.line)
            [src_span.offset + xs..src_span.offset + xe]
            .to_vec();
        let src_attrs = storage.store.line(src_span.line).attrs.clone();

        let mut remap: Vec<Option<u16>> = vec![None; src_attrs.len()];
        for (i, cell) in src.iter().enumerate() {
            let old_id = cell.attr_id() as usize;
            let mapped = match remap.get(old_id).copied().flatten() {
                Some(m) => m,
                None => {
                    let m = storage
                        .store
                        .intern_attr(dst_span.line, src_attrs.get(old_id as u16), uris);
                    if old_id < remap.len() {
                        remap[old_id] = Some(m);
                    }
                    m
                }
            };
            let cells = storage.store.cells_mut(dst_span.line);
            let mut c = *cell;
            c.set_attr_id(mapped);
            cells[dst_span.offset + xd + i] = c;
        }
    }

    /// DECCARA/DECRARA shared walk: visit the attribute of every cell
    /// in the (possibly stream shaped) rectangle.
    fn sgr_rect_walk(
        &mut self,
        xs: isize,
        ys: isize,
        xe: isize,
        ye: isize,
        mut apply: impl FnMut(&Attr) -> Attr,
    ) {
        let (xs, ys, xe, ye) = self.clamp_rect(xs, ys, xe, ye, true);
        if xs >= xe || ys >= ye {
            return;
        }
        let rect = self.mode.attr_ext_rectangle;
        let max_ox = self.max_ox();
        let min_ox = self.min_ox();
        for y in ys..ye {
            let (row_start, row_end) = if rect {
                (xs, xe)
            } else {
                // Stream shape: first row starts at xs, last ends at
                // xe, full width in between.
                let s = if y == ys { xs } else { min_ox };
                let e = if y == ye - 1 { xe } else { max_ox };
                (s, e)
            };
            self.adjust_line(y, row_end);
            let span = self.span(y);
            let (storage, uris) = self.cur_parts();
            for x in row_start..row_end {
                let at = span.offset + x;
                let old_id = storage.store.cells(span.line)[at].attr_id();
                let new_attr = apply(storage.store.attr_of(span.line, old_id));
                let new_id = storage.store.intern_attr(span.line, &new_attr, uris);
                let cells = storage.store.cells_mut(span.line);
                cells[at].set_attr_id(new_id);
            }
        }
        self.selection_clear_if_intersects(xs, ys, xe, ye);
    }

    /// DECCARA: overwrite the masked attributes in the rectangle.
    pub fn apply_sgr_rect(
        &mut self,
        xs: isize,
        ys: isize,
        xe: isize,
        ye: isize,
        mask: &Attr,
        value: &Attr,
    ) {
        let mask_bits = mask.flag_bits();
        let value = value.clone();
        self.sgr_rect_walk(xs, ys, xe, ye, move |old| {
            let mut new = old.clone();
            new.set_flag_bits((old.flag_bits() & !mask_bits) | (value.flag_bits() & mask_bits));
            new
        });
    }

    /// DECRARA: toggle the masked attribute flags in the rectangle.
    pub fn reverse_sgr_rect(&mut self, xs: isize, ys: isize, xe: isize, ye: isize, mask: &Attr) {
        let mask_bits = mask.flag_bits();
        self.sgr_rect_walk(xs, ys, xe, ye, move |old| {
            let mut new = old.clone();
            new.set_flag_bits(old.flag_bits() ^ mask_bits);
            new
        });
    }

    /// DECRQCRA checksum over a rectangle, honoring the xterm
    /// checksum extension flag bits.
    pub fn checksum(
        &mut self,
        xs: isize,
        ys: isize,
        xe: isize,
        ye: isize,
        mode: ChecksumMode,
        nrcs_enabled: bool,
    ) -> u16 {
        let (xs, ys, xe, ye) = self.clamp_rect(xs, ys, xe, ye, true);
        let gr = self.c.gr_charset();

        let mut res: u32 = 0;
        let mut trm: u32 = 0;
        let mut spc: u32 = 0;
        let mut first = true;
        let notrim = mode.no_trim;

        for y in ys..ye {
            let span = self.span(y);
            for x in xs..xe {
                let cell = if x < span.width {
                    self.cell_at(x, y)
                } else {
                    Cell::blank(0)
                };
                let mut ch_orig = cell.raw_ch();
                if ch_orig == '\t' as u32 {
                    ch_orig = 0;
                }
                let mut ch = ch_orig;
                let attr = self.attr_at(x, y).clone();
                if !mode.no_implicit && ch == 0 {
                    ch = ' ' as u32;
                }

                if !mode.wide {
                    if ch > 0x7f && gr != Charset::Ascii {
                        nrcs::encode(gr, &mut ch, nrcs_enabled);
                        if !mode.eight_bit && ch < 0x80 {
                            ch |= 0x80;
                        }
                    }
                    ch &= 0xff;
                } else {
                    ch = cellgrid::uncompact(ch);
                }

                if !mode.no_attr {
                    if attr.underline() != cellgrid::Underline::None {
                        ch += 0x10;
                    }
                    if attr.reverse() {
                        ch += 0x20;
                    }
                    if attr.blink() {
                        ch += 0x40;
                    }
                    if attr.bold() {
                        ch += 0x80;
                    }
                    if attr.italic() {
                        ch += 0x100;
                    }
                    if attr.faint() {
                        ch += 0x200;
                    }
                    if attr.strikethrough() {
                        ch += 0x400;
                    }
                    if attr.invisible() {
                        ch += 0x800;
                    }
                }

                let mut plain = Attr::default();
                plain.fg = attr.fg;
                plain.bg = attr.bg;
                plain.ul = attr.ul;
                if first || ch_orig != 0 || attr != plain {
                    trm = trm.wrapping_add(ch).wrapping_add(spc);
                    spc = 0;
                } else if ch_orig == 0 && notrim {
                    spc = spc.wrapping_add(' ' as u32);
                }

                res = res.wrapping_add(ch);
                first = notrim;
            }
            if !notrim {
                spc = 0;
                first = false;
            }
        }

        let sum = if notrim { res } else { trm };
        let sum = sum as u16;
        if mode.positive {
            sum
        } else {
            sum.wrapping_neg()
        }
    }

    /// The single attribute shared by the rectangle, for DECRQSS-style
    /// interrogation (DECCARA mask computation).
    pub fn common_sgr(&mut self, xs: isize, ys: isize, xe: isize, ye: isize) -> Attr {
        let (xs, ys, xe, ye) = self.clamp_rect(xs, ys, xe, ye, true);
        let mut common: Option<Attr> = None;
        for y in ys..ye {
            for x in xs..xe {
                let attr = self.attr_at(x, y).clone();
                common = Some(match common {
                    None => attr,
                    Some(prev) => {
                        let mut merged = prev.clone();
                        merged.set_flag_bits(prev.flag_bits() & attr.flag_bits());
                        if prev.fg != attr.fg {
                            merged.fg = cellgrid::Color::fg();
                        }
                        if prev.bg != attr.bg {
                            merged.bg = cellgrid::Color::bg();
                        }
                        merged
                    }
                });
            }
        }
        common.unwrap_or_default()
    }
}

/// DECRQCRA checksum extension flags (XTCHECKSUM).
#[derive(Debug, Clone, Copy, Default)]
pub struct ChecksumMode {
    pub positive: bool,
    pub no_attr: bool,
    pub no_trim: bool,
    pub no_implicit: bool,
    pub wide: bool,
    pub eight_bit: bool,
}

impl ChecksumMode {
    pub fn from_bits(bits: u32) -> Self {
        ChecksumMode {
            positive: bits & 1 != 0,
            no_attr: bits & 2 != 0,
            no_trim: bits & 4 != 0,
            no_implicit: bits & 8 != 0,
            wide: bits & 16 != 0,
            eight_bit: bits & 32 != 0,
        }
    }
}

/* Cursor motion, tabs, margins */

impl Screen {
    pub fn move_to(&mut self, x: isize, y: isize) {
        self.c.x = x.clamp(0, self.width as isize - 1) as usize;
        self.c.y = y.clamp(0, self.height as isize - 1) as usize;
        self.c.pending = false;
    }

    /// Like [`Screen::move_to`] but confined to the margin box.
    pub fn bounded_move_to(&mut self, x: isize, y: isize) {
        self.c.x = x.clamp(self.min_ox() as isize, self.max_ox() as isize - 1) as usize;
        self.c.y = y.clamp(self.min_oy() as isize, self.max_oy() as isize - 1) as usize;
        self.c.pending = false;
    }

    /// Origin-mode aware absolute move.
    pub fn move_width_origin(&mut self, x: isize, y: isize) {
        if self.c.origin {
            self.bounded_move_to(x, y);
        } else {
            self.move_to(x, y);
        }
    }

    pub fn move_left(&mut self, amount: usize) {
        let lim = if self.c.x >= self.min_x() {
            self.min_x()
        } else {
            0
        };
        self.c.x = self.c.x.saturating_sub(amount).max(lim);
        self.c.pending = false;
    }

    pub fn cr(&mut self) {
        self.c.x = if self.c.x < self.min_x() { 0 } else { self.min_x() };
        self.c.pending = false;
    }

    pub fn set_origin(&mut self, origin: bool) {
        self.c.origin = origin;
        self.move_to(self.min_ox() as isize, self.min_oy() as isize);
    }

    /// LF/IND: move down, scrolling at the bottom margin.  Returns
    /// whether the cursor actually moved.
    pub fn index(&mut self) -> bool {
        if self.c.y + 1 == self.max_y() && self.cursor_in_region() {
            self.scroll(self.min_y(), 1, true);
            self.c.pending = false;
            true
        } else if self.c.y + 1 != self.max_y() && self.c.y + 1 < self.height {
            let (x, y) = (self.c.x, self.c.y);
            self.move_to(x as isize, y as isize + 1);
            true
        } else {
            false
        }
    }

    /// RI: move up, scrolling at the top margin.
    pub fn rindex(&mut self) {
        if self.c.y == self.min_y() && self.cursor_in_region() {
            self.scroll(self.min_y(), -1, true);
            self.c.pending = false;
        } else if self.c.y != self.min_y() && self.c.y > 0 {
            let (x, y) = (self.c.x, self.c.y);
            self.move_to(x as isize, y as isize - 1);
        }
    }

    /// DECFI: forward index inside the left/right margin box.
    pub fn index_horizontal(&mut self) {
        if self.c.x + 1 == self.max_x() && self.cursor_in_region() {
            self.scroll_horizontal(self.min_x(), 1);
        } else if self.c.x + 1 < self.width {
            let (x, y) = (self.c.x, self.c.y);
            self.move_to(x as isize + 1, y as isize);
        }
    }

    /// DECBI: backward index inside the margin box.
    pub fn rindex_horizontal(&mut self) {
        if self.c.x == self.min_x() && self.cursor_in_region() {
            self.scroll_horizontal(self.min_x(), -1);
        } else if self.c.x > 0 {
            let (x, y) = (self.c.x, self.c.y);
            self.move_to(x as isize - 1, y as isize);
        }
    }

    pub fn reset_tabs(&mut self) {
        self.tabs = vec![false; self.width];
        let tw = self.config.tab_width().max(1);
        let mut i = tw;
        while i < self.width {
            self.tabs[i] = true;
            i += tw;
        }
    }

    fn resize_tabs(&mut self, width: usize) {
        let old = self.tabs.len();
        self.tabs.resize(width, false);
        if width > old {
            let tw = self.config.tab_width().max(1);
            let mut tab = old.saturating_sub(1);
            while tab > 0 && !self.tabs[tab] {
                tab -= 1;
            }
            let mut i = tab + tw;
            while i < width {
                self.tabs[i] = true;
                i += tw;
            }
        }
    }

    pub fn has_tab(&self, x: usize) -> bool {
        self.tabs.get(x).copied().unwrap_or(false)
    }

    pub fn set_tab(&mut self, x: usize, set: bool) {
        if let Some(t) = self.tabs.get_mut(x) {
            *t = set;
        }
    }

    pub fn clear_tabs(&mut self) {
        self.tabs.iter_mut().for_each(|t| *t = false);
    }

    /// HT/CHT/CBT: jump `n` stops forward (positive) or backward.
    pub fn tab_jump(&mut self, n: isize) {
        if n >= 0 {
            if self.mode.xterm_more_hack && self.c.pending {
                self.wrap(false);
            }
            let mut n = n;
            while self.c.x + 1 < self.max_x() && n > 0 {
                loop {
                    self.c.x += 1;
                    if self.c.x + 1 >= self.max_x() || self.tabs[self.c.x] {
                        break;
                    }
                }
                n -= 1;
            }
        } else {
            let mut n = n;
            while self.c.x > self.min_ox() && n < 0 {
                loop {
                    self.c.x -= 1;
                    if self.c.x <= self.min_ox() || self.tabs[self.c.x] {
                        break;
                    }
                }
                n += 1;
            }
        }
        self.c.pending = false;
    }

    /// DECSTBM; ignored when the region would be degenerate.
    pub fn set_tb_margins(&mut self, top: usize, bottom: usize) {
        let bottom = bottom.min(self.height - 1);
        if top < bottom {
            self.top = top;
            self.bottom = bottom;
        } else {
            self.top = 0;
            self.bottom = self.height - 1;
        }
    }

    /// DECSLRM; only honored while DECLRMM is enabled.
    pub fn set_lr_margins(&mut self, left: usize, right: usize) -> bool {
        if !self.mode.lr_margins {
            return false;
        }
        let right = right.min(self.width - 1);
        if left < right {
            self.left = left;
            self.right = right;
        } else {
            self.left = 0;
            self.right = self.width - 1;
        }
        true
    }

    pub fn reset_margins(&mut self) {
        self.top = 0;
        self.bottom = self.height - 1;
        self.left = 0;
        self.right = self.width - 1;
    }

    fn assign_attr(dst: &mut Attr, src: &Attr, uris: &mut UriTable) {
        if let Some(u) = src.uri {
            uris.incref(u);
        }
        if let Some(u) = dst.uri {
            uris.decref(u);
        }
        *dst = src.clone();
    }

    /// DECSC/DECRC: cursor, pen and charset state.
    pub fn save_cursor(&mut self, save: bool) {
        if save {
            self.saved_c = self.c;
            let sgr = self.sgr.clone();
            Self::assign_attr(&mut self.saved_sgr, &sgr, &mut self.uris);
        } else {
            self.c = self.saved_c;
            self.c.x = self.c.x.min(self.width - 1);
            self.c.y = self.c.y.min(self.height - 1);
            let saved = self.saved_sgr.clone();
            Self::assign_attr(&mut self.sgr, &saved, &mut self.uris);
        }
    }

    fn swap_screen(&mut self) {
        let entering = !self.mode.altscreen;
        self.selection_clear();
        self.mode.altscreen = entering;
        std::mem::swap(&mut self.saved_c, &mut self.back_saved_c);
        std::mem::swap(&mut self.saved_sgr, &mut self.back_saved_sgr);
        if entering {
            self.last_scr_c = self.c;
        }
        self.reset_view(false);
        self.damage_lines(0, self.height);
    }

    /// Modes 47/1047/1049: switch screens, optionally clearing the
    /// alternate and saving/restoring the cursor.
    pub fn set_altscreen(&mut self, set: bool, clear: bool, save: bool) {
        if self.mode.disable_altscreen {
            return;
        }
        if set != self.mode.altscreen {
            if set && save {
                self.save_cursor(true);
            }
            self.swap_screen();
            if !set && save {
                self.save_cursor(false);
            }
        }
        if set && clear {
            self.erase(0, 0, self.width as isize, self.height as isize, false);
        }
    }

    pub fn altscreen(&self) -> bool {
        self.mode.altscreen
    }
}

/* Insert/delete and scrolling */

impl Screen {
    /// ICH: open a gap at the cursor, shifting cells toward the right
    /// margin.
    pub fn insert_cells(&mut self, n: usize) {
        if self.cursor_in_region() {
            let max_x = self.max_x();
            let n = n.min(max_x - self.c.x);
            if n == 0 {
                return;
            }
            let y = self.c.y;
            let x = self.c.x;
            let span = self.span(y);

            if span.width > x {
                let old_width = span.width;
                self.adjust_line(y, (old_width + n).min(max_x));
                let span = self.span(y);
                {
                    let (storage, _) = self.cur_parts();
                    Self::adjust_wide_left_at(storage, span, x);
                }
                let tail = (max_x - n).saturating_sub(x).min(old_width - x);
                if tail > 0 {
                    let (storage, _) = self.cur_parts();
                    let cells = storage.store.cells_mut(span.line);
                    let base = span.offset;
                    cells.copy_within(base + x..base + x + tail, base + x + n);
                    for cell in &mut cells[base + x..base + x + tail + n] {
                        cell.set_drawn(false);
                    }
                }
            }
            self.erase(x as isize, y as isize, (x + n) as isize, y as isize + 1, false);
            self.selection_clear_if_intersects(x, y, max_x, y + 1);
        }
        self.c.pending = false;
    }

    /// DCH: close a gap at the cursor, pulling cells in from the right
    /// margin.
    pub fn delete_cells(&mut self, n: usize) {
        let max_x = self.max_x();
        if self.c.x >= self.min_x() && self.c.x < max_x {
            let n = n.min(max_x - self.c.x);
            if n == 0 {
                return;
            }
            let y = self.c.y;
            let x = self.c.x;
            self.split_line_after(y);
            let span = self.span(y);

            if span.width > x {
                {
                    let (storage, _) = self.cur_parts();
                    Self::adjust_wide_left_at(storage, span, x);
                    Self::adjust_wide_right_at(storage, span, x + n - 1);
                }
                let tail = max_x.min(span.width).saturating_sub(n + x);
                if tail > 0 {
                    let (storage, _) = self.cur_parts();
                    let cells = storage.store.cells_mut(span.line);
                    let base = span.offset;
                    cells.copy_within(base + x + n..base + x + n + tail, base + x);
                    for cell in &mut cells[base + x..base + x + tail] {
                        cell.set_drawn(false);
                    }
                }
                if max_x >= span.width {
                    // The vacated tail becomes implicit pad.
                    let new_width = x + tail;
                    let (storage, _) = self.cur_parts();
                    let line = storage.store.line_mut(span.line);
                    line.set_size(span.offset + new_width);
                    storage.spans[y].width = new_width;
                }
            }
            self.erase(
                (max_x - n) as isize,
                y as isize,
                max_x as isize,
                y as isize + 1,
                false,
            );
            self.selection_clear_if_intersects(x, y, x + n, y + 1);
        }
        self.c.pending = false;
    }

    /// IL: insert blank lines at the cursor, pushing the rest of the
    /// region down.
    pub fn insert_lines(&mut self, n: usize) {
        if self.cursor_in_region() {
            let n = n.min(self.max_y() - self.c.y);
            let y = self.c.y;
            self.scroll(y, -(n as isize), false);
        }
        let y = self.c.y;
        self.move_to(self.min_x() as isize, y as isize);
    }

    /// DL: delete lines at the cursor, pulling the rest of the region
    /// up.
    pub fn delete_lines(&mut self, n: usize) {
        if self.cursor_in_region() {
            let n = n.min(self.max_y() - self.c.y);
            let y = self.c.y;
            self.scroll(y, n as isize, false);
        }
        let y = self.c.y;
        self.move_to(self.min_x() as isize, y as isize);
    }

    /// DECIC: insert blank columns at the cursor within the margins.
    pub fn insert_columns(&mut self, n: usize) {
        if self.cursor_in_region() {
            let (max_x, min_y, max_y) = (self.max_x(), self.min_y(), self.max_y());
            let n = n.min(max_x - self.c.x);
            let x = self.c.x;
            if n > 0 {
                self.copy(
                    x as isize,
                    min_y as isize,
                    (max_x - n) as isize,
                    max_y as isize,
                    (x + n) as isize,
                    min_y as isize,
                    false,
                );
                self.erase(x as isize, min_y as isize, (x + n) as isize, max_y as isize, false);
            }
        }
        self.c.pending = false;
    }

    /// DECDC: delete columns at the cursor within the margins.
    pub fn delete_columns(&mut self, n: usize) {
        if self.cursor_in_region() {
            let (max_x, min_y, max_y) = (self.max_x(), self.min_y(), self.max_y());
            let n = n.min(max_x - self.c.x);
            let x = self.c.x;
            if n > 0 {
                self.copy(
                    (x + n) as isize,
                    min_y as isize,
                    max_x as isize,
                    max_y as isize,
                    x as isize,
                    min_y as isize,
                    false,
                );
                self.erase(
                    (max_x - n) as isize,
                    min_y as isize,
                    max_x as isize,
                    max_y as isize,
                    false,
                );
            }
        }
        self.c.pending = false;
    }

    /// SL/SR and DECBI/DECFI backing: shift the margin box
    /// horizontally.  Positive scrolls left.
    pub fn scroll_horizontal(&mut self, left: usize, amount: isize) {
        let (top, right, bottom) = (self.min_y(), self.max_x(), self.max_y());
        for y in top..bottom {
            let span = self.span(y);
            let (storage, _) = self.cur_parts();
            Self::adjust_wide_left_at(storage, span, left);
            Self::adjust_wide_right_at(storage, span, right - 1);
        }
        if amount > 0 {
            let amount = (amount as usize).min(right - left);
            self.copy(
                (left + amount) as isize,
                top as isize,
                right as isize,
                bottom as isize,
                left as isize,
                top as isize,
                false,
            );
            self.erase(
                (right - amount) as isize,
                top as isize,
                right as isize,
                bottom as isize,
                false,
            );
        } else if amount < 0 {
            let amount = ((-amount) as usize).min(right - left);
            self.copy(
                left as isize,
                top as isize,
                (right - amount) as isize,
                bottom as isize,
                (left + amount) as isize,
                top as isize,
                false,
            );
            self.erase(
                left as isize,
                top as isize,
                (left + amount) as isize,
                bottom as isize,
                false,
            );
        }
    }

    fn swap_3(&mut self, top_after: LineId, mid_before: LineId, bottom_before: LineId) {
        let (storage, _) = self.cur_parts();
        let store = &mut storage.store;
        let top_before = store.detach_prev(top_after);
        let mid_after = store.detach_next(mid_before);
        let bottom_after = store.detach_next(bottom_before);

        if let (Some(tb), Some(ma)) = (top_before, mid_after) {
            store.attach_next(tb, ma);
        }
        store.attach_next(bottom_before, top_after);
        if let Some(ba) = bottom_after {
            store.attach_next(mid_before, ba);
        }
    }

    /// Count lines between two chain positions into the scrollback
    /// tally.
    fn push_history(&mut self, from: LineId, to: LineId) {
        let store = &self.main.store;
        let (fseq, tseq) = (store.line(from).seq(), store.line(to).seq());
        if fseq < tseq {
            let mut it = from;
            while store.line(it).seq() < tseq {
                self.sb_limit += 1;
                match store.line(it).next() {
                    Some(next) => it = next,
                    None => break,
                }
            }
        } else {
            let mut it = to;
            while store.line(it).seq() < fseq {
                self.sb_limit = self.sb_limit.saturating_sub(1);
                match store.line(it).next() {
                    Some(next) => it = next,
                    None => break,
                }
            }
        }
    }

    /// Drop scrollback lines beyond the configured capacity.  Returns
    /// true when the user's scrolled-back view had to move.
    fn free_extra_lines(&mut self) -> bool {
        let mut view_moved = false;
        let extra = self.sb_limit.saturating_sub(self.sb_max_caps);
        for _ in 0..extra {
            let top_h = match self.top_line {
                Some(h) => h,
                None => break,
            };
            let top = match self.main.store.handle_pos(top_h) {
                Some((line, _)) => line,
                None => break,
            };
            if top == self.main.spans[0].line {
                break;
            }
            let next = match self.main.store.line(top).next() {
                Some(next) => next,
                None => break,
            };

            if let Some(view_h) = self.view_pos {
                if let Some((vline, _)) = self.main.store.handle_pos(view_h) {
                    if vline == top {
                        self.main.store.move_handle(view_h, next, 0);
                        view_moved = true;
                    }
                }
            }
            if self.main.store.line(top).selection_index.is_some() {
                self.selection_clear();
            }
            self.main.store.move_handle(top_h, next, 0);
            self.main
                .store
                .free_line(top, &mut self.uris, &mut self.main.sels);
            self.sb_limit -= 1;
        }
        view_moved
    }

    pub fn drain_scrolled(&mut self) {
        self.free_extra_lines();
    }

    /// Drop the entire scrollback and set a new capacity (RIS, and the
    /// xterm "erase saved lines" ED 3).
    pub fn free_scrollback(&mut self, max_size: usize) {
        self.reset_view(false);
        let first = self.main.spans[0].line;
        let mut it = self.main.store.line(first).prev();
        while let Some(line) = it {
            it = self.main.store.line(line).prev();
            if self.main.store.line(line).selection_index.is_some() {
                self.selection_clear();
            }
            self.main
                .store
                .free_line(line, &mut self.uris, &mut self.main.sels);
        }
        if let Some(h) = self.top_line {
            self.main.store.move_handle(h, first, 0);
        }
        self.sb_limit = 0;
        self.sb_max_caps = max_size;
    }

    fn erase_rows_fast(&mut self, ys: usize, ye: usize) {
        self.erase(0, ys as isize, self.width as isize, ye as isize, false);
    }

    fn scroll_fast(&mut self, top: usize, amount: isize, save: bool) -> isize {
        let bottom = self.max_y();
        let save = save && !self.mode.altscreen && top == 0 && amount >= 0;

        let was_at_bottom = self.at_bottom();
        let reset_top = !save && top == 0 && !self.mode.altscreen;

        if !save {
            self.split_line_before(top);
        }
        self.split_line_after(bottom - 1);

        let amount = amount.clamp(-((bottom - top) as isize), (bottom - top) as isize);

        if amount > 0 {
            let amount = amount as usize;
            let rest = bottom - top - amount;

            if save {
                let first_to_hist = self.main.spans[0].line;
                let bottom_line = self.main.spans[bottom - 1].line;
                let bottom_next = self.main.store.detach_next(bottom_line);

                self.main.spans.copy_within(amount..bottom, 0);

                let sgr = self.sgr.clone();
                let width = self.width;
                let mut prev = bottom_line;
                for i in 0..amount {
                    let id = self.main.store.create_line(&sgr, width, &mut self.uris);
                    self.main.store.attach_next(prev, id);
                    self.main.spans[rest + i] = LineSpan {
                        line: id,
                        offset: 0,
                        width: 0,
                    };
                    prev = id;
                }
                if let Some(next) = bottom_next {
                    self.main.store.attach_next(prev, next);
                    self.main.store.fixup_seq(Some(next));
                }

                let new_first = self.main.spans[0].line;
                self.push_history(first_to_hist, new_first);
                self.free_extra_lines();
            } else {
                self.erase_rows_fast(top, top + amount);
                if rest > 0 {
                    let first = self.span(top).line;
                    let mid = self.span(top + amount - 1).line;
                    let last = self.span(bottom - 1).line;
                    self.swap_3(first, mid, last);
                }
                {
                    let (storage, _) = self.cur_parts();
                    storage.spans[top..bottom].rotate_left(amount);
                }
                let anchor = self.span(top + rest).line;
                let (storage, _) = self.cur_parts();
                storage.store.fixup_seq(Some(anchor));
            }
        } else if amount < 0 {
            let amount = (-amount) as usize;
            let rest = bottom - top - amount;

            self.erase_rows_fast(bottom - amount, bottom);
            if rest > 0 {
                let first = self.span(top).line;
                let mid = self.span(bottom - 1 - amount).line;
                let last = self.span(bottom - 1).line;
                self.swap_3(first, mid, last);
            }
            {
                let (storage, _) = self.cur_parts();
                storage.spans[top..bottom].rotate_right(amount);
            }
            let anchor = self.span(top + amount).line;
            let (storage, _) = self.cur_parts();
            storage.store.fixup_seq(Some(anchor));
        }

        if amount != 0 {
            self.scroll_damage = true;

            if reset_top {
                let first = self.main.spans[0].line;
                if let Some(h) = self.top_line {
                    if let Some((line, _)) = self.main.store.handle_pos(h) {
                        if !self.main.store.is_live(line) || self.main.store.line(first).prev().is_none()
                        {
                            self.main.store.move_handle(h, first, 0);
                        }
                    }
                }
            }

            if was_at_bottom {
                self.reset_view(false);
            }
        }

        amount
    }

    /// The central scroll routine: positive `amount` scrolls up
    /// (content moves toward the scrollback), negative down.  `save`
    /// allows the primary screen to push rotated-out lines into the
    /// scrollback.
    pub fn scroll(&mut self, top: usize, amount: isize, save: bool) {
        let (left, right) = (self.min_x(), self.max_x());

        if left == 0 && right == self.width {
            self.scroll_fast(top, amount, save);
        } else {
            // Slow path: the margin box scrolls by copy + erase.
            let bottom = self.max_y();
            for y in top..bottom {
                let span = self.span(y);
                let (storage, _) = self.cur_parts();
                Self::adjust_wide_left_at(storage, span, left);
                Self::adjust_wide_right_at(storage, span, right - 1);
            }
            if amount > 0 {
                let amount = (amount as usize).min(bottom - top);
                self.copy(
                    left as isize,
                    (top + amount) as isize,
                    right as isize,
                    bottom as isize,
                    left as isize,
                    top as isize,
                    false,
                );
                self.erase(
                    left as isize,
                    (bottom - amount) as isize,
                    right as isize,
                    bottom as isize,
                    false,
                );
            } else if amount < 0 {
                let amount = ((-amount) as usize).min(bottom - top);
                self.copy(
                    left as isize,
                    top as isize,
                    right as isize,
                    (bottom - amount) as isize,
                    left as isize,
                    (top + amount) as isize,
                    false,
                );
                self.erase(
                    left as isize,
                    top as isize,
                    right as isize,
                    (top + amount) as isize,
                    false,
                );
            }
        }

        if self.mode.smooth_scroll {
            self.scrolled += amount.unsigned_abs();
            if self.scrolled >= self.config.smooth_scroll_step().max(1) {
                self.events.scroll_flush = true;
                self.scrolled = 0;
            }
        }
    }
}

/* Scrollback view and damage */

impl Screen {
    pub fn at_bottom(&self) -> bool {
        if self.mode.altscreen {
            return true;
        }
        match self.view_pos.and_then(|h| self.main.store.handle_pos(h)) {
            Some((line, off)) => {
                let s = self.main.spans[0];
                line == s.line && off == s.offset
            }
            None => true,
        }
    }

    /// The span of the first displayed row (scrolled-back or live).
    pub fn view(&self) -> LineSpan {
        if self.mode.altscreen {
            return self.alt.spans[0];
        }
        match self.view_pos.and_then(|h| self.main.store.handle_pos(h)) {
            Some((line, offset)) => LineSpan {
                line,
                offset,
                width: self.main.store.span_width(line, offset, self.width),
            },
            None => self.main.spans[0],
        }
    }

    /// Rows as currently displayed, starting from the view position.
    pub fn view_rows(&self) -> Vec<LineSpan> {
        let mut rows = Vec::with_capacity(self.height);
        if self.mode.altscreen {
            rows.extend_from_slice(&self.alt.spans);
            return rows;
        }
        let mut span = self.view();
        for _ in 0..self.height {
            rows.push(span);
            match self.main.store.span_step(&span, self.width) {
                Some(next) => span = next,
                None => break,
            }
        }
        while rows.len() < self.height {
            // Ran out of lines (can only happen transiently); repeat
            // the live viewport tail.
            let idx = rows.len();
            rows.push(self.main.spans[idx.min(self.height - 1)]);
        }
        rows
    }

    pub fn reset_view(&mut self, damage: bool) {
        if self.mode.altscreen {
            return;
        }
        let s = self.main.spans[0];
        if let Some(h) = self.view_pos {
            self.main.store.move_handle(h, s.line, s.offset);
        }
        if damage {
            self.damage_lines(0, self.height);
        }
    }

    /// Scroll the user's view; positive moves toward older history.
    pub fn scroll_view(&mut self, amount: isize) {
        if self.mode.altscreen {
            return;
        }
        let width = self.width;
        let mut span = self.view();
        if amount > 0 {
            let top = self
                .top_line
                .and_then(|h| self.main.store.handle_pos(h));
            for _ in 0..amount {
                if Some((span.line, span.offset)) == top.map(|(l, _)| (l, 0)) && span.offset == 0 {
                    break;
                }
                match self.main.store.span_step_back(&span, width) {
                    Some(prev) => span = prev,
                    None => break,
                }
            }
        } else {
            let bottom = self.main.spans[0];
            for _ in 0..(-amount) {
                if span.line == bottom.line && span.offset == bottom.offset {
                    break;
                }
                match self.main.store.span_step(&span, width) {
                    Some(next) => span = next,
                    None => break,
                }
            }
            // Never scroll past the live viewport.
            if self
                .main
                .store
                .span_cmp((span.line, span.offset), (bottom.line, bottom.offset))
                == std::cmp::Ordering::Greater
            {
                span = bottom;
            }
        }
        if let Some(h) = self.view_pos {
            self.main.store.move_handle(h, span.line, span.offset);
        }
        self.damage_lines(0, self.height);
    }

    /// Force a repaint of rows [ys, ye) of the live viewport.
    pub fn damage_lines(&mut self, ys: usize, ye: usize) {
        let alt = self.mode.altscreen;
        let storage = if alt { &mut self.alt } else { &mut self.main };
        for y in ys..ye.min(storage.spans.len()) {
            let line = storage.spans[y].line;
            storage.store.line_mut(line).force_damage = true;
        }
    }

    /// UTF-8 bytes of row `y`, for the printer.
    pub fn row_bytes(&self, y: usize) -> Vec<u8> {
        let span = self.span(y);
        let store = &self.cur().store;
        let cells = store.cells(span.line);
        let mut out = Vec::with_capacity(span.width + 1);
        let mut buf = [0u8; 4];
        for cell in cells
            .iter()
            .skip(span.offset)
            .take(span.width)
        {
            if cell.raw_ch() == 0 && cell.wide() {
                continue;
            }
            out.extend_from_slice(cell.ch().encode_utf8(&mut buf).as_bytes());
        }
        while out.last() == Some(&b' ') {
            out.pop();
        }
        out
    }
}

/* Resize and reflow */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stick {
    Bottom,
    Top,
    None,
}

impl Screen {
    fn round_offset(&self, line: LineId, to: usize, width: usize) -> usize {
        let store = &self.main.store;
        let mut off = 0;
        loop {
            let next = store.line_advance_width(line, off, width);
            if next > to || next <= off {
                break;
            }
            off = next;
        }
        off
    }

    fn translate_position(
        &self,
        first: LineSpan,
        pos: (LineId, usize),
        c: &mut Cursor,
        width: usize,
    ) {
        let store = &self.main.store;
        if store.span_cmp((first.line, first.offset), pos) == std::cmp::Ordering::Greater {
            if c.pending {
                c.x = width - 1;
            } else {
                c.x = c.x.min(width - 1);
            }
            return;
        }

        let mut it = first;
        let mut y = 0usize;
        loop {
            let next_off = store.line_advance_width(it.line, it.offset, width);
            if it.line == pos.0 && it.offset <= pos.1 && next_off > pos.1 {
                c.x = if c.pending {
                    width - 1
                } else {
                    (pos.1 - it.offset).min(width - 1)
                };
                c.y = y;
                return;
            }
            y += 1;
            match store.span_step(&it, width) {
                Some(next) => it = next,
                None => {
                    c.y = y.saturating_sub(1);
                    c.x = c.x.min(width - 1);
                    return;
                }
            }
        }
    }

    fn resize_alt(&mut self, width: usize, height: usize) {
        let old_height = self.alt.spans.len();

        if height < old_height {
            for y in (height..old_height).rev() {
                let id = self.alt.spans[y].line;
                if self.alt.store.line(id).selection_index.is_some() {
                    self.selection_clear();
                }
                self.alt.store.free_line(id, &mut self.uris, &mut self.alt.sels);
            }
            self.alt.spans.truncate(height);
        }

        for y in 0..self.alt.spans.len() {
            let span = self.alt.spans[y];
            {
                let line = self.alt.store.line(span.line);
                if line.size() > width {
                    // Never leave half a wide glyph on the new margin.
                    let cells = self.alt.store.cells_mut(span.line);
                    if cells[width - 1].wide() {
                        let attr = cells[width - 1].attr_id();
                        cells[width - 1] = Cell::blank(attr);
                    }
                    self.alt.store.line_mut(span.line).set_size(width);
                }
            }
            let w = self.alt.store.line(span.line).size().min(width);
            self.alt.spans[y] = LineSpan {
                line: span.line,
                offset: 0,
                width: w,
            };
        }

        if height > old_height {
            let mut prev = self.alt.spans.last().map(|s| s.line);
            for _ in old_height..height {
                let id = self
                    .alt
                    .store
                    .create_line(&Attr::default(), width, &mut self.uris);
                if let Some(p) = prev {
                    self.alt.store.attach_next(p, id);
                }
                self.alt.spans.push(LineSpan {
                    line: id,
                    offset: 0,
                    width: 0,
                });
                prev = Some(id);
            }
        }

        let clamp = |c: &mut Cursor| {
            c.x = c.x.min(width - 1);
            c.y = c.y.min(height - 1);
            if c.pending {
                c.x = width - 1;
            }
        };
        if self.mode.altscreen {
            clamp(&mut self.c);
            clamp(&mut self.saved_c);
        } else {
            clamp(&mut self.back_saved_c);
        }
    }

    /// Reflow the primary screen to a new size.  Line identity is
    /// preserved: the span array is recomputed by soft-wrap stepping
    /// around the cursor's line.
    fn resize_main(&mut self, width: usize, height: usize) -> Stick {
        let alt_active = self.mode.altscreen;
        let mut c = if alt_active { self.last_scr_c } else { self.c };
        let mut saved_c = if alt_active {
            self.back_saved_c
        } else {
            self.saved_c
        };
        c.y = c.y.min(self.main.spans.len() - 1);
        saved_c.y = saved_c.y.min(self.main.spans.len() - 1);

        let prev_first = self.main.spans[0];
        let c_span = self.main.spans[c.y];
        let s_span = self.main.spans[saved_c.y];
        let prev_first_h = self
            .main
            .store
            .register_handle(prev_first.line, prev_first.offset);
        let cursor_h = self
            .main
            .store
            .register_handle(c_span.line, c_span.offset + c.x);
        let saved_h = self
            .main
            .store
            .register_handle(s_span.line, s_span.offset + saved_c.x);

        // The cursor cell must exist so the walk below can land on it.
        self.adjust_line_ex(false, c.y, c.x + 1, c.x + 1);
        self.adjust_line_ex(false, saved_c.y, saved_c.x + 1, saved_c.x + 1);

        // Start from the cursor's row boundary at the new width and
        // walk back to find the new top of the viewport.
        let (c_line, c_off) = self.main.store.handle_pos(cursor_h).unwrap();
        let mut it = LineSpan {
            line: c_line,
            offset: self.round_offset(c_line, c_off, width),
            width: 0,
        };

        let mut shortfall = 0usize;
        for _ in 0..c.y {
            match self.main.store.span_step_back(&it, width) {
                Some(prev) => it = prev,
                None => {
                    shortfall += 1;
                }
            }
        }

        if shortfall > 0 {
            // Ran off the scrollback: prepend blank lines.
            self.sb_limit += shortfall;
            let mut topmost = it.line;
            for _ in 0..shortfall {
                let id = self
                    .main
                    .store
                    .create_line(&Attr::default(), width, &mut self.uris);
                self.main.store.attach_next(id, topmost);
                topmost = id;
            }
            self.main.store.fixup_seq(Some(topmost));
            if let Some(h) = self.top_line {
                self.main.store.move_handle(h, topmost, 0);
            }
            it = LineSpan {
                line: topmost,
                offset: 0,
                width: 0,
            };
        }

        let saved_pos = self.main.store.handle_pos(saved_h).unwrap();
        self.translate_position(it, saved_pos, &mut saved_c, width);
        let cursor_pos = self.main.store.handle_pos(cursor_h).unwrap();
        self.translate_position(it, cursor_pos, &mut c, width);

        // Keep the cursor on screen by pushing rows into scrollback.
        if c.y >= height {
            let delta = c.y - (height - 1);
            c.y -= delta;
            saved_c.y = saved_c.y.saturating_sub(delta);
            for _ in 0..delta {
                if let Some(next) = self.main.store.span_step(&it, width) {
                    it = next;
                }
            }
        }
        saved_c.y = saved_c.y.min(height - 1);

        let (pf_line, _) = self.main.store.handle_pos(prev_first_h).unwrap();
        self.push_history(pf_line, it.line);
        let mut ret = Stick::None;
        if self.free_extra_lines() {
            ret = Stick::Top;
        }

        // Re-emit the span array by forward stepping.
        let mut new_spans: Vec<LineSpan> = Vec::with_capacity(height);
        let mut cur = it;
        loop {
            let w = self.main.store.span_width(cur.line, cur.offset, width);
            new_spans.push(LineSpan {
                line: cur.line,
                offset: cur.offset,
                width: w,
            });
            if new_spans.len() >= height {
                break;
            }
            match self.main.store.span_step(&cur, width) {
                Some(next) => cur = next,
                None => break,
            }
        }
        let filled = new_spans.len();
        self.main.spans = new_spans;

        if filled >= height {
            // Too many rows remain below the viewport: cut and drop.
            let last = self.main.spans[height - 1];
            let cut = last.offset + last.width;
            if cut < self.main.store.line(last.line).size() {
                let new = self
                    .main
                    .store
                    .split_line(last.line, cut, &mut self.uris, &mut self.main.sels);
                for span in &mut self.main.spans {
                    if span.line == last.line && span.offset >= cut {
                        span.line = new;
                        span.offset -= cut;
                    }
                }
            }
            let mut below = self.main.store.line(self.main.spans[height - 1].line).next();
            while let Some(line) = below {
                below = self.main.store.line(line).next();
                if self.main.store.line(line).selection_index.is_some() {
                    self.selection_clear();
                }
                self.main
                    .store
                    .free_line(line, &mut self.uris, &mut self.main.sels);
            }
        }

        while self.main.spans.len() < height {
            let prev = self.main.spans.last().map(|s| s.line);
            let id = self
                .main
                .store
                .create_line(&Attr::default(), width, &mut self.uris);
            if let Some(p) = prev {
                self.main.store.attach_next(p, id);
            }
            self.main.spans.push(LineSpan {
                line: id,
                offset: 0,
                width: 0,
            });
        }

        if alt_active {
            self.last_scr_c = c;
            self.back_saved_c = saved_c;
        } else {
            self.c = c;
            self.saved_c = saved_c;
        }

        self.main.store.unregister_handle(prev_first_h);
        self.main.store.unregister_handle(cursor_h);
        self.main.store.unregister_handle(saved_h);
        ret
    }

    /// Resize both screens.  The primary screen reflows; the alternate
    /// truncates or pads.
    pub fn resize(&mut self, width: usize, height: usize) {
        let width = width.max(2);
        let height = height.max(1);
        if width == self.width && height == self.height {
            return;
        }

        self.main.store.set_pool_limits(width, 4 * height);
        self.alt.store.set_pool_limits(width, 1);
        self.drain_scrolled();

        self.resize_alt(width, height);

        // Anchor for the scrolled-back view: the lower left cell.
        let lower_left = {
            let mut span = self.view();
            for _ in 0..self.height - 1 {
                match self.main.store.span_step(&span, self.width) {
                    Some(next) => span = next,
                    None => break,
                }
            }
            self.main.store.register_handle(span.line, span.offset)
        };

        let top_pos = self.top_line.and_then(|h| self.main.store.handle_pos(h));
        let view_now = self.view();
        let mut stick = if self.mode.altscreen || self.at_bottom() {
            Stick::Bottom
        } else if top_pos == Some((view_now.line, view_now.offset)) {
            Stick::Top
        } else {
            Stick::None
        };

        let stick_after = self.resize_main(width, height);
        if !self.mode.altscreen && stick_after != Stick::None {
            stick = stick_after;
        }

        self.width = width;
        self.height = height;
        self.resize_tabs(width);
        self.reset_margins();

        let ll = self.main.store.handle_pos(lower_left);
        self.main.store.unregister_handle(lower_left);
        match stick {
            Stick::Bottom => self.reset_view(false),
            Stick::Top => {
                if let (Some(vh), Some((top, _))) = (
                    self.view_pos,
                    self.top_line.and_then(|h| self.main.store.handle_pos(h)),
                ) {
                    self.main.store.move_handle(vh, top, 0);
                }
            }
            Stick::None => match ll {
                Some((line, offset)) => {
                    // Keep the old lower-left line visible at the
                    // bottom of the view.
                    let off = self.round_offset(line, offset, width);
                    let mut span = LineSpan {
                        line,
                        offset: off,
                        width: 0,
                    };
                    for _ in 0..height - 1 {
                        match self.main.store.span_step_back(&span, width) {
                            Some(prev) => span = prev,
                            None => break,
                        }
                    }
                    let live = self.main.spans[0];
                    if self
                        .main
                        .store
                        .span_cmp((span.line, span.offset), (live.line, live.offset))
                        == std::cmp::Ordering::Greater
                    {
                        span = live;
                    }
                    if let Some(vh) = self.view_pos {
                        self.main.store.move_handle(vh, span.line, span.offset);
                    }
                }
                None => self.reset_view(false),
            },
        }

        self.damage_lines(0, self.height);
    }
}

/* The print path */

/// Decode one UTF-8 sequence.  `Err(true)` means the sequence runs off
/// the end of the buffer and must be deferred.
fn decode_utf8(run: &[u8], pos: usize) -> Result<(u32, usize), bool> {
    let b = run[pos];
    let (bits, extra) = match b {
        0xc0..=0xdf => ((b & 0x1f) as u32, 1),
        0xe0..=0xef => ((b & 0x0f) as u32, 2),
        0xf0..=0xf7 => ((b & 0x07) as u32, 3),
        _ => return Ok((0xfffd, 1)),
    };
    if pos + 1 + extra > run.len() {
        return Err(true);
    }
    let mut v = bits;
    for i in 1..=extra {
        let c = run[pos + i];
        if c & 0xc0 != 0x80 {
            return Ok((0xfffd, 1));
        }
        v = v << 6 | (c & 0x3f) as u32;
    }
    let valid = match extra {
        1 => v >= 0x80,
        2 => v >= 0x800 && !(0xd800..0xe000).contains(&v),
        _ => (0x10000..=0x10ffff).contains(&v),
    };
    if valid {
        Ok((cellgrid::compact(v), 1 + extra))
    } else {
        Ok((0xfffd, 1 + extra))
    }
}

impl Screen {
    /// Fold a combining mark into the cell just before the cursor.
    fn precompose_at_cursor(&mut self, ch: u32) {
        let span = self.span(self.c.y);
        if span.width <= self.c.x {
            return;
        }
        let x = self.c.x;
        let (storage, _) = self.cur_parts();
        let cells = storage.store.cells_mut(span.line);
        let mut at = span.offset + x;
        if x > 0 {
            at -= 1;
        }
        if cells[at].raw_ch() == 0 && at > span.offset && cells[at - 1].wide() {
            at -= 1;
        }
        if let Some(composed) = try_precompose(cells[at].ch(), uncompact_char(ch)) {
            let wide = cells[at].wide();
            cells[at].set_raw_ch(cellgrid::compact(composed as u32));
            cells[at].set_wide(wide);
        }
    }

    fn print_budget(&self) -> usize {
        let max_x = self.max_x();
        let min_x = self.min_x();
        if self.c.pending && self.mode.wrap {
            (max_x - min_x).max(1)
        } else {
            (if self.c.x >= max_x {
                self.width
            } else {
                max_x
            })
            .saturating_sub(self.c.x)
            .max(1)
        }
    }

    /// The print fast path: consume a run of printable bytes into the
    /// current line.  Returns the number of bytes consumed; 0 means a
    /// partial UTF-8 sequence must be re-presented with more input.
    pub fn dispatch_print(&mut self, run: &[u8], utf8: bool, nrcs_enabled: bool) -> usize {
        let budget = self.print_budget();

        let mut glv = self.c.gl_charset();
        let gr = self.c.gr_charset();
        let upcs = self.upcs;

        let mut pbuf: Vec<u32> = Vec::with_capacity(budget + 1);
        let mut pos = 0usize;
        let mut partial = false;

        while pos < run.len() {
            let b = run[pos];
            if b & 0x60 == 0 {
                break;
            }

            let (mut ch, len) = if b < 0x80 || !utf8 {
                (b as u32, 1)
            } else {
                match decode_utf8(run, pos) {
                    Ok(decoded) => decoded,
                    Err(_) => {
                        partial = true;
                        break;
                    }
                }
            };

            // DEL is ignored unless a 96 character set claims it.
            if ch == 0x7f && !glv.is_96() {
                pos += len;
                continue;
            }

            if ch < 0x100 && len == 1 {
                ch = if utf8 {
                    if ch < 0x80 {
                        nrcs::decode_fast(glv, ch)
                    } else {
                        ch
                    }
                } else {
                    nrcs::decode(glv, gr, upcs, ch, nrcs_enabled)
                };
            }

            if is_combining(uncompact_char(ch)) {
                if pbuf.is_empty() {
                    self.precompose_at_cursor(ch);
                } else {
                    let idx = pbuf.len() - 1 - (pbuf[pbuf.len() - 1] == 0) as usize;
                    if let Some(composed) =
                        try_precompose(uncompact_char(pbuf[idx]), uncompact_char(ch))
                    {
                        pbuf[idx] = cellgrid::compact(composed as u32);
                    }
                }
                pos += len;
                if self.c.gl_ss != self.c.gl {
                    self.c.gl_ss = self.c.gl;
                    glv = self.c.gl_charset();
                }
                continue;
            }

            let wide = is_wide(uncompact_char(ch));
            let needed = 1 + wide as usize;
            if pbuf.len() + needed > budget && !(pbuf.is_empty() && wide) {
                break;
            }
            pbuf.push(ch);
            if wide {
                pbuf.push(0);
            }
            pos += len;

            if self.c.gl_ss != self.c.gl {
                self.c.gl_ss = self.c.gl;
                glv = self.c.gl_charset();
            }
            if pbuf.len() >= budget {
                break;
            }
        }

        if !pbuf.is_empty() {
            if let Some(&last) = pbuf.iter().rev().find(|&&c| c != 0) {
                self.prev_ch = Some(uncompact_char(last));
            }
            self.print_buffer(&pbuf);
        }
        if pos == 0 && partial {
            return 0;
        }
        pos
    }

    /// Write a predecoded buffer of compact code points (`0` marks the
    /// right half of the preceding wide glyph) at the cursor.
    fn print_buffer(&mut self, codes: &[u32]) {
        let total = codes.len();
        if total == 0 {
            return;
        }
        let max_x = self.max_x();

        if self.mode.wrap {
            if self.c.pending || (self.c.x + 1 == max_x && total > 1 && codes[1] == 0) {
                self.wrap(false);
            }
        } else {
            self.c.x = self.c.x.min(max_x.saturating_sub(total));
        }

        let y = self.c.y;
        self.split_line_after(y);

        let x = self.c.x;
        let max_cx = x + total;
        let max_tx = self.max_x();

        {
            let span = self.span(y);
            let (storage, _) = self.cur_parts();
            if max_cx < span.width {
                Self::adjust_wide_right_at(storage, span, max_cx - 1);
            }
            Self::adjust_wide_left_at(storage, span, x);
        }

        let sel_end = if self.mode.insert { max_tx } else { max_cx };
        self.selection_clear_if_intersects(x, y, sel_end, y + 1);

        if self.mode.margin_bell {
            let bcol = max_tx.saturating_sub(self.config.margin_bell_column());
            if x < bcol && max_cx >= bcol {
                self.events.bell = Some(self.mbvol);
            }
        }

        let sgr = self.sgr.clone();
        let attr_id = {
            let span = self.span(y);
            let (storage, uris) = self.cur_parts();
            storage.store.intern_attr(span.line, &sgr, uris)
        };

        let alt = self.mode.altscreen;
        if self.mode.insert && max_cx < max_tx && x < self.span(y).width {
            let new_size = (self.span(y).width + total).min(max_tx);
            self.adjust_line_ex(alt, y, x, new_size);
            let span = self.span(y);
            let tail = (new_size - x).saturating_sub(total);
            if tail > 0 {
                let (storage, _) = self.cur_parts();
                let cells = storage.store.cells_mut(span.line);
                let base = span.offset;
                cells.copy_within(base + x..base + x + tail, base + x + total);
                for cell in &mut cells[base + x..base + x + tail + total] {
                    cell.set_drawn(false);
                }
            }
        } else if self.span(y).width < max_cx {
            self.adjust_line_ex(alt, y, x, max_cx);
        }

        {
            let span = self.span(y);
            let (storage, _) = self.cur_parts();
            let cells = storage.store.cells_mut(span.line);
            let base = span.offset + x;
            for (i, &code) in codes.iter().enumerate() {
                let mut cell = Cell::from_compact(code, attr_id);
                if code != 0 && codes.get(i + 1) == Some(&0) {
                    cell.set_wide(true);
                }
                cells[base + i] = cell;
            }
        }

        let cx = x + total;
        self.c.pending = cx == max_tx;
        self.c.x = cx - self.c.pending as usize;
    }

    /// Line feed at the right margin.  A soft wrap merges the fresh
    /// line into the previous one so the paragraph reflows as a unit.
    fn wrap(&mut self, hard: bool) {
        if self.mode.print_auto {
            let bytes = self.row_bytes(self.c.y);
            self.events.autoprint.push(bytes);
        }
        let moved = self.index();
        self.cr();

        if hard || self.mode.altscreen || !moved {
            return;
        }
        if self.min_x() != 0 || self.max_x() != self.width {
            return;
        }

        let y = self.c.y;
        let span = self.span(y);
        if span.offset != 0 {
            return;
        }
        let prev = match self.cur().store.line(span.line).prev() {
            Some(prev) => prev,
            None => return,
        };

        let prev_size = self.cur().store.line(prev).size();
        let cur_size = self.cur().store.line(span.line).size();
        if prev_size + cur_size > MAX_LINE_LEN {
            let (storage, _) = self.cur_parts();
            storage.store.line_mut(prev).wrapped = true;
            return;
        }

        if y > 0 {
            self.adjust_line(y - 1, self.width);
        }

        let shift = self.cur().store.line(prev).size();
        let freed = span.line;
        {
            let (storage, uris) = self.cur_parts();
            storage.store.line_mut(prev).wrapped = true;
            storage.store.concat_line(prev, freed, uris, &mut storage.sels);
        }
        self.patch_spans_concat(prev, freed, shift);
    }

    /// Hard wrap before starting a new shell prompt (OSC 133).
    pub fn ensure_new_paragraph(&mut self) {
        if self.c.x > self.min_x() {
            self.wrap(true);
        }
        self.split_line_before(self.c.y);
    }

    /// REP: repeat the last printed character.
    pub fn rep(&mut self, count: usize) {
        let ch = match self.prev_ch {
            Some(ch) => ch,
            None => return,
        };
        let code = cellgrid::compact(ch as u32);
        let wide = is_wide(ch);
        let per = 1 + wide as usize;

        let mut remaining = count;
        while remaining > 0 {
            let budget = self.print_budget();
            let n = remaining.min((budget / per).max(1));
            let mut pbuf = Vec::with_capacity(n * per);
            for _ in 0..n {
                pbuf.push(code);
                if wide {
                    pbuf.push(0);
                }
            }
            self.print_buffer(&pbuf);
            remaining -= n;
        }
    }

    /// Put a single character as if it had been printed (SUB's
    /// reversed question mark, local echo).
    pub fn put_char(&mut self, ch: char) {
        let code = cellgrid::compact(ch as u32);
        if is_wide(ch) {
            self.print_buffer(&[code, 0]);
        } else {
            self.print_buffer(&[code]);
        }
        self.prev_ch = Some(ch);
    }
}

/* URI attribute application */

impl Screen {
    /// Apply `uri` to `len` cells starting at the given line position,
    /// following the continuation chain if the range runs past the
    /// line end.  Applying twice is idempotent: the rewritten
    /// attributes intern to the same records.
    pub fn apply_uri_range(&mut self, line: LineId, offset: usize, len: usize, uri: cellgrid::UriId) {
        let (storage, uris) = self.cur_parts();
        let mut line = line;
        let mut offset = offset;
        let mut remaining = len;
        while remaining > 0 {
            if !storage.store.is_live(line) {
                return;
            }
            let size = storage.store.line(line).size();
            if offset >= size {
                match storage.store.line(line).next() {
                    Some(next) => {
                        line = next;
                        offset = 0;
                        continue;
                    }
                    None => return,
                }
            }
            let n = remaining.min(size - offset);
            for at in offset..offset + n {
                let old_id = storage.store.cells(line)[at].attr_id();
                let mut attr = storage.store.attr_of(line, old_id).clone();
                if attr.uri != Some(uri) {
                    attr.uri = Some(uri);
                    let new_id = storage.store.intern_attr(line, &attr, uris);
                    storage.store.cells_mut(line)[at].set_attr_id(new_id);
                }
            }
            remaining -= n;
            offset += n;
        }
    }

    /// Repaint every cell referencing `uri` (hover highlight).
    pub fn damage_uri(&mut self, uri: cellgrid::UriId) {
        let height = self.height();
        let (storage, _) = self.cur_parts();
        for y in 0..height {
            let span = storage.spans[y];
            let has = {
                let line = storage.store.line(span.line);
                (0..line.attrs.len() as u16).any(|id| line.attrs.get(id).uri == Some(uri))
            };
            if has {
                storage.store.line_mut(span.line).force_damage = true;
            }
        }
    }

    /// The URI under a view position, if any.
    pub fn uri_at(&self, x: usize, y: usize) -> Option<cellgrid::UriId> {
        let rows = self.view_rows();
        let span = rows.get(y)?;
        if x >= span.width {
            return None;
        }
        let store = &self.cur().store;
        let id = store.cells(span.line)[span.offset + x].attr_id();
        store.attr_of(span.line, id).uri
    }
}
