//! The selection engine.
//!
//! Selections are anchored by registered line handles, so they follow
//! their text through scrolling, reflow and line splits.  The visible
//! highlight is expressed as per line segment lists owned by the
//! screen storage; this module recomputes those lists on every drag
//! and serializes the final text on release.

use crate::screen::Screen;
use cellgrid::{HandleId, LineId, LineSpan, SNAP_RIGHT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    None,
    Char,
    Word,
    Line,
    Rect,
}

impl Default for SelectionMode {
    fn default() -> Self {
        SelectionMode::None
    }
}

#[derive(Debug, Default)]
pub struct SelectionState {
    pub mode: SelectionMode,
    pub dragging: bool,
    anchor: Option<HandleId>,
    head: Option<HandleId>,
    /// Visual columns, used for rectangular selections where the
    /// in-line offset is not meaningful across rows.
    anchor_x: usize,
    head_x: usize,
    /// Lines currently carrying segments, so clears are cheap.
    selected: Vec<LineId>,
}

impl SelectionState {
    pub fn is_active(&self) -> bool {
        self.mode != SelectionMode::None
    }
}

impl Screen {
    pub fn selection_active(&self) -> bool {
        self.sstate.is_active()
    }

    /// Mark every selected line for repaint.
    pub fn damage_selection(&mut self) {
        let selected = std::mem::take(&mut self.sstate.selected);
        {
            let storage = if self.mode.altscreen {
                &mut self.alt
            } else {
                &mut self.main
            };
            for &line in &selected {
                if storage.store.is_live(line) {
                    storage.store.line_mut(line).force_damage = true;
                }
            }
        }
        self.sstate.selected = selected;
    }

    /// Drop the selection: segments, indexes and handles.
    pub fn selection_clear(&mut self) {
        self.damage_selection();
        let selected = std::mem::take(&mut self.sstate.selected);
        let storage = if self.mode.altscreen {
            &mut self.alt
        } else {
            &mut self.main
        };
        for line in selected {
            if !storage.store.is_live(line) {
                continue;
            }
            if let Some(idx) = storage.store.line_mut(line).selection_index.take() {
                storage.sels.free(idx);
            }
        }
        for h in [self.sstate.anchor.take(), self.sstate.head.take()]
            .iter()
            .flatten()
        {
            storage.store.unregister_handle(*h);
        }
        self.sstate.mode = SelectionMode::None;
        self.sstate.dragging = false;
    }

    /// Called by destructive edits with viewport coordinates; clears
    /// the selection when the edit touches it.
    pub fn selection_clear_if_intersects(&mut self, xs: usize, ys: usize, xe: usize, ye: usize) {
        if !self.sstate.is_active() {
            return;
        }
        let mut hit = false;
        for y in ys..ye.min(self.height()) {
            let span = self.span(y);
            let storage = self.cur();
            if let Some(idx) = storage.store.line(span.line).selection_index {
                if let Some(list) = storage.sels.get(idx) {
                    let lo = (span.offset + xs) as u32;
                    let hi = (span.offset + xe) as u32;
                    if list
                        .segments()
                        .iter()
                        .any(|s| s.offset < hi && (s.length == SNAP_RIGHT || s.offset + s.length > lo))
                    {
                        hit = true;
                        break;
                    }
                }
            }
        }
        if hit {
            self.selection_clear();
        }
    }

    fn view_position(&self, x: usize, y: usize) -> (LineId, usize, usize) {
        let rows = self.view_rows();
        let span = rows[y.min(rows.len() - 1)];
        let x = x.min(self.width() - 1);
        (span.line, span.offset + x, x)
    }

    /// Begin a selection at view coordinates.
    pub fn selection_start(&mut self, x: usize, y: usize, mode: SelectionMode) {
        self.selection_clear();
        if mode == SelectionMode::None {
            return;
        }
        let (line, offset, vx) = self.view_position(x, y);
        let storage = if self.mode.altscreen {
            &mut self.alt
        } else {
            &mut self.main
        };
        self.sstate.anchor = Some(storage.store.register_handle(line, offset));
        self.sstate.head = Some(storage.store.register_handle(line, offset));
        self.sstate.anchor_x = vx;
        self.sstate.head_x = vx;
        self.sstate.mode = mode;
        self.sstate.dragging = true;
        self.selection_recompute();
    }

    /// Extend the selection to new view coordinates (pointer drag).
    pub fn selection_extend(&mut self, x: usize, y: usize) {
        if !self.sstate.is_active() {
            return;
        }
        let (line, offset, vx) = self.view_position(x, y);
        let head = match self.sstate.head {
            Some(h) => h,
            None => return,
        };
        let storage = if self.mode.altscreen {
            &mut self.alt
        } else {
            &mut self.main
        };
        storage.store.move_handle(head, line, offset);
        self.sstate.head_x = vx;
        self.selection_recompute();
    }

    /// Finish the drag and serialize the selected text.
    pub fn selection_release(&mut self) -> Vec<u8> {
        self.sstate.dragging = false;
        self.selected_text()
    }

    fn handle_pos_of(&self, h: Option<HandleId>) -> Option<(LineId, usize)> {
        let storage = self.cur();
        h.and_then(|h| storage.store.handle_pos(h))
    }

    /// Ordered (start, end) endpoints, inclusive.
    fn selection_endpoints(&self) -> Option<((LineId, usize, usize), (LineId, usize, usize))> {
        let a = self.handle_pos_of(self.sstate.anchor)?;
        let b = self.handle_pos_of(self.sstate.head)?;
        let (ax, bx) = (self.sstate.anchor_x, self.sstate.head_x);
        let store = &self.cur().store;
        if store.span_cmp(a, b) == std::cmp::Ordering::Greater {
            Some(((b.0, b.1, bx), (a.0, a.1, ax)))
        } else {
            Some(((a.0, a.1, ax), (b.0, b.1, bx)))
        }
    }

    fn word_class(&self, line: LineId, at: usize) -> u8 {
        let store = &self.cur().store;
        if at >= store.line(line).size() {
            return 0;
        }
        let ch = store.cells(line)[at].ch();
        if ch == ' ' {
            0
        } else if ch.is_alphanumeric() || self.config().word_chars().contains(ch) {
            1
        } else {
            2
        }
    }

    /// Recompute the per line segment lists from the endpoints.
    pub fn selection_recompute(&mut self) {
        // Clear previous segments first.
        self.damage_selection();
        {
            let selected = std::mem::take(&mut self.sstate.selected);
            let storage = if self.mode.altscreen {
                &mut self.alt
            } else {
                &mut self.main
            };
            for line in selected {
                if storage.store.is_live(line) {
                    if let Some(idx) = storage.store.line_mut(line).selection_index.take() {
                        storage.sels.free(idx);
                    }
                }
            }
        }

        let (start, end) = match self.selection_endpoints() {
            Some(ends) => ends,
            None => {
                self.sstate.mode = SelectionMode::None;
                return;
            }
        };

        let mode = self.sstate.mode;
        let mut ranges: Vec<(LineId, u32, u32)> = Vec::new();

        match mode {
            SelectionMode::None => return,
            SelectionMode::Rect => {
                // Column bounds apply to every visual row in between.
                let (lo_x, hi_x) = if start.2 <= end.2 {
                    (start.2, end.2)
                } else {
                    (end.2, start.2)
                };
                let width = self.width();
                let store = &self.cur().store;
                let mut span = LineSpan {
                    line: start.0,
                    offset: 0,
                    width: 0,
                };
                // Round the start down to its row boundary.
                span.offset = {
                    let mut off = 0;
                    loop {
                        let next = store.line_advance_width(start.0, off, width);
                        if next > start.1 || next <= off {
                            break;
                        }
                        off = next;
                    }
                    off
                };
                loop {
                    let row_end = store.line_advance_width(span.line, span.offset, width);
                    ranges.push((
                        span.line,
                        (span.offset + lo_x) as u32,
                        (span.offset + hi_x + 1) as u32,
                    ));
                    let passed_end = store.span_cmp((span.line, span.offset), (end.0, end.1))
                        != std::cmp::Ordering::Less
                        || (span.line == end.0 && row_end > end.1);
                    if passed_end {
                        break;
                    }
                    match store.span_step(&span, width) {
                        Some(next) => span = next,
                        None => break,
                    }
                }
            }
            _ => {
                let (mut s_line, mut s_off) = (start.0, start.1);
                let (mut e_line, mut e_off) = (end.0, end.1);
                let store = &self.cur().store;

                match mode {
                    SelectionMode::Word => {
                        let class = self.word_class(s_line, s_off);
                        while s_off > 0 && self.word_class(s_line, s_off - 1) == class {
                            s_off -= 1;
                        }
                        let e_size = store.line(e_line).size();
                        let eclass = self.word_class(e_line, e_off);
                        while e_off + 1 < e_size && self.word_class(e_line, e_off + 1) == eclass {
                            e_off += 1;
                        }
                    }
                    SelectionMode::Line => {
                        // Expand to the enclosing paragraphs.
                        while let Some(prev) = store.line(s_line).prev() {
                            if !store.line(prev).wrapped {
                                break;
                            }
                            s_line = prev;
                        }
                        s_off = 0;
                        while store.line(e_line).wrapped {
                            match store.line(e_line).next() {
                                Some(next) => e_line = next,
                                None => break,
                            }
                        }
                        e_off = store.line(e_line).size();
                    }
                    _ => {}
                }

                let mut line = s_line;
                loop {
                    let first = line == s_line;
                    let last = line == e_line;
                    let from = if first { s_off as u32 } else { 0 };
                    if last {
                        let to = if mode == SelectionMode::Line {
                            SNAP_RIGHT
                        } else {
                            e_off as u32 + 1
                        };
                        ranges.push((line, from, to));
                        break;
                    }
                    ranges.push((line, from, SNAP_RIGHT));
                    match store.line(line).next() {
                        Some(next) => line = next,
                        None => break,
                    }
                }
            }
        }

        // Apply the computed ranges as segments.
        let storage = if self.mode.altscreen {
            &mut self.alt
        } else {
            &mut self.main
        };
        for (line, from, to) in ranges {
            if !storage.store.is_live(line) {
                continue;
            }
            let idx = match storage.store.line(line).selection_index {
                Some(idx) => idx,
                None => {
                    let idx = storage.sels.alloc();
                    storage.store.line_mut(line).selection_index = Some(idx);
                    self.sstate.selected.push(line);
                    idx
                }
            };
            if let Some(list) = storage.sels.get_mut(idx) {
                let length = if to == SNAP_RIGHT {
                    SNAP_RIGHT
                } else {
                    to.saturating_sub(from)
                };
                list.push(from, length);
            }
        }

        self.damage_selection();
    }

    /// Whether the given cell (line relative offset) is selected.
    pub fn is_cell_selected(&self, line: LineId, offset: usize) -> bool {
        if !self.sstate.is_active() {
            return false;
        }
        let storage = self.cur();
        if !storage.store.is_live(line) {
            return false;
        }
        storage
            .store
            .line(line)
            .selection_index
            .and_then(|idx| storage.sels.get(idx))
            .map(|list| list.contains(offset as u32))
            .unwrap_or(false)
    }

    /// Serialize the selection, honoring wrap flags for paragraph
    /// breaks.
    pub fn selected_text(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let storage = self.cur();
        let store = &storage.store;

        let mut ordered: Vec<LineId> = self
            .sstate
            .selected
            .iter()
            .copied()
            .filter(|&l| store.is_live(l))
            .collect();
        ordered.sort_by(|&a, &b| store.line(a).seq().cmp(&store.line(b).seq()));

        let mut buf = [0u8; 4];
        for (i, &line) in ordered.iter().enumerate() {
            let idx = match store.line(line).selection_index {
                Some(idx) => idx,
                None => continue,
            };
            let list = match storage.sels.get(idx) {
                Some(list) => list,
                None => continue,
            };
            let cells = store.cells(line);
            for seg in list.segments() {
                let from = seg.offset as usize;
                let to = if seg.length == SNAP_RIGHT {
                    cells.len()
                } else {
                    ((seg.offset + seg.length) as usize).min(cells.len())
                };
                for cell in cells.iter().take(to).skip(from.min(to)) {
                    if cell.raw_ch() == 0 && cell.wide() {
                        continue;
                    }
                    out.extend_from_slice(cell.ch().encode_utf8(&mut buf).as_bytes());
                }
            }
            // A paragraph break happens where the line does not
            // continue; trailing blanks up to a snapped-right edge
            // are dropped with it.
            let snapped = list
                .segments()
                .last()
                .map(|s| s.length == SNAP_RIGHT)
                .unwrap_or(false);
            if snapped {
                while out.last() == Some(&b' ') {
                    out.pop();
                }
            }
            let is_last = i + 1 == ordered.len();
            if !is_last && !store.line(line).wrapped {
                out.push(b'\n');
            }
        }
        out
    }
}
