//! Lines, the line store, spans and registered handles.
//!
//! A `Line` is one logical row of output: possibly much wider than the
//! screen, in which case the viewport maps it through several
//! [`LineSpan`]s, one per visual row.  Lines are kept in an arena and
//! chained through `prev`/`next` ids in `seq` order; cell payloads
//! live in the [`MultiPool`].  A [`HandleId`] is a registered
//! reference to a position inside a line which the store patches when
//! lines split, merge or die.

use crate::cell::{Attr, AttrTable, Cell};
use crate::pool::{MultiPool, PoolAddr};
use crate::selection::SelectionStore;
use crate::uri::UriTable;
use std::cmp::Ordering;

/// Paragraphs longer than this are forcibly hard wrapped; bounds the
/// cost of rewrap and selection walks.
pub const MAX_LINE_LEN: usize = 16384;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(u32);

/// A view of one visual row: `width` cells of `line` starting at
/// column `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSpan {
    pub line: LineId,
    pub offset: usize,
    pub width: usize,
}

#[derive(Debug)]
pub struct Line {
    addr: PoolAddr,
    size: usize,
    caps: usize,
    seq: u64,
    prev: Option<LineId>,
    next: Option<LineId>,
    handles: Vec<HandleId>,

    /// Attribute used for the implicit blank cells beyond `size`.
    pub pad_attr_id: u16,
    /// The line continues onto `next` (an over-long or split
    /// paragraph).
    pub wrapped: bool,
    /// Renderer must repaint every cell of this line.
    pub force_damage: bool,
    /// Index into the selection store, when any cell is selected.
    pub selection_index: Option<u32>,
    /// Shell integration: a prompt starts on this line (OSC 133 A).
    pub sh_ps1_start: bool,
    /// Shell integration: a command starts on this line (OSC 133 B).
    pub sh_cmd_start: bool,

    pub attrs: AttrTable,
}

impl Line {
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn caps(&self) -> usize {
        self.caps
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn prev(&self) -> Option<LineId> {
        self.prev
    }

    pub fn next(&self) -> Option<LineId> {
        self.next
    }

    pub fn addr(&self) -> PoolAddr {
        self.addr
    }

    /// Adjust the logical length.  The caller must have initialized
    /// any newly exposed cells.
    pub fn set_size(&mut self, size: usize) {
        debug_assert!(size <= self.caps);
        self.size = size;
    }
}

#[derive(Debug)]
pub struct LineStore {
    slots: Vec<Option<Line>>,
    free: Vec<u32>,
    pool: MultiPool,
    handles: Vec<Option<(LineId, usize)>>,
    free_handles: Vec<u32>,
    seq: u64,
}

impl LineStore {
    /// `pool_size` is the slab capacity in cells; pads and quotas are
    /// tuned for screen-width lines.
    pub fn new(pool_size: usize, max_pad: usize, max_unsealed: usize) -> Self {
        LineStore {
            slots: Vec::new(),
            free: Vec::new(),
            pool: MultiPool::new(pool_size, max_pad, max_unsealed),
            handles: Vec::new(),
            free_handles: Vec::new(),
            seq: 0,
        }
    }

    pub fn pool(&self) -> &MultiPool {
        &self.pool
    }

    pub fn set_pool_limits(&mut self, max_pad: usize, max_unsealed: usize) {
        self.pool.set_limits(max_pad, max_unsealed);
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    pub fn line(&self, id: LineId) -> &Line {
        self.slots[id.0 as usize].as_ref().expect("dead line id")
    }

    pub fn line_mut(&mut self, id: LineId) -> &mut Line {
        self.slots[id.0 as usize].as_mut().expect("dead line id")
    }

    pub fn is_live(&self, id: LineId) -> bool {
        matches!(self.slots.get(id.0 as usize), Some(Some(_)))
    }

    /// Cells within the logical length.
    pub fn cells(&self, id: LineId) -> &[Cell] {
        let line = self.line(id);
        self.pool.cells(line.addr, line.size)
    }

    pub fn cells_mut(&mut self, id: LineId) -> &mut [Cell] {
        let line = self.slots[id.0 as usize].as_ref().expect("dead line id");
        self.pool.cells_mut(line.addr, line.size)
    }

    /// The line together with its full capacity cell slice.
    pub fn line_and_cells_mut(&mut self, id: LineId) -> (&mut Line, &mut [Cell]) {
        let line = self.slots[id.0 as usize].as_mut().expect("dead line id");
        let cells = self.pool.cells_mut(line.addr, line.caps);
        (line, cells)
    }

    pub fn attr_of(&self, id: LineId, attr_id: u16) -> &Attr {
        self.line(id).attrs.get(attr_id)
    }

    pub fn intern_attr(&mut self, id: LineId, attr: &Attr, uris: &mut UriTable) -> u16 {
        let line = self.slots[id.0 as usize].as_mut().expect("dead line id");
        line.attrs.intern(attr, uris)
    }

    /// Create an unlinked empty line with capacity for `width` cells,
    /// padded with `pad`.
    pub fn create_line(&mut self, pad: &Attr, width: usize, uris: &mut UriTable) -> LineId {
        let caps = width.max(1);
        let addr = self.pool.alloc(caps);
        let mut attrs = AttrTable::new();
        let pad_attr_id = attrs.intern(pad, uris);
        for cell in self.pool.cells_mut(addr, caps) {
            *cell = Cell::blank(pad_attr_id);
        }
        let line = Line {
            addr,
            size: 0,
            caps,
            seq: self.next_seq(),
            prev: None,
            next: None,
            handles: Vec::new(),
            pad_attr_id,
            wrapped: false,
            force_damage: false,
            selection_index: None,
            sh_ps1_start: false,
            sh_cmd_start: false,
            attrs,
        };
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Some(line);
                LineId(slot)
            }
            None => {
                self.slots.push(Some(line));
                LineId((self.slots.len() - 1) as u32)
            }
        }
    }

    /// Destroy a line: unlink it, release its attributes (and thereby
    /// URI references), its selection segments, its payload and any
    /// handles still registered on it.
    pub fn free_line(&mut self, id: LineId, uris: &mut UriTable, sels: &mut SelectionStore) {
        self.detach_prev(id);
        self.detach_next(id);
        let mut line = self.slots[id.0 as usize].take().expect("double free of line");
        line.attrs.release(uris);
        if let Some(sel) = line.selection_index.take() {
            sels.free(sel);
        }
        for h in line.handles.drain(..) {
            // Owners are expected to have moved their handles off a
            // dying line; a leftover handle turns into a dead one.
            log::debug!("handle {:?} died with its line", h);
            self.handles[h.0 as usize] = None;
            self.free_handles.push(h.0);
        }
        self.pool.free(line.addr, line.caps);
        self.free.push(id.0);
    }

    /// Grow the payload to hold at least `caps` cells, pinning the
    /// pool so subsequent grows stay cheap.  Newly exposed capacity is
    /// filled with pad cells.
    pub fn ensure_caps(&mut self, id: LineId, caps: usize) {
        let (addr, old_caps, pad) = {
            let line = self.line(id);
            (line.addr, line.caps, line.pad_attr_id)
        };
        if caps <= old_caps {
            return;
        }
        let new_addr = self.pool.realloc(addr, old_caps, caps, true);
        for cell in &mut self.pool.cells_mut(new_addr, caps)[old_caps..] {
            *cell = Cell::blank(pad);
        }
        let line = self.line_mut(id);
        line.addr = new_addr;
        line.caps = caps;
    }

    /* Linked list surgery.  The chain is kept in strictly increasing
     * `seq` order; insertions renumber the suffix. */

    pub fn attach_next(&mut self, a: LineId, b: LineId) {
        debug_assert!(self.line(a).next.is_none() && self.line(b).prev.is_none());
        self.line_mut(a).next = Some(b);
        self.line_mut(b).prev = Some(a);
    }

    pub fn detach_next(&mut self, id: LineId) -> Option<LineId> {
        let next = self.line_mut(id).next.take()?;
        self.line_mut(next).prev = None;
        Some(next)
    }

    pub fn detach_prev(&mut self, id: LineId) -> Option<LineId> {
        let prev = self.line_mut(id).prev.take()?;
        self.line_mut(prev).next = None;
        Some(prev)
    }

    /// Renumber `from` and everything after it so that `seq` stays
    /// strictly monotonic after an insertion.
    pub fn fixup_seq(&mut self, from: Option<LineId>) {
        let mut it = from;
        while let Some(id) = it {
            let seq = self.next_seq();
            let line = self.line_mut(id);
            line.seq = seq;
            it = line.next;
        }
    }

    /// Order two positions by their place in the chain.
    pub fn span_cmp(&self, a: (LineId, usize), b: (LineId, usize)) -> Ordering {
        let (sa, sb) = (self.line(a.0).seq, self.line(b.0).seq);
        sa.cmp(&sb).then(a.1.cmp(&b.1))
    }

    /* Registered handles. */

    pub fn register_handle(&mut self, line: LineId, offset: usize) -> HandleId {
        let h = match self.free_handles.pop() {
            Some(slot) => {
                self.handles[slot as usize] = Some((line, offset));
                HandleId(slot)
            }
            None => {
                self.handles.push(Some((line, offset)));
                HandleId((self.handles.len() - 1) as u32)
            }
        };
        self.line_mut(line).handles.push(h);
        h
    }

    pub fn unregister_handle(&mut self, h: HandleId) {
        match self.handles.get(h.0 as usize).copied() {
            Some(Some((line, _))) => {
                if self.is_live(line) {
                    let handles = &mut self.line_mut(line).handles;
                    if let Some(at) = handles.iter().position(|&x| x == h) {
                        handles.swap_remove(at);
                    }
                }
                self.handles[h.0 as usize] = None;
                self.free_handles.push(h.0);
            }
            // Already died with its line; the slot was reclaimed then.
            _ => {}
        }
    }

    /// Current position of a handle; `None` when its line died.
    pub fn handle_pos(&self, h: HandleId) -> Option<(LineId, usize)> {
        self.handles.get(h.0 as usize).copied().flatten()
    }

    pub fn move_handle(&mut self, h: HandleId, line: LineId, offset: usize) {
        if let Some((old_line, _)) = self.handle_pos(h) {
            if old_line != line {
                if self.is_live(old_line) {
                    let handles = &mut self.line_mut(old_line).handles;
                    if let Some(at) = handles.iter().position(|&x| x == h) {
                        handles.swap_remove(at);
                    }
                }
                self.line_mut(line).handles.push(h);
            }
            self.handles[h.0 as usize] = Some((line, offset));
        } else {
            self.handles[h.0 as usize] = Some((line, offset));
            self.line_mut(line).handles.push(h);
        }
    }

    /* Soft wrap geometry. */

    /// Walk forward from `offset` by up to `screen_width` cells,
    /// stopping at the line end and never splitting a wide glyph.
    /// Returns the offset of the next visual row within the line.
    pub fn line_advance_width(&self, id: LineId, offset: usize, screen_width: usize) -> usize {
        let line = self.line(id);
        if offset >= line.size {
            return line.size;
        }
        let mut end = (offset + screen_width.max(1)).min(line.size);
        if end < line.size {
            let cells = self.pool.cells(line.addr, line.size);
            if cells[end].raw_ch() == 0 && cells[end - 1].wide() {
                end -= 1;
            }
            end = end.max(offset + 1);
        }
        end
    }

    /// Number of cells of `line` shown on the row starting at
    /// `offset`.
    pub fn span_width(&self, id: LineId, offset: usize, screen_width: usize) -> usize {
        self.line_advance_width(id, offset, screen_width) - offset.min(self.line(id).size)
    }

    /// The next visual row after `span`, crossing into the next line
    /// when this one is exhausted.
    pub fn span_step(&self, span: &LineSpan, screen_width: usize) -> Option<LineSpan> {
        let line = self.line(span.line);
        let next_off = self.line_advance_width(span.line, span.offset, screen_width);
        if next_off < line.size && next_off > span.offset {
            Some(LineSpan {
                line: span.line,
                offset: next_off,
                width: self.span_width(span.line, next_off, screen_width),
            })
        } else {
            let next = line.next?;
            Some(LineSpan {
                line: next,
                offset: 0,
                width: self.span_width(next, 0, screen_width),
            })
        }
    }

    /// The visual row before `span`.
    pub fn span_step_back(&self, span: &LineSpan, screen_width: usize) -> Option<LineSpan> {
        let (line, below) = if span.offset > 0 {
            (span.line, span.offset)
        } else {
            let prev = self.line(span.line).prev?;
            (prev, usize::MAX)
        };
        let mut off = 0;
        loop {
            let next = self.line_advance_width(line, off, screen_width);
            if next >= below.min(self.line(line).size) || next <= off {
                break;
            }
            off = next;
        }
        Some(LineSpan {
            line,
            offset: off,
            width: self.span_width(line, off, screen_width),
        })
    }

    /// Visual rows this line occupies at the given width.
    pub fn row_count(&self, id: LineId, screen_width: usize) -> usize {
        let size = self.line(id).size;
        if size == 0 {
            return 1;
        }
        let mut rows = 0;
        let mut off = 0;
        while off < size {
            let next = self.line_advance_width(id, off, screen_width);
            rows += 1;
            if next <= off {
                break;
            }
            off = next;
        }
        rows
    }

    /// Split `id` into `[0, at)` and a new line holding `[at, size)`.
    /// The first half is marked as continuing onto the second; the
    /// original continuation flag migrates to the second half, as do
    /// handles and selection segments at or beyond the cut.
    pub fn split_line(
        &mut self,
        id: LineId,
        at: usize,
        uris: &mut UriTable,
        sels: &mut SelectionStore,
    ) -> LineId {
        let (old_addr, old_size, old_attrs, pad_attr, wrapped, force_damage) = {
            let line = self.line(id);
            (
                line.addr,
                line.size,
                line.attrs.clone(),
                line.attrs.get(line.pad_attr_id).clone(),
                line.wrapped,
                line.force_damage,
            )
        };
        let at = at.min(old_size);
        let tail = old_size - at;

        let new_id = self.create_line(&pad_attr, tail, uris);
        if tail > 0 {
            let new_addr = self.line(new_id).addr;
            self.pool.copy_cells(old_addr, at..old_size, new_addr, 0);
        }

        // Re-intern attributes into the new line's table.
        {
            let mut remap: Vec<Option<u16>> = vec![None; old_attrs.len()];
            let line = self.slots[new_id.0 as usize].as_mut().expect("dead line id");
            let cells = self.pool.cells_mut(line.addr, tail);
            for cell in cells {
                let old_id = cell.attr_id() as usize;
                let mapped = match remap.get(old_id).copied().flatten() {
                    Some(m) => m,
                    None => {
                        let m = line.attrs.intern(old_attrs.get(old_id as u16), uris);
                        if old_id < remap.len() {
                            remap[old_id] = Some(m);
                        }
                        m
                    }
                };
                let drawn = cell.drawn();
                cell.set_attr_id(mapped);
                cell.set_drawn(drawn);
            }
            line.size = tail;
            line.wrapped = wrapped;
            line.force_damage = force_damage;
        }

        // Relink: old -> new -> old.next.
        let old_next = self.detach_next(id);
        self.attach_next(id, new_id);
        if let Some(next) = old_next {
            self.attach_next(new_id, next);
        }
        {
            let line = self.line_mut(id);
            line.size = at;
            line.wrapped = true;
        }
        self.fixup_seq(Some(new_id));

        // Handles at or beyond the cut follow their cells.
        let moving: Vec<HandleId> = self
            .line(id)
            .handles
            .iter()
            .copied()
            .filter(|h| matches!(self.handle_pos(*h), Some((_, off)) if off >= at))
            .collect();
        for h in moving {
            let off = self.handle_pos(h).unwrap().1;
            self.move_handle(h, new_id, off - at);
        }

        // Partition selection segments at the cut.
        let old_sel = self.line(id).selection_index;
        if let Some(sel) = old_sel {
            let tail_list = sels.get_mut(sel).map(|l| l.split_off(at as u32));
            match tail_list {
                Some(tail_list) if !tail_list.is_empty() => {
                    let new_sel = sels.alloc();
                    *sels.get_mut(new_sel).unwrap() = tail_list;
                    self.line_mut(new_id).selection_index = Some(new_sel);
                }
                _ => {}
            }
            if sels.get(sel).map(|l| l.is_empty()).unwrap_or(false) {
                sels.free(sel);
                self.line_mut(id).selection_index = None;
            }
        }

        new_id
    }

    /// Merge `b` into `a`.  Requires `a.next == b` and `a` marked as a
    /// continuation; `b` is destroyed.  Returns `a`.
    pub fn concat_line(
        &mut self,
        a: LineId,
        b: LineId,
        uris: &mut UriTable,
        sels: &mut SelectionStore,
    ) -> LineId {
        debug_assert_eq!(self.line(a).next, Some(b));
        debug_assert!(self.line(a).wrapped);

        let a_size = self.line(a).size;
        let (b_addr, b_size, b_attrs, b_wrapped) = {
            let line = self.line(b);
            (line.addr, line.size, line.attrs.clone(), line.wrapped)
        };

        self.ensure_caps(a, a_size + b_size);
        if b_size > 0 {
            let a_addr = self.line(a).addr;
            self.pool.copy_cells(b_addr, 0..b_size, a_addr, a_size);
        }

        {
            let mut remap: Vec<Option<u16>> = vec![None; b_attrs.len()];
            let line = self.slots[a.0 as usize].as_mut().expect("dead line id");
            let cells = &mut self.pool.cells_mut(line.addr, a_size + b_size)[a_size..];
            for cell in cells {
                let old_id = cell.attr_id() as usize;
                let mapped = match remap.get(old_id).copied().flatten() {
                    Some(m) => m,
                    None => {
                        let m = line.attrs.intern(b_attrs.get(old_id as u16), uris);
                        if old_id < remap.len() {
                            remap[old_id] = Some(m);
                        }
                        m
                    }
                };
                let drawn = cell.drawn();
                cell.set_attr_id(mapped);
                cell.set_drawn(drawn);
            }
            line.size = a_size + b_size;
            line.wrapped = b_wrapped;
        }

        // Handles and selection follow the cells.
        let moving: Vec<HandleId> = self.line(b).handles.clone();
        for h in moving {
            if let Some((_, off)) = self.handle_pos(h) {
                self.move_handle(h, a, a_size + off);
            }
        }
        if let Some(b_sel) = self.line_mut(b).selection_index.take() {
            let b_list = sels.get(b_sel).cloned().unwrap_or_default();
            let a_sel = match self.line(a).selection_index {
                Some(s) => s,
                None => {
                    let s = sels.alloc();
                    self.line_mut(a).selection_index = Some(s);
                    s
                }
            };
            if let Some(list) = sels.get_mut(a_sel) {
                list.concat(&b_list, a_size as u32);
            }
            sels.free(b_sel);
        }

        let b_next = self.detach_next(b);
        self.detach_next(a);
        if let Some(next) = b_next {
            // b is already unlinked from next by detach; splice a in.
            self.attach_next(a, next);
        }
        self.free_line(b, uris, sels);
        a
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cell::Attr;

    fn store() -> (LineStore, UriTable, SelectionStore) {
        (
            LineStore::new(4096, 256, 4),
            UriTable::default(),
            SelectionStore::default(),
        )
    }

    fn fill(store: &mut LineStore, id: LineId, text: &str, uris: &mut UriTable) {
        let n = text.chars().count();
        store.ensure_caps(id, n);
        let attr_id = store.intern_attr(id, &Attr::default(), uris);
        let (line, cells) = store.line_and_cells_mut(id);
        for (i, ch) in text.chars().enumerate() {
            cells[i] = Cell::new(ch, attr_id);
        }
        line.set_size(n);
    }

    fn text_of(store: &LineStore, id: LineId) -> String {
        store.cells(id).iter().map(|c| c.ch()).collect()
    }

    #[test]
    fn create_and_fill() {
        let (mut store, mut uris, _sels) = store();
        let id = store.create_line(&Attr::default(), 10, &mut uris);
        fill(&mut store, id, "hello", &mut uris);
        assert_eq!(text_of(&store, id), "hello");
        assert_eq!(store.line(id).size(), 5);
    }

    #[test]
    fn advance_width_respects_wide_glyphs() {
        let (mut store, mut uris, _sels) = store();
        let id = store.create_line(&Attr::default(), 10, &mut uris);
        // "a" + wide glyph occupying cells 1-2 + "b".
        store.ensure_caps(id, 4);
        let (line, cells) = store.line_and_cells_mut(id);
        cells[0] = Cell::new('a', 0);
        cells[1] = Cell::new('世', 0);
        cells[1].set_wide(true);
        cells[2] = Cell::blank(0);
        cells[3] = Cell::new('b', 0);
        line.set_size(4);

        // A two column screen cannot split the wide glyph: the first
        // row holds just "a".
        assert_eq!(store.line_advance_width(id, 0, 2), 1);
        assert_eq!(store.line_advance_width(id, 1, 2), 3);
        assert_eq!(store.line_advance_width(id, 3, 2), 4);
        assert_eq!(store.row_count(id, 2), 3);
    }

    #[test]
    fn split_moves_cells_flags_and_handles() {
        let (mut store, mut uris, mut sels) = store();
        let id = store.create_line(&Attr::default(), 10, &mut uris);
        fill(&mut store, id, "abcdef", &mut uris);
        store.line_mut(id).wrapped = true;

        let h_head = store.register_handle(id, 1);
        let h_tail = store.register_handle(id, 4);

        let new = store.split_line(id, 3, &mut uris, &mut sels);
        assert_eq!(text_of(&store, id), "abc");
        assert_eq!(text_of(&store, new), "def");
        // First half continues onto the second; the original
        // continuation flag migrated.
        assert!(store.line(id).wrapped);
        assert!(store.line(new).wrapped);
        assert_eq!(store.line(id).next(), Some(new));
        assert_eq!(store.line(new).prev(), Some(id));
        assert!(store.line(id).seq() < store.line(new).seq());

        assert_eq!(store.handle_pos(h_head), Some((id, 1)));
        assert_eq!(store.handle_pos(h_tail), Some((new, 1)));
    }

    #[test]
    fn split_partitions_selection() {
        let (mut store, mut uris, mut sels) = store();
        let id = store.create_line(&Attr::default(), 10, &mut uris);
        fill(&mut store, id, "abcdef", &mut uris);
        let sel = sels.alloc();
        sels.get_mut(sel).unwrap().push(1, 4); // cells 1..5
        store.line_mut(id).selection_index = Some(sel);

        let new = store.split_line(id, 3, &mut uris, &mut sels);
        let first = store.line(id).selection_index.unwrap();
        let second = store.line(new).selection_index.unwrap();
        assert!(sels.get(first).unwrap().contains(1));
        assert!(!sels.get(first).unwrap().contains(3));
        assert!(sels.get(second).unwrap().contains(0));
        assert!(sels.get(second).unwrap().contains(1));
        assert!(!sels.get(second).unwrap().contains(2));
    }

    #[test]
    fn concat_is_split_inverse() {
        let (mut store, mut uris, mut sels) = store();
        let id = store.create_line(&Attr::default(), 10, &mut uris);
        fill(&mut store, id, "abcdef", &mut uris);
        let new = store.split_line(id, 3, &mut uris, &mut sels);
        let h = store.register_handle(new, 2);

        let merged = store.concat_line(id, new, &mut uris, &mut sels);
        assert_eq!(merged, id);
        assert_eq!(text_of(&store, id), "abcdef");
        assert!(!store.line(id).wrapped);
        assert_eq!(store.line(id).next(), None);
        assert_eq!(store.handle_pos(h), Some((id, 5)));
        assert!(!store.is_live(new));
    }

    #[test]
    fn concat_keeps_attributes() {
        let (mut store, mut uris, mut sels) = store();
        let a = store.create_line(&Attr::default(), 4, &mut uris);
        fill(&mut store, a, "ab", &mut uris);
        let b = store.create_line(&Attr::default(), 4, &mut uris);
        let mut bold = Attr::default();
        bold.set_bold(true);
        let bold_id = store.intern_attr(b, &bold, &mut uris);
        {
            let (line, cells) = store.line_and_cells_mut(b);
            cells[0] = Cell::new('X', bold_id);
            line.set_size(1);
        }
        store.attach_next(a, b);
        store.line_mut(a).wrapped = true;

        store.concat_line(a, b, &mut uris, &mut sels);
        let cells = store.cells(a);
        assert_eq!(cells[2].ch(), 'X');
        assert!(store.attr_of(a, cells[2].attr_id()).bold());
    }

    #[test]
    fn span_stepping_walks_rows_and_lines() {
        let (mut store, mut uris, _sels) = store();
        let a = store.create_line(&Attr::default(), 10, &mut uris);
        fill(&mut store, a, "abcdef", &mut uris);
        let b = store.create_line(&Attr::default(), 10, &mut uris);
        fill(&mut store, b, "gh", &mut uris);
        store.attach_next(a, b);

        // Width 4: line a shows as rows [0..4) and [4..6).
        let r0 = LineSpan {
            line: a,
            offset: 0,
            width: store.span_width(a, 0, 4),
        };
        assert_eq!(r0.width, 4);
        let r1 = store.span_step(&r0, 4).unwrap();
        assert_eq!((r1.line, r1.offset, r1.width), (a, 4, 2));
        let r2 = store.span_step(&r1, 4).unwrap();
        assert_eq!((r2.line, r2.offset, r2.width), (b, 0, 2));
        assert_eq!(store.span_step(&r2, 4), None);

        let back = store.span_step_back(&r2, 4).unwrap();
        assert_eq!((back.line, back.offset), (a, 4));
        let back2 = store.span_step_back(&back, 4).unwrap();
        assert_eq!((back2.line, back2.offset), (a, 0));
        assert_eq!(store.span_step_back(&back2, 4), None);
    }

    #[test]
    fn freeing_a_line_releases_everything() {
        let (mut store, mut uris, mut sels) = store();
        let id = store.create_line(&Attr::default(), 8, &mut uris);
        let uri = uris.intern("https://example.com", None);
        let mut attr = Attr::default();
        attr.uri = Some(uri);
        store.intern_attr(id, &attr, &mut uris);
        uris.decref(uri); // our temporary ref; the table holds one
        assert_eq!(uris.live(), 1);

        let sel = sels.alloc();
        store.line_mut(id).selection_index = Some(sel);

        store.free_line(id, &mut uris, &mut sels);
        assert_eq!(uris.live(), 0);
        assert_eq!(sels.live(), 0);
        assert!(!store.is_live(id));
    }
}
