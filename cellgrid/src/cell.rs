//! Cells and graphic attributes.
//!
//! A cell packs a compact code point, the wide flag and the drawn
//! (damage) flag into one word, plus a 16 bit id into the owning
//! line's attribute table.  Attributes themselves are interned per
//! line so runs of identically styled cells share one record.

use crate::codepoint::{compact, uncompact_char, MAX_COMPACT};
use crate::color::Color;
use crate::uri::{UriId, UriTable};
use std::hash::{Hash, Hasher};

const CH_MASK: u32 = 0x7ffff;
const WIDE: u32 = 1 << 19;
const DRAWN: u32 = 1 << 20;

/// One cell of a line.  `ch() == '\0'` marks both blank padding and
/// the right half of a wide glyph (the latter always directly follows
/// a cell with the wide flag set).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    packed: u32,
    attr_id: u16,
}

impl Cell {
    pub fn new(ch: char, attr_id: u16) -> Self {
        let c = compact(ch as u32).min(MAX_COMPACT);
        Cell {
            packed: c,
            attr_id,
        }
    }

    /// A blank cell carrying the given attribute.
    pub fn blank(attr_id: u16) -> Self {
        Cell {
            packed: 0,
            attr_id,
        }
    }

    /// Build from an already compacted code point, as produced by the
    /// print path's predecode buffer.
    pub fn from_compact(c: u32, attr_id: u16) -> Self {
        Cell {
            packed: c & CH_MASK,
            attr_id,
        }
    }

    /// The compact code point value; 0 for blanks and wide right
    /// halves.
    pub fn raw_ch(self) -> u32 {
        self.packed & CH_MASK
    }

    pub fn set_raw_ch(&mut self, c: u32) {
        self.packed = (self.packed & !(CH_MASK | DRAWN)) | (c & CH_MASK);
    }

    /// The character, with blanks reported as a space.
    pub fn ch(self) -> char {
        match self.raw_ch() {
            0 => ' ',
            c => uncompact_char(c),
        }
    }

    pub fn is_blank(self) -> bool {
        self.raw_ch() == 0 || self.raw_ch() == 0x20
    }

    pub fn wide(self) -> bool {
        self.packed & WIDE != 0
    }

    pub fn set_wide(&mut self, wide: bool) {
        if wide {
            self.packed |= WIDE;
        } else {
            self.packed &= !WIDE;
        }
    }

    /// Damage tracking: true once the renderer has painted the cell.
    pub fn drawn(self) -> bool {
        self.packed & DRAWN != 0
    }

    pub fn set_drawn(&mut self, drawn: bool) {
        if drawn {
            self.packed |= DRAWN;
        } else {
            self.packed &= !DRAWN;
        }
    }

    pub fn attr_id(self) -> u16 {
        self.attr_id
    }

    pub fn set_attr_id(&mut self, id: u16) {
        self.attr_id = id;
        self.packed &= !DRAWN;
    }
}

/// Underline style, two bits worth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Underline {
    None = 0,
    Single = 1,
    Double = 2,
    Curly = 3,
}

impl Default for Underline {
    fn default() -> Self {
        Underline::None
    }
}

/// Define getter and setter for one flag bit of the attribute word.
macro_rules! bitfield {
    ($getter:ident, $setter:ident, $bitnum:expr) => {
        #[inline]
        pub fn $getter(&self) -> bool {
            (self.flags & (1 << $bitnum)) != 0
        }

        #[inline]
        pub fn $setter(&mut self, value: bool) -> &mut Self {
            let bit = if value { 1 << $bitnum } else { 0 };
            self.flags = (self.flags & !(1 << $bitnum)) | bit;
            self
        }
    };
}

/// The graphic rendition of a cell: SGR flags, the three colors and an
/// optional URI reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    flags: u16,
    pub fg: Color,
    pub bg: Color,
    pub ul: Color,
    pub uri: Option<UriId>,
}

impl Default for Attr {
    fn default() -> Self {
        Attr {
            flags: 0,
            fg: Color::fg(),
            bg: Color::bg(),
            ul: Color::fg(),
            uri: None,
        }
    }
}

const UNDERLINE_SHIFT: u16 = 8;

impl Attr {
    bitfield!(bold, set_bold, 0);
    bitfield!(faint, set_faint, 1);
    bitfield!(italic, set_italic, 2);
    bitfield!(blink, set_blink, 3);
    bitfield!(reverse, set_reverse, 4);
    bitfield!(strikethrough, set_strikethrough, 5);
    bitfield!(invisible, set_invisible, 6);
    bitfield!(protected, set_protected, 7);

    #[inline]
    pub fn underline(&self) -> Underline {
        match (self.flags >> UNDERLINE_SHIFT) & 0b11 {
            1 => Underline::Single,
            2 => Underline::Double,
            3 => Underline::Curly,
            _ => Underline::None,
        }
    }

    #[inline]
    pub fn set_underline(&mut self, u: Underline) -> &mut Self {
        self.flags = (self.flags & !(0b11 << UNDERLINE_SHIFT)) | ((u as u16) << UNDERLINE_SHIFT);
        self
    }

    /// The raw flag word; used by the rectangle SGR operations which
    /// manipulate attributes wholesale.
    pub fn flag_bits(&self) -> u16 {
        self.flags
    }

    pub fn set_flag_bits(&mut self, bits: u16) {
        self.flags = bits;
    }
}

impl Hash for Attr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.flags.hash(state);
        self.fg.hash(state);
        self.bg.hash(state);
        self.ul.hash(state);
        self.uri.hash(state);
    }
}

/// Per line attribute interning table.  Cells store 16 bit ids; id 0
/// is always the default attribute.  Lookup is open addressed over a
/// power-of-two index.
#[derive(Debug, Clone)]
pub struct AttrTable {
    attrs: Vec<Attr>,
    index: Vec<u16>,
}

const EMPTY_SLOT: u16 = u16::MAX;

impl Default for AttrTable {
    fn default() -> Self {
        Self::new()
    }
}

impl AttrTable {
    pub fn new() -> Self {
        let mut table = AttrTable {
            attrs: Vec::new(),
            index: Vec::new(),
        };
        table.attrs.push(Attr::default());
        table.rebuild_index();
        table
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn get(&self, id: u16) -> &Attr {
        self.attrs.get(id as usize).unwrap_or(&self.attrs[0])
    }

    fn hash_of(attr: &Attr) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        let mut h = DefaultHasher::new();
        attr.hash(&mut h);
        h.finish()
    }

    /// Find or insert `attr`, returning its id.  A newly inserted
    /// record that references a URI takes one reference on it.
    pub fn intern(&mut self, attr: &Attr, uris: &mut UriTable) -> u16 {
        let mask = self.index.len() - 1;
        let mut slot = Self::hash_of(attr) as usize & mask;
        loop {
            match self.index[slot] {
                EMPTY_SLOT => break,
                id if &self.attrs[id as usize] == attr => return id,
                _ => slot = (slot + 1) & mask,
            }
        }

        if self.attrs.len() >= EMPTY_SLOT as usize {
            // A single line with 65534 distinct renditions is not a
            // realistic workload; degrade to the default rather than
            // growing without bound.
            log::warn!("line attribute table full");
            return 0;
        }

        let id = self.attrs.len() as u16;
        if let Some(uri) = attr.uri {
            uris.incref(uri);
        }
        self.attrs.push(attr.clone());
        self.index[slot] = id;

        if self.attrs.len() * 2 >= self.index.len() {
            self.rebuild_index();
        }
        id
    }

    fn rebuild_index(&mut self) {
        let cap = (self.attrs.len() * 4).next_power_of_two().max(8);
        self.index.clear();
        self.index.resize(cap, EMPTY_SLOT);
        let mask = cap - 1;
        for (id, attr) in self.attrs.iter().enumerate() {
            let mut slot = Self::hash_of(attr) as usize & mask;
            while self.index[slot] != EMPTY_SLOT {
                slot = (slot + 1) & mask;
            }
            self.index[slot] = id as u16;
        }
    }

    /// Drop every record, releasing URI references.  The table is left
    /// holding only the default attribute.
    pub fn release(&mut self, uris: &mut UriTable) {
        for attr in &self.attrs {
            if let Some(uri) = attr.uri {
                uris.decref(uri);
            }
        }
        self.attrs.clear();
        self.attrs.push(Attr::default());
        self.rebuild_index();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use k9::assert_equal as assert_eq;

    #[test]
    fn cell_packing() {
        let mut c = Cell::new('世', 3);
        c.set_wide(true);
        assert_eq!(c.ch(), '世');
        assert!(c.wide());
        assert_eq!(c.attr_id(), 3);
        assert!(!c.drawn());
        c.set_drawn(true);
        assert!(c.drawn());
        // Rewriting the character clears the damage flag.
        c.set_raw_ch(crate::codepoint::compact('x' as u32));
        assert!(!c.drawn());
        assert_eq!(c.ch(), 'x');
    }

    #[test]
    fn blank_reports_space() {
        assert_eq!(Cell::blank(0).ch(), ' ');
        assert!(Cell::blank(0).is_blank());
    }

    #[test]
    fn plane_16_survives() {
        let c = Cell::new('\u{10FFFD}', 0);
        assert_eq!(c.ch(), '\u{10FFFD}');
    }

    #[test]
    fn interning_dedups() {
        let mut uris = UriTable::default();
        let mut table = AttrTable::new();

        let mut bold = Attr::default();
        bold.set_bold(true);

        let a = table.intern(&bold, &mut uris);
        let b = table.intern(&bold, &mut uris);
        assert_eq!(a, b);
        assert_eq!(table.intern(&Attr::default(), &mut uris), 0);
        assert_eq!(table.len(), 2);
        assert!(table.get(a).bold());
    }

    #[test]
    fn interning_refs_uris() {
        let mut uris = UriTable::default();
        let mut table = AttrTable::new();

        let id = uris.intern("https://example.com", None);
        let mut attr = Attr::default();
        attr.uri = Some(id);

        table.intern(&attr, &mut uris);
        // One ref held by the interner caller, one by the table.
        assert_eq!(uris.refcount(id), 2);

        table.release(&mut uris);
        assert_eq!(uris.refcount(id), 1);
        uris.decref(id);
        assert_eq!(uris.lookup("https://example.com", None), None);
    }

    #[test]
    fn underline_field() {
        let mut attr = Attr::default();
        attr.set_underline(Underline::Curly);
        attr.set_bold(true);
        assert_eq!(attr.underline(), Underline::Curly);
        assert!(attr.bold());
        attr.set_underline(Underline::None);
        assert_eq!(attr.underline(), Underline::None);
        assert!(attr.bold());
    }
}
