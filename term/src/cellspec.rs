//! Renderer-facing cell descriptions.
//!
//! The renderer never sees attributes or palettes; per frame it pulls
//! fully resolved [`CellSpec`]s with the reverse/selection/blink rules
//! already applied.

use cellgrid::{Attr, Cell, Rgba, Underline, UriId, PALETTE_SIZE, SPECIAL_BG, SPECIAL_FG};

/// Which font face to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Regular,
    Bold,
    Italic,
    BoldItalic,
}

/// One resolved cell, ready to paint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellSpec {
    pub ch: char,
    pub fg: Rgba,
    pub bg: Rgba,
    pub ul: Rgba,
    pub face: Face,
    pub underline: Underline,
    pub stroke: bool,
    pub wide: bool,
}

/// The palette with the optional special-purpose overrides xterm
/// calls colorBD/colorUL/colorBL/colorRV/colorIT, plus selection
/// colors and background blending.
#[derive(Debug, Clone)]
pub struct Palette {
    pub colors: [Rgba; PALETTE_SIZE],
    pub special_bold: Option<Rgba>,
    pub special_underline: Option<Rgba>,
    pub special_blink: Option<Rgba>,
    pub special_reverse: Option<Rgba>,
    pub special_italic: Option<Rgba>,
    pub selection_fg: Option<Rgba>,
    pub selection_bg: Option<Rgba>,
    pub uri_color: Rgba,
    /// Alpha applied to the default background.
    pub bg_alpha: u8,
    /// Blend every background, not just the default one.
    pub blend_all_bg: bool,
}

impl Default for Palette {
    fn default() -> Self {
        let mut colors = [Rgba::rgb(0, 0, 0); PALETTE_SIZE];
        for (i, slot) in colors.iter_mut().enumerate().take(256) {
            *slot = cellgrid::color::base256(i as u8);
        }
        colors[SPECIAL_BG as usize] = Rgba::rgb(0, 0, 0);
        colors[SPECIAL_FG as usize] = Rgba::rgb(0xff, 0xff, 0xff);
        colors[cellgrid::SPECIAL_CURSOR_BG as usize] = Rgba::rgb(0xff, 0xff, 0xff);
        colors[cellgrid::SPECIAL_CURSOR_FG as usize] = Rgba::rgb(0, 0, 0);
        Palette {
            colors,
            special_bold: None,
            special_underline: None,
            special_blink: None,
            special_reverse: None,
            special_italic: None,
            selection_fg: None,
            selection_bg: Some(Rgba::rgb(0xb0, 0xb0, 0xb0)),
            uri_color: Rgba::rgb(0x58, 0x8b, 0xe5),
            bg_alpha: 0xff,
            blend_all_bg: false,
        }
    }
}

/// Frame-level inputs to the per-cell derivation.
#[derive(Debug, Clone, Copy)]
pub struct SpecContext<'a> {
    pub palette: &'a Palette,
    /// Global blink phase: true while blinking cells are blanked.
    pub blink_phase_off: bool,
    pub selected: bool,
    /// The URI under the pointer, highlighted and underlined.
    pub active_uri: Option<UriId>,
    /// The active URI is being clicked; renders like reverse video.
    pub uri_pressed: bool,
}

/// Resolve one cell.  The rules follow xterm's stacking order: special
/// purpose colors, bright-for-bold, faint dimming, reverse/selection
/// swap, blink blanking, URI highlight, full-block optimization.
pub fn derive(cell: Cell, attr: &Attr, ctx: &SpecContext) -> CellSpec {
    let pal = ctx.palette;

    let mut fg = attr.fg.resolve(&pal.colors);
    let mut bg = attr.bg.resolve(&pal.colors);
    let mut underline = attr.underline();

    // Special purpose overrides only replace the default foreground.
    let fg_is_default = attr.fg.index() == Some(SPECIAL_FG);
    if fg_is_default {
        if attr.bold() {
            if let Some(c) = pal.special_bold {
                fg = c;
            }
        }
        if underline != Underline::None {
            if let Some(c) = pal.special_underline {
                fg = c;
            }
        }
        if attr.blink() {
            if let Some(c) = pal.special_blink {
                fg = c;
            }
        }
        if attr.italic() {
            if let Some(c) = pal.special_italic {
                fg = c;
            }
        }
        if attr.reverse() {
            if let Some(c) = pal.special_reverse {
                fg = c;
            }
        }
    }

    // Bold brightens the base colors.
    if attr.bold() {
        if let Some(idx) = attr.fg.index() {
            if idx < 8 {
                fg = pal.colors[(idx + 8) as usize];
            }
        }
    }
    if attr.faint() && !attr.bold() {
        fg = fg.dimmed();
    }

    let is_active_uri = ctx.active_uri.is_some() && attr.uri == ctx.active_uri;

    let swap = attr.reverse() ^ ctx.selected ^ (is_active_uri && ctx.uri_pressed);
    if swap {
        std::mem::swap(&mut fg, &mut bg);
    }

    if attr.bg.index() == Some(SPECIAL_BG) || pal.blend_all_bg {
        bg = bg.with_alpha(pal.bg_alpha);
    }

    if attr.blink() && ctx.blink_phase_off {
        fg = bg;
    }

    if ctx.selected {
        if let Some(c) = pal.selection_fg {
            fg = c;
        }
        if let Some(c) = pal.selection_bg {
            bg = c;
        }
    }

    if is_active_uri {
        fg = pal.uri_color;
        if underline == Underline::None {
            underline = Underline::Single;
        }
    }

    let mut ul = attr.ul.resolve(&pal.colors);
    if attr.ul.index() == Some(SPECIAL_FG) {
        ul = fg;
    }

    let ch = if attr.invisible() { ' ' } else { cell.ch() };

    // Full block cells paint as background-only rectangles.
    let bg = if ch == '\u{2588}' { fg } else { bg };

    let face = match (attr.bold(), attr.italic()) {
        (false, false) => Face::Regular,
        (true, false) => Face::Bold,
        (false, true) => Face::Italic,
        (true, true) => Face::BoldItalic,
    };

    CellSpec {
        ch,
        fg,
        bg,
        ul,
        face,
        underline,
        stroke: attr.strikethrough(),
        wide: cell.wide(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use k9::assert_equal as assert_eq;

    fn ctx(pal: &Palette) -> SpecContext {
        SpecContext {
            palette: pal,
            blink_phase_off: false,
            selected: false,
            active_uri: None,
            uri_pressed: false,
        }
    }

    #[test]
    fn bold_maps_to_bright() {
        let pal = Palette::default();
        let mut attr = Attr::default();
        attr.fg = cellgrid::Color::Palette(1);
        attr.set_bold(true);
        let spec = derive(Cell::new('x', 0), &attr, &ctx(&pal));
        assert_eq!(spec.fg, pal.colors[9]);
        assert_eq!(spec.face, Face::Bold);
    }

    #[test]
    fn reverse_swaps() {
        let pal = Palette::default();
        let mut attr = Attr::default();
        attr.set_reverse(true);
        let spec = derive(Cell::new('x', 0), &attr, &ctx(&pal));
        assert_eq!(spec.fg, pal.colors[SPECIAL_BG as usize]);
        assert_eq!(spec.bg, pal.colors[SPECIAL_FG as usize]);
    }

    #[test]
    fn selection_overrides() {
        let pal = Palette::default();
        let mut c = ctx(&pal);
        c.selected = true;
        let spec = derive(Cell::new('x', 0), &Attr::default(), &c);
        assert_eq!(Some(spec.bg), pal.selection_bg);
    }

    #[test]
    fn blink_phase_blanks() {
        let pal = Palette::default();
        let mut attr = Attr::default();
        attr.set_blink(true);
        let mut c = ctx(&pal);
        c.blink_phase_off = true;
        let spec = derive(Cell::new('x', 0), &attr, &c);
        assert_eq!(spec.fg, spec.bg);
    }

    #[test]
    fn faint_dims() {
        let pal = Palette::default();
        let mut attr = Attr::default();
        attr.set_faint(true);
        let spec = derive(Cell::new('x', 0), &attr, &ctx(&pal));
        assert_eq!(spec.fg, pal.colors[SPECIAL_FG as usize].dimmed());
    }

    #[test]
    fn full_block_paints_background() {
        let pal = Palette::default();
        let spec = derive(Cell::new('\u{2588}', 0), &Attr::default(), &ctx(&pal));
        assert_eq!(spec.bg, spec.fg);
    }
}
