//! Colors for cell attributes.
//!
//! A color is either an index into the 260 entry palette (256 regular
//! slots plus the four special purpose slots) or a direct RGBA value.

/// Palette size including the special slots.
pub const PALETTE_SIZE: usize = 260;
/// Default background.
pub const SPECIAL_BG: u16 = 256;
/// Default foreground.
pub const SPECIAL_FG: u16 = 257;
/// Cursor cell background.
pub const SPECIAL_CURSOR_BG: u16 = 258;
/// Cursor cell foreground.
pub const SPECIAL_CURSOR_FG: u16 = 259;

/// A direct color with alpha, stored as one word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba(pub u32);

impl Rgba {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Rgba((a as u32) << 24 | (r as u32) << 16 | (g as u32) << 8 | b as u32)
    }

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 0xff)
    }

    pub fn r(self) -> u8 {
        (self.0 >> 16) as u8
    }
    pub fn g(self) -> u8 {
        (self.0 >> 8) as u8
    }
    pub fn b(self) -> u8 {
        self.0 as u8
    }
    pub fn a(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn with_alpha(self, a: u8) -> Self {
        Rgba(self.0 & 0x00ff_ffff | (a as u32) << 24)
    }

    /// Halve the color channels; used for faint text.
    pub fn dimmed(self) -> Self {
        Rgba::new(self.r() / 2, self.g() / 2, self.b() / 2, self.a())
    }

    /// Parse `#RRGGBB`, `#RGB` and `rgb:RR/GG/BB` forms as used by
    /// OSC color setters.
    pub fn parse(s: &str) -> Option<Self> {
        let hex = |s: &str| u8::from_str_radix(s, 16).ok();
        if let Some(rest) = s.strip_prefix('#') {
            return match rest.len() {
                3 => {
                    let d = |i: usize| hex(&rest[i..i + 1]).map(|v| v * 0x11);
                    Some(Self::rgb(d(0)?, d(1)?, d(2)?))
                }
                6 => Some(Self::rgb(
                    hex(&rest[0..2])?,
                    hex(&rest[2..4])?,
                    hex(&rest[4..6])?,
                )),
                _ => None,
            };
        }
        if let Some(rest) = s.strip_prefix("rgb:") {
            let mut parts = rest.split('/');
            let mut chan = || -> Option<u8> {
                let p = parts.next()?;
                match p.len() {
                    1 => hex(p).map(|v| v * 0x11),
                    2 => hex(p),
                    // 12 and 16 bit channels scale down.
                    4 => hex(&p[0..2]),
                    _ => None,
                }
            };
            let (r, g, b) = (chan()?, chan()?, chan()?);
            if parts.next().is_some() {
                return None;
            }
            return Some(Self::rgb(r, g, b));
        }
        None
    }
}

impl std::fmt::Display for Rgba {
    /// The `rgb:` form expected by OSC color queries.
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "rgb:{0:02x}{0:02x}/{1:02x}{1:02x}/{2:02x}{2:02x}",
            self.r(),
            self.g(),
            self.b()
        )
    }
}

/// The color as stored in an attribute: an indirect palette slot or a
/// direct value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Palette(u16),
    Direct(Rgba),
}

impl Color {
    pub fn fg() -> Self {
        Color::Palette(SPECIAL_FG)
    }

    pub fn bg() -> Self {
        Color::Palette(SPECIAL_BG)
    }

    /// The palette index, when indirect.
    pub fn index(self) -> Option<u16> {
        match self {
            Color::Palette(i) => Some(i),
            Color::Direct(_) => None,
        }
    }

    /// Resolve against a palette.
    pub fn resolve(self, palette: &[Rgba; PALETTE_SIZE]) -> Rgba {
        match self {
            Color::Palette(i) => palette[(i as usize).min(PALETTE_SIZE - 1)],
            Color::Direct(c) => c,
        }
    }
}

/// The xterm 256 color cube value for an index, used to build default
/// palettes.
pub fn base256(idx: u8) -> Rgba {
    const ANSI: [u32; 16] = [
        0x000000, 0xcd0000, 0x00cd00, 0xcdcd00, 0x0000ee, 0xcd00cd, 0x00cdcd, 0xe5e5e5, 0x7f7f7f,
        0xff0000, 0x00ff00, 0xffff00, 0x5c5cff, 0xff00ff, 0x00ffff, 0xffffff,
    ];
    match idx {
        0..=15 => Rgba(0xff00_0000 | ANSI[idx as usize]),
        16..=231 => {
            let v = idx - 16;
            let chan = |c: u8| if c == 0 { 0 } else { 0x37 + 0x28 * c };
            Rgba::rgb(chan(v / 36), chan(v / 6 % 6), chan(v % 6))
        }
        _ => {
            let v = 8 + 10 * (idx - 232);
            Rgba::rgb(v, v, v)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use k9::assert_equal as assert_eq;

    #[test]
    fn parse_hex_forms() {
        assert_eq!(Rgba::parse("#ff0080"), Some(Rgba::rgb(0xff, 0x00, 0x80)));
        assert_eq!(Rgba::parse("#f08"), Some(Rgba::rgb(0xff, 0x00, 0x88)));
        assert_eq!(
            Rgba::parse("rgb:12/34/56"),
            Some(Rgba::rgb(0x12, 0x34, 0x56))
        );
        assert_eq!(
            Rgba::parse("rgb:1234/5678/9abc"),
            Some(Rgba::rgb(0x12, 0x56, 0x9a))
        );
        assert_eq!(Rgba::parse("bogus"), None);
    }

    #[test]
    fn cube_corners() {
        assert_eq!(base256(16), Rgba::rgb(0, 0, 0));
        assert_eq!(base256(231), Rgba::rgb(0xff, 0xff, 0xff));
        assert_eq!(base256(232), Rgba::rgb(8, 8, 8));
    }

    #[test]
    fn dim_halves_channels() {
        assert_eq!(Rgba::rgb(200, 100, 50).dimmed(), Rgba::rgb(100, 50, 25));
    }
}
