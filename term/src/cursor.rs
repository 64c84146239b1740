//! Cursor position, pending wrap and character set state.

use crate::nrcs::Charset;

/// The cursor, including everything DECSC must save: position, origin
/// mode, pending wrap and the G0..G3 designations with the current
/// GL/GR mappings and single shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub x: usize,
    pub y: usize,

    /// Index of the set mapped into GL, and the one-shot single shift
    /// override (SS2/SS3 load `gl_ss` only).
    pub gl: usize,
    pub gl_ss: usize,
    pub gr: usize,
    pub gn: [Charset; 4],

    pub origin: bool,

    /// Set when the cursor sits visually on the right margin and the
    /// previous write filled that cell; the next printable character
    /// wraps first.
    pub pending: bool,
}

impl Default for Cursor {
    fn default() -> Self {
        Cursor {
            x: 0,
            y: 0,
            gl: 0,
            gl_ss: 0,
            gr: 2,
            gn: [
                Charset::Ascii,
                Charset::Ascii,
                Charset::Ascii,
                Charset::Ascii,
            ],
            origin: false,
            pending: false,
        }
    }
}

impl Cursor {
    /// The set currently active for GL output, honoring single shift.
    pub fn gl_charset(&self) -> Charset {
        self.gn[self.gl_ss]
    }

    pub fn gr_charset(&self) -> Charset {
        self.gn[self.gr]
    }

    pub fn set_gl(&mut self, gl: usize, once: bool) {
        if !once {
            self.gl = gl;
        }
        self.gl_ss = gl;
    }

    pub fn set_gr(&mut self, gr: usize) {
        self.gr = gr;
    }
}
