//! OSC 52 clipboard access and the paste pipeline.
//!
//! Selection data flows out through [`crate::window::WindowOps::set_clip`];
//! pastes flow back in through the chunked feeder here, which applies
//! bracketed paste markers, CR rewriting and control quoting before
//! the bytes reach the PTY.

use base64::Engine;

/// The clipboard selections OSC 52 can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardTarget {
    Clipboard,
    Primary,
    Secondary,
    Select,
    /// Cut buffers 0-7.
    Cut(u8),
}

impl ClipboardTarget {
    /// Decode an OSC 52 selection character.
    pub fn from_selector(b: u8) -> Option<Self> {
        match b {
            b'c' => Some(ClipboardTarget::Clipboard),
            b'p' => Some(ClipboardTarget::Primary),
            b'q' => Some(ClipboardTarget::Secondary),
            b's' => Some(ClipboardTarget::Select),
            b'0'..=b'7' => Some(ClipboardTarget::Cut(b - b'0')),
            _ => None,
        }
    }

    pub fn selector(self) -> char {
        match self {
            ClipboardTarget::Clipboard => 'c',
            ClipboardTarget::Primary => 'p',
            ClipboardTarget::Secondary => 'q',
            ClipboardTarget::Select => 's',
            ClipboardTarget::Cut(n) => (b'0' + n.min(7)) as char,
        }
    }
}

pub fn base64_encode(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

pub fn base64_decode(data: &[u8]) -> Option<Vec<u8>> {
    base64::engine::general_purpose::STANDARD.decode(data).ok()
}

/// How paste data is to be transformed on its way to the PTY.
#[derive(Debug, Clone, Copy, Default)]
pub struct PasteFlags {
    pub bracketed: bool,
    /// Mode 2005: C0 controls are stripped rather than forwarded.
    pub quote: bool,
    /// Mode 2006: newlines pass through literally instead of
    /// becoming CR.
    pub literal_nl: bool,
}

/// Chunked paste feeder.  The window layer hands over data in pieces;
/// the feeder brackets the whole delivery and rewrites each chunk.
/// Cancelling drops the in-flight paste without emitting the closing
/// bracket.
#[derive(Debug, Default)]
pub struct Paster {
    active: bool,
    flags: PasteFlags,
}

impl Paster {
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Start a paste; returns the bytes to send ahead of the data.
    pub fn begin(&mut self, flags: PasteFlags) -> Vec<u8> {
        self.active = true;
        self.flags = flags;
        if flags.bracketed {
            b"\x1b[200~".to_vec()
        } else {
            Vec::new()
        }
    }

    /// Transform one chunk of paste data.
    pub fn chunk(&mut self, data: &[u8]) -> Vec<u8> {
        if !self.active {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(data.len());
        for &b in data {
            match b {
                b'\n' if !self.flags.literal_nl => out.push(b'\r'),
                b'\r' | b'\t' | b'\n' => out.push(b),
                0x00..=0x1f | 0x7f => {
                    if !self.flags.quote {
                        out.push(b);
                    }
                    // Quoted mode drops raw controls entirely.
                }
                _ => out.push(b),
            }
        }
        out
    }

    /// Finish the paste; returns the closing bracket bytes.
    pub fn end(&mut self) -> Vec<u8> {
        if !self.active {
            return Vec::new();
        }
        self.active = false;
        if self.flags.bracketed {
            b"\x1b[201~".to_vec()
        } else {
            Vec::new()
        }
    }

    /// Abort an in-flight paste: nothing further is emitted, not even
    /// the closing bracket.
    pub fn cancel(&mut self) {
        self.active = false;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use k9::assert_equal as assert_eq;

    #[test]
    fn selectors_round_trip() {
        for b in b"cpqs01234567" {
            let target = ClipboardTarget::from_selector(*b).unwrap();
            assert_eq!(target.selector(), *b as char);
        }
        assert_eq!(ClipboardTarget::from_selector(b'z'), None);
    }

    #[test]
    fn bracketed_paste_rewrites_newlines() {
        let mut paster = Paster::default();
        let mut out = paster.begin(PasteFlags {
            bracketed: true,
            ..PasteFlags::default()
        });
        out.extend(paster.chunk(b"a\nb"));
        out.extend(paster.end());
        assert_eq!(out, b"\x1b[200~a\rb\x1b[201~".to_vec());
    }

    #[test]
    fn literal_newlines_pass_through() {
        let mut paster = Paster::default();
        paster.begin(PasteFlags {
            literal_nl: true,
            ..PasteFlags::default()
        });
        assert_eq!(paster.chunk(b"a\nb"), b"a\nb".to_vec());
    }

    #[test]
    fn quote_mode_strips_controls() {
        let mut paster = Paster::default();
        paster.begin(PasteFlags {
            quote: true,
            ..PasteFlags::default()
        });
        assert_eq!(paster.chunk(b"a\x1b[31mb\x07"), b"a[31mb".to_vec());
    }

    #[test]
    fn cancel_swallows_the_suffix() {
        let mut paster = Paster::default();
        paster.begin(PasteFlags {
            bracketed: true,
            ..PasteFlags::default()
        });
        paster.cancel();
        assert_eq!(paster.end(), Vec::<u8>::new());
        assert_eq!(paster.chunk(b"late"), Vec::<u8>::new());
    }

    #[test]
    fn osc52_payload_round_trip() {
        assert_eq!(base64_encode(b"Hi"), "SGk=".to_string());
        assert_eq!(base64_decode(b"SGk="), Some(b"Hi".to_vec()));
    }
}
