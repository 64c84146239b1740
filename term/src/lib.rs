//! The terminal emulation core: an xterm-compatible interpreter for
//! the byte stream coming out of a pseudo terminal, the screen and
//! scrollback model behind it, and the translation of key and mouse
//! events into the byte sequences applications expect.
//!
//! The crate deliberately stops at two seams: the PTY child process is
//! a pair of byte streams plus a winsize ioctl (see [`tty`]), and
//! painting is somebody else's job. The renderer pulls per-cell
//! [`cellspec::CellSpec`]s and is driven through the [`window::WindowOps`]
//! trait.
#![allow(clippy::upper_case_acronyms)]

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

#[macro_use]
extern crate bitflags;

pub mod cellspec;
pub mod clipboard;
pub mod config;
pub mod cursor;
pub mod input;
pub mod modes;
pub mod nrcs;
pub mod poller;
pub mod screen;
pub mod selection;
pub mod terminalstate;
pub mod tty;
pub mod urimatch;
pub mod window;

#[cfg(test)]
mod test;

pub use config::TerminalConfiguration;
pub use input::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
pub use screen::Screen;
pub use terminalstate::TerminalState;

/// The 8-bit control string constants used when composing reports; the
/// answerback encoder rewrites them to 7-bit `ESC` pairs unless the
/// application selected S8C1T.
pub const CSI: &str = "\u{9b}";
pub const OSC: &str = "\u{9d}";
pub const DCS: &str = "\u{90}";
pub const ST: &str = "\u{9c}";
pub const SS3: &str = "\u{8f}";

/// The terminal: scanner plus state.  Bytes go in through
/// [`Terminal::advance_bytes`]; replies come out through the writer the
/// state was constructed with.
pub struct Terminal {
    state: TerminalState,
    scanner: vtscan::Scanner,
}

impl Deref for Terminal {
    type Target = TerminalState;

    fn deref(&self) -> &TerminalState {
        &self.state
    }
}

impl DerefMut for Terminal {
    fn deref_mut(&mut self) -> &mut TerminalState {
        &mut self.state
    }
}

impl Terminal {
    pub fn new(
        width: usize,
        height: usize,
        config: Arc<dyn TerminalConfiguration>,
        writer: Box<dyn std::io::Write>,
    ) -> Terminal {
        let state = TerminalState::new(width, height, config, writer);
        let mut scanner = vtscan::Scanner::new();
        scanner.set_vt_level(state.vt_level());
        scanner.set_utf8(state.utf8());
        Terminal {
            state,
            scanner,
        }
    }

    /// Feed output from the child process.  Returns the number of
    /// bytes consumed; the caller keeps the unconsumed tail (a partial
    /// UTF-8 sequence or string payload) at the head of its buffer.
    pub fn advance_bytes(&mut self, bytes: &[u8]) -> usize {
        let consumed = {
            let mut performer = terminalstate::performer::Performer::new(&mut self.state);
            self.scanner.advance(bytes, &mut performer)
        };
        self.state.sync_scanner(&mut self.scanner);
        consumed
    }

    pub fn scanner(&mut self) -> &mut vtscan::Scanner {
        &mut self.scanner
    }
}
