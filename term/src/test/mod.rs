//! End to end tests: feed byte sequences, inspect the resulting grid
//! and the bytes written back toward the PTY.

use crate::config::DefaultConfiguration;
use crate::Terminal;
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;
use std::sync::Arc;

mod c0;
mod csi;
mod osc;
mod rect;
mod reflow;
mod reports;
mod scroll;
mod selection;
mod input;

struct CaptureWriter(Rc<RefCell<Vec<u8>>>);

impl Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub(crate) struct TestTerm {
    pub term: Terminal,
    out: Rc<RefCell<Vec<u8>>>,
}

impl TestTerm {
    pub fn new(width: usize, height: usize) -> Self {
        let out = Rc::new(RefCell::new(Vec::new()));
        let writer = Box::new(CaptureWriter(Rc::clone(&out)));
        let term = Terminal::new(width, height, Arc::new(DefaultConfiguration), writer);
        TestTerm { term, out }
    }

    /// Feed bytes, asserting everything is consumed (tests always
    /// send complete sequences).
    pub fn feed(&mut self, bytes: &[u8]) {
        let mut consumed = 0;
        while consumed < bytes.len() {
            let n = self.term.advance_bytes(&bytes[consumed..]);
            assert!(n > 0, "parser made no progress at byte {}", consumed);
            consumed += n;
        }
    }

    /// Feed, allowing a partial tail to remain unconsumed.
    pub fn feed_partial(&mut self, bytes: &[u8]) -> usize {
        self.term.advance_bytes(bytes)
    }

    /// Text of live viewport row `y`, trailing blanks trimmed.
    pub fn row_text(&self, y: usize) -> String {
        let scr = &self.term.screen;
        let mut text: String = (0..scr.width()).map(|x| scr.cell_at(x, y).ch()).collect();
        while text.ends_with(' ') {
            text.pop();
        }
        text
    }

    /// Text of displayed row `y` (honors scrolled back views).
    pub fn view_text(&self, y: usize) -> String {
        let scr = &self.term.screen;
        let rows = scr.view_rows();
        let span = rows[y];
        let store = &scr.cur().store;
        let cells = store.cells(span.line);
        let mut text: String = cells
            .iter()
            .skip(span.offset)
            .take(span.width)
            .map(|c| c.ch())
            .collect();
        while text.ends_with(' ') {
            text.pop();
        }
        text
    }

    /// Whether the row continues onto the next visual row (soft wrap).
    pub fn row_continues(&self, y: usize) -> bool {
        let scr = &self.term.screen;
        let span = scr.span(y);
        let store = &scr.cur().store;
        let line = store.line(span.line);
        span.offset + span.width < line.size() || line.wrapped
    }

    pub fn cursor(&self) -> (usize, usize) {
        (self.term.screen.c.x, self.term.screen.c.y)
    }

    /// Drain everything the engine wrote back to the PTY.
    pub fn replies(&mut self) -> Vec<u8> {
        std::mem::take(&mut *self.out.borrow_mut())
    }

    pub fn replies_string(&mut self) -> String {
        String::from_utf8_lossy(&self.replies()).into_owned()
    }
}
