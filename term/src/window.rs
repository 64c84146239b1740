//! The surface the engine paints through.
//!
//! The renderer/window implementation lives outside this crate; the
//! engine only calls methods on this trait and receives input events
//! back through [`crate::TerminalState`].

use crate::clipboard::ClipboardTarget;
use cellgrid::Rgba;

/// Cell and pixel geometry reported by the window.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Extent {
    pub width: usize,
    pub height: usize,
}

/// Which title slot an OSC addressed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TitleTarget {
    IconLabel,
    Title,
    Both,
}

pub trait WindowOps {
    /// Present the current frame.  The window pulls spans and cell
    /// specs back out of the screen it was handed at creation time.
    /// Returns whether anything was repainted.
    fn submit_screen(
        &mut self,
        cur_x: usize,
        cur_y: usize,
        cursor_visible: bool,
        on_margin: bool,
    ) -> bool;

    /// Damage-preserving scroll blit of `height` rows from `ys` to
    /// `yd`.
    fn shift(&mut self, ys: usize, yd: usize, height: usize);

    fn set_title(&mut self, target: TitleTarget, text: Option<&str>);

    fn set_colors(&mut self, bg: Rgba, cursor_fg: Rgba);

    fn set_urgency(&mut self, urgent: bool);

    fn bell(&mut self, volume: u8);

    /// Hand clipboard data over; ownership of the bytes transfers to
    /// the window layer.
    fn set_clip(&mut self, target: ClipboardTarget, data: Option<Vec<u8>>);

    /// Ask the window layer to deliver clipboard contents back via
    /// `TerminalState::paste_begin`/`paste_chunk`/`paste_end`.
    fn paste_clip(&mut self, target: ClipboardTarget);

    /// Request an outer resize, in pixels.  Returns true when a resize
    /// was actually initiated.
    fn resize(&mut self, width: usize, height: usize) -> bool;

    /// Begin/end of a synchronized update: the window must not present
    /// frames while sync is held.
    fn set_sync(&mut self, enabled: bool);

    /// Smooth scroll bookkeeping: flush accumulated scroll damage.
    fn request_scroll_flush(&mut self);

    fn get_cell_size(&self) -> Extent;

    fn get_grid_size(&self) -> Extent;

    fn get_border(&self) -> Extent;

    fn get_position(&self) -> (i32, i32);

    fn get_screen_size(&self) -> Extent;

    /// Whether the window currently has keyboard focus.
    fn has_focus(&self) -> bool {
        true
    }
}
