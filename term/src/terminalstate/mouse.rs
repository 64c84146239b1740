//! Pointer handling: the mouse reporting mode/format matrix, the DEC
//! locator, and routing to the local selection engine when the
//! application is not tracking the mouse (or the force-mouse modifier
//! is held).

use crate::clipboard::ClipboardTarget;
use crate::input::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use crate::selection::SelectionMode;
use crate::terminalstate::TerminalState;
use crate::CSI;
use std::time::{Duration, Instant};

/// Which pointer events the application asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseMode {
    None,
    X10,
    Button,
    Drag,
    Motion,
}

impl Default for MouseMode {
    fn default() -> Self {
        MouseMode::None
    }
}

/// How qualifying events are encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseFormat {
    Default,
    Utf8,
    Sgr,
    Urxvt,
    SgrPixel,
}

impl Default for MouseFormat {
    fn default() -> Self {
        MouseFormat::Default
    }
}

/// The multi-click interval for word/line selection.
const CLICK_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub struct MouseState {
    pub mode: MouseMode,
    pub format: MouseFormat,
    pub blinking_cursor: bool,

    pressed: Option<MouseButton>,
    last_reported: Option<(usize, usize)>,

    /// DEC locator state.
    locator_enabled: bool,
    locator_oneshot: bool,
    locator_pixels: bool,
    locator_report_press: bool,
    locator_report_release: bool,
    /// Filter rectangle (top, left, bottom, right), one based, in
    /// locator units.
    locator_filter: Option<(usize, usize, usize, usize)>,
    last_position: Option<(usize, usize)>,

    /// Click streak for double/triple click selection.
    last_click: Option<(MouseButton, usize, usize, Instant)>,
    click_streak: usize,
}

impl Default for MouseState {
    fn default() -> Self {
        MouseState {
            mode: MouseMode::None,
            format: MouseFormat::Default,
            blinking_cursor: false,
            pressed: None,
            last_reported: None,
            locator_enabled: false,
            locator_oneshot: false,
            locator_pixels: false,
            locator_report_press: false,
            locator_report_release: false,
            locator_filter: None,
            last_position: None,
            last_click: None,
            click_streak: 0,
        }
    }
}

fn button_code(button: MouseButton, pressed_fallback: Option<MouseButton>) -> i32 {
    let button = match button {
        MouseButton::None => pressed_fallback.unwrap_or(MouseButton::None),
        b => b,
    };
    match button {
        MouseButton::Left => 0,
        MouseButton::Middle => 1,
        MouseButton::Right => 2,
        MouseButton::WheelUp => 64,
        MouseButton::WheelDown => 65,
        MouseButton::None => 3,
    }
}

impl TerminalState {
    /// Entry point for pointer events from the window layer.
    pub fn mouse_event(&mut self, mut event: MouseEvent) {
        event.x = event.x.min(self.screen.width().saturating_sub(1));
        event.y = event.y.min(self.screen.height().saturating_sub(1));

        let force = !self.config().force_mouse_modifier().is_empty()
            && event
                .modifiers
                .contains(self.config().force_mouse_modifier());

        let app_wants = self.mstate.mode != MouseMode::None || self.mstate.locator_enabled;
        if force || !app_wants {
            self.local_mouse(event);
            return;
        }

        if self.mstate.locator_enabled {
            self.locator_event(&event);
            return;
        }
        self.report_mouse(event);
    }

    /* Local selection handling */

    fn local_mouse(&mut self, event: MouseEvent) {
        match (event.kind, event.button) {
            (MouseEventKind::Press, MouseButton::WheelUp) => self.screen.scroll_view(5),
            (MouseEventKind::Press, MouseButton::WheelDown) => {
                if self.screen.altscreen() && self.mode.altscreen_scroll {
                    for _ in 0..3 {
                        self.key_down(KeyEvent::new(KeyCode::Down, KeyModifiers::empty()));
                    }
                } else {
                    self.screen.scroll_view(-5);
                }
            }
            (MouseEventKind::Press, MouseButton::Left) => {
                let streak = self.click_streak(&event);
                let mode = match streak {
                    1 => SelectionMode::Char,
                    2 => SelectionMode::Word,
                    _ => SelectionMode::Line,
                };
                let mode = if event.modifiers.contains(KeyModifiers::ALT)
                    && mode == SelectionMode::Char
                {
                    SelectionMode::Rect
                } else {
                    mode
                };
                self.screen.selection_start(event.x, event.y, mode);
            }
            (MouseEventKind::Move, _) => {
                if self.screen.sstate.dragging {
                    self.screen.selection_extend(event.x, event.y);
                }
            }
            (MouseEventKind::Release, MouseButton::Left) => {
                if self.screen.sstate.dragging {
                    let text = self.screen.selection_release();
                    if !text.is_empty() {
                        let target = if self.mode.select_to_clipboard {
                            ClipboardTarget::Clipboard
                        } else {
                            ClipboardTarget::Primary
                        };
                        self.clipboard_set(target, Some(text));
                    }
                }
            }
            (MouseEventKind::Press, MouseButton::Middle) => {
                if let Some(win) = self.window() {
                    win.paste_clip(ClipboardTarget::Primary);
                }
            }
            _ => {}
        }
    }

    fn click_streak(&mut self, event: &MouseEvent) -> usize {
        let now = Instant::now();
        let streak = match self.mstate.last_click {
            Some((button, x, y, at))
                if button == event.button
                    && x == event.x
                    && y == event.y
                    && now.duration_since(at) <= CLICK_INTERVAL =>
            {
                self.mstate.click_streak % 3 + 1
            }
            _ => 1,
        };
        self.mstate.last_click = Some((event.button, event.x, event.y, now));
        self.mstate.click_streak = streak;
        streak
    }

    /* Application mouse reporting */

    fn report_mouse(&mut self, event: MouseEvent) {
        let mode = self.mstate.mode;

        let qualifies = match event.kind {
            MouseEventKind::Press => true,
            MouseEventKind::Release => mode != MouseMode::X10,
            MouseEventKind::Move => match mode {
                MouseMode::Motion => true,
                MouseMode::Drag => self.mstate.pressed.is_some(),
                _ => false,
            },
        };

        match event.kind {
            MouseEventKind::Press => self.mstate.pressed = Some(event.button),
            MouseEventKind::Release => self.mstate.pressed = None,
            MouseEventKind::Move => {}
        }

        if !qualifies {
            return;
        }

        // Suppress repeated motion reports for the same position, in
        // cell or pixel units depending on the format.
        if event.kind == MouseEventKind::Move {
            let pos = if self.mstate.format == MouseFormat::SgrPixel {
                (event.pixel_x, event.pixel_y)
            } else {
                (event.x, event.y)
            };
            if self.mstate.last_reported == Some(pos) {
                return;
            }
            self.mstate.last_reported = Some(pos);
        } else {
            self.mstate.last_reported = None;
        }

        let mut code = button_code(event.button, self.mstate.pressed);
        if event.kind == MouseEventKind::Move {
            code += 32;
        }
        // X10 mode reports no modifiers.
        if mode != MouseMode::X10 {
            if event.modifiers.contains(KeyModifiers::SHIFT) {
                code += 4;
            }
            if event.modifiers.contains(KeyModifiers::ALT) {
                code += 8;
            }
            if event.modifiers.contains(KeyModifiers::CTRL) {
                code += 16;
            }
        }

        let release = event.kind == MouseEventKind::Release;
        let (x, y) = (event.x + 1, event.y + 1);

        match self.mstate.format {
            MouseFormat::Sgr | MouseFormat::SgrPixel => {
                let (x, y) = if self.mstate.format == MouseFormat::SgrPixel {
                    (event.pixel_x + 1, event.pixel_y + 1)
                } else {
                    (x, y)
                };
                let reply = format!(
                    "{}<{};{};{}{}",
                    CSI,
                    code,
                    x,
                    y,
                    if release { 'm' } else { 'M' }
                );
                self.answerback(&reply);
            }
            MouseFormat::Urxvt => {
                let code = if release { 3 + 32 } else { code };
                let reply = format!("{}{};{};{}M", CSI, code + 32, x, y);
                self.answerback(&reply);
            }
            MouseFormat::Utf8 => {
                // Coordinates above 95 become multi-byte; they bypass
                // the C1 report encoder.
                let code = if release { 3 } else { code };
                let mut bytes = b"\x1b[M".to_vec();
                let mut buf = [0u8; 4];
                for v in [code as u32 + 32, x as u32 + 32, y as u32 + 32] {
                    let ch = char::from_u32(v.min(2047)).unwrap_or(' ');
                    bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                }
                self.reply_raw(&bytes);
            }
            MouseFormat::Default => {
                // Raw single bytes, capped at 255; not valid UTF-8, so
                // they too bypass the encoder.
                let code = if release { 3 } else { code };
                let clamp = |v: usize| (v + 32).min(255) as u8;
                let bytes = [
                    0x1b,
                    b'[',
                    b'M',
                    (code + 32).clamp(0, 255) as u8,
                    clamp(x),
                    clamp(y),
                ];
                self.reply_raw(&bytes);
            }
        }
    }

    /* DEC locator */

    pub(crate) fn decelr(&mut self, params: &vtscan::Params) {
        if self.vt_level() < 4 {
            return;
        }
        match params.get(0, 0) {
            0 => {
                self.mstate.locator_enabled = false;
                self.mstate.locator_oneshot = false;
                self.mstate.locator_filter = None;
            }
            1 => {
                self.mstate.locator_enabled = true;
                self.mstate.locator_oneshot = false;
            }
            2 => {
                self.mstate.locator_enabled = true;
                self.mstate.locator_oneshot = true;
            }
            _ => {}
        }
        self.mstate.locator_pixels = params.get(1, 0) == 1;
    }

    pub(crate) fn decsle(&mut self, params: &vtscan::Params) {
        if self.vt_level() < 4 {
            return;
        }
        for i in 0..params.len() {
            match params.get(i, 0) {
                0 => {
                    self.mstate.locator_report_press = false;
                    self.mstate.locator_report_release = false;
                }
                1 => self.mstate.locator_report_press = true,
                2 => self.mstate.locator_report_press = false,
                3 => self.mstate.locator_report_release = true,
                4 => self.mstate.locator_report_release = false,
                _ => {}
            }
        }
    }

    /// DECEFR: a one-shot report fires when the pointer leaves the
    /// rectangle.
    pub(crate) fn decefr(&mut self, params: &vtscan::Params) {
        if self.vt_level() < 4 {
            return;
        }
        if params.len() < 4 || params.as_slice().iter().all(|&v| v < 0) {
            self.mstate.locator_filter = None;
            return;
        }
        let (px, py) = self
            .mstate
            .last_position
            .unwrap_or((1, 1));
        let top = params.get(0, py as i32) as usize;
        let left = params.get(1, px as i32) as usize;
        let bottom = params.get(2, py as i32) as usize;
        let right = params.get(3, px as i32) as usize;
        self.mstate.locator_filter = Some((
            top.min(bottom),
            left.min(right),
            top.max(bottom),
            left.max(right),
        ));
    }

    fn locator_units(&self, event: &MouseEvent) -> (usize, usize) {
        if self.mstate.locator_pixels {
            (event.pixel_x + 1, event.pixel_y + 1)
        } else {
            (event.x + 1, event.y + 1)
        }
    }

    fn locator_button_event(kind: MouseEventKind, button: MouseButton) -> Option<u32> {
        let base = match button {
            MouseButton::Right => 6,
            MouseButton::Middle => 4,
            MouseButton::Left => 2,
            _ => return None,
        };
        match kind {
            MouseEventKind::Press => Some(base),
            MouseEventKind::Release => Some(base + 1),
            MouseEventKind::Move => None,
        }
    }

    fn locator_button_mask(&self) -> u32 {
        match self.mstate.pressed {
            Some(MouseButton::Right) => 1,
            Some(MouseButton::Middle) => 2,
            Some(MouseButton::Left) => 4,
            _ => 0,
        }
    }

    fn locator_event(&mut self, event: &MouseEvent) {
        let (x, y) = self.locator_units(event);
        self.mstate.last_position = Some((x, y));

        match event.kind {
            MouseEventKind::Press => self.mstate.pressed = Some(event.button),
            MouseEventKind::Release => self.mstate.pressed = None,
            MouseEventKind::Move => {}
        }

        // Filter rectangle: one shot on leaving.
        if let Some((top, left, bottom, right)) = self.mstate.locator_filter {
            if y < top || y > bottom || x < left || x > right {
                self.mstate.locator_filter = None;
                let mask = self.locator_button_mask();
                self.answerback(&format!("{}10;{};{};{};1&w", CSI, mask, y, x));
                if self.mstate.locator_oneshot {
                    self.mstate.locator_enabled = false;
                    return;
                }
            }
        }

        if let Some(code) = Self::locator_button_event(event.kind, event.button) {
            let report = match event.kind {
                MouseEventKind::Press => self.mstate.locator_report_press,
                MouseEventKind::Release => self.mstate.locator_report_release,
                MouseEventKind::Move => false,
            };
            if report {
                let mask = self.locator_button_mask();
                self.answerback(&format!("{}{};{};{};{};1&w", CSI, code, mask, y, x));
                if self.mstate.locator_oneshot {
                    self.mstate.locator_enabled = false;
                }
            }
        }
    }

    /// DECRQLP: explicit position request.
    pub(crate) fn decrqlp(&mut self) {
        if self.vt_level() < 4 {
            return;
        }
        if !self.mstate.locator_enabled {
            // Locator available but disabled.
            self.answerback(&format!("{}0&w", CSI));
            return;
        }
        let (x, y) = self.mstate.last_position.unwrap_or((1, 1));
        let mask = self.locator_button_mask();
        self.answerback(&format!("{}1;{};{};{};1&w", CSI, mask, y, x));
        if self.mstate.locator_oneshot {
            self.mstate.locator_enabled = false;
        }
    }
}
