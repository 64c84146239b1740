//! Input event types shared between the embedding window layer and
//! the translators in `terminalstate`.

bitflags! {
    #[derive(Default)]
    pub struct KeyModifiers: u8 {
        const SHIFT = 1;
        const ALT = 2;
        const CTRL = 4;
        const SUPER = 8;
        /// Keypad NumLock state, consulted for VT220 keypad rules.
        const NUMLOCK = 16;
    }
}

impl KeyModifiers {
    /// The xterm modifier parameter: encoded mask plus one, zero when
    /// no modifier applies.
    pub fn encode_param(self) -> u32 {
        let mut v = 0;
        if self.contains(KeyModifiers::SHIFT) {
            v |= 1;
        }
        if self.contains(KeyModifiers::ALT) {
            v |= 2;
        }
        if self.contains(KeyModifiers::CTRL) {
            v |= 4;
        }
        if v != 0 {
            v + 1
        } else {
            0
        }
    }
}

/// A key, after the windowing layer has applied its own keymap.  The
/// distinction between `Char` and the named keys mirrors what the
/// escape encodings need.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KeyCode {
    Char(char),
    Up,
    Down,
    Right,
    Left,
    Home,
    End,
    Insert,
    Delete,
    PageUp,
    PageDown,
    Backspace,
    Tab,
    Return,
    Escape,
    /// Function key by number, 1-based.
    Function(u8),
    /// Keypad digits and operators carry their ASCII value.
    Keypad(char),
    /// PF1..PF4 above the keypad.
    KeypadFunction(u8),
    Menu,
    Find,
    Select,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

impl KeyEvent {
    pub fn new(code: KeyCode, modifiers: KeyModifiers) -> Self {
        KeyEvent {
            code,
            modifiers,
        }
    }
}

/// Keyboard flavor for function/keypad encodings, per the xterm
/// keyboard type resources.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KeyMap {
    Default,
    Legacy,
    Vt220,
    Hp,
    Sun,
    Sco,
}

/// How modifyOtherKeys escapes are spelled.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ModifyOtherFormat {
    /// `CSI 27 ; M ; K ~`
    Xterm,
    /// `CSI K ; M u`
    CsiU,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    WheelUp,
    WheelDown,
    None,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MouseEventKind {
    Press,
    Release,
    Move,
}

/// A pointer event in cell coordinates, with the pixel position kept
/// alongside for SGR-pixel reporting and locator filters.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MouseEvent {
    pub kind: MouseEventKind,
    pub x: usize,
    pub y: usize,
    pub pixel_x: usize,
    pub pixel_y: usize,
    pub button: MouseButton,
    pub modifiers: KeyModifiers,
}

#[cfg(test)]
mod test {
    use super::*;
    use k9::assert_equal as assert_eq;

    #[test]
    fn modifier_params_match_xterm() {
        assert_eq!(KeyModifiers::empty().encode_param(), 0);
        assert_eq!(KeyModifiers::SHIFT.encode_param(), 2);
        assert_eq!(KeyModifiers::ALT.encode_param(), 3);
        assert_eq!(KeyModifiers::CTRL.encode_param(), 5);
        assert_eq!(
            (KeyModifiers::CTRL | KeyModifiers::SHIFT).encode_param(),
            6
        );
    }
}
