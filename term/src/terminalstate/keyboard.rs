//! The input translator: key events in, escape sequences out.
//!
//! The pipeline is keymap re-encoding (hp/sun/sco/vt220 flavors),
//! modifyCursor/Function/Keypad parameter injection, modifyOtherKeys
//! for otherwise unreachable combinations, meta policy, and NRCS
//! round-tripping when UTF-8 is off.

use crate::input::{KeyCode, KeyEvent, KeyMap, KeyModifiers, ModifyOtherFormat};
use crate::nrcs;
use crate::terminalstate::TerminalState;

/// An escape reply under construction: introducer, optional private
/// marker, parameters and final byte.
#[derive(Debug, Default)]
struct Reply {
    /// 0x9B CSI, 0x8F SS3 or 0x1B for VT52 forms.
    init: char,
    private: Option<char>,
    params: Vec<u32>,
    fin: char,
}

impl Reply {
    fn emit(&self) -> String {
        let mut out = String::new();
        out.push(self.init);
        if let Some(p) = self.private {
            out.push(p);
        }
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                out.push(';');
            }
            out.push_str(&p.to_string());
        }
        out.push(self.fin);
        out
    }
}

/// modifyCursorKeys-style parameter injection, level 0..4.
fn modify_cursor(reply: &mut Reply, param: u32, level: u8) {
    if param == 0 {
        return;
    }
    match level {
        0 => {}
        1 => reply.params.push(param),
        2 => {
            reply.init = '\u{9b}';
            reply.params.push(param);
        }
        3 => {
            reply.init = '\u{9b}';
            if reply.params.is_empty() {
                reply.params.push(1);
            }
            reply.params.push(param);
        }
        _ => {
            reply.init = '\u{9b}';
            reply.private = Some('>');
            if reply.params.is_empty() {
                reply.params.push(1);
            }
            reply.params.push(param);
        }
    }
}

/// The libX11 control transformation for Ctrl+printable.
fn to_control(ch: char) -> char {
    match ch {
        '@'..='\u{7e}' | ' ' => ((ch as u8) & 0x1f) as char,
        '2' => '\0',
        '3'..='7' => ((ch as u8) - b'3' + 0x1b) as char,
        '8' => '\u{7f}',
        '/' => '\u{1f}',
        '?' => '\u{7f}',
        _ => ch,
    }
}

fn is_cursor_key(code: KeyCode) -> bool {
    matches!(
        code,
        KeyCode::Up | KeyCode::Down | KeyCode::Left | KeyCode::Right | KeyCode::Home | KeyCode::End
    )
}

fn is_edit_key(code: KeyCode) -> bool {
    matches!(
        code,
        KeyCode::Insert
            | KeyCode::Delete
            | KeyCode::PageUp
            | KeyCode::PageDown
            | KeyCode::Find
            | KeyCode::Select
            | KeyCode::Menu
    )
}

impl TerminalState {
    /// Translate and send one key press.
    pub fn key_down(&mut self, event: KeyEvent) {
        if self.keyboard_locked() {
            return;
        }

        let mut code = event.code;
        let mut mods = event.modifiers;

        /* Keymap adjustments before anything else. */

        // Shifted Tab is CBT unless modifyOtherKeys claims it.
        if code == KeyCode::Tab && mods == KeyModifiers::SHIFT && self.kstate.modkey_other < 2 {
            self.answerback("\u{9b}Z");
            return;
        }

        // Backspace/Delete swap, toggled by Ctrl.
        if code == KeyCode::Backspace {
            let del = self.kstate.backspace_is_del ^ mods.contains(KeyModifiers::CTRL);
            mods.remove(KeyModifiers::CTRL);
            if self.kstate.modkey_other == 0 {
                let byte = if del { '\u{7f}' } else { '\u{8}' };
                let text = self.apply_meta(byte.to_string(), mods);
                self.send_input(text.as_bytes());
                return;
            }
            code = KeyCode::Char(if del { '\u{7f}' } else { '\u{8}' });
        }

        if code == KeyCode::Delete && !self.kstate.delete_is_del && self.kstate.mapping == KeyMap::Vt220
        {
            // VT220 keyboards have Remove rather than Delete; the DEC
            // encoding below already yields CSI 3 ~.
        }

        // Function key row shifting on the legacy keyboards.
        if let KeyCode::Function(n) = code {
            if mods.intersects(KeyModifiers::CTRL | KeyModifiers::SHIFT) {
                let step = self.kstate.fkey_inc_step as u8;
                match self.kstate.mapping {
                    KeyMap::Vt220 | KeyMap::Legacy => {
                        if mods.contains(KeyModifiers::CTRL) {
                            code = KeyCode::Function(n.saturating_add(step));
                        }
                        mods.remove(KeyModifiers::CTRL);
                    }
                    _ if self.kstate.modkey_fn == 0 => {
                        let mut n = n;
                        if mods.contains(KeyModifiers::CTRL) {
                            n = n.saturating_add(step * 2);
                        }
                        if mods.contains(KeyModifiers::SHIFT) {
                            n = n.saturating_add(step);
                        }
                        code = KeyCode::Function(n);
                        mods.remove(KeyModifiers::CTRL | KeyModifiers::SHIFT);
                    }
                    _ => {}
                }
            }
        }

        let param = mods.encode_param();
        let vt52 = self.kstate.vt52;

        /* Keyboard flavor tables. */
        if let Some(mut reply) = self.fnkey_flavor(code) {
            let level = if matches!(code, KeyCode::Function(_)) || is_edit_key(code) {
                self.kstate.modkey_fn
            } else {
                self.kstate.modkey_cursor
            };
            modify_cursor(&mut reply, param, level);
            let text = reply.emit();
            self.answerback(&text);
            return;
        }

        /* DEC encodings. */

        if matches!(code, KeyCode::Function(_)) || is_edit_key(code) {
            // User defined keys take priority on VT220 keyboards.
            if let KeyCode::Function(n) = code {
                if mods.contains(KeyModifiers::SHIFT) && self.kstate.mapping == KeyMap::Vt220 {
                    let udk = self.udk_lookup(n as u32).map(|v| v.to_vec());
                    if let Some(udk) = udk {
                        self.send_input(&udk);
                    }
                    return;
                }
            }

            let deccode = match code {
                KeyCode::Function(n) => {
                    const VALUES: [u32; 20] = [
                        11, 12, 13, 14, 15, 17, 18, 19, 20, 21, 23, 24, 25, 26, 28, 29, 31, 32,
                        33, 34,
                    ];
                    match n {
                        1..=20 => VALUES[n as usize - 1],
                        n => 42 + n as u32 - 21,
                    }
                }
                KeyCode::Find => 1,
                KeyCode::Insert => 2,
                KeyCode::Delete => 3,
                KeyCode::Select => 4,
                KeyCode::PageUp => 5,
                KeyCode::PageDown => 6,
                KeyCode::Menu => 29,
                _ => 0,
            };

            let mut reply = Reply::default();
            if self.kstate.mapping != KeyMap::Legacy && (11..=14).contains(&deccode) {
                // F1-F4 keep their SS3 PF forms.
                reply.init = if vt52 { '\u{1b}' } else { '\u{8f}' };
                reply.fin = (b'P' + (deccode - 11) as u8) as char;
                modify_cursor(&mut reply, param, self.kstate.modkey_cursor);
            } else {
                reply.init = '\u{9b}';
                reply.fin = '~';
                reply.params.push(deccode);
                if matches!(code, KeyCode::Function(_)) {
                    modify_cursor(&mut reply, param, self.kstate.modkey_fn);
                } else if param != 0 {
                    reply.params.push(param);
                }
            }
            let text = reply.emit();
            self.answerback(&text);
            return;
        }

        if let KeyCode::KeypadFunction(n) = code {
            let mut reply = Reply {
                init: if vt52 { '\u{1b}' } else { '\u{8f}' },
                fin: (b'P' + (n.saturating_sub(1)).min(3)) as char,
                ..Reply::default()
            };
            modify_cursor(&mut reply, param, self.kstate.modkey_keypad);
            let text = reply.emit();
            self.answerback(&text);
            return;
        }

        if let KeyCode::Keypad(ch) = code {
            // NumLock suppression on VT220 keyboards.
            let appkey = self.kstate.appkey
                && !(self.kstate.mapping == KeyMap::Vt220
                    && self.kstate.allow_numlock
                    && mods.contains(KeyModifiers::NUMLOCK));
            if appkey {
                let fin = match ch {
                    ' ' => ' ',
                    '*' => 'j',
                    '+' => 'k',
                    ',' => 'l',
                    '-' => 'm',
                    '.' => 'n',
                    '/' => 'o',
                    '0'..='9' => (b'p' + ch as u8 - b'0') as char,
                    '=' => 'X',
                    '\r' => 'M',
                    other => other,
                };
                let mut reply = Reply {
                    init: if vt52 { '\u{1b}' } else { '\u{8f}' },
                    private: if vt52 { Some('?') } else { None },
                    fin,
                    ..Reply::default()
                };
                modify_cursor(&mut reply, param, self.kstate.modkey_keypad);
                let text = reply.emit();
                self.answerback(&text);
            } else {
                let text = self.apply_meta(ch.to_string(), mods);
                self.send_input(text.as_bytes());
            }
            return;
        }

        if is_cursor_key(code) {
            let fin = match code {
                KeyCode::Home => 'H',
                KeyCode::End => 'F',
                KeyCode::Up => 'A',
                KeyCode::Down => 'B',
                KeyCode::Right => 'C',
                KeyCode::Left => 'D',
                _ => unreachable!(),
            };
            let mut reply = Reply {
                init: if vt52 {
                    '\u{1b}'
                } else if self.kstate.appcursor {
                    '\u{8f}'
                } else {
                    '\u{9b}'
                },
                fin,
                ..Reply::default()
            };
            if !vt52 {
                modify_cursor(&mut reply, param, self.kstate.modkey_cursor);
            }
            let text = reply.emit();
            self.answerback(&text);
            return;
        }

        /* Plain characters. */

        let ch = match code {
            KeyCode::Char(c) => c,
            KeyCode::Return => '\r',
            KeyCode::Tab => '\t',
            KeyCode::Escape => '\u{1b}',
            _ => return,
        };

        if self.modify_other_applies(ch, mods) {
            let k = ch as u32;
            let m = mods.encode_param();
            let reply = match self.kstate.modkey_other_fmt {
                ModifyOtherFormat::Xterm => format!("\u{9b}27;{};{}~", m, k),
                ModifyOtherFormat::CsiU => format!("\u{9b}{};{}u", k, m),
            };
            self.answerback(&reply);
            return;
        }

        let mut ch = ch;
        if mods.contains(KeyModifiers::CTRL) {
            ch = to_control(ch);
        }

        let text = if self.mode.utf8 {
            ch.to_string()
        } else {
            // Round trip through the keyboard charset when running in
            // an eight bit character set.
            let mut cp = ch as u32;
            if cp > 0x7f {
                nrcs::encode(self.config().keyboard_charset(), &mut cp, self.mode.enable_nrcs);
                if cp > 0xff {
                    return;
                }
            }
            char::from_u32(cp).map(|c| c.to_string()).unwrap_or_default()
        };

        let text = self.apply_meta(text, mods);
        self.send_input(text.as_bytes());
    }

    fn keyboard_locked(&self) -> bool {
        self.kstate.keylock || self.mode.keyboard_locked
    }

    /// Encode the meta/alt policy into the byte stream.
    fn apply_meta(&self, text: String, mods: KeyModifiers) -> String {
        if !mods.contains(KeyModifiers::ALT) || !self.kstate.has_meta || text.is_empty() {
            return text;
        }
        if self.kstate.meta_escape {
            let mut out = String::with_capacity(text.len() + 1);
            out.push('\u{1b}');
            out.push_str(&text);
            out
        } else {
            // Set the eighth bit of a single byte character.
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if (c as u32) < 0x80 => {
                    char::from_u32(c as u32 | 0x80).map(|c| c.to_string()).unwrap_or(text)
                }
                _ => text,
            }
        }
    }

    /// Whether this combination routes through modifyOtherKeys.
    fn modify_other_applies(&self, ch: char, mods: KeyModifiers) -> bool {
        if self.kstate.vt52 || self.kstate.modkey_other == 0 {
            return false;
        }
        let interesting = mods.intersects(KeyModifiers::CTRL | KeyModifiers::ALT | KeyModifiers::SHIFT);
        if !interesting {
            return false;
        }
        if self.kstate.modkey_other >= 2 {
            // Everything with a modifier, except plain Shift+printable
            // (which the window already resolved into the character).
            return ch == ' '
                || ch == '\r'
                || ch == '\t'
                || mods.intersects(KeyModifiers::CTRL | KeyModifiers::ALT)
                || !mods.contains(KeyModifiers::SHIFT);
        }
        // Level 1: only otherwise-ambiguous combinations.
        match ch {
            '\r' | '\t' | '\u{8}' | '\u{7f}' => true,
            _ => {
                mods.contains(KeyModifiers::CTRL)
                    && mods.intersects(KeyModifiers::ALT | KeyModifiers::SHIFT)
            }
        }
    }

    /// hp/sun/sco keyboard tables; `None` falls through to the DEC
    /// encodings.
    fn fnkey_flavor(&self, code: KeyCode) -> Option<Reply> {
        match self.kstate.mapping {
            KeyMap::Hp => {
                let fin = match code {
                    KeyCode::Function(n @ 1..=8) => (b'p' + n - 1) as char,
                    KeyCode::Up => 'A',
                    KeyCode::Down => 'B',
                    KeyCode::Right => 'C',
                    KeyCode::Left => 'D',
                    KeyCode::End | KeyCode::Select => 'F',
                    KeyCode::Delete => 'P',
                    KeyCode::Insert => 'Q',
                    KeyCode::PageDown => 'S',
                    KeyCode::PageUp => 'T',
                    KeyCode::Home | KeyCode::Find => 'h',
                    _ => return None,
                };
                Some(Reply {
                    init: '\u{9b}',
                    fin,
                    ..Reply::default()
                })
            }
            KeyMap::Sco => {
                let fin = match code {
                    KeyCode::Function(n @ 1..=48) => {
                        b"MNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz@[\\]^_`{"[n as usize - 1]
                            as char
                    }
                    KeyCode::Up => 'A',
                    KeyCode::Down => 'B',
                    KeyCode::Right => 'C',
                    KeyCode::Left => 'D',
                    KeyCode::End => 'F',
                    KeyCode::Insert => 'L',
                    KeyCode::PageDown => 'G',
                    KeyCode::PageUp => 'I',
                    KeyCode::Home => 'H',
                    _ => return None,
                };
                Some(Reply {
                    init: '\u{9b}',
                    fin,
                    ..Reply::default()
                })
            }
            KeyMap::Sun => {
                const FKEYS: [u32; 37] = [
                    224, 225, 226, 227, 228, 229, 230, 231, 232, 233, 192, 193, 194, 195, 196,
                    197, 198, 199, 200, 201, 208, 209, 210, 211, 212, 213, 214, 215, 216, 217,
                    218, 219, 220, 221, 222, 234, 235,
                ];
                let arg = match code {
                    KeyCode::Function(n @ 1..=37) => FKEYS[n as usize - 1],
                    KeyCode::Menu => 197,
                    KeyCode::Find => 1,
                    KeyCode::Insert => 2,
                    KeyCode::Delete => 3,
                    KeyCode::Select => 4,
                    KeyCode::PageUp => 216,
                    KeyCode::PageDown => 222,
                    KeyCode::Home => 214,
                    KeyCode::End => 220,
                    _ => {
                        if is_cursor_key(code) {
                            let fin = match code {
                                KeyCode::Home => 'H',
                                KeyCode::Up => 'A',
                                KeyCode::Down => 'B',
                                KeyCode::Right => 'C',
                                KeyCode::Left => 'D',
                                KeyCode::End => 'F',
                                _ => return None,
                            };
                            return Some(Reply {
                                init: '\u{8f}',
                                fin,
                                ..Reply::default()
                            });
                        }
                        return None;
                    }
                };
                Some(Reply {
                    init: '\u{9b}',
                    params: vec![arg],
                    fin: 'z',
                    ..Reply::default()
                })
            }
            _ => None,
        }
    }
}
