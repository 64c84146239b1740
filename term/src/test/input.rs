use super::TestTerm;
use crate::input::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use k9::assert_equal as assert_eq;

fn key(t: &mut TestTerm, code: KeyCode, mods: KeyModifiers) -> String {
    t.replies();
    t.term.key_down(KeyEvent::new(code, mods));
    t.replies_string()
}

#[test]
fn plain_characters_pass_through() {
    let mut t = TestTerm::new(10, 3);
    assert_eq!(key(&mut t, KeyCode::Char('a'), KeyModifiers::empty()), "a".to_string());
    assert_eq!(key(&mut t, KeyCode::Return, KeyModifiers::empty()), "\r".to_string());
}

#[test]
fn control_characters_are_transformed() {
    let mut t = TestTerm::new(10, 3);
    assert_eq!(
        key(&mut t, KeyCode::Char('c'), KeyModifiers::CTRL),
        "\u{3}".to_string()
    );
    assert_eq!(
        key(&mut t, KeyCode::Char(' '), KeyModifiers::CTRL),
        "\u{0}".to_string()
    );
}

#[test]
fn arrows_follow_decckm() {
    let mut t = TestTerm::new(10, 3);
    assert_eq!(key(&mut t, KeyCode::Up, KeyModifiers::empty()), "\x1b[A".to_string());
    t.feed(b"\x1b[?1h");
    assert_eq!(key(&mut t, KeyCode::Up, KeyModifiers::empty()), "\x1bOA".to_string());
}

#[test]
fn modified_arrows_use_the_parameter_form() {
    let mut t = TestTerm::new(10, 3);
    assert_eq!(
        key(&mut t, KeyCode::Up, KeyModifiers::CTRL),
        "\x1b[1;5A".to_string()
    );
    assert_eq!(
        key(&mut t, KeyCode::Left, KeyModifiers::SHIFT | KeyModifiers::ALT),
        "\x1b[1;4D".to_string()
    );
}

#[test]
fn function_keys_use_dec_codes() {
    let mut t = TestTerm::new(10, 3);
    assert_eq!(
        key(&mut t, KeyCode::Function(1), KeyModifiers::empty()),
        "\x1bOP".to_string()
    );
    assert_eq!(
        key(&mut t, KeyCode::Function(5), KeyModifiers::empty()),
        "\x1b[15~".to_string()
    );
    assert_eq!(
        key(&mut t, KeyCode::Function(5), KeyModifiers::SHIFT),
        "\x1b[15;2~".to_string()
    );
}

#[test]
fn edit_keys_encode_tildes() {
    let mut t = TestTerm::new(10, 3);
    assert_eq!(
        key(&mut t, KeyCode::Insert, KeyModifiers::empty()),
        "\x1b[2~".to_string()
    );
    assert_eq!(
        key(&mut t, KeyCode::PageUp, KeyModifiers::empty()),
        "\x1b[5~".to_string()
    );
    assert_eq!(
        key(&mut t, KeyCode::Delete, KeyModifiers::empty()),
        "\x1b[3~".to_string()
    );
}

#[test]
fn backspace_honors_the_del_swap() {
    let mut t = TestTerm::new(10, 3);
    assert_eq!(
        key(&mut t, KeyCode::Backspace, KeyModifiers::empty()),
        "\u{7f}".to_string()
    );
    assert_eq!(
        key(&mut t, KeyCode::Backspace, KeyModifiers::CTRL),
        "\u{8}".to_string()
    );
}

#[test]
fn meta_prefixes_escape() {
    let mut t = TestTerm::new(10, 3);
    assert_eq!(
        key(&mut t, KeyCode::Char('x'), KeyModifiers::ALT),
        "\x1bx".to_string()
    );
}

#[test]
fn keypad_application_mode() {
    let mut t = TestTerm::new(10, 3);
    assert_eq!(
        key(&mut t, KeyCode::Keypad('5'), KeyModifiers::empty()),
        "5".to_string()
    );
    t.feed(b"\x1b=");
    assert_eq!(
        key(&mut t, KeyCode::Keypad('5'), KeyModifiers::empty()),
        "\x1bOu".to_string()
    );
    assert_eq!(
        key(&mut t, KeyCode::Keypad('+'), KeyModifiers::empty()),
        "\x1bOk".to_string()
    );
}

#[test]
fn modify_other_keys_level_two() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"\x1b[>4;2m");
    assert_eq!(
        key(&mut t, KeyCode::Char('i'), KeyModifiers::CTRL),
        "\x1b[27;5;105~".to_string()
    );
}

#[test]
fn keyboard_action_mode_locks_input() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"\x1b[2h");
    assert_eq!(key(&mut t, KeyCode::Char('a'), KeyModifiers::empty()), "".to_string());
    t.feed(b"\x1b[2l");
    assert_eq!(key(&mut t, KeyCode::Char('a'), KeyModifiers::empty()), "a".to_string());
}

#[test]
fn vt52_arrows_have_no_modifiers() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"\x1b[?2l");
    assert!(t.term.kstate.vt52);
    assert_eq!(
        key(&mut t, KeyCode::Up, KeyModifiers::CTRL),
        "\x1bA".to_string()
    );
    // ESC < leaves VT52.
    t.feed(b"\x1b<");
    assert!(!t.term.kstate.vt52);
}

#[test]
fn bracketed_paste_wraps_and_rewrites() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"\x1b[?2004h");
    t.term.paste_begin();
    t.term.paste_chunk(b"a\nb");
    t.term.paste_end();
    assert_eq!(t.replies_string(), "\x1b[200~a\rb\x1b[201~".to_string());
}

#[test]
fn cancelled_paste_omits_the_suffix() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"\x1b[?2004h");
    t.term.paste_begin();
    t.term.paste_chunk(b"partial");
    t.term.paste_cancel();
    t.term.paste_end();
    assert_eq!(t.replies_string(), "\x1b[200~partial".to_string());
}

#[test]
fn sgr_mouse_reporting() {
    let mut t = TestTerm::new(10, 5);
    t.feed(b"\x1b[?1002h\x1b[?1006h");
    t.term.mouse_event(MouseEvent {
        kind: MouseEventKind::Press,
        x: 4,
        y: 2,
        pixel_x: 40,
        pixel_y: 20,
        button: MouseButton::Left,
        modifiers: KeyModifiers::empty(),
    });
    assert_eq!(t.replies_string(), "\x1b[<0;5;3M".to_string());
    t.term.mouse_event(MouseEvent {
        kind: MouseEventKind::Release,
        x: 4,
        y: 2,
        pixel_x: 40,
        pixel_y: 20,
        button: MouseButton::Left,
        modifiers: KeyModifiers::empty(),
    });
    assert_eq!(t.replies_string(), "\x1b[<0;5;3m".to_string());
}

#[test]
fn legacy_mouse_reporting() {
    let mut t = TestTerm::new(10, 5);
    t.feed(b"\x1b[?1000h");
    t.term.mouse_event(MouseEvent {
        kind: MouseEventKind::Press,
        x: 1,
        y: 1,
        pixel_x: 0,
        pixel_y: 0,
        button: MouseButton::Left,
        modifiers: KeyModifiers::empty(),
    });
    assert_eq!(t.replies(), b"\x1b[M \"\"".to_vec());
}

#[test]
fn motion_reports_are_deduplicated() {
    let mut t = TestTerm::new(10, 5);
    t.feed(b"\x1b[?1003h\x1b[?1006h");
    let event = MouseEvent {
        kind: MouseEventKind::Move,
        x: 3,
        y: 3,
        pixel_x: 0,
        pixel_y: 0,
        button: MouseButton::None,
        modifiers: KeyModifiers::empty(),
    };
    t.term.mouse_event(event);
    let first = t.replies();
    assert!(!first.is_empty());
    t.term.mouse_event(event);
    assert_eq!(t.replies(), Vec::<u8>::new());
}

#[test]
fn shift_overrides_mouse_reporting_for_selection() {
    let mut t = TestTerm::new(10, 5);
    t.feed(b"hello\x1b[?1000h");
    t.term.mouse_event(MouseEvent {
        kind: MouseEventKind::Press,
        x: 0,
        y: 0,
        pixel_x: 0,
        pixel_y: 0,
        button: MouseButton::Left,
        modifiers: KeyModifiers::SHIFT,
    });
    assert_eq!(t.replies(), Vec::<u8>::new());
    assert!(t.term.screen.selection_active());
}

#[test]
fn focus_tracking_reports() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"\x1b[?1004h");
    t.term.focus_changed(true);
    assert_eq!(t.replies_string(), "\x1b[I".to_string());
    t.term.focus_changed(false);
    assert_eq!(t.replies_string(), "\x1b[O".to_string());
}

#[test]
fn locator_reports_on_request() {
    let mut t = TestTerm::new(10, 5);
    t.feed(b"\x1b[1'z\x1b[1;3'{");
    t.term.mouse_event(MouseEvent {
        kind: MouseEventKind::Move,
        x: 2,
        y: 1,
        pixel_x: 0,
        pixel_y: 0,
        button: MouseButton::None,
        modifiers: KeyModifiers::empty(),
    });
    t.replies();
    t.feed(b"\x1b['|");
    assert_eq!(t.replies_string(), "\x1b[1;0;2;3;1&w".to_string());
}
