use super::TestTerm;
use crate::selection::SelectionMode;
use k9::assert_equal as assert_eq;

fn text(bytes: Vec<u8>) -> String {
    String::from_utf8_lossy(&bytes).into_owned()
}

#[test]
fn linear_selection_within_one_row() {
    let mut t = TestTerm::new(20, 4);
    t.feed(b"hello world");
    t.term.screen.selection_start(0, 0, SelectionMode::Char);
    t.term.screen.selection_extend(4, 0);
    assert_eq!(text(t.term.screen.selection_release()), "hello".to_string());
}

#[test]
fn linear_selection_across_hard_lines_inserts_newlines() {
    let mut t = TestTerm::new(20, 4);
    t.feed(b"one\r\ntwo\r\nthree");
    t.term.screen.selection_start(0, 0, SelectionMode::Char);
    t.term.screen.selection_extend(4, 2);
    assert_eq!(
        text(t.term.screen.selection_release()),
        "one\ntwo\nthree".to_string()
    );
}

#[test]
fn selection_across_soft_wrap_has_no_newline() {
    let mut t = TestTerm::new(10, 4);
    t.feed(b"abcdefghijKLMNO");
    // Rows are "abcdefghij" and "KLMNO", one logical line.
    t.term.screen.selection_start(8, 0, SelectionMode::Char);
    t.term.screen.selection_extend(1, 1);
    assert_eq!(text(t.term.screen.selection_release()), "ijKL".to_string());
}

#[test]
fn rectangular_selection_takes_columns() {
    let mut t = TestTerm::new(10, 4);
    t.feed(b"abcde\r\nfghij\r\nklmno");
    t.term.screen.selection_start(1, 0, SelectionMode::Rect);
    t.term.screen.selection_extend(3, 2);
    assert_eq!(
        text(t.term.screen.selection_release()),
        "bcd\nghi\nlmn".to_string()
    );
}

#[test]
fn word_selection_snaps_outward() {
    let mut t = TestTerm::new(20, 4);
    t.feed(b"foo bar-baz qux");
    t.term.screen.selection_start(5, 0, SelectionMode::Word);
    assert_eq!(
        text(t.term.screen.selection_release()),
        "bar-baz".to_string()
    );
}

#[test]
fn line_selection_takes_the_wrapped_paragraph() {
    let mut t = TestTerm::new(10, 4);
    t.feed(b"abcdefghijKL\r\nnext");
    t.term.screen.selection_start(3, 0, SelectionMode::Line);
    assert_eq!(
        text(t.term.screen.selection_release()),
        "abcdefghijKL".to_string()
    );
}

#[test]
fn overwriting_print_clears_the_selection() {
    let mut t = TestTerm::new(20, 4);
    t.feed(b"hello");
    t.term.screen.selection_start(0, 0, SelectionMode::Char);
    t.term.screen.selection_extend(4, 0);
    assert!(t.term.screen.selection_active());
    t.feed(b"\x1b[1;1HX");
    assert!(!t.term.screen.selection_active());
}

#[test]
fn erase_outside_the_selection_keeps_it() {
    let mut t = TestTerm::new(20, 4);
    t.feed(b"hello\r\nworld");
    t.term.screen.selection_start(0, 0, SelectionMode::Char);
    t.term.screen.selection_extend(4, 0);
    // Erase the second row only.
    t.feed(b"\x1b[2;1H\x1b[2K");
    assert!(t.term.screen.selection_active());
    assert_eq!(text(t.term.screen.selected_text()), "hello".to_string());
}

#[test]
fn scrolled_lines_keep_their_selection() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"first\r\nmid\r\nlast");
    t.term.screen.selection_start(0, 0, SelectionMode::Char);
    t.term.screen.selection_extend(4, 0);
    // Scroll "first" into the scrollback.
    t.feed(b"\x1b[3;1H\r\nnew");
    assert!(t.term.screen.selection_active());
    assert_eq!(text(t.term.screen.selected_text()), "first".to_string());
}

#[test]
fn wheel_scrolling_moves_the_view_locally() {
    use crate::input::{KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
    let mut t = TestTerm::new(10, 3);
    t.feed(b"1\r\n2\r\n3\r\n4\r\n5");
    t.term.mouse_event(MouseEvent {
        kind: MouseEventKind::Press,
        x: 0,
        y: 0,
        pixel_x: 0,
        pixel_y: 0,
        button: MouseButton::WheelUp,
        modifiers: KeyModifiers::empty(),
    });
    assert!(!t.term.screen.at_bottom());
}
