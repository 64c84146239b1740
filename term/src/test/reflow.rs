use super::TestTerm;
use k9::assert_equal as assert_eq;

#[test]
fn long_line_soft_wraps() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"The quick brown fox jumps");
    assert_eq!(t.row_text(0), "The quick".to_string());
    assert_eq!(t.row_text(1), "brown fox".to_string());
    assert_eq!(t.row_text(2), "jumps".to_string());
    assert!(t.row_continues(0));
    assert!(t.row_continues(1));
    assert!(!t.row_continues(2));
}

#[test]
fn wrapped_line_reflows_wider() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"The quick brown fox jumps\r\n");
    t.term.resize(15, 3);
    assert_eq!(t.row_text(0), "The quick brown".to_string());
    assert_eq!(t.row_text(1), " fox jumps".to_string());
    assert!(t.row_continues(0));
    assert!(!t.row_continues(1));
    assert_eq!(t.cursor(), (0, 2));
}

#[test]
fn round_trip_resize_is_stable() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"The quick brown fox jumps\r\n");
    let before: Vec<String> = (0..3).map(|y| t.row_text(y)).collect();
    let cursor_before = t.cursor();

    t.term.resize(15, 3);
    t.term.resize(10, 3);

    let after: Vec<String> = (0..3).map(|y| t.row_text(y)).collect();
    assert_eq!(before, after);
    assert_eq!(t.cursor(), cursor_before);
}

#[test]
fn taller_resize_reveals_scrollback() {
    let mut t = TestTerm::new(10, 2);
    t.feed(b"1\r\n2\r\n3\r\n4");
    assert_eq!(t.row_text(0), "3".to_string());
    t.term.resize(10, 4);
    // The cursor row stays anchored; rows above come back from
    // history.
    let texts: Vec<String> = (0..4).map(|y| t.row_text(y)).collect();
    assert!(texts.contains(&"4".to_string()));
    assert!(texts.contains(&"3".to_string()));
}

#[test]
fn narrower_resize_rewraps() {
    let mut t = TestTerm::new(20, 4);
    t.feed(b"abcdefghij\r\n");
    t.term.resize(5, 4);
    // The cursor keeps its row; the head of the rewrapped line sits
    // one step up in the scrollback.
    assert_eq!(t.row_text(0), "fghij".to_string());
    assert_eq!(t.cursor(), (0, 1));
    t.term.screen.scroll_view(1);
    assert_eq!(t.view_text(0), "abcde".to_string());
}

#[test]
fn cursor_survives_reflow() {
    let mut t = TestTerm::new(10, 4);
    t.feed(b"abcdefghij");
    // Pending wrap at the margin.
    assert_eq!(t.cursor(), (9, 0));
    assert!(t.term.screen.c.pending);
    t.term.resize(6, 4);
    // Pending wrap pins the cursor to the new right margin.
    assert_eq!(t.cursor().0, 5);
    assert!(t.term.screen.c.pending);
}

#[test]
fn alt_screen_truncates_instead_of_reflowing() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"\x1b[?1049habcdefghij");
    t.term.resize(6, 3);
    assert_eq!(t.row_text(0), "abcdef".to_string());
    t.term.resize(10, 3);
    // Truncated content does not come back.
    assert_eq!(t.row_text(0), "abcdef".to_string());
}

#[test]
fn selection_survives_reflow() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"The quick brown fox jumps");
    t.term.screen.selection_start(0, 0, crate::selection::SelectionMode::Char);
    t.term.screen.selection_extend(8, 0);
    let before = t.term.screen.selection_release();
    assert_eq!(String::from_utf8_lossy(&before).into_owned(), "The quick".to_string());

    t.term.resize(15, 3);
    let after = t.term.screen.selected_text();
    assert_eq!(String::from_utf8_lossy(&after).into_owned(), "The quick".to_string());
}
