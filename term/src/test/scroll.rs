use super::TestTerm;
use k9::assert_equal as assert_eq;

#[test]
fn lines_scroll_into_scrollback() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"1\r\n2\r\n3\r\n4\r\n5");
    assert_eq!(t.row_text(0), "3".to_string());
    assert_eq!(t.row_text(1), "4".to_string());
    assert_eq!(t.row_text(2), "5".to_string());
    assert_eq!(t.term.screen.scrollback_depth(), 2);
}

#[test]
fn view_scrolls_back_and_returns() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"1\r\n2\r\n3\r\n4\r\n5");
    t.term.screen.scroll_view(2);
    assert!(!t.term.screen.at_bottom());
    assert_eq!(t.view_text(0), "1".to_string());
    assert_eq!(t.view_text(2), "3".to_string());

    t.term.screen.scroll_view(-10);
    assert!(t.term.screen.at_bottom());
    assert_eq!(t.view_text(0), "3".to_string());
}

#[test]
fn output_does_not_move_a_scrolled_view() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"1\r\n2\r\n3\r\n4");
    t.term.screen.scroll_view(1);
    let anchored = t.view_text(0);
    t.feed(b"\r\n5\r\n6");
    assert_eq!(t.view_text(0), anchored);
    assert!(!t.term.screen.at_bottom());
}

#[test]
fn scrollback_is_capped() {
    #[derive(Debug)]
    struct SmallScrollback;
    impl crate::config::TerminalConfiguration for SmallScrollback {
        fn scrollback_size(&self) -> usize {
            2
        }
    }

    let out = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let writer = Box::new(super::CaptureWriter(std::rc::Rc::clone(&out)));
    let mut term = crate::Terminal::new(10, 2, std::sync::Arc::new(SmallScrollback), writer);
    for i in 0..9 {
        let line = format!("{}\r\n", i);
        let mut consumed = 0;
        while consumed < line.len() {
            consumed += term.advance_bytes(&line.as_bytes()[consumed..]);
        }
    }
    assert!(term.screen.scrollback_depth() <= 2);
}

#[test]
fn su_and_sd_do_not_push_history() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"a\r\nb\r\nc");
    let before = t.term.screen.scrollback_depth();
    t.feed(b"\x1b[2S");
    assert_eq!(t.row_text(0), "c".to_string());
    assert_eq!(t.term.screen.scrollback_depth(), before);
    t.feed(b"\x1b[1T");
    assert_eq!(t.row_text(1), "c".to_string());
    assert_eq!(t.row_text(0), "".to_string());
}

#[test]
fn ri_at_the_top_scrolls_down() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"a\r\nb\x1b[1;1H\x1bM");
    assert_eq!(t.row_text(0), "".to_string());
    assert_eq!(t.row_text(1), "a".to_string());
    assert_eq!(t.row_text(2), "b".to_string());
}

#[test]
fn horizontal_scroll_within_margins() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"abcdef\x1b[2 @");
    // SL shifts the content left by two.
    assert_eq!(t.row_text(0), "cdef".to_string());
    t.feed(b"\x1b[1 A");
    assert_eq!(t.row_text(0), " cdef".to_string());
}

#[test]
fn erase_saved_lines_drops_the_scrollback() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"1\r\n2\r\n3\r\n4\r\n5");
    assert!(t.term.screen.scrollback_depth() > 0);
    t.feed(b"\x1b[3J");
    assert_eq!(t.term.screen.scrollback_depth(), 0);
    // The visible rows survive.
    assert_eq!(t.row_text(2), "5".to_string());
}
