use super::TestTerm;
use k9::assert_equal as assert_eq;

#[test]
fn plain_text_prints() {
    let mut t = TestTerm::new(20, 4);
    t.feed(b"hello");
    assert_eq!(t.row_text(0), "hello".to_string());
    assert_eq!(t.cursor(), (5, 0));
}

#[test]
fn cr_lf_moves_the_cursor() {
    let mut t = TestTerm::new(20, 4);
    t.feed(b"one\r\ntwo");
    assert_eq!(t.row_text(0), "one".to_string());
    assert_eq!(t.row_text(1), "two".to_string());
    assert_eq!(t.cursor(), (3, 1));
}

#[test]
fn bare_lf_keeps_the_column() {
    let mut t = TestTerm::new(20, 4);
    t.feed(b"abc\ndef");
    assert_eq!(t.row_text(1), "   def".to_string());
    assert_eq!(t.cursor(), (6, 1));
}

#[test]
fn lnm_makes_lf_imply_cr() {
    let mut t = TestTerm::new(20, 4);
    t.feed(b"\x1b[20habc\ndef");
    assert_eq!(t.row_text(1), "def".to_string());
}

#[test]
fn backspace_stops_at_the_left_edge() {
    let mut t = TestTerm::new(20, 4);
    t.feed(b"ab\x08\x08\x08x");
    assert_eq!(t.row_text(0), "xb".to_string());
}

#[test]
fn reverse_wrap_backspaces_around_the_margin() {
    let mut t = TestTerm::new(10, 4);
    t.feed(b"\x1b[?45h0123456789");
    // Cursor is pending at the margin; wrap to the next row first.
    t.feed(b"X");
    assert_eq!(t.row_text(1), "X".to_string());
    t.feed(b"\x08\x08");
    assert_eq!(t.cursor(), (9, 0));
}

#[test]
fn tabs_land_on_eight_column_stops() {
    let mut t = TestTerm::new(30, 4);
    t.feed(b"a\tb\tc");
    assert_eq!(t.row_text(0), "a       b       c".to_string());
}

#[test]
fn hts_sets_a_custom_stop() {
    let mut t = TestTerm::new(30, 4);
    // Clear all stops, set one at column 5.
    t.feed(b"\x1b[3g\x1b[1;6H\x1bH\r\tx");
    assert_eq!(t.cursor(), (6, 0));
}

#[test]
fn shift_out_selects_line_drawing() {
    let mut t = TestTerm::new(20, 4);
    // Designate DEC graphics into G1, shift out, draw, shift in.
    t.feed(b"\x1b)0\x0eqqq\x0fq");
    assert_eq!(t.row_text(0), "\u{2500}\u{2500}\u{2500}q".to_string());
}

#[test]
fn sub_prints_a_question_mark_and_cancels() {
    let mut t = TestTerm::new(20, 4);
    t.feed(b"\x1b[1;2\x1aab");
    assert_eq!(t.row_text(0), "?ab".to_string());
}

#[test]
fn enq_answers_back_nothing_by_default() {
    let mut t = TestTerm::new(20, 4);
    t.feed(b"\x05");
    assert_eq!(t.replies(), Vec::<u8>::new());
}

#[test]
fn single_shift_applies_to_one_character() {
    let mut t = TestTerm::new(20, 4);
    // G2 = DEC graphics; SS2 shifts for exactly one glyph.
    t.feed(b"\x1b*0\x1bNqq");
    assert_eq!(t.row_text(0), "\u{2500}q".to_string());
}

#[test]
fn sequences_survive_split_reads() {
    let mut t = TestTerm::new(10, 3);
    let consumed = t.feed_partial(b"ab\x1b[3");
    assert_eq!(consumed, 5);
    t.feed(b"1;44mcd");
    assert_eq!(t.row_text(0), "abcd".to_string());
    assert_eq!(
        t.term.screen.attr_at(2, 0).fg,
        cellgrid::Color::Palette(1)
    );
    assert_eq!(
        t.term.screen.attr_at(2, 0).bg,
        cellgrid::Color::Palette(4)
    );
}

#[test]
fn partial_utf8_print_is_deferred() {
    let mut t = TestTerm::new(10, 3);
    let bytes = "é".as_bytes();
    let consumed = t.feed_partial(&bytes[..1]);
    assert_eq!(consumed, 0);
    t.feed(bytes);
    assert_eq!(t.row_text(0), "é".to_string());
    assert_eq!(t.cursor(), (1, 0));
}
