use super::TestTerm;
use cellgrid::Underline;
use k9::assert_equal as assert_eq;

#[test]
fn cup_is_one_based_and_clamped() {
    let mut t = TestTerm::new(10, 5);
    t.feed(b"\x1b[3;4H");
    assert_eq!(t.cursor(), (3, 2));
    t.feed(b"\x1b[99;99H");
    assert_eq!(t.cursor(), (9, 4));
    t.feed(b"\x1b[H");
    assert_eq!(t.cursor(), (0, 0));
}

#[test]
fn relative_motion_respects_margins() {
    let mut t = TestTerm::new(10, 6);
    t.feed(b"\x1b[2;5r\x1b[3;1H\x1b[9A");
    // CUU stops at the top margin.
    assert_eq!(t.cursor(), (0, 1));
    t.feed(b"\x1b[9B");
    assert_eq!(t.cursor(), (0, 4));
}

#[test]
fn ich_and_dch_shift_cells() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"abcdef\x1b[1;3H\x1b[2@");
    assert_eq!(t.row_text(0), "ab  cdef".to_string());
    t.feed(b"\x1b[2P");
    assert_eq!(t.row_text(0), "abcdef".to_string());
}

#[test]
fn ech_blanks_without_shifting() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"abcdef\x1b[1;2H\x1b[3X");
    assert_eq!(t.row_text(0), "a    f".to_string());
}

#[test]
fn il_dl_scroll_the_tail_of_the_region() {
    let mut t = TestTerm::new(10, 4);
    t.feed(b"one\r\ntwo\r\nthree\x1b[2;1H\x1b[L");
    assert_eq!(t.row_text(1), "".to_string());
    assert_eq!(t.row_text(2), "two".to_string());
    assert_eq!(t.row_text(3), "three".to_string());
    t.feed(b"\x1b[M");
    assert_eq!(t.row_text(1), "two".to_string());
    assert_eq!(t.row_text(2), "three".to_string());
}

#[test]
fn ed_variants() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"aaa\r\nbbb\r\nccc\x1b[2;2H\x1b[0J");
    assert_eq!(t.row_text(0), "aaa".to_string());
    assert_eq!(t.row_text(1), "b".to_string());
    assert_eq!(t.row_text(2), "".to_string());

    let mut t = TestTerm::new(10, 3);
    t.feed(b"aaa\r\nbbb\r\nccc\x1b[2;2H\x1b[1J");
    assert_eq!(t.row_text(0), "".to_string());
    assert_eq!(t.row_text(1), "  b".to_string());
    assert_eq!(t.row_text(2), "ccc".to_string());

    let mut t = TestTerm::new(10, 3);
    t.feed(b"aaa\r\nbbb\x1b[2J");
    assert_eq!(t.row_text(0), "".to_string());
    assert_eq!(t.row_text(1), "".to_string());
}

#[test]
fn el_erases_with_current_background() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"abcdef\x1b[1;3H\x1b[44m\x1b[K");
    assert_eq!(t.row_text(0), "ab".to_string());
    // The erased cells carry the blue background.
    assert_eq!(t.term.screen.attr_at(5, 0).bg, cellgrid::Color::Palette(4));
}

#[test]
fn sgr_attributes_accumulate() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"\x1b[1;3;4;31;48;5;21m");
    let sgr = &t.term.screen.sgr;
    assert!(sgr.bold());
    assert!(sgr.italic());
    assert_eq!(sgr.underline(), Underline::Single);
    assert_eq!(sgr.fg, cellgrid::Color::Palette(1));
    assert_eq!(sgr.bg, cellgrid::Color::Palette(21));
    t.feed(b"\x1b[m");
    assert!(!t.term.screen.sgr.bold());
    assert_eq!(t.term.screen.sgr.fg, cellgrid::Color::fg());
}

#[test]
fn sgr_truecolor_both_spellings() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"\x1b[38;2;1;2;3m");
    assert_eq!(
        t.term.screen.sgr.fg,
        cellgrid::Color::Direct(cellgrid::Rgba::rgb(1, 2, 3))
    );
    // Colon form with the empty colorspace id.
    t.feed(b"\x1b[48:2::10:20:30m");
    assert_eq!(
        t.term.screen.sgr.bg,
        cellgrid::Color::Direct(cellgrid::Rgba::rgb(10, 20, 30))
    );
    // Leading-zero colorspace form.
    t.feed(b"\x1b[38:2:0:7:8:9m");
    assert_eq!(
        t.term.screen.sgr.fg,
        cellgrid::Color::Direct(cellgrid::Rgba::rgb(7, 8, 9))
    );
}

#[test]
fn sgr_curly_underline() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"\x1b[4:3m");
    assert_eq!(t.term.screen.sgr.underline(), Underline::Curly);
    t.feed(b"\x1b[4:0m");
    assert_eq!(t.term.screen.sgr.underline(), Underline::None);
}

#[test]
fn rep_repeats_the_last_glyph() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"ab\x1b[3b");
    assert_eq!(t.row_text(0), "abbbb".to_string());
}

#[test]
fn decstbm_scrolls_only_the_region() {
    let mut t = TestTerm::new(10, 4);
    t.feed(b"1\r\n2\r\n3\r\n4\x1b[2;3r\x1b[2;1H\n\n");
    // Rows 2 and 3 rotated; rows 1 and 4 untouched.
    assert_eq!(t.row_text(0), "1".to_string());
    assert_eq!(t.row_text(3), "4".to_string());
}

#[test]
fn insert_mode_shifts_on_print() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"abc\x1b[1;1H\x1b[4hX");
    assert_eq!(t.row_text(0), "Xabc".to_string());
    t.feed(b"\x1b[4l");
    t.feed(b"Y");
    assert_eq!(t.row_text(0), "XYbc".to_string());
}

#[test]
fn wide_glyphs_occupy_two_cells() {
    let mut t = TestTerm::new(10, 3);
    t.feed("a世b".as_bytes());
    assert_eq!(t.cursor(), (4, 0));
    let cell = t.term.screen.cell_at(1, 0);
    assert!(cell.wide());
    assert_eq!(t.term.screen.cell_at(2, 0).raw_ch(), 0);
}

#[test]
fn wide_glyph_never_straddles_the_margin() {
    let mut t = TestTerm::new(5, 3);
    t.feed("abcd世".as_bytes());
    // The wide glyph wrapped to the next row whole.
    assert_eq!(t.row_text(0), "abcd".to_string());
    assert!(t.term.screen.cell_at(0, 1).wide());
}

#[test]
fn combining_mark_composes_into_previous_cell() {
    let mut t = TestTerm::new(10, 3);
    t.feed("e\u{0301}".as_bytes());
    assert_eq!(t.row_text(0), "é".to_string());
    assert_eq!(t.cursor(), (1, 0));
}

#[test]
fn decsca_protects_against_selective_erase() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"\x1b[1\"qAB\x1b[0\"qCD");
    t.feed(b"\x1b[1;1H\x1b[?2K");
    assert_eq!(t.row_text(0), "AB".to_string());
    // A plain erase takes everything.
    t.feed(b"\x1b[2K");
    assert_eq!(t.row_text(0), "".to_string());
}

#[test]
fn decaln_fills_with_e() {
    let mut t = TestTerm::new(4, 2);
    t.feed(b"\x1b#8");
    assert_eq!(t.row_text(0), "EEEE".to_string());
    assert_eq!(t.row_text(1), "EEEE".to_string());
    assert_eq!(t.cursor(), (0, 0));
}

#[test]
fn decstr_resets_modes_but_not_the_screen() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"hello\x1b[?6h\x1b[4h\x1b[!p");
    assert_eq!(t.row_text(0), "hello".to_string());
    assert!(!t.term.screen.c.origin);
    assert!(!t.term.screen.mode.insert);
}

#[test]
fn ris_clears_everything() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"hello\x1bc");
    assert_eq!(t.row_text(0), "".to_string());
    assert_eq!(t.cursor(), (0, 0));
}

#[test]
fn altscreen_1049_saves_and_restores_the_cursor() {
    let mut t = TestTerm::new(10, 8);
    // Place the cursor at (5,5), enter the alternate screen, draw,
    // and come back: the "x" stays behind on the alternate screen.
    t.feed(b"\x1b[6;6H\x1b[?1049h");
    assert!(t.term.screen.altscreen());
    t.feed(b"\x1b[1;1Hx");
    assert_eq!(t.row_text(0), "x".to_string());
    t.feed(b"\x1b[?1049l");
    assert!(!t.term.screen.altscreen());
    assert_eq!(t.cursor(), (5, 5));
    assert_eq!(t.row_text(0), "".to_string());
}

#[test]
fn decckm_switches_cursor_key_encoding() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"\x1b[?1h");
    assert!(t.term.kstate.appcursor);
    t.feed(b"\x1b[?1l");
    assert!(!t.term.kstate.appcursor);
}

#[test]
fn declrmm_gates_decslrm() {
    let mut t = TestTerm::new(20, 5);
    // Without DECLRMM, CSI s is a cursor save.
    t.feed(b"\x1b[3;3H\x1b[s\x1b[H\x1b[u");
    assert_eq!(t.cursor(), (2, 2));
    // With it, margins apply and the cursor homes.
    t.feed(b"\x1b[?69h\x1b[3;10s");
    assert_eq!(t.term.screen.min_x(), 2);
    assert_eq!(t.term.screen.max_x(), 10);
}

#[test]
fn decscusr_records_the_shape() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"\x1b[4 q");
    assert_eq!(t.term.cursor_shape, 4);
}

#[test]
fn unknown_sequences_are_dropped_quietly() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"a\x1b[99;99;99+Qb");
    assert_eq!(t.row_text(0), "ab".to_string());
}
