use super::TestTerm;
use k9::assert_equal as assert_eq;

#[test]
fn decfra_fills_a_rectangle() {
    let mut t = TestTerm::new(10, 5);
    // Fill 'X' (88) into rows 2-3, columns 3-5.
    t.feed(b"\x1b[88;2;3;3;5$x");
    assert_eq!(t.row_text(0), "".to_string());
    assert_eq!(t.row_text(1), "  XXX".to_string());
    assert_eq!(t.row_text(2), "  XXX".to_string());
    assert_eq!(t.row_text(3), "".to_string());
}

#[test]
fn deccra_copies_and_leaves_the_source() {
    let mut t = TestTerm::new(10, 6);
    // Fill columns 1-3 of rows 1-2 with X, then copy the block to
    // rows 4-5, columns 5-7.
    t.feed(b"\x1b[88;1;1;2;3$x");
    t.feed(b"\x1b[1;1;2;3;4;5$v");
    assert_eq!(t.row_text(0), "XXX".to_string());
    assert_eq!(t.row_text(1), "XXX".to_string());
    assert_eq!(t.row_text(3), "    XXX".to_string());
    assert_eq!(t.row_text(4), "    XXX".to_string());
}

#[test]
fn deccra_handles_overlap() {
    let mut t = TestTerm::new(10, 5);
    t.feed(b"abcde");
    // Copy row 1 cols 1-4 one column to the right.
    t.feed(b"\x1b[1;1;1;4;1;2$v");
    assert_eq!(t.row_text(0), "aabcd".to_string());
}

#[test]
fn decera_erases_a_rectangle() {
    let mut t = TestTerm::new(10, 4);
    t.feed(b"aaaa\r\nbbbb\r\ncccc");
    t.feed(b"\x1b[1;2;2;3$z");
    assert_eq!(t.row_text(0), "a  a".to_string());
    assert_eq!(t.row_text(1), "b  b".to_string());
    assert_eq!(t.row_text(2), "cccc".to_string());
}

#[test]
fn decsera_respects_protection() {
    let mut t = TestTerm::new(10, 4);
    t.feed(b"\x1b[1\"qab\x1b[0\"qcd");
    t.feed(b"\x1b[1;1;1;4${");
    assert_eq!(t.row_text(0), "ab".to_string());
}

#[test]
fn deccara_applies_attributes_in_the_rectangle() {
    let mut t = TestTerm::new(10, 4);
    t.feed(b"aaaa\r\nbbbb");
    // Bold rows 1-2, columns 2-3, exact rectangle.
    t.feed(b"\x1b[2$p"); // harmless RQM to keep the stream realistic
    t.replies();
    t.feed(b"\x1b[2*x\x1b[1;2;2;3;1$r");
    assert!(t.term.screen.attr_at(1, 0).bold());
    assert!(t.term.screen.attr_at(2, 1).bold());
    assert!(!t.term.screen.attr_at(0, 0).bold());
    assert!(!t.term.screen.attr_at(3, 1).bold());
}

#[test]
fn decrara_toggles_attributes() {
    let mut t = TestTerm::new(10, 4);
    t.feed(b"\x1b[2*x\x1b[7m--\x1b[mxx");
    t.feed(b"\x1b[1;1;1;4;7$t");
    // The first two cells lose reverse, the last two gain it.
    assert!(!t.term.screen.attr_at(0, 0).reverse());
    assert!(!t.term.screen.attr_at(1, 0).reverse());
    assert!(t.term.screen.attr_at(2, 0).reverse());
    assert!(t.term.screen.attr_at(3, 0).reverse());
}

#[test]
fn decrqcra_reports_a_checksum() {
    let mut t = TestTerm::new(10, 4);
    t.feed(b"hello");
    t.feed(b"\x1b[7;1;1;1;1;5*y");
    let reply = t.replies_string();
    assert!(reply.starts_with("\x1bP7!~"));
    assert!(reply.ends_with("\x1b\\"));
    // Four hex digits between the id and the terminator.
    let hex = &reply[5..reply.len() - 2];
    assert_eq!(hex.len(), 4);
    assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn checksum_is_content_sensitive_and_flag_aware() {
    let mut t = TestTerm::new(10, 4);
    t.feed(b"ab");
    t.feed(b"\x1b[1;1;1;1;1;9*y");
    let first = t.replies_string();

    let mut t2 = TestTerm::new(10, 4);
    t2.feed(b"ac");
    t2.feed(b"\x1b[1;1;1;1;1;9*y");
    let second = t2.replies_string();
    assert!(first != second);

    // The positive flag (bit 0 of XTCHECKSUM) negates the sum.
    let mut t3 = TestTerm::new(10, 4);
    t3.feed(b"ab\x1b[1#y");
    t3.feed(b"\x1b[1;1;1;1;1;9*y");
    let positive = t3.replies_string();
    assert!(positive != first);
}

#[test]
fn decic_decdc_shift_columns() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"abcdef\x1b[1;3H\x1b[2'}");
    assert_eq!(t.row_text(0), "ab  cdef".to_string());
    t.feed(b"\x1b[2'~");
    assert_eq!(t.row_text(0), "abcdef".to_string());
}
