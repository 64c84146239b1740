use super::TestTerm;
use k9::assert_equal as assert_eq;

#[test]
fn titles_update_their_targets() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"\x1b]2;window\x07\x1b]1;icon\x07");
    assert_eq!(t.term.title(), "window");
    assert_eq!(t.term.icon_title(), "icon");
    t.feed(b"\x1b]0;both\x1b\\");
    assert_eq!(t.term.title(), "both");
    assert_eq!(t.term.icon_title(), "both");
}

#[test]
fn osc52_sets_and_queries_the_clipboard() {
    let mut t = TestTerm::new(10, 3);
    // Set the clipboard to "Hi", then query it back.
    t.feed(b"\x1b]52;c;SGk=\x07");
    t.feed(b"\x1b]52;c;?\x07");
    assert_eq!(t.replies_string(), "\x1b]52;c;SGk=\x1b\\".to_string());
}

#[test]
fn osc52_query_of_empty_clipboard_is_empty() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"\x1b]52;p;?\x07");
    assert_eq!(t.replies_string(), "\x1b]52;p;\x1b\\".to_string());
}

#[test]
fn osc4_round_trips_a_palette_entry() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"\x1b]4;17;#102030\x07");
    assert_eq!(
        t.term.palette.colors[17],
        cellgrid::Rgba::rgb(0x10, 0x20, 0x30)
    );
    t.feed(b"\x1b]4;17;?\x07");
    assert_eq!(
        t.replies_string(),
        "\x1b]4;17;rgb:1010/2020/3030\x1b\\".to_string()
    );
}

#[test]
fn osc10_11_dynamic_colors() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"\x1b]10;#ffffff\x07\x1b]11;#000000\x07");
    assert_eq!(
        t.term.palette.colors[cellgrid::SPECIAL_FG as usize],
        cellgrid::Rgba::rgb(0xff, 0xff, 0xff)
    );
    t.feed(b"\x1b]11;?\x07");
    assert_eq!(
        t.replies_string(),
        "\x1b]11;rgb:0000/0000/0000\x1b\\".to_string()
    );
}

#[test]
fn osc8_attaches_hyperlinks_to_cells() {
    let mut t = TestTerm::new(20, 3);
    t.feed(b"\x1b]8;;https://example.com\x07link\x1b]8;;\x07out");
    let attr = t.term.screen.attr_at(0, 0).clone();
    let uri = attr.uri.expect("cell should carry a uri");
    assert_eq!(t.term.screen.uris.uri(uri), "https://example.com");
    assert_eq!(t.term.screen.attr_at(4, 0).uri, None);
}

#[test]
fn osc7_records_the_working_directory() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"\x1b]7;file://host/tmp\x07");
    assert_eq!(
        t.term.current_dir.as_ref().map(|u| u.path().to_string()),
        Some("/tmp".to_string())
    );
}

#[test]
fn osc133_marks_prompt_lines() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"\x1b]133;A\x07$ ");
    let span = t.term.screen.span(t.term.screen.c.y);
    assert!(t.term.screen.cur().store.line(span.line).sh_ps1_start);
}

#[test]
fn uri_automatch_tags_the_cells() {
    let mut t = TestTerm::new(40, 3);
    t.feed(b"see https://example.com/x now");
    // "see " occupies 0..4; the URI runs to the space before "now".
    let uri = t.term.screen.attr_at(4, 0).uri.expect("uri start tagged");
    assert_eq!(t.term.screen.uris.uri(uri), "https://example.com/x");
    assert_eq!(t.term.screen.attr_at(24, 0).uri, Some(uri));
    assert_eq!(t.term.screen.attr_at(3, 0).uri, None);
    assert_eq!(t.term.screen.attr_at(26, 0).uri, None);
}

#[test]
fn uri_automatch_is_idempotent() {
    let mut t = TestTerm::new(40, 3);
    t.feed(b"https://example.com ");
    let count_one = t.term.screen.uris.live();
    let attrs_one = t.term.screen.span(0);
    t.feed(b"\x1b[1;1H");
    t.feed(b"https://example.com ");
    // Re-printing the same URI over itself interns the same entry.
    assert_eq!(t.term.screen.uris.live(), count_one);
    assert_eq!(t.term.screen.span(0), attrs_one);
}

#[test]
fn legacy_title_esc_k() {
    let mut t = TestTerm::new(10, 3);
    t.feed(b"\x1bkold-style\x1b\\");
    assert_eq!(t.term.title(), "old-style");
}
