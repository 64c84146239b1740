use super::TestTerm;
use k9::assert_equal as assert_eq;

#[test]
fn cpr_reports_the_cursor() {
    let mut t = TestTerm::new(20, 5);
    t.feed(b"\x1b[3;4H\x1b[6n");
    assert_eq!(t.replies_string(), "\x1b[3;4R".to_string());
}

#[test]
fn cpr_is_origin_relative() {
    let mut t = TestTerm::new(20, 8);
    t.feed(b"\x1b[3;6r\x1b[?6h\x1b[2;2H\x1b[6n");
    assert_eq!(t.replies_string(), "\x1b[2;2R".to_string());
}

#[test]
fn dsr_operating_status() {
    let mut t = TestTerm::new(20, 5);
    t.feed(b"\x1b[5n");
    assert_eq!(t.replies_string(), "\x1b[0n".to_string());
}

#[test]
fn da1_announces_a_vt420() {
    let mut t = TestTerm::new(20, 5);
    t.feed(b"\x1b[c");
    let reply = t.replies_string();
    assert!(reply.starts_with("\x1b[?64;1;2;6"));
    assert!(reply.ends_with('c'));
}

#[test]
fn da2_and_da3() {
    let mut t = TestTerm::new(20, 5);
    t.feed(b"\x1b[>c");
    assert_eq!(t.replies_string(), "\x1b[>41;1;0c".to_string());
    t.feed(b"\x1b[=c");
    assert_eq!(t.replies_string(), "\x1bP!|00000000\x1b\\".to_string());
}

#[test]
fn decid_matches_da1() {
    let mut t = TestTerm::new(20, 5);
    t.feed(b"\x1b[c");
    let da = t.replies_string();
    t.feed(b"\x1bZ");
    assert_eq!(t.replies_string(), da);
}

#[test]
fn decrqss_round_trips_sgr() {
    let mut t = TestTerm::new(20, 5);
    t.feed(b"\x1b[1;31;44m\x1bP$qm\x1b\\");
    let reply = t.replies_string();
    assert_eq!(reply, "\x1bP1$r0;1;31;44m\x1b\\".to_string());

    // Feeding the reported SGR back reproduces the rendition.
    let sgr_params = &reply[5..reply.len() - 3];
    let mut t2 = TestTerm::new(20, 5);
    t2.feed(format!("\x1b[{}m", sgr_params).as_bytes());
    assert_eq!(t2.term.screen.sgr, t.term.screen.sgr);
}

#[test]
fn decrqss_reports_margins() {
    let mut t = TestTerm::new(20, 10);
    t.feed(b"\x1b[3;7r\x1bP$qr\x1b\\");
    assert_eq!(t.replies_string(), "\x1bP1$r3;7r\x1b\\".to_string());
}

#[test]
fn decrqss_rejects_unknown_settings() {
    let mut t = TestTerm::new(20, 5);
    t.feed(b"\x1bP$qz\x1b\\");
    assert_eq!(t.replies_string(), "\x1bP0$r\x1b\\".to_string());
}

#[test]
fn deccir_round_trips_through_decrsps() {
    let mut t = TestTerm::new(20, 10);
    t.feed(b"\x1b[5;7H\x1b[1;31;44m\x1b[1$w");
    let report = t.replies();
    // DCS 1 $ u ... ST; extract the payload.
    assert_eq!(report[..5].to_vec(), b"\x1bP1$u".to_vec());
    let payload = &report[5..report.len() - 2];

    // Disturb what the report carries, keep the colors.
    t.feed(b"\x1b[22m\x1b[1;1H");
    assert_eq!(t.cursor(), (0, 0));
    assert!(!t.term.screen.sgr.bold());

    let mut restore = b"\x1bP1$t".to_vec();
    restore.extend_from_slice(payload);
    restore.extend_from_slice(b"\x1b\\");
    t.feed(&restore);

    assert_eq!(t.cursor(), (6, 4));
    assert!(t.term.screen.sgr.bold());
    assert_eq!(t.term.screen.sgr.fg, cellgrid::Color::Palette(1));
    assert_eq!(t.term.screen.sgr.bg, cellgrid::Color::Palette(4));
}

#[test]
fn dectabsr_round_trips() {
    let mut t = TestTerm::new(20, 5);
    t.feed(b"\x1b[3g\x1b[1;6H\x1bH\x1b[1;12H\x1bH");
    t.feed(b"\x1b[2$w");
    let report = t.replies();
    assert_eq!(report[..5].to_vec(), b"\x1bP2$u".to_vec());
    let payload = report[5..report.len() - 2].to_vec();
    assert_eq!(payload, b"6/12".to_vec());

    t.feed(b"\x1b[3g");
    assert!(!t.term.screen.has_tab(5));

    let mut restore = b"\x1bP2$t".to_vec();
    restore.extend_from_slice(&payload);
    restore.extend_from_slice(b"\x1b\\");
    t.feed(&restore);
    assert!(t.term.screen.has_tab(5));
    assert!(t.term.screen.has_tab(11));
    assert!(!t.term.screen.has_tab(7));
}

#[test]
fn decrqm_reports_mode_states() {
    let mut t = TestTerm::new(20, 5);
    t.feed(b"\x1b[?7$p");
    assert_eq!(t.replies_string(), "\x1b[?7;1$y".to_string());
    t.feed(b"\x1b[?7l\x1b[?7$p");
    assert_eq!(t.replies_string(), "\x1b[?7;2$y".to_string());
    t.feed(b"\x1b[?9999$p");
    assert_eq!(t.replies_string(), "\x1b[?9999;0$y".to_string());
    t.feed(b"\x1b[4$p");
    assert_eq!(t.replies_string(), "\x1b[4;2$y".to_string());
}

#[test]
fn xtsave_xtrestore_round_trip() {
    let mut t = TestTerm::new(20, 5);
    // Enable origin mode and bracketed paste, save, toggle, restore.
    t.feed(b"\x1b[?6h\x1b[?2004h\x1b[?6;2004s");
    t.feed(b"\x1b[?6l\x1b[?2004l");
    assert!(!t.term.screen.c.origin);
    assert!(!t.term.mode.bracketed_paste);
    t.feed(b"\x1b[?6;2004r");
    assert!(t.term.screen.c.origin);
    assert!(t.term.mode.bracketed_paste);
}

#[test]
fn xtrestore_of_a_disabled_saved_mode_disables() {
    let mut t = TestTerm::new(20, 5);
    t.feed(b"\x1b[?2004l\x1b[?2004s\x1b[?2004h\x1b[?2004r");
    assert!(!t.term.mode.bracketed_paste);
}

#[test]
fn xtversion_reports_name_and_version() {
    let mut t = TestTerm::new(20, 5);
    t.feed(b"\x1b[>0q");
    let reply = t.replies_string();
    assert!(reply.starts_with("\x1bP>|"));
    assert!(reply.contains("xterm-256color"));
}

#[test]
fn xtgettcap_answers_colors() {
    let mut t = TestTerm::new(20, 5);
    // "Co" hex encoded is 436F.
    t.feed(b"\x1bP+q436F\x1b\\");
    let reply = t.replies_string();
    assert!(reply.starts_with("\x1bP1+r"));
    // "256" hex encoded.
    assert!(reply.contains("=323536"));
}

#[test]
fn eight_bit_reports_after_s8c1t() {
    let mut t = TestTerm::new(20, 5);
    t.feed(b"\x1b G\x1b[6n");
    assert_eq!(t.replies(), b"\x9b1;1R".to_vec());
    t.feed(b"\x1b F\x1b[6n");
    assert_eq!(t.replies_string(), "\x1b[1;1R".to_string());
}

#[test]
fn decreqtparm_answers() {
    let mut t = TestTerm::new(20, 5);
    t.feed(b"\x1b[x");
    assert_eq!(t.replies_string(), "\x1b[2;1;1;120;120;1;0x".to_string());
}
