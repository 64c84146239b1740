//! Streaming URI auto-detection.
//!
//! A reverse trie of protocol prefixes is consulted whenever a `:`
//! flows past: the characters immediately before it are matched
//! backwards (up to the longest configured protocol).  On a hit a
//! bookmark is placed at the protocol start and a forward scanner
//! consumes URI-valid characters until a terminator; the engine then
//! applies the `uri` attribute to the bookmarked cell range.

/// Longest protocol prefix we will look back over; the TTY ring
/// guarantees at least this many bytes survive a refill.
pub const MAX_PROTOCOL_LEN: usize = 16;

#[derive(Debug, Default)]
struct TrieNode {
    ch: u8,
    terminal: bool,
    children: Vec<u32>,
}

/// Reverse trie over protocol names; matching walks the recent output
/// backwards from the colon.
#[derive(Debug)]
struct ReverseTrie {
    nodes: Vec<TrieNode>,
}

impl ReverseTrie {
    fn new(protocols: &[String]) -> Self {
        let mut trie = ReverseTrie {
            nodes: vec![TrieNode::default()],
        };
        for proto in protocols {
            let bytes: Vec<u8> = proto
                .bytes()
                .take(MAX_PROTOCOL_LEN)
                .map(|b| b.to_ascii_lowercase())
                .collect();
            let mut node = 0usize;
            for &b in bytes.iter().rev() {
                node = match trie.nodes[node]
                    .children
                    .iter()
                    .find(|&&c| trie.nodes[c as usize].ch == b)
                {
                    Some(&c) => c as usize,
                    None => {
                        let idx = trie.nodes.len() as u32;
                        trie.nodes.push(TrieNode {
                            ch: b,
                            terminal: false,
                            children: Vec::new(),
                        });
                        trie.nodes[node].children.push(idx);
                        idx as usize
                    }
                };
            }
            trie.nodes[node].terminal = true;
        }
        trie
    }

    /// Length of the longest protocol ending exactly at the end of
    /// `window`.
    fn match_suffix(&self, window: &[u8]) -> Option<usize> {
        let mut node = 0usize;
        let mut best = None;
        for (depth, &b) in window.iter().rev().enumerate() {
            let b = b.to_ascii_lowercase();
            node = match self.nodes[node]
                .children
                .iter()
                .find(|&&c| self.nodes[c as usize].ch == b)
            {
                Some(&c) => c as usize,
                None => break,
            };
            if self.nodes[node].terminal {
                best = Some(depth + 1);
            }
        }
        best
    }
}

/// Characters that may appear inside a URI.
fn is_uri_char(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'-' | b'.'
                | b'_'
                | b'~'
                | b':'
                | b'/'
                | b'?'
                | b'#'
                | b'['
                | b']'
                | b'@'
                | b'!'
                | b'$'
                | b'&'
                | b'\''
                | b'('
                | b')'
                | b'*'
                | b'+'
                | b','
                | b';'
                | b'='
                | b'%'
        )
}

/// What the matcher wants the engine to do after a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UriMatchEvent {
    None,
    /// A protocol was recognized; the URI starts `lookback`
    /// characters before the current one (the colon).
    Start { lookback: usize },
    /// The URI ended just before the current character.
    Finished,
    /// The candidate turned out not to be a URI.
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchState {
    Idle,
    InUri,
}

#[derive(Debug)]
pub struct UriMatcher {
    trie: ReverseTrie,
    window: Vec<u8>,
    state: MatchState,
    uri: Vec<u8>,
    /// Minimum body length before a finish counts as a real URI.
    min_body: usize,
}

impl UriMatcher {
    pub fn new(protocols: &[String]) -> Self {
        UriMatcher {
            trie: ReverseTrie::new(protocols),
            window: Vec::with_capacity(MAX_PROTOCOL_LEN),
            state: MatchState::Idle,
            uri: Vec::new(),
            min_body: 3,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == MatchState::InUri
    }

    /// Feed one printed character (sub-0x80; anything else aborts a
    /// match in progress and clears the window).
    pub fn advance(&mut self, b: u8) -> UriMatchEvent {
        match self.state {
            MatchState::Idle => {
                if b == b':' {
                    if let Some(len) = self.trie.match_suffix(&self.window) {
                        self.state = MatchState::InUri;
                        self.uri.clear();
                        let start = self.window.len() - len;
                        self.uri.extend_from_slice(&self.window[start..]);
                        self.uri.push(b':');
                        self.window.clear();
                        return UriMatchEvent::Start { lookback: len };
                    }
                }
                if b.is_ascii_alphanumeric() || b == b'+' || b == b'-' || b == b'.' {
                    if self.window.len() == MAX_PROTOCOL_LEN {
                        self.window.remove(0);
                    }
                    self.window.push(b);
                } else {
                    self.window.clear();
                }
                UriMatchEvent::None
            }
            MatchState::InUri => {
                if b < 0x80 && is_uri_char(b) {
                    self.uri.push(b);
                    UriMatchEvent::None
                } else {
                    self.finish()
                }
            }
        }
    }

    /// A control byte or any other interruption arrived.
    pub fn interrupt(&mut self) -> UriMatchEvent {
        self.window.clear();
        if self.state == MatchState::InUri {
            self.finish()
        } else {
            UriMatchEvent::None
        }
    }

    fn finish(&mut self) -> UriMatchEvent {
        self.state = MatchState::Idle;
        self.window.clear();
        let colon = self.uri.iter().position(|&b| b == b':').unwrap_or(0);
        if self.uri.len() >= colon + 1 + self.min_body {
            // Trailing punctuation rarely belongs to the URI.
            while matches!(self.uri.last(), Some(b'.') | Some(b',') | Some(b';') | Some(b')')) {
                self.uri.pop();
            }
            UriMatchEvent::Finished
        } else {
            self.uri.clear();
            UriMatchEvent::Abort
        }
    }

    /// The matched URI after a `Finished` event.
    pub fn take_uri(&mut self) -> String {
        String::from_utf8_lossy(&std::mem::take(&mut self.uri)).into_owned()
    }

    /// Cells occupied by the match so far, counting from the protocol
    /// start; used to locate the end of the range.
    pub fn matched_len(&self) -> usize {
        self.uri.len()
    }

    pub fn reset(&mut self) {
        self.state = MatchState::Idle;
        self.window.clear();
        self.uri.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use k9::assert_equal as assert_eq;

    fn protocols() -> Vec<String> {
        vec!["http".into(), "https".into(), "file".into()]
    }

    fn feed(m: &mut UriMatcher, s: &str) -> Vec<UriMatchEvent> {
        s.bytes().map(|b| m.advance(b)).collect()
    }

    #[test]
    fn detects_protocol_at_colon() {
        let mut m = UriMatcher::new(&protocols());
        let events = feed(&mut m, "see https:");
        assert_eq!(events[9], UriMatchEvent::Start { lookback: 5 });
        assert!(m.is_active());
    }

    #[test]
    fn longest_protocol_wins() {
        let mut m = UriMatcher::new(&protocols());
        // "https" must match over the shorter "http".
        feed(&mut m, "https");
        assert_eq!(m.advance(b':'), UriMatchEvent::Start { lookback: 5 });
    }

    #[test]
    fn full_match_round() {
        let mut m = UriMatcher::new(&protocols());
        feed(&mut m, "go to https://example.com/x?q=1 now");
        // The space after the URI finished it.
        assert_eq!(m.take_uri(), "https://example.com/x?q=1");
    }

    #[test]
    fn control_interrupt_finishes() {
        let mut m = UriMatcher::new(&protocols());
        feed(&mut m, "http://host/path");
        assert_eq!(m.interrupt(), UriMatchEvent::Finished);
        assert_eq!(m.take_uri(), "http://host/path");
    }

    #[test]
    fn short_body_aborts() {
        let mut m = UriMatcher::new(&protocols());
        feed(&mut m, "http:");
        assert_eq!(m.advance(b' '), UriMatchEvent::Abort);
        assert_eq!(m.take_uri(), "");
    }

    #[test]
    fn unknown_protocol_never_starts() {
        let mut m = UriMatcher::new(&protocols());
        let events = feed(&mut m, "gopher://x");
        assert!(events.iter().all(|&e| e == UriMatchEvent::None));
        assert!(!m.is_active());
    }

    #[test]
    fn trailing_punctuation_is_trimmed() {
        let mut m = UriMatcher::new(&protocols());
        feed(&mut m, "(https://example.com).");
        m.interrupt();
        assert_eq!(m.take_uri(), "https://example.com");
    }
}
