//! Configuration supplied by the embedding application.
//!
//! The engine holds an `Arc<dyn TerminalConfiguration>` and consults it
//! live, so the host can swap settings under a running terminal.  Every
//! method has a sensible default; a unit struct is a valid config.

use crate::input::{KeyMap, KeyModifiers, ModifyOtherFormat};

/// Bell loudness as understood by DECSWBV/DECSMBV: 0 is off, 1..8 low,
/// above that high.
pub type BellVolume = u8;

pub trait TerminalConfiguration: std::fmt::Debug + Send + Sync {
    /// Maximum number of scrollback lines retained on the primary
    /// screen.
    fn scrollback_size(&self) -> usize {
        10000
    }

    /// Answer to ENQ; empty disables the answerback entirely.
    fn answerback_string(&self) -> String {
        String::new()
    }

    /// Emulated terminal generation, e.g. 420 for a VT420.  Level 0
    /// boots straight into VT52 mode.
    fn vt_version(&self) -> u16 {
        420
    }

    fn utf8(&self) -> bool {
        true
    }

    /// Allow DECNRCM and the national replacement character sets.
    fn enable_nrcs(&self) -> bool {
        true
    }

    /// The charset used to encode keyboard input when UTF-8 is off and
    /// NRCS is enabled.
    fn keyboard_charset(&self) -> crate::nrcs::Charset {
        crate::nrcs::Charset::Ascii
    }

    /// Permit DECCOLM to switch between 80 and 132 columns.
    fn enable_columns_132(&self) -> bool {
        true
    }

    /// Gate for XTWINOPS: resize, report and title stack operations.
    fn allow_window_ops(&self) -> bool {
        false
    }

    fn allow_altscreen(&self) -> bool {
        true
    }

    fn tab_width(&self) -> usize {
        8
    }

    fn autowrap(&self) -> bool {
        true
    }

    /// Warning bell volume.  Configuration loaders historically spell
    /// both this and [`margin_bell_volume`](Self::margin_bell_volume)
    /// as `"bell"`; they are nonetheless independent settings.
    fn bell_volume(&self) -> BellVolume {
        8
    }

    fn margin_bell_volume(&self) -> BellVolume {
        0
    }

    /// Column (from the right margin) at which the margin bell rings.
    fn margin_bell_column(&self) -> usize {
        10
    }

    /// Rows of accumulated scroll before a smooth-scroll flush is
    /// requested from the window.
    fn smooth_scroll_step(&self) -> usize {
        1
    }

    fn scroll_on_input(&self) -> bool {
        true
    }

    fn scroll_on_output(&self) -> bool {
        false
    }

    /// Keep the selection ownership when the clipboard changes hands.
    fn keep_clipboard(&self) -> bool {
        false
    }

    /// Rewrite LF to CR in pasted text unless mode 2006 asked for
    /// literal newlines.
    fn paste_literal_nl(&self) -> bool {
        false
    }

    /// Keyboard layout family for function and keypad keys.
    fn keyboard_mapping(&self) -> KeyMap {
        KeyMap::Default
    }

    /// modifyCursorKeys resource level, 0..4.
    fn modify_cursor(&self) -> u8 {
        3
    }

    /// modifyFunctionKeys resource level, 0..4.
    fn modify_function(&self) -> u8 {
        3
    }

    /// modifyKeypadKeys resource level, 0..4.
    fn modify_keypad(&self) -> u8 {
        0
    }

    /// modifyOtherKeys resource level, 0..2.
    fn modify_other(&self) -> u8 {
        0
    }

    fn modify_other_format(&self) -> ModifyOtherFormat {
        ModifyOtherFormat::Xterm
    }

    /// F-key code increment applied when Ctrl/Shift shift the
    /// function row (legacy keyboards).
    fn fkey_increment(&self) -> u8 {
        10
    }

    fn has_meta(&self) -> bool {
        true
    }

    /// Meta sends `ESC` prefix rather than setting the eighth bit.
    fn meta_is_escape(&self) -> bool {
        true
    }

    fn backspace_is_delete(&self) -> bool {
        true
    }

    fn delete_is_delete(&self) -> bool {
        false
    }

    fn app_cursor(&self) -> bool {
        false
    }

    fn app_keypad(&self) -> bool {
        false
    }

    fn allow_numlock(&self) -> bool {
        true
    }

    /// Holding this modifier bypasses application mouse reporting so
    /// local selection keeps working.
    fn force_mouse_modifier(&self) -> KeyModifiers {
        KeyModifiers::SHIFT
    }

    /// Protocol prefixes recognized by the URI auto matcher.  An empty
    /// list disables matching.
    fn uri_protocols(&self) -> Vec<String> {
        ["http", "https", "ftp", "file", "mailto"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// Word characters for double-click selection, in addition to
    /// alphanumerics.
    fn word_chars(&self) -> String {
        "_-./?&#%".to_string()
    }

    /// Log otherwise-silently-dropped malformed or unknown sequences.
    fn trace_controls(&self) -> bool {
        false
    }

    fn term_name(&self) -> String {
        "xterm-256color".to_string()
    }

    fn term_version(&self) -> u16 {
        1
    }
}

/// Plain defaults; useful for tests and simple embeddings.
#[derive(Debug, Default)]
pub struct DefaultConfiguration;

impl TerminalConfiguration for DefaultConfiguration {}
