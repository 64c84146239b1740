//! The data model backing a terminal screen: compact code points,
//! cells, graphic attributes with per-line interning, reference counted
//! URIs, variable width lines kept in slab pools, stable line handles
//! and per-line selection segments.
//!
//! This crate knows nothing about escape sequences or cursor movement;
//! it owns memory and invariants.  The emulation engine drives it.
#![allow(clippy::upper_case_acronyms)]

pub mod cell;
pub mod codepoint;
pub mod color;
pub mod line;
pub mod pool;
pub mod selection;
pub mod uri;

pub use cell::{Attr, AttrTable, Cell, Underline};
pub use codepoint::{compact, is_combining, is_wide, try_precompose, uncompact, uncompact_char};
pub use color::{Color, Rgba, PALETTE_SIZE, SPECIAL_BG, SPECIAL_CURSOR_BG, SPECIAL_CURSOR_FG, SPECIAL_FG};
pub use line::{HandleId, Line, LineId, LineSpan, LineStore, MAX_LINE_LEN};
pub use pool::{MultiPool, PoolAddr};
pub use selection::{SegmentList, SelectionStore, SNAP_RIGHT};
pub use uri::{UriId, UriTable};
