//! Device report encoders and their matching decoders: DA, DSR,
//! DECRQSS/DECRPSS, DECCIR and DECTABSR.

use crate::input::KeyMap;
use crate::nrcs::{self, Charset};
use crate::terminalstate::TerminalState;
use crate::{CSI, DCS, ST};
use cellgrid::{Attr, Color, Underline};
use std::fmt::Write as _;

/// Render an SGR parameter string reproducing `attr`; the inverse of
/// the SGR dispatcher, used by DECRPSS.
pub(crate) fn encode_sgr(attr: &Attr) -> String {
    let mut out = String::from("0");
    if attr.bold() {
        out.push_str(";1");
    }
    if attr.faint() {
        out.push_str(";2");
    }
    if attr.italic() {
        out.push_str(";3");
    }
    match attr.underline() {
        Underline::None => {}
        Underline::Single => out.push_str(";4"),
        Underline::Double => out.push_str(";21"),
        Underline::Curly => out.push_str(";4:3"),
    }
    if attr.blink() {
        out.push_str(";5");
    }
    if attr.reverse() {
        out.push_str(";7");
    }
    if attr.invisible() {
        out.push_str(";8");
    }
    if attr.strikethrough() {
        out.push_str(";9");
    }

    let mut color = |c: Color, base: u32| match c {
        Color::Palette(idx) if idx < 8 => write!(&mut out, ";{}", base + idx as u32).ok(),
        Color::Palette(idx) if (8..16).contains(&idx) => {
            write!(&mut out, ";{}", base + 60 + (idx - 8) as u32).ok()
        }
        Color::Palette(idx) if idx < 256 => write!(&mut out, ";{}:5:{}", base + 8, idx).ok(),
        Color::Palette(_) => None,
        Color::Direct(rgba) => write!(
            &mut out,
            ";{}:2::{}:{}:{}",
            base + 8,
            rgba.r(),
            rgba.g(),
            rgba.b()
        )
        .ok(),
    };
    color(attr.fg, 30);
    color(attr.bg, 40);
    out
}

impl TerminalState {
    pub(crate) fn report_da1(&mut self) {
        if self.vt_version() < 200 {
            let reply = match self.vt_version() {
                125 => format!("{}?12;2;0;10c", CSI),
                102 => format!("{}?6c", CSI),
                101 => format!("{}?1;0c", CSI),
                _ => format!("{}?1;2c", CSI),
            };
            self.answerback(&reply);
        } else {
            let udk = if self.kstate.mapping == KeyMap::Vt220 {
                ";8"
            } else {
                ""
            };
            let high = if self.vt_level() >= 4 {
                ";16;17;18;21;22;28;29"
            } else {
                ";22;29"
            };
            let reply = format!(
                "{}?{};1;2;6{};9;15{}c",
                CSI,
                60 + self.vt_version() / 100,
                udk,
                high
            );
            self.answerback(&reply);
        }
    }

    pub(crate) fn report_da2(&mut self) {
        let ver = match self.vt_version() {
            100 => 0,
            220 => 1,
            240 => 2,
            330 => 18,
            340 => 19,
            320 => 24,
            420 => 41,
            510 => 61,
            520 => 64,
            525 => 65,
            _ => 41,
        };
        let firmware = self.config().term_version();
        self.answerback(&format!("{}>{};{};0c", CSI, ver, firmware));
    }

    pub(crate) fn report_da3(&mut self) {
        // DECREPTUI site code.
        self.answerback(&format!("{}!|00000000{}", DCS, ST));
    }

    pub(crate) fn report_decdsr(&mut self, params: &vtscan::Params) {
        match params.get(0, 0) {
            6 => {
                // DECXCPR
                let row = self.screen.c.y + 1 - self.screen.min_oy();
                let col = self.screen.c.x + 1 - self.screen.min_ox();
                let page = if self.vt_level() >= 4 { ";1" } else { "" };
                self.answerback(&format!("{}?{};{}{}R", CSI, row, col, page));
            }
            15 => {
                if self.vt_level() >= 2 {
                    let reply = if self.printer_available() {
                        format!("{}?10n", CSI)
                    } else {
                        format!("{}?13n", CSI)
                    };
                    self.answerback(&reply);
                }
            }
            25 => {
                if self.vt_level() >= 2 {
                    let locked = 20 + self.kstate.udk_locked as u32;
                    self.answerback(&format!("{}?{}n", CSI, locked));
                }
            }
            26 => {
                if self.vt_level() >= 2 {
                    let tail = if self.vt_level() >= 4 {
                        ";0;0"
                    } else if self.vt_level() >= 3 {
                        ";0"
                    } else {
                        ""
                    };
                    self.answerback(&format!("{}?27;1{}n", CSI, tail));
                }
            }
            53 | 55 => {
                if self.vt_level() >= 4 {
                    self.answerback(&format!("{}?53n", CSI));
                }
            }
            56 => {
                if self.vt_level() >= 4 {
                    // Locator type: standard.
                    self.answerback(&format!("{}?57;1n", CSI));
                }
            }
            _ => log::trace!("unhandled DECDSR {:?}", params.as_slice()),
        }
    }

    /// DECRQSS: request a setting's current value.  Unsupported
    /// settings answer with the invalid form `DCS 0 $ r ST`.
    pub(crate) fn decrqss(&mut self, data: &[u8]) {
        let reply = match data {
            b"m" => Some(format!("{}m", encode_sgr(&self.screen.sgr))),
            b"r" => Some(format!(
                "{};{}r",
                self.screen.min_y() + 1,
                self.screen.max_y()
            )),
            b"s" => Some(format!(
                "{};{}s",
                self.screen.min_x() + 1,
                self.screen.max_x()
            )),
            b"\"p" => Some(format!(
                "{};{}\"p",
                60 + self.vt_level() as u16,
                if self.mode.eight_bit { 2 } else { 1 }
            )),
            b"\"q" => Some(format!(
                "{}\"q",
                self.screen.sgr.protected() as u8
            )),
            b" q" => Some(format!("{} q", self.cursor_shape)),
            b"t" => Some(format!("{}t", self.screen.height())),
            b"$|" => Some(format!("{}$|", self.screen.width())),
            _ => None,
        };
        match reply {
            Some(body) => self.answerback(&format!("{}1$r{}{}", DCS, body, ST)),
            None => {
                log::trace!("DECRQSS for unsupported setting {:?}", data);
                self.answerback(&format!("{}0$r{}", DCS, ST));
            }
        }
    }

    /// DECCIR: cursor information report.
    pub(crate) fn report_cursor_info(&mut self) {
        let sgr = &self.screen.sgr;
        let c = &self.screen.c;

        let mut srend = 0x40u8;
        if sgr.bold() {
            srend |= 1;
        }
        if sgr.underline() != Underline::None {
            srend |= 2;
        }
        if sgr.blink() {
            srend |= 4;
        }
        if sgr.reverse() {
            srend |= 8;
        }

        let sprot = 0x40 + sgr.protected() as u8;

        let mut sflag = 0x40u8;
        if c.origin {
            sflag |= 1;
        }
        if c.gl_ss == 2 && c.gl != 2 {
            sflag |= 2;
        }
        if c.gl_ss == 3 && c.gl != 3 {
            sflag |= 4;
        }
        if c.pending {
            sflag |= 8;
        }

        let mut cg96 = 0x40u8;
        for (i, &gn) in c.gn.iter().enumerate() {
            if gn.is_96() {
                cg96 |= 1 << i;
            }
        }

        let reply = format!(
            "{}1$u{};{};1;{};{};{};{};{};{};{}{}{}{}{}",
            DCS,
            c.y + 1,
            c.x + 1,
            srend as char,
            sprot as char,
            sflag as char,
            c.gl,
            c.gr,
            cg96 as char,
            nrcs::unparse(c.gn[0]),
            nrcs::unparse(c.gn[1]),
            nrcs::unparse(c.gn[2]),
            nrcs::unparse(c.gn[3]),
            ST
        );
        self.answerback(&reply);
    }

    /// Decode a DECCIR payload (DECRSPS restore).  Only the state the
    /// report carries is touched; colors and the like stay as they
    /// are.
    pub(crate) fn parse_cursor_report(&mut self, data: &[u8]) -> bool {
        let text = match std::str::from_utf8(data) {
            Ok(text) => text,
            Err(_) => return false,
        };
        let mut fields = text.split(';');
        let mut num = |lim: usize| -> Option<usize> {
            fields.next()?.parse::<usize>().ok().map(|v| v.min(lim))
        };

        let row = match num(self.screen.height()) {
            Some(v) if v >= 1 => v,
            _ => return false,
        };
        let col = match num(self.screen.width()) {
            Some(v) if v >= 1 => v,
            _ => return false,
        };
        if num(9).is_none() {
            // Page number; always 1.
            return false;
        }

        let mut byte_field = |fields: &mut std::str::Split<char>| -> Option<u8> {
            let f = fields.next()?;
            let b = *f.as_bytes().first()?;
            (0x40..0x80).contains(&b).then(|| b)
        };
        let srend = match byte_field(&mut fields) {
            Some(b) => b,
            None => return false,
        };
        let sprot = match byte_field(&mut fields) {
            Some(b) => b,
            None => return false,
        };
        let sflag = match byte_field(&mut fields) {
            Some(b) => b,
            None => return false,
        };

        let gl = match fields.next().and_then(|f| f.parse::<usize>().ok()) {
            Some(v) if v < 4 => v,
            _ => return false,
        };
        let gr = match fields.next().and_then(|f| f.parse::<usize>().ok()) {
            Some(v) if v < 4 => v,
            _ => return false,
        };
        let cg96 = match byte_field(&mut fields) {
            Some(b) => b,
            None => return false,
        };

        // Remaining: concatenated designators for G0..G3.
        let desig = fields.next().unwrap_or("");
        let mut sets = [Charset::Ascii; 4];
        let mut bytes = desig.bytes().peekable();
        for (i, slot) in sets.iter_mut().enumerate() {
            let first = match bytes.next() {
                Some(b) => b,
                None => return false,
            };
            let (i1, fin) = if (0x20..0x30).contains(&first) {
                match bytes.next() {
                    Some(f) => (Some(first), f),
                    None => return false,
                }
            } else {
                (None, first)
            };
            let is96 = cg96 & (1 << i) != 0;
            match nrcs::parse(fin, i1, is96, self.vt_level(), self.mode.enable_nrcs) {
                Some(cs) => *slot = cs,
                None => return false,
            }
        }

        // Everything decoded; apply.
        let sgr = &mut self.screen.sgr;
        sgr.set_bold(srend & 1 != 0);
        sgr.set_underline(if srend & 2 != 0 {
            Underline::Single
        } else {
            Underline::None
        });
        sgr.set_blink(srend & 4 != 0);
        sgr.set_reverse(srend & 8 != 0);
        sgr.set_protected(sprot & 1 != 0);

        self.screen.c.origin = sflag & 1 != 0;
        self.screen.move_to(col as isize - 1, row as isize - 1);
        self.screen.c.pending = sflag & 8 != 0;
        self.screen.c.gn = sets;
        self.screen.c.gl = gl;
        self.screen.c.gr = gr;
        self.screen.c.gl_ss = if sflag & 2 != 0 {
            2
        } else if sflag & 4 != 0 {
            3
        } else {
            gl
        };
        true
    }

    /// DECTABSR: tab stop report.
    pub(crate) fn report_tabs(&mut self) {
        let mut tabs = String::new();
        for x in 0..self.screen.width() {
            if self.screen.has_tab(x) {
                if !tabs.is_empty() {
                    tabs.push('/');
                }
                write!(&mut tabs, "{}", x + 1).ok();
            }
        }
        self.answerback(&format!("{}2$u{}{}", DCS, tabs, ST));
    }

    /// Decode a DECTABSR payload.
    pub(crate) fn parse_tabs_report(&mut self, data: &[u8]) -> bool {
        let text = match std::str::from_utf8(data) {
            Ok(text) => text,
            Err(_) => return false,
        };
        let mut stops = Vec::new();
        for field in text.split('/') {
            if field.is_empty() {
                continue;
            }
            match field.parse::<usize>() {
                Ok(v) if v >= 1 => stops.push(v - 1),
                _ => return false,
            }
        }
        self.screen.clear_tabs();
        for stop in stops {
            self.screen.set_tab(stop, true);
        }
        true
    }
}
