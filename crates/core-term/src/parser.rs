//! Byte-stream tokenizer: PTY bytes in, [`Command`]s out.
//!
//! A sub-state machine with Text / Control / Esc / OSC / CSI / DCS
//! states, each having enter/exit/consume steps. `consume` reports
//! whether the byte was eaten; a refused byte is re-routed through the
//! newly entered state, so no byte is ever silently dropped on a
//! transition. No screen interaction happens here.

use crate::command::*;
use crate::cursor::CursorMode;
use crate::color::Color;

const TEXT_STOCK_SIZE: usize = 16384;
const MAX_CSI_PARAMS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EscState {
    Text,
    Control,
    Esc,
    Osc,
    Csi,
    Dcs,
}

#[derive(Default)]
struct OscState {
    buffer: String,
    got_esc: bool,
}

pub struct Parser {
    state: EscState,
    text: Vec<u8>,
    esc_hash: bool,
    osc: OscState,
    csi: String,
    dcs: String,
    output: Vec<Command>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub fn new() -> Self {
        Self {
            state: EscState::Text,
            text: Vec::with_capacity(256),
            esc_hash: false,
            osc: OscState::default(),
            csi: String::new(),
            dcs: String::new(),
            output: Vec::new(),
        }
    }

    /// Consumes a chunk of bytes and returns the commands recognised so
    /// far. A trailing partial UTF-8 sequence is carried over into the
    /// next call.
    pub fn parse(&mut self, bytes: &[u8]) -> Vec<Command> {
        for &byte in bytes {
            self.eat_byte(byte);
        }
        self.flush_complete_text();
        std::mem::take(&mut self.output)
    }

    fn eat_byte(&mut self, byte: u8) {
        loop {
            let before = self.state;
            let consumed = match self.state {
                EscState::Text => self.text_consume(byte),
                EscState::Control => self.control_consume(byte),
                EscState::Esc => self.esc_consume(byte),
                EscState::Osc => self.osc_consume(byte),
                EscState::Csi => self.csi_consume(byte),
                EscState::Dcs => self.dcs_consume(byte),
            };
            if consumed {
                return;
            }
            debug_assert_ne!(before, self.state, "a refusing state must transition");
        }
    }

    fn switch_to(&mut self, state: EscState) {
        if self.state == state {
            return;
        }
        // exit the old state
        match self.state {
            EscState::Text => self.flush_all_text(),
            EscState::Osc => self.osc_submit(),
            EscState::Csi => self.csi_submit(),
            EscState::Dcs => self.dcs_submit(),
            EscState::Control | EscState::Esc => {}
        }
        self.state = state;
        // enter the new one
        match state {
            EscState::Text => self.text.clear(),
            EscState::Esc => self.esc_hash = false,
            EscState::Osc => {
                self.osc.buffer.clear();
                self.osc.got_esc = false;
            }
            EscState::Csi => self.csi.clear(),
            EscState::Dcs => self.dcs.clear(),
            EscState::Control => {}
        }
    }

    fn reset(&mut self) {
        self.switch_to(EscState::Text);
    }

    // -----------------------------------------------------------------
    // Text
    // -----------------------------------------------------------------

    fn text_consume(&mut self, byte: u8) -> bool {
        if byte < 32 {
            self.switch_to(EscState::Control);
            return false;
        }
        if self.text.len() < TEXT_STOCK_SIZE {
            self.text.push(byte);
        }
        true
    }

    fn flush_all_text(&mut self) {
        if self.text.is_empty() {
            return;
        }
        let characters = String::from_utf8_lossy(&self.text).into_owned();
        self.output.push(Command::Text(characters));
        self.text.clear();
    }

    /// Emits only the complete UTF-8 prefix, keeping a trailing partial
    /// sequence for the next input chunk.
    fn flush_complete_text(&mut self) {
        if self.text.is_empty() {
            return;
        }
        let valid_length = match std::str::from_utf8(&self.text) {
            Ok(_) => self.text.len(),
            Err(err) => err.valid_up_to(),
        };
        if valid_length == 0 {
            return;
        }
        let characters =
            String::from_utf8(self.text[..valid_length].to_vec()).expect("validated prefix");
        self.text.drain(..valid_length);
        self.output.push(Command::Text(characters));
    }

    // -----------------------------------------------------------------
    // Control
    // -----------------------------------------------------------------

    fn control_consume(&mut self, byte: u8) -> bool {
        if byte < 32 {
            match byte {
                7 => {
                    self.switch_to(EscState::Text);
                    self.output.push(Command::Bell);
                }
                8 => {
                    self.switch_to(EscState::Text);
                    self.output.push(Command::BackSpace);
                }
                9 => {
                    self.switch_to(EscState::Text);
                    self.output.push(Command::HorizontalTab(1));
                }
                10 | 11 | 12 => {
                    self.switch_to(EscState::Text);
                    self.output.push(Command::LineFeed);
                }
                13 => {
                    self.switch_to(EscState::Text);
                    self.output.push(Command::CarriageReturn);
                }
                14 => {
                    self.switch_to(EscState::Text);
                    self.output.push(Command::SelectCharacterSet(1));
                }
                15 => {
                    self.switch_to(EscState::Text);
                    self.output.push(Command::SelectCharacterSet(0));
                }
                27 => {
                    self.switch_to(EscState::Esc);
                }
                _ => {
                    // the remaining C0 codes are ignored
                    self.switch_to(EscState::Text);
                }
            }
            return true;
        }
        self.switch_to(EscState::Text);
        false
    }

    // -----------------------------------------------------------------
    // Esc
    // -----------------------------------------------------------------

    fn esc_consume(&mut self, byte: u8) -> bool {
        if byte == b'#' {
            self.esc_hash = true;
            return true;
        }

        let hash = self.esc_hash;
        self.switch_to(EscState::Text);
        match byte {
            b'[' => {
                self.switch_to(EscState::Csi);
                true
            }
            b']' => {
                self.switch_to(EscState::Osc);
                true
            }
            // numeric / application keypad: recognised and ignored
            b'>' | b'=' => true,
            // DECSC, save cursor position, rendition and character set
            b'7' => {
                self.output.push(Command::SaveState);
                true
            }
            // ESC # 8 is DECALN, plain ESC 8 is DECRC
            b'8' => {
                if hash {
                    self.output.push(Command::ScreenAlignmentTest);
                } else {
                    self.output.push(Command::RestoreState);
                }
                true
            }
            // IND, move down one line scrolling at the bottom margin
            b'D' => {
                self.output.push(Command::LineFeed);
                true
            }
            // NEL, move to the first position of the next line
            b'E' => {
                self.output.push(Command::CarriageReturn);
                self.output.push(Command::LineFeed);
                true
            }
            // HTS, set a horizontal stop at the active position
            b'H' => {
                self.output.push(Command::SetTab);
                true
            }
            // RI, move up one line scrolling at the top margin
            b'M' => {
                self.output.push(Command::ReverseIndex);
                true
            }
            // RIS, reset to the power-on state
            b'c' => {
                self.reset();
                self.output.push(Command::Reset);
                true
            }
            b'(' | b')' | b'*' | b'+' => {
                self.switch_to(EscState::Dcs);
                false
            }
            _ => {
                tracing::warn!(target: "term.parser", byte, "unhandled_esc_byte");
                true
            }
        }
    }

    // -----------------------------------------------------------------
    // OSC
    // -----------------------------------------------------------------

    fn osc_consume(&mut self, byte: u8) -> bool {
        // OSC Ps ; Pt BEL  |  OSC Ps ; Pt ST
        if self.osc.got_esc {
            if byte != b'\\' {
                self.osc.buffer.clear();
            }
            self.switch_to(EscState::Text);
        } else if byte >= 32 {
            self.osc.buffer.push(byte as char);
        } else if byte == 0x07 {
            self.switch_to(EscState::Text);
        } else if byte == 0x1B {
            self.osc.got_esc = true;
        } else {
            self.osc.buffer.clear();
            self.switch_to(EscState::Text);
        }
        true
    }

    fn osc_submit(&mut self) {
        let buffer = std::mem::take(&mut self.osc.buffer);
        let Some(semicolon) = buffer.find(';') else {
            return;
        };
        let Ok(ps) = buffer[..semicolon].parse::<u32>() else {
            return;
        };
        let pt = &buffer[semicolon + 1..];

        // only the title-changing requests are understood
        let kind = match ps {
            0 => TitleKind::IconAndWindow,
            1 => TitleKind::Icon,
            2 => TitleKind::Window,
            _ => {
                tracing::warn!(target: "term.parser", ps, pt, "unhandled_osc_request");
                return;
            }
        };
        self.output.push(Command::ChangeTitle(Title {
            kind,
            title: pt.to_string(),
        }));
    }

    // -----------------------------------------------------------------
    // CSI
    // -----------------------------------------------------------------

    fn csi_consume(&mut self, byte: u8) -> bool {
        const VALID_CONTENTS: &[u8] = b"01234567890; ?>=!\"'$#*";
        const VALID_TERMINAL: &[u8] = b"@ABCDEFGHIJKLMPSTXZ^`abcdefghilmnpqrstuvwxyz{|}~";

        if byte < 32 {
            return self.embedded_control_consume(byte);
        }
        if VALID_CONTENTS.contains(&byte) {
            self.csi.push(byte as char);
            return true;
        }
        if VALID_TERMINAL.contains(&byte) {
            self.csi.push(byte as char);
            self.switch_to(EscState::Text);
            return true;
        }
        self.csi.clear();
        self.switch_to(EscState::Text);
        false
    }

    /// C0 bytes arriving inside a control sequence still act.
    fn embedded_control_consume(&mut self, byte: u8) -> bool {
        match byte {
            8 => self.output.push(Command::BackSpace),
            10 | 11 | 12 => self.output.push(Command::LineFeed),
            13 => self.output.push(Command::CarriageReturn),
            _ => {}
        }
        true
    }

    fn csi_submit(&mut self) {
        let buffer = std::mem::take(&mut self.csi);
        if buffer.is_empty() {
            return;
        }
        match buffer.as_bytes()[buffer.len() - 1] {
            b'A' => self.csi_relative_move(&buffer, 0, -1),
            b'B' => self.csi_relative_move(&buffer, 0, 1),
            b'C' => self.csi_relative_move(&buffer, 1, 0),
            b'D' => self.csi_relative_move(&buffer, -1, 0),
            b'E' => self.csi_next_line(&buffer, 1),
            b'F' => self.csi_next_line(&buffer, -1),
            b'G' => self.csi_cha(&buffer),
            b'H' | b'f' => self.csi_cup(&buffer),
            b'I' => self.csi_cht(&buffer, 1),
            b'J' => self.csi_ed(&buffer),
            b'K' => self.csi_el(&buffer),
            b'L' => self.output.push(Command::InsertLines(first_int(&buffer, 1))),
            b'M' => self.output.push(Command::DeleteLines(first_int(&buffer, 1))),
            b'P' => self.output.push(Command::DeleteCharacters(first_int(&buffer, 1))),
            b'S' => self.output.push(Command::ScrollLines(first_int(&buffer, 1) as i32)),
            b'T' => self.output.push(Command::ScrollLines(-(first_int(&buffer, 1) as i32))),
            b'X' => self
                .output
                .push(Command::EraseCharacters(first_int(&buffer, 1).max(1))),
            b'Z' => self.csi_cht(&buffer, -1),
            b'a' => self.csi_hpr(&buffer),
            b'b' => self.output.push(Command::RepeatLastCharacter(first_int(&buffer, 1))),
            b'c' => self.csi_da(&buffer),
            b'd' => self.csi_vpa(&buffer),
            b'e' => self.csi_vpr(&buffer),
            b'g' => self.csi_tbc(&buffer),
            b'h' | b'l' => self.csi_mode_change(&buffer),
            b'm' => self.csi_sgr(&buffer),
            b'n' => self.csi_dsr(&buffer),
            b'q' => self.csi_decscusr(&buffer),
            b'r' => self.csi_decstbm(&buffer),
            b't' => self.csi_title_manipulation(&buffer),
            b'`' => self.csi_hpa(&buffer),
            b'@' => self.output.push(Command::InsertCharacters(first_int(&buffer, 1))),
            _ => {
                tracing::warn!(target: "term.parser", request = %buffer, "unhandled_csi_request");
            }
        }
    }

    fn csi_relative_move(&mut self, buffer: &str, dx: i32, dy: i32) {
        let amount = first_int(buffer, 1).max(1) as i32;
        self.output.push(Command::MoveCursor(CursorMovement {
            positioning: Positioning::Relative,
            x: Some(dx * amount),
            y: Some(dy * amount),
        }));
    }

    /// CNL / CPL: move by rows, then to column 1.
    fn csi_next_line(&mut self, buffer: &str, direction: i32) {
        let amount = first_int(buffer, 1) as i32;
        self.output.push(Command::MoveCursor(CursorMovement {
            positioning: Positioning::Relative,
            x: None,
            y: Some(direction * amount),
        }));
        self.output.push(Command::MoveCursor(CursorMovement {
            positioning: Positioning::Absolute,
            x: Some(0),
            y: None,
        }));
    }

    /// CHA: cursor character absolute [column].
    fn csi_cha(&mut self, buffer: &str) {
        let params = scan_params(buffer);
        let x = if params.count >= 1 { params.values[0].saturating_sub(1) } else { 0 };
        self.output.push(Command::MoveCursor(CursorMovement {
            positioning: Positioning::Absolute,
            x: Some(x as i32),
            y: None,
        }));
    }

    /// CUP: cursor position [row;column], 1-based.
    fn csi_cup(&mut self, buffer: &str) {
        let params = scan_params(buffer);
        let (mut x, mut y) = (0, 0);
        if params.count == 2 {
            y = params.values[0].saturating_sub(1) as i32;
            x = params.values[1].saturating_sub(1) as i32;
        }
        self.output.push(Command::MoveCursor(CursorMovement {
            positioning: Positioning::Absolute,
            x: Some(x),
            y: Some(y),
        }));
    }

    /// CHT / CBT: forward or backward tabulation.
    fn csi_cht(&mut self, buffer: &str, direction: i32) {
        let amount = first_int(buffer, 1) as i32;
        self.output.push(Command::HorizontalTab(direction * amount));
    }

    fn csi_ed(&mut self, buffer: &str) {
        let erasure = match first_int(buffer, 0) {
            0 => DisplayErasure::FromCursorToDisplayEnd,
            1 => DisplayErasure::FromDisplayStartToCursor,
            2 => DisplayErasure::WholeDisplay,
            3 => DisplayErasure::WholeDisplayWithScrollback,
            _ => return,
        };
        self.output.push(Command::EraseInDisplay(erasure));
    }

    fn csi_el(&mut self, buffer: &str) {
        let erasure = match first_int(buffer, 0) {
            0 => LineErasure::FromCursorToLineEnd,
            1 => LineErasure::FromLineStartToCursor,
            2 => LineErasure::WholeLine,
            _ => return,
        };
        self.output.push(Command::EraseInLine(erasure));
    }

    /// HPR: character position relative [columns].
    fn csi_hpr(&mut self, buffer: &str) {
        let amount = first_int(buffer, 1) as i32;
        self.output.push(Command::MoveCursor(CursorMovement {
            positioning: Positioning::Relative,
            x: Some(amount),
            y: None,
        }));
    }

    /// Primary DA: only the plain attribute request is recognised.
    fn csi_da(&mut self, buffer: &str) {
        if first_int(buffer, 0) == 0 && !buffer.starts_with('>') {
            self.output.push(Command::Report(DeviceReport::TerminalId));
        }
    }

    /// VPA: line position absolute [row].
    fn csi_vpa(&mut self, buffer: &str) {
        let y = first_int(buffer, 1).saturating_sub(1) as i32;
        self.output.push(Command::MoveCursor(CursorMovement {
            positioning: Positioning::Absolute,
            x: None,
            y: Some(y),
        }));
    }

    /// VPR: line position relative [rows].
    fn csi_vpr(&mut self, buffer: &str) {
        let amount = first_int(buffer, 1) as i32;
        self.output.push(Command::MoveCursor(CursorMovement {
            positioning: Positioning::Relative,
            x: None,
            y: Some(amount),
        }));
    }

    /// HPA: character position absolute [column].
    fn csi_hpa(&mut self, buffer: &str) {
        let x = first_int(buffer, 1).saturating_sub(1) as i32;
        self.output.push(Command::MoveCursor(CursorMovement {
            positioning: Positioning::Absolute,
            x: Some(x),
            y: None,
        }));
    }

    /// TBC: clear the current tab stop or all of them.
    fn csi_tbc(&mut self, buffer: &str) {
        match first_int(buffer, 0) {
            0 => self.output.push(Command::ClearTab(TabClear::CurrentColumn)),
            3 => self.output.push(Command::ClearTab(TabClear::All)),
            _ => {}
        }
    }

    /// SM / RM / DECSET / DECRST.
    fn csi_mode_change(&mut self, buffer: &str) {
        let on = buffer.ends_with('h');
        let dec = buffer.starts_with('?');
        let request = if dec { &buffer[1..] } else { buffer };

        let params = scan_params(request);
        for i in 0..params.count {
            let Some(mode) = mode_kind(params.values[i], dec) else {
                tracing::warn!(target: "term.parser", request = %buffer, "unhandled_mode_change");
                continue;
            };
            self.output
                .push(Command::ChangeMode(ModeChange { mode, status: on }));
        }
    }

    /// SGR with 8-bit and 24-bit color extensions.
    fn csi_sgr(&mut self, buffer: &str) {
        use CharacterAttributes as CA;
        let mut params = scan_params(buffer);
        if params.count == 0 {
            params.values[0] = 0;
            params.count = 1;
        }

        let mut i = 0;
        while i < params.count {
            let ps = params.values[i];
            if ps == 38 || ps == 48 {
                let make = |color: Color| {
                    if ps == 38 {
                        CA::ForegroundColor(color)
                    } else {
                        CA::BackgroundColor(color)
                    }
                };
                if i + 2 < params.count && params.values[i + 1] == 5 && params.values[i + 2] < 256 {
                    let color = Color(params.values[i + 2] as u8);
                    self.output.push(Command::SetCharacterAttributes(make(color)));
                } else if i + 4 < params.count
                    && params.values[i + 1] == 2
                    && params.values[i + 2..i + 5].iter().all(|v| *v < 256)
                {
                    let color = Color::from_rgb(
                        params.values[i + 2] as u8,
                        params.values[i + 3] as u8,
                        params.values[i + 4] as u8,
                    );
                    self.output.push(Command::SetCharacterAttributes(make(color)));
                } else {
                    tracing::warn!(target: "term.parser", request = %buffer, "malformed_sgr_color");
                }
                i += if i + 1 < params.count && params.values[i + 1] == 2 { 5 } else { 3 };
            } else if let Some(attributes) = sgr_attribute(ps) {
                self.output.push(Command::SetCharacterAttributes(attributes));
                i += 1;
            } else {
                tracing::warn!(target: "term.parser", request = %buffer, ps, "unhandled_sgr");
                i += 1;
            }
        }
    }

    /// DSR: status report / cursor position report.
    fn csi_dsr(&mut self, buffer: &str) {
        match first_int(buffer, 0) {
            5 => self.output.push(Command::Report(DeviceReport::DeviceStatus)),
            6 => self.output.push(Command::Report(DeviceReport::CursorPosition)),
            _ => {}
        }
    }

    /// DECSCUSR arrives as "Ps SP q".
    fn csi_decscusr(&mut self, buffer: &str) {
        let is_space = buffer.len() >= 2 && buffer.as_bytes()[buffer.len() - 2] == b' ';
        if !is_space {
            tracing::warn!(target: "term.parser", request = %buffer, "unhandled_csi_q");
            return;
        }
        let params = scan_params(buffer);
        let mode = if params.count == 1 { params.values[0] } else { 0 };
        let style = match mode {
            1 => Some(CursorMode::BlinkingBlock),
            2 => Some(CursorMode::SteadyBlock),
            3 => Some(CursorMode::BlinkingUnderline),
            4 => Some(CursorMode::SteadyUnderline),
            5 => Some(CursorMode::BlinkingBar),
            6 => Some(CursorMode::SteadyBar),
            _ => None,
        };
        self.output.push(Command::SetCursorStyle(style));
    }

    /// DECSTBM: set scrolling region [top;bottom], 1-based inclusive on
    /// the wire, half-open internally.
    fn csi_decstbm(&mut self, buffer: &str) {
        let params = scan_params(buffer);
        if params.count == 0 {
            self.output
                .push(Command::SetScrollingRegion(ScrollingRegion { range: None }));
        } else if params.count == 2 {
            let (top, bottom) = (params.values[0], params.values[1]);
            let range = if top >= 1 && bottom >= 1 && bottom > top {
                Some(((top - 1) as i32, bottom as i32))
            } else {
                None
            };
            self.output
                .push(Command::SetScrollingRegion(ScrollingRegion { range }));
        } else {
            tracing::warn!(target: "term.parser", request = %buffer, "unhandled_csi_r");
        }
    }

    /// XTWINOPS: only the title stack operations (22/23) are recognised.
    fn csi_title_manipulation(&mut self, buffer: &str) {
        let params = scan_params(buffer);
        if params.count != 2 {
            tracing::warn!(target: "term.parser", request = %buffer, "unhandled_csi_t");
            return;
        }
        let operation = match params.values[0] {
            22 => TitleOperation::Save,
            23 => TitleOperation::Restore,
            _ => {
                tracing::warn!(target: "term.parser", request = %buffer, "unhandled_csi_t");
                return;
            }
        };
        let target = match params.values[1] {
            0 => TitleTarget::Both,
            1 => TitleTarget::Icon,
            2 => TitleTarget::Window,
            _ => return,
        };
        self.output
            .push(Command::ManipulateTitle(TitleManipulation { target, operation }));
    }

    // -----------------------------------------------------------------
    // DCS (character-set designation)
    // -----------------------------------------------------------------

    fn dcs_consume(&mut self, byte: u8) -> bool {
        const VALID_CONTENTS: &[u8] = b"()*+\"%`&";
        const VALID_TERMINAL: &[u8] = b"?=<>012345679ABCEHKQRfYZ";

        if VALID_CONTENTS.contains(&byte) {
            self.dcs.push(byte as char);
            return true;
        }
        if VALID_TERMINAL.contains(&byte) {
            self.dcs.push(byte as char);
            self.switch_to(EscState::Text);
            return true;
        }
        self.dcs.clear();
        self.switch_to(EscState::Text);
        false
    }

    fn dcs_submit(&mut self) {
        let buffer = std::mem::take(&mut self.dcs);
        if buffer.len() < 2 {
            return;
        }
        let target = match buffer.as_bytes()[0] {
            b'(' => 0,
            b')' => 1,
            b'*' => 2,
            b'+' => 3,
            _ => return,
        };
        let set = match &buffer[1..] {
            "0" => CharacterSet::DecSpecialGraphics,
            "1" => CharacterSet::AlternateCharacterRomStandardCharacters,
            "2" => CharacterSet::AlternateCharacterRomSpecialGraphics,
            "A" => CharacterSet::Uk,
            "B" => CharacterSet::UsAscii,
            _ => return,
        };
        self.output
            .push(Command::DesignateCharacterSet(CharacterSetDesignation { target, set }));
    }
}

struct Params {
    values: [u32; MAX_CSI_PARAMS],
    count: usize,
}

/// Up to eight semicolon-separated unsigned integers from the front of a
/// CSI buffer; an empty slot before a semicolon reads as zero.
fn scan_params(buffer: &str) -> Params {
    let mut params = Params {
        values: [0; MAX_CSI_PARAMS],
        count: 0,
    };
    let mut rest = buffer;
    while params.count < MAX_CSI_PARAMS {
        let digits = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
        if digits > 0 {
            let Ok(value) = rest[..digits].parse::<u32>() else {
                break;
            };
            params.values[params.count] = value;
            params.count += 1;
            rest = &rest[digits..];
            if !rest.starts_with(';') {
                break;
            }
            rest = &rest[1..];
        } else if rest.starts_with(';') {
            params.values[params.count] = 0;
            params.count += 1;
            rest = &rest[1..];
        } else {
            break;
        }
    }
    params
}

/// Leading unsigned integer of a CSI buffer, or the default.
fn first_int(buffer: &str, default: u32) -> u32 {
    let digits = buffer.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return default;
    }
    buffer[..digits].parse().unwrap_or(default)
}

fn mode_kind(ps: u32, dec: bool) -> Option<ModeKind> {
    if dec {
        match ps {
            1 => Some(ModeKind::ApplicationCursorKeys),
            3 => Some(ModeKind::Column132),
            4 => Some(ModeKind::SmoothScroll),
            5 => Some(ModeKind::ReverseVideo),
            6 => Some(ModeKind::Origin),
            7 => Some(ModeKind::AutoWrap),
            8 => Some(ModeKind::AutoRepeatKeys),
            9 => Some(ModeKind::SendMouseXYOnPress),
            12 => Some(ModeKind::BlinkingCursor),
            25 => Some(ModeKind::ShowCursor),
            47 => Some(ModeKind::AlternateScreenBuffer),
            1000 => Some(ModeKind::SendMouseXYOnPressAndRelease),
            1002 => Some(ModeKind::SendMouseXYOnPressDragAndRelease),
            1003 => Some(ModeKind::SendMouseXYAnyEvent),
            1005 => Some(ModeKind::SendMouseReportUTF8),
            1006 => Some(ModeKind::SendMouseReportSGR),
            1049 => Some(ModeKind::AlternateScreenBuffer1049),
            2004 => Some(ModeKind::BracketedPaste),
            _ => None,
        }
    } else {
        match ps {
            4 => Some(ModeKind::Insert),
            20 => Some(ModeKind::NewLine),
            _ => None,
        }
    }
}

fn sgr_attribute(ps: u32) -> Option<CharacterAttributes> {
    use CharacterAttributes as CA;
    Some(match ps {
        0 => CA::Normal,
        1 => CA::Bold,
        2 => CA::Faint,
        3 => CA::Italicized,
        4 => CA::Underlined,
        5 => CA::Blink,
        7 => CA::Inverse,
        8 => CA::Invisible,
        9 => CA::Crossed,
        21 => CA::DoublyUnderlined,
        22 => CA::NotBoldNotFaint,
        23 => CA::NotItalicized,
        24 => CA::NotUnderlined,
        25 => CA::NotBlink,
        27 => CA::NotInverse,
        28 => CA::NotInvisible,
        29 => CA::NotCrossed,
        30..=37 => CA::ForegroundColor(Color((ps - 30) as u8)),
        39 => CA::ForegroundDefault,
        40..=47 => CA::BackgroundColor(Color((ps - 40) as u8)),
        49 => CA::BackgroundDefault,
        90..=97 => CA::ForegroundColor(Color((ps - 90 + 8) as u8)),
        100..=107 => CA::BackgroundColor(Color((ps - 100 + 8) as u8)),
        _ => return None,
    })
}
