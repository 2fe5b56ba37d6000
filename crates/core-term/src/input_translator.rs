//! Key / mouse / paste events translated into terminal byte sequences.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCode {
    Char(char),
    Enter,
    Tab,
    Backspace,
    Escape,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    F(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub alt: bool,
    pub control: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub mods: Modifiers,
}

impl KeyEvent {
    pub fn plain(code: KeyCode) -> Self {
        Self {
            code,
            mods: Modifiers::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseEventType {
    LDown,
    LDrag,
    LUp,
    MDown,
    MDrag,
    MUp,
    RDown,
    RDrag,
    RUp,
    Motion,
}

/// Zero-based cell coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    pub x: i16,
    pub y: i16,
    pub kind: MouseEventType,
    pub shift: bool,
    pub alt: bool,
    pub control: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseReportingMode {
    X10,
    Normal,
    Utf8,
    Sgr,
}

type Output = Box<dyn FnMut(&[u8]) + Send>;

pub struct InputTranslator {
    output: Output,
    application_cursor_keys: bool,
    bracketed_paste: bool,
    reporting_mode: MouseReportingMode,
}

impl Default for InputTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl InputTranslator {
    pub fn new() -> Self {
        Self {
            output: Box::new(|_| {}),
            application_cursor_keys: false,
            bracketed_paste: false,
            reporting_mode: MouseReportingMode::Normal,
        }
    }

    pub fn set_output(&mut self, output: impl FnMut(&[u8]) + Send + 'static) {
        self.output = Box::new(output);
    }

    pub fn set_application_cursor_keys(&mut self, enabled: bool) {
        self.application_cursor_keys = enabled;
    }

    pub fn set_bracketed_paste(&mut self, bracketed: bool) {
        self.bracketed_paste = bracketed;
    }

    pub fn set_mouse_reporting_mode(&mut self, mode: MouseReportingMode) {
        self.reporting_mode = mode;
    }

    fn emit(&mut self, bytes: &[u8]) {
        (self.output)(bytes);
    }

    pub fn process_key_down(&mut self, event: KeyEvent) {
        // cursor-key style sequences flip between CSI and SS3 with
        // application cursor keys
        let app = self.application_cursor_keys;
        let mut buf: Vec<u8> = Vec::with_capacity(8);
        match event.code {
            KeyCode::Up => buf.extend_from_slice(if app { b"\x1bOA" } else { b"\x1b[A" }),
            KeyCode::Down => buf.extend_from_slice(if app { b"\x1bOB" } else { b"\x1b[B" }),
            KeyCode::Right => buf.extend_from_slice(if app { b"\x1bOC" } else { b"\x1b[C" }),
            KeyCode::Left => buf.extend_from_slice(if app { b"\x1bOD" } else { b"\x1b[D" }),
            KeyCode::Home => buf.extend_from_slice(if app { b"\x1bOH" } else { b"\x1b[H" }),
            KeyCode::End => buf.extend_from_slice(if app { b"\x1bOF" } else { b"\x1b[F" }),
            KeyCode::PageUp => buf.extend_from_slice(b"\x1b[5~"),
            KeyCode::PageDown => buf.extend_from_slice(b"\x1b[6~"),
            KeyCode::Insert => buf.extend_from_slice(b"\x1b[2~"),
            KeyCode::Delete => buf.extend_from_slice(b"\x1b[3~"),
            KeyCode::Enter => buf.push(b'\r'),
            KeyCode::Tab => buf.push(b'\t'),
            KeyCode::Backspace => buf.push(0x7F),
            KeyCode::Escape => buf.push(0x1B),
            KeyCode::F(n @ 1..=4) => {
                buf.extend_from_slice(b"\x1bO");
                buf.push(b'P' + n - 1);
            }
            KeyCode::F(n @ 5..=12) => {
                const CODES: [&[u8]; 8] = [b"15", b"17", b"18", b"19", b"20", b"21", b"23", b"24"];
                buf.extend_from_slice(b"\x1b[");
                buf.extend_from_slice(CODES[(n - 5) as usize]);
                buf.push(b'~');
            }
            KeyCode::F(_) => return,
            KeyCode::Char(c) => {
                if event.mods.alt {
                    buf.push(0x1B);
                }
                if event.mods.control {
                    // control strips to the C0 plane
                    let upper = c.to_ascii_uppercase();
                    if upper.is_ascii() {
                        buf.push((upper as u8) & 0x1F);
                    }
                } else {
                    let mut utf8 = [0u8; 4];
                    buf.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
                }
            }
        }
        if !buf.is_empty() {
            self.emit(&buf);
        }
    }

    pub fn process_text_input(&mut self, text: &str) {
        if !text.is_empty() {
            let bytes = text.as_bytes().to_vec();
            self.emit(&bytes);
        }
    }

    pub fn process_paste(&mut self, text: &str) {
        if self.bracketed_paste {
            let mut buf = Vec::with_capacity(text.len() + 12);
            buf.extend_from_slice(b"\x1b[200~");
            buf.extend_from_slice(text.as_bytes());
            buf.extend_from_slice(b"\x1b[201~");
            self.emit(&buf);
        } else {
            let bytes = text.as_bytes().to_vec();
            self.emit(&bytes);
        }
    }

    pub fn process_mouse_event(&mut self, event: MouseEvent) {
        use MouseEventType::*;
        let (button, is_release, is_motion) = match event.kind {
            LDown => (0u8, false, false),
            LDrag => (0, false, true),
            LUp => (0, true, false),
            MDown => (1, false, false),
            MDrag => (1, false, true),
            MUp => (1, true, false),
            RDown => (2, false, false),
            RDrag => (2, false, true),
            RUp => (2, true, false),
            Motion => (3, false, true),
        };

        let mut code = button;
        if is_motion {
            code += 32;
        }
        if self.reporting_mode != MouseReportingMode::X10 {
            if event.shift {
                code += 4;
            }
            if event.alt {
                code += 8;
            }
            if event.control {
                code += 16;
            }
        }

        match self.reporting_mode {
            MouseReportingMode::X10 | MouseReportingMode::Normal => {
                let code = if is_release { 3 + (code - button) } else { code };
                let cx = (event.x as i32 + 1 + 32).min(255) as u8;
                let cy = (event.y as i32 + 1 + 32).min(255) as u8;
                let buf = [0x1B, b'[', b'M', 32 + code, cx, cy];
                self.emit(&buf);
            }
            MouseReportingMode::Utf8 => {
                let code = if is_release { 3 + (code - button) } else { code };
                let mut buf = vec![0x1B, b'[', b'M'];
                let mut push_utf8 = |value: i32| {
                    let c = char::from_u32(value as u32).unwrap_or(' ');
                    let mut bytes = [0u8; 4];
                    buf.extend_from_slice(c.encode_utf8(&mut bytes).as_bytes());
                };
                push_utf8(i32::from(32 + code));
                push_utf8(event.x as i32 + 1 + 32);
                push_utf8(event.y as i32 + 1 + 32);
                self.emit(&buf);
            }
            MouseReportingMode::Sgr => {
                let terminator = if is_release { 'm' } else { 'M' };
                let reply = format!(
                    "\x1b[<{};{};{}{}",
                    code,
                    event.x + 1,
                    event.y + 1,
                    terminator
                );
                let bytes = reply.into_bytes();
                self.emit(&bytes);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn collector() -> (Arc<Mutex<Vec<u8>>>, InputTranslator) {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let sink2 = Arc::clone(&sink);
        let mut translator = InputTranslator::new();
        translator.set_output(move |bytes| sink2.lock().unwrap().extend_from_slice(bytes));
        (sink, translator)
    }

    fn mouse(kind: MouseEventType, x: i16, y: i16) -> MouseEvent {
        MouseEvent {
            x,
            y,
            kind,
            shift: false,
            alt: false,
            control: false,
        }
    }

    #[test]
    fn arrows_follow_application_cursor_keys() {
        let (sink, mut translator) = collector();
        translator.process_key_down(KeyEvent::plain(KeyCode::Up));
        assert_eq!(&*sink.lock().unwrap(), b"\x1b[A");
        sink.lock().unwrap().clear();

        translator.set_application_cursor_keys(true);
        translator.process_key_down(KeyEvent::plain(KeyCode::Up));
        assert_eq!(&*sink.lock().unwrap(), b"\x1bOA");
    }

    #[test]
    fn control_characters_strip_to_c0() {
        let (sink, mut translator) = collector();
        translator.process_key_down(KeyEvent {
            code: KeyCode::Char('c'),
            mods: Modifiers {
                control: true,
                ..Default::default()
            },
        });
        assert_eq!(&*sink.lock().unwrap(), &[3u8]);
    }

    #[test]
    fn alt_prefixes_an_escape() {
        let (sink, mut translator) = collector();
        translator.process_key_down(KeyEvent {
            code: KeyCode::Char('x'),
            mods: Modifiers {
                alt: true,
                ..Default::default()
            },
        });
        assert_eq!(&*sink.lock().unwrap(), b"\x1bx");
    }

    #[test]
    fn bracketed_paste_wraps_the_payload() {
        let (sink, mut translator) = collector();
        translator.process_paste("data");
        assert_eq!(&*sink.lock().unwrap(), b"data");
        sink.lock().unwrap().clear();

        translator.set_bracketed_paste(true);
        translator.process_paste("data");
        assert_eq!(&*sink.lock().unwrap(), b"\x1b[200~data\x1b[201~");
    }

    #[test]
    fn normal_mouse_reporting_encodes_press_and_release() {
        let (sink, mut translator) = collector();
        translator.set_mouse_reporting_mode(MouseReportingMode::Normal);
        translator.process_mouse_event(mouse(MouseEventType::LDown, 0, 0));
        assert_eq!(&*sink.lock().unwrap(), &[0x1B, b'[', b'M', 32, 33, 33]);
        sink.lock().unwrap().clear();

        translator.process_mouse_event(mouse(MouseEventType::LUp, 0, 0));
        assert_eq!(&*sink.lock().unwrap(), &[0x1B, b'[', b'M', 35, 33, 33]);
    }

    #[test]
    fn sgr_mouse_reporting_uses_decimal_coordinates() {
        let (sink, mut translator) = collector();
        translator.set_mouse_reporting_mode(MouseReportingMode::Sgr);
        translator.process_mouse_event(mouse(MouseEventType::LDown, 10, 5));
        assert_eq!(&*sink.lock().unwrap(), b"\x1b[<0;11;6M");
        sink.lock().unwrap().clear();

        translator.process_mouse_event(mouse(MouseEventType::LUp, 10, 5));
        assert_eq!(&*sink.lock().unwrap(), b"\x1b[<0;11;6m");
    }

    #[test]
    fn x10_reporting_ignores_modifiers() {
        let (sink, mut translator) = collector();
        translator.set_mouse_reporting_mode(MouseReportingMode::X10);
        translator.process_mouse_event(MouseEvent {
            x: 0,
            y: 0,
            kind: MouseEventType::LDown,
            shift: true,
            alt: true,
            control: true,
        });
        assert_eq!(&*sink.lock().unwrap(), &[0x1B, b'[', b'M', 32, 33, 33]);
    }

    #[test]
    fn function_keys() {
        let (sink, mut translator) = collector();
        translator.process_key_down(KeyEvent::plain(KeyCode::F(1)));
        assert_eq!(&*sink.lock().unwrap(), b"\x1bOP");
        sink.lock().unwrap().clear();
        translator.process_key_down(KeyEvent::plain(KeyCode::F(5)));
        assert_eq!(&*sink.lock().unwrap(), b"\x1b[15~");
    }
}
