//! Terminal emulator core: VT/xterm byte-stream parsing, command
//! interpretation against a screen model with scrollback, grapheme
//! interning for combining/double-width content, and input translation
//! back into byte sequences.
//!
//! Data flow: PTY bytes -> [`parser::Parser`] -> [`command::Command`]s ->
//! [`interpreter::Interpreter`] -> [`screen::Screen`] under its mutex;
//! key/mouse events -> [`input_translator::InputTranslator`] -> bytes.

pub mod color;
pub mod command;
pub mod cursor;
pub mod ext_char_registry;
pub mod input_translator;
pub mod interpreter;
pub mod parser;
pub mod screen;
pub mod screen_buffer;
pub mod settings;
pub mod translate_maps;

pub use color::Color;
pub use command::Command;
pub use cursor::CursorMode;
pub use ext_char_registry::{AppendResult, CellChar, ExtendedCharRegistry};
pub use input_translator::{InputTranslator, KeyCode, KeyEvent, MouseEvent, MouseReportingMode};
pub use interpreter::{Interpreter, RequestedMouseEvents, TitleEventKind};
pub use parser::Parser;
pub use screen::Screen;
pub use screen_buffer::{Attrs, ScreenBuffer, Space, MULTI_CELL_GLYPH};
pub use settings::Settings;
