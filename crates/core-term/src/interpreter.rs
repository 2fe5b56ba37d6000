//! Executes parsed commands against a screen.
//!
//! Owns the logical viewport (scrolling region), tab stops, character
//! sets, saved cursor state, title stacks and the mode flags; emits
//! response bytes and state-change notifications through callbacks.

use std::sync::{Arc, Mutex};

use crate::command::*;
use crate::cursor::CursorMode;
use crate::ext_char_registry::ExtendedCharRegistry;
use crate::input_translator::{InputTranslator, MouseReportingMode};
use crate::screen::Screen;
use crate::screen_buffer::MULTI_CELL_GLYPH;
use crate::settings::Settings;
use crate::translate_maps::{translate, TranslateMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedMouseEvents {
    None,
    X10,
    Normal,
    ButtonTracking,
    Any,
}

/// Which of the two title slots changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleEventKind {
    Icon,
    Window,
}

/// `[top, bottom)` is the scrolling region.
#[derive(Debug, Clone, Copy)]
struct Extent {
    width: i32,
    height: i32,
    top: i32,
    bottom: i32,
}

/// 1024 columns of tab stops, default stops every eight columns.
struct TabStops {
    bits: [u64; 16],
}

impl TabStops {
    const SIZE: usize = 1024;

    fn new() -> Self {
        let mut stops = Self { bits: [0; 16] };
        stops.reset_to_defaults();
        stops
    }

    fn reset_to_defaults(&mut self) {
        self.bits = [0; 16];
        let mut n = 0;
        while n < Self::SIZE {
            self.set(n, true);
            n += 8;
        }
    }

    fn clear_all(&mut self) {
        self.bits = [0; 16];
    }

    fn set(&mut self, index: usize, on: bool) {
        if index < Self::SIZE {
            if on {
                self.bits[index / 64] |= 1 << (index % 64);
            } else {
                self.bits[index / 64] &= !(1 << (index % 64));
            }
        }
    }

    fn get(&self, index: usize) -> bool {
        index < Self::SIZE && self.bits[index / 64] & (1 << (index % 64)) != 0
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Rendition {
    faint: bool,
    inverse: bool,
    bold: bool,
    italic: bool,
    invisible: bool,
    blink: bool,
    underline: bool,
    crossed: bool,
    fg_color: Option<crate::color::Color>,
    bg_color: Option<crate::color::Color>,
}

#[derive(Clone, Copy)]
struct SavedState {
    x: i32,
    y: i32,
    rendition: Rendition,
    character_sets: [TranslateMap; 4],
    translate_map: Option<TranslateMap>,
}

#[derive(Default)]
struct Titles {
    icon: String,
    window: String,
    saved_icon: Vec<String>,
    saved_window: Vec<String>,
}

type OutputCallback = Box<dyn FnMut(&[u8]) + Send>;
type BellCallback = Box<dyn FnMut() + Send>;
type TitleChangedCallback = Box<dyn FnMut(&str, TitleEventKind) + Send>;
type ShownCursorChangedCallback = Box<dyn FnMut(bool) + Send>;
type CursorStyleChangedCallback = Box<dyn FnMut(Option<CursorMode>) + Send>;
type RequestedMouseEventsChangedCallback = Box<dyn FnMut(RequestedMouseEvents) + Send>;

pub struct Interpreter {
    screen: Arc<Mutex<Screen>>,
    registry: Arc<ExtendedCharRegistry>,
    output: OutputCallback,
    bell: BellCallback,
    on_title_changed: TitleChangedCallback,
    on_show_cursor_changed: ShownCursorChangedCallback,
    on_cursor_style_changed: CursorStyleChangedCallback,
    on_requested_mouse_events_changed: RequestedMouseEventsChangedCallback,
    input_translator: Option<Arc<Mutex<InputTranslator>>>,
    extent: Extent,
    tab_stops: TabStops,
    translate_map: Option<TranslateMap>,
    character_sets: [TranslateMap; 4],
    origin_mode: bool,
    allow_screen_resize: bool,
    auto_wrap_mode: bool,
    insert_mode: bool,
    cursor_shown: bool,
    mouse_reporting_utf8: bool,
    mouse_reporting_sgr: bool,
    rendition: Rendition,
    requested_mouse_events: RequestedMouseEvents,
    saved_state: Option<SavedState>,
    titles: Titles,
    max_title_stack_depth: usize,
}

impl Interpreter {
    pub fn new(screen: Arc<Mutex<Screen>>) -> Self {
        let (width, height, registry) = {
            let screen = screen.lock().unwrap();
            (
                screen.width() as i32,
                screen.height() as i32,
                Arc::clone(screen.registry()),
            )
        };
        Self {
            screen,
            registry,
            output: Box::new(|_| {}),
            bell: Box::new(|| {}),
            on_title_changed: Box::new(|_, _| {}),
            on_show_cursor_changed: Box::new(|_| {}),
            on_cursor_style_changed: Box::new(|_| {}),
            on_requested_mouse_events_changed: Box::new(|_| {}),
            input_translator: None,
            extent: Extent {
                width,
                height,
                top: 0,
                bottom: height,
            },
            tab_stops: TabStops::new(),
            translate_map: None,
            character_sets: [TranslateMap::UsAscii; 4],
            origin_mode: false,
            allow_screen_resize: true,
            auto_wrap_mode: true,
            insert_mode: false,
            cursor_shown: true,
            mouse_reporting_utf8: false,
            mouse_reporting_sgr: false,
            rendition: Rendition::default(),
            requested_mouse_events: RequestedMouseEvents::None,
            saved_state: None,
            titles: Titles::default(),
            max_title_stack_depth: Settings::default().max_title_stack_depth,
        }
    }

    pub fn set_output(&mut self, output: impl FnMut(&[u8]) + Send + 'static) {
        self.output = Box::new(output);
    }

    pub fn set_bell(&mut self, bell: impl FnMut() + Send + 'static) {
        self.bell = Box::new(bell);
    }

    pub fn set_title_changed(&mut self, cb: impl FnMut(&str, TitleEventKind) + Send + 'static) {
        self.on_title_changed = Box::new(cb);
    }

    pub fn set_show_cursor_changed(&mut self, cb: impl FnMut(bool) + Send + 'static) {
        self.on_show_cursor_changed = Box::new(cb);
    }

    pub fn set_cursor_style_changed(&mut self, cb: impl FnMut(Option<CursorMode>) + Send + 'static) {
        self.on_cursor_style_changed = Box::new(cb);
    }

    pub fn set_requested_mouse_events_changed(
        &mut self,
        cb: impl FnMut(RequestedMouseEvents) + Send + 'static,
    ) {
        self.on_requested_mouse_events_changed = Box::new(cb);
    }

    pub fn set_input_translator(&mut self, translator: Arc<Mutex<InputTranslator>>) {
        self.input_translator = Some(translator);
    }

    pub fn screen_resize_allowed(&self) -> bool {
        self.allow_screen_resize
    }

    pub fn set_screen_resize_allowed(&mut self, allow: bool) {
        self.allow_screen_resize = allow;
    }

    pub fn show_cursor(&self) -> bool {
        self.cursor_shown
    }

    pub fn requested_mouse_events(&self) -> RequestedMouseEvents {
        self.requested_mouse_events
    }

    pub fn apply_settings(&mut self, settings: &Settings) {
        self.allow_screen_resize = settings.allow_132_column_resize;
        self.max_title_stack_depth = settings.max_title_stack_depth;
    }

    pub fn interpret(&mut self, commands: &[Command]) {
        for command in commands {
            self.interpret_single(command);
        }
    }

    pub fn interpret_single(&mut self, command: &Command) {
        match command {
            Command::Text(text) => self.process_text(text),
            Command::LineFeed => self.process_lf(),
            Command::CarriageReturn => self.process_cr(),
            Command::BackSpace => self.process_bs(),
            Command::ReverseIndex => self.process_ri(),
            Command::MoveCursor(movement) => self.process_mc(*movement),
            Command::HorizontalTab(amount) => self.process_ht(*amount),
            Command::Report(report) => self.process_report(*report),
            Command::Bell => (self.bell)(),
            Command::ScreenAlignmentTest => self.process_screen_alignment(),
            Command::EraseInDisplay(erasure) => self.process_erase_in_display(*erasure),
            Command::EraseInLine(erasure) => self.process_erase_in_line(*erasure),
            Command::EraseCharacters(amount) => self.process_erase_characters(*amount),
            Command::SetScrollingRegion(region) => self.process_set_scrolling_region(*region),
            Command::ChangeMode(change) => self.process_change_mode(*change),
            Command::SetTab => self.process_hts(),
            Command::ClearTab(clear) => self.process_clear_tab(*clear),
            Command::SetCharacterAttributes(attributes) => {
                self.process_set_character_attributes(*attributes)
            }
            Command::DesignateCharacterSet(designation) => {
                self.process_designate_character_set(*designation)
            }
            Command::SelectCharacterSet(target) => self.process_select_character_set(*target),
            Command::SaveState => self.process_save_state(),
            Command::RestoreState => self.process_restore_state(),
            Command::InsertLines(lines) => self.process_insert_lines(*lines),
            Command::DeleteLines(lines) => self.process_delete_lines(*lines),
            Command::DeleteCharacters(chars) => self.process_delete_characters(*chars),
            Command::InsertCharacters(chars) => self.process_insert_characters(*chars),
            Command::ScrollLines(lines) => self.process_scroll_lines(*lines),
            Command::ChangeTitle(title) => self.process_change_title(title.clone()),
            Command::ManipulateTitle(manipulation) => self.process_title_manipulation(*manipulation),
            Command::SetCursorStyle(style) => (self.on_cursor_style_changed)(*style),
            Command::Reset => self.process_reset(),
            Command::RepeatLastCharacter(_) => {
                tracing::warn!(target: "term.interpreter", ?command, "unhandled_command");
            }
        }
    }

    // -----------------------------------------------------------------
    // text
    // -----------------------------------------------------------------

    fn process_text(&mut self, text: &str) {
        let mut input: String = match self.translate_map {
            Some(map) => text.chars().map(|c| translate(map, c)).collect(),
            None => text.to_string(),
        };
        if input.is_empty() {
            return;
        }

        let mut screen = self.screen.lock().unwrap();

        // try to merge combining input into the glyph under the cursor
        let current = screen.get_ch();
        if current != 0 && current != MULTI_CELL_GLYPH {
            let result = self.registry.append(&input, current);
            if result.eaten != 0 {
                screen.put_ch(result.newchar);
                input.drain(..result.eaten);
            }
        }

        let sx = screen.width() as i32;
        while !input.is_empty() {
            let result = self.registry.append(&input, 0);
            if result.eaten == 0 {
                break;
            }
            input.drain(..result.eaten);
            if result.newchar == 0 {
                continue;
            }

            let cursor_x = screen.cursor_x() as i32;
            let line_ends_with_wide_glyph = {
                let line = screen.buffer().line(screen.cursor_y() as i32);
                line.last().map(|space| space.l == MULTI_CELL_GLYPH).unwrap_or(false)
            };
            if self.auto_wrap_mode
                && screen.line_overflown()
                && (cursor_x >= sx - 1 || (cursor_x == sx - 2 && line_ends_with_wide_glyph))
            {
                screen.put_wrap();
                let cy = screen.cursor_y() as i32;
                screen.go_to(0, cy);
                self.line_feed_locked(&mut screen);
            }

            let char_width = if self.registry.is_double_width(result.newchar) { 2 } else { 1 };
            if self.insert_mode {
                screen.do_shift_row_right(char_width as usize);
            }
            screen.put_ch(result.newchar);

            let x = screen.cursor_x() as i32;
            if x + char_width < sx {
                let y = screen.cursor_y() as i32;
                screen.go_to(x + char_width, y);
            }
        }
    }

    // -----------------------------------------------------------------
    // basic cursor control
    // -----------------------------------------------------------------

    fn line_feed_locked(&self, screen: &mut Screen) {
        if screen.cursor_y() as i32 + 1 == self.extent.bottom {
            screen.do_scroll_up(self.extent.top as usize, self.extent.bottom as usize, 1);
        } else {
            screen.do_cursor_down(1);
        }
    }

    fn process_lf(&mut self) {
        let screen = Arc::clone(&self.screen);
        let mut screen = screen.lock().unwrap();
        self.line_feed_locked(&mut screen);
    }

    fn process_cr(&mut self) {
        let mut screen = self.screen.lock().unwrap();
        let y = screen.cursor_y() as i32;
        screen.go_to(0, y);
    }

    fn process_bs(&mut self) {
        self.screen.lock().unwrap().do_cursor_left(1);
    }

    fn process_ri(&mut self) {
        let mut screen = self.screen.lock().unwrap();
        if screen.cursor_y() as i32 == self.extent.top {
            screen.scroll_down(self.extent.top as usize, self.extent.bottom as usize, 1);
        } else {
            let x = screen.cursor_x() as i32;
            let y = screen.cursor_y() as i32;
            let target = if self.origin_mode {
                (y - 1).clamp(self.extent.top, self.extent.bottom - 1)
            } else {
                (y - 1).clamp(0, self.extent.height - 1)
            };
            screen.go_to(x, target);
        }
    }

    fn process_mc(&mut self, movement: CursorMovement) {
        let mut screen = self.screen.lock().unwrap();
        let x = screen.cursor_x() as i32;
        let y = screen.cursor_y() as i32;
        match movement.positioning {
            Positioning::Absolute => {
                let line_basis = if self.origin_mode { self.extent.top } else { 0 };
                match (movement.x, movement.y) {
                    (Some(mx), Some(my)) => screen.go_to(mx, my + line_basis),
                    (Some(mx), None) => screen.go_to(mx, y),
                    (None, Some(my)) => screen.go_to(x, my + line_basis),
                    (None, None) => {}
                }
            }
            Positioning::Relative => match (movement.x, movement.y) {
                (Some(dx), Some(dy)) => {
                    let target_y = if self.origin_mode {
                        (y + dy).clamp(self.extent.top, self.extent.bottom - 1)
                    } else {
                        y + dy
                    };
                    screen.go_to(x + dx, target_y);
                }
                (Some(dx), None) => screen.go_to(x + dx, y),
                (None, Some(dy)) => screen.go_to(x, y + dy),
                (None, None) => {}
            },
        }
    }

    fn process_ht(&mut self, amount: i32) {
        if amount == 0 {
            return;
        }
        let mut screen = self.screen.lock().unwrap();
        let mut x = screen.cursor_x() as i32;
        let y = screen.cursor_y() as i32;
        if amount > 0 {
            let width = (screen.width() as i32).min(TabStops::SIZE as i32);
            let mut left = amount;
            while x < width - 1 && left > 0 {
                x += 1;
                if self.tab_stops.get(x as usize) {
                    left -= 1;
                }
            }
        } else {
            let mut left = amount;
            while x > 0 && left < 0 {
                x -= 1;
                if self.tab_stops.get(x as usize) {
                    left += 1;
                }
            }
        }
        screen.go_to(x, y);
    }

    fn process_hts(&mut self) {
        let x = self.screen.lock().unwrap().cursor_x();
        self.tab_stops.set(x, true);
    }

    fn process_clear_tab(&mut self, clear: TabClear) {
        match clear {
            TabClear::CurrentColumn => {
                let x = self.screen.lock().unwrap().cursor_x();
                self.tab_stops.set(x, false);
            }
            TabClear::All => self.tab_stops.clear_all(),
        }
    }

    // -----------------------------------------------------------------
    // reports
    // -----------------------------------------------------------------

    fn process_report(&mut self, report: DeviceReport) {
        match report {
            DeviceReport::TerminalId => self.response(b"\x1b[?6c"),
            DeviceReport::DeviceStatus => self.response(b"\x1b[0n"),
            DeviceReport::CursorPosition => {
                let (x, y) = {
                    let screen = self.screen.lock().unwrap();
                    let x = screen.cursor_x() as i32;
                    let y = screen.cursor_y() as i32;
                    let y = if self.origin_mode { y - self.extent.top } else { y };
                    (x, y)
                };
                let reply = format!("\x1b[{};{}R", y + 1, x + 1);
                self.response(reply.as_bytes());
            }
        }
    }

    fn response(&mut self, bytes: &[u8]) {
        (self.output)(bytes);
    }

    // -----------------------------------------------------------------
    // erasure & alignment
    // -----------------------------------------------------------------

    fn process_screen_alignment(&mut self) {
        let mut screen = self.screen.lock().unwrap();
        let mut fill = screen.buffer().erase_char();
        fill.l = 'E' as u32;
        screen.fill_screen_with_space(fill);
        screen.go_to(0, 0);
    }

    fn process_erase_in_display(&mut self, erasure: DisplayErasure) {
        let mut screen = self.screen.lock().unwrap();
        match erasure {
            DisplayErasure::FromCursorToDisplayEnd => screen.do_erase_screen(0),
            DisplayErasure::FromDisplayStartToCursor => screen.do_erase_screen(1),
            DisplayErasure::WholeDisplay => screen.do_erase_screen(2),
            DisplayErasure::WholeDisplayWithScrollback => {
                screen.do_erase_screen(2);
                screen.buffer_mut().clear_backscreen();
            }
        }
    }

    fn process_erase_in_line(&mut self, erasure: LineErasure) {
        let mut screen = self.screen.lock().unwrap();
        match erasure {
            LineErasure::FromCursorToLineEnd => screen.erase_in_line(0),
            LineErasure::FromLineStartToCursor => screen.erase_in_line(1),
            LineErasure::WholeLine => screen.erase_in_line(2),
        }
    }

    fn process_erase_characters(&mut self, amount: u32) {
        if amount == 0 {
            return;
        }
        let mut screen = self.screen.lock().unwrap();
        let x = screen.cursor_x();
        let y = screen.cursor_y();
        screen.erase_at(x, y, amount as usize);
    }

    // -----------------------------------------------------------------
    // scrolling region & line operations
    // -----------------------------------------------------------------

    fn process_set_scrolling_region(&mut self, region: ScrollingRegion) {
        if let Some((top, bottom)) = region.range {
            if top + 1 < bottom && top >= 0 && top <= self.extent.height {
                self.extent.top = top;
                self.extent.bottom = bottom.min(self.extent.height);
            }
        } else {
            self.extent.top = 0;
            self.extent.bottom = self.extent.height;
        }
        if self.origin_mode {
            self.screen.lock().unwrap().go_to(0, self.extent.top);
        }
    }

    fn process_insert_lines(&mut self, lines: u32) {
        let screen = Arc::clone(&self.screen);
        let mut screen = screen.lock().unwrap();
        let y = screen.cursor_y() as i32;
        if y < self.extent.top || y > self.extent.bottom {
            return;
        }
        let height = screen.height() as i32;
        let lines = (lines as i32).clamp(1, (height - y).max(1));
        screen.scroll_down(y as usize, self.extent.bottom as usize, lines as usize);
    }

    fn process_delete_lines(&mut self, lines: u32) {
        let screen = Arc::clone(&self.screen);
        let mut screen = screen.lock().unwrap();
        let y = screen.cursor_y() as i32;
        if y < self.extent.top || y > self.extent.bottom {
            return;
        }
        let height = screen.height() as i32;
        let lines = (lines as i32).clamp(1, (height - y).max(1));
        screen.do_scroll_up(y as usize, self.extent.bottom as usize, lines as usize);
    }

    fn process_delete_characters(&mut self, characters: u32) {
        let mut screen = self.screen.lock().unwrap();
        let space_left = screen.width() as i32 - screen.cursor_x() as i32;
        let characters = (characters as i32).clamp(1, space_left.max(1));
        screen.do_shift_row_left(characters as usize);
    }

    fn process_insert_characters(&mut self, characters: u32) {
        let mut screen = self.screen.lock().unwrap();
        let space_left = screen.width() as i32 - screen.cursor_x() as i32;
        let characters = (characters as i32).clamp(1, space_left.max(1));
        screen.do_shift_row_right(characters as usize);
    }

    fn process_scroll_lines(&mut self, lines: i32) {
        let mut screen = self.screen.lock().unwrap();
        let top = self.extent.top as usize;
        let bottom = self.extent.bottom as usize;
        if lines > 0 {
            screen.do_scroll_up(top, bottom, lines as usize);
        } else if lines < 0 {
            screen.scroll_down(top, bottom, (-lines) as usize);
        }
    }

    // -----------------------------------------------------------------
    // modes
    // -----------------------------------------------------------------

    fn process_change_mode(&mut self, change: ModeChange) {
        let status = change.status;
        match change.mode {
            ModeKind::Origin => self.origin_mode = status,
            ModeKind::AutoWrap => self.auto_wrap_mode = status,
            ModeKind::Insert => self.insert_mode = status,
            ModeKind::Column132 => self.process_change_column_mode_132(status),
            ModeKind::ReverseVideo => self.screen.lock().unwrap().set_video_reverse(status),
            ModeKind::ApplicationCursorKeys => {
                if let Some(translator) = &self.input_translator {
                    translator.lock().unwrap().set_application_cursor_keys(status);
                }
            }
            ModeKind::BracketedPaste => {
                if let Some(translator) = &self.input_translator {
                    translator.lock().unwrap().set_bracketed_paste(status);
                }
            }
            ModeKind::AlternateScreenBuffer => {
                self.screen.lock().unwrap().set_alternate_screen(status);
            }
            ModeKind::AlternateScreenBuffer1049 => {
                self.screen.lock().unwrap().set_alternate_screen(status);
                if status {
                    self.process_erase_in_display(DisplayErasure::WholeDisplay);
                }
            }
            ModeKind::ShowCursor => {
                if status != self.cursor_shown {
                    self.cursor_shown = status;
                    (self.on_show_cursor_changed)(status);
                }
            }
            ModeKind::SendMouseReportUTF8 => {
                if status != self.mouse_reporting_utf8 {
                    self.mouse_reporting_utf8 = status;
                    self.update_mouse_reporting();
                }
            }
            ModeKind::SendMouseReportSGR => {
                if status != self.mouse_reporting_sgr {
                    self.mouse_reporting_sgr = status;
                    self.update_mouse_reporting();
                }
            }
            ModeKind::SendMouseXYOnPress => {
                self.request_mouse_events(status, RequestedMouseEvents::X10)
            }
            ModeKind::SendMouseXYOnPressAndRelease => {
                self.request_mouse_events(status, RequestedMouseEvents::Normal)
            }
            ModeKind::SendMouseXYOnPressDragAndRelease => {
                self.request_mouse_events(status, RequestedMouseEvents::ButtonTracking)
            }
            ModeKind::SendMouseXYAnyEvent => {
                self.request_mouse_events(status, RequestedMouseEvents::Any)
            }
            ModeKind::NewLine
            | ModeKind::SmoothScroll
            | ModeKind::BlinkingCursor
            | ModeKind::AutoRepeatKeys => {}
        }
    }

    fn request_mouse_events(&mut self, status: bool, events: RequestedMouseEvents) {
        if status && self.requested_mouse_events != events {
            self.requested_mouse_events = events;
            (self.on_requested_mouse_events_changed)(events);
            self.update_mouse_reporting();
        }
        if !status && self.requested_mouse_events == events {
            self.requested_mouse_events = RequestedMouseEvents::None;
            (self.on_requested_mouse_events_changed)(RequestedMouseEvents::None);
            self.update_mouse_reporting();
        }
    }

    fn update_mouse_reporting(&mut self) {
        let Some(translator) = &self.input_translator else {
            return;
        };
        let mut translator = translator.lock().unwrap();
        match self.requested_mouse_events {
            RequestedMouseEvents::X10 => translator.set_mouse_reporting_mode(MouseReportingMode::X10),
            RequestedMouseEvents::Normal
            | RequestedMouseEvents::ButtonTracking
            | RequestedMouseEvents::Any => {
                let mode = if self.mouse_reporting_sgr {
                    MouseReportingMode::Sgr
                } else if self.mouse_reporting_utf8 {
                    MouseReportingMode::Utf8
                } else {
                    MouseReportingMode::Normal
                };
                translator.set_mouse_reporting_mode(mode);
            }
            RequestedMouseEvents::None => {}
        }
    }

    fn process_change_column_mode_132(&mut self, on: bool) {
        if !self.allow_screen_resize {
            return;
        }
        let mut screen = self.screen.lock().unwrap();
        let height = screen.height();
        screen.resize_screen(if on { 132 } else { 80 }, height);
        drop(screen);
        self.notify_screen_resized();
    }

    /// Recomputes the extent after an external screen resize; the region
    /// survives when its endpoints are still in range.
    pub fn notify_screen_resized(&mut self) {
        let screen = self.screen.lock().unwrap();
        let old = self.extent;
        self.extent.width = screen.width() as i32;
        self.extent.height = screen.height() as i32;
        self.extent.bottom = if old.bottom == old.height {
            self.extent.height
        } else {
            old.bottom.min(self.extent.height)
        };
        self.extent.top = old.top.min(self.extent.height - 1);
    }

    // -----------------------------------------------------------------
    // character attributes & sets
    // -----------------------------------------------------------------

    fn process_set_character_attributes(&mut self, attributes: CharacterAttributes) {
        use CharacterAttributes as CA;
        let mut screen = self.screen.lock().unwrap();
        let rendition = &mut self.rendition;
        match attributes {
            CA::Normal => {
                *rendition = Rendition::default();
                screen.set_faint(false);
                screen.set_reverse(false);
                screen.set_bold(false);
                screen.set_italic(false);
                screen.set_invisible(false);
                screen.set_blink(false);
                screen.set_underline(false);
                screen.set_crossed(false);
                screen.set_fg_color(None);
                screen.set_bg_color(None);
            }
            CA::Faint => {
                rendition.faint = true;
                screen.set_faint(true);
            }
            CA::NotBoldNotFaint => {
                rendition.faint = false;
                rendition.bold = false;
                screen.set_faint(false);
                screen.set_bold(false);
            }
            CA::Bold => {
                rendition.bold = true;
                screen.set_bold(true);
            }
            CA::Italicized => {
                rendition.italic = true;
                screen.set_italic(true);
            }
            CA::NotItalicized => {
                rendition.italic = false;
                screen.set_italic(false);
            }
            CA::Inverse => {
                rendition.inverse = true;
                screen.set_reverse(true);
            }
            CA::NotInverse => {
                rendition.inverse = false;
                screen.set_reverse(false);
            }
            CA::Invisible => {
                rendition.invisible = true;
                screen.set_invisible(true);
            }
            CA::NotInvisible => {
                rendition.invisible = false;
                screen.set_invisible(false);
            }
            CA::Blink => {
                rendition.blink = true;
                screen.set_blink(true);
            }
            CA::NotBlink => {
                rendition.blink = false;
                screen.set_blink(false);
            }
            CA::Underlined | CA::DoublyUnderlined => {
                rendition.underline = true;
                screen.set_underline(true);
            }
            CA::NotUnderlined => {
                rendition.underline = false;
                screen.set_underline(false);
            }
            CA::Crossed => {
                rendition.crossed = true;
                screen.set_crossed(true);
            }
            CA::NotCrossed => {
                rendition.crossed = false;
                screen.set_crossed(false);
            }
            CA::ForegroundColor(color) => {
                rendition.fg_color = Some(color);
                screen.set_fg_color(Some(color));
            }
            CA::ForegroundDefault => {
                rendition.fg_color = None;
                screen.set_fg_color(None);
            }
            CA::BackgroundColor(color) => {
                rendition.bg_color = Some(color);
                screen.set_bg_color(Some(color));
            }
            CA::BackgroundDefault => {
                rendition.bg_color = None;
                screen.set_bg_color(None);
            }
        }
    }

    fn apply_rendition(&mut self) {
        let rendition = self.rendition;
        let mut screen = self.screen.lock().unwrap();
        screen.set_fg_color(rendition.fg_color);
        screen.set_bg_color(rendition.bg_color);
        screen.set_faint(rendition.faint);
        screen.set_reverse(rendition.inverse);
        screen.set_bold(rendition.bold);
        screen.set_italic(rendition.italic);
        screen.set_invisible(rendition.invisible);
        screen.set_blink(rendition.blink);
        screen.set_underline(rendition.underline);
        screen.set_crossed(rendition.crossed);
    }

    fn process_designate_character_set(&mut self, designation: CharacterSetDesignation) {
        let map = match designation.set {
            CharacterSet::DecSpecialGraphics | CharacterSet::AlternateCharacterRomSpecialGraphics => {
                TranslateMap::Graph
            }
            CharacterSet::Uk => TranslateMap::Uk,
            CharacterSet::UsAscii | CharacterSet::AlternateCharacterRomStandardCharacters => {
                TranslateMap::UsAscii
            }
        };
        let Some(slot) = self.character_sets.get_mut(designation.target as usize) else {
            return;
        };
        *slot = map;
        self.translate_map = if map == TranslateMap::UsAscii { None } else { Some(map) };
    }

    fn process_select_character_set(&mut self, target: u32) {
        if let Some(&map) = self.character_sets.get(target as usize) {
            self.translate_map = if map == TranslateMap::UsAscii { None } else { Some(map) };
        }
    }

    // -----------------------------------------------------------------
    // saved state
    // -----------------------------------------------------------------

    fn process_save_state(&mut self) {
        let (x, y) = {
            let screen = self.screen.lock().unwrap();
            (screen.cursor_x() as i32, screen.cursor_y() as i32)
        };
        self.saved_state = Some(SavedState {
            x,
            y,
            rendition: self.rendition,
            character_sets: self.character_sets,
            translate_map: self.translate_map,
        });
    }

    fn process_restore_state(&mut self) {
        let Some(state) = self.saved_state else {
            return;
        };
        self.screen.lock().unwrap().go_to(state.x, state.y);
        self.character_sets = state.character_sets;
        self.translate_map = state.translate_map;
        self.rendition = state.rendition;
        self.apply_rendition();
    }

    fn process_reset(&mut self) {
        self.tab_stops.reset_to_defaults();
        self.origin_mode = false;
        self.auto_wrap_mode = true;
        self.insert_mode = false;
        self.translate_map = None;
        self.character_sets = [TranslateMap::UsAscii; 4];
        self.rendition = Rendition::default();
        self.saved_state = None;
        self.extent.top = 0;
        self.extent.bottom = self.extent.height;
        self.apply_rendition();
        let mut screen = self.screen.lock().unwrap();
        screen.do_erase_screen(2);
        screen.go_to(0, 0);
    }

    // -----------------------------------------------------------------
    // titles
    // -----------------------------------------------------------------

    fn process_change_title(&mut self, title: Title) {
        match title.kind {
            TitleKind::Icon => {
                if self.titles.icon != title.title {
                    self.titles.icon = title.title.clone();
                    (self.on_title_changed)(&title.title, TitleEventKind::Icon);
                }
            }
            TitleKind::Window => {
                if self.titles.window != title.title {
                    self.titles.window = title.title.clone();
                    (self.on_title_changed)(&title.title, TitleEventKind::Window);
                }
            }
            TitleKind::IconAndWindow => {
                if self.titles.icon != title.title {
                    self.titles.icon = title.title.clone();
                    (self.on_title_changed)(&title.title, TitleEventKind::Icon);
                }
                if self.titles.window != title.title {
                    self.titles.window = title.title.clone();
                    (self.on_title_changed)(&title.title, TitleEventKind::Window);
                }
            }
        }
    }

    fn process_title_manipulation(&mut self, manipulation: TitleManipulation) {
        match manipulation.operation {
            TitleOperation::Save => {
                let save_icon = matches!(manipulation.target, TitleTarget::Icon | TitleTarget::Both);
                let save_window =
                    matches!(manipulation.target, TitleTarget::Window | TitleTarget::Both);
                if save_icon && self.titles.saved_icon.len() < self.max_title_stack_depth {
                    self.titles.saved_icon.push(self.titles.icon.clone());
                }
                if save_window && self.titles.saved_window.len() < self.max_title_stack_depth {
                    self.titles.saved_window.push(self.titles.window.clone());
                }
            }
            TitleOperation::Restore => {
                if matches!(manipulation.target, TitleTarget::Icon | TitleTarget::Both) {
                    if let Some(title) = self.titles.saved_icon.pop() {
                        self.process_change_title(Title {
                            kind: TitleKind::Icon,
                            title,
                        });
                    }
                }
                if matches!(manipulation.target, TitleTarget::Window | TitleTarget::Both) {
                    if let Some(title) = self.titles.saved_window.pop() {
                        self.process_change_title(Title {
                            kind: TitleKind::Window,
                            title,
                        });
                    }
                }
            }
        }
    }
}
