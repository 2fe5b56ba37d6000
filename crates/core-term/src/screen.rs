//! Mutable screen state over a [`ScreenBuffer`]: cursor, current erase
//! rendition, scrolling, erasure, alternate screen.
//!
//! A `Screen` is single-owner mutable state; concurrent use goes through
//! `Arc<Mutex<Screen>>` with renderers cloning a [`Snapshot`] under the
//! lock and drawing outside it.

use std::sync::Arc;

use crate::color::Color;
use crate::ext_char_registry::{CellChar, ExtendedCharRegistry};
use crate::screen_buffer::{default_erase_char, Attrs, ScreenBuffer, Snapshot, Space, MULTI_CELL_GLYPH};

struct SavedScreen {
    snapshot: Snapshot,
    pos_x: usize,
    pos_y: usize,
}

pub struct Screen {
    registry: Arc<ExtendedCharRegistry>,
    pos_x: usize,
    pos_y: usize,
    erase_char: Space,
    buffer: ScreenBuffer,
    alternate_screen: bool,
    line_overflown: bool,
    reverse_video: bool,
    primary_screenshot: Option<SavedScreen>,
    alternate_screenshot: Option<SavedScreen>,
}

impl Screen {
    pub fn new(width: usize, height: usize, registry: Arc<ExtendedCharRegistry>) -> Self {
        let buffer = ScreenBuffer::new(width, height, Arc::clone(&registry));
        Self {
            registry,
            pos_x: 0,
            pos_y: 0,
            erase_char: default_erase_char(),
            buffer,
            alternate_screen: false,
            line_overflown: false,
            reverse_video: false,
            primary_screenshot: None,
            alternate_screenshot: None,
        }
    }

    pub fn buffer(&self) -> &ScreenBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut ScreenBuffer {
        &mut self.buffer
    }

    pub fn registry(&self) -> &Arc<ExtendedCharRegistry> {
        &self.registry
    }

    pub fn width(&self) -> usize {
        self.buffer.width()
    }

    pub fn height(&self) -> usize {
        self.buffer.height()
    }

    pub fn cursor_x(&self) -> usize {
        self.pos_x
    }

    pub fn cursor_y(&self) -> usize {
        self.pos_y
    }

    pub fn line_overflown(&self) -> bool {
        self.line_overflown
    }

    /// Character currently under the cursor.
    pub fn get_ch(&self) -> CellChar {
        self.buffer.at(self.pos_x, self.pos_y as i32).l
    }

    /// Writes at the cursor with the current rendition. A double-width
    /// glyph occupies two cells, the second one holding the sentinel.
    pub fn put_ch(&mut self, c: CellChar) {
        let width = self.width();
        let is_double = self.registry.is_double_width(c);
        let rendition = self.erase_char;
        let (x, y) = (self.pos_x, self.pos_y as i32);
        let line = self.buffer.line_mut(y);
        if x >= line.len() {
            return;
        }
        line[x] = Space { l: c, ..rendition };
        if is_double && x + 1 < line.len() {
            line[x + 1] = Space { l: MULTI_CELL_GLYPH, ..rendition };
        }
        let last_written = if is_double { x + 1 } else { x };
        self.line_overflown = last_written + 1 >= width;
    }

    /// Marks the cursor's line as wrapped: the next line continues it.
    pub fn put_wrap(&mut self) {
        let y = self.pos_y as i32;
        self.buffer.set_line_wrapped(y, true);
    }

    // -----------------------------------------------------------------
    // rendition setters; they shape the erase char used by every fill
    // -----------------------------------------------------------------

    pub fn set_fg_color(&mut self, color: Option<Color>) {
        match color {
            Some(color) => {
                self.erase_char.foreground = color;
                self.erase_char.attrs |= Attrs::CUSTOM_FG;
            }
            None => {
                self.erase_char.foreground = Color::default();
                self.erase_char.attrs -= Attrs::CUSTOM_FG;
            }
        }
    }

    pub fn set_bg_color(&mut self, color: Option<Color>) {
        match color {
            Some(color) => {
                self.erase_char.background = color;
                self.erase_char.attrs |= Attrs::CUSTOM_BG;
            }
            None => {
                self.erase_char.background = Color::default();
                self.erase_char.attrs -= Attrs::CUSTOM_BG;
            }
        }
    }

    pub fn set_faint(&mut self, on: bool) {
        self.erase_char.attrs.set(Attrs::FAINT, on);
    }

    pub fn set_underline(&mut self, on: bool) {
        self.erase_char.attrs.set(Attrs::UNDERLINE, on);
    }

    pub fn set_crossed(&mut self, on: bool) {
        self.erase_char.attrs.set(Attrs::CROSSED, on);
    }

    pub fn set_reverse(&mut self, on: bool) {
        self.erase_char.attrs.set(Attrs::REVERSE, on);
    }

    pub fn set_bold(&mut self, on: bool) {
        self.erase_char.attrs.set(Attrs::BOLD, on);
    }

    pub fn set_italic(&mut self, on: bool) {
        self.erase_char.attrs.set(Attrs::ITALIC, on);
    }

    pub fn set_invisible(&mut self, on: bool) {
        self.erase_char.attrs.set(Attrs::INVISIBLE, on);
    }

    pub fn set_blink(&mut self, on: bool) {
        self.erase_char.attrs.set(Attrs::BLINK, on);
    }

    pub fn erase_char(&self) -> Space {
        self.erase_char
    }

    // -----------------------------------------------------------------
    // cursor movement
    // -----------------------------------------------------------------

    pub fn go_to(&mut self, x: i32, y: i32) {
        self.pos_x = x.clamp(0, self.width() as i32 - 1) as usize;
        self.pos_y = y.clamp(0, self.height() as i32 - 1) as usize;
        self.line_overflown = false;
    }

    pub fn go_to_default_position(&mut self) {
        self.go_to(0, 0);
    }

    pub fn do_cursor_up(&mut self, n: i32) {
        self.go_to(self.pos_x as i32, self.pos_y as i32 - n);
    }

    pub fn do_cursor_down(&mut self, n: i32) {
        self.go_to(self.pos_x as i32, self.pos_y as i32 + n);
    }

    pub fn do_cursor_left(&mut self, n: i32) {
        self.go_to(self.pos_x as i32 - n, self.pos_y as i32);
    }

    pub fn do_cursor_right(&mut self, n: i32) {
        self.go_to(self.pos_x as i32 + n, self.pos_y as i32);
    }

    // -----------------------------------------------------------------
    // scrolling within [top, bottom)
    // -----------------------------------------------------------------

    /// Scrolls the region up; lines falling off the top feed the
    /// back-scroll when the region starts at the screen top on the
    /// primary screen.
    pub fn do_scroll_up(&mut self, top: usize, bottom: usize, lines: usize) {
        let bottom = bottom.min(self.height());
        if top >= bottom || lines == 0 {
            return;
        }
        let lines = lines.min(bottom - top);

        if top == 0 && !self.alternate_screen {
            for y in 0..lines {
                let cells = self.buffer.line(y as i32).to_vec();
                let occupied = ScreenBuffer::occupied_chars_in(&cells);
                let wrapped = self.buffer.line_wrapped(y as i32);
                self.buffer.feed_backscreen(&cells[..occupied], wrapped);
            }
        }

        for y in top..bottom - lines {
            let src = self.buffer.line((y + lines) as i32).to_vec();
            let wrapped = self.buffer.line_wrapped((y + lines) as i32);
            self.buffer.line_mut(y as i32).copy_from_slice(&src);
            self.buffer.set_line_wrapped(y as i32, wrapped);
        }
        for y in bottom - lines..bottom {
            self.clear_line(y);
        }
    }

    /// Scrolls the region down, filling vacated top rows with the erase
    /// char.
    pub fn scroll_down(&mut self, top: usize, bottom: usize, lines: usize) {
        let bottom = bottom.min(self.height());
        if top >= bottom || lines == 0 {
            return;
        }
        let lines = lines.min(bottom - top);

        for y in (top + lines..bottom).rev() {
            let src = self.buffer.line((y - lines) as i32).to_vec();
            let wrapped = self.buffer.line_wrapped((y - lines) as i32);
            self.buffer.line_mut(y as i32).copy_from_slice(&src);
            self.buffer.set_line_wrapped(y as i32, wrapped);
        }
        for y in top..top + lines {
            self.clear_line(y);
        }
    }

    fn clear_line(&mut self, y: usize) {
        let erase = self.erase_char;
        self.buffer.line_mut(y as i32).fill(erase);
        self.buffer.set_line_wrapped(y as i32, false);
    }

    // -----------------------------------------------------------------
    // erasure
    // -----------------------------------------------------------------

    /// ED: 0 = cursor to end, 1 = start to cursor, 2 = whole screen.
    pub fn do_erase_screen(&mut self, mode: i32) {
        match mode {
            0 => {
                self.erase_in_line(0);
                for y in self.pos_y + 1..self.height() {
                    self.clear_line(y);
                }
            }
            1 => {
                self.erase_in_line(1);
                for y in 0..self.pos_y {
                    self.clear_line(y);
                }
            }
            2 => {
                for y in 0..self.height() {
                    self.clear_line(y);
                }
            }
            _ => {}
        }
    }

    /// EL: 0 = cursor to line end, 1 = line start to cursor, 2 = whole
    /// line. The cursor does not move.
    pub fn erase_in_line(&mut self, mode: i32) {
        let erase = self.erase_char;
        let x = self.pos_x;
        let line = self.buffer.line_mut(self.pos_y as i32);
        match mode {
            0 => line[x..].fill(erase),
            1 => {
                let end = (x + 1).min(line.len());
                line[..end].fill(erase);
            }
            2 => line.fill(erase),
            _ => {}
        }
    }

    /// Erases `n` cells from the cursor to the right, clamped to the
    /// line end.
    pub fn erase_in_line_count(&mut self, n: usize) {
        let erase = self.erase_char;
        let x = self.pos_x;
        let line = self.buffer.line_mut(self.pos_y as i32);
        let end = (x + n).min(line.len());
        line[x..end].fill(erase);
    }

    pub fn erase_at(&mut self, x: usize, y: usize, count: usize) {
        let erase = self.erase_char;
        let line = self.buffer.line_mut(y as i32);
        if x >= line.len() {
            return;
        }
        let end = (x + count).min(line.len());
        line[x..end].fill(erase);
    }

    pub fn fill_screen_with_space(&mut self, space: Space) {
        for y in 0..self.height() {
            self.buffer.line_mut(y as i32).fill(space);
        }
    }

    // -----------------------------------------------------------------
    // in-line shifting for insert/delete characters
    // -----------------------------------------------------------------

    /// Deletes `chars` cells at the cursor, pulling the rest of the line
    /// left and filling the tail.
    pub fn do_shift_row_left(&mut self, chars: usize) {
        let erase = self.erase_char;
        let x = self.pos_x;
        let line = self.buffer.line_mut(self.pos_y as i32);
        if x >= line.len() {
            return;
        }
        let chars = chars.min(line.len() - x);
        line.copy_within(x + chars.., x);
        let tail = line.len() - chars;
        line[tail..].fill(erase);
    }

    /// Inserts `chars` blank cells at the cursor, pushing the rest of
    /// the line right.
    pub fn do_shift_row_right(&mut self, chars: usize) {
        let erase = self.erase_char;
        let x = self.pos_x;
        let line = self.buffer.line_mut(self.pos_y as i32);
        if x >= line.len() {
            return;
        }
        let chars = chars.min(line.len() - x);
        line.copy_within(x..line.len() - chars, x + chars);
        line[x..x + chars].fill(erase);
    }

    // -----------------------------------------------------------------
    // modes & screens
    // -----------------------------------------------------------------

    pub fn set_video_reverse(&mut self, reverse: bool) {
        self.reverse_video = reverse;
    }

    pub fn video_reverse(&self) -> bool {
        self.reverse_video
    }

    pub fn is_alternate_screen(&self) -> bool {
        self.alternate_screen
    }

    /// Switches between the primary and the alternate screen, saving the
    /// outgoing rectangle and restoring the stored counterpart.
    pub fn set_alternate_screen(&mut self, alternate: bool) {
        if alternate == self.alternate_screen {
            return;
        }
        let captured = SavedScreen {
            snapshot: self.buffer.make_snapshot(),
            pos_x: self.pos_x,
            pos_y: self.pos_y,
        };
        if alternate {
            self.primary_screenshot = Some(captured);
            match self.alternate_screenshot.take() {
                Some(saved) => self.restore(saved),
                None => {
                    for y in 0..self.height() {
                        self.clear_line(y);
                    }
                    self.go_to(0, 0);
                }
            }
        } else {
            self.alternate_screenshot = Some(captured);
            if let Some(saved) = self.primary_screenshot.take() {
                self.restore(saved);
            }
        }
        self.alternate_screen = alternate;
    }

    fn restore(&mut self, saved: SavedScreen) {
        self.buffer.revert_to_snapshot(&saved.snapshot);
        self.go_to(saved.pos_x as i32, saved.pos_y as i32);
    }

    /// Reflows the buffer; the back-scroll takes part only for the
    /// primary screen.
    pub fn resize_screen(&mut self, width: usize, height: usize) {
        self.buffer
            .resize_screen(width, height, !self.alternate_screen);
        self.go_to(self.pos_x as i32, self.pos_y as i32);
    }

    pub fn make_snapshot(&self) -> Snapshot {
        self.buffer.make_snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen(w: usize, h: usize) -> Screen {
        Screen::new(w, h, Arc::new(ExtendedCharRegistry::new()))
    }

    fn type_str(screen: &mut Screen, text: &str) {
        for c in text.chars() {
            screen.put_ch(c as u32);
            let x = screen.cursor_x();
            screen.go_to(x as i32 + 1, screen.cursor_y() as i32);
        }
    }

    fn line_text(screen: &Screen, y: i32) -> String {
        let width = screen.width();
        screen.buffer().dump_unicode_string((0, y), (width, y))
    }

    #[test]
    fn put_and_read_back() {
        let mut screen = screen(10, 4);
        type_str(&mut screen, "hi");
        assert_eq!(line_text(&screen, 0), "hi");
        assert_eq!(screen.cursor_x(), 2);
    }

    #[test]
    fn cursor_movement_clamps_to_the_screen() {
        let mut screen = screen(10, 4);
        screen.go_to(100, 100);
        assert_eq!((screen.cursor_x(), screen.cursor_y()), (9, 3));
        screen.do_cursor_left(50);
        assert_eq!(screen.cursor_x(), 0);
    }

    #[test]
    fn scroll_up_feeds_the_backscroll_on_the_primary_screen() {
        let mut screen = screen(5, 2);
        type_str(&mut screen, "one");
        screen.go_to(0, 1);
        type_str(&mut screen, "two");
        screen.do_scroll_up(0, 2, 1);

        assert_eq!(screen.buffer().back_screen_lines(), 1);
        assert_eq!(line_text(&screen, -1), "one");
        assert_eq!(line_text(&screen, 0), "two");
        assert_eq!(line_text(&screen, 1), "");
    }

    #[test]
    fn scroll_down_fills_the_top_with_blank_lines() {
        let mut screen = screen(5, 3);
        type_str(&mut screen, "top");
        screen.scroll_down(0, 3, 1);
        assert_eq!(line_text(&screen, 0), "");
        assert_eq!(line_text(&screen, 1), "top");
    }

    #[test]
    fn erase_in_line_variants() {
        let mut screen = screen(6, 1);
        type_str(&mut screen, "abcdef");
        screen.go_to(2, 0);
        screen.erase_in_line(0);
        assert_eq!(line_text(&screen, 0), "ab");

        let mut screen = self::screen(6, 1);
        type_str(&mut screen, "abcdef");
        screen.go_to(2, 0);
        screen.erase_in_line(1);
        assert_eq!(line_text(&screen, 0), "   def");
    }

    #[test]
    fn shift_row_left_and_right() {
        let mut screen = screen(6, 1);
        type_str(&mut screen, "abcdef");
        screen.go_to(1, 0);
        screen.do_shift_row_left(2);
        assert_eq!(line_text(&screen, 0), "adef");

        screen.do_shift_row_right(1);
        assert_eq!(line_text(&screen, 0), "a def");
    }

    #[test]
    fn double_width_glyphs_take_two_cells() {
        let mut screen = screen(10, 1);
        screen.put_ch('漢' as u32);
        assert_eq!(screen.buffer().at(0, 0).l, '漢' as u32);
        assert_eq!(screen.buffer().at(1, 0).l, MULTI_CELL_GLYPH);
    }

    #[test]
    fn alternate_screen_saves_and_restores_the_primary() {
        let mut screen = screen(8, 2);
        type_str(&mut screen, "primary");
        screen.set_alternate_screen(true);
        assert_eq!(line_text(&screen, 0), "");
        type_str(&mut screen, "alt");
        screen.set_alternate_screen(false);
        assert_eq!(line_text(&screen, 0), "primary");
        // and the alternate content survives the round trip
        screen.set_alternate_screen(true);
        assert_eq!(line_text(&screen, 0), "alt");
    }

    #[test]
    fn rendition_shapes_written_cells() {
        let mut screen = screen(4, 1);
        screen.set_bold(true);
        screen.set_fg_color(Some(Color::RED));
        screen.put_ch('x' as u32);
        let cell = screen.buffer().at(0, 0);
        assert!(cell.attrs.contains(Attrs::BOLD));
        assert!(cell.attrs.contains(Attrs::CUSTOM_FG));
        assert_eq!(cell.foreground, Color::RED);
    }

    #[test]
    fn overflow_tracks_writes_into_the_last_column() {
        let mut screen = screen(3, 1);
        type_str(&mut screen, "ab");
        assert!(!screen.line_overflown());
        screen.put_ch('c' as u32);
        assert!(screen.line_overflown());
    }
}
