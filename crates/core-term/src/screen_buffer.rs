//! 2D cell storage: the on-screen rectangle plus unbounded back-scroll.
//!
//! On-screen cells live in one contiguous rectangle addressed through
//! per-line metadata; back-scroll cells live in a packed vector indexed
//! by each line's start offset. Line numbers are on-screen for
//! `0..height` and negative for back-scroll: `-1` is the most recent
//! scrolled-out line, `-back_screen_lines()` the oldest.

use std::sync::Arc;

use bitflags::bitflags;

use crate::color::Color;
use crate::ext_char_registry::{is_extended, CellChar, ExtendedCharRegistry};

/// Sentinel stored in the trailing half of a double-width glyph.
pub const MULTI_CELL_GLYPH: CellChar = 0xFFFE;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Attrs: u16 {
        const CUSTOM_FG = 1 << 0;
        const CUSTOM_BG = 1 << 1;
        const FAINT = 1 << 2;
        const UNDERLINE = 1 << 3;
        const CROSSED = 1 << 4;
        const REVERSE = 1 << 5;
        const BOLD = 1 << 6;
        const ITALIC = 1 << 7;
        const INVISIBLE = 1 << 8;
        const BLINK = 1 << 9;
    }
}

/// One grid cell, 8 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Space {
    pub l: CellChar,
    pub foreground: Color,
    pub background: Color,
    pub attrs: Attrs,
}

impl Space {
    /// Attribute-only equality: the glyph is not compared.
    pub fn have_same_attributes(&self, rhs: &Space) -> bool {
        self.foreground == rhs.foreground
            && self.background == rhs.background
            && self.attrs == rhs.attrs
    }
}

/// Erase fill used by a fresh buffer: a plain space with default
/// rendition.
pub fn default_erase_char() -> Space {
    Space {
        l: ' ' as CellChar,
        ..Space::default()
    }
}

#[derive(Debug, Clone, Copy)]
struct LineMeta {
    start_index: usize,
    line_length: usize,
    is_wrapped: bool,
}

/// A copy of the on-screen rectangle.
pub struct Snapshot {
    pub width: usize,
    pub height: usize,
    pub cells: Vec<Space>,
}

pub struct ScreenBuffer {
    width: usize,
    height: usize,
    registry: Arc<ExtendedCharRegistry>,
    on_screen_lines: Vec<LineMeta>,
    back_lines: Vec<LineMeta>,
    on_screen: Vec<Space>,
    back_spaces: Vec<Space>,
    erase_char: Space,
}

impl ScreenBuffer {
    pub fn new(width: usize, height: usize, registry: Arc<ExtendedCharRegistry>) -> Self {
        let mut buffer = Self {
            width,
            height,
            registry,
            on_screen_lines: Vec::new(),
            back_lines: Vec::new(),
            on_screen: Vec::new(),
            back_spaces: Vec::new(),
            erase_char: default_erase_char(),
        };
        buffer.rebuild_rectangle(width, height);
        buffer
    }

    fn rebuild_rectangle(&mut self, width: usize, height: usize) {
        self.width = width;
        self.height = height;
        self.on_screen = vec![Space::default(); width * height];
        self.on_screen_lines = (0..height)
            .map(|y| LineMeta {
                start_index: y * width,
                line_length: width,
                is_wrapped: false,
            })
            .collect();
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn back_screen_lines(&self) -> usize {
        self.back_lines.len()
    }

    pub fn registry(&self) -> &Arc<ExtendedCharRegistry> {
        &self.registry
    }

    fn meta(&self, line: i32) -> Option<&LineMeta> {
        if line >= 0 {
            self.on_screen_lines.get(line as usize)
        } else {
            let index = self.back_lines.len() as i32 + line;
            if index < 0 {
                None
            } else {
                self.back_lines.get(index as usize)
            }
        }
    }

    /// Cells of a line; empty for an out-of-range number.
    pub fn line(&self, line: i32) -> &[Space] {
        match self.meta(line) {
            Some(meta) if line >= 0 => {
                &self.on_screen[meta.start_index..meta.start_index + meta.line_length]
            }
            Some(meta) => &self.back_spaces[meta.start_index..meta.start_index + meta.line_length],
            None => &[],
        }
    }

    pub fn line_mut(&mut self, line: i32) -> &mut [Space] {
        if line >= 0 {
            match self.on_screen_lines.get(line as usize) {
                Some(meta) => {
                    let (start, len) = (meta.start_index, meta.line_length);
                    &mut self.on_screen[start..start + len]
                }
                None => &mut [],
            }
        } else {
            let index = self.back_lines.len() as i32 + line;
            match usize::try_from(index).ok().and_then(|i| self.back_lines.get(i)) {
                Some(meta) => {
                    let (start, len) = (meta.start_index, meta.line_length);
                    &mut self.back_spaces[start..start + len]
                }
                None => &mut [],
            }
        }
    }

    /// Panics on an invalid position.
    pub fn at(&self, x: usize, y: i32) -> Space {
        self.line(y)[x]
    }

    pub fn line_wrapped(&self, line: i32) -> bool {
        self.meta(line).map(|m| m.is_wrapped).unwrap_or(false)
    }

    pub fn set_line_wrapped(&mut self, line: i32, wrapped: bool) {
        if line >= 0 {
            if let Some(meta) = self.on_screen_lines.get_mut(line as usize) {
                meta.is_wrapped = wrapped;
            }
        } else {
            let index = self.back_lines.len() as i32 + line;
            if let Ok(index) = usize::try_from(index) {
                if let Some(meta) = self.back_lines.get_mut(index) {
                    meta.is_wrapped = wrapped;
                }
            }
        }
    }

    pub fn erase_char(&self) -> Space {
        self.erase_char
    }

    pub fn set_erase_char(&mut self, space: Space) {
        self.erase_char = space;
    }

    /// Length of the line once trailing null cells are trimmed.
    pub fn occupied_chars_in(line: &[Space]) -> usize {
        line.iter()
            .rposition(|space| space.l != 0)
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    pub fn has_occupied_chars_in(line: &[Space]) -> bool {
        line.iter().any(|space| space.l != 0)
    }

    pub fn occupied_chars(&self, line: i32) -> usize {
        Self::occupied_chars_in(self.line(line))
    }

    pub fn has_occupied_chars(&self, line: i32) -> bool {
        Self::has_occupied_chars_in(self.line(line))
    }

    /// `[first, last)` of the on-screen lines holding anything, or None
    /// for a pristine screen.
    pub fn occupied_on_screen_lines(&self) -> Option<(i32, i32)> {
        let mut first = None;
        let mut last = 0;
        for y in 0..self.height as i32 {
            if self.has_occupied_chars(y) {
                if first.is_none() {
                    first = Some(y);
                }
                last = y + 1;
            }
        }
        first.map(|f| (f, last))
    }

    /// Appends one scrolled-out line to the back-scroll.
    pub fn feed_backscreen(&mut self, spaces: &[Space], wrapped: bool) {
        let start_index = self.back_spaces.len();
        self.back_spaces.extend_from_slice(spaces);
        self.back_lines.push(LineMeta {
            start_index,
            line_length: spaces.len(),
            is_wrapped: wrapped,
        });
    }

    pub fn clear_backscreen(&mut self) {
        self.back_lines.clear();
        self.back_spaces.clear();
    }

    /// Merges wrapped physical lines of `[from, to)` back into logical
    /// lines, trimming trailing null cells of each physical piece.
    pub fn compose_continuous_lines(&self, from: i32, to: i32) -> Vec<(Vec<Space>, bool)> {
        let mut result = Vec::new();
        let mut line = from;
        while line < to {
            let mut logical = Vec::new();
            loop {
                let cells = self.line(line);
                let occupied = Self::occupied_chars_in(cells);
                logical.extend_from_slice(&cells[..occupied]);
                let wrapped = self.line_wrapped(line);
                line += 1;
                if !wrapped || line >= to {
                    break;
                }
            }
            result.push((logical, false));
        }
        result
    }

    /// Splits logical lines at `width`, flagging every piece but the
    /// last as wrapped.
    fn decompose_continuous_lines(src: &[(Vec<Space>, bool)], width: usize) -> Vec<(Vec<Space>, bool)> {
        let mut result = Vec::new();
        for (logical, _) in src {
            if logical.is_empty() {
                result.push((Vec::new(), false));
                continue;
            }
            let mut chunks = logical.chunks(width).peekable();
            while let Some(chunk) = chunks.next() {
                result.push((chunk.to_vec(), chunks.peek().is_some()));
            }
        }
        result
    }

    /// Reflows content to a new size. With `merge_with_backscreen`, the
    /// whole history is recomposed at the new width and repartitioned
    /// with the bottom kept anchored; otherwise the rectangle is
    /// cropped or grown in place.
    pub fn resize_screen(&mut self, new_width: usize, new_height: usize, merge_with_backscreen: bool) {
        if new_width == 0 || new_height == 0 {
            return;
        }
        if new_width == self.width && new_height == self.height {
            return;
        }

        if merge_with_backscreen {
            let occupied_end = self
                .occupied_on_screen_lines()
                .map(|(_, end)| end)
                .unwrap_or(0);
            let composed =
                self.compose_continuous_lines(-(self.back_lines.len() as i32), occupied_end);
            let decomposed = Self::decompose_continuous_lines(&composed, new_width);

            self.back_lines.clear();
            self.back_spaces.clear();
            self.rebuild_rectangle(new_width, new_height);

            let on_screen_count = decomposed.len().min(new_height);
            let to_backscroll = decomposed.len() - on_screen_count;
            for (line, wrapped) in &decomposed[..to_backscroll] {
                self.feed_backscreen(line, *wrapped);
            }
            for (row, (line, wrapped)) in decomposed[to_backscroll..].iter().enumerate() {
                let target = self.line_mut(row as i32);
                let n = line.len().min(new_width);
                target[..n].copy_from_slice(&line[..n]);
                self.set_line_wrapped(row as i32, *wrapped);
            }
        } else {
            let old_width = self.width;
            let old = std::mem::take(&mut self.on_screen);
            let old_lines = std::mem::take(&mut self.on_screen_lines);
            self.rebuild_rectangle(new_width, new_height);
            for (row, meta) in old_lines.iter().enumerate().take(new_height) {
                let src = &old[meta.start_index..meta.start_index + meta.line_length.min(old_width)];
                let n = src.len().min(new_width);
                let dst = self.line_mut(row as i32);
                dst[..n].copy_from_slice(&src[..n]);
            }
        }
    }

    /// Decodes a rectangular range into text. Null cells read as spaces,
    /// trailing blanks of every line are trimmed, the trailing halves of
    /// double-width glyphs are skipped.
    pub fn dump_unicode_string(&self, begin: (usize, i32), end: (usize, i32)) -> String {
        let mut lines = Vec::new();
        let (begin_x, begin_y) = begin;
        let (end_x, end_y) = end;
        let mut y = begin_y;
        while y <= end_y {
            let cells = self.line(y);
            let from = if y == begin_y { begin_x.min(cells.len()) } else { 0 };
            let to = if y == end_y { end_x.min(cells.len()) } else { cells.len() };
            let mut text = String::new();
            for space in &cells[from..to] {
                match space.l {
                    0 => text.push(' '),
                    MULTI_CELL_GLYPH => {}
                    c if is_extended(c) => {
                        if let Some(decoded) = self.registry.decode(c) {
                            text.push_str(&decoded);
                        }
                    }
                    c => {
                        if let Some(ch) = char::from_u32(c) {
                            text.push(ch);
                        }
                    }
                }
            }
            lines.push(text.trim_end().to_string());
            y += 1;
        }
        lines.join("\n")
    }

    /// Like [`Self::dump_unicode_string`] but also reports, for every
    /// produced character, the cell it came from. Newlines map to the
    /// end of the line they terminate.
    pub fn dump_unicode_string_with_layout(
        &self,
        begin: (usize, i32),
        end: (usize, i32),
    ) -> (String, Vec<(usize, i32)>) {
        let mut text = String::new();
        let mut layout = Vec::new();
        let (begin_x, begin_y) = begin;
        let (end_x, end_y) = end;
        let mut y = begin_y;
        while y <= end_y {
            let cells = self.line(y);
            let from = if y == begin_y { begin_x.min(cells.len()) } else { 0 };
            let to = if y == end_y { end_x.min(cells.len()) } else { cells.len() };
            let line_start = text.len();
            let mut cell_layout = Vec::new();
            for (offset, space) in cells[from..to].iter().enumerate() {
                let x = from + offset;
                let before = text.len();
                match space.l {
                    0 => text.push(' '),
                    MULTI_CELL_GLYPH => {}
                    c if is_extended(c) => {
                        if let Some(decoded) = self.registry.decode(c) {
                            text.push_str(&decoded);
                        }
                    }
                    c => {
                        if let Some(ch) = char::from_u32(c) {
                            text.push(ch);
                        }
                    }
                }
                for _ in text[before..].chars() {
                    cell_layout.push((x, y));
                }
            }
            // trim trailing blanks of the line, with their layout slots
            let trimmed_len = text[line_start..].trim_end().len();
            let excess_chars = text[line_start + trimmed_len..].chars().count();
            text.truncate(line_start + trimmed_len);
            cell_layout.truncate(cell_layout.len() - excess_chars);
            layout.extend(cell_layout);
            if y != end_y {
                text.push('\n');
                layout.push((to, y));
            }
            y += 1;
        }
        (text, layout)
    }

    pub fn make_snapshot(&self) -> Snapshot {
        Snapshot {
            width: self.width,
            height: self.height,
            cells: self.on_screen.clone(),
        }
    }

    /// Restores the on-screen rectangle from a snapshot, cropping or
    /// padding when the sizes differ.
    pub fn revert_to_snapshot(&mut self, snapshot: &Snapshot) {
        for y in 0..self.height {
            for x in 0..self.width {
                let cell = if x < snapshot.width && y < snapshot.height {
                    snapshot.cells[y * snapshot.width + x]
                } else {
                    Space::default()
                };
                self.on_screen[self.on_screen_lines[y].start_index + x] = cell;
            }
        }
    }
}
