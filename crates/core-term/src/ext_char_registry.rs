//! Grapheme-cluster interning.
//!
//! Cell storage holds one 32-bit value per glyph. Ordinary Unicode
//! scalars are stored as themselves ("base" characters, bit 31 clear).
//! Multi-scalar grapheme clusters are interned in a registry and
//! referenced by a synthetic code with bit 31 set ("extended"
//! characters). The registry never shrinks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

const EXT_BIT: u32 = 1 << 31;

/// A cell character: either a Unicode scalar or an extended index.
pub type CellChar = u32;

pub fn is_base(c: CellChar) -> bool {
    c & EXT_BIT == 0
}

pub fn is_extended(c: CellChar) -> bool {
    c & EXT_BIT != 0
}

/// Result of composing one grapheme from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendResult {
    /// The character now representing the grapheme; replaces `initial`
    /// when characters were eaten.
    pub newchar: CellChar,
    /// Bytes consumed from the input string.
    pub eaten: usize,
}

struct Entry {
    text: String,
    double_width: bool,
}

#[derive(Default)]
struct Table {
    entries: Vec<Entry>,
    lookup: HashMap<String, u32>,
}

/// Process-wide grapheme interner; tests may construct private
/// instances.
#[derive(Default)]
pub struct ExtendedCharRegistry {
    table: Mutex<Table>,
}

impl ExtendedCharRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<ExtendedCharRegistry> {
        static SHARED: OnceLock<Arc<ExtendedCharRegistry>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(ExtendedCharRegistry::new())))
    }

    /// Composes one grapheme by appending characters from `input` to the
    /// glyph already stored as `initial` (0 = absent). Returns the
    /// replacement character and the number of input bytes consumed;
    /// `eaten == 0` means nothing could be merged into `initial`.
    pub fn append(&self, input: &str, initial: CellChar) -> AppendResult {
        if initial == 0 && input.is_empty() {
            return AppendResult { newchar: 0, eaten: 0 };
        }

        let initial_text = if initial == 0 {
            String::new()
        } else {
            self.decode_to_string(initial)
        };

        if input.is_empty() {
            return AppendResult { newchar: initial, eaten: 0 };
        }

        let combined = format!("{initial_text}{input}");
        let first_grapheme = combined
            .graphemes(true)
            .next()
            .expect("non-empty input yields a grapheme");

        if first_grapheme.len() <= initial_text.len() {
            // the input does not extend the initial glyph
            return AppendResult { newchar: initial, eaten: 0 };
        }

        let eaten = first_grapheme.len() - initial_text.len();
        let newchar = self.encode_grapheme(first_grapheme);
        AppendResult { newchar, eaten }
    }

    /// NFC-normalises the cluster; a single resulting scalar stays a
    /// base char, anything longer is interned.
    fn encode_grapheme(&self, grapheme: &str) -> CellChar {
        let normalized: String = grapheme.nfc().collect();
        let mut scalars = normalized.chars();
        let first = scalars.next().unwrap_or('\u{FFFD}');
        if scalars.next().is_none() {
            return first as u32;
        }

        let mut table = self.table.lock().unwrap();
        if let Some(&index) = table.lookup.get(normalized.as_str()) {
            return index | EXT_BIT;
        }
        let double_width = normalized.width() >= 2;
        table.entries.push(Entry {
            text: normalized.clone(),
            double_width,
        });
        let index = (table.entries.len() - 1) as u32;
        table.lookup.insert(normalized, index);
        index | EXT_BIT
    }

    /// The interned string for an extended char; `None` for base chars.
    pub fn decode(&self, c: CellChar) -> Option<String> {
        if is_base(c) {
            return None;
        }
        let table = self.table.lock().unwrap();
        table
            .entries
            .get((c & !EXT_BIT) as usize)
            .map(|entry| entry.text.clone())
    }

    fn decode_to_string(&self, c: CellChar) -> String {
        if is_base(c) {
            char::from_u32(c).map(String::from).unwrap_or_default()
        } else {
            self.decode(c).unwrap_or_default()
        }
    }

    /// Whether the glyph occupies two screen cells. Cached for extended
    /// chars, computed from East Asian Width for base chars.
    pub fn is_double_width(&self, c: CellChar) -> bool {
        if is_base(c) {
            return char::from_u32(c)
                .map(|ch| unicode_width::UnicodeWidthChar::width(ch).unwrap_or(1) >= 2)
                .unwrap_or(false);
        }
        let table = self.table.lock().unwrap();
        table
            .entries
            .get((c & !EXT_BIT) as usize)
            .map(|entry| entry.double_width)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_without_initial_yields_nothing() {
        let registry = ExtendedCharRegistry::new();
        assert_eq!(registry.append("", 0), AppendResult { newchar: 0, eaten: 0 });
    }

    #[test]
    fn a_plain_scalar_stays_base() {
        let registry = ExtendedCharRegistry::new();
        let result = registry.append("n rest", 0);
        assert_eq!(result.newchar, u32::from('n'));
        assert_eq!(result.eaten, 1);
        assert!(is_base(result.newchar));
        assert_eq!(registry.decode(result.newchar), None);
    }

    #[test]
    fn a_combining_sequence_becomes_extended() {
        let registry = ExtendedCharRegistry::new();
        // "e" followed by a combining acute and a combining ring below
        // does not NFC-compose into one scalar
        let input = "e\u{0301}\u{0325}";
        let result = registry.append(input, 0);
        assert_eq!(result.eaten, input.len());
        assert!(is_extended(result.newchar));
        assert!(registry.decode(result.newchar).is_some());
    }

    #[test]
    fn nfc_composition_may_collapse_to_a_base_char() {
        let registry = ExtendedCharRegistry::new();
        // "e" + combining acute composes to U+00E9
        let result = registry.append("e\u{0301}", 0);
        assert_eq!(result.newchar, 0xE9);
        assert!(is_base(result.newchar));
    }

    #[test]
    fn appending_to_an_initial_base_char_merges() {
        let registry = ExtendedCharRegistry::new();
        let base = registry.append("e", 0);
        assert_eq!(base.eaten, 1);
        let merged = registry.append("\u{0301}x", base.newchar);
        assert_eq!(merged.eaten, 2); // the combining mark only
        assert_eq!(merged.newchar, 0xE9);
    }

    #[test]
    fn unrelated_input_does_not_merge() {
        let registry = ExtendedCharRegistry::new();
        let base = registry.append("a", 0);
        let unmerged = registry.append("b", base.newchar);
        assert_eq!(unmerged.eaten, 0);
        assert_eq!(unmerged.newchar, base.newchar);
    }

    #[test]
    fn interning_deduplicates() {
        let registry = ExtendedCharRegistry::new();
        let a = registry.append("e\u{0301}\u{0325}", 0);
        let b = registry.append("e\u{0301}\u{0325}", 0);
        assert_eq!(a.newchar, b.newchar);
    }

    #[test]
    fn zwj_emoji_are_extended_and_double_width() {
        let registry = ExtendedCharRegistry::new();
        let family = "\u{1F468}\u{200D}\u{1F469}\u{200D}\u{1F466}";
        let result = registry.append(family, 0);
        assert!(is_extended(result.newchar));
        assert_eq!(result.eaten, family.len());
        assert!(registry.is_double_width(result.newchar));
    }

    #[test]
    fn cjk_base_chars_are_double_width() {
        let registry = ExtendedCharRegistry::new();
        assert!(registry.is_double_width(u32::from('漢')));
        assert!(!registry.is_double_width(u32::from('a')));
    }

    #[test]
    fn base_xor_extended() {
        assert!(is_base(u32::from('x')));
        assert!(!is_extended(u32::from('x')));
        assert!(is_extended(5 | EXT_BIT));
        assert!(!is_base(5 | EXT_BIT));
    }
}
