//! Terminal settings block, TOML-backed.

use serde::{Deserialize, Serialize};

use crate::cursor::CursorMode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Default cursor shape until an application overrides it.
    pub cursor_mode: CursorMode,
    /// Whether DECCOLM may resize the screen between 80 and 132 columns.
    pub allow_132_column_resize: bool,
    /// Depth cap of the icon/window title stacks.
    pub max_title_stack_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cursor_mode: CursorMode::BlinkingBlock,
            allow_132_column_resize: true,
            max_title_stack_depth: 10,
        }
    }
}

impl Settings {
    pub fn from_toml_str(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let settings = Settings::from_toml_str("allow_132_column_resize = false").unwrap();
        assert!(!settings.allow_132_column_resize);
        assert_eq!(settings.cursor_mode, CursorMode::BlinkingBlock);
        assert_eq!(settings.max_title_stack_depth, 10);
    }

    #[test]
    fn round_trips_through_toml() {
        let mut settings = Settings::default();
        settings.cursor_mode = CursorMode::SteadyBar;
        let text = settings.to_toml_string();
        assert_eq!(Settings::from_toml_str(&text).unwrap(), settings);
    }
}
