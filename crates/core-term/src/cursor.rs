//! Cursor shapes selectable via DECSCUSR.

use serde::{Deserialize, Serialize};

// NB: the numeric values are persistence-bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CursorMode {
    BlinkingBlock = 0,
    BlinkingUnderline = 1,
    BlinkingBar = 2,
    SteadyBlock = 3,
    SteadyUnderline = 4,
    SteadyBar = 5,
}

impl CursorMode {
    pub fn is_steady(self) -> bool {
        matches!(
            self,
            CursorMode::SteadyBlock | CursorMode::SteadyUnderline | CursorMode::SteadyBar
        )
    }
}
