//! 256-color palette values as used on the wire.
//!
//!   0-  7: standard colors (ESC [ 30-37 m)
//!   8- 15: high intensity colors (ESC [ 90-97 m)
//!  16-231: 6 x 6 x 6 cube: 16 + 36r + 6g + b, 0 <= r,g,b <= 5
//! 232-255: grayscale from dark to light in 24 steps

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Color(pub u8);

impl Color {
    pub const BLACK: Color = Color(0);
    pub const RED: Color = Color(1);
    pub const GREEN: Color = Color(2);
    pub const YELLOW: Color = Color(3);
    pub const BLUE: Color = Color(4);
    pub const MAGENTA: Color = Color(5);
    pub const CYAN: Color = Color(6);
    pub const WHITE: Color = Color(7);
    pub const BRIGHT_BLACK: Color = Color(8);
    pub const BRIGHT_RED: Color = Color(9);
    pub const BRIGHT_GREEN: Color = Color(10);
    pub const BRIGHT_YELLOW: Color = Color(11);
    pub const BRIGHT_BLUE: Color = Color(12);
    pub const BRIGHT_MAGENTA: Color = Color(13);
    pub const BRIGHT_CYAN: Color = Color(14);
    pub const BRIGHT_WHITE: Color = Color(15);

    /// Quantises a 24-bit color to the 8-bit palette: the 24-step gray
    /// ramp when r==g==b, the 6x6x6 cube otherwise.
    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Color {
        if r == g && r == b {
            Color(232 + (r as u16 * 24 / 256) as u8)
        } else {
            let r = r / 43;
            let g = g / 43;
            let b = b / 43;
            Color(16 + 36 * r + 6 * g + b)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grayscale_quantisation_spans_the_ramp() {
        assert_eq!(Color::from_rgb(0, 0, 0), Color(232));
        assert_eq!(Color::from_rgb(255, 255, 255), Color(255));
        assert_eq!(Color::from_rgb(128, 128, 128), Color(244));
    }

    #[test]
    fn cube_quantisation_hits_the_corners() {
        assert_eq!(Color::from_rgb(255, 0, 0), Color(16 + 36 * 5));
        assert_eq!(Color::from_rgb(0, 255, 0), Color(16 + 6 * 5));
        assert_eq!(Color::from_rgb(0, 0, 255), Color(16 + 5));
        assert_eq!(Color::from_rgb(255, 0, 255), Color(16 + 36 * 5 + 5));
    }
}
