//! Color constants for the gauge display.
//!
//! The gauge art carries its own palette inside the PNG layers; only the
//! cleared background and the text overlays need named colors here.
//!
//! Rgb565 is used throughout (5 bits red, 6 bits green, 5 bits blue) -
//! native to the display path, no per-pixel conversion at present time.

use embedded_graphics::pixelcolor::{Rgb565, RgbColor};

/// Pure black. Frame clear color and the area outside the gauge art.
pub const BLACK: Rgb565 = Rgb565::BLACK;

/// Pure white. Numeric RPM and speed readouts.
pub const WHITE: Rgb565 = Rgb565::WHITE;
