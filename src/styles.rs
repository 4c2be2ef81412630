//! Pre-computed static text styles for the numeric overlays.
//!
//! `MonoTextStyle` and `TextStyle` are built as `const` so the per-frame
//! draw path never constructs style objects. The readouts anchor at a
//! fixed top-left point, matching the gauge art's cutouts.

use embedded_graphics::{
    mono_font::MonoTextStyle,
    pixelcolor::Rgb565,
    text::{Alignment, Baseline, TextStyle, TextStyleBuilder},
};
use profont::PROFONT_24_POINT;

use crate::colors::WHITE;

/// Top-left anchored text. The gauge art reserves rectangular cutouts for
/// the readouts; their anchor points are in [`crate::config`].
pub const TOP_LEFT: TextStyle = TextStyleBuilder::new()
    .alignment(Alignment::Left)
    .baseline(Baseline::Top)
    .build();

/// Large white glyphs for the RPM and speed values.
pub const VALUE_STYLE_WHITE: MonoTextStyle<'static, Rgb565> = MonoTextStyle::new(&PROFONT_24_POINT, WHITE);
