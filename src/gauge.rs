//! Layered gauge rendering.
//!
//! The gauge art is a stack of pre-rendered PNG layers: one background
//! plus [`LAYER_COUNT`](crate::config::LAYER_COUNT) cumulative fill steps.
//! At startup each PNG is decoded once and reduced to its opaque pixels in
//! Rgb565; per frame the stack is composed off-screen and pushed to the
//! window in a single `update` call, so no partially-composed frame is
//! ever visible.
//!
//! How much of the stack lights up is [`fill_index`]: one layer per
//! [`RPM_STEP`](crate::config::RPM_STEP) rev/min, clamped to the stack.
//!
//! The renderer is driven through the [`FrameSink`] trait so the control
//! loop can run against a recording sink in tests, where no SDL window
//! exists.

use core::fmt::Write as _;
use std::path::Path;

use anyhow::Context;
use embedded_graphics::pixelcolor::{Rgb565, Rgb888};
use embedded_graphics::prelude::*;
use embedded_graphics::text::Text;
use embedded_graphics_simulator::{OutputSettingsBuilder, SimulatorDisplay, SimulatorEvent, Window};
use log::info;

use crate::colors::BLACK;
use crate::config::{
    BACKGROUND_IMAGE,
    LAYER_COUNT,
    RPM_STEP,
    RPM_TEXT_X,
    RPM_TEXT_Y,
    SCREEN_HEIGHT,
    SCREEN_WIDTH,
    SPEED_TEXT_X,
    SPEED_TEXT_Y,
    WINDOW_TITLE,
};
use crate::styles::{TOP_LEFT, VALUE_STYLE_WHITE};
use crate::telemetry::TelemetrySnapshot;

/// Alpha value below which a source pixel is dropped from a layer.
const ALPHA_CUTOFF: u8 = 128;

// =============================================================================
// Fill Index
// =============================================================================

/// Number of fill layers to composite for an RPM reading.
///
/// `k = clamp(floor(rpm / RPM_STEP) + 1, 0, LAYER_COUNT)` - monotone in
/// `rpm` and total over the whole `i64` domain, so an absurd reading can
/// clamp but never panic or wrap. Zero RPM (and the unknown-as-zero
/// display policy) lights the first layer.
pub fn fill_index(rpm: i64) -> usize {
    (rpm.div_euclid(i64::from(RPM_STEP)) + 1).clamp(0, LAYER_COUNT as i64) as usize
}

// =============================================================================
// Gauge Layers
// =============================================================================

/// One pre-loaded image layer, reduced to its opaque pixels.
///
/// Sparse representation: the fill-step PNGs only paint a small slice of
/// the 800x480 canvas, so storing `(point, color)` pairs keeps both the
/// memory and the per-frame blit proportional to the visible art.
pub struct GaugeLayer {
    pixels: Vec<Pixel<Rgb565>>,
}

impl GaugeLayer {
    /// Reduce a decoded RGBA image to the layer's opaque pixels.
    ///
    /// Pixels outside the panel are dropped here so the blit never draws
    /// out of bounds.
    fn from_rgba(image: &image::RgbaImage) -> Self {
        let pixels = image
            .enumerate_pixels()
            .filter(|(x, y, px)| px.0[3] >= ALPHA_CUTOFF && *x < SCREEN_WIDTH && *y < SCREEN_HEIGHT)
            .map(|(x, y, px)| {
                let color = Rgb565::from(Rgb888::new(px.0[0], px.0[1], px.0[2]));
                Pixel(Point::new(x as i32, y as i32), color)
            })
            .collect();
        Self { pixels }
    }

    /// Blit the layer onto the off-screen surface.
    fn draw(&self, display: &mut SimulatorDisplay<Rgb565>) {
        display.draw_iter(self.pixels.iter().copied()).ok();
    }

    #[cfg(test)]
    fn pixel_count(&self) -> usize { self.pixels.len() }
}

/// The background plus the ordered fill steps, loaded once at startup and
/// read-only for the process lifetime.
pub struct GaugeLayerSet {
    background: GaugeLayer,
    fill_steps: Vec<GaugeLayer>,
}

impl GaugeLayerSet {
    /// Load `GAUGE_BG.png` and `RECTANGLE_1.png` .. `RECTANGLE_N.png` from
    /// the asset directory. Any missing or undecodable asset is fatal.
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let background = load_layer(&dir.join(BACKGROUND_IMAGE))?;

        let mut fill_steps = Vec::with_capacity(LAYER_COUNT);
        for step in 1..=LAYER_COUNT {
            fill_steps.push(load_layer(&dir.join(format!("RECTANGLE_{step}.png")))?);
        }

        info!("loaded gauge art: background + {} fill layers", fill_steps.len());
        Ok(Self { background, fill_steps })
    }
}

/// Decode one PNG into a layer.
fn load_layer(path: &Path) -> anyhow::Result<GaugeLayer> {
    let image = image::open(path)
        .with_context(|| format!("loading gauge asset {}", path.display()))?
        .to_rgba8();
    Ok(GaugeLayer::from_rgba(&image))
}

// =============================================================================
// Frame Sink
// =============================================================================

/// Presentation seam between the control loop and the display hardware.
pub trait FrameSink {
    /// Compose and atomically present one frame for the snapshot.
    fn present(&mut self, snapshot: &TelemetrySnapshot);

    /// Drain pending window events; true if a close was requested.
    fn quit_requested(&mut self) -> bool;

    /// Release the display resource. Idempotent; `present` afterwards is
    /// a no-op.
    fn release(&mut self);
}

// =============================================================================
// Gauge Renderer
// =============================================================================

/// Owns the off-screen surface, the window, and the layer art.
pub struct GaugeRenderer {
    display: SimulatorDisplay<Rgb565>,
    window: Option<Window>,
    layers: GaugeLayerSet,
}

impl GaugeRenderer {
    /// Bring up the display and show an initial cleared frame, so the
    /// panel is black (not garbage) before the first telemetry arrives
    /// and so the event queue exists before the first poll.
    pub fn new(layers: GaugeLayerSet) -> Self {
        let mut display: SimulatorDisplay<Rgb565> = SimulatorDisplay::new(Size::new(SCREEN_WIDTH, SCREEN_HEIGHT));
        let output_settings = OutputSettingsBuilder::new().build();
        let mut window = Window::new(WINDOW_TITLE, &output_settings);

        display.clear(BLACK).ok();
        window.update(&display);

        Self {
            display,
            window: Some(window),
            layers,
        }
    }
}

impl FrameSink for GaugeRenderer {
    fn present(&mut self, snapshot: &TelemetrySnapshot) {
        let Some(window) = self.window.as_mut() else {
            return;
        };

        // Compose off-screen: background, fill stack, numeric overlays
        self.display.clear(BLACK).ok();
        self.layers.background.draw(&mut self.display);

        let lit = fill_index(i64::from(snapshot.display_rpm()));
        for layer in &self.layers.fill_steps[..lit] {
            layer.draw(&mut self.display);
        }

        let mut rpm_text: heapless::String<8> = heapless::String::new();
        let _ = write!(rpm_text, "{}", snapshot.display_rpm());
        Text::with_text_style(&rpm_text, Point::new(RPM_TEXT_X, RPM_TEXT_Y), VALUE_STYLE_WHITE, TOP_LEFT)
            .draw(&mut self.display)
            .ok();

        let mut speed_text: heapless::String<8> = heapless::String::new();
        let _ = write!(speed_text, "{}", snapshot.display_speed());
        Text::with_text_style(&speed_text, Point::new(SPEED_TEXT_X, SPEED_TEXT_Y), VALUE_STYLE_WHITE, TOP_LEFT)
            .draw(&mut self.display)
            .ok();

        // The one visible state transition for this tick
        window.update(&self.display);
    }

    fn quit_requested(&mut self) -> bool {
        match self.window.as_mut() {
            Some(window) => window.events().any(|event| matches!(event, SimulatorEvent::Quit)),
            None => false,
        }
    }

    fn release(&mut self) {
        if self.window.take().is_some() {
            info!("display released");
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
