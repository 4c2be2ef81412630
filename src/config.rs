//! Deployment constants for the gauge display.
//!
//! Everything the reference installation pins down lives here as `const`:
//! panel geometry, frame cadence, gauge layer math, asset naming, the
//! diagnostics link parameters, and the shutdown line wiring. Derived
//! values are pre-computed at compile time and validated with `const`
//! assertions so a bad edit fails the build instead of the boot.

use std::time::Duration;

// =============================================================================
// Display Configuration
// =============================================================================

/// Panel width in pixels (800x480 HDMI dash panel).
pub const SCREEN_WIDTH: u32 = 800;

/// Panel height in pixels.
pub const SCREEN_HEIGHT: u32 = 480;

/// Window/caption title shown when running on a desktop.
pub const WINDOW_TITLE: &str = "Custom Gauge";

// =============================================================================
// Gauge Layer Configuration
// =============================================================================

/// Number of cumulative fill layers (`RECTANGLE_1.png` .. `RECTANGLE_30.png`).
pub const LAYER_COUNT: usize = 30;

/// RPM span represented by one fill layer.
///
/// Layer k lights up at `(k - 1) * RPM_STEP` rev/min, so the full stack
/// covers just under 8000 rpm - the engine's redline band.
pub const RPM_STEP: u32 = 266;

/// Directory holding the gauge image assets, relative to the working dir.
pub const IMAGE_DIR: &str = "images";

/// Background layer asset name.
pub const BACKGROUND_IMAGE: &str = "GAUGE_BG.png";

// Full stack must cover the redline band (29 * 266 = 7714 < 8000)
const _: () = assert!((LAYER_COUNT as u32 - 1) * RPM_STEP < 8000);

// =============================================================================
// Text Overlay Positions
// =============================================================================

/// Top-left anchor of the numeric RPM readout.
pub const RPM_TEXT_X: i32 = 222;
pub const RPM_TEXT_Y: i32 = 196;

/// Top-left anchor of the numeric speed readout.
pub const SPEED_TEXT_X: i32 = 208;
pub const SPEED_TEXT_Y: i32 = 326;

// =============================================================================
// Timing Configuration
// =============================================================================

/// Target frame time (~30 FPS). The controller sleeps out the remainder of
/// each tick; a slow tick delays the next one instead of skipping frames.
pub const FRAME_TIME: Duration = Duration::from_micros(33_333);

/// Interval between pacing summary log lines (debug level).
pub const PACING_LOG_INTERVAL: Duration = Duration::from_secs(2);

/// Pause between releasing resources and issuing the power-off command,
/// letting any in-flight presentation settle before the OS goes down.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

// =============================================================================
// Diagnostics Link Configuration
// =============================================================================

/// Serial device the ELM327 adapter enumerates as.
pub const SERIAL_DEVICE: &str = "/dev/ttyUSB0";

/// Adapter baud rate.
pub const SERIAL_BAUD: u32 = 38_400;

/// Read timeout on the serial port. Each blocking read is bounded by this,
/// so a dead adapter degrades to unknown readings instead of freezing the
/// render cadence.
pub const SERIAL_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Overall deadline for one request/response transaction, prompt included.
pub const QUERY_DEADLINE: Duration = Duration::from_millis(250);

const _: () = assert!(SERIAL_READ_TIMEOUT.as_millis() < QUERY_DEADLINE.as_millis());

// =============================================================================
// Shutdown Line Configuration
// =============================================================================

/// BCM pin number of the ignition-off signal line. Idles high (BCM 3 is
/// hard-pulled up on Raspberry Pi boards); asserted means driven low.
pub const SHUTDOWN_PIN: u64 = 3;

/// Minimum interval during which further edges on the line are ignored
/// after the first, absorbing electrical bounce.
pub const SHUTDOWN_DEBOUNCE: Duration = Duration::from_millis(200);

/// Poll timeout for the edge poller. Short enough that the monitor thread
/// notices a stop request promptly during teardown.
pub const EDGE_POLL_TIMEOUT_MS: isize = 500;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_time_is_30_fps() {
        // 33.333ms per frame = 30 frames per second
        let fps = 1_000_000.0 / FRAME_TIME.as_micros() as f64;
        assert!((fps - 30.0).abs() < 0.1, "FRAME_TIME should target 30 FPS, got {fps:.2}");
    }

    #[test]
    fn test_layer_stack_covers_redline() {
        // The last layer must light before 8000 rpm so a redline pull
        // fills the whole gauge
        assert_eq!(LAYER_COUNT, 30, "reference deployment ships 30 fill layers");
        assert!((LAYER_COUNT as u32 - 1) * RPM_STEP < 8000);
    }

    #[test]
    fn test_debounce_window() {
        assert_eq!(
            SHUTDOWN_DEBOUNCE,
            Duration::from_millis(200),
            "debounce window matches the reference wiring"
        );
    }
}
