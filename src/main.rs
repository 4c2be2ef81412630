// Crate-level lints: pixel math and PID decoding cast freely between
// numeric types with known-small ranges
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

//! Layered RPM gauge for an in-car Raspberry Pi dash display.
//!
//! Samples engine RPM and vehicle speed over an ELM327 OBD-II adapter,
//! renders a 30-layer gauge visualization at 30 FPS on the 800x480 panel,
//! and powers the Pi off cleanly when the ignition-off line (GPIO 3) is
//! driven low.
//!
//! # Architecture
//!
//! ```text
//!   serial (38400 baud)        sysfs GPIO 3 (falling edge)
//!          |                            |
//!     [Elm327]                  [ShutdownMonitor]--- monitor thread
//!          |                            |
//!  [TelemetrySource]            (ShutdownRequest - atomic flag)
//!          |                            |
//!          +------[DashboardController]-+            main thread
//!                        |
//!                 [GaugeRenderer]
//!                        |
//!              off-screen compose -> single present
//! ```
//!
//! Data flows one way per tick (source -> controller -> renderer); the
//! monitor thread communicates only through the atomic flag. On shutdown
//! the controller releases the display and the GPIO line, waits out a
//! grace pause, issues `shutdown -h now` once, and exits 0.
//!
//! # Startup Failures
//!
//! Missing gauge art, an absent serial adapter, or an unavailable GPIO
//! line abort the process with a diagnostic before the run loop starts.
//! After startup, telemetry failures only ever degrade readings to their
//! zero-equivalent display - the loop never stalls on the link.

mod colors;
mod config;
mod controller;
mod gauge;
mod obd;
mod shutdown;
mod styles;
mod telemetry;

use std::path::Path;

use anyhow::Context;

use crate::config::{IMAGE_DIR, SERIAL_BAUD, SERIAL_DEVICE, SHUTDOWN_PIN};
use crate::controller::DashboardController;
use crate::gauge::{GaugeLayerSet, GaugeRenderer};
use crate::obd::Elm327;
use crate::shutdown::{HostPower, ShutdownMonitor, ShutdownRequest};
use crate::telemetry::TelemetrySource;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Resource acquisition is all-or-nothing: any failure below aborts
    // with a non-zero exit before the run loop starts
    let layers = GaugeLayerSet::load(Path::new(IMAGE_DIR))?;
    let gauge = GaugeRenderer::new(layers);

    let link = Elm327::open(SERIAL_DEVICE, SERIAL_BAUD)
        .with_context(|| format!("opening diagnostics link on {SERIAL_DEVICE}"))?;
    let source = TelemetrySource::new(Box::new(link));

    let request = ShutdownRequest::new();
    let monitor = ShutdownMonitor::spawn(SHUTDOWN_PIN, request.clone())?;

    DashboardController::new(source, gauge, monitor, HostPower, request).run();

    Ok(())
}
