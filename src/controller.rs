//! Dashboard run loop and shutdown orchestration.
//!
//! The controller owns the only loop in the process. Per tick while
//! running: drain the window's quit indication, check the shutdown flag,
//! then sample telemetry, present one frame, and sleep out the rest of
//! the ~33ms budget. Both exit signals are observed at tick boundaries
//! only - a tick in progress always completes its render before the
//! transition is honored, and nothing here suspends except the deliberate
//! pacing sleep.
//!
//! Teardown runs on this loop's own thread of control (never from the
//! monitor context) and walks every release step regardless of earlier
//! failures: display and GPIO go first, then a grace pause for the
//! in-flight presentation, then the power-off command - issued exactly
//! once, even if teardown is re-entered.

use std::thread;
use std::time::Instant;

use log::{debug, info};

use crate::config::{FRAME_TIME, PACING_LOG_INTERVAL, SHUTDOWN_GRACE};
use crate::gauge::FrameSink;
use crate::shutdown::{InterruptLine, PowerControl, ShutdownRequest};
use crate::telemetry::TelemetrySource;

/// Lifecycle of the dashboard process.
///
/// `Running -> ShuttingDown` on a quit indication or the shutdown flag;
/// `ShuttingDown -> Stopped` once teardown completes. Nothing leaves
/// `Stopped`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum RunState {
    #[default]
    Running,
    ShuttingDown,
    Stopped,
}

/// Owns the run loop and every main-loop resource.
pub struct DashboardController<G, L, P>
where
    G: FrameSink,
    L: InterruptLine,
    P: PowerControl,
{
    source: TelemetrySource,
    gauge: G,
    monitor: L,
    power: P,
    request: ShutdownRequest,
    state: RunState,
}

impl<G, L, P> DashboardController<G, L, P>
where
    G: FrameSink,
    L: InterruptLine,
    P: PowerControl,
{
    pub fn new(source: TelemetrySource, gauge: G, monitor: L, power: P, request: ShutdownRequest) -> Self {
        Self {
            source,
            gauge,
            monitor,
            power,
            request,
            state: RunState::Running,
        }
    }

    pub const fn state(&self) -> RunState { self.state }

    /// Run until the shutdown transition reaches `Stopped`.
    pub fn run(&mut self) {
        info!("dashboard running");

        let mut fps_frame_count = 0u32;
        let mut last_pacing_log = Instant::now();

        while self.state == RunState::Running {
            let frame_start = Instant::now();

            // Exit signals, in order: window close first, then the
            // hardware line's flag
            if self.gauge.quit_requested() {
                info!("quit requested by display");
                self.state = RunState::ShuttingDown;
                break;
            }
            if self.request.is_raised() {
                self.state = RunState::ShuttingDown;
                break;
            }

            let snapshot = self.source.sample();
            self.gauge.present(&snapshot);

            fps_frame_count += 1;
            if last_pacing_log.elapsed() >= PACING_LOG_INTERVAL {
                let fps = fps_frame_count as f32 / last_pacing_log.elapsed().as_secs_f32();
                debug!("pacing: {fps:.1} fps");
                fps_frame_count = 0;
                last_pacing_log = Instant::now();
            }

            // Sleep out the remaining frame budget. An overlong tick just
            // delays the next one - no frame skipping, no catch-up burst
            let pre_sleep = frame_start.elapsed();
            if pre_sleep < FRAME_TIME {
                thread::sleep(FRAME_TIME - pre_sleep);
            }
        }

        self.teardown();
    }

    /// Ordered, idempotent teardown; leaves the state at `Stopped`.
    ///
    /// No new queries or renders happen once this starts. Each release is
    /// best-effort and logs its own failures, so a bad step cannot strand
    /// the ones after it. The power-off command goes out exactly once.
    pub fn teardown(&mut self) {
        if self.state == RunState::Stopped {
            return;
        }
        self.state = RunState::ShuttingDown;
        info!("shutting down");

        self.gauge.release();
        self.monitor.release();

        // Let the last presentation settle before the OS goes away
        thread::sleep(SHUTDOWN_GRACE);

        self.power.power_off();
        self.state = RunState::Stopped;
        info!("stopped");
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
