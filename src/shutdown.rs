//! Ignition-off monitoring and host power-off.
//!
//! The shutdown line idles high behind the Pi's pull-up; the body control
//! side drives it low when the ignition switches off. A dedicated monitor
//! thread watches the line through the sysfs edge poller and, on the first
//! clean driven-low edge, raises the [`ShutdownRequest`] flag - nothing
//! else. All teardown happens on the controller's own loop, never from the
//! monitoring context.
//!
//! The [`EdgeLatch`] collapses contact bounce (multiple edges inside the
//! debounce window) and any later re-assertion into that single request:
//! the latch fires at most once per process lifetime, there is no
//! re-arming.
//!
//! The flag is the only state shared between the monitor thread and the
//! render loop, and it is a single atomic - no locks anywhere near the
//! display or the diagnostics link.

use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Context;
use linux_embedded_hal::sysfs_gpio::{Direction, Edge, Pin};
use log::{info, trace, warn};

use crate::config::{EDGE_POLL_TIMEOUT_MS, SHUTDOWN_DEBOUNCE};

// =============================================================================
// Shutdown Request Flag
// =============================================================================

/// Single-writer, single-reader shutdown flag.
///
/// Cloned handles share one atomic. Raising is idempotent and one-way:
/// once raised the flag stays raised for the rest of the process.
#[derive(Clone, Debug, Default)]
pub struct ShutdownRequest {
    raised: Arc<AtomicBool>,
}

impl ShutdownRequest {
    pub fn new() -> Self { Self::default() }

    /// Raise the flag. Safe to call from the monitor thread; safe to call
    /// more than once.
    pub fn raise(&self) { self.raised.store(true, Ordering::SeqCst); }

    /// Observed by the controller at tick boundaries.
    pub fn is_raised(&self) -> bool { self.raised.load(Ordering::SeqCst) }
}

// =============================================================================
// Edge Latch (debounce + fire-once)
// =============================================================================

/// How the latch classified an offered edge.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EdgeOutcome {
    /// First clean edge: act on it.
    Fired,
    /// Electrical bounce inside the debounce window: absorb silently.
    Bounce,
    /// Latch already fired earlier: absorb, no re-arming.
    Spent,
}

/// Time-based edge latch: accepts exactly one edge, ever.
///
/// Edges arriving within `window` of the fired edge are bounce; edges
/// after that are late re-assertions of an already-handled signal. Either
/// way, only the first edge produces [`EdgeOutcome::Fired`].
pub struct EdgeLatch {
    window: Duration,
    fired_at: Option<Instant>,
}

impl EdgeLatch {
    pub const fn new(window: Duration) -> Self { Self { window, fired_at: None } }

    /// Offer an edge observed at `at`.
    pub fn offer(&mut self, at: Instant) -> EdgeOutcome {
        match self.fired_at {
            None => {
                self.fired_at = Some(at);
                EdgeOutcome::Fired
            }
            Some(fired) if at.saturating_duration_since(fired) < self.window => EdgeOutcome::Bounce,
            Some(_) => EdgeOutcome::Spent,
        }
    }
}

// =============================================================================
// Shutdown Monitor
// =============================================================================

/// Release seam for the hardware interrupt resource, so teardown ordering
/// can be exercised in tests without a GPIO character device.
pub trait InterruptLine {
    /// Stop monitoring and deconfigure the line. Idempotent.
    fn release(&mut self);
}

/// Owns the GPIO line and the monitor thread.
pub struct ShutdownMonitor {
    pin: Pin,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ShutdownMonitor {
    /// Export and arm the line, then start the monitor thread.
    ///
    /// Failure here (line unavailable, sysfs permissions) is a startup
    /// error and fatal to the caller.
    pub fn spawn(pin_number: u64, request: ShutdownRequest) -> anyhow::Result<Self> {
        let pin = Pin::new(pin_number);
        pin.export().with_context(|| format!("exporting GPIO {pin_number}"))?;
        pin.set_direction(Direction::In)
            .with_context(|| format!("configuring GPIO {pin_number} as input"))?;
        pin.set_edge(Edge::FallingEdge)
            .with_context(|| format!("arming falling-edge events on GPIO {pin_number}"))?;
        let mut poller = pin
            .get_poller()
            .with_context(|| format!("opening edge poller for GPIO {pin_number}"))?;

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let thread = thread::Builder::new()
            .name("shutdown-monitor".into())
            .spawn(move || {
                let mut latch = EdgeLatch::new(SHUTDOWN_DEBOUNCE);
                while !thread_stop.load(Ordering::SeqCst) {
                    match poller.poll(EDGE_POLL_TIMEOUT_MS) {
                        // Asserted means driven low. This also filters the
                        // readout sysfs delivers right after arming, which
                        // reports the pulled-up idle level.
                        Ok(Some(0)) => match latch.offer(Instant::now()) {
                            EdgeOutcome::Fired => {
                                info!("shutdown line asserted, requesting shutdown");
                                request.raise();
                            }
                            EdgeOutcome::Bounce => trace!("shutdown line bounce absorbed"),
                            EdgeOutcome::Spent => trace!("shutdown line edge after latch fired"),
                        },
                        Ok(Some(_)) => {}
                        Ok(None) => {} // poll timeout; recheck the stop flag
                        Err(err) => {
                            warn!("shutdown line poll failed: {err}");
                            break;
                        }
                    }
                }
            })
            .context("spawning shutdown monitor thread")?;

        info!("shutdown monitor armed on GPIO {pin_number}");
        Ok(Self {
            pin,
            stop,
            thread: Some(thread),
        })
    }
}

impl InterruptLine for ShutdownMonitor {
    fn release(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        self.stop.store(true, Ordering::SeqCst);
        if thread.join().is_err() {
            warn!("shutdown monitor thread panicked");
        }
        if let Err(err) = self.pin.unexport() {
            warn!("releasing shutdown line: {err}");
        }
        info!("shutdown line released");
    }
}

impl Drop for ShutdownMonitor {
    fn drop(&mut self) { self.release(); }
}

// =============================================================================
// Power Control
// =============================================================================

/// Host power-off capability, mockable for teardown tests.
pub trait PowerControl {
    /// Issue the power-off command. Fire-and-forget, best-effort.
    fn power_off(&mut self);
}

/// Powers the host off through the OS.
pub struct HostPower;

impl PowerControl for HostPower {
    fn power_off(&mut self) {
        info!("issuing host power-off");
        // Spawn without waiting: the OS is about to terminate this process
        if let Err(err) = Command::new("sudo").args(["shutdown", "-h", "now"]).spawn() {
            warn!("power-off command failed to launch: {err}");
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // ShutdownRequest Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_request_starts_lowered() {
        let request = ShutdownRequest::new();
        assert!(!request.is_raised());
    }

    #[test]
    fn test_request_raise_is_sticky_and_idempotent() {
        let request = ShutdownRequest::new();
        request.raise();
        assert!(request.is_raised());

        // Raising again changes nothing; the flag never clears
        request.raise();
        assert!(request.is_raised(), "raised flag must stay raised");
    }

    #[test]
    fn test_request_clones_share_the_flag() {
        let request = ShutdownRequest::new();
        let handle = request.clone();

        handle.raise();
        assert!(request.is_raised(), "clone raises the same underlying flag");
    }

    // -------------------------------------------------------------------------
    // EdgeLatch Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_latch_fires_on_first_edge() {
        let mut latch = EdgeLatch::new(Duration::from_millis(200));
        assert_eq!(latch.offer(Instant::now()), EdgeOutcome::Fired);
    }

    #[test]
    fn test_latch_absorbs_bounce_inside_window() {
        let mut latch = EdgeLatch::new(Duration::from_millis(200));
        let t0 = Instant::now();

        assert_eq!(latch.offer(t0), EdgeOutcome::Fired);
        assert_eq!(latch.offer(t0 + Duration::from_millis(5)), EdgeOutcome::Bounce);
        assert_eq!(latch.offer(t0 + Duration::from_millis(150)), EdgeOutcome::Bounce);
        assert_eq!(latch.offer(t0 + Duration::from_millis(199)), EdgeOutcome::Bounce);
    }

    #[test]
    fn test_latch_is_spent_after_window() {
        let mut latch = EdgeLatch::new(Duration::from_millis(200));
        let t0 = Instant::now();

        assert_eq!(latch.offer(t0), EdgeOutcome::Fired);
        assert_eq!(
            latch.offer(t0 + Duration::from_millis(200)),
            EdgeOutcome::Spent,
            "no re-arming: later edges never fire again"
        );
        assert_eq!(latch.offer(t0 + Duration::from_secs(3600)), EdgeOutcome::Spent);
    }

    #[test]
    fn test_latch_produces_exactly_one_request() {
        // The property the debounce exists for: a burst of edges raises
        // exactly one shutdown request
        let request = ShutdownRequest::new();
        let mut latch = EdgeLatch::new(Duration::from_millis(200));
        let t0 = Instant::now();

        let mut fired = 0;
        for ms in [0u64, 2, 10, 50, 120, 180] {
            if latch.offer(t0 + Duration::from_millis(ms)) == EdgeOutcome::Fired {
                request.raise();
                fired += 1;
            }
        }

        assert_eq!(fired, 1, "edge burst must collapse into a single request");
        assert!(request.is_raised());
    }

    #[test]
    fn test_latch_tolerates_out_of_order_timestamps() {
        // saturating_duration_since keeps a clock oddity from panicking
        let mut latch = EdgeLatch::new(Duration::from_millis(200));
        let t0 = Instant::now();

        assert_eq!(latch.offer(t0 + Duration::from_millis(100)), EdgeOutcome::Fired);
        assert_eq!(latch.offer(t0), EdgeOutcome::Bounce);
    }
}
