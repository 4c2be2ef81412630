//! Telemetry sampling over the diagnostics link.
//!
//! [`TelemetrySource`] turns the fallible, half-duplex query capability of
//! the OBD adapter into an infallible per-tick [`TelemetrySnapshot`]: a
//! query that fails, times out, or reports NO DATA degrades that field to
//! unknown instead of surfacing an error or stalling the render cadence.
//!
//! The link is driven through the [`DiagnosticsLink`] trait so the source
//! can be exercised against a scripted mock; the production implementation
//! is the ELM327 adapter in [`crate::obd`]. Queries are issued strictly in
//! sequence - the transport is request/response over a single serial line,
//! and exclusive `&mut` access is what enforces that.

use log::debug;

use crate::obd::ObdError;

/// Mode-01 parameters the gauge reads each tick.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Pid {
    /// Engine speed, rev/min (PID 0x0C).
    EngineRpm,
    /// Vehicle speed, km/h (PID 0x0D).
    VehicleSpeed,
}

impl Pid {
    /// Mode-01 PID byte.
    pub const fn code(self) -> u8 {
        match self {
            Self::EngineRpm => 0x0C,
            Self::VehicleSpeed => 0x0D,
        }
    }
}

/// One tick's readings. Produced fresh by [`TelemetrySource::sample`],
/// consumed by exactly one render, then superseded wholesale.
///
/// A field is `None` only when the underlying query explicitly produced no
/// usable value. The renderer coerces unknown to the zero glyph via
/// [`display_rpm`](Self::display_rpm) / [`display_speed`](Self::display_speed);
/// the snapshot itself never loses the distinction.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct TelemetrySnapshot {
    /// Engine speed in rev/min, or unknown.
    pub rpm: Option<u32>,
    /// Vehicle speed in km/h, or unknown.
    pub speed: Option<u32>,
}

impl TelemetrySnapshot {
    /// RPM as displayed: unknown reads as zero.
    pub fn display_rpm(&self) -> u32 { self.rpm.unwrap_or(0) }

    /// Speed as displayed: unknown reads as zero.
    pub fn display_speed(&self) -> u32 { self.speed.unwrap_or(0) }
}

/// Request/response query capability of the diagnostics adapter.
///
/// `Ok(None)` is the adapter's explicit NO DATA indication; `Err` covers
/// transport failures and malformed responses. Implementations must bound
/// how long a single query can block.
pub trait DiagnosticsLink {
    fn query(&mut self, pid: Pid) -> Result<Option<f32>, ObdError>;
}

/// Samples the diagnostics link once per tick.
pub struct TelemetrySource {
    link: Box<dyn DiagnosticsLink>,
}

impl TelemetrySource {
    pub fn new(link: Box<dyn DiagnosticsLink>) -> Self { Self { link } }

    /// Query both parameters and return the tick's snapshot.
    ///
    /// Never fails: each field independently degrades to unknown on any
    /// query problem. RPM is queried before speed, back to back on the
    /// shared link.
    pub fn sample(&mut self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            rpm: self.read(Pid::EngineRpm),
            speed: self.read(Pid::VehicleSpeed),
        }
    }

    /// Run one query, folding every failure mode into `None`.
    fn read(&mut self, pid: Pid) -> Option<u32> {
        match self.link.query(pid) {
            Ok(Some(value)) if value >= 0.0 => Some(value as u32),
            Ok(Some(value)) => {
                // Decoded fine but outside the parameter's domain; treat
                // like a malformed response rather than clamping it into
                // a plausible reading
                debug!("{pid:?} out of domain: {value}");
                None
            }
            Ok(None) => {
                debug!("{pid:?}: no data");
                None
            }
            Err(err) => {
                debug!("{pid:?} query failed: {err}");
                None
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    /// What the scripted link answers for one PID.
    #[derive(Clone, Copy)]
    enum Reply {
        Value(f32),
        NoData,
        Fail,
    }

    /// Scripted link: fixed answer per PID, query order recorded through a
    /// shared handle so it stays observable after the link is boxed.
    struct ScriptedLink {
        rpm: Reply,
        speed: Reply,
        queried: Rc<RefCell<Vec<Pid>>>,
    }

    impl DiagnosticsLink for ScriptedLink {
        fn query(&mut self, pid: Pid) -> Result<Option<f32>, ObdError> {
            self.queried.borrow_mut().push(pid);
            let reply = match pid {
                Pid::EngineRpm => self.rpm,
                Pid::VehicleSpeed => self.speed,
            };
            match reply {
                Reply::Value(v) => Ok(Some(v)),
                Reply::NoData => Ok(None),
                Reply::Fail => Err(ObdError::Malformed("scripted failure".into())),
            }
        }
    }

    fn source_with(rpm: Reply, speed: Reply) -> (TelemetrySource, Rc<RefCell<Vec<Pid>>>) {
        let queried = Rc::new(RefCell::new(Vec::new()));
        let link = ScriptedLink {
            rpm,
            speed,
            queried: Rc::clone(&queried),
        };
        (TelemetrySource::new(Box::new(link)), queried)
    }

    // -------------------------------------------------------------------------
    // Snapshot Production Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_sample_good_readings() {
        let (mut source, _) = source_with(Reply::Value(5000.0), Reply::Value(120.0));
        let snapshot = source.sample();

        assert_eq!(snapshot.rpm, Some(5000), "RPM should carry the decoded value");
        assert_eq!(snapshot.speed, Some(120), "speed should carry the decoded value");
    }

    #[test]
    fn test_sample_no_data_yields_unknown_fields() {
        let (mut source, _) = source_with(Reply::NoData, Reply::NoData);
        let snapshot = source.sample();

        assert_eq!(snapshot.rpm, None, "NO DATA must map to unknown, not zero");
        assert_eq!(snapshot.speed, None, "NO DATA must map to unknown, not zero");
    }

    #[test]
    fn test_sample_query_error_yields_unknown_field() {
        let (mut source, _) = source_with(Reply::Fail, Reply::Value(88.0));
        let snapshot = source.sample();

        assert_eq!(snapshot.rpm, None, "failed query degrades only its own field");
        assert_eq!(snapshot.speed, Some(88), "the other field is unaffected");
    }

    #[test]
    fn test_sample_negative_reading_is_unknown() {
        // A decoded value can only be negative if the response was bogus;
        // it must not wrap into a huge unsigned reading
        let (mut source, _) = source_with(Reply::Value(-42.0), Reply::Value(-1.0));
        let snapshot = source.sample();

        assert_eq!(snapshot.rpm, None);
        assert_eq!(snapshot.speed, None);
    }

    #[test]
    fn test_sample_queries_in_sequence() {
        let (mut source, queried) = source_with(Reply::Value(1000.0), Reply::Value(50.0));
        source.sample();
        source.sample();

        assert_eq!(
            *queried.borrow(),
            vec![Pid::EngineRpm, Pid::VehicleSpeed, Pid::EngineRpm, Pid::VehicleSpeed],
            "RPM is queried before speed, one transaction at a time"
        );
    }

    // -------------------------------------------------------------------------
    // Zero-Equivalent Display Policy Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_display_values_coerce_unknown_to_zero() {
        let snapshot = TelemetrySnapshot::default();
        assert_eq!(snapshot.display_rpm(), 0, "unknown RPM displays as the zero glyph");
        assert_eq!(snapshot.display_speed(), 0, "unknown speed displays as the zero glyph");
    }

    #[test]
    fn test_display_values_pass_known_through() {
        let snapshot = TelemetrySnapshot {
            rpm: Some(3200),
            speed: Some(64),
        };
        assert_eq!(snapshot.display_rpm(), 3200);
        assert_eq!(snapshot.display_speed(), 64);
    }

    #[test]
    fn test_pid_codes() {
        assert_eq!(Pid::EngineRpm.code(), 0x0C);
        assert_eq!(Pid::VehicleSpeed.code(), 0x0D);
    }
}
