//! C8 — Plasma Lifecycle (spec §4.8). Owns the bridge setpoint, the
//! optional voltage trim target, the two auto-loop enables, and the
//! telemetry logging mode; drives the frequency and voltage controllers
//! once per completed capture. Power sequencing (the 15 V/3.3 V/HV rail
//! ramp) and remote-command line assembly are external collaborators —
//! this module only reacts to already-parsed `Command`s and already-
//! completed `CaptureBuffer`s.

use crate::acquisition::CaptureBuffer;
use crate::clock::{Clock, Microseconds};
use crate::error::PlasmaError;
use crate::freq_controller::{frequency_delta, window_readings, ControllerOutcome};
use crate::protocol::Command;
use crate::pwm::BridgeSetpoint;
use crate::voltage_controller::{deadtime_delta, peak_plasma_voltage_mv};

use crate::decode::{decode_primary, PrimaryChannel};

/// Frequency/dead-time applied by `strike()` before the tracking loops take
/// over (spec §4.8: 45 000 Hz, 1% dead-time — a deliberately narrow pulse to
/// limit inrush while the plasma column forms).
const STRIKE_FREQUENCY_HZ: u32 = 45_000;
const STRIKE_DEADTIME_PCT: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PlasmaLifecycle {
    Idle,
    Strike,
    Active,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoggingMode {
    Off,
    Continuous,
    OneShot,
}

/// Throttles continuous telemetry so a live auto-loop doesn't flood the
/// link (spec.md §9 supplement, generalizing the original's `count % 2048`
/// counter). `every == 0` logs every row.
pub struct LogCadence {
    every: u32,
    counter: u32,
}

impl LogCadence {
    pub const fn new(every: u32) -> Self {
        LogCadence { every, counter: 0 }
    }

    /// Returns `true` when this call should produce a row.
    pub fn tick(&mut self) -> bool {
        if self.every == 0 {
            return true;
        }
        self.counter += 1;
        if self.counter >= self.every {
            self.counter = 0;
            true
        } else {
            false
        }
    }
}

impl Default for LogCadence {
    fn default() -> Self {
        LogCadence::new(2048)
    }
}

/// One telemetry row (spec §6's CSV line, pre-formatting — rendering to
/// bytes is `plasma-fw`'s job).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CsvRow {
    pub us_time: u64,
    pub freq_hz: u32,
    pub deadtime_pct: u8,
    pub is_ma: i32,
    pub vpla_l1_mv: i32,
    pub vpla_l2_mv: i32,
    pub vbri_s1_mv: i32,
    pub vbri_s2_mv: i32,
    pub gate_raw: u16,
    pub upper: i32,
    pub lower: i32,
}

fn build_csv_row(capture: &CaptureBuffer, setpoint: &BridgeSetpoint, us_time: Microseconds) -> CsvRow {
    let current_ma = decode_primary(PrimaryChannel::BridgeCurrent, capture.slot(0, PrimaryChannel::BridgeCurrent as usize));
    let vpla_l1 = decode_primary(PrimaryChannel::PlasmaVoltL1, capture.slot(0, PrimaryChannel::PlasmaVoltL1 as usize));
    let vpla_l2 = decode_primary(PrimaryChannel::PlasmaVoltL2, capture.slot(0, PrimaryChannel::PlasmaVoltL2 as usize));
    let vbri_s1 = decode_primary(PrimaryChannel::BridgeVoltS1, capture.slot(0, PrimaryChannel::BridgeVoltS1 as usize));
    let vbri_s2 = decode_primary(PrimaryChannel::BridgeVoltS2, capture.slot(0, PrimaryChannel::BridgeVoltS2 as usize));
    let readings = window_readings(capture);

    CsvRow {
        us_time: us_time.0,
        freq_hz: setpoint.frequency_hz,
        deadtime_pct: setpoint.deadtime_pct,
        is_ma: current_ma as i32,
        vpla_l1_mv: vpla_l1 as i32,
        vpla_l2_mv: vpla_l2 as i32,
        vbri_s1_mv: vbri_s1 as i32,
        vbri_s2_mv: vbri_s2 as i32,
        gate_raw: readings.map(|r| r.gate_raw).unwrap_or(0),
        upper: readings.map(|r| r.upper_ma as i32).unwrap_or(0),
        lower: readings.map(|r| r.lower_ma as i32).unwrap_or(0),
    }
}

/// Outcome of one `active_step` call: the setpoint to (re)program if
/// `setpoint_changed`, plus an optional telemetry row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveStepResult {
    pub setpoint: BridgeSetpoint,
    pub setpoint_changed: bool,
    pub log_row: Option<CsvRow>,
    pub converged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reply {
    Ack,
    Bool(bool),
    Frequency(u32),
    Deadtime(u8),
    VoltageSetpoint(Option<i32>),
    Rejected(PlasmaError),
}

pub struct LifecycleDriver {
    lifecycle: PlasmaLifecycle,
    setpoint: BridgeSetpoint,
    voltage_setpoint: Option<i32>,
    auto_freq: bool,
    auto_voltage: bool,
    logging: LoggingMode,
    cadence: LogCadence,
}

impl LifecycleDriver {
    pub fn new() -> Self {
        LifecycleDriver {
            lifecycle: PlasmaLifecycle::Idle,
            setpoint: BridgeSetpoint::new(30_000, 35),
            voltage_setpoint: None,
            auto_freq: false,
            auto_voltage: false,
            logging: LoggingMode::Off,
            cadence: LogCadence::default(),
        }
    }

    pub fn lifecycle(&self) -> PlasmaLifecycle {
        self.lifecycle
    }

    pub fn setpoint(&self) -> BridgeSetpoint {
        self.setpoint
    }

    /// One-shot transition into `Active` with the narrow strike pulse
    /// (spec §4.8). Rejected unless the caller has already confirmed HV is
    /// energized (sequencer's `hv_is_on()`); this is a second line of
    /// defense, the sequencer's own interlock is authoritative.
    pub fn strike(&mut self, hv_is_on: bool) -> Result<BridgeSetpoint, PlasmaError> {
        if !hv_is_on {
            return Err(PlasmaError::InterlockViolation);
        }
        self.setpoint.on = true;
        self.setpoint.frequency_hz = STRIKE_FREQUENCY_HZ;
        self.setpoint.deadtime_pct = STRIKE_DEADTIME_PCT;
        self.setpoint.clamp();
        self.lifecycle = PlasmaLifecycle::Strike;
        let applied = self.setpoint;
        self.lifecycle = PlasmaLifecycle::Active;
        Ok(applied)
    }

    /// Spec §4.8 `Active` body: run whichever tracking loops are armed
    /// against the freshly completed `capture`, clamp, and decide whether
    /// this cycle produces a telemetry row.
    pub fn active_step(&mut self, capture: &CaptureBuffer, clock: &impl Clock) -> ActiveStepResult {
        let mut setpoint_changed = false;
        let mut converged = true;

        if self.auto_freq {
            match frequency_delta(capture) {
                ControllerOutcome::Valid(delta) => {
                    if delta != 0 {
                        let new_freq = (self.setpoint.frequency_hz as i64 + delta as i64).clamp(0, u32::MAX as i64) as u32;
                        self.setpoint.frequency_hz = new_freq;
                        setpoint_changed = true;
                    }
                }
                ControllerOutcome::Invalid => converged = false,
            }
        }

        if self.auto_voltage {
            if let Some(v_desired) = self.voltage_setpoint {
                let delta = deadtime_delta(v_desired, capture);
                if delta != 0 {
                    let new_dt = (self.setpoint.deadtime_pct as i32 + delta).clamp(0, 255) as u8;
                    self.setpoint.deadtime_pct = new_dt;
                    setpoint_changed = true;
                }
            }
        }

        self.setpoint.clamp_auto_loop();

        let log_row = match self.logging {
            LoggingMode::Continuous => {
                if self.cadence.tick() {
                    Some(build_csv_row(capture, &self.setpoint, clock.now_us()))
                } else {
                    None
                }
            }
            LoggingMode::OneShot => {
                self.logging = LoggingMode::Off;
                Some(build_csv_row(capture, &self.setpoint, clock.now_us()))
            }
            LoggingMode::Off => None,
        };

        ActiveStepResult {
            setpoint: self.setpoint,
            setpoint_changed,
            log_row,
            converged,
        }
    }

    /// Spec §4.8 `Stop`: drive the bridge off. The caller is responsible
    /// for the matching `PowerSequencer::power_off_high` call; once that's
    /// confirmed, call `acknowledge_stopped`.
    pub fn stop(&mut self) -> BridgeSetpoint {
        self.setpoint.on = false;
        self.lifecycle = PlasmaLifecycle::Stop;
        self.setpoint
    }

    pub fn acknowledge_stopped(&mut self) {
        self.lifecycle = PlasmaLifecycle::Idle;
    }

    /// Handles the subset of `Command`s that only touch lifecycle state
    /// (setpoints, auto-loop enables, logging mode). Power-rail and
    /// plasma-on/off commands need sequencer coordination and are handled
    /// by the caller directly against `strike`/`stop`/`PowerSequencer`.
    pub fn handle_command(&mut self, cmd: Command) -> Reply {
        use crate::pwm::{MAX_DEADTIME, MAX_FREQ, MIN_DEADTIME, MIN_FREQ};

        match cmd {
            Command::QueryFrequency => Reply::Frequency(self.setpoint.frequency_hz),
            Command::SetFrequency(hz) => {
                if !(MIN_FREQ..=MAX_FREQ).contains(&hz) {
                    return Reply::Rejected(PlasmaError::OutOfRange);
                }
                self.setpoint.frequency_hz = hz;
                Reply::Ack
            }
            Command::QueryDeadtime => Reply::Deadtime(self.setpoint.deadtime_pct),
            Command::SetDeadtime(pct) => {
                if !(MIN_DEADTIME..=MAX_DEADTIME).contains(&pct) {
                    return Reply::Rejected(PlasmaError::OutOfRange);
                }
                self.setpoint.deadtime_pct = pct;
                Reply::Ack
            }
            Command::QueryVoltageSetpoint => Reply::VoltageSetpoint(self.voltage_setpoint),
            Command::SetVoltageSetpoint(v) => {
                self.voltage_setpoint = v;
                Reply::Ack
            }
            Command::LoggingOff => {
                self.logging = LoggingMode::Off;
                Reply::Ack
            }
            Command::LoggingOn => {
                self.logging = LoggingMode::Continuous;
                Reply::Ack
            }
            Command::LoggingHeader => Reply::Ack,
            Command::LoggingOneShot => {
                self.logging = LoggingMode::OneShot;
                Reply::Ack
            }
            Command::AutoFreqOn => {
                self.auto_freq = true;
                Reply::Ack
            }
            Command::AutoFreqOff => {
                self.auto_freq = false;
                Reply::Ack
            }
            Command::AutoVoltageOn => {
                self.auto_voltage = true;
                Reply::Ack
            }
            Command::AutoVoltageOff => {
                self.auto_voltage = false;
                Reply::Ack
            }
            _ => Reply::Rejected(PlasmaError::OutOfRange),
        }
    }
}

impl Default for LifecycleDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Spec §5: one command is consumed per foreground-loop iteration, before
/// the control step runs. Implemented by `plasma-fw` over its UART RX ring.
pub trait CommandSource {
    fn take_ready(&mut self) -> Option<Command>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::PRIMARY_CHANNELS_PER_GROUP;
    use crate::protocol::Supply;
    use core::cell::Cell;

    struct FakeClock {
        now: Cell<u64>,
    }
    impl Clock for FakeClock {
        fn now_us(&self) -> Microseconds {
            Microseconds(self.now.get())
        }
    }

    #[test]
    fn strike_is_rejected_without_hv() {
        let mut driver = LifecycleDriver::new();
        let result = driver.strike(false);
        assert_eq!(result, Err(PlasmaError::InterlockViolation));
        assert_eq!(driver.lifecycle(), PlasmaLifecycle::Idle);
    }

    #[test]
    fn strike_applies_narrow_pulse_and_enters_active() {
        let mut driver = LifecycleDriver::new();
        let setpoint = driver.strike(true).unwrap();
        assert!(setpoint.on);
        assert_eq!(setpoint.frequency_hz, STRIKE_FREQUENCY_HZ);
        assert_eq!(setpoint.deadtime_pct, STRIKE_DEADTIME_PCT);
        assert_eq!(driver.lifecycle(), PlasmaLifecycle::Active);
    }

    #[test]
    fn auto_freq_loop_updates_setpoint_from_capture() {
        let mut driver = LifecycleDriver::new();
        driver.strike(true).unwrap();
        driver.handle_command(Command::AutoFreqOn);

        // Build a capture identical to the freq_controller scenario that
        // yields delta = -800.
        let mut capture = CaptureBuffer::new();
        capture.groups_used = 20;
        for g in 0..20usize {
            let gate = if (5..=15).contains(&g) { 0u16 } else { 65_535u16 };
            capture.primary_samples[g * PRIMARY_CHANNELS_PER_GROUP] = gate;
            let current_ma = if (5..=15).contains(&g) {
                100.0 + (g - 5) as f32 * 40.0
            } else {
                100.0
            };
            let v = current_ma * 3.594286 / 50_000.0 + 1.585714;
            let raw = ((v / 3.3) * 65536.0) as u16;
            capture.primary_samples[g * PRIMARY_CHANNELS_PER_GROUP + 1] = raw;
        }

        let clock = FakeClock { now: Cell::new(0) };
        let before = driver.setpoint().frequency_hz;
        let result = driver.active_step(&capture, &clock);
        assert!(result.setpoint_changed);
        assert_eq!(result.setpoint.frequency_hz, (before as i32 - 800) as u32);
        assert!(result.converged);
    }

    #[test]
    fn continuous_logging_respects_cadence() {
        let mut driver = LifecycleDriver::new();
        driver.strike(true).unwrap();
        driver.handle_command(Command::LoggingOn);
        // force a tight cadence for the test via repeated one-shot behavior
        let capture = CaptureBuffer::new();
        let clock = FakeClock { now: Cell::new(0) };
        let mut logged = 0;
        for _ in 0..2048 {
            let r = driver.active_step(&capture, &clock);
            if r.log_row.is_some() {
                logged += 1;
            }
        }
        assert_eq!(logged, 1);
    }

    #[test]
    fn one_shot_logging_fires_once_then_turns_off() {
        let mut driver = LifecycleDriver::new();
        driver.strike(true).unwrap();
        driver.handle_command(Command::LoggingOneShot);
        let capture = CaptureBuffer::new();
        let clock = FakeClock { now: Cell::new(0) };
        let first = driver.active_step(&capture, &clock);
        assert!(first.log_row.is_some());
        let second = driver.active_step(&capture, &clock);
        assert!(second.log_row.is_none());
    }

    #[test]
    fn handle_command_rejects_out_of_range_frequency() {
        let mut driver = LifecycleDriver::new();
        let reply = driver.handle_command(Command::SetFrequency(1));
        assert_eq!(reply, Reply::Rejected(PlasmaError::OutOfRange));
    }

    #[test]
    fn handle_command_rejects_sequencer_level_commands() {
        let mut driver = LifecycleDriver::new();
        let reply = driver.handle_command(Command::ToggleSupply(Supply::Hv));
        assert_eq!(reply, Reply::Rejected(PlasmaError::OutOfRange));
    }

    #[test]
    fn stop_then_acknowledge_returns_to_idle() {
        let mut driver = LifecycleDriver::new();
        driver.strike(true).unwrap();
        let setpoint = driver.stop();
        assert!(!setpoint.on);
        assert_eq!(driver.lifecycle(), PlasmaLifecycle::Stop);
        driver.acknowledge_stopped();
        assert_eq!(driver.lifecycle(), PlasmaLifecycle::Idle);
    }
}
