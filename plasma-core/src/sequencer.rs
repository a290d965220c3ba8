//! C7 — Power Sequencer (spec §4.7). Two ordered ramps enforce the strict
//! safety ordering between the 15 V, 3.3 V, and 500 V high-voltage rails,
//! plus the interlock that forbids bridge drive outside `HvOn`/`Ready`.

use crate::acquisition::CaptureBuffer;
use crate::board::BoardIo;
use crate::clock::{busy_wait_ms, Clock};
use crate::decode::AuxChannel;
use crate::error::{PlasmaError, RailName};
use crate::pwm::PwmDriver;

/// Only the 15 V, 3.3 V, and HV entries are consulted (spec §3); the rest
/// exist because the real hardware table carries them (battery and
/// thermistor channels have no enforced threshold).
pub const THRESHOLDS: [u16; 11] = [
    3252, // Battery48V
    3600, // Rail15V
    3389, // Rail3V3
    0,    // NotConnected3
    0,    // BridgeTemp
    3326, // Hv500V
    0, 0, 0, 0, // Thermistor1..4
    0, // NotConnected10
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SequencerState {
    Off,
    FifteenVOn,
    ThreeV3On,
    DriverOn,
    HvOn,
    Ready,
}

pub struct PowerSequencer {
    state: SequencerState,
}

impl PowerSequencer {
    pub const fn new() -> Self {
        PowerSequencer {
            state: SequencerState::Off,
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn hv_is_on(&self) -> bool {
        matches!(self.state, SequencerState::HvOn | SequencerState::Ready)
    }

    fn check_rail(capture: &CaptureBuffer, channel: AuxChannel, rail: RailName) -> Result<(), PlasmaError> {
        let raw = capture.aux_samples[channel.slot()];
        if raw >= THRESHOLDS[channel.slot()] {
            Ok(())
        } else {
            Err(PlasmaError::RailUndervoltage(rail))
        }
    }

    /// Spec §4.7 steps 1-3: enable line-driver 2 unconditionally (done once
    /// at init, outside this state machine — see `plasma-fw`'s startup),
    /// enable 15 V, settle, verify via an aux capture, enable the 3.3 V
    /// switch, settle.
    pub fn power_on_low(
        &mut self,
        board: &mut impl BoardIo,
        clock: &impl Clock,
        aux_capture: impl FnOnce() -> CaptureBuffer,
    ) -> Result<(), PlasmaError> {
        board.enable_15v(true);
        busy_wait_ms(clock, 1);

        let capture = aux_capture();
        Self::check_rail(&capture, AuxChannel::Rail15V, RailName::Rail15V).map_err(|e| {
            self.power_off_low(board, clock);
            e
        })?;
        self.state = SequencerState::FifteenVOn;

        board.enable_3v3_switch(true);
        busy_wait_ms(clock, 1);
        self.state = SequencerState::ThreeV3On;

        Ok(())
    }

    /// Spec §4.7 step 4: shoot-through guard, line-driver 1, HV enable,
    /// settle, verify via an aux capture.
    pub fn power_on_high(
        &mut self,
        board: &mut impl BoardIo,
        clock: &impl Clock,
        pwm: &mut impl PwmDriver,
        aux_capture: impl FnOnce() -> CaptureBuffer,
    ) -> Result<(), PlasmaError> {
        pwm.stop();

        board.enable_line_driver1(true);
        busy_wait_ms(clock, 1);
        self.state = SequencerState::DriverOn;

        board.enable_hv(true);
        busy_wait_ms(clock, 1);

        let capture = aux_capture();
        Self::check_rail(&capture, AuxChannel::Hv500V, RailName::Hv500V).map_err(|e| {
            self.power_off_high(board, clock, pwm);
            e
        })?;
        self.state = SequencerState::HvOn;

        board.set_active_led(true);
        self.state = SequencerState::Ready;
        Ok(())
    }

    /// Power-off is the exact reverse: HV then drivers then 3.3 V switch
    /// then 15 V, and HV-off always calls `stop_PWM` before de-asserting
    /// HV enable (spec §4.7).
    pub fn power_off_high(&mut self, board: &mut impl BoardIo, clock: &impl Clock, pwm: &mut impl PwmDriver) {
        pwm.stop();
        board.enable_hv(false);
        busy_wait_ms(clock, 1);
        board.enable_line_driver1(false);
        busy_wait_ms(clock, 1);
        board.set_active_led(false);
        self.state = SequencerState::FifteenVOn;
    }

    /// Rejected unless HV is already off (spec §4.7: "the operator may call
    /// low-rail power-off only while HV is off").
    pub fn power_off_low(&mut self, board: &mut impl BoardIo, clock: &impl Clock) -> Result<(), PlasmaError> {
        if self.hv_is_on() {
            return Err(PlasmaError::InterlockViolation);
        }
        board.enable_3v3_switch(false);
        busy_wait_ms(clock, 1);
        board.enable_15v(false);
        busy_wait_ms(clock, 1);
        self.state = SequencerState::Off;
        Ok(())
    }

    /// Full reverse power-off: HV rail down, then low rails down.
    pub fn power_off(&mut self, board: &mut impl BoardIo, clock: &impl Clock, pwm: &mut impl PwmDriver) -> Result<(), PlasmaError> {
        self.power_off_high(board, clock, pwm);
        self.power_off_low(board, clock)
    }

    /// Synchronous, idempotent full power-off for the E-stop IRQ path
    /// (spec §4.7, §5). Always wins, never rejected by the interlock.
    pub fn on_estop(&mut self, board: &mut impl BoardIo, clock: &impl Clock, pwm: &mut impl PwmDriver) {
        pwm.stop();
        board.enable_hv(false);
        board.enable_line_driver1(false);
        board.enable_3v3_switch(false);
        board.enable_15v(false);
        board.set_active_led(false);
        self.state = SequencerState::Off;
    }
}

impl Default for PowerSequencer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::AUX_SAMPLE_CAPACITY;

    struct FakeBoard {
        rail_15v: bool,
        rail_3v3: bool,
        hv: bool,
        drv1: bool,
        drv2: bool,
        led: bool,
        estop: bool,
    }

    impl FakeBoard {
        fn new() -> Self {
            FakeBoard {
                rail_15v: false,
                rail_3v3: false,
                hv: false,
                drv1: false,
                drv2: false,
                led: false,
                estop: false,
            }
        }
    }

    impl BoardIo for FakeBoard {
        fn enable_15v(&mut self, on: bool) {
            self.rail_15v = on;
        }
        fn enable_3v3_switch(&mut self, on: bool) {
            self.rail_3v3 = on;
        }
        fn enable_hv(&mut self, on: bool) {
            self.hv = on;
        }
        fn enable_line_driver1(&mut self, on: bool) {
            self.drv1 = on;
        }
        fn enable_line_driver2(&mut self, on: bool) {
            self.drv2 = on;
        }
        fn set_active_led(&mut self, on: bool) {
            self.led = on;
        }
        fn power_off_asserted(&self) -> bool {
            self.estop
        }
        fn turn_plasma_on_requested(&self) -> bool {
            false
        }
    }

    struct FakeClock {
        now: core::cell::Cell<u64>,
    }
    impl FakeClock {
        fn new() -> Self {
            FakeClock { now: core::cell::Cell::new(0) }
        }
    }
    impl Clock for FakeClock {
        fn now_us(&self) -> crate::clock::Microseconds {
            let v = self.now.get();
            self.now.set(v + 1_000);
            crate::clock::Microseconds(v)
        }
    }

    struct FakePwm {
        running: bool,
    }
    impl PwmDriver for FakePwm {
        fn program(&mut self, _program: crate::pwm::TimerProgram) {}
        fn start(&mut self) {
            self.running = true;
        }
        fn stop(&mut self) {
            self.running = false;
        }
    }

    fn aux_capture_with(channel: AuxChannel, raw: u16) -> CaptureBuffer {
        let mut capture = CaptureBuffer::new();
        let mut samples = [0u16; AUX_SAMPLE_CAPACITY];
        samples[channel.slot()] = raw;
        capture.aux_samples = samples;
        capture
    }

    #[test]
    fn power_on_happy_path_reaches_ready() {
        let mut board = FakeBoard::new();
        let clock = FakeClock::new();
        let mut pwm = FakePwm { running: false };
        let mut sequencer = PowerSequencer::new();

        sequencer
            .power_on_low(&mut board, &clock, || aux_capture_with(AuxChannel::Rail15V, 3700))
            .unwrap();
        assert_eq!(sequencer.state(), SequencerState::ThreeV3On);

        sequencer
            .power_on_high(&mut board, &clock, &mut pwm, || aux_capture_with(AuxChannel::Hv500V, 3400))
            .unwrap();
        assert_eq!(sequencer.state(), SequencerState::Ready);
        assert!(board.hv && board.led);
    }

    #[test]
    fn power_on_rail_failure_unwinds_to_off() {
        let mut board = FakeBoard::new();
        let clock = FakeClock::new();
        let mut sequencer = PowerSequencer::new();

        let result = sequencer.power_on_low(&mut board, &clock, || aux_capture_with(AuxChannel::Rail15V, 3000));
        assert!(result.is_err());
        assert_eq!(sequencer.state(), SequencerState::Off);
        assert!(!board.rail_15v && !board.rail_3v3);
    }

    #[test]
    fn low_supply_off_rejected_while_hv_on() {
        let mut board = FakeBoard::new();
        let clock = FakeClock::new();
        let mut sequencer = PowerSequencer::new();
        sequencer
            .power_on_low(&mut board, &clock, || aux_capture_with(AuxChannel::Rail15V, 3700))
            .unwrap();
        let mut pwm = FakePwm { running: false };
        sequencer
            .power_on_high(&mut board, &clock, &mut pwm, || aux_capture_with(AuxChannel::Hv500V, 3400))
            .unwrap();

        let result = sequencer.power_off_low(&mut board, &clock);
        assert_eq!(result, Err(PlasmaError::InterlockViolation));
    }

    #[test]
    fn estop_drives_full_power_off_and_is_idempotent() {
        let mut board = FakeBoard::new();
        let clock = FakeClock::new();
        let mut pwm = FakePwm { running: true };
        let mut sequencer = PowerSequencer::new();
        sequencer
            .power_on_low(&mut board, &clock, || aux_capture_with(AuxChannel::Rail15V, 3700))
            .unwrap();
        sequencer
            .power_on_high(&mut board, &clock, &mut pwm, || aux_capture_with(AuxChannel::Hv500V, 3400))
            .unwrap();

        sequencer.on_estop(&mut board, &clock, &mut pwm);
        assert_eq!(sequencer.state(), SequencerState::Off);
        assert!(!board.hv && !pwm.running);

        sequencer.on_estop(&mut board, &clock, &mut pwm);
        assert_eq!(sequencer.state(), SequencerState::Off);
    }

    #[test]
    fn two_consecutive_power_offs_from_ready_leave_same_off_state() {
        let mut board = FakeBoard::new();
        let clock = FakeClock::new();
        let mut pwm = FakePwm { running: false };
        let mut sequencer = PowerSequencer::new();
        sequencer
            .power_on_low(&mut board, &clock, || aux_capture_with(AuxChannel::Rail15V, 3700))
            .unwrap();
        sequencer
            .power_on_high(&mut board, &clock, &mut pwm, || aux_capture_with(AuxChannel::Hv500V, 3400))
            .unwrap();

        sequencer.power_off(&mut board, &clock, &mut pwm).unwrap();
        let first_off_state = sequencer.state();
        let result = sequencer.power_off(&mut board, &clock, &mut pwm);
        assert!(result.is_ok());
        assert_eq!(sequencer.state(), first_off_state);
    }
}
