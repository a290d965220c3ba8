//! C5 — Frequency Controller (spec §4.4). The heart of the resonance
//! tracker: walk one capture, find the conducting window on the gate
//! channel, and emit a signed frequency delta normalized by the current
//! swing.

use crate::acquisition::CaptureBuffer;
use crate::decode::{decode_primary, PrimaryChannel};

const GATE_LOW_THRESHOLD: u16 = 500;
const GATE_HIGH_THRESHOLD: u16 = 65_000;
const MIN_WINDOW_GROUPS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControllerOutcome<T> {
    Valid(T),
    Invalid,
}

impl<T> ControllerOutcome<T> {
    pub fn is_valid(&self) -> bool {
        matches!(self, ControllerOutcome::Valid(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start_group: usize,
    pub end_group: usize,
}

/// Detect the conducting window by examining the gate channel raw code at
/// slot 0 of each group: the first group below `GATE_LOW_THRESHOLD` is the
/// window start; the first group after that above `GATE_HIGH_THRESHOLD` is
/// the window end, whose preceding group is the window's last in-window
/// group.
fn find_window(capture: &CaptureBuffer) -> Option<Window> {
    let mut start_group = None;
    let mut end_group = None;

    for g in 0..capture.groups() {
        let gate = capture.slot(g, PrimaryChannel::TimerGate as usize);
        if start_group.is_none() && gate < GATE_LOW_THRESHOLD {
            start_group = Some(g);
        }
        if start_group.is_some() && end_group.is_none() && gate > GATE_HIGH_THRESHOLD {
            end_group = Some(g - 1);
        }
    }

    match (start_group, end_group) {
        (Some(start), Some(end)) => Some(Window {
            start_group: start,
            end_group: end,
        }),
        _ => None,
    }
}

/// Emit a signed frequency delta from one full primary capture (spec §4.4).
pub fn frequency_delta(capture: &CaptureBuffer) -> ControllerOutcome<i32> {
    if capture.groups() == 0 {
        return ControllerOutcome::Invalid;
    }

    let mut min = f32::MAX;
    let mut max = f32::MIN;
    for g in 0..capture.groups() {
        let current = decode_primary(
            PrimaryChannel::BridgeCurrent,
            capture.slot(g, PrimaryChannel::BridgeCurrent as usize),
        );
        if current < min {
            min = current;
        }
        if current > max {
            max = current;
        }
    }

    let window = match find_window(capture) {
        Some(w) => w,
        None => return ControllerOutcome::Invalid,
    };

    let window_len = window.end_group - window.start_group + 1;
    if window_len < MIN_WINDOW_GROUPS {
        return ControllerOutcome::Invalid;
    }
    if window.start_group + 1 >= capture.groups() || window.end_group == 0 {
        return ControllerOutcome::Invalid;
    }

    let upper = decode_primary(
        PrimaryChannel::BridgeCurrent,
        capture.slot(window.start_group + 1, PrimaryChannel::BridgeCurrent as usize),
    );
    let lower = decode_primary(
        PrimaryChannel::BridgeCurrent,
        capture.slot(window.end_group - 1, PrimaryChannel::BridgeCurrent as usize),
    );

    let mut norm = max - min;
    if norm < 10.0 {
        norm = max;
    }
    if norm == 0.0 {
        return ControllerOutcome::Invalid;
    }

    let delta = round_f32(1000.0 * (upper - lower) / norm) as i32;
    ControllerOutcome::Valid(delta)
}

fn round_f32(x: f32) -> f32 {
    // no_std: avoid libm; round half away from zero, matching `f32::round`.
    if x >= 0.0 {
        (x + 0.5) as i32 as f32
    } else {
        -((-x + 0.5) as i32 as f32)
    }
}

/// Gate raw code and the window's upper/lower current readings, for the
/// telemetry row (spec §6 CSV columns `gate_raw`, `upper`, `lower`). Reuses
/// the same window-detection pass as `frequency_delta`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowReadings {
    pub gate_raw: u16,
    pub upper_ma: f32,
    pub lower_ma: f32,
}

pub fn window_readings(capture: &CaptureBuffer) -> Option<WindowReadings> {
    let window = find_window(capture)?;
    if window.start_group + 1 >= capture.groups() || window.end_group == 0 {
        return None;
    }
    let gate_raw = capture.slot(window.start_group, PrimaryChannel::TimerGate as usize);
    let upper_ma = decode_primary(
        PrimaryChannel::BridgeCurrent,
        capture.slot(window.start_group + 1, PrimaryChannel::BridgeCurrent as usize),
    );
    let lower_ma = decode_primary(
        PrimaryChannel::BridgeCurrent,
        capture.slot(window.end_group - 1, PrimaryChannel::BridgeCurrent as usize),
    );
    Some(WindowReadings { gate_raw, upper_ma, lower_ma })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::PRIMARY_CHANNELS_PER_GROUP;

    fn raw_code_for_current_ma(ma: f32) -> u16 {
        // invert decode_primary's affine current transform.
        let v = ma * 3.594286 / 50_000.0 + 1.585714;
        ((v / 3.3) * 65536.0) as u16
    }

    /// Builds a capture matching spec §8 scenario 1: groups_used=20, gate
    /// low for groups 5..15 (inclusive), high otherwise, current ramps
    /// linearly 100->500 mA across groups 5..15.
    fn ideal_triangle_capture() -> CaptureBuffer {
        let mut capture = CaptureBuffer::new();
        capture.groups_used = 20;
        for g in 0..20usize {
            let gate = if (5..=15).contains(&g) { 0u16 } else { 65_535u16 };
            capture.primary_samples[g * PRIMARY_CHANNELS_PER_GROUP] = gate;

            let current_ma = if (5..=15).contains(&g) {
                100.0 + (g - 5) as f32 * (400.0 / 10.0)
            } else {
                100.0
            };
            let idx = g * PRIMARY_CHANNELS_PER_GROUP + PrimaryChannel::BridgeCurrent as usize;
            capture.primary_samples[idx] = raw_code_for_current_ma(current_ma);
        }
        capture
    }

    #[test]
    fn freq_delta_on_ideal_triangle_matches_spec_scenario() {
        let capture = ideal_triangle_capture();
        match frequency_delta(&capture) {
            ControllerOutcome::Valid(delta) => {
                assert_eq!(delta, -800, "expected -800, got {delta}");
            }
            ControllerOutcome::Invalid => panic!("expected a valid correction"),
        }
    }

    #[test]
    fn window_shorter_than_five_groups_is_invalid() {
        let mut capture = CaptureBuffer::new();
        capture.groups_used = 10;
        // gate low only for groups 5..7 (3 groups, below the 5-group floor)
        for g in 0..10usize {
            let gate = if (5..=7).contains(&g) { 0u16 } else { 65_535u16 };
            capture.primary_samples[g * PRIMARY_CHANNELS_PER_GROUP] = gate;
        }
        assert_eq!(frequency_delta(&capture), ControllerOutcome::Invalid);
    }

    #[test]
    fn no_window_found_is_invalid() {
        let mut capture = CaptureBuffer::new();
        capture.groups_used = 10;
        for g in 0..10usize {
            capture.primary_samples[g * PRIMARY_CHANNELS_PER_GROUP] = 65_535;
        }
        assert_eq!(frequency_delta(&capture), ControllerOutcome::Invalid);
    }
}
