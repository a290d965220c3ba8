//! C6 — Voltage Controller (spec §4.5). Emits a signed dead-time delta
//! tracking a peak plasma-voltage setpoint; runs at the same cadence as the
//! frequency controller, since dead-time trim reshapes the bridge waveform
//! and changes fundamental amplitude (coupled with C2).

use crate::acquisition::CaptureBuffer;
use crate::decode::{decode_primary, PrimaryChannel};

const SQRT_2: f32 = core::f32::consts::SQRT_2;

/// Peak differential plasma voltage (mV) across the capture (spec §4.5
/// steps 1-2).
pub fn peak_plasma_voltage_mv(capture: &CaptureBuffer) -> f32 {
    let mut vl_max = f32::MIN;
    for g in 0..capture.groups() {
        let l1 = decode_primary(
            PrimaryChannel::PlasmaVoltL1,
            capture.slot(g, PrimaryChannel::PlasmaVoltL1 as usize),
        );
        let l2 = decode_primary(
            PrimaryChannel::PlasmaVoltL2,
            capture.slot(g, PrimaryChannel::PlasmaVoltL2 as usize),
        );
        let vl = SQRT_2 * (l1 - l2);
        if vl > vl_max {
            vl_max = vl;
        }
    }
    if capture.groups() == 0 {
        0.0
    } else {
        vl_max
    }
}

/// `(V_desired - VL_max) / 100`, truncating toward zero like the original
/// `int16_t` cast (spec §4.5 step 3).
pub fn deadtime_delta(v_desired_mv: i32, capture: &CaptureBuffer) -> i32 {
    let vl_max = peak_plasma_voltage_mv(capture) as i32;
    (v_desired_mv - vl_max) / 100
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_code_for_plasma_mv(mv: f32) -> u16 {
        let v = mv / 1.0e6 * 0.999 + 1.648348;
        ((v / 3.3) * 65536.0) as u16
    }

    #[test]
    fn voltage_trim_loop_matches_spec_scenario() {
        // V_desired=3000 mV, measured VL_max=2600 mV => dt_delta=4.
        let mut capture = CaptureBuffer::new();
        capture.groups_used = 1;
        // Choose L1/L2 so sqrt(2)*(L1-L2) == 2600 mV.
        let half = 2600.0 / SQRT_2;
        let l1_idx = PrimaryChannel::PlasmaVoltL1 as usize;
        let l2_idx = PrimaryChannel::PlasmaVoltL2 as usize;
        capture.primary_samples[l1_idx] = raw_code_for_plasma_mv(half);
        capture.primary_samples[l2_idx] = raw_code_for_plasma_mv(0.0);

        let vl_max = peak_plasma_voltage_mv(&capture);
        assert!((vl_max - 2600.0).abs() < 5.0, "got {vl_max}");

        let delta = deadtime_delta(3000, &capture);
        assert_eq!(delta, 4);
    }

    #[test]
    fn empty_capture_has_zero_peak() {
        let capture = CaptureBuffer::new();
        assert_eq!(peak_plasma_voltage_mv(&capture), 0.0);
    }

}
