//! C4 — Sample Decoder (spec §4.3).
//!
//! Pure affine transforms from raw ADC codes to engineering units. These
//! constants are part of the external contract: they are derived from the
//! board's divider networks and cannot drift without re-characterizing the
//! hardware (spec §4.3), so they are never "cleaned up" or refactored away.

/// Channels carried in each 6-slot primary capture group (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PrimaryChannel {
    TimerGate,
    BridgeCurrent,
    BridgeVoltS1,
    BridgeVoltS2,
    PlasmaVoltL1,
    PlasmaVoltL2,
}

/// Channels carried in the 11-slot aux capture (spec §3). Only three are
/// consulted by the sequencer; the rest are decoded for completeness
/// because the original hardware table defines them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AuxChannel {
    Battery48V,
    Rail15V,
    Rail3V3,
    NotConnected3,
    BridgeTemp,
    Hv500V,
    Thermistor1,
    Thermistor2,
    Thermistor3,
    Thermistor4,
    NotConnected10,
}

impl AuxChannel {
    pub const ALL: [AuxChannel; 11] = [
        AuxChannel::Battery48V,
        AuxChannel::Rail15V,
        AuxChannel::Rail3V3,
        AuxChannel::NotConnected3,
        AuxChannel::BridgeTemp,
        AuxChannel::Hv500V,
        AuxChannel::Thermistor1,
        AuxChannel::Thermistor2,
        AuxChannel::Thermistor3,
        AuxChannel::Thermistor4,
        AuxChannel::NotConnected10,
    ];

    pub fn slot(self) -> usize {
        self as usize
    }
}

const PRIMARY_FULL_SCALE: f32 = 65536.0;
const AUX_FULL_SCALE: f32 = 4096.0;
const VREF: f32 = 3.3;

fn primary_volts(raw: u16) -> f32 {
    VREF * (raw as f32 / PRIMARY_FULL_SCALE)
}

fn aux_volts(raw: u16) -> f32 {
    VREF * (raw as f32 / AUX_FULL_SCALE)
}

/// Decode a raw primary-chain code to its engineering unit (mA for
/// current, mV for voltages). `TimerGate` is not a physical measurement —
/// its raw code is returned unconverted, as it exists only to reconstruct
/// the conducting window (spec §4.4).
pub fn decode_primary(channel: PrimaryChannel, raw: u16) -> f32 {
    let v = primary_volts(raw);
    match channel {
        PrimaryChannel::TimerGate => raw as f32,
        PrimaryChannel::BridgeCurrent => 50_000.0 * (v - 1.585714) / 3.594286,
        PrimaryChannel::PlasmaVoltL1 | PrimaryChannel::PlasmaVoltL2 => {
            1.0e6 * (v - 1.648348) / 0.999
        }
        PrimaryChannel::BridgeVoltS1 | PrimaryChannel::BridgeVoltS2 => 1000.0 * 167.667 * v,
    }
}

/// Decode a raw aux-chain code to millivolts (or a raw-proportional
/// placeholder for channels with no characterized transfer function).
pub fn decode_aux(channel: AuxChannel, raw: u16) -> f32 {
    let v = aux_volts(raw);
    match channel {
        AuxChannel::Battery48V => 1000.0 * ((9.76 + 169.0) / 9.76) * v,
        AuxChannel::Rail15V => 1000.0 * ((30.0 + 120.0) / 30.0) * v,
        AuxChannel::Rail3V3 => 1000.0 * ((30.0 + 3.0) / 30.0) * v,
        AuxChannel::Hv500V => 1000.0 * ((12.0 + 2000.0) / 12.0) * v * 0.129,
        AuxChannel::BridgeTemp => 1000.0 * v,
        AuxChannel::NotConnected3 | AuxChannel::NotConnected10 => 0.0,
        AuxChannel::Thermistor1
        | AuxChannel::Thermistor2
        | AuxChannel::Thermistor3
        | AuxChannel::Thermistor4 => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_decode_uses_fifty_thousand_gain() {
        // V = 1.585714 -> current should be ~0 mA.
        let raw = (1.585714 / VREF * PRIMARY_FULL_SCALE) as u16;
        let ma = decode_primary(PrimaryChannel::BridgeCurrent, raw);
        assert!(ma.abs() < 1.0, "expected ~0 mA, got {ma}");
    }

    #[test]
    fn timer_gate_passes_through_raw_code() {
        assert_eq!(decode_primary(PrimaryChannel::TimerGate, 12345), 12345.0);
    }

    #[test]
    fn not_connected_aux_channels_decode_to_zero() {
        assert_eq!(decode_aux(AuxChannel::NotConnected3, 4095), 0.0);
        assert_eq!(decode_aux(AuxChannel::NotConnected10, 4095), 0.0);
    }
}
