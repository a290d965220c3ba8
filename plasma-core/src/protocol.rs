//! Remote protocol command surface (spec §6). Line assembly (reading bytes
//! until `\r`, echo, backspace editing) is an external collaborator per
//! spec §1 — this module only turns an already-assembled line (or, for
//! TEST-mode menu entries, an already-read numeric value) into a
//! `Command`.
//!
//! Resolves spec §9 Open Question 1: the original C parser multiplies each
//! digit by its character position, which is not a valid decimal parse.
//! `parse_remote` uses ordinary base-10 parsing instead.

use crate::error::PlasmaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Supply {
    Fifteen,
    ThreeThree,
    Hv,
    Lv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    QuerySupply(Supply),
    ToggleSupply(Supply),
    QueryPlasma,
    TogglePlasma,
    QueryDeadtime,
    SetDeadtime(u8),
    QueryFrequency,
    SetFrequency(u32),
    QueryVoltageSetpoint,
    SetVoltageSetpoint(Option<i32>),
    LoggingOff,
    LoggingOn,
    LoggingHeader,
    LoggingOneShot,
    AutoFreqOn,
    AutoFreqOff,
    AutoVoltageOn,
    AutoVoltageOff,
    AuxDump,
    StopPlasma,
    StopAndCutLowRails,
    PowerOn,
    PowerOff,
    ComputeFreqCorrection,
    ToggleDebug,
    ShowConfig,
    GpioTest,
    TriggerPrimaryCapture,
    TriggerAuxCapture,
}

/// Parse one `\r`-stripped remote-protocol line (spec §6).
pub fn parse_remote(line: &str) -> Result<Command, PlasmaError> {
    let line = line.trim();
    let mut chars = line.chars();
    let head = chars.next().ok_or(PlasmaError::OutOfRange)?;
    let rest = &line[head.len_utf8()..];

    match head {
        'p' => {
            let mode = rest.chars().next().ok_or(PlasmaError::OutOfRange)?;
            let payload = &rest[mode.len_utf8()..];
            let supply = match payload {
                "15" => Supply::Fifteen,
                "3.3" => Supply::ThreeThree,
                "hv" => Supply::Hv,
                "lv" => Supply::Lv,
                _ => return Err(PlasmaError::OutOfRange),
            };
            match mode {
                '?' => Ok(Command::QuerySupply(supply)),
                '!' => Ok(Command::ToggleSupply(supply)),
                _ => Err(PlasmaError::OutOfRange),
            }
        }
        's' => match rest {
            "?" => Ok(Command::QueryPlasma),
            "!" => Ok(Command::TogglePlasma),
            _ => Err(PlasmaError::OutOfRange),
        },
        'd' => {
            if rest == "?" {
                Ok(Command::QueryDeadtime)
            } else if let Some(payload) = rest.strip_prefix('!') {
                let value: u8 = payload.parse().map_err(|_| PlasmaError::OutOfRange)?;
                Ok(Command::SetDeadtime(value))
            } else {
                Err(PlasmaError::OutOfRange)
            }
        }
        'f' => {
            if rest == "?" {
                Ok(Command::QueryFrequency)
            } else if let Some(payload) = rest.strip_prefix('!') {
                let value: u32 = payload.parse().map_err(|_| PlasmaError::OutOfRange)?;
                Ok(Command::SetFrequency(value))
            } else {
                Err(PlasmaError::OutOfRange)
            }
        }
        'v' => {
            if rest == "?" {
                Ok(Command::QueryVoltageSetpoint)
            } else {
                let value: i32 = rest.parse().map_err(|_| PlasmaError::OutOfRange)?;
                if value == -1 {
                    Ok(Command::SetVoltageSetpoint(None))
                } else {
                    Ok(Command::SetVoltageSetpoint(Some(value)))
                }
            }
        }
        'l' => match rest {
            "1" => Ok(Command::LoggingOn),
            "0" => Ok(Command::LoggingOff),
            "h" => Ok(Command::LoggingHeader),
            "?" => Ok(Command::LoggingOneShot),
            _ => Err(PlasmaError::OutOfRange),
        },
        'm' => match rest {
            "f1" => Ok(Command::AutoFreqOn),
            "f0" => Ok(Command::AutoFreqOff),
            "v1" => Ok(Command::AutoVoltageOn),
            "v0" => Ok(Command::AutoVoltageOff),
            _ => Err(PlasmaError::OutOfRange),
        },
        'a' if rest.is_empty() => Ok(Command::AuxDump),
        'q' if rest.is_empty() => Ok(Command::StopPlasma),
        'z' if rest.is_empty() => Ok(Command::StopAndCutLowRails),
        _ => Err(PlasmaError::OutOfRange),
    }
}

/// Map a TEST-mode single-character command to a `Command` where the
/// command carries no payload (`f`/`d`/`s` require a follow-up numeric
/// entry the external menu reads and delivers separately as
/// `SetFrequency`/`SetDeadtime`/`TogglePlasma`, since prompting and reading
/// that number is the out-of-scope serial menu, spec §1).
pub fn parse_test_mode_char(c: char) -> Option<Command> {
    match c {
        'p' => Some(Command::PowerOn),
        'o' => Some(Command::PowerOff),
        'a' => Some(Command::TriggerPrimaryCapture),
        'b' => Some(Command::TriggerAuxCapture),
        'q' => Some(Command::ComputeFreqCorrection),
        'z' => Some(Command::ToggleDebug),
        'c' => Some(Command::ShowConfig),
        't' => Some(Command::GpioTest),
        'y' => Some(Command::AutoFreqOn),
        'u' => Some(Command::AutoVoltageOn),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supply_query_and_toggle() {
        assert_eq!(parse_remote("p?15"), Ok(Command::QuerySupply(Supply::Fifteen)));
        assert_eq!(parse_remote("p!hv"), Ok(Command::ToggleSupply(Supply::Hv)));
        assert_eq!(parse_remote("p?3.3"), Ok(Command::QuerySupply(Supply::ThreeThree)));
        assert_eq!(parse_remote("p!lv"), Ok(Command::ToggleSupply(Supply::Lv)));
    }

    #[test]
    fn parses_deadtime_and_frequency_as_plain_decimal() {
        assert_eq!(parse_remote("d!35"), Ok(Command::SetDeadtime(35)));
        assert_eq!(parse_remote("f!45000"), Ok(Command::SetFrequency(45_000)));
        assert_eq!(parse_remote("d?"), Ok(Command::QueryDeadtime));
        assert_eq!(parse_remote("f?"), Ok(Command::QueryFrequency));
    }

    #[test]
    fn parses_voltage_setpoint_including_disable_sentinel() {
        assert_eq!(parse_remote("v3000"), Ok(Command::SetVoltageSetpoint(Some(3000))));
        assert_eq!(parse_remote("v-1"), Ok(Command::SetVoltageSetpoint(None)));
        assert_eq!(parse_remote("v?"), Ok(Command::QueryVoltageSetpoint));
    }

    #[test]
    fn parses_logging_and_auto_loop_toggles() {
        assert_eq!(parse_remote("l1"), Ok(Command::LoggingOn));
        assert_eq!(parse_remote("l0"), Ok(Command::LoggingOff));
        assert_eq!(parse_remote("lh"), Ok(Command::LoggingHeader));
        assert_eq!(parse_remote("l?"), Ok(Command::LoggingOneShot));
        assert_eq!(parse_remote("mf1"), Ok(Command::AutoFreqOn));
        assert_eq!(parse_remote("mv0"), Ok(Command::AutoVoltageOff));
    }

    #[test]
    fn rejects_malformed_payload() {
        assert_eq!(parse_remote("d!abc"), Err(PlasmaError::OutOfRange));
        assert_eq!(parse_remote("p!xyz"), Err(PlasmaError::OutOfRange));
        assert_eq!(parse_remote(""), Err(PlasmaError::OutOfRange));
    }
}
