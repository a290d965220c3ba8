//! Error taxonomy for the plasma driver core (spec §7).
//!
//! Every fallible core operation returns `Result<T, PlasmaError>`. There is
//! no auto-retry: automatic re-energization under fault is unsafe, so every
//! variant here is meant to surface to the operator and stop, except
//! `ControllerNonConvergence` which is a documented safe no-op.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PlasmaError {
    /// (a) DMA/ADC reported a nonzero error code on completion.
    PeripheralFault(u32),
    /// (b) foreground requested low-supply power-off while HV was on.
    InterlockViolation,
    /// (c) an aux capture disagreed with a rail threshold after enable.
    RailUndervoltage(RailName),
    /// (d) operator input was outside its valid range.
    OutOfRange,
    /// (e) the frequency-correction routine returned "invalid" this cycle.
    ControllerNonConvergence,
    /// (f) flash erase/program returned a nonzero HAL-style code.
    StorageFailure(u32),
    /// (g) the asynchronous E-stop line fired; always wins.
    EmergencyStop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RailName {
    Rail15V,
    Rail3V3,
    Hv500V,
}
