//! C3 — Acquisition Engine (spec §4.2).
//!
//! Owns the capture buffer and the `busy_primary`/`busy_aux` flags. The
//! strict pipeline ordering ("no two captures overlap", "a capture is
//! started only from within the previous capture's completion hook") is a
//! caller discipline documented here and enforced by the ISR wiring in the
//! firmware binary plus the `LifecycleDriver` in `crate::lifecycle`; this
//! module only owns the data each stage needs and the contracts each start
//! call must honor.

use crate::error::PlasmaError;

pub const PRIMARY_GROUP_CAPACITY: usize = 100;
pub const PRIMARY_CHANNELS_PER_GROUP: usize = 6;
pub const PRIMARY_SAMPLE_CAPACITY: usize = PRIMARY_GROUP_CAPACITY * PRIMARY_CHANNELS_PER_GROUP;
pub const AUX_SAMPLE_CAPACITY: usize = 11;

/// Owned, process-wide capture storage (spec §3). Layout: each group
/// occupies 6 consecutive slots in `{TimerGate, BridgeCurrent, BridgeVoltS1,
/// BridgeVoltS2, PlasmaVoltL1, PlasmaVoltL2}` order.
#[derive(Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CaptureBuffer {
    pub primary_samples: [u16; PRIMARY_SAMPLE_CAPACITY],
    pub aux_samples: [u16; AUX_SAMPLE_CAPACITY],
    pub groups_used: u16,
    pub busy_primary: bool,
    pub busy_aux: bool,
}

impl CaptureBuffer {
    pub const fn new() -> Self {
        CaptureBuffer {
            primary_samples: [0; PRIMARY_SAMPLE_CAPACITY],
            aux_samples: [0; AUX_SAMPLE_CAPACITY],
            groups_used: 0,
            busy_primary: false,
            busy_aux: false,
        }
    }

    /// Slot index of `channel` (0..6) within `group` (0..groups_used).
    pub fn slot(&self, group: usize, channel: usize) -> u16 {
        self.primary_samples[group * PRIMARY_CHANNELS_PER_GROUP + channel]
    }

    pub fn groups(&self) -> usize {
        self.groups_used as usize
    }
}

impl Default for CaptureBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// `ceil((2 / freq_hz) / 1us) + 2`, capped at `PRIMARY_GROUP_CAPACITY`
/// (spec §3). One primary group completes every 1 us, so this is simply
/// `ceil(2_000_000 / freq_hz) + 2`.
pub fn groups_used_for(frequency_hz: u32) -> u16 {
    let raw = (2_000_000u32 + frequency_hz - 1) / frequency_hz;
    let with_margin = raw + 2;
    with_margin.min(PRIMARY_GROUP_CAPACITY as u32) as u16
}

/// Implemented by the firmware binary over the dual-ADC + DMA peripheral
/// pair. `start` must not block; completion is reported later through
/// `AcquisitionEngine::primary_complete`.
pub trait PrimaryChain {
    fn start(&mut self, dma_requests: u32) -> Result<(), PlasmaError>;
    fn calibrate(&mut self) -> Result<(), PlasmaError>;
}

/// Implemented by the firmware binary over the scan-mode aux ADC + DMA.
pub trait AuxChain {
    fn start(&mut self) -> Result<(), PlasmaError>;
    fn calibrate(&mut self) -> Result<(), PlasmaError>;
}

pub struct AcquisitionEngine<P, A> {
    pub buffer: CaptureBuffer,
    primary: P,
    aux: A,
}

impl<P: PrimaryChain, A: AuxChain> AcquisitionEngine<P, A> {
    pub fn new(primary: P, aux: A) -> Self {
        AcquisitionEngine {
            buffer: CaptureBuffer::new(),
            primary,
            aux,
        }
    }

    pub fn calibrate(&mut self) -> Result<(), PlasmaError> {
        self.primary.calibrate()?;
        self.aux.calibrate()
    }

    /// Fails if the requested frequency would need more than
    /// `PRIMARY_GROUP_CAPACITY` groups (it never will, since
    /// `groups_used_for` caps at that value, but the contract is checked
    /// explicitly per spec §4.2).
    pub fn start_primary(&mut self, frequency_hz: u32) -> Result<(), PlasmaError> {
        let groups = groups_used_for(frequency_hz);
        if groups as usize > PRIMARY_GROUP_CAPACITY {
            return Err(PlasmaError::OutOfRange);
        }
        self.buffer.groups_used = groups;
        self.buffer.busy_primary = true;
        let dma_requests = 3 * groups as u32;
        if let Err(e) = self.primary.start(dma_requests) {
            self.buffer.busy_primary = false;
            return Err(e);
        }
        Ok(())
    }

    pub fn start_aux(&mut self) -> Result<(), PlasmaError> {
        self.buffer.busy_aux = true;
        if let Err(e) = self.aux.start() {
            self.buffer.busy_aux = false;
            return Err(e);
        }
        Ok(())
    }

    /// Called from the primary DMA-complete ISR. Clears `busy_primary`
    /// unconditionally (spec §4.2: "the flag is still cleared" on error)
    /// and reports the error, if any, to the caller for pipeline-halt
    /// handling.
    pub fn primary_complete(&mut self, error_code: Option<u32>) -> Result<(), PlasmaError> {
        self.buffer.busy_primary = false;
        match error_code {
            Some(code) => Err(PlasmaError::PeripheralFault(code)),
            None => Ok(()),
        }
    }

    pub fn aux_complete(&mut self, error_code: Option<u32>) -> Result<(), PlasmaError> {
        self.buffer.busy_aux = false;
        match error_code {
            Some(code) => Err(PlasmaError::PeripheralFault(code)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OkChain;
    impl PrimaryChain for OkChain {
        fn start(&mut self, _dma_requests: u32) -> Result<(), PlasmaError> {
            Ok(())
        }
        fn calibrate(&mut self) -> Result<(), PlasmaError> {
            Ok(())
        }
    }
    impl AuxChain for OkChain {
        fn start(&mut self) -> Result<(), PlasmaError> {
            Ok(())
        }
        fn calibrate(&mut self) -> Result<(), PlasmaError> {
            Ok(())
        }
    }

    #[test]
    fn groups_used_caps_at_capacity() {
        assert_eq!(groups_used_for(65_000), 31 + 2);
        assert!(groups_used_for(1) as usize <= PRIMARY_GROUP_CAPACITY);
    }

    #[test]
    fn start_primary_sets_busy_and_groups() {
        let mut engine = AcquisitionEngine::new(OkChain, OkChain);
        engine.start_primary(30_000).unwrap();
        assert!(engine.buffer.busy_primary);
        assert_eq!(engine.buffer.groups_used, groups_used_for(30_000));
    }

    #[test]
    fn complete_clears_busy_flag_even_on_error() {
        let mut engine = AcquisitionEngine::new(OkChain, OkChain);
        engine.start_primary(30_000).unwrap();
        let result = engine.primary_complete(Some(7));
        assert!(result.is_err());
        assert!(!engine.buffer.busy_primary);
    }

    #[test]
    fn primary_and_aux_busy_never_both_true_in_sequence() {
        let mut engine = AcquisitionEngine::new(OkChain, OkChain);
        engine.start_primary(30_000).unwrap();
        assert!(engine.buffer.busy_primary && !engine.buffer.busy_aux);
        engine.primary_complete(None).unwrap();
        engine.start_aux().unwrap();
        assert!(!engine.buffer.busy_primary && engine.buffer.busy_aux);
    }
}
