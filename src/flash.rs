//! Concrete `FlashStorage` over the last sector of internal flash (spec
//! §3/§6). Uses `embassy-stm32`'s blocking flash API directly since there
//! is no executor to await the async one.

use embassy_stm32::flash::{Flash, BANK1_REGION1};
use embassy_stm32::peripherals::FLASH;
use embassy_stm32::Peri;
use plasma_core::config_store::FlashStorage;
use plasma_core::error::PlasmaError;

/// Last sector of bank 1, reserved for the persisted operating mode.
const CONFIG_OFFSET: u32 = BANK1_REGION1.size - BANK1_REGION1.erase_size;

pub struct Stm32Flash<'a> {
    flash: Flash<'a, embassy_stm32::flash::Blocking>,
}

impl<'a> Stm32Flash<'a> {
    pub fn new(peripheral: Peri<'a, FLASH>) -> Self {
        Stm32Flash { flash: Flash::new_blocking(peripheral) }
    }
}

impl<'a> FlashStorage for Stm32Flash<'a> {
    fn read_sector(&self, buf: &mut [u8]) -> Result<(), PlasmaError> {
        self.flash
            .blocking_read(CONFIG_OFFSET, buf)
            .map_err(|_| PlasmaError::StorageFailure(1))
    }

    fn erase_and_write(&mut self, payload: &[u8]) -> Result<(), PlasmaError> {
        self.flash
            .blocking_erase(CONFIG_OFFSET, CONFIG_OFFSET + BANK1_REGION1.erase_size)
            .map_err(|_| PlasmaError::StorageFailure(2))?;
        self.flash
            .blocking_write(CONFIG_OFFSET, payload)
            .map_err(|_| PlasmaError::StorageFailure(3))
    }
}
