//! C9 — Configuration Store (spec §3/§6). A one-byte flash-backed record
//! selecting TEST vs RUN mode at boot. Flash erase/program is an external
//! collaborator (`FlashStorage`, bound to real HAL calls in `plasma-fw`);
//! this module only owns the encode/decode and the uninitialized-sector
//! fallback.

use crate::error::PlasmaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OperatingMode {
    Test,
    Run,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PersistedConfig {
    pub mode: OperatingMode,
}

/// One flash word, matching the smallest program granule on the target
/// (spec §6). Callers of `erase_and_write` pad their payload up to this
/// size before calling it.
pub const FLASH_WORD_LEN: usize = 32;

pub trait FlashStorage {
    fn read_sector(&self, buf: &mut [u8]) -> Result<(), PlasmaError>;
    fn erase_and_write(&mut self, payload: &[u8]) -> Result<(), PlasmaError>;
}

const MODE_BYTE_RUN: u8 = 0x01;

/// Loads the persisted mode. An all-`0xFF` sector (the erased-flash state)
/// is treated as uninitialized: it is immediately rewritten with
/// `OperatingMode::Test` and `Test` is returned regardless of whether that
/// rewrite succeeds — a storage failure here must not block boot, spec
/// §7(f) only requires the failure be surfaced, not that it be fatal.
pub fn load(storage: &mut impl FlashStorage) -> (PersistedConfig, Result<(), PlasmaError>) {
    let mut buf = [0xFFu8; FLASH_WORD_LEN];
    if storage.read_sector(&mut buf).is_err() {
        return (PersistedConfig { mode: OperatingMode::Test }, Err(PlasmaError::StorageFailure(0)));
    }

    if buf.iter().all(|&b| b == 0xFF) {
        let payload = [0x00u8; FLASH_WORD_LEN];
        let write_result = storage.erase_and_write(&payload);
        return (PersistedConfig { mode: OperatingMode::Test }, write_result);
    }

    let mode = if buf[0] == MODE_BYTE_RUN {
        OperatingMode::Run
    } else {
        OperatingMode::Test
    };
    (PersistedConfig { mode }, Ok(()))
}

pub fn store(storage: &mut impl FlashStorage, config: PersistedConfig) -> Result<(), PlasmaError> {
    let byte = match config.mode {
        OperatingMode::Run => MODE_BYTE_RUN,
        OperatingMode::Test => 0x00,
    };
    let mut payload = [0x00u8; FLASH_WORD_LEN];
    payload[0] = byte;
    storage.erase_and_write(&payload)
}
