//! Hardware-independent plasma driver core: PWM timing math, the sample
//! decoder, the resonance-tracking controllers, and the power-sequencer and
//! lifecycle state machines. No peripheral access — everything here is
//! driven through small traits so both `plasma-fw` and the host `#[cfg(test)]`
//! suites can exercise it.
#![cfg_attr(not(test), no_std)]

pub mod acquisition;
pub mod board;
pub mod clock;
pub mod config_store;
pub mod decode;
pub mod error;
pub mod freq_controller;
pub mod lifecycle;
pub mod protocol;
pub mod pwm;
pub mod sequencer;
pub mod voltage_controller;
