//! Concrete `PwmDriver` over TIM1 (spec §4.1). Register-level, not the
//! HAL's async PWM wrapper: the advanced timer's BDTR dead-time field and
//! complementary-output enables aren't exposed by `embassy-stm32`'s safe
//! PWM API, so this drives the PAC directly, the same way the teacher's own
//! `PwmInput` wraps a bare timer peripheral.

use embassy_stm32::pac::timer::vals;
use embassy_stm32::pac::TIM1;
use embassy_stm32::Peri;
use plasma_core::pwm::{PwmDriver, TimerProgram};

pub struct Stm32Pwm {
    _tim1: Peri<'static, embassy_stm32::peripherals::TIM1>,
}

impl Stm32Pwm {
    pub fn new(tim1: Peri<'static, embassy_stm32::peripherals::TIM1>) -> Self {
        let regs = TIM1;
        regs.cr1().modify(|w| w.set_cen(false));
        regs.ccer().modify(|w| {
            w.set_ccxe(0, false);
            w.set_ccxe(1, false);
        });
        // Center-aligned PWM mode 1 on CH1, complementary output on CH1N,
        // so CCR sits exactly at the ARR/2 value `pwm::compute` derives.
        regs.ccmr_output(0).modify(|w| {
            w.set_ocm(0, vals::Ocm::PWM_MODE1);
        });
        Stm32Pwm { _tim1: tim1 }
    }
}

impl PwmDriver for Stm32Pwm {
    fn program(&mut self, program: TimerProgram) {
        let regs = TIM1;
        regs.arr().modify(|w| w.set_arr(program.arr as u16));
        regs.ccr(0).modify(|w| w.set_ccr(program.ccr as u16));
        regs.bdtr().modify(|w| w.set_dtg(program.bdtr_dtg));
    }

    fn start(&mut self) {
        let regs = TIM1;
        regs.ccer().modify(|w| {
            w.set_ccxe(0, true);
            w.set_ccxne(0, true);
        });
        regs.bdtr().modify(|w| w.set_moe(true));
        regs.cr1().modify(|w| w.set_cen(true));
    }

    /// Idempotent (spec §8): de-asserting an already-clear `MOE`/`CEN` bit
    /// is a no-op at the register level, so no state is tracked here.
    fn stop(&mut self) {
        let regs = TIM1;
        regs.bdtr().modify(|w| w.set_moe(false));
        regs.cr1().modify(|w| w.set_cen(false));
        regs.ccer().modify(|w| {
            w.set_ccxe(0, false);
            w.set_ccxne(0, false);
        });
    }
}
