//! Concrete `BoardIo` over `embassy-stm32` GPIO (spec §6's logical pin
//! table). The enable pins on the real board pass through an external
//! inverter stage; `Output::set_high`/`set_low` here are already wired to
//! mean "logically on"/"logically off" at the connector header, so this
//! module stays a straight pass-through.

use embassy_stm32::gpio::{Input, Output};
use plasma_core::board::BoardIo;

pub struct Stm32BoardIo<'a> {
    rail_15v: Output<'a>,
    rail_3v3: Output<'a>,
    hv_enable: Output<'a>,
    line_driver1: Output<'a>,
    line_driver2: Output<'a>,
    active_led: Output<'a>,
    power_off_in: Input<'a>,
    turn_on_in: Input<'a>,
}

impl<'a> Stm32BoardIo<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rail_15v: Output<'a>,
        rail_3v3: Output<'a>,
        hv_enable: Output<'a>,
        line_driver1: Output<'a>,
        line_driver2: Output<'a>,
        active_led: Output<'a>,
        power_off_in: Input<'a>,
        turn_on_in: Input<'a>,
    ) -> Self {
        Stm32BoardIo {
            rail_15v,
            rail_3v3,
            hv_enable,
            line_driver1,
            line_driver2,
            active_led,
            power_off_in,
            turn_on_in,
        }
    }
}

fn set(pin: &mut Output<'_>, on: bool) {
    if on {
        pin.set_high();
    } else {
        pin.set_low();
    }
}

impl<'a> BoardIo for Stm32BoardIo<'a> {
    fn enable_15v(&mut self, on: bool) {
        set(&mut self.rail_15v, on);
    }

    fn enable_3v3_switch(&mut self, on: bool) {
        set(&mut self.rail_3v3, on);
    }

    fn enable_hv(&mut self, on: bool) {
        set(&mut self.hv_enable, on);
    }

    fn enable_line_driver1(&mut self, on: bool) {
        set(&mut self.line_driver1, on);
    }

    fn enable_line_driver2(&mut self, on: bool) {
        set(&mut self.line_driver2, on);
    }

    fn set_active_led(&mut self, on: bool) {
        set(&mut self.active_led, on);
    }

    fn power_off_asserted(&self) -> bool {
        self.power_off_in.is_low()
    }

    fn turn_plasma_on_requested(&self) -> bool {
        self.turn_on_in.is_low()
    }
}
