//! Board I/O trait (spec §6 "Pins (logical)"). Board-specific pin wiring is
//! an external collaborator per spec §1 — `plasma-core` only depends on
//! this trait, never on concrete GPIO types. Implementors apply the
//! external-inverter logic themselves (spec notes most enable pins pass
//! through an inverter; the trait's methods are phrased in the *logical*
//! sense — `enable_15v()` means "turn the rail on", regardless of the pin
//! polarity needed to do that).

use crate::error::PlasmaError;

pub trait BoardIo {
    fn enable_15v(&mut self, on: bool);
    fn enable_3v3_switch(&mut self, on: bool);
    fn enable_hv(&mut self, on: bool);
    fn enable_line_driver1(&mut self, on: bool);
    fn enable_line_driver2(&mut self, on: bool);
    fn set_active_led(&mut self, on: bool);

    /// Level of the external power-off interlock input, already corrected
    /// for the external inverter (`true` = E-stop asserted).
    fn power_off_asserted(&self) -> bool;

    /// Level of the "turn plasma on" request line from the robot
    /// controller, already corrected for the external inverter (`true` =
    /// requested on).
    fn turn_plasma_on_requested(&self) -> bool;

    /// Best-effort bench-test toggle of every enable pin in turn, gated by
    /// an external continue callback (spec.md §9 supplement: the original
    /// `testGPIO` command's body). Returns an error only if the board
    /// reports one; there are no safety interlocks on this path since it is
    /// explicitly a bench-test aid.
    fn gpio_test_sequence(&mut self, mut advance: impl FnMut()) -> Result<(), PlasmaError> {
        self.enable_hv(true);
        advance();
        self.enable_hv(false);
        advance();
        self.enable_line_driver1(true);
        advance();
        self.enable_line_driver1(false);
        advance();
        self.enable_line_driver2(true);
        advance();
        self.enable_line_driver2(false);
        advance();
        self.enable_3v3_switch(true);
        advance();
        self.enable_3v3_switch(false);
        advance();
        self.enable_15v(true);
        advance();
        self.enable_15v(false);
        advance();
        self.set_active_led(true);
        advance();
        self.set_active_led(false);
        Ok(())
    }
}
