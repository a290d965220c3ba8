//! C1 — Clock/Timebase.
//!
//! Hardware-independent: the firmware binary supplies a `Clock` backed by
//! `embassy_time::Instant`. `busy_wait_ms` is only ever used for the 1 ms
//! supply-settling delays around sequencer transitions and controller
//! application (spec §4.6, §4.7) — it is not a general-purpose scheduler
//! primitive.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Microseconds(pub u64);

impl Microseconds {
    pub fn saturating_sub(self, other: Microseconds) -> Microseconds {
        Microseconds(self.0.saturating_sub(other.0))
    }
}

pub trait Clock {
    fn now_us(&self) -> Microseconds;
}

/// Busy-waits by polling `clock.now_us()`. Latency at this scale (1 ms) is
/// far above any context-switch cost, so polling is the correct primitive
/// here, same as the microsecond busy-waits on `busy_primary`/`busy_aux`.
pub fn busy_wait_ms(clock: &impl Clock, ms: u32) {
    let start = clock.now_us();
    let target = Microseconds(ms as u64 * 1_000);
    while clock.now_us().saturating_sub(start) < target {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    struct FakeClock {
        now: Cell<u64>,
        step_us: u64,
    }

    impl Clock for FakeClock {
        fn now_us(&self) -> Microseconds {
            let v = self.now.get();
            self.now.set(v + self.step_us);
            Microseconds(v)
        }
    }

    #[test]
    fn busy_wait_advances_past_target() {
        let clock = FakeClock {
            now: Cell::new(0),
            step_us: 100,
        };
        busy_wait_ms(&clock, 1);
        assert!(clock.now.get() >= 1_000);
    }
}
