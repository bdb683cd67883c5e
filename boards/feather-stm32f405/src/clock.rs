//! Monotonic clock and delay backed by the TIM2 monotonic

use embedded_hal_async::delay::DelayNs;
use hal_abstractions::MonotonicClock;
use rtic_monotonics::fugit::ExtU64;
use rtic_monotonics::Monotonic;

use crate::Mono;

/// Milliseconds since boot
#[derive(Clone, Copy, Default)]
pub struct MonoClock;

impl MonotonicClock for MonoClock {
    fn now_millis(&self) -> u64 {
        Mono::now().duration_since_epoch().to_millis()
    }
}

/// Async delay yielding to other RTIC tasks
#[derive(Clone, Copy, Default)]
pub struct MonoDelay;

impl DelayNs for MonoDelay {
    async fn delay_ns(&mut self, ns: u32) {
        Mono::delay((ns as u64).div_ceil(1000).micros()).await;
    }

    async fn delay_us(&mut self, us: u32) {
        Mono::delay((us as u64).micros()).await;
    }

    async fn delay_ms(&mut self, ms: u32) {
        Mono::delay((ms as u64).millis()).await;
    }
}
