//! Monotonic device clock

/// Free-running clock counting milliseconds since boot
///
/// Must never go backwards. Wall-clock time is derived from it by the core's
/// time base after a network time sync.
pub trait MonotonicClock {
    fn now_millis(&self) -> u64;
}

impl<T: MonotonicClock + ?Sized> MonotonicClock for &T {
    fn now_millis(&self) -> u64 {
        (**self).now_millis()
    }
}
