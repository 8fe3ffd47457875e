//! Per-session monotonic client-side timestamp generator (`spec.md` §9):
//! microseconds since the Unix epoch, strictly increasing within a session
//! even if the wall clock regresses.
use std::{
    sync::atomic::{AtomicI64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

pub struct TimestampGenerator {
    last: AtomicI64,
}

impl TimestampGenerator {
    pub fn new() -> Self {
        Self { last: AtomicI64::new(i64::MIN) }
    }

    /// The next timestamp, guaranteed strictly greater than every value this
    /// generator has returned before.
    pub fn next(&self) -> i64 {
        let wall_clock = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);

        loop {
            let prev = self.last.load(Ordering::SeqCst);
            let candidate = if wall_clock > prev { wall_clock } else { prev + 1 };
            if self
                .last
                .compare_exchange_weak(prev, candidate, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return candidate;
            }
        }
    }
}

impl Default for TimestampGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_strictly_increase_under_contention() {
        let gen = TimestampGenerator::new();
        let mut last = gen.next();
        for _ in 0..10_000 {
            let next = gen.next();
            assert!(next > last, "{next} should be greater than {last}");
            last = next;
        }
    }
}
