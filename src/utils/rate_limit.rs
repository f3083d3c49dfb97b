//! Token bucket and the rate-capped writer built on it.
//!
//! Tokens are refilled lazily on every `take_available` call from the wall
//! clock time elapsed since the last refill; there is no background timer.
//! The writer is a best-effort log sink: bytes beyond the granted tokens are
//! dropped, and the caller is always told the whole buffer was written.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Time source, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug)]
struct BucketState {
    available: u64,
    last_refill: Instant,
}

/// Token bucket. Starts full.
pub struct Bucket {
    capacity: u64,
    rate_per_sec: u64,
    clock: Arc<dyn Clock>,
    state: Mutex<BucketState>,
}

impl Bucket {
    pub fn new(capacity: u64, rate_per_sec: u64) -> Self {
        Self::with_clock(capacity, rate_per_sec, Arc::new(SystemClock))
    }

    pub fn with_clock(capacity: u64, rate_per_sec: u64, clock: Arc<dyn Clock>) -> Self {
        let last_refill = clock.now();
        Self {
            capacity,
            rate_per_sec,
            clock,
            state: Mutex::new(BucketState {
                available: capacity,
                last_refill,
            }),
        }
    }

    /// Bucket for a log stream limited to `kb_per_sec`: refills at that rate
    /// and bursts up to three seconds worth.
    pub fn for_log_rate(kb_per_sec: u64) -> Self {
        let rate = kb_per_sec.saturating_mul(1024);
        Self::new(rate.saturating_mul(3), rate)
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Take up to `requested` tokens, returning how many were granted.
    pub fn take_available(&self, requested: u64) -> u64 {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.adjust_tokens(&mut state);
        let granted = requested.min(state.available);
        state.available -= granted;
        granted
    }

    /// Credit whole tokens for the elapsed time. The refill point only
    /// advances by the time those tokens account for, so fractional
    /// progress carries over to the next call.
    fn adjust_tokens(&self, state: &mut BucketState) {
        let now = self.clock.now();
        if self.rate_per_sec == 0 || now <= state.last_refill {
            return;
        }
        let elapsed = now.duration_since(state.last_refill).as_nanos();
        let tokens = elapsed * self.rate_per_sec as u128 / NANOS_PER_SEC;
        if tokens == 0 {
            return;
        }

        let room = (self.capacity - state.available) as u128;
        if tokens >= room {
            state.available = self.capacity;
            state.last_refill = now;
            return;
        }

        state.available += tokens as u64;
        let consumed = tokens * NANOS_PER_SEC / self.rate_per_sec as u128;
        state.last_refill += Duration::from_nanos(consumed as u64);
    }
}

/// Writer that forwards only as many bytes as the bucket grants.
pub struct DropWriter<W: Write> {
    inner: W,
    bucket: Arc<Bucket>,
}

impl<W: Write> DropWriter<W> {
    pub fn new(inner: W, bucket: Arc<Bucket>) -> Self {
        Self { inner, bucket }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for DropWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let granted = self.bucket.take_available(buf.len() as u64) as usize;
        if granted > 0 {
            self.inner.write_all(&buf[..granted])?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Clock that only moves when told to.
    pub(crate) struct ManualClock {
        now: Mutex<Instant>,
    }

    impl ManualClock {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                now: Mutex::new(Instant::now()),
            })
        }

        pub(crate) fn advance(&self, by: Duration) {
            *self.now.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }
    }

    #[test]
    fn fresh_bucket_grants_capacity_then_nothing() {
        let clock = ManualClock::new();
        let bucket = Bucket::with_clock(100, 10, clock.clone());
        assert_eq!(bucket.take_available(100), 100);
        assert_eq!(bucket.take_available(100), 0);
    }

    #[test]
    fn grant_never_exceeds_request() {
        let clock = ManualClock::new();
        let bucket = Bucket::with_clock(100, 10, clock.clone());
        assert_eq!(bucket.take_available(7), 7);
        assert_eq!(bucket.take_available(200), 93);
    }

    #[test]
    fn refill_is_proportional_and_capped() {
        let clock = ManualClock::new();
        let bucket = Bucket::with_clock(100, 10, clock.clone());
        bucket.take_available(100);

        clock.advance(Duration::from_millis(500));
        assert_eq!(bucket.take_available(100), 5);

        clock.advance(Duration::from_secs(60));
        assert_eq!(bucket.take_available(1000), 100);
    }

    #[test]
    fn fractional_refill_carries_over() {
        let clock = ManualClock::new();
        let bucket = Bucket::with_clock(100, 10, clock.clone());
        bucket.take_available(100);

        // Each step is worth half a token; 500ms in total is five.
        let mut granted = 0;
        for _ in 0..10 {
            clock.advance(Duration::from_millis(50));
            granted += bucket.take_available(100);
        }
        assert_eq!(granted, 5);
    }

    #[test]
    fn granted_total_is_bounded_by_capacity_plus_refill() {
        let clock = ManualClock::new();
        let (capacity, rate) = (64u64, 32u64);
        let bucket = Bucket::with_clock(capacity, rate, clock.clone());
        let mut granted = 0;
        let mut elapsed = Duration::ZERO;
        for step in 0..200u64 {
            let dt = Duration::from_millis((step * 37) % 113);
            clock.advance(dt);
            elapsed += dt;
            let request = (step * 13) % 41;
            let got = bucket.take_available(request);
            assert!(got <= request);
            granted += got;
        }
        let bound = capacity as f64 + rate as f64 * elapsed.as_secs_f64();
        assert!(granted as f64 <= bound, "{} > {}", granted, bound);
    }

    #[test]
    fn zero_rate_never_refills() {
        let clock = ManualClock::new();
        let bucket = Bucket::with_clock(4, 0, clock.clone());
        assert_eq!(bucket.take_available(10), 4);
        clock.advance(Duration::from_secs(100));
        assert_eq!(bucket.take_available(10), 0);
    }

    #[test]
    fn writer_drops_excess_but_reports_full_length() {
        let clock = ManualClock::new();
        let bucket = Arc::new(Bucket::with_clock(4, 1, clock.clone()));
        let mut writer = DropWriter::new(Vec::new(), bucket);

        assert_eq!(writer.write(b"hello world").unwrap(), 11);
        assert_eq!(writer.write(b"more").unwrap(), 4);
        clock.advance(Duration::from_secs(2));
        assert_eq!(writer.write(b"xyz").unwrap(), 3);
        assert_eq!(writer.into_inner(), b"hellxy".to_vec());
    }

    #[test]
    fn log_rate_bucket_bursts_three_seconds() {
        let bucket = Bucket::for_log_rate(2);
        assert_eq!(bucket.capacity(), 6 * 1024);
    }
}
