use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Source of time for everything that sequences the door.
///
/// Production code sleeps on the tokio timer; tests substitute a
/// [`ManualClock`] so a ten second hold completes instantly.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);

    /// Time elapsed since `earlier` on this clock
    fn since(&self, earlier: Instant) -> Duration {
        self.now().saturating_duration_since(earlier)
    }
}

/// Wall clock backed by `tokio::time`
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        // Follows tokio's paused clock in tests
        tokio::time::Instant::now().into_std()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock: `sleep` advances time immediately and is recorded
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    state: Mutex<ManualClockState>,
}

#[derive(Debug, Default)]
struct ManualClockState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(ManualClockState::default()),
        }
    }

    /// Virtual time since the clock was created
    pub fn elapsed(&self) -> Duration {
        self.state.lock().elapsed
    }

    /// Move time forward without recording a sleep
    pub fn advance(&self, duration: Duration) {
        self.state.lock().elapsed += duration;
    }

    /// Every duration passed to `sleep`, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.lock().sleeps.clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.state.lock().sleeps.iter().sum()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.state.lock().elapsed
    }

    async fn sleep(&self, duration: Duration) {
        {
            let mut state = self.state.lock();
            state.elapsed += duration;
            state.sleeps.push(duration);
        }
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_clock_advances_on_sleep() {
        let clock = ManualClock::new();
        let start = clock.now();

        clock.sleep(Duration::from_millis(500)).await;
        clock.sleep(Duration::from_secs(10)).await;

        assert_eq!(clock.since(start), Duration::from_millis(10_500));
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(500), Duration::from_secs(10)]
        );
    }

    #[test]
    fn test_manual_clock_advance_is_not_a_sleep() {
        let clock = ManualClock::new();
        clock.advance(Duration::from_secs(3));
        assert_eq!(clock.elapsed(), Duration::from_secs(3));
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_sleeps() {
        let clock = TokioClock;
        let start = tokio::time::Instant::now();
        clock.sleep(Duration::from_secs(2)).await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
