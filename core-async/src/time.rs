//! Time-related abstractions.
//!
//! Besides re-exporting Tokio's timers this module provides
//! [`DebounceTimer`], the one cancellable unit in the reconciliation engine:
//! every filesystem event re-arms it, and only a quiet period of the full
//! delay lets it fire.
//!
//! # Examples
//!
//! ```rust
//! use core_async::time::{sleep, Duration, Instant};
//!
//! async fn example() {
//!     let start = Instant::now();
//!     sleep(Duration::from_millis(5)).await;
//!     assert!(start.elapsed() >= Duration::from_millis(5));
//! }
//! ```

pub use tokio::time::error::Elapsed;
pub use tokio::time::{
    interval, interval_at, sleep, sleep_until, timeout, Instant, Interval, MissedTickBehavior,
    Sleep, Timeout,
};

pub use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A restartable one-shot timer.
///
/// `arm` (re)starts the countdown from now, `cancel` disarms it, and
/// `fired` resolves once the armed deadline passes. When the timer is not
/// armed, `fired` never resolves, which makes it safe to use as a branch of
/// `tokio::select!` inside an event loop.
///
/// Dropping a pending `fired` future does not disarm the timer.
///
/// # Examples
///
/// ```rust
/// use core_async::time::{DebounceTimer, Duration};
///
/// async fn example() {
///     let mut timer = DebounceTimer::new(Duration::from_millis(20));
///     timer.arm();
///     timer.arm(); // restarts the countdown
///     timer.fired().await;
///     assert!(!timer.is_armed());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DebounceTimer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl DebounceTimer {
    /// Creates a disarmed timer with the given quiet period.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// The quiet period this timer waits for.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Starts or restarts the countdown.
    pub fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.delay);
    }

    /// Disarms the timer. Returns `true` if it was armed.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    /// Whether a countdown is currently running.
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolves when the armed deadline passes, disarming the timer.
    pub async fn fired(&mut self) {
        match self.deadline {
            Some(deadline) => {
                sleep_until(deadline).await;
                self.deadline = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
