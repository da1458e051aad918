//! Clock abstraction so cooldown/time-exit logic can be driven by a
//! fake clock in tests instead of real sleeps.
//!
//! Cooldown and time-budget arithmetic use the monotonic clock; wall
//! clock is used only for logging and for stamping outcomes (§4.6.3).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    /// Monotonic seconds since an arbitrary, clock-specific epoch.
    /// Only differences between two calls are meaningful.
    fn monotonic_secs(&self) -> f64;

    fn wall_now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default)]
pub struct SystemClock {
    start: once_cell_instant::OnceInstant,
}

impl Clock for SystemClock {
    fn monotonic_secs(&self) -> f64 {
        self.start.get().elapsed().as_secs_f64()
    }

    fn wall_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A manually-advanced clock for deterministic lifecycle tests.
pub struct TestClock {
    monotonic_millis: AtomicU64,
    wall: std::sync::Mutex<DateTime<Utc>>,
}

impl TestClock {
    pub fn new(wall_start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            monotonic_millis: AtomicU64::new(0),
            wall: std::sync::Mutex::new(wall_start),
        })
    }

    pub fn advance(&self, secs: f64) {
        self.monotonic_millis
            .fetch_add((secs * 1000.0) as u64, Ordering::SeqCst);
        let mut wall = self.wall.lock().unwrap();
        *wall = *wall + chrono::Duration::milliseconds((secs * 1000.0) as i64);
    }
}

impl Clock for TestClock {
    fn monotonic_secs(&self) -> f64 {
        self.monotonic_millis.load(Ordering::SeqCst) as f64 / 1000.0
    }

    fn wall_now(&self) -> DateTime<Utc> {
        *self.wall.lock().unwrap()
    }
}

/// Lazily-initialized monotonic instant, avoiding a `static` with
/// runtime construction.
mod once_cell_instant {
    use super::Instant;
    use std::sync::OnceLock;

    #[derive(Debug, Default)]
    pub struct OnceInstant(OnceLock<Instant>);

    impl OnceInstant {
        pub fn get(&self) -> Instant {
            *self.0.get_or_init(Instant::now)
        }
    }
}
